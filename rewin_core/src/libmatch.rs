//! Precomputed one- and two-gate covers of the cell library, keyed by
//! truth table.
//!
//! Preparation enumerates every usable cell under all input permutations,
//! plus every bottom/top cell stack (the bottom output feeding one top
//! input). In area mode each function keeps only the cheapest cover; in
//! delay mode a Pareto frontier over (area, per-input delay profile) is
//! maintained.

use crate::library::{GateId, Library};
use crate::timing::{flt2int, FAN_FROM_BOTTOM};
use crate::truth::{
    elem_truths, perm_schedule, tt_count_ones, tt_stretch, tt_swap_adjacent, tt_word_num, Word,
    SUPP_MAX, WORD_MAX,
};
use itertools::Itertools;
use std::collections::HashMap;
use tracing::debug;

const NO_REC: i32 = -1;
const NO_CELL: u16 = u16::MAX;

pub struct FunRec {
    next: i32,
    pub area: i32,
    bot: u16,
    top: u16,
    /// Inverse input permutation of the bottom cell.
    pub fans_b: [u8; SUPP_MAX],
    /// Inverse input permutation of the top cell; `FAN_FROM_BOTTOM` marks
    /// the pin fed by the bottom output.
    pub fans_t: [u8; SUPP_MAX],
}

pub struct MatchLib {
    pub nvars: usize,
    nwords: usize,
    delay_mode: bool,
    cells: Vec<GateId>,
    cell_type: Vec<u8>, // 1 = plain AND/OR shape, 2 = other stackable
    tt_ids: HashMap<[Word; WORD_MAX], usize>,
    lists: Vec<i32>,
    counts: Vec<u32>,
    hits: Vec<u32>,
    recs: Vec<FunRec>,
    profs: Vec<usize>,
    store: Vec<i32>,
    pub num_skipped: usize,
    pub num_removed: usize,
}

fn unit_profile(
    bot_pins: usize,
    has_top: bool,
    nfanins: usize,
    perm: &[usize],
    prof: &mut [i32; SUPP_MAX],
) {
    let extra = i32::from(has_top);
    for i in 0..nfanins {
        prof[i] = if perm[i] < bot_pins { 1 + extra } else { 1 };
    }
}

impl MatchLib {
    pub fn rec(&self, id: usize) -> &FunRec {
        &self.recs[id]
    }

    pub fn bot_gate(&self, rec: &FunRec) -> GateId {
        self.cells[rec.bot as usize]
    }

    pub fn top_gate(&self, rec: &FunRec) -> Option<GateId> {
        if rec.top == NO_CELL { None } else { Some(self.cells[rec.top as usize]) }
    }

    /// Enumerate the covers of every library function on up to `nvars`
    /// inputs.
    pub fn prepare(lib: &Library, nvars: usize, two_gates: bool, delay_mode: bool) -> MatchLib {
        assert!((2..=SUPP_MAX).contains(&nvars));
        let mut p = MatchLib {
            nvars,
            nwords: tt_word_num(nvars),
            delay_mode,
            cells: Vec::new(),
            cell_type: Vec::new(),
            tt_ids: HashMap::new(),
            lists: Vec::new(),
            counts: Vec::new(),
            hits: Vec::new(),
            recs: Vec::new(),
            profs: Vec::new(),
            store: Vec::new(),
            num_skipped: 0,
            num_removed: 0,
        };
        // usable cells: two or more pins, at most min(6, nvars)
        let pin_cap = nvars.min(6);
        for gate in lib.gates.iter() {
            let n = gate.num_pins();
            if n < 2 || n > pin_cap {
                continue;
            }
            // plain AND/OR shapes have a one-minterm onset or offset
            let shape = 1usize << n;
            let ones = count_window_ones(&gate.truth, n);
            let kind = if ones == 1 || ones == shape - 1 { 1 } else { 2 };
            p.cells.push(gate.cell_id);
            p.cell_type.push(kind);
        }

        // single cells under all input permutations
        for ci in 0..p.cells.len() {
            let gate = lib.gate(p.cells[ci]);
            let nfanins = gate.num_pins();
            let mut perm: Vec<usize> = (0..nfanins).collect();
            let mut tt = gate.truth;
            tt_stretch(&mut tt, nfanins, SUPP_MAX);
            let orig = tt;
            let sched = perm_schedule(nfanins);
            for &s in &sched {
                p.add(lib, &tt, &perm, nfanins, ci as u16, NO_CELL, 0);
                tt_swap_adjacent(&mut tt, WORD_MAX, s);
                perm.swap(s, s + 1);
            }
            assert_eq!(tt, orig);
        }

        // bottom/top stacks
        if two_gates {
            for bi in 0..p.cells.len() {
                if p.cell_type[bi] == 0 {
                    continue;
                }
                for ti in 0..p.cells.len() {
                    if p.cell_type[ti] == 0 {
                        continue;
                    }
                    let bot = lib.gate(p.cells[bi]);
                    let top = lib.gate(p.cells[ti]);
                    let nfanins = bot.num_pins() + top.num_pins() - 1;
                    if nfanins > nvars {
                        continue;
                    }
                    for f in 0..top.num_pins() {
                        let mut perm: Vec<usize> = (0..nfanins).collect();
                        let mut tt = truth_two(lib, p.cells[bi], p.cells[ti], f);
                        let orig = tt;
                        let sched = perm_schedule(nfanins);
                        let mut closed = true;
                        for &s in &sched {
                            p.add(lib, &tt, &perm, nfanins, bi as u16, ti as u16, f);
                            if nfanins > 5 {
                                closed = false;
                                break;
                            }
                            tt_swap_adjacent(&mut tt, WORD_MAX, s);
                            perm.swap(s, s + 1);
                        }
                        if closed {
                            assert_eq!(tt, orig);
                        }
                    }
                }
            }
        }
        debug!(
            cells = p.cells.len(),
            funcs = p.tt_ids.len(),
            covers = p.recs.len() - p.num_removed,
            skipped = p.num_skipped,
            removed = p.num_removed,
            "library covers prepared"
        );
        p
    }

    #[allow(clippy::too_many_arguments)]
    fn add(
        &mut self,
        lib: &Library,
        tt: &[Word; WORD_MAX],
        perm: &[usize],
        nfanins: usize,
        bot: u16,
        top: u16,
        in_top: usize,
    ) {
        // tables must stay periodic beyond the library word width so the
        // hash key is canonical
        debug_assert!((self.nwords..WORD_MAX).all(|w| tt[w] == tt[w % self.nwords]));
        let bot_gate = lib.gate(self.cells[bot as usize]);
        let top_gate = (top != NO_CELL).then(|| lib.gate(self.cells[top as usize]));
        let area = flt2int(bot_gate.area) + top_gate.map_or(0, |g| flt2int(g.area));

        let func = match self.tt_ids.get(tt) {
            Some(&f) => f,
            None => {
                let f = self.lists.len();
                self.tt_ids.insert(*tt, f);
                self.lists.push(NO_REC);
                self.counts.push(0);
                self.hits.push(0);
                f
            }
        };

        let mut profile = [0i32; SUPP_MAX];
        if self.delay_mode {
            unit_profile(bot_gate.num_pins(), top_gate.is_some(), nfanins, perm, &mut profile);
            // drop the new cover if an existing one dominates it
            let mut chain: Vec<usize> = Vec::new();
            let mut r = self.lists[func];
            while r != NO_REC {
                let rec = &self.recs[r as usize];
                chain.push(r as usize);
                let prof = &self.store[self.profs[r as usize]..];
                if area >= rec.area && (0..nfanins).all(|k| profile[k] >= prof[k]) {
                    self.num_skipped += 1;
                    return;
                }
                r = rec.next;
            }
            // purge the old covers the new one dominates
            let survivors = chain
                .iter()
                .copied()
                .filter(|&id| {
                    let rec = &self.recs[id];
                    let prof = &self.store[self.profs[id]..];
                    let dominated =
                        area <= rec.area && (0..nfanins).all(|k| profile[k] <= prof[k]);
                    if dominated {
                        self.num_removed += 1;
                    }
                    !dominated
                })
                .collect_vec();
            if survivors.len() < chain.len() {
                self.lists[func] = NO_REC;
                for &id in survivors.iter().rev() {
                    self.recs[id].next = self.lists[func];
                    self.lists[func] = id as i32;
                }
            }
        } else {
            let mut r = self.lists[func];
            while r != NO_REC {
                if area >= self.recs[r as usize].area {
                    return;
                }
                r = self.recs[r as usize].next;
            }
        }

        let mut inv_perm = [0usize; SUPP_MAX];
        for (k, &pk) in perm.iter().enumerate().take(nfanins) {
            inv_perm[pk] = k;
        }
        if self.delay_mode {
            self.profs.push(self.store.len());
            self.store.extend(profile.iter().take(nfanins));
        }
        let mut rec = FunRec {
            next: self.lists[func],
            area,
            bot,
            top,
            fans_b: [0; SUPP_MAX],
            fans_t: [0; SUPP_MAX],
        };
        for k in 0..bot_gate.num_pins() {
            rec.fans_b[k] = inv_perm[k] as u8;
        }
        if let Some(tg) = top_gate {
            let mut k = bot_gate.num_pins();
            for i in 0..tg.num_pins() {
                rec.fans_t[i] = if i == in_top {
                    FAN_FROM_BOTTOM
                } else {
                    let v = inv_perm[k] as u8;
                    k += 1;
                    v
                };
            }
            assert_eq!(k, nfanins);
        }
        let id = self.recs.len();
        self.recs.push(rec);
        self.lists[func] = id as i32;
        self.counts[func] += 1;
    }

    /// Cheapest cover of the queried function, if any.
    pub fn find_area_match(&self, tt: &[Word; WORD_MAX]) -> Option<(i32, usize)> {
        let func = *self.tt_ids.get(tt)?;
        let head = self.lists[func];
        if head == NO_REC {
            return None;
        }
        Some((self.recs[head as usize].area, head as usize))
    }

    /// All covers on the Pareto frontier of the queried function.
    pub fn find_delay_matches(&mut self, tt: &[Word; WORD_MAX]) -> Vec<usize> {
        let func = match self.tt_ids.get(tt) {
            Some(&f) => f,
            None => return Vec::new(),
        };
        self.hits[func] += 1;
        let mut out = Vec::new();
        let mut r = self.lists[func];
        while r != NO_REC {
            out.push(r as usize);
            r = self.recs[r as usize].next;
        }
        out
    }

    /// Usage summary of the precomputed covers.
    pub fn print_summary(&self, lib: &Library) -> String {
        let mut out = String::new();
        for (tt, &func) in self.tt_ids.iter().sorted_by_key(|e| *e.1) {
            if self.hits[func] == 0 {
                continue;
            }
            out.push_str(&format!(
                "{:016x} : num = {} hit = {}",
                tt[0], self.counts[func], self.hits[func]
            ));
            let mut r = self.lists[func];
            while r != NO_REC {
                let rec = &self.recs[r as usize];
                let bot = lib.gate(self.bot_gate(rec));
                out.push_str(&format!("  {}", bot.name));
                if let Some(tg) = self.top_gate(rec) {
                    out.push_str(&format!("+{}", lib.gate(tg).name));
                }
                out.push_str(&format!(" a={}", rec.area));
                r = rec.next;
            }
            out.push('\n');
        }
        out
    }
}

/// Count the onset minterms over the first `2^n` assignments.
fn count_window_ones(tt: &[Word], n: usize) -> usize {
    let bits = 1usize << n;
    if bits >= 64 {
        return tt_count_ones(tt, bits / 64);
    }
    (tt[0] & ((1u64 << bits) - 1)).count_ones() as usize
}

/// Compose the bottom cell into input `in_top` of the top cell; bottom
/// inputs take variable positions `0..b`, the remaining top inputs take
/// `b..b+t-1` in pin order.
pub fn truth_two(lib: &Library, bot: GateId, top: GateId, in_top: usize) -> [Word; WORD_MAX] {
    let bot_gate = lib.gate(bot);
    let top_gate = lib.gate(top);
    assert!(in_top < top_gate.num_pins());
    let elems = elem_truths();
    let mut fanins: Vec<[Word; WORD_MAX]> = Vec::with_capacity(top_gate.num_pins());
    let mut k = bot_gate.num_pins();
    for i in 0..top_gate.num_pins() {
        if i == in_top {
            let mut t = bot_gate.truth;
            tt_stretch(&mut t, bot_gate.num_pins(), SUPP_MAX);
            fanins.push(t);
        } else {
            fanins.push(elems[k]);
            k += 1;
        }
    }
    assert_eq!(k + 1, bot_gate.num_pins() + top_gate.num_pins());
    top_gate.expr.truth(top_gate.num_pins(), Some(&fanins))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::test_genlib;
    use crate::truth::TRUTHS6;

    fn canon(f: Word) -> [Word; WORD_MAX] {
        [f; WORD_MAX]
    }

    #[test]
    fn area_match_single_cell() {
        let lib = Library::from_genlib(test_genlib()).unwrap();
        let m = MatchLib::prepare(&lib, 6, true, false);
        let (area, rec) = m.find_area_match(&canon(TRUTHS6[0] & TRUTHS6[1])).unwrap();
        assert_eq!(area, flt2int(2.0));
        let rec = m.rec(rec);
        assert_eq!(lib.gate(m.bot_gate(rec)).name, "and2");
        assert!(m.top_gate(rec).is_none());
    }

    #[test]
    fn area_match_permuted_inputs() {
        let lib = Library::from_genlib(test_genlib()).unwrap();
        let m = MatchLib::prepare(&lib, 6, true, false);
        // a & !b with the complemented input in first position: !v0 & v1
        let (_, rec) = m.find_area_match(&canon(!TRUTHS6[0] & TRUTHS6[1])).unwrap();
        let rec = m.rec(rec);
        assert_eq!(lib.gate(m.bot_gate(rec)).name, "andb2");
        // andb2 computes pin0 & !pin1, so pin0 must read cover input 1
        assert_eq!(rec.fans_b[0], 1);
        assert_eq!(rec.fans_b[1], 0);
    }

    #[test]
    fn two_gate_stacks() {
        let lib = Library::from_genlib(test_genlib()).unwrap();
        let m = MatchLib::prepare(&lib, 6, true, false);
        // (a & b) | c has no single cell; cheapest cover is and2 + or2
        let query = canon((TRUTHS6[0] & TRUTHS6[1]) | TRUTHS6[2]);
        let (area, rec) = m.find_area_match(&query).unwrap();
        assert_eq!(area, flt2int(4.0));
        let rec = m.rec(rec);
        assert!(m.top_gate(rec).is_some());
    }

    #[test]
    fn truth_two_composes() {
        let lib = Library::from_genlib(test_genlib()).unwrap();
        let and2 = lib.and2.unwrap();
        let or2 = lib.or2.unwrap();
        let tt = truth_two(&lib, and2, or2, 0);
        assert_eq!(tt[0], (TRUTHS6[0] & TRUTHS6[1]) | TRUTHS6[2]);
        let tt = truth_two(&lib, and2, or2, 1);
        assert_eq!(tt[0], TRUTHS6[2] | (TRUTHS6[0] & TRUTHS6[1]));
    }

    #[test]
    fn delay_frontier_is_nondominated() {
        let lib = Library::from_genlib(test_genlib()).unwrap();
        let mut m = MatchLib::prepare(&lib, 6, true, true);
        let query = canon((TRUTHS6[0] & TRUTHS6[1]) | TRUTHS6[2]);
        let matches = m.find_delay_matches(&query);
        assert!(!matches.is_empty());
        // no record on a frontier may dominate another
        for &a in &matches {
            for &b in &matches {
                if a == b {
                    continue;
                }
                let (ra, rb) = (&m.recs[a], &m.recs[b]);
                let (pa, pb) = (&m.store[m.profs[a]..], &m.store[m.profs[b]..]);
                let dominates =
                    ra.area <= rb.area && (0..3).all(|k| pa[k] <= pb[k]);
                assert!(!dominates, "record {} dominates {}", a, b);
            }
        }
    }

    #[test]
    fn missing_function() {
        let lib = Library::from_genlib(test_genlib()).unwrap();
        let m = MatchLib::prepare(&lib, 6, false, false);
        // three-input majority needs two levels, absent without stacks
        let maj = (TRUTHS6[0] & TRUTHS6[1]) | (TRUTHS6[0] & TRUTHS6[2]) | (TRUTHS6[1] & TRUTHS6[2]);
        assert!(m.find_area_match(&canon(maj)).is_none());
    }
}
