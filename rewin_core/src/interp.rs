//! Interpolant extraction and the fanin-removal resubstitution pass
//! driven by it.
//!
//! The interpolant loop: (i) find an onset minterm of the pivot; (ii)
//! check the same divisor values against the offset; an UNSAT answer
//! yields, through the final conflict, a minimal sub-cube over the
//! divisors that still forces the pivot high — the cube joins the truth
//! table and is blocked. The loop ends with the table (onset exhausted),
//! with `Sat` (divisor set insufficient, counter-example recorded), or
//! with `Undec` (budget).

use crate::driver::Optimizer;
use crate::network::NodeId;
use crate::sat::{lit, lit_is_compl, lit_not, lit_var, SatResult};
use crate::truth::{tt_get_bit, tt_has_var, tt_set_bit, tt_stretch, Word, SUPP_MAX, WORD_MAX};
use crate::truth::TRUTHS6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpResult {
    /// An admissible on-set over the candidate divisors.
    Table(Word),
    /// The candidate set cannot express the pivot; a distinguishing
    /// counter-example column was recorded.
    Sat,
    /// Conflict budget exhausted.
    Undec,
}

impl<'a> Optimizer<'a> {
    /// Compute an interpolant for the pivot over `cand_vars` (at most six
    /// window variables).
    pub fn compute_interpolant(&mut self, cand_vars: &[usize]) -> InterpResult {
        assert!(cand_vars.len() <= 6);
        debug_assert!(self.ncexes < 64);
        if self.div_cexes.len() < self.ndivs {
            self.div_cexes.resize(self.ndivs, 0);
        }
        let bt = self.pars.bt_limit;
        let sel = self.sat.add_var();
        let pivot_lit = lit(self.itarget, false);
        let sel_lit = lit(sel, false);
        let mut truth: Word = 0;
        loop {
            // onset minterm
            self.stats.sat_calls += 1;
            match self.sat.solve(&[pivot_lit, sel_lit], bt) {
                SatResult::Undec => return InterpResult::Undec,
                SatResult::Unsat => {
                    self.stats.sat_unsat += 1;
                    return InterpResult::Table(truth);
                }
                SatResult::Sat => self.stats.sat_sat += 1,
            }
            let onset_values: Vec<bool> = (0..self.ndivs).map(|d| self.sat.var_value(d)).collect();
            let minterm: Vec<crate::sat::Lit> =
                cand_vars.iter().map(|&d| self.sat.model_literal(d)).collect();
            // the same divisor values against the offset
            let mut assumps = vec![lit_not(pivot_lit)];
            assumps.extend_from_slice(&minterm);
            self.stats.sat_calls += 1;
            match self.sat.solve(&assumps, bt) {
                SatResult::Undec => return InterpResult::Undec,
                SatResult::Sat => {
                    self.stats.sat_sat += 1;
                    // record which divisors tell the two models apart
                    for (d, &v) in onset_values.iter().enumerate() {
                        if v != self.sat.var_value(d) {
                            debug_assert_eq!(self.div_cexes[d] >> self.ncexes & 1, 0);
                            self.div_cexes[d] |= 1u64 << self.ncexes;
                        }
                    }
                    self.ncexes += 1;
                    return InterpResult::Sat;
                }
                SatResult::Unsat => {
                    self.stats.sat_unsat += 1;
                    // a minimal sub-cube of the minterm still forcing the
                    // pivot high
                    let fin = self.sat.final_conflict().to_vec();
                    let mut cube: Word = !0;
                    let mut block = vec![lit_not(sel_lit)];
                    for &l in &fin {
                        if l == pivot_lit {
                            continue;
                        }
                        block.push(l);
                        let pos = cand_vars
                            .iter()
                            .position(|&d| d == lit_var(l))
                            .expect("final literal outside the candidate set");
                        cube &= if lit_is_compl(l) { TRUTHS6[pos] } else { !TRUTHS6[pos] };
                    }
                    truth |= cube;
                    self.sat.add_clause(&block);
                }
            }
        }
    }

    /// Restrict a single-word table over `div_ids` to its true support and
    /// reorder it onto ascending window positions.
    pub(crate) fn canon_support(&self, truth: Word, div_ids: &[usize]) -> ([Word; WORD_MAX], Vec<usize>) {
        let full = [truth; WORD_MAX];
        let keep: Vec<usize> = (0..div_ids.len())
            .filter(|&i| tt_has_var(&full, 1, i))
            .collect();
        let mut proj = [0u64; WORD_MAX];
        for m in 0..(1usize << keep.len()) {
            let mut mo = 0usize;
            for (j, &i) in keep.iter().enumerate() {
                if (m >> j) & 1 == 1 {
                    mo |= 1 << i;
                }
            }
            if tt_get_bit(&full, mo) {
                tt_set_bit(&mut proj, m);
            }
        }
        tt_stretch(&mut proj, keep.len(), SUPP_MAX);
        let unsorted: Vec<usize> = keep.iter().map(|&i| div_ids[i]).collect();
        let mut sorted = unsorted.clone();
        sorted.sort_unstable();
        if sorted != unsorted {
            crate::truth::tt_expand(&mut proj, &unsorted, &sorted);
        }
        (proj, sorted)
    }

    /// One-shot fanin-removal / fanin-replacement resubstitution over the
    /// whole network (area mode).
    pub fn resub_pass(&mut self) {
        let nstop = self.ntk.objs.len();
        for raw in 0..nstop {
            let id = NodeId::from(raw);
            if self.pars.nodes_max > 0 && self.stats.changed >= self.pars.nodes_max {
                break;
            }
            if !self.ntk.obj(id).valid
                || !self.ntk.is_node(id)
                || self.ntk.obj(id).fixed
                || self.ntk.fanin_num(id) < 2
                || self.ntk.fanin_num(id) > 6
            {
                continue;
            }
            self.resub_node(id);
        }
    }

    fn resub_node(&mut self, pivot: NodeId) -> bool {
        self.stats.tried += 1;
        let ndivs = self.extract_window(pivot);
        if self.pars.win_size_max > 0 && self.gates_win.len() > self.pars.win_size_max {
            return false;
        }
        self.ndivs = ndivs;
        if !self.prepare_solver() {
            return false;
        }
        let limit = self.gates_win.len();
        let nfanins = self.fanins_win[self.itarget].len();
        for f in 0..nfanins {
            if self.try_resub_one(pivot, limit, f) {
                return true;
            }
        }
        false
    }

    /// Try expressing the pivot without its `f`-th fanin, possibly pulling
    /// in one replacement divisor guided by counter-example signatures.
    fn try_resub_one(&mut self, pivot: NodeId, limit: usize, f: usize) -> bool {
        self.stats.try_removes += 1;
        self.ncexes = 0;
        self.div_cexes = vec![0; self.ndivs];
        let fanins = self.fanins_win[self.itarget].clone();
        let mut div_ids: Vec<usize> =
            fanins.iter().enumerate().filter(|&(i, _)| i != f).map(|(_, &k)| k).collect();
        let mut removed_only = true;
        let table = loop {
            match self.compute_interpolant(&div_ids) {
                InterpResult::Undec => {
                    self.stats.timeouts += 1;
                    return false;
                }
                InterpResult::Table(t) => break t,
                InterpResult::Sat => {}
            }
            if self.ncexes >= 64 {
                self.stats.sat_over += 1;
                return false;
            }
            if removed_only {
                self.stats.try_resubs += 1;
            } else {
                div_ids.pop();
            }
            removed_only = false;
            // a usable replacement divisor differs from the onset model in
            // every counter-example seen so far
            let mask = (1u64 << self.ncexes) - 1;
            let cand = (0..self.ndivs).find(|&d| {
                self.div_cexes[d] == mask && !div_ids.contains(&d) && !fanins.contains(&d)
            });
            match cand {
                Some(d) => div_ids.push(d),
                None => return false,
            }
        };
        let (truth, supp) = self.canon_support(table, &div_ids);
        // the fanin count never increases
        if supp.len() > fanins.len() {
            return false;
        }
        // price the replacement against the cone it frees
        let cut: Vec<NodeId> = supp.iter().map(|&k| self.map[k]).collect();
        let (area_this, _) = self.ntk.mffc_area(self.lib, pivot, &cut);
        let implemented = if supp.len() < 2 {
            Some(self.implement_simple(&truth, &supp))
        } else {
            match self.mlib.find_area_match(&truth) {
                Some((area_new, rec)) => {
                    let better =
                        if self.pars.zero_cost { area_new <= area_this } else { area_new < area_this };
                    if better {
                        Some(self.implement_area_match(rec, &supp))
                    } else {
                        None
                    }
                }
                None => None,
            }
        };
        if implemented.is_none() {
            return false;
        }
        if removed_only {
            self.stats.removes += 1;
        } else {
            self.stats.resubs += 1;
        }
        self.stats.changed += 1;
        self.count_stats(limit);
        self.insert(pivot, limit, false);
        true
    }
}
