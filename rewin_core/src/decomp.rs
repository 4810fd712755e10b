//! Counter-example guided cofactor decomposition.
//!
//! Each recursion level keeps per-divisor on/off pattern vectors filled
//! from SAT models (and the care-set simulation), pattern masks selecting
//! the rows valid on the current cofactor path, proved unit implications,
//! and the assumption stack fixing the path. Shortcuts detect constants,
//! buffers/inverters, and multi-input AND/OR gates before branching on
//! the cheapest discriminating divisor.

use crate::driver::{Optimizer, DEC_MAX};
use crate::library::GateId;
use crate::network::NodeId;
use crate::sat::{lit, lit_is_compl, lit_not, lit_var, Lit, SatResult};
use crate::truth::{
    tt_and_sharp, tt_const, tt_count_ones_mask, tt_equal, tt_get_bit, tt_intersect, tt_is_const0,
    tt_is_const1, tt_mask, tt_set_bit, tt_word_num, Word, SIM_WORDS, SUPP_MAX, TRUTHS6, WORD_MAX,
};
use std::time::Instant;

type Masks = [[Word; SIM_WORDS]; 2];

impl<'a> Optimizer<'a> {
    pub(crate) fn div_pats(&self, d: usize, c: usize) -> &[Word] {
        &self.sets[c][d * SIM_WORDS..(d + 1) * SIM_WORDS]
    }

    fn solve_timed(&mut self, assumps: &[Lit]) -> SatResult {
        self.stats.sat_calls += 1;
        let t0 = Instant::now();
        let r = self.sat.solve(assumps, self.pars.bt_limit);
        match r {
            SatResult::Sat => {
                self.stats.sat_sat += 1;
                self.stats.t_sat_sat += t0.elapsed();
            }
            SatResult::Unsat => {
                self.stats.sat_unsat += 1;
                self.stats.t_sat_unsat += t0.elapsed();
            }
            SatResult::Undec => self.stats.timeouts += 1,
        }
        r
    }

    /// Append the model's divisor values as a pattern column of polarity
    /// `c`; false when the pattern buffer is full.
    fn record_patterns(&mut self, c: usize, masks: &mut Masks) -> bool {
        if self.npats[c] == 64 * SIM_WORDS {
            self.stats.sat_over += 1;
            return false;
        }
        for d in 0..self.ndivs {
            if self.sat.var_value(d) {
                let off = d * SIM_WORDS;
                tt_set_bit(&mut self.sets[c][off..off + SIM_WORDS], self.npats[c]);
            }
        }
        self.npat_words[c] = 1 + (self.npats[c] >> 6);
        tt_set_bit(&mut masks[c], self.npats[c]);
        self.npats[c] += 1;
        true
    }

    /// Seed the pattern state for a fresh pivot from the care-set columns
    /// of the last simulation.
    pub(crate) fn setup_sim_info(&mut self, pivot: NodeId) {
        self.npats = [0, 0];
        self.npat_words = [0, 0];
        for c in 0..2 {
            self.sets[c].clear();
            self.sets[c].resize(self.ndivs * SIM_WORDS, 0);
        }
        self.div_words = (4 * self.ndivs + 63) / 64;
        for level in self.div_impl_cache.iter_mut() {
            level.clear();
            level.resize(self.div_words, 0);
        }
        if self.pars.use_sim && self.care_set != 0 {
            let care = self.care_set;
            let values = self.sims[pivot.raw()];
            let mut indexes = [[0usize; 64]; 2];
            for i in 0..64 {
                if (care >> i) & 1 == 1 {
                    let c = usize::from((values >> i) & 1 == 0);
                    indexes[c][self.npats[c]] = i;
                    self.npats[c] += 1;
                }
            }
            for c in 0..2 {
                self.npat_words[c] = 1 + (self.npats[c] >> 6);
            }
            for d in 0..self.ndivs {
                let sim = self.sims[self.map[d].raw()];
                for c in 0..2 {
                    for i in 0..self.npats[c] {
                        if (sim >> indexes[c][i]) & 1 == 1 {
                            let off = d * SIM_WORDS;
                            tt_set_bit(&mut self.sets[c][off..off + SIM_WORDS], i);
                        }
                    }
                }
            }
        }
    }

    /// Fold up to 32 patterns of each polarity back into the divisors'
    /// simulation words.
    pub(crate) fn setdown_sim_info(&mut self) {
        if !self.pars.use_sim {
            return;
        }
        for d in 0..self.ndivs {
            let mut sim = self.sims[self.map[d].raw()];
            let mut halves = [0u64; 2];
            for c in 0..2 {
                let keep = self.npats[c].min(32);
                let mask = crate::truth::tt6_mask(keep);
                halves[c] = (self.div_pats(d, c)[0] & mask) | (sim & !mask);
                sim >>= 32;
            }
            self.sims[self.map[d].raw()] = (halves[0] & 0xFFFF_FFFF) | (halves[1] << 32);
        }
    }

    fn dec_find_cost(&self, c: usize, l: Lit, mask: &[Word; SIM_WORDS]) -> usize {
        let pats = self.div_pats(lit_var(l), 1 - c);
        tt_count_ones_mask(pats, mask, self.npat_words[1 - c], lit_is_compl(l))
    }

    /// Cheapest implied literal to cofactor on; the cost of a literal is
    /// the count of opposite-polarity patterns it fails to explain.
    fn dec_find_best_var(&self, masks: &Masks) -> Option<usize> {
        let mut best: Option<usize> = None;
        let mut cost_min = usize::MAX;
        for c in 0..2 {
            for &l in &self.impl_lits[c] {
                if self.impl_lits[c].len() > 1 && self.obj_dec.contains(&lit_var(l)) {
                    continue;
                }
                let cost = self.dec_find_cost(c, l, &masks[1 - c]);
                if cost < cost_min {
                    cost_min = cost;
                    best = Some(lit_var(l));
                }
            }
        }
        best
    }

    fn combine_dec(
        &self,
        t0: &[Word; WORD_MAX],
        t1: &[Word; WORD_MAX],
        s0: &[usize],
        s1: &[usize],
        truth: &mut [Word; WORD_MAX],
        supp: &mut Vec<usize>,
        var: usize,
    ) -> Option<usize> {
        let nwords0 = tt_word_num(s0.len());
        if s0 == s1 && tt_equal(t0, t1, nwords0) {
            *truth = *t0;
            supp.clear();
            supp.extend_from_slice(s0);
            return Some(s0.len());
        }
        let mut union: Vec<usize> = s0.iter().chain(s1.iter()).copied().collect();
        debug_assert!(!union.contains(&var));
        union.push(var);
        union.sort_unstable();
        union.dedup();
        if union.len() > self.pars.var_max {
            return None;
        }
        let mut e0 = *t0;
        let mut e1 = *t1;
        crate::truth::tt_expand(&mut e0, s0, &union);
        crate::truth::tt_expand(&mut e1, s1, &union);
        let ivar = union.iter().position(|&v| v == var).unwrap();
        let elem = crate::truth::elem_truths()[ivar];
        crate::truth::tt_mux(truth, &elem, &e1, &e0, WORD_MAX);
        supp.clear();
        supp.extend_from_slice(&union);
        Some(union.len())
    }

    /// The recursion: constants, unit implications, AND/OR shortcut, then
    /// a Shannon branch on the best divisor. Returns the support size of
    /// the admissible function written into `truth`/`supp`, or nothing
    /// when the budget or support bound is hit.
    pub(crate) fn perform_dec_rec(
        &mut self,
        truth: &mut [Word; WORD_MAX],
        supp: &mut Vec<usize>,
        assump: &mut Vec<Lit>,
        masks: &mut Masks,
        cofactor_in: bool,
        nsupp_add: usize,
    ) -> Option<usize> {
        let mut cofactor = cofactor_in;
        let depth = assump.len();
        assert!(depth <= SUPP_MAX);

        // constants: a polarity with no patterns may be empty for real
        for c in 0..2 {
            if !tt_is_const0(&masks[c], self.npat_words[c]) {
                continue;
            }
            assump.push(lit(self.itarget, c == 1));
            let status = self.solve_timed(&assump[..]);
            assump.pop();
            match status {
                SatResult::Undec => return None,
                SatResult::Unsat => {
                    tt_const(truth, WORD_MAX, c == 1);
                    supp.clear();
                    return Some(0);
                }
                SatResult::Sat => {
                    self.record_patterns(c, masks);
                }
            }
        }

        let mut var: Option<usize> = self.use_this.take();
        if var.is_none() {
            // unit implications per divisor and polarity
            self.impl_lits[0].clear();
            self.impl_lits[1].clear();
            for d in 0..self.ndivs {
                let mut implied: [Option<Lit>; 2] = [None, None];
                for c in 0..2 {
                    let (has0, has1) = {
                        let pats = self.div_pats(d, c);
                        (
                            tt_intersect(pats, &masks[c], self.npat_words[c], true),
                            tt_intersect(pats, &masks[c], self.npat_words[c], false),
                        )
                    };
                    if has0 && has1 {
                        continue;
                    }
                    // all observed patterns agree; probe the other value
                    let probe = lit(d, has1);
                    let cache_bit = 4 * d + 2 * c + usize::from(has1);
                    let known = tt_get_bit(&self.div_impl_cache[depth], cache_bit);
                    let status = if known {
                        SatResult::Unsat
                    } else {
                        assump.push(lit(self.itarget, c == 1));
                        assump.push(probe);
                        let s = self.solve_timed(&assump[..]);
                        assump.pop();
                        assump.pop();
                        s
                    };
                    match status {
                        SatResult::Undec => return None,
                        SatResult::Unsat => {
                            let il = lit_not(probe);
                            implied[c] = Some(il);
                            self.impl_lits[c].push(il);
                            tt_set_bit(&mut self.div_impl_cache[depth], cache_bit);
                        }
                        SatResult::Sat => {
                            self.record_patterns(c, masks);
                        }
                    }
                }
                if let (Some(i0), Some(i1)) = (implied[0], implied[1]) {
                    if i0 == i1 {
                        self.impl_lits[0].pop();
                        self.impl_lits[1].pop();
                        continue;
                    }
                    assert_eq!(lit_var(i0), lit_var(i1));
                    // the pivot follows one divisor: buffer or inverter
                    let unit = if lit_is_compl(i0) { [!TRUTHS6[0]; WORD_MAX] } else { [TRUTHS6[0]; WORD_MAX] };
                    *truth = unit;
                    supp.clear();
                    supp.push(lit_var(i0));
                    return Some(1);
                }
            }
            if nsupp_add > self.pars.var_max - 2 {
                return None;
            }
            // all implications of one polarity at once: a direct AND/OR
            if self.pars.use_and_or {
                for c in 0..2 {
                    if self.impl_lits[1 - c].len() < 2 {
                        continue;
                    }
                    let lits = self.impl_lits[1 - c].clone();
                    assert!(lits.len() < crate::driver::WIN_MAX - 10);
                    assump.push(lit(self.itarget, c == 1));
                    assump.extend_from_slice(&lits);
                    let status = self.solve_timed(&assump[..]);
                    assump.truncate(depth);
                    match status {
                        SatResult::Undec => return None,
                        SatResult::Unsat => {
                            let fin = self.sat.final_conflict().to_vec();
                            let mut picked: Vec<Lit> = fin
                                .iter()
                                .filter(|&&l| lits.contains(&lit_not(l)))
                                .map(|&l| lit_not(l))
                                .collect();
                            if picked.len() + nsupp_add > 6 {
                                continue;
                            }
                            picked.sort_unstable_by_key(|&l| lit_var(l));
                            supp.clear();
                            if c == 1 {
                                *truth = [!0u64; WORD_MAX];
                                for (i, &l) in picked.iter().enumerate() {
                                    let e = crate::truth::elem_truths()[i];
                                    for w in 0..WORD_MAX {
                                        truth[w] &= if lit_is_compl(l) { !e[w] } else { e[w] };
                                    }
                                    supp.push(lit_var(l));
                                }
                            } else {
                                *truth = [0u64; WORD_MAX];
                                for (i, &l) in picked.iter().enumerate() {
                                    let e = crate::truth::elem_truths()[i];
                                    for w in 0..WORD_MAX {
                                        truth[w] |= if lit_is_compl(l) { e[w] } else { !e[w] };
                                    }
                                    supp.push(lit_var(l));
                                }
                            }
                            self.stats.and_or += 1;
                            return Some(picked.len());
                        }
                        SatResult::Sat => {
                            self.record_patterns(c, masks);
                        }
                    }
                }
            }
            var = self.dec_find_best_var(masks);
            if var.is_none() && cofactor {
                for k in (0..self.in_mffc.len()).rev() {
                    let v = self.in_mffc[k];
                    if !self.obj_dec.contains(&v) {
                        var = Some(v);
                        break;
                    }
                }
                cofactor = false;
            }
        }

        let var = var?;
        self.obj_dec.push(var);
        let mut t01 = [[0u64; WORD_MAX]; 2];
        let mut s01: [Vec<usize>; 2] = [Vec::new(), Vec::new()];
        for i in 0..2 {
            let mut masks_next: Masks = [[0u64; SIM_WORDS]; 2];
            for c in 0..2 {
                let mut pats = [0u64; SIM_WORDS];
                pats.copy_from_slice(self.div_pats(var, c));
                tt_and_sharp(&mut masks_next[c], &masks[c], &pats, self.npat_words[c], i == 0);
            }
            assump.push(lit(var, i == 0));
            self.div_impl_cache[depth + 1] = self.div_impl_cache[depth].clone();
            let extra = if i == 1 { s01[0].len() } else { 0 } + nsupp_add + 1;
            let (mut ti, mut si) = ([0u64; WORD_MAX], Vec::new());
            let r = self.perform_dec_rec(&mut ti, &mut si, assump, &mut masks_next, cofactor, extra);
            assump.pop();
            r?;
            t01[i] = ti;
            s01[i] = si;
        }
        self.combine_dec(&t01[0], &t01[1], &s01[0], &s01[1], truth, supp, var)
    }

    // ---- implementation of the chosen function ------------------------

    pub(crate) fn implement_simple(&mut self, truth: &[Word; WORD_MAX], supp: &[usize]) -> usize {
        if tt_is_const0(truth, WORD_MAX) || tt_is_const1(truth, WORD_MAX) {
            assert!(supp.is_empty());
            let g = if tt_is_const1(truth, WORD_MAX) { self.lib.const1 } else { self.lib.const0 };
            self.gates_win.push(Some(g));
            self.fanins_win.push(Vec::new());
            return 1;
        }
        assert_eq!(supp.len(), 1);
        let elem = [TRUTHS6[0]; WORD_MAX];
        let g = if tt_equal(truth, &elem, WORD_MAX) {
            self.lib.buf
        } else {
            assert!(crate::truth::tt_opposite(truth, &elem, WORD_MAX));
            self.lib.inv
        };
        self.gates_win.push(Some(g));
        self.fanins_win.push(vec![supp[0]]);
        1
    }

    pub(crate) fn implement_area_match(&mut self, rec_id: usize, supp: &[usize]) -> usize {
        let (bot, top, fans_b, fans_t) = {
            let r = self.mlib.rec(rec_id);
            (self.mlib.bot_gate(r), self.mlib.top_gate(r), r.fans_b, r.fans_t)
        };
        let bot_pins = self.lib.gate(bot).num_pins();
        let top_pins = top.map_or(0, |t| self.lib.gate(t).num_pins());
        self.implement_cover(bot, &fans_b[..bot_pins], top, &fans_t[..top_pins], supp)
    }

    pub(crate) fn implement_cover(
        &mut self,
        bot: GateId,
        fans_b: &[u8],
        top: Option<GateId>,
        fans_t: &[u8],
        supp: &[usize],
    ) -> usize {
        let fanins: Vec<usize> = fans_b.iter().map(|&k| supp[k as usize]).collect();
        self.gates_win.push(Some(bot));
        self.fanins_win.push(fanins);
        let top = match top {
            None => return 1,
            Some(t) => t,
        };
        let bot_pos = self.gates_win.len() - 1;
        let fanins: Vec<usize> = fans_t
            .iter()
            .map(|&k| {
                if k == crate::timing::FAN_FROM_BOTTOM {
                    bot_pos
                } else {
                    supp[k as usize]
                }
            })
            .collect();
        self.gates_win.push(Some(top));
        self.fanins_win.push(fanins);
        2
    }

    // ---- per-pivot drivers ---------------------------------------------

    /// Area-mode decomposition attempt; appends the replacement gates and
    /// returns their count.
    pub(crate) fn perform_dec_area(&mut self, pivot: NodeId) -> Option<usize> {
        assert!(self.pars.area);
        let ndecs = self.pars.dec_max.clamp(1, DEC_MAX);
        self.setup_sim_info(pivot);
        self.obj_dec.clear();
        let mut prev = 0;
        let mut best: Option<(i32, usize, Vec<usize>)> = None;
        for _ in 0..ndecs {
            if self.obj_dec.len() > prev {
                self.obj_dec.truncate(prev);
            }
            prev = self.obj_dec.len() + 1;
            let mut masks: Masks = [[0u64; SIM_WORDS]; 2];
            tt_mask(&mut masks[0], SIM_WORDS, self.npats[0]);
            tt_mask(&mut masks[1], SIM_WORDS, self.npats[1]);
            let mut truth = [0u64; WORD_MAX];
            let mut supp: Vec<usize> = Vec::new();
            let mut assump: Vec<Lit> = Vec::new();
            let nsupp =
                match self.perform_dec_rec(&mut truth, &mut supp, &mut assump, &mut masks, true, 0)
                {
                    None => continue,
                    Some(n) => n,
                };
            if nsupp < 2 {
                let ret = self.implement_simple(&truth, &supp);
                self.stats.lucky_sizes[nsupp] += 1;
                self.stats.lucky_gates[ret] += 1;
                return Some(ret);
            }
            let (area_new, rec) = match self.mlib.find_area_match(&truth) {
                None => continue,
                Some(m) => m,
            };
            let cut: Vec<NodeId> = supp.iter().map(|&k| self.map[k]).collect();
            let (area_this, _) = self.ntk.mffc_area(self.lib, pivot, &cut);
            assert!(self.area_mffc <= area_this);
            let rejected =
                if self.pars.zero_cost { area_new > area_this } else { area_new >= area_this };
            if rejected {
                continue;
            }
            let gain = area_this - area_new;
            if best.as_ref().map_or(true, |b| b.0 < gain) {
                best = Some((gain, rec, supp));
            }
        }
        self.setdown_sim_info();
        let (_, rec, supp) = match best {
            None => {
                self.stats.no_dec += 1;
                return None;
            }
            Some(b) => b,
        };
        let ret = self.implement_area_match(rec, &supp);
        self.stats.lucky_sizes[supp.len()] += 1;
        self.stats.lucky_gates[ret] += 1;
        Some(ret)
    }

    /// Delay-mode decomposition attempt over the Pareto matches.
    pub(crate) fn perform_dec_delay(&mut self, pivot: NodeId) -> Option<usize> {
        assert!(!self.pars.area);
        let ndecs = self.pars.dec_max.clamp(1, DEC_MAX);
        self.delay_min = 0;
        self.setup_sim_info(pivot);
        self.obj_dec.clear();
        let mut prev = 0;
        struct Best {
            arrival: i32,
            bot: GateId,
            fans_b: [u8; SUPP_MAX],
            top: Option<GateId>,
            fans_t: [u8; SUPP_MAX],
            supp: Vec<usize>,
        }
        let mut best: Option<Best> = None;
        let delay_orig = self.tim.as_ref().unwrap().arrival(pivot);
        for _ in 0..ndecs {
            if self.obj_dec.len() > prev {
                self.obj_dec.truncate(prev);
            }
            prev = self.obj_dec.len() + 1;
            let mut masks: Masks = [[0u64; SIM_WORDS]; 2];
            tt_mask(&mut masks[0], SIM_WORDS, self.npats[0]);
            tt_mask(&mut masks[1], SIM_WORDS, self.npats[1]);
            let mut truth = [0u64; WORD_MAX];
            let mut supp: Vec<usize> = Vec::new();
            let mut assump: Vec<Lit> = Vec::new();
            let nsupp =
                match self.perform_dec_rec(&mut truth, &mut supp, &mut assump, &mut masks, true, 0)
                {
                    None => continue,
                    Some(n) => n,
                };
            // a lone inverter rarely helps the critical path
            let inv_tt = [!TRUTHS6[0]; WORD_MAX];
            if nsupp == 1 && tt_equal(&truth, &inv_tt, WORD_MAX) {
                if self.pars.load_aware {
                    continue;
                }
                let arr = self.tim.as_ref().unwrap().arrival(self.map[supp[0]]);
                if delay_orig <= self.inv_delay + arr {
                    continue;
                }
            }
            if nsupp < 2 {
                let ret = self.implement_simple(&truth, &supp);
                self.stats.lucky_sizes[nsupp] += 1;
                self.stats.lucky_gates[ret] += 1;
                return Some(ret);
            }
            let cut: Vec<NodeId> = supp.iter().map(|&k| self.map[k]).collect();
            let (area_mffc_real, members) = self.ntk.mffc_area(self.lib, pivot, &cut);
            self.gate_mffc = members;
            let matches = self.mlib.find_delay_matches(&truth);
            for rec_id in matches {
                let (bot, top, fans_b, fans_t, area_new) = {
                    let r = self.mlib.rec(rec_id);
                    (self.mlib.bot_gate(r), self.mlib.top_gate(r), r.fans_b, r.fans_t, r.area)
                };
                let bot_pins = self.lib.gate(bot).num_pins();
                let top_pins = top.map_or(0, |t| self.lib.gate(t).num_pins());
                let t0 = Instant::now();
                let arrival = self.tim.as_ref().unwrap().eval_remapping(
                    self.lib,
                    &supp,
                    &self.map,
                    bot,
                    &fans_b[..bot_pins],
                    top,
                    &fans_t[..top_pins],
                );
                self.stats.t_eval += t0.elapsed();
                let improvement = delay_orig - arrival;
                if improvement < self.delta_crit {
                    continue;
                }
                if self.pars.del_area_ratio > 0
                    && area_new > area_mffc_real
                    && improvement / (area_new - area_mffc_real) < self.pars.del_area_ratio
                {
                    continue;
                }
                if best.as_ref().map_or(true, |b| arrival < b.arrival) {
                    best = Some(Best {
                        arrival,
                        bot,
                        fans_b,
                        top,
                        fans_t,
                        supp: supp.clone(),
                    });
                }
            }
        }
        self.setdown_sim_info();
        let b = match best {
            None => {
                self.stats.no_dec += 1;
                return None;
            }
            Some(b) => b,
        };
        let bot_pins = self.lib.gate(b.bot).num_pins();
        let top_pins = b.top.map_or(0, |t| self.lib.gate(t).num_pins());
        let ret =
            self.implement_cover(b.bot, &b.fans_b[..bot_pins], b.top, &b.fans_t[..top_pins], &b.supp);
        self.stats.lucky_sizes[b.supp.len()] += 1;
        self.stats.lucky_gates[ret] += 1;
        self.delay_min = b.arrival;
        Some(ret)
    }
}
