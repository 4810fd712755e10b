//! Embedded CDCL solver with assumptions, per-call conflict budgets, and
//! final-conflict extraction — the three capabilities the don't-care
//! engine leans on. Two watched literals, first-UIP learning, activity
//! ordered decisions with phase saving.

pub type Lit = u32;

#[inline]
pub fn lit(var: usize, compl: bool) -> Lit {
    ((var as u32) << 1) | compl as u32
}

#[inline]
pub fn lit_var(l: Lit) -> usize {
    (l >> 1) as usize
}

#[inline]
pub fn lit_is_compl(l: Lit) -> bool {
    l & 1 == 1
}

#[inline]
pub fn lit_not(l: Lit) -> Lit {
    l ^ 1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SatResult {
    Sat,
    Unsat,
    Undec,
}

const VAL_FALSE: u8 = 0;
const VAL_TRUE: u8 = 1;
const VAL_UNDEF: u8 = 2;
const NO_REASON: u32 = u32::MAX;

struct Clause {
    lits: Vec<Lit>,
}

pub struct SatSolver {
    clauses: Vec<Clause>,
    watches: Vec<Vec<u32>>,
    values: Vec<u8>,
    levels: Vec<u32>,
    reasons: Vec<u32>,
    polarity: Vec<bool>,
    activity: Vec<f64>,
    var_inc: f64,
    trail: Vec<Lit>,
    trail_lim: Vec<usize>,
    qhead: usize,
    seen: Vec<bool>,
    model: Vec<u8>,
    final_conflict: Vec<Lit>,
    ok: bool,
    /// Conflicts over the lifetime of this instance.
    pub num_conflicts: u64,
}

impl Default for SatSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl SatSolver {
    pub fn new() -> Self {
        SatSolver {
            clauses: Vec::new(),
            watches: Vec::new(),
            values: Vec::new(),
            levels: Vec::new(),
            reasons: Vec::new(),
            polarity: Vec::new(),
            activity: Vec::new(),
            var_inc: 1.0,
            trail: Vec::new(),
            trail_lim: Vec::new(),
            qhead: 0,
            seen: Vec::new(),
            model: Vec::new(),
            final_conflict: Vec::new(),
            ok: true,
            num_conflicts: 0,
        }
    }

    /// Discard all clauses (learnt ones included) and assignments; variable
    /// indices are reassigned by the next `set_num_vars`.
    pub fn restart(&mut self) {
        self.clauses.clear();
        self.watches.clear();
        self.values.clear();
        self.levels.clear();
        self.reasons.clear();
        self.polarity.clear();
        self.activity.clear();
        self.var_inc = 1.0;
        self.trail.clear();
        self.trail_lim.clear();
        self.qhead = 0;
        self.seen.clear();
        self.model.clear();
        self.final_conflict.clear();
        self.ok = true;
    }

    pub fn num_vars(&self) -> usize {
        self.values.len()
    }

    pub fn set_num_vars(&mut self, n: usize) {
        while self.values.len() < n {
            self.values.push(VAL_UNDEF);
            self.levels.push(0);
            self.reasons.push(NO_REASON);
            self.polarity.push(false);
            self.activity.push(0.0);
            self.seen.push(false);
            self.model.push(VAL_UNDEF);
            self.watches.push(Vec::new());
            self.watches.push(Vec::new());
        }
    }

    /// Fresh variable, returning its index.
    pub fn add_var(&mut self) -> usize {
        let v = self.values.len();
        self.set_num_vars(v + 1);
        v
    }

    #[inline]
    fn lit_value(&self, l: Lit) -> u8 {
        let v = self.values[lit_var(l)];
        if v == VAL_UNDEF { VAL_UNDEF } else { v ^ (l & 1) as u8 }
    }

    fn decision_level(&self) -> usize {
        self.trail_lim.len()
    }

    fn enqueue(&mut self, l: Lit, reason: u32) -> bool {
        if self.lit_value(l) != VAL_UNDEF {
            return self.lit_value(l) == VAL_TRUE;
        }
        let v = lit_var(l);
        self.values[v] = (l & 1) as u8 ^ 1;
        self.levels[v] = self.decision_level() as u32;
        self.reasons[v] = reason;
        self.trail.push(l);
        true
    }

    fn propagate(&mut self) -> Option<u32> {
        while self.qhead < self.trail.len() {
            let p = self.trail[self.qhead];
            self.qhead += 1;
            let false_lit = lit_not(p);
            let mut ws = std::mem::take(&mut self.watches[false_lit as usize]);
            let mut i = 0;
            'clauses: while i < ws.len() {
                let ci = ws[i] as usize;
                if self.clauses[ci].lits[0] == false_lit {
                    self.clauses[ci].lits.swap(0, 1);
                }
                let first = self.clauses[ci].lits[0];
                if self.lit_value(first) == VAL_TRUE {
                    i += 1;
                    continue;
                }
                let len = self.clauses[ci].lits.len();
                for k in 2..len {
                    let lk = self.clauses[ci].lits[k];
                    if self.lit_value(lk) != VAL_FALSE {
                        self.clauses[ci].lits.swap(1, k);
                        self.watches[lk as usize].push(ci as u32);
                        ws.swap_remove(i);
                        continue 'clauses;
                    }
                }
                if self.lit_value(first) == VAL_FALSE {
                    self.watches[false_lit as usize] = ws;
                    self.qhead = self.trail.len();
                    return Some(ci as u32);
                }
                self.enqueue(first, ci as u32);
                i += 1;
            }
            self.watches[false_lit as usize] = ws;
        }
        None
    }

    fn cancel_until(&mut self, level: usize) {
        if self.trail_lim.len() <= level {
            return;
        }
        let bound = self.trail_lim[level];
        for &l in &self.trail[bound..] {
            let v = lit_var(l);
            self.values[v] = VAL_UNDEF;
            self.polarity[v] = lit_is_compl(l);
            self.reasons[v] = NO_REASON;
        }
        self.trail.truncate(bound);
        self.trail_lim.truncate(level);
        self.qhead = bound;
    }

    fn bump(&mut self, v: usize) {
        self.activity[v] += self.var_inc;
        if self.activity[v] > 1e100 {
            for a in self.activity.iter_mut() {
                *a *= 1e-100;
            }
            self.var_inc *= 1e-100;
        }
    }

    fn decay(&mut self) {
        self.var_inc /= 0.95;
    }

    fn analyze(&mut self, confl: u32) -> (Vec<Lit>, usize) {
        let mut learnt: Vec<Lit> = vec![0];
        let mut counter = 0usize;
        let mut p: Lit = 0;
        let mut p_set = false;
        let mut index = self.trail.len();
        let mut confl = confl as usize;
        loop {
            let start = usize::from(p_set);
            for k in start..self.clauses[confl].lits.len() {
                let q = self.clauses[confl].lits[k];
                let v = lit_var(q);
                if !self.seen[v] && self.levels[v] > 0 {
                    self.seen[v] = true;
                    self.bump(v);
                    if self.levels[v] as usize >= self.decision_level() {
                        counter += 1;
                    } else {
                        learnt.push(q);
                    }
                }
            }
            loop {
                index -= 1;
                if self.seen[lit_var(self.trail[index])] {
                    break;
                }
            }
            p = self.trail[index];
            p_set = true;
            let v = lit_var(p);
            self.seen[v] = false;
            counter -= 1;
            if counter == 0 {
                break;
            }
            confl = self.reasons[v] as usize;
        }
        learnt[0] = lit_not(p);
        let bt = if learnt.len() == 1 {
            0
        } else {
            let mut max_i = 1;
            for i in 2..learnt.len() {
                if self.levels[lit_var(learnt[i])] > self.levels[lit_var(learnt[max_i])] {
                    max_i = i;
                }
            }
            learnt.swap(1, max_i);
            self.levels[lit_var(learnt[1])] as usize
        };
        for &l in &learnt[1..] {
            self.seen[lit_var(l)] = false;
        }
        (learnt, bt)
    }

    fn analyze_final(&mut self, p: Lit) {
        self.final_conflict.clear();
        self.final_conflict.push(lit_not(p));
        if self.decision_level() == 0 {
            return;
        }
        let v0 = lit_var(p);
        self.seen[v0] = true;
        let start = self.trail_lim[0];
        for i in (start..self.trail.len()).rev() {
            let x = lit_var(self.trail[i]);
            if !self.seen[x] {
                continue;
            }
            if self.reasons[x] == NO_REASON {
                assert!(self.levels[x] > 0);
                self.final_conflict.push(lit_not(self.trail[i]));
            } else {
                let ci = self.reasons[x] as usize;
                for k in 1..self.clauses[ci].lits.len() {
                    let q = self.clauses[ci].lits[k];
                    if self.levels[lit_var(q)] > 0 {
                        self.seen[lit_var(q)] = true;
                    }
                }
            }
            self.seen[x] = false;
        }
        self.seen[v0] = false;
    }

    /// Add a clause; returns false when the instance became trivially
    /// unsatisfiable. Must be called outside of a solve.
    pub fn add_clause(&mut self, lits: &[Lit]) -> bool {
        assert_eq!(self.decision_level(), 0, "clauses are added at the root level");
        if !self.ok {
            return false;
        }
        let mut sorted: Vec<Lit> = lits.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        let mut out: Vec<Lit> = Vec::with_capacity(sorted.len());
        let mut prev: Option<Lit> = None;
        for &l in &sorted {
            assert!(lit_var(l) < self.num_vars());
            if prev == Some(lit_not(l)) {
                return true; // tautology
            }
            match self.lit_value(l) {
                VAL_TRUE => return true,
                VAL_FALSE => {} // falsified at the root level
                _ => out.push(l),
            }
            prev = Some(l);
        }
        if out.is_empty() {
            self.ok = false;
            return false;
        }
        if out.len() == 1 {
            if !self.enqueue(out[0], NO_REASON) || self.propagate().is_some() {
                self.ok = false;
                return false;
            }
            return true;
        }
        let ci = self.clauses.len() as u32;
        self.watches[out[0] as usize].push(ci);
        self.watches[out[1] as usize].push(ci);
        self.clauses.push(Clause { lits: out });
        true
    }

    /// Gadget `a = b ^ c` over variables.
    pub fn add_xor(&mut self, var_a: usize, var_b: usize, var_c: usize) -> bool {
        let (a, b, c) = (lit(var_a, false), lit(var_b, false), lit(var_c, false));
        self.add_clause(&[lit_not(a), b, c])
            && self.add_clause(&[lit_not(a), lit_not(b), lit_not(c)])
            && self.add_clause(&[a, lit_not(b), c])
            && self.add_clause(&[a, b, lit_not(c)])
    }

    fn pick_branch(&mut self) -> Option<Lit> {
        let mut best: Option<usize> = None;
        for v in 0..self.values.len() {
            if self.values[v] == VAL_UNDEF
                && best.map_or(true, |b| self.activity[v] > self.activity[b])
            {
                best = Some(v);
            }
        }
        best.map(|v| lit(v, self.polarity[v]))
    }

    /// Solve under the given assumptions with a conflict budget
    /// (0 = unlimited). Always returns at the root level; on Sat the model
    /// is kept, on Unsat the final conflict (negations of the failed
    /// assumptions) is kept.
    pub fn solve(&mut self, assumps: &[Lit], budget: u64) -> SatResult {
        self.final_conflict.clear();
        if !self.ok {
            return SatResult::Unsat;
        }
        assert_eq!(self.decision_level(), 0);
        let mut nconfl: u64 = 0;
        loop {
            match self.propagate() {
                Some(confl) => {
                    nconfl += 1;
                    self.num_conflicts += 1;
                    if self.decision_level() == 0 {
                        self.ok = false;
                        return SatResult::Unsat;
                    }
                    if budget > 0 && nconfl >= budget {
                        self.cancel_until(0);
                        return SatResult::Undec;
                    }
                    let (learnt, bt) = self.analyze(confl);
                    self.cancel_until(bt);
                    if learnt.len() == 1 {
                        if !self.enqueue(learnt[0], NO_REASON) {
                            self.ok = false;
                            return SatResult::Unsat;
                        }
                    } else {
                        let ci = self.clauses.len() as u32;
                        self.watches[learnt[0] as usize].push(ci);
                        self.watches[learnt[1] as usize].push(ci);
                        let asserting = learnt[0];
                        self.clauses.push(Clause { lits: learnt });
                        self.enqueue(asserting, ci);
                    }
                    self.decay();
                }
                None => {
                    if self.decision_level() < assumps.len() {
                        let p = assumps[self.decision_level()];
                        match self.lit_value(p) {
                            VAL_TRUE => self.trail_lim.push(self.trail.len()),
                            VAL_FALSE => {
                                self.analyze_final(p);
                                self.cancel_until(0);
                                return SatResult::Unsat;
                            }
                            _ => {
                                self.trail_lim.push(self.trail.len());
                                let accepted = self.enqueue(p, NO_REASON);
                                debug_assert!(accepted);
                            }
                        }
                    } else {
                        match self.pick_branch() {
                            None => {
                                self.model = self.values.clone();
                                self.cancel_until(0);
                                return SatResult::Sat;
                            }
                            Some(l) => {
                                self.trail_lim.push(self.trail.len());
                                self.enqueue(l, NO_REASON);
                            }
                        }
                    }
                }
            }
        }
    }

    /// Model value of a variable after a Sat answer.
    pub fn var_value(&self, v: usize) -> bool {
        self.model[v] == VAL_TRUE
    }

    /// The literal of `v` that holds in the model.
    pub fn model_literal(&self, v: usize) -> Lit {
        lit(v, self.model[v] != VAL_TRUE)
    }

    /// Negations of the assumptions responsible for the last Unsat answer.
    pub fn final_conflict(&self) -> &[Lit] {
        &self.final_conflict
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn l(v: usize) -> Lit {
        lit(v, false)
    }

    fn nl(v: usize) -> Lit {
        lit(v, true)
    }

    #[test]
    fn trivial_sat_and_unsat() {
        let mut s = SatSolver::new();
        s.set_num_vars(2);
        assert!(s.add_clause(&[l(0), l(1)]));
        assert!(s.add_clause(&[nl(0)]));
        assert_eq!(s.solve(&[], 0), SatResult::Sat);
        assert!(!s.var_value(0));
        assert!(s.var_value(1));
        assert!(s.add_clause(&[nl(1)]) == false || s.solve(&[], 0) == SatResult::Unsat);
    }

    #[test]
    fn all_sign_combinations_unsat() {
        let mut s = SatSolver::new();
        s.set_num_vars(2);
        for c in [
            [l(0), l(1)],
            [l(0), nl(1)],
            [nl(0), l(1)],
            [nl(0), nl(1)],
        ] {
            if !s.add_clause(&c) {
                break;
            }
        }
        assert_eq!(s.solve(&[], 0), SatResult::Unsat);
    }

    #[test]
    fn conflict_budget_yields_undec() {
        let mut s = SatSolver::new();
        s.set_num_vars(8);
        // xor chain: x0 ^ x1 = x2, x2 ^ x3 = x4, pinned inconsistent
        for c in [
            [l(0), l(1), nl(2)],
            [l(0), nl(1), l(2)],
            [nl(0), l(1), l(2)],
            [nl(0), nl(1), nl(2)],
            [l(2), l(3), nl(4)],
            [l(2), nl(3), l(4)],
            [nl(2), l(3), l(4)],
            [nl(2), nl(3), nl(4)],
        ] {
            assert!(s.add_clause(&c));
        }
        let r = s.solve(&[l(0), l(1), l(2)], 1);
        assert!(r == SatResult::Undec || r == SatResult::Unsat);
        if r == SatResult::Undec {
            // with a real budget the same query resolves
            assert_eq!(s.solve(&[l(0), l(1), l(2)], 0), SatResult::Unsat);
        }
    }

    #[test]
    fn assumptions_and_final_conflict() {
        let mut s = SatSolver::new();
        s.set_num_vars(4);
        // 0 -> 1, 1 -> 2, 2 -> !3
        assert!(s.add_clause(&[nl(0), l(1)]));
        assert!(s.add_clause(&[nl(1), l(2)]));
        assert!(s.add_clause(&[nl(2), nl(3)]));
        assert_eq!(s.solve(&[l(0), l(3)], 0), SatResult::Unsat);
        let fin = s.final_conflict().to_vec();
        // the conflict clause names only failed assumptions, negated
        assert!(!fin.is_empty());
        for &f in &fin {
            assert!(f == nl(0) || f == nl(3));
        }
        // both assumptions participate
        assert_eq!(fin.len(), 2);
        // dropping either assumption is satisfiable again
        assert_eq!(s.solve(&[l(0)], 0), SatResult::Sat);
        assert!(s.var_value(1) && s.var_value(2) && !s.var_value(3));
        assert_eq!(s.solve(&[l(3)], 0), SatResult::Sat);
    }

    #[test]
    fn xor_gadget() {
        let mut s = SatSolver::new();
        s.set_num_vars(3);
        assert!(s.add_xor(0, 1, 2));
        for (b, c) in [(false, false), (false, true), (true, false), (true, true)] {
            let r = s.solve(&[lit(1, !b), lit(2, !c)], 0);
            assert_eq!(r, SatResult::Sat);
            assert_eq!(s.var_value(0), b ^ c);
        }
    }

    #[test]
    fn restart_clears_state() {
        let mut s = SatSolver::new();
        s.set_num_vars(1);
        assert!(s.add_clause(&[l(0)]));
        assert_eq!(s.solve(&[nl(0)], 0), SatResult::Unsat);
        s.restart();
        assert_eq!(s.num_vars(), 0);
        s.set_num_vars(1);
        assert!(s.add_clause(&[nl(0)]));
        assert_eq!(s.solve(&[], 0), SatResult::Sat);
        assert!(!s.var_value(0));
    }

    #[test]
    fn model_literals() {
        let mut s = SatSolver::new();
        s.set_num_vars(2);
        assert!(s.add_clause(&[l(0)]));
        assert!(s.add_clause(&[nl(1)]));
        assert_eq!(s.solve(&[], 0), SatResult::Sat);
        assert_eq!(s.model_literal(0), l(0));
        assert_eq!(s.model_literal(1), nl(1));
    }
}
