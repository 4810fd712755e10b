//! Per-node resynthesis driver: windows, SAT instances, decompositions,
//! and network splicing for the area and delay passes.

use crate::library::{GateId, Library};
use crate::libmatch::MatchLib;
use crate::network::{MappedNetwork, NodeId};
use crate::sat::SatSolver;
use crate::timing::{flt2int, int2flt, LoadTiming, PathTiming, Timing};
use crate::truth::{Word, SUPP_MAX};
use crate::window::MARK_PIVOT;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use std::time::{Duration, Instant};
use tracing::debug;

/// Bound on assumption stacks inside one window.
pub const WIN_MAX: usize = 1000;
/// Distinct decompositions tried per window.
pub const DEC_MAX: usize = 4;

#[derive(Debug, Clone)]
pub struct OptParams {
    /// TFO levels explored above the pivot.
    pub tfo_lev_max: i32,
    /// TFI levels explored below the pivot.
    pub tfi_lev_max: i32,
    /// Fanout cap during TFO exploration.
    pub fanout_max: usize,
    /// MFFC bounds for a pivot to be tried.
    pub mffc_min: usize,
    pub mffc_max: usize,
    /// Largest replacement support (at most 6).
    pub var_max: usize,
    /// Decompositions tried per window.
    pub dec_max: usize,
    /// Window size cap; 0 disables the check.
    pub win_size_max: usize,
    /// Allowed growth of the window level bound.
    pub growth_level: i32,
    /// Conflict budget per SAT call; 0 = unlimited.
    pub bt_limit: u64,
    /// Timing window, in percent of the clock period.
    pub time_win: usize,
    /// Critical delay delta in scaled picoseconds; 0 picks the default
    /// derived from the inverter delay.
    pub delta_crit: i32,
    /// Delay/area trade-off threshold; 0 disables it (delay mode only).
    pub del_area_ratio: i32,
    /// Changed-node budget; 0 = unlimited.
    pub nodes_max: usize,
    /// Detect multi-input AND/OR gates from joint implications.
    pub use_and_or: bool,
    /// Accept zero-gain replacements in area mode.
    pub zero_cost: bool,
    /// Retry failed windows forcing each MFFC-input divisor first.
    pub more_effort: bool,
    /// Seed pattern sets from 64-pattern simulation.
    pub use_sim: bool,
    /// Area mode (delay mode otherwise).
    pub area: bool,
    /// BFS-from-outputs variant of the area pass.
    pub area_rev: bool,
    /// Run the fanin-removal resubstitution pass before decomposing.
    pub resub_first: bool,
    /// Use the load-aware timing implementation.
    pub load_aware: bool,
    pub verbose: bool,
}

impl Default for OptParams {
    fn default() -> Self {
        OptParams {
            tfo_lev_max: 100,
            tfi_lev_max: 100,
            fanout_max: 10,
            mffc_min: 1,
            mffc_max: 3,
            var_max: 6,
            dec_max: 1,
            win_size_max: 0,
            growth_level: 0,
            bt_limit: 0,
            time_win: 1,
            delta_crit: 0,
            del_area_ratio: 0,
            nodes_max: 0,
            use_and_or: false,
            zero_cost: false,
            more_effort: false,
            use_sim: false,
            area: false,
            area_rev: false,
            resub_first: false,
            load_aware: false,
            verbose: false,
        }
    }
}

#[derive(Default)]
pub struct OptStats {
    pub nodes_beg: usize,
    pub edges_beg: usize,
    pub nodes_end: usize,
    pub edges_end: usize,
    pub tried: usize,
    pub changed: usize,
    pub const0: usize,
    pub const1: usize,
    pub buf: usize,
    pub inv: usize,
    pub and_or: usize,
    pub resyn: usize,
    pub no_dec: usize,
    pub efforts: usize,
    pub removes: usize,
    pub try_removes: usize,
    pub resubs: usize,
    pub try_resubs: usize,
    pub sat_calls: usize,
    pub sat_sat: usize,
    pub sat_unsat: usize,
    pub sat_over: usize,
    pub timeouts: usize,
    pub max_divs: usize,
    pub max_win: usize,
    pub all_divs: u64,
    pub all_win: u64,
    pub lucky_sizes: [usize; SUPP_MAX + 1],
    pub lucky_gates: [usize; SUPP_MAX + 1],
    pub t_lib: Duration,
    pub t_win: Duration,
    pub t_cnf: Duration,
    pub t_sat_sat: Duration,
    pub t_sat_unsat: Duration,
    pub t_eval: Duration,
    pub t_timing: Duration,
    pub t_total: Duration,
}

impl OptStats {
    pub fn summary(&self) -> serde_json::Value {
        let avg = |total: u64| total / self.tried.max(1) as u64;
        json!({
            "tried": self.tried,
            "changed": self.changed,
            "const0": self.const0,
            "const1": self.const1,
            "buf": self.buf,
            "inv": self.inv,
            "and_or": self.and_or,
            "general": self.resyn,
            "no_dec": self.no_dec,
            "efforts": self.efforts,
            "removes": self.removes,
            "resubs": self.resubs,
            "sat_calls": self.sat_calls,
            "sat_sat": self.sat_sat,
            "sat_unsat": self.sat_unsat,
            "sat_over": self.sat_over,
            "timeouts": self.timeouts,
            "max_divs": self.max_divs,
            "max_win": self.max_win,
            "avg_divs": avg(self.all_divs),
            "avg_win": avg(self.all_win),
            "lucky_sizes": self.lucky_sizes.to_vec(),
            "lucky_gates": self.lucky_gates.to_vec(),
            "nodes": { "begin": self.nodes_beg, "end": self.nodes_end },
            "edges": { "begin": self.edges_beg, "end": self.edges_end },
            "time": {
                "lib": self.t_lib.as_secs_f64(),
                "win": self.t_win.as_secs_f64(),
                "cnf": self.t_cnf.as_secs_f64(),
                "sat_sat": self.t_sat_sat.as_secs_f64(),
                "sat_unsat": self.t_sat_unsat.as_secs_f64(),
                "eval": self.t_eval.as_secs_f64(),
                "timing": self.t_timing.as_secs_f64(),
                "total": self.t_total.as_secs_f64(),
            },
        })
    }
}

impl std::fmt::Display for OptStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Try = {}. Change = {}. Const0 = {}. Const1 = {}. Buf = {}. Inv = {}. AndOr = {}. Gate = {}. Effort = {}. NoDec = {}.",
            self.tried, self.changed, self.const0, self.const1, self.buf, self.inv,
            self.and_or, self.resyn, self.efforts, self.no_dec
        )?;
        writeln!(
            f,
            "MaxDiv = {}. MaxWin = {}. AveDiv = {}. AveWin = {}. Calls = {} (Sat = {}. Unsat = {}.) Over = {}. T/O = {}.",
            self.max_divs,
            self.max_win,
            self.all_divs / self.tried.max(1) as u64,
            self.all_win / self.tried.max(1) as u64,
            self.sat_calls,
            self.sat_sat,
            self.sat_unsat,
            self.sat_over,
            self.timeouts
        )?;
        write!(f, "Cone sizes: ")?;
        for (i, &n) in self.lucky_sizes.iter().enumerate() {
            if n > 0 {
                write!(f, "{}={} ", i, n)?;
            }
        }
        write!(f, "  Gate sizes: ")?;
        for (i, &n) in self.lucky_gates.iter().enumerate() {
            if n > 0 {
                write!(f, "{}={} ", i, n)?;
            }
        }
        writeln!(f)?;
        writeln!(
            f,
            "Nodes {} -> {}. Edges {} -> {}.",
            self.nodes_beg, self.nodes_end, self.edges_beg, self.edges_end
        )
    }
}

pub struct Optimizer<'a> {
    pub pars: OptParams,
    pub lib: &'a Library,
    pub(crate) mlib: MatchLib,
    pub(crate) tim: Option<Box<dyn Timing>>,
    pub ntk: MappedNetwork,
    pub(crate) delta_crit: i32,
    pub(crate) inv_delay: i32,
    // window state
    pub roots: Vec<usize>,
    pub gates_win: Vec<Option<GateId>>,
    pub fanins_win: Vec<Vec<usize>>,
    pub map: Vec<NodeId>,
    pub tfi: Vec<NodeId>,
    pub tfo: Vec<NodeId>,
    pub mffc: Vec<NodeId>,
    pub in_mffc: Vec<usize>,
    pub ndivs: usize,
    pub nmffc: usize,
    pub(crate) area_mffc: i32,
    pub itarget: usize,
    pub(crate) use_this: Option<usize>,
    pub care_set: Word,
    pub sims: Vec<Word>,
    pub sims2: Vec<Word>,
    // solver state
    pub(crate) sat: SatSolver,
    pub(crate) clauses: Vec<Vec<crate::sat::Lit>>,
    pub(crate) impl_lits: [Vec<crate::sat::Lit>; 2],
    pub(crate) sets: [Vec<Word>; 2],
    pub(crate) npats: [usize; 2],
    pub(crate) npat_words: [usize; 2],
    pub(crate) div_words: usize,
    pub(crate) div_impl_cache: Vec<Vec<Word>>,
    pub(crate) div_cexes: Vec<Word>,
    pub(crate) ncexes: usize,
    pub(crate) obj_dec: Vec<usize>,
    pub(crate) new_nodes: Vec<NodeId>,
    pub(crate) gate_mffc: Vec<NodeId>,
    pub(crate) delay_min: i32,
    tried: Vec<bool>,
    pub stats: OptStats,
}

impl<'a> Optimizer<'a> {
    pub fn new(lib: &'a Library, ntk: MappedNetwork, pars: OptParams) -> Self {
        let t0 = Instant::now();
        assert!(pars.var_max >= 2 && pars.var_max <= 6);
        let mlib = MatchLib::prepare(lib, pars.var_max, true, !pars.area);
        let t_lib = t0.elapsed();
        let inv_delay = flt2int(lib.inv_delay());
        let delta_crit = if pars.delta_crit > 0 { pars.delta_crit } else { 5 * inv_delay / 2 };
        let tim: Option<Box<dyn Timing>> = if pars.area {
            None
        } else if pars.load_aware {
            Some(Box::new(LoadTiming::new(lib, &ntk, delta_crit)))
        } else {
            Some(Box::new(PathTiming::new(lib, &ntk, delta_crit)))
        };
        let mut stats = OptStats::default();
        stats.t_lib = t_lib;
        Optimizer {
            pars,
            lib,
            mlib,
            tim,
            ntk,
            delta_crit,
            inv_delay,
            roots: Vec::new(),
            gates_win: Vec::new(),
            fanins_win: Vec::new(),
            map: Vec::new(),
            tfi: Vec::new(),
            tfo: Vec::new(),
            mffc: Vec::new(),
            in_mffc: Vec::new(),
            ndivs: 0,
            nmffc: 0,
            area_mffc: 0,
            itarget: 0,
            use_this: None,
            care_set: 0,
            sims: Vec::new(),
            sims2: Vec::new(),
            sat: SatSolver::new(),
            clauses: Vec::new(),
            impl_lits: [Vec::new(), Vec::new()],
            sets: [Vec::new(), Vec::new()],
            npats: [0, 0],
            npat_words: [0, 0],
            div_words: 0,
            div_impl_cache: vec![Vec::new(); SUPP_MAX + 1],
            div_cexes: Vec::new(),
            ncexes: 0,
            obj_dec: Vec::new(),
            new_nodes: Vec::new(),
            gate_mffc: Vec::new(),
            delay_min: 0,
            tried: Vec::new(),
            stats,
        }
    }

    /// Run the configured pass; returns the number of changed nodes.
    pub fn run(&mut self) -> usize {
        let t0 = Instant::now();
        if self.pars.use_sim {
            self.simulate_network();
        }
        self.stats.nodes_beg = self.ntk.node_num();
        self.stats.edges_beg = self.ntk.edge_num();
        if self.pars.area {
            if self.pars.resub_first {
                self.resub_pass();
            }
            if self.pars.area_rev {
                self.area_opt_rev();
            } else {
                self.area_opt();
            }
        } else {
            self.delay_opt();
        }
        self.stats.nodes_end = self.ntk.node_num();
        self.stats.edges_end = self.ntk.edge_num();
        self.stats.t_total += t0.elapsed();
        if self.pars.verbose {
            eprint!("{}", self.stats);
            if !self.pars.area {
                eprint!("{}", self.mlib.print_summary(self.lib));
            }
        }
        self.stats.changed
    }

    fn budget_left(&self) -> bool {
        self.pars.nodes_max == 0 || self.stats.changed < self.pars.nodes_max
    }

    fn area_opt(&mut self) {
        let nstop = self.ntk.objs.len();
        for raw in 0..nstop {
            if !self.budget_left() {
                break;
            }
            self.area_opt_one(NodeId::from(raw));
        }
    }

    /// BFS from the outputs toward the inputs, requeueing replacements.
    fn area_opt_rev(&mut self) {
        let nstop = self.ntk.objs.len();
        let mut marked = vec![false; nstop];
        let mut front: Vec<NodeId> = Vec::new();
        for &po in &self.ntk.pos.clone() {
            let root = self.ntk.obj(po).fanins[0];
            if self.ntk.is_node(root) && !marked[root.raw()] {
                marked[root.raw()] = true;
                front.push(root);
            }
        }
        let mut i = 0;
        while i < front.len() {
            let id = front[i];
            i += 1;
            if !self.budget_left() {
                break;
            }
            if !self.ntk.obj(id).valid {
                continue;
            }
            let mut next = id;
            if let Some(n) = self.area_opt_one(id) {
                if !self.ntk.is_node(n) || self.ntk.fanin_num(n) == 0 {
                    continue;
                }
                if n.raw() < nstop {
                    if !marked[n.raw()] {
                        marked[n.raw()] = true;
                        front.push(n);
                    }
                    continue;
                }
                next = n;
            }
            if !self.ntk.obj(next).valid {
                continue;
            }
            for f in self.ntk.obj(next).fanins.clone() {
                if self.ntk.is_node(f) && f.raw() < nstop && !marked[f.raw()] {
                    marked[f.raw()] = true;
                    front.push(f);
                }
            }
        }
    }

    pub(crate) fn area_opt_one(&mut self, id: NodeId) -> Option<NodeId> {
        if !self.ntk.obj(id).valid || !self.ntk.is_node(id) || self.ntk.obj(id).fixed {
            return None;
        }
        if self.ntk.fanin_num(id) > SUPP_MAX {
            return None;
        }
        if self.pars.mffc_min > 1 && self.ntk.mffc_size(id) < self.pars.mffc_min {
            return None;
        }
        self.stats.tried += 1;
        let t0 = Instant::now();
        let ndivs = self.extract_window(id);
        self.stats.t_win += t0.elapsed();
        if self.pars.win_size_max > 0 && self.gates_win.len() > self.pars.win_size_max {
            return None;
        }
        self.ndivs = ndivs;
        self.nmffc = self.mffc.len();
        self.area_mffc = self
            .mffc
            .iter()
            .map(|&n| flt2int(self.lib.gate(self.ntk.obj(n).gate.unwrap()).area))
            .sum();
        self.stats.max_divs = self.stats.max_divs.max(ndivs);
        self.stats.all_divs += ndivs as u64;
        let limit = self.gates_win.len();
        self.stats.max_win = self.stats.max_win.max(limit);
        self.stats.all_win += limit as u64;
        let t0 = Instant::now();
        let ok = self.prepare_solver();
        self.stats.t_cnf += t0.elapsed();
        if !ok {
            return None;
        }
        let mut result = self.perform_dec_area(id);
        if self.pars.more_effort && result.is_none() {
            for k in (0..self.in_mffc.len()).rev() {
                self.use_this = Some(self.in_mffc[k]);
                result = self.perform_dec_area(id);
                self.use_this = None;
                if result.is_some() {
                    self.stats.efforts += 1;
                    break;
                }
            }
        }
        result?;
        self.stats.changed += 1;
        self.count_stats(limit);
        Some(self.insert(id, limit, false))
    }

    fn delay_opt(&mut self) {
        assert!(self.tim.is_some(), "delay mode needs a timing facade");
        self.tried = vec![false; self.ntk.objs.len()];
        let mut cands: Vec<NodeId> = Vec::new();
        loop {
            if !self.budget_left() {
                break;
            }
            let more = {
                let tim = self.tim.as_mut().unwrap();
                tim.priority_nodes(&self.ntk, &mut cands, self.pars.time_win, &self.tried)
            };
            if !more {
                break;
            }
            let mut committed = false;
            for &pivot in &cands {
                if self.tried.len() < self.ntk.objs.len() {
                    self.tried.resize(self.ntk.objs.len(), false);
                }
                if !self.ntk.obj(pivot).valid || self.ntk.fanin_num(pivot) > SUPP_MAX {
                    self.tried[pivot.raw()] = true;
                    continue;
                }
                self.stats.tried += 1;
                let delay_old = self.tim.as_ref().unwrap().arrival(pivot);
                let t0 = Instant::now();
                let ndivs = self.extract_window(pivot);
                self.stats.t_win += t0.elapsed();
                if ndivs < 2
                    || (self.pars.win_size_max > 0 && self.gates_win.len() > self.pars.win_size_max)
                {
                    self.tried[pivot.raw()] = true;
                    continue;
                }
                self.ndivs = ndivs;
                self.nmffc = self.mffc.len();
                self.area_mffc = self
                    .mffc
                    .iter()
                    .map(|&n| flt2int(self.lib.gate(self.ntk.obj(n).gate.unwrap()).area))
                    .sum();
                self.stats.max_divs = self.stats.max_divs.max(ndivs);
                self.stats.all_divs += ndivs as u64;
                let limit = self.gates_win.len();
                self.stats.max_win = self.stats.max_win.max(limit);
                self.stats.all_win += limit as u64;
                let t0 = Instant::now();
                let ok = self.prepare_solver();
                self.stats.t_cnf += t0.elapsed();
                if !ok {
                    self.tried[pivot.raw()] = true;
                    continue;
                }
                let mut result = self.perform_dec_delay(pivot);
                if self.pars.more_effort && result.is_none() {
                    for k in (0..self.in_mffc.len()).rev() {
                        self.use_this = Some(self.in_mffc[k]);
                        result = self.perform_dec_delay(pivot);
                        self.use_this = None;
                        if result.is_some() {
                            self.stats.efforts += 1;
                            break;
                        }
                    }
                }
                if result.is_none() {
                    self.tried[pivot.raw()] = true;
                    continue;
                }
                let added = self.gates_win.len() - limit;
                assert!(added >= 1 && added <= 2);
                self.stats.changed += 1;
                self.count_stats(limit);
                // unload the doomed cone, splice, and reload the new one
                let mffc = std::mem::take(&mut self.gate_mffc);
                if let Some(tim) = self.tim.as_mut() {
                    tim.update_load(&self.ntk, self.lib, &mffc, false);
                }
                self.gate_mffc = mffc;
                let new_node = self.insert(pivot, limit, true);
                let news = std::mem::take(&mut self.new_nodes);
                let t0 = Instant::now();
                if let Some(tim) = self.tim.as_mut() {
                    tim.update_load(&self.ntk, self.lib, &news, true);
                    tim.update_timing(&self.ntk, self.lib, &news);
                }
                self.stats.t_timing += t0.elapsed();
                self.new_nodes = news;
                if self.tried.len() < self.ntk.objs.len() {
                    self.tried.resize(self.ntk.objs.len(), false);
                }
                debug!(
                    pivot = pivot.raw(),
                    delay_old = int2flt(delay_old),
                    delay_new = int2flt(self.tim.as_ref().unwrap().arrival(new_node)),
                    ntk_delay = int2flt(self.tim.as_ref().unwrap().ntk_delay()),
                    "remapped for delay"
                );
                committed = true;
                break;
            }
            if !committed {
                // every candidate was tried and marked; the next query
                // either finds fresh work or ends the pass
                continue;
            }
        }
        self.tried.clear();
    }

    /// Splice the implemented gates in place of the pivot. `limit` is the
    /// window size before implementation; entries above it describe the
    /// replacement.
    pub(crate) fn insert(&mut self, pivot: NodeId, limit: usize, track_new: bool) -> NodeId {
        self.new_nodes.clear();
        assert!(limit < self.gates_win.len());
        assert_eq!(limit, self.map.len());
        if limit + 1 == self.gates_win.len() {
            let gate = self.gates_win[limit].expect("replacement without a gate");
            if gate == self.lib.buf {
                // absorb the buffer into the existing divisor
                let iobj = self.fanins_win[limit][0];
                let new_node = self.map[iobj];
                if let Some(tim) = self.tim.as_mut() {
                    tim.transfer_load(&self.ntk, self.lib, new_node, pivot);
                }
                self.ntk.replace(pivot, new_node);
                self.ntk.obj_mut(new_node).level = 0;
                self.ntk.update_inc_level_rec(new_node);
                self.new_nodes.push(new_node);
                return new_node;
            }
            if gate == self.lib.inv && !track_new {
                // reprogram every fanout to its complemented-input twin
                // instead of materializing the inverter
                let fanouts = self.ntk.obj(pivot).fanouts.clone();
                let all_covered = fanouts.iter().all(|&fo| {
                    self.ntk.is_node(fo)
                        && self
                            .lib
                            .find_compl_input_gate(
                                self.ntk.obj(fo).gate.unwrap(),
                                self.ntk.fanin_num(fo),
                                self.ntk.find_fanin(fo, pivot).unwrap(),
                            )
                            .is_some()
                });
                if all_covered {
                    for &fo in &fanouts {
                        let ifanin = self.ntk.find_fanin(fo, pivot).unwrap();
                        let (gate_new, ifanin_new) = self
                            .lib
                            .find_compl_input_gate(
                                self.ntk.obj(fo).gate.unwrap(),
                                self.ntk.fanin_num(fo),
                                ifanin,
                            )
                            .unwrap();
                        self.ntk.obj_mut(fo).gate = Some(gate_new);
                        if ifanin != ifanin_new {
                            self.ntk.obj_mut(fo).fanins.swap(ifanin, ifanin_new);
                        }
                    }
                    let iobj = self.fanins_win[limit][0];
                    let new_node = self.map[iobj];
                    self.ntk.replace(pivot, new_node);
                    self.ntk.obj_mut(new_node).level = 0;
                    self.ntk.update_inc_level_rec(new_node);
                    self.new_nodes.push(new_node);
                    return new_node;
                }
            }
        }
        // introduce the new gates bottom-up
        let mut last = pivot;
        for i in limit..self.gates_win.len() {
            let gate = self.gates_win[i].expect("replacement without a gate");
            let fanins: Vec<NodeId> = self.fanins_win[i].iter().map(|&k| self.map[k]).collect();
            let new_node = self.ntk.add_node(self.lib.gate(gate), &fanins);
            self.map.push(new_node);
            self.new_nodes.push(new_node);
            last = new_node;
        }
        if let Some(tim) = self.tim.as_mut() {
            tim.transfer_load(&self.ntk, self.lib, last, pivot);
        }
        self.ntk.replace(pivot, last);
        for i in limit..self.map.len() {
            let n = self.map[i];
            if self.ntk.obj(n).valid {
                self.ntk.update_inc_level_rec(n);
            }
        }
        last
    }

    pub(crate) fn count_stats(&mut self, limit: usize) {
        let ngates = self.gates_win.len();
        if ngates == limit {
            return;
        }
        let gate = self.gates_win.last().unwrap();
        if ngates > limit + 1 {
            self.stats.resyn += 1;
        } else if *gate == Some(self.lib.const0) {
            self.stats.const0 += 1;
        } else if *gate == Some(self.lib.const1) {
            self.stats.const1 += 1;
        } else if *gate == Some(self.lib.buf) {
            self.stats.buf += 1;
        } else if *gate == Some(self.lib.inv) {
            self.stats.inv += 1;
        } else {
            self.stats.resyn += 1;
        }
    }

    // ---- simulation ----------------------------------------------------

    pub(crate) fn simulate_network(&mut self) {
        let n = self.ntk.objs.len();
        self.sims = vec![0; n];
        self.sims2 = vec![0; n];
        let mut rng = StdRng::seed_from_u64(1);
        for &pi in &self.ntk.pis {
            self.sims[pi.raw()] = rng.gen::<Word>();
        }
        let order: Vec<NodeId> = self.ntk.topo_order().collect();
        for id in order {
            self.sims[id.raw()] = self.obj_simulate(id);
        }
    }

    pub(crate) fn obj_simulate(&self, id: NodeId) -> Word {
        let obj = self.ntk.obj(id);
        let gate = self.lib.gate(obj.gate.unwrap());
        let fanins: Vec<Word> = obj.fanins.iter().map(|&f| self.sims[f.raw()]).collect();
        gate.expr.truth6(fanins.len(), Some(&fanins))
    }

    pub(crate) fn obj_simulate2(&self, id: NodeId) -> Word {
        let obj = self.ntk.obj(id);
        let gate = self.lib.gate(obj.gate.unwrap());
        let fanins: Vec<Word> = obj
            .fanins
            .iter()
            .map(|&f| {
                if self.ntk.obj(f).scratch & MARK_PIVOT != 0 {
                    self.sims2[f.raw()]
                } else {
                    self.sims[f.raw()]
                }
            })
            .collect();
        gate.expr.truth6(fanins.len(), Some(&fanins))
    }

    pub(crate) fn grow_sims(&mut self) {
        if self.sims.len() < self.ntk.objs.len() {
            self.sims.resize(self.ntk.objs.len(), 0);
            self.sims2.resize(self.ntk.objs.len(), 0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::{test_genlib, Library};
    use crate::netlist::read_netlist;

    #[test]
    fn defaults_match_the_documented_values() {
        let p = OptParams::default();
        assert_eq!(p.tfo_lev_max, 100);
        assert_eq!(p.fanout_max, 10);
        assert_eq!(p.mffc_max, 3);
        assert_eq!(p.var_max, 6);
        assert_eq!(p.dec_max, 1);
        assert!(!p.zero_cost && !p.more_effort && !p.area);
    }

    #[test]
    fn optimizer_construction() {
        let lib = Library::from_genlib(test_genlib()).unwrap();
        let ntk = read_netlist(
            "INPUT(a)\nINPUT(b)\nOUTPUT(y)\ny = and2(a, b)\n",
            &lib,
        )
        .unwrap();
        let mut pars = OptParams::default();
        pars.area = true;
        let opt = Optimizer::new(&lib, ntk, pars);
        assert!(opt.tim.is_none());
        // auto delta: 5/2 of the inverter delay
        assert_eq!(opt.delta_crit, 5 * flt2int(0.9) / 2);
    }

    #[test]
    fn simulation_respects_gates() {
        let lib = Library::from_genlib(test_genlib()).unwrap();
        let ntk = read_netlist(
            "INPUT(a)\nINPUT(b)\nOUTPUT(y)\nn = and2(a, b)\ny = inv1(n)\n",
            &lib,
        )
        .unwrap();
        let mut pars = OptParams::default();
        pars.area = true;
        pars.use_sim = true;
        let mut opt = Optimizer::new(&lib, ntk, pars);
        opt.simulate_network();
        let a = opt.ntk.pis[0];
        let b = opt.ntk.pis[1];
        let y = opt.ntk.obj(opt.ntk.pos[0]).fanins[0];
        assert_eq!(
            opt.sims[y.raw()],
            !(opt.sims[a.raw()] & opt.sims[b.raw()])
        );
    }
}
