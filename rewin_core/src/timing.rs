//! Incremental timing facade over the mapped network.
//!
//! Two implementations share one surface: `PathTiming` propagates pure
//! pin delays, `LoadTiming` additionally weighs every edge by the
//! capacitive load hanging on its driver. All times are scaled
//! picoseconds; the engine must call `update_timing` after any structural
//! change before querying again.

use crate::library::{Gate, GateId, Library, Pin, PinPhase};
use crate::network::{MappedNetwork, NodeId};
use itertools::Itertools;

pub const INF: i32 = 100_000_000;

pub fn flt2int(f: f64) -> i32 {
    (f * 1000.0).round() as i32
}

pub fn int2flt(i: i32) -> f64 {
    i as f64 / 1000.0
}

/// Position marker for the bottom gate's output inside a top gate's fanin
/// permutation.
pub const FAN_FROM_BOTTOM: u8 = 16;

pub trait Timing {
    fn ntk_delay(&self) -> i32;
    fn min_slack(&self) -> i32;
    fn arrival(&self, node: NodeId) -> i32;
    fn required(&self, node: NodeId) -> i32;
    fn slack(&self, node: NodeId) -> i32;
    /// Stable-sort by arrival; returns the count of leading entries that
    /// stay clear of the pivot's arrival by the critical delta.
    fn sort_by_arrival(&self, nodes: &mut Vec<NodeId>, pivot: NodeId) -> usize;
    fn is_non_critical(&self, pivot: NodeId, node: NodeId) -> bool;
    /// Critical-path candidates in level order, most useful first; false
    /// means no critical work remains.
    fn priority_nodes(
        &mut self,
        ntk: &MappedNetwork,
        cands: &mut Vec<NodeId>,
        window_pct: usize,
        tried: &[bool],
    ) -> bool;
    /// Arrival estimate at the output of a candidate one- or two-gate
    /// cover; `supp` maps cover inputs to window positions, `map` maps
    /// window positions to nodes.
    #[allow(clippy::too_many_arguments)]
    fn eval_remapping(
        &self,
        lib: &Library,
        supp: &[usize],
        map: &[NodeId],
        gate_bot: GateId,
        fans_bot: &[u8],
        gate_top: Option<GateId>,
        fans_top: &[u8],
    ) -> i32;
    fn update_timing(&mut self, ntk: &MappedNetwork, lib: &Library, changed: &[NodeId]);
    fn update_load(&mut self, ntk: &MappedNetwork, lib: &Library, nodes: &[NodeId], add: bool);
    fn transfer_load(&mut self, ntk: &MappedNetwork, lib: &Library, new_node: NodeId, old_node: NodeId);
}

struct TimingCore {
    arrs: Vec<[i32; 2]>,
    reqs: Vec<[i32; 2]>,
    delay: i32,
    wns: i32,
    delta_crit: i32,
    path: Vec<NodeId>,
    levels: Vec<Vec<NodeId>>,
}

fn edge_arrival(pin: &Pin, time_in: [i32; 2], out: &mut [i32; 2], fanout_term: [i32; 2]) {
    let rise = flt2int(pin.delay_block_rise) + fanout_term[0];
    let fall = flt2int(pin.delay_block_fall) + fanout_term[1];
    if pin.phase != PinPhase::Inv {
        out[0] = out[0].max(time_in[0] + rise);
        out[1] = out[1].max(time_in[1] + fall);
    }
    if pin.phase != PinPhase::Noninv {
        out[0] = out[0].max(time_in[1] + rise);
        out[1] = out[1].max(time_in[0] + fall);
    }
}

fn edge_required(pin: &Pin, time_in: &mut [i32; 2], out: [i32; 2]) {
    let rise = flt2int(pin.delay_block_rise);
    let fall = flt2int(pin.delay_block_fall);
    if pin.phase != PinPhase::Inv {
        time_in[0] = time_in[0].min(out[0] - rise);
        time_in[1] = time_in[1].min(out[1] - fall);
    }
    if pin.phase != PinPhase::Noninv {
        time_in[0] = time_in[0].min(out[1] - rise);
        time_in[1] = time_in[1].min(out[0] - fall);
    }
}

fn gate_arrival(gate: &Gate, times_in: &[[i32; 2]], load: Option<f64>) -> [i32; 2] {
    let mut out = [0, 0];
    for (pin, &tin) in gate.pins.iter().zip(times_in.iter()) {
        let term = match load {
            Some(ld) => [flt2int(pin.delay_fanout_rise * ld), flt2int(pin.delay_fanout_fall * ld)],
            None => [0, 0],
        };
        edge_arrival(pin, tin, &mut out, term);
    }
    out
}

impl TimingCore {
    fn new(delta_crit: i32) -> Self {
        TimingCore {
            arrs: Vec::new(),
            reqs: Vec::new(),
            delay: 0,
            wns: 0,
            delta_crit,
            path: Vec::new(),
            levels: Vec::new(),
        }
    }

    fn arr_max(&self, id: NodeId) -> i32 {
        let a = self.arrs[id.raw()];
        a[0].max(a[1])
    }

    fn slack_of(&self, id: NodeId) -> i32 {
        let a = self.arrs[id.raw()];
        let r = self.reqs[id.raw()];
        (r[0] - a[0]).min(r[1] - a[1])
    }

    /// Full arrival/required trace; returns the worst PO arrival.
    fn trace(&mut self, ntk: &MappedNetwork, lib: &Library, loads: Option<&[f64]>) {
        let n = ntk.objs.len();
        self.arrs.clear();
        self.arrs.resize(n, [0, 0]);
        self.reqs.clear();
        self.reqs.resize(n, [INF, INF]);
        let order: Vec<NodeId> = ntk.topo_order().collect();
        for &id in &order {
            let obj = ntk.obj(id);
            let gate = lib.gate(obj.gate.unwrap());
            let times_in = obj.fanins.iter().map(|&f| self.arrs[f.raw()]).collect_vec();
            self.arrs[id.raw()] = gate_arrival(gate, &times_in, loads.map(|l| l[id.raw()]));
        }
        let mut delay = 0;
        for &po in &ntk.pos {
            let root = ntk.obj(po).fanins[0];
            self.arrs[po.raw()] = self.arrs[root.raw()];
            delay = delay.max(self.arr_max(root));
        }
        self.delay = delay;
        for &po in &ntk.pos {
            let root = ntk.obj(po).fanins[0];
            self.reqs[root.raw()] = [delay, delay];
        }
        for &id in order.iter().rev() {
            let obj = ntk.obj(id);
            let gate = lib.gate(obj.gate.unwrap());
            let out = self.reqs[id.raw()];
            for (pin, &f) in gate.pins.iter().zip(obj.fanins.iter()) {
                let mut tin = self.reqs[f.raw()];
                edge_required(pin, &mut tin, out);
                self.reqs[f.raw()] = tin;
            }
        }
        self.wns = self.worst_slack(ntk);
    }

    fn critical_path_rec(&self, ntk: &MappedNetwork, id: NodeId, slack_max: i32, seen: &mut Vec<bool>, path: &mut Vec<NodeId>) {
        if seen[id.raw()] {
            return;
        }
        seen[id.raw()] = true;
        assert!(ntk.is_node(id));
        for &f in &ntk.obj(id).fanins {
            if !ntk.is_node(f) || ntk.fanin_num(f) == 0 {
                continue;
            }
            if self.slack_of(f) <= slack_max {
                self.critical_path_rec(ntk, f, slack_max, seen, path);
            }
        }
        if ntk.fanin_num(id) > 0 {
            path.push(id);
        }
    }

    fn collect_critical(&mut self, ntk: &MappedNetwork, window_pct: usize) {
        assert!(window_pct <= 100);
        let slack_max = self.delay * window_pct as i32 / 100;
        let mut seen = vec![false; ntk.objs.len()];
        let mut path = std::mem::take(&mut self.path);
        path.clear();
        for &po in &ntk.pos {
            let root = ntk.obj(po).fanins[0];
            if !ntk.is_node(root) || ntk.fanin_num(root) == 0 {
                continue;
            }
            if self.slack_of(root) <= slack_max {
                self.critical_path_rec(ntk, root, slack_max, &mut seen, &mut path);
            }
        }
        self.path = path;
    }

    fn priority(&mut self, ntk: &MappedNetwork, cands: &mut Vec<NodeId>, window_pct: usize, tried: &[bool]) -> bool {
        self.collect_critical(ntk, window_pct);
        for level in self.levels.iter_mut() {
            level.clear();
        }
        for &id in &self.path {
            let lev = ntk.obj(id).level as usize;
            if self.levels.len() <= lev {
                self.levels.resize_with(lev + 1, Vec::new);
            }
            self.levels[lev].push(id);
        }
        cands.clear();
        for level in self.levels.iter_mut() {
            level.sort_unstable();
            for &id in level.iter() {
                if !tried.get(id.raw()).copied().unwrap_or(false) {
                    cands.push(id);
                }
            }
        }
        !cands.is_empty()
    }

    fn sort_nodes(&self, nodes: &mut Vec<NodeId>, pivot: NodeId) -> usize {
        let max_delay = self.arr_max(pivot);
        nodes.sort_by_key(|&id| self.arr_max(id));
        nodes
            .iter()
            .position(|&id| self.arr_max(id) + self.delta_crit > max_delay)
            .unwrap_or(nodes.len())
    }

    #[allow(clippy::too_many_arguments)]
    fn eval(
        &self,
        lib: &Library,
        supp: &[usize],
        map: &[NodeId],
        gate_bot: GateId,
        fans_bot: &[u8],
        gate_top: Option<GateId>,
        fans_top: &[u8],
        loads: Option<(f64, f64)>, // (load at the top output, load of a top input pin)
    ) -> i32 {
        let bot = lib.gate(gate_bot);
        let times_bot = (0..bot.num_pins())
            .map(|i| self.arrs[map[supp[fans_bot[i] as usize]].raw()])
            .collect_vec();
        let out_bot = match gate_top {
            None => gate_arrival(bot, &times_bot, loads.map(|l| l.0)),
            Some(_) => gate_arrival(bot, &times_bot, loads.map(|l| l.1)),
        };
        let top_gate = match gate_top {
            None => return out_bot[0].max(out_bot[1]),
            Some(g) => lib.gate(g),
        };
        let times_top = (0..top_gate.num_pins())
            .map(|i| {
                if fans_top[i] == FAN_FROM_BOTTOM {
                    out_bot
                } else {
                    self.arrs[map[supp[fans_top[i] as usize]].raw()]
                }
            })
            .collect_vec();
        let out = gate_arrival(top_gate, &times_top, loads.map(|l| l.0));
        out[0].max(out[1])
    }

    fn worst_slack(&self, ntk: &MappedNetwork) -> i32 {
        ntk.pos
            .iter()
            .map(|&po| self.slack_of(ntk.obj(po).fanins[0]))
            .min()
            .unwrap_or(0)
    }
}

/// Pure pin-delay timing.
pub struct PathTiming {
    core: TimingCore,
}

impl PathTiming {
    pub fn new(lib: &Library, ntk: &MappedNetwork, delta_crit: i32) -> Self {
        assert!(delta_crit >= 0 && delta_crit < flt2int(1000.0));
        let mut core = TimingCore::new(delta_crit);
        core.trace(ntk, lib, None);
        PathTiming { core }
    }
}

impl Timing for PathTiming {
    fn ntk_delay(&self) -> i32 {
        self.core.delay
    }

    fn min_slack(&self) -> i32 {
        self.core.wns
    }

    fn arrival(&self, node: NodeId) -> i32 {
        self.core.arr_max(node)
    }

    fn required(&self, node: NodeId) -> i32 {
        let r = self.core.reqs[node.raw()];
        r[0].min(r[1])
    }

    fn slack(&self, node: NodeId) -> i32 {
        self.core.slack_of(node)
    }

    fn sort_by_arrival(&self, nodes: &mut Vec<NodeId>, pivot: NodeId) -> usize {
        self.core.sort_nodes(nodes, pivot)
    }

    fn is_non_critical(&self, pivot: NodeId, node: NodeId) -> bool {
        self.core.arr_max(node) + self.core.delta_crit <= self.core.arr_max(pivot)
    }

    fn priority_nodes(
        &mut self,
        ntk: &MappedNetwork,
        cands: &mut Vec<NodeId>,
        window_pct: usize,
        tried: &[bool],
    ) -> bool {
        self.core.priority(ntk, cands, window_pct, tried)
    }

    fn eval_remapping(
        &self,
        lib: &Library,
        supp: &[usize],
        map: &[NodeId],
        gate_bot: GateId,
        fans_bot: &[u8],
        gate_top: Option<GateId>,
        fans_top: &[u8],
    ) -> i32 {
        self.core.eval(lib, supp, map, gate_bot, fans_bot, gate_top, fans_top, None)
    }

    fn update_timing(&mut self, ntk: &MappedNetwork, lib: &Library, _changed: &[NodeId]) {
        self.core.trace(ntk, lib, None);
    }

    fn update_load(&mut self, _ntk: &MappedNetwork, _lib: &Library, _nodes: &[NodeId], _add: bool) {}

    fn transfer_load(&mut self, _ntk: &MappedNetwork, _lib: &Library, _new: NodeId, _old: NodeId) {}
}

/// Load-aware timing: every edge delay gains `delay_fanout * load` of the
/// driving node, where a node's load is the sum of the input loads of the
/// pins it feeds.
pub struct LoadTiming {
    core: TimingCore,
    loads: Vec<f64>,
}

impl LoadTiming {
    pub fn new(lib: &Library, ntk: &MappedNetwork, delta_crit: i32) -> Self {
        assert!(delta_crit >= 0 && delta_crit < flt2int(1000.0));
        let mut t = LoadTiming {
            core: TimingCore::new(delta_crit),
            loads: Vec::new(),
        };
        t.recompute_loads(ntk, lib);
        t.core.trace(ntk, lib, Some(&t.loads));
        t
    }

    fn recompute_loads(&mut self, ntk: &MappedNetwork, lib: &Library) {
        self.loads.clear();
        self.loads.resize(ntk.objs.len(), 0.0);
        for (id, obj) in ntk.objs.iter_enumerated() {
            if !obj.valid || !ntk.is_node(id) {
                continue;
            }
            let gate = lib.gate(obj.gate.unwrap());
            for (pin, &f) in gate.pins.iter().zip(obj.fanins.iter()) {
                self.loads[f.raw()] += pin.input_load;
            }
        }
    }

    fn grow(&mut self, n: usize) {
        if self.loads.len() < n {
            self.loads.resize(n, 0.0);
        }
    }
}

impl Timing for LoadTiming {
    fn ntk_delay(&self) -> i32 {
        self.core.delay
    }

    fn min_slack(&self) -> i32 {
        self.core.wns
    }

    fn arrival(&self, node: NodeId) -> i32 {
        self.core.arr_max(node)
    }

    fn required(&self, node: NodeId) -> i32 {
        let r = self.core.reqs[node.raw()];
        r[0].min(r[1])
    }

    fn slack(&self, node: NodeId) -> i32 {
        self.core.slack_of(node)
    }

    fn sort_by_arrival(&self, nodes: &mut Vec<NodeId>, pivot: NodeId) -> usize {
        self.core.sort_nodes(nodes, pivot)
    }

    fn is_non_critical(&self, pivot: NodeId, node: NodeId) -> bool {
        self.core.arr_max(node) + self.core.delta_crit <= self.core.arr_max(pivot)
    }

    fn priority_nodes(
        &mut self,
        ntk: &MappedNetwork,
        cands: &mut Vec<NodeId>,
        window_pct: usize,
        tried: &[bool],
    ) -> bool {
        self.core.priority(ntk, cands, window_pct, tried)
    }

    fn eval_remapping(
        &self,
        lib: &Library,
        supp: &[usize],
        map: &[NodeId],
        gate_bot: GateId,
        fans_bot: &[u8],
        gate_top: Option<GateId>,
        fans_top: &[u8],
    ) -> i32 {
        // the bottom gate drives exactly one top pin; the cover output is
        // charged a unit load until the real fanouts attach
        let (out_load, bot_load) = match gate_top {
            Some(g) => {
                let top = lib.gate(g);
                let pos = fans_top.iter().position(|&f| f == FAN_FROM_BOTTOM).unwrap_or(0);
                (1.0, top.pins[pos].input_load)
            }
            None => (1.0, 1.0),
        };
        self.core.eval(
            lib,
            supp,
            map,
            gate_bot,
            fans_bot,
            gate_top,
            fans_top,
            Some((out_load, bot_load)),
        )
    }

    fn update_timing(&mut self, ntk: &MappedNetwork, lib: &Library, _changed: &[NodeId]) {
        self.grow(ntk.objs.len());
        self.core.trace(ntk, lib, Some(&self.loads));
    }

    fn update_load(&mut self, ntk: &MappedNetwork, lib: &Library, nodes: &[NodeId], add: bool) {
        self.grow(ntk.objs.len());
        for &id in nodes {
            let obj = ntk.obj(id);
            let gate = match obj.gate {
                Some(g) => lib.gate(g),
                None => continue,
            };
            for (pin, &f) in gate.pins.iter().zip(obj.fanins.iter()) {
                if add {
                    self.loads[f.raw()] += pin.input_load;
                } else {
                    self.loads[f.raw()] -= pin.input_load;
                }
            }
        }
    }

    fn transfer_load(&mut self, ntk: &MappedNetwork, _lib: &Library, new_node: NodeId, old_node: NodeId) {
        self.grow(ntk.objs.len());
        self.loads[new_node.raw()] += self.loads[old_node.raw()];
        self.loads[old_node.raw()] = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::{test_genlib, Library};
    use crate::network::MappedNetwork;

    fn chain(lib: &Library) -> (MappedNetwork, Vec<NodeId>) {
        // a = and2(x1, x2); b = and2(a, x3); y = and2(b, x4)
        let mut ntk = MappedNetwork::new();
        let x1 = ntk.add_pi("x1");
        let x2 = ntk.add_pi("x2");
        let x3 = ntk.add_pi("x3");
        let x4 = ntk.add_pi("x4");
        let and2 = lib.gate(lib.and2.unwrap());
        let a = ntk.add_node(and2, &[x1, x2]);
        let b = ntk.add_node(and2, &[a, x3]);
        let y = ntk.add_node(and2, &[b, x4]);
        ntk.add_po("y", y);
        ntk.compute_levels();
        (ntk, vec![a, b, y])
    }

    #[test]
    fn arrivals_and_slacks() {
        let lib = Library::from_genlib(test_genlib()).unwrap();
        let (ntk, nodes) = chain(&lib);
        let tim = PathTiming::new(&lib, &ntk, 1);
        assert_eq!(tim.ntk_delay(), flt2int(3.0));
        assert_eq!(tim.arrival(nodes[0]), flt2int(1.0));
        assert_eq!(tim.arrival(nodes[2]), flt2int(3.0));
        assert_eq!(tim.slack(nodes[2]), 0);
        assert_eq!(tim.slack(nodes[0]), 0); // on the critical chain
        assert_eq!(tim.required(nodes[1]), flt2int(2.0));
    }

    #[test]
    fn sorting_and_criticality() {
        let lib = Library::from_genlib(test_genlib()).unwrap();
        let (ntk, nodes) = chain(&lib);
        let tim = PathTiming::new(&lib, &ntk, flt2int(1.5));
        let (a, b, y) = (nodes[0], nodes[1], nodes[2]);
        assert!(tim.is_non_critical(y, a));
        assert!(!tim.is_non_critical(y, b));
        let mut v = vec![y, a, b];
        let split = tim.sort_by_arrival(&mut v, y);
        assert_eq!(v, vec![a, b, y]);
        assert_eq!(split, 1); // only `a` stays clear of the pivot by 1.5ns
    }

    #[test]
    fn priority_covers_critical_path() {
        let lib = Library::from_genlib(test_genlib()).unwrap();
        let (ntk, nodes) = chain(&lib);
        let mut tim = PathTiming::new(&lib, &ntk, 1);
        let mut cands = Vec::new();
        let tried = vec![false; ntk.objs.len()];
        assert!(tim.priority_nodes(&ntk, &mut cands, 0, &tried));
        assert_eq!(cands, nodes); // level order along the chain
        // marking everything tried empties the queue
        let tried = vec![true; ntk.objs.len()];
        assert!(!tim.priority_nodes(&ntk, &mut cands, 0, &tried));
    }

    #[test]
    fn remapping_eval() {
        let lib = Library::from_genlib(test_genlib()).unwrap();
        let (ntk, nodes) = chain(&lib);
        let tim = PathTiming::new(&lib, &ntk, 1);
        // replace b with and3(x1, x2, x3): inputs are PIs, one gate deep
        let and3 = lib.find("and3").unwrap();
        let map: Vec<NodeId> = ntk.pis.clone();
        let supp = [0usize, 1, 2];
        let d = tim.eval_remapping(&lib, &supp, &map, and3, &[0, 1, 2], None, &[]);
        assert_eq!(d, flt2int(1.2));
        // two-gate cover: and2(x1,x2) feeding and2(., x3)
        let and2 = lib.and2.unwrap();
        let d2 = tim.eval_remapping(
            &lib,
            &supp,
            &map,
            and2,
            &[0, 1],
            Some(and2),
            &[FAN_FROM_BOTTOM, 2],
        );
        assert_eq!(d2, flt2int(2.0));
        let _ = nodes;
    }

    #[test]
    fn load_timing_slows_heavy_fanout() {
        let lib = Library::from_genlib(test_genlib()).unwrap();
        // one AND2 driving three ORs vs a twin driving one
        let mut ntk = MappedNetwork::new();
        let x1 = ntk.add_pi("x1");
        let x2 = ntk.add_pi("x2");
        let and2 = lib.gate(lib.and2.unwrap());
        let or2 = lib.gate(lib.or2.unwrap());
        let heavy = ntk.add_node(and2, &[x1, x2]);
        let light = ntk.add_node(and2, &[x1, x2]);
        for i in 0..3 {
            let o = ntk.add_node(or2, &[heavy, x2]);
            ntk.add_po(&format!("h{}", i), o);
        }
        let o = ntk.add_node(or2, &[light, x2]);
        ntk.add_po("l", o);
        ntk.compute_levels();
        // make the or2 pins load-sensitive via a custom library entry is
        // unnecessary: loads differ, so a fanout-delay gate would slow the
        // heavy driver; with the test library's zero fanout delays both
        // arrive together, which pins the load bookkeeping itself
        let mut tim = LoadTiming::new(&lib, &ntk, 1);
        assert_eq!(tim.arrival(heavy), tim.arrival(light));
        assert_eq!(tim.loads[heavy.raw()], 3.0);
        assert_eq!(tim.loads[light.raw()], 1.0);
        tim.transfer_load(&ntk, &lib, light, heavy);
        assert_eq!(tim.loads[light.raw()], 4.0);
        assert_eq!(tim.loads[heavy.raw()], 0.0);
    }
}
