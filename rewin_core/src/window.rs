//! Window extraction around a pivot node.
//!
//! The extraction collects the pivot's bounded TFO and its roots, the TFI
//! cone, the TFI of the roots, and classifies every visited object through
//! the scratch mask below. The consolidated window order is: divisors
//! first, then side nodes, then the cone from the MFFC through the pivot
//! and its TFO; after ordering, each object's scratch slot holds its
//! window position.

use crate::driver::Optimizer;
use crate::network::NodeId;

/// Supported inside the pivot's TFI.
pub(crate) const MARK_TFI: i32 = 1;
/// Reached only from the window roots.
pub(crate) const MARK_SIDE: i32 = 2;
/// Side node kept as a free window leaf.
pub(crate) const MARK_SIDE_FANIN: i32 = 4;
/// Member of the pivot's MFFC.
pub(crate) const MARK_MFFC: i32 = 8;
/// The pivot itself (and, transitively, everything above it).
pub(crate) const MARK_PIVOT: i32 = 16;

impl<'a> Optimizer<'a> {
    fn dfs_reverse_rec(&mut self, id: NodeId, level_max: i32) {
        if self.ntk.is_trav_current(id) {
            return;
        }
        self.ntk.set_trav(id);
        if self.ntk.is_po(id) || self.ntk.obj(id).level > level_max {
            return;
        }
        assert!(self.ntk.is_node(id));
        if self.ntk.fanout_num(id) <= self.pars.fanout_max {
            let fanouts = self.ntk.obj(id).fanouts.clone();
            let escapes = fanouts
                .iter()
                .any(|&fo| self.ntk.is_po(fo) || self.ntk.obj(fo).level > level_max);
            if !escapes {
                for fo in fanouts {
                    self.dfs_reverse_rec(fo, level_max);
                }
            }
        }
        self.tfo.push(id);
        self.ntk.obj_mut(id).scratch = 0;
    }

    fn dfs_tfi_rec(&mut self, id: NodeId, level_min: i32, label: i32) -> i32 {
        if self.ntk.is_trav_current(id) {
            return self.ntk.obj(id).scratch;
        }
        self.ntk.set_trav(id);
        if self.ntk.is_pi(id) || (self.ntk.obj(id).level < level_min && self.ntk.fanin_num(id) > 0)
        {
            self.tfi.push(id);
            self.ntk.obj_mut(id).scratch = label;
            return label;
        }
        assert!(self.ntk.is_node(id));
        let mut mask = if self.ntk.fanin_num(id) > 0 { 0 } else { label };
        for f in self.ntk.obj(id).fanins.clone() {
            mask |= self.dfs_tfi_rec(f, level_min, label);
        }
        self.ntk.obj_mut(id).scratch = mask;
        self.tfi.push(id);
        self.obj_simulate_node(id);
        mask
    }

    fn obj_simulate_node(&mut self, id: NodeId) {
        if !self.pars.use_sim {
            return;
        }
        self.grow_sims();
        self.sims[id.raw()] = self.obj_simulate(id);
        if self.ntk.obj(id).scratch & MARK_PIVOT != 0 {
            self.sims2[id.raw()] = self.obj_simulate2(id);
        }
    }

    fn flip_pivot_sim(&mut self, id: NodeId) {
        if self.pars.use_sim {
            self.grow_sims();
            self.sims2[id.raw()] = !self.sims[id.raw()];
        }
    }

    fn is_mffc_node(&self, id: NodeId, level_min: i32) -> bool {
        self.ntk.is_node(id)
            && self.ntk.fanout_num(id) == 1
            && self.ntk.is_trav_current(id)
            && (self.ntk.obj(id).level >= level_min || self.ntk.fanin_num(id) == 0)
    }

    /// Flag the MFFC (or, timing-aware, the pivot alone) and collect the
    /// nodes usable as forced cofactor variables.
    fn mark_mffc(&mut self, pivot: NodeId, level_min: i32) -> Vec<NodeId> {
        fn push_unique(v: &mut Vec<NodeId>, id: NodeId) {
            if !v.contains(&id) {
                v.push(id);
            }
        }
        let nmax = self.pars.mffc_max;
        assert!(nmax > 0);
        self.mffc.clear();
        self.mffc.push(pivot);
        let mut inputs: Vec<NodeId> = Vec::new();
        if self.tim.is_some() {
            self.ntk.obj_mut(pivot).scratch |= MARK_MFFC | MARK_PIVOT;
            // non-critical predecessors within three hops of the pivot
            let tim = self.tim.as_ref().unwrap();
            let ok = |n: NodeId| {
                self.ntk.is_trav_current(n) && tim.is_non_critical(pivot, n)
            };
            for &f1 in &self.ntk.obj(pivot).fanins {
                if ok(f1) {
                    push_unique(&mut inputs, f1);
                }
            }
            for &f1 in &self.ntk.obj(pivot).fanins {
                for &f2 in &self.ntk.obj(f1).fanins {
                    if ok(f2) {
                        push_unique(&mut inputs, f2);
                    }
                }
            }
            for &f1 in &self.ntk.obj(pivot).fanins {
                for &f2 in &self.ntk.obj(f1).fanins {
                    for &f3 in &self.ntk.obj(f2).fanins {
                        if ok(f3) {
                            push_unique(&mut inputs, f3);
                        }
                    }
                }
            }
            return inputs;
        }
        // structural MFFC up to three hops deep, capped at nmax members
        let fan1 = self.ntk.obj(pivot).fanins.clone();
        for &f1 in &fan1 {
            if self.is_mffc_node(f1, level_min) && self.mffc.len() < nmax {
                push_unique(&mut self.mffc, f1);
            }
        }
        for &f1 in &fan1 {
            if self.is_mffc_node(f1, level_min) && self.mffc.len() < nmax {
                for &f2 in &self.ntk.obj(f1).fanins.clone() {
                    if self.is_mffc_node(f2, level_min) && self.mffc.len() < nmax {
                        push_unique(&mut self.mffc, f2);
                    }
                }
            }
        }
        for &f1 in &fan1 {
            if self.is_mffc_node(f1, level_min) && self.mffc.len() < nmax {
                for &f2 in &self.ntk.obj(f1).fanins.clone() {
                    if self.is_mffc_node(f2, level_min) && self.mffc.len() < nmax {
                        for &f3 in &self.ntk.obj(f2).fanins.clone() {
                            if self.is_mffc_node(f3, level_min) && self.mffc.len() < nmax {
                                push_unique(&mut self.mffc, f3);
                            }
                        }
                    }
                }
            }
        }
        assert!(self.mffc.len() <= nmax);
        for i in 0..self.mffc.len() {
            let m = self.mffc[i];
            self.ntk.obj_mut(m).scratch |= MARK_MFFC;
        }
        self.ntk.obj_mut(pivot).scratch |= MARK_PIVOT;
        for i in 0..self.mffc.len() {
            let m = self.mffc[i];
            for &f in &self.ntk.obj(m).fanins.clone() {
                if self.ntk.is_trav_current(f) && self.ntk.obj(f).scratch == MARK_TFI {
                    push_unique(&mut inputs, f);
                }
            }
        }
        inputs
    }

    fn add_window_node(&mut self, id: NodeId, skip: bool) {
        self.map.push(id);
        self.gates_win.push(if skip { None } else { self.ntk.obj(id).gate });
    }

    /// Build the window around `pivot`; returns the divisor count. On
    /// return the window vectors, target position, and care-set are set.
    pub fn extract_window(&mut self, pivot: NodeId) -> usize {
        assert!(self.ntk.is_node(pivot));
        let level_max = self.ntk.obj(pivot).level + self.pars.tfo_lev_max + self.pars.growth_level;
        let level_min = self.ntk.obj(pivot).level - self.pars.tfi_lev_max;

        // bounded TFO
        self.tfo.clear();
        self.ntk.new_trav_id();
        self.dfs_reverse_rec(pivot, level_max);
        // count window-internal fanouts
        for i in 0..self.tfo.len() {
            let id = self.tfo[i];
            for f in self.ntk.obj(id).fanins.clone() {
                self.ntk.obj_mut(f).scratch += 1;
            }
        }
        // roots have fanouts escaping the window
        let mut roots_nodes: Vec<NodeId> = Vec::new();
        for &id in &self.tfo {
            if self.ntk.obj(id).scratch != self.ntk.fanout_num(id) as i32 {
                roots_nodes.push(id);
            }
        }
        assert!(!roots_nodes.is_empty());

        // TFI of the pivot, labelled MARK_TFI
        self.tfi.clear();
        self.ntk.new_trav_id();
        self.dfs_tfi_rec(pivot, level_min, MARK_TFI);
        let ntfi = self.tfi.len();
        self.flip_pivot_sim(pivot);
        let in_mffc_nodes = self.mark_mffc(pivot, level_min);

        // TFI of the roots, labelled MARK_SIDE
        for i in 0..roots_nodes.len() {
            let r = roots_nodes[i];
            self.dfs_tfi_rec(r, level_min, MARK_SIDE);
        }
        // side-only nodes cited by mixed nodes become window leaves
        for i in ntfi..self.tfi.len() {
            let id = self.tfi[i];
            if self.ntk.obj(id).scratch != MARK_SIDE {
                for f in self.ntk.obj(id).fanins.clone() {
                    if self.ntk.obj(f).scratch == MARK_SIDE {
                        self.ntk.obj_mut(f).scratch = MARK_SIDE_FANIN;
                    }
                }
            }
        }

        // divisors: nodes supported purely inside the TFI, outside the MFFC
        self.map.clear();
        self.gates_win.clear();
        let leaf = |s: &Self, id: NodeId| {
            s.ntk.is_pi(id) || (s.ntk.obj(id).level < level_min && s.ntk.fanin_num(id) > 0)
        };
        for i in 0..self.tfi.len() {
            let id = self.tfi[i];
            if self.ntk.obj(id).scratch == MARK_TFI {
                let skip = leaf(self, id);
                self.add_window_node(id, skip);
            }
        }
        let mut ndivs = self.map.len();
        // side nodes: mixed support gates plus free side leaves
        for i in 0..self.tfi.len() {
            let id = self.tfi[i];
            let s = self.ntk.obj(id).scratch;
            if s == (MARK_TFI | MARK_SIDE) || s == MARK_SIDE_FANIN {
                let skip = s == MARK_SIDE_FANIN || leaf(self, id);
                self.add_window_node(id, skip);
            }
        }
        // timing mode: order divisors and sides by arrival time
        if self.tim.is_some() {
            let mut nodes = self.map.clone();
            let split = {
                let tim = self.tim.as_ref().unwrap();
                tim.sort_by_arrival(&mut nodes, pivot)
            };
            self.map.clear();
            self.gates_win.clear();
            for &id in &nodes {
                let skip = leaf(self, id) || self.ntk.obj(id).scratch == MARK_SIDE_FANIN;
                self.add_window_node(id, skip);
            }
            ndivs = split;
        }
        // the cone: MFFC, pivot, TFO
        for i in 0..self.tfi.len() {
            let id = self.tfi[i];
            if self.ntk.obj(id).scratch >= MARK_MFFC {
                self.add_window_node(id, false);
            }
        }

        // care-set over the roots before ids turn into positions
        self.care_set = if self.pars.use_sim {
            roots_nodes
                .iter()
                .map(|&r| self.sims[r.raw()] ^ self.sims2[r.raw()])
                .fold(0, |a, b| a | b)
        } else {
            0
        };

        // window positions into the scratch slots, fanin lists in window
        // coordinates
        self.fanins_win.clear();
        for i in 0..self.map.len() {
            let id = self.map[i];
            self.ntk.obj_mut(id).scratch = i as i32;
            let fi = if self.gates_win[i].is_some() {
                self.ntk.obj(id)
                    .fanins
                    .iter()
                    .map(|&f| self.ntk.obj(f).scratch as usize)
                    .collect()
            } else {
                Vec::new()
            };
            self.fanins_win.push(fi);
        }
        self.roots = roots_nodes.iter().map(|&r| self.ntk.obj(r).scratch as usize).collect();
        self.in_mffc = in_mffc_nodes.iter().map(|&n| self.ntk.obj(n).scratch as usize).collect();
        self.itarget = self.ntk.obj(pivot).scratch as usize;
        ndivs
    }
}
