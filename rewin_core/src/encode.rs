//! Window-to-CNF compilation.
//!
//! Variable layout: one variable per window position for the original
//! cone, one per TFO position for the duplicated cone (where every
//! literal on the pivot is complemented), one per root XOR gadget, and an
//! OR clause asserting that at least one root observes the difference.

use crate::cnf::translate_cnf;
use crate::driver::Optimizer;
use crate::sat::{lit, Lit};

impl<'a> Optimizer<'a> {
    /// Encode the current window; false when the instance is trivially
    /// unsatisfiable.
    pub fn prepare_solver(&mut self) -> bool {
        let lib = self.lib;
        let ntfi = self.itarget + 1;
        let nwin = self.gates_win.len();
        let shift = nwin - ntfi;
        let mut nvars = 2 * nwin - ntfi;
        self.sat.restart();
        self.sat.set_num_vars(nvars);

        // original cone: every window gate over its window variables
        let mut fanin_map: Vec<usize> = Vec::new();
        for i in 0..nwin {
            let gate = match self.gates_win[i] {
                Some(g) => g,
                None => continue,
            };
            fanin_map.clear();
            fanin_map.extend(self.fanins_win[i].iter().copied());
            fanin_map.push(i);
            translate_cnf(&mut self.clauses, &lib.gate(gate).cnf, &fanin_map, None);
            for clause in &self.clauses {
                if !self.sat.add_clause(clause) {
                    return false;
                }
            }
        }
        // duplicated cone: TFO gates over shifted variables, pivot toggled
        for i in ntfi..nwin {
            let gate = self.gates_win[i].expect("TFO node without a gate");
            fanin_map.clear();
            for &k in &self.fanins_win[i] {
                fanin_map.push(if k <= self.itarget { k } else { k + shift });
            }
            fanin_map.push(i + shift);
            translate_cnf(&mut self.clauses, &lib.gate(gate).cnf, &fanin_map, Some(self.itarget));
            for clause in &self.clauses {
                if !self.sat.add_clause(clause) {
                    return false;
                }
            }
        }
        if ntfi < nwin {
            // root miters: x_i = r_i ^ r_i', OR over all x_i
            let mut or_clause: Vec<Lit> = Vec::with_capacity(self.roots.len());
            for &r in &self.roots.clone() {
                assert!(r > self.itarget);
                let x = nvars;
                nvars += 1;
                self.sat.set_num_vars(nvars);
                if !self.sat.add_xor(x, r, r + shift) {
                    return false;
                }
                or_clause.push(lit(x, false));
            }
            if !self.sat.add_clause(&or_clause) {
                return false;
            }
        } else {
            assert_eq!(self.roots.len(), 1);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use crate::driver::{OptParams, Optimizer};
    use crate::library::{test_genlib, Library};
    use crate::netlist::read_netlist;
    use crate::sat::{lit, SatResult};

    fn pivot_named<'a>(opt: &Optimizer<'a>, name: &str) -> crate::network::NodeId {
        opt.ntk
            .objs
            .iter_enumerated()
            .find(|(_, o)| o.name.as_deref() == Some(name))
            .unwrap()
            .0
    }

    #[test]
    fn instance_models_observability() {
        let lib = Library::from_genlib(test_genlib()).unwrap();
        // a = and2(x1, x2); b = or2(a, x3); both b and a observable
        let ntk = read_netlist(
            "INPUT(x1)\nINPUT(x2)\nINPUT(x3)\nOUTPUT(b)\n\
             a = and2(x1, x2)\nb = or2(a, x3)\n",
            &lib,
        )
        .unwrap();
        let mut opt = Optimizer::new(&lib, ntk, OptParams { area: true, ..OptParams::default() });
        let pivot = pivot_named(&opt, "a");
        let ndivs = opt.extract_window(pivot);
        opt.ndivs = ndivs;
        assert!(opt.prepare_solver());
        // a satisfying assignment exists: the care set of `a` is x3=0
        assert_eq!(opt.sat.solve(&[], 0), SatResult::Sat);
        // x3 is a side leaf of the window; under every model x3 must be 0,
        // because with x3=1 no root distinguishes the toggled pivot
        let x3 = opt
            .map
            .iter()
            .position(|&n| opt.ntk.obj(n).name.as_deref() == Some("x3"))
            .unwrap();
        assert_eq!(opt.sat.solve(&[lit(x3, false)], 0), SatResult::Unsat);
        assert_eq!(opt.sat.solve(&[lit(x3, true)], 0), SatResult::Sat);
    }

    #[test]
    fn no_tfo_means_no_miter() {
        let lib = Library::from_genlib(test_genlib()).unwrap();
        let ntk = read_netlist(
            "INPUT(x1)\nINPUT(x2)\nOUTPUT(a)\na = and2(x1, x2)\n",
            &lib,
        )
        .unwrap();
        let mut opt = Optimizer::new(&lib, ntk, OptParams { area: true, ..OptParams::default() });
        let pivot = pivot_named(&opt, "a");
        let ndivs = opt.extract_window(pivot);
        opt.ndivs = ndivs;
        assert_eq!(opt.roots, vec![opt.itarget]);
        assert!(opt.prepare_solver());
        // the instance is just the AND2 consistency: pivot=1 forces both
        // inputs high
        assert_eq!(opt.sat.solve(&[lit(opt.itarget, false)], 0), SatResult::Sat);
        assert!(opt.sat.var_value(0) && opt.sat.var_value(1));
    }
}
