//! Agreement of the three function forms and the CNF stream for every
//! gate of the test library, checked by exhaustive enumeration.

use rewin_core::cnf::translate_cnf;
use rewin_core::library::{test_genlib, Library};
use rewin_core::sat::{lit, SatResult, SatSolver};
use rewin_core::sop::sop_truth;
use rewin_core::truth::{tt_equal, tt_get_bit, tt_word_num};

#[test]
fn expression_sop_and_truth_agree() {
    let lib = Library::from_genlib(test_genlib()).unwrap();
    for gate in lib.gates.iter() {
        let n = gate.num_pins();
        let from_expr = gate.expr.truth(n, None);
        assert!(
            tt_equal(&from_expr, &gate.truth, tt_word_num(n)),
            "expression of {} disagrees with its table",
            gate.name
        );
        let from_sop = sop_truth(&gate.sop, n);
        assert!(
            tt_equal(&from_sop, &gate.truth, tt_word_num(n)),
            "SOP of {} disagrees with its table",
            gate.name
        );
    }
}

#[test]
fn cnf_implies_exactly_the_function() {
    let lib = Library::from_genlib(test_genlib()).unwrap();
    for gate in lib.gates.iter() {
        let n = gate.num_pins();
        // variables 0..n are the pins, n is the output
        let map: Vec<usize> = (0..=n).collect();
        let mut clauses = Vec::new();
        translate_cnf(&mut clauses, &gate.cnf, &map, None);
        for m in 0..(1usize << n) {
            for out in [false, true] {
                let mut solver = SatSolver::new();
                solver.set_num_vars(n + 1);
                let mut ok = true;
                for c in &clauses {
                    ok &= solver.add_clause(c);
                }
                let mut assumps: Vec<_> =
                    (0..n).map(|v| lit(v, (m >> v) & 1 == 0)).collect();
                assumps.push(lit(n, !out));
                let expected = tt_get_bit(&gate.truth, m) == out;
                let result = ok && solver.solve(&assumps, 0) == SatResult::Sat;
                assert_eq!(
                    result, expected,
                    "gate {} minterm {} out {}",
                    gate.name, m, out
                );
            }
        }
    }
}
