//! End-to-end scenarios for the window-based resynthesis engine.

use rewin_core::driver::{OptParams, Optimizer};
use rewin_core::interp::InterpResult;
use rewin_core::library::{test_genlib, Library};
use rewin_core::netlist::read_netlist;
use rewin_core::network::{MappedNetwork, NodeId};
use rewin_core::timing::{flt2int, PathTiming, Timing};
use rewin_core::truth::{Word, TRUTHS6};

fn lib() -> Library {
    Library::from_genlib(test_genlib()).unwrap()
}

fn net(lib: &Library, text: &str) -> MappedNetwork {
    read_netlist(text, lib).unwrap()
}

fn node_by_name(ntk: &MappedNetwork, name: &str) -> NodeId {
    ntk.objs
        .iter_enumerated()
        .find(|(_, o)| o.valid && o.name.as_deref() == Some(name))
        .unwrap()
        .0
}

fn outputs(lib: &Library, ntk: &MappedNetwork) -> Vec<Vec<Word>> {
    ntk.exhaustive_outputs(lib)
}

fn area_pars() -> OptParams {
    OptParams { area: true, ..OptParams::default() }
}

#[test]
fn s1_constant_propagation() {
    let lib = lib();
    // y = and2(x1, x2 | !x2): the OR subtree is constant-1, the AND then a
    // buffer, and the buffer is absorbed, leaving y = x1
    let text = "INPUT(x1)\nINPUT(x2)\nOUTPUT(y)\n\
                nx2 = inv1(x2)\nb = or2(x2, nx2)\ny = and2(x1, b)\n";
    let ntk = net(&lib, text);
    let before = outputs(&lib, &ntk);
    let mut opt = Optimizer::new(&lib, ntk, area_pars());
    let changed = opt.run();
    let ntk = opt.ntk;
    ntk.check_consistency(&lib);
    assert_eq!(outputs(&lib, &ntk), before);
    assert!(changed >= 2, "expected a chain of simplifications, got {}", changed);
    assert_eq!(ntk.node_num(), 0, "everything should fold into the input");
    let po_root = ntk.obj(ntk.pos[0]).fanins[0];
    assert_eq!(ntk.obj(po_root).name.as_deref(), Some("x1"));
    assert!(opt.stats.const1 >= 1);
}

#[test]
fn s2_single_variable_interpolant() {
    let lib = lib();
    // y = (x1 | x2) & (x1 & !x2); over {x1, x2} the admissible function is
    // exactly x1 & !x2
    let text = "INPUT(x1)\nINPUT(x2)\nOUTPUT(y)\n\
                n_or = or2(x1, x2)\nn_not = inv1(x2)\nn_and = and2(x1, n_not)\n\
                y = and2(n_or, n_and)\n";
    let ntk = net(&lib, text);
    let pivot = node_by_name(&ntk, "y");
    let mut opt = Optimizer::new(&lib, ntk, area_pars());
    let ndivs = opt.extract_window(pivot);
    opt.ndivs = ndivs;
    assert!(opt.prepare_solver());
    let x1 = opt
        .map
        .iter()
        .position(|&n| opt.ntk.obj(n).name.as_deref() == Some("x1"))
        .unwrap();
    let x2 = opt
        .map
        .iter()
        .position(|&n| opt.ntk.obj(n).name.as_deref() == Some("x2"))
        .unwrap();
    match opt.compute_interpolant(&[x1, x2]) {
        InterpResult::Table(t) => assert_eq!(t, TRUTHS6[0] & !TRUTHS6[1]),
        other => panic!("expected a table, got {:?}", other),
    }
}

#[test]
fn s2_resubstitution_shrinks_the_cone() {
    let lib = lib();
    let text = "INPUT(x1)\nINPUT(x2)\nOUTPUT(y)\n\
                n_or = or2(x1, x2)\nn_not = inv1(x2)\nn_and = and2(x1, n_not)\n\
                y = and2(n_or, n_and)\n";
    let ntk = net(&lib, text);
    let before = outputs(&lib, &ntk);
    let area_before: f64 = ntk.topo_order().map(|n| lib.gate(ntk.obj(n).gate.unwrap()).area).sum();
    let mut pars = area_pars();
    pars.resub_first = true;
    let mut opt = Optimizer::new(&lib, ntk, pars);
    opt.run();
    let ntk = opt.ntk;
    ntk.check_consistency(&lib);
    assert_eq!(outputs(&lib, &ntk), before);
    let area_after: f64 = ntk.topo_order().map(|n| lib.gate(ntk.obj(n).gate.unwrap()).area).sum();
    assert!(
        area_after < area_before,
        "area must drop ({} -> {})",
        area_before,
        area_after
    );
    // the admissible replacement is a single AND with a complemented input
    assert!(ntk.node_num() <= 2);
}

#[test]
fn s3_and_or_shortcut() {
    let lib = lib();
    let text = "INPUT(x1)\nINPUT(x2)\nINPUT(x3)\nINPUT(x4)\nOUTPUT(y)\n\
                a1 = and2(x1, x2)\na2 = and2(a1, x3)\ny = and2(a2, x4)\n";
    let ntk = net(&lib, text);
    let before = outputs(&lib, &ntk);
    let mut pars = area_pars();
    pars.use_and_or = true;
    let mut opt = Optimizer::new(&lib, ntk, pars);
    opt.run();
    let ntk = opt.ntk;
    ntk.check_consistency(&lib);
    assert_eq!(outputs(&lib, &ntk), before);
    assert!(opt.stats.and_or >= 1, "the multi-literal shortcut should fire");
    assert_eq!(ntk.node_num(), 1);
    let root = ntk.obj(ntk.pos[0]).fanins[0];
    assert_eq!(lib.gate(ntk.obj(root).gate.unwrap()).name, "and4");
}

#[test]
fn s4_observability_refuses_wrong_replacements() {
    let lib = lib();
    // both roots observe `a`: its care-set is full and only an equivalent
    // AND may replace it
    let text = "INPUT(x1)\nINPUT(x2)\nINPUT(x3)\nINPUT(x4)\nOUTPUT(b)\nOUTPUT(c)\n\
                a = and2(x1, x2)\nb = or2(a, x3)\nc = and2(a, x4)\n";
    let ntk = net(&lib, text);
    let before = outputs(&lib, &ntk);
    let mut opt = Optimizer::new(&lib, ntk, area_pars());
    opt.run();
    let ntk = opt.ntk;
    ntk.check_consistency(&lib);
    assert_eq!(outputs(&lib, &ntk), before);
    assert_eq!(ntk.node_num(), 3, "nothing here is improvable");
}

#[test]
fn s5_delay_remapping_with_and3() {
    let lib = lib();
    let text = "INPUT(x1)\nINPUT(x2)\nINPUT(x3)\nINPUT(x4)\nOUTPUT(y)\n\
                a = and2(x1, x2)\nb = and2(a, x3)\ny = and2(b, x4)\n";
    let ntk = net(&lib, text);
    let before = outputs(&lib, &ntk);
    assert_eq!(PathTiming::new(&lib, &ntk, 1).ntk_delay(), flt2int(3.0));
    let pars = OptParams {
        area: false,
        delta_crit: 1,
        time_win: 10,
        ..OptParams::default()
    };
    let mut opt = Optimizer::new(&lib, ntk, pars);
    let changed = opt.run();
    let ntk = opt.ntk;
    ntk.check_consistency(&lib);
    assert_eq!(outputs(&lib, &ntk), before);
    assert!(changed >= 1);
    // and2(and2(a, x3)) collapses into and3, shaving a full level
    let delay = PathTiming::new(&lib, &ntk, 1).ntk_delay();
    assert_eq!(delay, flt2int(2.2));
}

#[test]
fn s6_conflict_budget_degrades_gracefully() {
    let lib = lib();
    // a 7-input xor chain: no bounded-support replacement exists, and a
    // one-conflict budget turns the hard queries into timeouts
    let mut text = String::from(
        "INPUT(x1)\nINPUT(x2)\nINPUT(x3)\nINPUT(x4)\nINPUT(x5)\nINPUT(x6)\nINPUT(x7)\nOUTPUT(c6)\n",
    );
    text.push_str("c1 = xor2(x1, x2)\n");
    for i in 2..=6 {
        text.push_str(&format!("c{} = xor2(c{}, x{})\n", i, i - 1, i + 1));
    }
    let ntk = net(&lib, &text);
    let before = outputs(&lib, &ntk);
    let nodes_before = ntk.node_num();
    let mut pars = area_pars();
    pars.bt_limit = 1;
    let mut opt = Optimizer::new(&lib, ntk, pars);
    let changed = opt.run();
    let ntk = opt.ntk;
    ntk.check_consistency(&lib);
    assert_eq!(outputs(&lib, &ntk), before);
    assert_eq!(changed, 0);
    assert_eq!(ntk.node_num(), nodes_before);
    assert!(opt.stats.tried > 0);
}

#[test]
fn area_pass_preserves_functions_on_random_networks() {
    let lib = lib();
    // a few hand-rolled irregular networks with shared logic and inverters
    let texts = [
        "INPUT(x1)\nINPUT(x2)\nINPUT(x3)\nOUTPUT(f)\nOUTPUT(g)\n\
         i1 = inv1(x1)\na = and2(i1, x2)\nb = or2(a, x3)\nc = nand2(x2, x3)\n\
         f = xor2(b, c)\ng = and2(b, x1)\n",
        "INPUT(x1)\nINPUT(x2)\nINPUT(x3)\nINPUT(x4)\nOUTPUT(f)\n\
         a = nor2(x1, x2)\nb = nand2(x3, x4)\nc = xor2(a, b)\nd = or2(c, x1)\n\
         f = and2(d, b)\n",
        "INPUT(x1)\nINPUT(x2)\nINPUT(x3)\nINPUT(x4)\nINPUT(x5)\nOUTPUT(f)\n\
         a = mux21(x1, x2, x3)\nb = and3(x3, x4, x5)\nc = or2(a, b)\n\
         d = andb2(c, x2)\nf = orb2(d, x5)\n",
    ];
    for (k, text) in texts.iter().enumerate() {
        let ntk = net(&lib, text);
        let before = outputs(&lib, &ntk);
        let mut pars = area_pars();
        pars.more_effort = true;
        pars.use_and_or = true;
        let mut opt = Optimizer::new(&lib, ntk, pars);
        opt.run();
        let ntk = opt.ntk;
        ntk.check_consistency(&lib);
        assert_eq!(outputs(&lib, &ntk), before, "network {} changed function", k);
    }
}

#[test]
fn area_pass_with_simulation_care_sets() {
    let lib = lib();
    let text = "INPUT(x1)\nINPUT(x2)\nINPUT(x3)\nOUTPUT(f)\nOUTPUT(g)\n\
                i1 = inv1(x1)\na = and2(i1, x2)\nb = or2(a, x3)\nc = nand2(x2, x3)\n\
                f = xor2(b, c)\ng = and2(b, x1)\n";
    let ntk = net(&lib, text);
    let before = outputs(&lib, &ntk);
    let mut pars = area_pars();
    pars.use_sim = true;
    let mut opt = Optimizer::new(&lib, ntk, pars);
    opt.run();
    let ntk = opt.ntk;
    ntk.check_consistency(&lib);
    assert_eq!(outputs(&lib, &ntk), before);
}

#[test]
fn reverse_area_pass_matches_forward_semantics() {
    let lib = lib();
    let text = "INPUT(x1)\nINPUT(x2)\nOUTPUT(y)\n\
                nx2 = inv1(x2)\nb = or2(x2, nx2)\ny = and2(x1, b)\n";
    let ntk = net(&lib, text);
    let before = outputs(&lib, &ntk);
    let mut pars = area_pars();
    pars.area_rev = true;
    let mut opt = Optimizer::new(&lib, ntk, pars);
    opt.run();
    let ntk = opt.ntk;
    ntk.check_consistency(&lib);
    assert_eq!(outputs(&lib, &ntk), before);
    assert_eq!(ntk.node_num(), 0);
}

#[test]
fn changed_node_budget_is_respected() {
    let lib = lib();
    let text = "INPUT(x1)\nINPUT(x2)\nOUTPUT(y)\n\
                nx2 = inv1(x2)\nb = or2(x2, nx2)\ny = and2(x1, b)\n";
    let ntk = net(&lib, text);
    let before = outputs(&lib, &ntk);
    let mut pars = area_pars();
    pars.nodes_max = 1;
    let mut opt = Optimizer::new(&lib, ntk, pars);
    let changed = opt.run();
    let ntk = opt.ntk;
    ntk.check_consistency(&lib);
    assert_eq!(changed, 1);
    assert_eq!(outputs(&lib, &ntk), before);
}

#[test]
fn compress_after_a_pass_keeps_functions() {
    let lib = lib();
    let text = "INPUT(x1)\nINPUT(x2)\nINPUT(x3)\nINPUT(x4)\nOUTPUT(y)\n\
                a1 = and2(x1, x2)\na2 = and2(a1, x3)\ny = and2(a2, x4)\n";
    let ntk = net(&lib, text);
    let before = outputs(&lib, &ntk);
    let mut pars = area_pars();
    pars.use_and_or = true;
    let mut opt = Optimizer::new(&lib, ntk, pars);
    opt.run();
    let mut ntk = opt.ntk;
    ntk.compress();
    ntk.check_consistency(&lib);
    assert_eq!(outputs(&lib, &ntk), before);
}
