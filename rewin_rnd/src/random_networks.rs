use itertools::Itertools;
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use rewin_core::library::{GateId, Library};
use rewin_core::netlist::read_netlist;
use rewin_core::network::MappedNetwork;

/// A randomly generated mapped network, kept both as its netlist text and
/// as the parsed structure.
pub struct RandomNetwork {
    pub text: String,
    pub ntk: MappedNetwork,
    _n_nodes: usize,
}

impl RandomNetwork {
    pub fn ntk(self) -> MappedNetwork {
        self.ntk
    }

    /// Create a random mapped network over the given library. Every node
    /// picks a random multi-input cell and wires distinct earlier signals
    /// (biased toward recent ones so the network gains depth); signals
    /// without fanout become the outputs.
    pub fn new_random(lib: &Library, n_inputs: usize, n_nodes: usize, seed: u64) -> Self {
        assert!(n_inputs >= 2, "we need at least two inputs");
        let mut rng = StdRng::seed_from_u64(seed);
        // multi-input cells only; constants and buffers make trivial nodes
        let cells: Vec<GateId> = lib
            .gates
            .iter()
            .filter(|g| g.num_pins() >= 2 && g.num_pins() <= n_inputs)
            .map(|g| g.cell_id)
            .collect_vec();
        assert!(!cells.is_empty(), "the library has no usable multi-input cells");

        let inputs = (0..n_inputs).map(|i| format!("x{}", i)).collect_vec();
        let mut signals = inputs.clone();
        let mut used = vec![false; n_inputs];
        let mut lines: Vec<String> = inputs.iter().map(|x| format!("INPUT({})", x)).collect_vec();

        for i in 0..n_nodes {
            let name = format!("g{}", i);
            let gate = loop {
                let g = lib.gate(cells[rng.gen_range(0..cells.len())]);
                if g.num_pins() <= signals.len() {
                    break g;
                }
            };
            // prefer signals from the recent window so depth builds up
            let window = signals.len().min(3 * gate.num_pins().max(3));
            let mut pool: Vec<usize> = (signals.len() - window..signals.len()).collect();
            pool.shuffle(&mut rng);
            let picked = pool[0..gate.num_pins()].to_vec();
            let args = picked.iter().map(|&k| signals[k].clone()).join(", ");
            for k in picked {
                used[k] = true;
            }
            lines.push(format!("{} = {}({})", name, gate.name, args));
            signals.push(name);
            used.push(false);
        }
        // every sink becomes an output; guarantee at least one
        let mut outs = signals
            .iter()
            .enumerate()
            .skip(n_inputs)
            .filter(|(k, _)| !used[*k])
            .map(|(_, s)| s.clone())
            .collect_vec();
        if outs.is_empty() {
            outs.push(signals.last().unwrap().clone());
        }
        for o in &outs {
            lines.push(format!("OUTPUT({})", o));
        }
        let text = lines.join("\n") + "\n";
        let ntk = read_netlist(&text, lib).expect("generated netlist must parse");
        RandomNetwork {
            text,
            ntk,
            _n_nodes: n_nodes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rewin_core::library::test_genlib;

    #[test]
    fn generated_networks_are_consistent() {
        let lib = Library::from_genlib(test_genlib()).unwrap();
        for seed in 0..8 {
            let rnd = RandomNetwork::new_random(&lib, 5, 20, seed);
            assert_eq!(rnd.ntk.pi_num(), 5);
            assert!(rnd.ntk.po_num() >= 1);
            rnd.ntk.check_consistency(&lib);
        }
    }

    #[test]
    fn same_seed_same_network() {
        let lib = Library::from_genlib(test_genlib()).unwrap();
        let a = RandomNetwork::new_random(&lib, 4, 12, 7);
        let b = RandomNetwork::new_random(&lib, 4, 12, 7);
        assert_eq!(a.text, b.text);
    }
}
