//! Fault lists over a mapped network.
//!
//! Line format: `<seq> <node_name> <fault_kind>` where the kind is one of
//! the core faults `SA0`, `SA1`, `NEG`, or the name of a library cell
//! standing for "replace this node's gate by the named cell".

use crate::library::{GateId, Library};
use crate::netlist::obj_name;
use crate::network::{MappedNetwork, NodeId};
use std::collections::HashMap;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    Sa0,
    Sa1,
    Neg,
    Cell(GateId),
}

impl FaultKind {
    pub fn text(self, lib: &Library) -> String {
        match self {
            FaultKind::Sa0 => "SA0".to_string(),
            FaultKind::Sa1 => "SA1".to_string(),
            FaultKind::Neg => "NEG".to_string(),
            FaultKind::Cell(g) => lib.gate(g).name.clone(),
        }
    }
}

#[derive(Error, Debug)]
pub enum FaultListError {
    #[error("the name \"{0}\" appears twice among inputs and nodes")]
    AmbiguousName(String),
}

/// Print the fault list of every node: the three core faults, plus (unless
/// `stuck_only`) every same-input-count alternative cell.
pub fn write_fault_list(ntk: &MappedNetwork, lib: &Library, stuck_only: bool) -> String {
    let mut out = String::new();
    let mut count = 1usize;
    for (id, obj) in ntk.objs.iter_enumerated() {
        if !obj.valid || !ntk.is_node(id) {
            continue;
        }
        let name = obj_name(ntk, id);
        for kind in ["SA0", "SA1", "NEG"] {
            out.push_str(&format!("{} {} {}\n", count, name, kind));
            count += 1;
        }
        if stuck_only {
            continue;
        }
        let own = obj.gate.expect("mapped node without a gate");
        let ninputs = lib.gate(own).num_pins();
        for gate in lib.gates.iter() {
            if gate.cell_id != own && gate.num_pins() == ninputs {
                out.push_str(&format!("{} {} {}\n", count, name, gate.name));
                count += 1;
            }
        }
    }
    out
}

/// Parse a fault list back into `(node, kind)` pairs. Records with gaps in
/// the sequence numbers, unknown names, or unknown kinds are reported and
/// skipped.
pub fn read_fault_list(
    ntk: &MappedNetwork,
    lib: &Library,
    text: &str,
) -> Result<Vec<(NodeId, FaultKind)>, FaultListError> {
    let mut names: HashMap<String, NodeId> = HashMap::new();
    for (id, obj) in ntk.objs.iter_enumerated() {
        if !obj.valid || ntk.is_po(id) {
            continue;
        }
        let name = obj_name(ntk, id);
        if names.insert(name.clone(), id).is_some() {
            return Err(FaultListError::AmbiguousName(name));
        }
    }
    let mut pairs = Vec::new();
    let mut expected = 1usize;
    for raw in text.lines() {
        let mut tokens = raw.split_whitespace();
        let seq = match tokens.next() {
            Some(t) => t,
            None => continue,
        };
        let seq: usize = match seq.parse() {
            Ok(s) => s,
            Err(_) => {
                warn!(line = raw, "fault record without a sequence number, skipped");
                continue;
            }
        };
        if seq != expected {
            warn!(got = seq, expected, "sequence gap in the fault list");
        }
        expected = seq + 1;
        let name = match tokens.next() {
            Some(t) => t,
            None => {
                warn!(line = raw, "fault record without a node name, skipped");
                continue;
            }
        };
        let id = match names.get(name) {
            Some(&id) => id,
            None => {
                warn!(node = name, "fault names an unknown object, skipped");
                continue;
            }
        };
        let kind_text = match tokens.next() {
            Some(t) => t,
            None => {
                warn!(line = raw, "fault record without a kind, skipped");
                continue;
            }
        };
        let kind = match kind_text {
            "SA0" => FaultKind::Sa0,
            "SA1" => FaultKind::Sa1,
            "NEG" => FaultKind::Neg,
            other => match lib.find(other) {
                Some(g) => FaultKind::Cell(g),
                None => {
                    warn!(kind = other, "unknown fault kind, skipped");
                    continue;
                }
            },
        };
        pairs.push((id, kind));
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::test_genlib;
    use crate::netlist::read_netlist;

    fn sample(lib: &Library) -> MappedNetwork {
        read_netlist(
            "INPUT(a)\nINPUT(b)\nOUTPUT(y)\nn1 = and2(a, b)\ny = inv1(n1)\n",
            lib,
        )
        .unwrap()
    }

    #[test]
    fn stuck_at_round_trip() {
        let lib = Library::from_genlib(test_genlib()).unwrap();
        let ntk = sample(&lib);
        let text = write_fault_list(&ntk, &lib, true);
        assert_eq!(text.lines().count(), 6); // 2 nodes x 3 core faults
        let pairs = read_fault_list(&ntk, &lib, &text).unwrap();
        assert_eq!(pairs.len(), 6);
        assert_eq!(pairs[0].1, FaultKind::Sa0);
        assert_eq!(pairs[2].1, FaultKind::Neg);
    }

    #[test]
    fn cell_faults_cover_same_arity() {
        let lib = Library::from_genlib(test_genlib()).unwrap();
        let ntk = sample(&lib);
        let text = write_fault_list(&ntk, &lib, false);
        let pairs = read_fault_list(&ntk, &lib, &text).unwrap();
        // every alternative kind names a cell with matching input count
        for (id, kind) in &pairs {
            if let FaultKind::Cell(g) = kind {
                let own = ntk.obj(*id).gate.unwrap();
                assert_ne!(*g, own);
                assert_eq!(lib.gate(*g).num_pins(), lib.gate(own).num_pins());
            }
        }
        // and2 has six same-arity alternatives in the test library
        let n1_cells = pairs
            .iter()
            .filter(|(id, k)| obj_name(&ntk, *id) == "n1" && matches!(k, FaultKind::Cell(_)))
            .count();
        assert_eq!(n1_cells, 6);
    }

    #[test]
    fn bad_records_are_skipped() {
        let lib = Library::from_genlib(test_genlib()).unwrap();
        let ntk = sample(&lib);
        let text = "1 n1 SA0\n3 ghost SA1\n4 n1 FROB\n5 y NEG\n";
        let pairs = read_fault_list(&ntk, &lib, text).unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[1].1, FaultKind::Neg);
    }
}
