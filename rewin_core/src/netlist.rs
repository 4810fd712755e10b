//! BENCH-style text for mapped networks.
//!
//! ```text
//! # comment
//! INPUT(x1)
//! OUTPUT(y)
//! n1 = and2(x1, x2)
//! y = or2(n1, x3)
//! ```
//!
//! Signal definitions may appear in any order; fanin order follows the
//! gate's pin order.

use crate::library::Library;
use crate::network::{MappedNetwork, NodeId};
use itertools::Itertools;
use std::collections::HashMap;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum NetlistError {
    #[error("line {0}: unknown gate \"{1}\"")]
    UnknownGate(usize, String),
    #[error("line {0}: gate \"{1}\" takes {2} inputs, {3} given")]
    FaninCount(usize, String, usize, usize),
    #[error("signal \"{0}\" is never defined")]
    UndefinedSignal(String),
    #[error("signal \"{0}\" is defined twice")]
    DuplicateSignal(String),
    #[error("combinational loop through \"{0}\"")]
    Loop(String),
    #[error("the netlist defines no outputs")]
    NoOutputs,
}

struct NodeDef {
    gate: String,
    args: Vec<String>,
    line: usize,
}

/// Stable printable name of an object.
pub fn obj_name(ntk: &MappedNetwork, id: NodeId) -> String {
    match &ntk.obj(id).name {
        Some(n) => n.clone(),
        None => format!("n{}", id.raw()),
    }
}

pub fn read_netlist(text: &str, lib: &Library) -> Result<MappedNetwork, NetlistError> {
    let mut ntk = MappedNetwork::new();
    let mut defs: HashMap<String, NodeDef> = HashMap::new();
    let mut signals: HashMap<String, NodeId> = HashMap::new();
    let mut outputs: Vec<String> = Vec::new();

    for (lineno, raw) in text.lines().enumerate() {
        let line = raw.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        if let Some(name) = parse_call(line, "INPUT") {
            if signals.contains_key(&name) {
                return Err(NetlistError::DuplicateSignal(name));
            }
            let id = ntk.add_pi(&name);
            signals.insert(name, id);
            continue;
        }
        if let Some(name) = parse_call(line, "OUTPUT") {
            outputs.push(name);
            continue;
        }
        match parse_def(line) {
            Some((name, gate, args)) => {
                if signals.contains_key(&name) || defs.contains_key(&name) {
                    return Err(NetlistError::DuplicateSignal(name));
                }
                defs.insert(name, NodeDef { gate, args, line: lineno + 1 });
            }
            None => {
                warn!(line = lineno + 1, text = line, "unreadable netlist record, skipped");
            }
        }
    }
    if outputs.is_empty() {
        return Err(NetlistError::NoOutputs);
    }

    // instantiate definitions depth-first
    fn build(
        name: &str,
        ntk: &mut MappedNetwork,
        lib: &Library,
        defs: &HashMap<String, NodeDef>,
        signals: &mut HashMap<String, NodeId>,
        pending: &mut Vec<String>,
    ) -> Result<NodeId, NetlistError> {
        if let Some(&id) = signals.get(name) {
            return Ok(id);
        }
        if pending.iter().any(|p| p == name) {
            return Err(NetlistError::Loop(name.to_string()));
        }
        let def = defs
            .get(name)
            .ok_or_else(|| NetlistError::UndefinedSignal(name.to_string()))?;
        let gate_id = lib
            .find(&def.gate)
            .ok_or_else(|| NetlistError::UnknownGate(def.line, def.gate.clone()))?;
        if lib.gate(gate_id).num_pins() != def.args.len() {
            return Err(NetlistError::FaninCount(
                def.line,
                def.gate.clone(),
                lib.gate(gate_id).num_pins(),
                def.args.len(),
            ));
        }
        pending.push(name.to_string());
        let mut fanins = Vec::with_capacity(def.args.len());
        for arg in &def.args {
            fanins.push(build(arg, ntk, lib, defs, signals, pending)?);
        }
        pending.pop();
        let id = ntk.add_node(lib.gate(gate_id), &fanins);
        ntk.obj_mut(id).name = Some(name.to_string());
        signals.insert(name.to_string(), id);
        Ok(id)
    }

    let mut pending = Vec::new();
    let out_names = outputs;
    for name in &out_names {
        let root = build(name, &mut ntk, lib, &defs, &mut signals, &mut pending)?;
        ntk.add_po(name, root);
    }
    ntk.compute_levels();
    Ok(ntk)
}

fn parse_call(line: &str, keyword: &str) -> Option<String> {
    let rest = line.strip_prefix(keyword)?.trim();
    let inner = rest.strip_prefix('(')?.strip_suffix(')')?;
    let name = inner.trim();
    (!name.is_empty()).then(|| name.to_string())
}

fn parse_def(line: &str) -> Option<(String, String, Vec<String>)> {
    let (name, rhs) = line.split_once('=')?;
    let rhs = rhs.trim();
    let open = rhs.find('(')?;
    let gate = rhs[..open].trim().to_string();
    let inner = rhs[open + 1..].strip_suffix(')')?;
    let args = inner
        .split(',')
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .collect_vec();
    if gate.is_empty() || args.is_empty() {
        return None;
    }
    Some((name.trim().to_string(), gate, args))
}

pub fn write_netlist(ntk: &MappedNetwork, lib: &Library) -> String {
    let mut out = String::new();
    for &pi in &ntk.pis {
        out.push_str(&format!("INPUT({})\n", obj_name(ntk, pi)));
    }
    for &po in &ntk.pos {
        out.push_str(&format!("OUTPUT({})\n", obj_name(ntk, ntk.obj(po).fanins[0])));
    }
    for id in ntk.topo_order() {
        let obj = ntk.obj(id);
        let gate = lib.gate(obj.gate.expect("mapped node without a gate"));
        let args = obj.fanins.iter().map(|&f| obj_name(ntk, f)).join(", ");
        out.push_str(&format!("{} = {}({})\n", obj_name(ntk, id), gate.name, args));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::{test_genlib, Library};

    const SAMPLE: &str = "\
# tiny sample
INPUT(x1)
INPUT(x2)
INPUT(x3)
OUTPUT(y)
y = or2(n1, x3)
n1 = and2(x1, x2)
";

    #[test]
    fn read_and_write_round_trip() {
        let lib = Library::from_genlib(test_genlib()).unwrap();
        let ntk = read_netlist(SAMPLE, &lib).unwrap();
        assert_eq!(ntk.pi_num(), 3);
        assert_eq!(ntk.po_num(), 1);
        assert_eq!(ntk.node_num(), 2);
        ntk.check_consistency(&lib);
        let text = write_netlist(&ntk, &lib);
        let again = read_netlist(&text, &lib).unwrap();
        assert_eq!(again.exhaustive_outputs(&lib), ntk.exhaustive_outputs(&lib));
    }

    #[test]
    fn rejects_cycles_and_unknowns() {
        let lib = Library::from_genlib(test_genlib()).unwrap();
        let cyclic = "INPUT(a)\nOUTPUT(p)\np = and2(q, a)\nq = and2(p, a)\n";
        assert!(matches!(read_netlist(cyclic, &lib), Err(NetlistError::Loop(_))));
        let unknown = "INPUT(a)\nOUTPUT(y)\ny = frob3(a, a, a)\n";
        assert!(matches!(read_netlist(unknown, &lib), Err(NetlistError::UnknownGate(_, _))));
        let undefined = "INPUT(a)\nOUTPUT(y)\ny = and2(a, ghost)\n";
        assert!(matches!(
            read_netlist(undefined, &lib),
            Err(NetlistError::UndefinedSignal(_))
        ));
    }

    #[test]
    fn skips_unreadable_records() {
        let lib = Library::from_genlib(test_genlib()).unwrap();
        let text = "INPUT(a)\nINPUT(b)\nOUTPUT(y)\nthis is noise\ny = and2(a, b)\n";
        let ntk = read_netlist(text, &lib).unwrap();
        assert_eq!(ntk.node_num(), 1);
    }
}
