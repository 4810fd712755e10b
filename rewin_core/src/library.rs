//! Standard-cell library model built from genlib text.
//!
//! Every gate carries its functionality in three forms at once: the parsed
//! expression, an SOP cover string, and a truth table, plus the derived
//! clause stream. All four are materialized at ingest and never recomputed.

use crate::cnf::truth_to_cnf;
use crate::expr::Expr;
use crate::parse::{collect_names, parse_formula};
use crate::sop::derive_sop;
use crate::truth::{
    tt_equal, tt_flip, tt_swap_adjacent, tt_word_num, Cube, Word, SUPP_MAX, TRUTHS6, WORD_MAX,
};
use index_vec::IndexVec;
use itertools::Itertools;
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;

index_vec::define_index_type! {
    pub struct GateId = usize;
    MAX_INDEX = usize::MAX;
    DISABLE_MAX_INDEX_CHECK = cfg!(not(debug_assertions));
}

pub const CONST0_FORMULA: &str = "CONST0";
pub const CONST1_FORMULA: &str = "CONST1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinPhase {
    Inv,
    Noninv,
    Unknown,
}

impl FromStr for PinPhase {
    type Err = ();

    fn from_str(input: &str) -> Result<PinPhase, Self::Err> {
        match input {
            "INV" => Ok(PinPhase::Inv),
            "NONINV" => Ok(PinPhase::Noninv),
            "UNKNOWN" => Ok(PinPhase::Unknown),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Pin {
    pub name: String,
    pub phase: PinPhase,
    pub input_load: f64,
    pub max_load: f64,
    pub delay_block_rise: f64,
    pub delay_fanout_rise: f64,
    pub delay_block_fall: f64,
    pub delay_fanout_fall: f64,
    /// max(rise, fall) block delay, derived at load time.
    pub delay_block_max: f64,
}

#[derive(Debug, Clone)]
pub struct Gate {
    pub name: String,
    pub area: f64,
    pub formula: String,
    pub out_name: String,
    pub pins: Vec<Pin>,
    /// Evaluation-layout expression over the pins in pin order.
    pub expr: Expr,
    /// SOP cover text of the better polarity.
    pub sop: String,
    /// Truth table in canonical column form; one meaningful word for up to
    /// six inputs, four words above that.
    pub truth: [Word; WORD_MAX],
    /// Clause stream over the pins plus the output variable.
    pub cnf: Vec<i8>,
    pub delay_max: f64,
    /// Library-global index; `lib.gate(g.cell_id)` is `g`.
    pub cell_id: GateId,
    /// Second output of a two-output cell, when present.
    pub twin: Option<GateId>,
}

impl Gate {
    pub fn num_pins(&self) -> usize {
        self.pins.len()
    }
}

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("the library text contains no usable gates")]
    NoGates,
    #[error("the library has no {0} gate")]
    MissingBasic(&'static str),
}

/// A gate library: an ordered gate list plus cached distinguished entries.
pub struct Library {
    pub gates: IndexVec<GateId, Gate>,
    by_name: HashMap<String, GateId>,
    pub const0: GateId,
    pub const1: GateId,
    pub buf: GateId,
    pub inv: GateId,
    pub and2: Option<GateId>,
    pub or2: Option<GateId>,
    pub nand2: Option<GateId>,
    pub nor2: Option<GateId>,
}

struct RawPin {
    name: String,
    phase: PinPhase,
    numbers: [f64; 6],
}

struct RawGate {
    name: String,
    area: f64,
    out_name: String,
    formula: String,
    pins: Vec<RawPin>,
}

impl Library {
    pub fn gate(&self, id: GateId) -> &Gate {
        &self.gates[id]
    }

    pub fn num_gates(&self) -> usize {
        self.gates.len()
    }

    pub fn find(&self, name: &str) -> Option<GateId> {
        self.by_name.get(name).copied()
    }

    pub fn inv_delay(&self) -> f64 {
        self.gates[self.inv].delay_max
    }

    pub fn inv_area(&self) -> f64 {
        self.gates[self.inv].area
    }

    /// Read a library from genlib text. Malformed records are reported and
    /// skipped; missing distinguished gates are an error.
    pub fn from_genlib(text: &str) -> Result<Library, LibraryError> {
        let cleaned: String = text
            .lines()
            .map(|l| l.split('#').next().unwrap_or(""))
            .join("\n");
        let tokens = cleaned.split_whitespace().collect_vec();
        let mut raws: Vec<RawGate> = Vec::new();
        let mut i = 0;
        while i < tokens.len() {
            if tokens[i] != "GATE" {
                warn!(token = tokens[i], "skipping stray token in library text");
                i += 1;
                continue;
            }
            match Self::scan_record(&tokens, &mut i) {
                Some(raw) => raws.push(raw),
                None => {
                    // resynchronize on the next GATE keyword
                    while i < tokens.len() && tokens[i] != "GATE" {
                        i += 1;
                    }
                }
            }
        }

        let mut gates: IndexVec<GateId, Gate> = IndexVec::new();
        let mut by_name = HashMap::new();
        let mut cover: Vec<Cube> = Vec::new();
        for raw in raws {
            if by_name.contains_key(&raw.name) {
                warn!(gate = %raw.name, "duplicate gate name, record skipped");
                continue;
            }
            match Self::build_gate(raw, gates.len().into(), &mut cover) {
                Some(gate) => {
                    by_name.insert(gate.name.clone(), gate.cell_id);
                    gates.push(gate);
                }
                None => continue,
            }
        }
        if gates.is_empty() {
            return Err(LibraryError::NoGates);
        }

        let pick = |pred: &dyn Fn(&Gate) -> bool| {
            gates
                .iter()
                .filter(|g| pred(g))
                .min_by(|a, b| a.area.partial_cmp(&b.area).unwrap())
                .map(|g| g.cell_id)
        };
        let const0 = pick(&|g| g.pins.is_empty() && g.truth[0] == 0)
            .ok_or(LibraryError::MissingBasic("constant-0"))?;
        let const1 = pick(&|g| g.pins.is_empty() && g.truth[0] == !0)
            .ok_or(LibraryError::MissingBasic("constant-1"))?;
        let buf = pick(&|g| g.num_pins() == 1 && g.truth[0] == TRUTHS6[0])
            .ok_or(LibraryError::MissingBasic("buffer"))?;
        let inv = pick(&|g| g.num_pins() == 1 && g.truth[0] == !TRUTHS6[0])
            .ok_or(LibraryError::MissingBasic("inverter"))?;
        let and2 = pick(&|g| g.num_pins() == 2 && g.truth[0] == TRUTHS6[0] & TRUTHS6[1]);
        let or2 = pick(&|g| g.num_pins() == 2 && g.truth[0] == (TRUTHS6[0] | TRUTHS6[1]));
        let nand2 = pick(&|g| g.num_pins() == 2 && g.truth[0] == !(TRUTHS6[0] & TRUTHS6[1]));
        let nor2 = pick(&|g| g.num_pins() == 2 && g.truth[0] == !(TRUTHS6[0] | TRUTHS6[1]));

        Ok(Library {
            gates,
            by_name,
            const0,
            const1,
            buf,
            inv,
            and2,
            or2,
            nand2,
            nor2,
        })
    }

    fn scan_record(tokens: &[&str], i: &mut usize) -> Option<RawGate> {
        // GATE <name> <area> <out>=<formula> ;
        let start = *i;
        *i += 1;
        let name = (*tokens.get(*i)?).to_string();
        *i += 1;
        let area: f64 = match tokens.get(*i)?.parse() {
            Ok(a) => a,
            Err(_) => {
                warn!(gate = %name, "bad area field, record skipped");
                *i = start + 1;
                return None;
            }
        };
        *i += 1;
        let mut formula_text = String::new();
        let mut closed = false;
        while *i < tokens.len() {
            let t = tokens[*i];
            *i += 1;
            if let Some(stripped) = t.strip_suffix(';') {
                formula_text.push_str(stripped);
                closed = true;
                break;
            }
            formula_text.push_str(t);
            formula_text.push(' ');
        }
        if !closed {
            warn!(gate = %name, "unterminated formula, record skipped");
            return None;
        }
        let (out_name, formula) = match formula_text.split_once('=') {
            Some((o, f)) => (o.trim().to_string(), f.trim().to_string()),
            None => {
                warn!(gate = %name, "formula without output pin, record skipped");
                return None;
            }
        };
        let mut pins = Vec::new();
        while tokens.get(*i) == Some(&"PIN") {
            if *i + 8 >= tokens.len() {
                warn!(gate = %name, "truncated PIN record");
                *i = tokens.len();
                break;
            }
            let pin_name = tokens[*i + 1].to_string();
            let phase = match PinPhase::from_str(tokens[*i + 2]) {
                Ok(p) => p,
                Err(()) => {
                    warn!(gate = %name, pin = %pin_name, "unknown pin phase, record skipped");
                    *i += 9;
                    return None;
                }
            };
            let mut numbers = [0f64; 6];
            for (k, num) in numbers.iter_mut().enumerate() {
                *num = match tokens[*i + 3 + k].parse() {
                    Ok(v) => v,
                    Err(_) => {
                        warn!(gate = %name, pin = %pin_name, "bad pin number, record skipped");
                        *i += 9;
                        return None;
                    }
                };
            }
            pins.push(RawPin {
                name: pin_name,
                phase,
                numbers,
            });
            *i += 9;
        }
        Some(RawGate {
            name,
            area,
            out_name,
            formula,
            pins,
        })
    }

    fn cook_pin(raw: &RawPin, name: Option<&str>) -> Pin {
        let [input_load, max_load, dbr, dfr, dbf, dff] = raw.numbers;
        Pin {
            name: name.unwrap_or(&raw.name).to_string(),
            phase: raw.phase,
            input_load,
            max_load,
            delay_block_rise: dbr,
            delay_fanout_rise: dfr,
            delay_block_fall: dbf,
            delay_fanout_fall: dff,
            delay_block_max: dbr.max(dbf),
        }
    }

    fn build_gate(raw: RawGate, cell_id: GateId, cover: &mut Vec<Cube>) -> Option<Gate> {
        // constants have an empty pin list
        if raw.pins.is_empty() && (raw.formula == CONST0_FORMULA || raw.formula == CONST1_FORMULA) {
            let is_one = raw.formula == CONST1_FORMULA;
            let expr = if is_one { Expr::const1() } else { Expr::const0() };
            let truth = if is_one { [!0u64; WORD_MAX] } else { [0u64; WORD_MAX] };
            let mut cnf = Vec::new();
            truth_to_cnf(&truth, 0, cover, &mut cnf);
            return Some(Gate {
                name: raw.name,
                area: raw.area,
                out_name: raw.out_name,
                sop: derive_sop(0, &expr),
                formula: raw.formula,
                pins: Vec::new(),
                expr,
                truth,
                cnf,
                delay_max: 0.0,
                cell_id,
                twin: None,
            });
        }

        let names = collect_names(&raw.formula);
        if names.is_empty() {
            warn!(gate = %raw.name, "formula mentions no pins, record skipped");
            return None;
        }
        if names.len() > SUPP_MAX {
            warn!(gate = %raw.name, "more than {} inputs, record skipped", SUPP_MAX);
            return None;
        }
        // a single '*' pin stands for one pin per formula variable
        let pins: Vec<Pin> = if raw.pins.len() == 1 && raw.pins[0].name == "*" {
            names.iter().map(|n| Self::cook_pin(&raw.pins[0], Some(n))).collect()
        } else {
            let pin_names: Vec<&str> = raw.pins.iter().map(|p| p.name.as_str()).collect();
            if names.len() != pin_names.len()
                || names.iter().any(|n| !pin_names.contains(&n.as_str()))
            {
                warn!(
                    gate = raw.name,
                    "formula variables do not match the pin list, record skipped"
                );
                return None;
            }
            raw.pins.iter().map(|p| Self::cook_pin(p, None)).collect()
        };

        let var_names: Vec<String> = pins.iter().map(|p| p.name.clone()).collect();
        let expr = match parse_formula(&raw.formula, &var_names) {
            Ok(e) => e,
            Err(err) => {
                warn!(gate = %raw.name, error = %err, "unparsable formula, record skipped");
                return None;
            }
        };
        let nvars = pins.len();
        let truth = expr.truth(nvars, None);
        let sop = derive_sop(nvars, &expr);
        let mut cnf = Vec::new();
        truth_to_cnf(&truth, nvars, cover, &mut cnf);
        let delay_max = pins.iter().map(|p| p.delay_block_max).fold(0.0, f64::max);
        Some(Gate {
            name: raw.name,
            area: raw.area,
            formula: raw.formula,
            out_name: raw.out_name,
            pins,
            expr,
            sop,
            truth,
            cnf,
            delay_max,
            cell_id,
            twin: None,
        })
    }

    /// Find a gate realizing the same function with input `ifanin`
    /// complemented, allowing the complemented input to sit one position
    /// away. Returns the gate and the new input position.
    pub fn find_compl_input_gate(
        &self,
        gate: GateId,
        nfanins: usize,
        ifanin: usize,
    ) -> Option<(GateId, usize)> {
        assert!(ifanin < nfanins);
        if nfanins > 6 {
            return None;
        }
        let nwords = tt_word_num(nfanins);
        let mut flipped = self.gates[gate].truth;
        tt_flip(&mut flipped, nwords, ifanin);
        let scan = |tt: &[Word; WORD_MAX]| {
            self.gates
                .iter()
                .find(|g| g.num_pins() == nfanins && tt_equal(&g.truth, tt, nwords))
                .map(|g| g.cell_id)
        };
        if let Some(g) = scan(&flipped) {
            return Some((g, ifanin));
        }
        if ifanin > 0 {
            let mut swapped = flipped;
            tt_swap_adjacent(&mut swapped, nwords, ifanin - 1);
            if let Some(g) = scan(&swapped) {
                return Some((g, ifanin - 1));
            }
        }
        if ifanin + 1 < nfanins {
            let mut swapped = flipped;
            tt_swap_adjacent(&mut swapped, nwords, ifanin);
            if let Some(g) = scan(&swapped) {
                return Some((g, ifanin + 1));
            }
        }
        None
    }
}

/// A small library used across the test suites.
pub fn test_genlib() -> &'static str {
    "\
GATE zero 0.5 O=CONST0;\n\
GATE one 0.5 O=CONST1;\n\
GATE buf1 1 O=a; PIN a NONINV 1 999 1 0 1 0\n\
GATE inv1 1 O=!a; PIN a INV 1 999 0.9 0 0.9 0\n\
GATE and2 2 O=a*b; PIN * NONINV 1 999 1 0 1 0\n\
GATE or2 2 O=a+b; PIN * NONINV 1 999 1 0 1 0\n\
GATE nand2 1.5 O=!(a*b); PIN * INV 1 999 1 0 1 0\n\
GATE nor2 1.5 O=!(a+b); PIN * INV 1 999 1 0 1 0\n\
GATE and3 3 O=a*b*c; PIN * NONINV 1 999 1.2 0 1.2 0\n\
GATE or3 3 O=a+b+c; PIN * NONINV 1 999 1.2 0 1.2 0\n\
GATE and4 4 O=a*b*c*d; PIN * NONINV 1 999 1.4 0 1.4 0\n\
GATE xor2 3 O=a^b; PIN * UNKNOWN 1 999 1.8 0 1.8 0\n\
GATE andb2 2 O=a*!b; PIN * UNKNOWN 1 999 1 0 1 0\n\
GATE orb2 2 O=a+!b; PIN * UNKNOWN 1 999 1 0 1 0\n\
GATE mux21 4 O=s*b+!s*a; PIN * UNKNOWN 1 999 1.6 0 1.6 0\n\
"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_test_library() {
        let lib = Library::from_genlib(test_genlib()).unwrap();
        assert_eq!(lib.gate(lib.const0).truth[0], 0);
        assert_eq!(lib.gate(lib.const1).truth[0], !0);
        assert_eq!(lib.gate(lib.buf).name, "buf1");
        assert_eq!(lib.gate(lib.inv).name, "inv1");
        assert_eq!(lib.gate(lib.and2.unwrap()).name, "and2");
        assert_eq!(lib.gate(lib.nor2.unwrap()).name, "nor2");
        // cell ids index back into the gate list
        for g in lib.gates.iter() {
            assert_eq!(lib.gate(g.cell_id).name, g.name);
        }
    }

    #[test]
    fn star_pin_expansion() {
        let lib = Library::from_genlib(test_genlib()).unwrap();
        let and3 = lib.gate(lib.find("and3").unwrap());
        assert_eq!(and3.num_pins(), 3);
        assert_eq!(
            and3.pins.iter().map(|p| p.name.as_str()).collect_vec(),
            vec!["a", "b", "c"]
        );
        assert_eq!(and3.truth[0], TRUTHS6[0] & TRUTHS6[1] & TRUTHS6[2]);
    }

    #[test]
    fn three_forms_agree() {
        let lib = Library::from_genlib(test_genlib()).unwrap();
        let mux = lib.gate(lib.find("mux21").unwrap());
        // pins in formula order: s, b, a
        let expect = (TRUTHS6[0] & TRUTHS6[1]) | (!TRUTHS6[0] & TRUTHS6[2]);
        assert_eq!(mux.truth[0], expect);
        assert_eq!(mux.expr.truth(3, None)[0], expect);
        assert!(!mux.cnf.is_empty());
        assert!(!mux.sop.is_empty());
    }

    #[test]
    fn bad_records_are_skipped() {
        let text = format!(
            "GATE broken 1 O=a*undeclared; PIN a NONINV 1 999 1 0 1 0\n\
             GATE badnum x O=a; PIN a NONINV 1 999 1 0 1 0\n\
             {}",
            test_genlib()
        );
        let lib = Library::from_genlib(&text).unwrap();
        assert!(lib.find("broken").is_none());
        assert!(lib.find("badnum").is_none());
        assert!(lib.find("and2").is_some());
    }

    #[test]
    fn compl_input_lookup() {
        let lib = Library::from_genlib(test_genlib()).unwrap();
        let and2 = lib.and2.unwrap();
        // and2 with second input complemented is andb2
        let (g, pos) = lib.find_compl_input_gate(and2, 2, 1).unwrap();
        assert_eq!(lib.gate(g).name, "andb2");
        assert_eq!(pos, 1);
        // and2 with first input complemented matches andb2 after a swap
        let (g, pos) = lib.find_compl_input_gate(and2, 2, 0).unwrap();
        assert_eq!(lib.gate(g).name, "andb2");
        assert_eq!(pos, 1);
        // inverter input flip turns it into a buffer
        let (g, _) = lib.find_compl_input_gate(lib.inv, 1, 0).unwrap();
        assert_eq!(g, lib.buf);
    }
}
