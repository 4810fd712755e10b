//! Parsing of genlib Boolean formulas into expression arrays.

use crate::expr::Expr;
use itertools::Itertools;
use thiserror::Error;

const SYM_OPEN: char = '(';
const SYM_CLOSE: char = ')';
const SYM_CONST0: char = '0';
const SYM_CONST1: char = '1';
const SYM_NEG: char = '!';
const SYM_NEG_AFTER: char = '\'';
const SYM_AND: char = '*';
const SYM_AND2: char = '&';
const SYM_XOR: char = '^';
const SYM_OR: char = '+';
const SYM_OR2: char = '|';

// opcodes double as precedence
const OPER_NEG: u8 = 10;
const OPER_AND: u8 = 9;
const OPER_XOR: u8 = 8;
const OPER_OR: u8 = 7;
const OPER_MARK: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Flag {
    Start,
    Var,
    Oper,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("different number of opening and closing parentheses")]
    UnbalancedParens,
    #[error("operator with a missing operand")]
    MissingOperand,
    #[error("negation sign or parenthesis inside a variable name")]
    BadNegation,
    #[error("unknown identifier \"{0}\"")]
    UnknownIdentifier(String),
    #[error("the input formula is empty")]
    EmptyFormula,
    #[error("malformed formula")]
    Malformed,
}

fn is_delim(c: char) -> bool {
    c.is_whitespace()
        || matches!(
            c,
            SYM_AND | SYM_AND2 | SYM_OR | SYM_OR2 | SYM_XOR | SYM_NEG_AFTER | SYM_CLOSE
        )
}

fn apply_oper(nvars: usize, stack: &mut Vec<Expr>, oper: u8) -> Result<(), ParseError> {
    let arg2 = stack.pop().ok_or(ParseError::MissingOperand)?;
    let arg1 = stack.pop().ok_or(ParseError::MissingOperand)?;
    let func = match oper {
        OPER_AND => Expr::and(nvars, &arg1, &arg2, false, false),
        OPER_OR => Expr::or(nvars, &arg1, &arg2),
        OPER_XOR => Expr::xor(nvars, &arg1, &arg2),
        _ => return Err(ParseError::Malformed),
    };
    stack.push(func);
    Ok(())
}

/// Shunting-yard parser over `! ' * & ^ + |` and parentheses. A variable
/// name is the longest prefix of the remaining input that matches one of
/// the supplied pin names; juxtaposition means AND. Returns the expression
/// in evaluation layout.
pub fn parse_formula(formula: &str, var_names: &[String]) -> Result<Expr, ParseError> {
    let nvars = var_names.len();
    let nparens: i32 = formula
        .chars()
        .map(|c| match c {
            SYM_OPEN => 1,
            SYM_CLOSE => -1,
            _ => 0,
        })
        .sum();
    if nparens != 0 {
        return Err(ParseError::UnbalancedParens);
    }

    let wrapped: Vec<char> = format!("({})", formula).chars().collect();
    let mut stack_fn: Vec<Expr> = Vec::new();
    let mut stack_op: Vec<u8> = Vec::new();
    let mut flag = Flag::Start;
    let mut pos = 0usize;

    while pos < wrapped.len() {
        let c = wrapped[pos];
        match c {
            _ if c.is_whitespace() => {
                pos += 1;
                continue;
            }
            SYM_CONST0 | SYM_CONST1 => {
                if flag == Flag::Var {
                    return Err(ParseError::MissingOperand);
                }
                stack_fn.push(if c == SYM_CONST0 { Expr::const0() } else { Expr::const1() });
                flag = Flag::Var;
                pos += 1;
            }
            SYM_NEG => {
                if flag == Flag::Var {
                    // prefix NOT after a variable reads as implicit AND
                    stack_op.push(OPER_AND);
                    flag = Flag::Oper;
                }
                stack_op.push(OPER_NEG);
                pos += 1;
            }
            SYM_NEG_AFTER => {
                if flag != Flag::Var {
                    return Err(ParseError::MissingOperand);
                }
                let e = stack_fn.pop().ok_or(ParseError::MissingOperand)?;
                stack_fn.push(e.not());
                pos += 1;
            }
            SYM_AND | SYM_AND2 | SYM_OR | SYM_OR2 | SYM_XOR => {
                if flag != Flag::Var {
                    return Err(ParseError::MissingOperand);
                }
                stack_op.push(match c {
                    SYM_AND | SYM_AND2 => OPER_AND,
                    SYM_OR | SYM_OR2 => OPER_OR,
                    _ => OPER_XOR,
                });
                flag = Flag::Oper;
                pos += 1;
            }
            SYM_OPEN => {
                if flag == Flag::Var {
                    stack_op.push(OPER_AND);
                }
                stack_op.push(OPER_MARK);
                flag = Flag::Start;
                pos += 1;
            }
            SYM_CLOSE => {
                loop {
                    let oper = stack_op.pop().ok_or(ParseError::UnbalancedParens)?;
                    if oper == OPER_MARK {
                        break;
                    }
                    apply_oper(nvars, &mut stack_fn, oper)?;
                }
                flag = Flag::Var;
                pos += 1;
            }
            _ => {
                // scan the maximal identifier token
                let mut end = pos;
                while end < wrapped.len() && !is_delim(wrapped[end]) {
                    if wrapped[end] == SYM_NEG || wrapped[end] == SYM_OPEN {
                        if end > pos {
                            return Err(ParseError::BadNegation);
                        }
                        break;
                    }
                    end += 1;
                }
                let token: String = wrapped[pos..end].iter().collect();
                // longest matching pin-name prefix wins
                let found = var_names
                    .iter()
                    .enumerate()
                    .filter(|(_, name)| token.starts_with(name.as_str()))
                    .max_by_key(|(_, name)| name.len());
                let (v, name) = found.ok_or_else(|| ParseError::UnknownIdentifier(token.clone()))?;
                if flag == Flag::Var {
                    stack_op.push(OPER_AND);
                }
                stack_fn.push(Expr::var(v));
                flag = Flag::Var;
                pos += name.chars().count();
            }
        }

        match flag {
            Flag::Start => continue,
            Flag::Var => {
                // absorb pending prefix negations
                while stack_op.last() == Some(&OPER_NEG) {
                    stack_op.pop();
                    let e = stack_fn.pop().ok_or(ParseError::MissingOperand)?;
                    stack_fn.push(e.not());
                }
            }
            Flag::Oper => {
                // execute stacked operations of higher or equal precedence
                loop {
                    let oper1 = stack_op.pop().ok_or(ParseError::Malformed)?;
                    match stack_op.pop() {
                        None => {
                            stack_op.push(oper1);
                            break;
                        }
                        Some(oper2) if oper2 >= oper1 && oper2 != OPER_MARK => {
                            apply_oper(nvars, &mut stack_fn, oper2)?;
                            stack_op.push(oper1);
                        }
                        Some(oper2) => {
                            stack_op.push(oper2);
                            stack_op.push(oper1);
                            break;
                        }
                    }
                }
            }
        }
    }

    let func = stack_fn.pop().ok_or(ParseError::EmptyFormula)?;
    if !stack_fn.is_empty() || !stack_op.is_empty() {
        return Err(ParseError::Malformed);
    }
    Ok(func.reverse())
}

/// Collect the distinct identifiers of a formula in order of appearance
/// (operator symbols act as separators).
pub fn collect_names(formula: &str) -> Vec<String> {
    let cleaned: String = formula
        .chars()
        .map(|c| {
            if matches!(
                c,
                SYM_AND | SYM_AND2 | SYM_OR | SYM_OR2 | SYM_XOR | SYM_NEG | SYM_NEG_AFTER | SYM_OPEN | SYM_CLOSE
            ) {
                ' '
            } else {
                c
            }
        })
        .collect();
    cleaned
        .split_whitespace()
        .map(str::to_string)
        .unique()
        .collect_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::truth::TRUTHS6;

    fn vars(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn simple_ops() {
        let names = vars(&["a", "b"]);
        let e = parse_formula("a*b", &names).unwrap();
        assert_eq!(e.truth6(2, None), TRUTHS6[0] & TRUTHS6[1]);
        let e = parse_formula("a+b", &names).unwrap();
        assert_eq!(e.truth6(2, None), TRUTHS6[0] | TRUTHS6[1]);
        let e = parse_formula("a^b", &names).unwrap();
        assert_eq!(e.truth6(2, None), TRUTHS6[0] ^ TRUTHS6[1]);
        let e = parse_formula("!(a&b)", &names).unwrap();
        assert_eq!(e.truth6(2, None), !(TRUTHS6[0] & TRUTHS6[1]));
        let e = parse_formula("a'", &names).unwrap();
        assert_eq!(e.truth6(2, None), !TRUTHS6[0]);
    }

    #[test]
    fn precedence() {
        let names = vars(&["a", "b", "c"]);
        let e = parse_formula("a+b*c", &names).unwrap();
        assert_eq!(e.truth6(3, None), TRUTHS6[0] | (TRUTHS6[1] & TRUTHS6[2]));
        let e = parse_formula("a^b+c", &names).unwrap();
        assert_eq!(e.truth6(3, None), (TRUTHS6[0] ^ TRUTHS6[1]) | TRUTHS6[2]);
        let e = parse_formula("(a+b)*c", &names).unwrap();
        assert_eq!(e.truth6(3, None), (TRUTHS6[0] | TRUTHS6[1]) & TRUTHS6[2]);
        let e = parse_formula("!a*!b", &names).unwrap();
        assert_eq!(e.truth6(3, None), !TRUTHS6[0] & !TRUTHS6[1]);
    }

    #[test]
    fn implicit_and() {
        let names = vars(&["a", "b"]);
        let e = parse_formula("a b", &names).unwrap();
        assert_eq!(e.truth6(2, None), TRUTHS6[0] & TRUTHS6[1]);
        let e = parse_formula("(a)(b)", &names).unwrap();
        assert_eq!(e.truth6(2, None), TRUTHS6[0] & TRUTHS6[1]);
        let e = parse_formula("a !b", &names).unwrap();
        assert_eq!(e.truth6(2, None), TRUTHS6[0] & !TRUTHS6[1]);
        let e = parse_formula("!!a", &names).unwrap();
        assert_eq!(e.truth6(2, None), TRUTHS6[0]);
    }

    #[test]
    fn longest_match() {
        let names = vars(&["a", "a1"]);
        let e = parse_formula("a1*a", &names).unwrap();
        assert_eq!(e.truth6(2, None), TRUTHS6[1] & TRUTHS6[0]);
    }

    #[test]
    fn errors() {
        let names = vars(&["a", "b"]);
        assert_eq!(parse_formula("(a*b", &names), Err(ParseError::UnbalancedParens));
        assert!(matches!(parse_formula("a*x", &names), Err(ParseError::UnknownIdentifier(_))));
        assert_eq!(parse_formula("a*", &names), Err(ParseError::MissingOperand));
        assert_eq!(parse_formula("'a", &names), Err(ParseError::MissingOperand));
        assert_eq!(parse_formula("", &names), Err(ParseError::EmptyFormula));
    }

    #[test]
    fn collected_names() {
        assert_eq!(collect_names("!(a1*b)+c^a1"), vec!["a1", "b", "c"]);
    }
}
