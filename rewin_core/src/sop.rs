//! Cube covers with single-cube containment, used to derive the SOP text
//! of a library gate from its expression.

use crate::expr::Expr;
use crate::truth::{cube_lit, cube_var0, cube_var1, elem_truths, Cube, Word, WORD_MAX};

#[inline]
fn cube_empty(x: Cube) -> bool {
    x & (x >> 1) & 0x5555_5555 != 0
}

#[inline]
fn cube_and(x: Cube, y: Cube) -> Cube {
    x | y
}

/// Does x contain y (as a product term, x's literal set is a subset)?
#[inline]
fn cube_contains(x: Cube, y: Cube) -> bool {
    (x | y) == y
}

/// Push a cube, dropping it if an existing cube covers it and dropping the
/// existing cubes it covers.
pub fn push_scc(cover: &mut Vec<Cube>, c: Cube) {
    let mut k = 0;
    for i in 0..cover.len() {
        let entry = cover[i];
        if cube_contains(entry, c) {
            assert!(i == k);
            return;
        }
        if cube_contains(c, entry) {
            continue;
        }
        cover[k] = entry;
        k += 1;
    }
    cover.truncate(k);
    cover.push(c);
}

pub fn cover_or(p: &[Cube], q: &[Cube]) -> Vec<Cube> {
    let mut r = Vec::with_capacity(p.len() + q.len());
    r.extend_from_slice(p);
    for &c in q {
        push_scc(&mut r, c);
    }
    r
}

pub fn cover_and(p: &[Cube], q: &[Cube]) -> Vec<Cube> {
    let mut r = Vec::with_capacity(p.len() * q.len());
    for &cp in p {
        for &cq in q {
            let c = cube_and(cp, cq);
            if !cube_empty(c) {
                push_scc(&mut r, c);
            }
        }
    }
    r
}

/// Text form: one line per cube (`0`/`1`/`-` per variable), then a space
/// and the polarity marker (`1` = onset cover, `0` = offset cover).
pub fn cover_text(cover: &[Cube], nvars: usize, onset: bool) -> String {
    let mut out = String::new();
    if cover.is_empty() {
        out.push(' ');
        out.push(if onset { '0' } else { '1' });
        out.push('\n');
        return out;
    }
    if cover.len() == 1 && cover[0] == 0 {
        out.push(' ');
        out.push(if onset { '1' } else { '0' });
        out.push('\n');
        return out;
    }
    for &c in cover {
        for v in 0..nvars {
            out.push(match cube_lit(c, v) {
                1 => '0',
                2 => '1',
                0 => '-',
                _ => unreachable!("empty cube in a cover"),
            });
        }
        out.push(' ');
        out.push(if onset { '1' } else { '0' });
        out.push('\n');
    }
    out
}

/// Derive the SOP of an evaluation-layout expression, computing both
/// polarities bottom-up and emitting the smaller one (SCC-free, not
/// necessarily minimal).
pub fn derive_sop(nvars: usize, expr: &Expr) -> String {
    if expr.is_const0() {
        return " 0\n".to_owned();
    }
    if expr.is_const1() {
        return " 1\n".to_owned();
    }
    if expr.is_lit() {
        let lit = expr.0[0];
        let var = (lit / 2) as usize;
        assert!(var < nvars);
        let mut line: Vec<char> = vec!['-'; nvars];
        line[var] = if lit & 1 == 1 { '0' } else { '1' };
        let mut out: String = line.into_iter().collect();
        out.push_str(" 1\n");
        return out;
    }
    // covers of both polarities for the variables, then for each node
    let mut neg: Vec<Vec<Cube>> = (0..nvars).map(|v| vec![cube_var0(v)]).collect();
    let mut pos: Vec<Vec<Cube>> = (0..nvars).map(|v| vec![cube_var1(v)]).collect();
    for i in 0..expr.node_num() {
        let (i0, c0) = ((expr.0[2 * i] / 2) as usize, expr.0[2 * i] & 1 == 1);
        let (i1, c1) = ((expr.0[2 * i + 1] / 2) as usize, expr.0[2 * i + 1] & 1 == 1);
        let p = cover_and(
            if c0 { &neg[i0] } else { &pos[i0] },
            if c1 { &neg[i1] } else { &pos[i1] },
        );
        let n = cover_or(
            if c0 { &pos[i0] } else { &neg[i0] },
            if c1 { &pos[i1] } else { &neg[i1] },
        );
        pos.push(p);
        neg.push(n);
    }
    let root = *expr.0.last().unwrap();
    let (mut on, mut off): (&Vec<Cube>, &Vec<Cube>) = (pos.last().unwrap(), neg.last().unwrap());
    if root & 1 == 1 {
        std::mem::swap(&mut on, &mut off);
    }
    if off.len() < on.len() {
        cover_text(off, nvars, false)
    } else {
        cover_text(on, nvars, true)
    }
}

/// Evaluate SOP text back into a truth table: the lines are the cover of
/// the onset (`1` marker) or of the offset (`0` marker).
pub fn sop_truth(sop: &str, nvars: usize) -> [Word; WORD_MAX] {
    let elems = elem_truths();
    let mut on = [0u64; WORD_MAX];
    let mut onset = true;
    for line in sop.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        let (cube_text, marker) = line.split_at(line.len() - 1);
        let cube_text = cube_text.trim_end();
        onset = marker == "1";
        debug_assert!(cube_text.is_empty() || cube_text.len() == nvars);
        let mut cube = [!0u64; WORD_MAX];
        for (v, ch) in cube_text.chars().enumerate() {
            match ch {
                '0' => {
                    for w in 0..WORD_MAX {
                        cube[w] &= !elems[v][w];
                    }
                }
                '1' => {
                    for w in 0..WORD_MAX {
                        cube[w] &= elems[v][w];
                    }
                }
                '-' => {}
                _ => panic!("unexpected SOP character {:?}", ch),
            }
        }
        for w in 0..WORD_MAX {
            on[w] |= cube[w];
        }
    }
    if !onset {
        for w in on.iter_mut() {
            *w = !*w;
        }
    }
    on
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scc_drops_contained() {
        let mut cover = vec![cube_var1(0) | cube_var1(1)];
        push_scc(&mut cover, cube_var1(0));
        assert_eq!(cover, vec![cube_var1(0)]);
        push_scc(&mut cover, cube_var1(0) | cube_var0(2));
        assert_eq!(cover, vec![cube_var1(0)]);
    }

    #[test]
    fn and_drops_contradictions() {
        let p = vec![cube_var1(0)];
        let q = vec![cube_var0(0), cube_var1(1)];
        let r = cover_and(&p, &q);
        assert_eq!(r, vec![cube_var1(0) | cube_var1(1)]);
    }

    #[test]
    fn sop_of_and2() {
        let e = Expr::and(2, &Expr::var(0), &Expr::var(1), false, false).reverse();
        assert_eq!(derive_sop(2, &e), "11 1\n");
    }

    #[test]
    fn sop_of_nor3_prefers_offset() {
        // !(a + b + c): onset is one cube "000", offset is three cubes
        let or = Expr::or(3, &Expr::or(3, &Expr::var(0), &Expr::var(1)), &Expr::var(2));
        let e = or.not().reverse();
        assert_eq!(derive_sop(3, &e), "000 1\n");
    }

    #[test]
    fn sop_of_xor() {
        let e = Expr::xor(2, &Expr::var(0), &Expr::var(1)).reverse();
        let text = derive_sop(2, &e);
        let mut lines: Vec<&str> = text.lines().collect();
        lines.sort_unstable();
        assert_eq!(lines, vec!["01 1", "10 1"]);
    }

    #[test]
    fn literal_sop() {
        let e = Expr::var(1).not();
        assert_eq!(derive_sop(3, &e), "-0- 1\n");
    }
}
