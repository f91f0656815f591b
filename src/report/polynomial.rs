//! Symbolic rendering of the best polynomial.
//!
//! Formatting lives in one place so the search and prediction code stay
//! clean, and so the exact output strings can be pinned by tests.
//!
//! Combi/Multi render directly over the original features in input order:
//! `y = w0 + w1*x1 + …`, with zero terms dropped and unit coefficients
//! implicit. Mia/Ria compose the layer chain symbolically into a polynomial
//! over the originals; when the expansion would exceed `MAX_RENDERED_TERMS`
//! monomials the renderer falls back to a nested form with named
//! intermediates `f_{layer,index}`.

use std::collections::{BTreeMap, BTreeSet};

use crate::domain::{Algorithm, Combination, PolynomialType};
use crate::models::model::ModelCore;

/// Expansion cap before the nested fallback kicks in.
const MAX_RENDERED_TERMS: usize = 64;

/// Coefficients are rounded to this many decimals for display; terms that
/// round to zero are dropped.
const DISPLAY_DECIMALS: i32 = 4;

pub(crate) fn render_best_polynomial(core: &ModelCore) -> String {
    match core.algorithm {
        Algorithm::Combi | Algorithm::Multi => render_multilinear(core.best_combination()),
        Algorithm::Mia | Algorithm::Ria => match expand_best(core) {
            Some(poly) => render_expanded(&poly),
            None => render_nested(core),
        },
    }
}

fn render_multilinear(comb: &Combination) -> String {
    // Constant first, then variables in ascending original index.
    let mut vars: Vec<(usize, f64)> = comb
        .inputs
        .iter()
        .zip(comb.coeffs.iter().skip(1))
        .map(|(&ix, &c)| (ix, c))
        .collect();
    vars.sort_by_key(|(ix, _)| *ix);

    let mut terms: Vec<(String, f64)> = vec![(String::new(), comb.coeffs[0])];
    terms.extend(vars.into_iter().map(|(ix, c)| (var_name(ix), c)));
    format_terms(&terms)
}

// --- symbolic expansion -----------------------------------------------------

/// A monomial maps variable index -> power; the empty monomial is the
/// constant term.
type Monomial = Vec<(usize, u32)>;

#[derive(Debug, Clone, Default)]
struct Poly {
    terms: BTreeMap<Monomial, f64>,
}

impl Poly {
    fn constant(c: f64) -> Self {
        let mut terms = BTreeMap::new();
        if c != 0.0 {
            terms.insert(Vec::new(), c);
        }
        Self { terms }
    }

    fn var(ix: usize) -> Self {
        let mut terms = BTreeMap::new();
        terms.insert(vec![(ix, 1)], 1.0);
        Self { terms }
    }

    fn add_scaled(&mut self, other: &Poly, k: f64) {
        if k == 0.0 {
            return;
        }
        for (m, c) in &other.terms {
            *self.terms.entry(m.clone()).or_insert(0.0) += k * c;
        }
    }

    fn mul(&self, other: &Poly) -> Poly {
        let mut out = Poly::default();
        for (ma, ca) in &self.terms {
            for (mb, cb) in &other.terms {
                let m = merge_monomials(ma, mb);
                *out.terms.entry(m).or_insert(0.0) += ca * cb;
            }
        }
        out
    }
}

fn merge_monomials(a: &Monomial, b: &Monomial) -> Monomial {
    let mut powers: BTreeMap<usize, u32> = BTreeMap::new();
    for &(ix, p) in a.iter().chain(b.iter()) {
        *powers.entry(ix).or_insert(0) += p;
    }
    powers.into_iter().collect()
}

/// Expand the terminal combination into a polynomial over the originals,
/// or `None` when the expansion grows past the cap.
fn expand_best(core: &ModelCore) -> Option<Poly> {
    let mut pool: Vec<Poly> = (0..core.n_features).map(Poly::var).collect();
    let last = core.layers.len() - 1;
    for (li, layer) in core.layers.iter().enumerate() {
        if li == last {
            return combination_poly(
                core.algorithm,
                core.polynomial_type,
                &layer.combinations[core.best_index],
                &pool,
            );
        }
        let mut next = Vec::with_capacity(layer.combinations.len());
        for comb in &layer.combinations {
            next.push(combination_poly(
                core.algorithm,
                core.polynomial_type,
                comb,
                &pool,
            )?);
        }
        if core.algorithm == Algorithm::Ria {
            next.extend((0..core.n_features).map(Poly::var));
        }
        pool = next;
    }
    unreachable!("layer walk always returns at the last layer")
}

fn combination_poly(
    algorithm: Algorithm,
    polynomial_type: PolynomialType,
    comb: &Combination,
    pool: &[Poly],
) -> Option<Poly> {
    let mut out = Poly::constant(comb.coeffs[0]);
    if algorithm.is_pairwise() && comb.inputs.len() == 2 {
        let u = &pool[comb.inputs[0]];
        let v = &pool[comb.inputs[1]];
        out.add_scaled(u, comb.coeffs[1]);
        out.add_scaled(v, comb.coeffs[2]);
        match polynomial_type {
            PolynomialType::Linear => {}
            PolynomialType::LinearCov => {
                out.add_scaled(&u.mul(v), comb.coeffs[3]);
            }
            PolynomialType::Quadratic => {
                out.add_scaled(&u.mul(v), comb.coeffs[3]);
                out.add_scaled(&u.mul(u), comb.coeffs[4]);
                out.add_scaled(&v.mul(v), comb.coeffs[5]);
            }
        }
    } else {
        for (c, &ix) in comb.inputs.iter().enumerate() {
            out.add_scaled(&pool[ix], comb.coeffs[c + 1]);
        }
    }
    // Numerical debris from stabilized solves would otherwise accumulate
    // across layers and inflate the term count.
    let max_abs = out.terms.values().fold(0.0_f64, |m, c| m.max(c.abs()));
    out.terms.retain(|_, c| c.abs() > 1e-9 * max_abs);

    if out.terms.len() > MAX_RENDERED_TERMS {
        None
    } else {
        Some(out)
    }
}

fn render_expanded(poly: &Poly) -> String {
    // Canonical order: non-constant monomials by (degree ascending, then
    // lexicographic over (variable, power)); the constant term last.
    let mut entries: Vec<(&Monomial, f64)> =
        poly.terms.iter().map(|(m, &c)| (m, c)).collect();
    entries.sort_by(|(ma, _), (mb, _)| {
        let da: u32 = ma.iter().map(|(_, p)| p).sum();
        let db: u32 = mb.iter().map(|(_, p)| p).sum();
        let ka = (da == 0, da);
        let kb = (db == 0, db);
        ka.cmp(&kb).then_with(|| ma.cmp(mb))
    });

    let terms: Vec<(String, f64)> = entries
        .into_iter()
        .map(|(m, c)| (monomial_name(m), c))
        .collect();
    format_terms(&terms)
}

fn monomial_name(m: &Monomial) -> String {
    let factors: Vec<String> = m
        .iter()
        .map(|&(ix, p)| {
            if p == 1 {
                var_name(ix)
            } else {
                format!("{}^{p}", var_name(ix))
            }
        })
        .collect();
    factors.join("*")
}

// --- nested fallback --------------------------------------------------------

/// Nested rendering with named intermediates, one line per combination
/// reachable from the terminal best.
fn render_nested(core: &ModelCore) -> String {
    let last = core.layers.len() - 1;

    // Walk back from the best combination to find which survivors each layer
    // actually contributes.
    let mut needed: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); core.layers.len()];
    needed[last].insert(core.best_index);
    for li in (1..=last).rev() {
        let pool_survivors = core.layers[li - 1].combinations.len();
        let wanted: Vec<usize> = needed[li].iter().copied().collect();
        for ci in wanted {
            for &ix in &core.layers[li].combinations[ci].inputs {
                // Ria pools append the originals after the survivors; only
                // survivor indices refer back to the previous layer.
                if ix < pool_survivors {
                    needed[li - 1].insert(ix);
                }
            }
        }
    }

    let mut lines = Vec::new();
    for (li, layer) in core.layers.iter().enumerate() {
        for &ci in &needed[li] {
            let comb = &layer.combinations[ci];
            let expr = nested_expr(core, li, comb);
            if li == last {
                lines.push(format!("y = {expr}"));
            } else {
                lines.push(format!("{} = {expr}", intermediate_name(li, ci)));
            }
        }
    }
    lines.join("\n")
}

fn nested_expr(core: &ModelCore, layer_index: usize, comb: &Combination) -> String {
    let operand = |ix: usize| -> String {
        if layer_index == 0 {
            return var_name(ix);
        }
        let pool_survivors = core.layers[layer_index - 1].combinations.len();
        if ix < pool_survivors {
            intermediate_name(layer_index - 1, ix)
        } else {
            var_name(ix - pool_survivors)
        }
    };

    if comb.inputs.len() == 2 {
        let u = operand(comb.inputs[0]);
        let v = operand(comb.inputs[1]);
        let c = &comb.coeffs;
        // Basis order with the constant last, mirroring the expanded form.
        let mut terms: Vec<(String, f64)> = vec![(u.clone(), c[1]), (v.clone(), c[2])];
        match core.polynomial_type {
            PolynomialType::Linear => {}
            PolynomialType::LinearCov => terms.push((format!("{u}*{v}"), c[3])),
            PolynomialType::Quadratic => {
                terms.push((format!("{u}*{v}"), c[3]));
                terms.push((format!("{u}^2"), c[4]));
                terms.push((format!("{v}^2"), c[5]));
            }
        }
        terms.push((String::new(), c[0]));
        format_terms_bare(&terms)
    } else {
        let u = operand(comb.inputs[0]);
        format_terms_bare(&[(u, comb.coeffs[1]), (String::new(), comb.coeffs[0])])
    }
}

fn intermediate_name(layer_index: usize, comb_index: usize) -> String {
    format!("f_{{{},{}}}", layer_index + 1, comb_index)
}

// --- term formatting --------------------------------------------------------

fn var_name(ix: usize) -> String {
    format!("x{}", ix + 1)
}

/// Render `(name, coefficient)` terms as `y = …`.
fn format_terms(terms: &[(String, f64)]) -> String {
    format!("y = {}", format_terms_bare(terms))
}

fn format_terms_bare(terms: &[(String, f64)]) -> String {
    let scale = 10f64.powi(DISPLAY_DECIMALS);
    let mut out = String::new();
    for (name, coeff) in terms {
        let rounded = (coeff * scale).round() / scale;
        if rounded == 0.0 {
            continue;
        }

        let sign_negative = rounded < 0.0;
        let magnitude = rounded.abs();
        if out.is_empty() {
            if sign_negative {
                out.push('-');
            }
        } else if sign_negative {
            out.push_str(" - ");
        } else {
            out.push_str(" + ");
        }

        if name.is_empty() {
            out.push_str(&format_number(magnitude));
        } else if magnitude == 1.0 {
            out.push_str(name);
        } else {
            out.push_str(&format!("{}*{}", format_number(magnitude), name));
        }
    }
    if out.is_empty() {
        out.push('0');
    }
    out
}

fn format_number(v: f64) -> String {
    if v == v.trunc() && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}
