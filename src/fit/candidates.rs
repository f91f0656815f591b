//! Candidate enumeration.
//!
//! Each algorithm tries a deterministic, lexicographically ordered list of
//! input tuples at every layer. Determinism matters: ties between candidates
//! with equal criterion error are broken by generation index, so the
//! enumeration order is part of the model-search contract.

/// All `l`-element subsets of `0..f` in lexicographic order (Combi layer `l`).
pub(crate) fn combi_subsets(f: usize, l: usize) -> Vec<Vec<usize>> {
    if l == 0 || l > f {
        return Vec::new();
    }

    let mut out = Vec::new();
    let mut current: Vec<usize> = (0..l).collect();
    loop {
        out.push(current.clone());

        // Advance the rightmost index that still has room to grow.
        let mut i = l;
        loop {
            if i == 0 {
                return out;
            }
            i -= 1;
            if current[i] < f - (l - i) {
                break;
            }
        }
        current[i] += 1;
        for j in i + 1..l {
            current[j] = current[j - 1] + 1;
        }
    }
}

/// Single-feature tuples `[0], [1], …` (Multi layer 1 and the fallback layer).
pub(crate) fn single_features(f: usize) -> Vec<Vec<usize>> {
    (0..f).map(|i| vec![i]).collect()
}

/// Multi extensions: each survivor tuple (in rank order) grown by every
/// original index it does not already contain, in ascending index order.
/// Tuples that repeat an already-generated index set are skipped.
pub(crate) fn multi_extensions(survivors: &[Vec<usize>], f: usize) -> Vec<Vec<usize>> {
    let mut seen = std::collections::BTreeSet::new();
    let mut out = Vec::new();
    for tuple in survivors {
        for j in 0..f {
            if tuple.contains(&j) {
                continue;
            }
            let mut extended = tuple.clone();
            extended.push(j);
            let mut key = extended.clone();
            key.sort_unstable();
            if seen.insert(key) {
                out.push(extended);
            }
        }
    }
    out
}

/// Unordered pairs `(i, j)`, `i < j`, lexicographic over `0..width`
/// (Mia every layer; Ria layer 1).
pub(crate) fn all_pairs(width: usize) -> Vec<Vec<usize>> {
    let mut out = Vec::new();
    for i in 0..width {
        for j in i + 1..width {
            out.push(vec![i, j]);
        }
    }
    out
}

/// Ria pairs at layers past the first: one side is a survivor output
/// (`0..k`), the other an original feature (`k..k + f`). Survivor-survivor
/// pairs are not emitted.
pub(crate) fn ria_pairs(k: usize, f: usize) -> Vec<Vec<usize>> {
    let mut out = Vec::new();
    for i in 0..k {
        for j in k..k + f {
            out.push(vec![i, j]);
        }
    }
    out
}
