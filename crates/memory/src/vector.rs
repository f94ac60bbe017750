//! Similarity ranking over the embedding matrix.
//!
//! Scores are the raw dot product. Embeddings are not normalised here, so a
//! long vector outranks a short one pointing the same way.

/// Dot product of two vectors. Extra trailing elements of the longer vector
/// are ignored.
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Indices of the `k` rows with the highest dot product against `query`,
/// best first. Equal scores keep insertion order.
pub fn top_k(rows: &[Vec<f32>], query: &[f32], k: usize) -> Vec<usize> {
    if k == 0 || rows.is_empty() {
        return Vec::new();
    }

    // NaN ranks last
    let scores: Vec<f32> = rows
        .iter()
        .map(|row| dot_product(row, query))
        .map(|s| if s.is_nan() { f32::NEG_INFINITY } else { s })
        .collect();
    let mut order: Vec<usize> = (0..rows.len()).collect();
    // sort_by is stable
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));
    order.truncate(k);
    order
}
