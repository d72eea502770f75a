//! Vector utilities shared by the stores.
//!
//! - Cosine distance with pgvector's `<=>` semantics (1 - cosine similarity)
//! - Text encoding of vectors as pgvector literals

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 = opposite.
/// Returns 0.0 if the lengths differ or either vector is empty or zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// Cosine distance in [0, 2]; smaller is closer.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

/// Encode a vector as a pgvector text literal, e.g. `[0.1,0.2]`.
///
/// NaN and infinite components are written as `0` so the literal always
/// parses.
pub fn encode_vector(v: &[f32]) -> String {
    let parts: Vec<String> = v
        .iter()
        .map(|x| {
            if x.is_finite() {
                x.to_string()
            } else {
                "0".to_string()
            }
        })
        .collect();
    format!("[{}]", parts.join(","))
}
