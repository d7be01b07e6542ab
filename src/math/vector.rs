pub type Vector = Vec<f64>;

#[must_use]
#[inline]
pub fn dot(x: &[f64], y: &[f64]) -> f64 {
    debug_assert_eq!(x.len(), y.len());
    x.iter().zip(y).fold(0.0, |dot, (xi, yi)| dot + xi * yi)
}

/// Cosine of the raw sums: `numerator / sqrt(left_sq * right_sq)`.
///
/// Returns zero for a zero denominator and clamps the result into `[-1, 1]`.
#[must_use]
pub fn cosine_from_sums(numerator: f64, left_sq: f64, right_sq: f64) -> f64 {
    let denominator = (left_sq * right_sq).sqrt();
    if denominator == 0.0 || !denominator.is_finite() {
        return 0.0;
    }
    let cosine = numerator / denominator;
    if cosine.is_finite() {
        cosine.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

#[must_use]
pub fn cosine_similarity(x: &[f64], y: &[f64]) -> f64 {
    cosine_from_sums(dot(x, y), dot(x, x), dot(y, y))
}

/// Gradient of `cosine_similarity(x, y)` with respect to `x`:
/// `y / (|x| |y|) - cos(x, y) · x / |x|²`.
///
/// Zero when either vector has zero norm, matching the zero similarity fallback.
#[must_use]
pub fn cosine_similarity_gradient(x: &[f64], y: &[f64]) -> Vector {
    let x_sq = dot(x, x);
    let y_sq = dot(y, y);
    let denominator = (x_sq * y_sq).sqrt();
    if denominator == 0.0 || !denominator.is_finite() {
        return vec![0.0; x.len()];
    }
    let cosine = dot(x, y) / denominator;
    x.iter()
        .zip(y)
        .map(|(xi, yi)| yi / denominator - cosine * xi / x_sq)
        .collect()
}

/// `target += scale * source`.
#[inline]
pub fn add_scaled(target: &mut [f64], source: &[f64], scale: f64) {
    debug_assert_eq!(target.len(), source.len());
    for (target, source) in target.iter_mut().zip(source) {
        *target += scale * source;
    }
}

/// Gradient descent step: `target -= learning_rate * gradient`.
pub fn descend(target: &mut [f64], gradient: &[f64], learning_rate: f64) {
    add_scaled(target, gradient, -learning_rate);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_similarity_ok() {
        let vector_1 = [1.0, 2.0, 3.0];
        let vector_2 = [3.0, 5.0, 7.0];
        let similarity = cosine_similarity(&vector_1, &vector_2);
        assert!((similarity - 0.9974149030430578).abs() < 1e-12);
    }

    #[test]
    fn cosine_similarity_zero_vector_ok() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn cosine_similarity_identical_ok() {
        let vector = [3.0, 1.0, 4.0, 1.0, 5.0];
        assert_eq!(cosine_similarity(&vector, &vector), 1.0);
    }

    #[test]
    fn cosine_similarity_gradient_ok() {
        let x = [0.3, -1.2, 0.7];
        let y = [1.1, 0.4, -0.5];
        let gradient = cosine_similarity_gradient(&x, &y);
        const EPSILON: f64 = 1e-6;
        for t in 0..x.len() {
            let mut plus = x;
            plus[t] += EPSILON;
            let mut minus = x;
            minus[t] -= EPSILON;
            let numeric =
                (cosine_similarity(&plus, &y) - cosine_similarity(&minus, &y)) / (2.0 * EPSILON);
            assert!((numeric - gradient[t]).abs() < 1e-6, "{} vs {}", numeric, gradient[t]);
        }
    }

    #[test]
    fn descend_ok() {
        let mut x = vec![1.0, 2.0];
        descend(&mut x, &[10.0, -10.0], 0.1);
        assert_eq!(x, vec![0.0, 3.0]);
    }
}
