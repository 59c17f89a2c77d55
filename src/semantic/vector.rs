//! Vector contract shared by embedders, the catalog matrix and search.
//!
//! Every embedding that enters the catalog or is used as a query must:
//! - have the expected number of dimensions
//! - contain only finite values
//! - have unit L2 norm (within [`UNIT_NORM_TOLERANCE`])

/// Allowed deviation of a vector's L2 norm from 1.0
pub const UNIT_NORM_TOLERANCE: f32 = 1e-4;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VectorError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Vector contains non-finite values")]
    NonFinite,

    #[error("Cannot normalize a zero-norm vector")]
    ZeroNorm,

    #[error("Vector is not unit length (norm {0})")]
    NotUnit(f32),
}

/// Compute L2 norm of a vector.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Dot product of two equally sized vectors.
/// For unit vectors this is their cosine similarity.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Scale a vector in place to unit length.
pub fn normalize(v: &mut [f32]) -> Result<(), VectorError> {
    if v.iter().any(|x| !x.is_finite()) {
        return Err(VectorError::NonFinite);
    }

    let norm = l2_norm(v);
    if norm < f32::EPSILON {
        return Err(VectorError::ZeroNorm);
    }

    for x in v.iter_mut() {
        *x /= norm;
    }
    Ok(())
}

/// Check that `v` has `dimensions` entries, all finite.
pub fn check_shape(v: &[f32], dimensions: usize) -> Result<(), VectorError> {
    if v.len() != dimensions {
        return Err(VectorError::DimensionMismatch {
            expected: dimensions,
            got: v.len(),
        });
    }
    if v.iter().any(|x| !x.is_finite()) {
        return Err(VectorError::NonFinite);
    }
    Ok(())
}

/// Check the full contract: shape plus unit norm.
pub fn check_unit(v: &[f32], dimensions: usize) -> Result<(), VectorError> {
    check_shape(v, dimensions)?;

    let norm = l2_norm(v);
    if (norm - 1.0).abs() > UNIT_NORM_TOLERANCE {
        return Err(VectorError::NotUnit(norm));
    }
    Ok(())
}
