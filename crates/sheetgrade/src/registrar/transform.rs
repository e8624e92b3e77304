//! Sheet-to-image transform estimation from fiducial correspondences.
//!
//! Provides:
//! - Affine least-squares fit (default): 6 parameters, overdetermined from
//!   4 fiducials, so the residual gate has teeth.
//! - Perspective fit via DLT with Hartley normalization for layouts that
//!   carry enough markers to keep an 8-parameter fit overdetermined.
//! - Reprojection residual computation for the registration gate.

use nalgebra::{DMatrix, DVector, Matrix3, Vector3};

// ── Error type ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum FitError {
    TooFewPoints { needed: usize, got: usize },
    NumericalFailure(String),
}

impl std::fmt::Display for FitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooFewPoints { needed, got } => {
                write!(f, "too few points: need {}, got {}", needed, got)
            }
            Self::NumericalFailure(msg) => write!(f, "numerical failure: {}", msg),
        }
    }
}

impl std::error::Error for FitError {}

// ── Transform ────────────────────────────────────────────────────────────

/// Transform model fitted by the registrar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformModel {
    /// 6-parameter affine map. Handles rotation, scale, and shear; adequate
    /// for near-frontal captures of a flat sheet.
    #[default]
    Affine,
    /// Full 3x3 homography. Requires at least five markers so the fit stays
    /// overdetermined.
    Perspective,
}

impl TransformModel {
    /// Smallest marker count that leaves the fit overdetermined, keeping
    /// the reprojection residual meaningful as a rejection gate.
    pub fn min_markers(self) -> usize {
        match self {
            Self::Affine => 4,
            Self::Perspective => 5,
        }
    }
}

/// Maps canonical sheet coordinates (points) to image pixel coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetTransform {
    h: Matrix3<f64>,
}

impl SheetTransform {
    pub fn from_matrix(h: Matrix3<f64>) -> Self {
        Self { h }
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.h
    }

    /// Project a sheet-space point into image space.
    pub fn project(&self, x: f64, y: f64) -> [f64; 2] {
        let p = self.h * Vector3::new(x, y, 1.0);
        if p[2].abs() < 1e-15 {
            return [f64::NAN, f64::NAN];
        }
        [p[0] / p[2], p[1] / p[2]]
    }
}

/// Reprojection error: `||project(t, src) - dst||`.
pub fn reprojection_error(t: &SheetTransform, src: &[f64; 2], dst: &[f64; 2]) -> f64 {
    let p = t.project(src[0], src[1]);
    let dx = p[0] - dst[0];
    let dy = p[1] - dst[1];
    (dx * dx + dy * dy).sqrt()
}

/// Largest reprojection error over all correspondences.
///
/// Returns NaN as soon as any single error is non-finite: a degenerate
/// transform can map a fiducial to the plane at infinity, and a
/// `f64::max` fold would silently drop that NaN and report a small,
/// healthy-looking residual.
pub fn max_residual(t: &SheetTransform, src: &[[f64; 2]], dst: &[[f64; 2]]) -> f64 {
    let mut worst = 0.0f64;
    for (s, d) in src.iter().zip(dst) {
        let err = reprojection_error(t, s, d);
        if !err.is_finite() {
            return f64::NAN;
        }
        if err > worst {
            worst = err;
        }
    }
    worst
}

/// Fit the configured model from point correspondences.
pub fn fit_transform(
    model: TransformModel,
    src: &[[f64; 2]],
    dst: &[[f64; 2]],
) -> Result<SheetTransform, FitError> {
    match model {
        TransformModel::Affine => fit_affine(src, dst),
        TransformModel::Perspective => fit_perspective(src, dst),
    }
}

// ── Hartley normalization ────────────────────────────────────────────────

/// Compute a normalizing transform: translate centroid to origin, scale so
/// mean distance from origin is sqrt(2).
fn normalize_points(pts: &[[f64; 2]]) -> (Matrix3<f64>, Vec<[f64; 2]>) {
    let n = pts.len() as f64;
    let cx: f64 = pts.iter().map(|p| p[0]).sum::<f64>() / n;
    let cy: f64 = pts.iter().map(|p| p[1]).sum::<f64>() / n;

    let mean_dist: f64 = pts
        .iter()
        .map(|p| ((p[0] - cx).powi(2) + (p[1] - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;

    let s = if mean_dist > 1e-15 {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };

    let t = Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0);
    let normalized: Vec<[f64; 2]> = pts
        .iter()
        .map(|p| [s * (p[0] - cx), s * (p[1] - cy)])
        .collect();

    (t, normalized)
}

// ── Affine least squares ─────────────────────────────────────────────────

/// Estimate an affine transform from >= 3 correspondences by normalized
/// linear least squares.
pub fn fit_affine(src: &[[f64; 2]], dst: &[[f64; 2]]) -> Result<SheetTransform, FitError> {
    let n = src.len();
    if n < 3 || dst.len() < 3 {
        return Err(FitError::TooFewPoints {
            needed: 3,
            got: n.min(dst.len()),
        });
    }
    if src.len() != dst.len() {
        return Err(FitError::NumericalFailure(
            "src and dst must have the same length".into(),
        ));
    }

    let (t_src, src_n) = normalize_points(src);
    let (t_dst, dst_n) = normalize_points(dst);

    // 2n x 6 system: rows [sx sy 1 0 0 0 | dx] and [0 0 0 sx sy 1 | dy].
    let mut a = DMatrix::zeros(2 * n, 6);
    let mut b = DVector::zeros(2 * n);
    for i in 0..n {
        let (sx, sy) = (src_n[i][0], src_n[i][1]);
        let (dx, dy) = (dst_n[i][0], dst_n[i][1]);

        a[(2 * i, 0)] = sx;
        a[(2 * i, 1)] = sy;
        a[(2 * i, 2)] = 1.0;
        b[2 * i] = dx;

        a[(2 * i + 1, 3)] = sx;
        a[(2 * i + 1, 4)] = sy;
        a[(2 * i + 1, 5)] = 1.0;
        b[2 * i + 1] = dy;
    }

    let svd = a.svd(true, true);
    let x = svd
        .solve(&b, 1e-12)
        .map_err(|e| FitError::NumericalFailure(e.to_string()))?;

    let h_norm = Matrix3::new(x[0], x[1], x[2], x[3], x[4], x[5], 0.0, 0.0, 1.0);

    let t_dst_inv = t_dst
        .try_inverse()
        .ok_or_else(|| FitError::NumericalFailure("normalization not invertible".into()))?;
    Ok(SheetTransform::from_matrix(t_dst_inv * h_norm * t_src))
}

// ── Perspective DLT ──────────────────────────────────────────────────────

/// Estimate a homography from >= 4 correspondences using DLT.
///
/// The solution is the eigenvector of the smallest eigenvalue of the 9x9
/// matrix `A^T A`, which sidesteps thin-SVD dimension issues.
pub fn fit_perspective(src: &[[f64; 2]], dst: &[[f64; 2]]) -> Result<SheetTransform, FitError> {
    let n = src.len();
    if n < 4 || dst.len() < 4 {
        return Err(FitError::TooFewPoints {
            needed: 4,
            got: n.min(dst.len()),
        });
    }
    if src.len() != dst.len() {
        return Err(FitError::NumericalFailure(
            "src and dst must have the same length".into(),
        ));
    }

    let (t_src, src_n) = normalize_points(src);
    let (t_dst, dst_n) = normalize_points(dst);

    let mut a = DMatrix::zeros(2 * n, 9);
    for i in 0..n {
        let (sx, sy) = (src_n[i][0], src_n[i][1]);
        let (dx, dy) = (dst_n[i][0], dst_n[i][1]);

        a[(2 * i, 3)] = -sx;
        a[(2 * i, 4)] = -sy;
        a[(2 * i, 5)] = -1.0;
        a[(2 * i, 6)] = dy * sx;
        a[(2 * i, 7)] = dy * sy;
        a[(2 * i, 8)] = dy;

        a[(2 * i + 1, 0)] = sx;
        a[(2 * i + 1, 1)] = sy;
        a[(2 * i + 1, 2)] = 1.0;
        a[(2 * i + 1, 6)] = -dx * sx;
        a[(2 * i + 1, 7)] = -dx * sy;
        a[(2 * i + 1, 8)] = -dx;
    }

    let ata = a.transpose() * &a;
    let eig = nalgebra::SymmetricEigen::new(ata);

    let mut min_idx = 0;
    let mut min_val = eig.eigenvalues[0].abs();
    for i in 1..9 {
        let v = eig.eigenvalues[i].abs();
        if v < min_val {
            min_val = v;
            min_idx = i;
        }
    }
    let h_vec: Vec<f64> = (0..9).map(|j| eig.eigenvectors[(j, min_idx)]).collect();
    #[rustfmt::skip]
    let h_norm = Matrix3::new(
        h_vec[0], h_vec[1], h_vec[2],
        h_vec[3], h_vec[4], h_vec[5],
        h_vec[6], h_vec[7], h_vec[8],
    );

    let t_dst_inv = t_dst
        .try_inverse()
        .ok_or_else(|| FitError::NumericalFailure("normalization not invertible".into()))?;
    let h = t_dst_inv * h_norm * t_src;

    let scale = h[(2, 2)];
    if scale.abs() < 1e-15 {
        Ok(SheetTransform::from_matrix(h))
    } else {
        Ok(SheetTransform::from_matrix(h / scale))
    }
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn affine_ground_truth() -> SheetTransform {
        // Rotation + anisotropic scale + translation.
        SheetTransform::from_matrix(Matrix3::new(
            2.1, -0.3, 140.0, 0.25, 1.9, 95.0, 0.0, 0.0, 1.0,
        ))
    }

    fn perspective_ground_truth() -> SheetTransform {
        SheetTransform::from_matrix(Matrix3::new(
            2.5, 0.1, 320.0, -0.05, 2.4, 210.0, 0.0001, -0.00005, 1.0,
        ))
    }

    fn corners_plus_center() -> Vec<[f64; 2]> {
        vec![
            [36.0, 36.0],
            [576.0, 36.0],
            [36.0, 756.0],
            [576.0, 756.0],
            [306.0, 756.0],
        ]
    }

    #[test]
    fn affine_recovers_exact_map() {
        let truth = affine_ground_truth();
        let src = corners_plus_center();
        let dst: Vec<[f64; 2]> = src.iter().map(|p| truth.project(p[0], p[1])).collect();

        let fitted = fit_affine(&src, &dst).expect("fit");
        for (s, d) in src.iter().zip(&dst) {
            assert!(reprojection_error(&fitted, s, d) < 1e-8);
        }
    }

    #[test]
    fn affine_residual_flags_inconsistent_geometry() {
        let truth = affine_ground_truth();
        let src = corners_plus_center();
        let mut dst: Vec<[f64; 2]> = src.iter().map(|p| truth.project(p[0], p[1])).collect();
        // One marker lands 60 px away from where the others say it should be.
        dst[3][0] += 60.0;

        let fitted = fit_affine(&src, &dst).expect("fit");
        assert!(max_residual(&fitted, &src, &dst) > 10.0);
    }

    #[test]
    fn perspective_recovers_exact_map() {
        let truth = perspective_ground_truth();
        let src = corners_plus_center();
        let dst: Vec<[f64; 2]> = src.iter().map(|p| truth.project(p[0], p[1])).collect();

        let fitted = fit_perspective(&src, &dst).expect("fit");
        for (s, d) in src.iter().zip(&dst) {
            assert!(reprojection_error(&fitted, s, d) < 1e-6);
        }
    }

    #[test]
    fn perspective_tolerates_small_noise() {
        use rand::{Rng, SeedableRng};
        let truth = perspective_ground_truth();
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);

        let mut src = Vec::new();
        let mut dst = Vec::new();
        for i in 0..5 {
            for j in 0..5 {
                let s = [i as f64 * 120.0, j as f64 * 150.0];
                let d = truth.project(s[0], s[1]);
                src.push(s);
                dst.push([
                    d[0] + rng.gen_range(-0.4..0.4),
                    d[1] + rng.gen_range(-0.4..0.4),
                ]);
            }
        }

        let fitted = fit_perspective(&src, &dst).expect("fit");
        assert!(max_residual(&fitted, &src, &dst) < 2.0);
    }

    #[test]
    fn too_few_points_is_an_error() {
        let pts = [[0.0, 0.0], [1.0, 0.0]];
        assert!(matches!(
            fit_affine(&pts, &pts),
            Err(FitError::TooFewPoints { .. })
        ));
        assert!(matches!(
            fit_perspective(&pts, &pts),
            Err(FitError::TooFewPoints { .. })
        ));
    }

    #[test]
    fn degenerate_projection_poisons_the_residual() {
        // Zero third row sends every projection to the plane at infinity.
        let t = SheetTransform::from_matrix(Matrix3::new(
            1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0,
        ));
        let src = corners_plus_center();
        assert!(max_residual(&t, &src, &src).is_nan());
    }

    #[test]
    fn projection_matches_matrix_application() {
        let t = affine_ground_truth();
        let p = t.project(50.0, 75.0);
        let expected = t.matrix() * Vector3::new(50.0, 75.0, 1.0);
        assert_relative_eq!(p[0], expected[0], epsilon = 1e-12);
        assert_relative_eq!(p[1], expected[1], epsilon = 1e-12);
    }

    #[test]
    fn model_marker_minimums_stay_overdetermined() {
        assert_eq!(TransformModel::Affine.min_markers(), 4);
        assert_eq!(TransformModel::Perspective.min_markers(), 5);
    }
}
