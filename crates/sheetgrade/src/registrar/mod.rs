//! Sheet registration: align a photographed sheet to the canonical layout.
//!
//! Stages: fiducial candidate extraction ([`fiducial`]), transform fit with
//! a residual gate ([`transform`]), and code strip reading ([`identity`]).
//! Registration fails outright rather than returning a low-confidence
//! transform — a bad capture should prompt a retake, not a bad score.

pub mod fiducial;
pub mod identity;
pub mod transform;

use image::GrayImage;

use crate::capture::NormalizedCapture;
use crate::error::RegistrationError;
use crate::layout::SheetLayout;

pub use fiducial::FiducialConfig;
pub use identity::{DecodedIdentity, IdentityConfig};
pub use transform::{SheetTransform, TransformModel};

/// Configuration for the registration stage.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    /// Fiducial extraction and anchor matching.
    pub fiducial: FiducialConfig,
    /// Transform model to fit.
    pub model: TransformModel,
    /// Maximum accepted fiducial reprojection residual (pixels).
    /// Default: [`RegistrationConfig::DEFAULT_MAX_RESIDUAL_PX`].
    pub max_residual_px: f64,
    /// Code strip reading.
    pub identity: IdentityConfig,
    /// Attempt to decode the code strip. Disable for deployments that
    /// identify sheets manually only.
    pub decode_identity: bool,
}

impl RegistrationConfig {
    pub const DEFAULT_MAX_RESIDUAL_PX: f64 = 3.0;
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            fiducial: FiducialConfig::default(),
            model: TransformModel::default(),
            max_residual_px: Self::DEFAULT_MAX_RESIDUAL_PX,
            identity: IdentityConfig::default(),
            decode_identity: true,
        }
    }
}

/// Diagnostics from a successful registration.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct RegistrationStats {
    /// Distinct fiducial anchors covered by a detected marker.
    pub markers_found: usize,
    /// Worst fiducial reprojection residual of the accepted fit (pixels).
    pub max_residual_px: f64,
}

/// A capture aligned to the canonical sheet space.
#[derive(Debug)]
pub struct RegisteredSheet<'a> {
    /// Binary view of the capture (shared with the normalizer output).
    pub binary: &'a GrayImage,
    /// Fitted sheet-to-image transform.
    pub transform: SheetTransform,
    /// Decoded code strip, when readable.
    pub identity: Option<DecodedIdentity>,
    /// Fit diagnostics.
    pub stats: RegistrationStats,
}

/// Register a normalized capture against `layout`.
pub fn register_sheet<'a>(
    capture: &'a NormalizedCapture,
    layout: &SheetLayout,
    config: &RegistrationConfig,
) -> Result<RegisteredSheet<'a>, RegistrationError> {
    let [w, h] = capture.dimensions();
    let anchors = layout.fiducial_centers();

    let candidates = fiducial::find_marker_candidates(&capture.binary, &config.fiducial);
    let matched = fiducial::assign_to_anchors(&candidates, &anchors, [w, h], &config.fiducial);

    let mut src = Vec::new();
    let mut dst = Vec::new();
    for (anchor, m) in anchors.iter().zip(&matched) {
        if let Some(cand) = m {
            src.push(*anchor);
            dst.push(cand.center);
        }
    }

    let required = config
        .fiducial
        .required_markers
        .max(config.model.min_markers());
    if src.len() < required {
        tracing::info!(
            found = src.len(),
            required,
            candidates = candidates.len(),
            "registration rejected: not enough fiducial markers"
        );
        return Err(RegistrationError::MarkersNotFound {
            found: src.len(),
            required,
        });
    }

    let fitted = transform::fit_transform(config.model, &src, &dst).map_err(|e| match e {
        transform::FitError::TooFewPoints { needed, got } => RegistrationError::MarkersNotFound {
            found: got,
            required: needed,
        },
        transform::FitError::NumericalFailure(msg) => RegistrationError::DegenerateTransform(msg),
    })?;

    let residual = transform::max_residual(&fitted, &src, &dst);
    if !residual.is_finite() {
        return Err(RegistrationError::DegenerateTransform(
            "non-finite fiducial residual".to_string(),
        ));
    }
    if residual > config.max_residual_px {
        tracing::info!(
            residual_px = residual,
            tolerance_px = config.max_residual_px,
            "registration rejected: fiducial geometry inconsistent"
        );
        return Err(RegistrationError::GeometryInconsistent {
            max_residual_px: residual,
            tolerance_px: config.max_residual_px,
        });
    }

    let identity = if config.decode_identity {
        identity::read_identity(&capture.binary, &fitted, layout, &config.identity)
    } else {
        None
    };

    if let Some(decoded) = identity {
        if decoded.fingerprint != layout.fingerprint() {
            return Err(RegistrationError::LayoutMismatch {
                expected_fingerprint: layout.fingerprint(),
                found_fingerprint: decoded.fingerprint,
            });
        }
    }

    tracing::info!(
        markers = src.len(),
        residual_px = residual,
        identity = ?identity,
        "sheet registered"
    );

    Ok(RegisteredSheet {
        binary: &capture.binary,
        transform: fitted,
        identity,
        stats: RegistrationStats {
            markers_found: src.len(),
            max_residual_px: residual,
        },
    })
}
