//! Error types for the grading pipeline.
//!
//! Each pipeline stage owns a dedicated error enum; [`GradeError`] is the
//! sum type returned by the top-level grading call. All four kinds are
//! recoverable at the caller level (retake the photo, supply a manual
//! identifier, fix the answer key) — none aborts the process.

// ── Capture decode ───────────────────────────────────────────────────────

/// The capture buffer could not be decoded into an image.
#[derive(Debug)]
pub enum DecodeError {
    /// The byte buffer is not a valid raster encoding.
    InvalidImage(image::ImageError),
    /// The decoded image is too small to carry a sheet.
    ImageTooSmall { width: u32, height: u32, min_side: u32 },
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidImage(e) => write!(f, "capture is not a decodable image: {}", e),
            Self::ImageTooSmall {
                width,
                height,
                min_side,
            } => write!(
                f,
                "capture {}x{} is too small: both sides must be >= {} px",
                width, height, min_side
            ),
        }
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidImage(e) => Some(e),
            Self::ImageTooSmall { .. } => None,
        }
    }
}

impl From<image::ImageError> for DecodeError {
    fn from(e: image::ImageError) -> Self {
        Self::InvalidImage(e)
    }
}

// ── Registration ─────────────────────────────────────────────────────────

/// The photographed sheet could not be aligned to the canonical layout.
#[derive(Debug, Clone, PartialEq)]
pub enum RegistrationError {
    /// Fewer fiducial anchors were located than the configuration requires.
    MarkersNotFound { found: usize, required: usize },
    /// A transform was fitted but its worst fiducial residual exceeds the
    /// configured tolerance.
    GeometryInconsistent {
        max_residual_px: f64,
        tolerance_px: f64,
    },
    /// The transform fit failed numerically (collinear or coincident anchors).
    DegenerateTransform(String),
    /// The sheet's code strip decoded cleanly but carries a different
    /// layout fingerprint than the grading layout — its revision or its
    /// item/choice geometry differs.
    LayoutMismatch {
        expected_fingerprint: u8,
        found_fingerprint: u8,
    },
}

impl std::fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MarkersNotFound { found, required } => {
                write!(f, "located {} fiducial markers, need {}", found, required)
            }
            Self::GeometryInconsistent {
                max_residual_px,
                tolerance_px,
            } => write!(
                f,
                "fiducial geometry inconsistent: max residual {:.2} px exceeds tolerance {:.2} px",
                max_residual_px, tolerance_px
            ),
            Self::DegenerateTransform(msg) => write!(f, "degenerate transform: {}", msg),
            Self::LayoutMismatch {
                expected_fingerprint,
                found_fingerprint,
            } => write!(
                f,
                "sheet layout fingerprint 0x{:02X} does not match grading layout 0x{:02X} \
                 (revision or item/choice geometry differs)",
                found_fingerprint, expected_fingerprint
            ),
        }
    }
}

impl std::error::Error for RegistrationError {}

// ── Identification ───────────────────────────────────────────────────────

/// No student identifier could be resolved for the sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentificationError;

impl std::fmt::Display for IdentificationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "identifier code unreadable and no manual identifier supplied"
        )
    }
}

impl std::error::Error for IdentificationError {}

// ── Scoring ──────────────────────────────────────────────────────────────

/// The decision sequence and the answer key disagree on the item count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyMismatchError {
    pub key_items: usize,
    pub decision_items: usize,
}

impl std::fmt::Display for KeyMismatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "answer key has {} items but {} decisions were produced",
            self.key_items, self.decision_items
        )
    }
}

impl std::error::Error for KeyMismatchError {}

// ── Pipeline sum type ────────────────────────────────────────────────────

/// Any failure of the four-stage grading pipeline.
#[derive(Debug)]
pub enum GradeError {
    Decode(DecodeError),
    Registration(RegistrationError),
    Identification(IdentificationError),
    KeyMismatch(KeyMismatchError),
}

impl std::fmt::Display for GradeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Decode(e) => write!(f, "decode: {}", e),
            Self::Registration(e) => write!(f, "registration: {}", e),
            Self::Identification(e) => write!(f, "identification: {}", e),
            Self::KeyMismatch(e) => write!(f, "scoring: {}", e),
        }
    }
}

impl std::error::Error for GradeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Decode(e) => Some(e),
            Self::Registration(e) => Some(e),
            Self::Identification(e) => Some(e),
            Self::KeyMismatch(e) => Some(e),
        }
    }
}

impl From<DecodeError> for GradeError {
    fn from(e: DecodeError) -> Self {
        Self::Decode(e)
    }
}

impl From<RegistrationError> for GradeError {
    fn from(e: RegistrationError) -> Self {
        Self::Registration(e)
    }
}

impl From<IdentificationError> for GradeError {
    fn from(e: IdentificationError) -> Self {
        Self::Identification(e)
    }
}

impl From<KeyMismatchError> for GradeError {
    fn from(e: KeyMismatchError) -> Self {
        Self::KeyMismatch(e)
    }
}
