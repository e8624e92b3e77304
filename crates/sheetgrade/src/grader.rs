//! High-level grading API.
//!
//! [`Grader`] is the primary entry point: construct once from a layout and
//! configuration, then call [`Grader::grade`] per captured image. Each call
//! is a pure request/response round — the engine holds no session state and
//! never touches storage; persisting the resulting score is the caller's
//! explicit follow-up via [`crate::store::GradeStore::append_record`].

use image::GrayImage;

use crate::capture::{decode_capture, normalize_gray, NormalizeConfig, NormalizedCapture};
use crate::decision::{decide_items, DecisionConfig, ItemDecision, ItemReading};
use crate::error::{GradeError, IdentificationError};
use crate::key::AnswerKey;
use crate::layout::SheetLayout;
use crate::registrar::{register_sheet, RegistrationConfig, RegistrationStats};
use crate::scorer::{score_decisions, ScoreDraft};

/// Full pipeline configuration, one field per stage.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct GradeConfig {
    pub normalize: NormalizeConfig,
    pub registration: RegistrationConfig,
    pub decision: DecisionConfig,
}

/// How the graded sheet's student identifier was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentitySource {
    /// Decoded from the sheet's code strip.
    Code,
    /// Supplied by the operator.
    Manual,
}

/// Everything one grading call produces.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct GradeOutcome {
    pub student_id: String,
    pub identity_source: IdentitySource,
    /// Score awaiting the explicit persist step.
    pub draft: ScoreDraft,
    /// Per-item fill measurements for item-analysis review.
    pub readings: Vec<ItemReading>,
    pub registration: RegistrationStats,
}

/// Grading engine for one sheet layout.
///
/// # Examples
///
/// ```no_run
/// use sheetgrade::{AnswerKey, Grader, SheetLayout};
///
/// let layout = SheetLayout::with_items(20, 4).unwrap();
/// let grader = Grader::new(layout);
/// let key = AnswerKey::from_answers(vec!['A'; 20]).unwrap();
/// let bytes = std::fs::read("capture.jpg").unwrap();
/// let outcome = grader.grade(&bytes, &key, None).unwrap();
/// println!("{}/{}", outcome.draft.correct, outcome.draft.total);
/// ```
pub struct Grader {
    layout: SheetLayout,
    config: GradeConfig,
}

impl Grader {
    /// Create a grader with default configuration.
    pub fn new(layout: SheetLayout) -> Self {
        Self {
            layout,
            config: GradeConfig::default(),
        }
    }

    /// Create with full config control.
    pub fn with_config(layout: SheetLayout, config: GradeConfig) -> Self {
        Self { layout, config }
    }

    pub fn layout(&self) -> &SheetLayout {
        &self.layout
    }

    pub fn config(&self) -> &GradeConfig {
        &self.config
    }

    /// Mutable access to configuration for post-construction tuning.
    pub fn config_mut(&mut self) -> &mut GradeConfig {
        &mut self.config
    }

    /// Grade a raw capture buffer (JPEG/PNG bytes).
    pub fn grade(
        &self,
        bytes: &[u8],
        key: &AnswerKey,
        manual_id: Option<&str>,
    ) -> Result<GradeOutcome, GradeError> {
        let capture = decode_capture(bytes, &self.config.normalize)?;
        self.grade_capture(&capture, key, manual_id)
    }

    /// Grade an already-decoded grayscale capture.
    pub fn grade_gray(
        &self,
        gray: &GrayImage,
        key: &AnswerKey,
        manual_id: Option<&str>,
    ) -> Result<GradeOutcome, GradeError> {
        let capture = normalize_gray(gray, &self.config.normalize);
        self.grade_capture(&capture, key, manual_id)
    }

    fn grade_capture(
        &self,
        capture: &NormalizedCapture,
        key: &AnswerKey,
        manual_id: Option<&str>,
    ) -> Result<GradeOutcome, GradeError> {
        let sheet = register_sheet(capture, &self.layout, &self.config.registration)?;

        // Decoded identity wins; the manual path exists so an unreadable
        // strip never blocks grading.
        let (student_id, identity_source) = match (sheet.identity, manual_id) {
            (Some(decoded), _) => (decoded.code.to_string(), IdentitySource::Code),
            (None, Some(manual)) => (manual.to_string(), IdentitySource::Manual),
            (None, None) => return Err(IdentificationError.into()),
        };

        let readings = decide_items(&sheet, &self.layout, &self.config.decision);
        let decisions: Vec<ItemDecision> = readings.iter().map(|r| r.decision).collect();
        let draft = score_decisions(&decisions, key)?;

        tracing::info!(
            student = %student_id,
            correct = draft.correct,
            total = draft.total,
            "sheet graded"
        );

        Ok(GradeOutcome {
            student_id,
            identity_source,
            draft,
            readings,
            registration: sheet.stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{render_marked_sheet, RenderConfig};
    use crate::scorer::ItemTag;

    fn answer_marks(key: &AnswerKey) -> Vec<(usize, char)> {
        key.answers()
            .iter()
            .enumerate()
            .map(|(i, &c)| (i + 1, c))
            .collect()
    }

    #[test]
    fn perfect_sheet_scores_full_marks() {
        let layout = SheetLayout::default();
        let key = AnswerKey::from_answers("ABCDABCDABCDABCDABCD".chars().collect())
            .expect("valid key");
        let img = render_marked_sheet(&layout, 31, &answer_marks(&key), &RenderConfig::default())
            .expect("valid marks");

        let grader = Grader::new(layout);
        let outcome = grader.grade_gray(&img, &key, None).expect("grades");

        assert_eq!(outcome.draft.correct, 20);
        assert_eq!(outcome.draft.total, 20);
        assert_eq!(outcome.student_id, "31");
        assert_eq!(outcome.identity_source, IdentitySource::Code);
        assert!(outcome.draft.items.iter().all(|r| r.tag == ItemTag::Correct));
    }

    #[test]
    fn manual_identity_covers_disabled_decoding() {
        let layout = SheetLayout::default();
        let key = AnswerKey::from_answers(vec!['A'; 20]).expect("valid key");
        let img = render_marked_sheet(&layout, 9, &[], &RenderConfig::default())
            .expect("no marks");

        let mut grader = Grader::new(layout);
        grader.config_mut().registration.decode_identity = false;

        let outcome = grader
            .grade_gray(&img, &key, Some("S-0042"))
            .expect("manual identity");
        assert_eq!(outcome.student_id, "S-0042");
        assert_eq!(outcome.identity_source, IdentitySource::Manual);

        let err = grader.grade_gray(&img, &key, None).expect_err("no identity");
        assert!(matches!(err, GradeError::Identification(_)));
    }

    #[test]
    fn key_of_wrong_length_fails_scoring() {
        let layout = SheetLayout::default();
        let key19 = AnswerKey::from_answers(vec!['A'; 19]).expect("valid key");
        let img = render_marked_sheet(&layout, 9, &[], &RenderConfig::default())
            .expect("no marks");

        let grader = Grader::new(layout);
        let err = grader.grade_gray(&img, &key19, None).expect_err("mismatch");
        match err {
            GradeError::KeyMismatch(e) => {
                assert_eq!(e.key_items, 19);
                assert_eq!(e.decision_items, 20);
            }
            other => panic!("unexpected error: {}", other),
        }
    }
}
