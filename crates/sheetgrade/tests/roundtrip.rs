//! End-to-end round trips: generate a sheet, mark it, grade it.

use sheetgrade::{
    render_marked_sheet, render_sheet, AnswerKey, GradeError, Grader, ItemDecision, ItemTag,
    RegistrationError, RenderConfig, SheetLayout,
};

fn key(letters: &str) -> AnswerKey {
    AnswerKey::from_answers(letters.chars().collect()).expect("valid key")
}

#[test]
fn untouched_sheet_grades_all_blank_zero() {
    let layout = SheetLayout::with_items(20, 4).expect("valid layout");
    let img = render_sheet(&layout, 1207, &RenderConfig::default()).expect("valid scale");

    let grader = Grader::new(layout);
    let answer_key = key("ABCDABCDABCDABCDABCD");
    let outcome = grader
        .grade_gray(&img, &answer_key, None)
        .expect("clean sheet grades");

    assert_eq!(outcome.draft.correct, 0);
    assert_eq!(outcome.draft.total, 20);
    assert_eq!(outcome.student_id, "1207");
    assert!(outcome
        .readings
        .iter()
        .all(|r| r.decision == ItemDecision::Blank));
}

#[test]
fn mixed_sheet_grades_item_by_item() {
    let layout = SheetLayout::with_items(10, 4).expect("valid layout");
    let answer_key = key("ABCDABCDAB");

    // Items 1-6 answered correctly, 7 wrong, 8 double-marked, 9-10 left blank.
    let marks = [
        (1, 'A'),
        (2, 'B'),
        (3, 'C'),
        (4, 'D'),
        (5, 'A'),
        (6, 'B'),
        (7, 'A'),
        (8, 'C'),
        (8, 'D'),
    ];
    let img = render_marked_sheet(&layout, 88, &marks, &RenderConfig::default())
        .expect("valid marks");

    let grader = Grader::new(layout);
    let outcome = grader
        .grade_gray(&img, &answer_key, None)
        .expect("sheet grades");

    assert_eq!(outcome.draft.correct, 6);
    let tags: Vec<ItemTag> = outcome.draft.items.iter().map(|r| r.tag).collect();
    assert_eq!(
        tags,
        vec![
            ItemTag::Correct,
            ItemTag::Correct,
            ItemTag::Correct,
            ItemTag::Correct,
            ItemTag::Correct,
            ItemTag::Correct,
            ItemTag::Incorrect,
            ItemTag::Ambiguous,
            ItemTag::Blank,
            ItemTag::Blank,
        ]
    );
}

#[test]
fn rotated_capture_still_grades() {
    let layout = SheetLayout::with_items(20, 4).expect("valid layout");
    let answer_key = key("DCBADCBADCBADCBADCBA");
    let marks: Vec<(usize, char)> = answer_key
        .answers()
        .iter()
        .enumerate()
        .map(|(i, &c)| (i + 1, c))
        .collect();
    let img = render_marked_sheet(&layout, 555, &marks, &RenderConfig::default())
        .expect("valid marks");

    // A capture is never perfectly square to the page; simulate a tilted
    // phone shot and let registration undo it.
    let rotated = imageproc::geometric_transformations::rotate_about_center(
        &img,
        4.0_f32.to_radians(),
        imageproc::geometric_transformations::Interpolation::Bilinear,
        image::Luma([255u8]),
    );

    let grader = Grader::new(layout);
    let outcome = grader
        .grade_gray(&rotated, &answer_key, None)
        .expect("rotated sheet grades");

    assert_eq!(outcome.draft.correct, 20);
    assert_eq!(outcome.student_id, "555");
}

#[test]
fn covered_fiducials_ask_for_a_retake() {
    let layout = SheetLayout::with_items(20, 4).expect("valid layout");
    let answer_key = key("ABCDABCDABCDABCDABCD");
    let mut img = render_sheet(&layout, 7, &RenderConfig::default()).expect("valid scale");

    // A thumb over the two left-edge markers.
    for y in 0..1584 {
        for x in 0..180 {
            img.put_pixel(x, y, image::Luma([255u8]));
        }
    }

    let grader = Grader::new(layout);
    let err = grader
        .grade_gray(&img, &answer_key, None)
        .expect_err("registration must fail");
    match err {
        GradeError::Registration(RegistrationError::MarkersNotFound { found, required }) => {
            assert_eq!(found, 3);
            assert_eq!(required, 4);
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn sheet_from_another_layout_is_rejected() {
    let printed = SheetLayout::with_items(20, 4).expect("valid layout");
    let marks: Vec<(usize, char)> = (1..=20).map(|i| (i, 'A')).collect();
    let img = render_marked_sheet(&printed, 64, &marks, &RenderConfig::default())
        .expect("valid marks");

    // Grading configured for a longer exam: the fiducials line up, but the
    // bubble grid does not. The embedded fingerprint must refuse the sheet
    // instead of letting it grade against shifted regions.
    let grading = SheetLayout::with_items(30, 4).expect("valid layout");
    let answer_key = AnswerKey::from_answers(vec!['A'; 30]).expect("valid key");
    let grader = Grader::new(grading);

    let err = grader
        .grade_gray(&img, &answer_key, None)
        .expect_err("layout mismatch");
    assert!(matches!(
        err,
        GradeError::Registration(RegistrationError::LayoutMismatch { .. })
    ));
}

#[test]
fn scaled_down_capture_still_grades() {
    let layout = SheetLayout::with_items(20, 4).expect("valid layout");
    let answer_key = key("AAAAAAAAAAAAAAAAAAAA");
    let marks: Vec<(usize, char)> = (1..=20).map(|i| (i, 'A')).collect();
    let img = render_marked_sheet(&layout, 2, &marks, &RenderConfig::default())
        .expect("valid marks");

    // Phone uploads are often downscaled; 0.5x of the render scale.
    let small = image::imageops::resize(&img, 612, 792, image::imageops::FilterType::Triangle);

    let grader = Grader::new(layout);
    let outcome = grader
        .grade_gray(&small, &answer_key, None)
        .expect("downscaled sheet grades");
    assert_eq!(outcome.draft.correct, 20);
    assert_eq!(outcome.student_id, "2");
}
