//! Canonical sheet layout.
//!
//! Layout JSON follows a parametric schema (`sheetgrade.layout.v1`): all
//! geometry is generated at runtime from `(n_items, n_choices)` on a fixed
//! US-Letter page. Per-bubble coordinate lists are intentionally not part
//! of the schema — the generator and the grader must derive them from the
//! same parameters, which is what makes the coordinate contract a single
//! object rather than two files that can drift apart.
//!
//! Coordinates are in points (1/72 inch), origin at the top-left page
//! corner, y growing downward to match image space.

use std::path::Path;

const LAYOUT_SCHEMA_V1: &str = "sheetgrade.layout.v1";

/// Page size in points (US Letter).
pub const PAGE_SIZE_PT: [f64; 2] = [612.0, 792.0];

/// Fiducial square side.
const FIDUCIAL_SIDE_PT: f64 = 18.0;
/// Distance from page edge to a corner fiducial center.
const FIDUCIAL_INSET_PT: f64 = 36.0;

/// Number of cells in the identifier code strip.
pub const CODE_CELLS: usize = 32;
const CODE_CELL_SIDE_PT: f64 = 10.0;
const CODE_CELL_GAP_PT: f64 = 2.0;
const CODE_STRIP_TOP_PT: f64 = 58.0;

const BUBBLE_RADIUS_PT: f64 = 7.0;
const REGION_SIDE_PT: f64 = 20.0;
const CHOICE_PITCH_PT: f64 = 36.0;
const ROW_PITCH_PT: f64 = 25.2;
const COLUMN_PITCH_PT: f64 = 270.0;
const GRID_ORIGIN_PT: [f64; 2] = [100.0, 120.0];

/// Items per bubble column before wrapping to the next column.
pub const ITEMS_PER_COLUMN: usize = 25;

const MAX_ITEMS: usize = 2 * ITEMS_PER_COLUMN;
const MIN_CHOICES: usize = 2;
const MAX_CHOICES: usize = 6;

const CHOICE_ALPHABET: [char; MAX_CHOICES] = ['A', 'B', 'C', 'D', 'E', 'F'];

/// Fiducial anchors on the page: four corners plus a bottom-center marker.
///
/// The fifth marker keeps the transform fit overdetermined, so the residual
/// gate stays meaningful even when one corner is occluded.
pub const N_FIDUCIALS: usize = 5;

/// An axis-aligned square measurement region in sheet coordinates.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Region {
    /// Center (x, y) in points.
    pub center: [f64; 2],
    /// Half of the square side in points.
    pub half: f64,
}

/// Runtime sheet layout shared by the generator, the registrar, and the
/// bubble decision engine.
#[derive(Debug, Clone)]
pub struct SheetLayout {
    name: String,
    version: u8,
    n_items: usize,
    n_choices: usize,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct SheetLayoutFileV1 {
    schema: String,
    name: String,
    version: u8,
    n_items: usize,
    n_choices: usize,
}

impl SheetLayout {
    /// Build a layout for `n_items` questions with `n_choices` bubbles each.
    pub fn with_items(n_items: usize, n_choices: usize) -> Result<Self, String> {
        let layout = Self {
            name: format!("letter_{}x{}", n_items, n_choices),
            version: 1,
            n_items,
            n_choices,
        };
        layout.validate()?;
        Ok(layout)
    }

    /// Use a different layout revision.
    ///
    /// The revision feeds the fingerprint embedded in printed sheets; bump
    /// it whenever the printed geometry changes beyond the item/choice
    /// counts, so stale sheets are rejected at registration instead of
    /// silently misgraded.
    pub fn with_version(mut self, version: u8) -> Self {
        self.version = version;
        self
    }

    /// Load a layout from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let data = std::fs::read_to_string(path)?;
        let file: SheetLayoutFileV1 = serde_json::from_str(&data)?;
        Self::from_layout_file(file).map_err(Into::into)
    }

    fn from_layout_file(file: SheetLayoutFileV1) -> Result<Self, String> {
        if file.schema != LAYOUT_SCHEMA_V1 {
            return Err(format!(
                "unsupported layout schema '{}' (expected '{}')",
                file.schema, LAYOUT_SCHEMA_V1
            ));
        }
        if file.name.trim().is_empty() {
            return Err("layout name must not be empty".to_string());
        }
        let layout = Self {
            name: file.name,
            version: file.version,
            n_items: file.n_items,
            n_choices: file.n_choices,
        };
        layout.validate()?;
        Ok(layout)
    }

    fn validate(&self) -> Result<(), String> {
        if self.n_items == 0 || self.n_items > MAX_ITEMS {
            return Err(format!("n_items must be in 1..={}", MAX_ITEMS));
        }
        if self.n_choices < MIN_CHOICES || self.n_choices > MAX_CHOICES {
            return Err(format!(
                "n_choices must be in {}..={}",
                MIN_CHOICES, MAX_CHOICES
            ));
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Layout revision, one input to [`SheetLayout::fingerprint`].
    pub fn version(&self) -> u8 {
        self.version
    }

    /// 8-bit fingerprint of everything that determines the printed
    /// geometry: the layout revision plus `(n_items, n_choices)`.
    ///
    /// Embedded in every generated sheet's code strip and checked at
    /// registration, so a sheet can never be silently graded against a
    /// layout whose bubble positions differ — whether because the revision
    /// was bumped or because the item/choice counts disagree.
    pub fn fingerprint(&self) -> u8 {
        let mut h: u8 = 0x5C;
        for b in [self.version, self.n_items as u8, self.n_choices as u8] {
            h ^= b;
            h = h.rotate_left(3).wrapping_add(0x9D);
        }
        h
    }

    pub fn n_items(&self) -> usize {
        self.n_items
    }

    pub fn n_choices(&self) -> usize {
        self.n_choices
    }

    /// Letter printed next to choice `idx` (0-based).
    ///
    /// Panics if `idx` is out of the layout's alphabet; callers index with
    /// values already validated against `n_choices`.
    pub fn choice_letter(&self, idx: usize) -> char {
        assert!(idx < self.n_choices, "choice index out of range");
        CHOICE_ALPHABET[idx]
    }

    /// 0-based index of a choice letter, or `None` if the letter is not in
    /// this layout's alphabet.
    pub fn choice_index(&self, letter: char) -> Option<usize> {
        CHOICE_ALPHABET[..self.n_choices]
            .iter()
            .position(|&c| c == letter.to_ascii_uppercase())
    }

    /// Iterator over the layout's choice letters in order.
    pub fn choice_letters(&self) -> impl Iterator<Item = char> + '_ {
        CHOICE_ALPHABET[..self.n_choices].iter().copied()
    }

    // ── Fiducials ────────────────────────────────────────────────────────

    /// Fiducial centers in canonical order: top-left, top-right,
    /// bottom-left, bottom-right, bottom-center.
    pub fn fiducial_centers(&self) -> [[f64; 2]; N_FIDUCIALS] {
        let [w, h] = PAGE_SIZE_PT;
        let m = FIDUCIAL_INSET_PT;
        [
            [m, m],
            [w - m, m],
            [m, h - m],
            [w - m, h - m],
            [w / 2.0, h - m],
        ]
    }

    /// Side of a fiducial square in points.
    pub fn fiducial_side(&self) -> f64 {
        FIDUCIAL_SIDE_PT
    }

    // ── Identifier code strip ────────────────────────────────────────────

    /// Center of code strip cell `i` (0-based, left to right).
    pub fn code_cell_center(&self, i: usize) -> [f64; 2] {
        debug_assert!(i < CODE_CELLS);
        let strip_width =
            CODE_CELLS as f64 * CODE_CELL_SIDE_PT + (CODE_CELLS as f64 - 1.0) * CODE_CELL_GAP_PT;
        let x0 = (PAGE_SIZE_PT[0] - strip_width) / 2.0;
        let x = x0 + i as f64 * (CODE_CELL_SIDE_PT + CODE_CELL_GAP_PT) + CODE_CELL_SIDE_PT / 2.0;
        [x, CODE_STRIP_TOP_PT + CODE_CELL_SIDE_PT / 2.0]
    }

    /// Measurement region of code strip cell `i`.
    pub fn code_cell_region(&self, i: usize) -> Region {
        Region {
            center: self.code_cell_center(i),
            half: CODE_CELL_SIDE_PT / 2.0,
        }
    }

    /// Side of a code strip cell in points.
    pub fn code_cell_side(&self) -> f64 {
        CODE_CELL_SIDE_PT
    }

    // ── Bubble grid ──────────────────────────────────────────────────────

    /// Bubble center for `item` (0-based) and `choice` (0-based).
    pub fn choice_center(&self, item: usize, choice: usize) -> [f64; 2] {
        debug_assert!(item < self.n_items);
        debug_assert!(choice < self.n_choices);
        let col = item / ITEMS_PER_COLUMN;
        let row = item % ITEMS_PER_COLUMN;
        let x = GRID_ORIGIN_PT[0] + col as f64 * COLUMN_PITCH_PT + choice as f64 * CHOICE_PITCH_PT;
        let y = GRID_ORIGIN_PT[1] + row as f64 * ROW_PITCH_PT;
        [x, y]
    }

    /// Fill-measurement region around a bubble.
    pub fn choice_region(&self, item: usize, choice: usize) -> Region {
        Region {
            center: self.choice_center(item, choice),
            half: REGION_SIDE_PT / 2.0,
        }
    }

    /// Printed bubble radius in points.
    pub fn bubble_radius(&self) -> f64 {
        BUBBLE_RADIUS_PT
    }
}

impl Default for SheetLayout {
    fn default() -> Self {
        Self::with_items(20, 4).expect("default layout parameters must be valid")
    }
}
