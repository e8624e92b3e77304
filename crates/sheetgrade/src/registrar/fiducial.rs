//! Fiducial marker location in the binary capture.
//!
//! The printed markers are filled squares, which makes them the densest
//! compact blobs on the sheet. Detection labels connected foreground
//! components, keeps the ones that look like filled squares (relative area,
//! bounding-box squareness, fill ratio), and assigns survivors to the
//! layout's anchor positions by proximity. The filters stay permissive on
//! purpose; the registration residual gate downstream is what rejects a
//! wrong assignment.

use image::{GrayImage, Luma};
use imageproc::region_labelling::{connected_components, Connectivity};

use crate::layout::PAGE_SIZE_PT;

/// Configuration for fiducial candidate extraction and anchor matching.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct FiducialConfig {
    /// Minimum component area as a fraction of the image area.
    /// Default: [`FiducialConfig::DEFAULT_MIN_AREA_FRAC`].
    pub min_area_frac: f64,
    /// Maximum component area as a fraction of the image area.
    /// Default: [`FiducialConfig::DEFAULT_MAX_AREA_FRAC`].
    pub max_area_frac: f64,
    /// Minimum component area / bounding-box area. A filled square scores
    /// 1.0, a circle ~0.78, line art much lower.
    /// Default: [`FiducialConfig::DEFAULT_MIN_FILL_RATIO`].
    pub min_fill_ratio: f32,
    /// Maximum bounding-box side ratio (longer / shorter).
    /// Default: [`FiducialConfig::DEFAULT_MAX_ASPECT`].
    pub max_aspect: f32,
    /// Maximum candidate-to-anchor distance as a fraction of the image
    /// diagonal; candidates further out are never matched to an anchor.
    /// Default: [`FiducialConfig::DEFAULT_MAX_ANCHOR_DIST_FRAC`].
    pub max_anchor_dist_frac: f64,
    /// Number of distinct anchors that must be covered for registration to
    /// proceed. Default: [`FiducialConfig::DEFAULT_REQUIRED_MARKERS`].
    pub required_markers: usize,
}

impl FiducialConfig {
    pub const DEFAULT_MIN_AREA_FRAC: f64 = 5e-5;
    pub const DEFAULT_MAX_AREA_FRAC: f64 = 0.01;
    pub const DEFAULT_MIN_FILL_RATIO: f32 = 0.65;
    pub const DEFAULT_MAX_ASPECT: f32 = 1.6;
    pub const DEFAULT_MAX_ANCHOR_DIST_FRAC: f64 = 0.25;
    pub const DEFAULT_REQUIRED_MARKERS: usize = 4;
}

impl Default for FiducialConfig {
    fn default() -> Self {
        Self {
            min_area_frac: Self::DEFAULT_MIN_AREA_FRAC,
            max_area_frac: Self::DEFAULT_MAX_AREA_FRAC,
            min_fill_ratio: Self::DEFAULT_MIN_FILL_RATIO,
            max_aspect: Self::DEFAULT_MAX_ASPECT,
            max_anchor_dist_frac: Self::DEFAULT_MAX_ANCHOR_DIST_FRAC,
            required_markers: Self::DEFAULT_REQUIRED_MARKERS,
        }
    }
}

/// A connected component that passed the square-marker filters.
#[derive(Debug, Clone, Copy)]
pub struct MarkerCandidate {
    /// Centroid in image pixels.
    pub center: [f64; 2],
    /// Foreground pixel count.
    pub area: u32,
    /// Bounding box `[x0, y0, x1, y1]`, inclusive.
    pub bbox: [u32; 4],
}

#[derive(Clone, Copy)]
struct ComponentStats {
    area: u32,
    sum_x: f64,
    sum_y: f64,
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
}

impl Default for ComponentStats {
    fn default() -> Self {
        Self {
            area: 0,
            sum_x: 0.0,
            sum_y: 0.0,
            min_x: u32::MAX,
            min_y: u32::MAX,
            max_x: 0,
            max_y: 0,
        }
    }
}

/// Extract filled-square candidates from the binary image.
pub fn find_marker_candidates(binary: &GrayImage, config: &FiducialConfig) -> Vec<MarkerCandidate> {
    let (w, h) = binary.dimensions();
    if w == 0 || h == 0 {
        return Vec::new();
    }

    let labeled = connected_components(binary, Connectivity::Eight, Luma([0u8]));

    let mut stats: Vec<ComponentStats> = Vec::new();
    for (x, y, p) in labeled.enumerate_pixels() {
        let label = p[0] as usize;
        if label == 0 {
            continue;
        }
        if label > stats.len() {
            stats.resize(label, ComponentStats::default());
        }
        let s = &mut stats[label - 1];
        s.area += 1;
        s.sum_x += x as f64;
        s.sum_y += y as f64;
        s.min_x = s.min_x.min(x);
        s.min_y = s.min_y.min(y);
        s.max_x = s.max_x.max(x);
        s.max_y = s.max_y.max(y);
    }

    let image_area = w as f64 * h as f64;
    let min_area = (config.min_area_frac * image_area).max(4.0);
    let max_area = config.max_area_frac * image_area;

    let mut candidates = Vec::new();
    for s in &stats {
        if s.area == 0 {
            continue;
        }
        let area = s.area as f64;
        if area < min_area || area > max_area {
            continue;
        }
        let bw = (s.max_x - s.min_x + 1) as f32;
        let bh = (s.max_y - s.min_y + 1) as f32;
        let aspect = bw.max(bh) / bw.min(bh);
        if aspect > config.max_aspect {
            continue;
        }
        let fill = s.area as f32 / (bw * bh);
        if fill < config.min_fill_ratio {
            continue;
        }
        candidates.push(MarkerCandidate {
            center: [s.sum_x / area, s.sum_y / area],
            area: s.area,
            bbox: [s.min_x, s.min_y, s.max_x, s.max_y],
        });
    }
    candidates
}

/// Match candidates to the layout's fiducial anchors.
///
/// Anchors are projected into image space by scaling the canonical page
/// onto the image extent (a roughly-upright, sheet-filling capture is
/// assumed; anything else fails the residual gate downstream). Matching is
/// greedy nearest-pair, one candidate per anchor.
pub fn assign_to_anchors(
    candidates: &[MarkerCandidate],
    anchors_pt: &[[f64; 2]],
    image_size: [u32; 2],
    config: &FiducialConfig,
) -> Vec<Option<MarkerCandidate>> {
    let [w, h] = image_size;
    let sx = w as f64 / PAGE_SIZE_PT[0];
    let sy = h as f64 / PAGE_SIZE_PT[1];
    let diag = ((w as f64).powi(2) + (h as f64).powi(2)).sqrt();
    let max_dist = config.max_anchor_dist_frac * diag;

    let mut pairs: Vec<(f64, usize, usize)> = Vec::new();
    for (ai, anchor) in anchors_pt.iter().enumerate() {
        let ax = anchor[0] * sx;
        let ay = anchor[1] * sy;
        for (ci, cand) in candidates.iter().enumerate() {
            let d = ((cand.center[0] - ax).powi(2) + (cand.center[1] - ay).powi(2)).sqrt();
            if d <= max_dist {
                pairs.push((d, ai, ci));
            }
        }
    }
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut matched: Vec<Option<MarkerCandidate>> = vec![None; anchors_pt.len()];
    let mut used = vec![false; candidates.len()];
    for (_, ai, ci) in pairs {
        if matched[ai].is_some() || used[ci] {
            continue;
        }
        matched[ai] = Some(candidates[ci]);
        used[ci] = true;
    }
    matched
}
