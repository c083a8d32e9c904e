use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

// ============================================================================
// Occurrences and provenance
// ============================================================================

/// Stable identity of one occurrence, unique within its document.
///
/// Serialized as a bare integer (the `index` field of `index.json`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OccurrenceId(pub u32);

impl fmt::Display for OccurrenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for OccurrenceId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// Axis-aligned rectangle given by its corners `(x0, y0, x1, y1)`.
///
/// Serialized as a four-element array, matching the `crop_box` field of the
/// index resource.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct Rect {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl Rect {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }

    /// True when all corners are finite and the rectangle has positive area.
    pub fn is_well_formed(&self) -> bool {
        [self.x0, self.y0, self.x1, self.y1].iter().all(|v| v.is_finite()) && self.x1 > self.x0 && self.y1 > self.y0
    }
}

impl From<[f64; 4]> for Rect {
    fn from([x0, y0, x1, y1]: [f64; 4]) -> Self {
        Self { x0, y0, x1, y1 }
    }
}

impl From<Rect> for [f64; 4] {
    fn from(rect: Rect) -> Self {
        [rect.x0, rect.y0, rect.x1, rect.y1]
    }
}

/// Grid cell of an occurrence on its page.
///
/// Columns and rows follow the layout convention of the segmentation
/// pipeline; for vertical right-to-left inscriptions column 0 is the first
/// column read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridPosition {
    pub col: u32,
    pub row: u32,
}

/// Diagnostic output of an upstream recognizer.
///
/// Never authoritative: the occurrence's `character` label always wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recognition {
    /// Character the recognizer guessed
    #[serde(rename = "char")]
    pub guess: String,
    /// Recognizer confidence in `[0, 1]`
    pub confidence: f32,
}

/// Provenance of one occurrence on its source page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    /// Page image filename
    pub image: String,
    /// Page number within the document
    #[serde(rename = "image_index")]
    pub page: u32,
    pub grid: GridPosition,
    /// Crop rectangle in page-pixel space
    pub crop_box: Rect,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recognition: Option<Recognition>,
}

/// One located instance of a character glyph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Occurrence {
    #[serde(rename = "index")]
    pub id: OccurrenceId,
    /// Character label
    #[serde(rename = "char")]
    pub character: String,
    /// Cropped bitmap filename, relative to the index resource
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codepoint: Option<String>,
    pub source: SourceRecord,
}

// ============================================================================
// Analysis results
// ============================================================================

/// Fixed-length standardized descriptor of one bitmap.
///
/// Values have zero mean and unit variance over the vector's own elements
/// (or are all zero for a uniform bitmap). Vectors are only comparable when
/// produced with the same grid size.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    grid_size: u32,
    values: Arc<[f64]>,
}

impl FeatureVector {
    pub fn new(grid_size: u32, values: Vec<f64>) -> Self {
        Self {
            grid_size,
            values: values.into(),
        }
    }

    pub fn grid_size(&self) -> u32 {
        self.grid_size
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// One entry of a similarity ranking.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankedOccurrence {
    pub id: OccurrenceId,
    /// Euclidean distance to the reference; `None` when the ordering came
    /// from the analysis cache, which stores order only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
}

/// Occurrences of a character ordered by resemblance to a reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ranking {
    pub character: String,
    pub reference: OccurrenceId,
    /// Ordered by non-decreasing distance to the reference
    pub ranked: Vec<RankedOccurrence>,
    /// Occurrences whose bitmap could not be decoded, in list order
    pub unranked: Vec<OccurrenceId>,
    pub origin: AnalysisOrigin,
}

/// A group of occurrences sharing a visual variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: usize,
    pub members: Vec<OccurrenceId>,
    /// Member closest to the group's centroid
    #[serde(rename = "rep")]
    pub representative: OccurrenceId,
}

impl Cluster {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, id: OccurrenceId) -> bool {
        self.members.contains(&id)
    }
}

/// Variant partition of one character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSet {
    pub character: String,
    /// Ordered by descending member count
    pub clusters: Vec<Cluster>,
    /// Occurrences whose bitmap could not be decoded, in list order
    pub excluded: Vec<OccurrenceId>,
    pub origin: AnalysisOrigin,
}

/// Where an analysis result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisOrigin {
    /// Translated from the precomputed analysis cache
    Cache,
    /// Computed on demand from feature vectors
    Live,
}

/// Why no variant analysis is available for a character.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Unavailable {
    /// The character is not in the index
    UnknownCharacter,
    /// The reference occurrence does not belong to the character
    UnknownReference { id: OccurrenceId },
    /// Fewer than two occurrences have usable bitmaps
    TooFewOccurrences { usable: usize },
    /// The reference bitmap failed to decode
    ReferenceUndecodable { id: OccurrenceId },
    /// A newer selection replaced the request before it finished
    Superseded,
}

impl fmt::Display for Unavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownCharacter => write!(f, "character is not in the index"),
            Self::UnknownReference { id } => write!(f, "occurrence {} is not an occurrence of this character", id),
            Self::TooFewOccurrences { usable } => {
                write!(f, "no variant analysis available ({} usable occurrence(s))", usable)
            }
            Self::ReferenceUndecodable { id } => write!(f, "bitmap of occurrence {} could not be decoded", id),
            Self::Superseded => write!(f, "superseded by a newer selection"),
        }
    }
}

/// Result of an analysis request: either a value or a defined refusal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum Analysis<T> {
    Ready(T),
    Unavailable(Unavailable),
}

impl<T> Analysis<T> {
    pub fn ready(self) -> Option<T> {
        match self {
            Self::Ready(value) => Some(value),
            Self::Unavailable(_) => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }
}
