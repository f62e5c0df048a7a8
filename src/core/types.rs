// Shared data model for the Braille reading workflow

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of dot positions in a standard Braille cell
pub const DOTS_PER_CELL: usize = 6;

/// Dot-presence vector of one Braille cell
///
/// Index order follows the Braille dot numbering: top-left, mid-left,
/// bottom-left, top-right, mid-right, bottom-right (dots 1-6). An all-false
/// pattern is a word-space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DotPattern([bool; DOTS_PER_CELL]);

impl DotPattern {
    pub const BLANK: DotPattern = DotPattern([false; DOTS_PER_CELL]);

    /// Build from a bitmask where bit `i` is dot `i + 1`
    pub const fn from_bits(bits: u8) -> Self {
        let mut dots = [false; DOTS_PER_CELL];
        let mut i = 0;
        while i < DOTS_PER_CELL {
            dots[i] = bits & (1 << i) != 0;
            i += 1;
        }
        Self(dots)
    }

    /// Bitmask where bit `i` is dot `i + 1`; matches the low bits of the
    /// Unicode Braille block offset
    pub const fn bits(&self) -> u8 {
        let mut bits = 0u8;
        let mut i = 0;
        while i < DOTS_PER_CELL {
            if self.0[i] {
                bits |= 1 << i;
            }
            i += 1;
        }
        bits
    }

    /// Position index for a (row, column) slot of the 3x2 cell template
    pub const fn index(row: usize, col: usize) -> usize {
        col * 3 + row
    }

    pub fn is_raised(&self, index: usize) -> bool {
        self.0.get(index).copied().unwrap_or(false)
    }

    pub fn set(&mut self, index: usize, raised: bool) {
        if let Some(slot) = self.0.get_mut(index) {
            *slot = raised;
        }
    }

    pub fn is_blank(&self) -> bool {
        self.0.iter().all(|&d| !d)
    }

    pub fn raised_count(&self) -> usize {
        self.0.iter().filter(|&&d| d).count()
    }
}

impl From<[u8; DOTS_PER_CELL]> for DotPattern {
    /// Accepts the tuple notation used in Braille tables, e.g. `[1, 0, 0, 1, 0, 0]`
    fn from(digits: [u8; DOTS_PER_CELL]) -> Self {
        let mut dots = [false; DOTS_PER_CELL];
        for (dot, digit) in dots.iter_mut().zip(digits) {
            *dot = digit != 0;
        }
        Self(dots)
    }
}

impl fmt::Display for DotPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, dot) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", u8::from(*dot))?;
        }
        write!(f, ")")
    }
}

/// A blob accepted as a candidate Braille dot
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Dot {
    pub x: f32,
    pub y: f32,
    pub area: u32,
    /// [min_x, min_y, max_x, max_y], inclusive
    pub bbox: [u32; 4],
}

impl Dot {
    /// Radius of a disc with the same area
    pub fn radius(&self) -> f32 {
        (self.area as f32 / std::f32::consts::PI).sqrt()
    }

    pub fn distance_to(&self, x: f32, y: f32) -> f32 {
        ((self.x - x).powi(2) + (self.y - y).powi(2)).sqrt()
    }
}

/// One cell in reading order
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Cell {
    /// Text line this cell belongs to (0-based, top to bottom)
    pub line: usize,
    /// x of the left dot column
    pub x: f32,
    /// y of the top dot row
    pub y: f32,
    pub pattern: DotPattern,
    /// True for space cells inserted at word and line boundaries
    pub inserted: bool,
}

impl Cell {
    pub fn space(line: usize, x: f32, y: f32) -> Self {
        Self {
            line,
            x,
            y,
            pattern: DotPattern::BLANK,
            inserted: true,
        }
    }
}

/// Result of running the cell detector on one image
#[derive(Debug, Clone)]
pub struct CellDetection {
    /// Cells in reading order, including inserted space cells
    pub cells: Vec<Cell>,
    /// Dots that survived blob filtering
    pub dots: Vec<Dot>,
    /// Dot pitch used for grid inference, when any dots were found
    pub dot_spacing: Option<f32>,
    /// Diagnostics for blobs that could not be placed in a cell
    pub notes: Vec<String>,
    /// Copy of the input with dots and cells marked
    pub annotated: DynamicImage,
}

/// Transliteration of one Braille string
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transliteration {
    /// Per-character table result, always available
    pub basic: String,
    /// Final text: the collaborator's answer when it succeeded, else `basic`
    pub text: String,
    /// True when the external translation stage produced `text`
    pub enhanced: bool,
}

/// Response body of a processed image
#[derive(Debug, Clone, Serialize)]
pub struct ProcessOutcome {
    pub braille: String,
    pub spanish: String,
    /// Base64 JPEG of the annotated image
    pub processed_image: String,
    /// Seconds spent on the request
    pub processing_time: f64,
    pub cells: usize,
    pub dots: usize,
    pub enhanced: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
    pub success: bool,
}
