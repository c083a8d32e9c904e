//! Provenance locator: page-pixel crop rectangles to on-screen highlights.
//!
//! A page bitmap is rendered into a viewer box with a uniform "contain" fit:
//! one scale factor for both axes, centered, letterboxed along the slack
//! axis. The locator applies the same transform to an occurrence's crop
//! rectangle so the highlight lands on the glyph.

use crate::types::Rect;
use serde::{Deserialize, Serialize};

/// Width and height in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// True when both dimensions are finite and strictly positive.
    pub fn is_known(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }
}

/// Uniform scale plus centering offset from page space to screen space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitTransform {
    pub scale: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

impl FitTransform {
    /// Fit a `natural`-sized page into a `screen`-sized box.
    ///
    /// Returns `None` when either size is zero or unknown; the caller shows no
    /// highlight in that case.
    pub fn contain(natural: Size, screen: Size) -> Option<Self> {
        if !natural.is_known() || !screen.is_known() {
            return None;
        }

        let scale = (screen.width / natural.width).min(screen.height / natural.height);
        Some(Self {
            scale,
            offset_x: (screen.width - natural.width * scale) / 2.0,
            offset_y: (screen.height - natural.height * scale) / 2.0,
        })
    }

    /// Map a page-space point to screen space.
    pub fn apply_point(&self, x: f64, y: f64) -> (f64, f64) {
        (self.offset_x + x * self.scale, self.offset_y + y * self.scale)
    }

    /// Map a screen-space point back to page space.
    pub fn invert_point(&self, x: f64, y: f64) -> (f64, f64) {
        ((x - self.offset_x) / self.scale, (y - self.offset_y) / self.scale)
    }

    pub fn apply(&self, rect: &Rect) -> Rect {
        let (x0, y0) = self.apply_point(rect.x0, rect.y0);
        let (x1, y1) = self.apply_point(rect.x1, rect.y1);
        Rect::new(x0, y0, x1, y1)
    }

    pub fn invert(&self, rect: &Rect) -> Rect {
        let (x0, y0) = self.invert_point(rect.x0, rect.y0);
        let (x1, y1) = self.invert_point(rect.x1, rect.y1);
        Rect::new(x0, y0, x1, y1)
    }
}

/// Highlight rectangle for `crop` on a page of size `natural` shown in a `screen` box.
///
/// Pure and stateless: recompute whenever either size changes.
pub fn locate(crop: &Rect, natural: Size, screen: Size) -> Option<Rect> {
    FitTransform::contain(natural, screen).map(|transform| transform.apply(crop))
}
