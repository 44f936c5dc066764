//! Text observations handed over by the platform recognizer.

use serde::{Deserialize, Serialize};

/// Normalized bounding box (0..1 on both axes, origin top-left).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn center_x(&self) -> f64 {
        self.x + self.width / 2.0
    }

    pub fn center_y(&self) -> f64 {
        self.y + self.height / 2.0
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    /// Finite, non-negative size, and inside the unit square (with a little
    /// slack for recognizer rounding).
    pub fn is_valid(&self) -> bool {
        const SLACK: f64 = 0.01;
        [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite())
            && self.width >= 0.0
            && self.height >= 0.0
            && self.x >= -SLACK
            && self.y >= -SLACK
            && self.right() <= 1.0 + SLACK
            && self.y + self.height <= 1.0 + SLACK
    }
}

/// One recognized text fragment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextObservation {
    /// Top candidate string
    pub text: String,
    /// Recognizer confidence in 0..1
    pub confidence: f64,
    /// Position on the page
    pub bounds: BoundingBox,
}

impl TextObservation {
    pub fn new(text: impl Into<String>, confidence: f64, bounds: BoundingBox) -> Self {
        Self {
            text: text.into(),
            confidence,
            bounds,
        }
    }

    pub fn is_usable(&self) -> bool {
        !self.text.trim().is_empty()
            && self.confidence.is_finite()
            && (0.0..=1.0).contains(&self.confidence)
            && self.bounds.is_valid()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centers() {
        let b = BoundingBox::new(0.1, 0.2, 0.2, 0.04);
        assert!((b.center_x() - 0.2).abs() < 1e-9);
        assert!((b.center_y() - 0.22).abs() < 1e-9);
        assert!((b.right() - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_boxes() {
        assert!(!BoundingBox::new(f64::NAN, 0.1, 0.1, 0.1).is_valid());
        assert!(!BoundingBox::new(0.1, 0.1, -0.1, 0.1).is_valid());
        assert!(!BoundingBox::new(0.95, 0.1, 0.2, 0.1).is_valid());
        assert!(BoundingBox::new(0.0, 0.0, 1.0, 1.0).is_valid());
    }

    #[test]
    fn test_usable_observation() {
        let b = BoundingBox::new(0.1, 0.1, 0.1, 0.02);
        assert!(TextObservation::new("TSH", 0.9, b).is_usable());
        assert!(!TextObservation::new("   ", 0.9, b).is_usable());
        assert!(!TextObservation::new("TSH", 1.5, b).is_usable());
    }
}
