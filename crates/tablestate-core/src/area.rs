//! Rectangular areas watched on the projected surface.

use crate::error::{StateError, StateResult};
use kurbo::{Point, Rect};
use serde::{Deserialize, Serialize};

/// A tracked rectangular region, in surface pixels.
///
/// The runtime only looks at position and size. Anything else an application
/// wants to carry along (labels, identifiers) goes in `metadata`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rectangle {
    /// Left edge.
    pub pos_x: u32,
    /// Top edge.
    pub pos_y: u32,
    /// Width (must be positive).
    pub width: u32,
    /// Height (must be positive).
    pub height: u32,
    /// Opaque application data, ignored by the runtime.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Rectangle {
    /// Create a new rectangle.
    pub fn new(pos_x: u32, pos_y: u32, width: u32, height: u32) -> StateResult<Self> {
        let rect = Self {
            pos_x,
            pos_y,
            width,
            height,
            metadata: None,
        };
        rect.validate()?;
        Ok(rect)
    }

    /// Attach application metadata.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Check the geometry. Deserialized rectangles bypass [`Rectangle::new`],
    /// so area groups validate again on insertion.
    pub fn validate(&self) -> StateResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(StateError::InvalidGeometry {
                width: self.width,
                height: self.height,
            });
        }
        Ok(())
    }

    /// Get the rectangle as a kurbo Rect.
    pub fn as_rect(&self) -> Rect {
        let x0 = f64::from(self.pos_x);
        let y0 = f64::from(self.pos_y);
        Rect::new(x0, y0, x0 + f64::from(self.width), y0 + f64::from(self.height))
    }

    /// Check whether a surface point falls inside this rectangle.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.as_rect().contains(Point::new(x, y))
    }

    /// Check whether two rectangles share any area. Touching edges do not count.
    pub fn overlaps(&self, other: &Rectangle) -> bool {
        self.as_rect().intersect(other.as_rect()).area() > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_zero_size() {
        assert!(matches!(
            Rectangle::new(0, 0, 0, 10),
            Err(StateError::InvalidGeometry { width: 0, height: 10 })
        ));
        assert!(matches!(
            Rectangle::new(0, 0, 10, 0),
            Err(StateError::InvalidGeometry { .. })
        ));
    }

    #[test]
    fn test_contains() {
        let rect = Rectangle::new(150, 150, 100, 100).unwrap();
        assert!(rect.contains(200.0, 200.0));
        assert!(!rect.contains(50.0, 50.0));
    }

    #[test]
    fn test_overlaps_ignores_shared_edge() {
        let a = Rectangle::new(0, 0, 100, 100).unwrap();
        let b = Rectangle::new(100, 0, 100, 100).unwrap();
        let c = Rectangle::new(50, 50, 100, 100).unwrap();
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&c));
    }

    #[test]
    fn test_deserialize_camel_case_with_extra_metadata() {
        let json = r#"{"posX":500,"posY":50,"width":100,"height":100,"metadata":{"label":"rect3"}}"#;
        let rect: Rectangle = serde_json::from_str(json).unwrap();
        assert_eq!(rect.pos_x, 500);
        assert_eq!(rect.metadata.unwrap()["label"], "rect3");
    }

    #[test]
    fn test_validate_catches_deserialized_zero_width() {
        let rect: Rectangle =
            serde_json::from_str(r#"{"posX":0,"posY":0,"width":0,"height":5}"#).unwrap();
        assert!(rect.validate().is_err());
    }
}
