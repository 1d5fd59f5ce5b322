//! Canonical polygon records and the normalizer that produces them.
//!
//! Every engine reports geometry differently (axis-aligned boxes, float
//! quadrilaterals, arbitrary float polygons). Everything downstream of the
//! adapters only ever sees [`Region`]: integer pixel points, at least three of
//! them, plus the recognized text.

use serde::{Deserialize, Serialize};

/// Integer pixel coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Closed polygon plus the text recognized inside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub points: Vec<Point>,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl Region {
    /// Build a region from an already-normalized polygon.
    /// Returns `None` for degenerate polygons (fewer than 3 points).
    pub fn new(points: Vec<Point>, text: impl Into<String>, confidence: Option<f64>) -> Option<Self> {
        if points.len() < 3 {
            return None;
        }
        Some(Self {
            points,
            text: text.into(),
            confidence,
        })
    }

    /// Region from an axis-aligned box.
    pub fn from_rect(
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        text: impl Into<String>,
        confidence: Option<f64>,
    ) -> Option<Self> {
        Self::new(rect_to_polygon(x, y, width, height)?, text, confidence)
    }

    /// Region from float points (quadrilateral or arbitrary polygon).
    pub fn from_float_points(
        points: &[[f64; 2]],
        text: impl Into<String>,
        confidence: Option<f64>,
    ) -> Option<Self> {
        Self::new(truncate_points(points)?, text, confidence)
    }
}

/// Rectangle → 4 corners clockwise from top-left (TL, TR, BR, BL).
pub fn rect_to_polygon(x: i32, y: i32, width: i32, height: i32) -> Option<Vec<Point>> {
    if width <= 0 || height <= 0 {
        return None;
    }
    let right = x.saturating_add(width);
    let bottom = y.saturating_add(height);
    Some(vec![
        Point::new(x, y),
        Point::new(right, y),
        Point::new(right, bottom),
        Point::new(x, bottom),
    ])
}

/// Truncate float points toward zero, preserving order.
pub fn truncate_points(points: &[[f64; 2]]) -> Option<Vec<Point>> {
    if points.len() < 3 {
        return None;
    }
    // `as` saturates on overflow and maps NaN to 0
    Some(
        points
            .iter()
            .map(|[x, y]| Point::new(x.trunc() as i32, y.trunc() as i32))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Shoelace area; positive for clockwise order in image space (y down).
    fn signed_area(points: &[Point]) -> f64 {
        let n = points.len();
        if n < 3 {
            return 0.0;
        }
        let twice: i64 = (0..n)
            .map(|i| {
                let a = points[i];
                let b = points[(i + 1) % n];
                a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64
            })
            .sum();
        twice as f64 / 2.0
    }

    #[test]
    fn test_rect_to_polygon_corners() {
        let poly = rect_to_polygon(10, 20, 30, 40).unwrap();
        assert_eq!(
            poly,
            vec![
                Point::new(10, 20),
                Point::new(40, 20),
                Point::new(40, 60),
                Point::new(10, 60)
            ]
        );
    }

    #[test]
    fn test_rect_polygon_is_clockwise_with_area() {
        for &(x, y, w, h) in &[(0, 0, 1, 1), (5, 7, 13, 2), (100, 3, 250, 40)] {
            let poly = rect_to_polygon(x, y, w, h).unwrap();
            assert_eq!(poly.len(), 4);
            assert_eq!(signed_area(&poly), (w * h) as f64);
        }
    }

    #[test]
    fn test_degenerate_rect_is_dropped() {
        assert!(rect_to_polygon(1, 1, 0, 5).is_none());
        assert!(rect_to_polygon(1, 1, 5, -1).is_none());
        assert!(Region::from_rect(1, 1, 0, 0, "x", None).is_none());
    }

    #[test]
    fn test_truncate_points_preserves_order_and_count() {
        let pts = [[1.9, 2.1], [10.5, 2.0], [10.99, 8.7], [0.2, 8.0], [-1.5, 3.3]];
        let out = truncate_points(&pts).unwrap();
        assert_eq!(out.len(), pts.len());
        assert_eq!(
            out,
            vec![
                Point::new(1, 2),
                Point::new(10, 2),
                Point::new(10, 8),
                Point::new(0, 8),
                Point::new(-1, 3)
            ]
        );
    }

    #[test]
    fn test_short_float_polygon_is_dropped() {
        assert!(truncate_points(&[]).is_none());
        assert!(truncate_points(&[[0.0, 0.0], [1.0, 1.0]]).is_none());
        assert!(Region::new(vec![Point::new(0, 0)], "a", None).is_none());
    }
}
