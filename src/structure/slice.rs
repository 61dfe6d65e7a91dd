use crate::math::{Point3, COINCIDENT_POINT_TOLERANCE};

/// A closed loop of contour points on one slice.
///
/// The loop closes from the last point back to the first; a repeated closing
/// point in the input is dropped on construction.
#[derive(Debug, Clone, PartialEq)]
pub struct PolygonSlice {
    points: Vec<Point3>,
}

impl PolygonSlice {
    /// Creates a slice from an ordered point loop.
    #[must_use]
    pub fn new(mut points: Vec<Point3>) -> Self {
        if points.len() > 1 {
            if let (Some(first), Some(last)) = (points.first(), points.last()) {
                if (first - last).norm() < COINCIDENT_POINT_TOLERANCE {
                    points.pop();
                }
            }
        }
        Self { points }
    }

    /// Returns the loop points (without a repeated closing point).
    #[must_use]
    pub fn points(&self) -> &[Point3] {
        &self.points
    }

    /// Number of distinct loop points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns `true` if the slice has no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Returns `true` if the slice is a single point.
    #[must_use]
    pub fn is_point(&self) -> bool {
        self.points.len() == 1
    }

    /// Returns `true` if the slice has enough points to span a plane.
    #[must_use]
    pub fn is_planar_candidate(&self) -> bool {
        self.points.len() >= 3
    }

    /// Iterates over the loop edges `(p[i], p[i+1])`, including the closing
    /// edge back to the first point.
    pub fn edges(&self) -> impl Iterator<Item = (&Point3, &Point3)> {
        let n = self.points.len();
        let count = if n > 1 { n } else { 0 };
        (0..count).map(move |i| (&self.points[i], &self.points[(i + 1) % n]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(x: f64, y: f64, z: f64) -> Point3 {
        Point3::new(x, y, z)
    }

    #[test]
    fn repeated_closing_point_is_dropped() {
        let slice = PolygonSlice::new(vec![
            p(0.0, 0.0, 0.0),
            p(1.0, 0.0, 0.0),
            p(1.0, 1.0, 0.0),
            p(0.0, 0.0, 0.0),
        ]);
        assert_eq!(slice.len(), 3);
        assert!(slice.is_planar_candidate());
        assert_eq!(slice.edges().count(), 3);
    }

    #[test]
    fn single_point_slice() {
        let slice = PolygonSlice::new(vec![p(4.0, 5.0, 6.0)]);
        assert!(slice.is_point());
        assert!(!slice.is_planar_candidate());
        assert_eq!(slice.edges().count(), 0);
    }
}
