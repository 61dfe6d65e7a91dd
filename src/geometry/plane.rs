use crate::error::{GeometryError, Result};
use crate::math::{Point3, Vector3, TOLERANCE};

/// The plane a contour slice lies in: a point on the contour and a unit
/// normal.
#[derive(Debug, Clone, PartialEq)]
pub struct ContourPlane {
    origin: Point3,
    normal: Vector3,
}

impl ContourPlane {
    /// Creates a plane through `origin`, normalizing `normal`.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::ZeroVector`] for a zero-length normal.
    pub fn from_normal(origin: Point3, normal: Vector3) -> Result<Self> {
        let len = normal.norm();
        if len < TOLERANCE {
            return Err(GeometryError::ZeroVector.into());
        }
        Ok(Self {
            origin,
            normal: normal / len,
        })
    }

    #[must_use]
    pub fn origin(&self) -> &Point3 {
        &self.origin
    }

    #[must_use]
    pub fn normal(&self) -> &Vector3 {
        &self.normal
    }

    /// Signed distance of `point` along the normal.
    #[must_use]
    pub fn signed_distance(&self, point: &Point3) -> f64 {
        (point - self.origin).dot(&self.normal)
    }

    /// Foot of the perpendicular from `point` onto the plane.
    #[must_use]
    pub fn project(&self, point: &Point3) -> Point3 {
        point - self.normal * self.signed_distance(point)
    }

    /// Returns `true` if the normals agree up to sign:
    /// `| |n1 · n2| - 1 | < tolerance`.
    #[must_use]
    pub fn is_parallel_to(&self, other: &ContourPlane, tolerance: f64) -> bool {
        (self.normal.dot(&other.normal).abs() - 1.0).abs() < tolerance
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn p(x: f64, y: f64, z: f64) -> Point3 {
        Point3::new(x, y, z)
    }

    fn v(x: f64, y: f64, z: f64) -> Vector3 {
        Vector3::new(x, y, z)
    }

    #[test]
    fn normal_is_unit_length() {
        let plane = ContourPlane::from_normal(p(0.0, 0.0, 0.0), v(0.0, 0.0, 3.0)).unwrap();
        assert_relative_eq!(*plane.normal(), v(0.0, 0.0, 1.0));
    }

    #[test]
    fn signed_distance_along_normal() {
        let plane = ContourPlane::from_normal(p(0.0, 0.0, 1.0), v(0.0, 0.0, 1.0)).unwrap();
        assert_relative_eq!(plane.signed_distance(&p(5.0, 5.0, 3.5)), 2.5);
        assert_relative_eq!(plane.signed_distance(&p(0.0, 0.0, -1.0)), -2.0);
        assert_relative_eq!(plane.project(&p(5.0, 5.0, 3.5)), p(5.0, 5.0, 1.0));
    }

    #[test]
    fn anti_parallel_counts_as_parallel() {
        let a = ContourPlane::from_normal(p(0.0, 0.0, 0.0), v(0.0, 0.0, 1.0)).unwrap();
        let b = ContourPlane::from_normal(p(0.0, 0.0, 2.0), v(0.0, 0.0, -1.0)).unwrap();
        let c = ContourPlane::from_normal(p(0.0, 0.0, 2.0), v(0.0, 1.0, 1.0)).unwrap();
        assert!(a.is_parallel_to(&b, 1e-4));
        assert!(!a.is_parallel_to(&c, 1e-4));
    }

    #[test]
    fn zero_normal_is_rejected() {
        assert!(ContourPlane::from_normal(p(0.0, 0.0, 0.0), v(0.0, 0.0, 0.0)).is_err());
    }
}
