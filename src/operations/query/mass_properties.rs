use crate::error::{GeometryError, Result};
use crate::geometry::TriangleMesh;
use crate::math::TOLERANCE;

/// Surface-to-volume ratio of a sphere, `sqrt(4π) / cbrt(4π/3)`; dividing by
/// it makes the shape index of a sphere equal to 1.
pub const SPHERE_SHAPE_FACTOR: f64 = 2.199_085_233;

/// Volume, surface area and compactness of a closed mesh.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MassProperties {
    /// Enclosed volume (absolute value).
    pub volume: f64,
    /// Total surface area.
    pub surface_area: f64,
    /// `sqrt(area) / cbrt(volume)` normalized so a sphere scores 1. Grows
    /// with surface complexity.
    pub normalized_shape_index: f64,
}

/// Computes [`MassProperties`] of a closed triangle mesh.
///
/// The volume uses the signed tetrahedron method: for each triangle,
/// `(1/6) * v0 . (v1 x v2)` summed over all triangles.
pub struct ComputeMassProperties<'a> {
    mesh: &'a TriangleMesh,
}

impl<'a> ComputeMassProperties<'a> {
    /// Creates a new query over `mesh`.
    #[must_use]
    pub fn new(mesh: &'a TriangleMesh) -> Self {
        Self { mesh }
    }

    /// Executes the query.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::Degenerate`] if the mesh encloses no volume.
    pub fn execute(&self) -> Result<MassProperties> {
        let volume = self.mesh.signed_volume().abs();
        if volume < TOLERANCE {
            return Err(GeometryError::Degenerate("mesh encloses no volume".into()).into());
        }
        let surface_area = self.mesh.area();
        let normalized_shape_index = surface_area.sqrt() / volume.cbrt() / SPHERE_SHAPE_FACTOR;
        Ok(MassProperties {
            volume,
            surface_area,
            normalized_shape_index,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::math::Point3;
    use approx::assert_relative_eq;

    fn p(x: f64, y: f64, z: f64) -> Point3 {
        Point3::new(x, y, z)
    }

    fn cube(size: f64) -> TriangleMesh {
        let s = size;
        TriangleMesh::from_parts(
            vec![
                p(0.0, 0.0, 0.0),
                p(s, 0.0, 0.0),
                p(s, s, 0.0),
                p(0.0, s, 0.0),
                p(0.0, 0.0, s),
                p(s, 0.0, s),
                p(s, s, s),
                p(0.0, s, s),
            ],
            vec![
                [0, 2, 1],
                [0, 3, 2],
                [4, 5, 6],
                [4, 6, 7],
                [0, 1, 5],
                [0, 5, 4],
                [1, 2, 6],
                [1, 6, 5],
                [2, 3, 7],
                [2, 7, 6],
                [3, 0, 4],
                [3, 4, 7],
            ],
        )
    }

    #[test]
    fn cube_properties() {
        let mesh = cube(2.0);
        assert!(mesh.is_closed());
        let props = ComputeMassProperties::new(&mesh).execute().unwrap();
        assert_relative_eq!(props.volume, 8.0, epsilon = 1e-12);
        assert_relative_eq!(props.surface_area, 24.0, epsilon = 1e-12);
        // sqrt(6) / 2.199 for any cube
        assert_relative_eq!(
            props.normalized_shape_index,
            6.0_f64.sqrt() / SPHERE_SHAPE_FACTOR,
            epsilon = 1e-9
        );
    }

    #[test]
    fn shape_index_is_scale_invariant() {
        let small = ComputeMassProperties::new(&cube(1.0)).execute().unwrap();
        let large = ComputeMassProperties::new(&cube(7.5)).execute().unwrap();
        assert_relative_eq!(
            small.normalized_shape_index,
            large.normalized_shape_index,
            epsilon = 1e-9
        );
    }

    #[test]
    fn flat_mesh_is_rejected() {
        let mesh = TriangleMesh::from_parts(
            vec![p(0.0, 0.0, 0.0), p(1.0, 0.0, 0.0), p(0.0, 1.0, 0.0)],
            vec![[0, 1, 2], [0, 2, 1]],
        );
        assert!(ComputeMassProperties::new(&mesh).execute().is_err());
    }
}
