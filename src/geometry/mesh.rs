use std::collections::HashMap;

use crate::math::{Point3, Vector3, TOLERANCE};

/// A triangle mesh with per-vertex normals.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriangleMesh {
    /// Vertex positions.
    pub vertices: Vec<Point3>,
    /// Vertex normals. Either empty or the same length as `vertices`.
    pub normals: Vec<Vector3>,
    /// Triangle indices (each triple defines a triangle, counter-clockwise
    /// when seen from the side the surface faces).
    pub indices: Vec<[u32; 3]>,
}

impl TriangleMesh {
    /// Creates a mesh from vertices and triangles, leaving normals empty.
    #[must_use]
    pub fn from_parts(vertices: Vec<Point3>, indices: Vec<[u32; 3]>) -> Self {
        Self {
            vertices,
            normals: Vec::new(),
            indices,
        }
    }

    /// Number of triangles.
    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.indices.len()
    }

    /// Returns `true` if the mesh has no triangles.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// The three corner positions of triangle `t`.
    #[must_use]
    pub fn triangle(&self, t: usize) -> [Point3; 3] {
        let [a, b, c] = self.indices[t];
        [
            self.vertices[a as usize],
            self.vertices[b as usize],
            self.vertices[c as usize],
        ]
    }

    /// Appends `other` to this mesh, offsetting its indices.
    #[allow(clippy::cast_possible_truncation)]
    pub fn merge(&mut self, other: &TriangleMesh) {
        let offset = self.vertices.len() as u32;
        let keep_normals = self.normals.len() == self.vertices.len()
            && other.normals.len() == other.vertices.len();
        self.vertices.extend_from_slice(&other.vertices);
        if keep_normals {
            self.normals.extend_from_slice(&other.normals);
        } else {
            self.normals.clear();
        }
        self.indices.extend(
            other
                .indices
                .iter()
                .map(|[a, b, c]| [a + offset, b + offset, c + offset]),
        );
    }

    /// Recomputes vertex normals as the area-weighted average of the
    /// adjacent triangle normals.
    pub fn compute_normals(&mut self) {
        let mut normals = vec![Vector3::zeros(); self.vertices.len()];
        for tri in &self.indices {
            let [p0, p1, p2] = tri.map(|i| self.vertices[i as usize]);
            // Unnormalized cross product weights by twice the area.
            let n = (p1 - p0).cross(&(p2 - p0));
            for &i in tri {
                normals[i as usize] += n;
            }
        }
        for n in &mut normals {
            let len = n.norm();
            if len > TOLERANCE {
                *n /= len;
            }
        }
        self.normals = normals;
    }

    /// Reverses the winding of every triangle and negates the normals.
    pub fn flip_orientation(&mut self) {
        for tri in &mut self.indices {
            tri.swap(1, 2);
        }
        for n in &mut self.normals {
            *n = -*n;
        }
    }

    /// Total surface area.
    #[must_use]
    pub fn area(&self) -> f64 {
        (0..self.indices.len())
            .map(|t| {
                let [p0, p1, p2] = self.triangle(t);
                0.5 * (p1 - p0).cross(&(p2 - p0)).norm()
            })
            .sum()
    }

    /// Signed enclosed volume (divergence theorem, sum of origin tetrahedra).
    ///
    /// Positive for a closed mesh whose triangles face outward.
    #[must_use]
    pub fn signed_volume(&self) -> f64 {
        let sum: f64 = (0..self.indices.len())
            .map(|t| {
                let [p0, p1, p2] = self.triangle(t);
                p0.coords.dot(&p1.coords.cross(&p2.coords))
            })
            .sum();
        sum / 6.0
    }

    /// Axis-aligned bounds `(min, max)`, or `None` for a mesh without vertices.
    #[must_use]
    pub fn bounds(&self) -> Option<(Point3, Point3)> {
        let first = *self.vertices.first()?;
        Some(self.vertices.iter().fold((first, first), |(lo, hi), p| {
            (
                Point3::new(lo.x.min(p.x), lo.y.min(p.y), lo.z.min(p.z)),
                Point3::new(hi.x.max(p.x), hi.y.max(p.y), hi.z.max(p.z)),
            )
        }))
    }

    /// Returns `true` if every edge is shared by exactly two triangles that
    /// traverse it in opposite directions (closed and consistently oriented).
    #[must_use]
    pub fn is_closed(&self) -> bool {
        let mut directed: HashMap<(u32, u32), usize> = HashMap::new();
        for &[a, b, c] in &self.indices {
            for e in [(a, b), (b, c), (c, a)] {
                *directed.entry(e).or_insert(0) += 1;
            }
        }
        directed
            .iter()
            .all(|(&(a, b), &count)| count == 1 && directed.get(&(b, a)) == Some(&1))
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

    /// Outward-facing tetrahedron with a right-angle corner at the origin.
    fn tetrahedron() -> TriangleMesh {
        TriangleMesh::from_parts(
            vec![
                p(0.0, 0.0, 0.0),
                p(1.0, 0.0, 0.0),
                p(0.0, 1.0, 0.0),
                p(0.0, 0.0, 1.0),
            ],
            vec![[0, 2, 1], [0, 1, 3], [0, 3, 2], [1, 2, 3]],
        )
    }

    #[test]
    fn tetrahedron_volume_and_area() {
        let mesh = tetrahedron();
        assert_relative_eq!(mesh.signed_volume(), 1.0 / 6.0, epsilon = 1e-12);
        let expected_area = 1.5 + 3.0_f64.sqrt() / 2.0;
        assert_relative_eq!(mesh.area(), expected_area, epsilon = 1e-12);
        assert!(mesh.is_closed());
    }

    #[test]
    fn flipping_negates_volume() {
        let mut mesh = tetrahedron();
        mesh.flip_orientation();
        assert_relative_eq!(mesh.signed_volume(), -1.0 / 6.0, epsilon = 1e-12);
        assert!(mesh.is_closed());
    }

    #[test]
    fn open_mesh_is_not_closed() {
        let mut mesh = tetrahedron();
        mesh.indices.pop();
        assert!(!mesh.is_closed());
    }

    #[test]
    fn merge_offsets_indices() {
        let mut a = tetrahedron();
        let b = tetrahedron();
        a.merge(&b);
        assert_eq!(a.vertices.len(), 8);
        assert_eq!(a.indices[4], [4, 6, 5]);
        assert_relative_eq!(a.signed_volume(), 2.0 / 6.0, epsilon = 1e-12);
    }

    #[test]
    fn normals_point_away_from_corner() {
        let mut mesh = tetrahedron();
        mesh.compute_normals();
        assert_eq!(mesh.normals.len(), 4);
        // Vertex 1 touches faces with normals -z, -y and the slanted face.
        assert!(mesh.normals[1].x > 0.0);
        assert_relative_eq!(mesh.normals[0].norm(), 1.0, epsilon = 1e-12);
        assert!(mesh.normals[0].x < 0.0 && mesh.normals[0].y < 0.0 && mesh.normals[0].z < 0.0);
    }

    #[test]
    fn bounds_of_tetrahedron() {
        let (lo, hi) = tetrahedron().bounds().unwrap();
        assert_eq!(lo, p(0.0, 0.0, 0.0));
        assert_eq!(hi, p(1.0, 1.0, 1.0));
        assert!(TriangleMesh::default().bounds().is_none());
    }
}
