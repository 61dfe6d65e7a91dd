use tracing::debug;

use super::decimate::{validate_reduction, Decimate};
use crate::error::{ConversionError, Result};
use crate::geometry::{LabelVolume, TriangleMesh};
use crate::math::{Point3, Vector3};

/// Corner pairs of the 12 cell edges. Corner `c` sits at offset
/// `(c & 1, (c >> 1) & 1, (c >> 2) & 1)`.
const CELL_EDGES: [(usize, usize); 12] = [
    (0, 1),
    (2, 3),
    (4, 5),
    (6, 7),
    (0, 2),
    (1, 3),
    (4, 6),
    (5, 7),
    (0, 4),
    (1, 5),
    (2, 6),
    (3, 7),
];

const NO_VERTEX: u32 = u32::MAX;

/// Extracts a closed surface around the labeled voxels of a volume.
///
/// Uses naive surface nets on the binary mask: every cell (the cube between
/// eight voxel centres) whose corners disagree gets one vertex at the mean
/// of its crossing-edge midpoints, and every voxel pair that disagrees emits
/// a quad joining the four cells around it. Voxels outside the volume count
/// as background, so the surface is always closed. Quads are wound so their
/// normals point from labeled to background voxels. Vertices are mapped back
/// through the exact inverse of the volume's world-to-index transform.
pub struct ExtractSurface<'a> {
    volume: &'a LabelVolume,
    label: Option<u16>,
    target_reduction: f64,
}

impl<'a> ExtractSurface<'a> {
    /// Creates a new `ExtractSurface` operation over all non-background
    /// voxels, without decimation.
    #[must_use]
    pub fn new(volume: &'a LabelVolume) -> Self {
        Self {
            volume,
            label: None,
            target_reduction: 0.0,
        }
    }

    /// Restricts extraction to voxels carrying `label`.
    #[must_use]
    pub fn with_label(mut self, label: u16) -> Self {
        self.label = Some(label);
        self
    }

    /// Sets the fraction of triangles to remove afterwards (`0.0..=1.0`).
    #[must_use]
    pub fn with_decimation(mut self, target_reduction: f64) -> Self {
        self.target_reduction = target_reduction;
        self
    }

    /// Executes the extraction.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::ParameterError::ParameterOutOfRange`] for a
    /// reduction outside `[0, 1]` and [`ConversionError::EmptyResult`] if no
    /// voxel matches.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_possible_wrap,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn execute(&self) -> Result<TriangleMesh> {
        validate_reduction(self.target_reduction)?;
        let voxels = self.volume.voxels();
        let matches = |v: u16| match self.label {
            Some(label) => v == label,
            None => v != 0,
        };

        // Bounding box of matching voxels as (lo, hi) per axis i, j, k.
        let mut bounds: Option<([isize; 3], [isize; 3])> = None;
        for ((k, j, i), &v) in voxels.indexed_iter() {
            if !matches(v) {
                continue;
            }
            let at = [i as isize, j as isize, k as isize];
            bounds = Some(match bounds {
                None => (at, at),
                Some((lo, hi)) => (
                    [0, 1, 2].map(|a| lo[a].min(at[a])),
                    [0, 1, 2].map(|a| hi[a].max(at[a])),
                ),
            });
        }
        let Some((lo, hi)) = bounds else {
            return Err(ConversionError::EmptyResult("no labeled voxels to extract".into()).into());
        };

        let inside = |at: [isize; 3]| -> bool {
            (0..3).all(|a| at[a] >= lo[a] && at[a] <= hi[a])
                && matches(voxels[[at[2] as usize, at[1] as usize, at[0] as usize]])
        };

        // Cells run from lo - 1 to hi on each axis.
        let origin = [lo[0] - 1, lo[1] - 1, lo[2] - 1];
        let extent = [0, 1, 2].map(|a| (hi[a] - lo[a] + 2) as usize);
        let slot = |c: [isize; 3]| -> usize {
            let r = [0, 1, 2].map(|a| (c[a] - origin[a]) as usize);
            (r[2] * extent[1] + r[1]) * extent[0] + r[0]
        };

        let mut cell_vertex = vec![NO_VERTEX; extent[0] * extent[1] * extent[2]];
        let mut positions: Vec<Point3> = Vec::new();
        for ck in origin[2]..=hi[2] {
            for cj in origin[1]..=hi[1] {
                for ci in origin[0]..=hi[0] {
                    let corners: [bool; 8] = std::array::from_fn(|c| {
                        inside([
                            ci + (c & 1) as isize,
                            cj + ((c >> 1) & 1) as isize,
                            ck + ((c >> 2) & 1) as isize,
                        ])
                    });
                    if corners.iter().all(|&c| c) || corners.iter().all(|&c| !c) {
                        continue;
                    }
                    let mut sum = Vector3::zeros();
                    let mut crossings = 0.0;
                    for &(a, b) in &CELL_EDGES {
                        if corners[a] != corners[b] {
                            sum += (corner_offset(a) + corner_offset(b)) / 2.0;
                            crossings += 1.0;
                        }
                    }
                    let local = Point3::new(ci as f64, cj as f64, ck as f64) + sum / crossings;
                    cell_vertex[slot([ci, cj, ck])] = positions.len() as u32;
                    positions.push(self.volume.grid().index_to_world(&local));
                }
            }
        }

        let mut indices: Vec<[u32; 3]> = Vec::new();
        for axis in 0..3 {
            let (b, c) = ((axis + 1) % 3, (axis + 2) % 3);
            let mut step = [0isize; 3];
            step[axis] = 1;
            let mut from = lo;
            from[axis] -= 1;
            for vk in from[2]..=hi[2] {
                for vj in from[1]..=hi[1] {
                    for vi in from[0]..=hi[0] {
                        let v = [vi, vj, vk];
                        let lower = inside(v);
                        let upper = inside([vi + step[0], vj + step[1], vk + step[2]]);
                        if lower == upper {
                            continue;
                        }
                        // Counter-clockwise in the (b, c) plane, facing +axis.
                        let quad = [(-1, -1), (0, -1), (0, 0), (-1, 0)].map(|(db, dc)| {
                            let mut cell = v;
                            cell[b] += db;
                            cell[c] += dc;
                            cell_vertex[slot(cell)]
                        });
                        let [q0, q1, q2, q3] = quad;
                        if lower {
                            indices.push([q0, q1, q2]);
                            indices.push([q0, q2, q3]);
                        } else {
                            indices.push([q0, q2, q1]);
                            indices.push([q0, q3, q2]);
                        }
                    }
                }
            }
        }

        let mut mesh = TriangleMesh::from_parts(positions, indices);
        debug!(
            vertices = mesh.vertices.len(),
            triangles = mesh.triangle_count(),
            "surface extracted"
        );
        if self.target_reduction > 0.0 {
            mesh = Decimate::new(&mesh)
                .with_target_reduction(self.target_reduction)
                .execute()?;
        }
        mesh.compute_normals();
        Ok(mesh)
    }
}

#[allow(clippy::cast_precision_loss)]
fn corner_offset(corner: usize) -> Vector3 {
    Vector3::new(
        (corner & 1) as f64,
        ((corner >> 1) & 1) as f64,
        ((corner >> 2) & 1) as f64,
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::geometry::ReferenceGrid;
    use crate::operations::conversion::Rasterize;
    use approx::assert_relative_eq;

    fn block(origin: Point3, spacing: f64, n: usize, lo: usize, hi: usize) -> LabelVolume {
        let grid = ReferenceGrid::new(origin, Vector3::new(spacing, spacing, spacing), [n, n, n]).unwrap();
        let mut vol = LabelVolume::empty(grid);
        for k in lo..hi {
            for j in lo..hi {
                for i in lo..hi {
                    vol.voxels_mut()[[k, j, i]] = 3;
                }
            }
        }
        vol
    }

    #[test]
    fn single_voxel_gives_closed_outward_surface() {
        let vol = block(Point3::origin(), 1.0, 3, 1, 2);
        let mesh = ExtractSurface::new(&vol).execute().unwrap();
        assert_eq!(mesh.vertices.len(), 8);
        assert_eq!(mesh.triangle_count(), 12);
        assert!(mesh.is_closed());
        assert!(mesh.signed_volume() > 0.0);
        assert_eq!(mesh.normals.len(), mesh.vertices.len());
    }

    #[test]
    fn block_surface_is_closed_and_oriented() {
        let vol = block(Point3::origin(), 1.0, 8, 2, 6);
        let mesh = ExtractSurface::new(&vol).execute().unwrap();
        assert!(mesh.is_closed());
        let volume = mesh.signed_volume();
        assert!(volume > 40.0 && volume < 64.0, "volume {volume}");
    }

    #[test]
    fn surface_lands_on_voxel_faces_in_world_space() {
        let origin = Point3::new(10.0, -5.0, 3.0);
        let vol = block(origin, 0.5, 10, 3, 7);
        let mesh = ExtractSurface::new(&vol).execute().unwrap();
        let (min, max) = mesh.bounds().unwrap();
        assert_relative_eq!(min, origin + Vector3::repeat(2.5 * 0.5), epsilon = 1e-12);
        assert_relative_eq!(max, origin + Vector3::repeat(6.5 * 0.5), epsilon = 1e-12);
    }

    #[test]
    fn block_survives_surface_round_trip() {
        let vol = block(Point3::origin(), 1.0, 8, 2, 6);
        let mesh = ExtractSurface::new(&vol).with_label(3).execute().unwrap();
        let again = Rasterize::new(&mesh, vol.grid())
            .with_label(3)
            .execute()
            .unwrap();
        assert_eq!(again.voxels(), vol.voxels());
    }

    #[test]
    fn label_filter_isolates_structure() {
        let mut vol = block(Point3::origin(), 1.0, 8, 2, 4);
        vol.voxels_mut()[[6, 6, 6]] = 9;
        let only_nine = ExtractSurface::new(&vol).with_label(9).execute().unwrap();
        let (min, max) = only_nine.bounds().unwrap();
        // A lone voxel's cell vertices average three edge midpoints.
        assert_relative_eq!(min, Point3::new(5.0, 5.0, 5.0) + Vector3::repeat(2.5 / 3.0), epsilon = 1e-9);
        assert_relative_eq!(max, Point3::new(6.0, 6.0, 6.0) + Vector3::repeat(0.5 / 3.0), epsilon = 1e-9);
        assert!(ExtractSurface::new(&vol).with_label(4).execute().is_err());
    }

    #[test]
    fn decimation_reduces_triangles() {
        let vol = block(Point3::origin(), 1.0, 10, 2, 8);
        let full = ExtractSurface::new(&vol).execute().unwrap();
        let reduced = ExtractSurface::new(&vol).with_decimation(0.5).execute().unwrap();
        assert!(reduced.triangle_count() < full.triangle_count());
        assert!(reduced.is_closed());
        assert!(ExtractSurface::new(&vol).with_decimation(1.5).execute().is_err());
    }
}
