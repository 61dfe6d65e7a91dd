use tracing::debug;

use crate::error::{ConversionError, Result};
use crate::geometry::{LabelVolume, ReferenceGrid, TriangleMesh};
use crate::math::Point3;

/// Paints the voxels enclosed by a surface into a label volume.
///
/// The output grid is the reference grid oversampled by the configured
/// factor. Each voxel plane is intersected with the mesh and the resulting
/// cross-section is filled row by row with the even-odd rule, so nested
/// contours become holes. A voxel is inside when its centre is; crossings use
/// half-open intervals so that adjacent ribbons never paint the same plane
/// twice.
pub struct Rasterize<'a> {
    mesh: &'a TriangleMesh,
    grid: &'a ReferenceGrid,
    oversampling_factor: f64,
    label: u16,
}

impl<'a> Rasterize<'a> {
    /// Creates a new `Rasterize` operation painting label 1 at the grid's own
    /// resolution.
    #[must_use]
    pub fn new(mesh: &'a TriangleMesh, grid: &'a ReferenceGrid) -> Self {
        Self {
            mesh,
            grid,
            oversampling_factor: 1.0,
            label: 1,
        }
    }

    #[must_use]
    pub fn with_oversampling(mut self, factor: f64) -> Self {
        self.oversampling_factor = factor;
        self
    }

    #[must_use]
    pub fn with_label(mut self, label: u16) -> Self {
        self.label = label;
        self
    }

    /// Executes the rasterization.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::ParameterError::ParameterOutOfRange`] if the
    /// oversampling factor is outside `(0.01, 100]` and
    /// [`ConversionError::EmptyResult`] if the mesh has no triangles.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn execute(&self) -> Result<LabelVolume> {
        let grid = self.grid.oversampled(self.oversampling_factor)?;
        if self.mesh.is_empty() {
            return Err(ConversionError::EmptyResult("cannot rasterize an empty mesh".into()).into());
        }

        let [ni, nj, nk] = grid.dimensions();
        let local: Vec<Point3> = self
            .mesh
            .vertices
            .iter()
            .map(|p| grid.world_to_index(p))
            .collect();

        // Bucket triangles by the voxel planes they straddle.
        let mut by_plane: Vec<Vec<usize>> = vec![Vec::new(); nk];
        for (t, tri) in self.mesh.indices.iter().enumerate() {
            let zs = tri.map(|i| local[i as usize].z);
            let (lo, hi) = (zs[0].min(zs[1]).min(zs[2]), zs[0].max(zs[1]).max(zs[2]));
            let Some((first, last)) = half_open_span(lo, hi, nk) else {
                continue;
            };
            for bucket in &mut by_plane[first..=last] {
                bucket.push(t);
            }
        }

        let mut volume = LabelVolume::empty(grid);
        let mut painted = 0usize;
        for (k, triangles) in by_plane.iter().enumerate() {
            let z = k as f64;
            let segments: Vec<[(f64, f64); 2]> = triangles
                .iter()
                .filter_map(|&t| {
                    let tri = self.mesh.indices[t].map(|i| local[i as usize]);
                    slice_triangle(&tri, z)
                })
                .collect();
            if segments.is_empty() {
                continue;
            }

            let mut by_row: Vec<Vec<usize>> = vec![Vec::new(); nj];
            for (s, [a, b]) in segments.iter().enumerate() {
                if let Some((first, last)) = half_open_span(a.1.min(b.1), a.1.max(b.1), nj) {
                    for bucket in &mut by_row[first..=last] {
                        bucket.push(s);
                    }
                }
            }

            let voxels = volume.voxels_mut();
            for (j, row) in by_row.iter().enumerate() {
                let y = j as f64;
                let mut xs: Vec<f64> = row
                    .iter()
                    .filter_map(|&s| {
                        let [a, b] = segments[s];
                        ((a.1 > y) != (b.1 > y)).then(|| a.0 + (y - a.1) * (b.0 - a.0) / (b.1 - a.1))
                    })
                    .collect();
                xs.sort_by(f64::total_cmp);
                for pair in xs.chunks_exact(2) {
                    let start = pair[0].ceil().max(0.0) as usize;
                    let end = (pair[1].ceil().max(0.0) as usize).min(ni);
                    for i in start..end {
                        voxels[[k, j, i]] = self.label;
                        painted += 1;
                    }
                }
            }
        }

        debug!(
            voxels = painted,
            factor = self.oversampling_factor,
            label = self.label,
            "surface rasterized"
        );
        Ok(volume)
    }
}

/// Integer coordinates `c` in `0..n` with `lo <= c < hi`, as an inclusive
/// range.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn half_open_span(lo: f64, hi: f64, n: usize) -> Option<(usize, usize)> {
    let first = lo.ceil().max(0.0);
    let last = (hi.ceil() - 1.0).min(n as f64 - 1.0);
    (first <= last).then(|| (first as usize, last as usize))
}

/// Intersection of a triangle with the plane `z = level`, as a 2D segment.
///
/// A vertex lies above the plane when `z > level`; a triangle with every
/// vertex on one side yields nothing.
fn slice_triangle(tri: &[Point3; 3], level: f64) -> Option<[(f64, f64); 2]> {
    let above = tri.map(|p| p.z > level);
    let mut points = [(0.0, 0.0); 2];
    let mut found = 0;
    for e in 0..3 {
        let (a, b) = (tri[e], tri[(e + 1) % 3]);
        if above[e] != above[(e + 1) % 3] {
            let t = (level - a.z) / (b.z - a.z);
            points[found] = (a.x + t * (b.x - a.x), a.y + t * (b.y - a.y));
            found += 1;
        }
    }
    (found == 2).then_some(points)
}
