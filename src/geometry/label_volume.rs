use ndarray::Array3;

use super::grid::ReferenceGrid;
use crate::math::Point3;

/// Background value of a label volume.
pub const BACKGROUND: u16 = 0;

/// A voxel volume of integer labels on a [`ReferenceGrid`].
///
/// Voxels are stored `[k, j, i]` (slice, row, column), so the array shape is
/// `(nk, nj, ni)` for grid dimensions `[ni, nj, nk]`.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelVolume {
    grid: ReferenceGrid,
    voxels: Array3<u16>,
}

impl LabelVolume {
    /// Creates a volume filled with [`BACKGROUND`].
    #[must_use]
    pub fn empty(grid: ReferenceGrid) -> Self {
        let [ni, nj, nk] = grid.dimensions();
        Self {
            grid,
            voxels: Array3::from_elem((nk, nj, ni), BACKGROUND),
        }
    }

    /// Returns the grid the voxels live on.
    #[must_use]
    pub fn grid(&self) -> &ReferenceGrid {
        &self.grid
    }

    /// Returns the voxel array, indexed `[k, j, i]`.
    #[must_use]
    pub fn voxels(&self) -> &Array3<u16> {
        &self.voxels
    }

    /// Returns the voxel array mutably.
    pub fn voxels_mut(&mut self) -> &mut Array3<u16> {
        &mut self.voxels
    }

    /// Label at `(i, j, k)`, or `None` outside the grid.
    #[must_use]
    pub fn get(&self, i: usize, j: usize, k: usize) -> Option<u16> {
        self.voxels.get([k, j, i]).copied()
    }

    /// Number of voxels carrying `label`.
    #[must_use]
    pub fn count(&self, label: u16) -> usize {
        self.voxels.iter().filter(|&&v| v == label).count()
    }

    /// Number of non-background voxels.
    #[must_use]
    pub fn foreground_count(&self) -> usize {
        self.voxels.iter().filter(|&&v| v != BACKGROUND).count()
    }

    /// Physical volume of the voxels carrying `label`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn labeled_volume(&self, label: u16) -> f64 {
        let s = self.grid.spacing();
        self.count(label) as f64 * s.x * s.y * s.z
    }

    /// World-space centre of voxel `(i, j, k)`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn voxel_center(&self, i: usize, j: usize, k: usize) -> Point3 {
        self.grid
            .index_to_world(&Point3::new(i as f64, j as f64, k as f64))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::math::Vector3;
    use approx::assert_relative_eq;

    fn grid() -> ReferenceGrid {
        ReferenceGrid::new(
            Point3::new(0.0, 0.0, 0.0),
            Vector3::new(0.5, 0.5, 2.0),
            [4, 3, 2],
        )
        .unwrap()
    }

    #[test]
    fn shape_is_slice_row_column() {
        let vol = LabelVolume::empty(grid());
        assert_eq!(vol.voxels().shape(), &[2, 3, 4]);
        assert_eq!(vol.foreground_count(), 0);
        assert_eq!(vol.get(3, 2, 1), Some(BACKGROUND));
        assert_eq!(vol.get(4, 0, 0), None);
    }

    #[test]
    fn labeled_volume_uses_spacing() {
        let mut vol = LabelVolume::empty(grid());
        vol.voxels_mut()[[1, 2, 3]] = 7;
        vol.voxels_mut()[[0, 0, 0]] = 7;
        assert_eq!(vol.count(7), 2);
        assert_relative_eq!(vol.labeled_volume(7), 1.0);
        assert_relative_eq!(vol.voxel_center(3, 2, 1), Point3::new(1.5, 1.0, 2.0));
    }
}
