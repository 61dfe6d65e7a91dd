use std::fmt;

use crate::error::{ParameterError, Result};
use crate::math::{Matrix3, Point3, Vector3, TOLERANCE};

/// Smallest oversampling factor accepted (exclusive).
pub const MIN_OVERSAMPLING_FACTOR: f64 = 0.01;

/// Largest oversampling factor accepted (inclusive).
pub const MAX_OVERSAMPLING_FACTOR: f64 = 100.0;

/// Identifier of a reference grid (usually the series instance UID of the
/// anatomical volume it was taken from).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReferenceGridId(String);

impl ReferenceGridId {
    /// Creates a new identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ReferenceGridId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl fmt::Display for ReferenceGridId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Geometry of a voxel grid: origin, spacing, dimensions and orientation.
///
/// Voxel `(i, j, k)` is centred at `origin + direction * (i*sx, j*sy, k*sz)`.
/// The columns of `direction` are the world directions of the I, J and K
/// axes.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceGrid {
    origin: Point3,
    spacing: Vector3,
    dimensions: [usize; 3],
    direction: Matrix3,
    inverse_direction: Matrix3,
}

impl ReferenceGrid {
    /// Creates an axis-aligned grid.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::InvalidGrid`] if any spacing is not positive
    /// or any dimension is zero.
    pub fn new(origin: Point3, spacing: Vector3, dimensions: [usize; 3]) -> Result<Self> {
        Self::with_direction(origin, spacing, dimensions, Matrix3::identity())
    }

    /// Creates a grid with an explicit orientation matrix.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::InvalidGrid`] if any spacing is not positive,
    /// any dimension is zero, or the direction matrix is singular.
    pub fn with_direction(
        origin: Point3,
        spacing: Vector3,
        dimensions: [usize; 3],
        direction: Matrix3,
    ) -> Result<Self> {
        if spacing.iter().any(|s| !s.is_finite() || *s <= TOLERANCE) {
            return Err(ParameterError::InvalidGrid(format!(
                "spacing must be positive, got {spacing:?}"
            ))
            .into());
        }
        if dimensions.contains(&0) {
            return Err(ParameterError::InvalidGrid(format!(
                "dimensions must be non-zero, got {dimensions:?}"
            ))
            .into());
        }
        let inverse_direction = direction.try_inverse().ok_or_else(|| {
            ParameterError::InvalidGrid("direction matrix is singular".into())
        })?;
        Ok(Self {
            origin,
            spacing,
            dimensions,
            direction,
            inverse_direction,
        })
    }

    /// Returns the world position of voxel `(0, 0, 0)`.
    #[must_use]
    pub fn origin(&self) -> &Point3 {
        &self.origin
    }

    /// Returns the voxel spacing along I, J and K.
    #[must_use]
    pub fn spacing(&self) -> &Vector3 {
        &self.spacing
    }

    /// Returns the number of voxels along I, J and K.
    #[must_use]
    pub fn dimensions(&self) -> [usize; 3] {
        self.dimensions
    }

    /// Returns the orientation matrix.
    #[must_use]
    pub fn direction(&self) -> &Matrix3 {
        &self.direction
    }

    /// Total number of voxels.
    #[must_use]
    pub fn voxel_count(&self) -> usize {
        self.dimensions.iter().product()
    }

    /// Physical volume covered by the grid (voxel count times voxel volume).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn physical_volume(&self) -> f64 {
        self.voxel_count() as f64 * self.spacing.x * self.spacing.y * self.spacing.z
    }

    /// Maps a world point to continuous voxel coordinates.
    #[must_use]
    pub fn world_to_index(&self, point: &Point3) -> Point3 {
        let local = self.inverse_direction * (point - self.origin);
        Point3::new(
            local.x / self.spacing.x,
            local.y / self.spacing.y,
            local.z / self.spacing.z,
        )
    }

    /// Maps continuous voxel coordinates to a world point.
    ///
    /// This is the exact inverse of [`ReferenceGrid::world_to_index`].
    #[must_use]
    pub fn index_to_world(&self, index: &Point3) -> Point3 {
        let scaled = Vector3::new(
            index.x * self.spacing.x,
            index.y * self.spacing.y,
            index.z * self.spacing.z,
        );
        self.origin + self.direction * scaled
    }

    /// Returns the grid resampled by `factor`: spacing divided by the factor,
    /// dimensions multiplied by it, origin and orientation unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::ParameterOutOfRange`] if the factor is not in
    /// `(0.01, 100]`.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn oversampled(&self, factor: f64) -> Result<Self> {
        validate_oversampling_factor(factor)?;
        let dimensions = self
            .dimensions
            .map(|n| ((n as f64 * factor + TOLERANCE).floor() as usize).max(1));
        Self::with_direction(
            self.origin,
            self.spacing / factor,
            dimensions,
            self.direction,
        )
    }
}

/// Lookup of reference grids by identifier.
///
/// Structures refer to their grid by [`ReferenceGridId`] only; the embedding
/// application owns the grids and supplies them through this trait.
pub trait ReferenceGridRegistry {
    /// Returns the grid registered under `id`, if any.
    fn grid(&self, id: &ReferenceGridId) -> Option<&ReferenceGrid>;

    /// Returns `true` if a grid is registered under `id`.
    fn contains(&self, id: &ReferenceGridId) -> bool {
        self.grid(id).is_some()
    }
}

impl<S: std::hash::BuildHasher> ReferenceGridRegistry
    for std::collections::HashMap<ReferenceGridId, ReferenceGrid, S>
{
    fn grid(&self, id: &ReferenceGridId) -> Option<&ReferenceGrid> {
        self.get(id)
    }
}

impl ReferenceGridRegistry for std::collections::BTreeMap<ReferenceGridId, ReferenceGrid> {
    fn grid(&self, id: &ReferenceGridId) -> Option<&ReferenceGrid> {
        self.get(id)
    }
}

/// Validates an oversampling factor against `(0.01, 100]`.
///
/// # Errors
///
/// Returns [`ParameterError::ParameterOutOfRange`] for factors outside the
/// range, including NaN.
pub fn validate_oversampling_factor(factor: f64) -> Result<()> {
    if factor > MIN_OVERSAMPLING_FACTOR && factor <= MAX_OVERSAMPLING_FACTOR {
        Ok(())
    } else {
        Err(ParameterError::ParameterOutOfRange {
            parameter: "oversampling_factor",
            value: factor,
            min: MIN_OVERSAMPLING_FACTOR,
            max: MAX_OVERSAMPLING_FACTOR,
        }
        .into())
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
    fn oversampling_halves_spacing_and_doubles_extent() {
        let grid = ReferenceGrid::new(p(0.0, 0.0, 0.0), v(1.0, 1.0, 2.0), [10, 20, 5]).unwrap();
        let fine = grid.oversampled(2.0).unwrap();
        assert_relative_eq!(*fine.spacing(), v(0.5, 0.5, 1.0));
        assert_eq!(fine.dimensions(), [20, 40, 10]);
        assert_eq!(fine.origin(), grid.origin());
    }

    #[test]
    fn undersampling_keeps_at_least_one_voxel() {
        let grid = ReferenceGrid::new(p(0.0, 0.0, 0.0), v(1.0, 1.0, 1.0), [3, 3, 1]).unwrap();
        let coarse = grid.oversampled(0.5).unwrap();
        assert_eq!(coarse.dimensions(), [1, 1, 1]);
        assert_relative_eq!(*coarse.spacing(), v(2.0, 2.0, 2.0));
    }

    #[test]
    fn oversampling_range_is_enforced() {
        let grid = ReferenceGrid::new(p(0.0, 0.0, 0.0), v(1.0, 1.0, 1.0), [4, 4, 4]).unwrap();
        assert!(grid.oversampled(0.01).is_err());
        assert!(grid.oversampled(100.5).is_err());
        assert!(grid.oversampled(f64::NAN).is_err());
        assert!(grid.oversampled(100.0).is_ok());
    }

    #[test]
    fn index_world_round_trip_with_rotation() {
        // 90° rotation about Z
        let dir = Matrix3::new(0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0);
        let grid =
            ReferenceGrid::with_direction(p(10.0, -4.0, 2.0), v(0.7, 1.3, 2.5), [8, 8, 8], dir)
                .unwrap();
        let world = p(3.25, 1.5, -7.0);
        let back = grid.index_to_world(&grid.world_to_index(&world));
        assert_relative_eq!(back, world, epsilon = 1e-12);

        let first_axis = grid.index_to_world(&p(1.0, 0.0, 0.0)) - grid.origin();
        assert_relative_eq!(first_axis, v(0.0, 0.7, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn invalid_grids_are_rejected() {
        assert!(ReferenceGrid::new(p(0.0, 0.0, 0.0), v(0.0, 1.0, 1.0), [1, 1, 1]).is_err());
        assert!(ReferenceGrid::new(p(0.0, 0.0, 0.0), v(1.0, 1.0, 1.0), [0, 1, 1]).is_err());
        assert!(ReferenceGrid::with_direction(
            p(0.0, 0.0, 0.0),
            v(1.0, 1.0, 1.0),
            [1, 1, 1],
            Matrix3::zeros()
        )
        .is_err());
    }
}
