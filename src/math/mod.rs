pub mod fuzzy;
pub mod polygon_3d;

/// 3D point type.
pub type Point3 = nalgebra::Point3<f64>;

/// 3D vector type.
pub type Vector3 = nalgebra::Vector3<f64>;

/// 3x3 matrix, used for grid orientation.
pub type Matrix3 = nalgebra::Matrix3<f64>;

/// Global geometric tolerance for floating-point comparisons.
pub const TOLERANCE: f64 = 1e-10;

/// Tolerance for comparing plane spacings and normal alignment (mm / unitless).
pub const SPACING_TOLERANCE: f64 = 1e-4;

/// Distance below which consecutive contour points are considered coincident (mm).
pub const COINCIDENT_POINT_TOLERANCE: f64 = 1e-6;

/// Slice spacing used when it cannot be inferred from the contours (mm).
pub const DEFAULT_SLICE_SPACING: f64 = 1.0;

/// Normal used when no contour plane can be fitted.
#[must_use]
pub fn default_normal() -> Vector3 {
    Vector3::new(0.0, 0.0, 1.0)
}
