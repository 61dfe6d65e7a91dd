//! Conversions between surface meshes and label volumes.

mod decimate;
mod extract_surface;
mod oversampling;
mod rasterize;

pub use decimate::Decimate;
pub use extract_surface::ExtractSurface;
pub use oversampling::{determine_oversampling_factor, CalculateOversamplingFactor, OversamplingSource};
pub use rasterize::Rasterize;
