//! Contour geometry for radiotherapy structure sets, and conversion between
//! ribbon, label volume and closed surface representations.

pub mod error;
pub mod geometry;
pub mod math;
pub mod operations;
pub mod representation;
pub mod structure;

pub use error::{ContourError, Result};
