pub mod grid;
pub mod label_volume;
pub mod mesh;
pub mod plane;

pub use grid::{ReferenceGrid, ReferenceGridId, ReferenceGridRegistry};
pub use label_volume::LabelVolume;
pub use mesh::TriangleMesh;
pub use plane::ContourPlane;
