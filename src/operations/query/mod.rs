mod mass_properties;
mod plane_geometry;

pub use mass_properties::{ComputeMassProperties, MassProperties, SPHERE_SHAPE_FACTOR};
pub use plane_geometry::{
    majority_spacing, EstimatePlaneGeometry, EstimationParams, GeometryWarning, PlaneGeometry,
};
