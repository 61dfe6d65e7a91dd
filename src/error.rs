use thiserror::Error;

use crate::representation::RepresentationKind;

/// Top-level error type for the contour pipeline.
#[derive(Debug, Error)]
pub enum ContourError {
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error(transparent)]
    Parameter(#[from] ParameterError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors related to geometric computations.
#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("degenerate geometry: {0}")]
    Degenerate(String),

    #[error("zero-length vector")]
    ZeroVector,

    #[error("malformed region record: {0}")]
    MalformedRegion(String),
}

/// Errors caused by invalid or missing conversion parameters.
#[derive(Debug, Error)]
pub enum ParameterError {
    #[error("parameter {parameter} = {value} is out of range [{min}, {max}]")]
    ParameterOutOfRange {
        parameter: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("no reference grid selected for structure '{0}'")]
    MissingReferenceGrid(String),

    #[error("reference grid '{0}' is not registered")]
    UnknownReferenceGrid(String),

    #[error("invalid reference grid: {0}")]
    InvalidGrid(String),
}

/// Errors raised by the representation state machine.
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("conversion from {from:?} to {to:?} is not implemented")]
    NotImplemented {
        from: RepresentationKind,
        to: RepresentationKind,
    },

    #[error("no source representation available to produce {0:?}")]
    MissingSource(RepresentationKind),

    #[error("cannot release the active representation {0:?}")]
    ReleaseActive(RepresentationKind),

    #[error("conversion produced no geometry: {0}")]
    EmptyResult(String),
}

/// Errors related to the structure store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("entity not found: {0}")]
    EntityNotFound(String),
}

/// Convenience type alias for results using [`ContourError`].
pub type Result<T> = std::result::Result<T, ContourError>;
