use thiserror::Error;

/// Error type for invalid operations.
#[derive(Error, Debug)]
pub enum RegridError {
    #[error("{0}")]
    Error(String),
    #[error("Required parameter '{name}' is missing")]
    MissingParameter { name: String },
    #[error("Parameter '{name}' is invalid: {reason}")]
    InvalidParameter { name: String, reason: String },
    #[error("'{what}' is not implemented. This combination is rejected instead of producing approximate output; use one of the supported variants or add an explicit implementation.")]
    NotImplemented { what: String },
    #[error("Cache entry '{key}' not found and regeneration is disabled")]
    CacheMiss { key: String },
    #[error("Cache entry '{path}' is malformed: {reason}")]
    CacheCorrupt { path: String, reason: String },
    #[error("Output point ({lat}, {lon}) could not be located in the input domain")]
    PointNotLocated { lat: f64, lon: f64 },
    #[error("No input points available to interpolate from for '{context}'")]
    EmptyNeighbourhood { context: String },
    #[error("Degenerate bounding box: north={north}, south={south}, west={west}, east={east}")]
    DegenerateBoundingBox {
        north: f64,
        south: f64,
        west: f64,
        east: f64,
    },
    #[error("Field has {actual} values but the representation '{representation}' has {expected} points")]
    FieldSizeMismatch {
        representation: String,
        expected: usize,
        actual: usize,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience type for `Result<T, RegridError>`.
pub type RegridResult<T> = Result<T, RegridError>;
