#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("Not enough bytes: got {actual}, need at least {minimum}")]
    NotEnoughData { actual: usize, minimum: usize },
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid ensemble header: {0}")]
    InvalidHeader(String),

    /// A section did not start with the ID required at its position.
    #[error("Expected data type id {expected:#06x}, got {actual:#06x}")]
    UnexpectedId { expected: u16, actual: u16 },

    #[error("{section} section too short: got {actual} bytes, need {minimum}")]
    TooShort {
        section: &'static str,
        actual: usize,
        minimum: usize,
    },

    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Sink error: {0}")]
    Sink(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("Acquisition worker failed: {0}")]
    Worker(String),

    #[error("Invalid config: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
