use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("failed to open serial port {port}: {reason}")]
    SerialOpen { port: String, reason: String },

    #[error("trace file not found: {0}")]
    TraceNotFound(String),

    #[error("trace file contains no valid samples: {0}")]
    EmptyTrace(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SourceError>;
