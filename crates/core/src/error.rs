use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CatalogError {
    #[error("unknown phase '{0}'")]
    UnknownPhase(String),
    #[error("phase identifier is empty")]
    EmptyPhase,
    #[error("invalid custom phase: {0}")]
    InvalidCustomPhase(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ScheduleError {
    /// The instant arithmetic left the representable date range.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}
