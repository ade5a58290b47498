use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CleanRuvError {
    /// Connect, bind or search failed. Nothing useful can be done without the server.
    #[error("it wasn't possible to contact the directory server: {0}")]
    DirectoryUnavailable(String),
    /// The cleanup task was rejected, or the connection dropped while submitting it.
    #[error("the directory server refused the cleanup task: {0}")]
    DirectoryModifyFailed(String),
    #[error("invalid input: {0}")]
    InvalidOperatorInput(String),
    /// The replica id could not be read from the record header.
    #[error("unable to parse ruv record: {0}")]
    MalformedRuv(String),
    #[error("configuration error: {0}")]
    Configuration(String),
}
