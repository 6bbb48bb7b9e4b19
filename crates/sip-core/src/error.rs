use thiserror::Error;

/// A type alias for handling `Result`s with `Error`
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while decoding or encoding SIP datagrams.
///
/// All of these are recovered locally by dropping the offending message
/// and logging; none of them ever produce a reply on the wire.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The first line of the message does not carry the `SIP` signature
    #[error("message does not carry a SIP signature")]
    InvalidSignature,

    /// The start-line holds no recognisable method token
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// A response could not be rendered from its template
    #[error("serialization failed: {0}")]
    SerializationError(String),
}
