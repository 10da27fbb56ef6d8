/// Errors that can occur while encoding or decoding envelopes.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The message is not valid JSON.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The message parsed but is not a JSON object.
    #[error("message is not a JSON object")]
    NotAnObject,

    /// The object carries neither a valid dispatch array nor a request id.
    #[error("message is not a recognized envelope shape")]
    UnrecognizedShape,
}

pub type Result<T> = std::result::Result<T, CodecError>;
