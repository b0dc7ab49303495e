use thiserror::Error;

pub type Result<T> = std::result::Result<T, MutationError>;

#[derive(Debug, Error)]
pub enum MutationError {
    #[error("could not deserialize {kind} object: {source}")]
    Deserialization {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("admission request does not contain an object")]
    MissingObject,

    #[error("invalid pod: {0}")]
    InvalidPod(&'static str),

    #[error("could not serialize {0}: {1}")]
    Serialization(&'static str, #[source] serde_json::Error),
}
