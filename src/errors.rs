/// Errors surfaced by the storage facade.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The host does not provide an area with this name.
    #[error("storage area '{0}' is not supported by the host")]
    UnknownArea(String),

    /// The host reported a failure while running a storage operation. The
    /// host's own error is kept untouched as the source.
    #[error("host storage error in area '{area}': {source}")]
    Host {
        area: String,
        #[source]
        source: anyhow::Error,
    },

    /// The facade was created outside of a Tokio runtime, so its change feed
    /// has nowhere to run.
    #[error("storage facade needs a Tokio runtime to deliver change events")]
    NoRuntime,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StorageError {
    pub(crate) fn host(area: &str, source: anyhow::Error) -> Self {
        StorageError::Host {
            area: area.to_string(),
            source,
        }
    }

    /// Returns the raw host error if this is a host failure.
    pub fn host_error(&self) -> Option<&anyhow::Error> {
        match self {
            StorageError::Host { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;
