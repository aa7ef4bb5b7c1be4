use thiserror::Error;

/// Failures reported by the host scene while this crate mutates it.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum HostError {
    #[error("host refused to create atom '{uid}' of kind '{kind}'")]
    CreationRefused { kind: String, uid: String },

    #[error("atom uid '{0}' is already in use")]
    UidInUse(String),

    #[error("atom '{0}' not found")]
    AtomNotFound(String),

    #[error("rigid body '{0}' not found")]
    BodyNotFound(String),

    #[error("joint {0} not found")]
    JointNotFound(u64),

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("invalid target pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid persisted settings: {0}")]
    Settings(#[from] serde_json::Error),

    #[error(transparent)]
    Host(#[from] HostError),
}

pub type Result<T> = std::result::Result<T, LinkError>;
