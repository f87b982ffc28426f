use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no cspack.toml found at {path}; run packaging from a service root")]
    ConfigMissing { path: PathBuf },

    #[error("failed to load config from {path}")]
    ConfigLoad {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config at {path}")]
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Bad project data. Always raised before anything is written to disk.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("service name must not be empty")]
    EmptyServiceName,

    #[error("invalid service name {name:?}: {reason}")]
    InvalidServiceName { name: String, reason: &'static str },

    #[error("role name must not be empty (role #{index})")]
    EmptyRoleName { index: usize },

    #[error("invalid role name {name:?}: {reason}")]
    InvalidRoleName { name: String, reason: &'static str },

    #[error("duplicate role name {name:?} (conflicts with {existing:?})")]
    DuplicateRole { name: String, existing: String },

    #[error("role {role:?} must have at least one instance")]
    ZeroInstances { role: String },

    #[error("role {role:?} is a worker role and cannot declare an endpoint port")]
    WorkerEndpoint { role: String },
}
