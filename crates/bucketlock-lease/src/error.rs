use bucketlock_common::ConfigError;
use bucketlock_store::StoreError;

/// Errors returned by lease coordination
#[derive(thiserror::Error, Debug)]
pub enum LeaseError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("may not start multiple keep alive heartbeats (token {0} already held)")]
    HeartbeatAlreadyRunning(String),
}

pub type Result<T> = std::result::Result<T, LeaseError>;
