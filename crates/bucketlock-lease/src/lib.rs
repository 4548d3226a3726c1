//! bucketlock Lease - Single access to a bucket for independent processes
//!
//! Processes claim access by writing a marker object `<prefix><6 digits>`
//! into a shared bucket and keep it fresh with heartbeats. A marker that
//! misses two heartbeats is presumed abandoned and may be reaped by anyone.
//! Nothing beyond list, put, delete and an existence check is required from
//! the store.
//!
//! ```rust,ignore
//! let coordinator = LeaseCoordinator::new(LeaseConfig::new("my-bucket"), gateway)?;
//! if let Some(_token) = coordinator.wait_for_and_reserve().await? {
//!     coordinator.shutdown_resource_on_terminate(storage.clone());
//!     // ... work with the storage ...
//! }
//! coordinator.close().await?;
//! ```

pub mod coordinator;
pub mod error;
pub mod listener;
mod task;
pub mod token;

// Re-export commonly used types
pub use bucketlock_common::LeaseConfig;
pub use coordinator::LeaseCoordinator;
pub use error::{LeaseError, Result};
pub use listener::{ProtectedResource, ReadOnlyToggle, TerminationListener};
pub use token::LeaseToken;
