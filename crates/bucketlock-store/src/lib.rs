//! bucketlock Store - Object store gateway for lease markers
//!
//! This crate provides:
//! - The [`MarkerGateway`] capability surface (list by prefix, exists, create marker, delete)
//! - An in-memory gateway for tests and single-process use
//! - A gateway over any `object_store` backend (S3, IBM COS, GCS, Azure, local)
//! - A URL based client builder

pub mod client;
pub mod error;
pub mod gateway;
pub mod memory;
pub mod remote;

// Re-export commonly used types
pub use client::connect;
pub use error::{Result, StoreError};
pub use gateway::{MarkerEntry, MarkerGateway};
pub use memory::InMemoryGateway;
pub use remote::ObjectStoreGateway;
