//! Shared library for the contact center admin Lambda functions.
//!
//! This crate provides the proficiency core (normalization, reconciliation,
//! bulk assignment, attribute catalog), the directory and key-value seams
//! with their AWS implementations, and common HTTP, config and error types.

pub mod bulk;
pub mod cache;
pub mod catalog;
pub mod changes;
pub mod config;
pub mod connect;
pub mod directory;
pub mod dynamo;
pub mod error;
pub mod greetings;
pub mod http;
pub mod proficiency;
pub mod profiles;
pub mod reconcile;
pub mod records;
pub mod store;
pub mod tts;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::Config;
pub use connect::ConnectDirectory;
pub use directory::Directory;
pub use dynamo::DynamoStore;
pub use error::{Error, Result, ServiceError};
pub use greetings::GreetingStore;
pub use http::Reply;
pub use profiles::ProfileRepository;
pub use store::KeyValueStore;
pub use tts::TtsService;
