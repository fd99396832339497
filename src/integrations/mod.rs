//! External integrations
//!
//! - **pipefy**: GraphQL client for the Pipefy API, the remote side of a sync
//! - **retry**: exponential backoff shared by remote calls

pub mod pipefy;
pub mod retry;

pub use pipefy::PipefyClient;
pub use retry::{with_retry, RetryConfig, RetryDecision, RetryableError};
