//! HTTP plumbing for talking to the fabric.

pub mod client;
pub mod retry;

pub use client::{classify_status, is_retryable_status, FabricClient, RequestStats};
pub use retry::{retry_async, RetryConfig, RetryStats};
