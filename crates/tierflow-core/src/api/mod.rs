//! API implementation submodules.
//!
//! Each submodule contains `impl TierflowApi` blocks that extend the public
//! API with domain-specific methods. The struct definition remains in `lib.rs`.

mod builder;
mod catalog;
mod dispatch;
mod files;
mod objectives;
pub mod responses;
mod state;
mod system;

pub use builder::TierflowApiBuilder;
pub(crate) use state::ApiState;
