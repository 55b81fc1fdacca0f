//! Tierflow RPC - JSON-RPC tool server for the tiering pipeline.
//!
//! Exposes every tool of [`tierflow_core::TierflowApi`] over HTTP:
//! `POST /rpc` speaks JSON-RPC 2.0 (`tools/list`, `tools/call`, or a tool
//! name as the method), `GET /tools` lists tool schemas, and `GET /health`
//! answers liveness probes.

pub mod handlers;
pub mod server;

pub use server::{router, start_server, AppState};
