//! `orchestrator` — the AI software-factory control plane's hard core
//! (§1): durable queue, priority scheduler, worker-lifecycle state
//! machine, file-level concurrency interlock, spec-generation manager,
//! and verification chain-of-custody.
//!
//! The binary entrypoint (`src/bin/orchestrator_server.rs`) wires these
//! modules together; everything below is usable as a library so tests and
//! future transports (e.g. a CLI) can construct the same services without
//! going through HTTP.

pub mod api;
pub mod branch;
pub mod config;
pub mod database;
pub mod dispatcher;
pub mod domain;
pub mod error;
pub mod locks;
pub mod queue;
pub mod retry;
pub mod specgen;
pub mod workers;
