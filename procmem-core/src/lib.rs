//! Procedural memory core.
//!
//! Scores tool/capability candidates over a hypergraph (`graph`, `router`,
//! `scorer`), turns an accepted intent into a task DAG (`planner`), runs
//! that DAG (`executor`), and learns from the outcome (`per`, `postexec`,
//! `threshold`). `registry` holds the tool/capability entity tables the
//! graph's nodes reference by id; `cache` avoids re-running identical
//! tool calls; `sync` keeps the graph coherent with capability-lifecycle
//! events raised by a collaborator; `audit` redacts PII and normalizes
//! network-origin CIDRs before either reaches a log or trace sink.
//!
//! External collaborators this core assumes but does not implement: the
//! tool-invocation transport (`executor::ToolAdapter`), the trace store
//! (`tracer::TraceSink`), the embedding provider beyond the bundled local
//! fallback (`embeddings::Embedder`), and the JSON-RPC/SSE transport
//! (`procmem-mcp`).

pub mod audit;
pub mod cache;
pub mod config;
pub mod constants;
pub mod embeddings;
pub mod error;
pub mod executor;
pub mod graph;
pub mod per;
pub mod planner;
pub mod postexec;
pub mod registry;
pub mod router;
pub mod scorer;
pub mod sync;
pub mod threshold;
pub mod tracer;
pub mod types;

pub use config::ProcMemConfig;
pub use error::{Error, Result};
