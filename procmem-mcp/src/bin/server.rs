//! Stdio JSON-RPC server entry point: tracing to stderr only (stdout is
//! the wire), construct the server, run the read/dispatch/write loop to
//! completion.

use std::io::{self, Write};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};

use procmem_core::config::ProcMemConfig;
use procmem_core::error::Result;
use procmem_core::tracer::{AlgorithmTracer, InMemoryTraceSink};
use procmem_mcp::jsonrpc::{read_next_message, write_response_with_length, JsonRpcRequest, JsonRpcResponse};
use procmem_mcp::protocol::dispatch;
use procmem_mcp::server::{CodeExecutor, ProcMemServer};

/// No sandbox is bundled here — the execution backend is an
/// external-collaborator concern; this refuses every `execute_code` call
/// until a real adapter is wired in by an embedding application.
struct UnconfiguredExecutor;

#[async_trait]
impl CodeExecutor for UnconfiguredExecutor {
    async fn execute(&self, _code: &str, _context: &serde_json::Value) -> Result<serde_json::Value> {
        Err(procmem_core::Error::Dependency("no code executor configured".to_string()))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    info!("starting procmem-mcp stdio server");

    let config = ProcMemConfig::default().with_env_overrides();
    let tracer = AlgorithmTracer::with_defaults(Arc::new(InMemoryTraceSink::default()));
    let server = ProcMemServer::new(config, tracer, Arc::new(UnconfiguredExecutor));

    run_stdio_loop(&server).await
}

async fn run_stdio_loop<E: procmem_core::embeddings::Embedder>(server: &ProcMemServer<E>) -> anyhow::Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();

    loop {
        let read = read_next_message(&mut handle);
        let (line, is_lsp) = match read {
            Ok(None) => {
                info!("received EOF, shutting down");
                break;
            }
            Ok(Some(pair)) => pair,
            Err(e) => {
                error!(error = %e, "error reading from stdin");
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<JsonRpcRequest>(line) {
            Ok(request) => handle_request(server, request).await,
            Err(e) => {
                warn!(error = %e, "failed to parse JSON-RPC request");
                Some(JsonRpcResponse::err(
                    None,
                    procmem_mcp::jsonrpc::JsonRpcError {
                        code: -32700,
                        message: "Parse error".to_string(),
                        data: None,
                    },
                ))
            }
        };

        if let Some(response) = response {
            let body = serde_json::to_string(&response)?;
            if is_lsp {
                write_response_with_length(&mut stdout, &body)?;
            } else {
                writeln!(stdout, "{body}")?;
                stdout.flush()?;
            }
        }
    }

    info!("procmem-mcp stdio server shut down");
    Ok(())
}

async fn handle_request<E: procmem_core::embeddings::Embedder>(
    server: &ProcMemServer<E>,
    request: JsonRpcRequest,
) -> Option<JsonRpcResponse> {
    let id = request.id.clone();
    if id.is_none() || matches!(id, Some(serde_json::Value::Null)) {
        return None;
    }

    match dispatch(server, &request.method, request.params).await {
        Ok(result) => Some(JsonRpcResponse::ok(id, result)),
        Err(e) => Some(JsonRpcResponse::err(id, procmem_mcp::error::to_jsonrpc_error(&e))),
    }
}
