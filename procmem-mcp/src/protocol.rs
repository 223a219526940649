//! JSON-RPC method dispatch: `tools/call` style methods mapped onto
//! [`crate::server::ProcMemServer`] calls.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use procmem_core::embeddings::Embedder;
use procmem_core::error::{Error, Result};
use procmem_core::executor::AilCommand;

use crate::server::ProcMemServer;

pub const CAP_LIST: &str = "cap:list";
pub const CAP_RENAME: &str = "cap:rename";
pub const CAP_LOOKUP: &str = "cap:lookup";
pub const CAP_WHOIS: &str = "cap:whois";
pub const CAP_MERGE: &str = "cap:merge";
pub const EXECUTE_CODE: &str = "execute_code";
pub const SUGGEST_PLAN: &str = "suggest_plan";
pub const APPLY_DECISION: &str = "apply_decision";

fn params_or_missing(params: Option<Value>) -> Result<Value> {
    params.ok_or_else(|| Error::Validation("missing params".to_string()))
}

fn parse<T: for<'de> Deserialize<'de>>(params: Option<Value>) -> Result<T> {
    let value = params_or_missing(params)?;
    serde_json::from_value(value).map_err(|e| Error::Validation(format!("invalid params: {e}")))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CapListParams {
    #[serde(default)]
    namespace: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CapRenameParams {
    id: Uuid,
    namespace: String,
    action: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CapLookupParams {
    intent: String,
    #[serde(default = "default_max_results")]
    max_results: usize,
}

fn default_max_results() -> usize {
    5
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CapWhoisParams {
    id: Uuid,
    #[serde(default = "default_org")]
    org: String,
    #[serde(default = "default_project")]
    project: String,
}

fn default_org() -> String {
    "procmem".to_string()
}

fn default_project() -> String {
    "default".to_string()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CapMergeParams {
    target: Uuid,
    source: Uuid,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExecuteCodeParams {
    code: String,
    #[serde(default = "default_context")]
    context: Value,
    #[serde(default)]
    tool_versions: HashMap<String, String>,
}

fn default_context() -> Value {
    json!({})
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SuggestPlanParams {
    intent: String,
    #[serde(default = "default_max_tasks")]
    max_tasks: usize,
}

fn default_max_tasks() -> usize {
    5
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum ApplyDecisionCommand {
    Continue,
    Abort,
    ReplanDag,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApplyDecisionParams {
    command: ApplyDecisionCommand,
}

/// Dispatch one `method`/`params` pair against `server`, returning the
/// method's `result` value (or an [`Error`] to be projected to a JSON-RPC
/// error response by the caller).
pub async fn dispatch<E: Embedder>(
    server: &ProcMemServer<E>,
    method: &str,
    params: Option<Value>,
) -> Result<Value> {
    match method {
        CAP_LIST => {
            let p: CapListParams = parse(params)?;
            let caps = server.cap_list(p.namespace.as_deref());
            Ok(json!({ "capabilities": caps }))
        }
        CAP_RENAME => {
            let p: CapRenameParams = parse(params)?;
            let renamed = server.cap_rename(p.id, &p.namespace, &p.action)?;
            Ok(json!(renamed))
        }
        CAP_LOOKUP => {
            let p: CapLookupParams = parse(params)?;
            let ranked = server.cap_lookup(&p.intent, p.max_results)?;
            let results: Vec<Value> =
                ranked.into_iter().map(|(cap, score)| json!({ "capability": cap, "score": score })).collect();
            Ok(json!({ "results": results }))
        }
        CAP_WHOIS => {
            let p: CapWhoisParams = parse(params)?;
            let (capability, fqdn) = server.cap_whois(p.id, &p.org, &p.project)?;
            Ok(json!({ "capability": capability, "fqdn": fqdn }))
        }
        CAP_MERGE => {
            let p: CapMergeParams = parse(params)?;
            let merged = server.cap_merge(p.target, p.source)?;
            Ok(json!(merged))
        }
        EXECUTE_CODE => {
            let p: ExecuteCodeParams = parse(params)?;
            let (result, cached) = server.execute_code(&p.code, &p.context, p.tool_versions).await?;
            Ok(json!({ "result": result, "cached": cached }))
        }
        SUGGEST_PLAN => {
            let p: SuggestPlanParams = parse(params)?;
            let dag = server.suggest_plan(&p.intent, p.max_tasks)?;
            Ok(json!({ "tasks": dag.tasks }))
        }
        APPLY_DECISION => {
            let p: ApplyDecisionParams = parse(params)?;
            let command = match p.command {
                ApplyDecisionCommand::Continue => AilCommand::Continue,
                ApplyDecisionCommand::Abort => AilCommand::Abort,
                ApplyDecisionCommand::ReplanDag => AilCommand::ReplanDag,
            };
            server.apply_decision(command);
            Ok(json!({ "accepted": true }))
        }
        other => Err(Error::Validation(format!("unknown method '{other}'"))),
    }
}
