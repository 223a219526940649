//! End-to-end dispatch tests: JSON in, JSON out, through the full
//! jsonrpc/protocol/server stack without a stdio pipe.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use procmem_core::config::ProcMemConfig;
use procmem_core::error::Result;
use procmem_core::tracer::{AlgorithmTracer, InMemoryTraceSink};
use procmem_core::types::{Capability, Member, Tool, Visibility};
use procmem_mcp::protocol::dispatch;
use procmem_mcp::server::{CodeExecutor, ProcMemServer};

struct EchoExecutor;

#[async_trait]
impl CodeExecutor for EchoExecutor {
    async fn execute(&self, code: &str, _context: &serde_json::Value) -> Result<serde_json::Value> {
        Ok(json!({ "echo": code }))
    }
}

fn fresh_server() -> ProcMemServer {
    let tracer = AlgorithmTracer::with_defaults(Arc::new(InMemoryTraceSink::default()));
    ProcMemServer::new(ProcMemConfig::default(), tracer, Arc::new(EchoExecutor))
}

#[tokio::test]
async fn full_capability_lifecycle_through_dispatch() {
    let server = fresh_server();
    server.registry.upsert_tool(Tool {
        id: "xml:parse".into(),
        server: "xml".into(),
        description: String::new(),
        input_schema: json!({}),
        embedding: None,
        success_count: 0,
        usage_count: 0,
    });

    let id = Uuid::new_v4();
    server
        .registry
        .insert_capability(Capability {
            id,
            display_name: "xml:parse_doc".into(),
            namespace: "xml".into(),
            action: "parse_doc".into(),
            intent_embedding: Some(vec![1.0, 0.0, 0.0]),
            members: vec![Member::Tool { id: "xml:parse".into() }],
            hierarchy_level: 0,
            success_count: 1,
            usage_count: 2,
            tags: vec![],
            visibility: Visibility::Private,
            code_snippet: None,
            parents: vec![],
            anonymized: false,
        })
        .unwrap();

    let listed = dispatch(&server, "cap:list", Some(json!({}))).await.unwrap();
    assert_eq!(listed["capabilities"].as_array().unwrap().len(), 1);

    let whois =
        dispatch(&server, "cap:whois", Some(json!({ "id": id, "org": "acme", "project": "widgets" })))
            .await
            .unwrap();
    assert!(whois["fqdn"].as_str().unwrap().starts_with("acme.widgets.xml.parse_doc."));

    let renamed = dispatch(
        &server,
        "cap:rename",
        Some(json!({ "id": id, "namespace": "xml", "action": "parse_document" })),
    )
    .await
    .unwrap();
    assert_eq!(renamed["action"], "parse_document");

    let rejected = dispatch(
        &server,
        "cap:rename",
        Some(json!({ "id": id, "namespace": "XML-bad", "action": "x" })),
    )
    .await;
    assert!(rejected.is_err());
}

#[tokio::test]
async fn merge_retires_source_capability_and_hyperedge() {
    let server = fresh_server();
    server.registry.upsert_tool(Tool {
        id: "a:b".into(),
        server: "a".into(),
        description: String::new(),
        input_schema: json!({}),
        embedding: None,
        success_count: 0,
        usage_count: 0,
    });

    let target = Uuid::new_v4();
    let source = Uuid::new_v4();
    for id in [target, source] {
        server
            .registry
            .insert_capability(Capability {
                id,
                display_name: format!("ns:act-{id}"),
                namespace: "ns".into(),
                action: format!("act{id}"),
                intent_embedding: None,
                members: vec![Member::Tool { id: "a:b".into() }],
                hierarchy_level: 0,
                success_count: 0,
                usage_count: 0,
                tags: vec![],
                visibility: Visibility::Private,
                code_snippet: None,
                parents: vec![],
                anonymized: false,
            })
            .unwrap();
    }
    server
        .graph
        .add_node(&source.to_string(), procmem_core::graph::NodeKind::Capability, None, Default::default())
        .unwrap();
    server.graph.add_hyperedge(&procmem_core::types::Hyperedge::id_for(source), vec![], vec![], 0.1, Default::default()).unwrap();
    assert!(server.graph.has_hyperedge(&procmem_core::types::Hyperedge::id_for(source)));

    let merged =
        dispatch(&server, "cap:merge", Some(json!({ "target": target, "source": source }))).await.unwrap();
    assert_eq!(merged["id"], target.to_string());
    assert!(!server.graph.has_hyperedge(&procmem_core::types::Hyperedge::id_for(source)));

    let source_cap = server.registry.capability(source).unwrap();
    assert!(source_cap.anonymized);
}

#[tokio::test]
async fn execute_code_is_cached_by_fingerprint() {
    let server = fresh_server();
    let params = json!({ "code": "return 1", "context": { "x": 1 }, "toolVersions": { "t": "1.0" } });

    let first = dispatch(&server, "execute_code", Some(params.clone())).await.unwrap();
    assert_eq!(first["cached"], false);

    let second = dispatch(&server, "execute_code", Some(params)).await.unwrap();
    assert_eq!(second["cached"], true);
    assert_eq!(second["result"], first["result"]);
}

#[tokio::test]
async fn execute_code_with_different_tool_version_misses_cache() {
    let server = fresh_server();
    let first = dispatch(
        &server,
        "execute_code",
        Some(json!({ "code": "x", "toolVersions": { "t": "1.0" } })),
    )
    .await
    .unwrap();
    let second = dispatch(
        &server,
        "execute_code",
        Some(json!({ "code": "x", "toolVersions": { "t": "2.0" } })),
    )
    .await
    .unwrap();
    assert_eq!(first["cached"], false);
    assert_eq!(second["cached"], false);
}
