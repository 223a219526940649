//! Entity registry: the `Tool` and `Capability` tables. Distinct from
//! [`crate::graph::GraphStore`], which owns only graph topology
//! (node/edge/hyperedge records) — this registry owns the richer entity
//! attributes (schema, counts, members, tags) that graph nodes merely
//! reference by id.

use std::collections::HashMap;

use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::{Capability, Member, Tool};

/// Single-writer table of tools and capabilities.
#[derive(Default)]
pub struct EntityRegistry {
    tools: RwLock<HashMap<String, Tool>>,
    capabilities: RwLock<HashMap<Uuid, Capability>>,
}

impl EntityRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_tool(&self, tool: Tool) {
        self.tools.write().insert(tool.id.clone(), tool);
    }

    #[must_use]
    pub fn tool(&self, id: &str) -> Option<Tool> {
        self.tools.read().get(id).cloned()
    }

    #[must_use]
    pub fn all_tools(&self) -> Vec<Tool> {
        self.tools.read().values().cloned().collect()
    }

    pub fn record_tool_outcome(&self, id: &str, success: bool) {
        let mut tools = self.tools.write();
        if let Some(tool) = tools.get_mut(id) {
            tool.usage_count += 1;
            if success {
                tool.success_count += 1;
            }
        }
    }

    /// Insert a capability, enforcing invariant 1: every tool member must
    /// already exist in the tool table.
    pub fn insert_capability(&self, capability: Capability) -> Result<()> {
        {
            let tools = self.tools.read();
            for member in &capability.members {
                if let Member::Tool { id } = member {
                    if !tools.contains_key(id) {
                        return Err(Error::Validation(format!(
                            "capability references unknown tool '{id}'"
                        )));
                    }
                }
            }
        }
        self.capabilities.write().insert(capability.id, capability);
        Ok(())
    }

    #[must_use]
    pub fn capability(&self, id: Uuid) -> Option<Capability> {
        self.capabilities.read().get(&id).cloned()
    }

    #[must_use]
    pub fn all_capabilities(&self) -> Vec<Capability> {
        self.capabilities.read().values().cloned().collect()
    }

    pub fn record_capability_outcome(&self, id: Uuid, success: bool) {
        let mut capabilities = self.capabilities.write();
        if let Some(cap) = capabilities.get_mut(&id) {
            cap.usage_count += 1;
            if success {
                cap.success_count += 1;
            }
        }
    }

    /// Soft-delete: anonymize rather than remove outright.
    pub fn anonymize_capability(&self, id: Uuid) -> Result<()> {
        let mut capabilities = self.capabilities.write();
        let cap = capabilities
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("capability '{id}'")))?;
        cap.anonymized = true;
        cap.display_name = format!("anon-{id}");
        cap.code_snippet = None;
        cap.tags.clear();
        Ok(())
    }

    /// Rename a capability in place, validating the naming grammar. The
    /// UUID never changes across a rename.
    pub fn rename_capability(&self, id: Uuid, namespace: &str, action: &str) -> Result<Capability> {
        validate_namespace(namespace)?;
        validate_action(action)?;
        let mut capabilities = self.capabilities.write();
        let cap = capabilities
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("capability '{id}'")))?;
        cap.namespace = namespace.to_string();
        cap.action = action.to_string();
        cap.display_name = format!("{namespace}:{action}");
        Ok(cap.clone())
    }

    /// Merge `source` into `target`: union members, take the max success
    /// rate counters, soft-delete the source. Fails with
    /// [`Error::Conflict`] if the two capabilities' tool sets are entirely
    /// disjoint, which the spec treats as an "incompatible tool sets"
    /// merge.
    pub fn merge_capabilities(&self, target: Uuid, source: Uuid) -> Result<Capability> {
        let mut capabilities = self.capabilities.write();
        let source_cap = capabilities
            .get(&source)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("capability '{source}'")))?;
        {
            let target_cap = capabilities
                .get(&target)
                .ok_or_else(|| Error::NotFound(format!("capability '{target}'")))?;
            let shares_any_tool = source_cap
                .tool_ids()
                .iter()
                .any(|t| target_cap.tool_ids().contains(t));
            if !shares_any_tool && !source_cap.tool_ids().is_empty() && !target_cap.tool_ids().is_empty()
            {
                return Err(Error::Conflict(format!(
                    "capability '{target}' and '{source}' share no tools"
                )));
            }
        }
        let target_cap = capabilities.get_mut(&target).unwrap();
        for member in source_cap.members {
            if !target_cap.members.contains(&member) {
                target_cap.members.push(member);
            }
        }
        target_cap.success_count += source_cap.success_count;
        target_cap.usage_count += source_cap.usage_count;
        let merged = target_cap.clone();
        drop(capabilities);
        self.anonymize_capability(source)?;
        Ok(merged)
    }
}

/// `^[a-z][a-z0-9]*$`, length 1-20, no underscores/colons.
pub fn validate_namespace(namespace: &str) -> Result<()> {
    let len_ok = (1..=20).contains(&namespace.len());
    let mut chars = namespace.chars();
    let first_ok = chars.next().is_some_and(|c| c.is_ascii_lowercase());
    let rest_ok = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    if len_ok && first_ok && rest_ok {
        Ok(())
    } else {
        Err(Error::Validation(format!("invalid capability namespace '{namespace}'")))
    }
}

/// `^[a-zA-Z][a-zA-Z0-9_]*$`, length 1-50, no colons, no auto-generated
/// `exec_`/`exec<hex>` names.
pub fn validate_action(action: &str) -> Result<()> {
    let len_ok = (1..=50).contains(&action.len());
    let mut chars = action.chars();
    let first_ok = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
    let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    let auto_generated = action.starts_with("exec_")
        || (action.starts_with("exec") && action[4..].chars().all(|c| c.is_ascii_hexdigit()) && action.len() > 4);
    if len_ok && first_ok && rest_ok && !auto_generated {
        Ok(())
    } else {
        Err(Error::Validation(format!("invalid capability action '{action}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Visibility;

    fn tool(id: &str) -> Tool {
        Tool {
            id: id.to_string(),
            server: "server".into(),
            description: String::new(),
            input_schema: serde_json::json!({}),
            embedding: None,
            success_count: 0,
            usage_count: 0,
        }
    }

    fn capability(id: Uuid, members: Vec<Member>) -> Capability {
        Capability {
            id,
            display_name: "ns:act".into(),
            namespace: "ns".into(),
            action: "act".into(),
            intent_embedding: None,
            members,
            hierarchy_level: 0,
            success_count: 0,
            usage_count: 0,
            tags: vec![],
            visibility: Visibility::Private,
            code_snippet: None,
            parents: vec![],
            anonymized: false,
        }
    }

    #[test]
    fn capability_requires_known_tools() {
        let registry = EntityRegistry::new();
        let cap = capability(Uuid::new_v4(), vec![Member::Tool { id: "missing".into() }]);
        assert!(registry.insert_capability(cap).is_err());
    }

    #[test]
    fn capability_accepted_with_known_tools() {
        let registry = EntityRegistry::new();
        registry.upsert_tool(tool("a:b"));
        let cap = capability(Uuid::new_v4(), vec![Member::Tool { id: "a:b".into() }]);
        assert!(registry.insert_capability(cap).is_ok());
    }

    #[test]
    fn rename_rejects_bad_namespace() {
        let registry = EntityRegistry::new();
        let id = Uuid::new_v4();
        registry.insert_capability(capability(id, vec![])).unwrap();
        assert!(registry.rename_capability(id, "Fs", "action").is_err());
    }

    #[test]
    fn rename_rejects_auto_generated_action() {
        let registry = EntityRegistry::new();
        let id = Uuid::new_v4();
        registry.insert_capability(capability(id, vec![])).unwrap();
        assert!(registry.rename_capability(id, "fs", "exec_abc123").is_err());
    }

    #[test]
    fn rename_preserves_uuid() {
        let registry = EntityRegistry::new();
        let id = Uuid::new_v4();
        registry.insert_capability(capability(id, vec![])).unwrap();
        let renamed = registry.rename_capability(id, "fs", "readFile").unwrap();
        assert_eq!(renamed.id, id);
        assert_eq!(renamed.display_name, "fs:readFile");
    }

    #[test]
    fn anonymize_clears_identifying_fields() {
        let registry = EntityRegistry::new();
        let id = Uuid::new_v4();
        registry.insert_capability(capability(id, vec![])).unwrap();
        registry.anonymize_capability(id).unwrap();
        let cap = registry.capability(id).unwrap();
        assert!(cap.anonymized);
        assert!(cap.code_snippet.is_none());
    }

    #[test]
    fn merge_rejects_disjoint_tool_sets() {
        let registry = EntityRegistry::new();
        registry.upsert_tool(tool("a:b"));
        registry.upsert_tool(tool("c:d"));
        let target = Uuid::new_v4();
        let source = Uuid::new_v4();
        registry
            .insert_capability(capability(target, vec![Member::Tool { id: "a:b".into() }]))
            .unwrap();
        registry
            .insert_capability(capability(source, vec![Member::Tool { id: "c:d".into() }]))
            .unwrap();
        assert!(registry.merge_capabilities(target, source).is_err());
    }

    #[test]
    fn merge_unions_members_and_anonymizes_source() {
        let registry = EntityRegistry::new();
        registry.upsert_tool(tool("a:b"));
        registry.upsert_tool(tool("a:c"));
        let target = Uuid::new_v4();
        let source = Uuid::new_v4();
        registry
            .insert_capability(capability(target, vec![Member::Tool { id: "a:b".into() }]))
            .unwrap();
        registry
            .insert_capability(capability(source, vec![Member::Tool { id: "a:b".into() }, Member::Tool { id: "a:c".into() }]))
            .unwrap();
        let merged = registry.merge_capabilities(target, source).unwrap();
        assert_eq!(merged.members.len(), 2);
        assert!(registry.capability(source).unwrap().anonymized);
    }
}
