//! Capability registry — one ordered table per capability kind.

use std::collections::HashMap;

use crate::descriptor::CapabilityDescriptor;
use crate::handler::SharedHandler;
use crate::types::{CapabilityKind, HostError, HostResult};

struct Entry {
    descriptor: CapabilityDescriptor,
    handler: SharedHandler,
}

#[derive(Default)]
struct KindTable {
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
}

/// Registered capabilities keyed by `(kind, name)`.
///
/// Populated once at startup and then shared behind an `Arc`; every read
/// method takes `&self`, so no locking is involved after construction.
#[derive(Default)]
pub struct CapabilityRegistry {
    tools: KindTable,
    resources: KindTable,
    prompts: KindTable,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self, kind: CapabilityKind) -> &KindTable {
        match kind {
            CapabilityKind::Tool => &self.tools,
            CapabilityKind::Resource => &self.resources,
            CapabilityKind::Prompt => &self.prompts,
        }
    }

    fn table_mut(&mut self, kind: CapabilityKind) -> &mut KindTable {
        match kind {
            CapabilityKind::Tool => &mut self.tools,
            CapabilityKind::Resource => &mut self.resources,
            CapabilityKind::Prompt => &mut self.prompts,
        }
    }

    /// Register a capability. The kind comes from the descriptor.
    pub fn register(
        &mut self,
        descriptor: CapabilityDescriptor,
        handler: SharedHandler,
    ) -> HostResult<()> {
        let kind = descriptor.kind;
        let table = self.table_mut(kind);

        if table.index.contains_key(&descriptor.name) {
            return Err(HostError::DuplicateName {
                kind,
                name: descriptor.name,
            });
        }

        tracing::debug!("Registering {kind}: {}", descriptor.name);
        table
            .index
            .insert(descriptor.name.clone(), table.entries.len());
        table.entries.push(Entry {
            descriptor,
            handler,
        });
        Ok(())
    }

    /// Look up a capability by kind and name.
    pub fn lookup(
        &self,
        kind: CapabilityKind,
        name: &str,
    ) -> HostResult<(&CapabilityDescriptor, &SharedHandler)> {
        let table = self.table(kind);
        table
            .index
            .get(name)
            .map(|&i| {
                let entry = &table.entries[i];
                (&entry.descriptor, &entry.handler)
            })
            .ok_or_else(|| HostError::NotFound {
                kind,
                name: name.to_string(),
            })
    }

    /// Descriptors of one kind in registration order.
    ///
    /// The iterator is `Clone`, so a caller can restart it without going
    /// back to the registry.
    pub fn list(
        &self,
        kind: CapabilityKind,
    ) -> impl Iterator<Item = &CapabilityDescriptor> + Clone + '_ {
        self.table(kind).entries.iter().map(|e| &e.descriptor)
    }

    /// First resource (in registration order) whose template matches `uri`.
    pub fn match_resource(
        &self,
        uri: &str,
    ) -> Option<(&CapabilityDescriptor, &SharedHandler, Vec<(String, String)>)> {
        self.resources.entries.iter().find_map(|entry| {
            let template = entry.descriptor.uri_template.as_ref()?;
            template
                .matches(uri)
                .map(|vars| (&entry.descriptor, &entry.handler, vars))
        })
    }

    pub fn count(&self, kind: CapabilityKind) -> usize {
        self.table(kind).entries.len()
    }

    pub fn len(&self) -> usize {
        CapabilityKind::ALL.iter().map(|k| self.count(*k)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("tools", &self.count(CapabilityKind::Tool))
            .field("resources", &self.count(CapabilityKind::Resource))
            .field("prompts", &self.count(CapabilityKind::Prompt))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ParamType;
    use crate::handler::handler_fn;
    use serde_json::json;
    use std::sync::Arc;

    fn noop() -> SharedHandler {
        handler_fn(|_| async { Ok(json!(null)) })
    }

    fn tool(name: &str) -> CapabilityDescriptor {
        CapabilityDescriptor::tool(name)
            .required("text", ParamType::String)
            .build()
            .unwrap()
    }

    #[test]
    fn test_lookup_returns_registered_handler() {
        let mut registry = CapabilityRegistry::new();
        let handler = noop();
        registry.register(tool("echo"), handler.clone()).unwrap();

        let (desc, found) = registry.lookup(CapabilityKind::Tool, "echo").unwrap();
        assert_eq!(desc.name, "echo");
        assert!(Arc::ptr_eq(found, &handler));
    }

    #[test]
    fn test_duplicate_name_same_kind() {
        let mut registry = CapabilityRegistry::new();
        registry.register(tool("echo"), noop()).unwrap();
        let err = registry.register(tool("echo"), noop()).unwrap_err();
        assert_eq!(
            err,
            HostError::DuplicateName {
                kind: CapabilityKind::Tool,
                name: "echo".to_string()
            }
        );
        assert_eq!(registry.count(CapabilityKind::Tool), 1);
    }

    #[test]
    fn test_same_name_different_kind_allowed() {
        let mut registry = CapabilityRegistry::new();
        registry.register(tool("echo"), noop()).unwrap();
        let prompt = CapabilityDescriptor::prompt("echo").build().unwrap();
        registry.register(prompt, noop()).unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_lookup_missing() {
        let registry = CapabilityRegistry::new();
        assert!(matches!(
            registry.lookup(CapabilityKind::Prompt, "ping"),
            Err(HostError::NotFound { .. })
        ));
    }

    #[test]
    fn test_list_registration_order_and_restartable() {
        let mut registry = CapabilityRegistry::new();
        for name in ["zeta", "alpha", "mid"] {
            registry.register(tool(name), noop()).unwrap();
        }
        let listing = registry.list(CapabilityKind::Tool);
        let first: Vec<_> = listing.clone().map(|d| d.name.as_str()).collect();
        let second: Vec<_> = listing.map(|d| d.name.as_str()).collect();
        assert_eq!(first, vec!["zeta", "alpha", "mid"]);
        assert_eq!(first, second);
        assert_eq!(registry.list(CapabilityKind::Resource).count(), 0);
    }

    #[test]
    fn test_match_resource_first_registered_wins() {
        let mut registry = CapabilityRegistry::new();
        let specific = CapabilityDescriptor::resource("stats", "host://stats")
            .build()
            .unwrap();
        let generic = CapabilityDescriptor::resource("anything", "host://{name}")
            .build()
            .unwrap();
        registry.register(specific, noop()).unwrap();
        registry.register(generic, noop()).unwrap();

        let (desc, _, vars) = registry.match_resource("host://stats").unwrap();
        assert_eq!(desc.name, "stats");
        assert!(vars.is_empty());

        let (desc, _, vars) = registry.match_resource("host://other").unwrap();
        assert_eq!(desc.name, "anything");
        assert_eq!(vars, vec![("name".to_string(), "other".to_string())]);

        assert!(registry.match_resource("elsewhere://x").is_none());
    }
}
