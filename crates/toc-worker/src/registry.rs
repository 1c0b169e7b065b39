//! Worker-side dynamic tool table (spec §3 `DynamicTool`, §4.2 loader
//! invariants: name collisions keep the older tool; protected names cannot
//! be deleted).

use std::sync::Arc;

use dashmap::DashMap;
use toc_kernel::error::CoreError;
use toc_kernel::model::{DynamicTool, DEFAULT_PROTECTED_TOOL_NAMES};

use crate::tools::{HelloWorldHandler, ToolHandler};

pub struct RegisteredTool {
    pub definition: DynamicTool,
    pub handler: Arc<dyn ToolHandler>,
}

pub struct ToolTable {
    tools: DashMap<String, RegisteredTool>,
    protected: Vec<String>,
}

impl ToolTable {
    pub fn new(extra_protected: Vec<String>) -> Self {
        let table = Self {
            tools: DashMap::new(),
            protected: DEFAULT_PROTECTED_TOOL_NAMES
                .iter()
                .map(|s| s.to_string())
                .chain(extra_protected)
                .collect(),
        };
        table.tools.insert(
            "hello_world".to_string(),
            RegisteredTool {
                definition: DynamicTool {
                    name: "hello_world".into(),
                    description: "returns a fixed greeting".into(),
                    input_schema: serde_json::json!({"type": "object"}),
                    permissions: vec![],
                    source_path: "<builtin>".into(),
                    content_hash: "builtin".into(),
                },
                handler: Arc::new(HelloWorldHandler),
            },
        );
        table
    }

    pub fn is_protected(&self, name: &str) -> bool {
        self.protected.iter().any(|p| p == name)
    }

    /// Insert a newly-loaded tool. Name collisions reject the newer load
    /// and retain the older (spec §4.2).
    pub fn try_insert(&self, definition: DynamicTool, handler: Arc<dyn ToolHandler>) -> Result<(), CoreError> {
        if self.tools.contains_key(&definition.name) {
            return Err(CoreError::ToolLoad(format!(
                "tool '{}' already registered, keeping the older load",
                definition.name
            )));
        }
        self.tools.insert(
            definition.name.clone(),
            RegisteredTool { definition, handler },
        );
        Ok(())
    }

    /// Replace an existing tool's handler when its content hash changes
    /// (file was modified and reloaded, not a fresh create).
    pub fn replace(&self, definition: DynamicTool, handler: Arc<dyn ToolHandler>) {
        self.tools.insert(
            definition.name.clone(),
            RegisteredTool { definition, handler },
        );
    }

    pub fn remove(&self, name: &str) -> Result<(), CoreError> {
        if self.is_protected(name) {
            return Err(CoreError::Validation(format!(
                "'{name}' is protected and cannot be deleted"
            )));
        }
        self.tools
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| CoreError::Validation(format!("no such tool: {name}")))
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.tools.get(name).map(|t| t.handler.clone())
    }

    pub fn hash_of(&self, name: &str) -> Option<String> {
        self.tools.get(name).map(|t| t.definition.content_hash.clone())
    }

    pub fn list(&self) -> Vec<DynamicTool> {
        self.tools.iter().map(|t| t.definition.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Stable hash input for the Supervisor's tool-set content hash (spec
    /// §4.3): sorted `(name, description, canonical(schema))` triples.
    pub fn content_fingerprint_input(&self) -> Vec<(String, String, String)> {
        let mut rows: Vec<(String, String, String)> = self
            .tools
            .iter()
            .map(|t| {
                (
                    t.definition.name.clone(),
                    t.definition.description.clone(),
                    t.definition.input_schema.to_string(),
                )
            })
            .collect();
        rows.sort();
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::scripted::ScriptedHandler;

    fn tool(name: &str) -> DynamicTool {
        DynamicTool {
            name: name.into(),
            description: "d".into(),
            input_schema: serde_json::json!({}),
            permissions: vec![],
            source_path: "t.json".into(),
            content_hash: "abc".into(),
        }
    }

    #[test]
    fn hello_world_is_protected_and_preinstalled() {
        let table = ToolTable::new(vec![]);
        assert_eq!(table.len(), 1);
        assert!(table.is_protected("hello_world"));
        assert!(table.remove("hello_world").is_err());
    }

    #[test]
    fn duplicate_name_keeps_older_tool() {
        let table = ToolTable::new(vec![]);
        table
            .try_insert(tool("fetch_page"), Arc::new(ScriptedHandler::new("")))
            .unwrap();
        let collision = table.try_insert(tool("fetch_page"), Arc::new(ScriptedHandler::new("get x")));
        assert!(collision.is_err());
        assert_eq!(table.hash_of("fetch_page").unwrap(), "abc");
    }
}
