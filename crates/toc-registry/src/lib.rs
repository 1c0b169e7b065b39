//! Process-wide tool registry and intent-to-tools selection (spec §4.6).
//!
//! Generalizes the teacher's `CapabilityIndex` (tag -> agent ids, with
//! multi-tag intersection lookup) from agent-capability discovery to
//! weighted tool scoring: the index here is only used to find candidates
//! quickly, the actual ranking is the scoring pass in [`select_tools`].

use std::collections::{HashMap, HashSet};

use toc_kernel::model::{ToolBag, ToolCategory, ToolDefinition};

pub const DEFAULT_MAX_TOOLS: usize = 15;

const WEB_BROWSE_KEYWORDS: &[&str] = &[
    "browse", "navigate", "click", "page", "website", "url", "browser", "visit",
];
const ASSERTION_KEYWORDS: &[&str] = &["assert", "verify", "expect", "should", "check"];

/// Per-category metadata kept alongside the registry table.
#[derive(Debug, Clone)]
pub struct CategoryMeta {
    pub display_name: String,
    pub description: String,
    pub keywords: Vec<String>,
}

/// Tag -> tool-name index, mirroring the teacher's `CapabilityIndex` shape.
#[derive(Debug, Default)]
struct TagIndex {
    by_tag: HashMap<String, Vec<String>>,
}

impl TagIndex {
    fn index(&mut self, tool: &ToolDefinition) {
        for tag in &tool.tags {
            self.by_tag
                .entry(tag.clone())
                .or_default()
                .push(tool.name.clone());
        }
    }

    fn find_by_tag(&self, tag: &str) -> &[String] {
        self.by_tag.get(tag).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// The process-wide immutable tool table (spec §3, §4.6).
pub struct ToolRegistry {
    tools: Vec<ToolDefinition>,
    categories: HashMap<ToolCategory, CategoryMeta>,
    tag_index: TagIndex,
}

impl ToolRegistry {
    pub fn new(tools: Vec<ToolDefinition>, categories: HashMap<ToolCategory, CategoryMeta>) -> Self {
        let mut tag_index = TagIndex::default();
        for tool in &tools {
            tag_index.index(tool);
        }
        Self {
            tools,
            categories,
            tag_index,
        }
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.iter().find(|t| t.name == name)
    }

    pub fn tools_by_tag(&self, tag: &str) -> &[String] {
        self.tag_index.find_by_tag(tag)
    }

    /// The full §4.6 selection algorithm.
    pub fn select_tools(&self, intent: &str, max_tools: Option<usize>) -> ToolBag {
        let max_tools = max_tools.unwrap_or(DEFAULT_MAX_TOOLS).max(1);
        let lower_intent = intent.to_lowercase();

        let mut scores: HashMap<&str, i64> = HashMap::new();
        let mut matched_categories: HashSet<ToolCategory> = HashSet::new();

        for tool in &self.tools {
            let mut score: i64 = tool.weight as i64 / 10;

            for tag in &tool.tags {
                if lower_intent.contains(&tag.to_lowercase()) {
                    score += 10;
                }
            }

            for part in tool.name.split(|c: char| c == '_' || c == '-') {
                if part.len() >= 3 && lower_intent.contains(&part.to_lowercase()) {
                    score += 5;
                }
            }

            if let Some(meta) = self.categories.get(&tool.category) {
                for keyword in &meta.keywords {
                    if lower_intent.contains(&keyword.to_lowercase()) {
                        score += 3;
                        matched_categories.insert(tool.category);
                    }
                }
            }

            scores.insert(tool.name.as_str(), score);
        }

        // Step 3: domain-hint forced categories.
        if WEB_BROWSE_KEYWORDS.iter().any(|kw| lower_intent.contains(kw)) {
            matched_categories.insert(ToolCategory::BrowserCore);
            matched_categories.insert(ToolCategory::BrowserInteract);
            matched_categories.insert(ToolCategory::BrowserRead);
        }
        if ASSERTION_KEYWORDS.iter().any(|kw| lower_intent.contains(kw)) {
            matched_categories.insert(ToolCategory::Assertions);
        }

        // Step 4: rank by (score desc, weight desc, name asc) — deterministic ties.
        let mut ranked: Vec<&ToolDefinition> = self.tools.iter().collect();
        ranked.sort_by(|a, b| {
            let score_a = scores.get(a.name.as_str()).copied().unwrap_or(0);
            let score_b = scores.get(b.name.as_str()).copied().unwrap_or(0);
            score_b
                .cmp(&score_a)
                .then(b.weight.cmp(&a.weight))
                .then(a.name.cmp(&b.name))
        });

        let mut selected: Vec<String> = Vec::new();
        let mut selected_set: HashSet<String> = HashSet::new();

        for tool in &ranked {
            if selected.len() >= max_tools {
                break;
            }
            let score = scores.get(tool.name.as_str()).copied().unwrap_or(0);
            if score <= 0 {
                break;
            }
            selected.push(tool.name.clone());
            selected_set.insert(tool.name.clone());
        }

        if selected.len() < max_tools {
            let mut category_fill: Vec<&ToolDefinition> = self
                .tools
                .iter()
                .filter(|t| {
                    matched_categories.contains(&t.category) && !selected_set.contains(&t.name)
                })
                .collect();
            category_fill.sort_by(|a, b| b.weight.cmp(&a.weight).then(a.name.cmp(&b.name)));
            for tool in category_fill {
                if selected.len() >= max_tools {
                    break;
                }
                selected.push(tool.name.clone());
                selected_set.insert(tool.name.clone());
            }
        }

        let mut categories: Vec<ToolCategory> = matched_categories.into_iter().collect();
        categories.sort_by_key(|c| format!("{c:?}"));

        let top_five: Vec<&str> = selected.iter().take(5).map(String::as_str).collect();
        let reasoning = format!(
            "matched categories [{}], top tools: {}",
            categories
                .iter()
                .map(|c| format!("{c:?}"))
                .collect::<Vec<_>>()
                .join(", "),
            top_five.join(", ")
        );

        ToolBag {
            tools: selected,
            reasoning,
            categories,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(name: &str, category: ToolCategory, tags: &[&str], weight: i32) -> ToolDefinition {
        ToolDefinition {
            name: name.to_string(),
            description: format!("{name} tool"),
            category,
            tags: tags.iter().map(|s| s.to_string()).collect(),
            input_schema: serde_json::json!({}),
            weight,
        }
    }

    fn registry() -> ToolRegistry {
        let tools = vec![
            tool("browser_launch", ToolCategory::BrowserCore, &["browser", "launch"], 100),
            tool("browser_click", ToolCategory::BrowserInteract, &["click"], 80),
            tool("assert_text", ToolCategory::Assertions, &["assert", "text"], 60),
            tool("read_dom", ToolCategory::BrowserRead, &["dom"], 40),
        ];
        let mut categories = HashMap::new();
        categories.insert(
            ToolCategory::BrowserCore,
            CategoryMeta {
                display_name: "Browser Core".into(),
                description: "core browser actions".into(),
                keywords: vec!["browser".into(), "navigate".into()],
            },
        );
        ToolRegistry::new(tools, categories)
    }

    #[test]
    fn selection_is_deterministic_for_fixed_input() {
        let reg = registry();
        let a = reg.select_tools("navigate the browser and click the login link", None);
        let b = reg.select_tools("navigate the browser and click the login link", None);
        assert_eq!(a.tools, b.tools);
    }

    #[test]
    fn web_keywords_force_browser_categories() {
        let reg = registry();
        let bag = reg.select_tools("browse to the website and click submit", None);
        assert!(bag.categories.contains(&ToolCategory::BrowserCore));
        assert!(bag.categories.contains(&ToolCategory::BrowserInteract));
        assert!(bag.categories.contains(&ToolCategory::BrowserRead));
    }

    #[test]
    fn respects_max_tools_cap() {
        let reg = registry();
        let bag = reg.select_tools("browse click assert text dom", Some(2));
        assert!(bag.tools.len() <= 2);
    }
}
