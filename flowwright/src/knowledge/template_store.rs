//! Template store: keyword-indexed catalogue, explicit search only.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::snapshot::TemplateSnapshot;

/// A marketplace-style template: name, keywords, and a full flow payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub flow_data: Value,
}

/// Local template catalogue. Never consulted implicitly; the discover phase
/// exposes an explicit search tool over it.
#[derive(Default)]
pub struct TemplateStore {
    templates: HashMap<String, Template>,
}

impl TemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: TemplateSnapshot) -> Self {
        let mut store = Self::new();
        for template in snapshot.templates {
            store.insert(template);
        }
        store
    }

    pub fn insert(&mut self, template: Template) {
        self.templates.insert(template.id.clone(), template);
    }

    pub fn get(&self, id: &str) -> Option<&Template> {
        self.templates.get(id)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Keyword search: one point per query term matched against name,
    /// description, or keywords. Results sorted by score then name.
    pub fn search(&self, query: &str) -> Vec<&Template> {
        let terms: Vec<String> = query
            .to_lowercase()
            .split_whitespace()
            .map(String::from)
            .collect();
        if terms.is_empty() {
            return Vec::new();
        }
        let mut scored: Vec<(usize, &Template)> = self
            .templates
            .values()
            .filter_map(|t| {
                let haystack = format!(
                    "{} {} {}",
                    t.name.to_lowercase(),
                    t.description.to_lowercase(),
                    t.keywords.join(" ").to_lowercase()
                );
                let score = terms.iter().filter(|term| haystack.contains(*term)).count();
                (score > 0).then_some((score, t))
            })
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.name.cmp(&b.1.name)));
        scored.into_iter().map(|(_, t)| t).collect()
    }
}
