//! Knowledge base: one [`AnalysisRecord`] per source unit, keyed by path.
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{SourceUnit, UnitType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRecord {
    pub path: String,
    #[serde(rename = "type")]
    pub unit_type: UnitType,
    pub class_name: String,
    pub methods: Vec<String>,
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl AnalysisRecord {
    pub fn from_unit(unit: &SourceUnit, project_package: Option<&str>) -> Self {
        Self {
            path: unit.path.clone(),
            unit_type: unit.unit_type,
            class_name: unit.class_name.clone(),
            methods: unit.methods().iter().map(|m| m.signature.clone()).collect(),
            dependencies: unit.project_dependencies(project_package),
            fields: unit.facts.fields.clone(),
            description: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub total_modules: usize,
    pub by_type: BTreeMap<UnitType, usize>,
}

/// The on-disk JSON document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_overview: Option<String>,
    pub modules: Vec<AnalysisRecord>,
    pub statistics: Statistics,
}

/// Run-scoped builder. Re-adding a path replaces the earlier record in place.
#[derive(Debug, Default)]
pub struct KnowledgeBase {
    records: Vec<AnalysisRecord>,
    index: HashMap<String, usize>,
    project_overview: Option<String>,
}

impl KnowledgeBase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_unit(&mut self, record: AnalysisRecord) {
        match self.index.get(&record.path) {
            Some(&slot) => self.records[slot] = record,
            None => {
                self.index.insert(record.path.clone(), self.records.len());
                self.records.push(record);
            }
        }
    }

    pub fn get(&self, path: &str) -> Option<&AnalysisRecord> {
        self.index.get(path).map(|&slot| &self.records[slot])
    }

    /// Attach an LLM-written description to an existing record.
    pub fn set_description(&mut self, path: &str, description: String) -> bool {
        match self.index.get(path) {
            Some(&slot) => {
                self.records[slot].description = Some(description);
                true
            }
            None => false,
        }
    }

    pub fn set_project_overview(&mut self, overview: String) {
        self.project_overview = Some(overview);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records in path-insertion order.
    pub fn snapshot(&self) -> Vec<AnalysisRecord> {
        self.records.clone()
    }

    pub fn statistics(&self) -> Statistics {
        let mut by_type = BTreeMap::new();
        for record in &self.records {
            *by_type.entry(record.unit_type).or_insert(0) += 1;
        }
        Statistics {
            total_modules: self.records.len(),
            by_type,
        }
    }

    pub fn to_document(&self) -> KnowledgeDocument {
        KnowledgeDocument {
            project_overview: self.project_overview.clone(),
            modules: self.snapshot(),
            statistics: self.statistics(),
        }
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let data = serde_json::to_string_pretty(&self.to_document())
            .context("failed to serialize knowledge base")?;
        std::fs::write(path, data)
            .with_context(|| format!("failed to write knowledge base: {}", path.display()))?;
        info!(
            "Knowledge base written to {} ({} modules)",
            path.display(),
            self.records.len()
        );
        Ok(())
    }
}
