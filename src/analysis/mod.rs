//! Structural analysis: classification of source files into layered units,
//! source tree scanning, and the knowledge base built from them.
pub mod classifier;
pub mod knowledge;
pub mod scan;

pub use classifier::{Ambiguity, ClassSpan, MethodSpan, StructuralFacts, UnitType, classify};

/// One classified source file. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceUnit {
    /// Path relative to the scanned root, `/`-separated.
    pub path: String,
    pub unit_type: UnitType,
    pub text: String,
    pub class_name: String,
    pub facts: StructuralFacts,
    pub ambiguity: Option<Ambiguity>,
}

impl SourceUnit {
    pub fn new(path: impl Into<String>, text: impl Into<String>) -> Self {
        let path = path.into();
        let text = text.into();
        let classification = classify(&path, &text);
        let stem = classifier::file_stem(&path);
        let class_name = classification
            .facts
            .primary_class(stem)
            .unwrap_or(stem)
            .to_string();

        Self {
            path,
            unit_type: classification.unit_type,
            text,
            class_name,
            facts: classification.facts,
            ambiguity: classification.ambiguity,
        }
    }

    /// Base name of the source file, e.g. `ActorController`.
    pub fn name(&self) -> &str {
        classifier::file_stem(&self.path)
    }

    pub fn methods(&self) -> &[MethodSpan] {
        &self.facts.methods
    }

    /// Imports that point into the same project.
    ///
    /// `project_package` overrides the default prefix, which is the first two
    /// segments of the unit's own package (`com.sakila.web` → `com.sakila`).
    pub fn project_dependencies(&self, project_package: Option<&str>) -> Vec<String> {
        let prefix = match project_package {
            Some(p) => p.to_string(),
            None => match &self.facts.package {
                Some(pkg) => pkg.split('.').take(2).collect::<Vec<_>>().join("."),
                None => return Vec::new(),
            },
        };
        let prefix = format!("{}.", prefix.trim_end_matches('.'));

        let mut deps: Vec<String> = Vec::new();
        for import in &self.facts.imports {
            if import.starts_with(&prefix) && !deps.contains(import) {
                deps.push(import.clone());
            }
        }
        deps
    }
}
