//! Reassembles independently translated chunks of one unit into a single module.
use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::analysis::{SourceUnit, UnitType};
use crate::convert::orchestrator::TranslationResult;

pub const TARGET_EXTENSION: &str = "js";

static DEPENDENCY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^(?:(?:const|let|var)\s+[^=]+=\s*require\(\s*['"][^'"]+['"]\s*\)[\w.()]*|require\(\s*['"][^'"]+['"]\s*\)|import\s+.+\s+from\s+['"][^'"]+['"]|import\s+['"][^'"]+['"])\s*;?\s*$"#,
    )
    .expect("valid regex")
});

static EXPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:module\.exports\s*=|export\s+default\b)").expect("valid regex"));

static MEMBER_EXPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*(?:module\.)?exports\.[\w$]+\s*=").expect("valid regex"));

static ROUTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(?:const|let|var)\s+router\s*=").expect("valid regex"));

static FUNCTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^(?:async\s+)?function\s*\*?\s*(\w+)\s*\(|^(?:const|let)\s+(\w+)\s*=\s*(?:async\s+)?(?:function\b|\([^)]*\)\s*=>|\w+\s*=>)",
    )
    .expect("valid regex")
});

/// The merged target module for one source unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedArtifact {
    pub unit_name: String,
    pub unit_type: UnitType,
    /// Path relative to the output root.
    pub target_path: PathBuf,
    /// Deduplicated in first-occurrence order.
    pub dependencies: Vec<String>,
    pub body: String,
    pub export: Option<String>,
    /// No chunk produced usable output.
    pub failed: bool,
    pub warnings: Vec<String>,
}

impl MergedArtifact {
    /// Module text without the banner.
    pub fn code(&self) -> String {
        let sections: Vec<String> = [
            self.dependencies.join("\n"),
            self.body.clone(),
            self.export.clone().unwrap_or_default(),
        ]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect();
        sections.join("\n\n")
    }

    /// Full file contents, banner included.
    pub fn render(&self) -> String {
        let banner = format!(
            "/**\n * {}\n * Converted from Java {} to Node.js\n * Type: {}\n */\n",
            self.unit_name, self.unit_type, self.unit_type
        );
        if self.failed {
            let mut out = format!("{banner}\n// CONVERSION FAILED: no chunk could be translated.\n");
            for warning in &self.warnings {
                out.push_str(&format!("// {warning}\n"));
            }
            return out;
        }
        format!("{banner}\n{}\n", self.code())
    }
}

/// `<type dir>/<BaseName>.js`, relative to the output root.
pub fn target_path(unit: &SourceUnit) -> PathBuf {
    let mut path = PathBuf::from(unit.unit_type.output_dir());
    path.push(format!("{}.{TARGET_EXTENSION}", unit.name()));
    path
}

/// Like [`target_path`] but nested under the unit's package, for units whose
/// base name is already taken: `services/com/b/service/UserService.js`.
pub fn qualified_target_path(unit: &SourceUnit) -> PathBuf {
    let mut path = PathBuf::from(unit.unit_type.output_dir());
    match &unit.facts.package {
        Some(package) => path.extend(package.split('.')),
        None => {
            if let Some((dir, _)) = unit.path.rsplit_once('/') {
                path.extend(dir.split('/'));
            }
        }
    }
    path.push(format!("{}.{TARGET_EXTENSION}", unit.name()));
    path
}

/// Merges the successful results of one unit, in chunk order.
pub fn merge(unit: &SourceUnit, results: &[TranslationResult]) -> MergedArtifact {
    let mut ordered: Vec<&TranslationResult> = results.iter().collect();
    ordered.sort_by_key(|r| r.index);
    let total = ordered.len();

    let mut dependencies: Vec<String> = Vec::new();
    let mut bodies: Vec<String> = Vec::new();
    let mut export: Option<String> = None;
    let mut warnings = Vec::new();
    let mut succeeded = 0;

    for result in ordered {
        let text = match &result.outcome {
            Ok(text) => text,
            Err(failure) => {
                warnings.push(format!(
                    "chunk {}/{} omitted: {failure}",
                    result.index + 1,
                    total
                ));
                continue;
            }
        };
        succeeded += 1;

        let split = split_chunk(text);
        for dep in split.dependencies {
            if !dependencies.contains(&dep) {
                dependencies.push(dep);
            }
        }
        if split.export.is_some() {
            export = split.export;
        }
        if !split.body.is_empty() {
            bodies.push(split.body);
        }
    }

    let failed = succeeded == 0;
    let body = if failed { String::new() } else { bodies.join("\n\n") };
    // A synthesized `module.exports = ...` would replace member assignments.
    let export = if failed || (export.is_none() && MEMBER_EXPORT.is_match(&body)) {
        export
    } else {
        let declared = format!("{}\n{body}", dependencies.join("\n"));
        export.or_else(|| Some(synthesize_export(&declared, &unit.class_name)))
    };

    MergedArtifact {
        unit_name: unit.name().to_string(),
        unit_type: unit.unit_type,
        target_path: target_path(unit),
        dependencies,
        body,
        export,
        failed,
        warnings,
    }
}

struct SplitChunk {
    dependencies: Vec<String>,
    body: String,
    export: Option<String>,
}

fn split_chunk(text: &str) -> SplitChunk {
    let mut dependencies = Vec::new();
    let mut body: Vec<&str> = Vec::new();
    let mut export: Option<String> = None;

    let mut lines = text.lines();
    while let Some(line) = lines.next() {
        if DEPENDENCY.is_match(line) {
            dependencies.push(line.trim().to_string());
            continue;
        }
        if EXPORT.is_match(line) {
            let mut statement = vec![line.trim_end()];
            let mut depth = bracket_depth(line);
            while depth > 0 {
                match lines.next() {
                    Some(next) => {
                        depth += bracket_depth(next);
                        statement.push(next.trim_end());
                    }
                    None => break,
                }
            }
            export = Some(statement.join("\n"));
            continue;
        }
        body.push(line);
    }

    SplitChunk {
        dependencies,
        body: trim_blank_lines(&body).join("\n"),
        export,
    }
}

fn bracket_depth(line: &str) -> i32 {
    line.chars()
        .map(|c| match c {
            '(' | '[' | '{' => 1,
            ')' | ']' | '}' => -1,
            _ => 0,
        })
        .sum()
}

fn trim_blank_lines<'a>(lines: &'a [&'a str]) -> &'a [&'a str] {
    let start = lines.iter().position(|l| !l.trim().is_empty());
    let end = lines.iter().rposition(|l| !l.trim().is_empty());
    match (start, end) {
        (Some(start), Some(end)) => &lines[start..=end],
        _ => &[],
    }
}

fn synthesize_export(declared: &str, class_name: &str) -> String {
    if ROUTER.is_match(declared) {
        return "module.exports = router;".to_string();
    }
    let class = format!(r"(?m)^class\s+{}\b", regex::escape(class_name));
    if Regex::new(&class).is_ok_and(|re| re.is_match(declared)) {
        return format!("module.exports = {class_name};");
    }

    let mut names: Vec<&str> = Vec::new();
    for caps in FUNCTION.captures_iter(declared) {
        if let Some(name) = caps.get(1).or_else(|| caps.get(2)) {
            if !names.contains(&name.as_str()) {
                names.push(name.as_str());
            }
        }
    }
    if names.is_empty() {
        return "module.exports = {};".to_string();
    }
    format!("module.exports = {{\n    {}\n}};", names.join(",\n    "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::orchestrator::ChunkFailure;
    use crate::convert::sanitize::SanitizeFailure;

    fn service() -> SourceUnit {
        SourceUnit::new(
            "com/acme/service/ActorService.java",
            "package com.acme.service;\n\n@Service\npublic class ActorService {}\n",
        )
    }

    fn ok(index: usize, text: &str) -> TranslationResult {
        TranslationResult {
            index,
            raw: Some(text.to_string()),
            outcome: Ok(text.to_string()),
            attempts: 1,
        }
    }

    fn failed(index: usize) -> TranslationResult {
        TranslationResult {
            index,
            raw: Some("nonsense".to_string()),
            outcome: Err(ChunkFailure::Sanitize(SanitizeFailure {
                reason: "no code found in response".to_string(),
                raw: "nonsense".to_string(),
            })),
            attempts: 1,
        }
    }

    #[test]
    fn test_dependencies_deduplicated_in_order() {
        let results = vec![
            ok(0, "const a = require('a');\nconst b = require('b');\n\nfunction one() {}"),
            ok(1, "const b = require('b');\nconst c = require('c');\n\nfunction two() {}"),
        ];
        let artifact = merge(&service(), &results);
        assert_eq!(
            artifact.dependencies,
            vec![
                "const a = require('a');",
                "const b = require('b');",
                "const c = require('c');"
            ]
        );
        assert_eq!(artifact.body, "function one() {}\n\nfunction two() {}");
    }

    #[test]
    fn test_recognizes_other_dependency_forms() {
        let results = vec![ok(
            0,
            "const { Op } = require('sequelize');\nrequire('dotenv').config;\nrequire('./setup');\nimport x from 'x';\nimport './polyfill';\nlet y = 1;",
        )];
        let artifact = merge(&service(), &results);
        assert_eq!(artifact.dependencies.len(), 4);
        assert_eq!(artifact.dependencies[2], "import x from 'x';");
        assert!(artifact.body.starts_with("require('dotenv').config;"));
    }

    #[test]
    fn test_last_export_wins() {
        let results = vec![
            ok(0, "function a() {}\nmodule.exports = { a };"),
            ok(1, "function b() {}\nmodule.exports = { a, b };"),
        ];
        let artifact = merge(&service(), &results);
        assert_eq!(artifact.export.as_deref(), Some("module.exports = { a, b };"));
        assert!(!artifact.body.contains("module.exports"));
    }

    #[test]
    fn test_multiline_export_removed_whole() {
        let results = vec![ok(
            0,
            "async function findAll() {}\n\nmodule.exports = {\n    findAll,\n};\n",
        )];
        let artifact = merge(&service(), &results);
        assert_eq!(
            artifact.export.as_deref(),
            Some("module.exports = {\n    findAll,\n};")
        );
        assert_eq!(artifact.body, "async function findAll() {}");
    }

    #[test]
    fn test_results_sorted_by_index_and_failures_warned() {
        let results = vec![ok(2, "function c() {}"), failed(1), ok(0, "function a() {}")];
        let artifact = merge(&service(), &results);
        assert!(!artifact.failed);
        assert_eq!(artifact.body, "function a() {}\n\nfunction c() {}");
        assert_eq!(artifact.warnings.len(), 1);
        assert!(artifact.warnings[0].starts_with("chunk 2/3 omitted"));
    }

    #[test]
    fn test_all_failed_marks_artifact() {
        let artifact = merge(&service(), &[failed(0), failed(1)]);
        assert!(artifact.failed);
        assert!(artifact.body.is_empty());
        assert!(artifact.export.is_none());
        let rendered = artifact.render();
        assert!(rendered.contains("CONVERSION FAILED"));
        assert!(rendered.contains("chunk 1/2 omitted"));
    }

    #[test]
    fn test_synthesized_exports() {
        let unit = service();
        let router = merge(
            &unit,
            &[ok(0, "const express = require('express');\nconst router = express.Router();")],
        );
        assert_eq!(router.export.as_deref(), Some("module.exports = router;"));

        let inline = merge(&unit, &[ok(0, "const router = require('express').Router();")]);
        assert_eq!(inline.dependencies.len(), 1);
        assert_eq!(inline.export.as_deref(), Some("module.exports = router;"));

        let class = merge(&unit, &[ok(0, "class ActorService {\n  run() {}\n}")]);
        assert_eq!(class.export.as_deref(), Some("module.exports = ActorService;"));

        let functions = merge(
            &unit,
            &[ok(0, "async function findAll() {}\nconst remove = async (id) => id;\nfunction findAll() {}")],
        );
        assert_eq!(
            functions.export.as_deref(),
            Some("module.exports = {\n    findAll,\n    remove\n};")
        );

        let empty = merge(&unit, &[ok(0, "// nothing here")]);
        assert_eq!(empty.export.as_deref(), Some("module.exports = {};"));
    }

    #[test]
    fn test_member_exports_suppress_synthesis() {
        let unit = service();
        let artifact = merge(
            &unit,
            &[
                ok(0, "const db = require('../db');\n\nmodule.exports.findAll = async () => db.all();"),
                ok(1, "exports.remove = async (id) => db.run(id);"),
            ],
        );
        assert_eq!(artifact.export, None);
        let code = artifact.code();
        assert!(code.ends_with("exports.remove = async (id) => db.run(id);"));
        assert!(!code.contains("module.exports = "));

        // An explicit export from the model is still kept.
        let explicit = merge(
            &unit,
            &[ok(0, "exports.a = 1;\nmodule.exports = { a: 1 };")],
        );
        assert_eq!(explicit.export.as_deref(), Some("module.exports = { a: 1 };"));
    }

    #[test]
    fn test_merge_is_deterministic_and_idempotent() {
        let unit = service();
        let results = vec![
            ok(0, "const a = require('a');\n\nfunction one() {\n\n  return 1;\n}"),
            ok(1, "const a = require('a');\nfunction two() {}\nmodule.exports = { one, two };"),
        ];
        let first = merge(&unit, &results);
        assert_eq!(first, merge(&unit, &results));

        let again = merge(&unit, &[ok(0, &first.code())]);
        assert_eq!(again, first);
        assert!(first.body.contains("function one() {\n\n  return 1;\n}"));
    }

    #[test]
    fn test_target_path_per_type() {
        let unit = service();
        assert_eq!(target_path(&unit), PathBuf::from("services/ActorService.js"));

        let other = SourceUnit::new("misc/Util.java", "public class Util {}\n");
        assert_eq!(target_path(&other), PathBuf::from("Util.js"));
    }

    #[test]
    fn test_qualified_target_path_keeps_base_name() {
        assert_eq!(
            qualified_target_path(&service()),
            PathBuf::from("services/com/acme/service/ActorService.js")
        );

        let unpackaged = SourceUnit::new("legacy/dao/UserDao.java", "public class UserDao {}\n");
        assert_eq!(
            qualified_target_path(&unpackaged),
            PathBuf::from("repositories/legacy/dao/UserDao.js")
        );
    }

    #[test]
    fn test_render_has_banner() {
        let artifact = merge(&service(), &[ok(0, "function a() {}")]);
        let rendered = artifact.render();
        assert!(rendered.starts_with("/**\n * ActorService\n * Converted from Java Service to Node.js"));
        assert!(rendered.ends_with("module.exports = {\n    a\n};\n"));
    }
}
