use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::path::Path;
use tree_sitter::{Node, Parser};

/// Node kinds that open a Java type body.
const TYPE_DECLARATIONS: &[&str] = &[
    "class_declaration",
    "interface_declaration",
    "enum_declaration",
    "record_declaration",
    "annotation_type_declaration",
];

const METHOD_DECLARATIONS: &[&str] = &[
    "method_declaration",
    "constructor_declaration",
    "compact_constructor_declaration",
];

/// Layer a source unit belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum UnitType {
    Controller,
    Service,
    #[serde(rename = "DAO")]
    Dao,
    Model,
    Other,
}

impl UnitType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitType::Controller => "Controller",
            UnitType::Service => "Service",
            UnitType::Dao => "DAO",
            UnitType::Model => "Model",
            UnitType::Other => "Other",
        }
    }

    /// Output directory for converted units of this type (relative to the output root).
    pub fn output_dir(&self) -> &'static str {
        match self {
            UnitType::Controller => "routes",
            UnitType::Service => "services",
            UnitType::Dao => "repositories",
            UnitType::Model => "models",
            UnitType::Other => "",
        }
    }
}

impl fmt::Display for UnitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A top-level (or nested) type declaration with its byte span.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassSpan {
    pub name: String,
    /// Declaration line without annotations, e.g. `public class ActorController`.
    pub declaration: String,
    pub span: Range<usize>,
}

/// A method or constructor with the byte span of its whole declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodSpan {
    pub name: String,
    pub signature: String,
    pub class_name: String,
    pub span: Range<usize>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructuralFacts {
    pub package: Option<String>,
    pub imports: Vec<String>,
    /// Annotation names found on top-level type declarations.
    pub annotations: Vec<String>,
    /// Top-level type declarations in source order.
    pub classes: Vec<ClassSpan>,
    /// Outermost methods and constructors in source order, nested classes included.
    pub methods: Vec<MethodSpan>,
    pub fields: Vec<String>,
}

impl StructuralFacts {
    /// Name of the primary type: the one matching the file stem, else the first.
    pub fn primary_class(&self, stem: &str) -> Option<&str> {
        self.classes
            .iter()
            .find(|c| c.name == stem)
            .or_else(|| self.classes.first())
            .map(|c| c.name.as_str())
    }
}

/// Why a unit was downgraded to [`UnitType::Other`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ambiguity {
    /// The deciding signal tier named more than one layer.
    Conflicting(Vec<UnitType>),
    /// The source could not be parsed cleanly.
    Unparseable,
}

impl fmt::Display for Ambiguity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ambiguity::Conflicting(types) => {
                let names: Vec<&str> = types.iter().map(UnitType::as_str).collect();
                write!(f, "conflicting layer signals: {}", names.join(", "))
            }
            Ambiguity::Unparseable => f.write_str("source could not be parsed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub unit_type: UnitType,
    pub facts: StructuralFacts,
    pub ambiguity: Option<Ambiguity>,
}

/// Classifies a Java source file by its annotations, file name and directory.
///
/// Total over its inputs: text that does not parse yields `Other` with empty facts.
pub fn classify(path: &str, text: &str) -> Classification {
    let Some(facts) = parse_facts(text) else {
        return Classification {
            unit_type: UnitType::Other,
            facts: StructuralFacts::default(),
            ambiguity: Some(Ambiguity::Unparseable),
        };
    };

    let tiers = [
        annotation_signals(&facts.annotations),
        name_signals(path),
        directory_signals(path),
    ];

    for mut signals in tiers {
        if signals.is_empty() {
            continue;
        }
        signals.sort();
        signals.dedup();
        if signals.len() == 1 {
            return Classification {
                unit_type: signals[0],
                facts,
                ambiguity: None,
            };
        }
        return Classification {
            unit_type: UnitType::Other,
            facts,
            ambiguity: Some(Ambiguity::Conflicting(signals)),
        };
    }

    Classification {
        unit_type: UnitType::Other,
        facts,
        ambiguity: None,
    }
}

fn annotation_signals(annotations: &[String]) -> Vec<UnitType> {
    annotations
        .iter()
        .filter_map(|a| match a.as_str() {
            "RestController" | "Controller" => Some(UnitType::Controller),
            "Service" => Some(UnitType::Service),
            "Repository" => Some(UnitType::Dao),
            "Entity" | "Table" | "Embeddable" | "MappedSuperclass" | "Document" => {
                Some(UnitType::Model)
            }
            _ => None,
        })
        .collect()
}

fn name_signals(path: &str) -> Vec<UnitType> {
    let stem = file_stem(path);
    let stem = stem.strip_suffix("Impl").unwrap_or(stem);

    let found = if ["Controller", "Resource", "Endpoint"]
        .iter()
        .any(|s| stem.ends_with(s))
    {
        Some(UnitType::Controller)
    } else if stem.ends_with("Service") {
        Some(UnitType::Service)
    } else if ["Repository", "Dao", "DAO"].iter().any(|s| stem.ends_with(s)) {
        Some(UnitType::Dao)
    } else if ["Entity", "Model"].iter().any(|s| stem.ends_with(s)) {
        Some(UnitType::Model)
    } else {
        None
    };
    found.into_iter().collect()
}

/// The nearest directory that names a layer decides.
fn directory_signals(path: &str) -> Vec<UnitType> {
    let parent = Path::new(path).parent();
    let Some(parent) = parent else {
        return Vec::new();
    };
    parent
        .components()
        .rev()
        .filter_map(|c| c.as_os_str().to_str())
        .find_map(|segment| match segment.to_ascii_lowercase().as_str() {
            "controller" | "controllers" | "web" | "rest" => Some(UnitType::Controller),
            "service" | "services" => Some(UnitType::Service),
            "dao" | "daos" | "repository" | "repositories" | "persistence" => {
                Some(UnitType::Dao)
            }
            "model" | "models" | "entity" | "entities" | "domain" => Some(UnitType::Model),
            _ => None,
        })
        .into_iter()
        .collect()
}

pub(crate) fn file_stem(path: &str) -> &str {
    Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(path)
}

fn parse_facts(text: &str) -> Option<StructuralFacts> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_java::LANGUAGE.into())
        .ok()?;
    let tree = parser.parse(text, None)?;
    let root = tree.root_node();
    if root.has_error() {
        return None;
    }

    let source = text.as_bytes();
    let mut facts = StructuralFacts::default();

    let mut cursor = root.walk();
    for child in root.named_children(&mut cursor) {
        match child.kind() {
            "package_declaration" => {
                facts.package = Some(clean_declaration(node_text(child, source), "package"));
            }
            "import_declaration" => {
                let import = clean_declaration(node_text(child, source), "import");
                let import = import.strip_prefix("static ").unwrap_or(&import);
                facts.imports.push(import.trim().to_string());
            }
            kind if TYPE_DECLARATIONS.contains(&kind) => {
                facts.annotations.extend(annotation_names(child, source));
                let class = class_span(child, source);
                let owner = class.name.clone();
                facts.classes.push(class);
                collect_members(child, source, &owner, &mut facts);
            }
            _ => {}
        }
    }

    Some(facts)
}

fn collect_members(decl: Node, source: &[u8], owner: &str, facts: &mut StructuralFacts) {
    if let Some(body) = decl.child_by_field_name("body") {
        collect_body(body, source, owner, facts);
    }
}

fn collect_body(body: Node, source: &[u8], owner: &str, facts: &mut StructuralFacts) {
    let mut cursor = body.walk();
    for member in body.named_children(&mut cursor) {
        let kind = member.kind();
        if METHOD_DECLARATIONS.contains(&kind) {
            facts.methods.push(method_span(member, source, owner));
        } else if kind == "field_declaration" {
            let start = declaration_start(member);
            let text = &source[start..member.end_byte()];
            let field = normalize_whitespace(&String::from_utf8_lossy(text));
            facts
                .fields
                .push(field.trim_end_matches(';').trim_end().to_string());
        } else if kind == "enum_body_declarations" {
            collect_body(member, source, owner, facts);
        } else if TYPE_DECLARATIONS.contains(&kind) {
            let nested = name_of(member, source).unwrap_or_else(|| owner.to_string());
            collect_members(member, source, &nested, facts);
        }
    }
}

fn class_span(node: Node, source: &[u8]) -> ClassSpan {
    let start = declaration_start(node);
    let end = node
        .child_by_field_name("body")
        .map_or(node.end_byte(), |b| b.start_byte());
    ClassSpan {
        name: name_of(node, source).unwrap_or_default(),
        declaration: normalize_whitespace(&String::from_utf8_lossy(&source[start..end])),
        span: node.start_byte()..node.end_byte(),
    }
}

fn method_span(node: Node, source: &[u8], owner: &str) -> MethodSpan {
    let start = declaration_start(node);
    let end = node
        .child_by_field_name("body")
        .map_or(node.end_byte(), |b| b.start_byte());
    let signature = normalize_whitespace(&String::from_utf8_lossy(&source[start..end]));
    MethodSpan {
        name: name_of(node, source).unwrap_or_default(),
        signature: signature.trim_end_matches(';').trim_end().to_string(),
        class_name: owner.to_string(),
        span: node.start_byte()..node.end_byte(),
    }
}

/// Byte offset just past the last annotation in the declaration's modifiers.
fn declaration_start(node: Node) -> usize {
    let mut start = node.start_byte();
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() != "modifiers" {
            continue;
        }
        let mut inner = child.walk();
        for modifier in child.children(&mut inner) {
            if matches!(modifier.kind(), "annotation" | "marker_annotation") {
                start = modifier.end_byte();
            }
        }
    }
    start
}

fn annotation_names(node: Node, source: &[u8]) -> Vec<String> {
    let mut names = Vec::new();
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() != "modifiers" {
            continue;
        }
        let mut inner = child.walk();
        for modifier in child.children(&mut inner) {
            if !matches!(modifier.kind(), "annotation" | "marker_annotation") {
                continue;
            }
            if let Some(name) = name_of(modifier, source) {
                let short = name.rsplit('.').next().unwrap_or(&name).to_string();
                names.push(short);
            }
        }
    }
    names
}

fn name_of(node: Node, source: &[u8]) -> Option<String> {
    node.child_by_field_name("name")
        .and_then(|n| n.utf8_text(source).ok())
        .map(str::to_string)
}

fn node_text<'a>(node: Node, source: &'a [u8]) -> &'a str {
    node.utf8_text(source).unwrap_or("")
}

fn clean_declaration(text: &str, keyword: &str) -> String {
    let text = text.trim();
    let text = text.strip_prefix(keyword).unwrap_or(text);
    normalize_whitespace(text.trim_end_matches(';'))
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTROLLER: &str = r#"package com.sakila.controller;

import com.sakila.service.ActorService;
import com.sakila.model.Actor;
import org.springframework.web.bind.annotation.*;

@RestController
@RequestMapping("/actors")
public class ActorController {
    private final ActorService actorService;

    public ActorController(ActorService actorService) {
        this.actorService = actorService;
    }

    @GetMapping("/{id}")
    public Actor getActor(@PathVariable int id) {
        return actorService.find(id);
    }
}
"#;

    #[test]
    fn test_classify_by_annotation() {
        let result = classify("src/main/java/com/sakila/web/ActorController.java", CONTROLLER);
        assert_eq!(result.unit_type, UnitType::Controller);
        assert!(result.ambiguity.is_none());
        assert_eq!(result.facts.package.as_deref(), Some("com.sakila.controller"));
        assert_eq!(result.facts.imports.len(), 3);
        assert_eq!(result.facts.imports[0], "com.sakila.service.ActorService");
        assert_eq!(result.facts.primary_class("ActorController"), Some("ActorController"));
    }

    #[test]
    fn test_method_spans_and_signatures() {
        let result = classify("ActorController.java", CONTROLLER);
        let methods = &result.facts.methods;
        assert_eq!(methods.len(), 2);
        assert_eq!(methods[0].name, "ActorController");
        assert_eq!(methods[1].name, "getActor");
        assert_eq!(
            methods[1].signature,
            "public Actor getActor(@PathVariable int id)"
        );
        let body = &CONTROLLER[methods[1].span.clone()];
        assert!(body.starts_with("@GetMapping"));
        assert!(body.ends_with('}'));
        assert_eq!(result.facts.fields, vec!["private final ActorService actorService"]);
    }

    #[test]
    fn test_classify_by_name_then_directory() {
        let text = "public class ActorServiceImpl { void run() {} }";
        assert_eq!(
            classify("x/ActorServiceImpl.java", text).unit_type,
            UnitType::Service
        );

        let text = "public class FilmRepository { }";
        assert_eq!(classify("FilmRepository.java", text).unit_type, UnitType::Dao);

        let text = "public class Film { private int id; }";
        assert_eq!(
            classify("com/sakila/domain/Film.java", text).unit_type,
            UnitType::Model
        );
        assert_eq!(classify("com/sakila/util/Film.java", text).unit_type, UnitType::Other);
    }

    #[test]
    fn test_nearest_directory_wins() {
        let text = "public class Helper { }";
        let result = classify("app/service/model/Helper.java", text);
        assert_eq!(result.unit_type, UnitType::Model);
    }

    #[test]
    fn test_conflicting_annotations_downgrade() {
        let text = "@Service\nclass A {}\n@Repository\nclass B {}\n";
        let result = classify("A.java", text);
        assert_eq!(result.unit_type, UnitType::Other);
        assert_eq!(
            result.ambiguity,
            Some(Ambiguity::Conflicting(vec![UnitType::Service, UnitType::Dao]))
        );
        assert_eq!(result.facts.classes.len(), 2);
    }

    #[test]
    fn test_unparseable_is_other_with_empty_facts() {
        let result = classify("UserController.java", "public class {{{ ))) not java");
        assert_eq!(result.unit_type, UnitType::Other);
        assert_eq!(result.facts, StructuralFacts::default());
        assert_eq!(result.ambiguity, Some(Ambiguity::Unparseable));
    }

    #[test]
    fn test_nested_class_methods_are_collected() {
        let text = r#"public class Outer {
    void a() {}
    static class Inner {
        void b() { Runnable r = new Runnable() { public void run() {} }; }
    }
}
"#;
        let result = classify("Outer.java", text);
        let names: Vec<&str> = result.facts.methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(result.facts.methods[1].class_name, "Inner");
    }

    #[test]
    fn test_enum_methods() {
        let text = "public enum Rating { G, PG; public String label() { return name(); } }";
        let result = classify("Rating.java", text);
        assert_eq!(result.facts.methods.len(), 1);
        assert_eq!(result.facts.methods[0].name, "label");
    }
}
