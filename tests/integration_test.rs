/// End-to-end integration tests for the layershift pipeline.
///
/// Tests the complete flow:
///   Config → Scan → Classify → Knowledge base → Chunk → Translate → Merge → Output
use layershift::analysis::UnitType;
use layershift::config::{Config, RetryConfig, Selection};
use layershift::convert::CancelToken;
use layershift::pipeline::{Converter, FailureKind, analyze};
use layershift::provider::{Provider, ProviderError};
use layershift::provider::mock::ScriptedProvider;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

const CONTROLLER: &str = r#"package com.sakila.controller;

import com.sakila.service.ActorService;
import org.springframework.web.bind.annotation.GetMapping;

@RestController
public class ActorController {
    private final ActorService actorService;

    public ActorController(ActorService actorService) {
        this.actorService = actorService;
    }

    @GetMapping("/actors")
    public List<Actor> list() {
        return actorService.findAll();
    }
}
"#;

const SERVICE: &str = r#"package com.sakila.service;

import com.sakila.dao.ActorDao;
import com.sakila.model.Actor;

@Service
public class ActorService {
    private final ActorDao actorDao;

    public List<Actor> findAll() {
        return actorDao.findAll();
    }

    public Actor findById(int id) {
        return actorDao.findById(id);
    }

    public Actor save(Actor actor) {
        validate(actor);
        return actorDao.save(actor);
    }

    public void delete(int id) {
        actorDao.delete(id);
    }

    private void validate(Actor actor) {
        if (actor.getFirstName() == null) {
            throw new IllegalArgumentException("first name required");
        }
    }
}
"#;

const DAO: &str = r#"package com.sakila.dao;

import com.sakila.model.Actor;

@Repository
public class ActorDao {
    public List<Actor> findAll() {
        return jdbc.query("SELECT * FROM actor", mapper);
    }
}
"#;

const MODEL: &str = r#"package com.sakila.model;

@Entity
public class Actor {
    private int actorId;
    private String firstName;
}
"#;

fn write_project(root: &Path) -> Config {
    let src = root.join("src/main/java/com/sakila");
    for (dir, name, text) in [
        ("controller", "ActorController", CONTROLLER),
        ("service", "ActorService", SERVICE),
        ("dao", "ActorDao", DAO),
        ("model", "Actor", MODEL),
    ] {
        fs::create_dir_all(src.join(dir)).unwrap();
        fs::write(src.join(dir).join(format!("{name}.java")), text).unwrap();
    }
    // Test sources are skipped by default.
    let tests = root.join("src/test/java/com/sakila");
    fs::create_dir_all(&tests).unwrap();
    fs::write(tests.join("ActorServiceTest.java"), "public class ActorServiceTest {}\n").unwrap();

    Config {
        source_dir: root.join("src").to_string_lossy().to_string(),
        output_dir: root.join("converted").to_string_lossy().to_string(),
        knowledge_base_path: root.join("codebase_analysis.json").to_string_lossy().to_string(),
        summary_path: root.join("conversion_summary.json").to_string_lossy().to_string(),
        retry: RetryConfig {
            max_attempts: 3,
            delay_ms: 0,
            call_spacing_ms: 0,
        },
        ..Config::default()
    }
}

/// Answers each prompt with a module named after the chunk it was given.
fn echo_provider() -> ScriptedProvider {
    ScriptedProvider::from_fn(|request| {
        let prompt = &request.prompt;
        let code = if prompt.contains("JAVA CONTROLLER") {
            "```javascript\nconst express = require('express');\nconst router = express.Router();\nconst service = require('../services/ActorService');\n\nrouter.get('/actors', async (req, res) => {\n  res.json(await service.findAll());\n});\n\nmodule.exports = router;\n```"
                .to_string()
        } else if prompt.contains("JAVA SERVICE") {
            let names: Vec<&str> = ["findAll", "findById", "save", "delete", "validate"]
                .into_iter()
                .filter(|m| prompt.contains(&format!(" {m}(")))
                .collect();
            let functions: String = names
                .iter()
                .map(|name| format!("async function {name}() {{\n  return repository;\n}}\n\n"))
                .collect();
            format!(
                "Here is the code:\nconst repository = require('../repositories/ActorDao');\n\n{functions}module.exports = {{ {} }};",
                names.join(", ")
            )
        } else if prompt.contains("JAVA DAO") {
            "const db = require('../db');\n\nasync function findAll() {\n  return db.query('SELECT * FROM actor');\n}\n".to_string()
        } else {
            "const { DataTypes } = require('sequelize');\n\nclass Actor {}\n".to_string()
        };
        Ok(code)
    })
}

/// Full pipeline: scan → knowledge base → convert every layer → summary
#[test]
fn test_full_pipeline() {
    let temp_dir = tempdir().unwrap();
    let mut config = write_project(temp_dir.path());
    // Force the service into several chunks.
    config
        .budget_overrides
        .insert(UnitType::Service.as_str().to_string(), 90);

    let mut analysis = analyze(&config).unwrap();
    assert_eq!(analysis.units.len(), 4);

    let provider = echo_provider();
    let mut seen = Vec::new();
    let mut converter = Converter::new(&config, &provider, CancelToken::new());
    let summary = converter
        .run(&mut analysis, |position, total, unit| {
            seen.push((position, total, unit.name().to_string()));
        })
        .unwrap();

    assert_eq!(seen.len(), 4);
    assert_eq!(summary.units_processed, 4);
    assert_eq!(summary.merge_failures, 0);
    assert!(!summary.cancelled);
    assert!(summary.chunks_emitted > 4);

    // Knowledge base
    let kb: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&config.knowledge_base_path).unwrap()).unwrap();
    assert_eq!(kb["statistics"]["totalModules"], 4);
    assert_eq!(kb["statistics"]["byType"]["DAO"], 1);
    let service = kb["modules"]
        .as_array()
        .unwrap()
        .iter()
        .find(|m| m["className"] == "ActorService")
        .unwrap();
    assert_eq!(service["type"], "Service");
    assert_eq!(
        service["dependencies"],
        serde_json::json!(["com.sakila.dao.ActorDao", "com.sakila.model.Actor"])
    );

    // Artifacts land in per-type directories
    let out = temp_dir.path().join("converted");
    let route = fs::read_to_string(out.join("routes/ActorController.js")).unwrap();
    assert!(route.starts_with("/**\n * ActorController"));
    assert!(route.trim_end().ends_with("module.exports = router;"));
    assert_eq!(route.matches("module.exports").count(), 1);

    let service = fs::read_to_string(out.join("services/ActorService.js")).unwrap();
    assert_eq!(
        service
            .matches("const repository = require('../repositories/ActorDao');")
            .count(),
        1
    );
    assert_eq!(service.matches("module.exports").count(), 1);
    assert!(service.contains("async function findAll()"));
    assert!(service.contains("async function delete()"));
    assert!(!service.contains("Here is the code"));

    let dao = fs::read_to_string(out.join("repositories/ActorDao.js")).unwrap();
    assert!(dao.contains("module.exports = {\n    findAll\n};"));

    let model = fs::read_to_string(out.join("models/Actor.js")).unwrap();
    assert!(model.contains("module.exports = Actor;"));

    // Summary
    let summary_json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&config.summary_path).unwrap()).unwrap();
    assert_eq!(summary_json["unitsProcessed"], 4);
    assert!(summary_json["finishedAt"].is_string());
}

/// Matched selection converts one controller with its service and DAO.
#[test]
fn test_matched_conversion() {
    let temp_dir = tempdir().unwrap();
    let mut config = write_project(temp_dir.path());
    config.selection = Selection::Matched;

    let mut analysis = analyze(&config).unwrap();
    let provider = echo_provider();
    let mut converter = Converter::new(&config, &provider, CancelToken::new());
    let summary = converter.run(&mut analysis, |_, _, _| {}).unwrap();

    assert_eq!(summary.units_processed, 3);
    let out = temp_dir.path().join("converted");
    assert!(out.join("routes/ActorController.js").exists());
    assert!(out.join("services/ActorService.js").exists());
    assert!(out.join("repositories/ActorDao.js").exists());
    assert!(!out.join("models/Actor.js").exists());
}

/// Transient provider errors are retried; persistent ones fail only their unit.
#[test]
fn test_provider_failures_are_isolated() {
    let temp_dir = tempdir().unwrap();
    let mut config = write_project(temp_dir.path());
    config.convert_types = vec![UnitType::Dao, UnitType::Model];

    let mut analysis = analyze(&config).unwrap();
    let echo = echo_provider();
    let provider = ScriptedProvider::from_fn(move |request| {
        if request.prompt.contains("JAVA MODEL") {
            Err(ProviderError::Quota("429 Too Many Requests".into()))
        } else {
            echo.generate(request)
        }
    })
    .with_script(vec![Err(ProviderError::Timeout("slow".into()))]);

    let mut converter = Converter::new(&config, &provider, CancelToken::new());
    let summary = converter.run(&mut analysis, |_, _, _| {}).unwrap();

    // DAO: one timeout then success. Model: three quota errors.
    assert_eq!(provider.calls(), 5);
    assert_eq!(summary.units_processed, 2);
    assert_eq!(summary.merge_failures, 1);
    assert_eq!(summary.failures_of(FailureKind::Provider).count(), 1);
    assert_eq!(summary.failures_of(FailureKind::MergeAllFailed).count(), 1);

    let out = temp_dir.path().join("converted");
    assert!(
        fs::read_to_string(out.join("repositories/ActorDao.js"))
            .unwrap()
            .contains("async function findAll()")
    );
    assert!(
        fs::read_to_string(out.join("models/Actor.js"))
            .unwrap()
            .contains("CONVERSION FAILED")
    );
}
