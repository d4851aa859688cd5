//! Prompt text sent to the provider.
use std::fmt::Write as _;

use crate::analysis::UnitType;
use crate::analysis::knowledge::Statistics;
use crate::convert::chunker::Chunk;

const RULES: &str = "\
CRITICAL RULES - MUST FOLLOW:
1. Generate code for EXACTLY ONE file: this {type} ONLY
2. Use CommonJS: const x = require('...') and module.exports
3. Use placeholder requires for dependencies (do NOT generate those files)
4. DO NOT include multiple modules in one file
5. DO NOT add example usage, test code, or extra files
6. DO NOT use ES module syntax (no import/export statements)
7. Start with require statements, end with module.exports, nothing else

OUTPUT STRUCTURE:
- Require statements at top
- Main code (functions/routes/logic)
- module.exports at bottom
- NO markdown, NO explanations, NO other files";

fn type_instructions(unit_type: UnitType) -> &'static str {
    match unit_type {
        UnitType::Controller => {
            "For Controllers (REST endpoints):
- Use: const express = require('express'); const router = express.Router();
- Define routes with: router.get('/path', async (req, res) => {...})
- Include error handling in each route
- End with: module.exports = router;
- Reference services as: const service = require('../services/ServiceName');"
        }
        UnitType::Service => {
            "For Services (business logic):
- Define async functions for each operation
- Use: const repository = require('../repositories/RepositoryName');
- Include try-catch for error handling
- End with: module.exports = { functionName1, functionName2, ... };"
        }
        UnitType::Dao => {
            "For DAOs/Repositories (data access):
- Use: const Model = require('../models/ModelName');
- Define async functions for CRUD operations
- Use Sequelize methods: findByPk, findAll, findOne, create, update, destroy
- End with: module.exports = { functionName1, functionName2, ... };"
        }
        UnitType::Model => {
            "For Models (entities):
- Use: const { DataTypes } = require('sequelize'); and a sequelize instance from '../db'
- Map every persistent field to a DataTypes attribute
- End with: module.exports = ModelName;"
        }
        UnitType::Other => "",
    }
}

/// Conversion prompt for one chunk. Multi-chunk units get the package,
/// imports and enclosing class header so each piece reads on its own.
pub fn conversion_prompt(chunk: &Chunk<'_>) -> String {
    let unit = chunk.unit;
    let type_name = unit.unit_type.as_str();
    let mut prompt = RULES.replace("{type}", type_name);

    let specific = type_instructions(unit.unit_type);
    if !specific.is_empty() {
        prompt.push_str("\n\n");
        prompt.push_str(specific);
    }

    let _ = write!(
        prompt,
        "\n\nJAVA {} {} TO CONVERT:",
        type_name.to_uppercase(),
        unit.name()
    );
    if chunk.total > 1 {
        let _ = write!(
            prompt,
            "\nThis is chunk {} of {}. Convert only this portion; the other \
             chunks are converted separately and merged.\n\nContext:\n{}",
            chunk.index + 1,
            chunk.total,
            chunk.context()
        );
    }
    let _ = write!(
        prompt,
        "\n\n{}\n\nGenerate clean, compilable Node.js code for THIS {type_name} ONLY. No other files.",
        chunk.text
    );
    prompt
}

/// JSON-mode prompt asking for a short description of the unit.
pub fn describe_prompt(chunk: &Chunk<'_>) -> String {
    let unit = chunk.unit;
    format!(
        "Analyze this Java {} class and provide structured information.
Return ONLY valid JSON with this exact structure (no markdown, no explanation):
{{
  \"description\": \"Brief description of the class purpose\",
  \"methods\": [
    {{
      \"name\": \"methodName\",
      \"signature\": \"public ReturnType methodName(params)\",
      \"description\": \"What the method does\",
      \"complexity\": \"Low|Medium|High\"
    }}
  ]
}}

Java code (chunk {} of {}):
{}
",
        unit.unit_type,
        chunk.index + 1,
        chunk.total,
        chunk.text
    )
}

/// Free-text prompt for a two or three sentence project overview.
pub fn overview_prompt(statistics: &Statistics, module_names: &[&str]) -> String {
    let count = |t: UnitType| statistics.by_type.get(&t).copied().unwrap_or(0);
    let names: Vec<&str> = module_names.iter().take(10).copied().collect();
    format!(
        "Based on this Java project structure, provide a concise overview (2-3 sentences):

Project has {} modules:
- {} Controllers
- {} Services
- {} DAOs
- {} Models

Module names: {}
",
        statistics.total_modules,
        count(UnitType::Controller),
        count(UnitType::Service),
        count(UnitType::Dao),
        count(UnitType::Model),
        names.join(", ")
    )
}
