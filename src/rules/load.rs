use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use jsonschema::JSONSchema;
use serde_json::Value;
use tracing::debug;

use crate::rules::{Rule, RuleDocument};

const RULE_SCHEMA: &str = r#"{
  "$schema": "http://json-schema.org/draft-07/schema#",
  "type": "object",
  "required": ["crime", "x2n3n4_comb", "yscore"],
  "properties": {
    "crime": { "type": "string" },
    "x1_permission": { "type": "array", "items": { "type": "string" } },
    "x2n3n4_comb": {
      "type": "array",
      "minItems": 2,
      "maxItems": 2,
      "items": {
        "type": "object",
        "required": ["class", "method"],
        "properties": {
          "class": { "type": "string", "minLength": 1 },
          "method": { "type": "string", "minLength": 1 }
        }
      }
    },
    "yscore": { "type": "integer", "minimum": 0 },
    "weights": {
      "type": "array",
      "minItems": 6,
      "maxItems": 6,
      "items": { "type": "number", "minimum": 0 }
    }
  }
}"#;

/// Load one rule file, or every `.json` rule under a directory in path order.
pub(crate) fn load_rules(path: &Path) -> Result<Vec<Rule>> {
    let schema: Value = serde_json::from_str(RULE_SCHEMA).context("parse rule schema")?;
    let validator = JSONSchema::compile(&schema)
        .map_err(|error| anyhow!("failed to compile rule schema: {error}"))?;

    let mut files = Vec::new();
    if path.is_dir() {
        collect_rule_files(path, &mut files)?;
    } else {
        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");
        if extension != "json" {
            anyhow::bail!("unsupported rule file: {}", path.display());
        }
        files.push(path.to_path_buf());
    }

    let mut rules = Vec::with_capacity(files.len());
    for file in files {
        rules.push(load_rule_file(&file, &validator)?);
    }
    debug!(count = rules.len(), path = %path.display(), "loaded rules");
    Ok(rules)
}

fn collect_rule_files(path: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(path)
        .with_context(|| format!("failed to read directory {}", path.display()))?
    {
        let entry = entry.with_context(|| format!("failed to read entry under {}", path.display()))?;
        entries.push(entry.path());
    }

    // Keep deterministic ordering regardless of directory listing order.
    entries.sort();

    for entry in entries {
        if entry.is_dir() {
            collect_rule_files(&entry, files)?;
        } else if entry.extension().and_then(|ext| ext.to_str()) == Some("json") {
            files.push(entry);
        }
    }
    Ok(())
}

fn load_rule_file(path: &Path, validator: &JSONSchema) -> Result<Rule> {
    let data = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let value: Value = serde_json::from_slice(&data)
        .with_context(|| format!("failed to parse {}", path.display()))?;

    if let Err(errors) = validator.validate(&value) {
        let messages: Vec<String> = errors.map(|error| error.to_string()).collect();
        anyhow::bail!("invalid rule {}: {}", path.display(), messages.join("; "));
    }

    let document: RuleDocument = serde_json::from_value(value)
        .with_context(|| format!("failed to decode {}", path.display()))?;
    let mut rule =
        Rule::try_from(document).with_context(|| format!("invalid rule {}", path.display()))?;
    rule.source = Some(path.to_path_buf());
    Ok(rule)
}
