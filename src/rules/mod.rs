use std::path::PathBuf;

use anyhow::{Result, bail};
use serde::Deserialize;

pub(crate) mod load;

/// Number of progressive checks a rule goes through.
pub(crate) const LEVEL_COUNT: usize = 5;

/// One `(class, method)` API a rule looks for.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub(crate) struct ApiTarget {
    #[serde(rename = "class")]
    pub(crate) class_name: String,
    #[serde(rename = "method")]
    pub(crate) method_name: String,
}

/// Rule file contents as written on disk.
#[derive(Debug, Deserialize)]
struct RuleDocument {
    crime: String,
    #[serde(rename = "x1_permission", default)]
    permissions: Vec<String>,
    #[serde(rename = "x2n3n4_comb")]
    apis: Vec<ApiTarget>,
    #[serde(rename = "yscore")]
    score: u32,
    #[serde(default)]
    weights: Option<Vec<f64>>,
}

/// Behavioral pattern evaluated against one binary.
#[derive(Clone, Debug)]
pub(crate) struct Rule {
    pub(crate) crime: String,
    pub(crate) permissions: Vec<String>,
    pub(crate) apis: [ApiTarget; 2],
    pub(crate) score: u32,
    weights: [f64; LEVEL_COUNT + 1],
    pub(crate) source: Option<PathBuf>,
}

impl Rule {
    pub(crate) fn new(
        crime: impl Into<String>,
        permissions: Vec<String>,
        apis: [ApiTarget; 2],
        score: u32,
    ) -> Self {
        Self {
            crime: crime.into(),
            permissions,
            apis,
            score,
            weights: default_weights(score),
            source: None,
        }
    }

    /// Weight earned when `passed` levels succeeded.
    pub(crate) fn weight(&self, passed: usize) -> f64 {
        self.weights[passed.min(LEVEL_COUNT)]
    }

    /// Display label: the crime description, or the file name when it is blank.
    pub(crate) fn label(&self) -> String {
        if !self.crime.trim().is_empty() {
            return self.crime.clone();
        }
        self.source
            .as_ref()
            .and_then(|path| path.file_name())
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

impl TryFrom<RuleDocument> for Rule {
    type Error = anyhow::Error;

    fn try_from(document: RuleDocument) -> Result<Self> {
        let apis: [ApiTarget; 2] = match <[ApiTarget; 2]>::try_from(document.apis) {
            Ok(apis) => apis,
            Err(apis) => bail!("rule needs exactly two API targets, found {}", apis.len()),
        };
        let mut rule = Rule::new(document.crime, document.permissions, apis, document.score);
        if let Some(weights) = document.weights {
            rule.weights = match <[f64; LEVEL_COUNT + 1]>::try_from(weights) {
                Ok(weights) => weights,
                Err(weights) => bail!(
                    "weight table needs {} entries, found {}",
                    LEVEL_COUNT + 1,
                    weights.len()
                ),
            };
        }
        Ok(rule)
    }
}

/// Each passed level doubles the weight; all five levels earn the full score.
fn default_weights(score: u32) -> [f64; LEVEL_COUNT + 1] {
    let mut weights = [0.0; LEVEL_COUNT + 1];
    for (passed, weight) in weights.iter_mut().enumerate().skip(1) {
        *weight = f64::from(score) * f64::from(1u32 << (passed - 1)) / 16.0;
    }
    weights
}
