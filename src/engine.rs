use std::collections::BTreeSet;
use std::fmt;

use anyhow::Result;
use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

use crate::callgraph::{MAX_SEARCH_DEPTH, find_intersection, previous_methods};
use crate::context::BinaryAnalysis;
use crate::ir::MethodRef;
use crate::parameter::check_parameter;
use crate::rules::{LEVEL_COUNT, Rule};
use crate::sequence::{SequenceMode, check_sequence};

/// Tunables for one evaluation pass.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub(crate) struct EngineConfig {
    pub(crate) max_depth: usize,
    pub(crate) sequence_mode: SequenceMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_depth: MAX_SEARCH_DEPTH,
            sequence_mode: SequenceMode::default(),
        }
    }
}

/// The five progressive checks, in evaluation order.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Level {
    Permission,
    ApiUsage,
    ApiCombination,
    Sequence,
    Parameter,
}

impl Level {
    pub(crate) const ALL: [Level; LEVEL_COUNT] = [
        Level::Permission,
        Level::ApiUsage,
        Level::ApiCombination,
        Level::Sequence,
        Level::Parameter,
    ];

    pub(crate) fn title(self) -> &'static str {
        match self {
            Level::Permission => "Permission Request",
            Level::ApiUsage => "Native API Usage",
            Level::ApiCombination => "Native API Combination",
            Level::Sequence => "Native API Sequence",
            Level::Parameter => "Native API Use Same Parameter",
        }
    }
}

/// Per-level outcome. Levels only pass in order.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(transparent)]
pub(crate) struct Checklist([bool; LEVEL_COUNT]);

impl Checklist {
    fn pass(&mut self, level: Level) {
        self.0[level as usize] = true;
    }

    pub(crate) fn passed(&self, level: Level) -> bool {
        self.0[level as usize]
    }

    pub(crate) fn passed_count(&self) -> usize {
        self.0.iter().filter(|passed| **passed).count()
    }

    /// Percentage of passed levels, 20 per level.
    pub(crate) fn confidence(&self) -> u32 {
        self.passed_count() as u32 * 20
    }
}

/// Common caller where the first API path is called before the second.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub(crate) struct CallPair {
    pub(crate) caller: MethodRef,
    pub(crate) first: MethodRef,
    pub(crate) second: MethodRef,
}

/// Level 4 and 5 findings for a single rule.
#[derive(Debug, Default)]
struct BehaviorEvidence {
    call_pairs: Vec<CallPair>,
    parameter_callers: Vec<MethodRef>,
}

/// Outcome of one rule against one binary.
#[derive(Clone, Debug, Serialize)]
pub(crate) struct EvaluationReport {
    pub(crate) rule: String,
    pub(crate) checklist: Checklist,
    pub(crate) confidence: u32,
    pub(crate) score: u32,
    pub(crate) weight: f64,
    pub(crate) sequence_callers: Vec<MethodRef>,
    pub(crate) parameter_callers: Vec<MethodRef>,
    pub(crate) call_pairs: Vec<CallPair>,
}

/// Runs rules against a read-only analysis.
pub(crate) struct RuleEngine<'a> {
    analysis: &'a dyn BinaryAnalysis,
    config: EngineConfig,
}

impl<'a> RuleEngine<'a> {
    pub(crate) fn new(analysis: &'a dyn BinaryAnalysis, config: EngineConfig) -> Self {
        Self { analysis, config }
    }

    pub(crate) fn evaluate(&self, rule: &Rule) -> Result<EvaluationReport> {
        let mut checklist = Checklist::default();
        let mut evidence = BehaviorEvidence::default();
        self.run_levels(rule, &mut checklist, &mut evidence)?;

        let passed = checklist.passed_count();
        let report = EvaluationReport {
            rule: rule.label(),
            checklist,
            confidence: checklist.confidence(),
            score: rule.score,
            weight: rule.weight(passed),
            sequence_callers: evidence
                .call_pairs
                .iter()
                .map(|pair| pair.caller.clone())
                .collect(),
            parameter_callers: evidence.parameter_callers,
            call_pairs: evidence.call_pairs,
        };
        debug!(
            rule = %report.rule,
            confidence = report.confidence,
            weight = report.weight,
            "rule evaluated"
        );
        Ok(report)
    }

    fn run_levels(
        &self,
        rule: &Rule,
        checklist: &mut Checklist,
        evidence: &mut BehaviorEvidence,
    ) -> Result<()> {
        let granted = self.analysis.permissions();
        let missing: Vec<&String> = rule
            .permissions
            .iter()
            .filter(|permission| !granted.contains(*permission))
            .collect();
        if !missing.is_empty() {
            debug!(rule = %rule.crime, ?missing, "permission level failed");
            return Ok(());
        }
        checklist.pass(Level::Permission);

        let [first, second] = &rule.apis;
        if self
            .analysis
            .find_method(&first.class_name, &first.method_name)
            .is_none()
        {
            debug!(rule = %rule.crime, "first API not present");
            return Ok(());
        }
        checklist.pass(Level::ApiUsage);

        if self
            .analysis
            .find_method(&second.class_name, &second.method_name)
            .is_none()
        {
            debug!(rule = %rule.crime, "second API not present");
            return Ok(());
        }
        checklist.pass(Level::ApiCombination);

        let first_api = MethodRef::new(first.class_name.clone(), first.method_name.clone());
        let second_api = MethodRef::new(second.class_name.clone(), second.method_name.clone());
        let first_callers = self.callers(&first_api);
        let second_callers = self.callers(&second_api);
        if first_callers.is_empty() || second_callers.is_empty() {
            debug!(rule = %rule.crime, "no callers to search");
            return Ok(());
        }

        let Some(common_callers) = find_intersection(
            self.analysis,
            &first_callers,
            &second_callers,
            1,
            self.config.max_depth,
        )?
        else {
            debug!(rule = %rule.crime, "no common caller within depth");
            return Ok(());
        };

        for caller in common_callers {
            let Some(first_step) = previous_methods(self.analysis, &first_api, &caller)
                .into_iter()
                .next()
            else {
                continue;
            };
            let Some(second_step) = previous_methods(self.analysis, &second_api, &caller)
                .into_iter()
                .next()
            else {
                continue;
            };

            if !check_sequence(
                self.analysis,
                &caller,
                &first_step,
                &second_step,
                self.config.sequence_mode,
            ) {
                continue;
            }
            checklist.pass(Level::Sequence);

            if check_parameter(
                self.analysis,
                &caller,
                &first_step.method_name,
                &second_step.method_name,
            ) {
                checklist.pass(Level::Parameter);
                evidence.parameter_callers.push(caller.clone());
            }
            evidence.call_pairs.push(CallPair {
                caller,
                first: first_step,
                second: second_step,
            });
        }
        Ok(())
    }

    fn callers(&self, method: &MethodRef) -> BTreeSet<MethodRef> {
        self.analysis
            .upperfunc(&method.class_name, &method.method_name)
            .unwrap_or_default()
    }
}

/// Coarse threat grade derived from the run totals.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub(crate) enum RiskLevel {
    Low,
    Moderate,
    High,
}

impl RiskLevel {
    pub(crate) fn from_totals(total_score: u64, total_weight: f64) -> Self {
        let score = total_score as f64;
        if total_weight <= score / 4.0 {
            RiskLevel::Low
        } else if total_weight <= score / 2.0 {
            RiskLevel::Moderate
        } else {
            RiskLevel::High
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RiskLevel::Low => "Low Risk",
            RiskLevel::Moderate => "Moderate Risk",
            RiskLevel::High => "High Risk",
        };
        f.write_str(text)
    }
}

/// Reports and running totals for one binary's rule set.
#[derive(Debug, Default, Serialize)]
pub(crate) struct ScoreBoard {
    pub(crate) reports: Vec<EvaluationReport>,
    pub(crate) total_score: u64,
    pub(crate) total_weight: f64,
}

impl ScoreBoard {
    /// Every rule adds its declared score; only the weight depends on confidence.
    pub(crate) fn record(&mut self, report: EvaluationReport) {
        self.total_score += u64::from(report.score);
        self.total_weight += report.weight;
        self.reports.push(report);
    }

    pub(crate) fn risk_level(&self) -> RiskLevel {
        RiskLevel::from_totals(self.total_score, self.total_weight)
    }
}

/// Evaluate every rule, optionally in parallel, keeping rule order in the board.
pub(crate) fn evaluate_rules(
    engine: &RuleEngine<'_>,
    rules: &[Rule],
    parallel: bool,
) -> Result<ScoreBoard> {
    let reports: Vec<EvaluationReport> = if parallel {
        rules
            .par_iter()
            .map(|rule| engine.evaluate(rule))
            .collect::<Result<_>>()?
    } else {
        rules
            .iter()
            .map(|rule| engine.evaluate(rule))
            .collect::<Result<_>>()?
    };

    let mut board = ScoreBoard::default();
    for report in reports {
        board.record(report);
    }
    Ok(board)
}
