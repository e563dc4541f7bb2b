use serde::Serialize;
use serde_json::json;
use serde_sarif::sarif::{
    Invocation, Location, LogicalLocation, Message, Result as SarifResult, Run, SCHEMA_URL, Sarif,
    Tool, ToolComponent,
};

use crate::engine::{EngineConfig, EvaluationReport, Level, RiskLevel, ScoreBoard};
use crate::ir::MethodRef;

/// JSON rendering of a finished run.
#[derive(Serialize)]
pub(crate) struct JsonReport<'a> {
    pub(crate) config: EngineConfig,
    pub(crate) reports: &'a [EvaluationReport],
    pub(crate) total_score: u64,
    pub(crate) total_weight: f64,
    pub(crate) risk: RiskLevel,
}

pub(crate) fn build_json(board: &ScoreBoard, config: EngineConfig) -> JsonReport<'_> {
    JsonReport {
        config,
        reports: &board.reports,
        total_score: board.total_score,
        total_weight: board.total_weight,
        risk: board.risk_level(),
    }
}

pub(crate) fn build_invocation() -> Invocation {
    let arguments: Vec<String> = std::env::args().collect();
    let command_line = arguments.join(" ");

    Invocation::builder()
        .execution_successful(true)
        .arguments(arguments)
        .command_line(command_line)
        .build()
}

/// One SARIF result per rule that passed at least one level.
pub(crate) fn build_sarif(board: &ScoreBoard, invocation: Invocation) -> Sarif {
    let driver = ToolComponent::builder().name("dexsieve").build();
    let tool = Tool {
        driver,
        extensions: None,
        properties: None,
    };
    let results: Vec<SarifResult> = board
        .reports
        .iter()
        .filter(|report| report.confidence > 0)
        .map(rule_result)
        .collect();
    let run = Run::builder()
        .tool(tool)
        .invocations(vec![invocation])
        .results(results)
        .build();

    Sarif::builder()
        .schema(SCHEMA_URL)
        .runs(vec![run])
        .version(json!("2.1.0"))
        .build()
}

fn rule_result(report: &EvaluationReport) -> SarifResult {
    let passed: Vec<&str> = Level::ALL
        .iter()
        .filter(|level| report.checklist.passed(**level))
        .map(|level| level.title())
        .collect();
    let message = result_message(format!(
        "{}: confidence {}%, score {}, weight {} ({})",
        report.rule,
        report.confidence,
        report.score,
        report.weight,
        passed.join(", ")
    ));
    let locations: Vec<Location> = report
        .sequence_callers
        .iter()
        .map(method_location)
        .collect();
    SarifResult::builder()
        .message(message)
        .locations(locations)
        .build()
}

pub(crate) fn method_location(method: &MethodRef) -> Location {
    let logical = LogicalLocation::builder()
        .name(method.to_string())
        .kind("function")
        .build();
    Location::builder().logical_locations(vec![logical]).build()
}

fn result_message(text: impl Into<String>) -> Message {
    Message::builder().text(text.into()).build()
}
