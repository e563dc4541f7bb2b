use serde::Serialize;

use crate::context::BinaryAnalysis;
use crate::ir::{MethodRef, XRef};

/// How "first target before second target" is decided when either target is
/// called more than once.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub(crate) enum SequenceMode {
    /// The earliest first-target call precedes the latest second-target call.
    #[default]
    Loose,
    /// Every first-target call precedes every second-target call.
    Strict,
}

/// Check whether `common` calls `first` before `second`.
pub(crate) fn check_sequence(
    analysis: &dyn BinaryAnalysis,
    common: &MethodRef,
    first: &MethodRef,
    second: &MethodRef,
    mode: SequenceMode,
) -> bool {
    let Some(handles) = analysis.find_method(&common.class_name, &common.method_name) else {
        return false;
    };
    let xrefs: Vec<XRef> = handles.iter().flat_map(|handle| handle.xref_to()).collect();
    calls_in_order(&xrefs, &first.method_name, &second.method_name, mode)
}

/// Decide call order from call-site records, matching callees by method name.
pub(crate) fn calls_in_order(
    xrefs: &[XRef],
    first_name: &str,
    second_name: &str,
    mode: SequenceMode,
) -> bool {
    let mut table: Vec<(&str, u32)> = xrefs
        .iter()
        .map(|xref| (xref.callee.method_name.as_str(), xref.position))
        .filter(|(name, _)| *name == first_name || *name == second_name)
        .collect();
    if table.len() < 2 {
        return false;
    }
    table.sort_by_key(|(_, position)| *position);

    let first_positions = || {
        table
            .iter()
            .filter(|(name, _)| *name == first_name)
            .map(|(_, position)| *position)
    };
    let second_positions = || {
        table
            .iter()
            .filter(|(name, _)| *name == second_name)
            .map(|(_, position)| *position)
    };

    let (first_at, second_at) = match mode {
        SequenceMode::Loose => (first_positions().next(), second_positions().last()),
        SequenceMode::Strict => (first_positions().last(), second_positions().next()),
    };
    match (first_at, second_at) {
        (Some(first_at), Some(second_at)) => second_at > first_at,
        _ => false,
    }
}
