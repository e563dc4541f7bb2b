use std::collections::BTreeSet;

use tracing::trace;

use crate::context::BinaryAnalysis;
use crate::error::SearchError;
use crate::ir::MethodRef;

/// Default number of caller layers examined by [`find_intersection`].
pub(crate) const MAX_SEARCH_DEPTH: usize = 3;

/// Walk callers upward from `base` and collect every method that is called
/// directly by `top`, in discovery order.
pub(crate) fn previous_methods(
    analysis: &dyn BinaryAnalysis,
    base: &MethodRef,
    top: &MethodRef,
) -> Vec<MethodRef> {
    let mut found = Vec::new();
    let mut visited = BTreeSet::new();
    find_previous_method(analysis, base, top, &mut found, &mut visited);
    found
}

pub(crate) fn find_previous_method(
    analysis: &dyn BinaryAnalysis,
    base: &MethodRef,
    top: &MethodRef,
    found: &mut Vec<MethodRef>,
    visited: &mut BTreeSet<MethodRef>,
) {
    if !visited.insert(base.clone()) {
        return;
    }
    let Some(callers) = analysis.upperfunc(&base.class_name, &base.method_name) else {
        return;
    };

    if callers.contains(top) {
        if !found.contains(base) {
            found.push(base.clone());
        }
        return;
    }
    for caller in &callers {
        if caller == base {
            continue;
        }
        find_previous_method(analysis, caller, top, found, visited);
    }
}

/// Search outward through callers for methods common to both lists.
///
/// Both lists are widened by one caller layer per step until they overlap or
/// `depth` passes `max_depth`. Empty inputs are a contract violation.
pub(crate) fn find_intersection(
    analysis: &dyn BinaryAnalysis,
    left: &BTreeSet<MethodRef>,
    right: &BTreeSet<MethodRef>,
    depth: usize,
    max_depth: usize,
) -> Result<Option<BTreeSet<MethodRef>>, SearchError> {
    if left.is_empty() || right.is_empty() {
        return Err(SearchError::EmptyCandidates {
            left: left.len(),
            right: right.len(),
        });
    }

    let common: BTreeSet<MethodRef> = left.intersection(right).cloned().collect();
    if !common.is_empty() {
        trace!(depth, count = common.len(), "found common callers");
        return Ok(Some(common));
    }

    let depth = depth + 1;
    if depth > max_depth {
        return Ok(None);
    }

    let next_left = widen(analysis, left);
    let next_right = widen(analysis, right);
    if next_left.len() == left.len() && next_right.len() == right.len() {
        // Neither frontier can grow, so later layers would test the same sets.
        return Ok(None);
    }
    find_intersection(analysis, &next_left, &next_right, depth, max_depth)
}

fn widen(analysis: &dyn BinaryAnalysis, methods: &BTreeSet<MethodRef>) -> BTreeSet<MethodRef> {
    let mut next = methods.clone();
    for method in methods {
        if let Some(callers) = analysis.upperfunc(&method.class_name, &method.method_name) {
            next.extend(callers);
        }
    }
    next
}
