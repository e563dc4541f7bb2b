use tracing::trace;

use crate::context::BinaryAnalysis;
use crate::eval::evaluate;
use crate::ir::MethodRef;

/// Check whether some value in one body of `common` is handled by both named
/// calls. Overloads are evaluated separately.
pub(crate) fn check_parameter(
    analysis: &dyn BinaryAnalysis,
    common: &MethodRef,
    first_name: &str,
    second_name: &str,
) -> bool {
    let bodies = analysis.method_bytecode(&common.class_name, &common.method_name);
    if bodies.is_empty() {
        trace!(method = %common, "no bytecode for parameter check");
        return false;
    }

    for (descriptor, instructions) in bodies {
        let table = evaluate(instructions);
        let Some(shared) = table
            .values()
            .iter()
            .find(|value| value.used_by_any(first_name) && value.used_by_any(second_name))
        else {
            continue;
        };
        trace!(
            method = %common,
            descriptor,
            origin = ?shared.origin,
            registers = ?shared.registers,
            "value shared by both calls"
        );
        return true;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::build_context;
    use crate::context::test_support::method_with;

    const QUERY: &str = "Landroid/content/ContentResolver;->query(Landroid/net/Uri;)Landroid/database/Cursor;";
    const SEND: &str = "Landroid/telephony/SmsManager;->sendTextMessage(Landroid/database/Cursor;)V";

    fn common() -> MethodRef {
        MethodRef::new("Lcom/example/App;", "sendMessage")
    }

    #[test]
    fn shared_cursor_correlates_both_calls() {
        let context = build_context(
            vec![method_with(
                "Lcom/example/App;",
                "sendMessage",
                &[
                    ("invoke-virtual", &["v1", "v2"], Some(QUERY)),
                    ("move-result-object", &["v3"], None),
                    ("invoke-virtual", &["v4", "v3"], Some(SEND)),
                ],
            )],
            Vec::new(),
        );

        assert!(check_parameter(&context, &common(), "query", "sendTextMessage"));
    }

    #[test]
    fn unrelated_values_do_not_correlate() {
        let context = build_context(
            vec![method_with(
                "Lcom/example/App;",
                "sendMessage",
                &[
                    ("new-instance", &["v1"], Some("Landroid/net/Uri;")),
                    ("invoke-virtual", &["v2", "v1"], Some(QUERY)),
                    ("new-instance", &["v3"], Some("Ljava/lang/Object;")),
                    ("invoke-virtual", &["v4", "v3"], Some(SEND)),
                ],
            )],
            Vec::new(),
        );

        assert!(!check_parameter(&context, &common(), "query", "sendTextMessage"));
    }

    #[test]
    fn reassigned_register_does_not_correlate() {
        let context = build_context(
            vec![method_with(
                "Lcom/example/App;",
                "sendMessage",
                &[
                    ("new-instance", &["v1"], Some("Landroid/net/Uri;")),
                    ("invoke-virtual", &["v0", "v1"], Some(QUERY)),
                    ("move-object", &["v1", "p1"], None),
                    ("invoke-virtual", &["v2", "v1"], Some(SEND)),
                ],
            )],
            Vec::new(),
        );

        assert!(!check_parameter(&context, &common(), "query", "sendTextMessage"));
    }

    #[test]
    fn overloads_are_evaluated_separately() {
        let first = method_with(
            "Lcom/example/App;",
            "sendMessage",
            &[
                ("new-instance", &["v1"], Some("Landroid/net/Uri;")),
                ("invoke-virtual", &["v0", "v1"], Some(QUERY)),
            ],
        );
        let mut second = method_with(
            "Lcom/example/App;",
            "sendMessage",
            &[("invoke-virtual", &["v2", "v1"], Some(SEND))],
        );
        second.descriptor = "(Ljava/lang/String;)V".to_string();
        let context = build_context(vec![first, second], Vec::new());

        assert!(!check_parameter(&context, &common(), "query", "sendTextMessage"));
    }

    #[test]
    fn shared_value_in_later_overload_correlates() {
        let first = method_with(
            "Lcom/example/App;",
            "sendMessage",
            &[("invoke-virtual", &["v0"], Some(QUERY))],
        );
        let mut second = method_with(
            "Lcom/example/App;",
            "sendMessage",
            &[
                ("invoke-virtual", &["v1", "v2"], Some(QUERY)),
                ("move-result-object", &["v3"], None),
                ("invoke-virtual", &["v4", "v3"], Some(SEND)),
            ],
        );
        second.descriptor = "(I)V".to_string();
        let context = build_context(vec![first, second], Vec::new());

        assert!(check_parameter(&context, &common(), "query", "sendTextMessage"));
    }

    #[test]
    fn missing_bytecode_does_not_correlate() {
        let context = build_context(Vec::new(), Vec::new());

        assert!(!check_parameter(&context, &common(), "query", "sendTextMessage"));
    }
}
