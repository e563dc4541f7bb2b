use std::collections::HashMap;

use crate::ir::{CallTarget, Instruction, InstructionKind, Register};

/// Value tracked while simulating one method body.
#[derive(Clone, Debug, Default)]
pub(crate) struct SymbolicValue {
    /// Registers that held this value, in binding order.
    pub(crate) registers: Vec<Register>,
    /// Literal or type operand of the producing instruction, if any.
    pub(crate) origin: Option<String>,
    /// Invocation targets that produced or consumed this value.
    pub(crate) used_by: Vec<String>,
}

impl SymbolicValue {
    pub(crate) fn used_by_any(&self, fragment: &str) -> bool {
        self.used_by.iter().any(|target| target.contains(fragment))
    }
}

/// Values produced by one evaluation, in creation order.
#[derive(Debug, Default)]
pub(crate) struct ValueTable {
    values: Vec<SymbolicValue>,
    registers: HashMap<Register, usize>,
}

impl ValueTable {
    pub(crate) fn values(&self) -> &[SymbolicValue] {
        &self.values
    }

    fn bind_new(&mut self, dest: &Register, origin: Option<String>, used_by: Vec<String>) {
        let index = self.values.len();
        self.values.push(SymbolicValue {
            registers: vec![dest.clone()],
            origin,
            used_by,
        });
        self.registers.insert(dest.clone(), index);
    }
}

/// Simulate `instructions` and record which invocations touch each value.
pub(crate) fn evaluate<'a, I>(instructions: I) -> ValueTable
where
    I: IntoIterator<Item = &'a Instruction>,
{
    let mut table = ValueTable::default();
    let mut pending_result: Option<&CallTarget> = None;

    for inst in instructions {
        let last_call = pending_result.take();
        match &inst.kind {
            InstructionKind::NewValue { dest } => {
                table.bind_new(dest, inst.parameter.clone(), Vec::new());
            }
            InstructionKind::Move { dest, src } => {
                let Some(index) = table.registers.get(src).copied() else {
                    table.registers.remove(dest);
                    continue;
                };
                table.registers.insert(dest.clone(), index);
                table.values[index].registers.push(dest.clone());
            }
            InstructionKind::MoveResult { dest } => match last_call {
                Some(target) => table.bind_new(dest, None, vec![target.text.clone()]),
                None => {
                    table.registers.remove(dest);
                }
            },
            InstructionKind::Invoke { arguments, target } => {
                let mut touched: Vec<usize> = Vec::new();
                for register in arguments {
                    if let Some(index) = table.registers.get(register).copied() {
                        if !touched.contains(&index) {
                            touched.push(index);
                        }
                    }
                }
                for index in touched {
                    table.values[index].used_by.push(target.text.clone());
                }
                pending_result = Some(target);
            }
            InstructionKind::Other => {
                if let Some(dest) = inst.overwritten_register() {
                    table.registers.remove(dest);
                }
            }
        }
    }

    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_support::method_with;

    fn lookup<'t>(table: &'t ValueTable, register: &str) -> Option<&'t SymbolicValue> {
        table
            .registers
            .get(&Register::new(register))
            .map(|index| &table.values[*index])
    }

    const QUERY: &str = "Landroid/content/ContentResolver;->query(Landroid/net/Uri;)Landroid/database/Cursor;";
    const SEND: &str = "Landroid/telephony/SmsManager;->sendTextMessage(Ljava/lang/Object;)V";

    #[test]
    fn allocated_value_collects_every_invocation() {
        let method = method_with(
            "Lcom/example/App;",
            "run",
            &[
                ("new-instance", &["v0"], Some("Lcom/example/Helper;")),
                ("invoke-direct", &["v0"], Some("Lcom/example/Helper;-><init>()V")),
                ("invoke-virtual", &["v0"], Some("Lcom/example/Helper;->send()V")),
            ],
        );

        let table = evaluate(&method.instructions);

        assert_eq!(1, table.values().len());
        let value = &table.values()[0];
        assert_eq!(Some("Lcom/example/Helper;"), value.origin.as_deref());
        assert_eq!(2, value.used_by.len());
        assert!(value.used_by_any("<init>"));
        assert!(value.used_by_any("send"));
    }

    #[test]
    fn unused_value_has_empty_provenance() {
        let method = method_with(
            "Lcom/example/App;",
            "run",
            &[
                ("const-string", &["v1"], Some("hello")),
                ("new-instance", &["v0"], Some("Lcom/example/Helper;")),
                ("invoke-virtual", &["v0"], Some("Lcom/example/Helper;->send()V")),
            ],
        );

        let table = evaluate(&method.instructions);

        let constant = lookup(&table, "v1").expect("const value");
        assert!(constant.used_by.is_empty());
    }

    #[test]
    fn moved_value_keeps_provenance_across_registers() {
        let method = method_with(
            "Lcom/example/App;",
            "run",
            &[
                ("new-instance", &["v0"], Some("Lcom/example/Helper;")),
                ("move-object", &["v3", "v0"], None),
                ("invoke-virtual", &["v3"], Some("Lcom/example/Helper;->send()V")),
            ],
        );

        let table = evaluate(&method.instructions);

        assert_eq!(1, table.values().len());
        let value = lookup(&table, "v0").expect("first register");
        assert_eq!(vec![Register::new("v0"), Register::new("v3")], value.registers);
        assert!(value.used_by_any("send"));
    }

    #[test]
    fn read_before_write_is_ignored() {
        let method = method_with(
            "Lcom/example/App;",
            "run",
            &[
                ("move-object", &["v1", "v0"], None),
                ("invoke-static", &["v0", "v1"], Some("Lcom/example/Util;->use(Ljava/lang/Object;)V")),
            ],
        );

        let table = evaluate(&method.instructions);

        assert!(table.values().is_empty());
        assert!(lookup(&table, "v1").is_none());
    }

    #[test]
    fn move_from_untracked_register_drops_old_binding() {
        let method = method_with(
            "Lcom/example/App;",
            "run",
            &[
                ("new-instance", &["v1"], Some("Lcom/example/Helper;")),
                ("invoke-static", &["v1"], Some("Lcom/example/Util;->first(Ljava/lang/Object;)V")),
                ("move-object", &["v1", "p1"], None),
                ("invoke-static", &["v1"], Some("Lcom/example/Util;->second(Ljava/lang/Object;)V")),
            ],
        );

        let table = evaluate(&method.instructions);

        assert_eq!(1, table.values().len());
        let helper = &table.values()[0];
        assert!(helper.used_by_any("first"));
        assert!(!helper.used_by_any("second"));
        assert!(lookup(&table, "v1").is_none());
    }

    #[test]
    fn move_result_without_invocation_drops_old_binding() {
        let method = method_with(
            "Lcom/example/App;",
            "run",
            &[
                ("new-instance", &["v0"], Some("Lcom/example/Helper;")),
                ("invoke-static", &["v0"], Some("Lcom/example/Util;->first(Ljava/lang/Object;)V")),
                ("filled-new-array", &["v1", "v2"], Some("[I")),
                ("move-result-object", &["v0"], None),
                ("invoke-static", &["v0"], Some("Lcom/example/Util;->second(Ljava/lang/Object;)V")),
            ],
        );

        let table = evaluate(&method.instructions);

        let helper = &table.values()[0];
        assert_eq!(Some("Lcom/example/Helper;"), helper.origin.as_deref());
        assert_eq!(1, helper.used_by.len());
        assert!(helper.used_by_any("first"));
        assert!(lookup(&table, "v0").is_none());
    }

    #[test]
    fn untracked_write_drops_old_binding() {
        let method = method_with(
            "Lcom/example/App;",
            "run",
            &[
                ("new-instance", &["v1"], Some("Lcom/example/Helper;")),
                ("const/4", &["v0"], Some("1")),
                ("array-length", &["v1", "v3"], None),
                ("invoke-static", &["v1"], Some("Lcom/example/Util;->second(I)V")),
            ],
        );

        let table = evaluate(&method.instructions);

        let helper = &table.values()[0];
        assert!(helper.used_by.is_empty());
        assert!(lookup(&table, "v1").is_none());
    }

    #[test]
    fn returned_value_records_producer_and_consumer() {
        let method = method_with(
            "Lcom/example/App;",
            "sendMessage",
            &[
                ("invoke-virtual", &["v2", "v3"], Some(QUERY)),
                ("move-result-object", &["v4"], None),
                ("invoke-virtual", &["v5", "v4"], Some(SEND)),
            ],
        );

        let table = evaluate(&method.instructions);

        let cursor = lookup(&table, "v4").expect("cursor value");
        assert_eq!(vec![QUERY.to_string(), SEND.to_string()], cursor.used_by);
    }

    #[test]
    fn move_result_without_invocation_is_ignored() {
        let method = method_with(
            "Lcom/example/App;",
            "run",
            &[
                ("invoke-static", &[], Some("Lcom/example/Util;->make()Ljava/lang/Object;")),
                ("nop", &[], None),
                ("move-result-object", &["v0"], None),
            ],
        );

        let table = evaluate(&method.instructions);

        assert!(table.values().is_empty());
    }

    #[test]
    fn same_value_in_two_arguments_is_recorded_once() {
        let method = method_with(
            "Lcom/example/App;",
            "run",
            &[
                ("new-instance", &["v0"], Some("Lcom/example/Helper;")),
                ("move-object", &["v1", "v0"], None),
                ("invoke-static", &["v0", "v1"], Some("Lcom/example/Util;->pair(Ljava/lang/Object;Ljava/lang/Object;)V")),
            ],
        );

        let table = evaluate(&method.instructions);

        assert_eq!(1, table.values()[0].used_by.len());
    }
}
