use std::fmt;

use serde::Serialize;

/// Identifies a method by its declaring class and name.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
pub(crate) struct MethodRef {
    #[serde(rename = "class")]
    pub(crate) class_name: String,
    #[serde(rename = "method")]
    pub(crate) method_name: String,
}

impl MethodRef {
    pub(crate) fn new(class_name: impl Into<String>, method_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            method_name: method_name.into(),
        }
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.class_name, self.method_name)
    }
}

/// Class name with the descriptor terminator removed, used as a lookup key.
pub(crate) fn class_key(class_name: &str) -> &str {
    class_name.strip_suffix(';').unwrap_or(class_name)
}

/// Register operand such as `v4` or `p0`.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub(crate) struct Register(pub(crate) String);

impl Register {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

/// Method reference operand of an invoke instruction.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct CallTarget {
    pub(crate) owner: String,
    pub(crate) name: String,
    pub(crate) descriptor: String,
    pub(crate) text: String,
}

impl CallTarget {
    /// Parse `Lpkg/Cls;->name(args)ret`. Returns `None` for anything else.
    pub(crate) fn parse(text: &str) -> Option<Self> {
        let (owner, rest) = text.split_once("->")?;
        let (name, descriptor) = match rest.find('(') {
            Some(index) => rest.split_at(index),
            None => (rest, ""),
        };
        if owner.is_empty() || name.is_empty() {
            return None;
        }
        Some(Self {
            owner: owner.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            text: text.to_string(),
        })
    }

    pub(crate) fn method_ref(&self) -> MethodRef {
        MethodRef::new(self.owner.clone(), self.name.clone())
    }
}

/// Decoded Dalvik instruction.
#[derive(Clone, Debug)]
pub(crate) struct Instruction {
    pub(crate) offset: u32,
    pub(crate) mnemonic: String,
    pub(crate) registers: Vec<Register>,
    pub(crate) parameter: Option<String>,
    pub(crate) kind: InstructionKind,
}

/// Value-flow category of an instruction.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum InstructionKind {
    NewValue { dest: Register },
    Move { dest: Register, src: Register },
    MoveResult { dest: Register },
    Invoke {
        arguments: Vec<Register>,
        target: CallTarget,
    },
    Other,
}

impl Instruction {
    pub(crate) fn decode(
        offset: u32,
        mnemonic: impl Into<String>,
        registers: Vec<Register>,
        parameter: Option<String>,
    ) -> Self {
        let mnemonic = mnemonic.into();
        let kind = classify(&mnemonic, &registers, parameter.as_deref());
        Self {
            offset,
            mnemonic,
            registers,
            parameter,
            kind,
        }
    }

    pub(crate) fn call_target(&self) -> Option<&CallTarget> {
        match &self.kind {
            InstructionKind::Invoke { target, .. } => Some(target),
            _ => None,
        }
    }

    /// Destination of an untracked instruction that still writes a register,
    /// such as arithmetic, conversions, `array-length` or `instance-of`.
    pub(crate) fn overwritten_register(&self) -> Option<&Register> {
        if !matches!(self.kind, InstructionKind::Other) {
            return None;
        }
        let writes = WRITING_PREFIXES
            .iter()
            .any(|prefix| self.mnemonic.starts_with(prefix))
            || self.mnemonic.contains("-to-");
        if writes { self.registers.first() } else { None }
    }
}

const WRITING_PREFIXES: &[&str] = &[
    "instance-of",
    "array-length",
    "cmp",
    "neg-",
    "not-",
    "add-",
    "sub-",
    "rsub-",
    "mul-",
    "div-",
    "rem-",
    "and-",
    "or-",
    "xor-",
    "shl-",
    "shr-",
    "ushr-",
];

fn classify(mnemonic: &str, registers: &[Register], parameter: Option<&str>) -> InstructionKind {
    let first = registers.first().cloned();
    if mnemonic.starts_with("invoke-") {
        return match parameter.and_then(CallTarget::parse) {
            Some(target) => InstructionKind::Invoke {
                arguments: registers.to_vec(),
                target,
            },
            None => InstructionKind::Other,
        };
    }
    if mnemonic.starts_with("move-result") {
        return match first {
            Some(dest) => InstructionKind::MoveResult { dest },
            None => InstructionKind::Other,
        };
    }
    if mnemonic == "move-exception" || produces_value(mnemonic) {
        return match first {
            Some(dest) => InstructionKind::NewValue { dest },
            None => InstructionKind::Other,
        };
    }
    if mnemonic.starts_with("move") {
        return match registers {
            [dest, src, ..] => InstructionKind::Move {
                dest: dest.clone(),
                src: src.clone(),
            },
            _ => InstructionKind::Other,
        };
    }
    InstructionKind::Other
}

fn produces_value(mnemonic: &str) -> bool {
    matches!(mnemonic, "new-instance" | "new-array")
        || mnemonic.starts_with("const")
        || mnemonic.starts_with("iget")
        || mnemonic.starts_with("sget")
        || mnemonic.starts_with("aget")
}

/// Outgoing call site recorded for a method body.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct XRef {
    pub(crate) callee: MethodRef,
    pub(crate) position: u32,
}

/// A method body known to the analysis, internal or external.
#[derive(Clone, Debug)]
pub(crate) struct MethodHandle {
    pub(crate) method: MethodRef,
    pub(crate) descriptor: String,
    pub(crate) instructions: Vec<Instruction>,
    pub(crate) is_external: bool,
}

impl MethodHandle {
    /// Call sites of this method in instruction order.
    pub(crate) fn xref_to(&self) -> Vec<XRef> {
        self.instructions
            .iter()
            .filter_map(|inst| {
                inst.call_target().map(|target| XRef {
                    callee: target.method_ref(),
                    position: inst.offset,
                })
            })
            .collect()
    }
}
