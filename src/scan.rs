use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::context::{AnalysisContext, build_context};
use crate::ir::{Instruction, MethodHandle, MethodRef, Register};

/// Disassembled binary as written by the disassembler.
#[derive(Debug, Deserialize)]
struct SnapshotDocument {
    #[serde(default)]
    permissions: Vec<String>,
    #[serde(default)]
    methods: Vec<MethodDocument>,
}

#[derive(Debug, Deserialize)]
struct MethodDocument {
    #[serde(rename = "class")]
    class_name: String,
    name: String,
    #[serde(default)]
    descriptor: String,
    #[serde(default)]
    instructions: Vec<InstructionDocument>,
}

#[derive(Debug, Deserialize)]
struct InstructionDocument {
    #[serde(default)]
    offset: Option<u32>,
    mnemonic: String,
    #[serde(default)]
    registers: Vec<String>,
    #[serde(default)]
    parameter: Option<String>,
}

/// Parsed snapshot and counts for a scan.
pub(crate) struct ScanOutput {
    pub(crate) context: AnalysisContext,
    pub(crate) method_count: usize,
    pub(crate) instruction_count: usize,
}

pub(crate) fn scan_input(input: &Path) -> Result<ScanOutput> {
    let extension = input.extension().and_then(|ext| ext.to_str()).unwrap_or("");
    if input.is_dir() || extension != "json" {
        anyhow::bail!("unsupported input file: {}", input.display());
    }
    let data = fs::read(input).with_context(|| format!("failed to read {}", input.display()))?;
    parse_snapshot(&data).with_context(|| format!("failed to parse {}", input.display()))
}

fn parse_snapshot(data: &[u8]) -> Result<ScanOutput> {
    let document: SnapshotDocument = serde_json::from_slice(data)?;

    let mut instruction_count = 0;
    let mut methods = Vec::with_capacity(document.methods.len());
    for method in document.methods {
        if method.class_name.is_empty() || method.name.is_empty() {
            warn!(
                class = %method.class_name,
                method = %method.name,
                "skipping method without class or name"
            );
            continue;
        }
        instruction_count += method.instructions.len();
        methods.push(method_handle(method));
    }

    let method_count = methods.len();
    let context = build_context(methods, document.permissions);
    debug!(
        methods = method_count,
        known = context.method_count(),
        instructions = instruction_count,
        "snapshot loaded"
    );
    Ok(ScanOutput {
        context,
        method_count,
        instruction_count,
    })
}

fn method_handle(method: MethodDocument) -> MethodHandle {
    let instructions = method
        .instructions
        .into_iter()
        .enumerate()
        .map(|(index, inst)| {
            Instruction::decode(
                inst.offset.unwrap_or(index as u32),
                inst.mnemonic,
                inst.registers.into_iter().map(Register::new).collect(),
                inst.parameter,
            )
        })
        .collect();
    MethodHandle {
        method: MethodRef::new(method.class_name, method.name),
        descriptor: method.descriptor,
        instructions,
        is_external: false,
    }
}
