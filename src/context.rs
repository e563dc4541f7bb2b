use std::collections::{BTreeMap, BTreeSet};

use crate::ir::{Instruction, MethodHandle, MethodRef, class_key};

/// Read-only queries over one disassembled binary.
pub(crate) trait BinaryAnalysis: Sync {
    fn permissions(&self) -> &BTreeSet<String>;

    /// All method bodies named `class_name.method_name`, or `None` when absent.
    fn find_method(&self, class_name: &str, method_name: &str) -> Option<Vec<&MethodHandle>>;

    /// Direct callers of `class_name.method_name`, or `None` when the method is unknown.
    fn upperfunc(&self, class_name: &str, method_name: &str) -> Option<BTreeSet<MethodRef>>;

    /// Instruction stream of every matching body with its descriptor, one entry
    /// per overload. External methods have no body and are left out.
    fn method_bytecode(&self, class_name: &str, method_name: &str) -> Vec<(&str, &[Instruction])> {
        self.find_method(class_name, method_name)
            .into_iter()
            .flatten()
            .filter(|handle| !handle.is_external)
            .map(|handle| (handle.descriptor.as_str(), handle.instructions.as_slice()))
            .collect()
    }
}

/// Lookup key that ignores the class descriptor terminator.
type MethodKey = (String, String);

fn method_key(class_name: &str, method_name: &str) -> MethodKey {
    (class_key(class_name).to_string(), method_name.to_string())
}

/// In-memory analysis context with a precomputed caller index.
pub(crate) struct AnalysisContext {
    permissions: BTreeSet<String>,
    methods: Vec<MethodHandle>,
    method_index: BTreeMap<MethodKey, Vec<usize>>,
    callers: BTreeMap<MethodKey, BTreeSet<MethodRef>>,
}

impl AnalysisContext {
    pub(crate) fn method_count(&self) -> usize {
        self.methods.len()
    }
}

impl BinaryAnalysis for AnalysisContext {
    fn permissions(&self) -> &BTreeSet<String> {
        &self.permissions
    }

    fn find_method(&self, class_name: &str, method_name: &str) -> Option<Vec<&MethodHandle>> {
        let indices = self.method_index.get(&method_key(class_name, method_name))?;
        Some(indices.iter().map(|index| &self.methods[*index]).collect())
    }

    fn upperfunc(&self, class_name: &str, method_name: &str) -> Option<BTreeSet<MethodRef>> {
        let key = method_key(class_name, method_name);
        if !self.method_index.contains_key(&key) {
            return None;
        }
        Some(self.callers.get(&key).cloned().unwrap_or_default())
    }
}

/// Build a context from method bodies. Invoked targets without a body are
/// registered as external methods so callers can be looked up for them.
pub(crate) fn build_context(
    mut methods: Vec<MethodHandle>,
    permissions: impl IntoIterator<Item = String>,
) -> AnalysisContext {
    let mut method_index: BTreeMap<MethodKey, Vec<usize>> = BTreeMap::new();
    for (index, handle) in methods.iter().enumerate() {
        method_index
            .entry(method_key(&handle.method.class_name, &handle.method.method_name))
            .or_default()
            .push(index);
    }

    let mut callers: BTreeMap<MethodKey, BTreeSet<MethodRef>> = BTreeMap::new();
    let mut externals: BTreeMap<MethodKey, MethodHandle> = BTreeMap::new();
    for handle in &methods {
        for inst in &handle.instructions {
            let Some(target) = inst.call_target() else {
                continue;
            };
            let key = method_key(&target.owner, &target.name);
            callers
                .entry(key.clone())
                .or_default()
                .insert(handle.method.clone());
            if !method_index.contains_key(&key) {
                externals.entry(key).or_insert_with(|| MethodHandle {
                    method: target.method_ref(),
                    descriptor: target.descriptor.clone(),
                    instructions: Vec::new(),
                    is_external: true,
                });
            }
        }
    }

    for (key, handle) in externals {
        method_index.entry(key).or_default().push(methods.len());
        methods.push(handle);
    }

    AnalysisContext {
        permissions: permissions.into_iter().collect(),
        methods,
        method_index,
        callers,
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::ir::{Instruction, MethodHandle, MethodRef, Register};

    /// Method body whose instructions are given as `(mnemonic, registers, parameter)`.
    pub(crate) fn method_with(
        class_name: &str,
        method_name: &str,
        instructions: &[(&str, &[&str], Option<&str>)],
    ) -> MethodHandle {
        let instructions = instructions
            .iter()
            .enumerate()
            .map(|(index, (mnemonic, registers, parameter))| {
                Instruction::decode(
                    index as u32 * 2,
                    *mnemonic,
                    registers.iter().map(|name| Register::new(*name)).collect(),
                    parameter.map(str::to_string),
                )
            })
            .collect();
        MethodHandle {
            method: MethodRef::new(class_name, method_name),
            descriptor: "()V".to_string(),
            instructions,
            is_external: false,
        }
    }

    /// Method body that only calls the given `Lcls;->name()V` targets in order.
    pub(crate) fn caller_of(class_name: &str, method_name: &str, targets: &[&str]) -> MethodHandle {
        let no_registers: &[&str] = &[];
        let instructions: Vec<(&str, &[&str], Option<&str>)> = targets
            .iter()
            .map(|target| ("invoke-static", no_registers, Some(*target)))
            .collect();
        method_with(class_name, method_name, &instructions)
    }
}
