//! Emission of the injected C runtime: preset support files, the per-bug
//! state structs, and their global instances.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use core_codegen::{Variable, state_name};
use core_ir::bug_macro;
use core_model::{FileLine, InjectLocation, LineLoc};

use crate::injector::Injector;

pub const STATE_DEFINE: &str = "racebench_bugs.h";
pub const STATE_INSTANCE: &str = "racebench_bugs.c";

const RACEBENCH_H: &str = include_str!("../presets/racebench.h");
const RACEBENCH_C: &str = include_str!("../presets/racebench.c");
const BUGS_H_TEMPLATE: &str = include_str!("../presets/racebench_bugs.h");
const BUGS_C_TEMPLATE: &str = include_str!("../presets/racebench_bugs.c");

/// Queue the state-definitions include at the very top of `filename`.
pub fn prepend_state_include(injector: &mut Injector, filename: &Path) {
    let loc = InjectLocation::new(
        FileLine::new(filename.to_string_lossy(), 0),
        LineLoc::Before,
    );
    injector.add(loc, vec![format!("#include \"{STATE_DEFINE}\"")]);
}

struct BugState {
    bug_id: u32,
    vars: Vec<Variable>,
}

impl BugState {
    fn struct_name(&self) -> String {
        format!("rb_state{}_t", self.bug_id)
    }
}

/// Writes the RaceBench support files into the target tree.
#[derive(Default)]
pub struct RuntimeEmitter {
    build_path: PathBuf,
    states: Vec<BugState>,
}

impl RuntimeEmitter {
    pub fn new(build_path: impl Into<PathBuf>) -> Self {
        Self {
            build_path: build_path.into(),
            states: Vec::new(),
        }
    }

    /// Copy the fixed runtime presets, substituting the bug count and the
    /// argv index of the input file.
    pub fn copy_presets(&self, bug_num: usize, arg_input: usize) -> Result<()> {
        for (name, template) in [("racebench.h", RACEBENCH_H), ("racebench.c", RACEBENCH_C)] {
            let content = template
                .replace("{bug_num}", &bug_num.to_string())
                .replace("{arg_input}", &arg_input.to_string());
            let path = self.build_path.join(name);
            fs::write(&path, content)
                .with_context(|| format!("writing runtime preset {}", path.display()))?;
        }
        Ok(())
    }

    pub fn add_state(&mut self, bug_id: u32, vars: Vec<Variable>) {
        self.states.push(BugState { bug_id, vars });
    }

    /// Write `racebench_bugs.h` (macros, struct types, externs) and
    /// `racebench_bugs.c` (instances).
    pub fn dump_state_defs(&self) -> Result<()> {
        let macros: Vec<String> = self
            .states
            .iter()
            .map(|s| format!("#define {}", bug_macro(s.bug_id)))
            .collect();

        let mut structs = Vec::new();
        for state in &self.states {
            let fields: Vec<String> = state
                .vars
                .iter()
                .map(|var| {
                    let attr = var.kind.c_attribute();
                    let c_type = if attr.is_empty() {
                        var.kind.c_type().to_owned()
                    } else {
                        format!("{attr} {}", var.kind.c_type())
                    };
                    format!("{c_type} {};", var.base_name())
                })
                .collect();
            structs.push(format!(
                "struct {} {{\n    {}\n}};",
                state.struct_name(),
                fields.join("\n    ")
            ));
        }

        let mut externs = Vec::new();
        let mut instances = Vec::new();
        for state in &self.states {
            let inits: Vec<&str> = state.vars.iter().map(|v| v.kind.c_initializer()).collect();
            externs.push(format!(
                "extern struct {} {};",
                state.struct_name(),
                state_name(state.bug_id)
            ));
            instances.push(format!(
                "struct {} {} = {{{}}};",
                state.struct_name(),
                state_name(state.bug_id),
                inits.join(", ")
            ));
        }

        let header_body = [macros.join("\n"), structs.join("\n\n"), externs.join("\n")].join("\n\n");
        self.apply_template(STATE_DEFINE, BUGS_H_TEMPLATE, &header_body)?;
        self.apply_template(STATE_INSTANCE, BUGS_C_TEMPLATE, &instances.join("\n"))?;
        info!(
            target: "inject",
            bugs = self.states.len(),
            path = %self.build_path.display(),
            "state_defs_written"
        );
        Ok(())
    }

    fn apply_template(&self, name: &str, template: &str, states: &str) -> Result<()> {
        let content = template.replace("{states}", states);
        let path = self.build_path.join(name);
        fs::write(&path, content)
            .with_context(|| format!("writing state definitions {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_codegen::VarKind;

    #[test]
    fn state_defs_declare_structs_and_instances() {
        let dir = tempfile::tempdir().unwrap();
        let mut emitter = RuntimeEmitter::new(dir.path());
        emitter.add_state(
            0,
            vec![
                Variable::new(VarKind::Normal, 0, 0),
                Variable::new(VarKind::Lock, 0, 1),
                Variable::new(VarKind::CondVar, 0, 2),
            ],
        );
        emitter.dump_state_defs().unwrap();

        let header = fs::read_to_string(dir.path().join(STATE_DEFINE)).unwrap();
        assert!(header.contains("#define RACEBENCH_BUG_0"));
        assert!(header.contains("struct rb_state0_t {"));
        assert!(header.contains("volatile uint32_t var_0;"));
        assert!(header.contains("pthread_mutex_t lock_1;"));
        assert!(header.contains("pthread_cond_t cv_2;"));
        assert!(header.contains("extern struct rb_state0_t rb_state0;"));

        let source = fs::read_to_string(dir.path().join(STATE_INSTANCE)).unwrap();
        assert!(source.contains(
            "struct rb_state0_t rb_state0 = {0, PTHREAD_MUTEX_INITIALIZER, PTHREAD_COND_INITIALIZER};"
        ));
        assert!(source.contains("#include \"racebench_bugs.h\""));
    }

    #[test]
    fn presets_substitute_run_parameters() {
        let dir = tempfile::tempdir().unwrap();
        let emitter = RuntimeEmitter::new(dir.path());
        emitter.copy_presets(4, 2).unwrap();
        let header = fs::read_to_string(dir.path().join("racebench.h")).unwrap();
        assert!(header.contains("#define RACEBENCH_BUG_NUM 4"));
        assert!(header.contains("#define RACEBENCH_INPUT_ARG 2"));
        let source = fs::read_to_string(dir.path().join("racebench.c")).unwrap();
        assert!(source.contains("RaceBench crashes deliberately"));
    }
}
