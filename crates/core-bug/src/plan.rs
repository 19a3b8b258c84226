//! Injection planning across accepted bugs: one insertion point per site,
//! the runtime files, the per-file include prepends, the commit, and the
//! post-commit resolution of schedule line numbers.

use std::path::Path;

use anyhow::Result;
use tracing::info;

use core_inject::{Injector, InsertionSet, RuntimeEmitter, prepend_state_include};
use core_ir::{Piece, render_indented};
use core_model::{FileLine, InjectLocation, LineLoc};

use crate::Bug;

fn absolute_file_line(code_dir: &Path, loc: &FileLine) -> FileLine {
    FileLine::new(
        code_dir.join(&loc.filename).to_string_lossy(),
        loc.line,
    )
}

/// Register one insertion point per site of `bug`, remembering each site's
/// handle for later resolution. Panics if any piece is still lazy — only
/// simulated bugs reach the planner.
fn register_bug_insertions(
    bug: &mut Bug,
    code_dir: &Path,
    injector: &mut Injector,
    set: &mut InsertionSet,
) {
    for (loc, site) in bug.iter_sites_mut() {
        let abs = absolute_file_line(code_dir, loc);
        let pieces: Vec<Piece> = site
            .codes()
            .iter()
            .map(|lazy| {
                lazy.piece
                    .clone()
                    .unwrap_or_else(|| panic!("unmaterialized piece reached the planner at {loc}"))
            })
            .collect();
        let codes = render_indented(&pieces);
        let handle = injector.add(InjectLocation::new(abs.clone(), LineLoc::Before), codes);
        set.register(abs, handle.clone());
        site.point = Some(handle);
    }
}

/// Fill post-commit line numbers into `bug`'s schedule.
fn resolve_bug_order(bug: &mut Bug, code_dir: &Path, injector: &Injector, set: &InsertionSet) {
    bug.resolve_order_lines(|site, index| {
        let handle = site
            .point
            .as_ref()
            .expect("site registered before resolution");
        let abs = absolute_file_line(code_dir, &site.file_line);
        set.resolve(injector, &abs, handle, index)
    });
}

/// Plan and commit the whole injection for a set of accepted bugs against
/// the source tree rooted at `code_dir`. Site file-lines are interpreted
/// relative to `code_dir`; `arg_input` is the argv index the injected
/// runtime loads the input file from.
pub fn inject_bugs(bugs: &mut [Bug], code_dir: &Path, arg_input: usize) -> Result<()> {
    let mut emitter = RuntimeEmitter::new(code_dir);
    let bug_num = bugs.iter().map(|b| b.bug_id + 1).max().unwrap_or(0);
    emitter.copy_presets(bug_num as usize, arg_input)?;
    for bug in bugs.iter() {
        emitter.add_state(bug.bug_id, bug.variables().to_vec());
    }
    emitter.dump_state_defs()?;

    let mut injector = Injector::new();
    let mut files: Vec<String> = Vec::new();
    for bug in bugs.iter() {
        for file in bug.all_files() {
            if !files.contains(&file) {
                files.push(file);
            }
        }
    }
    for file in &files {
        prepend_state_include(&mut injector, &code_dir.join(file));
    }

    let mut set = InsertionSet::new();
    for bug in bugs.iter_mut() {
        register_bug_insertions(bug, code_dir, &mut injector, &mut set);
    }
    injector.commit()?;
    for bug in bugs.iter_mut() {
        resolve_bug_order(bug, code_dir, &injector, &set);
    }
    info!(
        target: "inject",
        bugs = bugs.len(),
        files = files.len(),
        "injection_committed"
    );
    Ok(())
}
