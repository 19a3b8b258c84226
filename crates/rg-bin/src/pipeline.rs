//! The whole-run pipeline: copy the target tree, extract the configured
//! number of bugs, commit the injection, and write the per-bug artifacts.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, ensure};
use rand::rngs::StdRng;
use tracing::{info, warn};

use core_bug::plan::inject_bugs;
use core_bug::{Bug, BugExtractor, ExtractOptions, LineFilter};
use core_dom::{DomOracle, NullDom, SubprocessDom};
use core_inject::InjectChecker;
use core_model::FileLine;
use core_trace::Trace;

use crate::config::Config;
use crate::mutate::Mutator;

/// Whole-bug retry budget at the pipeline level, on top of the per-attempt
/// budget inside the extractor.
const BUG_RETRY_LIMIT: usize = 10;

/// Basename of the optional per-target file blacklist inside the tree.
const FILE_BLACKLIST: &str = "blacklist.txt";

pub struct PipelineArgs {
    pub source: PathBuf,
    pub trace: PathBuf,
    pub blacklist: Option<PathBuf>,
    pub input_seed: PathBuf,
    pub out: PathBuf,
    pub dom_exe: Option<PathBuf>,
}

pub struct PipelinePaths {
    pub code_dir: PathBuf,
    pub input_dir: PathBuf,
    pub trace_dir: PathBuf,
}

fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    fs::create_dir_all(to).with_context(|| format!("creating {}", to.display()))?;
    for entry in fs::read_dir(from).with_context(|| format!("reading {}", from.display()))? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)
                .with_context(|| format!("copying {}", entry.path().display()))?;
        }
    }
    Ok(())
}

fn read_file_blacklist(code_dir: &Path) -> Vec<String> {
    let path = code_dir.join(FILE_BLACKLIST);
    let Ok(content) = fs::read_to_string(&path) else {
        return Vec::new();
    };
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Run the full pipeline. Returns the accepted bugs for inspection.
pub fn run(args: &PipelineArgs, config: &Config, rng: &mut StdRng) -> Result<Vec<Bug>> {
    let paths = PipelinePaths {
        code_dir: args.out.join("code"),
        input_dir: args.out.join("input"),
        trace_dir: args.out.join("trace"),
    };
    ensure!(
        !paths.code_dir.exists(),
        "output tree {} already exists",
        paths.code_dir.display()
    );
    copy_tree(&args.source, &paths.code_dir)?;
    fs::create_dir_all(&paths.input_dir)?;
    fs::create_dir_all(&paths.trace_dir)?;

    let trace = Trace::from_files(&args.trace, args.blacklist.as_deref())?;
    info!(
        target: "pipeline",
        events = trace.len(),
        threads = trace.num_threads,
        "trace_loaded"
    );

    let mut checker = InjectChecker::new(read_file_blacklist(&paths.code_dir));
    let code_dir = paths.code_dir.clone();
    let filter = LineFilter::build(&trace, |fl: &FileLine| {
        let path = code_dir.join(&fl.filename);
        match checker.can_insert_before(&path, fl.line) {
            Ok(ok) => ok,
            Err(err) => {
                warn!(target: "pipeline", file = %fl, error = %err, "line_check_failed");
                false
            }
        }
    });

    let mut dom: Box<dyn DomOracle> = match &args.dom_exe {
        Some(exe) => Box::new(SubprocessDom::new(exe, &paths.code_dir)),
        None => Box::new(NullDom),
    };

    let seed_bytes =
        fs::read(&args.input_seed).with_context(|| "reading input seed".to_string())?;

    let mut bugs: Vec<Bug> = Vec::new();
    for bug_id in 0..config.bug_num as u32 {
        let bug = extract_one(
            bug_id,
            &trace,
            &filter,
            dom.as_mut(),
            &seed_bytes,
            config,
            &paths,
            rng,
        )?;
        bugs.push(bug);
    }

    inject_bugs(&mut bugs, &paths.code_dir, config.input_arg)?;

    for bug in &bugs {
        fs::write(paths.trace_dir.join(bug.log_file_name()), bug.log.to_json())?;
        fs::write(paths.trace_dir.join(bug.order_file_name()), bug.dump_order())?;
    }
    info!(target: "pipeline", bugs = bugs.len(), "run_complete");
    Ok(bugs)
}

#[allow(clippy::too_many_arguments)]
fn extract_one(
    bug_id: u32,
    trace: &Trace,
    filter: &LineFilter,
    dom: &mut dyn DomOracle,
    seed_bytes: &[u8],
    config: &Config,
    paths: &PipelinePaths,
    rng: &mut StdRng,
) -> Result<Bug> {
    let mut last_err = None;
    for round in 0..BUG_RETRY_LIMIT {
        // a fresh mutated input per whole-bug round
        let mut input_bytes = seed_bytes.to_vec();
        let mut mutator = Mutator::new(|_: &[u8]| true);
        mutator.mutate(&mut input_bytes, config.mutate_num, rng)?;
        let input_file = paths.input_dir.join(format!("input-{bug_id}"));
        fs::write(&input_file, &input_bytes)
            .with_context(|| format!("writing {}", input_file.display()))?;

        let mut extractor = BugExtractor {
            filter,
            dom: &mut *dom,
            opts: ExtractOptions::default(),
        };
        match extractor.extract(
            bug_id,
            trace,
            &input_file,
            &input_bytes,
            config.path_len,
            rng,
            |_| Ok(()),
        ) {
            Ok(bug) => return Ok(bug),
            Err(err) => {
                warn!(
                    target: "pipeline",
                    bug_id,
                    round,
                    error = %err,
                    "bug_round_failed"
                );
                last_err = Some(err);
            }
        }
    }
    Err(last_err.expect("at least one round ran"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use std::fs;

    fn seed_workspace(root: &Path) -> PipelineArgs {
        let source = root.join("target-src");
        fs::create_dir_all(&source).unwrap();
        let mut content = String::new();
        for i in 0..40 {
            content.push_str(&format!("x{i} = {i};\n"));
        }
        fs::write(source.join("src.c"), content).unwrap();

        let mut log = String::new();
        for i in 0..36 {
            log.push_str(&format!("{} = src.c:{}\n", i % 2, i + 1));
        }
        let trace = root.join("trace.log");
        fs::write(&trace, log).unwrap();

        let input_seed = root.join("input-seed");
        fs::write(&input_seed, b"seed-input-bytes").unwrap();

        PipelineArgs {
            source,
            trace,
            blacklist: None,
            input_seed,
            out: root.join("out"),
            dom_exe: None,
        }
    }

    fn config() -> Config {
        Config {
            mutate_num: 2,
            path_len: 2,
            bug_num: 1,
            input_arg: 1,
        }
    }

    #[test]
    fn full_run_writes_all_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let args = seed_workspace(dir.path());
        let mut rng = StdRng::seed_from_u64(1);
        let bugs = run(&args, &config(), &mut rng).unwrap();
        assert_eq!(bugs.len(), 1);

        let out = &args.out;
        assert!(out.join("code/src.c").is_file());
        assert!(out.join("code/racebench.h").is_file());
        assert!(out.join("code/racebench_bugs.c").is_file());
        assert!(out.join("input/input-0").is_file());
        assert!(out.join("trace/bug-0.json").is_file());
        assert!(out.join("trace/order-0.txt").is_file());

        let injected = fs::read_to_string(out.join("code/src.c")).unwrap();
        assert!(injected.starts_with("#include \"racebench_bugs.h\""));
        assert!(injected.contains("#ifdef RACEBENCH_BUG_0"));

        let order = fs::read_to_string(out.join("trace/order-0.txt")).unwrap();
        assert_eq!(order.lines().count(), bugs[0].order.len());

        let log: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(out.join("trace/bug-0.json")).unwrap())
                .unwrap();
        assert!(log.as_array().is_some_and(|items| !items.is_empty()));
    }

    #[test]
    fn reruns_with_one_seed_are_byte_identical() {
        let run_once = |seed: u64| {
            let dir = tempfile::tempdir().unwrap();
            let args = seed_workspace(dir.path());
            let mut rng = StdRng::seed_from_u64(seed);
            run(&args, &config(), &mut rng).unwrap();
            (
                fs::read_to_string(args.out.join("code/src.c")).unwrap(),
                fs::read_to_string(args.out.join("trace/order-0.txt")).unwrap(),
                fs::read_to_string(args.out.join("trace/bug-0.json")).unwrap(),
                fs::read(args.out.join("input/input-0")).unwrap(),
            )
        };
        assert_eq!(run_once(9), run_once(9));
        assert_ne!(run_once(9).0, run_once(10).0);
    }

    #[test]
    fn existing_output_tree_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let args = seed_workspace(dir.path());
        fs::create_dir_all(args.out.join("code")).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(run(&args, &config(), &mut rng).is_err());
    }
}

