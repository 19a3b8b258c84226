//! Pattern placement: choosing the injection sites a pattern's code groups
//! land on, honoring the dominance constraint for two-site columns.

use std::collections::HashSet;

use anyhow::Result;
use rand::Rng;
use rand::seq::SliceRandom;
use tracing::debug;

use core_codegen::CodeGenerator;
use core_dom::DomOracle;
use core_model::{BugError, FileLine, LineLoc};
use core_pattern::{BugPattern, Params, random_pattern};

use crate::Bug;
use crate::walker::TraceWalker;

/// How far past the cursor the scan for a second site may look.
pub const MARK_LOCATION_STEPS: usize = 50;

/// A chosen injection site for one code group: how many events past the
/// cursor it sits, and which thread anchors it.
#[derive(Debug, Clone)]
pub struct StepMarker {
    pub step: usize,
    pub tid: usize,
    pub file_line: FileLine,
}

/// Instantiate a random pattern and pick its markers. Marker lists are
/// padded so each column has exactly one marker per code group.
pub fn generate_pattern<R: Rng>(
    bug: &mut Bug,
    walker: &TraceWalker<'_>,
    codegen: &mut CodeGenerator,
    dom: &mut dyn DomOracle,
    params: &Params,
    rng: &mut R,
) -> Result<(BugPattern, Vec<StepMarker>, Vec<StepMarker>)> {
    let pattern = random_pattern(codegen, params, rng);
    let (mut locs0, mut locs1) = locations(bug, walker, dom, &pattern, rng)?;

    for (locs, codes) in [(&mut locs0, &pattern.code0), (&mut locs1, &pattern.code1)] {
        while codes.len() > locs.len() {
            let last = locs.last().expect("marker lists start non-empty").clone();
            locs.push(last);
        }
    }
    debug!(
        target: "placement",
        pattern = pattern.name,
        site0 = %locs0[0].file_line,
        site1 = %locs1[0].file_line,
        "pattern_placed"
    );
    Ok((pattern, locs0, locs1))
}

/// Pick the two initial markers from the shuffled injectable positions, then
/// — for patterns whose longer column spans two sites — scan forward for a
/// dominance-conforming second site. Returns the (possibly swapped) marker
/// lists so the first one belongs to the two-group column.
fn locations<R: Rng>(
    bug: &mut Bug,
    walker: &TraceWalker<'_>,
    dom: &mut dyn DomOracle,
    pattern: &BugPattern,
    rng: &mut R,
) -> Result<(Vec<StepMarker>, Vec<StepMarker>)> {
    let mut init = walker.available_pos(bug);
    init.shuffle(rng);
    if init.len() < 2 {
        return Err(BugError::NoPosition.into());
    }
    let marker_of = |tp: &core_model::ThreadPointer| StepMarker {
        step: 0,
        tid: tp.tid,
        file_line: tp
            .location
            .as_ref()
            .expect("available positions carry locations")
            .file_line
            .clone(),
    };
    let mut locs0 = vec![marker_of(&init[0])];
    let locs1 = vec![marker_of(&init[1])];

    let max_part = pattern.code0.len().max(pattern.code1.len());
    let min_part = pattern.code0.len().min(pattern.code1.len());
    if max_part == 1 {
        return Ok((locs0, locs1));
    }
    assert!(
        max_part == 2 && min_part == 1,
        "pattern columns span one or two sites"
    );

    let mut candidates: Vec<StepMarker> = Vec::new();
    for step in 1..MARK_LOCATION_STEPS {
        let index = walker.current + step;
        if index >= walker.trace().len() {
            break;
        }
        let event = walker.trace().get(index);
        let Some(fl) = &event.file_line else {
            continue;
        };
        if event.line_loc != LineLoc::Before || !walker.allows(fl) {
            continue;
        }

        // once the second marker's thread has moved on, the window is closed
        let second_alive = walker
            .available_pos_at(index)
            .iter()
            .any(|(_, pos)| *pos == locs1[0].file_line);
        if !second_alive {
            break;
        }
        if *fl == locs1[0].file_line {
            break;
        }
        let conflicting = bug.site_codes(fl).iter().any(|lazy| {
            let edited = lazy.reserved.edit_vars();
            pattern.used_vars.iter().any(|v| edited.contains(v))
        });
        if conflicting {
            break;
        }
        candidates.push(StepMarker {
            step,
            tid: event.tid,
            file_line: fl.clone(),
        });
    }

    let first = locs0[0].file_line.clone();
    let good: HashSet<usize> = dom
        .query(&first.filename, first.line, pattern.dom_mode)?
        .into_iter()
        .collect();
    let survivors: Vec<StepMarker> = candidates
        .into_iter()
        .filter(|m| m.file_line.filename == first.filename && good.contains(&m.file_line.line))
        .collect();

    if survivors.is_empty() {
        // single-site layout: the caller pads both groups onto one marker
        return Ok((locs0, locs1));
    }
    let chosen = survivors
        .choose(rng)
        .expect("survivor list checked non-empty")
        .clone();
    locs0.push(chosen);
    if pattern.code0.len() == max_part {
        Ok((locs0, locs1))
    } else {
        Ok((locs1, locs0))
    }
}
