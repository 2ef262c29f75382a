mod common;

use common::{ScriptedEngine, Step, init_logger};
use sim_phases::{ExecutionDriver, PhaseFailure, SimPointPlan, StopCause, apply};
use std::{io::Cursor, path::Path};

fn plan(analysis: &str, weights: &str, interval_length: u64, warmup_length: u64) -> SimPointPlan {
    SimPointPlan::parse(
        Cursor::new(analysis),
        Path::new("test.simpts"),
        Cursor::new(weights),
        Path::new("test.weights"),
        interval_length,
        warmup_length,
    )
    .unwrap()
}

#[test]
fn shared_start_runs_once() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    // intervals 0 and 1 both clamp to instruction 0
    let plan = plan("4 0\n1 1\n0 2\n", "0.5 0\n0.2 1\n0.3 2\n", 1000, 1500);
    let mut engine = ScriptedEngine::new(
        1,
        vec![Step::stop(10, &[2500], StopCause::MaxInstructions(Some(0)))],
    );

    let samples = apply(&plan, &mut engine, dir.path(), &ExecutionDriver::new()).unwrap();

    assert_eq!(samples.len(), 3);
    assert_eq!(
        samples.iter().filter(|sample| sample.written).count(),
        2
    );
    // one segment only: nothing to run up to the shared start
    assert_eq!(engine.stops, vec![(0, 2500)]);
    assert_eq!(engine.saves.len(), 2);

    assert_eq!(samples[0].entry.interval, 1);
    assert_eq!(samples[1].entry.interval, 0);
    assert!(!samples[1].written);
    assert_eq!(samples[1].checkpoint, samples[0].checkpoint);
    assert_ne!(samples[1].name, samples[0].name);
    assert_eq!(
        samples[1].name,
        "cpt.simpoint_01_inst_0_weight_0.300000_interval_1000_warmup_0"
    );
    assert_eq!(
        samples[2].checkpoint,
        dir.path()
            .join("cpt.simpoint_02_inst_2500_weight_0.500000_interval_1000_warmup_1500")
    );
}

#[test]
fn runs_only_the_distance_between_starts() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let plan = plan("3 0\n1 1\n", "0.6 0\n0.4 1\n", 1000, 500);
    let mut engine = ScriptedEngine::new(
        1,
        vec![
            Step::stop(10, &[500], StopCause::MaxInstructions(Some(0))),
            Step::stop(10, &[2000], StopCause::MaxInstructions(Some(0))),
        ],
    );
    apply(&plan, &mut engine, dir.path(), &ExecutionDriver::new()).unwrap();
    assert_eq!(engine.stops, vec![(0, 500), (0, 2000)]);
}

#[test]
fn failed_segment_reports_the_sample() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let plan = plan("3 0\n", "1.0 0\n", 1000, 500);
    let mut engine = ScriptedEngine::new(1, vec![]);
    let err = apply(
        &plan,
        &mut engine,
        dir.path(),
        &ExecutionDriver::with_resume_limit(1),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        sim_phases::Error::PhaseFailure(PhaseFailure { ref phase, .. }) if phase == "simpoint #0"
    ));
    assert!(engine.saves.is_empty());
}
