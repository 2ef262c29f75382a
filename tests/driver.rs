mod common;

use common::{ScriptedEngine, Step, init_logger};
use sim_phases::{ControlCore, ExecutionDriver, StopCause};

fn drifting_cores() -> Vec<Step> {
    vec![
        // core 0 reaches its budget, core 1 lags behind
        Step::stop(10, &[100, 30], StopCause::MaxInstructions(Some(0))),
        // core 1's stop fires early
        Step::stop(10, &[5, 40], StopCause::MaxInstructions(Some(1))),
        Step::stop(10, &[0, 30], StopCause::MaxInstructions(Some(1))),
    ]
}

#[test]
fn all_cores_converge_with_one_stop_at_a_time() {
    init_logger();
    let mut engine = ScriptedEngine::new(2, drifting_cores());
    let result = ExecutionDriver::new().run_instructions(&mut engine, 100, ControlCore::All);

    assert!(result.success);
    assert_eq!(result.resumes, 3);
    assert_eq!(engine.stops, vec![(0, 100), (1, 70), (1, 30)]);
    assert_eq!(engine.instructions, vec![105, 100]);
}

#[test]
fn all_cores_never_succeed_early() {
    init_logger();
    let mut engine = ScriptedEngine::new(2, drifting_cores());
    let result =
        ExecutionDriver::with_resume_limit(2).run_instructions(&mut engine, 100, ControlCore::All);

    assert!(!result.success);
    assert_eq!(engine.instructions[1], 70);
}

#[test]
fn baselines_are_taken_at_phase_entry() {
    init_logger();
    let mut engine = ScriptedEngine::new(
        2,
        vec![Step::stop(5, &[50, 50], StopCause::MaxInstructions(Some(0)))],
    );
    engine.instructions = vec![1000, 2000];
    let result = ExecutionDriver::new().run_instructions(&mut engine, 50, ControlCore::All);
    assert!(result.success);
    assert_eq!(result.resumes, 1);
}

#[test]
fn single_core_resumes_past_unrelated_stops() {
    init_logger();
    let mut engine = ScriptedEngine::new(
        1,
        vec![
            Step::stop(3, &[10], StopCause::CheckpointRequested),
            Step::stop(3, &[10], StopCause::Other("switchcpu".to_string())),
            Step::stop(3, &[10], StopCause::MaxInstructions(Some(0))),
        ],
    );
    let result = ExecutionDriver::new().run_instructions(&mut engine, 30, ControlCore::Single(0));

    assert!(result.success);
    assert_eq!(result.resumes, 3);
    assert_eq!(engine.stops, vec![(0, 30)]);
    assert_eq!(engine.bounds, vec![None, None, None]);
}

#[test]
fn resume_limit_turns_a_hang_into_failure() {
    init_logger();
    let mut engine = ScriptedEngine::new(1, vec![]);
    let result = ExecutionDriver::with_resume_limit(5).run_instructions(
        &mut engine,
        30,
        ControlCore::Single(0),
    );
    assert!(!result.success);
    assert_eq!(engine.executes(), 5);
    assert_eq!(
        result.event.cause,
        StopCause::Other("script exhausted".to_string())
    );
}

#[test]
fn tick_runs_need_the_bound() {
    init_logger();
    let mut engine = ScriptedEngine::new(
        1,
        vec![
            Step::bounded(&[0]),
            Step::stop(4, &[0], StopCause::ProgramExit(3)),
        ],
    );
    let driver = ExecutionDriver::new();
    assert!(driver.run_ticks(&mut engine, 100).success);
    assert_eq!(engine.tick, 100);

    let result = driver.run_ticks(&mut engine, 100);
    assert!(!result.success);
    assert_eq!(result.event.code, 3);
}
