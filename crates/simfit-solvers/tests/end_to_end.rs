//! Drives the engine and solvers against an on-disk store, playing the part
//! of the external scheduler between calls.

use approx::assert_relative_eq;
use nalgebra::DMatrix;
use simfit_core::{ObservationVector, Outcome, RunState, StudyConfig};
use simfit_solvers::{Engine, OnMissing, Pipeline, Transform, gauss_newton, jacobian, optimized};
use simfit_store::DirStore;
use tempfile::tempdir;

const STUDY: &str = r#"
name = "two-by-three"
ensemble_size = 1

[[parameters]]
name = "vf1"
min = 0.0
max = 10.0
step = 0.1

[[parameters]]
name = "ent_factor"
min = 0.0
max = 10.0
step = 0.2
begin = 6.0

[[observations]]
name = "olr"
target = 10.0

[[observations]]
name = "rsr"
scale = 2.0
target = -0.5

[[observations]]
name = "lat_grad"
target = 15.0
"#;

fn observations(values: [f64; 3]) -> ObservationVector {
    ["olr", "rsr", "lat_grad"].into_iter().zip(values).collect()
}

/// olr = 2a + b, rsr = (a - b) / 2, lat_grad = a + 3b
fn model(p: &[f64]) -> ObservationVector {
    observations([2.0 * p[0] + p[1], 0.5 * (p[0] - p[1]), p[0] + 3.0 * p[1]])
}

/// Walks every new case through the scheduler states and completes it.
fn schedule(store: &DirStore) -> usize {
    let new = store.cases_in_state(RunState::New).unwrap();
    for fingerprint in &new {
        store.set_state(fingerprint, RunState::Queued).unwrap();
        store.set_state(fingerprint, RunState::Running).unwrap();
        let record = store.get(fingerprint).unwrap().expect("case exists");
        store
            .complete(fingerprint, &model(&record.member.params.values()))
            .unwrap();
    }
    new.len()
}

#[test]
fn missing_rows_are_registered_then_reported() {
    let dir = tempdir().unwrap();
    let config = StudyConfig::from_toml_str(STUDY).unwrap();
    let store = DirStore::for_study(dir.path(), &config).unwrap();

    // Seed one completed case at (1, 2).
    let mut engine = Engine::new(&config, &store);
    let seed = DMatrix::from_row_slice(1, 2, &[1.0, 2.0]);
    assert!(engine.evaluate(&seed, &Pipeline::new(), OnMissing::Pending).unwrap().is_pending());
    let seeded = config.member(&[1.0, 2.0], 0).unwrap().fingerprint();
    store.complete(&seeded, &observations([0.1, 0.2, 0.3])).unwrap();

    let batch = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 3.0, 4.0]);
    let pending = engine
        .evaluate(&batch, &Pipeline::new(), OnMissing::Pending)
        .unwrap();

    let missing = config.member(&[3.0, 4.0], 0).unwrap().fingerprint();
    assert_eq!(pending.pending().unwrap().fingerprints(), [missing.clone()]);
    let record = store.get(&missing).unwrap().expect("registered as new");
    assert_eq!(record.state, RunState::New);
    assert!(store.case_dir(&missing).join("state").is_file());

    let partial = engine
        .evaluate(&batch, &Pipeline::new(), OnMissing::Nan)
        .unwrap()
        .ready()
        .expect("nan mode is always ready");
    let rows = partial.values();
    assert_relative_eq!(rows[(0, 0)], 0.1);
    assert_relative_eq!(rows[(0, 1)], 0.2);
    assert_relative_eq!(rows[(0, 2)], 0.3);
    assert!((0..3).all(|j| rows[(1, j)].is_nan()));

    // Resolving again creates nothing new.
    assert_eq!(store.cases_in_state(RunState::New).unwrap(), [missing]);
}

#[test]
fn state_never_moves_backwards() {
    let dir = tempdir().unwrap();
    let config = StudyConfig::from_toml_str(STUDY).unwrap();
    let store = DirStore::for_study(dir.path(), &config).unwrap();
    let mut engine = Engine::new(&config, &store);

    let point = DMatrix::from_row_slice(1, 2, &[5.0, 5.0]);
    let _ = engine.evaluate(&point, &Pipeline::new(), OnMissing::Pending).unwrap();
    assert_eq!(schedule(&store), 1);

    let fingerprint = config.member(&[5.0, 5.0], 0).unwrap().fingerprint();
    assert!(store.set_state(&fingerprint, RunState::Running).is_err());
    assert!(engine.evaluate(&point, &Pipeline::new(), OnMissing::Pending).unwrap().is_ready());
}

#[test]
fn non_finite_points_leave_no_case_on_disk() {
    let dir = tempdir().unwrap();
    let config = StudyConfig::from_toml_str(STUDY).unwrap();
    let store = DirStore::for_study(dir.path(), &config).unwrap();
    let mut engine = Engine::new(&config, &store);
    let point = DMatrix::from_row_slice(1, 2, &[f64::NAN, 2.0]);

    for _ in 0..2 {
        assert!(engine.evaluate(&point, &Pipeline::new(), OnMissing::Pending).is_err());
    }
    assert!(store.cases_in_state(RunState::New).unwrap().is_empty());

    let good = DMatrix::from_row_slice(1, 2, &[1.0, 2.0]);
    assert!(engine.evaluate(&good, &Pipeline::new(), OnMissing::Pending).unwrap().is_pending());
}

#[test]
fn jacobian_completes_after_one_scheduler_pass() {
    let dir = tempdir().unwrap();
    let config = StudyConfig::from_toml_str(STUDY).unwrap();
    let store = DirStore::for_study(dir.path(), &config).unwrap();
    let mut engine = Engine::new(&config, &store);
    let base = config.begin();
    let pipeline = Pipeline::new().scaled().residual();

    assert!(jacobian::run(&mut engine, &base, &pipeline).unwrap().is_pending());
    assert_eq!(schedule(&store), 3);
    let jac = jacobian::run(&mut engine, &base, &pipeline)
        .unwrap()
        .ready()
        .expect("all runs complete");

    // begin = (5, 6): both at or above their midpoints.
    assert_eq!(jac.deltas, [-0.1, -0.2]);
    // rsr is scaled by 2, so its row is (1, -1).
    let expected = DMatrix::from_row_slice(3, 2, &[2.0, 1.0, 1.0, -1.0, 1.0, 3.0]);
    assert_relative_eq!(jac.jacobian, expected, epsilon = 1e-9);

    let bundle = serde_json::to_value(&jac).unwrap();
    assert_eq!(bundle["params"], serde_json::json!(["vf1", "ent_factor"]));
}

#[test]
fn gauss_newton_finds_the_targets_through_the_scheduler() {
    let dir = tempdir().unwrap();
    let config = StudyConfig::from_toml_str(STUDY).unwrap();
    let store = DirStore::for_study(dir.path(), &config).unwrap();
    let mut engine = Engine::new(&config, &store);
    let names = config.obs_names();
    let transform = Transform::identity(&names);
    let internal = DMatrix::identity(3, 3) * 1e-4;
    let settings = gauss_newton::Config::default();

    let mut passes = 0;
    let solution = loop {
        match gauss_newton::solve_unobserved(
            &mut engine,
            &config.begin(),
            &transform,
            &internal,
            true,
            &settings,
        )
        .unwrap()
        {
            Outcome::Ready(solution) => break solution,
            Outcome::Pending(pending) => {
                assert_eq!(schedule(&store), pending.len());
                passes += 1;
                assert!(passes < 50);
            }
        }
    };

    // Targets are the model at (3, 4).
    assert_eq!(solution.status, gauss_newton::Status::Converged);
    assert_relative_eq!(solution.optimum.get("vf1").unwrap(), 3.0, epsilon = 1e-7);
    assert_relative_eq!(solution.optimum.get("ent_factor").unwrap(), 4.0, epsilon = 1e-7);

    let best = solution.optimum.values();
    let run = optimized::run(&mut engine, Some(best.as_slice()));
    let run = match run.unwrap() {
        Outcome::Ready(run) => run,
        Outcome::Pending(_) => {
            schedule(&store);
            optimized::run(&mut engine, Some(best.as_slice()))
                .unwrap()
                .ready()
                .expect("scheduled")
        }
    };
    assert_relative_eq!(run.observations.get("olr").unwrap(), 10.0, epsilon = 1e-6);
    assert_relative_eq!(run.observations.get("rsr").unwrap(), -0.5, epsilon = 1e-6);

    let log = engine.take_audit_log();
    assert!(!log.is_empty());
    assert!(serde_json::to_string(&solution).is_ok());
}
