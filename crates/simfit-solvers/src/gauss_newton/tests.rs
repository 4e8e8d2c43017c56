use super::*;

use approx::assert_relative_eq;
use simfit_core::{ObsSpec, ObservationVector, ParamSpec, RunState};
use simfit_store::MemoryStore;

const OBS: [&str; 3] = ["x", "y", "z"];

fn study() -> StudyConfig {
    let param = |name: &str| ParamSpec {
        name: name.into(),
        min: 0.0,
        max: 10.0,
        step: 0.1,
        begin: None,
        optimum: None,
    };
    // Targets are the linear model evaluated at (3, 4).
    let targets = linear(&[3.0, 4.0]);
    let obs = OBS
        .iter()
        .map(|&name| ObsSpec {
            name: name.into(),
            scale: 1.0,
            target: targets.get(name).unwrap(),
        })
        .collect();
    StudyConfig::new("gauss-newton", vec![param("a"), param("b")], obs, 1).unwrap()
}

/// x = 2a + b, y = a - b, z = a + 3b
fn linear(p: &[f64]) -> ObservationVector {
    OBS.into_iter()
        .zip([2.0 * p[0] + p[1], p[0] - p[1], p[0] + 3.0 * p[1]])
        .collect()
}

/// Only `a` affects the observations.
fn insensitive(p: &[f64]) -> ObservationVector {
    OBS.into_iter().zip([p[0], 2.0 * p[0], 0.0]).collect()
}

fn run_pending(store: &MemoryStore, model: fn(&[f64]) -> ObservationVector) {
    for fingerprint in store.cases_in_state(RunState::New) {
        let record = store.get(&fingerprint).unwrap();
        store
            .complete(&fingerprint, model(&record.member.params.values()))
            .unwrap();
    }
}

/// Calls `attempt` until it is ready, running pending simulations between
/// calls. Returns the result and the number of restarts.
fn drive<T, E>(
    store: &MemoryStore,
    model: fn(&[f64]) -> ObservationVector,
    mut attempt: impl FnMut() -> Result<Outcome<T>, E>,
) -> Result<(T, usize), E> {
    for restarts in 0..100 {
        match attempt()? {
            Outcome::Ready(value) => return Ok((value, restarts)),
            Outcome::Pending(_) => run_pending(store, model),
        }
    }
    panic!("no progress after 100 restarts");
}

fn internal_covariance() -> DMatrix<f64> {
    DMatrix::identity(3, 3) * 0.01
}

#[test]
fn first_call_requests_the_jacobian_batch() {
    let config = study();
    let store = MemoryStore::for_study(&config);
    let mut engine = Engine::new(&config, &store);

    let outcome = solve_unobserved(
        &mut engine,
        &config.begin(),
        &Transform::identity(&OBS),
        &internal_covariance(),
        true,
        &Config::default(),
    )
    .unwrap();

    assert_eq!(outcome.pending().map(simfit_core::PendingRuns::len), Some(3));
    assert_eq!(store.cases_in_state(RunState::New).len(), 3);
}

#[test]
fn converges_on_a_linear_model() {
    let config = study();
    let store = MemoryStore::for_study(&config);
    let mut engine = Engine::new(&config, &store);
    let transform = Transform::identity(&OBS);
    let covariance = internal_covariance();
    let gn = Config::default();
    let start = config.begin();

    let (solution, restarts) = drive(&store, linear, || {
        solve_unobserved(&mut engine, &start, &transform, &covariance, true, &gn)
    })
    .unwrap();

    assert!(restarts >= 2);
    assert_eq!(solution.status, Status::Converged);
    assert_relative_eq!(solution.optimum.get("a").unwrap(), 3.0, epsilon = 1e-8);
    assert_relative_eq!(solution.optimum.get("b").unwrap(), 4.0, epsilon = 1e-8);
    assert!(solution.cost < 1e-12);
    assert_eq!(solution.iters, solution.iterations.len());
    assert_eq!(solution.iterations[0].params, start);
    assert_eq!(solution.iterations[0].accepted_alpha, Some(1.0));
    assert_eq!(solution.hessian.shape(), (2, 2));
    assert_relative_eq!(solution.internal_covariance, covariance, epsilon = 1e-15);
}

#[test]
fn replaying_a_finished_solve_needs_no_new_runs() {
    let config = study();
    let store = MemoryStore::for_study(&config);
    let mut engine = Engine::new(&config, &store);
    let transform = Transform::identity(&OBS);
    let covariance = internal_covariance();
    let start = config.begin();

    let (first, _) = drive(&store, linear, || {
        solve_unobserved(&mut engine, &start, &transform, &covariance, true, &Config::default())
    })
    .unwrap();
    let cached = store.len();

    let again = solve_unobserved(&mut engine, &start, &transform, &covariance, true, &Config::default())
        .unwrap()
        .ready()
        .expect("everything is cached");

    assert_eq!(again, first);
    assert_eq!(store.len(), cached);
}

#[test]
fn stops_at_max_iters() {
    let config = study();
    let store = MemoryStore::for_study(&config);
    let mut engine = Engine::new(&config, &store);
    let transform = Transform::identity(&OBS);
    let covariance = internal_covariance();
    let gn = Config::new(1, vec![0.5], 1.0).unwrap();

    let (solution, _) = drive(&store, linear, || {
        solve_unobserved(&mut engine, &config.begin(), &transform, &covariance, true, &gn)
    })
    .unwrap();

    // Half a Gauss-Newton step from (5, 5) towards (3, 4).
    assert_eq!(solution.status, Status::MaxIters);
    assert_eq!(solution.iters, 1);
    assert_relative_eq!(solution.optimum.get("a").unwrap(), 4.0, epsilon = 1e-8);
    assert_relative_eq!(solution.optimum.get("b").unwrap(), 4.5, epsilon = 1e-8);
}

#[test]
fn observer_can_stop_early() {
    let config = study();
    let store = MemoryStore::for_study(&config);
    let mut engine = Engine::new(&config, &store);
    let transform = Transform::identity(&OBS);
    let covariance = internal_covariance();
    let gn = Config::default();

    let mut seen = Vec::new();
    let (solution, _) = drive(&store, linear, || {
        seen.clear();
        let observer = |event: &Event<'_>| {
            seen.push(event.iteration.iteration);
            Some(Action::StopEarly)
        };
        solve(&mut engine, &config.begin(), &transform, &covariance, true, &gn, observer)
    })
    .unwrap();

    assert_eq!(solution.status, Status::StoppedByObserver);
    assert_eq!(solution.iters, 1);
    assert_eq!(seen, [1]);
}

#[test]
fn whitening_transform_is_applied() {
    let config = study();
    let store = MemoryStore::for_study(&config);
    let mut engine = Engine::new(&config, &store);
    let error_covariance = DMatrix::from_row_slice(3, 3, &[2.0, 0.5, 0.0, 0.5, 1.0, 0.0, 0.0, 0.0, 4.0]);
    let transform = Transform::whitening(&error_covariance, &OBS).unwrap();
    let covariance = error_covariance.clone();

    let (solution, _) = drive(&store, linear, || {
        solve_unobserved(&mut engine, &config.begin(), &transform, &covariance, true, &Config::default())
    })
    .unwrap();

    // The error covariance whitens to the identity.
    assert_relative_eq!(solution.internal_covariance, DMatrix::identity(3, 3), epsilon = 1e-10);
    assert_relative_eq!(solution.optimum.get("a").unwrap(), 3.0, epsilon = 1e-8);
    assert_relative_eq!(solution.optimum.get("b").unwrap(), 4.0, epsilon = 1e-8);
}

#[test]
fn singular_hessian_is_fatal() {
    let config = study();
    let store = MemoryStore::for_study(&config);
    let mut engine = Engine::new(&config, &store);
    let transform = Transform::identity(&OBS);
    let covariance = internal_covariance();

    let result = drive(&store, insensitive, || {
        solve_unobserved(&mut engine, &config.begin(), &transform, &covariance, true, &Config::default())
    });

    assert!(matches!(result, Err(Error::SingularHessian { iteration: 1 })));
}

#[test]
fn rejects_mismatched_shapes() {
    let config = study();
    let store = MemoryStore::for_study(&config);
    let mut engine = Engine::new(&config, &store);
    let gn = Config::default();
    let start = config.begin();

    let bad_cov = solve_unobserved(
        &mut engine,
        &start,
        &Transform::identity(&OBS),
        &DMatrix::identity(2, 2),
        true,
        &gn,
    );
    assert!(matches!(
        bad_cov,
        Err(Error::Covariance {
            expected: 3,
            received: (2, 2)
        })
    ));

    let bad_transform = solve_unobserved(
        &mut engine,
        &start,
        &Transform::identity(&["x", "y"]),
        &internal_covariance(),
        true,
        &gn,
    );
    assert!(matches!(
        bad_transform,
        Err(Error::Eval(EvalError::TransformShape { .. }))
    ));

    let bad_start = solve_unobserved(
        &mut engine,
        &[1.0],
        &Transform::identity(&OBS),
        &internal_covariance(),
        true,
        &gn,
    );
    assert!(matches!(bad_start, Err(Error::Config(_))));
    assert!(store.is_empty());
}
