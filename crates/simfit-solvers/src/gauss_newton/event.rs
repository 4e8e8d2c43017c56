use super::Iteration;

/// Emitted once per completed iteration.
///
/// Observers see the finished iteration record together with the best point
/// so far and the convergence threshold, and may return
/// [`Action::StopEarly`](super::Action::StopEarly).
#[derive(Debug, Clone, Copy)]
pub struct Event<'a> {
    /// The iteration just completed.
    pub iteration: &'a Iteration,

    /// Best parameters after this iteration.
    pub best: &'a [f64],

    /// Cost at `best`.
    pub best_cost: f64,

    /// Improvement below which the solver counts as converged.
    pub threshold: f64,
}
