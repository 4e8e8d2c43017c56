/// Actions an observer can take during a Gauss-Newton solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Stop the solver and return the best point found so far.
    StopEarly,
}
