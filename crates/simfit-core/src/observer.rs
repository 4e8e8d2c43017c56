/// Watches a driver's progress and may steer it.
///
/// Drivers call `observe` once per event. Returning `Some(action)` asks the
/// driver to take a driver-specific action; `None` lets it carry on.
///
/// Any `FnMut(&E) -> Option<A>` closure is an observer, and `()` is the
/// observer that never acts.
pub trait Observer<E, A> {
    /// Receives an event and optionally returns an action.
    fn observe(&mut self, event: &E) -> Option<A>;
}

impl<E, A, F> Observer<E, A> for F
where
    F: FnMut(&E) -> Option<A>,
{
    fn observe(&mut self, event: &E) -> Option<A> {
        self(event)
    }
}

impl<E, A> Observer<E, A> for () {
    fn observe(&mut self, _event: &E) -> Option<A> {
        None
    }
}
