/// A callback that must eventually run exactly once on the reactor thread.
pub type EventHandler = Box<dyn FnOnce() + Send + 'static>;
