use parking_lot::Mutex;
use std::sync::Arc;

/// State written by one task and read by request handlers
pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

/// Copy out the current value without holding the lock
pub fn snapshot<T: Clone>(state: &Shared<T>) -> T {
    state.lock().clone()
}
