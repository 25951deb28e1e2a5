//! Process-wide shutdown task registry.
//!
//! Components that spawn subprocesses or create temporary state
//! register a teardown callback here; the daemon drains the registry in
//! registration order on signal reception. The drain runs each task at
//! most once and does not re-enter tasks registered while draining.

use std::sync::Mutex;

type ShutdownTask = Box<dyn FnOnce() + Send>;

static TASKS: Mutex<Vec<ShutdownTask>> = Mutex::new(Vec::new());

/// Registers a task to run at shutdown.
pub fn register_shutdown_task(task: impl FnOnce() + Send + 'static) {
    TASKS
        .lock()
        .expect("shutdown registry poisoned")
        .push(Box::new(task));
}

/// Runs all registered shutdown tasks in registration order.
///
/// The task list is taken before execution so tasks registered during
/// the drain are left for a later drain rather than re-entered.
pub fn run_shutdown_tasks() {
    let tasks = std::mem::take(&mut *TASKS.lock().expect("shutdown registry poisoned"));
    tracing::debug!(count = tasks.len(), "running shutdown tasks");
    for task in tasks {
        task();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn tasks_run_in_registration_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let counter = Arc::new(AtomicUsize::new(0));
        for i in 0..3 {
            let order = Arc::clone(&order);
            let counter = Arc::clone(&counter);
            register_shutdown_task(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                order.lock().unwrap().push(i);
            });
        }
        run_shutdown_tasks();
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);

        // Second drain is a noop.
        run_shutdown_tasks();
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }
}
