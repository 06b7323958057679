use std::sync::{Mutex, MutexGuard};

use tracing::warn;

/// Locks `lock`, recovering the guard if a previous holder panicked.
pub(crate) fn mutex_lock<'a, T>(
    lock: &'a Mutex<T>,
    target: &'static str,
    op: &'static str,
) -> MutexGuard<'a, T> {
    lock.lock().unwrap_or_else(|poisoned| {
        warn!(
            op,
            target_module = target,
            result = "poisoned_recovered",
            hint = "queue contents may be partial after a panic in another task",
            "Recovered from poisoned mutex"
        );
        poisoned.into_inner()
    })
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;

    #[test]
    fn recovers_after_poisoning() {
        let lock = Mutex::new(vec![1]);
        let result = catch_unwind(AssertUnwindSafe(|| {
            let _guard = lock.lock().expect("first lock");
            panic!("poison");
        }));
        assert!(result.is_err());
        assert!(lock.is_poisoned());

        let mut guard = mutex_lock(&lock, "util::lock::tests", "push");
        guard.push(2);
        assert_eq!(*guard, vec![1, 2]);
    }
}
