use std::time::Duration;

use skein_notify::{NotificationQueue, WaitOutcome};
use skein_core::Handle;

/// P5 — no lost wakeup: registers interest on `handle`, invokes `trigger`
/// (expected to call `notify` on the same handle from this or another
/// thread), and asserts the registration observes a payload within
/// `timeout` rather than hanging or silently missing the notify.
pub fn assert_no_lost_wakeup(queue: &NotificationQueue, handle: Handle, timeout: Duration, trigger: impl FnOnce()) {
    let waiter = queue
        .register_interest(handle)
        .expect("handle must still be registered");
    trigger();
    match waiter.block_timeout(timeout) {
        Ok(WaitOutcome::Notified(_)) => {}
        Ok(WaitOutcome::TimedOut) => panic!("notify that happened after register_interest was lost"),
        Err(err) => panic!("handle was unregistered out from under the wait: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_notify_issued_after_registering_interest_is_always_observed() {
        let queue = NotificationQueue::new();
        let handle = queue.register("p5-test");
        let queue_for_trigger = queue.clone();
        assert_no_lost_wakeup(&queue, handle, Duration::from_millis(200), || {
            queue_for_trigger.notify(handle, 7).unwrap();
        });
    }

    #[test]
    fn a_concurrent_notify_from_another_thread_is_still_observed() {
        let queue = NotificationQueue::new();
        let handle = queue.register("p5-concurrent");
        let queue_for_thread = queue.clone();
        assert_no_lost_wakeup(&queue, handle, Duration::from_millis(500), move || {
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                queue_for_thread.notify(handle, 1).unwrap();
            });
        });
    }
}
