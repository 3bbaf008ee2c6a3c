extern crate std;

use core::{cell::RefCell, task::Waker};
use embassy_time_driver::Driver;
use std::time::SystemTime;

struct TestTimeDriver;

impl Driver for TestTimeDriver {
    fn now(&self) -> u64 {
        NOW.with_borrow(|now| {
            if now.0 == 0 {
                SystemTime::now()
                    .duration_since(SystemTime::UNIX_EPOCH)
                    .map(|d| d.as_micros() as u64)
                    .unwrap_or(1)
            } else {
                now.0
            }
        })
    }

    /// Jumps virtual time straight to `at` so timers complete without sleeping.
    fn schedule_wake(&self, at: u64, waker: &Waker) {
        NOW.with_borrow_mut(|now| {
            if now.0 != 0 && at > now.0 {
                now.0 = at + now.1;
            }
        });

        waker.wake_by_ref();
    }
}

std::thread_local! {
    static NOW: RefCell<(u64,u64)> = const {RefCell::new((0,0))};
}

embassy_time_driver::time_driver_impl!(static TIME_DRIVER: TestTimeDriver = TestTimeDriver);

/// Set virtual time in microseconds. Zero switches back to the system clock.
pub fn set_time(t: u64) {
    NOW.with_borrow_mut(|now| now.0 = t);
}

/// Extra microseconds added whenever a timer jumps virtual time forward.
pub fn set_wait_lag(t: u64) {
    NOW.with_borrow_mut(|now| now.1 = t);
}
