use embassy_futures::{block_on, join::join};
use embassy_sync::blocking_mutex::raw::NoopRawMutex;

use crate::{
    config_loader, kc,
    resolver::{ResolvedAction::*, TapHoldState},
    time_driver_test_stub::{set_time, set_wait_lag},
};

use super::*;

extern crate std;
use std::vec::Vec;

use Report::*;

const KEY_A: u16 = 0x10;
const KEY_B: u16 = 0x11;
const LSFT_KEY: u16 = 0x20;
const RSFT_KEY: u16 = 0x21;

const CONFIG: &str = r#"
[tap_hold]
0 = enter leftshift
1 = space rightshift
"#;

const PERMISSIVE_CONFIG: &str = r#"
[global]
permissive_hold = true

[tap_hold]
0 = enter leftshift
1 = space rightshift
"#;

type TestChannel = DispatchChannel<NoopRawMutex, u16, 10>;

macro_rules! setup {
    ($t:ident, $channel:ident, $src:expr, $x:block) => {{
        let $channel = TestChannel::default();
        let resolver =
            config_loader::load::<4>(taphold_config::text_to_binary($src).unwrap()).unwrap();
        #[allow(unused_mut)]
        let mut $t = Dispatcher::new(resolver, &$channel);
        $x
    }};
}

fn drain(channel: &TestChannel) -> Vec<Report<u16>> {
    std::iter::from_fn(|| channel.try_receive()).collect()
}

fn lsft(pressed: bool) -> KeyTransition {
    KeyTransition::bound(LSFT_KEY, 0, pressed)
}

fn rsft(pressed: bool) -> KeyTransition {
    KeyTransition::bound(RSFT_KEY, 1, pressed)
}

#[test]
fn interrupted_hold_modifies_interrupting_key() {
    setup!(t, ch, PERMISSIVE_CONFIG, {
        t.key_transition(lsft(true), 0);
        assert!(drain(&ch).is_empty());

        t.key_transition(KeyTransition::plain(KEY_A, true), 50);
        assert_eq!(
            drain(&ch),
            [Action(Hold(kc!("leftshift"))), Key(KEY_A, true)]
        );

        t.key_transition(KeyTransition::plain(KEY_A, false), 70);
        t.key_transition(lsft(false), 90);
        assert_eq!(
            drain(&ch),
            [Key(KEY_A, false), Action(Release(kc!("leftshift")))]
        );
    });
}

#[test]
fn interrupted_tap_precedes_interrupting_key() {
    setup!(t, ch, CONFIG, {
        t.key_transition(lsft(true), 0);
        t.key_transition(KeyTransition::plain(KEY_A, true), 50);
        assert_eq!(drain(&ch), [Action(Tap(kc!("enter"))), Key(KEY_A, true)]);

        t.key_transition(lsft(false), 60);
        t.key_transition(KeyTransition::plain(KEY_A, false), 70);
        assert_eq!(
            drain(&ch),
            [Action(Release(kc!("enter"))), Key(KEY_A, false)]
        );
    });
}

#[test]
fn other_binding_interrupts() {
    setup!(t, ch, CONFIG, {
        t.key_transition(lsft(true), 0);
        t.key_transition(rsft(true), 20);
        assert_eq!(drain(&ch), [Action(Tap(kc!("enter")))]);

        t.check_time(220);
        assert_eq!(drain(&ch), [Action(Hold(kc!("rightshift")))]);

        t.key_transition(rsft(false), 300);
        t.key_transition(lsft(false), 310);
        assert_eq!(
            drain(&ch),
            [
                Action(Release(kc!("rightshift"))),
                Action(Release(kc!("enter")))
            ]
        );
    });
}

#[test]
fn tapping_term_expiry_holds() {
    setup!(t, ch, CONFIG, {
        t.key_transition(lsft(true), 0);
        t.check_time(199);
        assert!(drain(&ch).is_empty());

        t.check_time(200);
        assert_eq!(drain(&ch), [Action(Hold(kc!("leftshift")))]);

        t.key_transition(lsft(false), 400);
        assert_eq!(drain(&ch), [Action(Release(kc!("leftshift")))]);
    });
}

#[test]
fn tap_released_when_term_expires() {
    setup!(t, ch, CONFIG, {
        t.key_transition(lsft(true), 0);
        t.key_transition(lsft(false), 50);
        assert_eq!(drain(&ch), [Action(Tap(kc!("enter")))]);

        t.check_time(200);
        assert_eq!(drain(&ch), [Action(Release(kc!("enter")))]);
        assert_eq!(*t.resolver().state(0), TapHoldState::default());
    });
}

#[test]
fn tap_released_before_next_key() {
    setup!(t, ch, CONFIG, {
        t.key_transition(lsft(true), 0);
        t.key_transition(lsft(false), 50);
        t.key_transition(KeyTransition::plain(KEY_B, true), 60);
        assert_eq!(
            drain(&ch),
            [
                Action(Tap(kc!("enter"))),
                Action(Release(kc!("enter"))),
                Key(KEY_B, true)
            ]
        );
    });
}

#[test]
fn double_tap() {
    setup!(t, ch, CONFIG, {
        t.key_transition(lsft(true), 0);
        t.key_transition(lsft(false), 30);
        t.key_transition(lsft(true), 60);
        assert_eq!(drain(&ch), [Action(Tap(kc!("enter")))]);

        t.check_time(259);
        assert!(drain(&ch).is_empty());
        t.check_time(260);
        assert_eq!(
            drain(&ch),
            [Action(Release(kc!("enter"))), Action(Tap(kc!("enter")))]
        );

        t.key_transition(lsft(false), 300);
        assert_eq!(drain(&ch), [Action(Release(kc!("enter")))]);
    });
}

#[test]
fn late_key_sees_expired_hold() {
    setup!(t, ch, CONFIG, {
        t.key_transition(lsft(true), 0);
        t.key_transition(KeyTransition::plain(KEY_A, true), 500);
        assert_eq!(
            drain(&ch),
            [Action(Hold(kc!("leftshift"))), Key(KEY_A, true)]
        );
    });
}

#[test]
fn reset_and_reset_all() {
    setup!(t, ch, CONFIG, {
        t.key_transition(lsft(true), 0);
        t.key_transition(rsft(true), 10);
        t.check_time(210);
        assert_eq!(
            drain(&ch),
            [
                Action(Tap(kc!("enter"))),
                Action(Hold(kc!("rightshift")))
            ]
        );

        t.reset(1);
        t.reset(1);
        assert_eq!(drain(&ch), [Action(Release(kc!("rightshift")))]);

        t.reset_all();
        assert_eq!(drain(&ch), [Action(Release(kc!("enter")))]);

        t.key_transition(lsft(false), 300);
        t.key_transition(rsft(false), 310);
        assert!(drain(&ch).is_empty());
    });
}

#[test]
fn full_report_buffer_clears() {
    setup!(t, ch, CONFIG, {
        for i in 0..10 {
            t.key_transition(KeyTransition::plain(i, true), i as u64);
        }
        assert_eq!(ch.0.free_capacity(), 0);

        t.key_transition(KeyTransition::plain(KEY_A, true), 20);
        assert_eq!(drain(&ch), [Clear]);
    });
}

#[test]
fn timer_follows_earliest_deadline() {
    setup!(t, ch, CONFIG, {
        let timer = ch.timer();
        t.key_transition(lsft(true), 100);
        assert_eq!(timer.at_sig.try_take(), Some(Instant::from_millis(300)));

        t.key_transition(lsft(false), 150);
        assert_eq!(timer.at_sig.try_take(), Some(Instant::from_millis(300)));

        t.check_time(300);
        assert_eq!(timer.at_sig.try_take(), Some(Instant::MAX));
    });
}

#[test]
fn run_until_exit() {
    setup!(t, ch, CONFIG, {
        set_time(1_000_000);
        let keys = KeyChannel::<NoopRawMutex, 8>::default();
        assert!(keys.try_send(lsft(true)));
        assert!(keys.try_send(KeyTransition::plain(KEY_A, true)));
        assert!(keys.try_send(KeyTransition::plain(KEY_A, false)));
        assert!(keys.try_send(lsft(false)));
        ch.control().exit();

        block_on(t.run(&keys));

        assert_eq!(
            drain(&ch),
            [
                Action(Tap(kc!("enter"))),
                Key(KEY_A, true),
                Key(KEY_A, false),
                Action(Release(kc!("enter")))
            ]
        );
        assert_eq!(ch.timer().at_sig.try_take(), Some(Instant::MIN));
        set_time(0);
    });
}

#[test]
fn run_handles_control_messages() {
    setup!(t, ch, CONFIG, {
        set_time(2_000_000);
        let keys = KeyChannel::<NoopRawMutex, 8>::default();
        assert!(keys.try_send(lsft(true)));
        assert!(keys.try_send(rsft(true)));
        ch.control().reset(0);

        // the second future only runs once the dispatcher has drained the keys and the reset
        block_on(join(t.run(&keys), async {
            assert!(ch.control().try_take().is_none());
            ch.control().exit();
        }));

        assert_eq!(
            drain(&ch),
            [Action(Tap(kc!("enter"))), Action(Release(kc!("enter")))]
        );
        assert_eq!(*t.resolver().state(0), TapHoldState::default());
        assert!(t.resolver().state(1).is_pending());
        set_time(0);
    });
}

#[test]
fn dispatch_timer_signals_expiry() {
    set_time(1_000);
    set_wait_lag(5);
    let ch = TestChannel::default();
    let timer = ch.timer();
    timer.at(Instant::from_micros(2_000));

    block_on(join(DispatchTimer::run(timer), async {
        assert_eq!(ch.wait_control().await, ControlMessage::TimerExpired);
        timer.shutdown();
    }));

    assert_eq!(Instant::now(), Instant::from_micros(2_005));
    assert_eq!(timer.expires_at.get(), Instant::MIN);
    set_wait_lag(0);
    set_time(0);
}
