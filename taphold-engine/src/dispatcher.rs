use core::{cell::Cell, fmt::Debug};

use embassy_futures::select::{select, Either};
use embassy_sync::{blocking_mutex::raw::RawMutex, channel::Channel, signal::Signal};
use embassy_time::{Instant, Timer};

use crate::resolver::{Resolved, ResolvedAction, Resolver, Timestamp};

/// A physical key transition as seen by the host's key-event dispatcher.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KeyTransition {
    /// Host key identifier; passed back untouched in [Report::Key] for plain keys.
    pub key: u16,
    /// Tap-hold binding of the key, if any.
    pub binding: Option<usize>,
    pub pressed: bool,
}
impl KeyTransition {
    pub fn plain(key: u16, pressed: bool) -> Self {
        Self {
            key,
            binding: None,
            pressed,
        }
    }

    pub fn bound(key: u16, binding: usize, pressed: bool) -> Self {
        Self {
            key,
            binding: Some(binding),
            pressed,
        }
    }
}

pub struct KeyChannel<M: RawMutex, const N: usize>(Channel<M, KeyTransition, N>);
impl<M: RawMutex, const N: usize> Default for KeyChannel<M, N> {
    fn default() -> Self {
        Self(Channel::new())
    }
}
impl<M: RawMutex, const N: usize> KeyChannel<M, N> {
    pub async fn send(&self, transition: KeyTransition) {
        self.0.send(transition).await;
    }

    pub fn try_send(&self, transition: KeyTransition) -> bool {
        self.0.try_send(transition).is_ok()
    }

    async fn receive(&self) -> KeyTransition {
        self.0.receive().await
    }
}

#[derive(Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Report<A> {
    Action(ResolvedAction<A>),
    /// A key without a binding, forwarded in order with the resolved actions.
    Key(u16, bool),
    /// Reports were lost because the buffer was full; the host should release everything.
    Clear,
}

#[derive(Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControlMessage {
    TimerExpired,
    Reset(usize),
    ResetAll,
    Exit,
}

pub struct ControlSignal<M: RawMutex>(Signal<M, ControlMessage>);
impl<M: RawMutex> Default for ControlSignal<M> {
    fn default() -> Self {
        Self(Signal::new())
    }
}
impl<M: RawMutex> ControlSignal<M> {
    /// Cancel binding `index`, e.g. on a layer change.
    pub fn reset(&self, index: usize) {
        self.0.signal(ControlMessage::Reset(index));
    }

    pub fn reset_all(&self) {
        self.0.signal(ControlMessage::ResetAll);
    }

    pub fn exit(&self) {
        self.0.signal(ControlMessage::Exit);
    }

    #[cfg(test)]
    pub fn try_take(&self) -> Option<ControlMessage> {
        self.0.try_take()
    }
}

/// Wakes the dispatcher when the earliest tapping term elapses. [DispatchTimer::run] must be
/// spawned alongside [Dispatcher::run].
pub struct DispatchTimer<M: RawMutex> {
    expires_at: Cell<Instant>,
    at_sig: Signal<M, Instant>,
    ctl_sig: ControlSignal<M>,
}
impl<M: RawMutex> Default for DispatchTimer<M> {
    fn default() -> Self {
        Self {
            expires_at: Cell::new(Instant::MAX),
            at_sig: Signal::new(),
            ctl_sig: Default::default(),
        }
    }
}
impl<M: RawMutex> DispatchTimer<M> {
    pub fn shutdown(&self) {
        self.at_sig.signal(Instant::MIN);
    }

    fn at(&self, expires_at: Instant) {
        self.at_sig.signal(expires_at);
    }

    async fn wait_control(&self) {
        self.expires_at.set(self.at_sig.wait().await);
    }

    pub async fn run(timer: &Self) {
        loop {
            match timer.expires_at.get() {
                Instant::MAX => timer.wait_control().await,
                Instant::MIN => break,
                expires_at => {
                    if let Either::First(_) =
                        select(Timer::at(expires_at), timer.wait_control()).await
                    {
                        timer.expires_at.set(Instant::MAX);
                        timer.ctl_sig.0.signal(ControlMessage::TimerExpired);
                    }
                }
            }
        }
    }
}

pub struct DispatchChannel<M: RawMutex, A, const N: usize>(
    Channel<M, Report<A>, N>,
    DispatchTimer<M>,
);
impl<M: RawMutex, A, const N: usize> Default for DispatchChannel<M, A, N> {
    fn default() -> Self {
        Self(Channel::new(), DispatchTimer::default())
    }
}
impl<M: RawMutex, A, const N: usize> DispatchChannel<M, A, N> {
    pub async fn receive(&self) -> Report<A> {
        self.0.receive().await
    }

    pub fn try_receive(&self) -> Option<Report<A>> {
        self.0.try_receive().ok()
    }

    pub fn timer(&self) -> &DispatchTimer<M> {
        &self.1
    }

    pub fn control(&self) -> &ControlSignal<M> {
        &self.1.ctl_sig
    }

    async fn wait_control(&self) -> ControlMessage {
        self.control().0.wait().await
    }

    fn report(&self, message: Report<A>) {
        if self.0.try_send(message).is_err() {
            crate::warn!("report buffer full; clearing");
            self.0.clear();
            let _ = self.0.try_send(Report::Clear);
        }
    }
}

/// Plays the host role around a [Resolver]: stamps key transitions with the current time,
/// finishes bindings when another key interrupts them or their tapping term elapses, and
/// reports everything in order on a [DispatchChannel].
///
/// An interrupted binding is finished before the interrupting key is reported so that a hold
/// modifier applies to it. A binding whose key is already up when it is finished is reset
/// straight away, which releases its tap.
pub struct Dispatcher<'c, A, M: RawMutex, const BINDINGS: usize, const REPORT_BUFFER_SIZE: usize>
{
    resolver: Resolver<A, BINDINGS>,
    report_channel: &'c DispatchChannel<M, A, REPORT_BUFFER_SIZE>,
    wait_time: Timestamp,
}
impl<
        'c,
        A: Copy + PartialEq + Debug,
        M: RawMutex,
        const BINDINGS: usize,
        const REPORT_BUFFER_SIZE: usize,
    > Dispatcher<'c, A, M, BINDINGS, REPORT_BUFFER_SIZE>
{
    pub fn new(
        resolver: Resolver<A, BINDINGS>,
        report_channel: &'c DispatchChannel<M, A, REPORT_BUFFER_SIZE>,
    ) -> Self {
        Self {
            resolver,
            report_channel,
            wait_time: u64::MAX,
        }
    }

    pub fn resolver(&self) -> &Resolver<A, BINDINGS> {
        &self.resolver
    }

    pub async fn run<const KEY_BUFFER_SIZE: usize>(
        &mut self,
        key_channel: &KeyChannel<M, KEY_BUFFER_SIZE>,
    ) {
        loop {
            let event = select(key_channel.receive(), self.report_channel.wait_control()).await;
            let now = Instant::now().as_millis();

            match event {
                Either::First(transition) => self.key_transition(transition, now),
                Either::Second(ControlMessage::TimerExpired) => self.check_time(now),
                Either::Second(ControlMessage::Reset(index)) => self.reset(index),
                Either::Second(ControlMessage::ResetAll) => self.reset_all(),
                Either::Second(ControlMessage::Exit) => {
                    self.report_channel.timer().shutdown();
                    return;
                }
            }
        }
    }

    pub fn key_transition(&mut self, transition: KeyTransition, now: Timestamp) {
        // deadlines that passed while no timer event was delivered still come first
        self.finish_expired(now);

        let actions = self
            .resolver
            .on_key_event(transition.binding, transition.pressed, now);
        if transition.pressed {
            self.finish_interrupted(now);
        }
        self.report_actions(actions);
        if transition.binding.is_none() {
            self.report_channel
                .report(Report::Key(transition.key, transition.pressed));
        }
        self.set_wait_time();
    }

    pub fn check_time(&mut self, now: Timestamp) {
        self.finish_expired(now);
        self.set_wait_time();
    }

    pub fn reset(&mut self, index: usize) {
        let actions = self.resolver.reset(index);
        self.report_actions(actions);
        self.set_wait_time();
    }

    pub fn reset_all(&mut self) {
        for index in 0..self.resolver.len() {
            let actions = self.resolver.reset(index);
            self.report_actions(actions);
        }
        self.set_wait_time();
    }

    fn finish_expired(&mut self, now: Timestamp) {
        while let Some(index) = self.resolver.expired(now) {
            self.finish(index, now);
        }
    }

    fn finish_interrupted(&mut self, now: Timestamp) {
        for index in 0..self.resolver.len() {
            let state = self.resolver.state(index);
            if state.is_pending() && state.is_interrupted() {
                self.finish(index, now);
            }
        }
    }

    fn finish(&mut self, index: usize, now: Timestamp) {
        let actions = self.resolver.resolve_pending(index, now);
        self.report_actions(actions);
        if !self.resolver.state(index).is_pressed() {
            let actions = self.resolver.reset(index);
            self.report_actions(actions);
        }
    }

    fn report_actions(&self, actions: Resolved<A>) {
        for action in actions {
            self.report_channel.report(Report::Action(action));
        }
    }

    fn set_wait_time(&mut self) {
        let t = self.resolver.wait_until();
        if t != self.wait_time {
            self.wait_time = t;
            self.report_channel.timer().at(if t == u64::MAX {
                Instant::MAX
            } else {
                Instant::from_millis(t)
            });
        } else if t != u64::MAX {
            self.report_channel.timer().at(Instant::from_millis(t));
        }
    }
}

#[cfg(test)]
#[path = "dispatcher_test.rs"]
mod test;
