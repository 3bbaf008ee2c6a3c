use core::{fmt::Debug, mem};

use taphold_common::globals;

/// Milliseconds from a monotonic clock.
pub type Timestamp = u64;

/// Most actions a single call can emit: releasing the previously registered action and
/// registering the new one.
pub const MAX_RESOLVED: usize = 2;

/// Actions produced by one call, to be applied by the host in order.
pub type Resolved<A> = heapless::Vec<ResolvedAction<A>, MAX_RESOLVED>;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResolvedAction<A> {
    Tap(A),
    Hold(A),
    Release(A),
}
impl<A: Copy> ResolvedAction<A> {
    pub fn action(&self) -> A {
        match self {
            Self::Tap(a) | Self::Hold(a) | Self::Release(a) => *a,
        }
    }

    /// True when the host should register (press) the action.
    pub fn is_down(&self) -> bool {
        !matches!(self, Self::Release(_))
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TapHoldBinding<A> {
    pub index: usize,
    pub tap_action: A,
    pub hold_action: A,
    /// Overrides [Policy::permissive_hold] for this binding.
    pub permissive_hold: Option<bool>,
    /// Overrides [Policy::tapping_term] for this binding.
    pub tapping_term: Option<u16>,
}
impl<A> TapHoldBinding<A> {
    pub fn new(index: usize, tap_action: A, hold_action: A) -> Self {
        Self {
            index,
            tap_action,
            hold_action,
            permissive_hold: None,
            tapping_term: None,
        }
    }

    pub fn with_permissive_hold(mut self, permissive_hold: bool) -> Self {
        self.permissive_hold = Some(permissive_hold);
        self
    }

    pub fn with_tapping_term(mut self, tapping_term: u16) -> Self {
        self.tapping_term = Some(tapping_term);
        self
    }
}

/// Settings applied to every binding that does not override them.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Policy {
    /// Allow a single interrupted press to resolve to hold.
    pub permissive_hold: bool,
    /// Resolution window in milliseconds, measured from the most recent press.
    pub tapping_term: u16,
}
impl Default for Policy {
    fn default() -> Self {
        Self {
            permissive_hold: globals::PERMISSIVE_HOLD_DEFAULT,
            tapping_term: globals::TAPPING_TERM_DEFAULT,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    DuplicateIndex(usize),
    /// The binding table has a gap; the value is the first missing index.
    NotContiguous(usize),
    /// More bindings than the resolver's capacity, which is the value.
    TooManyBindings(usize),
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TapHoldState<A> {
    press_count: u8,
    interrupted: bool,
    resolved: bool,
    pressed: bool,
    pressed_at: Timestamp,
    active_action: Option<A>,
}
impl<A> Default for TapHoldState<A> {
    fn default() -> Self {
        Self {
            press_count: 0,
            interrupted: false,
            resolved: false,
            pressed: false,
            pressed_at: 0,
            active_action: None,
        }
    }
}
impl<A: Copy> TapHoldState<A> {
    pub fn press_count(&self) -> u8 {
        self.press_count
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    pub fn is_pressed(&self) -> bool {
        self.pressed
    }

    pub fn pressed_at(&self) -> Timestamp {
        self.pressed_at
    }

    pub fn active_action(&self) -> Option<A> {
        self.active_action
    }

    /// Pressed at least once in the current window and still undecided.
    pub fn is_pending(&self) -> bool {
        !self.resolved && self.press_count > 0
    }

    fn press(&mut self, now: Timestamp) {
        if self.resolved {
            self.press_count = 0;
        }
        self.press_count = self.press_count.saturating_add(1);
        self.resolved = false;
        self.interrupted = false;
        self.pressed = true;
        self.pressed_at = now;
    }

    /// Registers `action`, releasing whatever was registered before so only one of tap and
    /// hold is ever down.
    fn register(&mut self, action: ResolvedAction<A>, out: &mut Resolved<A>) {
        if let Some(prev) = self.active_action.take() {
            emit(out, ResolvedAction::Release(prev));
        }
        self.active_action = Some(action.action());
        emit(out, action);
    }
}

fn emit<A>(out: &mut Resolved<A>, action: ResolvedAction<A>) {
    if out.push(action).is_err() {
        crate::error!("resolved action buffer full");
    }
}

struct Slot<A> {
    binding: TapHoldBinding<A>,
    state: TapHoldState<A>,
}

/// Decides between the tap and hold action of each configured binding.
///
/// The resolver never talks to the output layer itself; every entry point returns the
/// [ResolvedAction]s the host must apply in order. Bindings are independent state machines
/// that only share the interruption broadcast: pressing any key marks every other undecided
/// binding as interrupted.
///
/// An index outside the configured table is a bug in the host's dispatch table and panics.
pub struct Resolver<A, const N: usize> {
    slots: heapless::Vec<Slot<A>, N>,
    policy: Policy,
}

impl<A: Copy + PartialEq + Debug, const N: usize> Resolver<A, N> {
    /// Build a resolver with one zeroed state per binding. Binding indices must be unique and
    /// dense from zero; the order they are supplied in does not matter.
    pub fn configure(
        bindings: impl IntoIterator<Item = TapHoldBinding<A>>,
        policy: Policy,
    ) -> Result<Self, ConfigError> {
        let mut table = heapless::Vec::<TapHoldBinding<A>, N>::new();
        for binding in bindings {
            table
                .push(binding)
                .map_err(|_| ConfigError::TooManyBindings(N))?;
        }
        table.sort_unstable_by_key(|b| b.index);

        let mut slots = heapless::Vec::new();
        for (i, binding) in table.into_iter().enumerate() {
            if binding.index < i {
                return Err(ConfigError::DuplicateIndex(binding.index));
            }
            if binding.index > i {
                return Err(ConfigError::NotContiguous(i));
            }
            if slots
                .push(Slot {
                    binding,
                    state: TapHoldState::default(),
                })
                .is_err()
            {
                return Err(ConfigError::TooManyBindings(N));
            }
        }

        crate::debug!("configured {} tap-hold bindings", slots.len());
        Ok(Self { slots, policy })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    pub fn binding(&self, index: usize) -> &TapHoldBinding<A> {
        &self.slot(index).binding
    }

    pub fn state(&self, index: usize) -> &TapHoldState<A> {
        &self.slot(index).state
    }

    /// Feed one physical key transition. `binding` is `None` for keys without a tap-hold
    /// binding; those only ever interrupt pending bindings and produce no actions.
    pub fn on_key_event(
        &mut self,
        binding: Option<usize>,
        pressed: bool,
        now: Timestamp,
    ) -> Resolved<A> {
        let mut out = Resolved::new();
        if let Some(index) = binding {
            self.check_index(index);
        }
        if pressed {
            self.interrupt_pending(binding);
        }

        let Some(index) = binding else {
            return out;
        };
        let state = &mut self.slots[index].state;
        if pressed {
            state.press(now);
            return out;
        }

        let was_pressed = mem::replace(&mut state.pressed, false);
        if state.is_pending() {
            if was_pressed {
                // The key went up before the decision; it can only ever be a tap now.
                crate::debug!("binding {} released early", index);
                let tap = self.slots[index].binding.tap_action;
                self.slots[index]
                    .state
                    .register(ResolvedAction::Tap(tap), &mut out);
            }
            return out;
        }

        if let Some(active) = state.active_action.take() {
            emit(&mut out, ResolvedAction::Release(active));
        }
        state.press_count = 0;
        state.interrupted = false;
        out
    }

    /// Commit the tap/hold decision for `index`. Called by the host when the tapping term
    /// elapses or when it chooses to finish an interrupted binding early.
    ///
    /// Does nothing for an idle or already resolved binding. If the key was already released
    /// the decision is only recorded; the host is expected to follow up with [Self::reset].
    pub fn resolve_pending(&mut self, index: usize, now: Timestamp) -> Resolved<A> {
        let mut out = Resolved::new();
        let default_permissive = self.policy.permissive_hold;
        let slot = self.slot_mut(index);
        let state = &mut slot.state;
        if !state.is_pending() {
            return out;
        }
        state.resolved = true;
        if !state.pressed {
            return out;
        }

        let permissive = slot.binding.permissive_hold.unwrap_or(default_permissive);
        let action = if state.press_count == 1 && (permissive || !state.interrupted) {
            ResolvedAction::Hold(slot.binding.hold_action)
        } else {
            ResolvedAction::Tap(slot.binding.tap_action)
        };
        crate::debug!(
            "binding {} resolved to {} after {}ms",
            index,
            if action.is_hold() { "hold" } else { "tap" },
            now.saturating_sub(state.pressed_at)
        );
        state.register(action, &mut out);
        out
    }

    /// Forcibly release whatever `index` has registered and return it to idle.
    pub fn reset(&mut self, index: usize) -> Resolved<A> {
        let mut out = Resolved::new();
        let state = &mut self.slot_mut(index).state;
        if let Some(active) = state.active_action.take() {
            emit(&mut out, ResolvedAction::Release(active));
        }
        *state = TapHoldState::default();
        out
    }

    /// Earliest deadline of any pending binding, or `u64::MAX` when nothing is pending.
    pub fn wait_until(&self) -> Timestamp {
        self.slots
            .iter()
            .filter(|s| s.state.is_pending())
            .map(|s| self.deadline(s))
            .min()
            .unwrap_or(u64::MAX)
    }

    /// First pending binding whose tapping term has elapsed at `now`.
    pub fn expired(&self, now: Timestamp) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.state.is_pending() && self.deadline(s) <= now)
    }

    fn deadline(&self, slot: &Slot<A>) -> Timestamp {
        let term = slot.binding.tapping_term.unwrap_or(self.policy.tapping_term);
        slot.state.pressed_at.saturating_add(term as u64)
    }

    fn interrupt_pending(&mut self, except: Option<usize>) {
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if except != Some(i) && slot.state.is_pending() && !slot.state.interrupted {
                crate::debug!("binding {} interrupted", i);
                slot.state.interrupted = true;
            }
        }
    }

    fn check_index(&self, index: usize) {
        if index >= self.slots.len() {
            index_error(index, self.slots.len());
        }
    }

    fn slot(&self, index: usize) -> &Slot<A> {
        self.check_index(index);
        &self.slots[index]
    }

    fn slot_mut(&mut self, index: usize) -> &mut Slot<A> {
        self.check_index(index);
        &mut self.slots[index]
    }
}

impl<A> ResolvedAction<A> {
    fn is_hold(&self) -> bool {
        matches!(self, Self::Hold(_))
    }
}

#[cold]
fn index_error(index: usize, len: usize) -> ! {
    panic!("tap-hold binding {} out of range; {} configured", index, len)
}

#[cfg(test)]
#[path = "resolver_test.rs"]
mod test;
