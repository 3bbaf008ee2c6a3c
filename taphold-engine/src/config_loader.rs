use taphold_common::{globals, PROTOCOL_VERSION, USE_GLOBAL};

use crate::resolver::{ConfigError, Policy, Resolver, TapHoldBinding};

/// Words describing one binding: index, tap, hold, permissive_hold, tapping_term.
pub const BINDING_WORDS: usize = 5;

#[derive(Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LoadError {
    VersionMismatch,
    Corrupt,
    Config(ConfigError),
}

impl From<ConfigError> for LoadError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

/// Build a [Resolver] from a binary config. The format is as follows:
///
/// protocol version
/// binding count
/// globals count (number of words that follow for globals)
/// globals as (id, value) pairs
/// bindings as (index, tap action, hold action, permissive_hold, tapping_term)
///
/// `permissive_hold` and `tapping_term` may be [USE_GLOBAL] to inherit the global setting.
pub fn load<const N: usize>(
    iter: impl IntoIterator<Item = u16>,
) -> Result<Resolver<u16, N>, LoadError> {
    let mut iter = iter.into_iter();
    let mut next = || iter.next().ok_or(LoadError::Corrupt);

    if next()? != PROTOCOL_VERSION {
        return Err(LoadError::VersionMismatch);
    }
    let binding_count = next()? as usize;
    let mut globals_count = next()?;

    let mut policy = Policy::default();
    while globals_count != 0 {
        if globals_count < 2 {
            crate::info!("corrupt config: globals_count is wrong");
            return Err(LoadError::Corrupt);
        }
        let id = next()?;
        let value = next()?;
        match id {
            globals::TAPPING_TERM => policy.tapping_term = value,
            globals::PERMISSIVE_HOLD => policy.permissive_hold = value != 0,
            _ => crate::warn!("ignoring unknown global {}", id),
        }
        globals_count -= 2;
    }

    let mut bindings = heapless::Vec::<TapHoldBinding<u16>, N>::new();
    for _ in 0..binding_count {
        let mut words = [0; BINDING_WORDS];
        for w in words.iter_mut() {
            *w = next()?;
        }
        let [index, tap, hold, permissive_hold, tapping_term] = words;
        let binding = TapHoldBinding {
            index: index as usize,
            tap_action: tap,
            hold_action: hold,
            permissive_hold: optional(permissive_hold).map(|v| v != 0),
            tapping_term: optional(tapping_term),
        };
        bindings
            .push(binding)
            .map_err(|_| ConfigError::TooManyBindings(N))?;
    }

    if iter.next().is_some() {
        crate::info!("corrupt config: trailing data");
        return Err(LoadError::Corrupt);
    }

    Ok(Resolver::configure(bindings, policy)?)
}

fn optional(word: u16) -> Option<u16> {
    if word == USE_GLOBAL {
        None
    } else {
        Some(word)
    }
}

#[cfg(test)]
#[path = "config_loader_test.rs"]
mod test;
