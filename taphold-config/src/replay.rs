//! Run a scripted sequence of key events through the engine's dispatcher.
//!
//! A script has one event per line, with `#` starting a comment:
//!
//! ```text
//! 0    down b0     # press the key bound to tap-hold binding 0
//! 50   down a      # press a plain key
//! 60   up a
//! 90   up b0
//! 120  reset 0     # cancel binding 0
//! 130  reset_all
//! 400  tick        # let time pass
//! ```
//!
//! Times are in milliseconds and may not go backwards. Tapping terms that elapse between events
//! are delivered at their deadline, as the firmware timer would.

use std::ops::Range;

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use taphold_engine::{
    config_loader,
    dispatcher::{DispatchChannel, Dispatcher, KeyTransition, Report},
    ResolvedAction, Timestamp,
};

use crate::{
    compiler::TapHoldConfig,
    keycodes::{key_code, key_name},
    ConfigError,
};

type Result<T> = core::result::Result<T, ConfigError>;

pub const MAX_BINDINGS: usize = 64;
const REPORT_BUFFER_SIZE: usize = 32;

#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Key(KeyTransition),
    Reset(usize),
    ResetAll,
    Tick,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Step {
    pub time: Timestamp,
    pub event: Event,
    pub span: Range<usize>,
}

pub fn parse_script(source: &str) -> Result<Vec<Step>> {
    let mut steps = vec![];
    let mut start = 0;
    for line in source.split_inclusive('\n') {
        let span = start..start + line.find('#').unwrap_or(line.len());
        start += line.len();

        let words: Vec<_> = source[span.clone()].split_whitespace().collect();
        if words.is_empty() {
            continue;
        }
        let err = |message: String| ConfigError::new(message, span.clone());

        let time = words[0]
            .parse::<Timestamp>()
            .map_err(|_| err(format!("Invalid time '{}'", words[0])))?;
        let event = match words[1..] {
            ["down", key] => Event::Key(parse_key(key, true).map_err(err)?),
            ["up", key] => Event::Key(parse_key(key, false).map_err(err)?),
            ["reset", index] => Event::Reset(
                index
                    .parse()
                    .map_err(|_| err(format!("Invalid binding index '{}'", index)))?,
            ),
            ["reset_all"] => Event::ResetAll,
            ["tick"] => Event::Tick,
            _ => return Err(err("Expected down, up, reset, reset_all or tick".into())),
        };
        steps.push(Step { time, event, span });
    }
    Ok(steps)
}

fn parse_key(name: &str, pressed: bool) -> core::result::Result<KeyTransition, String> {
    if let Some(index) = name.strip_prefix('b').and_then(|i| i.parse::<u16>().ok()) {
        return Ok(KeyTransition::bound(index, index as usize, pressed));
    }
    key_code(name)
        .map(|code| KeyTransition::plain(code, pressed))
        .ok_or_else(|| format!("Unknown key '{}'", name))
}

/// Replay `steps` against `config`, returning each report with the time it was produced.
pub fn replay(config: &TapHoldConfig, steps: &[Step]) -> Result<Vec<(Timestamp, Report<u16>)>> {
    let resolver = config_loader::load::<MAX_BINDINGS>(config.serialize())
        .map_err(|err| ConfigError::from(format!("Invalid config: {:?}", err).as_str()))?;
    let binding_count = resolver.len();

    let channel = DispatchChannel::<NoopRawMutex, u16, REPORT_BUFFER_SIZE>::default();
    let mut dispatcher = Dispatcher::new(resolver, &channel);
    let mut reports = vec![];
    let mut now = 0;

    let drain = |time: Timestamp, reports: &mut Vec<_>| {
        while let Some(report) = channel.try_receive() {
            log::debug!("{time}: {report:?}");
            reports.push((time, report));
        }
    };

    for step in steps {
        if step.time < now {
            return Err(ConfigError::new(
                format!("Time goes backwards; {} is before {}", step.time, now),
                step.span.clone(),
            ));
        }
        now = step.time;

        let index = match step.event {
            Event::Key(KeyTransition {
                binding: Some(index),
                ..
            })
            | Event::Reset(index) => Some(index),
            _ => None,
        };
        if let Some(index) = index.filter(|i| *i >= binding_count) {
            return Err(ConfigError::new(
                format!("Unknown binding {}; {} configured", index, binding_count),
                step.span.clone(),
            ));
        }

        // deliver tapping terms that elapse before this event
        loop {
            let deadline = dispatcher.resolver().wait_until();
            if deadline > now {
                break;
            }
            dispatcher.check_time(deadline);
            drain(deadline, &mut reports);
        }

        log::debug!("{now}: {:?}", step.event);
        match step.event {
            Event::Key(transition) => dispatcher.key_transition(transition, now),
            Event::Reset(index) => dispatcher.reset(index),
            Event::ResetAll => dispatcher.reset_all(),
            Event::Tick => dispatcher.check_time(now),
        }
        drain(now, &mut reports);
    }

    loop {
        let deadline = dispatcher.resolver().wait_until();
        if deadline == Timestamp::MAX {
            break;
        }
        dispatcher.check_time(deadline);
        drain(deadline, &mut reports);
    }

    Ok(reports)
}

fn code_name(code: u16) -> String {
    key_name(code)
        .map(|n| n.to_lowercase())
        .unwrap_or_else(|| format!("0x{code:02x}"))
}

pub fn format_report(report: &Report<u16>) -> String {
    match report {
        Report::Action(ResolvedAction::Tap(a)) => format!("tap {}", code_name(*a)),
        Report::Action(ResolvedAction::Hold(a)) => format!("hold {}", code_name(*a)),
        Report::Action(ResolvedAction::Release(a)) => format!("release {}", code_name(*a)),
        Report::Key(k, true) => format!("down {}", code_name(*k)),
        Report::Key(k, false) => format!("up {}", code_name(*k)),
        Report::Clear => "clear".into(),
    }
}

#[cfg(test)]
#[path = "replay_test.rs"]
mod test;
