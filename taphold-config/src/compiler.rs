use std::{collections::BTreeMap, ops::Range};

use taphold_common::{globals, PROTOCOL_VERSION, USE_GLOBAL};

use crate::{keycodes::key_code, ConfigError};

type Result<T> = core::result::Result<T, ConfigError>;
type NameRange = Range<usize>;

const TOO_MANY_RHS: &str = "Only one value may be assigned";
const MISSING_ACTIONS: &str = "Expected a tap action and a hold action";
const MAX_DURATION: u16 = 5000;

#[derive(Clone, Copy, Debug, PartialEq)]
enum Section {
    None,
    Global,
    TapHold,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BindingConfig {
    pub index: u16,
    pub tap: u16,
    pub hold: u16,
    pub permissive_hold: Option<bool>,
    pub tapping_term: Option<u16>,
    pub span: NameRange,
}
impl BindingConfig {
    fn serialize(&self) -> [u16; 5] {
        [
            self.index,
            self.tap,
            self.hold,
            self.permissive_hold.map_or(USE_GLOBAL, u16::from),
            self.tapping_term.unwrap_or(USE_GLOBAL),
        ]
    }
}

#[derive(Debug, Default)]
pub struct TapHoldConfig {
    pub tapping_term: Option<u16>,
    pub permissive_hold: Option<bool>,
    bindings: BTreeMap<u16, BindingConfig>,
}
impl TapHoldConfig {
    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    pub fn binding(&self, index: u16) -> Option<&BindingConfig> {
        self.bindings.get(&index)
    }

    /// Bindings in index order.
    pub fn bindings(&self) -> impl Iterator<Item = &BindingConfig> {
        self.bindings.values()
    }

    /// The word stream read by `taphold_engine::config_loader::load`.
    pub fn serialize(&self) -> Vec<u16> {
        let globals = self.serialize_globals();
        let mut out = Vec::with_capacity(3 + globals.len() + self.bindings.len() * 5);

        out.push(PROTOCOL_VERSION);
        out.push(self.bindings.len() as u16);
        out.push(globals.len() as u16);
        out.extend_from_slice(&globals);
        for b in self.bindings.values() {
            out.extend_from_slice(&b.serialize());
        }

        out
    }

    pub fn serialize_globals(&self) -> Vec<u16> {
        let mut out = vec![];
        if let Some(tt) = self.tapping_term {
            out.extend_from_slice(&[globals::TAPPING_TERM, tt]);
        }
        if let Some(ph) = self.permissive_hold {
            out.extend_from_slice(&[globals::PERMISSIVE_HOLD, ph as u16]);
        }
        out
    }

    fn check_contiguous(&self) -> Result<()> {
        for (i, b) in self.bindings.values().enumerate() {
            if b.index as usize != i {
                return Err(error_span(
                    format!("Binding index {} is missing; indexes must count up from 0", i),
                    b.span.clone(),
                ));
            }
        }
        Ok(())
    }
}

struct Parser<'source> {
    source: &'source str,
    config: TapHoldConfig,
    section: Section,
}

impl<'source> Parser<'source> {
    fn new(source: &'source str) -> Self {
        Self {
            source,
            config: TapHoldConfig::default(),
            section: Section::None,
        }
    }

    fn parse_lines(&mut self) -> Result<()> {
        let mut start = 0;
        for line in self.source.split_inclusive('\n') {
            let end = start + line.len();
            let content = match line.find('#') {
                Some(i) => start..start + i,
                None => start..end,
            };
            self.parse_line(trim(self.source, content))?;
            start = end;
        }
        Ok(())
    }

    fn parse_line(&mut self, line: NameRange) -> Result<()> {
        if line.is_empty() {
            return Ok(());
        }
        let text = self.name(&line);
        if text.starts_with('[') {
            return self.parse_section(line);
        }

        let Some(eq) = text.find('=') else {
            return Err(error_span("Missing =", line));
        };
        let left = trim(self.source, line.start..line.start + eq);
        let right = trim(self.source, line.start + eq + 1..line.end);
        if left.is_empty() {
            return Err(error_span("Missing LHS", line));
        }
        if right.is_empty() {
            return Err(error_span("Missing RHS", line));
        }

        match self.section {
            Section::None => Err(error_span("expected '['", line.start..line.start + 1)),
            Section::Global => self.assign_global(left, right),
            Section::TapHold => self.parse_binding(left, right),
        }
    }

    fn parse_section(&mut self, line: NameRange) -> Result<()> {
        let text = self.name(&line);
        let Some(name) = text[1..].strip_suffix(']') else {
            return Err(error_span("missing ']'", line.start..line.start + 1));
        };
        self.section = match name.trim() {
            "global" => Section::Global,
            "tap_hold" => Section::TapHold,
            _ => {
                return Err(error_span(
                    format!("Unknown section '{}'", name.trim()),
                    line,
                ))
            }
        };
        Ok(())
    }

    fn assign_global(&mut self, name_range: NameRange, value_range: NameRange) -> Result<()> {
        let mut words = words(self.source, value_range);
        let Some(value) = words.next() else {
            return Err(error_span("Missing RHS", name_range));
        };
        if let Some(extra) = words.next() {
            return Err(error_span(TOO_MANY_RHS, extra));
        }

        match self.name(&name_range) {
            "tapping_term" => self.config.tapping_term = Some(self.parse_duration(&value)?),
            "permissive_hold" => self.config.permissive_hold = Some(self.parse_bool(&value)?),
            name => {
                return Err(error_span(
                    format!("Invalid global '{}'", name),
                    name_range,
                ))
            }
        }
        Ok(())
    }

    fn parse_binding(&mut self, index_range: NameRange, value_range: NameRange) -> Result<()> {
        let index = match self.name(&index_range).parse::<u16>() {
            Ok(i) if i != USE_GLOBAL => i,
            _ => return Err(error_span("Invalid binding index", index_range)),
        };
        if self.config.bindings.contains_key(&index) {
            return Err(error_span(
                format!("Duplicate binding index {}", index),
                index_range,
            ));
        }

        let mut words = words(self.source, value_range.clone());
        let (Some(tap), Some(hold)) = (words.next(), words.next()) else {
            return Err(error_span(MISSING_ACTIONS, value_range));
        };
        let mut binding = BindingConfig {
            index,
            tap: self.read_action(tap)?,
            hold: self.read_action(hold)?,
            permissive_hold: None,
            tapping_term: None,
            span: index_range.start..value_range.end,
        };

        for option in words {
            let text = self.name(&option);
            let (name, value) = match text.split_once('=') {
                Some((name, _)) => (name, Some(option.start + name.len() + 1..option.end)),
                None => (text, None),
            };
            match (name, value) {
                ("permissive_hold", None) => binding.permissive_hold = Some(true),
                ("permissive_hold", Some(v)) => {
                    binding.permissive_hold = Some(self.parse_bool(&v)?)
                }
                ("tapping_term", Some(v)) => binding.tapping_term = Some(self.parse_duration(&v)?),
                _ => {
                    return Err(error_span(
                        format!("Invalid option '{}'", text),
                        option,
                    ))
                }
            }
        }

        self.config.bindings.insert(index, binding);
        Ok(())
    }

    fn read_action(&self, name_range: NameRange) -> Result<u16> {
        let name = self.name(&name_range);
        let code = match name.strip_prefix("0x") {
            Some(hex) => u16::from_str_radix(hex, 16).ok(),
            None => key_code(name),
        };
        code.ok_or_else(|| error_span(format!("Unknown keycode '{}'", name), name_range))
    }

    fn parse_duration(&self, value_range: &NameRange) -> Result<u16> {
        if let Ok(n) = self.name(value_range).parse::<u16>() {
            if n <= MAX_DURATION {
                return Ok(n);
            }
        }
        Err(error_span(
            format!(
                "Invalid duration; only 0 to {} milliseconds are valid",
                MAX_DURATION
            ),
            value_range.clone(),
        ))
    }

    fn parse_bool(&self, value_range: &NameRange) -> Result<bool> {
        match self.name(value_range) {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(error_span(
                "Expected true or false",
                value_range.clone(),
            )),
        }
    }

    fn name(&self, name_range: &NameRange) -> &'source str {
        &self.source[name_range.clone()]
    }

    fn build_config(self) -> Result<TapHoldConfig> {
        self.config.check_contiguous()?;
        Ok(self.config)
    }
}

fn trim(source: &str, range: NameRange) -> NameRange {
    let text = &source[range.clone()];
    let start = range.start + (text.len() - text.trim_start().len());
    let end = range.end - (text.len() - text.trim_end().len());
    start..end.max(start)
}

fn words(source: &str, range: NameRange) -> impl Iterator<Item = NameRange> + '_ {
    let base = range.start;
    let text = &source[range];
    text.split_whitespace()
        .map(move |w| {
            let start = base + (w.as_ptr() as usize - text.as_ptr() as usize);
            start..start + w.len()
        })
}

fn error_span(message: impl Into<String>, range: NameRange) -> ConfigError {
    ConfigError::new(message.into(), range)
}

/// Parse a tap-hold config. Sections are `[global]` and `[tap_hold]`; `#` starts a comment.
pub fn compile(source: &str) -> Result<TapHoldConfig> {
    let mut parser = Parser::new(source);

    parser.parse_lines()?;
    parser.build_config()
}

#[cfg(test)]
#[path = "compiler_test.rs"]
mod test;
