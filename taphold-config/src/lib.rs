use std::{ops::Range, path::Path};

pub mod compiler;
pub mod keycodes;
pub mod replay;

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub span: Option<Range<usize>>,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.span {
            Some(span) => write!(f, "{}\n    at: ({:?})", &self.message, span),
            None => write!(f, "{}", &self.message),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        Self {
            message: err.to_string(),
            span: None,
        }
    }
}

impl From<&str> for ConfigError {
    fn from(err: &str) -> Self {
        Self {
            message: err.to_string(),
            span: None,
        }
    }
}

impl ConfigError {
    pub fn new(message: String, span: Range<usize>) -> Self {
        Self {
            message,
            span: Some(span),
        }
    }

    /// Convert the byte span to a char span for ariadne.
    fn char_span(&self, source: &str) -> Option<Range<usize>> {
        let b = self.span.clone()?;
        let mut start = None;
        for (i, (j, _)) in source.char_indices().enumerate() {
            if j >= b.start && start.is_none() {
                start = Some(i);
            }
            if j >= b.end {
                return Some(start.unwrap_or(i)..i);
            }
        }
        let n = source.chars().count();
        Some(start.unwrap_or(n)..n)
    }

    /// Print the error with the offending source highlighted.
    pub fn eprint(&self, file: &Path, src: &str) {
        use ariadne::{ColorGenerator, Label, Report, ReportKind, Source};

        let Some(span) = self.char_span(src) else {
            return;
        };
        let filename = file.to_str().unwrap_or("<unknown>");
        let mut colors = ColorGenerator::new();

        let a = colors.next();
        let result = Report::build(ReportKind::Error, (filename, span.clone()))
            .with_message("Invalid config".to_string())
            .with_label(
                Label::new((filename, span))
                    .with_message(&self.message)
                    .with_color(a),
            )
            .finish()
            .eprint((filename, Source::from(src)));
        if let Err(err) = result {
            log::error!("unable to print report: {err}");
        }
    }
}

/// Compile `src`, printing a highlighted report to stderr on failure.
pub fn pretty_compile(file: &Path, src: &str) -> Result<compiler::TapHoldConfig, ConfigError> {
    compiler::compile(src).inspect_err(|err| err.eprint(file, src))
}

pub fn text_to_binary(source: &str) -> Result<Vec<u16>, ConfigError> {
    let file = Path::new("<unknown>");
    let config = pretty_compile(file, source)?;
    Ok(config.serialize())
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod test;
