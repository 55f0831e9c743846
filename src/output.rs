use crate::error::SqlChatError;
use crate::format;
use crate::pipeline::RequestEnvelope;
use serde::Serialize;

/// Rendering selected by `--json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Toon,
    Json,
}

impl OutputMode {
    pub fn from_json_flag(json: bool) -> Self {
        if json { OutputMode::Json } else { OutputMode::Toon }
    }

    pub fn render<T: Serialize>(self, value: &T) -> Result<String, SqlChatError> {
        match self {
            OutputMode::Toon => format::to_toon(value),
            OutputMode::Json => format::to_json(value),
        }
    }
}

/// Print one value to stdout, newline-terminated.
pub fn print_value<T: Serialize>(value: &T, mode: OutputMode) -> Result<(), SqlChatError> {
    let rendered = mode.render(value)?;
    if rendered.ends_with('\n') {
        print!("{}", rendered);
    } else {
        println!("{}", rendered);
    }
    Ok(())
}

/// Print answered questions in order, blank-line separated.
pub fn print_envelopes(envelopes: &[RequestEnvelope], mode: OutputMode) -> Result<(), SqlChatError> {
    for (i, envelope) in envelopes.iter().enumerate() {
        if i > 0 {
            println!();
        }
        print_value(envelope, mode)?;
        if envelope.truncated {
            print_truncation_warning(envelope.rows.len());
        }
    }
    Ok(())
}

/// Print error to stderr in the contract format: error: <category>: <message>
pub fn print_error(err: &SqlChatError) {
    eprintln!("error: {}", err);
}

/// Format: "warning: {message}"
pub fn print_truncation_warning(limit: usize) {
    eprintln!("warning: results capped at {} rows", limit);
}
