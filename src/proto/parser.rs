use regex::Regex;
use std::sync::LazyLock;

use thiserror::Error;

/// Prefix the device puts in front of a failure message.
pub const MARK_ERROR: &str = "ERR: ";

static START_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^START: (\d+)$").expect("invalid START regex"));
static DONE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^DONE: (\d+)$").expect("invalid DONE regex"));

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("pattern mismatch: \"{0}\"")]
    Mismatch(String),
    #[error("bad count: \"{0}\"")]
    BadCount(String),
}

/// Reply to `measure`: either an acquisition announcement or a device error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeasureReply {
    Started(u64),
    Failed(String),
}

pub fn parse_measure_reply(line: &str) -> Result<MeasureReply, ParseError> {
    if let Some(msg) = line.strip_prefix(MARK_ERROR) {
        return Ok(MeasureReply::Failed(msg.to_string()));
    }
    capture_count(&START_REGEX, line).map(MeasureReply::Started)
}

pub fn parse_done(line: &str) -> Result<u64, ParseError> {
    capture_count(&DONE_REGEX, line)
}

fn capture_count(re: &Regex, line: &str) -> Result<u64, ParseError> {
    let digits = re
        .captures(line)
        .and_then(|c| c.get(1))
        .ok_or_else(|| ParseError::Mismatch(line.to_string()))?
        .as_str();
    digits
        .parse::<u64>()
        .map_err(|_| ParseError::BadCount(digits.to_string()))
}
