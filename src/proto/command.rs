use crate::frame::EOL;

/// Commands understood by the scope firmware console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Bare line end; the device answers with a prompt.
    Empty,
    Id,
    Measure { points: u64 },
    Data,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Empty => "",
            Command::Id => "id",
            Command::Measure { .. } => "measure",
            Command::Data => "data",
        }
    }

    fn args(&self) -> Vec<String> {
        match self {
            Command::Measure { points } => vec![points.to_string()],
            _ => Vec::new(),
        }
    }
}

/// Serialize a command to its ASCII wire form, tokens joined by single spaces.
pub fn format_command(cmd: &Command) -> Vec<u8> {
    let mut tokens = Vec::new();
    if !cmd.name().is_empty() {
        tokens.push(cmd.name().to_string());
    }
    tokens.extend(cmd.args());

    let mut out = tokens.join(" ").into_bytes();
    out.push(EOL);
    out
}
