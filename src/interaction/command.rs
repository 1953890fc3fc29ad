//! Parsing of console input lines.

use anyhow::bail;

use crate::base::types::Res;

/// One line of console input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleInput {
    /// Free text to submit to the session.
    Message(String),
    Help,
    Transcript,
    Status,
    /// Find nearby care / book an appointment.
    Book,
    Back,
    /// Save and exit to the patient dashboard.
    Exit,
}

pub const HELP: &str = "\
Describe your symptoms and press Enter.

Commands:
  /status      show the current severity assessment
  /transcript  print the conversation as JSON
  /book        find nearby care or book an appointment
  /back        return to the previous page
  /exit        save and exit to your dashboard
  /help        show this help";

/// Parse a raw input line.
///
/// Lines starting with `/` are commands; anything else (including blank
/// lines) is passed through untouched as a message.
pub fn parse_input(line: &str) -> Res<ConsoleInput> {
    let Some(command) = line.trim().strip_prefix('/') else {
        return Ok(ConsoleInput::Message(line.to_string()));
    };

    let input = match command.trim().to_lowercase().as_str() {
        "help" | "?" => ConsoleInput::Help,
        "transcript" => ConsoleInput::Transcript,
        "status" => ConsoleInput::Status,
        "book" | "care" => ConsoleInput::Book,
        "back" => ConsoleInput::Back,
        "exit" | "quit" => ConsoleInput::Exit,
        other => bail!("unknown command `/{other}` (try /help)"),
    };

    Ok(input)
}
