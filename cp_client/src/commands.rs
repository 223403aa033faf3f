use chain_poker::{
    Action,
    table::{Chips, SeatIndex},
};
use std::fmt;

/// What the player typed at the prompt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Submit an action at the joined table.
    Act(Action),
    /// Take a seat.
    Sit(SeatIndex),
    /// Leave the seat between hands.
    Stand,
    /// Deal the next hand.
    Start,
    /// Print the current table.
    State,
    /// Print the actions currently legal for the local seat.
    Actions,
    /// Reopen the change feed after an interruption.
    Resubscribe,
    Help,
    Quit,
}

pub const COMMANDS_HELP: &str = "\
  fold | check | call | allin    act at the table
  raise AMOUNT                   move AMOUNT chips in total from your stack
  sit SEAT                       take seat SEAT (0-based)
  stand                          give up your seat between hands
  start                          deal the next hand
  state                          show the table
  actions                        show your legal actions
  resubscribe                    reconnect the change feed
  help                           this list
  quit                           leave the table and exit
";

/// Errors that can occur during command parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Invalid raise amount (not a valid number).
    InvalidRaiseAmount(String),
    /// Raise command missing its amount.
    RaiseMissingAmount,
    /// Seat number is not a valid number.
    InvalidSeat(String),
    /// Sit command missing its seat.
    SitMissingSeat,
    /// Unrecognized command.
    UnrecognizedCommand(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRaiseAmount(value) => write!(
                f,
                "Invalid raise amount '{}'. Must be a positive number (e.g., 'raise 100')",
                value
            ),
            Self::RaiseMissingAmount => {
                write!(f, "Raise requires an amount (e.g., 'raise 100')")
            }
            Self::InvalidSeat(value) => {
                write!(f, "Invalid seat '{}'. Must be a seat number (e.g., 'sit 2')", value)
            }
            Self::SitMissingSeat => write!(f, "Sit requires a seat (e.g., 'sit 2')"),
            Self::UnrecognizedCommand(cmd) => write!(
                f,
                "Unrecognized command '{}'. Type 'help' to see available commands",
                cmd
            ),
        }
    }
}

impl std::error::Error for ParseError {}

/// Parse a command string into a [`Command`].
///
/// # Examples
///
/// ```
/// use chain_poker::Action;
/// use cp_client::commands::{Command, parse_command};
///
/// assert_eq!(parse_command("call"), Ok(Command::Act(Action::Call)));
/// assert_eq!(parse_command("raise 400"), Ok(Command::Act(Action::Raise(400))));
/// assert_eq!(parse_command("state"), Ok(Command::State));
/// ```
pub fn parse_command(input: &str) -> Result<Command, ParseError> {
    let trimmed = input.trim();

    // Try single-word commands first
    match trimmed {
        "allin" | "all-in" => return Ok(Command::Act(Action::AllIn)),
        "call" => return Ok(Command::Act(Action::Call)),
        "check" => return Ok(Command::Act(Action::Check)),
        "fold" => return Ok(Command::Act(Action::Fold)),
        "state" => return Ok(Command::State),
        "actions" => return Ok(Command::Actions),
        "resubscribe" => return Ok(Command::Resubscribe),
        "stand" => return Ok(Command::Stand),
        "start" => return Ok(Command::Start),
        "help" | "?" => return Ok(Command::Help),
        "quit" | "exit" => return Ok(Command::Quit),
        _ => {}
    }

    let parts: Vec<&str> = trimmed.split_ascii_whitespace().collect();
    match parts.first() {
        Some(&"raise") => parse_raise_command(&parts),
        Some(&"sit") => parse_sit_command(&parts),
        _ => Err(ParseError::UnrecognizedCommand(trimmed.to_string())),
    }
}

/// Parse a raise command: "raise AMOUNT"
fn parse_raise_command(parts: &[&str]) -> Result<Command, ParseError> {
    let value = parts.get(1).ok_or(ParseError::RaiseMissingAmount)?;
    let amount = value
        .parse::<Chips>()
        .ok()
        .filter(|amount| *amount > 0)
        .ok_or_else(|| ParseError::InvalidRaiseAmount(value.to_string()))?;
    Ok(Command::Act(Action::Raise(amount)))
}

/// Parse a sit command: "sit SEAT"
fn parse_sit_command(parts: &[&str]) -> Result<Command, ParseError> {
    let value = parts.get(1).ok_or(ParseError::SitMissingSeat)?;
    let seat = value
        .parse::<SeatIndex>()
        .map_err(|_| ParseError::InvalidSeat(value.to_string()))?;
    Ok(Command::Sit(seat))
}

#[cfg(test)]
mod tests {
    use super::*;

    // === Single-word command tests ===

    #[test]
    fn test_parse_all_in() {
        assert_eq!(parse_command("allin"), Ok(Command::Act(Action::AllIn)));
        assert_eq!(parse_command("all-in"), Ok(Command::Act(Action::AllIn)));
    }

    #[test]
    fn test_parse_betting_words() {
        assert_eq!(parse_command("call"), Ok(Command::Act(Action::Call)));
        assert_eq!(parse_command("check"), Ok(Command::Act(Action::Check)));
        assert_eq!(parse_command("fold"), Ok(Command::Act(Action::Fold)));
    }

    #[test]
    fn test_parse_session_commands() {
        assert_eq!(parse_command("state"), Ok(Command::State));
        assert_eq!(parse_command("actions"), Ok(Command::Actions));
        assert_eq!(parse_command("resubscribe"), Ok(Command::Resubscribe));
        assert_eq!(parse_command("help"), Ok(Command::Help));
        assert_eq!(parse_command("exit"), Ok(Command::Quit));
    }

    // === Whitespace handling ===

    #[test]
    fn test_parse_with_surrounding_whitespace() {
        assert_eq!(parse_command("  fold  "), Ok(Command::Act(Action::Fold)));
        assert_eq!(parse_command("raise    250 "), Ok(Command::Act(Action::Raise(250))));
    }

    // === Raise ===

    #[test]
    fn test_raise_requires_amount() {
        assert_eq!(parse_command("raise"), Err(ParseError::RaiseMissingAmount));
    }

    #[test]
    fn test_raise_rejects_garbage() {
        assert_eq!(
            parse_command("raise lots"),
            Err(ParseError::InvalidRaiseAmount("lots".to_string()))
        );
        assert_eq!(
            parse_command("raise -5"),
            Err(ParseError::InvalidRaiseAmount("-5".to_string()))
        );
        assert_eq!(
            parse_command("raise 0"),
            Err(ParseError::InvalidRaiseAmount("0".to_string()))
        );
    }

    // === Seating ===

    #[test]
    fn test_parse_seating_commands() {
        assert_eq!(parse_command("sit 2"), Ok(Command::Sit(2)));
        assert_eq!(parse_command("sit 0"), Ok(Command::Sit(0)));
        assert_eq!(parse_command("stand"), Ok(Command::Stand));
        assert_eq!(parse_command("start"), Ok(Command::Start));
    }

    #[test]
    fn test_sit_requires_seat() {
        assert_eq!(parse_command("sit"), Err(ParseError::SitMissingSeat));
        assert_eq!(
            parse_command("sit left"),
            Err(ParseError::InvalidSeat("left".to_string()))
        );
        assert_eq!(
            parse_command("sit 300"),
            Err(ParseError::InvalidSeat("300".to_string()))
        );
    }

    // === Errors ===

    #[test]
    fn test_unknown_command() {
        let err = parse_command("dance").unwrap_err();
        assert_eq!(err, ParseError::UnrecognizedCommand("dance".to_string()));
        assert!(err.to_string().contains("help"));
    }

    #[test]
    fn test_case_sensitive() {
        assert!(parse_command("FOLD").is_err());
    }
}
