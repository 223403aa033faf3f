//! Typed game-program events and their log-line encoding.
//!
//! The program emits each event as a single log line of the form
//! `Program log: <Tag> <json payload>`. Lines that don't carry a known tag
//! are unrelated program output and are skipped.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{
    error::DecodeError,
    table::{ActionType, Card, Chips, ParticipantId, Round, SeatIndex, TableId},
};

pub const LOG_PREFIX: &str = "Program log: ";

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct PlayerJoined {
    pub table_id: TableId,
    pub player: ParticipantId,
    pub seat: SeatIndex,
    pub stack: Chips,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct GameStarted {
    pub table_id: TableId,
    pub dealer_position: SeatIndex,
    pub small_blind_position: SeatIndex,
    pub big_blind_position: SeatIndex,
}

/// `amount` is the number of chips the action moved from the stack.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ActionTaken {
    pub table_id: TableId,
    pub player: ParticipantId,
    pub seat: SeatIndex,
    pub action_type: ActionType,
    pub amount: Chips,
    pub new_pot: Chips,
    pub round: Round,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct RoundEnded {
    pub table_id: TableId,
    pub round: Round,
    pub community_cards: Vec<Card>,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct PotDistributed {
    pub table_id: TableId,
    pub winners: Vec<ParticipantId>,
    pub amounts: Vec<Chips>,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct CardRevealed {
    pub table_id: TableId,
    pub player: ParticipantId,
    pub seat: SeatIndex,
    pub cards: [Card; 2],
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TableEvent {
    PlayerJoined(PlayerJoined),
    GameStarted(GameStarted),
    ActionTaken(ActionTaken),
    RoundEnded(RoundEnded),
    PotDistributed(PotDistributed),
    CardRevealed(CardRevealed),
}

impl TableEvent {
    #[must_use]
    pub fn table_id(&self) -> TableId {
        match self {
            Self::PlayerJoined(e) => e.table_id,
            Self::GameStarted(e) => e.table_id,
            Self::ActionTaken(e) => e.table_id,
            Self::RoundEnded(e) => e.table_id,
            Self::PotDistributed(e) => e.table_id,
            Self::CardRevealed(e) => e.table_id,
        }
    }

    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Self::PlayerJoined(_) => "PlayerJoinedEvent",
            Self::GameStarted(_) => "GameStartedEvent",
            Self::ActionTaken(_) => "ActionTakenEvent",
            Self::RoundEnded(_) => "RoundEndedEvent",
            Self::PotDistributed(_) => "PotDistributedEvent",
            Self::CardRevealed(_) => "CardRevealedEvent",
        }
    }

    /// Render the event as the program would log it.
    ///
    /// # Errors
    ///
    /// Fails only if the payload can't be serialized.
    pub fn to_log_line(&self) -> Result<String, serde_json::Error> {
        let payload = match self {
            Self::PlayerJoined(e) => serde_json::to_string(e)?,
            Self::GameStarted(e) => serde_json::to_string(e)?,
            Self::ActionTaken(e) => serde_json::to_string(e)?,
            Self::RoundEnded(e) => serde_json::to_string(e)?,
            Self::PotDistributed(e) => serde_json::to_string(e)?,
            Self::CardRevealed(e) => serde_json::to_string(e)?,
        };
        Ok(format!("{LOG_PREFIX}{} {payload}", self.tag()))
    }
}

impl fmt::Display for TableEvent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::PlayerJoined(e) => write!(f, "{} joined seat {} with {}", e.player.short(), e.seat, e.stack),
            Self::GameStarted(e) => write!(f, "hand started, dealer at seat {}", e.dealer_position),
            Self::ActionTaken(e) => write!(f, "seat {} {} for {}", e.seat, e.action_type, e.amount),
            Self::RoundEnded(e) => write!(f, "round ended, now {:?}", e.round),
            Self::PotDistributed(e) => write!(f, "pot paid to {} winner(s)", e.winners.len()),
            Self::CardRevealed(e) => write!(f, "seat {} showed {}{}", e.seat, e.cards[0], e.cards[1]),
        }
    }
}

fn payload<'a, T: Deserialize<'a>>(tag: &str, json: &'a str) -> Result<T, DecodeError> {
    serde_json::from_str(json).map_err(|source| DecodeError::EventPayload {
        tag: tag.to_string(),
        source,
    })
}

/// Parse one program log line.
///
/// Returns `None` for lines that aren't game events.
#[must_use]
pub fn parse_log_line(line: &str) -> Option<Result<TableEvent, DecodeError>> {
    let rest = line.strip_prefix(LOG_PREFIX)?;
    let (tag, json) = rest.split_once(' ')?;
    let event = match tag {
        "PlayerJoinedEvent" => payload(tag, json).map(TableEvent::PlayerJoined),
        "GameStartedEvent" => payload(tag, json).map(TableEvent::GameStarted),
        "ActionTakenEvent" => payload(tag, json).map(TableEvent::ActionTaken),
        "RoundEndedEvent" => payload(tag, json).map(TableEvent::RoundEnded),
        "PotDistributedEvent" => payload(tag, json).map(TableEvent::PotDistributed),
        "CardRevealedEvent" => payload(tag, json).map(TableEvent::CardRevealed),
        _ => return None,
    };
    Some(event)
}

/// Parse every game event out of one transaction's log lines, in order.
pub fn parse_log_batch<S: AsRef<str>>(
    lines: &[S],
) -> impl Iterator<Item = Result<TableEvent, DecodeError>> + '_ {
    lines.iter().filter_map(|line| parse_log_line(line.as_ref()))
}
