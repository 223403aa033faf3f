//! Table account model.

pub mod codec;
pub mod entities;
mod transitions;

pub use codec::{SCHEMA_VERSION, TABLE_DISCRIMINATOR, decode_table, encode_table};
pub use entities::{
    Action, ActionType, BOARD_SIZE, Card, Chips, GameState, InvariantViolation, MAX_SEATS,
    ParseParticipantError, ParticipantId, Player, Rank, Round, SeatIndex, Suit, Table, TableId,
};
