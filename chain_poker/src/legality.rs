//! What a seated player may do next.
//!
//! The rules mirror the game program's own gating so a UI never offers an
//! action the program would refuse: fold/check/call/raise need the seat to
//! be on the clock, while all-in is offered whenever chips remain.

use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    fmt,
    hash::{Hash, Hasher},
    mem::discriminant,
};
use thiserror::Error;

use crate::{
    remote::TableInstruction,
    table::{Action, Chips, GameState, ParticipantId, SeatIndex, Table, TableId},
};

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub enum ActionChoice {
    AllIn(Chips),
    Call(Chips),
    Check,
    Fold,
    /// Inclusive bounds on the chips a raise may move from the stack.
    Raise { min: Chips, max: Chips },
}

impl ActionChoice {
    fn order(&self) -> u8 {
        match self {
            Self::Fold => 0,
            Self::Check => 1,
            Self::Call(_) => 2,
            Self::Raise { .. } => 3,
            Self::AllIn(_) => 4,
        }
    }
}

impl fmt::Display for ActionChoice {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let repr = match self {
            Self::AllIn(amount) => format!("all-in (== {amount})"),
            Self::Call(amount) => format!("call (== {amount})"),
            Self::Check => "check".to_string(),
            Self::Fold => "fold".to_string(),
            Self::Raise { min, max } if min == max => format!("raise (== {min})"),
            Self::Raise { min, max } => format!("raise ({min}..={max})"),
        };
        write!(f, "{repr}")
    }
}

// Membership only cares about the variant; amounts are checked separately
// by `check_action`.
impl Eq for ActionChoice {}

impl Hash for ActionChoice {
    fn hash<H: Hasher>(&self, state: &mut H) {
        discriminant(self).hash(state);
    }
}

impl PartialEq for ActionChoice {
    fn eq(&self, other: &Self) -> bool {
        discriminant(self) == discriminant(other)
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct ActionChoices(pub HashSet<ActionChoice>);

impl ActionChoices {
    #[must_use]
    pub fn contains(&self, action: &Action) -> bool {
        let choice = match action {
            Action::AllIn => ActionChoice::AllIn(0),
            Action::Call => ActionChoice::Call(0),
            Action::Check => ActionChoice::Check,
            Action::Fold => ActionChoice::Fold,
            Action::Raise(_) => ActionChoice::Raise { min: 0, max: 0 },
        };
        self.0.contains(&choice)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn call_amount(&self) -> Option<Chips> {
        self.0.iter().find_map(|choice| match choice {
            ActionChoice::Call(amount) => Some(*amount),
            _ => None,
        })
    }

    #[must_use]
    pub fn raise_bounds(&self) -> Option<(Chips, Chips)> {
        self.0.iter().find_map(|choice| match choice {
            ActionChoice::Raise { min, max } => Some((*min, *max)),
            _ => None,
        })
    }

    /// Choices in a stable presentation order.
    #[must_use]
    pub fn sorted(&self) -> Vec<ActionChoice> {
        let mut choices: Vec<_> = self.0.iter().copied().collect();
        choices.sort_by_key(ActionChoice::order);
        choices
    }
}

impl fmt::Display for ActionChoices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let choices = self.sorted();
        let num_options = choices.len();
        let repr = choices
            .iter()
            .enumerate()
            .map(|(i, choice)| {
                let repr = choice.to_string();
                match i {
                    0 if num_options == 1 => repr,
                    0 if num_options == 2 => format!("{repr} "),
                    0 if num_options >= 3 => format!("{repr}, "),
                    i if i == num_options - 1 && num_options != 1 => format!("or {repr}"),
                    _ => format!("{repr}, "),
                }
            })
            .collect::<String>();
        write!(f, "{repr}")
    }
}

impl<I> From<I> for ActionChoices
where
    I: IntoIterator<Item = ActionChoice>,
{
    fn from(iter: I) -> Self {
        Self(iter.into_iter().collect::<HashSet<_>>())
    }
}

/// Why a concrete action is not allowed right now.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum IllegalAction {
    #[error("seat {0} is empty")]
    EmptySeat(SeatIndex),
    #[error("not your turn")]
    NotYourTurn,
    #[error("cannot check facing {to_call}")]
    CannotCheck { to_call: Chips },
    #[error("nothing to call")]
    NothingToCall,
    #[error("calling {to_call} needs more than the {stack} in your stack")]
    CannotCoverCall { to_call: Chips, stack: Chips },
    #[error("stack too small to raise")]
    RaiseUnavailable,
    #[error("raise must move at least {min}")]
    RaiseTooSmall { min: Chips },
    #[error("raise can move at most {max}")]
    RaiseTooLarge { max: Chips },
    #[error("no chips left to go all-in")]
    EmptyStack,
}

/// Why a seat or hand instruction would be refused by the game program.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum IllegalInstruction {
    #[error("cannot do that while the hand is {0}")]
    HandInProgress(GameState),
    #[error("seat {seat} is outside the table's {max_players} seats")]
    NoSuchSeat { seat: SeatIndex, max_players: u8 },
    #[error("seat {0} is taken")]
    SeatTaken(SeatIndex),
    #[error("already seated at seat {0}")]
    AlreadySeated(SeatIndex),
    #[error("not seated at this table")]
    NotSeated,
    #[error("need at least two players, have {0}")]
    NotEnoughPlayers(u8),
    #[error("instruction is for table {instruction}, not {table}")]
    WrongTable { instruction: TableId, table: TableId },
}

/// Verify a seat or hand instruction from `participant` against `table`.
///
/// # Errors
///
/// Returns the first rule the instruction breaks.
pub fn check_instruction(
    table: &Table,
    participant: &ParticipantId,
    instruction: &TableInstruction,
) -> Result<(), IllegalInstruction> {
    if instruction.table_id() != table.table_id {
        return Err(IllegalInstruction::WrongTable {
            instruction: instruction.table_id(),
            table: table.table_id,
        });
    }
    let seated = table.seat_of(participant);

    match instruction {
        TableInstruction::Sit { seat, .. } => {
            if table.game_state != GameState::Waiting {
                return Err(IllegalInstruction::HandInProgress(table.game_state));
            }
            if *seat >= table.max_players {
                return Err(IllegalInstruction::NoSuchSeat {
                    seat: *seat,
                    max_players: table.max_players,
                });
            }
            if let Some(current) = seated {
                return Err(IllegalInstruction::AlreadySeated(current));
            }
            if table.player(*seat).is_some() {
                return Err(IllegalInstruction::SeatTaken(*seat));
            }
            Ok(())
        }
        TableInstruction::Stand { .. } => {
            if !matches!(table.game_state, GameState::Waiting | GameState::Finished) {
                return Err(IllegalInstruction::HandInProgress(table.game_state));
            }
            seated.map(|_| ()).ok_or(IllegalInstruction::NotSeated)
        }
        TableInstruction::StartHand { .. } => {
            if table.game_state != GameState::Waiting {
                return Err(IllegalInstruction::HandInProgress(table.game_state));
            }
            if table.player_count < 2 {
                return Err(IllegalInstruction::NotEnoughPlayers(table.player_count));
            }
            Ok(())
        }
    }
}

/// Legal choices for `participant`. Empty if they hold no seat.
#[must_use]
pub fn evaluate(table: &Table, participant: &ParticipantId) -> ActionChoices {
    table
        .seat_of(participant)
        .map(|seat| evaluate_seat(table, seat))
        .unwrap_or_default()
}

/// Legal choices for `seat`. Empty if the seat is vacant.
#[must_use]
pub fn evaluate_seat(table: &Table, seat: SeatIndex) -> ActionChoices {
    let Some(player) = table.player(seat) else {
        return ActionChoices::default();
    };
    let stack = player.stack;
    let to_call = table.to_call(seat);

    let mut choices = HashSet::new();
    if table.is_turn(seat) {
        choices.insert(ActionChoice::Fold);
        if to_call == 0 {
            choices.insert(ActionChoice::Check);
        } else if to_call <= stack {
            choices.insert(ActionChoice::Call(to_call));
        }
        let min = to_call.saturating_add(table.min_raise);
        if stack > min {
            choices.insert(ActionChoice::Raise { min, max: stack });
        }
    }
    if stack > 0 {
        choices.insert(ActionChoice::AllIn(stack));
    }
    ActionChoices(choices)
}

/// Verify one concrete action, raise amount included.
///
/// # Errors
///
/// Returns the first rule the action breaks.
pub fn check_action(table: &Table, seat: SeatIndex, action: &Action) -> Result<(), IllegalAction> {
    let player = table.player(seat).ok_or(IllegalAction::EmptySeat(seat))?;
    let stack = player.stack;
    let to_call = table.to_call(seat);
    let on_clock = table.is_turn(seat);

    match action {
        Action::AllIn if stack == 0 => Err(IllegalAction::EmptyStack),
        Action::AllIn => Ok(()),
        _ if !on_clock => Err(IllegalAction::NotYourTurn),
        Action::Fold => Ok(()),
        Action::Check if to_call > 0 => Err(IllegalAction::CannotCheck { to_call }),
        Action::Check => Ok(()),
        Action::Call if to_call == 0 => Err(IllegalAction::NothingToCall),
        Action::Call if to_call > stack => Err(IllegalAction::CannotCoverCall { to_call, stack }),
        Action::Call => Ok(()),
        Action::Raise(amount) => {
            let min = to_call.saturating_add(table.min_raise);
            if stack <= min {
                Err(IllegalAction::RaiseUnavailable)
            } else if *amount < min {
                Err(IllegalAction::RaiseTooSmall { min })
            } else if *amount > stack {
                Err(IllegalAction::RaiseTooLarge { max: stack })
            } else {
                Ok(())
            }
        }
    }
}
