use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};
use thiserror::Error;

/// Number of seat slots in a table account, regardless of its capacity.
pub const MAX_SEATS: usize = 9;

/// Number of community cards on a full board.
pub const BOARD_SIZE: usize = 5;

pub type TableId = u64;
pub type Chips = u64;
pub type SeatIndex = u8;

/// A 32-byte ledger identity (wallet public key).
///
/// Human-readable formats (JSON) carry it as a hex string, binary formats
/// as the raw 32 bytes.
#[derive(Clone, Copy, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ParticipantId(pub [u8; 32]);

impl ParticipantId {
    #[must_use]
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Shortened form for log lines and table dumps.
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ParticipantId({})", self.short())
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ParseParticipantError {
    #[error("participant id is not valid hex: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("participant id must be 32 bytes, got {0}")]
    Length(usize),
}

impl FromStr for ParticipantId {
    type Err = ParseParticipantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim())?;
        let len = bytes.len();
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| ParseParticipantError::Length(len))?;
        Ok(Self(bytes))
    }
}

impl Serialize for ParticipantId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_string())
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for ParticipantId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            s.parse().map_err(serde::de::Error::custom)
        } else {
            <[u8; 32]>::deserialize(deserializer).map(Self)
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Suit {
    Clubs,
    Diamonds,
    Hearts,
    Spades,
}

impl Suit {
    const ALL: [Self; 4] = [Self::Clubs, Self::Diamonds, Self::Hearts, Self::Spades];
}

impl fmt::Display for Suit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let repr = match self {
            Self::Clubs => "♣",
            Self::Diamonds => "♦",
            Self::Hearts => "♥",
            Self::Spades => "♠",
        };
        write!(f, "{repr}")
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Rank {
    Two,
    Three,
    Four,
    Five,
    Six,
    Seven,
    Eight,
    Nine,
    Ten,
    Jack,
    Queen,
    King,
    Ace,
}

impl Rank {
    const ALL: [Self; 13] = [
        Self::Two,
        Self::Three,
        Self::Four,
        Self::Five,
        Self::Six,
        Self::Seven,
        Self::Eight,
        Self::Nine,
        Self::Ten,
        Self::Jack,
        Self::Queen,
        Self::King,
        Self::Ace,
    ];
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let repr = match self {
            Self::Two => "2",
            Self::Three => "3",
            Self::Four => "4",
            Self::Five => "5",
            Self::Six => "6",
            Self::Seven => "7",
            Self::Eight => "8",
            Self::Nine => "9",
            Self::Ten => "10",
            Self::Jack => "J",
            Self::Queen => "Q",
            Self::King => "K",
            Self::Ace => "A",
        };
        write!(f, "{repr}")
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Card {
    pub suit: Suit,
    pub rank: Rank,
}

impl Card {
    #[must_use]
    pub fn new(suit: Suit, rank: Rank) -> Self {
        Self { suit, rank }
    }

    /// Compact card index used by the game program: `suit * 13 + rank`.
    #[must_use]
    pub fn to_u8(&self) -> u8 {
        (self.suit as u8) * 13 + (self.rank as u8)
    }

    /// Inverse of [`Card::to_u8`]; `None` for indices outside a 52-card deck.
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        let suit = *Suit::ALL.get(usize::from(value / 13))?;
        let rank = Rank::ALL[usize::from(value % 13)];
        Some(Self { suit, rank })
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let repr = format!("{}{}", self.rank, self.suit);
        write!(f, "{repr:>3}")
    }
}

/// Lifecycle of the hand as recorded by the game program.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum GameState {
    #[default]
    Waiting,
    Starting,
    PreFlop,
    Flop,
    Turn,
    River,
    Showdown,
    Finished,
}

impl GameState {
    /// Whether a player can be on the clock in this state.
    #[must_use]
    pub fn is_betting_round(&self) -> bool {
        matches!(self, Self::PreFlop | Self::Flop | Self::Turn | Self::River)
    }

    /// Community cards that must be revealed in this state. `None` when
    /// any board size is acceptable.
    #[must_use]
    pub fn expected_board_len(&self) -> Option<usize> {
        match self {
            Self::Waiting | Self::Starting | Self::PreFlop => Some(0),
            Self::Flop => Some(3),
            Self::Turn => Some(4),
            Self::River | Self::Showdown => Some(5),
            Self::Finished => None,
        }
    }
}

impl fmt::Display for GameState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let repr = match self {
            Self::Waiting => "waiting",
            Self::Starting => "starting",
            Self::PreFlop => "pre-flop",
            Self::Flop => "flop",
            Self::Turn => "turn",
            Self::River => "river",
            Self::Showdown => "showdown",
            Self::Finished => "finished",
        };
        write!(f, "{repr}")
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Round {
    #[default]
    PreFlop,
    Flop,
    Turn,
    River,
}

impl Round {
    /// The betting round that follows this one, `None` after the river.
    #[must_use]
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::PreFlop => Some(Self::Flop),
            Self::Flop => Some(Self::Turn),
            Self::Turn => Some(Self::River),
            Self::River => None,
        }
    }
}

impl From<Round> for GameState {
    fn from(round: Round) -> Self {
        match round {
            Round::PreFlop => Self::PreFlop,
            Round::Flop => Self::Flop,
            Round::Turn => Self::Turn,
            Round::River => Self::River,
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum ActionType {
    Fold,
    Check,
    Call,
    Raise,
    AllIn,
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let repr = match self {
            Self::Fold => "fold",
            Self::Check => "check",
            Self::Call => "call",
            Self::Raise => "raise",
            Self::AllIn => "all-in",
        };
        write!(f, "{repr}")
    }
}

/// A concrete action a seated player submits.
///
/// `Raise` carries the total chips moved from the stack by the action,
/// i.e. the call amount plus the raise increment.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Action {
    AllIn,
    Call,
    Check,
    Fold,
    Raise(Chips),
}

impl Action {
    #[must_use]
    pub fn action_type(&self) -> ActionType {
        match self {
            Self::AllIn => ActionType::AllIn,
            Self::Call => ActionType::Call,
            Self::Check => ActionType::Check,
            Self::Fold => ActionType::Fold,
            Self::Raise(_) => ActionType::Raise,
        }
    }

    /// Amount sent along with the action; only raises carry one.
    #[must_use]
    pub fn amount(&self) -> Option<Chips> {
        match self {
            Self::Raise(amount) => Some(*amount),
            _ => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let repr = match self {
            Self::AllIn => "all-ins",
            Self::Call => "calls",
            Self::Check => "checks",
            Self::Fold => "folds",
            Self::Raise(amount) => &format!("raises {amount}"),
        };
        write!(f, "{repr}")
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Player {
    pub id: ParticipantId,
    pub seat: SeatIndex,
    pub stack: Chips,
    pub bet: Chips,
    pub hole_cards: [Option<Card>; 2],
    pub hole_cards_committed: [u8; 32],
    pub is_all_in: bool,
    pub has_folded: bool,
    pub has_acted: bool,
    pub last_action: Option<ActionType>,
}

impl Player {
    #[must_use]
    pub fn new(id: ParticipantId, seat: SeatIndex, stack: Chips) -> Self {
        Self {
            id,
            seat,
            stack,
            bet: 0,
            hole_cards: [None; 2],
            hole_cards_committed: [0; 32],
            is_all_in: false,
            has_folded: false,
            has_acted: false,
            last_action: None,
        }
    }

    /// Still contesting the pot with chips behind.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.has_folded && self.stack > 0
    }

    /// Clear everything tied to the hand that just ended.
    pub fn reset(&mut self) {
        self.bet = 0;
        self.hole_cards = [None; 2];
        self.hole_cards_committed = [0; 32];
        self.is_all_in = false;
        self.has_folded = false;
        self.has_acted = false;
    }
}

/// Structural problems that make a table value unusable.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum InvariantViolation {
    #[error("seat capacity {0} outside 2..={MAX_SEATS}")]
    InvalidCapacity(u8),
    #[error("big blind {big} below small blind {small}")]
    BlindsOutOfOrder { small: Chips, big: Chips },
    #[error("seat {seat} outside table capacity {max_players}")]
    SeatOutOfRange { seat: usize, max_players: u8 },
    #[error("seat slot {slot} holds a player recorded at seat {recorded}")]
    SeatMismatch { slot: usize, recorded: SeatIndex },
    #[error("player count {recorded} but {actual} seats occupied")]
    PlayerCountMismatch { recorded: u8, actual: usize },
    #[error("seat {0} is on the clock outside a betting round")]
    ActorOutsideRound(SeatIndex),
    #[error("seat {0} is on the clock but empty")]
    ActorSeatEmpty(SeatIndex),
    #[error("{name} position {seat} outside table capacity")]
    PositionOutOfRange { name: &'static str, seat: SeatIndex },
    #[error("round bets {bets} exceed pot {pot} plus stacks {stacks}")]
    BetsExceedHoldings { bets: Chips, pot: Chips, stacks: Chips },
    #[error("{revealed} community cards revealed during {state}")]
    BoardMismatch { state: GameState, revealed: usize },
    #[error("seat {0} is already occupied")]
    SeatOccupied(SeatIndex),
    #[error("seat {0} is empty")]
    SeatEmpty(SeatIndex),
    #[error("seat {seat} is held by {holder:?}, not {claimed:?}")]
    SeatHolderMismatch {
        seat: SeatIndex,
        holder: ParticipantId,
        claimed: ParticipantId,
    },
    #[error("{event} does not apply during {state}")]
    UnexpectedEvent { event: &'static str, state: GameState },
    #[error("{event:?} round reported while the table is in {table:?}")]
    RoundMismatch { event: Round, table: Round },
    #[error("seat {seat} acted while {actor:?} was on the clock")]
    OutOfTurn {
        seat: SeatIndex,
        actor: Option<SeatIndex>,
    },
    #[error("seat {0} has already acted this round")]
    AlreadyActed(SeatIndex),
    #[error("event for table {event} applied to table {table}")]
    WrongTable { event: TableId, table: TableId },
    #[error("pot distribution lists {winners} winners but {amounts} amounts")]
    UnbalancedDistribution { winners: usize, amounts: usize },
    #[error("chip arithmetic overflow")]
    Overflow,
}

/// The canonical value of one table account at one point in time.
///
/// Tables are shared as `Arc<Table>` and never mutated in place once
/// published; every update produces a fresh value.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Table {
    pub creator: ParticipantId,
    pub table_id: TableId,
    pub small_blind: Chips,
    pub big_blind: Chips,
    pub max_players: u8,
    pub buy_in: Chips,
    pub game_state: GameState,
    pub dealer_position: SeatIndex,
    pub small_blind_position: SeatIndex,
    pub big_blind_position: SeatIndex,
    pub current_actor: Option<SeatIndex>,
    pub pot: Chips,
    pub community_cards: [Option<Card>; BOARD_SIZE],
    pub round: Round,
    pub last_raise_amount: Chips,
    pub min_raise: Chips,
    pub seats: [Option<Player>; MAX_SEATS],
    pub player_count: u8,
    pub created_at: i64,
    pub last_action_at: i64,
    pub action_timeout: i64,
    /// Version marker; the game program bumps it on every write.
    pub sequence: u64,
}

impl Table {
    /// An empty table waiting for players.
    #[must_use]
    pub fn new(
        table_id: TableId,
        creator: ParticipantId,
        small_blind: Chips,
        big_blind: Chips,
        max_players: u8,
        buy_in: Chips,
    ) -> Self {
        Self {
            creator,
            table_id,
            small_blind,
            big_blind,
            max_players,
            buy_in,
            game_state: GameState::Waiting,
            dealer_position: 0,
            small_blind_position: 0,
            big_blind_position: 0,
            current_actor: None,
            pot: 0,
            community_cards: [None; BOARD_SIZE],
            round: Round::PreFlop,
            last_raise_amount: 0,
            min_raise: big_blind,
            seats: [None; MAX_SEATS],
            player_count: 0,
            created_at: 0,
            last_action_at: 0,
            action_timeout: 60,
            sequence: 0,
        }
    }

    #[must_use]
    pub fn player(&self, seat: SeatIndex) -> Option<&Player> {
        self.seats.get(usize::from(seat))?.as_ref()
    }

    pub(crate) fn player_mut(&mut self, seat: SeatIndex) -> Option<&mut Player> {
        self.seats.get_mut(usize::from(seat))?.as_mut()
    }

    /// Seat held by `id`, if any.
    #[must_use]
    pub fn seat_of(&self, id: &ParticipantId) -> Option<SeatIndex> {
        self.players().find(|p| &p.id == id).map(|p| p.seat)
    }

    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.seats.iter().flatten()
    }

    /// Players still contesting the pot with chips behind, by seat order.
    pub fn active_players(&self) -> impl Iterator<Item = &Player> {
        self.players().filter(|p| p.is_active())
    }

    /// Next active seat strictly after `from`, wrapping around the table.
    #[must_use]
    pub fn next_active_seat(&self, from: SeatIndex) -> Option<SeatIndex> {
        let seats: Vec<SeatIndex> = self.active_players().map(|p| p.seat).collect();
        seats
            .iter()
            .copied()
            .find(|&seat| seat > from)
            .or_else(|| seats.first().copied())
    }

    /// Highest round bet among players that have not folded.
    #[must_use]
    pub fn current_bet(&self) -> Chips {
        self.players()
            .filter(|p| !p.has_folded)
            .map(|p| p.bet)
            .max()
            .unwrap_or(0)
    }

    /// Chips `seat` must add to match the current bet.
    #[must_use]
    pub fn to_call(&self, seat: SeatIndex) -> Chips {
        let bet = self.player(seat).map_or(0, |p| p.bet);
        self.current_bet().saturating_sub(bet)
    }

    #[must_use]
    pub fn is_turn(&self, seat: SeatIndex) -> bool {
        self.current_actor == Some(seat)
    }

    pub fn board(&self) -> impl Iterator<Item = &Card> {
        self.community_cards.iter().flatten()
    }

    #[must_use]
    pub fn board_len(&self) -> usize {
        self.board().count()
    }

    /// Check every structural invariant of the table.
    ///
    /// # Errors
    ///
    /// Returns the first [`InvariantViolation`] found.
    pub fn validate(&self) -> Result<(), InvariantViolation> {
        let capacity = usize::from(self.max_players);
        if !(2..=MAX_SEATS).contains(&capacity) {
            return Err(InvariantViolation::InvalidCapacity(self.max_players));
        }
        if self.big_blind < self.small_blind {
            return Err(InvariantViolation::BlindsOutOfOrder {
                small: self.small_blind,
                big: self.big_blind,
            });
        }

        let mut occupied = 0;
        for (slot, player) in self.seats.iter().enumerate() {
            let Some(player) = player else { continue };
            if slot >= capacity {
                return Err(InvariantViolation::SeatOutOfRange {
                    seat: slot,
                    max_players: self.max_players,
                });
            }
            if usize::from(player.seat) != slot {
                return Err(InvariantViolation::SeatMismatch {
                    slot,
                    recorded: player.seat,
                });
            }
            occupied += 1;
        }
        if occupied != usize::from(self.player_count) {
            return Err(InvariantViolation::PlayerCountMismatch {
                recorded: self.player_count,
                actual: occupied,
            });
        }

        if let Some(actor) = self.current_actor {
            if !self.game_state.is_betting_round() {
                return Err(InvariantViolation::ActorOutsideRound(actor));
            }
            if self.player(actor).is_none() {
                return Err(InvariantViolation::ActorSeatEmpty(actor));
            }
        }

        for (name, seat) in [
            ("dealer", self.dealer_position),
            ("small blind", self.small_blind_position),
            ("big blind", self.big_blind_position),
        ] {
            if usize::from(seat) >= capacity {
                return Err(InvariantViolation::PositionOutOfRange { name, seat });
            }
        }

        let bets = self.players().try_fold(0u64, |acc, p| acc.checked_add(p.bet));
        let stacks = self.players().try_fold(0u64, |acc, p| acc.checked_add(p.stack));
        let (Some(bets), Some(stacks)) = (bets, stacks) else {
            return Err(InvariantViolation::Overflow);
        };
        if bets > self.pot.saturating_add(stacks) {
            return Err(InvariantViolation::BetsExceedHoldings {
                bets,
                pot: self.pot,
                stacks,
            });
        }

        let revealed = self.board_len();
        if let Some(expected) = self.game_state.expected_board_len()
            && expected != revealed
        {
            return Err(InvariantViolation::BoardMismatch {
                state: self.game_state,
                revealed,
            });
        }

        Ok(())
    }
}
