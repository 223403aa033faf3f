//! Pure table transitions: remote event deltas and local action projection.
//!
//! Both produce a new [`Table`] and leave the input untouched. A transition
//! whose result breaks a table invariant is refused as a whole.

use super::entities::{
    Action, ActionType, BOARD_SIZE, Chips, GameState, InvariantViolation, Player, Round,
    SeatIndex, Table,
};
use crate::{
    feed::events::{ActionTaken, GameStarted, PlayerJoined, PotDistributed, RoundEnded, TableEvent},
    legality::{self, IllegalAction},
};

impl Table {
    /// Derive the table that follows `event`.
    ///
    /// The version marker is left alone; only snapshots advance it. Events
    /// are held to the same gates the game program applies before emitting
    /// them, so an event already folded into this table (an action by a seat
    /// no longer on the clock, a round that already ended, a hand that already
    /// started) is refused rather than applied twice.
    ///
    /// # Errors
    ///
    /// Returns an [`InvariantViolation`] when the event doesn't fit this
    /// table or the result would be inconsistent.
    pub fn apply_event(&self, event: &TableEvent) -> Result<Table, InvariantViolation> {
        if event.table_id() != self.table_id {
            return Err(InvariantViolation::WrongTable {
                event: event.table_id(),
                table: self.table_id,
            });
        }

        let mut next = self.clone();
        match event {
            TableEvent::PlayerJoined(e) => next.seat_player(e)?,
            TableEvent::GameStarted(e) => {
                next.expect_state(event, |state| state == GameState::Waiting)?;
                next.start_hand(e)?;
            }
            TableEvent::ActionTaken(e) => next.record_action(e)?,
            TableEvent::RoundEnded(e) => next.end_round(e)?,
            TableEvent::PotDistributed(e) => {
                next.expect_state(event, |state| {
                    matches!(state, GameState::Showdown | GameState::Finished)
                })?;
                next.distribute(e)?;
            }
            TableEvent::CardRevealed(e) => {
                next.expect_state(event, |state| {
                    matches!(state, GameState::Showdown | GameState::Finished)
                })?;
                let player = next.holder_mut(e.seat, &e.player)?;
                player.hole_cards = [Some(e.cards[0]), Some(e.cards[1])];
            }
        }
        next.validate()?;
        Ok(next)
    }

    /// Refuse `event` unless the hand is in a state where the game program
    /// could have emitted it.
    fn expect_state(
        &self,
        event: &TableEvent,
        allowed: impl FnOnce(GameState) -> bool,
    ) -> Result<(), InvariantViolation> {
        if allowed(self.game_state) {
            Ok(())
        } else {
            Err(InvariantViolation::UnexpectedEvent {
                event: event.tag(),
                state: self.game_state,
            })
        }
    }

    /// Project the local player's `action` onto this table before the ledger
    /// confirms it.
    ///
    /// # Errors
    ///
    /// Returns an [`IllegalAction`] if the action isn't legal for `seat`.
    pub fn apply_action(&self, seat: SeatIndex, action: &Action) -> Result<Table, IllegalAction> {
        legality::check_action(self, seat, action)?;

        let to_call = self.to_call(seat);
        let mut next = self.clone();
        let player = next.player_mut(seat).ok_or(IllegalAction::EmptySeat(seat))?;
        let committed = match action {
            Action::Fold => {
                player.has_folded = true;
                0
            }
            Action::Check => 0,
            Action::Call => to_call.min(player.stack),
            Action::Raise(amount) => *amount,
            Action::AllIn => player.stack,
        };
        next.commit(seat, committed, action.action_type());
        Ok(next)
    }

    /// Move `chips` from the seat's stack into its bet and the pot, then
    /// pass the clock.
    fn commit(&mut self, seat: SeatIndex, chips: Chips, action_type: ActionType) {
        let current_bet = self.current_bet();
        let Some(player) = self.player_mut(seat) else { return };
        let chips = chips.min(player.stack);
        player.stack -= chips;
        player.bet += chips;
        player.is_all_in = player.stack == 0 && !player.has_folded;
        player.has_acted = true;
        player.last_action = Some(action_type);
        let new_bet = player.bet;
        self.pot = self.pot.saturating_add(chips);

        if new_bet > current_bet {
            self.last_raise_amount = new_bet - current_bet;
            self.min_raise = self.last_raise_amount;
            for other in self.seats.iter_mut().flatten() {
                if other.seat != seat && other.is_active() {
                    other.has_acted = false;
                }
            }
        }
        self.current_actor = self.next_active_seat(seat);
    }

    fn holder_mut(
        &mut self,
        seat: SeatIndex,
        claimed: &super::ParticipantId,
    ) -> Result<&mut Player, InvariantViolation> {
        let player = self
            .player_mut(seat)
            .ok_or(InvariantViolation::SeatEmpty(seat))?;
        if &player.id != claimed {
            return Err(InvariantViolation::SeatHolderMismatch {
                seat,
                holder: player.id,
                claimed: *claimed,
            });
        }
        Ok(player)
    }

    fn seat_player(&mut self, e: &PlayerJoined) -> Result<(), InvariantViolation> {
        if usize::from(e.seat) >= usize::from(self.max_players) {
            return Err(InvariantViolation::SeatOutOfRange {
                seat: usize::from(e.seat),
                max_players: self.max_players,
            });
        }
        match self.player(e.seat) {
            // Already reflected by a snapshot.
            Some(existing) if existing.id == e.player => Ok(()),
            Some(_) => Err(InvariantViolation::SeatOccupied(e.seat)),
            // Seats only change hands between hands.
            None if self.game_state != GameState::Waiting => {
                Err(InvariantViolation::UnexpectedEvent {
                    event: "PlayerJoinedEvent",
                    state: self.game_state,
                })
            }
            None => {
                self.seats[usize::from(e.seat)] = Some(Player::new(e.player, e.seat, e.stack));
                self.player_count += 1;
                Ok(())
            }
        }
    }

    fn start_hand(&mut self, e: &GameStarted) -> Result<(), InvariantViolation> {
        self.dealer_position = e.dealer_position;
        self.small_blind_position = e.small_blind_position;
        self.big_blind_position = e.big_blind_position;
        self.game_state = GameState::PreFlop;
        self.round = Round::PreFlop;
        self.community_cards = [None; BOARD_SIZE];
        self.pot = 0;
        self.last_raise_amount = 0;
        self.min_raise = self.big_blind;
        for player in self.seats.iter_mut().flatten() {
            player.reset();
            player.last_action = None;
        }

        for (seat, blind) in [
            (e.small_blind_position, self.small_blind),
            (e.big_blind_position, self.big_blind),
        ] {
            let player = self
                .player_mut(seat)
                .ok_or(InvariantViolation::SeatEmpty(seat))?;
            let posted = blind.min(player.stack);
            player.stack -= posted;
            player.bet += posted;
            player.is_all_in = player.stack == 0;
            self.pot = self.pot.checked_add(posted).ok_or(InvariantViolation::Overflow)?;
        }
        self.current_actor = self.next_active_seat(e.big_blind_position);
        Ok(())
    }

    fn record_action(&mut self, e: &ActionTaken) -> Result<(), InvariantViolation> {
        if !self.game_state.is_betting_round() {
            return Err(InvariantViolation::UnexpectedEvent {
                event: "ActionTakenEvent",
                state: self.game_state,
            });
        }
        if e.round != self.round {
            return Err(InvariantViolation::RoundMismatch {
                event: e.round,
                table: self.round,
            });
        }
        if self.current_actor != Some(e.seat) {
            return Err(InvariantViolation::OutOfTurn {
                seat: e.seat,
                actor: self.current_actor,
            });
        }

        let player = self.holder_mut(e.seat, &e.player)?;
        if player.has_acted || player.has_folded {
            return Err(InvariantViolation::AlreadyActed(e.seat));
        }
        let committed = match e.action_type {
            ActionType::Fold => {
                player.has_folded = true;
                0
            }
            ActionType::Check => 0,
            // Reported as the full amount owed; a short stack moves what it has.
            ActionType::Call => e.amount.min(player.stack),
            ActionType::Raise if e.amount > player.stack => {
                return Err(InvariantViolation::BetsExceedHoldings {
                    bets: e.amount,
                    pot: 0,
                    stacks: player.stack,
                });
            }
            ActionType::Raise => e.amount,
            ActionType::AllIn => player.stack,
        };
        self.commit(e.seat, committed, e.action_type);
        // The program's pot figure wins over local arithmetic.
        self.pot = e.new_pot;
        Ok(())
    }

    fn end_round(&mut self, e: &RoundEnded) -> Result<(), InvariantViolation> {
        if !self.game_state.is_betting_round() {
            return Err(InvariantViolation::UnexpectedEvent {
                event: "RoundEndedEvent",
                state: self.game_state,
            });
        }
        // The river reports itself again when the hand goes to showdown.
        let showdown = e.round == Round::River && self.round == Round::River;
        if !showdown && self.round.next() != Some(e.round) {
            return Err(InvariantViolation::RoundMismatch {
                event: e.round,
                table: self.round,
            });
        }

        self.round = e.round;
        self.game_state = if showdown {
            GameState::Showdown
        } else {
            e.round.into()
        };

        self.community_cards = [None; BOARD_SIZE];
        for (slot, card) in self.community_cards.iter_mut().zip(&e.community_cards) {
            *slot = Some(*card);
        }
        for player in self.seats.iter_mut().flatten() {
            if player.is_active() {
                player.has_acted = false;
            }
        }
        self.current_actor = if showdown {
            None
        } else {
            self.next_active_seat(self.dealer_position)
        };
        Ok(())
    }

    fn distribute(&mut self, e: &PotDistributed) -> Result<(), InvariantViolation> {
        if e.winners.len() != e.amounts.len() {
            return Err(InvariantViolation::UnbalancedDistribution {
                winners: e.winners.len(),
                amounts: e.amounts.len(),
            });
        }
        for (winner, amount) in e.winners.iter().zip(&e.amounts) {
            if let Some(seat) = self.seat_of(winner)
                && let Some(player) = self.player_mut(seat)
            {
                player.stack = player
                    .stack
                    .checked_add(*amount)
                    .ok_or(InvariantViolation::Overflow)?;
            }
        }

        self.pot = 0;
        self.game_state = GameState::Waiting;
        self.current_actor = None;
        self.community_cards = [None; BOARD_SIZE];
        for player in self.seats.iter_mut().flatten() {
            player.reset();
        }
        Ok(())
    }
}
