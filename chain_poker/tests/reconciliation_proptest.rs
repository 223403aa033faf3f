/// Property-based tests for snapshot ordering, legality and the account codec
///
/// These run the reconciler and evaluator over randomly generated tables
/// and update sequences.
use chain_poker::{
    feed::{FeedUpdate, TableEvent, events::ActionTaken},
    legality::{check_action, evaluate_seat},
    sync::{Outcome, Reconciler},
    table::{
        Action, BOARD_SIZE, Card, GameState, MAX_SEATS, ParticipantId, Player, Round, Table,
        decode_table, encode_table,
    },
};
use proptest::prelude::*;
use std::time::Duration;
use tokio::time::Instant;

// Strategy for a structurally valid table: 2..=max_players seated, some
// chips in front of each, seat 0 possibly on the clock
fn table_strategy() -> impl Strategy<Value = Table> {
    (
        2u8..=MAX_SEATS as u8,
        1u64..=500,
        prop::collection::vec((0u64..=100_000, 0u64..=5_000, any::<bool>()), MAX_SEATS),
        any::<bool>(),
        0u64..=1_000_000,
        0u8..52,
    )
        .prop_map(|(max_players, small_blind, seats, on_clock, sequence, card)| {
            let mut table = Table::new(
                9,
                ParticipantId([1; 32]),
                small_blind,
                small_blind * 2,
                max_players,
                100_000,
            );
            for (seat, (stack, bet, folded)) in
                seats.into_iter().take(usize::from(max_players)).enumerate()
            {
                let mut player = Player::new(ParticipantId([seat as u8 + 1; 32]), seat as u8, stack);
                player.bet = bet;
                player.has_folded = folded && seat != 0;
                table.pot += bet;
                table.seats[seat] = Some(player);
            }
            table.player_count = max_players;
            if on_clock {
                table.game_state = GameState::Flop;
                table.round = Round::Flop;
                for slot in table.community_cards.iter_mut().take(3) {
                    *slot = Card::from_u8(card);
                }
                table.current_actor = Some(0);
            }
            table.sequence = sequence;
            table
        })
}

// A table with seat 0 on the clock, the action seat 0 takes, and the newer
// snapshot the ledger writes once that action lands
fn acted_strategy() -> impl Strategy<Value = (Table, TableEvent, Table)> {
    (table_strategy(), any::<prop::sample::Index>()).prop_filter_map(
        "seat 0 has a legal action",
        |(before, pick)| {
            if before.current_actor.is_none() {
                return None;
            }
            let candidates: Vec<Action> = [
                Action::Fold,
                Action::Check,
                Action::Call,
                Action::AllIn,
                Action::Raise(before.to_call(0).saturating_add(before.min_raise)),
            ]
            .into_iter()
            .filter(|action| check_action(&before, 0, action).is_ok())
            .collect();
            if candidates.is_empty() {
                return None;
            }
            let action = pick.get(&candidates).clone();

            let mut after = before.apply_action(0, &action).ok()?;
            after.sequence = before.sequence + 1;
            let actor = before.player(0)?;
            let event = TableEvent::ActionTaken(ActionTaken {
                table_id: before.table_id,
                player: actor.id,
                seat: 0,
                action_type: action.action_type(),
                amount: after.player(0)?.bet - actor.bet,
                new_pot: after.pot,
                round: before.round,
            });
            Some((before, event, after))
        },
    )
}

fn sequences_strategy() -> impl Strategy<Value = Vec<u64>> {
    prop::collection::vec(0u64..1_000, 1..20)
}

proptest! {
    #[test]
    fn test_generated_tables_are_valid(table in table_strategy()) {
        prop_assert_eq!(table.validate(), Ok(()));
        prop_assert!(table.board_len() <= BOARD_SIZE);
    }

    #[test]
    fn test_codec_round_trip(table in table_strategy()) {
        let bytes = encode_table(&table).unwrap();
        prop_assert_eq!(decode_table(&bytes).unwrap(), table);
    }

    #[test]
    fn test_increasing_snapshots_end_at_last(base in table_strategy(), mut versions in sequences_strategy()) {
        versions.sort_unstable();
        versions.dedup();

        let mut reconciler = Reconciler::new(base.table_id);
        let mut last = None;
        for version in versions {
            let mut table = base.clone();
            table.sequence = version;
            table.pot = version;
            prop_assert!(reconciler.apply(FeedUpdate::Snapshot(table.clone())).is_commit());
            last = Some(table);
        }
        let last = last.unwrap();
        prop_assert_eq!(reconciler.table().unwrap().as_ref(), &last);
    }

    #[test]
    fn test_old_snapshots_never_change_state(base in table_strategy(), versions in sequences_strategy()) {
        let mut reconciler = Reconciler::new(base.table_id);
        let mut current = base.clone();
        current.sequence = 1_000;
        reconciler.apply(FeedUpdate::Snapshot(current.clone()));

        for version in versions {
            let mut stale = base.clone();
            stale.sequence = version;
            stale.pot = stale.pot.wrapping_add(1);
            let outcome = reconciler.apply(FeedUpdate::Snapshot(stale));
            prop_assert!(matches!(outcome, Outcome::Discarded(_)));
            prop_assert_eq!(reconciler.table().unwrap().as_ref(), &current);
        }
    }

    #[test]
    fn test_all_in_offered_iff_chips_remain(table in table_strategy(), seat in 0u8..MAX_SEATS as u8) {
        let choices = evaluate_seat(&table, seat);
        match table.player(seat) {
            Some(player) => prop_assert_eq!(choices.contains(&Action::AllIn), player.stack > 0),
            None => prop_assert!(choices.is_empty()),
        }
    }

    #[test]
    fn test_check_and_call_are_exclusive(table in table_strategy()) {
        let choices = evaluate_seat(&table, 0);
        let to_call = table.to_call(0);
        if to_call == 0 {
            prop_assert!(!choices.contains(&Action::Call));
            prop_assert_eq!(choices.contains(&Action::Check), table.is_turn(0));
        } else {
            prop_assert!(!choices.contains(&Action::Check));
            let stack = table.player(0).unwrap().stack;
            if to_call > stack {
                prop_assert!(!choices.contains(&Action::Call));
            }
        }
    }

    #[test]
    fn test_offered_choices_pass_checks(table in table_strategy()) {
        let choices = evaluate_seat(&table, 0);
        for action in [Action::Fold, Action::Check, Action::Call, Action::AllIn] {
            prop_assert_eq!(choices.contains(&action), check_action(&table, 0, &action).is_ok());
        }
        if let Some((min, max)) = choices.raise_bounds() {
            prop_assert!(check_action(&table, 0, &Action::Raise(min)).is_ok());
            prop_assert!(check_action(&table, 0, &Action::Raise(max)).is_ok());
            prop_assert!(check_action(&table, 0, &Action::Raise(min - 1)).is_err());
        }
    }

    #[test]
    fn test_timeout_restores_exact_table(table in table_strategy()) {
        let mut reconciler = Reconciler::new(table.table_id);
        reconciler.apply(FeedUpdate::Snapshot(table.clone()));
        let choices = evaluate_seat(&table, 0);
        let action = match choices.raise_bounds() {
            Some((min, _)) => Action::Raise(min),
            None if choices.contains(&Action::AllIn) => Action::AllIn,
            None => return Ok(()),
        };

        let now = Instant::now();
        let timeout = Duration::from_secs(30);
        reconciler.begin_local_action(0, action, now, timeout).unwrap();
        prop_assert!(reconciler.expire(now + timeout).is_some());
        prop_assert_eq!(reconciler.table().unwrap().as_ref(), &table);
        prop_assert!(reconciler.expire(now + timeout * 2).is_none());
    }

    #[test]
    fn test_event_after_its_snapshot_changes_nothing((before, event, after) in acted_strategy()) {
        let mut reconciler = Reconciler::new(before.table_id);
        reconciler.apply(FeedUpdate::Snapshot(before));
        prop_assert!(reconciler.apply(FeedUpdate::Snapshot(after.clone())).is_commit());

        let outcome = reconciler.apply(FeedUpdate::Event(event));
        prop_assert!(matches!(outcome, Outcome::Discarded(_)));
        prop_assert_eq!(reconciler.table().unwrap().as_ref(), &after);
    }

    #[test]
    fn test_event_before_its_snapshot_matches_snapshot((before, event, after) in acted_strategy()) {
        let mut reconciler = Reconciler::new(before.table_id);
        reconciler.apply(FeedUpdate::Snapshot(before.clone()));
        prop_assert!(reconciler.apply(FeedUpdate::Event(event)).is_commit());

        let mut expected = after.clone();
        expected.sequence = before.sequence;
        prop_assert_eq!(reconciler.table().unwrap().as_ref(), &expected);

        prop_assert!(reconciler.apply(FeedUpdate::Snapshot(after.clone())).is_commit());
        prop_assert_eq!(reconciler.table().unwrap().as_ref(), &after);
    }

    #[test]
    fn test_buffered_event_not_replayed_over_its_snapshot((_before, event, after) in acted_strategy()) {
        let mut reconciler = Reconciler::new(after.table_id);
        prop_assert_eq!(reconciler.apply(FeedUpdate::Event(event)), Outcome::Buffered);
        prop_assert!(reconciler.apply(FeedUpdate::Snapshot(after.clone())).is_commit());
        prop_assert_eq!(reconciler.table().unwrap().as_ref(), &after);
    }
}
