//! Plain-text rendering of table sessions for the terminal.

use chain_poker::{
    ActionChoices, SyncNotification, TableState,
    remote::TableSummary,
    table::{Card, Player},
};

const WIDTH: usize = 72;

/// One line per open table for the lobby prompt.
pub fn render_summary(index: usize, summary: &TableSummary) -> String {
    format!(
        "  {}. table #{} - {}/{} players - Blinds: {}/{} - Buy-in: {}",
        index + 1,
        summary.table_id,
        summary.player_count,
        summary.max_players,
        summary.small_blind,
        summary.big_blind,
        summary.buy_in
    )
}

/// Full table dump as the local participant may see it.
pub fn render_state(state: &TableState) -> String {
    let mut lines = vec![
        "═".repeat(WIDTH),
        format!("TABLE #{} [{}]", state.table_id, state.phase),
        "═".repeat(WIDTH),
    ];

    let Some(table) = &state.table else {
        lines.push("Waiting for the first snapshot...".to_string());
        return lines.join("\n");
    };

    lines.push(format!(
        "Blinds: {}/{}  Hand: {}  Pot: {}",
        table.small_blind, table.big_blind, table.game_state, table.pot
    ));
    let board = table.board().map(Card::to_string).collect::<Vec<_>>();
    if !board.is_empty() {
        lines.push(format!("Board: {}", board.join(" ")));
    }
    lines.push("─".repeat(WIDTH));

    if table.player_count == 0 {
        lines.push("No players at table".to_string());
    }
    for player in table.players() {
        let mut markers = Vec::new();
        if player.seat == table.dealer_position {
            markers.push("D");
        }
        if player.seat == table.small_blind_position {
            markers.push("SB");
        }
        if player.seat == table.big_blind_position {
            markers.push("BB");
        }
        if table.current_actor == Some(player.seat) {
            markers.push("→");
        }
        let markers = if markers.is_empty() {
            String::new()
        } else {
            format!(" ({})", markers.join("/"))
        };
        let you = if state.local_seat == Some(player.seat) {
            " [you]"
        } else {
            ""
        };

        lines.push(format!(
            "  seat {}: {}{}{} - stack {} - bet {} - {}",
            player.seat,
            player.id.short(),
            you,
            markers,
            player.stack,
            player.bet,
            status(player)
        ));
        lines.push(format!(
            "     Cards: {}",
            render_cards(state.visible_hole_cards(player.seat))
        ));
    }

    lines.push("═".repeat(WIDTH));
    if let Some(action) = &state.pending {
        lines.push(format!("Waiting for the ledger: you {action}"));
    } else if state.is_local_turn() {
        lines.push("Your turn.".to_string());
    }
    lines.join("\n")
}

pub fn render_choices(choices: &ActionChoices) -> String {
    if choices.is_empty() {
        "No actions available right now".to_string()
    } else {
        format!("You can {choices}")
    }
}

/// Short line for a session notification; `None` for plain state changes,
/// which are rendered in full by the caller.
pub fn render_notification(notification: &SyncNotification) -> Option<String> {
    match notification {
        SyncNotification::StateChanged(_) => None,
        SyncNotification::ActionConfirmed { seat, action } => {
            Some(format!("Confirmed: seat {seat} {action}"))
        }
        SyncNotification::ActionTimedOut { seat, action } => Some(format!(
            "No confirmation for seat {seat} ({action}); reverted to the ledger state"
        )),
        SyncNotification::ActionRejected { action, error } => {
            Some(format!("Action rejected ({action}): {error}"))
        }
        SyncNotification::FeedInterrupted(error) => Some(format!(
            "{error}. Type 'resubscribe' to reconnect"
        )),
    }
}

fn status(player: &Player) -> String {
    if player.has_folded {
        "folded".to_string()
    } else if player.is_all_in {
        "all-in".to_string()
    } else if let Some(last) = player.last_action
        && player.has_acted
    {
        last.to_string()
    } else {
        "waiting".to_string()
    }
}

fn render_cards(cards: [Option<Card>; 2]) -> String {
    match cards {
        [Some(a), Some(b)] => format!("{} {}", a.to_string().trim(), b.to_string().trim()),
        _ => "??".to_string(),
    }
}
