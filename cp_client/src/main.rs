//! A command-line client mirroring a poker table that lives on a ledger.
//!
//! The client lists open tables through the gateway, follows the chosen
//! table over the RPC node's websocket and submits actions through the
//! gateway's signer.

use anyhow::{Context, Result};
use chain_poker::{
    SyncNotification, SyncResult, SyncStore, TableHandle, TableId, remote::TransactionId,
};
use log::debug;
use pico_args::Arguments;
use std::{
    io::{self, Write},
    sync::Arc,
};
use tokio::io::{AsyncBufReadExt, BufReader};

use cp_client::{
    commands::{COMMANDS_HELP, Command, parse_command},
    config::{ClientConfig, ConfigOverrides},
    display::{render_choices, render_notification, render_state, render_summary},
    gateway::GatewayClient,
    rpc::RpcConnection,
};

const HELP: &str = "\
Follow and play a ledger-hosted poker table

USAGE:
  cp_client [OPTIONS]

OPTIONS:
  --rpc          URL       RPC websocket URL   [default: env RPC_WS_URL or ws://127.0.0.1:8900]
  --api          URL       Gateway URL         [default: env API_URL or http://127.0.0.1:8080]
  --participant  HEX       Your participant id [default: env PARTICIPANT_ID]
  --table        ID        Join this table instead of choosing from the lobby

FLAGS:
  -h, --help               Print help information

ENVIRONMENT:
  PROGRAM_ADDRESS          Address of the poker program (required)
  ACTION_TIMEOUT_SECS      Seconds to wait for an action to land [default: 30]
  FEED_CAPACITY            Buffered feed updates per table [default: 256]
";

struct Args {
    rpc_ws_url: Option<String>,
    api_url: Option<String>,
    participant: Option<String>,
    table: Option<TableId>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let args = Args {
        rpc_ws_url: pargs.opt_value_from_str("--rpc")?,
        api_url: pargs.opt_value_from_str("--api")?,
        participant: pargs.opt_value_from_str("--participant")?,
        table: pargs.opt_value_from_str("--table")?,
    };

    env_logger::builder().format_target(false).init();

    run(args).await
}

async fn run(args: Args) -> Result<()> {
    let config = ClientConfig::from_env(ConfigOverrides {
        rpc_ws_url: args.rpc_ws_url,
        api_url: args.api_url,
        participant: args.participant,
    })?;
    config.validate()?;

    let gateway = Arc::new(GatewayClient::new(config.api_url.clone(), config.participant));
    let connection =
        Arc::new(RpcConnection::new(config.rpc_ws_url.clone()).with_capacity(config.sync.feed_capacity));
    let store = SyncStore::new(
        connection,
        gateway.clone(),
        gateway,
        config.program.clone(),
        config.sync.clone(),
    );

    let table_id = match args.table {
        Some(table_id) => table_id,
        None => choose_table(&store).await?,
    };

    println!("\nJoining table #{table_id} as {}...", config.participant.short());
    let handle = store
        .join_table(table_id, config.participant)
        .await
        .context("Failed to join table")?;

    let subscriber = handle.subscribe().await?;
    let printer = tokio::spawn(async move {
        let mut subscriber = subscriber;
        while let Some(notification) = subscriber.recv().await {
            print_notification(&notification);
        }
        debug!("Notification stream closed");
    });

    println!("Type 'help' for commands.");
    let result = command_loop(&store, &handle).await;

    store.shutdown().await;
    printer.abort();
    println!("\nLeft table #{table_id}.");
    result
}

async fn choose_table(store: &SyncStore) -> Result<TableId> {
    println!("\nAvailable tables:");
    let tables = store.list_tables().await.context("Failed to list tables")?;

    if tables.is_empty() {
        anyhow::bail!("No tables available");
    }

    for (i, table) in tables.iter().enumerate() {
        println!("{}", render_summary(i, table));
    }

    print!("\nSelect table (1-{}): ", tables.len());
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let index: usize = input.trim().parse().context("Invalid table number")?;

    match index.checked_sub(1).and_then(|i| tables.get(i)) {
        Some(table) => Ok(table.table_id),
        None => anyhow::bail!("Invalid table selection"),
    }
}

async fn command_loop(store: &SyncStore, handle: &TableHandle) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };

        match command {
            Command::Quit => break,
            Command::Help => print!("{COMMANDS_HELP}"),
            Command::State => println!("{}", render_state(&handle.state().await?)),
            Command::Actions => match handle.legal_actions().await {
                Ok(choices) => println!("{}", render_choices(&choices)),
                Err(e) => eprintln!("{e}"),
            },
            Command::Resubscribe => match store.resubscribe(handle.table_id()).await {
                Ok(()) => println!("Change feed reconnected"),
                Err(e) => eprintln!("Failed to reconnect: {e}"),
            },
            Command::Act(action) => {
                // Signing can take a while; keep the prompt responsive.
                let handle = handle.clone();
                tokio::spawn(async move {
                    match handle.submit_action(action).await {
                        Ok(transaction) => println!("Submitted as {transaction}"),
                        Err(e) => eprintln!("Action failed: {e}"),
                    }
                });
            }
            Command::Sit(seat) => {
                let handle = handle.clone();
                tokio::spawn(async move { report("Sit", handle.sit(seat).await) });
            }
            Command::Stand => {
                let handle = handle.clone();
                tokio::spawn(async move { report("Stand", handle.stand().await) });
            }
            Command::Start => {
                let handle = handle.clone();
                tokio::spawn(async move { report("Start", handle.start_hand().await) });
            }
        }
    }

    Ok(())
}

fn report(what: &str, result: SyncResult<TransactionId>) {
    match result {
        Ok(transaction) => println!("{what} submitted as {transaction}"),
        Err(e) => eprintln!("{what} failed: {e}"),
    }
}

fn print_notification(notification: &SyncNotification) {
    match (notification, render_notification(notification)) {
        (_, Some(line)) => println!("{line}"),
        (SyncNotification::StateChanged(state), None) => println!("{}", render_state(state)),
        (_, None) => {}
    }
}
