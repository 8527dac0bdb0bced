//! CLI entry point for Stickfix.
//!
//! This binary provides the `stickfix` command for administering a sticker
//! registry from the shell and for running its periodic maintenance.

mod cli;
mod helpers;

use anyhow::{Context, Result};
use clap::Parser;
use stickfix_store::{
    Generation, IntegrityStatus, MaintenanceHandle, MaintenanceSchedule, StickerStore, Window,
};
use tracing::info;

use cli::{Cli, Commands, Mode, Toggle, UserAction};
use helpers::{init_tracing, load_config, open_store, print_stickers, stats_json};

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(match cli.command {
        Commands::Serve => "info",
        _ => "warn",
    });

    let config = load_config(&cli.config, cli.data_dir)?;
    let store = open_store(&config)?;

    let mutates = cli.command.mutates();
    if let Commands::Serve = cli.command {
        return cmd_serve(store, MaintenanceSchedule::from_config(&config)).await;
    }
    cmd_registry(&store, cli.command)?;

    if mutates {
        store.save().context("failed to save registry")?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommands: stickers, queries, persistence
// ---------------------------------------------------------------------------

fn cmd_registry(store: &StickerStore, command: Commands) -> Result<()> {
    match command {
        Commands::Add {
            caller,
            sticker,
            tags,
        } => {
            let target = store
                .add_sticker(&caller, &sticker, &tags)
                .context("failed to add sticker")?;
            println!("  Linked {sticker} to {} tag(s) in {target}", tags.len());
        }
        Commands::Remove {
            caller,
            sticker,
            tags,
        } => {
            let target = store
                .remove_sticker(&caller, &sticker, &tags)
                .context("failed to remove sticker")?;
            println!("  Unlinked {sticker} from {} tag(s) in {target}", tags.len());
        }
        Commands::Get {
            caller,
            tags,
            shuffle,
            offset,
            limit,
        } => {
            let window = Window::new(offset, limit.unwrap_or(usize::MAX));
            let stickers = store
                .get_sticker_list(&caller, &tags, shuffle, window)
                .context("query failed")?;
            print_stickers(&stickers);
        }
        Commands::Inline {
            caller,
            tags,
            offset,
        } => {
            let page = store
                .inline_query(&caller, &tags, offset)
                .context("inline query failed")?;
            println!("  Showing stickers in: {}", page.tags.join(", "));
            print_stickers(&page.stickers);
            println!("  Next offset: {}", page.next_offset);
        }
        Commands::Random { caller, tag } => {
            match store
                .random_sticker(&caller, &tag)
                .context("random lookup failed")?
            {
                Some(sticker) => println!("  {sticker}"),
                None => println!("  (no stickers tagged {tag})"),
            }
        }
        Commands::Consume { caller } => {
            let dropped = store.consume(&caller).context("failed to consume")?;
            println!("  Dropped {dropped} cached result(s) for {caller}");
        }
        Commands::Save => {
            store.save().context("failed to save registry")?;
            println!("  Registry saved");
        }
        Commands::Check => match store.check_integrity().context("integrity check failed")? {
            IntegrityStatus::Healthy => println!("  Registry:         OK"),
            IntegrityStatus::Restored(generation) => {
                println!("  Registry:         RESTORED from {generation}")
            }
        },
        Commands::Restore { generation } => {
            let generation = Generation::from_number(generation)?;
            store
                .restore(generation)
                .with_context(|| format!("failed to restore {generation}"))?;
            println!("  Registry restored from {generation}");
        }
        Commands::Stats { json } => {
            let stats = store.stats().context("failed to read stats")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats_json(&stats))?);
            } else {
                println!();
                println!("  Stickfix Registry");
                println!("  =================");
                println!();
                println!("  Users:            {}", stats.users);
                println!("  Tags:             {}", stats.tags);
                println!("  Stickers:         {}", stats.stickers);
                println!("  Cached results:   {}", stats.cached_results);
                println!("  Cache:            {}", store.cache_stats());
                println!();
            }
        }
        Commands::User { action } => cmd_user(store, action)?,
        Commands::Serve => anyhow::bail!("`serve` runs on the async runtime"),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: user
// ---------------------------------------------------------------------------

fn cmd_user(store: &StickerStore, action: UserAction) -> Result<()> {
    match action {
        UserAction::Create { id } => {
            let record = store.create_user(&id).context("failed to create user")?;
            println!(
                "  User {id}: private={} shuffle={}",
                record.private_mode, record.shuffle
            );
        }
        UserAction::Delete { id } => {
            if store.delete_user(&id).context("failed to delete user")? {
                println!("  Deleted user {id}");
            } else {
                println!("  User {id} does not exist");
            }
        }
        UserAction::Mode { id, mode } => {
            let private = matches!(mode, Mode::Private);
            store
                .set_private_mode(&id, private)
                .context("failed to set mode")?;
            println!("  User {id}: private={private}");
        }
        UserAction::Shuffle { id, state } => {
            let shuffle = matches!(state, Toggle::On);
            store
                .set_shuffle(&id, shuffle)
                .context("failed to set shuffle")?;
            println!("  User {id}: shuffle={shuffle}");
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: serve
// ---------------------------------------------------------------------------

async fn cmd_serve(store: StickerStore, schedule: MaintenanceSchedule) -> Result<()> {
    let maintenance = MaintenanceHandle::spawn(store.clone(), schedule);
    info!("stickfix maintenance running, press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;

    info!("shutting down");
    maintenance.shutdown().await;
    tokio::task::spawn_blocking(move || store.save())
        .await
        .context("save task panicked")?
        .context("failed to save registry on shutdown")?;
    Ok(())
}
