#![forbid(unsafe_code)]
#![allow(dead_code)]

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;

mod bot;
mod chat;
mod cli;
mod config;
mod db;
mod discord;
mod parsers;
mod points;
mod reminders;
mod scheduler;
mod triggers;
mod utils;

use chat::ChatGateway;
use config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    let config = Arc::new(Config::load(args.config.as_deref())?);
    utils::logging::init_tracing(&config.logging.level);
    info!("tally-bot starting up");

    let db_manager = Arc::new(db::DatabaseManager::new(&config.database)?);
    db_manager.migrate().await?;

    let discord_client = Arc::new(discord::DiscordClient::new(config.clone()));
    let gateway: Arc<dyn ChatGateway> = discord_client.clone();

    let core = bot::BotCore::new(config.clone(), &db_manager, gateway).await?;
    discord_client.set_core(core.clone()).await;

    discord_client.start().await?;

    tokio::signal::ctrl_c().await?;

    info!("tally-bot shutting down");
    core.shutdown();
    discord_client.stop().await?;
    Ok(())
}
