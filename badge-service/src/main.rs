// Copyright (C) 2026 StarHuntingGames
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

mod commands;
mod config;
mod directory;
mod discord;
mod riot;
mod roles;
mod scheduler;

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use crate::{
    commands::{AppState, build_router},
    config::BotConfig,
    directory::UserDirectory,
    discord::{DiscordGateway, GuildGateway},
    riot::{AccountResolver, HttpRiotApi, MatchHistoryFetcher, RiotApi},
    roles::RoleReconciler,
    scheduler::ReconciliationScheduler,
};

// Everything shares one thread; handlers and the reconciliation loop only
// interleave at network calls and timer ticks.
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "badge_service=debug,tower_http=info".to_string()),
        )
        .init();

    let config = BotConfig::from_env()?;
    let client = reqwest::Client::new();
    let directory = Arc::new(
        UserDirectory::open(&config.db_path)
            .with_context(|| format!("failed to open user directory at {}", config.db_path))?,
    );
    let gateway: Arc<dyn GuildGateway> = Arc::new(DiscordGateway::new(
        client.clone(),
        config.discord_api_base_url.clone(),
        config.discord_token.clone(),
        config.discord_guild_id.clone(),
    ));
    let riot: Arc<dyn RiotApi> = Arc::new(HttpRiotApi::new(
        client,
        config.riot_api_base_url.clone(),
        config.riot_api_key.clone(),
    ));

    gateway
        .wait_until_ready()
        .await
        .context("discord guild is not reachable")?;

    let scheduler = Arc::new(ReconciliationScheduler::new(
        directory.clone(),
        gateway.clone(),
        MatchHistoryFetcher::new(riot.clone()),
        RoleReconciler::new(gateway.clone(), config.role_names.clone()),
        config.reconcile_interval,
    ));
    let scheduler_handle = scheduler.clone().spawn();

    let state = AppState {
        resolver: AccountResolver::new(riot),
        directory: directory.clone(),
        scheduler,
        scheduler_handle: scheduler_handle.clone(),
        gateway,
        command_prefix: config.command_prefix.clone(),
        relay_token: config.relay_token.clone(),
    };
    if state.relay_token.is_none() {
        info!("BADGE_RELAY_TOKEN is not set; command ingress is loopback-only");
    }

    let app = build_router(state);
    info!(bind_addr = %config.bind_addr, "badge-service listening");
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(error) = tokio::signal::ctrl_c().await {
                warn!(error = %error, "failed to listen for shutdown signal");
            }
        })
        .await?;

    info!("badge-service shutting down");
    scheduler_handle.stop();
    drop(scheduler_handle);
    tokio::task::yield_now().await;
    match Arc::try_unwrap(directory) {
        Ok(directory) => directory.close().context("failed to close user directory")?,
        Err(_) => warn!("user directory still in use at shutdown; leaving it to drop"),
    }
    Ok(())
}
