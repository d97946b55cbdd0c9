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

use std::{net::SocketAddr, time::Duration};

use anyhow::Context;
use badge_common::{
    DEFAULT_CHALLENGER_ROLE_NAME, DEFAULT_CLUTCH_MASTER_ROLE_NAME, DEFAULT_IRON_ROLE_NAME,
    DEFAULT_RECONCILE_INTERVAL_SECONDS, RoleAssignment, expand_env_vars,
};

#[derive(Debug, Clone)]
pub struct BotConfig {
    pub discord_token: String,
    pub discord_guild_id: String,
    pub discord_api_base_url: String,
    pub riot_api_key: String,
    pub riot_api_base_url: String,
    pub db_path: String,
    pub bind_addr: SocketAddr,
    pub command_prefix: String,
    pub relay_token: Option<String>,
    pub reconcile_interval: Duration,
    pub role_names: RoleNames,
}

/// Guild role names backing each tracked badge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleNames {
    pub iron: String,
    pub challenger: String,
    pub clutch_master: String,
}

impl Default for RoleNames {
    fn default() -> Self {
        Self {
            iron: DEFAULT_IRON_ROLE_NAME.to_string(),
            challenger: DEFAULT_CHALLENGER_ROLE_NAME.to_string(),
            clutch_master: DEFAULT_CLUTCH_MASTER_ROLE_NAME.to_string(),
        }
    }
}

impl RoleNames {
    pub fn name_for(&self, role: RoleAssignment) -> Option<&str> {
        match role {
            RoleAssignment::Iron => Some(&self.iron),
            RoleAssignment::Challenger => Some(&self.challenger),
            RoleAssignment::ClutchMaster => Some(&self.clutch_master),
            RoleAssignment::None => None,
        }
    }

    fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            iron: role_name_var("ROLE_IRON_NAME").unwrap_or(defaults.iron),
            challenger: role_name_var("ROLE_CHALLENGER_NAME").unwrap_or(defaults.challenger),
            clutch_master: role_name_var("ROLE_CLUTCH_MASTER_NAME")
                .unwrap_or(defaults.clutch_master),
        }
    }
}

impl BotConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let riot_region = std::env::var("RIOT_REGION")
            .ok()
            .unwrap_or_else(|| "europe".to_string());
        let config = Self {
            discord_token: required_var("DISCORD_TOKEN")?,
            discord_guild_id: required_var("DISCORD_GUILD_ID")?,
            discord_api_base_url: std::env::var("DISCORD_API_BASE_URL")
                .ok()
                .unwrap_or_else(|| "https://discord.com/api/v10".to_string()),
            riot_api_key: required_var("RIOT_API_KEY")?,
            riot_api_base_url: std::env::var("RIOT_API_BASE_URL")
                .ok()
                .unwrap_or_else(|| regional_base_url(&riot_region)),
            db_path: std::env::var("BADGE_DB_PATH")
                .ok()
                .unwrap_or_else(|| "bot_data.db".to_string()),
            bind_addr: parse_bind_addr("BADGE_BOT_BIND", "127.0.0.1:8095")?,
            command_prefix: std::env::var("BADGE_COMMAND_PREFIX")
                .ok()
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| "!".to_string()),
            relay_token: normalize_optional_string(std::env::var("BADGE_RELAY_TOKEN").ok()),
            reconcile_interval: Duration::from_secs(
                std::env::var("RECONCILE_INTERVAL_SECONDS")
                    .ok()
                    .and_then(|value| value.parse::<u64>().ok())
                    .unwrap_or(DEFAULT_RECONCILE_INTERVAL_SECONDS)
                    .max(1),
            ),
            role_names: RoleNames::from_env(),
        };
        ensure_ingress_protected(config.bind_addr, config.relay_token.as_deref())?;
        Ok(config)
    }
}

/// Command ingress trusts the relayed author id, so it may only be reachable
/// off-host when a relay token is configured.
fn ensure_ingress_protected(
    bind_addr: SocketAddr,
    relay_token: Option<&str>,
) -> anyhow::Result<()> {
    if relay_token.is_none() && !bind_addr.ip().is_loopback() {
        anyhow::bail!(
            "BADGE_RELAY_TOKEN must be set when BADGE_BOT_BIND ({bind_addr}) is not a loopback address"
        );
    }
    Ok(())
}

fn required_var(var_name: &str) -> anyhow::Result<String> {
    normalize_optional_string(std::env::var(var_name).ok())
        .with_context(|| format!("{var_name} must be set"))
}

fn role_name_var(var_name: &str) -> Option<String> {
    normalize_optional_string(std::env::var(var_name).ok().map(|value| expand_env_vars(&value)))
}

fn parse_bind_addr(var_name: &str, default: &str) -> anyhow::Result<SocketAddr> {
    let value = std::env::var(var_name)
        .ok()
        .unwrap_or_else(|| default.to_string());
    value.parse().context(format!("invalid {var_name}"))
}

pub fn regional_base_url(region: &str) -> String {
    format!("https://{}.api.riotgames.com", region.trim().to_ascii_lowercase())
}

fn normalize_optional_string(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|trimmed| !trimmed.is_empty())
}
