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

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GuildRole {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildMember {
    pub user_id: String,
    pub role_ids: Vec<String>,
}

/// Discord ids are decimal snowflakes.
pub fn is_snowflake(id: &str) -> bool {
    !id.is_empty() && id.len() <= 20 && id.bytes().all(|byte| byte.is_ascii_digit())
}

/// The slice of the chat platform the bot needs: one guild, its members and roles.
#[async_trait]
pub trait GuildGateway: Send + Sync {
    async fn wait_until_ready(&self) -> anyhow::Result<()>;
    async fn member(&self, user_id: &str) -> anyhow::Result<Option<GuildMember>>;
    async fn roles(&self) -> anyhow::Result<Vec<GuildRole>>;
    async fn add_member_role(&self, user_id: &str, role_id: &str) -> anyhow::Result<()>;
    async fn remove_member_role(&self, user_id: &str, role_id: &str) -> anyhow::Result<()>;
    async fn send_message(&self, channel_id: &str, content: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Deserialize)]
struct MemberPayload {
    user: MemberUserPayload,
    #[serde(default)]
    roles: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct MemberUserPayload {
    id: String,
}

#[derive(Debug, Deserialize)]
struct GuildPayload {
    id: String,
    name: String,
}

#[derive(Serialize)]
struct CreateMessagePayload<'a> {
    content: &'a str,
}

/// Discord REST v10 client scoped to a single guild.
#[derive(Clone)]
pub struct DiscordGateway {
    client: reqwest::Client,
    base_url: String,
    token: String,
    guild_id: String,
}

impl DiscordGateway {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        token: impl Into<String>,
        guild_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            token: token.into(),
            guild_id: guild_id.into(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    /// `guilds/{guild_id}/...` with every segment percent-encoded.
    fn guild_path(&self, segments: &[&str]) -> String {
        let mut path = format!("guilds/{}", urlencoding::encode(&self.guild_id));
        for segment in segments {
            path.push('/');
            path.push_str(&urlencoding::encode(segment));
        }
        path
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.endpoint(path))
            .header("Authorization", format!("Bot {}", self.token))
    }

    async fn expect_success(
        response: reqwest::Response,
        what: &str,
    ) -> anyhow::Result<reqwest::Response> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "".to_string());
            anyhow::bail!("discord returned {} for {}: {}", status, what, body);
        }
        Ok(response)
    }
}

#[async_trait]
impl GuildGateway for DiscordGateway {
    async fn wait_until_ready(&self) -> anyhow::Result<()> {
        let response = self
            .request(Method::GET, &self.guild_path(&[]))
            .send()
            .await
            .context("failed to reach discord")?;
        let guild = Self::expect_success(response, "guild lookup")
            .await?
            .json::<GuildPayload>()
            .await
            .context("invalid discord guild payload")?;
        info!(guild_id = %guild.id, guild_name = %guild.name, "discord guild reachable");
        Ok(())
    }

    async fn member(&self, user_id: &str) -> anyhow::Result<Option<GuildMember>> {
        let response = self
            .request(Method::GET, &self.guild_path(&["members", user_id]))
            .send()
            .await
            .context("failed to fetch guild member")?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(user_id = %user_id, "member not in guild");
            return Ok(None);
        }
        let member = Self::expect_success(response, "member lookup")
            .await?
            .json::<MemberPayload>()
            .await
            .context("invalid discord member payload")?;
        Ok(Some(GuildMember {
            user_id: member.user.id,
            role_ids: member.roles,
        }))
    }

    async fn roles(&self) -> anyhow::Result<Vec<GuildRole>> {
        let response = self
            .request(Method::GET, &self.guild_path(&["roles"]))
            .send()
            .await
            .context("failed to fetch guild roles")?;
        Self::expect_success(response, "role listing")
            .await?
            .json::<Vec<GuildRole>>()
            .await
            .context("invalid discord roles payload")
    }

    async fn add_member_role(&self, user_id: &str, role_id: &str) -> anyhow::Result<()> {
        let response = self
            .request(
                Method::PUT,
                &self.guild_path(&["members", user_id, "roles", role_id]),
            )
            .send()
            .await
            .context("failed to add member role")?;
        Self::expect_success(response, "role add").await?;
        Ok(())
    }

    async fn remove_member_role(&self, user_id: &str, role_id: &str) -> anyhow::Result<()> {
        let response = self
            .request(
                Method::DELETE,
                &self.guild_path(&["members", user_id, "roles", role_id]),
            )
            .send()
            .await
            .context("failed to remove member role")?;
        Self::expect_success(response, "role removal").await?;
        Ok(())
    }

    async fn send_message(&self, channel_id: &str, content: &str) -> anyhow::Result<()> {
        let response = self
            .request(
                Method::POST,
                &format!("channels/{}/messages", urlencoding::encode(channel_id)),
            )
            .json(&CreateMessagePayload { content })
            .send()
            .await
            .context("failed to send discord message")?;
        Self::expect_success(response, "message send").await?;
        Ok(())
    }
}
