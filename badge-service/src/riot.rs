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

//! Account resolution and match-history lookups against the Riot web API.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use badge_common::{
    AccountId, MatchDetail, MatchOutcome, RECENT_MATCH_COUNT, RiotAccount, RiotId,
};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

#[async_trait]
pub trait RiotApi: Send + Sync {
    async fn account_by_riot_id(
        &self,
        game_name: &str,
        tag_line: &str,
    ) -> anyhow::Result<RiotAccount>;
    async fn match_ids_by_puuid(&self, puuid: &str, count: usize) -> anyhow::Result<Vec<String>>;
    async fn match_by_id(&self, match_id: &str) -> anyhow::Result<MatchDetail>;
}

#[derive(Clone)]
pub struct HttpRiotApi {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpRiotApi {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    fn account_url(&self, game_name: &str, tag_line: &str) -> String {
        self.endpoint(&format!(
            "riot/account/v1/accounts/by-riot-id/{}/{}",
            urlencoding::encode(game_name),
            urlencoding::encode(tag_line)
        ))
    }

    fn match_ids_url(&self, puuid: &str, count: usize) -> String {
        self.endpoint(&format!(
            "lol/match/v5/matches/by-puuid/{}/ids?start=0&count={}",
            urlencoding::encode(puuid),
            count
        ))
    }

    fn match_url(&self, match_id: &str) -> String {
        self.endpoint(&format!(
            "lol/match/v5/matches/{}",
            urlencoding::encode(match_id)
        ))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: String) -> anyhow::Result<T> {
        debug!(url = %url, "riot api request");
        let response = self
            .client
            .get(url)
            .header("X-Riot-Token", &self.api_key)
            .send()
            .await
            .context("riot api request failed")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "".to_string());
            anyhow::bail!("riot api returned {}: {}", status, body);
        }
        response
            .json::<T>()
            .await
            .context("invalid riot api payload")
    }
}

#[async_trait]
impl RiotApi for HttpRiotApi {
    async fn account_by_riot_id(
        &self,
        game_name: &str,
        tag_line: &str,
    ) -> anyhow::Result<RiotAccount> {
        self.get_json(self.account_url(game_name, tag_line)).await
    }

    async fn match_ids_by_puuid(&self, puuid: &str, count: usize) -> anyhow::Result<Vec<String>> {
        self.get_json(self.match_ids_url(puuid, count)).await
    }

    async fn match_by_id(&self, match_id: &str) -> anyhow::Result<MatchDetail> {
        self.get_json(self.match_url(match_id)).await
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("identifier {0:?} is not in Name#Tag form")]
    MalformedIdentifier(String),
    /// Covers both unknown accounts and upstream failures; `cause` is for logs only.
    #[error("no account found for {identifier}: {cause}")]
    NotFound { identifier: String, cause: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HistoryError {
    #[error("fewer than two matches on record")]
    InsufficientHistory,
    #[error("match history fetch failed: {0}")]
    Fetch(String),
}

#[derive(Clone)]
pub struct AccountResolver {
    api: Arc<dyn RiotApi>,
}

impl AccountResolver {
    pub fn new(api: Arc<dyn RiotApi>) -> Self {
        Self { api }
    }

    pub async fn resolve(&self, display_identifier: &str) -> Result<AccountId, ResolutionError> {
        let Some(riot_id) = RiotId::parse(display_identifier) else {
            return Err(ResolutionError::MalformedIdentifier(
                display_identifier.trim().to_string(),
            ));
        };

        let not_found = |cause: String| {
            warn!(riot_id = %riot_id, cause = %cause, "riot id resolution failed");
            ResolutionError::NotFound {
                identifier: riot_id.to_string(),
                cause,
            }
        };

        match self
            .api
            .account_by_riot_id(&riot_id.game_name, &riot_id.tag_line)
            .await
        {
            Ok(RiotAccount {
                puuid: Some(puuid), ..
            }) if !puuid.is_empty() => Ok(puuid),
            Ok(_) => Err(not_found("response carried no puuid".to_string())),
            Err(error) => Err(not_found(format!("{error:#}"))),
        }
    }
}

#[derive(Clone)]
pub struct MatchHistoryFetcher {
    api: Arc<dyn RiotApi>,
}

impl MatchHistoryFetcher {
    pub fn new(api: Arc<dyn RiotApi>) -> Self {
        Self { api }
    }

    pub async fn fetch_last_two(&self, account_id: &str) -> Result<MatchOutcome, HistoryError> {
        let match_ids = self
            .api
            .match_ids_by_puuid(account_id, RECENT_MATCH_COUNT)
            .await
            .map_err(|error| HistoryError::Fetch(format!("match id list: {error:#}")))?;
        if match_ids.len() < RECENT_MATCH_COUNT {
            return Err(HistoryError::InsufficientHistory);
        }

        let mut outcomes = Vec::with_capacity(RECENT_MATCH_COUNT);
        for match_id in match_ids.iter().take(RECENT_MATCH_COUNT) {
            let detail = self
                .api
                .match_by_id(match_id)
                .await
                .map_err(|error| HistoryError::Fetch(format!("match {match_id}: {error:#}")))?;
            let outcome = detail.outcome_for(account_id).ok_or_else(|| {
                HistoryError::Fetch(format!("account not among participants of {match_id}"))
            })?;
            outcomes.push(outcome);
        }

        debug!(
            account_id = %account_id,
            most_recent = outcomes[0].as_str(),
            previous = outcomes[1].as_str(),
            "fetched recent match outcomes"
        );
        Ok(MatchOutcome::new(outcomes[0], outcomes[1]))
    }
}
