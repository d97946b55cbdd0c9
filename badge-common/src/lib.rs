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

use std::fmt;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const DEFAULT_RECONCILE_INTERVAL_SECONDS: u64 = 1800;
/// Number of most recent matches that drive the badge decision.
pub const RECENT_MATCH_COUNT: usize = 2;
pub const RIOT_ID_SEPARATOR: char = '#';

pub const DEFAULT_IRON_ROLE_NAME: &str = "🔻 Iron IV";
pub const DEFAULT_CHALLENGER_ROLE_NAME: &str = "⚡ Challenger";
pub const DEFAULT_CLUTCH_MASTER_ROLE_NAME: &str = "🔥 Clutch Master";

/// Every badge this system owns, in removal order.
pub const TRACKED_ROLES: [RoleAssignment; 3] = [
    RoleAssignment::Iron,
    RoleAssignment::Challenger,
    RoleAssignment::ClutchMaster,
];

pub type ChatUserId = String;
pub type AccountId = String;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Win,
    Loss,
}

impl Outcome {
    pub fn from_win(win: bool) -> Self {
        if win { Outcome::Win } else { Outcome::Loss }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Win => "win",
            Outcome::Loss => "loss",
        }
    }
}

/// Results of the two most recent matches, most recent first.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchOutcome {
    pub most_recent: Outcome,
    pub previous: Outcome,
}

impl MatchOutcome {
    pub fn new(most_recent: Outcome, previous: Outcome) -> Self {
        Self {
            most_recent,
            previous,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RoleAssignment {
    Iron,
    Challenger,
    ClutchMaster,
    None,
}

impl RoleAssignment {
    pub fn as_str(self) -> &'static str {
        match self {
            RoleAssignment::Iron => "iron",
            RoleAssignment::Challenger => "challenger",
            RoleAssignment::ClutchMaster => "clutch_master",
            RoleAssignment::None => "none",
        }
    }
}

/// Badge for a pair of outcomes. A loss in the most recent match always
/// yields Iron; otherwise the previous match picks between the two win badges.
pub fn compute_role(outcome: MatchOutcome) -> RoleAssignment {
    match (outcome.most_recent, outcome.previous) {
        (Outcome::Loss, _) => RoleAssignment::Iron,
        (Outcome::Win, Outcome::Win) => RoleAssignment::ClutchMaster,
        (Outcome::Win, Outcome::Loss) => RoleAssignment::Challenger,
    }
}

/// A player-entered `Name#Tag` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiotId {
    pub game_name: String,
    pub tag_line: String,
}

impl RiotId {
    /// Trims the whole input, then splits on the first separator. The halves
    /// are kept verbatim and must both be non-empty.
    pub fn parse(input: &str) -> Option<Self> {
        let (name, tag) = input.trim().split_once(RIOT_ID_SEPARATOR)?;
        if name.is_empty() || tag.is_empty() {
            return None;
        }
        Some(Self {
            game_name: name.to_string(),
            tag_line: tag.to_string(),
        })
    }
}

impl fmt::Display for RiotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.game_name, RIOT_ID_SEPARATOR, self.tag_line)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserRecord {
    pub chat_user_id: ChatUserId,
    pub display_identifier: String,
    pub account_id: AccountId,
    pub updated_at: DateTime<Utc>,
}

/// account-v1 lookup payload. Upstream error bodies deserialize with `puuid: None`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiotAccount {
    #[serde(default)]
    pub puuid: Option<String>,
    #[serde(default, rename = "gameName")]
    pub game_name: Option<String>,
    #[serde(default, rename = "tagLine")]
    pub tag_line: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchDetail {
    pub info: MatchInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchInfo {
    pub participants: Vec<MatchParticipant>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchParticipant {
    pub puuid: String,
    pub win: bool,
}

impl MatchDetail {
    pub fn outcome_for(&self, puuid: &str) -> Option<Outcome> {
        self.info
            .participants
            .iter()
            .find(|participant| participant.puuid == puuid)
            .map(|participant| Outcome::from_win(participant.win))
    }
}

/// A chat message forwarded by the gateway relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessageRequest {
    pub channel_id: String,
    pub author_id: ChatUserId,
    #[serde(default)]
    pub author_is_bot: bool,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessageResponse {
    pub handled: bool,
    pub reply: Option<String>,
    pub delivered: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileTriggerResponse {
    pub accepted: bool,
    pub requested_at: DateTime<Utc>,
}

/// Replace `${VAR_NAME}` patterns in a string with values from environment variables.
/// Unknown or unset variables are replaced with an empty string.
pub fn expand_env_vars(input: &str) -> String {
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap();
    re.replace_all(input, |caps: &regex::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_default()
    })
    .into_owned()
}
