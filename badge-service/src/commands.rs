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

//! HTTP ingress for chat messages relayed from the gateway, plus the
//! prefix-command handlers behind it.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use badge_common::{ChatMessageRequest, ChatMessageResponse, ReconcileTriggerResponse};
use chrono::Utc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::{
    directory::UserDirectory,
    discord::{GuildGateway, is_snowflake},
    riot::{AccountResolver, HistoryError, ResolutionError},
    scheduler::{CycleReport, ReconcileError, ReconciliationScheduler, SchedulerHandle},
};

pub const RELAY_TOKEN_HEADER: &str = "x-relay-token";

pub const REPLY_PONG: &str = "🏓 Pong!";
pub const REPLY_REGISTER_USAGE: &str = "❌ Usage: `!setlol Name#Tag`";
pub const REPLY_MALFORMED_IDENTIFIER: &str =
    "❌ That doesn't look like a Riot ID. Use the `Name#Tag` format, e.g. `!setlol Faker#KR1`.";
pub const REPLY_NOT_FOUND: &str =
    "❌ Error: Could not find that summoner. Check spelling or region.";
pub const REPLY_SAVE_FAILED: &str = "❌ Error: Could not save your League name. Try again later.";
pub const REPLY_NOT_REGISTERED: &str =
    "❌ You haven't set your League name yet. Use `!setlol Name#Tag` first.";
pub const REPLY_NO_MATCH_HISTORY: &str = "⚠️ No match history found.";
pub const REPLY_FETCH_FAILED: &str =
    "⚠️ Could not load your match history right now. Try again later.";
pub const REPLY_NOT_A_MEMBER: &str = "❌ You are not a member of this server.";
pub const REPLY_ROLE_UPDATE_FAILED: &str = "❌ Something went wrong while updating your role.";

#[derive(Clone)]
pub struct AppState {
    pub resolver: AccountResolver,
    pub directory: Arc<UserDirectory>,
    pub scheduler: Arc<ReconciliationScheduler>,
    pub scheduler_handle: SchedulerHandle,
    pub gateway: Arc<dyn GuildGateway>,
    pub command_prefix: String,
    pub relay_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Register(Option<String>),
    CheckMe,
    Ping,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/commands", post(chat_command_handler))
        .route("/v1/reconcile", post(trigger_reconcile_handler))
        .route("/v1/reconcile/last", get(last_reconcile_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Parses `<prefix><name> [argument]`. Command names are case-insensitive.
pub fn parse_chat_command(prefix: &str, content: &str) -> Option<ChatCommand> {
    let body = content.trim().strip_prefix(prefix)?;
    let (name, argument) = match body.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (body, ""),
    };
    let argument = (!argument.is_empty()).then(|| argument.to_string());

    match name.to_ascii_lowercase().as_str() {
        "register" | "setlol" => Some(ChatCommand::Register(argument)),
        "check_me" | "checkme" => Some(ChatCommand::CheckMe),
        "ping" => Some(ChatCommand::Ping),
        _ => None,
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"ok": true, "service": "badge-service"}))
}

async fn chat_command_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ChatMessageRequest>,
) -> Result<Json<ChatMessageResponse>, ApiError> {
    authorize(&state, &headers)?;
    if !is_snowflake(&request.author_id) || !is_snowflake(&request.channel_id) {
        return Err(ApiError::bad_request(
            "author_id and channel_id must be discord snowflakes",
        ));
    }

    let ignored = Json(ChatMessageResponse {
        handled: false,
        reply: None,
        delivered: false,
    });
    if request.author_is_bot {
        return Ok(ignored);
    }
    let Some(command) = parse_chat_command(&state.command_prefix, &request.content) else {
        return Ok(ignored);
    };

    info!(author_id = %request.author_id, command = ?command, "chat command received");
    let reply = execute_command(&state, &request.author_id, command).await;
    let delivered = match state
        .gateway
        .send_message(&request.channel_id, &reply)
        .await
    {
        Ok(()) => true,
        Err(error) => {
            warn!(channel_id = %request.channel_id, error = %error, "failed to deliver reply");
            false
        }
    };

    Ok(Json(ChatMessageResponse {
        handled: true,
        reply: Some(reply),
        delivered,
    }))
}

async fn execute_command(state: &AppState, author_id: &str, command: ChatCommand) -> String {
    match command {
        ChatCommand::Ping => REPLY_PONG.to_string(),
        ChatCommand::Register(None) => REPLY_REGISTER_USAGE.to_string(),
        ChatCommand::Register(Some(identifier)) => register(state, author_id, &identifier).await,
        ChatCommand::CheckMe => check_me(state, author_id).await,
    }
}

async fn register(state: &AppState, author_id: &str, identifier: &str) -> String {
    let identifier = identifier.trim();
    let account_id = match state.resolver.resolve(identifier).await {
        Ok(account_id) => account_id,
        Err(ResolutionError::MalformedIdentifier(_)) => {
            return REPLY_MALFORMED_IDENTIFIER.to_string();
        }
        Err(ResolutionError::NotFound { .. }) => return REPLY_NOT_FOUND.to_string(),
    };

    match state.directory.upsert(author_id, identifier, &account_id) {
        Ok(record) => {
            info!(
                chat_user_id = %record.chat_user_id,
                display_identifier = %record.display_identifier,
                account_id = %record.account_id,
                "account linked"
            );
            format!("<@{author_id}>, your League name is set to **{identifier}**! ✅")
        }
        Err(error) => {
            warn!(chat_user_id = %author_id, error = %error, "failed to store account link");
            REPLY_SAVE_FAILED.to_string()
        }
    }
}

async fn check_me(state: &AppState, author_id: &str) -> String {
    match state.scheduler.reconcile_member(author_id).await {
        Ok(applied) => match applied.role_name {
            Some(role_name) if applied.granted => {
                format!("✅ Match history searched manually. Your role is now **{role_name}**.")
            }
            _ => format!(
                "⚠️ Match history checked, but the `{}` role could not be assigned on this server.",
                applied.target.as_str()
            ),
        },
        Err(ReconcileError::NotRegistered) => REPLY_NOT_REGISTERED.to_string(),
        Err(ReconcileError::MemberAbsent) => REPLY_NOT_A_MEMBER.to_string(),
        Err(ReconcileError::History(HistoryError::InsufficientHistory)) => {
            REPLY_NO_MATCH_HISTORY.to_string()
        }
        Err(ReconcileError::History(HistoryError::Fetch(cause))) => {
            warn!(chat_user_id = %author_id, cause = %cause, "on-demand history fetch failed");
            REPLY_FETCH_FAILED.to_string()
        }
        Err(error) => {
            warn!(chat_user_id = %author_id, error = %error, "on-demand reconciliation failed");
            REPLY_ROLE_UPDATE_FAILED.to_string()
        }
    }
}

async fn trigger_reconcile_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ReconcileTriggerResponse>, ApiError> {
    authorize(&state, &headers)?;
    if !state.scheduler_handle.trigger() {
        return Err(ApiError::unavailable("reconciliation scheduler is not running"));
    }
    info!("immediate reconciliation pass requested");
    Ok(Json(ReconcileTriggerResponse {
        accepted: true,
        requested_at: Utc::now(),
    }))
}

async fn last_reconcile_handler(State(state): State<AppState>) -> Json<Option<CycleReport>> {
    Json(state.scheduler_handle.last_report())
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = state.relay_token.as_deref() else {
        return Ok(());
    };
    let provided = headers
        .get(RELAY_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok());
    if provided == Some(expected) {
        Ok(())
    } else {
        Err(ApiError::unauthorized("missing or invalid relay token"))
    }
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: message.into(),
        }
    }

    fn unavailable(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        warn!(status = %self.status, message = %self.message, "badge-service request failed");
        (
            self.status,
            Json(serde_json::json!({"error": self.message})),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::RoleNames,
        discord::tests::FakeGuild,
        riot::{MatchHistoryFetcher, tests::FakeRiotApi},
        roles::RoleReconciler,
    };
    use axum::http::HeaderValue;
    use badge_common::Outcome;
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct Harness {
        state: AppState,
        api: Arc<FakeRiotApi>,
        guild: Arc<FakeGuild>,
        triggers: mpsc::Receiver<()>,
    }

    fn harness(api: FakeRiotApi, guild: FakeGuild, relay_token: Option<&str>) -> Harness {
        let api = Arc::new(api);
        let guild = Arc::new(
            guild
                .with_role("r-iron", "🔻 Iron IV")
                .with_role("r-chall", "⚡ Challenger")
                .with_role("r-clutch", "🔥 Clutch Master"),
        );
        let directory = Arc::new(UserDirectory::in_memory().unwrap());
        let scheduler = Arc::new(ReconciliationScheduler::new(
            directory.clone(),
            guild.clone(),
            MatchHistoryFetcher::new(api.clone()),
            RoleReconciler::new(guild.clone(), RoleNames::default()),
            Duration::from_secs(3600),
        ));
        let (scheduler_handle, triggers) = SchedulerHandle::detached();
        Harness {
            state: AppState {
                resolver: AccountResolver::new(api.clone()),
                directory,
                scheduler,
                scheduler_handle,
                gateway: guild.clone(),
                command_prefix: "!".to_string(),
                relay_token: relay_token.map(str::to_string),
            },
            api,
            guild,
            triggers,
        }
    }

    fn message(author_id: &str, content: &str) -> ChatMessageRequest {
        ChatMessageRequest {
            channel_id: "1001".to_string(),
            author_id: author_id.to_string(),
            author_is_bot: false,
            content: content.to_string(),
        }
    }

    async fn send(state: &AppState, request: ChatMessageRequest) -> ChatMessageResponse {
        chat_command_handler(State(state.clone()), HeaderMap::new(), Json(request))
            .await
            .unwrap()
            .0
    }

    #[test]
    fn parse_chat_command_accepts_names_and_aliases() {
        assert_eq!(
            parse_chat_command("!", "!setlol Hide on bush#KR1"),
            Some(ChatCommand::Register(Some("Hide on bush#KR1".to_string())))
        );
        assert_eq!(
            parse_chat_command("!", "!register"),
            Some(ChatCommand::Register(None))
        );
        assert_eq!(parse_chat_command("!", " !CheckMe "), Some(ChatCommand::CheckMe));
        assert_eq!(parse_chat_command("!", "!check_me"), Some(ChatCommand::CheckMe));
        assert_eq!(parse_chat_command("!", "!ping"), Some(ChatCommand::Ping));
        assert_eq!(parse_chat_command("!", "ping"), None);
        assert_eq!(parse_chat_command("!", "!dance"), None);
    }

    #[tokio::test]
    async fn register_then_check_me_assigns_clutch_master() {
        let h = harness(
            FakeRiotApi::default()
                .with_account("Faker", "KR1", "abc123")
                .with_history("abc123", &[Outcome::Win, Outcome::Win]),
            FakeGuild::default().with_member("42", &[]),
            None,
        );

        let response = send(&h.state, message("42", "!setlol Faker#KR1")).await;
        assert!(response.handled);
        assert!(response.delivered);
        assert_eq!(
            response.reply.as_deref(),
            Some("<@42>, your League name is set to **Faker#KR1**! ✅")
        );
        let record = h.state.directory.get("42").unwrap().unwrap();
        assert_eq!(record.account_id, "abc123");

        let response = send(&h.state, message("42", "!checkme")).await;
        assert_eq!(
            response.reply.as_deref(),
            Some("✅ Match history searched manually. Your role is now **🔥 Clutch Master**.")
        );
        assert!(h.guild.role_ids_of("42").contains("r-clutch"));
        assert_eq!(h.guild.sent.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn malformed_register_never_calls_upstream() {
        let h = harness(FakeRiotApi::default(), FakeGuild::default(), None);

        let response = send(&h.state, message("42", "!setlol Faker")).await;
        assert_eq!(response.reply.as_deref(), Some(REPLY_MALFORMED_IDENTIFIER));
        assert_eq!(h.api.call_count(), 0);
        assert!(h.state.directory.get("42").unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_account_reports_generic_failure() {
        let h = harness(FakeRiotApi::default(), FakeGuild::default(), None);

        let response = send(&h.state, message("42", "!setlol Nobody#EUW")).await;
        assert_eq!(response.reply.as_deref(), Some(REPLY_NOT_FOUND));
        assert!(h.state.directory.get("42").unwrap().is_none());
    }

    #[tokio::test]
    async fn check_me_replies_for_unregistered_and_short_history() {
        let h = harness(
            FakeRiotApi::default().with_history("abc123", &[Outcome::Win]),
            FakeGuild::default().with_member("42", &[]),
            None,
        );

        let response = send(&h.state, message("42", "!check_me")).await;
        assert_eq!(response.reply.as_deref(), Some(REPLY_NOT_REGISTERED));

        h.state.directory.upsert("42", "Faker#KR1", "abc123").unwrap();
        let response = send(&h.state, message("42", "!check_me")).await;
        assert_eq!(response.reply.as_deref(), Some("⚠️ No match history found."));
    }

    #[tokio::test]
    async fn bot_authors_and_plain_chatter_are_ignored() {
        let h = harness(FakeRiotApi::default(), FakeGuild::default(), None);

        let mut from_bot = message("900", "!ping");
        from_bot.author_is_bot = true;
        let response = send(&h.state, from_bot).await;
        assert!(!response.handled);

        let response = send(&h.state, message("42", "good game everyone")).await;
        assert!(!response.handled);
        assert!(h.guild.sent.lock().unwrap().is_empty());

        let response = send(&h.state, message("42", "!ping")).await;
        assert_eq!(response.reply.as_deref(), Some(REPLY_PONG));
    }

    #[tokio::test]
    async fn relay_token_is_enforced_when_configured() {
        let h = harness(FakeRiotApi::default(), FakeGuild::default(), Some("s3cret"));

        let error = chat_command_handler(
            State(h.state.clone()),
            HeaderMap::new(),
            Json(message("42", "!ping")),
        )
        .await
        .unwrap_err();
        assert_eq!(error.status, StatusCode::UNAUTHORIZED);

        let mut headers = HeaderMap::new();
        headers.insert(RELAY_TOKEN_HEADER, HeaderValue::from_static("s3cret"));
        let response =
            chat_command_handler(State(h.state.clone()), headers, Json(message("42", "!ping")))
                .await
                .unwrap()
                .0;
        assert!(response.handled);
    }

    #[tokio::test]
    async fn trigger_reconcile_queues_an_immediate_pass() {
        let mut h = harness(FakeRiotApi::default(), FakeGuild::default(), None);

        let response = trigger_reconcile_handler(State(h.state.clone()), HeaderMap::new())
            .await
            .unwrap()
            .0;
        assert!(response.accepted);
        assert!(h.triggers.try_recv().is_ok());
    }

    #[tokio::test]
    async fn trigger_reconcile_fails_once_scheduler_is_gone() {
        let mut h = harness(FakeRiotApi::default(), FakeGuild::default(), None);
        h.triggers.close();

        let error = trigger_reconcile_handler(State(h.state.clone()), HeaderMap::new())
            .await
            .unwrap_err();
        assert_eq!(error.status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn non_snowflake_ids_are_rejected_before_any_command_runs() {
        let h = harness(
            FakeRiotApi::default().with_account("Faker", "KR1", "abc123"),
            FakeGuild::default(),
            None,
        );

        let error = chat_command_handler(
            State(h.state.clone()),
            HeaderMap::new(),
            Json(message("42/roles/999", "!setlol Faker#KR1")),
        )
        .await
        .unwrap_err();
        assert_eq!(error.status, StatusCode::BAD_REQUEST);

        let mut request = message("42", "!setlol Faker#KR1");
        request.channel_id = "1001/messages/7".to_string();
        let error = chat_command_handler(State(h.state.clone()), HeaderMap::new(), Json(request))
            .await
            .unwrap_err();
        assert_eq!(error.status, StatusCode::BAD_REQUEST);

        assert_eq!(h.api.call_count(), 0);
        assert!(h.state.directory.all().unwrap().is_empty());
        assert!(h.guild.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn check_me_reports_fetch_failure_separately_from_missing_history() {
        let h = harness(
            FakeRiotApi::default(),
            FakeGuild::default().with_member("42", &["r-chall"]),
            None,
        );
        h.state.directory.upsert("42", "Faker#KR1", "abc123").unwrap();

        let response = send(&h.state, message("42", "!check_me")).await;
        assert_eq!(response.reply.as_deref(), Some(REPLY_FETCH_FAILED));
        assert_ne!(REPLY_FETCH_FAILED, REPLY_NO_MATCH_HISTORY);
        assert!(h.guild.role_ids_of("42").contains("r-chall"));
    }

    #[tokio::test]
    async fn check_me_for_departed_member_keeps_the_link() {
        let h = harness(
            FakeRiotApi::default().with_history("abc123", &[Outcome::Win, Outcome::Win]),
            FakeGuild::default(),
            None,
        );
        h.state.directory.upsert("42", "Faker#KR1", "abc123").unwrap();

        let response = send(&h.state, message("42", "!check_me")).await;
        assert_eq!(response.reply.as_deref(), Some(REPLY_NOT_A_MEMBER));
        assert!(h.state.directory.get("42").unwrap().is_some());
        assert_eq!(h.api.call_count(), 0);
    }

    #[tokio::test]
    async fn health_reports_service_name() {
        let payload = health().await.0;
        assert_eq!(payload["ok"], true);
        assert_eq!(payload["service"], "badge-service");
    }
}
