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

use std::sync::Arc;

use badge_common::{RoleAssignment, TRACKED_ROLES};
use tracing::{debug, info, warn};

use crate::{
    config::RoleNames,
    discord::{GuildGateway, GuildMember, GuildRole},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedRole {
    pub target: RoleAssignment,
    /// Guild role name for `target`, if the guild defines it.
    pub role_name: Option<String>,
    /// False when the target's guild role is missing or the add failed.
    pub granted: bool,
}

#[derive(Clone)]
pub struct RoleReconciler {
    gateway: Arc<dyn GuildGateway>,
    role_names: RoleNames,
}

impl RoleReconciler {
    pub fn new(gateway: Arc<dyn GuildGateway>, role_names: RoleNames) -> Self {
        Self {
            gateway,
            role_names,
        }
    }

    /// Strips every tracked badge from `member`, then grants `target`.
    ///
    /// Removal is unconditional and includes the target badge itself. Badges
    /// missing from the guild are skipped; per-role mutation failures are
    /// logged, never returned.
    pub async fn apply(
        &self,
        member: &GuildMember,
        target: RoleAssignment,
    ) -> anyhow::Result<AppliedRole> {
        debug!(
            user_id = %member.user_id,
            held_role_ids = ?member.role_ids,
            target = target.as_str(),
            "reconciling badge"
        );
        let guild_roles = self.gateway.roles().await?;

        for tracked in TRACKED_ROLES {
            let Some(role) = self.guild_role(&guild_roles, tracked) else {
                debug!(badge = tracked.as_str(), "badge role missing on guild; skipping removal");
                continue;
            };
            if let Err(error) = self
                .gateway
                .remove_member_role(&member.user_id, &role.id)
                .await
            {
                warn!(
                    user_id = %member.user_id,
                    role_id = %role.id,
                    error = %error,
                    "failed to remove badge role"
                );
            }
        }

        let Some(role) = self.guild_role(&guild_roles, target) else {
            if target != RoleAssignment::None {
                warn!(badge = target.as_str(), "badge role missing on guild; nothing granted");
            }
            return Ok(AppliedRole {
                target,
                role_name: None,
                granted: false,
            });
        };

        let granted = match self
            .gateway
            .add_member_role(&member.user_id, &role.id)
            .await
        {
            Ok(()) => true,
            Err(error) => {
                warn!(
                    user_id = %member.user_id,
                    role_id = %role.id,
                    error = %error,
                    "failed to grant badge role"
                );
                false
            }
        };
        if granted {
            info!(
                user_id = %member.user_id,
                badge = target.as_str(),
                role_name = %role.name,
                "badge role applied"
            );
        }

        Ok(AppliedRole {
            target,
            role_name: Some(role.name.clone()),
            granted,
        })
    }

    fn guild_role<'a>(
        &self,
        guild_roles: &'a [GuildRole],
        badge: RoleAssignment,
    ) -> Option<&'a GuildRole> {
        let name = self.role_names.name_for(badge)?;
        guild_roles.iter().find(|role| role.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discord::tests::FakeGuild;
    use std::collections::BTreeSet;

    fn guild() -> FakeGuild {
        FakeGuild::default()
            .with_role("r-iron", "🔻 Iron IV")
            .with_role("r-chall", "⚡ Challenger")
            .with_role("r-clutch", "🔥 Clutch Master")
            .with_role("r-mod", "Moderator")
    }

    fn member(user_id: &str) -> GuildMember {
        GuildMember {
            user_id: user_id.to_string(),
            role_ids: Vec::new(),
        }
    }

    fn ids(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[tokio::test]
    async fn apply_replaces_other_badges_and_keeps_unrelated_roles() {
        let guild = Arc::new(guild().with_member("42", &["r-iron", "r-chall", "r-mod"]));
        let reconciler = RoleReconciler::new(guild.clone(), RoleNames::default());

        let applied = reconciler
            .apply(&member("42"), RoleAssignment::ClutchMaster)
            .await
            .unwrap();

        assert!(applied.granted);
        assert_eq!(applied.role_name.as_deref(), Some("🔥 Clutch Master"));
        assert_eq!(guild.role_ids_of("42"), ids(&["r-clutch", "r-mod"]));
    }

    #[tokio::test]
    async fn apply_removes_before_adding_even_when_already_held() {
        let guild = Arc::new(guild().with_member("42", &["r-chall"]));
        let reconciler = RoleReconciler::new(guild.clone(), RoleNames::default());

        reconciler
            .apply(&member("42"), RoleAssignment::Challenger)
            .await
            .unwrap();

        let mutations = guild.mutations.lock().unwrap().clone();
        assert_eq!(
            mutations,
            vec![
                "remove:42:r-iron".to_string(),
                "remove:42:r-chall".to_string(),
                "remove:42:r-clutch".to_string(),
                "add:42:r-chall".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn apply_is_idempotent() {
        let guild = Arc::new(guild().with_member("42", &["r-iron", "r-mod"]));
        let reconciler = RoleReconciler::new(guild.clone(), RoleNames::default());

        reconciler
            .apply(&member("42"), RoleAssignment::Challenger)
            .await
            .unwrap();
        let after_once = guild.role_ids_of("42");
        reconciler
            .apply(&member("42"), RoleAssignment::Challenger)
            .await
            .unwrap();

        assert_eq!(guild.role_ids_of("42"), after_once);
        assert_eq!(after_once, ids(&["r-chall", "r-mod"]));
    }

    #[tokio::test]
    async fn missing_guild_roles_are_skipped_silently() {
        let guild = Arc::new(
            FakeGuild::default()
                .with_role("r-iron", "🔻 Iron IV")
                .with_member("42", &["r-iron"]),
        );
        let reconciler = RoleReconciler::new(guild.clone(), RoleNames::default());

        let applied = reconciler
            .apply(&member("42"), RoleAssignment::ClutchMaster)
            .await
            .unwrap();

        assert!(!applied.granted);
        assert_eq!(applied.role_name, None);
        assert!(guild.role_ids_of("42").is_empty());
        assert_eq!(
            guild.mutations.lock().unwrap().clone(),
            vec!["remove:42:r-iron".to_string()]
        );
    }

    #[tokio::test]
    async fn role_mutation_failures_are_swallowed_per_role() {
        let mut fake = guild().with_member("42", &["r-iron", "r-chall"]);
        fake.fail_role_ids = vec!["r-iron".to_string()];
        let guild = Arc::new(fake);
        let reconciler = RoleReconciler::new(guild.clone(), RoleNames::default());

        let applied = reconciler
            .apply(&member("42"), RoleAssignment::Challenger)
            .await
            .unwrap();

        assert!(applied.granted);
        assert_eq!(guild.role_ids_of("42"), ids(&["r-chall", "r-iron"]));
    }

    #[tokio::test]
    async fn none_target_clears_every_badge() {
        let guild = Arc::new(guild().with_member("42", &["r-clutch", "r-mod"]));
        let reconciler = RoleReconciler::new(guild.clone(), RoleNames::default());

        let applied = reconciler
            .apply(&member("42"), RoleAssignment::None)
            .await
            .unwrap();

        assert!(!applied.granted);
        assert_eq!(guild.role_ids_of("42"), ids(&["r-mod"]));
    }
}
