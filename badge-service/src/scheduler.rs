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

use std::{sync::Arc, time::Duration};

use badge_common::{UserRecord, compute_role};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::{
    sync::{mpsc, watch},
    task::AbortHandle,
    time::{MissedTickBehavior, interval},
};
use tracing::{debug, info, warn};

use crate::{
    directory::{DirectoryError, UserDirectory},
    discord::GuildGateway,
    riot::{HistoryError, MatchHistoryFetcher},
    roles::{AppliedRole, RoleReconciler},
};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("user has not linked an account")]
    NotRegistered,
    #[error("user is no longer a guild member")]
    MemberAbsent,
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error("guild gateway error: {0}")]
    Gateway(String),
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub users: usize,
    pub reconciled: usize,
    pub absent: usize,
    pub insufficient_history: usize,
    pub failed: usize,
}

pub struct ReconciliationScheduler {
    directory: Arc<UserDirectory>,
    gateway: Arc<dyn GuildGateway>,
    fetcher: MatchHistoryFetcher,
    reconciler: RoleReconciler,
    interval: Duration,
}

/// Lets command handlers ask for an immediate full pass and observe results.
#[derive(Clone)]
pub struct SchedulerHandle {
    trigger_tx: mpsc::Sender<()>,
    reports: watch::Receiver<Option<CycleReport>>,
    task: Arc<AbortHandle>,
}

impl SchedulerHandle {
    /// Returns false once the scheduler task is gone. A pass that is already
    /// queued absorbs further triggers.
    pub fn trigger(&self) -> bool {
        match self.trigger_tx.try_send(()) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(())) => true,
            Err(mpsc::error::TrySendError::Closed(())) => false,
        }
    }

    pub fn last_report(&self) -> Option<CycleReport> {
        self.reports.borrow().clone()
    }

    /// Process shutdown only; a pass in flight is dropped at its next await.
    pub fn stop(&self) {
        self.task.abort();
    }
}

#[cfg(test)]
impl SchedulerHandle {
    /// Handle backed by an idle task. Triggers land in the returned receiver.
    pub(crate) fn detached() -> (Self, mpsc::Receiver<()>) {
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let (_report_tx, reports) = watch::channel(None);
        let task = tokio::spawn(std::future::pending::<()>());
        let handle = Self {
            trigger_tx,
            reports,
            task: Arc::new(task.abort_handle()),
        };
        (handle, trigger_rx)
    }
}

impl ReconciliationScheduler {
    pub fn new(
        directory: Arc<UserDirectory>,
        gateway: Arc<dyn GuildGateway>,
        fetcher: MatchHistoryFetcher,
        reconciler: RoleReconciler,
        interval: Duration,
    ) -> Self {
        Self {
            directory,
            gateway,
            fetcher,
            reconciler,
            interval,
        }
    }

    /// On-demand reconciliation for one chat user. Same steps as a periodic
    /// pass, but every skip reason is returned to the caller.
    pub async fn reconcile_member(
        &self,
        chat_user_id: &str,
    ) -> Result<AppliedRole, ReconcileError> {
        let record = self
            .directory
            .get(chat_user_id)?
            .ok_or(ReconcileError::NotRegistered)?;
        self.reconcile_record(&record).await
    }

    async fn reconcile_record(&self, record: &UserRecord) -> Result<AppliedRole, ReconcileError> {
        let member = self
            .gateway
            .member(&record.chat_user_id)
            .await
            .map_err(|error| ReconcileError::Gateway(format!("{error:#}")))?
            .ok_or(ReconcileError::MemberAbsent)?;
        let outcome = self.fetcher.fetch_last_two(&record.account_id).await?;
        let target = compute_role(outcome);
        self.reconciler
            .apply(&member, target)
            .await
            .map_err(|error| ReconcileError::Gateway(format!("{error:#}")))
    }

    /// One pass over every registered user. Failures are counted per user and
    /// never stop the pass.
    pub async fn run_cycle(&self) -> CycleReport {
        let started_at = Utc::now();
        let mut report = CycleReport {
            started_at,
            finished_at: started_at,
            users: 0,
            reconciled: 0,
            absent: 0,
            insufficient_history: 0,
            failed: 0,
        };

        let records = match self.directory.all() {
            Ok(records) => records,
            Err(error) => {
                warn!(error = %error, "failed to read user directory; skipping pass");
                report.finished_at = Utc::now();
                return report;
            }
        };
        report.users = records.len();

        for record in &records {
            match self.reconcile_record(record).await {
                Ok(applied) => {
                    report.reconciled += 1;
                    debug!(
                        chat_user_id = %record.chat_user_id,
                        badge = applied.target.as_str(),
                        granted = applied.granted,
                        "user reconciled"
                    );
                }
                Err(ReconcileError::MemberAbsent) => {
                    report.absent += 1;
                    debug!(chat_user_id = %record.chat_user_id, "member left guild; skipping");
                }
                Err(ReconcileError::History(HistoryError::InsufficientHistory)) => {
                    report.insufficient_history += 1;
                    debug!(chat_user_id = %record.chat_user_id, "not enough matches yet; skipping");
                }
                Err(error) => {
                    report.failed += 1;
                    warn!(
                        chat_user_id = %record.chat_user_id,
                        error = %error,
                        "reconciliation failed for user; skipping until next pass"
                    );
                }
            }
        }

        report.finished_at = Utc::now();
        report
    }

    /// Starts the periodic loop on the current runtime. The first pass runs
    /// immediately.
    pub fn spawn(self: Arc<Self>) -> SchedulerHandle {
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let (report_tx, reports) = watch::channel(None);
        let task = tokio::spawn(async move {
            self.run(trigger_rx, report_tx).await;
        });
        SchedulerHandle {
            trigger_tx,
            reports,
            task: Arc::new(task.abort_handle()),
        }
    }

    async fn run(
        &self,
        mut triggers: mpsc::Receiver<()>,
        report_tx: watch::Sender<Option<CycleReport>>,
    ) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut triggers_open = true;
        info!(
            interval_seconds = self.interval.as_secs(),
            "reconciliation scheduler started"
        );

        loop {
            let source = tokio::select! {
                _ = ticker.tick() => "interval",
                trigger = triggers.recv(), if triggers_open => match trigger {
                    Some(()) => {
                        ticker.reset();
                        "trigger"
                    }
                    None => {
                        triggers_open = false;
                        continue;
                    }
                },
            };

            let report = self.run_cycle().await;
            info!(
                source,
                users = report.users,
                reconciled = report.reconciled,
                absent = report.absent,
                insufficient_history = report.insufficient_history,
                failed = report.failed,
                "reconciliation pass finished"
            );
            report_tx.send_replace(Some(report));
        }
    }
}
