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

//! SQLite-backed chat user to Riot account directory.
//!
//! Only this module talks to the database. The connection lock is never held
//! across an `.await`.

use std::sync::{Mutex, MutexGuard};

use badge_common::UserRecord;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("directory connection lock poisoned")]
    Poisoned,
}

pub type DirectoryResult<T> = Result<T, DirectoryError>;

pub struct UserDirectory {
    conn: Mutex<Connection>,
}

impl UserDirectory {
    /// Open (or create) the directory database at `path` and migrate it.
    pub fn open(path: &str) -> DirectoryResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let directory = Self {
            conn: Mutex::new(conn),
        };
        directory.migrate()?;
        Ok(directory)
    }

    #[cfg(test)]
    pub fn in_memory() -> DirectoryResult<Self> {
        let directory = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        directory.migrate()?;
        Ok(directory)
    }

    fn migrate(&self) -> DirectoryResult<()> {
        self.lock()?
            .execute_batch(include_str!("../migrations/001_users.sql"))?;
        Ok(())
    }

    fn lock(&self) -> DirectoryResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| DirectoryError::Poisoned)
    }

    /// Insert or fully replace the link for `chat_user_id`.
    pub fn upsert(
        &self,
        chat_user_id: &str,
        display_identifier: &str,
        account_id: &str,
    ) -> DirectoryResult<UserRecord> {
        let record = UserRecord {
            chat_user_id: chat_user_id.to_string(),
            display_identifier: display_identifier.to_string(),
            account_id: account_id.to_string(),
            updated_at: Utc::now(),
        };
        self.lock()?.execute(
            "INSERT INTO users (chat_user_id, display_identifier, account_id, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(chat_user_id) DO UPDATE SET
                display_identifier = excluded.display_identifier,
                account_id = excluded.account_id,
                updated_at = excluded.updated_at",
            params![
                record.chat_user_id,
                record.display_identifier,
                record.account_id,
                record.updated_at,
            ],
        )?;
        Ok(record)
    }

    pub fn get(&self, chat_user_id: &str) -> DirectoryResult<Option<UserRecord>> {
        let conn = self.lock()?;
        let record = conn
            .query_row(
                "SELECT chat_user_id, display_identifier, account_id, updated_at
                 FROM users WHERE chat_user_id = ?1",
                params![chat_user_id],
                |row| {
                    Ok(UserRecord {
                        chat_user_id: row.get(0)?,
                        display_identifier: row.get(1)?,
                        account_id: row.get(2)?,
                        updated_at: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    /// Every record in first-registration order.
    pub fn all(&self) -> DirectoryResult<Vec<UserRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT chat_user_id, display_identifier, account_id, updated_at
             FROM users ORDER BY rowid ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(UserRecord {
                chat_user_id: row.get(0)?,
                display_identifier: row.get(1)?,
                account_id: row.get(2)?,
                updated_at: row.get(3)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn close(self) -> DirectoryResult<()> {
        let conn = self
            .conn
            .into_inner()
            .map_err(|_| DirectoryError::Poisoned)?;
        conn.close().map_err(|(_, error)| error.into())
    }
}
