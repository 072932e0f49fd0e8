// libs/shared/database/src/lock.rs
//
// Short-lived write locks stored as rows in `scheduling_locks`.
// A row with a unique `lock_key` is the lock; inserting it acquires,
// deleting it releases. Rows past `expires_at` are treated as abandoned.
// Each acquisition writes its own owner token, and only the row carrying
// that token is ever released by the holder.

use std::future::Future;

use anyhow::Result;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::supabase::{SupabaseClient, SupabaseError};

#[derive(Debug, Error)]
pub enum LockError {
    #[error("Resource is busy, please try again")]
    Busy,
}

impl LockError {
    pub fn is_busy(err: &anyhow::Error) -> bool {
        matches!(err.downcast_ref::<LockError>(), Some(LockError::Busy))
    }
}

#[derive(Clone)]
pub struct SchedulingLock {
    supabase: SupabaseClient,
    lock_timeout_seconds: i64,
    max_attempts: u32,
}

impl SchedulingLock {
    pub fn new(supabase: SupabaseClient) -> Self {
        Self {
            supabase,
            lock_timeout_seconds: 30,
            max_attempts: 3,
        }
    }

    /// Lock key guarding all slot and booking writes of one doctor on one day.
    pub fn day_key(doctor_id: &str, date: &chrono::NaiveDate) -> String {
        format!("slots:{}:{}", doctor_id, date.format("%Y-%m-%d"))
    }

    /// Owner token for one acquisition by `holder`.
    pub fn owner_token(holder: &str) -> String {
        format!("{}:{}", holder, Uuid::new_v4())
    }

    /// Run `operation` while holding `lock_key`. The lock is released whether
    /// the operation succeeds or fails. Lock rows are written with the
    /// caller's `auth_token`.
    pub async fn with_lock<F, Fut, T>(
        &self,
        lock_key: &str,
        holder: &str,
        auth_token: &str,
        operation: F,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let owner = Self::owner_token(holder);

        let mut acquired = false;
        for attempt in 1..=self.max_attempts {
            if self.acquire(lock_key, &owner, auth_token).await? {
                acquired = true;
                break;
            }
            if attempt < self.max_attempts {
                debug!("Lock {} busy, retrying attempt {}/{}", lock_key, attempt, self.max_attempts);
                tokio::time::sleep(std::time::Duration::from_millis(100 * attempt as u64)).await;
            }
        }

        if !acquired {
            warn!("Could not acquire lock {} after {} attempts", lock_key, self.max_attempts);
            return Err(LockError::Busy.into());
        }

        let outcome = operation().await;

        if let Err(e) = self.release(lock_key, &owner, auth_token).await {
            warn!("Failed to release lock {}: {}", lock_key, e);
        }

        outcome
    }

    pub async fn acquire(&self, lock_key: &str, owner: &str, auth_token: &str) -> Result<bool> {
        match self.try_insert(lock_key, owner, auth_token).await {
            Ok(()) => {
                debug!("Lock acquired: {}", lock_key);
                Ok(true)
            }
            Err(e) if SupabaseError::is_conflict(&e) => {
                if self.cleanup_if_expired(lock_key, auth_token).await? {
                    match self.try_insert(lock_key, owner, auth_token).await {
                        Ok(()) => {
                            debug!("Lock acquired after cleanup: {}", lock_key);
                            Ok(true)
                        }
                        Err(e) if SupabaseError::is_conflict(&e) => Ok(false),
                        Err(e) => Err(e),
                    }
                } else {
                    Ok(false)
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Deletes the lock row only while it still carries `owner`, so a holder
    /// that outlived its expiry cannot drop the next holder's lock.
    pub async fn release(&self, lock_key: &str, owner: &str, auth_token: &str) -> Result<()> {
        let path = format!(
            "/rest/v1/scheduling_locks?lock_key=eq.{}&owner=eq.{}",
            urlencoding::encode(lock_key),
            urlencoding::encode(owner)
        );
        self.supabase.execute(Method::DELETE, &path, Some(auth_token), None).await?;
        debug!("Lock released: {}", lock_key);
        Ok(())
    }

    async fn try_insert(&self, lock_key: &str, owner: &str, auth_token: &str) -> Result<()> {
        let now = Utc::now();
        let lock_data = json!({
            "lock_key": lock_key,
            "owner": owner,
            "acquired_at": now.to_rfc3339(),
            "expires_at": (now + Duration::seconds(self.lock_timeout_seconds)).to_rfc3339(),
        });

        self.supabase
            .execute(Method::POST, "/rest/v1/scheduling_locks", Some(auth_token), Some(lock_data))
            .await
    }

    /// Returns true when the lock row is gone or was stale and has been removed.
    async fn cleanup_if_expired(&self, lock_key: &str, auth_token: &str) -> Result<bool> {
        let path = format!(
            "/rest/v1/scheduling_locks?lock_key=eq.{}&select=expires_at",
            urlencoding::encode(lock_key)
        );
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, Some(auth_token), None).await?;

        let expired = rows
            .first()
            .and_then(|row| row.get("expires_at"))
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|expires_at| expires_at.with_timezone(&Utc) < Utc::now())
            // The holder released it between our insert and this read.
            .unwrap_or(rows.is_empty());

        if expired {
            if !rows.is_empty() {
                warn!("Removing expired lock {}", lock_key);
                self.delete_expired(lock_key, auth_token).await?;
            }
            return Ok(true);
        }

        Ok(false)
    }

    /// Deletes the row only while it is still expired. A fresh lock taken by
    /// a concurrent caller after our read is left alone, and our retried
    /// insert then conflicts with it.
    async fn delete_expired(&self, lock_key: &str, auth_token: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let path = format!(
            "/rest/v1/scheduling_locks?lock_key=eq.{}&expires_at=lt.{}",
            urlencoding::encode(lock_key),
            urlencoding::encode(&now)
        );
        self.supabase.execute(Method::DELETE, &path, Some(auth_token), None).await
    }
}
