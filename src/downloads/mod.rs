//! Per-user daily download quota.
//!
//! A download is recorded before the proxy is invoked, so a failed upstream
//! fetch still counts against the caller's allowance.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

/// One granted download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadRecord {
    pub content_id: String,
    pub downloaded_at: DateTime<Utc>,
}

/// Outcome of a quota check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaDecision {
    /// Recorded; `used` includes the new download.
    Granted { used: u32 },
    /// Nothing recorded.
    Exceeded { limit: u32 },
}

/// Storage for download history.
#[async_trait]
pub trait DownloadQuota: Send + Sync {
    /// Count `user`'s downloads since the start of the current UTC day and
    /// record a new one if the limit allows it.
    async fn try_record(&self, user: &str, content_id: &str) -> Result<QuotaDecision>;

    /// All downloads for `user`, newest first.
    async fn list(&self, user: &str) -> Result<Vec<DownloadRecord>>;
}

/// In-memory ledger keyed by user id. History is lost on restart.
///
/// Every granted download is kept for the life of the process because it
/// backs `/downloads/mine`. Each user's history is sorted by time, so a quota
/// check is a binary search rather than a scan of the whole history.
#[derive(Debug)]
pub struct MemoryDownloadLedger {
    max_per_day: u32,
    records: DashMap<String, Vec<DownloadRecord>>,
}

impl MemoryDownloadLedger {
    pub fn new(max_per_day: u32) -> Self {
        Self {
            max_per_day,
            records: DashMap::new(),
        }
    }

    /// Quota check against an explicit clock.
    pub fn try_record_at(&self, user: &str, content_id: &str, now: DateTime<Utc>) -> QuotaDecision {
        let day_start = start_of_day(now);

        // The entry guard holds the shard lock, so count-then-push is atomic
        // per user.
        let mut history = self.records.entry(user.to_string()).or_default();
        let today = history.partition_point(|r| r.downloaded_at < day_start);
        let used = (history.len() - today) as u32;

        if used >= self.max_per_day {
            tracing::debug!(user, used, limit = self.max_per_day, "Download quota exceeded");
            return QuotaDecision::Exceeded {
                limit: self.max_per_day,
            };
        }

        let slot = history.partition_point(|r| r.downloaded_at <= now);
        history.insert(
            slot,
            DownloadRecord {
                content_id: content_id.to_string(),
                downloaded_at: now,
            },
        );

        QuotaDecision::Granted { used: used + 1 }
    }

    fn list_sync(&self, user: &str) -> Vec<DownloadRecord> {
        self.records
            .get(user)
            .map(|history| history.iter().rev().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl DownloadQuota for MemoryDownloadLedger {
    async fn try_record(&self, user: &str, content_id: &str) -> Result<QuotaDecision> {
        Ok(self.try_record_at(user, content_id, Utc::now()))
    }

    async fn list(&self, user: &str) -> Result<Vec<DownloadRecord>> {
        Ok(self.list_sync(user))
    }
}

fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc())
        .unwrap_or(now)
}
