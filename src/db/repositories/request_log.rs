use anyhow::{Context, Result};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, PaginatorTrait, Set};

use crate::constants::limits::REQUEST_FIELD_MAX;
use crate::entities::{prelude::*, request_logs};

#[derive(Debug, Clone, Default)]
pub struct NewRequestLog {
    pub user_id: Option<i32>,
    pub ip_address: String,
    pub referer: Option<String>,
    pub user_agent: Option<String>,
    pub url: Option<String>,
    pub method: String,
}

pub struct RequestLogRepository {
    conn: DatabaseConnection,
}

impl RequestLogRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Appends an entry. Free-text fields are cut to the column limits.
    pub async fn add(&self, entry: NewRequestLog) -> Result<()> {
        request_logs::ActiveModel {
            user_id: Set(entry.user_id),
            ip_address: Set(truncate(entry.ip_address, REQUEST_FIELD_MAX)),
            referer: Set(entry.referer.map(|v| truncate(v, REQUEST_FIELD_MAX))),
            user_agent: Set(entry.user_agent.map(|v| truncate(v, REQUEST_FIELD_MAX))),
            url: Set(entry.url.map(|v| truncate(v, REQUEST_FIELD_MAX))),
            method: Set(truncate(entry.method, 10)),
            date_created: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&self.conn)
        .await
        .context("Failed to insert request log")?;
        Ok(())
    }

    pub async fn count(&self) -> Result<u64> {
        RequestLogs::find()
            .count(&self.conn)
            .await
            .context("Failed to count request logs")
    }
}

fn truncate(mut value: String, max_chars: usize) -> String {
    if let Some((idx, _)) = value.char_indices().nth(max_chars) {
        value.truncate(idx);
    }
    value
}

#[cfg(test)]
mod tests {
    use super::truncate;

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("abcdef".to_string(), 3), "abc");
        assert_eq!(truncate("ab".to_string(), 3), "ab");
        assert_eq!(truncate("سلام دنیا".to_string(), 4), "سلام");
    }
}
