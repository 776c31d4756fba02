//! In-memory screenshot store
//!
//! Keeps the most recent screenshot per question id. Nothing is persisted;
//! records live until the cleanup sweep expires them.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

/// The latest screenshot seen for a question
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenshotRecord {
    pub question_id: String,
    pub screenshot: String,
    pub timestamp: DateTime<Utc>,
}

/// Last-write-wins map from question id to screenshot
#[derive(Default)]
pub struct ScreenshotStore {
    records: RwLock<HashMap<String, ScreenshotRecord>>,
}

impl ScreenshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store or overwrite the screenshot for `question_id`, stamped now
    pub async fn put(
        &self,
        question_id: impl Into<String>,
        screenshot: impl Into<String>,
    ) -> DateTime<Utc> {
        self.put_at(question_id, screenshot, Utc::now()).await
    }

    /// Store or overwrite the screenshot with an explicit timestamp
    pub async fn put_at(
        &self,
        question_id: impl Into<String>,
        screenshot: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> DateTime<Utc> {
        let question_id = question_id.into();
        let record = ScreenshotRecord {
            question_id: question_id.clone(),
            screenshot: screenshot.into(),
            timestamp,
        };
        self.records.write().await.insert(question_id, record);
        timestamp
    }

    pub async fn get(&self, question_id: &str) -> Option<ScreenshotRecord> {
        self.records.read().await.get(question_id).cloned()
    }

    /// Remove every record stamped strictly before `cutoff`
    ///
    /// Returns the number of records removed.
    pub async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> usize {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, record| record.timestamp >= cutoff);
        before - records.len()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}
