//! Bounded, per-category analysis history.
//!
//! Each [`Category`] owns one partition: a JSON array of
//! [`AnalysisRecord`]s stored under the category's storage key, newest
//! first, never longer than [`MAX_ITEMS`]. Inserting into a full partition
//! drops the oldest record.
//!
//! Reads are forgiving: a missing, unreadable, or corrupt partition loads
//! as an empty list and the problem is logged, never returned. Each insert
//! is one [`KvStore::update`], so writers sharing a backend cannot lose each
//! other's records. Within one process a per-partition async mutex also
//! queues writers before they reach the store.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::classify::profile;
use crate::models::{excerpt, AnalysisRecord, Category, ResultFields};
use crate::store::KvStore;

/// Capacity of every partition.
pub const MAX_ITEMS: usize = 10;

/// Per-category record counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HistoryStats {
    pub deepfake: usize,
    pub audio: usize,
    pub image: usize,
    pub misinfo: usize,
    pub total: usize,
}

impl HistoryStats {
    pub fn count(&self, category: Category) -> usize {
        match category {
            Category::Deepfake => self.deepfake,
            Category::Audio => self.audio,
            Category::Image => self.image,
            Category::Misinfo => self.misinfo,
        }
    }
}

/// The analysis history store.
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
pub struct AnalysisHistory {
    store: Arc<dyn KvStore>,
    partition_locks: [Mutex<()>; 4],
}

impl AnalysisHistory {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            partition_locks: [
                Mutex::new(()),
                Mutex::new(()),
                Mutex::new(()),
                Mutex::new(()),
            ],
        }
    }

    /// Save a result under a category given by name.
    ///
    /// An unrecognized name is a no-op: nothing is written and `Ok(None)`
    /// is returned. Otherwise behaves like [`save_to`](Self::save_to).
    pub async fn save(
        &self,
        category: &str,
        fields: ResultFields,
    ) -> Result<Option<Vec<AnalysisRecord>>> {
        match Category::parse(category) {
            Some(c) => self.save_to(c, fields).await.map(Some),
            None => {
                log::warn!("ignoring save for unknown category '{}'", category);
                Ok(None)
            }
        }
    }

    /// Insert a new record at the head of `category`'s partition.
    ///
    /// Assigns a fresh id and timestamp, clamps scores to `[0, 100]`, keeps
    /// a source excerpt for misinformation records, truncates the partition
    /// to [`MAX_ITEMS`], persists it, and returns the updated list.
    pub async fn save_to(
        &self,
        category: Category,
        fields: ResultFields,
    ) -> Result<Vec<AnalysisRecord>> {
        let _guard = self.partition_locks[category.index()].lock().await;

        let key = profile(category).storage_key;
        let mut saved: Option<Vec<AnalysisRecord>> = None;
        let slot = &mut saved;
        self.store
            .update(
                key,
                Box::new(move |current| {
                    let mut history = parse_partition(category, current.as_deref());
                    let record = new_record(category, fields, &history);
                    history.insert(0, record);
                    history.truncate(MAX_ITEMS);
                    let payload = serde_json::to_string(&history)?;
                    *slot = Some(history);
                    Ok(payload)
                }),
            )
            .await
            .with_context(|| format!("failed to persist {} history", category))?;

        let history = saved.unwrap_or_default();
        if let Some(head) = history.first() {
            log::debug!(
                "saved {} analysis {} ({} in partition)",
                category,
                head.id,
                history.len()
            );
        }
        Ok(history)
    }

    /// Load `category`'s partition, newest first.
    ///
    /// Returns an empty list when nothing is stored or the stored payload
    /// cannot be read or parsed.
    pub async fn load(&self, category: Category) -> Vec<AnalysisRecord> {
        self.read_partition(category).await
    }

    /// Remove every record in `category`'s partition.
    pub async fn clear(&self, category: Category) -> Result<()> {
        let _guard = self.partition_locks[category.index()].lock().await;
        self.store
            .delete(profile(category).storage_key)
            .await
            .with_context(|| format!("failed to clear {} history", category))?;
        log::info!("cleared {} history", category);
        Ok(())
    }

    /// Record counts for every category.
    pub async fn stats(&self) -> HistoryStats {
        let mut stats = HistoryStats::default();
        for category in Category::ALL {
            let n = self.load(category).await.len();
            match category {
                Category::Deepfake => stats.deepfake = n,
                Category::Audio => stats.audio = n,
                Category::Image => stats.image = n,
                Category::Misinfo => stats.misinfo = n,
            }
            stats.total += n;
        }
        stats
    }

    async fn read_partition(&self, category: Category) -> Vec<AnalysisRecord> {
        match self.store.get(profile(category).storage_key).await {
            Ok(payload) => parse_partition(category, payload.as_deref()),
            Err(e) => {
                log::error!("error reading {} history: {:#}", category, e);
                Vec::new()
            }
        }
    }
}

fn parse_partition(category: Category, payload: Option<&str>) -> Vec<AnalysisRecord> {
    let Some(payload) = payload else {
        return Vec::new();
    };
    match serde_json::from_str::<Vec<AnalysisRecord>>(payload) {
        Ok(records) => records,
        Err(e) => {
            log::error!("discarding corrupt {} history: {}", category, e);
            Vec::new()
        }
    }
}

/// Build the record to insert ahead of `existing`. The id and timestamp are
/// always assigned here; the timestamp never goes behind the current head.
fn new_record(
    category: Category,
    fields: ResultFields,
    existing: &[AnalysisRecord],
) -> AnalysisRecord {
    let mut timestamp = Utc::now();
    if let Some(head) = existing.first() {
        if head.timestamp > timestamp {
            timestamp = head.timestamp;
        }
    }

    let mut id = generate_id(timestamp.timestamp_millis());
    while existing.iter().any(|r| r.id == id) {
        id = generate_id(timestamp.timestamp_millis());
    }

    let source_excerpt = match category {
        Category::Misinfo => fields.source_text.as_deref().map(excerpt),
        _ => None,
    };

    AnalysisRecord {
        id,
        timestamp,
        category,
        scores: fields.scores.clamped(),
        description: fields.description,
        media_ref: fields.media_ref,
        source_excerpt,
    }
}

fn generate_id(millis: i64) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("analysis_{}_{}", millis, &suffix[..8])
}
