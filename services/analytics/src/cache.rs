//! Caller-owned result cache
//!
//! Interactive callers re-render often with unchanged inputs. The cache keys
//! finished reports by a SHA-256 fingerprint of (sources, config), so a run
//! is only recomputed when something that affects it changed. The pipeline
//! itself holds no state.
//!
//! `ResultCache::new` is unbounded; long-lived callers should use
//! `ResultCache::bounded`, which evicts the oldest entry first.

use crate::config::ForecastConfig;
use crate::error::Result;
use crate::pipeline::{run, ForecastReport};
use crate::table::{SourceTable, Value};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct CachedRun {
    pub fingerprint: String,
    pub report: Arc<ForecastReport>,
    pub computed_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct ResultCache {
    entries: HashMap<String, CachedRun>,
    /// Fingerprints in insertion order.
    order: VecDeque<String>,
    capacity: Option<usize>,
}

fn update_str(hasher: &mut Sha256, s: &str) {
    hasher.update((s.len() as u64).to_le_bytes());
    hasher.update(s.as_bytes());
}

fn update_opt(hasher: &mut Sha256, s: Option<&str>) {
    match s {
        Some(s) => {
            hasher.update([1u8]);
            update_str(hasher, s);
        }
        None => hasher.update([0u8]),
    }
}

/// `sha256:`-prefixed hex digest over every input that influences a run.
pub fn fingerprint(sources: &[SourceTable], config: &ForecastConfig) -> String {
    let mut hasher = Sha256::new();

    hasher.update((sources.len() as u64).to_le_bytes());
    for source in sources {
        update_str(&mut hasher, &source.source_id);
        hasher.update((source.columns.len() as u64).to_le_bytes());
        for column in &source.columns {
            update_str(&mut hasher, column);
        }
        hasher.update((source.rows.len() as u64).to_le_bytes());
        for row in &source.rows {
            hasher.update((row.len() as u64).to_le_bytes());
            for cell in row {
                match cell {
                    Value::Null => hasher.update([0u8]),
                    Value::Number(n) => {
                        hasher.update([1u8]);
                        hasher.update(n.to_bits().to_le_bytes());
                    }
                    Value::Text(s) => {
                        hasher.update([2u8]);
                        update_str(&mut hasher, s);
                    }
                }
            }
        }
    }

    hasher.update(config.target_year.to_le_bytes());
    hasher.update((config.sample_size as u64).to_le_bytes());
    hasher.update(config.min_completeness.to_bits().to_le_bytes());
    hasher.update((config.top_metrics as u64).to_le_bytes());
    hasher.update((config.topup_batch as u64).to_le_bytes());
    hasher.update((config.quota_floor as u64).to_le_bytes());
    hasher.update((config.year_table.tokens.len() as u64).to_le_bytes());
    for token in &config.year_table.tokens {
        update_str(&mut hasher, &token.token);
        hasher.update(token.year.to_le_bytes());
    }
    hasher.update(config.year_table.default_year.to_le_bytes());
    update_opt(&mut hasher, config.entity_column.as_deref());
    update_opt(&mut hasher, config.region_column.as_deref());

    format!("sha256:{:x}", hasher.finalize())
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache holding at most `max_entries` reports (at least one).
    pub fn bounded(max_entries: usize) -> Self {
        Self {
            capacity: Some(max_entries.max(1)),
            ..Self::default()
        }
    }

    pub fn get(&self, fingerprint: &str) -> Option<&CachedRun> {
        self.entries.get(fingerprint)
    }

    /// Return the cached report for these inputs, running the pipeline on a
    /// miss. Failed runs are not cached.
    pub fn get_or_run(&mut self, sources: &[SourceTable], config: &ForecastConfig) -> Result<CachedRun> {
        let key = fingerprint(sources, config);
        if let Some(hit) = self.entries.get(&key) {
            tracing::debug!(fingerprint = %key, "result cache hit");
            return Ok(hit.clone());
        }

        let report = run(sources, config)?;
        let entry = CachedRun {
            fingerprint: key.clone(),
            report: Arc::new(report),
            computed_at: Utc::now(),
        };
        if let Some(capacity) = self.capacity {
            while self.entries.len() >= capacity {
                let Some(oldest) = self.order.pop_front() else {
                    break;
                };
                self.entries.remove(&oldest);
                tracing::debug!(fingerprint = %oldest, "result cache eviction");
            }
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, entry.clone());
        Ok(entry)
    }

    pub fn invalidate(&mut self, fingerprint: &str) -> bool {
        self.order.retain(|k| k != fingerprint);
        self.entries.remove(fingerprint).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
