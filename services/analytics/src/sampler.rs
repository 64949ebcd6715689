//! Stratified entity sampling
//!
//! Two passes over an entity → region index:
//! 1. Proportional: each region gets `max(floor, ⌊N · region / total⌋)`
//!    entities in encounter order.
//! 2. Top-up: if still short of N, regions are visited largest first and
//!    up to `batch` unselected entities are appended from each.
//!
//! When the table has no region (or no entity) column the sampler falls
//! back to the first N distinct entities in table order.

use crate::config::ForecastConfig;
use crate::table::MergedTable;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Distinct entities of one region, in encounter order.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionGroup {
    pub region: String,
    pub entities: Vec<String>,
}

/// Entities and their regions as found in the merged table.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EntityIndex {
    /// Distinct entities in table order.
    pub entities: Vec<String>,
    /// Regions in encounter order; empty when there is no region column.
    pub regions: Vec<RegionGroup>,
    pub has_regions: bool,
}

impl EntityIndex {
    pub fn build(table: &MergedTable, entity_col: Option<usize>, region_col: Option<usize>) -> Self {
        let Some(entity_col) = entity_col else {
            return Self::default();
        };

        let mut entities = Vec::new();
        let mut seen = HashSet::new();
        let mut regions: Vec<RegionGroup> = Vec::new();
        let mut region_pos: HashMap<String, usize> = HashMap::new();
        let mut region_members: HashSet<(usize, String)> = HashSet::new();

        for row in 0..table.len() {
            let Some(entity) = table.cell(row, entity_col).as_key() else {
                continue;
            };
            if seen.insert(entity.clone()) {
                entities.push(entity.clone());
            }

            let Some(region_col) = region_col else {
                continue;
            };
            let Some(region) = table.cell(row, region_col).as_key() else {
                continue;
            };
            let pos = *region_pos.entry(region.clone()).or_insert_with(|| {
                regions.push(RegionGroup {
                    region,
                    entities: Vec::new(),
                });
                regions.len() - 1
            });
            if region_members.insert((pos, entity.clone())) {
                regions[pos].entities.push(entity);
            }
        }

        Self {
            entities,
            regions,
            has_regions: region_col.is_some(),
        }
    }
}

/// Sampling knobs, split out of [`ForecastConfig`] so the policy can be
/// exercised on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingPolicy {
    pub sample_size: usize,
    pub quota_floor: usize,
    pub topup_batch: usize,
}

impl From<&ForecastConfig> for SamplingPolicy {
    fn from(config: &ForecastConfig) -> Self {
        Self {
            sample_size: config.sample_size,
            quota_floor: config.quota_floor,
            topup_batch: config.topup_batch,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleMode {
    Stratified,
    /// Region or entity key missing from the schema.
    FirstDistinct,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub entities: Vec<String>,
    pub mode: SampleMode,
}

/// Phase-one quota per region, aligned with `groups`.
pub fn region_quotas(groups: &[RegionGroup], total: usize, policy: &SamplingPolicy) -> Vec<usize> {
    if total == 0 {
        return vec![0; groups.len()];
    }
    groups
        .iter()
        .map(|g| {
            let share = policy.sample_size as u128 * g.entities.len() as u128 / total as u128;
            usize::try_from(share)
                .unwrap_or(usize::MAX)
                .max(policy.quota_floor)
        })
        .collect()
}

/// Proportional pass followed by the size-ranked top-up pass.
pub fn stratified_sample(groups: &[RegionGroup], total: usize, policy: &SamplingPolicy) -> Vec<String> {
    let n = policy.sample_size;
    let mut selected: Vec<String> = Vec::new();
    let mut taken: HashSet<&str> = HashSet::new();

    let quotas = region_quotas(groups, total, policy);
    for (group, quota) in groups.iter().zip(quotas) {
        let picks: Vec<&String> = group
            .entities
            .iter()
            .filter(|e| !taken.contains(e.as_str()))
            .take(quota)
            .collect();
        for entity in picks {
            taken.insert(entity.as_str());
            selected.push(entity.clone());
        }
    }

    if selected.len() < n {
        let mut by_size: Vec<&RegionGroup> = groups.iter().collect();
        by_size.sort_by(|a, b| b.entities.len().cmp(&a.entities.len()));

        'topup: for group in by_size {
            let mut added = 0;
            for entity in &group.entities {
                if selected.len() >= n {
                    break 'topup;
                }
                if added == policy.topup_batch {
                    break;
                }
                if taken.insert(entity.as_str()) {
                    selected.push(entity.clone());
                    added += 1;
                }
            }
        }
    }

    selected.truncate(n);
    selected
}

/// Choose which entities to forecast.
pub fn sample_entities(index: &EntityIndex, policy: &SamplingPolicy) -> Sample {
    if !index.has_regions {
        tracing::warn!("region or entity key missing; sampling the first distinct entities");
        return Sample {
            entities: index
                .entities
                .iter()
                .take(policy.sample_size)
                .cloned()
                .collect(),
            mode: SampleMode::FirstDistinct,
        };
    }

    let entities = stratified_sample(&index.regions, index.entities.len(), policy);
    tracing::debug!(
        regions = index.regions.len(),
        sampled = entities.len(),
        "stratified sample"
    );
    Sample {
        entities,
        mode: SampleMode::Stratified,
    }
}
