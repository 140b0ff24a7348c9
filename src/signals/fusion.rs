//! Weighted composite fusion.
//!
//! Each configured source contributes its latest observation only while that
//! observation is fresh (age within the source's expected interval). Weights
//! of the fresh sources are renormalized to sum to 1; with no fresh source the
//! outcome is `NoData`, never a neutral score.

use crate::config::{CompositeWeightConfig, EngineConfig, SourceSettings};
use crate::error::FusionError;
use crate::models::observation::{SourceName, SourceObservation};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::trace;

/// One source's share of a composite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub source: SourceName,
    /// Renormalized weight.
    pub weight: f64,
    pub value: f64,
    pub confidence: f64,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Composite {
    pub value: f64,
    /// Weight-averaged source confidence.
    pub confidence: f64,
    pub contributions: Vec<Contribution>,
}

impl Composite {
    pub fn sources(&self) -> Vec<SourceName> {
        self.contributions.iter().map(|c| c.source).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FusionOutcome {
    Score(Composite),
    NoData,
}

impl FusionOutcome {
    pub fn value(&self) -> Option<f64> {
        match self {
            FusionOutcome::Score(composite) => Some(composite.value),
            FusionOutcome::NoData => None,
        }
    }

    pub fn composite(&self) -> Option<&Composite> {
        match self {
            FusionOutcome::Score(composite) => Some(composite),
            FusionOutcome::NoData => None,
        }
    }
}

/// Stateless fusion over per-source freshness settings.
#[derive(Debug, Clone)]
pub struct FusionEngine {
    sources: BTreeMap<SourceName, SourceSettings>,
}

impl FusionEngine {
    pub fn new(config: &EngineConfig) -> Self {
        let sources = SourceName::ALL
            .into_iter()
            .map(|source| (source, config.source(source)))
            .collect();
        Self { sources }
    }

    fn settings(&self, source: SourceName) -> SourceSettings {
        self.sources
            .get(&source)
            .cloned()
            .unwrap_or_else(|| SourceSettings::for_source(source))
    }

    /// Fuse the current observations of `entity` as of `now`.
    ///
    /// When several observations of one source are passed, the newest wins.
    /// Inputs are expected to be validated already; a violation is reported
    /// as an error instead of being folded into the score.
    pub fn fuse<'a, I>(
        &self,
        entity: &str,
        observations: I,
        weights: &CompositeWeightConfig,
        now: DateTime<Utc>,
    ) -> Result<FusionOutcome, FusionError>
    where
        I: IntoIterator<Item = &'a SourceObservation>,
    {
        let mut latest: BTreeMap<SourceName, &SourceObservation> = BTreeMap::new();
        for observation in observations {
            if observation.entity != entity {
                return Err(FusionError::EntityMismatch {
                    expected: entity.to_string(),
                    found: observation.entity.clone(),
                });
            }
            observation.validate()?;
            let newer = latest
                .get(&observation.source)
                .map_or(true, |current| observation.timestamp >= current.timestamp);
            if newer {
                latest.insert(observation.source, observation);
            }
        }

        let mut included: Vec<(f64, &SourceObservation)> = Vec::new();
        for (source, weight) in weights.iter() {
            if weight <= 0.0 {
                continue;
            }
            let settings = self.settings(source);
            if !settings.enabled {
                continue;
            }
            let Some(observation) = latest.get(&source) else {
                continue;
            };
            let age = now - observation.timestamp;
            if age > settings.expected_interval() {
                trace!(
                    entity = %entity,
                    source = %source,
                    age_secs = age.num_seconds(),
                    "excluding stale source from fusion"
                );
                continue;
            }
            included.push((weight, observation));
        }

        let total: f64 = included.iter().map(|(weight, _)| weight).sum();
        if included.is_empty() || total <= 0.0 {
            return Ok(FusionOutcome::NoData);
        }

        let contributions: Vec<Contribution> = included
            .into_iter()
            .map(|(weight, observation)| Contribution {
                source: observation.source,
                weight: weight / total,
                value: observation.value,
                confidence: observation.confidence,
                observed_at: observation.timestamp,
            })
            .collect();

        let value = contributions.iter().map(|c| c.weight * c.value).sum();
        let confidence = contributions.iter().map(|c| c.weight * c.confidence).sum();

        Ok(FusionOutcome::Score(Composite {
            value,
            confidence,
            contributions,
        }))
    }
}
