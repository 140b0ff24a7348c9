//! Alert evaluation with per (entity, alert type) cooldown.
//!
//! Each (entity, alert type) pair is QUIET until its condition holds, then
//! FIRED for the rule's cooldown. A condition met while FIRED is suppressed
//! and only recorded in the history; it never produces a second alert.

use crate::alerts::rules::{AlertRule, Trigger};
use crate::config::EngineConfig;
use crate::models::alert::{Alert, AlertMetadata, AlertType};
use crate::models::signal::{SignalEvent, SignalName, SignalState};
use crate::signals::fusion::Composite;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub last_fired: Option<DateTime<Utc>>,
    /// Last time the condition held, fired or not.
    pub last_triggered: Option<DateTime<Utc>>,
    pub last_evaluated: Option<DateTime<Utc>>,
    pub suppressed: u64,
}

#[derive(Debug, Clone, Default)]
pub struct AlertHistory {
    entries: HashMap<(String, AlertType), HistoryEntry>,
}

impl AlertHistory {
    pub fn get(&self, entity: &str, alert_type: AlertType) -> Option<&HistoryEntry> {
        self.entries.get(&(entity.to_string(), alert_type))
    }

    fn entry(&mut self, entity: &str, alert_type: AlertType) -> &mut HistoryEntry {
        self.entries
            .entry((entity.to_string(), alert_type))
            .or_default()
    }

    /// Drop every entry of `entity`; returns how many were removed.
    pub fn evict(&mut self, entity: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(e, _), _| e != entity);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Inputs for one signal that was updated in the current cycle.
#[derive(Debug, Clone, Copy)]
pub struct SignalInputs<'a> {
    pub state: &'a SignalState,
    pub composite: Option<&'a Composite>,
    pub events: &'a [SignalEvent],
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    /// Emitted alerts in rule priority order.
    pub alerts: Vec<Alert>,
    /// Rules whose condition held but were still cooling down.
    pub suppressed: Vec<AlertType>,
}

#[derive(Debug, Clone)]
pub struct AlertEngine {
    rules: Vec<AlertRule>,
    history: AlertHistory,
}

impl AlertEngine {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            rules: AlertRule::from_config(config),
            history: AlertHistory::default(),
        }
    }

    /// Replace the rule set. Cooldown history is kept.
    pub fn reconfigure(&mut self, config: &EngineConfig) {
        self.rules = AlertRule::from_config(config);
    }

    pub fn rules(&self) -> &[AlertRule] {
        &self.rules
    }

    pub fn history(&self) -> &AlertHistory {
        &self.history
    }

    pub fn evict(&mut self, entity: &str) -> usize {
        self.history.evict(entity)
    }

    /// Evaluate every rule whose signal appears in `inputs`.
    ///
    /// `now` is the event time of the update being processed. Signals not
    /// updated in this cycle are not re-evaluated, so an unchanged value
    /// cannot re-fire once its cooldown lapses.
    pub fn evaluate(
        &mut self,
        entity: &str,
        inputs: &BTreeMap<SignalName, SignalInputs<'_>>,
        now: DateTime<Utc>,
    ) -> Evaluation {
        let mut evaluation = Evaluation::default();

        for rule in &self.rules {
            let Some(input) = inputs.get(&rule.signal()) else {
                continue;
            };

            let entry = self.history.entry(entity, rule.alert_type);
            entry.last_evaluated = Some(now);

            let Some(trigger) = rule.check(input.state, input.events) else {
                continue;
            };
            entry.last_triggered = Some(now);

            let cooled = entry
                .last_fired
                .map_or(true, |fired| now - fired >= rule.cooldown);
            if !cooled {
                entry.suppressed += 1;
                debug!(
                    entity = %entity,
                    alert_type = %rule.alert_type,
                    value = trigger.value,
                    "alert suppressed by cooldown"
                );
                evaluation.suppressed.push(rule.alert_type);
                continue;
            }

            entry.last_fired = Some(now);
            evaluation
                .alerts
                .push(build_alert(entity, rule, input, trigger, now));
        }

        evaluation
    }
}

fn build_alert(
    entity: &str,
    rule: &AlertRule,
    input: &SignalInputs<'_>,
    trigger: Trigger,
    now: DateTime<Utc>,
) -> Alert {
    let (contributing_sources, confidence) = input
        .composite
        .map(|composite| (composite.sources(), composite.confidence))
        .unwrap_or_default();

    Alert {
        id: Uuid::new_v4(),
        timestamp: now,
        severity: rule.severity,
        alert_type: rule.alert_type,
        entity: entity.to_string(),
        signal_name: rule.signal(),
        current_value: trigger.value,
        threshold: trigger.threshold,
        description: trigger.description,
        metadata: AlertMetadata {
            contributing_sources,
            confidence,
            recommendation: trigger.recommendation,
            details: trigger.details,
        },
    }
}
