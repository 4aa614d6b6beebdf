//! In-memory reference implementations of every store trait.
//!
//! `DashMap` backs every store here since none of these need more than key
//! lookup plus occasional full scans — a lock-free concurrent map is
//! simpler than hand-rolling sharded locking for that access pattern.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;

use crate::alerts::escalation::{EscalationPolicy, EscalationState};
use crate::alerts::notifier::NotificationChannel;
use crate::alerts::route::Route;
use crate::alerts::rule::AlertRule;
use crate::alerts::silence::Silence;
use crate::alerts::state::Alert;
use crate::ids::Id;
use crate::metrics::types::{series_hash, AggregatedBucket, MetricSample, Resolution, SeriesFilter, Tags};
use crate::wasm::types::PluginRecord;
use crate::workflow::model::{Execution, Workflow};

use super::{
    AlertRuleStore, AlertStore, EscalationStore, ExecutionStore, MetricStore, NotificationChannelStore, PluginStore,
    RouteStore, SilenceStore, StoreResult, WorkflowStore,
};

#[derive(Default)]
pub struct InMemoryMetricStore {
    raw: DashMap<u64, Vec<MetricSample>>,
    aggregated: DashMap<(u64, Resolution), Vec<AggregatedBucket>>,
    names: DashMap<u64, (String, Tags)>,
}

impl InMemoryMetricStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetricStore for InMemoryMetricStore {
    async fn record(&self, sample: MetricSample) -> StoreResult<()> {
        let hash = sample.series_hash();
        self.names.entry(hash).or_insert_with(|| (sample.name.clone(), sample.tags.clone()));
        self.raw.entry(hash).or_default().push(sample);
        Ok(())
    }

    async fn record_batch(&self, samples: Vec<MetricSample>) -> StoreResult<()> {
        for sample in samples {
            self.record(sample).await?;
        }
        Ok(())
    }

    async fn query(&self, filter: &SeriesFilter, start: DateTime<Utc>, end: DateTime<Utc>) -> StoreResult<Vec<MetricSample>> {
        let hash = series_hash(&filter.name, &filter.tags);
        Ok(self
            .raw
            .get(&hash)
            .map(|v| v.iter().filter(|s| s.timestamp >= start && s.timestamp <= end).cloned().collect())
            .unwrap_or_default())
    }

    async fn record_aggregated_batch(&self, buckets: Vec<AggregatedBucket>) -> StoreResult<()> {
        for bucket in buckets {
            self.names.entry(bucket.series_hash).or_insert_with(|| (bucket.name.clone(), bucket.tags.clone()));
            self.aggregated
                .entry((bucket.series_hash, bucket.resolution))
                .or_default()
                .push(bucket);
        }
        Ok(())
    }

    async fn query_aggregated(
        &self,
        filter: &SeriesFilter,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        resolution: Resolution,
    ) -> StoreResult<Vec<AggregatedBucket>> {
        let hash = series_hash(&filter.name, &filter.tags);
        Ok(self
            .aggregated
            .get(&(hash, resolution))
            .map(|v| {
                v.iter()
                    .filter(|b| b.window_start >= start && b.window_end <= end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn delete_raw_before(&self, threshold: DateTime<Utc>) -> StoreResult<u64> {
        let mut removed = 0u64;
        for mut entry in self.raw.iter_mut() {
            let before = entry.len();
            entry.retain(|s| s.timestamp >= threshold);
            removed += (before - entry.len()) as u64;
        }
        Ok(removed)
    }

    async fn delete_aggregated_before(&self, threshold: DateTime<Utc>, resolution: Resolution) -> StoreResult<u64> {
        let mut removed = 0u64;
        for mut entry in self.aggregated.iter_mut() {
            if entry.key().1 != resolution {
                continue;
            }
            let before = entry.len();
            entry.retain(|b| b.window_end >= threshold);
            removed += (before - entry.len()) as u64;
        }
        Ok(removed)
    }

    async fn distinct_series(&self) -> StoreResult<Vec<(String, Tags)>> {
        Ok(self.names.iter().map(|e| e.value().clone()).collect())
    }
}

#[derive(Default)]
pub struct InMemoryAlertRuleStore {
    rules: DashMap<Id, AlertRule>,
}

impl InMemoryAlertRuleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AlertRuleStore for InMemoryAlertRuleStore {
    async fn put(&self, rule: AlertRule) -> StoreResult<()> {
        self.rules.insert(rule.id, rule);
        Ok(())
    }

    async fn get(&self, id: Id) -> StoreResult<Option<AlertRule>> {
        Ok(self.rules.get(&id).map(|r| r.clone()))
    }

    async fn delete(&self, id: Id) -> StoreResult<()> {
        self.rules.remove(&id);
        Ok(())
    }

    async fn list_enabled(&self) -> StoreResult<Vec<AlertRule>> {
        Ok(self.rules.iter().filter(|r| r.enabled).map(|r| r.clone()).collect())
    }

    async fn list_all(&self) -> StoreResult<Vec<AlertRule>> {
        Ok(self.rules.iter().map(|r| r.clone()).collect())
    }
}

#[derive(Default)]
pub struct InMemoryAlertStore {
    by_fingerprint: DashMap<String, Alert>,
}

impl InMemoryAlertStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AlertStore for InMemoryAlertStore {
    async fn put(&self, alert: Alert) -> StoreResult<()> {
        self.by_fingerprint.insert(alert.fingerprint.clone(), alert);
        Ok(())
    }

    async fn get_by_fingerprint(&self, fingerprint: &str) -> StoreResult<Option<Alert>> {
        Ok(self.by_fingerprint.get(fingerprint).map(|a| a.clone()))
    }

    async fn list_active(&self) -> StoreResult<Vec<Alert>> {
        use crate::alerts::state::AlertState;
        Ok(self
            .by_fingerprint
            .iter()
            .filter(|a| !matches!(a.state, AlertState::Resolved))
            .map(|a| a.clone())
            .collect())
    }

    async fn list_all(&self) -> StoreResult<Vec<Alert>> {
        Ok(self.by_fingerprint.iter().map(|a| a.clone()).collect())
    }
}

#[derive(Default)]
pub struct InMemorySilenceStore {
    silences: DashMap<Id, Silence>,
}

impl InMemorySilenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SilenceStore for InMemorySilenceStore {
    async fn put(&self, silence: Silence) -> StoreResult<()> {
        self.silences.insert(silence.id, silence);
        Ok(())
    }

    async fn delete(&self, id: Id) -> StoreResult<()> {
        self.silences.remove(&id);
        Ok(())
    }

    async fn list_active(&self, now: DateTime<Utc>) -> StoreResult<Vec<Silence>> {
        Ok(self
            .silences
            .iter()
            .filter(|s| s.is_active(now))
            .map(|s| s.clone())
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryChannelStore {
    channels: DashMap<Id, NotificationChannel>,
}

impl InMemoryChannelStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationChannelStore for InMemoryChannelStore {
    async fn put(&self, channel: NotificationChannel) -> StoreResult<()> {
        self.channels.insert(channel.id, channel);
        Ok(())
    }

    async fn get(&self, id: Id) -> StoreResult<Option<NotificationChannel>> {
        Ok(self.channels.get(&id).map(|c| c.clone()))
    }

    async fn list_all(&self) -> StoreResult<Vec<NotificationChannel>> {
        Ok(self.channels.iter().map(|c| c.clone()).collect())
    }
}

#[derive(Default)]
pub struct InMemoryRouteStore {
    routes: RwLock<Vec<Route>>,
}

impl InMemoryRouteStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RouteStore for InMemoryRouteStore {
    async fn put_ordered(&self, routes: Vec<Route>) -> StoreResult<()> {
        *self.routes.write() = routes;
        Ok(())
    }

    async fn list_ordered(&self) -> StoreResult<Vec<Route>> {
        Ok(self.routes.read().clone())
    }
}

#[derive(Default)]
pub struct InMemoryEscalationStore {
    policies_by_rule: DashMap<Id, EscalationPolicy>,
    state_by_alert: DashMap<Id, EscalationState>,
}

impl InMemoryEscalationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EscalationStore for InMemoryEscalationStore {
    async fn put_policy(&self, policy: EscalationPolicy) -> StoreResult<()> {
        self.policies_by_rule.insert(policy.rule_id, policy);
        Ok(())
    }

    async fn policy_for_rule(&self, rule_id: Id) -> StoreResult<Option<EscalationPolicy>> {
        Ok(self.policies_by_rule.get(&rule_id).map(|p| p.clone()))
    }

    async fn put_state(&self, state: EscalationState) -> StoreResult<()> {
        self.state_by_alert.insert(state.alert_id, state);
        Ok(())
    }

    async fn state_for_alert(&self, alert_id: Id) -> StoreResult<Option<EscalationState>> {
        Ok(self.state_by_alert.get(&alert_id).map(|s| s.clone()))
    }
}

#[derive(Default)]
pub struct InMemoryWorkflowStore {
    workflows: DashMap<Id, Workflow>,
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn put(&self, workflow: Workflow) -> StoreResult<()> {
        self.workflows.insert(workflow.id, workflow);
        Ok(())
    }

    async fn get(&self, id: Id) -> StoreResult<Option<Workflow>> {
        Ok(self.workflows.get(&id).map(|w| w.clone()))
    }

    async fn list_all(&self) -> StoreResult<Vec<Workflow>> {
        Ok(self.workflows.iter().map(|w| w.clone()).collect())
    }
}

#[derive(Default)]
pub struct InMemoryExecutionStore {
    executions: DashMap<Id, Execution>,
    by_workflow: DashMap<Id, Vec<Id>>,
}

impl InMemoryExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExecutionStore for InMemoryExecutionStore {
    async fn put(&self, execution: Execution) -> StoreResult<()> {
        self.by_workflow.entry(execution.workflow_id).or_default().retain(|id| *id != execution.id);
        self.by_workflow.entry(execution.workflow_id).or_default().push(execution.id);
        self.executions.insert(execution.id, execution);
        Ok(())
    }

    async fn get(&self, id: Id) -> StoreResult<Option<Execution>> {
        Ok(self.executions.get(&id).map(|e| e.clone()))
    }

    async fn list_for_workflow(&self, workflow_id: Id) -> StoreResult<Vec<Execution>> {
        let ids = self.by_workflow.get(&workflow_id).map(|v| v.clone()).unwrap_or_default();
        Ok(ids.into_iter().filter_map(|id| self.executions.get(&id).map(|e| e.clone())).collect())
    }

    async fn latest_for_workflow(&self, workflow_id: Id) -> StoreResult<Option<Execution>> {
        let ids = self.by_workflow.get(&workflow_id).map(|v| v.clone()).unwrap_or_default();
        Ok(ids.last().and_then(|id| self.executions.get(id).map(|e| e.clone())))
    }
}

#[derive(Default)]
pub struct InMemoryPluginStore {
    plugins: DashMap<Id, PluginRecord>,
}

impl InMemoryPluginStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PluginStore for InMemoryPluginStore {
    async fn put(&self, plugin: PluginRecord) -> StoreResult<()> {
        self.plugins.insert(plugin.id, plugin);
        Ok(())
    }

    async fn get(&self, id: Id) -> StoreResult<Option<PluginRecord>> {
        Ok(self.plugins.get(&id).map(|p| p.clone()))
    }

    async fn delete(&self, id: Id) -> StoreResult<()> {
        self.plugins.remove(&id);
        Ok(())
    }

    async fn list_all(&self) -> StoreResult<Vec<PluginRecord>> {
        Ok(self.plugins.iter().map(|p| p.clone()).collect())
    }
}
