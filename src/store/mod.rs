//! Persistence seams.
//!
//! Every subsystem talks to storage through a narrow `#[async_trait]`, the
//! same kind of seam `TelemetrySink` gives a sink (swap the backend without
//! touching the subsystem built on top of it). `memory` carries the one
//! reference implementation of each trait — `DashMap`/`parking_lot::RwLock`-
//! backed, used by tests and by default wiring when no external store is
//! supplied.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::alerts::escalation::{EscalationPolicy, EscalationState};
use crate::alerts::notifier::NotificationChannel;
use crate::alerts::route::Route;
use crate::alerts::rule::AlertRule;
use crate::alerts::silence::Silence;
use crate::alerts::state::Alert;
use crate::error::ForgeError;
use crate::ids::Id;
use crate::metrics::types::{AggregatedBucket, MetricSample, Resolution, SeriesFilter};
use crate::wasm::types::PluginRecord;
use crate::workflow::model::{Execution, Workflow};

pub type StoreResult<T> = Result<T, ForgeError>;

#[async_trait]
pub trait MetricStore: Send + Sync {
    async fn record(&self, sample: MetricSample) -> StoreResult<()>;
    async fn record_batch(&self, samples: Vec<MetricSample>) -> StoreResult<()>;
    async fn query(&self, filter: &SeriesFilter, start: DateTime<Utc>, end: DateTime<Utc>) -> StoreResult<Vec<MetricSample>>;
    async fn record_aggregated_batch(&self, buckets: Vec<AggregatedBucket>) -> StoreResult<()>;
    async fn query_aggregated(
        &self,
        filter: &SeriesFilter,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        resolution: Resolution,
    ) -> StoreResult<Vec<AggregatedBucket>>;
    async fn delete_raw_before(&self, threshold: DateTime<Utc>) -> StoreResult<u64>;
    async fn delete_aggregated_before(&self, threshold: DateTime<Utc>, resolution: Resolution) -> StoreResult<u64>;
    async fn distinct_series(&self) -> StoreResult<Vec<(String, crate::metrics::types::Tags)>>;
}

#[async_trait]
pub trait AlertRuleStore: Send + Sync {
    async fn put(&self, rule: AlertRule) -> StoreResult<()>;
    async fn get(&self, id: Id) -> StoreResult<Option<AlertRule>>;
    async fn delete(&self, id: Id) -> StoreResult<()>;
    async fn list_enabled(&self) -> StoreResult<Vec<AlertRule>>;
    async fn list_all(&self) -> StoreResult<Vec<AlertRule>>;
}

#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn put(&self, alert: Alert) -> StoreResult<()>;
    async fn get_by_fingerprint(&self, fingerprint: &str) -> StoreResult<Option<Alert>>;
    async fn list_active(&self) -> StoreResult<Vec<Alert>>;
    async fn list_all(&self) -> StoreResult<Vec<Alert>>;
}

#[async_trait]
pub trait SilenceStore: Send + Sync {
    async fn put(&self, silence: Silence) -> StoreResult<()>;
    async fn delete(&self, id: Id) -> StoreResult<()>;
    async fn list_active(&self, now: DateTime<Utc>) -> StoreResult<Vec<Silence>>;
}

#[async_trait]
pub trait NotificationChannelStore: Send + Sync {
    async fn put(&self, channel: NotificationChannel) -> StoreResult<()>;
    async fn get(&self, id: Id) -> StoreResult<Option<NotificationChannel>>;
    async fn list_all(&self) -> StoreResult<Vec<NotificationChannel>>;
}

#[async_trait]
pub trait RouteStore: Send + Sync {
    async fn put_ordered(&self, routes: Vec<Route>) -> StoreResult<()>;
    async fn list_ordered(&self) -> StoreResult<Vec<Route>>;
}

#[async_trait]
pub trait EscalationStore: Send + Sync {
    async fn put_policy(&self, policy: EscalationPolicy) -> StoreResult<()>;
    async fn policy_for_rule(&self, rule_id: Id) -> StoreResult<Option<EscalationPolicy>>;
    async fn put_state(&self, state: EscalationState) -> StoreResult<()>;
    async fn state_for_alert(&self, alert_id: Id) -> StoreResult<Option<EscalationState>>;
}

#[async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn put(&self, workflow: Workflow) -> StoreResult<()>;
    async fn get(&self, id: Id) -> StoreResult<Option<Workflow>>;
    async fn list_all(&self) -> StoreResult<Vec<Workflow>>;
}

#[async_trait]
pub trait ExecutionStore: Send + Sync {
    async fn put(&self, execution: Execution) -> StoreResult<()>;
    async fn get(&self, id: Id) -> StoreResult<Option<Execution>>;
    async fn list_for_workflow(&self, workflow_id: Id) -> StoreResult<Vec<Execution>>;
    async fn latest_for_workflow(&self, workflow_id: Id) -> StoreResult<Option<Execution>>;
}

#[async_trait]
pub trait PluginStore: Send + Sync {
    async fn put(&self, plugin: PluginRecord) -> StoreResult<()>;
    async fn get(&self, id: Id) -> StoreResult<Option<PluginRecord>>;
    async fn delete(&self, id: Id) -> StoreResult<()>;
    async fn list_all(&self) -> StoreResult<Vec<PluginRecord>>;
}
