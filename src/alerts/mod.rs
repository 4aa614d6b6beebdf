//! Alert engine: periodic rule evaluation, lifecycle transitions,
//! silencing, routing and escalation.
//!
//! The evaluation loop iterates an ordered set of rules, times each one,
//! never lets one rule's failure stop the rest, and logs at `debug`/`warn`
//! granularity throughout.

pub mod escalation;
pub mod notifier;
pub mod route;
pub mod rule;
pub mod silence;
pub mod state;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::ids::Id;
use crate::metrics::types::{SeriesFilter, Tags};
use crate::metrics::MetricPipeline;
use crate::store::{AlertRuleStore, AlertStore, EscalationStore, NotificationChannelStore, RouteStore, SilenceStore};

use escalation::EscalationState;
use notifier::{NotifyError, Notifier};
use route::resolve_channels;
use rule::{AlertRule, Condition};
use state::{Alert, AlertState};

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("rule not found: {0}")]
    RuleNotFound(Id),
    #[error("alert not found: {0}")]
    AlertNotFound(Id),
    #[error("channel not found: {0}")]
    ChannelNotFound(Id),
    #[error("store error: {0}")]
    Store(String),
    #[error("notifier error: {0}")]
    Notifier(#[from] NotifyError),
}

pub struct AlertEngineConfig {
    pub eval_interval: StdDuration,
    pub escalation_interval: StdDuration,
}

impl Default for AlertEngineConfig {
    fn default() -> Self {
        Self {
            eval_interval: StdDuration::from_secs(30),
            escalation_interval: StdDuration::from_secs(30),
        }
    }
}

pub struct AlertEngine {
    rules: Arc<dyn AlertRuleStore>,
    alerts: Arc<dyn AlertStore>,
    silences: Arc<dyn SilenceStore>,
    channels: Arc<dyn NotificationChannelStore>,
    routes: Arc<dyn RouteStore>,
    escalations: Arc<dyn EscalationStore>,
    metrics: Arc<MetricPipeline>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    evaluations_total: AtomicU64,
    cancel: CancellationToken,
}

impl AlertEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rules: Arc<dyn AlertRuleStore>,
        alerts: Arc<dyn AlertStore>,
        silences: Arc<dyn SilenceStore>,
        channels: Arc<dyn NotificationChannelStore>,
        routes: Arc<dyn RouteStore>,
        escalations: Arc<dyn EscalationStore>,
        metrics: Arc<MetricPipeline>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        config: AlertEngineConfig,
    ) -> Arc<Self> {
        let engine = Arc::new(Self {
            rules,
            alerts,
            silences,
            channels,
            routes,
            escalations,
            metrics,
            notifier,
            clock,
            evaluations_total: AtomicU64::new(0),
            cancel: CancellationToken::new(),
        });
        engine.clone().spawn_eval_loop(config.eval_interval);
        engine.clone().spawn_escalation_loop(config.escalation_interval);
        engine
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn evaluations_total(&self) -> u64 {
        self.evaluations_total.load(Ordering::Relaxed)
    }

    fn spawn_eval_loop(self: Arc<Self>, period: StdDuration) {
        tokio::spawn(async move {
            let mut tick = interval(period);
            loop {
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = tick.tick() => self.evaluate_all().await,
                }
            }
        });
    }

    fn spawn_escalation_loop(self: Arc<Self>, period: StdDuration) {
        tokio::spawn(async move {
            let mut tick = interval(period);
            loop {
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = tick.tick() => self.run_escalations().await,
                }
            }
        });
    }

    async fn evaluate_all(&self) {
        let rules = match self.rules.list_enabled().await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "failed to list alert rules");
                return;
            }
        };
        for rule in rules {
            let start = Instant::now();
            if let Err(e) = self.evaluate_rule(&rule).await {
                warn!(rule = %rule.id, error = %e, "rule evaluation failed, continuing");
            }
            debug!(rule = %rule.id, elapsed_ms = start.elapsed().as_millis(), "rule evaluated");
        }
        self.evaluations_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Evaluates one rule against the most recent sample(s) for its series
    /// and drives the pending/firing/resolved transition.
    ///
    /// `RateOfChange` compares only the two most recent samples in its
    /// window; a spike-then-settle pattern entirely between two evaluation
    /// cycles is invisible to it (documented limitation, not a bug).
    pub async fn evaluate_rule(&self, rule: &AlertRule) -> Result<(), AlertError> {
        let now = self.clock.now();
        let fingerprint = rule.fingerprint();
        let filter = SeriesFilter { name: rule.metric_name.clone(), tags: rule.tags.clone() };
        let window = chrono::Duration::seconds(rule.for_secs.max(60) * 2);
        let samples = self
            .metrics
            .query(&filter, now - window, now)
            .await
            .map_err(|e| AlertError::Store(e.to_string()))?;

        let triggered = self.condition_holds(rule, &samples, now);
        let latest_value = samples.last().map(|s| s.value).unwrap_or(0.0);

        let existing = self
            .alerts
            .get_by_fingerprint(&fingerprint)
            .await
            .map_err(|e| AlertError::Store(e.to_string()))?;

        let silenced = self.is_silenced(&rule.labels, now).await;

        match (triggered, existing) {
            (true, None) => {
                let mut alert = Alert::new_pending(rule.id, fingerprint, latest_value, now);
                if silenced {
                    alert.state = AlertState::Silenced;
                }
                self.alerts.put(alert).await.map_err(|e| AlertError::Store(e.to_string()))?;
            }
            (true, Some(mut alert)) => {
                alert.last_evaluated_at = now;
                alert.value = latest_value;
                if silenced {
                    // Never lets a silenced alert reach firing, and an
                    // already-firing alert that gets silenced drops back.
                    alert.state = AlertState::Silenced;
                } else {
                    if alert.state == AlertState::Silenced || alert.state == AlertState::Resolved {
                        // The silence lapsed (or the alert re-fired after
                        // resolving) — start a fresh pending episode.
                        alert.state = AlertState::Pending;
                        alert.started_at = now;
                        alert.escalation_level = 0;
                    }
                    if alert.state == AlertState::Pending && (now - alert.started_at).num_seconds() >= rule.for_secs {
                        alert.state = AlertState::Firing;
                        self.route_and_notify(rule, &alert).await;
                    }
                }
                self.alerts.put(alert).await.map_err(|e| AlertError::Store(e.to_string()))?;
            }
            (false, Some(mut alert)) if alert.state != AlertState::Resolved => {
                alert.state = AlertState::Resolved;
                alert.resolved_at = Some(now);
                alert.last_evaluated_at = now;
                self.alerts.put(alert).await.map_err(|e| AlertError::Store(e.to_string()))?;
            }
            _ => {}
        }
        Ok(())
    }

    async fn is_silenced(&self, labels: &Tags, now: DateTime<Utc>) -> bool {
        match self.silences.list_active(now).await {
            Ok(silences) => silences.iter().any(|s| s.matches(labels)),
            Err(e) => {
                warn!(error = %e, "failed to list silences, evaluating as not silenced");
                false
            }
        }
    }

    fn condition_holds(&self, rule: &AlertRule, samples: &[crate::metrics::types::MetricSample], now: DateTime<Utc>) -> bool {
        match rule.condition {
            Condition::ThresholdAbove { value } => samples.last().is_some_and(|s| s.value > value),
            Condition::ThresholdBelow { value } => samples.last().is_some_and(|s| s.value < value),
            Condition::ThresholdEqual { value } => samples.last().is_some_and(|s| (s.value - value).abs() < f64::EPSILON),
            Condition::RateOfChange { delta, window_secs } => {
                if samples.len() < 2 {
                    return false;
                }
                let last = &samples[samples.len() - 1];
                let prev = &samples[samples.len() - 2];
                let elapsed = (last.timestamp - prev.timestamp).num_seconds();
                elapsed <= window_secs && (last.value - prev.value).abs() >= delta
            }
            Condition::Anomaly { z_threshold, min_samples } => {
                if samples.len() < min_samples.max(10) {
                    return false;
                }
                let values: Vec<f64> = samples.iter().map(|s| s.value).collect();
                let mean = values.iter().sum::<f64>() / values.len() as f64;
                let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
                let stddev = variance.sqrt();
                if stddev == 0.0 {
                    return false;
                }
                let latest = *values.last().unwrap();
                ((latest - mean) / stddev).abs() >= z_threshold
            }
            Condition::AbsenceOfData { for_secs } => match samples.last() {
                None => true,
                Some(s) => (now - s.timestamp).num_seconds() >= for_secs,
            },
        }
    }

    /// Called only once a rule has actually transitioned to firing — the
    /// silence check already gated that transition in `evaluate_rule`.
    async fn route_and_notify(&self, rule: &AlertRule, alert: &Alert) {
        let routes = match self.routes.list_ordered().await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "failed to list routes");
                return;
            }
        };
        let channel_ids = resolve_channels(&routes, &rule.labels);
        for channel_id in channel_ids {
            let channel = match self.channels.get(channel_id).await {
                Ok(Some(c)) => c,
                Ok(None) => {
                    warn!(channel = %channel_id, "route referenced unknown channel");
                    continue;
                }
                Err(e) => {
                    warn!(error = %e, "failed to load channel");
                    continue;
                }
            };
            if let Err(e) = self.notifier.notify(&channel, alert, &rule.name).await {
                warn!(channel = %channel.name, error = %e, "notification dispatch failed");
            }
        }
    }

    async fn run_escalations(&self) {
        let active = match self.alerts.list_active().await {
            Ok(a) => a,
            Err(e) => {
                warn!(error = %e, "failed to list active alerts for escalation");
                return;
            }
        };
        let now = self.clock.now();
        for alert in active {
            if alert.state != AlertState::Firing {
                continue;
            }
            let rule = match self.rules.get(alert.rule_id).await {
                Ok(Some(r)) => r,
                _ => continue,
            };
            let Ok(Some(policy)) = self.escalations.policy_for_rule(rule.id).await else {
                continue;
            };
            let elapsed = (now - alert.started_at).num_seconds();
            if let Some((level, step)) = policy.due_step(alert.escalation_level, elapsed) {
                for channel_id in &step.channel_ids {
                    if let Ok(Some(channel)) = self.channels.get(*channel_id).await {
                        let _ = self.notifier.notify(&channel, &alert, &rule.name).await;
                    }
                }
                let mut alert = alert;
                alert.escalation_level = level + 1;
                let _ = self.alerts.put(alert.clone()).await;
                let _ = self
                    .escalations
                    .put_state(EscalationState {
                        alert_id: alert.id,
                        policy_id: policy.id,
                        level: level + 1,
                        last_escalated_at: now,
                    })
                    .await;
            }
        }
    }

    pub async fn acknowledge(&self, alert_id: Id) -> Result<(), AlertError> {
        let mut all = self.alerts.list_all().await.map_err(|e| AlertError::Store(e.to_string()))?;
        let alert = all.iter_mut().find(|a| a.id == alert_id).ok_or(AlertError::AlertNotFound(alert_id))?;
        alert.state = AlertState::Acknowledged;
        alert.acknowledged_at = Some(self.clock.now());
        self.alerts.put(alert.clone()).await.map_err(|e| AlertError::Store(e.to_string()))
    }

    pub async fn silence(&self, matchers: Tags, duration: chrono::Duration, created_by: String) -> Result<Id, AlertError> {
        let now = self.clock.now();
        let silence = silence::Silence {
            id: Id::new(),
            matchers,
            starts_at: now,
            ends_at: now + duration,
            created_by,
            comment: String::new(),
        };
        let id = silence.id;
        self.silences.put(silence).await.map_err(|e| AlertError::Store(e.to_string()))?;
        Ok(id)
    }
}
