use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use forge::alerts::notifier::LogNotifier;
use forge::alerts::rule::{AlertRule, Condition, Severity};
use forge::alerts::silence::Silence;
use forge::alerts::{AlertEngine, AlertEngineConfig};
use forge::clock::{Clock, FixedClock};
use forge::ids::Id;
use forge::metrics::types::{MetricKind, MetricSample, Tags};
use forge::metrics::{MetricPipeline, MetricPipelineConfig};
use forge::store::memory::{
    InMemoryAlertRuleStore, InMemoryAlertStore, InMemoryChannelStore, InMemoryEscalationStore, InMemoryMetricStore,
    InMemoryRouteStore, InMemorySilenceStore,
};

fn rule(for_secs: i64) -> AlertRule {
    AlertRule {
        id: Id::new(),
        name: "cpu-high".into(),
        metric_name: "cpu".into(),
        tags: Tags::new(),
        condition: Condition::ThresholdAbove { value: 90.0 },
        severity: Severity::Critical,
        for_secs,
        enabled: true,
        labels: Tags::new(),
    }
}

#[tokio::test]
async fn an_alert_goes_pending_then_firing_once_for_secs_elapses() {
    let start = Utc::now();
    let clock = Arc::new(FixedClock::new(start));

    let metrics = MetricPipeline::new(
        Arc::new(InMemoryMetricStore::new()),
        clock.clone() as Arc<dyn Clock>,
        MetricPipelineConfig { buffer_capacity: 100, flush_interval: Duration::from_secs(3600), retention_sweep_interval: Duration::from_secs(3600) },
    );

    let alerts = Arc::new(InMemoryAlertStore::new());
    let engine = AlertEngine::new(
        Arc::new(InMemoryAlertRuleStore::new()),
        alerts.clone(),
        Arc::new(InMemorySilenceStore::new()),
        Arc::new(InMemoryChannelStore::new()),
        Arc::new(InMemoryRouteStore::new()),
        Arc::new(InMemoryEscalationStore::new()),
        metrics.clone(),
        Arc::new(LogNotifier),
        clock.clone() as Arc<dyn Clock>,
        AlertEngineConfig { eval_interval: Duration::from_secs(3600), escalation_interval: Duration::from_secs(3600) },
    );

    let rule = rule(60);
    metrics
        .record(MetricSample { name: "cpu".into(), kind: MetricKind::Gauge, value: 95.0, tags: Tags::new(), timestamp: clock.now() })
        .unwrap();

    engine.evaluate_rule(&rule).await.unwrap();
    clock.advance(chrono::Duration::seconds(61));
    engine.evaluate_rule(&rule).await.unwrap();

    use forge::store::AlertStore as _;
    let stored = alerts.get_by_fingerprint(&rule.fingerprint()).await.unwrap().unwrap();
    assert_eq!(stored.state, forge::alerts::state::AlertState::Firing);
}

#[tokio::test]
async fn an_alert_resolves_once_the_condition_stops_holding() {
    let start = Utc::now();
    let clock = Arc::new(FixedClock::new(start));

    let metrics = MetricPipeline::new(
        Arc::new(InMemoryMetricStore::new()),
        clock.clone() as Arc<dyn Clock>,
        MetricPipelineConfig { buffer_capacity: 100, flush_interval: Duration::from_secs(3600), retention_sweep_interval: Duration::from_secs(3600) },
    );
    let alerts = Arc::new(InMemoryAlertStore::new());
    let engine = AlertEngine::new(
        Arc::new(InMemoryAlertRuleStore::new()),
        alerts.clone(),
        Arc::new(InMemorySilenceStore::new()),
        Arc::new(InMemoryChannelStore::new()),
        Arc::new(InMemoryRouteStore::new()),
        Arc::new(InMemoryEscalationStore::new()),
        metrics.clone(),
        Arc::new(LogNotifier),
        clock.clone() as Arc<dyn Clock>,
        AlertEngineConfig { eval_interval: Duration::from_secs(3600), escalation_interval: Duration::from_secs(3600) },
    );

    let rule = rule(0);
    metrics
        .record(MetricSample { name: "cpu".into(), kind: MetricKind::Gauge, value: 95.0, tags: Tags::new(), timestamp: clock.now() })
        .unwrap();
    engine.evaluate_rule(&rule).await.unwrap();

    clock.advance(chrono::Duration::seconds(5));
    metrics
        .record(MetricSample { name: "cpu".into(), kind: MetricKind::Gauge, value: 10.0, tags: Tags::new(), timestamp: clock.now() })
        .unwrap();
    engine.evaluate_rule(&rule).await.unwrap();

    use forge::store::AlertStore as _;
    let stored = alerts.get_by_fingerprint(&rule.fingerprint()).await.unwrap().unwrap();
    assert_eq!(stored.state, forge::alerts::state::AlertState::Resolved);
}

#[tokio::test]
async fn an_alert_matching_an_active_silence_is_created_silenced_and_never_fires() {
    let start = Utc::now();
    let clock = Arc::new(FixedClock::new(start));

    let metrics = MetricPipeline::new(
        Arc::new(InMemoryMetricStore::new()),
        clock.clone() as Arc<dyn Clock>,
        MetricPipelineConfig { buffer_capacity: 100, flush_interval: Duration::from_secs(3600), retention_sweep_interval: Duration::from_secs(3600) },
    );
    let alerts = Arc::new(InMemoryAlertStore::new());
    let silences = Arc::new(InMemorySilenceStore::new());

    let mut labels = Tags::new();
    labels.insert("service".into(), "api".into());
    let mut rule = rule(0);
    rule.labels = labels.clone();

    use forge::store::SilenceStore as _;
    silences
        .put(Silence {
            id: Id::new(),
            matchers: labels,
            starts_at: clock.now() - chrono::Duration::seconds(10),
            ends_at: clock.now() + chrono::Duration::seconds(3600),
            created_by: "test".into(),
            comment: String::new(),
        })
        .await
        .unwrap();

    let engine = AlertEngine::new(
        Arc::new(InMemoryAlertRuleStore::new()),
        alerts.clone(),
        silences,
        Arc::new(InMemoryChannelStore::new()),
        Arc::new(InMemoryRouteStore::new()),
        Arc::new(InMemoryEscalationStore::new()),
        metrics.clone(),
        Arc::new(LogNotifier),
        clock.clone() as Arc<dyn Clock>,
        AlertEngineConfig { eval_interval: Duration::from_secs(3600), escalation_interval: Duration::from_secs(3600) },
    );

    metrics
        .record(MetricSample { name: "cpu".into(), kind: MetricKind::Gauge, value: 95.0, tags: Tags::new(), timestamp: clock.now() })
        .unwrap();
    engine.evaluate_rule(&rule).await.unwrap();

    use forge::store::AlertStore as _;
    let stored = alerts.get_by_fingerprint(&rule.fingerprint()).await.unwrap().unwrap();
    assert_eq!(stored.state, forge::alerts::state::AlertState::Silenced);

    // Stays silenced on the next evaluation too, never reaching firing.
    clock.advance(chrono::Duration::seconds(61));
    engine.evaluate_rule(&rule).await.unwrap();
    let stored = alerts.get_by_fingerprint(&rule.fingerprint()).await.unwrap().unwrap();
    assert_eq!(stored.state, forge::alerts::state::AlertState::Silenced);
}
