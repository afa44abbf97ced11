//! Anomaly configuration windows: each config owns a bounded, time-pruned
//! window of matching-envelope timestamps. Per-config state lives in a
//! `DashMap` keyed by config id — a concurrent map of entries each
//! carrying their own recency state, pruned lazily on access rather than
//! by a separate sweep task.
//!
//! `kind` distinguishes how the windowed aggregate is compared against
//! `threshold`:
//! - `Count` / `Rate` are spike detectors: they fire once on the upward
//!   crossing and re-arm only once the aggregate falls back under the
//!   threshold, so a sustained spike doesn't republish an anomaly event
//!   on every single envelope.
//! - `Threshold` is a continuous ceiling monitor: it fires on every fold
//!   while the window's count is at or above `threshold`, for configs
//!   that want a standing signal rather than an edge trigger.
//!
//! (This firing-behavior split is this implementation's own resolution,
//! recorded in DESIGN.md.)

use causality_contracts::Envelope;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnomalyKind {
    Threshold,
    Rate,
    Count,
}

impl std::str::FromStr for AnomalyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "threshold" => Ok(AnomalyKind::Threshold),
            "rate" => Ok(AnomalyKind::Rate),
            "count" => Ok(AnomalyKind::Count),
            other => Err(format!("unknown anomaly kind: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnomalyConfig {
    pub id: Uuid,
    pub kind: AnomalyKind,
    pub window: Duration,
    pub threshold: f64,
    pub enabled: bool,
    pub app_id: Option<String>,
    pub event_type: Option<String>,
}

impl AnomalyConfig {
    pub fn applies_to(&self, envelope: &Envelope) -> bool {
        if !self.enabled {
            return false;
        }
        if let Some(app_id) = &self.app_id {
            if app_id != &envelope.app_id {
                return false;
            }
        }
        if let Some(expected_type) = &self.event_type {
            let (category, event_type) = envelope.category_and_type();
            if expected_type != &event_type && expected_type != category {
                return false;
            }
        }
        true
    }
}

struct WindowState {
    events: VecDeque<i64>,
    armed: bool,
}

pub struct AnomalyEngine {
    configs: RwLock<Arc<Vec<AnomalyConfig>>>,
    windows: DashMap<Uuid, Mutex<WindowState>>,
}

impl AnomalyEngine {
    pub fn new(configs: Vec<AnomalyConfig>) -> Self {
        Self {
            configs: RwLock::new(Arc::new(configs)),
            windows: DashMap::new(),
        }
    }

    pub fn snapshot(&self) -> Arc<Vec<AnomalyConfig>> {
        self.configs.read().clone()
    }

    /// Swap in a freshly-loaded config set, same copy-on-refresh shape as
    /// [`crate::rules::RuleCache`]. Existing per-config window state is
    /// left alone; a config removed here simply stops accumulating
    /// (its entry is pruned lazily the next time `fold` walks the map,
    /// see `prune_removed`).
    pub fn refresh(&self, configs: Vec<AnomalyConfig>) {
        let ids: std::collections::HashSet<Uuid> = configs.iter().map(|c| c.id).collect();
        self.windows.retain(|id, _| ids.contains(id));
        *self.configs.write() = Arc::new(configs);
    }

    /// Fold `envelope` into every applicable config's window. Returns
    /// `(config_id, aggregate_value)` for configs whose aggregate crossed
    /// the threshold on this fold, so the caller can publish an anomaly
    /// event for each.
    pub fn fold(&self, envelope: &Envelope) -> Vec<(Uuid, f64)> {
        let configs = self.snapshot();
        let mut crossed = Vec::new();

        for config in configs.iter().filter(|c| c.applies_to(envelope)) {
            let entry = self
                .windows
                .entry(config.id)
                .or_insert_with(|| {
                    Mutex::new(WindowState {
                        events: VecDeque::new(),
                        armed: true,
                    })
                });
            let mut state = entry.lock();
            state.events.push_back(envelope.timestamp_ms);
            prune(&mut state.events, envelope.timestamp_ms, config.window);

            let aggregate = match config.kind {
                AnomalyKind::Count | AnomalyKind::Threshold => state.events.len() as f64,
                AnomalyKind::Rate => {
                    state.events.len() as f64 / config.window.as_secs_f64().max(1.0)
                }
            };
            let over = aggregate >= config.threshold;

            match config.kind {
                AnomalyKind::Threshold => {
                    if over {
                        crossed.push((config.id, aggregate));
                    }
                }
                AnomalyKind::Count | AnomalyKind::Rate => {
                    if over && state.armed {
                        crossed.push((config.id, aggregate));
                        state.armed = false;
                    } else if !over {
                        state.armed = true;
                    }
                }
            }
        }

        crossed
    }
}

/// Drop timestamps older than `window` relative to `now_ms`.
fn prune(events: &mut VecDeque<i64>, now_ms: i64, window: Duration) {
    let cutoff = now_ms - window.as_millis() as i64;
    while let Some(&front) = events.front() {
        if front < cutoff {
            events.pop_front();
        } else {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use causality_contracts::Payload;

    fn envelope(app_id: &str, timestamp_ms: i64) -> Envelope {
        Envelope {
            id: format!("evt-{timestamp_ms}"),
            app_id: app_id.into(),
            device_id: "d1".into(),
            timestamp_ms,
            correlation_id: None,
            idempotency_key: None,
            device_context: None,
            payload: Payload::SystemAppCrash {
                message: "oom".into(),
                stack_trace: None,
            },
        }
    }

    fn count_config(threshold: f64) -> AnomalyConfig {
        AnomalyConfig {
            id: Uuid::new_v4(),
            kind: AnomalyKind::Count,
            window: Duration::from_secs(60),
            threshold,
            enabled: true,
            app_id: None,
            event_type: Some("app_crash".into()),
        }
    }

    #[test]
    fn count_kind_crosses_once_at_threshold_and_rearms_after_reset() {
        let config = count_config(3.0);
        let id = config.id;
        let engine = AnomalyEngine::new(vec![config]);

        assert!(engine.fold(&envelope("demo", 0)).is_empty());
        assert!(engine.fold(&envelope("demo", 1_000)).is_empty());
        let crossed = engine.fold(&envelope("demo", 2_000));
        assert_eq!(crossed, vec![(id, 3.0)]);

        // Still at/above threshold but already fired: no re-fire until
        // the window prunes enough events to drop back under.
        assert!(engine.fold(&envelope("demo", 3_000)).is_empty());
    }

    #[test]
    fn threshold_kind_fires_on_every_fold_while_over() {
        let mut config = count_config(2.0);
        config.kind = AnomalyKind::Threshold;
        let id = config.id;
        let engine = AnomalyEngine::new(vec![config]);

        assert!(engine.fold(&envelope("demo", 0)).is_empty());
        assert_eq!(engine.fold(&envelope("demo", 1_000)), vec![(id, 2.0)]);
        assert_eq!(engine.fold(&envelope("demo", 2_000)), vec![(id, 3.0)]);
    }

    #[test]
    fn window_prunes_events_older_than_its_duration() {
        let config = count_config(2.0);
        let engine = AnomalyEngine::new(vec![config]);

        assert!(engine.fold(&envelope("demo", 0)).is_empty());
        // 70s later is outside the 60s window; the first event is
        // pruned, so this still doesn't cross with only 1 live event.
        assert!(engine.fold(&envelope("demo", 70_000)).is_empty());
    }

    #[test]
    fn config_scoped_to_a_different_app_id_never_applies() {
        let mut config = count_config(1.0);
        config.app_id = Some("other-app".into());
        let engine = AnomalyEngine::new(vec![config]);
        assert!(engine.fold(&envelope("demo", 0)).is_empty());
    }
}
