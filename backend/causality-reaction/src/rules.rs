//! Rule model, pure evaluator, and the in-memory rule cache. The cache
//! is copy-on-refresh: a background refresh builds a brand-new snapshot
//! and swaps a pointer under a brief write lock, so readers never block
//! on a refresh in flight — the same `parking_lot::RwLock`-guarded swap
//! shape as `causality_dedup::Deduplicator`'s filter rotation.

use causality_contracts::Envelope;
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Contains,
    Exists,
}

impl std::str::FromStr for ConditionOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "eq" => Ok(ConditionOp::Eq),
            "ne" => Ok(ConditionOp::Ne),
            "gt" => Ok(ConditionOp::Gt),
            "gte" => Ok(ConditionOp::Gte),
            "lt" => Ok(ConditionOp::Lt),
            "lte" => Ok(ConditionOp::Lte),
            "contains" => Ok(ConditionOp::Contains),
            "exists" => Ok(ConditionOp::Exists),
            other => Err(format!("unknown condition operator: {other}")),
        }
    }
}

/// A single predicate evaluated against the envelope's JSON projection
/// (see [`envelope_to_value`]). `field` is a dot-path, e.g.
/// `payload.total` or `device_context.platform`.
#[derive(Debug, Clone)]
pub struct Condition {
    pub field: String,
    pub op: ConditionOp,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Webhook,
}

#[derive(Debug, Clone)]
pub struct Action {
    pub kind: ActionKind,
    pub webhook_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub id: Uuid,
    pub name: String,
    pub app_id: Option<String>,
    pub event_category: Option<String>,
    pub event_type: Option<String>,
    pub conditions: Vec<Condition>,
    pub actions: Vec<Action>,
    pub priority: i32,
    pub enabled: bool,
}

impl Rule {
    /// A rule matches when its optional scoping fields all match (absent
    /// is a wildcard) and every condition evaluates true. Pure: never
    /// panics, never errs — an unevaluable condition (missing field,
    /// type mismatch) is simply `false`.
    pub fn matches(&self, envelope: &Envelope, value: &Value) -> bool {
        let (category, event_type) = envelope.category_and_type();
        self.matches_scope(&envelope.app_id, category, &event_type, value)
    }

    /// The scoping + condition check, independent of `Envelope` so the
    /// alerting consumer can reuse it against a synthetic anomaly event
    /// (see `crate::alerting`) without this crate depending on a second
    /// event shape.
    pub fn matches_scope(
        &self,
        app_id: &str,
        category: &str,
        event_type: &str,
        value: &Value,
    ) -> bool {
        if !self.enabled {
            return false;
        }
        if let Some(expected_app_id) = &self.app_id {
            if expected_app_id != app_id {
                return false;
            }
        }
        if let Some(expected_category) = &self.event_category {
            if expected_category != category {
                return false;
            }
        }
        if let Some(expected_type) = &self.event_type {
            if expected_type != event_type {
                return false;
            }
        }
        self.conditions.iter().all(|c| evaluate_condition(c, value))
    }
}

fn evaluate_condition(condition: &Condition, value: &Value) -> bool {
    let field_value = lookup_path(value, &condition.field);
    match condition.op {
        ConditionOp::Exists => field_value.is_some(),
        ConditionOp::Eq => field_value == Some(&condition.value),
        ConditionOp::Ne => field_value != Some(&condition.value),
        ConditionOp::Gt | ConditionOp::Gte | ConditionOp::Lt | ConditionOp::Lte => {
            match (field_value.and_then(Value::as_f64), condition.value.as_f64()) {
                (Some(actual), Some(expected)) => match condition.op {
                    ConditionOp::Gt => actual > expected,
                    ConditionOp::Gte => actual >= expected,
                    ConditionOp::Lt => actual < expected,
                    ConditionOp::Lte => actual <= expected,
                    _ => unreachable!(),
                },
                _ => false,
            }
        }
        ConditionOp::Contains => match (field_value, condition.value.as_str()) {
            (Some(Value::String(actual)), Some(needle)) => actual.contains(needle),
            (Some(Value::Array(items)), Some(_)) => items.iter().any(|v| v == &condition.value),
            _ => false,
        },
    }
}

fn lookup_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |current, segment| {
        current.as_object()?.get(segment)
    })
}

/// Flatten the fields a rule condition can reference into one JSON value:
/// envelope scalars, device context, and the payload's own
/// `to_serializable_map` — the same per-variant flattening the warehouse
/// sink's Parquet encoder uses, rather than reflection over the payload
/// enum.
pub fn envelope_to_value(envelope: &Envelope) -> Value {
    let (category, event_type) = envelope.category_and_type();
    serde_json::json!({
        "app_id": envelope.app_id,
        "device_id": envelope.device_id,
        "timestamp_ms": envelope.timestamp_ms,
        "category": category,
        "event_type": event_type,
        "device_context": envelope.device_context,
        "payload": envelope.payload.to_serializable_map(),
    })
}

/// Copy-on-refresh in-memory rule cache.
#[derive(Clone)]
pub struct RuleCache {
    inner: Arc<RwLock<Arc<Vec<Rule>>>>,
}

impl RuleCache {
    pub fn new(initial: Vec<Rule>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(sorted_by_priority(initial)))),
        }
    }

    /// Readers take a stable `Arc` snapshot under a brief read lock and
    /// then evaluate against it without holding the lock.
    pub fn snapshot(&self) -> Arc<Vec<Rule>> {
        self.inner.read().clone()
    }

    /// Swap in a freshly-loaded rule set. Sorted once here so evaluation
    /// never has to re-sort (descending priority, ties by insertion/load
    /// order).
    pub fn refresh(&self, rules: Vec<Rule>) {
        let snapshot = Arc::new(sorted_by_priority(rules));
        *self.inner.write() = snapshot;
    }

    /// Rules whose scoping and conditions match this envelope, in
    /// descending-priority / insertion-order.
    pub fn matching(&self, envelope: &Envelope) -> Vec<Rule> {
        let snapshot = self.snapshot();
        let value = envelope_to_value(envelope);
        snapshot
            .iter()
            .filter(|rule| rule.matches(envelope, &value))
            .cloned()
            .collect()
    }
}

fn sorted_by_priority(mut rules: Vec<Rule>) -> Vec<Rule> {
    // `sort_by_key` is stable, so equal priorities keep their relative
    // (insertion) order — ties are broken by insertion order.
    rules.sort_by_key(|r| std::cmp::Reverse(r.priority));
    rules
}

#[cfg(test)]
mod tests {
    use super::*;
    use causality_contracts::Payload;

    fn sample_envelope(total: f64) -> Envelope {
        Envelope {
            id: "evt-1".into(),
            app_id: "demo".into(),
            device_id: "d1".into(),
            timestamp_ms: 1_700_000_000_000,
            correlation_id: None,
            idempotency_key: None,
            device_context: None,
            payload: Payload::CommercePurchaseComplete {
                order_id: "o1".into(),
                total,
                currency: "USD".into(),
            },
        }
    }

    fn rule(id: u128, priority: i32, event_type: Option<&str>) -> Rule {
        Rule {
            id: Uuid::from_u128(id),
            name: format!("rule-{id}"),
            app_id: None,
            event_category: None,
            event_type: event_type.map(String::from),
            conditions: vec![],
            actions: vec![],
            priority,
            enabled: true,
        }
    }

    #[test]
    fn matches_on_event_type_and_wildcard_app_id() {
        let envelope = sample_envelope(50.0);
        let r = rule(1, 0, Some("purchase_complete"));
        let value = envelope_to_value(&envelope);
        assert!(r.matches(&envelope, &value));
    }

    #[test]
    fn condition_on_payload_field_gates_the_match() {
        let envelope = sample_envelope(5.0);
        let mut r = rule(1, 0, Some("purchase_complete"));
        r.conditions.push(Condition {
            field: "payload.total".into(),
            op: ConditionOp::Gte,
            value: serde_json::json!(100.0),
        });
        let value = envelope_to_value(&envelope);
        assert!(!r.matches(&envelope, &value));

        let big_envelope = sample_envelope(150.0);
        let value = envelope_to_value(&big_envelope);
        assert!(r.matches(&big_envelope, &value));
    }

    #[test]
    fn disabled_rule_never_matches() {
        let envelope = sample_envelope(150.0);
        let mut r = rule(1, 0, Some("purchase_complete"));
        r.enabled = false;
        let value = envelope_to_value(&envelope);
        assert!(!r.matches(&envelope, &value));
    }

    #[test]
    fn cache_orders_by_descending_priority_then_insertion() {
        let cache = RuleCache::new(vec![
            rule(1, 0, Some("purchase_complete")),
            rule(2, 5, Some("purchase_complete")),
            rule(3, 5, Some("purchase_complete")),
        ]);
        let envelope = sample_envelope(150.0);
        let matched = cache.matching(&envelope);
        assert_eq!(matched.len(), 3);
        assert_eq!(matched[0].id, Uuid::from_u128(2));
        assert_eq!(matched[1].id, Uuid::from_u128(3));
        assert_eq!(matched[2].id, Uuid::from_u128(1));
    }

    #[test]
    fn refresh_swaps_the_snapshot_atomically() {
        let cache = RuleCache::new(vec![rule(1, 0, Some("purchase_complete"))]);
        let before = cache.snapshot();
        cache.refresh(vec![rule(2, 0, Some("purchase_complete"))]);
        let after = cache.snapshot();
        assert_eq!(before.len(), 1);
        assert_eq!(before[0].id, Uuid::from_u128(1));
        assert_eq!(after[0].id, Uuid::from_u128(2));
    }
}
