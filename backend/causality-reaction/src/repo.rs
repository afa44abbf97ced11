//! Read-side repository queries against the externally-owned `rules`,
//! `webhooks`, and `anomaly_configurations` tables. The reaction engine
//! reads these tables but never migrates them — their schema and CRUD
//! routes live in the admin UI.

use crate::anomaly::{AnomalyConfig, AnomalyKind};
use crate::rules::{Action, ActionKind, Condition, ConditionOp, Rule};
use serde::Deserialize;
use serde_json::Value;
use sqlx::PgPool;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Webhook {
    pub id: Uuid,
    pub name: String,
    pub url: String,
    pub auth_type: String,
    pub auth_config: Value,
    pub headers: HashMap<String, String>,
    pub timeout_ms: u64,
    pub enabled: bool,
    /// A per-webhook property rather than an outbox-global constant, so
    /// each webhook can tune its own retry budget independently.
    pub max_attempts: i32,
}

#[derive(sqlx::FromRow)]
struct RuleRow {
    id: Uuid,
    name: String,
    app_id: Option<String>,
    event_category: Option<String>,
    event_type: Option<String>,
    conditions: Value,
    actions: Value,
    priority: i32,
    enabled: bool,
}

#[derive(Deserialize)]
struct WireCondition {
    field: String,
    op: String,
    value: Value,
}

#[derive(Deserialize)]
struct WireAction {
    kind: String,
    webhook_id: Uuid,
}

fn parse_conditions(raw: Value) -> Vec<Condition> {
    let wire: Vec<WireCondition> = serde_json::from_value(raw).unwrap_or_default();
    wire.into_iter()
        .filter_map(|c| {
            ConditionOp::from_str(&c.op)
                .ok()
                .map(|op| Condition {
                    field: c.field,
                    op,
                    value: c.value,
                })
        })
        .collect()
}

fn parse_actions(raw: Value) -> Vec<Action> {
    let wire: Vec<WireAction> = serde_json::from_value(raw).unwrap_or_default();
    wire.into_iter()
        .filter_map(|a| match a.kind.as_str() {
            "webhook" => Some(Action {
                kind: ActionKind::Webhook,
                webhook_id: a.webhook_id,
            }),
            _ => None,
        })
        .collect()
}

impl From<RuleRow> for Rule {
    fn from(row: RuleRow) -> Self {
        Rule {
            id: row.id,
            name: row.name,
            app_id: row.app_id,
            event_category: row.event_category,
            event_type: row.event_type,
            conditions: parse_conditions(row.conditions),
            actions: parse_actions(row.actions),
            priority: row.priority,
            enabled: row.enabled,
        }
    }
}

/// All rules, enabled or not — the cache filters on `enabled` at match
/// time so a refresh sees a toggle immediately without needing its own
/// query variant.
pub async fn load_rules(pool: &PgPool) -> Result<Vec<Rule>, sqlx::Error> {
    let rows = sqlx::query_as::<_, RuleRow>(
        r#"
        SELECT id, name, app_id, event_category, event_type, conditions, actions,
               priority, enabled
        FROM rules
        ORDER BY priority DESC, created_at ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Rule::from).collect())
}

#[derive(sqlx::FromRow)]
struct AnomalyConfigRow {
    id: Uuid,
    kind: String,
    window_seconds: i64,
    threshold: f64,
    enabled: bool,
    app_id: Option<String>,
    event_type: Option<String>,
}

pub async fn load_anomaly_configs(pool: &PgPool) -> Result<Vec<AnomalyConfig>, sqlx::Error> {
    let rows = sqlx::query_as::<_, AnomalyConfigRow>(
        r#"
        SELECT id, kind, window_seconds, threshold, enabled, app_id, event_type
        FROM anomaly_configurations
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .filter_map(|row| {
            AnomalyKind::from_str(&row.kind).ok().map(|kind| AnomalyConfig {
                id: row.id,
                kind,
                window: Duration::from_secs(row.window_seconds.max(0) as u64),
                threshold: row.threshold,
                enabled: row.enabled,
                app_id: row.app_id,
                event_type: row.event_type,
            })
        })
        .collect())
}

#[derive(sqlx::FromRow)]
struct WebhookRow {
    id: Uuid,
    name: String,
    url: String,
    auth_type: String,
    auth_config: Value,
    headers: Value,
    timeout_ms: i64,
    enabled: bool,
    max_attempts: i32,
}

pub async fn get_webhook(pool: &PgPool, id: Uuid) -> Result<Option<Webhook>, sqlx::Error> {
    let row = sqlx::query_as::<_, WebhookRow>(
        r#"
        SELECT id, name, url, auth_type, auth_config, headers, timeout_ms, enabled, max_attempts
        FROM webhooks
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| Webhook {
        id: row.id,
        name: row.name,
        url: row.url,
        auth_type: row.auth_type,
        auth_config: row.auth_config,
        headers: serde_json::from_value(row.headers).unwrap_or_default(),
        timeout_ms: row.timeout_ms.max(0) as u64,
        enabled: row.enabled,
        max_attempts: row.max_attempts,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_conditions_skips_unknown_operators() {
        let raw = serde_json::json!([
            {"field": "payload.total", "op": "gte", "value": 100.0},
            {"field": "payload.total", "op": "bogus", "value": 1},
        ]);
        let parsed = parse_conditions(raw);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].field, "payload.total");
    }

    #[test]
    fn parse_actions_skips_unknown_kinds() {
        let id = Uuid::new_v4();
        let raw = serde_json::json!([
            {"kind": "webhook", "webhook_id": id},
            {"kind": "email", "webhook_id": id},
        ]);
        let parsed = parse_actions(raw);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].webhook_id, id);
    }
}
