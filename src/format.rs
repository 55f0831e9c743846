use crate::error::SqlChatError;
use crate::pipeline::HealthReport;
use crate::schema::SchemaSnapshot;
use serde::Serialize;

/// Encode any serializable value as TOON.
pub fn to_toon<T: Serialize>(value: &T) -> Result<String, SqlChatError> {
    let json = serde_json::to_value(value).map_err(|e| SqlChatError::FormattingFailed {
        message: e.to_string(),
    })?;
    toon_format::encode_default(&json).map_err(|e| SqlChatError::FormattingFailed {
        message: e.to_string(),
    })
}

/// Encode any serializable value as pretty JSON.
pub fn to_json<T: Serialize>(value: &T) -> Result<String, SqlChatError> {
    serde_json::to_string_pretty(value).map_err(|e| SqlChatError::FormattingFailed {
        message: e.to_string(),
    })
}

/// Schema as a `tables` list of `{ table, columns }`, columns rendered `name type [null]`.
pub fn schema_view(schema: &SchemaSnapshot) -> serde_json::Value {
    let tables = schema
        .tables()
        .iter()
        .map(|t| {
            let columns = t
                .columns
                .iter()
                .map(|c| {
                    let null = if c.nullable { " null" } else { "" };
                    serde_json::Value::String(format!("{} {}{}", c.name, c.data_type, null))
                })
                .collect::<Vec<_>>();
            serde_json::json!({ "table": t.qualified_name, "columns": columns })
        })
        .collect::<Vec<_>>();
    serde_json::json!({ "tables": tables })
}

/// Health probe results followed by the effective settings.
pub fn health_view(report: &HealthReport, settings: &[(&'static str, String)]) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    map.insert("model".to_string(), status_value(report.model));
    map.insert("warehouse".to_string(), status_value(report.warehouse));
    for (key, value) in settings {
        map.insert((*key).to_string(), serde_json::Value::String(value.clone()));
    }
    serde_json::Value::Object(map)
}

fn status_value(ok: bool) -> serde_json::Value {
    serde_json::Value::String(if ok { "ok" } else { "unavailable" }.to_string())
}
