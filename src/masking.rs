use crate::config::AppConfig;
use secrecy::{ExposeSecret, SecretString};

/// Format a secret value, respecting the show_secrets flag.
pub fn format_secret(secret: &SecretString, show_secrets: bool) -> String {
    if show_secrets {
        secret.expose_secret().to_string()
    } else {
        "[REDACTED]".to_string()
    }
}

/// Format an optional secret value.
pub fn format_optional_secret(secret: Option<&SecretString>, show_secrets: bool) -> String {
    match secret {
        Some(s) => format_secret(s, show_secrets),
        None => "(not set)".to_string(),
    }
}

/// Effective settings as display pairs, with credentials masked unless requested.
pub fn describe_config(config: &AppConfig) -> Vec<(&'static str, String)> {
    let show = config.show_secrets;
    vec![
        ("warehouse_host", config.warehouse.host.clone()),
        ("warehouse_port", config.warehouse.port.to_string()),
        ("database", config.warehouse.database.clone()),
        ("user", config.warehouse.user.clone()),
        ("password", format_secret(&config.warehouse.password, show)),
        ("ssl", config.warehouse.ssl.to_string()),
        ("schema", config.query.target_schema.clone()),
        ("model_id", config.model.model_id.clone()),
        ("region", config.model.region.clone()),
        ("api_key", format_optional_secret(config.model.api_key.as_ref(), show)),
        ("statement_timeout_secs", config.query.statement_timeout_secs.to_string()),
        ("max_result_rows", config.query.max_result_rows.to_string()),
        (
            "pool_size",
            format!("{}..{}", config.pool.min_size, config.pool.max_size),
        ),
    ]
}
