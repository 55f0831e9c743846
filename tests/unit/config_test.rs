use secrecy::ExposeSecret;
use sqlchat::cli::ConnectionArgs;
use sqlchat::config::{
    DEFAULT_MAX_ROWS, DEFAULT_MODEL_ID, DEFAULT_PORT, DEFAULT_SCHEMA, DEFAULT_TIMEOUT_SECS,
    env_non_empty, load, non_empty,
};
use sqlchat::error::SqlChatError;
use sqlchat::validation::ValidatorKind;
use std::path::PathBuf;
use std::sync::Mutex;

// --- Env var test infrastructure ---

/// Static mutex to serialize tests that touch process env vars.
static ENV_MUTEX: Mutex<()> = Mutex::new(());

/// Standard variables `load` falls back to. Cleared before every test.
const STD_VARS: &[&str] = &[
    "REDSHIFT_HOST",
    "REDSHIFT_PORT",
    "REDSHIFT_DATABASE",
    "REDSHIFT_USER",
    "REDSHIFT_PASSWORD",
    "REDSHIFT_SSL",
    "REDSHIFT_SCHEMA",
    "AWS_REGION",
    "AWS_BEARER_TOKEN_BEDROCK",
    "BEDROCK_MODEL_ID",
    "BEDROCK_MAX_TOKENS",
    "BEDROCK_TEMPERATURE",
    "MAX_QUERY_TIMEOUT",
    "MAX_RESULT_ROWS",
    "SQLCHAT_CONFIG",
];

/// RAII guard that sets env vars on creation and removes them on Drop.
/// Holds the ENV_MUTEX lock for its lifetime.
struct EnvGuard {
    keys: Vec<String>,
    _lock: std::sync::MutexGuard<'static, ()>,
}

impl EnvGuard {
    fn new(vars: &[(&str, &str)]) -> Self {
        let lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        for key in STD_VARS {
            // SAFETY: env var access is serialized by ENV_MUTEX
            unsafe { std::env::remove_var(key); }
        }
        for (key, val) in vars {
            // SAFETY: env var access is serialized by ENV_MUTEX
            unsafe { std::env::set_var(key, val); }
        }
        EnvGuard {
            keys: vars.iter().map(|(k, _)| k.to_string()).collect(),
            _lock: lock,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for key in &self.keys {
            // SAFETY: env var access is serialized by ENV_MUTEX
            unsafe { std::env::remove_var(key); }
        }
    }
}

/// Write a TOML config to a temp file and return its path.
fn write_temp_toml(name: &str, content: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("sqlchat-test");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(format!("{}-{}.toml", name, std::process::id()));
    std::fs::write(&path, content).unwrap();
    path
}

fn empty_config() -> PathBuf {
    write_temp_toml("empty", "")
}

fn full_args() -> ConnectionArgs {
    ConnectionArgs {
        host: Some("cluster.example.com".to_string()),
        database: Some("analytics".to_string()),
        user: Some("reporter".to_string()),
        password: Some("cli-password".to_string()),
        api_key: Some("cli-api-key".to_string()),
        ..Default::default()
    }
}

fn make_args(overrides: impl FnOnce(&mut ConnectionArgs)) -> ConnectionArgs {
    let mut args = ConnectionArgs::default();
    overrides(&mut args);
    args
}

fn config_error(result: Result<sqlchat::config::AppConfig, SqlChatError>) -> String {
    match result {
        Err(SqlChatError::Config { message }) => message,
        Err(other) => panic!("Expected Config error, got {:?}", other),
        Ok(_) => panic!("Expected Config error, got Ok"),
    }
}

// --- Helpers ---

#[test]
fn test_non_empty() {
    assert_eq!(non_empty(Some("x")), Some("x".to_string()));
    assert_eq!(non_empty(Some("")), None);
    assert_eq!(non_empty(None), None);
}

#[test]
fn test_env_non_empty_treats_empty_as_unset() {
    let _guard = EnvGuard::new(&[("REDSHIFT_HOST", "")]);
    assert_eq!(env_non_empty("REDSHIFT_HOST"), None);
}

// --- Defaults ---

#[test]
fn test_flags_only_uses_builtin_defaults() {
    let _guard = EnvGuard::new(&[]);
    let config = load(&full_args(), false, false, Some(&empty_config())).unwrap();

    assert_eq!(config.warehouse.host, "cluster.example.com");
    assert_eq!(config.warehouse.port, DEFAULT_PORT);
    assert_eq!(config.warehouse.database, "analytics");
    assert_eq!(config.warehouse.user, "reporter");
    assert_eq!(config.warehouse.password.expose_secret(), "cli-password");
    assert!(config.warehouse.ssl);
    assert_eq!(config.model.model_id, DEFAULT_MODEL_ID);
    assert_eq!(config.model.region, "us-east-1");
    assert_eq!(config.model.max_tokens, 4096);
    assert_eq!(config.model.temperature, 0.0);
    assert_eq!(
        config.model.api_key.as_ref().map(|k| k.expose_secret().to_string()),
        Some("cli-api-key".to_string())
    );
    assert_eq!(config.query.target_schema, DEFAULT_SCHEMA);
    assert_eq!(config.query.statement_timeout_secs, DEFAULT_TIMEOUT_SECS);
    assert_eq!(config.query.max_result_rows, DEFAULT_MAX_ROWS);
    assert_eq!(config.query.validator, ValidatorKind::Keyword);
    assert_eq!(config.pool.min_size, 1);
    assert_eq!(config.pool.max_size, 10);
    assert!(!config.verbose);
}

// --- Standard env fallbacks ---

#[test]
fn test_standard_env_fallbacks() {
    let _guard = EnvGuard::new(&[
        ("REDSHIFT_HOST", "env-host"),
        ("REDSHIFT_PORT", "5440"),
        ("REDSHIFT_DATABASE", "env-db"),
        ("REDSHIFT_USER", "env-user"),
        ("REDSHIFT_PASSWORD", "env-password"),
        ("REDSHIFT_SSL", "false"),
        ("REDSHIFT_SCHEMA", "sales"),
        ("AWS_REGION", "eu-west-1"),
        ("AWS_BEARER_TOKEN_BEDROCK", "env-key"),
        ("BEDROCK_MODEL_ID", "anthropic.env-model"),
        ("MAX_QUERY_TIMEOUT", "45"),
        ("MAX_RESULT_ROWS", "250"),
    ]);

    let config = load(&ConnectionArgs::default(), false, false, Some(&empty_config())).unwrap();

    assert_eq!(config.warehouse.host, "env-host");
    assert_eq!(config.warehouse.port, 5440);
    assert_eq!(config.warehouse.database, "env-db");
    assert_eq!(config.warehouse.user, "env-user");
    assert_eq!(config.warehouse.password.expose_secret(), "env-password");
    assert!(!config.warehouse.ssl);
    assert_eq!(config.query.target_schema, "sales");
    assert_eq!(config.model.region, "eu-west-1");
    assert_eq!(config.model.model_id, "anthropic.env-model");
    assert_eq!(
        config.model.api_key.as_ref().map(|k| k.expose_secret().to_string()),
        Some("env-key".to_string())
    );
    assert_eq!(config.query.statement_timeout_secs, 45);
    assert_eq!(config.query.max_result_rows, 250);
}

#[test]
fn test_flag_overrides_standard_env() {
    let _guard = EnvGuard::new(&[
        ("REDSHIFT_HOST", "env-host"),
        ("MAX_RESULT_ROWS", "250"),
    ]);

    let mut args = full_args();
    args.limit = Some(10);
    let config = load(&args, false, false, Some(&empty_config())).unwrap();

    assert_eq!(config.warehouse.host, "cluster.example.com");
    assert_eq!(config.query.max_result_rows, 10);
}

#[test]
fn test_independent_field_resolution() {
    let _guard = EnvGuard::new(&[
        ("REDSHIFT_DATABASE", "env-db"),
        ("REDSHIFT_USER", "env-user"),
        ("REDSHIFT_PASSWORD", "env-password"),
        ("AWS_BEARER_TOKEN_BEDROCK", "env-key"),
    ]);

    let args = make_args(|a| a.host = Some("cli-host".to_string()));
    let config = load(&args, false, false, Some(&empty_config())).unwrap();

    assert_eq!(config.warehouse.host, "cli-host");
    assert_eq!(config.warehouse.database, "env-db");
    assert_eq!(config.warehouse.password.expose_secret(), "env-password");
}

#[test]
fn test_invalid_env_number_is_config_error() {
    let _guard = EnvGuard::new(&[("MAX_QUERY_TIMEOUT", "soon")]);
    let message = config_error(load(&full_args(), false, false, Some(&empty_config())));
    assert!(message.contains("MAX_QUERY_TIMEOUT"), "got: {}", message);
}

// --- Missing values ---

#[test]
fn test_missing_host_is_config_error() {
    let _guard = EnvGuard::new(&[]);
    let mut args = full_args();
    args.host = None;
    let message = config_error(load(&args, false, false, Some(&empty_config())));
    assert!(message.contains("warehouse host"), "got: {}", message);
}

#[test]
fn test_missing_password_is_config_error() {
    let _guard = EnvGuard::new(&[]);
    let mut args = full_args();
    args.password = None;
    let message = config_error(load(&args, false, false, Some(&empty_config())));
    assert!(message.contains("password"), "got: {}", message);
}

#[test]
fn test_missing_api_key_is_config_error() {
    let _guard = EnvGuard::new(&[]);
    let mut args = full_args();
    args.api_key = None;
    let message = config_error(load(&args, false, false, Some(&empty_config())));
    assert!(message.contains("AWS_BEARER_TOKEN_BEDROCK"), "got: {}", message);
}

#[test]
fn test_endpoint_without_api_key_allowed() {
    let _guard = EnvGuard::new(&[]);
    let mut args = full_args();
    args.api_key = None;
    args.endpoint = Some("http://127.0.0.1:8080".to_string());
    let config = load(&args, false, false, Some(&empty_config())).unwrap();
    assert!(config.model.api_key.is_none());
    assert_eq!(config.model.endpoint.as_deref(), Some("http://127.0.0.1:8080"));
}

#[test]
fn test_zero_row_limit_rejected() {
    let _guard = EnvGuard::new(&[]);
    let mut args = full_args();
    args.limit = Some(0);
    let message = config_error(load(&args, false, false, Some(&empty_config())));
    assert!(message.contains("row limit"), "got: {}", message);
}

#[test]
fn test_zero_timeout_rejected() {
    let _guard = EnvGuard::new(&[]);
    let mut args = full_args();
    args.timeout = Some(0);
    let message = config_error(load(&args, false, false, Some(&empty_config())));
    assert!(message.contains("statement timeout"), "got: {}", message);
}

#[test]
fn test_zero_timeout_from_env_rejected() {
    let _guard = EnvGuard::new(&[("MAX_QUERY_TIMEOUT", "0")]);
    let message = config_error(load(&full_args(), false, false, Some(&empty_config())));
    assert!(message.contains("statement timeout"), "got: {}", message);
}

#[test]
fn test_unknown_validator_rejected() {
    let _guard = EnvGuard::new(&[]);
    let mut args = full_args();
    args.validator = Some("regex".to_string());
    let message = config_error(load(&args, false, false, Some(&empty_config())));
    assert!(message.contains("unknown validator"), "got: {}", message);
}

// --- TOML config file ---

#[test]
fn test_toml_profile_values_used() {
    let _guard = EnvGuard::new(&[("PROFILE_DB_PASSWORD", "profile-secret")]);
    let path = write_temp_toml(
        "profile",
        r#"
[profiles.prod]
host = "prod.example.com"
port = 5441
database = "warehouse"
user = "analyst"
password_env = "PROFILE_DB_PASSWORD"
schema = "reporting"
region = "us-west-2"
api_key = "profile-key"
"#,
    );

    let args = make_args(|a| a.profile = Some("prod".to_string()));
    let config = load(&args, false, false, Some(&path)).unwrap();

    assert_eq!(config.warehouse.host, "prod.example.com");
    assert_eq!(config.warehouse.port, 5441);
    assert_eq!(config.warehouse.database, "warehouse");
    assert_eq!(config.warehouse.user, "analyst");
    assert_eq!(config.warehouse.password.expose_secret(), "profile-secret");
    assert_eq!(config.query.target_schema, "reporting");
    assert_eq!(config.model.region, "us-west-2");
}

#[test]
fn test_toml_profile_overrides_std_env() {
    let _guard = EnvGuard::new(&[
        ("REDSHIFT_HOST", "env-host"),
        ("REDSHIFT_DATABASE", "env-db"),
        ("REDSHIFT_USER", "env-user"),
        ("REDSHIFT_PASSWORD", "env-password"),
        ("AWS_BEARER_TOKEN_BEDROCK", "env-key"),
    ]);
    let path = write_temp_toml(
        "override",
        r#"
[profiles.test]
host = "toml-host"
"#,
    );

    let args = make_args(|a| a.profile = Some("test".to_string()));
    let config = load(&args, false, false, Some(&path)).unwrap();

    assert_eq!(config.warehouse.host, "toml-host");
    assert_eq!(config.warehouse.database, "env-db");
}

#[test]
fn test_flag_overrides_toml_profile() {
    let _guard = EnvGuard::new(&[]);
    let path = write_temp_toml(
        "flag-wins",
        r#"
[profiles.test]
host = "toml-host"
schema = "toml-schema"
"#,
    );

    let mut args = full_args();
    args.profile = Some("test".to_string());
    args.schema = Some("cli-schema".to_string());
    let config = load(&args, false, false, Some(&path)).unwrap();

    assert_eq!(config.warehouse.host, "cluster.example.com");
    assert_eq!(config.query.target_schema, "cli-schema");
}

#[test]
fn test_toml_defaults_section() {
    let _guard = EnvGuard::new(&[]);
    let path = write_temp_toml(
        "defaults",
        r#"
[defaults]
timeout = 90
row_limit = 500
pool_min = 2
pool_max = 4
validator = "parser"
verbose = true
"#,
    );

    let config = load(&full_args(), false, false, Some(&path)).unwrap();

    assert_eq!(config.query.statement_timeout_secs, 90);
    assert_eq!(config.query.max_result_rows, 500);
    assert_eq!(config.pool.min_size, 2);
    assert_eq!(config.pool.max_size, 4);
    assert_eq!(config.query.validator, ValidatorKind::Parser);
    assert!(config.verbose);
}

#[test]
fn test_std_env_overrides_toml_defaults() {
    let _guard = EnvGuard::new(&[("MAX_QUERY_TIMEOUT", "15")]);
    let path = write_temp_toml("env-over-defaults", "[defaults]\ntimeout = 90\n");

    let config = load(&full_args(), false, false, Some(&path)).unwrap();
    assert_eq!(config.query.statement_timeout_secs, 15);
}

#[test]
fn test_invalid_pool_size_rejected() {
    let _guard = EnvGuard::new(&[]);
    let path = write_temp_toml("bad-pool", "[defaults]\npool_min = 5\npool_max = 2\n");
    let message = config_error(load(&full_args(), false, false, Some(&path)));
    assert!(message.contains("invalid pool size"), "got: {}", message);
}

#[test]
fn test_profile_not_found() {
    let _guard = EnvGuard::new(&[]);
    let mut args = full_args();
    args.profile = Some("missing".to_string());
    let message = config_error(load(&args, false, false, Some(&empty_config())));
    assert!(message.contains("profile 'missing' not found"), "got: {}", message);
}

#[test]
fn test_explicit_config_file_must_exist() {
    let _guard = EnvGuard::new(&[]);
    let path = PathBuf::from("/nonexistent/sqlchat/config.toml");
    let message = config_error(load(&full_args(), false, false, Some(&path)));
    assert!(message.contains("config file not found"), "got: {}", message);
}

#[test]
fn test_malformed_toml_rejected() {
    let _guard = EnvGuard::new(&[]);
    let path = write_temp_toml("malformed", "[defaults\ntimeout = ");
    let message = config_error(load(&full_args(), false, false, Some(&path)));
    assert!(message.contains("invalid config file"), "got: {}", message);
}

// --- Dotenv ---

#[test]
fn test_dotenv_std_vars_participate() {
    let _guard = EnvGuard::new(&[]);

    let dir = std::env::temp_dir().join("sqlchat-dotenv-test");
    std::fs::create_dir_all(&dir).unwrap();
    let env_path = dir.join(".env");
    std::fs::write(&env_path, "REDSHIFT_HOST=dotenv-host\n").unwrap();

    dotenvy::from_path(&env_path).ok();

    let mut args = full_args();
    args.host = None;
    let config = load(&args, false, false, Some(&empty_config())).unwrap();
    assert_eq!(config.warehouse.host, "dotenv-host");

    // Cleanup
    unsafe { std::env::remove_var("REDSHIFT_HOST"); }
    std::fs::remove_file(&env_path).ok();
    std::fs::remove_dir(&dir).ok();
}
