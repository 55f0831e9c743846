use crate::cli::ConnectionArgs;
use crate::error::SqlChatError;
use crate::validation::ValidatorKind;
use directories::ProjectDirs;
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_PORT: u16 = 5439;
pub const DEFAULT_SCHEMA: &str = "public";
pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_MODEL_ID: &str = "anthropic.claude-3-5-sonnet-20241022-v2:0";
pub const DEFAULT_MAX_TOKENS: u32 = 4096;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_ROWS: usize = 1000;
pub const DEFAULT_MAX_SCHEMA_TABLES: usize = 100;
pub const DEFAULT_POOL_MIN: u32 = 1;
pub const DEFAULT_POOL_MAX: u32 = 10;
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_MODEL_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Top-level application configuration.
#[derive(Debug)]
pub struct AppConfig {
    pub model: ModelConfig,
    pub warehouse: WarehouseConfig,
    pub pool: PoolConfig,
    pub query: QueryConfig,
    pub verbose: bool,
    pub show_secrets: bool,
}

#[derive(Debug)]
pub struct ModelConfig {
    pub model_id: String,
    pub region: String,
    pub endpoint: Option<String>,
    pub api_key: Option<SecretString>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub request_timeout_secs: u64,
}

#[derive(Debug)]
pub struct WarehouseConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: SecretString,
    pub ssl: bool,
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub min_size: u32,
    pub max_size: u32,
    /// How long a request waits for a free connection before giving up.
    pub acquire_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct QueryConfig {
    pub target_schema: String,
    pub statement_timeout_secs: u64,
    pub max_result_rows: usize,
    pub max_schema_tables: usize,
    pub validator: ValidatorKind,
}

// --- TOML config file structs ---

#[derive(Debug, Deserialize, Default)]
struct TomlConfig {
    #[serde(default)]
    defaults: TomlDefaults,
    #[serde(default)]
    profiles: HashMap<String, TomlProfile>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlDefaults {
    timeout: Option<u64>,
    row_limit: Option<usize>,
    max_schema_tables: Option<usize>,
    pool_min: Option<u32>,
    pool_max: Option<u32>,
    acquire_timeout: Option<u64>,
    validator: Option<ValidatorKind>,
    verbose: Option<bool>,
}

#[derive(Debug, Deserialize, Default, Clone)]
struct TomlProfile {
    host: Option<String>,
    port: Option<u16>,
    database: Option<String>,
    user: Option<String>,
    password: Option<String>,
    password_env: Option<String>,
    ssl: Option<bool>,
    schema: Option<String>,
    model_id: Option<String>,
    region: Option<String>,
    endpoint: Option<String>,
    api_key: Option<String>,
    api_key_env: Option<String>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
}

/// Config path resolution result: explicit vs auto-resolved paths.
struct ResolvedConfigPath {
    path: PathBuf,
    /// true if user explicitly specified via --config or SQLCHAT_CONFIG
    explicit: bool,
}

/// Resolve the config file path: --config flag > env var > platform default.
fn resolve_config_path(cli_config: Option<&PathBuf>) -> Option<ResolvedConfigPath> {
    if let Some(path) = cli_config {
        return Some(ResolvedConfigPath { path: path.clone(), explicit: true });
    }
    if let Some(path) = env_non_empty("SQLCHAT_CONFIG") {
        return Some(ResolvedConfigPath { path: PathBuf::from(path), explicit: true });
    }
    ProjectDirs::from("", "", "sqlchat").map(|dirs| ResolvedConfigPath {
        path: dirs.config_dir().join("config.toml"),
        explicit: false,
    })
}

/// Load and parse the TOML config file (if it exists).
fn load_toml_config(resolved: Option<&ResolvedConfigPath>) -> Result<TomlConfig, SqlChatError> {
    let Some(resolved) = resolved else {
        return Ok(TomlConfig::default());
    };

    if !resolved.path.exists() {
        if resolved.explicit {
            return Err(SqlChatError::Config {
                message: format!("config file not found: {}", resolved.path.display()),
            });
        }
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(&resolved.path).map_err(|e| SqlChatError::Config {
        message: format!("cannot read config file {}: {}", resolved.path.display(), e),
    })?;

    toml::from_str(&content).map_err(|e| SqlChatError::Config {
        message: format!("invalid config file {}: {}", resolved.path.display(), e),
    })
}

/// `Some(value)` only when the value is present and not empty.
pub fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}

/// Read an environment variable, treating empty as unset.
pub fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>, SqlChatError> {
    env_non_empty(key)
        .map(|raw| {
            raw.parse::<T>().map_err(|_| SqlChatError::Config {
                message: format!("invalid value for {}: '{}'", key, raw),
            })
        })
        .transpose()
}

fn env_bool(key: &str) -> Option<bool> {
    env_non_empty(key).map(|v| v.eq_ignore_ascii_case("true") || v == "1")
}

/// Resolve a secret from env indirection (e.g. `password_env = "MY_SECRET"`), then a standard env var.
fn resolve_secret(env_key: Option<&str>, fallback_env: &str) -> Option<SecretString> {
    if let Some(key) = env_key
        && let Some(val) = env_non_empty(key)
    {
        return Some(SecretString::from(val));
    }
    env_non_empty(fallback_env).map(SecretString::from)
}

fn required(value: Option<String>, what: &str) -> Result<String, SqlChatError> {
    value.ok_or_else(|| SqlChatError::Config {
        message: format!("no {} specified: use a flag, profile, or environment variable", what),
    })
}

/// Build AppConfig. Each field resolves independently:
/// CLI flag / SQLCHAT_* env > TOML profile > standard env > TOML defaults > built-in default.
pub fn load(
    args: &ConnectionArgs,
    verbose: bool,
    show_secrets: bool,
    config_path: Option<&PathBuf>,
) -> Result<AppConfig, SqlChatError> {
    let resolved_path = resolve_config_path(config_path);
    let toml_config = load_toml_config(resolved_path.as_ref())?;

    let profile = args
        .profile
        .as_ref()
        .map(|name| {
            toml_config.profiles.get(name).cloned().ok_or_else(|| SqlChatError::Config {
                message: format!("profile '{}' not found in config file", name),
            })
        })
        .transpose()?
        .unwrap_or_default();
    let defaults = &toml_config.defaults;

    // --- warehouse ---
    let host = required(
        non_empty(args.host.as_deref())
            .or_else(|| non_empty(profile.host.as_deref()))
            .or_else(|| env_non_empty("REDSHIFT_HOST")),
        "warehouse host",
    )?;
    let database = required(
        non_empty(args.database.as_deref())
            .or_else(|| non_empty(profile.database.as_deref()))
            .or_else(|| env_non_empty("REDSHIFT_DATABASE")),
        "database",
    )?;
    let user = required(
        non_empty(args.user.as_deref())
            .or_else(|| non_empty(profile.user.as_deref()))
            .or_else(|| env_non_empty("REDSHIFT_USER")),
        "database user",
    )?;
    let password = non_empty(args.password.as_deref())
        .or_else(|| non_empty(profile.password.as_deref()))
        .map(SecretString::from)
        .or_else(|| resolve_secret(profile.password_env.as_deref(), "REDSHIFT_PASSWORD"))
        .ok_or_else(|| SqlChatError::Config {
            message: "no database password specified".to_string(),
        })?;
    let port = match args.port.or(profile.port) {
        Some(p) => p,
        None => env_parse("REDSHIFT_PORT")?.unwrap_or(DEFAULT_PORT),
    };
    let ssl = args
        .ssl
        .or(profile.ssl)
        .or_else(|| env_bool("REDSHIFT_SSL"))
        .unwrap_or(true);

    // --- model ---
    let model_id = non_empty(args.model.as_deref())
        .or_else(|| non_empty(profile.model_id.as_deref()))
        .or_else(|| env_non_empty("BEDROCK_MODEL_ID"))
        .unwrap_or_else(|| DEFAULT_MODEL_ID.to_string());
    let region = non_empty(args.region.as_deref())
        .or_else(|| non_empty(profile.region.as_deref()))
        .or_else(|| env_non_empty("AWS_REGION"))
        .unwrap_or_else(|| DEFAULT_REGION.to_string());
    let endpoint = non_empty(args.endpoint.as_deref())
        .or_else(|| non_empty(profile.endpoint.as_deref()));
    let api_key = non_empty(args.api_key.as_deref())
        .or_else(|| non_empty(profile.api_key.as_deref()))
        .map(SecretString::from)
        .or_else(|| resolve_secret(profile.api_key_env.as_deref(), "AWS_BEARER_TOKEN_BEDROCK"));
    if api_key.is_none() && endpoint.is_none() {
        return Err(SqlChatError::Config {
            message: "no Bedrock API key specified: set AWS_BEARER_TOKEN_BEDROCK or --api-key"
                .to_string(),
        });
    }
    let max_tokens = match args.max_tokens.or(profile.max_tokens) {
        Some(v) => v,
        None => env_parse("BEDROCK_MAX_TOKENS")?.unwrap_or(DEFAULT_MAX_TOKENS),
    };
    let temperature = match args.temperature.or(profile.temperature) {
        Some(v) => v,
        None => env_parse("BEDROCK_TEMPERATURE")?.unwrap_or(0.0),
    };

    // --- query limits ---
    let target_schema = non_empty(args.schema.as_deref())
        .or_else(|| non_empty(profile.schema.as_deref()))
        .or_else(|| env_non_empty("REDSHIFT_SCHEMA"))
        .unwrap_or_else(|| DEFAULT_SCHEMA.to_string());
    let statement_timeout_secs = match args.timeout {
        Some(v) => v,
        None => env_parse("MAX_QUERY_TIMEOUT")?
            .or(defaults.timeout)
            .unwrap_or(DEFAULT_TIMEOUT_SECS),
    };
    let max_result_rows = match args.limit {
        Some(v) => v,
        None => env_parse("MAX_RESULT_ROWS")?
            .or(defaults.row_limit)
            .unwrap_or(DEFAULT_MAX_ROWS),
    };
    let validator = match non_empty(args.validator.as_deref()) {
        Some(raw) => raw
            .parse::<ValidatorKind>()
            .map_err(|message| SqlChatError::Config { message })?,
        None => defaults.validator.unwrap_or_default(),
    };

    let pool = PoolConfig {
        min_size: defaults.pool_min.unwrap_or(DEFAULT_POOL_MIN),
        max_size: defaults.pool_max.unwrap_or(DEFAULT_POOL_MAX),
        acquire_timeout_secs: defaults.acquire_timeout.unwrap_or(DEFAULT_ACQUIRE_TIMEOUT_SECS),
    };
    if pool.max_size == 0 || pool.min_size > pool.max_size {
        return Err(SqlChatError::Config {
            message: format!(
                "invalid pool size: min {} must not exceed max {} (max must be at least 1)",
                pool.min_size, pool.max_size
            ),
        });
    }
    if statement_timeout_secs == 0 {
        // statement_timeout = 0 disables the server-side limit.
        return Err(SqlChatError::Config {
            message: "statement timeout must be at least 1 second".to_string(),
        });
    }
    if max_result_rows == 0 {
        return Err(SqlChatError::Config {
            message: "row limit must be at least 1".to_string(),
        });
    }

    let verbose = verbose || defaults.verbose.unwrap_or(false);

    Ok(AppConfig {
        model: ModelConfig {
            model_id,
            region,
            endpoint,
            api_key,
            max_tokens,
            temperature,
            request_timeout_secs: DEFAULT_MODEL_REQUEST_TIMEOUT_SECS,
        },
        warehouse: WarehouseConfig {
            host,
            port,
            database,
            user,
            password,
            ssl,
        },
        pool,
        query: QueryConfig {
            target_schema,
            statement_timeout_secs,
            max_result_rows,
            max_schema_tables: defaults
                .max_schema_tables
                .unwrap_or(DEFAULT_MAX_SCHEMA_TABLES),
            validator,
        },
        verbose,
        show_secrets,
    })
}
