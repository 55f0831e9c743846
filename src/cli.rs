use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "sqlchat", about = "Ask questions of a Redshift warehouse in plain language")]
pub struct Cli {
    /// Path to config file
    #[arg(short = 'c', long, global = true, env = "SQLCHAT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Emit debug diagnostics to stderr
    #[arg(short = 'v', long, global = true, env = "SQLCHAT_VERBOSE")]
    pub verbose: bool,

    /// Disable credential masking in `health` output
    #[arg(long, global = true, env = "SQLCHAT_SHOW_SECRETS")]
    pub show_secrets: bool,

    /// Print JSON instead of TOON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Answer one or more questions (several questions run concurrently)
    Ask(AskArgs),

    /// Print the cached warehouse schema
    Schema,

    /// Check model and warehouse connectivity
    Health,
}

#[derive(Args, Debug)]
pub struct AskArgs {
    /// Natural-language question(s)
    #[arg(required = true, num_args = 1.., value_parser = parse_question)]
    pub questions: Vec<String>,

    /// Conversation identifier echoed in the response (generated if omitted)
    #[arg(long = "conversation-id")]
    pub conversation_id: Option<String>,
}

#[derive(Args, Debug, Default, Clone)]
pub struct ConnectionArgs {
    /// Config file profile name
    #[arg(short = 'P', long, global = true, env = "SQLCHAT_PROFILE")]
    pub profile: Option<String>,

    /// Warehouse hostname
    #[arg(long, global = true, env = "SQLCHAT_HOST")]
    pub host: Option<String>,

    /// Warehouse port (default: 5439)
    #[arg(long, global = true, env = "SQLCHAT_PORT")]
    pub port: Option<u16>,

    /// Database name
    #[arg(short = 'd', long, global = true, env = "SQLCHAT_DATABASE")]
    pub database: Option<String>,

    /// Database user
    #[arg(short = 'u', long, global = true, env = "SQLCHAT_USER")]
    pub user: Option<String>,

    /// Database password
    #[arg(short = 'p', long, global = true, env = "SQLCHAT_PASSWORD")]
    pub password: Option<String>,

    /// Require TLS (default: true)
    #[arg(long, global = true, env = "SQLCHAT_SSL")]
    pub ssl: Option<bool>,

    /// Schema whose tables are offered to the model (default: public)
    #[arg(short = 's', long, global = true, env = "SQLCHAT_SCHEMA")]
    pub schema: Option<String>,

    /// Bedrock model identifier
    #[arg(short = 'm', long, global = true, env = "SQLCHAT_MODEL_ID")]
    pub model: Option<String>,

    /// AWS region of the Bedrock runtime
    #[arg(long, global = true, env = "SQLCHAT_REGION")]
    pub region: Option<String>,

    /// Bedrock API key
    #[arg(long, global = true, env = "SQLCHAT_API_KEY")]
    pub api_key: Option<String>,

    /// Override the Bedrock runtime endpoint URL
    #[arg(long, global = true, env = "SQLCHAT_MODEL_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Max tokens per model response (default: 4096)
    #[arg(long, global = true, env = "SQLCHAT_MAX_TOKENS")]
    pub max_tokens: Option<u32>,

    /// Sampling temperature (default: 0.0)
    #[arg(long, global = true, env = "SQLCHAT_TEMPERATURE")]
    pub temperature: Option<f32>,

    /// Statement timeout in seconds (default: 30)
    #[arg(short = 't', long, global = true, env = "SQLCHAT_TIMEOUT")]
    pub timeout: Option<u64>,

    /// Max rows returned per question (default: 1000)
    #[arg(short = 'l', long, global = true, env = "SQLCHAT_ROW_LIMIT")]
    pub limit: Option<usize>,

    /// SQL safety validator: keyword or parser (default: keyword)
    #[arg(long, global = true, env = "SQLCHAT_VALIDATOR")]
    pub validator: Option<String>,
}

fn parse_question(raw: &str) -> Result<String, String> {
    let question = raw.trim();
    if question.is_empty() {
        return Err("question cannot be empty".to_string());
    }
    Ok(question.to_string())
}
