use clap::Parser;
use sqlchat::backend::redshift::RedshiftBackend;
use sqlchat::cli::{AskArgs, Cli, Command};
use sqlchat::config::{self, AppConfig};
use sqlchat::error::SqlChatError;
use sqlchat::executor::QueryExecutor;
use sqlchat::logging::{self, Timer, format_duration};
use sqlchat::model::BedrockClient;
use sqlchat::output::{self, OutputMode};
use sqlchat::pipeline::{QueryPipeline, RequestContext, RequestEnvelope};
use sqlchat::schema::SchemaCache;
use sqlchat::{format, masking};
use std::process;
use std::sync::Arc;
use tokio::task::JoinSet;

type Pipeline = QueryPipeline<RedshiftBackend, BedrockClient>;

#[tokio::main]
async fn main() {
    // Load .env file (optional, ignore if missing)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let app_config = match config::load(
        &cli.connection,
        cli.verbose,
        cli.show_secrets,
        cli.config.as_ref(),
    ) {
        Ok(c) => c,
        Err(err) => {
            output::print_error(&err);
            process::exit(1);
        }
    };
    logging::init(app_config.verbose);

    let mode = OutputMode::from_json_flag(cli.json);
    match run(&cli.command, &app_config, mode).await {
        Ok(true) => {}
        // Every envelope already carries its own error.
        Ok(false) => process::exit(1),
        Err(err) => {
            output::print_error(&err);
            process::exit(1);
        }
    }
}

/// Returns false when no question in an `ask` could be answered.
async fn run(command: &Command, app_config: &AppConfig, mode: OutputMode) -> Result<bool, SqlChatError> {
    let pipeline = Arc::new(build_pipeline(app_config).await?);

    let result = match command {
        Command::Ask(args) => ask(&pipeline, args, mode).await,
        Command::Schema => pipeline
            .schema()
            .await
            .and_then(|schema| output::print_value(&format::schema_view(&schema), mode))
            .map(|_| true),
        Command::Health => {
            let report = pipeline.health().await;
            let settings = masking::describe_config(app_config);
            output::print_value(&format::health_view(&report, &settings), mode)
                .map(|_| report.model && report.warehouse)
        }
    };

    pipeline.close().await;
    result
}

async fn build_pipeline(app_config: &AppConfig) -> Result<Pipeline, SqlChatError> {
    let timer = Timer::start();
    let backend = RedshiftBackend::connect(&app_config.warehouse, &app_config.pool).await;
    tracing::debug!(
        connected = backend.is_connected(),
        elapsed = %format_duration(timer.elapsed()),
        "warehouse pool setup finished"
    );

    let executor = Arc::new(QueryExecutor::new(
        backend,
        app_config.query.statement_timeout_secs,
        app_config.query.max_result_rows,
        app_config.query.max_schema_tables,
    ));
    let schema_cache = SchemaCache::new(Arc::clone(&executor));
    let model = BedrockClient::new(&app_config.model)?;

    Ok(QueryPipeline::new(
        executor,
        schema_cache,
        model,
        app_config.query.validator.build(),
        app_config.query.target_schema.clone(),
    ))
}

async fn ask(pipeline: &Arc<Pipeline>, args: &AskArgs, mode: OutputMode) -> Result<bool, SqlChatError> {
    let conversation_id = args
        .conversation_id
        .clone()
        .unwrap_or_else(new_conversation_id);

    let mut tasks = JoinSet::new();
    for (index, question) in args.questions.iter().enumerate() {
        let pipeline = Arc::clone(pipeline);
        let question = question.clone();
        let context = RequestContext {
            conversation_id: Some(conversation_id.clone()),
        };
        tasks.spawn(async move {
            let envelope = pipeline.generate_and_execute(&question, &context).await;
            (index, envelope)
        });
    }

    let mut answered: Vec<(usize, RequestEnvelope)> = Vec::with_capacity(args.questions.len());
    while let Some(joined) = tasks.join_next().await {
        let pair = joined.map_err(|e| SqlChatError::Io(std::io::Error::other(e)))?;
        answered.push(pair);
    }
    answered.sort_by_key(|(index, _)| *index);

    let envelopes = answered.into_iter().map(|(_, e)| e).collect::<Vec<_>>();
    output::print_envelopes(&envelopes, mode)?;

    Ok(envelopes.iter().any(|e| e.error_kind.is_none()))
}

fn new_conversation_id() -> String {
    format!(
        "{:x}-{:x}",
        chrono::Utc::now().timestamp_millis(),
        process::id()
    )
}
