use crate::backend::{Backend, Row};
use crate::error::{ErrorKind, SqlChatError};
use crate::executor::{ExecutionResult, QueryExecutor};
use crate::extract::{extract, sanitize};
use crate::logging::{Timer, format_duration, rounded_secs};
use crate::model::ModelClient;
use crate::prompt::{build_formatting_prompt, build_generation_prompt, fallback_answer};
use crate::schema::{SchemaCache, SchemaSnapshot};
use crate::validation::SqlValidator;
use serde::Serialize;
use std::sync::Arc;

/// Per-request information supplied by the caller.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub conversation_id: Option<String>,
}

/// Where a request is in its lifecycle. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Start,
    SchemaFetched,
    SqlGenerated,
    SqlValidated,
    QueryExecuted,
    ResponseFormatted,
    Completed,
    Failed(ErrorKind),
}

/// The single response produced for every question.
#[derive(Debug, Clone, Serialize)]
pub struct RequestEnvelope {
    #[serde(rename = "response")]
    pub natural_language_answer: String,
    pub sql_query: Option<String>,
    #[serde(rename = "results")]
    pub rows: Vec<Row>,
    #[serde(rename = "execution_time")]
    pub elapsed_seconds: f64,
    #[serde(rename = "error")]
    pub error_kind: Option<ErrorKind>,
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(skip)]
    pub stage: Stage,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct HealthReport {
    pub model: bool,
    pub warehouse: bool,
}

struct Answered {
    answer: String,
    sql: String,
    result: ExecutionResult,
}

/// Question in, envelope out: schema → generate → validate → execute → format.
pub struct QueryPipeline<B, M> {
    executor: Arc<QueryExecutor<B>>,
    schema_cache: SchemaCache<QueryExecutor<B>>,
    model: M,
    validator: Box<dyn SqlValidator>,
    target_schema: String,
}

impl<B: Backend, M: ModelClient> QueryPipeline<B, M> {
    pub fn new(
        executor: Arc<QueryExecutor<B>>,
        schema_cache: SchemaCache<QueryExecutor<B>>,
        model: M,
        validator: Box<dyn SqlValidator>,
        target_schema: impl Into<String>,
    ) -> Self {
        Self {
            executor,
            schema_cache,
            model,
            validator,
            target_schema: target_schema.into(),
        }
    }

    pub async fn generate_and_execute(
        &self,
        question: &str,
        context: &RequestContext,
    ) -> RequestEnvelope {
        let timer = Timer::start();
        let mut stage = Stage::Start;
        tracing::info!(conversation_id = ?context.conversation_id, question, "processing question");

        let outcome = self.run_stages(question, &mut stage).await;
        let elapsed = timer.elapsed();

        match outcome {
            Ok(done) => {
                tracing::info!(
                    conversation_id = ?context.conversation_id,
                    rows = done.result.rows.len(),
                    elapsed = %format_duration(elapsed),
                    "question answered"
                );
                RequestEnvelope {
                    natural_language_answer: done.answer,
                    sql_query: Some(done.sql),
                    truncated: done.result.truncated,
                    rows: done.result.rows,
                    elapsed_seconds: rounded_secs(elapsed),
                    error_kind: None,
                    conversation_id: context.conversation_id.clone(),
                    stage: Stage::Completed,
                }
            }
            Err(e) => {
                let kind = e.kind();
                report_failure(&e, stage, context);
                RequestEnvelope {
                    natural_language_answer: e.user_message(),
                    sql_query: None,
                    rows: Vec::new(),
                    elapsed_seconds: rounded_secs(elapsed),
                    error_kind: Some(kind),
                    truncated: false,
                    conversation_id: context.conversation_id.clone(),
                    stage: Stage::Failed(kind),
                }
            }
        }
    }

    async fn run_stages(&self, question: &str, stage: &mut Stage) -> Result<Answered, SqlChatError> {
        let schema = self.schema_cache.get(&self.target_schema).await?;
        if schema.is_empty() {
            return Err(SqlChatError::SchemaUnavailable {
                source: Box::new(SqlChatError::Database {
                    message: format!("no tables found in schema '{}'", self.target_schema),
                }),
            });
        }
        *stage = Stage::SchemaFetched;

        let prompt = build_generation_prompt(question, &schema, self.executor.max_rows());
        let raw = self.model.invoke(&prompt).await?;
        let sql = sanitize(&extract(&raw));
        tracing::debug!(sql = %sql, "generated SQL");
        *stage = Stage::SqlGenerated;

        let verdict = self.validator.check(&sql);
        if !verdict.accepted {
            return Err(SqlChatError::SqlRejected {
                reason: verdict
                    .reason
                    .unwrap_or_else(|| "Query rejected by safety policy".to_string()),
            });
        }
        *stage = Stage::SqlValidated;

        let result = self.executor.run(&sql, &[], None).await?;
        *stage = Stage::QueryExecuted;

        let format_prompt = build_formatting_prompt(question, &sql, &result);
        let answer = match self.model.invoke(&format_prompt).await {
            Ok(answer) => answer.trim().to_string(),
            Err(e) => {
                let e = SqlChatError::FormattingFailed {
                    message: e.to_string(),
                };
                tracing::warn!(error = %e, "response formatting failed, using fallback answer");
                fallback_answer(result.rows.len())
            }
        };
        *stage = Stage::ResponseFormatted;

        Ok(Answered {
            answer,
            sql,
            result,
        })
    }

    /// Current schema snapshot, from cache when fresh.
    pub async fn schema(&self) -> Result<Arc<SchemaSnapshot>, SqlChatError> {
        self.schema_cache.get(&self.target_schema).await
    }

    pub async fn health(&self) -> HealthReport {
        let model = match self.model.invoke("Respond with 'OK'").await {
            Ok(text) => !text.trim().is_empty(),
            Err(e) => {
                tracing::error!(error = %e, "model connection test failed");
                false
            }
        };
        let warehouse = self.executor.ping().await;
        HealthReport { model, warehouse }
    }

    pub async fn close(&self) {
        self.executor.close().await;
    }
}

fn report_failure(e: &SqlChatError, stage: Stage, context: &RequestContext) {
    let conversation_id = context.conversation_id.as_deref().unwrap_or("-");
    match e {
        // Routine outcome of a question the model cannot answer safely.
        SqlChatError::SqlRejected { reason } => {
            tracing::info!(conversation_id, ?stage, reason = %reason, "generated SQL rejected");
        }
        SqlChatError::StatementTimeout { .. } => {
            tracing::warn!(conversation_id, ?stage, error = %e, "statement timed out");
        }
        _ => {
            tracing::error!(conversation_id, ?stage, kind = ?e.kind(), error = %e, "request failed");
        }
    }
}
