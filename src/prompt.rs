use crate::executor::ExecutionResult;
use crate::schema::SchemaSnapshot;

/// Rows embedded in the formatting prompt. The full result is still returned to the caller.
pub const PROMPT_SAMPLE_ROWS: usize = 10;

const SQL_DIALECT: &str = "PostgreSQL/Redshift";

/// Render one line per table: `schema.table: col (type), col (type)`.
pub fn render_schema(schema: &SchemaSnapshot) -> String {
    if schema.is_empty() {
        return "No schema information available".to_string();
    }

    schema
        .tables()
        .iter()
        .map(|table| {
            if table.columns.is_empty() {
                return table.qualified_name.clone();
            }
            let columns = table
                .columns
                .iter()
                .map(|c| format!("{} ({})", c.name, c.data_type))
                .collect::<Vec<_>>()
                .join(", ");
            format!("{}: {}", table.qualified_name, columns)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Prompt asking the model to translate a question into one read-only statement.
pub fn build_generation_prompt(question: &str, schema: &SchemaSnapshot, max_rows: usize) -> String {
    format!(
        "You are a SQL expert. Generate a valid SQL query for the following request.

Database Schema:
{schema}

User Request: {question}

Rules:
- Only use SELECT statements (no INSERT, UPDATE, DELETE, DROP)
- Write exactly one statement
- Use appropriate JOINs when needed
- Include LIMIT clause to prevent large result sets (max {max_rows} rows)
- Return valid {SQL_DIALECT} syntax
- Use table and column names exactly as shown in the schema
- If the question is ambiguous, make reasonable assumptions

Return ONLY the SQL query without any explanation, markdown formatting, or code blocks. Just the raw SQL.",
        schema = render_schema(schema),
    )
}

/// Prompt asking the model to explain a result set in plain language.
pub fn build_formatting_prompt(question: &str, sql: &str, result: &ExecutionResult) -> String {
    let sample = &result.rows[..result.rows.len().min(PROMPT_SAMPLE_ROWS)];
    let sample_json =
        serde_json::to_string_pretty(sample).unwrap_or_else(|_| "[]".to_string());

    let total = result.rows.len();
    let count_note = if result.truncated {
        format!("{} row(s) total, capped at the row limit", total)
    } else {
        format!("{} row(s) total", total)
    };

    format!(
        "Format the following database query results into a clear, natural language response.

User Question: {question}

SQL Query Executed:
{sql}

Query Results ({count_note}):
{sample_json}

Instructions:
- Provide a clear, concise explanation of what the data shows
- Answer the user's original question directly
- If there are many results, summarize the key findings
- Use natural language, not technical jargon
- Be conversational and helpful
- If no results were found, explain that clearly

Format your response in plain text without markdown formatting."
    )
}

/// Answer used when the formatting call fails.
pub fn fallback_answer(row_count: usize) -> String {
    if row_count == 0 {
        "No results found for your query.".to_string()
    } else {
        format!(
            "Found {} result(s). Please see the data table below.",
            row_count
        )
    }
}
