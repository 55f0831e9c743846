use regex::Regex;
use std::sync::LazyLock;

const FENCE: &str = "```";

static LINE_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)--.*$").expect("valid line comment pattern"));
static BLOCK_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("valid block comment pattern"));

/// Pull the SQL statement out of raw model output.
///
/// A leading Markdown fence line (```` ```sql ````) and a trailing fence are
/// dropped. Already-clean SQL passes through unchanged.
pub fn extract(model_text: &str) -> String {
    let mut sql = model_text.trim();

    if let Some(rest) = sql.strip_prefix(FENCE) {
        sql = match rest.split_once('\n') {
            Some((_info, body)) => body,
            // Single-line fence: drop the marker and an optional language tag.
            None => {
                let rest = rest.trim_start();
                match rest.split_once(char::is_whitespace) {
                    Some((tag, body)) if is_fence_tag(tag) => body,
                    _ => rest,
                }
            }
        };
    }

    if let Some(body) = sql.trim_end().strip_suffix(FENCE) {
        sql = body;
    }

    sql.trim().to_string()
}

/// Remove `--` and `/* */` comments and collapse all whitespace runs to one space.
pub fn sanitize(sql: &str) -> String {
    let without_line = LINE_COMMENT.replace_all(sql, "");
    let without_block = BLOCK_COMMENT.replace_all(&without_line, "");
    without_block.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_fence_tag(tag: &str) -> bool {
    ["sql", "postgresql", "postgres", "redshift"]
        .iter()
        .any(|t| tag.eq_ignore_ascii_case(t))
}
