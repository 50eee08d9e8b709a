//! Command implementations

use cimq_query::{Engine, EngineError, Namespace, ResultSet};
use cimq_types::encode_to_text_pretty;
use color_eyre::Result;
use color_eyre::eyre::WrapErr;
use serde_json::json;
use tracing::debug;

/// How `query` prints its result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Compact,
    Pretty,
    Structured,
}

/// Run one query over a connection and render the result
///
/// # Errors
/// Returns the connection or query error, with the namespace as context
pub async fn query(
    engine: &Engine,
    namespace: Namespace,
    text: String,
    format: OutputFormat,
) -> Result<String> {
    let engine = engine.clone();
    let target = namespace.to_string();

    // Connections block their caller.
    let rendered = tokio::task::spawn_blocking(move || -> Result<String, EngineError> {
        let connection = engine.open_connection(namespace)?;
        let rendered = match format {
            OutputFormat::Compact => connection.query(&text)?,
            OutputFormat::Pretty => encode_to_text_pretty(&connection.query_structured(&text)?)?,
            OutputFormat::Structured => format!("{:#?}", connection.query_structured(&text)?),
        };
        connection.close();
        Ok(rendered)
    })
    .await?
    .wrap_err_with(|| format!("query against '{target}' failed"))?;

    Ok(rendered)
}

/// Dispatch every query at once and render one JSON line per query
///
/// Lines come back in submission order regardless of completion order.
pub async fn dispatch(engine: &Engine, namespace: &Namespace, queries: &[String]) -> Vec<String> {
    let handles: Vec<_> = queries
        .iter()
        .map(|query| engine.dispatch_query(namespace.clone(), query))
        .collect();
    debug!(count = handles.len(), "queries dispatched");

    let mut lines = Vec::with_capacity(handles.len());
    for (query, handle) in queries.iter().zip(handles) {
        lines.push(render_line(query, handle.await));
    }
    lines
}

fn render_line(query: &str, outcome: Result<ResultSet, EngineError>) -> String {
    let line = match outcome {
        Ok(result) => json!({ "query": query, "result": result }),
        Err(e) => json!({ "query": query, "error": e.to_string() }),
    };
    line.to_string()
}
