//! Tool schemas and execution.
//!
//! The tool set is fixed and small: `web_search`, `create_table` and
//! `set_reminder`. Schemas are only offered for tools whose backing
//! capability is actually configured; a model that requests anything else
//! fails the whole exchange.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agent::error::AgentError;
use crate::agent::types::{ConversationTurn, ToolCall};
use crate::providers::{SearchProvider, SearchResult, TableRenderer, TableSpec};
use crate::store::reminders::ReminderStore;

/// Name of the web-search tool.
pub const WEB_SEARCH: &str = "web_search";
/// Name of the table-rendering tool.
pub const CREATE_TABLE: &str = "create_table";
/// Name of the reminder tool.
pub const SET_REMINDER: &str = "set_reminder";

/// Success payload for a rendered table.
const TABLE_SUCCESS: &str = "Table image generated successfully";

/// A tool description offered to the model.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Tool name.
    pub name: String,
    /// What the tool does, in model-facing prose.
    pub description: String,
    /// JSON schema of the arguments object.
    pub parameters: Value,
}

/// Arguments of `web_search`. The model may supply one query or several.
#[derive(Debug, Deserialize)]
struct WebSearchArgs {
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    queries: Vec<String>,
    #[serde(default = "default_country")]
    country: String,
}

fn default_country() -> String {
    "US".to_string()
}

/// Arguments of `create_table`. Cells may arrive as numbers; they are
/// stringified before rendering.
#[derive(Debug, Deserialize)]
struct CreateTableArgs {
    headers: Vec<String>,
    rows: Vec<Vec<Value>>,
    #[serde(default)]
    title: Option<String>,
}

/// Arguments of `set_reminder`.
#[derive(Debug, Deserialize)]
struct SetReminderArgs {
    message: String,
    duration: String,
}

/// Result of executing one tool call.
struct ToolOutcome {
    turn: ConversationTurn,
    artifact: Option<Vec<u8>>,
}

/// Executes the model's tool calls against the configured capabilities.
pub struct ToolExecutor {
    search: Arc<dyn SearchProvider>,
    tables: Option<Arc<dyn TableRenderer>>,
    reminders: Option<Arc<ReminderStore>>,
    stagger: Duration,
}

impl ToolExecutor {
    /// Create an executor. `tables` and `reminders` are optional; their
    /// tools are withheld from the schema when absent.
    #[must_use]
    pub fn new(
        search: Arc<dyn SearchProvider>,
        tables: Option<Arc<dyn TableRenderer>>,
        reminders: Option<Arc<ReminderStore>>,
        stagger: Duration,
    ) -> Self {
        Self {
            search,
            tables,
            reminders,
            stagger,
        }
    }

    /// Schemas for every tool this executor can actually run.
    #[must_use]
    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas = vec![web_search_schema()];
        if self.tables.is_some() {
            schemas.push(create_table_schema());
        }
        if self.reminders.is_some() {
            schemas.push(set_reminder_schema());
        }
        schemas
    }

    /// Run every requested tool concurrently.
    ///
    /// Returns the tool-result turns in request order, plus the last
    /// side-effect artifact produced, if any.
    ///
    /// # Errors
    /// Any single tool failure (including an unknown tool name) fails the
    /// whole batch.
    pub async fn execute_all(
        &self,
        conversation_id: &str,
        calls: &[ToolCall],
    ) -> Result<(Vec<ConversationTurn>, Option<Vec<u8>>), AgentError> {
        let outcomes = join_all(
            calls
                .iter()
                .map(|call| self.execute(conversation_id, call)),
        )
        .await;

        let mut turns = Vec::with_capacity(calls.len());
        let mut artifact = None;
        for outcome in outcomes {
            let outcome = outcome?;
            if outcome.artifact.is_some() {
                artifact = outcome.artifact;
            }
            turns.push(outcome.turn);
        }
        Ok((turns, artifact))
    }

    async fn execute(
        &self,
        conversation_id: &str,
        call: &ToolCall,
    ) -> Result<ToolOutcome, AgentError> {
        tracing::debug!("executing tool {} ({})", call.name, call.id);
        match call.name.as_str() {
            WEB_SEARCH => {
                let args: WebSearchArgs = parse_args(call)?;
                let payload = self.run_web_search(&args).await?;
                Ok(ToolOutcome {
                    turn: ConversationTurn::tool_result(&call.id, payload),
                    artifact: None,
                })
            }
            CREATE_TABLE => {
                let Some(renderer) = &self.tables else {
                    return Err(AgentError::UnsupportedTool(call.name.clone()));
                };
                let args: CreateTableArgs = parse_args(call)?;
                let png = renderer.render(&table_spec(args)).await?;
                Ok(ToolOutcome {
                    turn: ConversationTurn::tool_result(&call.id, TABLE_SUCCESS),
                    artifact: Some(png),
                })
            }
            SET_REMINDER => {
                let Some(reminders) = &self.reminders else {
                    return Err(AgentError::UnsupportedTool(call.name.clone()));
                };
                let args: SetReminderArgs = parse_args(call)?;
                let confirmation =
                    reminders.add(conversation_id, &args.message, &args.duration)?;
                Ok(ToolOutcome {
                    turn: ConversationTurn::tool_result(&call.id, confirmation),
                    artifact: None,
                })
            }
            other => Err(AgentError::UnsupportedTool(other.to_string())),
        }
    }

    /// Run one or more searches, staggered to respect rate limits, and
    /// aggregate everything into a single JSON payload.
    async fn run_web_search(&self, args: &WebSearchArgs) -> Result<String, AgentError> {
        let mut queries: Vec<&str> = Vec::new();
        if let Some(query) = &args.query {
            queries.push(query);
        }
        queries.extend(args.queries.iter().map(String::as_str));
        if queries.is_empty() {
            return Err(AgentError::Search("no query provided".to_string()));
        }

        let mut aggregated: Vec<(String, Vec<SearchResult>)> = Vec::new();
        for (i, query) in queries.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.stagger).await;
            }
            let results = self.search.search(query, &args.country).await?;
            aggregated.push(((*query).to_string(), results));
        }

        // Single query: plain result array. Multiple: keep attribution.
        let payload = if aggregated.len() == 1 {
            serde_json::to_value(&aggregated[0].1)?
        } else {
            Value::Array(
                aggregated
                    .into_iter()
                    .map(|(query, results)| {
                        serde_json::json!({ "query": query, "results": results })
                    })
                    .collect(),
            )
        };
        Ok(payload.to_string())
    }
}

fn parse_args<T: DeserializeOwned>(call: &ToolCall) -> Result<T, AgentError> {
    serde_json::from_str(&call.arguments).map_err(|source| AgentError::ToolArguments {
        name: call.name.clone(),
        source,
    })
}

fn table_spec(args: CreateTableArgs) -> TableSpec {
    TableSpec {
        headers: args.headers,
        rows: args
            .rows
            .into_iter()
            .map(|row| row.into_iter().map(stringify_cell).collect())
            .collect(),
        title: args.title,
    }
}

fn stringify_cell(cell: Value) -> String {
    match cell {
        Value::String(text) => text,
        other => other.to_string(),
    }
}

fn web_search_schema() -> ToolSchema {
    ToolSchema {
        name: WEB_SEARCH.to_string(),
        description: "Search the web for information. You can provide multiple queries to get \
                      more comprehensive results. Always cite the sources the information came \
                      from."
            .to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query. Keep it exact and concise."
                },
                "queries": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Additional search queries."
                },
                "country": {
                    "type": "string",
                    "description": "The country to search in.",
                    "default": "US"
                }
            },
            "required": ["query"]
        }),
    }
}

fn create_table_schema() -> ToolSchema {
    ToolSchema {
        name: CREATE_TABLE.to_string(),
        description: "Create a table image from structured data. The table is automatically \
                      attached to your text reply."
            .to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "headers": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Column headers"
                },
                "rows": {
                    "type": "array",
                    "items": { "type": "array", "items": { "type": "string" } },
                    "description": "Rows of cell values"
                },
                "title": {
                    "type": "string",
                    "description": "Optional table title"
                }
            },
            "required": ["headers", "rows"]
        }),
    }
}

fn set_reminder_schema() -> ToolSchema {
    ToolSchema {
        name: SET_REMINDER.to_string(),
        description: "Set a reminder for the user. Only use when explicitly requested. \
                      Duration format: 1d (1 day), 2h (2 hours), 30m (30 minutes)."
            .to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "message": {
                    "type": "string",
                    "description": "The reminder message"
                },
                "duration": {
                    "type": "string",
                    "description": "Duration such as 1d, 2h or 30m",
                    "pattern": "^\\d+[dhm]$"
                }
            },
            "required": ["message", "duration"]
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct RecordingSearch {
        queries: Mutex<Vec<String>>,
    }

    impl RecordingSearch {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                queries: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl SearchProvider for RecordingSearch {
        async fn search(
            &self,
            query: &str,
            _country: &str,
        ) -> Result<Vec<SearchResult>, AgentError> {
            self.queries.lock().expect("lock").push(query.to_string());
            Ok(vec![SearchResult {
                title: format!("result for {query}"),
                link: "https://example.com".to_string(),
                description: String::new(),
                snippets: Vec::new(),
                news: false,
            }])
        }
    }

    struct PngRenderer;

    #[async_trait]
    impl TableRenderer for PngRenderer {
        async fn render(&self, spec: &TableSpec) -> Result<Vec<u8>, AgentError> {
            assert_eq!(spec.headers.len(), 2);
            Ok(vec![0x89, b'P', b'N', b'G'])
        }
    }

    fn executor(tables: Option<Arc<dyn TableRenderer>>) -> (ToolExecutor, Arc<RecordingSearch>) {
        let search = RecordingSearch::new();
        let executor = ToolExecutor::new(
            Arc::clone(&search) as Arc<dyn SearchProvider>,
            tables,
            None,
            Duration::from_millis(1),
        );
        (executor, search)
    }

    fn call(name: &str, arguments: &str) -> ToolCall {
        ToolCall {
            id: "call-1".to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }
    }

    #[test]
    fn test_schema_set_tracks_configured_backends() {
        let (minimal, _) = executor(None);
        let names: Vec<String> = minimal.schemas().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec![WEB_SEARCH.to_string()]);

        let (full, _) = executor(Some(Arc::new(PngRenderer)));
        let names: Vec<String> = full.schemas().into_iter().map(|s| s.name).collect();
        assert!(names.contains(&CREATE_TABLE.to_string()));
    }

    #[tokio::test]
    async fn test_unknown_tool_fails_the_batch() {
        let (executor, _) = executor(None);
        let result = executor
            .execute_all("conv", &[call("delete_everything", "{}")])
            .await;
        assert!(matches!(result, Err(AgentError::UnsupportedTool(name)) if name == "delete_everything"));
    }

    #[tokio::test]
    async fn test_malformed_arguments_are_fatal() {
        let (executor, _) = executor(None);
        let result = executor
            .execute_all("conv", &[call(WEB_SEARCH, "not json")])
            .await;
        assert!(matches!(
            result,
            Err(AgentError::ToolArguments { name, .. }) if name == WEB_SEARCH
        ));
    }

    #[tokio::test]
    async fn test_multi_query_search_aggregates() {
        let (executor, search) = executor(None);
        let args = r#"{"query": "rust 1.91", "queries": ["tokio release"], "country": "GB"}"#;
        let (turns, artifact) = executor
            .execute_all("conv", &[call(WEB_SEARCH, args)])
            .await
            .expect("search");

        assert!(artifact.is_none());
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].tool_call_id.as_deref(), Some("call-1"));
        let payload: Value = serde_json::from_str(&turns[0].text()).expect("payload json");
        assert_eq!(payload.as_array().map(Vec::len), Some(2));
        assert_eq!(
            *search.queries.lock().expect("lock"),
            vec!["rust 1.91".to_string(), "tokio release".to_string()]
        );
    }

    #[tokio::test]
    async fn test_create_table_produces_artifact() {
        let (executor, _) = executor(Some(Arc::new(PngRenderer)));
        let args = r#"{"headers": ["name", "age"], "rows": [["ada", 36], ["alan", 41]]}"#;
        let (turns, artifact) = executor
            .execute_all("conv", &[call(CREATE_TABLE, args)])
            .await
            .expect("render");

        assert_eq!(turns[0].text(), TABLE_SUCCESS);
        assert_eq!(artifact, Some(vec![0x89, b'P', b'N', b'G']));
    }
}
