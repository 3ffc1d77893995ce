//! Session Search Tool — lets the model list past sessions or search message
//! history by keyword, without leaving the conversation.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::{CoreError, Result};
use crate::services::{MessageService, SessionService};

use super::types::{
    ApprovalPolicy, ConfirmationDetails, Invocation, Risk, Tool, ToolCapability,
    ToolExecutionContext, ToolResult,
};

pub struct SessionSearchTool {
    sessions: SessionService,
    messages: MessageService,
}

impl SessionSearchTool {
    pub fn new(sessions: SessionService, messages: MessageService) -> Self {
        Self { sessions, messages }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
enum SearchInput {
    List,
    Search {
        query: String,
        #[serde(default)]
        session: Option<String>,
        #[serde(default = "default_n")]
        n: usize,
    },
}

fn default_n() -> usize {
    10
}

#[async_trait]
impl Tool for SessionSearchTool {
    fn name(&self) -> &str {
        "session_search"
    }

    fn description(&self) -> &str {
        "List chat sessions or search message history by keyword. Use 'list' to show all \
         sessions with titles and message counts. Use 'search' to find messages containing a \
         query string, optionally scoped to one session."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "operation": { "type": "string", "enum": ["list", "search"] },
                "query": { "type": "string", "description": "Substring to search for (required for 'search')" },
                "session": { "type": "string", "description": "Session id to restrict the search to" },
                "n": { "type": "integer", "description": "Max results to return", "default": 10 }
            },
            "required": ["operation"]
        })
    }

    fn capabilities(&self) -> Vec<ToolCapability> {
        vec![ToolCapability::ReadFiles]
    }

    fn risk(&self) -> Risk {
        Risk::Low
    }

    fn create_invocation(&self, args: Value, _ctx: ToolExecutionContext) -> Result<Box<dyn Invocation>> {
        let input: SearchInput = serde_json::from_value(args).map_err(|e| CoreError::ToolExecution {
            tool: self.name().to_string(),
            message: format!("invalid input: {e}"),
        })?;
        Ok(Box::new(SessionSearchInvocation {
            input,
            sessions: self.sessions.clone(),
            messages: self.messages.clone(),
        }))
    }
}

struct SessionSearchInvocation {
    input: SearchInput,
    sessions: SessionService,
    messages: MessageService,
}

#[async_trait]
impl Invocation for SessionSearchInvocation {
    fn get_description(&self) -> String {
        match &self.input {
            SearchInput::List => "list sessions".to_string(),
            SearchInput::Search { query, .. } => format!("search sessions for '{query}'"),
        }
    }

    fn tool_locations(&self) -> Vec<String> {
        Vec::new()
    }

    fn should_confirm_execute(&self, _policy: ApprovalPolicy) -> Result<Option<ConfirmationDetails>> {
        Ok(None)
    }

    async fn execute(&self, cancellation: &CancellationToken) -> ToolResult {
        if cancellation.is_cancelled() {
            return ToolResult::cancelled();
        }
        match &self.input {
            SearchInput::List => self.list_sessions().await,
            SearchInput::Search { query, session, n } => {
                self.search_sessions(query, session.as_deref(), *n).await
            }
        }
    }
}

impl SessionSearchInvocation {
    async fn list_sessions(&self) -> ToolResult {
        let sessions = match self.sessions.list_sessions().await {
            Ok(s) => s,
            Err(e) => return ToolResult::error("Execution", e.to_string()),
        };
        if sessions.is_empty() {
            return ToolResult::success("No sessions found.");
        }
        let mut output = String::new();
        for (i, session) in sessions.iter().enumerate() {
            let count = self
                .messages
                .list_messages_for_session(session.id)
                .await
                .map(|m| m.len())
                .unwrap_or(0);
            let title = session.title.as_deref().unwrap_or("Untitled");
            output.push_str(&format!(
                "{}. \"{}\" ({}) — {}, {} messages\n",
                i + 1,
                title,
                session.id,
                session.updated_at.format("%Y-%m-%d"),
                count
            ));
        }
        ToolResult::success(output)
    }

    async fn search_sessions(&self, query: &str, session_filter: Option<&str>, n: usize) -> ToolResult {
        if query.is_empty() {
            return ToolResult::error("InvalidInput", "'query' must not be empty");
        }
        let sessions = match self.sessions.list_sessions().await {
            Ok(s) => s,
            Err(e) => return ToolResult::error("Execution", e.to_string()),
        };
        let needle = query.to_lowercase();
        let mut hits = Vec::new();
        for session in &sessions {
            if let Some(filter) = session_filter
                && session.id.to_string() != filter
            {
                continue;
            }
            let messages = match self.messages.list_messages_for_session(session.id).await {
                Ok(m) => m,
                Err(_) => continue,
            };
            for message in messages {
                if message.content.to_lowercase().contains(&needle) {
                    hits.push(format!(
                        "[{}] {}: {}",
                        session.title.as_deref().unwrap_or("Untitled"),
                        message.role,
                        message.content
                    ));
                    if hits.len() >= n {
                        break;
                    }
                }
            }
            if hits.len() >= n {
                break;
            }
        }
        if hits.is_empty() {
            return ToolResult::success(format!("No messages matched '{query}'."));
        }
        ToolResult::success(hits.join("\n"))
    }
}
