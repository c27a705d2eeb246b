//! Tools the meta agent can call, and their execution against the registry.

use serde_json::{json, Value};
use uuid::Uuid;

use crate::codegen::generate_agent_code;
use crate::error::AgentError;
use crate::llm::ToolDef;
use crate::registry::{
    AgentRegistry, AgentUpdate, NewAgent, DEFAULT_LIST_LIMIT, DEFAULT_SEARCH_LIMIT,
};

fn agent_id_schema() -> Value {
    json!({
        "type": "string",
        "description": "The UUID of the agent"
    })
}

/// Tool definitions for the agent builder.
pub fn definitions() -> Vec<ToolDef> {
    vec![
        ToolDef {
            name: "create_agent".to_string(),
            description: "Create a new AI agent with the specified configuration.".to_string(),
            parameters: json!({
                "type": "object",
                "required": ["name", "description", "system_prompt", "tools"],
                "properties": {
                    "name": { "type": "string", "description": "Name of the agent" },
                    "description": { "type": "string", "description": "What the agent does" },
                    "system_prompt": {
                        "type": "string",
                        "description": "The system prompt that defines the agent's behavior"
                    },
                    "tools": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Tool names the agent should have access to"
                    },
                    "model": { "type": "string", "description": "LLM model (default: gpt-4o-mini)" },
                    "temperature": { "type": "number", "description": "Sampling temperature (default: 0)" }
                }
            }),
        },
        ToolDef {
            name: "list_agents".to_string(),
            description: "List the agents created by the current user.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "limit": { "type": "integer", "description": "Maximum number of agents (default: 10)" }
                }
            }),
        },
        ToolDef {
            name: "get_agent".to_string(),
            description: "Get a specific agent's configuration by ID.".to_string(),
            parameters: json!({
                "type": "object",
                "required": ["agent_id"],
                "properties": { "agent_id": agent_id_schema() }
            }),
        },
        ToolDef {
            name: "update_agent".to_string(),
            description: "Update an existing agent's configuration. Only the given fields change."
                .to_string(),
            parameters: json!({
                "type": "object",
                "required": ["agent_id"],
                "properties": {
                    "agent_id": agent_id_schema(),
                    "name": { "type": "string" },
                    "description": { "type": "string" },
                    "system_prompt": { "type": "string" },
                    "tools": { "type": "array", "items": { "type": "string" } },
                    "model": { "type": "string" },
                    "temperature": { "type": "number" }
                }
            }),
        },
        ToolDef {
            name: "delete_agent".to_string(),
            description: "Delete an agent by ID.".to_string(),
            parameters: json!({
                "type": "object",
                "required": ["agent_id"],
                "properties": { "agent_id": agent_id_schema() }
            }),
        },
        ToolDef {
            name: "search_agents".to_string(),
            description: "Search for agents using semantic search.".to_string(),
            parameters: json!({
                "type": "object",
                "required": ["query"],
                "properties": {
                    "query": { "type": "string", "description": "Search query" },
                    "limit": { "type": "integer", "description": "Maximum number of results (default: 5)" }
                }
            }),
        },
        ToolDef {
            name: "generate_agent_code".to_string(),
            description: "Generate Python code for an agent from its stored configuration."
                .to_string(),
            parameters: json!({
                "type": "object",
                "required": ["agent_id"],
                "properties": { "agent_id": agent_id_schema() }
            }),
        },
        ToolDef {
            name: "test_agent".to_string(),
            description: "Test an agent with a sample input.".to_string(),
            parameters: json!({
                "type": "object",
                "required": ["agent_id", "test_input"],
                "properties": {
                    "agent_id": agent_id_schema(),
                    "test_input": { "type": "string", "description": "Input to send to the agent" }
                }
            }),
        },
    ]
}

fn agent_id(input: &Value) -> Result<Uuid, AgentError> {
    let raw = input["agent_id"]
        .as_str()
        .ok_or_else(|| AgentError::InvalidInput("agent_id is required".into()))?;
    Uuid::parse_str(raw).map_err(|_| AgentError::InvalidInput(format!("Invalid agent_id: {raw}")))
}

fn limit(input: &Value, default: usize) -> usize {
    input["limit"]
        .as_u64()
        .map(|n| n as usize)
        .unwrap_or(default)
}

fn parse<T: serde::de::DeserializeOwned>(input: &Value) -> Result<T, AgentError> {
    serde_json::from_value(input.clone()).map_err(|e| AgentError::InvalidInput(e.to_string()))
}

fn records<T: serde::Serialize>(items: &[T]) -> Value {
    serde_json::to_value(items).unwrap_or(Value::Array(Vec::new()))
}

/// Execute one tool call for `author` and return its JSON result.
pub async fn execute_tool(
    registry: &AgentRegistry,
    author: &str,
    name: &str,
    input: &Value,
) -> Result<Value, AgentError> {
    match name {
        "create_agent" => {
            let agent: NewAgent = parse(input)?;
            let n_tools = agent.tools.len();
            let record = registry.create(author, agent).await?;
            Ok(json!({
                "agent_id": record.id,
                "name": record.name,
                "description": record.description,
                "status": "created",
                "message": format!("Agent '{}' created successfully with {n_tools} tools", record.name),
            }))
        }

        "list_agents" => {
            let agents = registry.list(author, limit(input, DEFAULT_LIST_LIMIT)).await?;
            Ok(records(&agents))
        }

        "get_agent" => {
            let agent = registry.get(agent_id(input)?).await?;
            Ok(json!(agent))
        }

        "update_agent" => {
            let id = agent_id(input)?;
            registry.get_owned(id, author).await?;
            let patch: AgentUpdate = parse(input)?;
            let fields = registry.update(id, patch).await?;
            Ok(json!({
                "message": format!("Agent '{id}' updated successfully"),
                "updated_fields": fields,
            }))
        }

        "delete_agent" => {
            let id = agent_id(input)?;
            registry.get_owned(id, author).await?;
            registry.delete(id).await?;
            Ok(json!({ "message": format!("Agent '{id}' deleted successfully") }))
        }

        "search_agents" => {
            let query = input["query"]
                .as_str()
                .ok_or_else(|| AgentError::InvalidInput("query is required".into()))?;
            let agents = registry
                .search(query, limit(input, DEFAULT_SEARCH_LIMIT))
                .await?;
            Ok(records(&agents))
        }

        "generate_agent_code" => {
            let agent = registry.get(agent_id(input)?).await?;
            Ok(json!({ "code": generate_agent_code(&agent) }))
        }

        "test_agent" => {
            let id = agent_id(input)?;
            let test_input = input["test_input"].as_str().unwrap_or_default();
            let result = registry.test(id, test_input).await?;
            Ok(json!(result))
        }

        _ => Err(AgentError::InvalidInput(format!("Unknown tool: {name}"))),
    }
}
