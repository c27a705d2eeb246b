//! Agent configuration records.
//!
//! Records live in the `Agents` collection. `tools` is stored as a JSON
//! string so both backends see plain text; it is decoded on read.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use buddha_store::{
    Collection, FetchQuery, Filter, NearTextQuery, Properties, Sort, StoredObject, VectorStore,
};

use crate::conversation::now;
use crate::error::AgentError;
use crate::llm::{ChatMessage, ChatOptions, LlmClient};

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_LIST_LIMIT: usize = 10;
pub const DEFAULT_SEARCH_LIMIT: usize = 5;
const SEARCH_CERTAINTY: f64 = 0.7;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentRecord {
    #[serde(rename = "uuid")]
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub system_prompt: String,
    pub tools: Vec<String>,
    pub model: String,
    pub temperature: f64,
    pub author: String,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl AgentRecord {
    fn from_object(obj: StoredObject) -> Self {
        let text = |key: &str| obj.str(key).unwrap_or_default().to_string();
        Self {
            id: obj.id,
            name: text("name"),
            description: text("description"),
            system_prompt: text("system_prompt"),
            tools: decode_tools(obj.properties.get("tools")),
            model: obj.str("model").unwrap_or(DEFAULT_MODEL).to_string(),
            temperature: obj
                .properties
                .get("temperature")
                .and_then(Value::as_f64)
                .unwrap_or(0.0),
            author: text("author"),
            status: obj.str("status").unwrap_or("active").to_string(),
            created_at: text("created_at"),
            updated_at: text("updated_at"),
        }
    }
}

/// Accept the stored JSON string, a raw array, or nothing.
fn decode_tools(value: Option<&Value>) -> Vec<String> {
    let parsed = match value {
        Some(Value::String(s)) => serde_json::from_str::<Value>(s).unwrap_or(Value::Null),
        Some(other) => other.clone(),
        None => Value::Null,
    };
    parsed
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn encode_tools(tools: &[String]) -> String {
    Value::from(tools.to_vec()).to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewAgent {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub system_prompt: String,
    #[serde(default)]
    pub tools: Vec<String>,
    pub model: Option<String>,
    pub temperature: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub system_prompt: Option<String>,
    pub tools: Option<Vec<String>>,
    pub model: Option<String>,
    pub temperature: Option<f64>,
}

impl AgentUpdate {
    fn into_properties(self) -> Properties {
        let mut props = Properties::new();
        if let Some(v) = self.name {
            props.insert("name".into(), json!(v));
        }
        if let Some(v) = self.description {
            props.insert("description".into(), json!(v));
        }
        if let Some(v) = self.system_prompt {
            props.insert("system_prompt".into(), json!(v));
        }
        if let Some(v) = self.tools {
            props.insert("tools".into(), json!(encode_tools(&v)));
        }
        if let Some(v) = self.model {
            props.insert("model".into(), json!(v));
        }
        if let Some(v) = self.temperature {
            props.insert("temperature".into(), json!(v));
        }
        props.insert("updated_at".into(), json!(now()));
        props
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentTestResult {
    pub agent_name: String,
    pub test_input: String,
    pub response: String,
    pub model_used: String,
    pub temperature: f64,
}

/// CRUD and search over agent records.
#[derive(Clone)]
pub struct AgentRegistry {
    store: Arc<VectorStore>,
    llm: LlmClient,
}

impl AgentRegistry {
    /// `llm` runs agent test calls; its model is overridden per agent.
    pub fn new(store: Arc<VectorStore>, llm: LlmClient) -> Self {
        Self { store, llm }
    }

    pub async fn create(&self, author: &str, agent: NewAgent) -> Result<AgentRecord, AgentError> {
        if agent.name.trim().is_empty() {
            return Err(AgentError::InvalidInput("name is required".into()));
        }
        if agent.system_prompt.trim().is_empty() {
            return Err(AgentError::InvalidInput("system_prompt is required".into()));
        }

        let ts = now();
        let record = AgentRecord {
            id: Uuid::new_v4(),
            name: agent.name,
            description: agent.description,
            system_prompt: agent.system_prompt,
            tools: agent.tools,
            model: agent.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            temperature: agent.temperature.unwrap_or(0.0),
            author: author.to_string(),
            status: "active".to_string(),
            created_at: ts.clone(),
            updated_at: ts,
        };

        let mut props = Properties::new();
        props.insert("name".into(), json!(record.name));
        props.insert("description".into(), json!(record.description));
        props.insert("system_prompt".into(), json!(record.system_prompt));
        props.insert("tools".into(), json!(encode_tools(&record.tools)));
        props.insert("model".into(), json!(record.model));
        props.insert("temperature".into(), json!(record.temperature));
        props.insert("created_at".into(), json!(record.created_at));
        props.insert("updated_at".into(), json!(record.updated_at));
        props.insert("author".into(), json!(record.author));
        props.insert("status".into(), json!(record.status));

        self.store
            .insert(Collection::Agents, props, Some(record.id))
            .await?;
        tracing::info!(agent_id = %record.id, name = %record.name, %author, "Agent created");
        Ok(record)
    }

    /// The author's agents, newest first.
    pub async fn list(&self, author: &str, limit: usize) -> Result<Vec<AgentRecord>, AgentError> {
        let query = FetchQuery::new(limit)
            .with_filter(Filter::by_property("author", author))
            .with_sort(Sort::by_property("created_at", false));
        let objs = self.store.fetch(Collection::Agents, &query).await?;
        Ok(objs.into_iter().map(AgentRecord::from_object).collect())
    }

    pub async fn get(&self, id: Uuid) -> Result<AgentRecord, AgentError> {
        self.store
            .get(Collection::Agents, id)
            .await?
            .map(AgentRecord::from_object)
            .ok_or(AgentError::NotFound(id))
    }

    /// Like [`get`](Self::get), but records of other authors are not found.
    pub async fn get_owned(&self, id: Uuid, author: &str) -> Result<AgentRecord, AgentError> {
        let record = self.get(id).await?;
        if record.author != author {
            return Err(AgentError::NotFound(id));
        }
        Ok(record)
    }

    /// Apply a patch; returns the names of the fields written.
    pub async fn update(&self, id: Uuid, patch: AgentUpdate) -> Result<Vec<String>, AgentError> {
        self.get(id).await?;
        let props = patch.into_properties();
        let fields = props.keys().cloned().collect();
        self.store
            .update(Collection::Agents, id, props)
            .await
            .map_err(AgentError::from_store)?;
        tracing::info!(agent_id = %id, "Agent updated");
        Ok(fields)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), AgentError> {
        self.store
            .delete(Collection::Agents, id)
            .await
            .map_err(AgentError::from_store)?;
        tracing::info!(agent_id = %id, "Agent deleted");
        Ok(())
    }

    /// Semantic search over agent descriptions and prompts.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<AgentRecord>, AgentError> {
        let q = NearTextQuery::new(query, limit).with_certainty(SEARCH_CERTAINTY);
        let objs = self.store.near_text(Collection::Agents, &q).await?;
        Ok(objs.into_iter().map(AgentRecord::from_object).collect())
    }

    /// Run the agent's own prompt and model against `input`.
    pub async fn test(&self, id: Uuid, input: &str) -> Result<AgentTestResult, AgentError> {
        let agent = self.get(id).await?;
        let messages = [
            ChatMessage::system(&agent.system_prompt),
            ChatMessage::user(input),
        ];
        let opts = ChatOptions {
            model: Some(agent.model.clone()),
            temperature: Some(agent.temperature),
            ..ChatOptions::default()
        };
        let reply = self.llm.chat(&messages, &opts).await?.into_message()?;
        Ok(AgentTestResult {
            agent_name: agent.name,
            test_input: input.to_string(),
            response: reply.content.unwrap_or_default(),
            model_used: agent.model,
            temperature: agent.temperature,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buddha_store::{Embedder, HashingEmbedder, LocalStore};

    fn registry() -> AgentRegistry {
        let local = LocalStore::open_memory(Embedder::Hashing(HashingEmbedder::default())).unwrap();
        AgentRegistry::new(
            Arc::new(VectorStore::Local(local)),
            LlmClient::new("test".into(), "http://127.0.0.1:9"),
        )
    }

    fn new_agent(name: &str, description: &str) -> NewAgent {
        NewAgent {
            name: name.into(),
            description: description.into(),
            system_prompt: format!("You are {name}."),
            tools: vec!["web_search".into()],
            model: None,
            temperature: None,
        }
    }

    #[tokio::test]
    async fn create_then_get_applies_defaults() {
        let reg = registry();
        let created = reg
            .create("a@b.c", new_agent("Helper", "helps"))
            .await
            .unwrap();
        let got = reg.get(created.id).await.unwrap();
        assert_eq!(got, created);
        assert_eq!(got.model, DEFAULT_MODEL);
        assert_eq!(got.temperature, 0.0);
        assert_eq!(got.status, "active");
        assert_eq!(got.tools, vec!["web_search".to_string()]);
    }

    #[tokio::test]
    async fn blank_name_is_rejected() {
        let reg = registry();
        let err = reg.create("a@b.c", new_agent(" ", "x")).await.unwrap_err();
        assert!(matches!(err, AgentError::InvalidInput(ref m) if m == "name is required"));
    }

    #[tokio::test]
    async fn list_is_scoped_to_author() {
        let reg = registry();
        reg.create("a@b.c", new_agent("One", "")).await.unwrap();
        reg.create("x@y.z", new_agent("Two", "")).await.unwrap();
        reg.create("a@b.c", new_agent("Three", "")).await.unwrap();

        let mine = reg.list("a@b.c", DEFAULT_LIST_LIMIT).await.unwrap();
        assert_eq!(mine.len(), 2);
        assert!(mine.iter().all(|a| a.author == "a@b.c"));
        assert_eq!(reg.list("a@b.c", 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn update_reports_written_fields() {
        let reg = registry();
        let a = reg.create("a@b.c", new_agent("Old", "")).await.unwrap();
        let fields = reg
            .update(
                a.id,
                AgentUpdate {
                    name: Some("New".into()),
                    tools: Some(vec![]),
                    ..AgentUpdate::default()
                },
            )
            .await
            .unwrap();
        assert!(fields.contains(&"name".to_string()));
        assert!(fields.contains(&"tools".to_string()));
        assert!(fields.contains(&"updated_at".to_string()));

        let got = reg.get(a.id).await.unwrap();
        assert_eq!(got.name, "New");
        assert!(got.tools.is_empty());
        assert_eq!(got.system_prompt, "You are Old.");
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let reg = registry();
        let id = Uuid::new_v4();
        assert!(matches!(reg.get(id).await, Err(AgentError::NotFound(x)) if x == id));
        assert!(matches!(reg.delete(id).await, Err(AgentError::NotFound(_))));
        assert!(matches!(
            reg.update(id, AgentUpdate::default()).await,
            Err(AgentError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn other_authors_records_are_not_owned() {
        let reg = registry();
        let a = reg.create("a@b.c", new_agent("Mine", "")).await.unwrap();
        assert!(reg.get_owned(a.id, "a@b.c").await.is_ok());
        assert!(matches!(
            reg.get_owned(a.id, "x@y.z").await,
            Err(AgentError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn delete_removes_record() {
        let reg = registry();
        let a = reg.create("a@b.c", new_agent("Gone", "")).await.unwrap();
        reg.delete(a.id).await.unwrap();
        assert!(matches!(reg.get(a.id).await, Err(AgentError::NotFound(_))));
    }

    #[test]
    fn tools_decode_from_string_or_array() {
        assert_eq!(decode_tools(Some(&json!("[\"a\",\"b\"]"))), vec!["a", "b"]);
        assert_eq!(decode_tools(Some(&json!(["c"]))), vec!["c"]);
        assert!(decode_tools(Some(&json!("not json"))).is_empty());
        assert!(decode_tools(None).is_empty());
    }
}
