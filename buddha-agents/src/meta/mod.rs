//! The agent builder: a conversational agent whose tools manage other agents.
//!
//! Each turn runs a bounded tool loop. The model is called with the tool
//! set; every tool call it makes is executed against the registry and the
//! result is fed back as a `tool` message, until the model answers in
//! plain text.

pub mod tools;

use serde::Serialize;
use serde_json::{json, Value};

use crate::conversation::{Context, Language, Message};
use crate::error::AgentError;
use crate::llm::{ChatMessage, ChatOptions, LlmClient};
use crate::registry::AgentRegistry;

pub const GREETING: &str =
    "Hello! I'm your AI Agent Builder. How can I help you create or manage AI agents today?";

const MAX_ROUNDS: usize = 8;

const SYSTEM_PROMPT: &str = "\
You are an AI Agent Builder, a specialized AI that helps users create, manage, and optimize other AI agents.

You can:
1. Create new AI agents with custom system prompts, tools, and configurations
2. Manage existing agents (list, update, delete)
3. Search for agents using semantic search
4. Generate Python code for agents
5. Test agents with sample inputs
6. Give guidance on agent design

When helping users:
- Ask clarifying questions when requirements are unclear
- Suggest appropriate tools and configurations
- Use the tools to make changes instead of describing them
- Report agent ids after creating or changing agents

Be helpful, patient and concise. Favour agents that are useful, safe and well designed.";

/// One tool invocation made while answering.
#[derive(Debug, Clone, Serialize)]
pub struct ToolAction {
    pub tool: String,
    pub input: Value,
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetaReply {
    pub reply: String,
    pub actions: Vec<ToolAction>,
}

pub struct MetaAgent {
    llm: LlmClient,
    registry: AgentRegistry,
}

impl MetaAgent {
    pub fn new(llm: LlmClient, registry: AgentRegistry) -> Self {
        Self { llm, registry }
    }

    /// Answer the last message of `messages` on behalf of `author`.
    pub async fn respond(
        &self,
        author: &str,
        messages: &[Message],
        contexts: &[Context],
        language: Language,
    ) -> Result<MetaReply, AgentError> {
        let Some((latest, history)) = messages.split_last() else {
            return Ok(MetaReply {
                reply: GREETING.to_string(),
                actions: Vec::new(),
            });
        };

        let mut chat = build_prompt(&latest.content, history, contexts, language);
        let opts = ChatOptions {
            temperature: Some(0.0),
            tools: tools::definitions(),
            ..ChatOptions::default()
        };
        let mut actions = Vec::new();

        for round in 0..MAX_ROUNDS {
            let msg = self.llm.chat(&chat, &opts).await?.into_message()?;
            if msg.tool_calls.is_empty() {
                tracing::debug!(rounds = round + 1, actions = actions.len(), "Meta agent done");
                return Ok(MetaReply {
                    reply: msg.content.unwrap_or_default(),
                    actions,
                });
            }

            let calls = msg.tool_calls.clone();
            chat.push(msg);
            for call in &calls {
                let (output, input, ok) = match call.input() {
                    Ok(input) => {
                        match tools::execute_tool(&self.registry, author, &call.function.name, &input)
                            .await
                        {
                            Ok(out) => (out, input, true),
                            Err(e) => {
                                tracing::warn!(tool = %call.function.name, error = %e, "Tool failed");
                                (json!({ "error": e.to_string() }), input, false)
                            }
                        }
                    }
                    Err(e) => (
                        json!({ "error": format!("Invalid tool arguments: {e}") }),
                        Value::Null,
                        false,
                    ),
                };
                tracing::info!(tool = %call.function.name, ok, %author, "Meta agent tool call");
                actions.push(ToolAction {
                    tool: call.function.name.clone(),
                    input,
                    ok,
                });
                chat.push(ChatMessage::tool(&call.id, &output.to_string()));
            }
        }

        Err(AgentError::TooManySteps(MAX_ROUNDS))
    }
}

fn build_prompt(
    latest: &str,
    history: &[Message],
    contexts: &[Context],
    language: Language,
) -> Vec<ChatMessage> {
    let reply_in = match language {
        Language::Vi => "Reply in Vietnamese.",
        Language::En => "Reply in English.",
    };
    let mut chat = vec![ChatMessage::system(&format!("{SYSTEM_PROMPT}\n\n{reply_in}"))];
    chat.extend(
        history
            .iter()
            .filter(|m| m.role == "user" || m.role == "assistant")
            .map(Message::to_chat),
    );

    let mut input = latest.to_string();
    if !contexts.is_empty() {
        let context_text = contexts
            .iter()
            .map(|c| format!("Context: {}", c.content))
            .collect::<Vec<_>>()
            .join("\n\n");
        input = format!("{input}\n\nRelevant context:\n{context_text}");
    }
    chat.push(ChatMessage::user(&input));
    chat
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use buddha_store::{Embedder, HashingEmbedder, LocalStore, VectorStore};

    #[tokio::test]
    async fn empty_conversation_gets_greeting() {
        let local = LocalStore::open_memory(Embedder::Hashing(HashingEmbedder::default())).unwrap();
        let llm = LlmClient::new("test".into(), "http://127.0.0.1:9");
        let registry = AgentRegistry::new(Arc::new(VectorStore::Local(local)), llm.clone());
        let meta = MetaAgent::new(llm, registry);

        let reply = meta.respond("a@b.c", &[], &[], Language::En).await.unwrap();
        assert_eq!(reply.reply, GREETING);
        assert!(reply.actions.is_empty());
    }

    #[test]
    fn prompt_keeps_history_and_appends_context() {
        let history = vec![
            Message::new("user", "hi"),
            Message::new("system", "ignored"),
            Message::new("assistant", "hello"),
        ];
        let contexts = vec![Context {
            title: "t".into(),
            content: "refund policy".into(),
        }];
        let chat = build_prompt("make a refunds bot", &history, &contexts, Language::En);
        assert_eq!(chat.len(), 4);
        assert_eq!(chat[0].role, "system");
        assert!(chat[0].content.as_deref().unwrap().ends_with("Reply in English."));
        assert_eq!(chat[1].content.as_deref(), Some("hi"));
        assert_eq!(chat[2].role, "assistant");
        assert_eq!(
            chat[3].content.as_deref(),
            Some("make a refunds bot\n\nRelevant context:\nContext: refund policy")
        );
    }
}
