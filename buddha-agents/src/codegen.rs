//! Python source for a stored agent.

use crate::registry::AgentRecord;

/// Class name for an agent: spaces removed, `-` mapped to `_`, anything else
/// that is not an identifier character dropped.
pub fn class_name(agent_name: &str) -> String {
    let mut name: String = agent_name
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == '-' { '_' } else { c })
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    if name.is_empty() {
        return "MyAgent".to_string();
    }
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert_str(0, "Agent");
    }
    name
}

/// Escape for a Python triple-quoted string.
fn escape_triple_quoted(s: &str) -> String {
    s.replace('\\', "\\\\").replace("\"\"\"", "\\\"\\\"\\\"")
}

fn escape_quoted(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

pub fn generate_agent_code(agent: &AgentRecord) -> String {
    let class = class_name(&agent.name);
    let model = escape_quoted(&agent.model);
    let prompt = escape_triple_quoted(&agent.system_prompt);
    let temperature = agent.temperature;
    let tools = agent
        .tools
        .iter()
        .map(|t| format!("\"{}\"", escape_quoted(t)))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"import os
from langchain_openai import ChatOpenAI
from langchain_core.prompts import ChatPromptTemplate
from typing import List, Dict, Any


class {class}:
    def __init__(self):
        self.model = ChatOpenAI(
            model="{model}",
            temperature={temperature}
        )
        self.system_prompt = """{prompt}"""

        # Requested tools; bind implementations here.
        self.tool_names = [{tools}]
        self.tools = []

    def generate_response(self, user_input: str, context: List[Dict[str, Any]] = None) -> str:
        """
        Generate a response using the agent.

        Args:
            user_input: The user's input
            context: Optional context information

        Returns:
            The agent's response
        """
        messages = [
            ("system", self.system_prompt),
            ("human", user_input)
        ]

        if context:
            context_text = "\n\n".join([f"Context: {{ctx.get('content', '')}}" for ctx in context])
            messages.append(("human", f"Additional context:\n{{context_text}}"))

        prompt = ChatPromptTemplate.from_messages(messages)
        chain = prompt | self.model

        response = chain.invoke({{}})
        return response.content

    def run(self, user_input: str) -> str:
        """
        Main method to run the agent.
        """
        return self.generate_response(user_input)


# Usage example
if __name__ == "__main__":
    agent = {class}()
    response = agent.run("Hello, how can you help me?")
    print(response)
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn agent(name: &str, prompt: &str) -> AgentRecord {
        AgentRecord {
            id: Uuid::new_v4(),
            name: name.into(),
            description: String::new(),
            system_prompt: prompt.into(),
            tools: vec!["web_search".into()],
            model: "gpt-4o-mini".into(),
            temperature: 0.7,
            author: "a@b.c".into(),
            status: "active".into(),
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn class_names_are_identifiers() {
        assert_eq!(class_name("Support Bot"), "SupportBot");
        assert_eq!(class_name("code-review agent"), "code_reviewagent");
        assert_eq!(class_name("3D Helper!"), "Agent3DHelper");
        assert_eq!(class_name("!!!"), "MyAgent");
    }

    #[test]
    fn code_wires_config() {
        let code = generate_agent_code(&agent("Support Bot", "Be kind."));
        assert!(code.contains("class SupportBot:"));
        assert!(code.contains("model=\"gpt-4o-mini\""));
        assert!(code.contains("temperature=0.7"));
        assert!(code.contains("self.system_prompt = \"\"\"Be kind.\"\"\""));
        assert!(code.contains("self.tool_names = [\"web_search\"]"));
        assert!(code.contains("agent = SupportBot()"));
        assert!(code.contains("chain.invoke({})"));
        assert!(code.contains("\"\\n\\n\".join"));
    }

    #[test]
    fn triple_quotes_are_escaped() {
        let code = generate_agent_code(&agent("X", "say \"\"\"hi\"\"\""));
        assert!(code.contains(r#"say \"\"\"hi\"\"\""""#));
    }
}
