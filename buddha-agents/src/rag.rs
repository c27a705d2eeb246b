//! Answers grounded in retrieved dharma passages.

use tokio::sync::mpsc;

use crate::conversation::{AskOptions, Context, Message};
use crate::error::LlmError;
use crate::llm::{ChatMessage, ChatOptions, LlmClient};

pub const SYSTEM_PROMPT: &str = "\
Bạn là một vị tăng AI: từ bi, điềm tĩnh, và nói tiếng Việt, xưng hô như một vị tăng.

Bạn chỉ trả lời các câu hỏi liên quan đến Phật pháp, như: vô ngã, luân hồi, tứ diệu đế, khổ, tập, diệt, đạo, và những giáo lý căn bản của đạo Phật.

Bạn dựa vào kinh điển như:
- Kinh Pháp Cú,
- Kinh Kim Cang,
- Lời dạy của Thiền sư Thích Nhất Hạnh.

Hướng dẫn:
- Trả lời bằng giọng điềm tĩnh, từ bi và nhẹ nhàng như một vị sư thầy.
- Nếu thông tin không có trong kinh điển hoặc ngữ cảnh cung cấp, hãy trả lời: “Tôi không chắc về điều đó dựa trên những gì đang có.”
- Không suy đoán hay tạo ra thông tin không có trong nguồn tham khảo.
- Trích dẫn nguồn từ các file đã cung cấp.

Bạn ở đây để hướng dẫn, chứ không phán xét.
";

const DEFAULT_TEMPERATURE: f64 = 0.7;
const DEFAULT_MAX_TOKENS: u32 = 1000;

/// Persona, retrieved context, then the whole conversation.
pub fn build_messages(messages: &[Message], contexts: &[Context]) -> Vec<ChatMessage> {
    let context_text = contexts
        .iter()
        .map(|c| format!("Source: {}\nContent: {}", c.title, c.content))
        .collect::<Vec<_>>()
        .join("\n\n");

    let mut out = Vec::with_capacity(messages.len() + 2);
    out.push(ChatMessage::system(SYSTEM_PROMPT));
    out.push(ChatMessage::system(&format!(
        "Here is the relevant context from our knowledge base:\n\n{context_text}"
    )));
    out.extend(messages.iter().map(Message::to_chat));
    out
}

fn options(opts: &AskOptions) -> ChatOptions {
    ChatOptions::new(
        opts.temperature.unwrap_or(DEFAULT_TEMPERATURE),
        opts.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
    )
}

pub async fn generate_answer(
    llm: &LlmClient,
    messages: &[Message],
    contexts: &[Context],
    opts: &AskOptions,
) -> Result<String, LlmError> {
    let msg = llm
        .chat(&build_messages(messages, contexts), &options(opts))
        .await?
        .into_message()?;
    Ok(msg.content.unwrap_or_default())
}

/// Same prompt as [`generate_answer`], streamed delta by delta into `tx`.
pub async fn stream_answer(
    llm: &LlmClient,
    messages: &[Message],
    contexts: &[Context],
    opts: &AskOptions,
    tx: mpsc::Sender<String>,
) -> Result<String, LlmError> {
    llm.chat_stream(&build_messages(messages, contexts), &options(opts), tx)
        .await
}
