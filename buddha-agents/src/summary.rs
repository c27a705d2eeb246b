//! Conversation titles and summaries.

use crate::conversation::{Language, Message};
use crate::error::LlmError;
use crate::llm::LlmClient;

const TITLE_PROMPT_VI: &str = "Bạn là một trợ lý AI chuyên nghiệp trong việc tóm tắt nội dung cuộc trò chuyện.
Nhiệm vụ của bạn là tạo ra một tiêu đề ngắn gọn và súc tích (không quá 10 từ) dựa trên tin nhắn đầu tiên của cuộc trò chuyện.
Tiêu đề nên:
1. Phản ánh chính xác nội dung chính của cuộc trò chuyện
2. Ngắn gọn và dễ hiểu
3. Sử dụng ngôn ngữ tự nhiên
4. Không chứa dấu câu ở cuối câu
5. Không chứa các từ thừa như \"Cuộc trò chuyện về...\" hoặc \"Hỏi về...\"

Chỉ trả về tiêu đề, không cần giải thích thêm.";

const TITLE_PROMPT_EN: &str = "You are a professional AI assistant specialized in summarizing conversations.
Your task is to create a concise title (no more than 10 words) based on the first message of the conversation.
The title should:
1. Accurately reflect the main content of the conversation
2. Be concise and clear
3. Use natural language
4. Not end with punctuation
5. Not include filler words like \"Conversation about...\" or \"Question about...\"

Return only the title, no additional explanation.";

const DETAIL_PROMPT_VI: &str = "Bạn là một trợ lý AI chuyên nghiệp trong việc tóm tắt cuộc trò chuyện.
Hãy tạo một bản tóm tắt chi tiết về cuộc trò chuyện, bao gồm:
1. Các điểm chính được thảo luận
2. Kết luận hoặc giải pháp (nếu có)
3. Các câu hỏi quan trọng và câu trả lời

Tóm tắt nên ngắn gọn nhưng đầy đủ thông tin.";

const DETAIL_PROMPT_EN: &str = "You are a professional AI assistant specialized in summarizing conversations.
Create a detailed summary of the conversation, including:
1. Main points discussed
2. Conclusions or solutions (if any)
3. Important questions and answers

The summary should be concise but informative.";

fn transcript(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Trim whitespace and any trailing `. , ! ?`.
pub fn clean_title(raw: &str) -> String {
    raw.trim()
        .trim_end_matches(['.', ',', '!', '?'])
        .to_string()
}

/// A title of at most ten words for the conversation.
pub async fn generate_summary(
    llm: &LlmClient,
    messages: &[Message],
    language: Language,
) -> Result<String, LlmError> {
    let system = match language {
        Language::Vi => TITLE_PROMPT_VI,
        Language::En => TITLE_PROMPT_EN,
    };
    let prompt = format!("Here is the conversation:\n{}", transcript(messages));
    let raw = llm.complete(system, &prompt, 0.7, 50).await?;
    Ok(clean_title(&raw))
}

pub async fn generate_detailed_summary(
    llm: &LlmClient,
    messages: &[Message],
    language: Language,
) -> Result<String, LlmError> {
    let system = match language {
        Language::Vi => DETAIL_PROMPT_VI,
        Language::En => DETAIL_PROMPT_EN,
    };
    let raw = llm.complete(system, &transcript(messages), 0.7, 500).await?;
    Ok(raw.trim().to_string())
}
