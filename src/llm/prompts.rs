//! Prompt templates for the chat pipeline.
//!
//! Prompts are in Chinese to match the corpus language.

/// Prompt templates used by the multi-turn chat flow.
pub struct Prompts;

impl Prompts {
    /// Rewrite the latest question into a standalone sentence suitable
    /// for retrieval, using the conversation history to resolve
    /// pronouns and ellipsis.
    pub fn query_rewrite(history: &str, question: &str) -> String {
        format!(
            "你是一個搜尋語句優化專家。請參考對話歷史，將「最新問題」改寫成一個語意完整、適合搜尋的獨立句子。\n【歷史】：\n{history}\n【最新問題】：{question}\n請直接輸出改寫後的句子："
        )
    }

    /// Answer a question strictly from the retrieved context, admitting
    /// when the context is insufficient.
    pub fn grounded_answer(context: &str, question: &str) -> String {
        format!(
            "請根據以下資訊回答問題。若資訊不足請誠實回答無法回答。\n【資訊】：\n{context}\n【問題】：{question}\n回答："
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_rewrite_includes_history_and_question() {
        let prompt = Prompts::query_rewrite("問：它是什麼？\n答：是一種演算法。", "有什麼用途？");
        assert!(prompt.contains("問：它是什麼？"));
        assert!(prompt.contains("【最新問題】：有什麼用途？"));
        assert!(prompt.ends_with("請直接輸出改寫後的句子："));
    }

    #[test]
    fn test_grounded_answer_includes_context() {
        let prompt = Prompts::grounded_answer("機器學習是一種方法。", "什麼是機器學習？");
        assert!(prompt.contains("【資訊】：\n機器學習是一種方法。"));
        assert!(prompt.contains("【問題】：什麼是機器學習？"));
        assert!(prompt.ends_with("回答："));
    }
}
