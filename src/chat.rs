//! Multi-turn retrieval chat.
//!
//! Each turn rewrites the user's question into a standalone query
//! using the conversation so far, retrieves the closest chunks with
//! the rewritten query, and answers from the retrieved context only.
//! Conversation state lives in an explicit [`ConversationContext`]
//! owned by the caller; nothing is shared between conversations.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, info};

use crate::document::ChatPrompt;
use crate::embedding::Embedder;
use crate::error::Result;
use crate::index::{SearchHit, VectorIndex};
use crate::llm::{LlmClient, Prompts};

/// History shown to the rewrite prompt before the first turn.
const EMPTY_HISTORY: &str = "尚未開始對話";

/// Source reported when retrieval returns nothing.
const UNKNOWN_SOURCE: &str = "未知";

/// How many chunks each turn retrieves for context.
const CONTEXT_CHUNKS: usize = 3;

/// One completed question-answer exchange.
#[derive(Debug, Clone)]
pub struct ConversationTurn {
    pub question: String,
    pub answer: String,
}

/// The history of one conversation.
#[derive(Debug, Clone)]
pub struct ConversationContext {
    id: String,
    turns: Vec<ConversationTurn>,
}

impl ConversationContext {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            turns: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    /// Append a completed exchange.
    pub fn push_turn(&mut self, question: impl Into<String>, answer: impl Into<String>) {
        self.turns.push(ConversationTurn {
            question: question.into(),
            answer: answer.into(),
        });
    }

    /// Render the history for the rewrite prompt.
    pub fn render_history(&self) -> String {
        if self.turns.is_empty() {
            return EMPTY_HISTORY.to_string();
        }

        self.turns
            .iter()
            .map(|turn| format!("問：{}\n答：{}", turn.question, turn.answer))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// What one turn produced, alongside the updated context.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// The standalone query the question was rewritten into.
    pub rewritten_question: String,
    /// The generated answer.
    pub answer: String,
    /// Source document of the best hit, or `未知` without hits.
    pub source: String,
}

/// One row of the chat transcript written after a scripted run.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRecord {
    pub conversation_id: String,
    #[serde(rename = "questions")]
    pub question: String,
    /// The standalone query actually used for retrieval.
    pub rewritten: String,
    pub answer: String,
    pub source: String,
}

/// Retrieval chat over one ingested collection.
pub struct ChatPipeline<'a> {
    embedder: &'a dyn Embedder,
    index: &'a dyn VectorIndex,
    llm: &'a LlmClient,
    collection: String,
}

impl<'a> ChatPipeline<'a> {
    pub fn new(
        embedder: &'a dyn Embedder,
        index: &'a dyn VectorIndex,
        llm: &'a LlmClient,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            embedder,
            index,
            llm,
            collection: collection.into(),
        }
    }

    /// Answer one question within a conversation, recording the turn in
    /// the context on success.
    pub async fn answer(
        &self,
        context: &mut ConversationContext,
        question: &str,
    ) -> Result<TurnOutcome> {
        let history = context.render_history();
        let rewritten = self
            .llm
            .complete(&Prompts::query_rewrite(&history, question))
            .await?;
        debug!(
            conversation = context.id(),
            rewritten = rewritten.as_str(),
            "rewrote question"
        );

        let vector = self.embedder.embed_one(&rewritten).await?;
        let hits = self
            .index
            .query(&self.collection, &vector, CONTEXT_CHUNKS, None)
            .await?;

        // The answer prompt sees the retrieved context and the user's
        // original question; the rewrite exists only for retrieval.
        let answer = self
            .llm
            .complete(&Prompts::grounded_answer(&context_text(&hits), question))
            .await?;

        context.push_turn(question, answer.as_str());

        Ok(TurnOutcome {
            rewritten_question: rewritten,
            answer,
            source: primary_source(&hits),
        })
    }

    /// Run a scripted set of prompts in row order. Rows sharing a
    /// conversation id share history; conversations are otherwise
    /// independent.
    pub async fn run_script(&self, prompts: &[ChatPrompt]) -> Result<Vec<ChatRecord>> {
        let mut contexts: HashMap<String, ConversationContext> = HashMap::new();
        let mut records = Vec::with_capacity(prompts.len());

        for prompt in prompts {
            let context = contexts
                .entry(prompt.conversation_id.clone())
                .or_insert_with(|| ConversationContext::new(prompt.conversation_id.clone()));

            let outcome = self.answer(context, &prompt.question).await?;
            info!(
                conversation = prompt.conversation_id.as_str(),
                turn = context.turns().len(),
                source = outcome.source.as_str(),
                "answered turn"
            );

            records.push(ChatRecord {
                conversation_id: prompt.conversation_id.clone(),
                question: prompt.question.clone(),
                rewritten: outcome.rewritten_question,
                answer: outcome.answer,
                source: outcome.source,
            });
        }

        Ok(records)
    }
}

/// Join the retrieved chunk texts for the answer prompt.
fn context_text(hits: &[SearchHit]) -> String {
    hits.iter()
        .map(|hit| hit.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Source of the top hit, or the unknown marker.
fn primary_source(hits: &[SearchHit]) -> String {
    hits.first()
        .map(|hit| hit.source.clone())
        .filter(|source| !source.is_empty())
        .unwrap_or_else(|| UNKNOWN_SOURCE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(text: &str, source: &str) -> SearchHit {
        SearchHit {
            text: text.to_string(),
            source: source.to_string(),
            score: 0.9,
        }
    }

    #[test]
    fn test_empty_history_placeholder() {
        let context = ConversationContext::new("c1");
        assert_eq!(context.render_history(), "尚未開始對話");
    }

    #[test]
    fn test_history_renders_turns_in_order() {
        let mut context = ConversationContext::new("c1");
        context.push_turn("它是什麼？", "是一種演算法。");
        context.push_turn("有什麼用途？", "用於分類。");

        assert_eq!(
            context.render_history(),
            "問：它是什麼？\n答：是一種演算法。\n問：有什麼用途？\n答：用於分類。"
        );
    }

    #[test]
    fn test_contexts_are_independent() {
        let mut first = ConversationContext::new("c1");
        let second = ConversationContext::new("c2");
        first.push_turn("問題", "答案");

        assert_eq!(first.turns().len(), 1);
        assert!(second.turns().is_empty());
        assert_eq!(second.render_history(), "尚未開始對話");
    }

    #[test]
    fn test_context_text_joins_hits() {
        let hits = vec![hit("第一段。", "a"), hit("第二段。", "b")];
        assert_eq!(context_text(&hits), "第一段。\n第二段。");
        assert_eq!(context_text(&[]), "");
    }

    #[test]
    fn test_primary_source_falls_back_to_unknown() {
        assert_eq!(primary_source(&[hit("內容", "manual")]), "manual");
        assert_eq!(primary_source(&[]), "未知");
        assert_eq!(primary_source(&[hit("內容", "")]), "未知");
    }
}
