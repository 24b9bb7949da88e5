//! Retrieval-augmented responder.
//!
//! Stateless per call: encode the question, search the target document,
//! render the Socratic prompt, and delegate to the generator. Every way
//! this can go wrong maps to a [`ReplyOutcome`] instead of an error, so
//! callers always have text to show the student.
//!
//! | Situation | Outcome | Text |
//! |-----------|---------|------|
//! | generation succeeded | [`ReplyOutcome::Answered`] | model output |
//! | nothing retrieved | [`ReplyOutcome::NoContext`] | no-context message |
//! | store read failed | [`ReplyOutcome::RetrievalDegraded`] | no-context message |
//! | embedding or generation failed | [`ReplyOutcome::Fallback`] | fallback message |

use std::sync::Arc;

use serde::Serialize;

use crate::embedding::{embed_query, Embedder};
use crate::generation::Generator;
use crate::models::{ConversationTurn, SearchHit};
use crate::prompt::{PromptTemplate, ReplyMessages};
use crate::store::{VectorStore, DEFAULT_TOP_K};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum ReplyOutcome {
    Answered,
    NoContext,
    /// The store could not be read; answered as if nothing was found.
    RetrievalDegraded(String),
    /// Embedding or generation failed.
    Fallback(String),
}

#[derive(Debug, Clone)]
pub struct TutorReply {
    pub text: String,
    pub outcome: ReplyOutcome,
    /// Chunks the answer was grounded on, best first.
    pub hits: Vec<SearchHit>,
}

pub struct Responder {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    generator: Arc<dyn Generator>,
    template: PromptTemplate,
    messages: ReplyMessages,
    top_k: usize,
}

impl Responder {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        generator: Arc<dyn Generator>,
    ) -> Self {
        Self {
            embedder,
            store,
            generator,
            template: PromptTemplate::default(),
            messages: ReplyMessages::default(),
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }

    pub fn with_messages(mut self, messages: ReplyMessages) -> Self {
        self.messages = messages;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Answer `question` about the document `source_id`.
    pub async fn respond(
        &self,
        question: &str,
        history: &[ConversationTurn],
        source_id: &str,
    ) -> TutorReply {
        let query = match embed_query(self.embedder.as_ref(), question).await {
            Ok(v) => v,
            Err(e) => return self.fallback(e.to_string(), Vec::new()),
        };

        let hits = match self.store.search(&query, Some(source_id), self.top_k).await {
            Ok(hits) => hits,
            Err(e) => {
                return TutorReply {
                    text: self.messages.no_context.clone(),
                    outcome: ReplyOutcome::RetrievalDegraded(e.to_string()),
                    hits: Vec::new(),
                }
            }
        };

        let context = hits
            .iter()
            .map(|h| h.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        if context.trim().is_empty() {
            return TutorReply {
                text: self.messages.no_context.clone(),
                outcome: ReplyOutcome::NoContext,
                hits,
            };
        }

        let prompt = self.template.render(&context, history, question);
        match self.generator.generate(&prompt).await {
            Ok(text) => TutorReply {
                text,
                outcome: ReplyOutcome::Answered,
                hits,
            },
            Err(e) => self.fallback(e.to_string(), hits),
        }
    }

    fn fallback(&self, reason: String, hits: Vec<SearchHit>) -> TutorReply {
        TutorReply {
            text: self.messages.fallback.clone(),
            outcome: ReplyOutcome::Fallback(reason),
            hits,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::error::{EmbeddingError, GenerationError, StoreError};
    use crate::models::Chunk;
    use crate::prompt::{DEFAULT_FALLBACK_MESSAGE, DEFAULT_NO_CONTEXT_MESSAGE};
    use crate::store::memory::InMemoryStore;

    /// Maps text onto two axes: mentions of "fine" vs everything else.
    struct KeywordEmbedder {
        fail: bool,
    }

    #[async_trait]
    impl Embedder for KeywordEmbedder {
        fn model_name(&self) -> &str {
            "keyword"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            if self.fail {
                return Err(EmbeddingError::Transport("connection refused".into()));
            }
            Ok(texts
                .iter()
                .map(|t| {
                    if t.to_lowercase().contains("fine") {
                        vec![1.0, 0.1]
                    } else {
                        vec![0.1, 1.0]
                    }
                })
                .collect())
        }
    }

    struct RecordingGenerator {
        prompts: Mutex<Vec<String>>,
        fail: bool,
    }

    impl RecordingGenerator {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                prompts: Mutex::new(Vec::new()),
                fail,
            })
        }
        fn calls(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Generator for RecordingGenerator {
        fn model_name(&self) -> &str {
            "recording"
        }
        async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            if self.fail {
                return Err(GenerationError::Api {
                    status: 500,
                    body: "boom".into(),
                });
            }
            Ok("What does Section 183 say about the amount?".to_string())
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl VectorStore for BrokenStore {
        async fn upsert(
            &self,
            _: &str,
            _: &[Chunk],
            _: &[Vec<f32>],
        ) -> Result<usize, StoreError> {
            Err(StoreError::unavailable("down"))
        }
        async fn search(
            &self,
            _: &[f32],
            _: Option<&str>,
            _: usize,
        ) -> Result<Vec<SearchHit>, StoreError> {
            Err(StoreError::unavailable("down"))
        }
        async fn list_sources(&self) -> Result<Vec<String>, StoreError> {
            Err(StoreError::unavailable("down"))
        }
        async fn chunk_count(&self, _: &str) -> Result<usize, StoreError> {
            Err(StoreError::unavailable("down"))
        }
    }

    const CHUNK: &str = "Regarding Amendment of section 183.: The fine is Rs 1000.";

    async fn seeded_store() -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        let chunks = vec![
            Chunk::new("X.pdf", 0, CHUNK, Some("Amendment of section 183.")),
            Chunk::new("X.pdf", 1, "Registration of vehicles is covered elsewhere.", None),
        ];
        store
            .upsert("X.pdf", &chunks, &[vec![1.0, 0.1], vec![0.1, 1.0]])
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn answered_prompt_contains_question_and_chunk() {
        let generator = RecordingGenerator::new(false);
        let responder = Responder::new(
            Arc::new(KeywordEmbedder { fail: false }),
            seeded_store().await,
            generator.clone(),
        );
        let history = vec![ConversationTurn::student("hi"), ConversationTurn::tutor("Hello!")];
        let reply = responder.respond("what is the fine", &history, "X.pdf").await;

        assert_eq!(reply.outcome, ReplyOutcome::Answered);
        assert_eq!(reply.text, "What does Section 183 say about the amount?");
        assert_eq!(reply.hits[0].text, CHUNK);

        let prompts = generator.calls();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("what is the fine"));
        assert!(prompts[0].contains(CHUNK));
        assert!(prompts[0].contains("Student: hi\nTutor: Hello!"));
    }

    #[tokio::test]
    async fn unknown_document_gets_no_context_without_generation() {
        let generator = RecordingGenerator::new(false);
        let responder = Responder::new(
            Arc::new(KeywordEmbedder { fail: false }),
            seeded_store().await,
            generator.clone(),
        );
        let reply = responder.respond("what is the fine", &[], "missing.pdf").await;
        assert_eq!(reply.outcome, ReplyOutcome::NoContext);
        assert_eq!(reply.text, DEFAULT_NO_CONTEXT_MESSAGE);
        assert!(generator.calls().is_empty());
    }

    #[tokio::test]
    async fn store_failure_degrades_to_no_context() {
        let generator = RecordingGenerator::new(false);
        let responder = Responder::new(
            Arc::new(KeywordEmbedder { fail: false }),
            Arc::new(BrokenStore),
            generator.clone(),
        );
        let reply = responder.respond("q", &[], "X.pdf").await;
        assert!(matches!(reply.outcome, ReplyOutcome::RetrievalDegraded(_)));
        assert_eq!(reply.text, DEFAULT_NO_CONTEXT_MESSAGE);
        assert!(generator.calls().is_empty());
    }

    #[tokio::test]
    async fn generation_failure_returns_fallback() {
        let responder = Responder::new(
            Arc::new(KeywordEmbedder { fail: false }),
            seeded_store().await,
            RecordingGenerator::new(true),
        );
        let reply = responder.respond("what is the fine", &[], "X.pdf").await;
        assert!(matches!(reply.outcome, ReplyOutcome::Fallback(_)));
        assert_eq!(reply.text, DEFAULT_FALLBACK_MESSAGE);
        assert!(!reply.hits.is_empty());
    }

    #[tokio::test]
    async fn embedding_failure_returns_fallback() {
        let generator = RecordingGenerator::new(false);
        let responder = Responder::new(
            Arc::new(KeywordEmbedder { fail: true }),
            seeded_store().await,
            generator.clone(),
        );
        let reply = responder.respond("q", &[], "X.pdf").await;
        assert!(matches!(reply.outcome, ReplyOutcome::Fallback(_)));
        assert!(generator.calls().is_empty());
    }

    #[tokio::test]
    async fn custom_messages_and_top_k() {
        let responder = Responder::new(
            Arc::new(KeywordEmbedder { fail: false }),
            seeded_store().await,
            RecordingGenerator::new(false),
        )
        .with_top_k(1)
        .with_messages(ReplyMessages {
            no_context: "nothing here".into(),
            fallback: "oops".into(),
        });
        let reply = responder.respond("what is the fine", &[], "X.pdf").await;
        assert_eq!(reply.hits.len(), 1);
        let reply = responder.respond("what is the fine", &[], "nope.pdf").await;
        assert_eq!(reply.text, "nothing here");
    }
}
