//! Long-lived service handles, built once at startup.
//!
//! [`Services::open`] connects the database, runs migrations, and builds
//! the store, embedder, generator, chat log sink, chunker, and responder
//! from configuration. Everything is shared through `Arc`, so request
//! handlers and background jobs hold cheap clones. Tests assemble the same
//! struct from fakes with [`Services::from_parts`].

use anyhow::Result;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use socratic_tutor_core::chunk::HeadingChunker;
use socratic_tutor_core::embedding::Embedder;
use socratic_tutor_core::generation::Generator;
use socratic_tutor_core::responder::Responder;
use socratic_tutor_core::store::VectorStore;

use crate::chat_log::{self, ChatLogSink};
use crate::config::Config;
use crate::db;
use crate::embedding::create_embedder;
use crate::generation::{create_generator, DisabledGenerator};
use crate::migrate;
use crate::retry::RetryPolicy;
use crate::sqlite_store::SqliteStore;

#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn VectorStore>,
    pub embedder: Arc<dyn Embedder>,
    pub generator: Arc<dyn Generator>,
    pub chat_log: Arc<dyn ChatLogSink>,
    pub responder: Arc<Responder>,
    pub chunker: Arc<HeadingChunker>,
    pub retry: RetryPolicy,
    pub embed_batch_size: usize,
    pub chat_log_timeout: Duration,
    pool: Option<SqlitePool>,
}

impl Services {
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;

        let store: Arc<dyn VectorStore> = Arc::new(SqliteStore::new(
            pool.clone(),
            config.retrieval.collection.clone(),
        ));
        let embedder = create_embedder(&config.embedding)?;
        // Chat degrades to the fallback message; ingestion does not need a generator.
        let generator = match create_generator(&config.generation) {
            Ok(g) => g,
            Err(e) => {
                warn!(provider = %config.generation.provider, error = %e, "generation unavailable");
                Arc::new(DisabledGenerator) as Arc<dyn Generator>
            }
        };
        let chat_log = chat_log::create_sink(&config.chat_log, &pool)?;

        info!(
            db = %config.db.path.display(),
            collection = %config.retrieval.collection,
            embedder = embedder.model_name(),
            generator = generator.model_name(),
            chat_log = chat_log.name(),
            "services ready"
        );

        let mut services = Self::from_parts(config, store, embedder, generator, chat_log)?;
        services.pool = Some(pool);
        Ok(services)
    }

    pub fn from_parts(
        config: &Config,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        chat_log: Arc<dyn ChatLogSink>,
    ) -> Result<Self> {
        let responder = Responder::new(embedder.clone(), store.clone(), generator.clone())
            .with_template(config.generation.prompt_template()?)
            .with_messages(config.generation.messages())
            .with_top_k(config.retrieval.top_k);

        Ok(Self {
            store,
            embedder,
            generator,
            chat_log,
            responder: Arc::new(responder),
            chunker: Arc::new(config.chunking.chunker()?),
            retry: RetryPolicy::from_config(&config.ingest),
            embed_batch_size: config.embedding.batch_size,
            chat_log_timeout: config.chat_log.timeout(),
            pool: None,
        })
    }

    pub fn pool(&self) -> Option<&SqlitePool> {
        self.pool.as_ref()
    }

    /// Flush and close the database pool.
    pub async fn close(&self) {
        if let Some(pool) = &self.pool {
            pool.close().await;
        }
    }
}
