//! End-to-end ingestion and query tests with deterministic model stand-ins.

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{BagOfWordsEmbedder, ScriptedAnswerService};
use docqa_rag::{
    Answer, CallPolicy, Chunk, CollectionInfo, CollectionSpec, Document, EmbeddingProvider,
    FileVectorStore, InMemoryVectorStore, RagConfig, RagError, RagPipeline, RecursiveChunker,
    Result, RetryPolicy, SearchResult, VectorStore,
};

const INVOICE: &str = "Invoice INV-42 totals 310 euros. Payment is due within thirty days.";
const GARDEN: &str = "Sunflowers grow tall in sunny gardens during summer.";

fn config() -> RagConfig {
    RagConfig::builder().chunk_size(500).chunk_overlap(50).num_results(1).build().unwrap()
}

fn pipeline(
    config: RagConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    llm: Arc<ScriptedAnswerService>,
) -> RagPipeline {
    RagPipeline::builder()
        .chunker(Arc::new(RecursiveChunker::from_config(&config).unwrap()))
        .embedding_provider(embedder)
        .vector_store(store)
        .answer_service(llm)
        .config(config)
        .build()
        .unwrap()
}

fn corpus() -> Vec<Document> {
    vec![Document::new("invoice", INVOICE), Document::new("garden", GARDEN)]
}

/// Reports `reported` from `info` while searches reach `inner`, as when a
/// rebuild lands between a retriever's check and its search.
struct RebuiltAfterCheck {
    inner: Arc<InMemoryVectorStore>,
    reported: CollectionInfo,
}

#[async_trait]
impl VectorStore for RebuiltAfterCheck {
    async fn rebuild(&self, spec: &CollectionSpec, chunks: &[Chunk]) -> Result<CollectionInfo> {
        self.inner.rebuild(spec, chunks).await
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.inner.delete_collection(name).await
    }

    async fn info(&self, _name: &str) -> Result<Option<CollectionInfo>> {
        Ok(Some(self.reported.clone()))
    }

    async fn search_with_info(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<(CollectionInfo, Vec<SearchResult>)> {
        self.inner.search_with_info(collection, embedding, top_k).await
    }
}

#[tokio::test]
async fn retrieves_the_chunk_that_answers_the_question() {
    let llm = Arc::new(ScriptedAnswerService::replying(r#"{"invoice_number": "INV-42"}"#));
    let rag = pipeline(
        config(),
        Arc::new(BagOfWordsEmbedder::new()),
        Arc::new(InMemoryVectorStore::new()),
        Arc::clone(&llm),
    );

    let report = rag.ingest(&corpus()).await.unwrap();
    assert_eq!(report.document_count, 2);
    assert_eq!(report.chunk_count, 2);

    let outcome = rag.answer("Which invoice is due for payment?").await.unwrap();
    assert_eq!(outcome.context.len(), 1);
    assert_eq!(outcome.context[0].chunk.document_id, "invoice");

    let structured = outcome.answer.as_structured().unwrap();
    assert_eq!(structured["invoice_number"], "INV-42");

    let prompt = llm.last_prompt().unwrap();
    assert!(prompt.contains(INVOICE));
    assert!(!prompt.contains(GARDEN));
    assert!(prompt.contains("Question: Which invoice is due for payment?"));
}

#[tokio::test]
async fn json_wrapped_in_prose_is_extracted() {
    let llm = Arc::new(ScriptedAnswerService::replying(
        "Here is the answer: {\"total\": 310, \"currency\": \"EUR\"} Hope that helps.",
    ));
    let rag = pipeline(
        config(),
        Arc::new(BagOfWordsEmbedder::new()),
        Arc::new(InMemoryVectorStore::new()),
        llm,
    );
    rag.ingest(&corpus()).await.unwrap();

    let outcome = rag.answer("What does the invoice total?").await.unwrap();
    let structured = outcome.answer.as_structured().unwrap();
    assert_eq!(structured["total"], 310);
    assert_eq!(structured["currency"], "EUR");
}

#[tokio::test]
async fn malformed_json_falls_back_to_raw_text() {
    let reply = "The total is {310 euros}.";
    let llm = Arc::new(ScriptedAnswerService::replying(reply));
    let rag = pipeline(
        config(),
        Arc::new(BagOfWordsEmbedder::new()),
        Arc::new(InMemoryVectorStore::new()),
        llm,
    );
    rag.ingest(&corpus()).await.unwrap();

    let outcome = rag.answer("What does the invoice total?").await.unwrap();
    assert_eq!(outcome.answer, Answer::Raw(reply.to_string()));
}

#[tokio::test]
async fn reingesting_the_same_corpus_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let config = RagConfig::builder()
        .vector_db(dir.path())
        .chunk_size(40)
        .chunk_overlap(8)
        .num_results(2)
        .build()
        .unwrap();
    let store = Arc::new(FileVectorStore::new(dir.path()));
    let llm = Arc::new(ScriptedAnswerService::replying("{}"));
    let rag = pipeline(config, Arc::new(BagOfWordsEmbedder::new()), store.clone(), llm);

    let first = rag.ingest(&corpus()).await.unwrap();
    let second = rag.ingest(&corpus()).await.unwrap();

    assert!(first.chunk_count > 2);
    assert_eq!(first.chunk_count, second.chunk_count);
    assert_ne!(first.generation, second.generation);

    let info = store.info("rag").await.unwrap().unwrap();
    assert_eq!(info.count, first.chunk_count);
    assert_eq!(info.generation, second.generation);
}

#[tokio::test]
async fn querying_before_ingestion_reports_a_missing_collection() {
    let rag = pipeline(
        config(),
        Arc::new(BagOfWordsEmbedder::new()),
        Arc::new(InMemoryVectorStore::new()),
        Arc::new(ScriptedAnswerService::replying("{}")),
    );

    let err = rag.answer("anything").await.unwrap_err();
    assert!(matches!(err, RagError::VectorStoreError { .. }), "got {err:?}");
}

#[tokio::test]
async fn empty_ingestion_keeps_the_previous_collection() {
    let store = Arc::new(InMemoryVectorStore::new());
    let rag = pipeline(
        config(),
        Arc::new(BagOfWordsEmbedder::new()),
        store.clone(),
        Arc::new(ScriptedAnswerService::replying("{}")),
    );
    rag.ingest(&corpus()).await.unwrap();

    let err = rag.ingest(&[Document::new("blank", "")]).await.unwrap_err();
    assert!(matches!(err, RagError::IndexRebuildError { .. }));
    assert_eq!(store.info("rag").await.unwrap().unwrap().count, 2);

    let err = rag.ingest(&[]).await.unwrap_err();
    assert!(matches!(err, RagError::IndexRebuildError { .. }));
    assert_eq!(rag.retrieve("invoice payment").await.unwrap().len(), 1);
}

#[tokio::test]
async fn queries_with_another_embedding_model_are_rejected() {
    let store: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new());
    let writer = pipeline(
        config(),
        Arc::new(BagOfWordsEmbedder::named("model-a")),
        Arc::clone(&store),
        Arc::new(ScriptedAnswerService::replying("{}")),
    );
    writer.ingest(&corpus()).await.unwrap();

    let reader = pipeline(
        config(),
        Arc::new(BagOfWordsEmbedder::named("model-b")),
        store,
        Arc::new(ScriptedAnswerService::replying("{}")),
    );
    let err = reader.answer("Which invoice is due?").await.unwrap_err();
    assert!(matches!(err, RagError::ConfigError(_)), "got {err:?}");
}

#[tokio::test]
async fn a_rebuild_by_another_model_after_the_check_is_rejected() {
    let inner = Arc::new(InMemoryVectorStore::new());
    let llm = Arc::new(ScriptedAnswerService::replying("{}"));
    pipeline(config(), Arc::new(BagOfWordsEmbedder::named("model-a")), inner.clone(), llm.clone())
        .ingest(&corpus())
        .await
        .unwrap();
    let reported = inner.info("rag").await.unwrap().unwrap();
    pipeline(config(), Arc::new(BagOfWordsEmbedder::named("model-b")), inner.clone(), llm.clone())
        .ingest(&corpus())
        .await
        .unwrap();

    let store = Arc::new(RebuiltAfterCheck { inner, reported });
    let reader =
        pipeline(config(), Arc::new(BagOfWordsEmbedder::named("model-a")), store, llm.clone());
    let err = reader.answer("Which invoice is due?").await.unwrap_err();
    assert!(matches!(err, RagError::ConfigError(_)), "got {err:?}");
    assert!(llm.last_prompt().is_none());
}

#[tokio::test]
async fn unnormalized_vectors_from_a_normalizing_provider_are_refused() {
    let store = Arc::new(InMemoryVectorStore::new());
    let rag = pipeline(
        config(),
        Arc::new(BagOfWordsEmbedder::misreporting()),
        store.clone(),
        Arc::new(ScriptedAnswerService::replying("{}")),
    );

    let err = rag.ingest(&corpus()).await.unwrap_err();
    assert!(matches!(err, RagError::EmbeddingError { .. }), "got {err:?}");
    assert!(store.info("rag").await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn slow_generation_times_out() {
    let llm = Arc::new(ScriptedAnswerService::slow(Duration::from_secs(30)));
    let config = config();
    let rag = RagPipeline::builder()
        .chunker(Arc::new(RecursiveChunker::from_config(&config).unwrap()))
        .embedding_provider(Arc::new(BagOfWordsEmbedder::new()))
        .vector_store(Arc::new(InMemoryVectorStore::new()))
        .answer_service(llm.clone())
        .call_policy(CallPolicy { timeout: Duration::from_secs(5), retry: RetryPolicy::none() })
        .config(config)
        .build()
        .unwrap();
    rag.ingest(&corpus()).await.unwrap();

    let err = rag.answer("Which invoice is due?").await.unwrap_err();
    match err {
        RagError::ServiceTimeout { service, timeout } => {
            assert_eq!(service, "answer service");
            assert_eq!(timeout, Duration::from_secs(5));
        }
        other => panic!("expected a timeout, got {other:?}"),
    }
    assert_eq!(llm.prompts.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn timed_out_generation_is_retried_when_configured() {
    let llm = Arc::new(ScriptedAnswerService::slow(Duration::from_secs(30)));
    let config = config();
    let rag = RagPipeline::builder()
        .chunker(Arc::new(RecursiveChunker::from_config(&config).unwrap()))
        .embedding_provider(Arc::new(BagOfWordsEmbedder::new()))
        .vector_store(Arc::new(InMemoryVectorStore::new()))
        .answer_service(llm.clone())
        .call_policy(CallPolicy { timeout: Duration::from_secs(5), retry: RetryPolicy::new(2) })
        .config(config)
        .build()
        .unwrap();
    rag.ingest(&corpus()).await.unwrap();

    assert!(matches!(
        rag.answer("Which invoice is due?").await,
        Err(RagError::ServiceTimeout { .. })
    ));
    assert_eq!(llm.prompts.lock().unwrap().len(), 3);
}

#[test]
fn builder_requires_every_component() {
    let err = RagPipeline::builder().config(config()).build().err().unwrap();
    assert!(matches!(err, RagError::ConfigError(_)));

    let err = RagPipeline::builder()
        .embedding_provider(Arc::new(BagOfWordsEmbedder::new()))
        .build()
        .err()
        .unwrap();
    assert!(matches!(err, RagError::ConfigError(ref m) if m.contains("config")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn queries_succeed_while_the_collection_is_rebuilt() {
    let dir = tempfile::tempdir().unwrap();
    let config = RagConfig::builder().vector_db(dir.path()).num_results(1).build().unwrap();
    let rag = Arc::new(pipeline(
        config,
        Arc::new(BagOfWordsEmbedder::new()),
        Arc::new(FileVectorStore::new(dir.path())),
        Arc::new(ScriptedAnswerService::replying(r#"{"ok": true}"#)),
    ));
    rag.ingest(&corpus()).await.unwrap();

    let writer = {
        let rag = Arc::clone(&rag);
        tokio::spawn(async move {
            for _ in 0..10 {
                rag.ingest(&corpus()).await.unwrap();
            }
        })
    };

    let mut readers = Vec::new();
    for _ in 0..3 {
        let rag = Arc::clone(&rag);
        readers.push(tokio::spawn(async move {
            for _ in 0..20 {
                let outcome = rag.answer("Which invoice is due for payment?").await.unwrap();
                assert_eq!(outcome.context.len(), 1);
                assert_eq!(outcome.context[0].chunk.document_id, "invoice");
            }
        }));
    }

    writer.await.unwrap();
    for reader in readers {
        reader.await.unwrap();
    }
}

const LONG_INVOICE: &str = "Invoice INV-42 was issued by Acme Corporation on the third of March. \
    The total amount is 310 euros including tax. Payment is due within thirty days by bank transfer.";
const LONG_GARDEN: &str =
    "Sunflowers grow tall in sunny gardens during summer. Bees visit the bright yellow petals every morning.";

#[tokio::test]
async fn text_spanning_a_chunk_boundary_retrieves_its_document() {
    let dir = tempfile::tempdir().unwrap();
    let config =
        RagConfig::builder().chunk_size(40).chunk_overlap(8).num_results(2).build().unwrap();
    let windows = RecursiveChunker::from_config(&config).unwrap().split_text(LONG_INVOICE);
    assert!(windows.len() > 2, "expected several chunks, got {}", windows.len());

    let rag = pipeline(
        config,
        Arc::new(BagOfWordsEmbedder::new()),
        Arc::new(FileVectorStore::new(dir.path())),
        Arc::new(ScriptedAnswerService::replying("{}")),
    );
    let documents =
        vec![Document::new("invoice", LONG_INVOICE), Document::new("garden", LONG_GARDEN)];
    let report = rag.ingest(&documents).await.unwrap();
    assert!(report.chunk_count > windows.len());

    let chars: Vec<char> = LONG_INVOICE.chars().collect();
    for pair in windows.windows(2) {
        let (start, text) = pair[0];
        let end = start + text.chars().count();
        let span = end.saturating_sub(12)..(end + 12).min(chars.len());
        let query: String = chars[span].iter().collect();
        assert!(LONG_INVOICE.contains(&query));
        assert!(!pair[0].1.contains(&query) && !pair[1].1.contains(&query), "{query:?}");

        let results = rag.retrieve(&query).await.unwrap();
        assert!(
            results.iter().any(|r| r.chunk.document_id == "invoice"),
            "{query:?} retrieved {:?}",
            results.iter().map(|r| &r.chunk.id).collect::<Vec<_>>()
        );
    }
}
