//! End-to-end tests: build, persist, retrieve, evaluate, answer.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use proptest::prelude::*;
use sejarah_rag::persist::{METADATA_FILE, VECTOR_FILE, current_generation};
use sejarah_rag::{
    QualityIssue, QueryExpander, RagChain, RagConfig, RagError, RetrievalQuality, RetrievedContext,
    Retriever, VectorIndex, evaluate,
};

use common::{
    EchoGenerator, FailingEmbedder, FailingGenerator, KeywordEmbedder, TableEmbedder, chunk, corpus,
};

fn retriever(index: Arc<VectorIndex>, embedder: Arc<KeywordEmbedder>, config: RagConfig) -> Retriever {
    Retriever::builder().config(config).index(index).embedding_provider(embedder).build().unwrap()
}

async fn keyword_index(embedder: &KeywordEmbedder) -> Arc<VectorIndex> {
    Arc::new(VectorIndex::build(corpus(), embedder, 2).await.unwrap())
}

#[tokio::test]
async fn three_vector_scenario_ranks_exactly() {
    let embedder = TableEmbedder::new([
        ("timur", vec![1.0, 0.0]),
        ("utara", vec![0.0, 1.0]),
        ("timur laut", vec![0.7, 0.7]),
    ]);
    let chunks = vec![
        chunk("Timur", 0, 1, "timur"),
        chunk("Utara", 0, 1, "utara"),
        chunk("Timur Laut", 0, 1, "timur laut"),
    ];
    let index = VectorIndex::build(chunks, &embedder, 32).await.unwrap();

    let results = index.search(&[1.0, 0.0], 2, 0.5).await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].chunk_id, "timur_chunk_0");
    assert!((results[0].score - 1.0).abs() < 1e-6);
    assert_eq!(results[1].chunk_id, "timur_laut_chunk_0");
    assert!((results[1].score - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-3);
}

#[tokio::test]
async fn build_from_zero_chunks_is_empty_input() {
    let err = VectorIndex::build(Vec::new(), &KeywordEmbedder::new(), 32).await.unwrap_err();
    assert!(matches!(err, RagError::EmptyInput(_)));
}

#[tokio::test]
async fn build_propagates_embedder_failure() {
    let err = VectorIndex::build(corpus(), &FailingEmbedder, 32).await.unwrap_err();
    assert!(matches!(err, RagError::ExternalService { .. }));
}

#[tokio::test]
async fn build_batches_preserve_order() {
    let embedder = KeywordEmbedder::new();
    let index = VectorIndex::build(corpus(), &embedder, 2).await.unwrap();
    assert_eq!(embedder.calls(), 5);
    let ids: Vec<String> = index.chunks().await.into_iter().map(|c| c.id).collect();
    let expected: Vec<String> = corpus().into_iter().map(|c| c.id).collect();
    assert_eq!(ids, expected);
}

#[tokio::test]
async fn restore_with_only_metadata_fails_loudly() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vector_db");
    let embedder = KeywordEmbedder::new();
    keyword_index(&embedder).await.persist(&path).await.unwrap();
    let generation = current_generation(&path).unwrap();
    std::fs::remove_file(generation.join(VECTOR_FILE)).unwrap();
    assert!(generation.join(METADATA_FILE).exists());

    let err = VectorIndex::restore(&path, "keyword-fake").await.unwrap_err();
    assert!(matches!(err, RagError::Corrupt { .. } | RagError::NotFound { .. }));
    assert!(!err.is_recoverable_by_rebuild());
}

#[tokio::test]
async fn restore_from_missing_directory_is_recoverable() {
    let dir = tempfile::tempdir().unwrap();
    let err = VectorIndex::restore(&dir.path().join("vector_db"), "keyword-fake").await.unwrap_err();
    assert!(matches!(err, RagError::NotFound { .. }));
    assert!(err.is_recoverable_by_rebuild());
}

#[tokio::test]
async fn restore_rejects_other_model() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vector_db");
    keyword_index(&KeywordEmbedder::new()).await.persist(&path).await.unwrap();
    let err = VectorIndex::restore(&path, "another-model").await.unwrap_err();
    assert!(matches!(err, RagError::ModelMismatch { .. }));
}

#[tokio::test]
async fn reload_swaps_in_persisted_index() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vector_db");
    let embedder = KeywordEmbedder::new();
    keyword_index(&embedder).await.persist(&path).await.unwrap();

    let live = VectorIndex::empty("keyword-fake");
    live.reload(&path, "keyword-fake").await.unwrap();
    assert_eq!(live.len().await, 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn restore_during_repeated_persist_sees_whole_index() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vector_db");
    let index = keyword_index(&KeywordEmbedder::new()).await;
    index.persist(&path).await.unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let reader = {
        let (done, path) = (done.clone(), path.clone());
        tokio::spawn(async move {
            let mut restores = 0usize;
            while !done.load(Ordering::SeqCst) {
                let restored = VectorIndex::restore(&path, "keyword-fake").await?;
                assert_eq!(restored.len().await, 5);
                restores += 1;
            }
            Ok::<_, RagError>(restores)
        })
    };

    for _ in 0..150 {
        index.persist(&path).await.unwrap();
    }
    done.store(true, Ordering::SeqCst);

    let restores = reader.await.unwrap().unwrap();
    assert!(restores > 0);
    assert_eq!(std::fs::read_dir(&path).unwrap().count(), 2);
}

#[test]
fn proklamasi_expands_to_related_phrases() {
    let variants = QueryExpander::new().expand("proklamasi");
    assert_eq!(variants[0], "proklamasi");
    assert!(variants.iter().any(|v| v == "proklamasi kemerdekaan"));
    assert!(variants.iter().any(|v| v == "17 agustus 1945"));
}

#[tokio::test]
async fn chunk_hit_by_several_variants_appears_once() {
    let embedder = Arc::new(KeywordEmbedder::new());
    let index = keyword_index(&embedder).await;
    let config = RagConfig::builder().top_k(3).min_score(0.0).build().unwrap();
    let retriever = retriever(index, embedder, config);

    let context = retriever.retrieve("proklamasi").await.unwrap();
    assert!(context.chunk_count <= 3);
    let ids: Vec<&str> = context.parts.iter().map(|p| p.chunk_id.as_str()).collect();
    let occurrences =
        ids.iter().filter(|id| **id == "proklamasi_kemerdekaan_indonesia_chunk_0").count();
    assert_eq!(occurrences, 1);
    let mut unique = ids.clone();
    unique.sort_unstable();
    unique.dedup();
    assert_eq!(unique.len(), ids.len());
    for pair in context.parts.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

/// Two chunks on orthogonal axes; the raw query `q` leans towards `y`, its
/// expansion `v` points exactly at `x`.
async fn two_variant_retriever(min_score: f32) -> Retriever {
    let embedder = Arc::new(TableEmbedder::new([
        ("x", vec![1.0, 0.0]),
        ("y", vec![0.0, 1.0]),
        ("q", vec![0.6, 0.8]),
        ("v", vec![1.0, 0.0]),
    ]));
    let chunks = vec![chunk("X", 0, 1, "x"), chunk("Y", 0, 1, "y")];
    let index = Arc::new(VectorIndex::build(chunks, &*embedder, 8).await.unwrap());
    Retriever::builder()
        .config(RagConfig::builder().top_k(2).min_score(min_score).build().unwrap())
        .index(index)
        .embedding_provider(embedder)
        .expander(QueryExpander::with_table([("q", vec!["v".to_string()])]))
        .build()
        .unwrap()
}

fn scored_ids(context: &RetrievedContext) -> Vec<(&str, f32)> {
    context.parts.iter().map(|p| (p.chunk_id.as_str(), p.score)).collect()
}

#[tokio::test]
async fn first_variant_score_wins_on_merge() {
    let retriever = two_variant_retriever(0.0).await;
    let context = retriever.retrieve("q").await.unwrap();

    let parts = scored_ids(&context);
    assert_eq!(parts.len(), 2);
    assert_eq!(parts[0].0, "y_chunk_0");
    assert!((parts[0].1 - 0.8).abs() < 1e-5);
    // `v` scores x at 1.0, but the raw query saw it first at 0.6.
    assert_eq!(parts[1].0, "x_chunk_0");
    assert!((parts[1].1 - 0.6).abs() < 1e-5);
}

#[tokio::test]
async fn variant_above_threshold_rescues_chunk() {
    let retriever = two_variant_retriever(0.7).await;
    let context = retriever.retrieve("q").await.unwrap();

    let parts = scored_ids(&context);
    assert_eq!(parts.len(), 2);
    assert_eq!(parts[0].0, "x_chunk_0");
    assert!((parts[0].1 - 1.0).abs() < 1e-5);
    assert_eq!(parts[1].0, "y_chunk_0");
    for part in &context.parts {
        assert!(part.score >= 0.7);
    }
}

#[tokio::test]
async fn retrieval_with_foreign_embedder_is_model_mismatch() {
    let index = keyword_index(&KeywordEmbedder::new()).await;
    let embedder = Arc::new(TableEmbedder::new([("proklamasi", vec![0.0; 13])]));
    let retriever = Retriever::builder().index(index).embedding_provider(embedder).build().unwrap();

    let err = retriever.retrieve("proklamasi").await.unwrap_err();
    assert!(matches!(
        err,
        RagError::ModelMismatch { ref expected, ref found }
            if expected == "table-fake" && found == "keyword-fake"
    ));
}

#[tokio::test]
async fn relevant_sources_reach_below_retrieval_threshold() {
    let embedder = Arc::new(TableEmbedder::new([
        ("x", vec![1.0, 0.0]),
        ("y", vec![0.0, 1.0]),
        ("q", vec![0.15, 0.99]),
    ]));
    let chunks = vec![chunk("X", 0, 1, "x"), chunk("Y", 0, 1, "y")];
    let index = Arc::new(VectorIndex::build(chunks, &*embedder, 8).await.unwrap());
    let retriever = Retriever::builder().index(index).embedding_provider(embedder).build().unwrap();
    assert!(retriever.config().min_score > 0.15);

    let context = retriever.retrieve_with("q", 2, retriever.config().min_score, 3000).await.unwrap();
    assert_eq!(context.chunk_count, 1);

    let sources = retriever.relevant_sources("q", 2).await.unwrap();
    let titles: Vec<&str> = sources.iter().map(|s| s.title.as_str()).collect();
    assert_eq!(titles, vec!["Y", "X"]);
    assert!(sources[1].relevance_score >= sejarah_rag::retriever::SOURCE_MIN_SCORE);
}

#[tokio::test]
async fn empty_query_skips_embedding() {
    let embedder = Arc::new(KeywordEmbedder::new());
    let index = keyword_index(&embedder).await;
    let before = embedder.calls();
    let retriever = retriever(index, embedder.clone(), RagConfig::default());

    let context = retriever.retrieve("  @#$%  ").await.unwrap();
    assert!(context.is_empty());
    assert_eq!(context.assembled_text, "");
    assert_eq!(embedder.calls(), before);
}

#[tokio::test]
async fn no_match_is_empty_context_graded_poor() {
    let embedder = Arc::new(KeywordEmbedder::new());
    let index = keyword_index(&embedder).await;
    let config = RagConfig::builder().min_score(0.99).build().unwrap();
    let retriever = retriever(index, embedder, config);

    let context = retriever.retrieve("siapa pahlawan nasional").await.unwrap();
    assert!(context.is_empty());
    assert_eq!(context.average_score, 0.0);
    let report = retriever.evaluate(&context);
    assert_eq!(report.quality, RetrievalQuality::Poor);
    assert!(report.has_issue(QualityIssue::NoRelevantContext));
}

#[tokio::test]
async fn relevant_sources_are_unique_per_title() {
    let embedder = Arc::new(KeywordEmbedder::new());
    let index = keyword_index(&embedder).await;
    let retriever = retriever(index, embedder, RagConfig::default());

    let sources = retriever.relevant_sources("proklamasi", 5).await.unwrap();
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0].title, "Proklamasi Kemerdekaan Indonesia");
    assert_eq!(sources[0].source_type, "Wikipedia");
}

#[tokio::test]
async fn added_document_is_searchable() {
    let embedder = Arc::new(KeywordEmbedder::new());
    let index = keyword_index(&embedder).await;
    let position = index
        .add_document("Catatan Revolusi", "Revolusi revolusi revolusi nasional.", "Catatan", &*embedder)
        .await
        .unwrap();
    assert_eq!(position, 5);

    let retriever = retriever(index.clone(), embedder, RagConfig::default());
    let context = retriever.retrieve("revolusi").await.unwrap();
    assert_eq!(context.parts[0].chunk_id, "catatan_revolusi_custom");
    assert_eq!(index.chunk("catatan_revolusi_custom").await.unwrap().source_url, "Custom Input");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_searches_see_consistent_index() {
    let embedder = Arc::new(KeywordEmbedder::new());
    let index = keyword_index(&embedder).await;
    let retriever = Arc::new(retriever(index.clone(), embedder.clone(), RagConfig::default()));

    let mut tasks = Vec::new();
    for i in 0..8 {
        let retriever = retriever.clone();
        tasks.push(tokio::spawn(async move {
            let query = if i % 2 == 0 { "proklamasi" } else { "agresi belanda" };
            retriever.retrieve(query).await
        }));
    }
    index
        .add_document("Pendudukan Jepang Akhir", "Jepang menyerah tahun 1945.", "Catatan", &*embedder)
        .await
        .unwrap();

    for task in tasks {
        let context = task.await.unwrap().unwrap();
        assert!(!context.is_empty());
        assert!(context.total_length <= context.max_context_length);
    }
    assert_eq!(index.len().await, 6);
}

#[test]
fn evaluate_grades_documented_scenarios() {
    let excellent = RetrievedContext { average_score: 0.6, chunk_count: 4, ..RetrievedContext::empty(3000) };
    assert_eq!(evaluate(&excellent).quality, RetrievalQuality::Excellent);

    let poor = RetrievedContext { average_score: 0.1, chunk_count: 0, ..RetrievedContext::empty(3000) };
    let report = evaluate(&poor);
    assert_eq!(report.quality, RetrievalQuality::Poor);
    assert!(report.has_issue(QualityIssue::NoRelevantContext));
}

#[tokio::test]
async fn chain_turns_generation_failure_into_message() {
    let embedder = Arc::new(KeywordEmbedder::new());
    let index = keyword_index(&embedder).await;
    let retriever = Arc::new(retriever(index, embedder, RagConfig::default()));
    let chain = RagChain::new(retriever, Arc::new(FailingGenerator));

    let answer = chain.ask("Kapan proklamasi dibacakan?").await.unwrap();
    assert!(answer.response.starts_with("Error generating response:"));
    assert!(answer.response.contains("quota exceeded"));
    assert!(answer.prompt.contains("PERTANYAAN: Kapan proklamasi dibacakan?"));
}

#[tokio::test]
async fn chain_answers_with_context_in_prompt() {
    let embedder = Arc::new(KeywordEmbedder::new());
    let index = keyword_index(&embedder).await;
    let retriever = Arc::new(retriever(index, embedder, RagConfig::default()));
    let chain = RagChain::new(retriever, Arc::new(EchoGenerator));

    let answer = chain.ask("proklamasi").await.unwrap();
    assert!(answer.response.starts_with("prompt of "));
    assert!(answer.prompt.contains(&answer.context.assembled_text));
    assert!(answer.prompt.contains("SUMBER REFERENSI: Proklamasi Kemerdekaan Indonesia"));
    assert!(answer.quality.chunk_count >= 1);
}

/// *For any* budget, the packed context never exceeds it and its reported
/// length matches the assembled text.
mod prop_context_budget {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        #[test]
        fn packed_context_respects_budget(
            lengths in proptest::collection::vec(1usize..400, 1..12),
            budget in 1usize..1500,
            top_k in 1usize..12,
        ) {
            let chunks: Vec<_> = lengths
                .iter()
                .enumerate()
                .map(|(i, len)| {
                    let body = format!("proklamasi {}", "a".repeat(*len));
                    chunk(&format!("Sumber {i}"), 0, 1, &body)
                })
                .collect();

            let rt = tokio::runtime::Runtime::new().unwrap();
            let context = rt.block_on(async {
                let embedder = Arc::new(KeywordEmbedder::new());
                let index = Arc::new(VectorIndex::build(chunks, &*embedder, 8).await.unwrap());
                let retriever = retriever(index, embedder, RagConfig::default());
                retriever.retrieve_with("proklamasi", top_k, 0.0, budget).await.unwrap()
            });

            prop_assert!(context.total_length <= budget);
            prop_assert_eq!(context.total_length, context.assembled_text.chars().count());
            prop_assert!(context.chunk_count <= top_k);
            prop_assert_eq!(context.chunk_count, context.parts.len());
        }
    }
}
