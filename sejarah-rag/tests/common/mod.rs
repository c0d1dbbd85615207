//! Deterministic fakes shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use sejarah_rag::{Chunk, ChunkRecord, EmbeddingProvider, Generator, RagError, Result};

/// Vocabulary of [`KeywordEmbedder`]; one axis per word, plus a bias axis.
pub const VOCABULARY: &[&str] = &[
    "proklamasi",
    "kemerdekaan",
    "merdeka",
    "agustus",
    "soekarno",
    "sukarno",
    "karno",
    "hatta",
    "belanda",
    "jepang",
    "agresi",
    "revolusi",
];

/// Embeds text as keyword occurrence counts over [`VOCABULARY`].
///
/// Every vector gets a small bias component so nothing embeds to zero.
#[derive(Default)]
pub struct KeywordEmbedder {
    calls: AtomicUsize,
}

impl KeywordEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of texts embedded so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let lowered = text.to_lowercase();
        let mut vector: Vec<f32> =
            VOCABULARY.iter().map(|word| lowered.matches(word).count() as f32).collect();
        vector.push(0.1);
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        VOCABULARY.len() + 1
    }

    fn model_id(&self) -> &str {
        "keyword-fake"
    }
}

/// Returns preset vectors for known texts.
pub struct TableEmbedder {
    pub vectors: HashMap<String, Vec<f32>>,
    pub dimension: usize,
}

impl TableEmbedder {
    pub fn new<'a>(entries: impl IntoIterator<Item = (&'a str, Vec<f32>)>) -> Self {
        let vectors: HashMap<String, Vec<f32>> =
            entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        let dimension = vectors.values().next().map_or(0, Vec::len);
        Self { vectors, dimension }
    }
}

#[async_trait]
impl EmbeddingProvider for TableEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.vectors.get(text).cloned().ok_or_else(|| RagError::ExternalService {
            service: "table".to_string(),
            message: format!("no vector for '{text}'"),
        })
    }

    fn dimensions(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        "table-fake"
    }
}

/// An embedder whose backend is always down.
pub struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(RagError::ExternalService {
            service: "embedding".to_string(),
            message: "connection refused".to_string(),
        })
    }

    fn dimensions(&self) -> usize {
        4
    }

    fn model_id(&self) -> &str {
        "failing-fake"
    }
}

/// Answers with the length of the prompt it received.
pub struct EchoGenerator;

#[async_trait]
impl Generator for EchoGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        Ok(format!("prompt of {} chars", prompt.chars().count()))
    }

    fn model_id(&self) -> &str {
        "echo"
    }
}

/// A generator whose backend always fails.
pub struct FailingGenerator;

#[async_trait]
impl Generator for FailingGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        Err(RagError::ExternalService {
            service: "llm".to_string(),
            message: "quota exceeded".to_string(),
        })
    }

    fn model_id(&self) -> &str {
        "failing"
    }
}

pub fn chunk(title: &str, index: usize, total: usize, content: &str) -> Chunk {
    Chunk::from_record(ChunkRecord {
        content: content.to_string(),
        source_title: title.to_string(),
        source_url: format!("https://id.wikipedia.org/wiki/{}", title.replace(' ', "_")),
        source_type: "Wikipedia".to_string(),
        chunk_index: index,
        total_chunks: total,
    })
    .unwrap()
}

/// A small history corpus whose wording exercises the expansion table.
pub fn corpus() -> Vec<Chunk> {
    vec![
        chunk(
            "Proklamasi Kemerdekaan Indonesia",
            0,
            2,
            "Proklamasi kemerdekaan dibacakan pada 17 Agustus 1945 di Jakarta.",
        ),
        chunk(
            "Proklamasi Kemerdekaan Indonesia",
            1,
            2,
            "Teks proklamasi ditandatangani Soekarno dan Hatta atas nama bangsa.",
        ),
        chunk("Mohammad Hatta", 0, 1, "Bung Hatta menjadi wakil presiden pertama Indonesia."),
        chunk("Pendudukan Jepang", 0, 1, "Pendudukan Jepang berlangsung dari 1942 hingga 1945."),
        chunk(
            "Agresi Militer Belanda I",
            0,
            1,
            "Agresi militer Belanda pertama dilancarkan pada Juli 1947.",
        ),
    ]
}
