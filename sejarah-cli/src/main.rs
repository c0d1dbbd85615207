//! `sejarah`: ask questions about Indonesian independence history.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use sejarah_rag::config::{DEFAULT_LLM_API_URL, DEFAULT_LLM_MODEL};
use sejarah_rag::openai::{
    ChatCompletionsGenerator, DEFAULT_EMBEDDING_MODEL, DEFAULT_EMBEDDINGS_URL,
    OpenAIEmbeddingProvider,
};
use sejarah_rag::{
    Answer, ChunkStore, EmbeddingProvider, LlmConfig, RagChain, RagConfig, Retriever, VectorIndex,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sejarah", version, about = "Question answering over Indonesian independence history")]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Embed the chunk file and write a fresh index
    Build,
    /// Print index statistics as JSON
    Stats,
    /// Answer one question
    Ask {
        /// The question, in Indonesian
        question: String,
        /// Print the full answer record as JSON
        #[arg(long)]
        json: bool,
    },
    /// Interactive question loop
    Chat,
}

#[derive(Args, Debug)]
struct Settings {
    /// Directory holding the persisted index
    #[arg(long, global = true, env = "VECTOR_DB_PATH", default_value = "data/vector_db")]
    vector_db_path: PathBuf,

    /// Processed chunk file written by the ingestion pipeline
    #[arg(
        long,
        global = true,
        env = "CHUNKS_PATH",
        default_value = "data/processed/text_chunks.json"
    )]
    chunks_path: PathBuf,

    /// OpenAI-compatible embeddings endpoint
    #[arg(long, global = true, env = "EMBEDDING_API_URL", default_value = DEFAULT_EMBEDDINGS_URL)]
    embedding_api_url: String,

    /// Embedding model identifier, recorded in the index
    #[arg(long, global = true, env = "EMBEDDING_MODEL", default_value = DEFAULT_EMBEDDING_MODEL)]
    embedding_model: String,

    /// Components per embedding vector
    #[arg(long, global = true, env = "EMBEDDING_DIMENSIONS", default_value_t = 1536)]
    embedding_dimensions: usize,

    /// Bearer token for the embeddings endpoint
    #[arg(long, global = true, env = "EMBEDDING_API_KEY", hide_env_values = true)]
    embedding_api_key: Option<String>,

    /// Bearer token for the chat-completions endpoint
    #[arg(long, global = true, env = "GROQ_API_KEY", hide_env_values = true)]
    llm_api_key: Option<String>,

    /// OpenAI-compatible chat-completions endpoint
    #[arg(long, global = true, env = "LLM_API_URL", default_value = DEFAULT_LLM_API_URL)]
    llm_api_url: String,

    /// Chat model
    #[arg(long, global = true, env = "LLM_MODEL", default_value = DEFAULT_LLM_MODEL)]
    llm_model: String,

    /// Chunks kept after merging query variants
    #[arg(long, global = true, default_value_t = 3)]
    top_k: usize,

    /// Minimum similarity score
    #[arg(long, global = true, default_value_t = 0.2)]
    min_score: f32,

    /// Context budget in characters
    #[arg(long, global = true, default_value_t = 3000)]
    max_context_length: usize,
}

impl Settings {
    fn rag_config(&self) -> Result<RagConfig> {
        RagConfig::builder()
            .top_k(self.top_k)
            .min_score(self.min_score)
            .max_context_length(self.max_context_length)
            .build()
            .context("invalid retrieval settings")
    }

    fn llm_config(&self) -> LlmConfig {
        LlmConfig {
            api_url: self.llm_api_url.clone(),
            model: self.llm_model.clone(),
            api_key: self.llm_api_key.clone(),
            ..LlmConfig::default()
        }
    }

    fn embedder(&self) -> Arc<OpenAIEmbeddingProvider> {
        let mut provider = OpenAIEmbeddingProvider::new(&self.embedding_api_url)
            .with_model(&self.embedding_model, self.embedding_dimensions);
        if let Some(key) = &self.embedding_api_key {
            provider = provider.with_api_key(key);
        }
        Arc::new(provider)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = &cli.settings;
    let config = settings.rag_config()?;
    let embedder = settings.embedder();

    match cli.command {
        Command::Build => {
            let index = build_index(settings, embedder.as_ref(), &config).await?;
            println!("Indexed {} chunks into {}", index.len().await, settings.vector_db_path.display());
        }
        Command::Stats => {
            let index = open_index(settings, embedder.as_ref(), &config).await?;
            println!("{}", serde_json::to_string_pretty(&index.stats().await)?);
        }
        Command::Ask { question, json } => {
            let chain = open_chain(settings, embedder, config).await?;
            let answer = chain.ask(&question).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&answer)?);
            } else {
                print_answer(&answer);
            }
        }
        Command::Chat => {
            let chain = open_chain(settings, embedder, config).await?;
            chat(&chain).await?;
        }
    }
    Ok(())
}

/// Load the chunk file, embed it and persist the resulting index.
async fn build_index(
    settings: &Settings,
    embedder: &dyn EmbeddingProvider,
    config: &RagConfig,
) -> Result<VectorIndex> {
    let store = ChunkStore::load_json(&settings.chunks_path)
        .with_context(|| format!("cannot load chunks from {}", settings.chunks_path.display()))?;
    let index = VectorIndex::build(store.as_slice().to_vec(), embedder, config.embed_batch_size)
        .await
        .context("failed to build the vector index")?;
    index.persist(&settings.vector_db_path).await.context("failed to persist the vector index")?;
    Ok(index)
}

/// Restore the persisted index, building one only when none exists.
///
/// A corrupt index or one built with another model stops startup.
async fn open_index(
    settings: &Settings,
    embedder: &dyn EmbeddingProvider,
    config: &RagConfig,
) -> Result<VectorIndex> {
    let path: &Path = &settings.vector_db_path;
    match VectorIndex::restore(path, embedder.model_id()).await {
        Ok(index) => Ok(index),
        Err(e) if e.is_recoverable_by_rebuild() => {
            warn!(path = %path.display(), "no persisted index, building a new one");
            build_index(settings, embedder, config).await
        }
        Err(e) => Err(e).with_context(|| {
            format!("cannot use the index at {}; rebuild it with `sejarah build`", path.display())
        }),
    }
}

async fn open_chain(
    settings: &Settings,
    embedder: Arc<OpenAIEmbeddingProvider>,
    config: RagConfig,
) -> Result<RagChain> {
    let index = Arc::new(open_index(settings, embedder.as_ref(), &config).await?);
    if index.is_empty().await {
        bail!("the index at {} holds no chunks", settings.vector_db_path.display());
    }
    let generator = ChatCompletionsGenerator::new(settings.llm_config())
        .context("set GROQ_API_KEY or --llm-api-key")?;
    let retriever =
        Retriever::builder().config(config).index(index).embedding_provider(embedder).build()?;
    info!(model = %settings.llm_model, "ready to answer questions");
    Ok(RagChain::new(Arc::new(retriever), Arc::new(generator)))
}

fn print_answer(answer: &Answer) {
    println!("{}", answer.response);
    if !answer.context.distinct_sources.is_empty() {
        let sources: Vec<&str> = answer.context.distinct_sources.iter().map(String::as_str).collect();
        println!("\nSumber: {}", sources.join(", "));
    }
    println!(
        "Kualitas konteks: {} (skor {:.3}, {} potongan)",
        answer.quality.quality, answer.quality.score, answer.quality.chunk_count
    );
}

async fn chat(chain: &RagChain) -> Result<()> {
    let mut editor = DefaultEditor::new()?;
    println!("Tanyakan tentang sejarah kemerdekaan Indonesia. Ketik 'quit' untuk keluar.");

    loop {
        let line = match editor.readline("Pertanyaan> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if matches!(question.to_lowercase().as_str(), "quit" | "exit" | "bye") {
            break;
        }
        editor.add_history_entry(question)?;

        match chain.ask(question).await {
            Ok(answer) => print_answer(&answer),
            Err(e) => eprintln!("Gagal mengambil konteks: {e}"),
        }
        println!();
    }
    println!("Sampai jumpa!");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn ask_parses_question_and_flags() {
        let args = ["sejarah", "ask", "Siapa Bung Hatta?", "--json", "--top-k", "5"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert!(matches!(
            cli.command,
            Command::Ask { ref question, json: true } if question == "Siapa Bung Hatta?"
        ));
        assert_eq!(cli.settings.top_k, 5);
        assert!(cli.settings.rag_config().is_ok());
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let cli = Cli::try_parse_from(["sejarah", "stats", "--min-score", "2"]).unwrap();
        assert!(cli.settings.rag_config().is_err());
    }
}
