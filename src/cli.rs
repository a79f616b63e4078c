//! Command-line wiring
//!
//! Thin layer over the answer engine: parses arguments, builds the
//! providers from configuration, and prints plain results. All decision
//! logic lives in the engine.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::config::Config;
use crate::engine::AnswerEngine;
use crate::policy::RetrievalPolicy;
use crate::providers::{ChatCompletionsClient, HttpEmbeddingClient, QdrantIndex};
use crate::session::{ConversationStore, JsonFileBackend, MemoryBackend, SessionBackend};

/// ragpilot - retrieval-augmented question answering
#[derive(Parser, Debug)]
#[command(name = "ragpilot")]
#[command(version)]
#[command(about = "Answer questions against an indexed reference corpus", long_about = None)]
pub struct Args {
    /// Keep conversation state in memory instead of on disk
    #[arg(long, global = true)]
    pub ephemeral: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Answer a single question without conversation state
    Ask {
        question: String,
    },

    /// Interactive multi-turn conversation
    Chat {
        /// Conversation id to resume; a fresh id is generated if omitted
        #[arg(long)]
        session: Option<String>,
    },

    /// List live conversations
    Sessions,

    /// Clear a conversation's history, keeping its id
    Clear {
        id: String,
    },

    /// Delete a conversation entirely
    Delete {
        id: String,
    },

    /// Embed and index reference passages, one per line
    Seed {
        file: PathBuf,
    },
}

/// Build the engine from configuration and run one command
pub async fn run(args: Args) -> Result<()> {
    let config = Config::load()?;
    let engine = build_engine(&config, args.ephemeral).await?;

    match args.command {
        Commands::Ask { question } => {
            let answer = engine.answer_once(&question).await?;
            println!("{}", answer.answer);
            println!(
                "[{} | confidence {:.3} | {} candidate(s)]",
                answer.strategy.as_str(),
                answer.confidence,
                answer.candidates.len()
            );
        }

        Commands::Chat { session } => {
            let id = session.unwrap_or_else(|| Uuid::new_v4().to_string());
            println!("session: {} (empty line to exit)", id);

            let stdin = std::io::stdin();
            loop {
                print!("> ");
                std::io::stdout().flush()?;
                let mut line = String::new();
                if stdin.lock().read_line(&mut line)? == 0 {
                    break;
                }
                let question = line.trim();
                if question.is_empty() {
                    break;
                }
                let answer = engine.answer_in_session(&id, question).await?;
                println!("{}", answer.answer);
                println!(
                    "[{} | confidence {:.3}]",
                    answer.strategy.as_str(),
                    answer.confidence
                );
            }
        }

        Commands::Sessions => {
            let summaries = engine.list_conversations().await?;
            if summaries.is_empty() {
                println!("no live conversations");
            }
            for summary in summaries {
                println!(
                    "{}  turns={}  tokens={}  last_accessed={}",
                    summary.id,
                    summary.turn_count,
                    summary.total_tokens,
                    summary.last_accessed_at.to_rfc3339()
                );
            }
        }

        Commands::Clear { id } => {
            engine.clear_conversation(&id).await?;
            println!("cleared {}", id);
        }

        Commands::Delete { id } => {
            if engine.delete_conversation(&id).await? {
                println!("deleted {}", id);
            } else {
                println!("nothing to delete for {}", id);
            }
        }

        Commands::Seed { file } => {
            let contents = std::fs::read_to_string(&file)?;
            let passages: Vec<String> = contents.lines().map(|l| l.to_string()).collect();
            let indexed = engine.seed(&passages).await?;
            println!("indexed {} passage(s)", indexed);
        }
    }

    Ok(())
}

async fn build_engine(config: &Config, ephemeral: bool) -> Result<AnswerEngine> {
    let embedder = Arc::new(HttpEmbeddingClient::new(config.embedding.clone())?);
    let index = Arc::new(QdrantIndex::connect(config.index.clone()).await?);
    let generator = Arc::new(ChatCompletionsClient::new(config.generation.clone())?);
    let policy = RetrievalPolicy::new(config.policy)?;

    let backend: Arc<dyn SessionBackend> = if ephemeral {
        Arc::new(MemoryBackend::new())
    } else {
        match &config.session.storage_dir {
            Some(dir) => Arc::new(JsonFileBackend::new(dir.clone())?),
            None => Arc::new(JsonFileBackend::new(Config::default_session_dir()?)?),
        }
    };
    let sessions =
        ConversationStore::new(backend, Duration::from_secs(config.session.timeout_secs));

    Ok(AnswerEngine::new(embedder, index, generator, policy, sessions).with_top_k(config.top_k))
}
