//! # Helpdesk CLI (`helpdesk`)
//!
//! ## Usage
//!
//! ```bash
//! helpdesk --config ./config/helpdesk.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `helpdesk index` | Ingest, chunk and embed the corpus, then report counts |
//! | `helpdesk ask "<question>"` | Answer one question |
//! | `helpdesk chat` | Interactive conversation on stdin |
//! | `helpdesk serve` | Start the HTTP API |
//!
//! The chat model API key is read from the environment variable named by
//! `[llm].api_key_env` (`GROQ_API_KEY` by default).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use helpdesk_rag::config::{load_config, Config};
use helpdesk_rag::conversation::{build_index, prepare_corpus, Answer, Conversation};
use helpdesk_rag::embedding::create_provider;
use helpdesk_rag::llm::create_chat_model;
use helpdesk_rag::{logging, server};

/// Helpdesk: conversational question answering over product manuals and FAQs.
#[derive(Parser)]
#[command(
    name = "helpdesk",
    about = "Conversational retrieval-augmented helpdesk over PDF manuals and CSV FAQs",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/helpdesk.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest and chunk the corpus, then embed it unless --dry-run is set.
    Index {
        /// Stop after chunking; no embedding model is loaded.
        #[arg(long)]
        dry_run: bool,
    },

    /// Answer a single question.
    Ask {
        question: String,

        /// Session identifier (a fresh session when omitted).
        #[arg(long)]
        session: Option<String>,

        /// Print the retrieved passages after the answer.
        #[arg(long)]
        show_sources: bool,
    },

    /// Interactive chat on stdin. `/history` prints the transcript, `/quit` exits.
    Chat {
        #[arg(long)]
        session: Option<String>,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    logging::init_with_config(&config.logging);

    match cli.command {
        Commands::Index { dry_run } => run_index(&config, dry_run).await,
        Commands::Ask {
            question,
            session,
            show_sources,
        } => {
            let conversation = build_conversation(&config).await?;
            let session = session.unwrap_or_else(new_session_id);
            let answer = conversation.answer(&question, &session).await?;
            println!("{}", answer.answer);
            if show_sources {
                print_sources(&answer);
            }
            Ok(())
        }
        Commands::Chat { session } => {
            let conversation = build_conversation(&config).await?;
            run_chat(&conversation, session.unwrap_or_else(new_session_id)).await
        }
        Commands::Serve => {
            let conversation = build_conversation(&config).await?;
            server::run_server(&config, Arc::new(conversation)).await
        }
    }
}

fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

async fn build_conversation(config: &Config) -> Result<Conversation> {
    let chat = create_chat_model(&config.llm)?;
    let provider = create_provider(&config.embedding)?;
    Conversation::build(config, provider, chat).await
}

async fn run_index(config: &Config, dry_run: bool) -> Result<()> {
    if dry_run {
        let corpus = prepare_corpus(config)?;
        println!("files: {}", corpus.files.len());
        println!("documents: {}", corpus.documents.len());
        println!("chunks: {}", corpus.chunks.len());
        return Ok(());
    }

    let provider = create_provider(&config.embedding)?;
    let index = build_index(config, provider.as_ref()).await?;
    println!("chunks: {}", index.len());
    println!("model: {}", index.model());
    println!("dims: {}", index.dims());
    Ok(())
}

fn print_sources(answer: &Answer) {
    println!();
    println!("sources:");
    for hit in &answer.sources {
        println!(
            "  {:.3}  {}#{}  [{}..{})",
            hit.score, hit.chunk.source, hit.chunk.position, hit.chunk.start, hit.chunk.end
        );
    }
}

async fn run_chat(conversation: &Conversation, session: String) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    println!("session {} (type /history or /quit)", session);
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
            break;
        };
        let line = line.trim();

        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/history" => {
                for turn in conversation.sessions().history(&session).await {
                    println!("{}: {}", turn.role, turn.content);
                }
            }
            question => match conversation.answer(question, &session).await {
                Ok(answer) => println!("{}", answer.answer),
                Err(e) => eprintln!("error: {}", e),
            },
        }
    }

    Ok(())
}
