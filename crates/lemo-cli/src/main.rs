use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use lemo_agents::{AgentManager, GeneralAgent, WeatherAgent};
use lemo_common::{LemoConfig, generate_session_id};
use lemo_core::{
    AnswerSourceRouter, ChatService, ConversationSink, JsonlConversationSink, NoopConversationSink,
};
use lemo_llm::{ChatTurn, GenaiGenerationProvider, GenerationProvider};
use lemo_memory::{
    ConfidenceScorer, EmbeddingServiceFactory, InMemoryKnowledgeStore, InMemoryVectorIndex,
    KnowledgeBase,
};
use lemo_tools::{
    AiTool, DateTimeTool, KnowledgeBaseTool, MathTool, QWeatherProvider, WebSearchTool,
    WebSearchProvider, WikipediaTool, create_search_provider,
};
use serde::Serialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Command-line arguments for the Lemo CLI
#[derive(Parser)]
#[command(
    name = "lemo",
    about = "Lemo - knowledge-base question answering with calibrated confidence and agent routing"
)]
pub struct Args {
    /// Path to the TOML configuration file
    #[clap(short, long, default_value = "lemo.toml")]
    config: PathBuf,

    /// Enable debug logging
    #[clap(short, long)]
    debug: bool,

    /// Session id to attach to the conversation
    #[clap(long)]
    session: Option<String>,

    /// User id recorded with the conversation
    #[clap(long)]
    user: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Answer through the knowledge base / web search / general chain
    Ask {
        #[arg(required = true, num_args = 1..)]
        message: Vec<String>,
    },
    /// Answer through the agent bidding router
    Agent {
        #[arg(required = true, num_args = 1..)]
        message: Vec<String>,
    },
    /// List registered agents
    Agents,
    /// Merge knowledge entries from a JSON file into `storage.knowledge_path`
    Ingest { file: PathBuf },
    /// Interactive conversation
    Chat {
        /// Route every message through the agents instead of the knowledge base
        #[clap(long)]
        agents: bool,
    },
}

fn init_tracing(config: &LemoConfig, debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Embedder, index and store shared by the router and the knowledge tool
async fn build_knowledge(config: &LemoConfig) -> Result<Arc<KnowledgeBase>> {
    let embedder = EmbeddingServiceFactory::create(config.embedding.clone())
        .context("Failed to create embedding service")?;
    let index = Arc::new(InMemoryVectorIndex::new(embedder.dimensions()));
    let knowledge = Arc::new(KnowledgeBase::new(
        embedder,
        index,
        Arc::new(InMemoryKnowledgeStore::new()),
    ));

    if let Some(path) = &config.storage.knowledge_path {
        if !path.exists() {
            warn!("Knowledge file {:?} does not exist yet; starting empty", path);
            return Ok(knowledge);
        }
        let entries = KnowledgeBase::load_entries(path)?;
        let count = knowledge.ingest_all(entries).await?;
        info!("Loaded {} knowledge entries from {:?}", count, path);
    }
    Ok(knowledge)
}

fn build_agents(
    config: &LemoConfig,
    knowledge: Arc<KnowledgeBase>,
    generator: Arc<dyn GenerationProvider>,
    search: Arc<dyn WebSearchProvider>,
) -> Result<AgentManager> {
    let weather = WeatherAgent::new(Arc::new(QWeatherProvider::new(&config.weather)?))?;

    let knowledge_tool = KnowledgeBaseTool::new(knowledge, ConfidenceScorer::new(config.scoring.baseline))
        .with_min_confidence(config.scoring.knowledge_tool_min_confidence);
    let tools: Vec<Box<dyn AiTool>> = vec![
        Box::new(knowledge_tool),
        Box::new(MathTool),
        Box::new(DateTimeTool),
        Box::new(WikipediaTool::new(&config.encyclopedia)?),
        Box::new(WebSearchTool::new(search, config.search.max_results)),
    ];
    let general = GeneralAgent::new(generator, tools, &config.agents);

    let mut agents = AgentManager::new(config.agents.route_threshold);
    agents.register(Arc::new(weather), false);
    agents.register(Arc::new(general), true);
    Ok(agents)
}

fn build_sink(path: Option<&Path>) -> Arc<dyn ConversationSink> {
    match path {
        Some(path) => {
            info!("Recording conversations to {:?}", path);
            Arc::new(JsonlConversationSink::new(path))
        }
        None => Arc::new(NoopConversationSink),
    }
}

async fn build_service(config: &LemoConfig) -> Result<(ChatService, Arc<KnowledgeBase>)> {
    let knowledge = build_knowledge(config).await?;
    let generator: Arc<dyn GenerationProvider> = Arc::new(GenaiGenerationProvider::new(&config.llm));
    let search = create_search_provider(&config.search)?;

    let agents = build_agents(config, knowledge.clone(), generator.clone(), search.clone())?;
    let router = AnswerSourceRouter::new(knowledge.clone(), generator, search, config);
    let sink = build_sink(config.storage.conversation_log.as_deref());

    Ok((ChatService::new(router, agents, sink), knowledge))
}

/// Interactive loop keeping history for the session
async fn conversation_loop(service: &ChatService, session_id: String, user: Option<String>, use_agents: bool) -> Result<()> {
    println!(
        "{}",
        "💬 Starting conversation. Type 'quit' or 'exit' to stop.".bright_green()
    );
    println!("{} {}", "Session:".bright_yellow(), session_id.bright_blue());
    println!();

    let mut history: Vec<ChatTurn> = Vec::new();
    loop {
        print!("{}", "You: ".bright_cyan().bold());
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();
        if input.is_empty() {
            continue;
        }
        if matches!(input.to_lowercase().as_str(), "quit" | "exit") {
            println!("{}", "👋 Goodbye!".bright_green());
            break;
        }

        let answer = if use_agents {
            match service
                .answer_with_agents(input, Some(session_id.clone()), user.clone(), &history)
                .await
            {
                Ok(response) => {
                    println!(
                        "{} {}",
                        format!("{}:", response.agent_name).bright_green().bold(),
                        response.answer
                    );
                    println!(
                        "{}",
                        format!(
                            "[{} · {:.2} · {}]",
                            response.answer_source,
                            response.confidence,
                            response.tools_used.join(", ")
                        )
                        .dimmed()
                    );
                    response.answer
                }
                Err(e) => {
                    println!("{}", format!("❌ Agent error: {}", e).red());
                    continue;
                }
            }
        } else {
            let response = service
                .answer_with_history(input, Some(session_id.clone()), user.clone(), &history)
                .await;
            println!("{} {}", "Lemo:".bright_green().bold(), response.answer);
            println!(
                "{}",
                format!(
                    "[{} · {:.2} · {}]",
                    response.answer_source,
                    response.confidence,
                    response.intent.as_deref().unwrap_or("-")
                )
                .dimmed()
            );
            if !response.related_questions.is_empty() {
                println!(
                    "{} {}",
                    "Related:".bright_yellow(),
                    response.related_questions.join(" / ")
                );
            }
            response.answer
        };

        history.push(ChatTurn::user(input));
        history.push(ChatTurn::assistant(answer));
        println!();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let mut config = LemoConfig::load(&args.config)?;
    config.apply_env();
    config.validate()?;
    init_tracing(&config, args.debug);

    info!("Starting Lemo with model {}", config.llm.model);
    let (service, knowledge) = build_service(&config).await?;

    match args.command {
        Command::Ask { message } => {
            let response = service
                .answer(&message.join(" "), args.session, args.user)
                .await;
            print_json(&response)?;
        }
        Command::Agent { message } => {
            let response = service
                .answer_with_agents(&message.join(" "), args.session, args.user, &[])
                .await?;
            print_json(&response)?;
        }
        Command::Agents => {
            println!("{}", "🤖 Registered agents:".bright_cyan().bold());
            for agent in service.list_agents() {
                let marker = if agent.is_default { " (default)" } else { "" };
                println!(
                    "• {}{} - {}",
                    agent.name.bright_green().bold(),
                    marker.bright_yellow(),
                    agent.description
                );
                println!("    {} {}", "Tools:".bright_yellow(), agent.tools.join(", ").bright_blue());
            }
        }
        Command::Ingest { file } => {
            let target = config
                .storage
                .knowledge_path
                .clone()
                .context("storage.knowledge_path must be set to ingest knowledge")?;
            let entries = KnowledgeBase::load_entries(&file)?;
            let total = entries.len();
            let ingested = knowledge.ingest_all(entries.clone()).await?;
            if ingested < total {
                warn!("{} of {} entries could not be indexed", total - ingested, total);
            }
            let merged = KnowledgeBase::merge_into_file(&target, entries)?;
            print_json(&serde_json::json!({
                "file": file,
                "knowledge_path": target,
                "entries": total,
                "indexed": ingested,
                "stored": merged.len(),
            }))?;
        }
        Command::Chat { agents } => {
            let session_id = args
                .session
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(generate_session_id);
            conversation_loop(&service, session_id, args.user, agents).await?;
        }
    }

    Ok(())
}
