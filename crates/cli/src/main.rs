use atendo::chatwoot::{
    fetch_typed, Agent, ChatwootApi, Contact, Conversation, Inbox, Label, Message, MockChatwoot,
    Note, ProxyClient, Resource, Team,
};
use atendo::config::{self, Config};
use atendo::executor::ActionExecutor;
use atendo::orchestrator::{DomainEvent, Orchestrator};
use atendo::state::StateStore;
use atendo::webhook::{self, ChatSimulation, WebhookClient, WebhookError};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncReadExt;

#[derive(Parser)]
#[command(name = "atendo")]
#[command(about = "Atendo CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Config file and data source shared by most commands.
#[derive(Args, Clone)]
struct Source {
    /// Config file path (default: ATENDO_CONFIG_PATH or ~/.atendo/config.json)
    #[arg(long, short, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Use the built-in sample data instead of the Chatwoot proxy.
    #[arg(long)]
    mock: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory with a default config and an empty state file.
    Init {
        /// Config file path (default: ATENDO_CONFIG_PATH or ~/.atendo/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Load conversations, agents, contacts and teams and print the dashboard metrics.
    Dashboard {
        #[command(flatten)]
        source: Source,

        /// Print the whole snapshot as JSON instead of the metrics summary.
        #[arg(long)]
        json: bool,
    },

    /// Print one Chatwoot collection as normalized JSON.
    List {
        #[command(flatten)]
        source: Source,

        #[arg(value_enum)]
        kind: ListKind,

        /// Contact id; required for notes.
        #[arg(long)]
        contact: Option<u64>,
    },

    /// Run the orchestrator on one event (JSON from a file or stdin) and execute the actions.
    ProcessEvent {
        #[command(flatten)]
        source: Source,

        /// Event JSON file; reads stdin when omitted.
        #[arg(long, short, value_name = "PATH")]
        file: Option<PathBuf>,

        /// Print the actions without applying them.
        #[arg(long)]
        dry_run: bool,
    },

    /// Score a lead from a conversation id or free text.
    LeadScore {
        #[command(flatten)]
        source: Source,

        /// Conversation id to load messages from.
        #[arg(long, conflicts_with = "text")]
        conversation: Option<u64>,

        /// Text to score directly.
        #[arg(long)]
        text: Option<String>,
    },

    /// Manage webhook bots stored in the local state file.
    Bots {
        /// Config file path (default: ATENDO_CONFIG_PATH or ~/.atendo/config.json)
        #[arg(long, short, value_name = "PATH", global = true)]
        config: Option<PathBuf>,

        #[command(subcommand)]
        command: BotCommands,
    },

    /// Show or change the signed-in user's profile kept in the local state file.
    User {
        /// Config file path (default: ATENDO_CONFIG_PATH or ~/.atendo/config.json)
        #[arg(long, short, value_name = "PATH", global = true)]
        config: Option<PathBuf>,

        #[command(subcommand)]
        command: UserCommands,
    },

    /// Run the automation server (health, dashboard, event intake).
    Serve {
        #[command(flatten)]
        source: Source,

        /// HTTP port (default from config or 15252)
        #[arg(long, short)]
        port: Option<u16>,

        /// Log actions instead of applying them.
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Subcommand)]
enum BotCommands {
    /// List configured bots.
    List,
    /// Add a bot.
    Add {
        name: String,
        /// http(s) URL the bot receives payloads on.
        webhook_url: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// Remove a bot by id.
    Remove { id: String },
    /// Send the connectivity test payload to an active bot, or a simulated chat message with --message.
    Test {
        id: String,
        /// Simulated customer message.
        #[arg(long)]
        message: Option<String>,
        /// Simulated customer name.
        #[arg(long, default_value = "Cliente Teste")]
        contact: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ListKind {
    Conversations,
    Agents,
    Contacts,
    Teams,
    Inboxes,
    Labels,
    Notes,
}

#[derive(Subcommand)]
enum UserCommands {
    /// Print the stored profile.
    Show,
    /// Set the profile. Fields not given keep their stored value.
    Set {
        /// User type, e.g. admin or agent.
        #[arg(long = "type", value_name = "TYPE")]
        user_type: Option<String>,
        /// Profile data as a JSON object.
        #[arg(long, value_name = "JSON")]
        data: Option<String>,
    },
    /// Remove the stored profile.
    Clear,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Version) => {
            println!("atendo {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Some(Commands::Init { config }) => run_init(config),
        Some(Commands::Dashboard { source, json }) => run_dashboard(source, json).await,
        Some(Commands::List {
            source,
            kind,
            contact,
        }) => run_list(source, kind, contact).await,
        Some(Commands::ProcessEvent {
            source,
            file,
            dry_run,
        }) => run_process_event(source, file, dry_run).await,
        Some(Commands::LeadScore {
            source,
            conversation,
            text,
        }) => run_lead_score(source, conversation, text).await,
        Some(Commands::Bots { config, command }) => run_bots(config, command).await,
        Some(Commands::User { config, command }) => run_user(config, command).await,
        Some(Commands::Serve {
            source,
            port,
            dry_run,
        }) => run_serve(source, port, dry_run).await,
        None => {
            println!("Run with --help for usage");
            Ok(())
        }
    };
    if let Err(e) = result {
        log::error!("{:#}", e);
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run_init(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(config::default_config_path);
    let dir = atendo::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

/// Pick the data source: sample data with --mock, otherwise the configured proxy.
fn chatwoot_api(config: &Config, mock: bool) -> anyhow::Result<Arc<dyn ChatwootApi>> {
    if mock {
        log::info!("using built-in sample data");
        return Ok(Arc::new(MockChatwoot::with_sample_data()));
    }
    let url = config::resolve_proxy_url(&config.chatwoot)
        .map_err(|e| anyhow::anyhow!("{} (or pass --mock)", e))?;
    Ok(Arc::new(ProxyClient::new(url, config.chatwoot.timeout())))
}

async fn run_dashboard(source: Source, json: bool) -> anyhow::Result<()> {
    let (config, _) = config::load_config(source.config)?;
    let api = chatwoot_api(&config, source.mock)?;
    let data = atendo::dashboard::load_all(api.as_ref(), config.chatwoot.account_id).await;
    if json {
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }
    if let Some(err) = &data.error {
        anyhow::bail!("{}", err);
    }
    for f in &data.failures {
        eprintln!("warning: {} unavailable: {}", f.resource, f.error);
    }
    let m = &data.metrics;
    println!("conversations   {} total, {} today", data.conversations.len(), m.total_conversations_today);
    println!("  open          {}", m.open);
    println!("  pending       {}", m.pending);
    println!("  snoozed       {}", m.snoozed);
    println!("  resolved      {}", m.resolved);
    println!("  without reply {}", m.conversations_without_reply);
    println!("resolution rate {}%", m.resolution_rate);
    match m.avg_response_time_minutes {
        Some(mins) => println!("avg response    {:.1} min", mins),
        None => println!("avg response    n/a"),
    }
    println!("agents online   {} of {}", m.agents_online, data.agents.len());
    println!("contacts        {}", data.contacts.len());
    println!("teams           {}", data.teams.len());
    Ok(())
}

async fn run_list(source: Source, kind: ListKind, contact: Option<u64>) -> anyhow::Result<()> {
    let (config, _) = config::load_config(source.config)?;
    let api = chatwoot_api(&config, source.mock)?;
    let api = api.as_ref();
    let account = config.chatwoot.account_id;
    let records = match kind {
        ListKind::Conversations => typed::<Conversation>(api, account, Resource::Conversations).await?,
        ListKind::Agents => typed::<Agent>(api, account, Resource::Agents).await?,
        ListKind::Contacts => typed::<Contact>(api, account, Resource::Contacts).await?,
        ListKind::Teams => typed::<Team>(api, account, Resource::Teams).await?,
        ListKind::Inboxes => typed::<Inbox>(api, account, Resource::Inboxes).await?,
        ListKind::Labels => typed::<Label>(api, account, Resource::Labels).await?,
        ListKind::Notes => {
            let id = contact.ok_or_else(|| anyhow::anyhow!("notes need --contact <ID>"))?;
            typed::<Note>(api, account, Resource::Notes(id)).await?
        }
    };
    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}

/// Fetch through the typed parser so the output shows exactly what the library reads.
async fn typed<T>(
    api: &dyn ChatwootApi,
    account: u64,
    resource: Resource,
) -> anyhow::Result<Vec<serde_json::Value>>
where
    T: serde::de::DeserializeOwned + serde::Serialize,
{
    let records: Vec<T> = fetch_typed(api, account, resource).await?;
    records
        .into_iter()
        .map(|r| serde_json::to_value(r).map_err(anyhow::Error::from))
        .collect()
}

async fn read_input(file: Option<PathBuf>) -> anyhow::Result<String> {
    use anyhow::Context;
    match file {
        Some(path) => tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("reading {}", path.display())),
        None => {
            let mut s = String::new();
            tokio::io::stdin()
                .read_to_string(&mut s)
                .await
                .context("reading event from stdin")?;
            Ok(s)
        }
    }
}

async fn run_process_event(
    source: Source,
    file: Option<PathBuf>,
    dry_run: bool,
) -> anyhow::Result<()> {
    use anyhow::Context;
    let (config, _) = config::load_config(source.config)?;
    let input = read_input(file).await?;
    let event: DomainEvent = serde_json::from_str(&input).context("parsing event")?;

    let llm = atendo::llm::client_from_config(&config.llm);
    let orchestrator = Orchestrator::new(llm, config.orchestrator.clone());
    let actions = orchestrator.process_event(&event).await;

    let api = chatwoot_api(&config, source.mock)?;
    let executor = ActionExecutor::new(api, WebhookClient::default(), config.chatwoot.account_id)
        .dry_run(dry_run);
    let report = executor.execute(&actions).await;
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({"actions": actions, "report": report}))?
    );
    Ok(())
}

async fn run_lead_score(
    source: Source,
    conversation: Option<u64>,
    text: Option<String>,
) -> anyhow::Result<()> {
    let (config, _) = config::load_config(source.config)?;
    let conversation = match (conversation, text) {
        (Some(id), _) => {
            let api = chatwoot_api(&config, source.mock)?;
            let messages: Vec<Message> =
                fetch_typed(api.as_ref(), config.chatwoot.account_id, Resource::Messages(id))
                    .await?;
            if messages.is_empty() {
                log::warn!("conversation {} has no messages", id);
            }
            Conversation {
                id,
                messages,
                ..Conversation::default()
            }
        }
        (None, Some(text)) => Conversation {
            messages: vec![Message {
                id: 1,
                content: Some(text),
                ..Message::default()
            }],
            ..Conversation::default()
        },
        (None, None) => anyhow::bail!("pass --conversation <ID> or --text <TEXT>"),
    };
    let llm = atendo::llm::client_from_config(&config.llm);
    let orchestrator = Orchestrator::new(llm, config.orchestrator.clone());
    let score = orchestrator.lead_score(&conversation).await;
    println!("{}", serde_json::to_string_pretty(&score)?);
    Ok(())
}

async fn run_bots(config_path: Option<PathBuf>, command: BotCommands) -> anyhow::Result<()> {
    let (config, path) = config::load_config(config_path)?;
    let store = StateStore::load(config::resolve_state_path(&config, &path)).await?;
    match command {
        BotCommands::List => {
            let bots = store.bots().await;
            if bots.is_empty() {
                println!("no bots configured");
            }
            for b in bots {
                println!(
                    "{}  {}  {}{}",
                    b.id,
                    b.name,
                    b.webhook_url,
                    if b.active { "" } else { "  (inactive)" }
                );
            }
        }
        BotCommands::Add {
            name,
            webhook_url,
            description,
        } => {
            let bot = store.add_bot(&name, &webhook_url, description).await?;
            println!("added bot {} ({})", bot.name, bot.id);
        }
        BotCommands::Remove { id } => {
            let bot = store.remove_bot(&id).await?;
            println!("removed bot {} ({})", bot.name, bot.id);
        }
        BotCommands::Test {
            id,
            message,
            contact,
        } => {
            let bot = store
                .get_bot(&id)
                .await
                .ok_or_else(|| anyhow::anyhow!("bot not found: {}", id))?;
            let payload = match message {
                Some(message) => {
                    let sim = ChatSimulation {
                        company: config.orchestrator.company_name.clone(),
                        ..ChatSimulation::new(contact, message)
                    };
                    webhook::simulation_payload(&bot, &sim)
                }
                None => webhook::connectivity_test_payload(&bot),
            };
            let status = match WebhookClient::default().send_to_bot(&bot, &payload).await {
                Err(WebhookError::InactiveBot(_)) => {
                    println!("bot {} is inactive, not sent", bot.name);
                    return Ok(());
                }
                other => other?,
            };
            println!("bot {} answered {}", bot.name, status);
        }
    }
    Ok(())
}

async fn run_user(config_path: Option<PathBuf>, command: UserCommands) -> anyhow::Result<()> {
    use anyhow::Context;
    let (config, path) = config::load_config(config_path)?;
    let store = StateStore::load(config::resolve_state_path(&config, &path)).await?;
    match command {
        UserCommands::Show => {
            let state = store.snapshot().await;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "userType": state.user_type,
                    "userData": state.user_data,
                }))?
            );
        }
        UserCommands::Set { user_type, data } => {
            if user_type.is_none() && data.is_none() {
                anyhow::bail!("pass --type <TYPE> and/or --data <JSON>");
            }
            let data = match data {
                Some(raw) => {
                    let value: serde_json::Value =
                        serde_json::from_str(&raw).context("parsing --data")?;
                    if !value.is_object() {
                        anyhow::bail!("--data must be a JSON object");
                    }
                    Some(value)
                }
                None => None,
            };
            let current = store.snapshot().await;
            store
                .set_user(data.or(current.user_data), user_type.or(current.user_type))
                .await?;
            println!("user profile saved to {}", store.path().display());
        }
        UserCommands::Clear => {
            store.set_user(None, None).await?;
            println!("user profile cleared");
        }
    }
    Ok(())
}

async fn run_serve(source: Source, port: Option<u16>, dry_run: bool) -> anyhow::Result<()> {
    let (mut config, path) = config::load_config(source.config)?;
    atendo::init::require_initialized(&path)?;
    if let Some(p) = port {
        config.server.port = p;
    }
    let api = chatwoot_api(&config, source.mock)?;
    let llm = atendo::llm::client_from_config(&config.llm);
    log::info!("starting server on {}:{}", config.server.bind, config.server.port);
    let state = atendo::server::ServerState::new(config, api, llm, dry_run);
    atendo::server::run_server(state).await
}
