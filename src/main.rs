// Written by Paul Clevett
// (C)Copyright Wolf Software Systems Ltd
// https://wolf.uk.com

//! dapx — command line front end for the DAPX management panel
//!
//! Logs in against the management API, keeps the session in a local state
//! file, and shows the HA/cluster snapshot and load-balancer state.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use dapx_panel::api::auth::Credentials;
use dapx_panel::api::load_balancer;
use dapx_panel::cluster::{CacheOptions, ClusterCache, ClusterSnapshot, FetchOutcome};
use dapx_panel::config::{PanelConfig, DEFAULT_CONFIG_FILE};
use dapx_panel::error::SessionError;
use dapx_panel::gateway::{Gateway, HttpTransport, Navigator};
use dapx_panel::session::{SessionState, SessionStore};
use dapx_panel::storage::FileStore;

/// dapx — DAPX management panel client
#[derive(Parser)]
#[command(name = "dapx", version, about = "Client for the DAPX Proxmox management panel")]
struct Cli {
    /// Panel configuration file
    #[arg(long, env = "DAPX_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Override the API base URL from the config file
    #[arg(long, env = "DAPX_API_URL")]
    api_url: Option<String>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log in and store the session
    Login {
        #[arg(short, long)]
        username: String,
        #[arg(short, long, default_value = "pam")]
        realm: String,
        #[arg(short, long, env = "DAPX_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Forget the stored session
    Logout,
    /// Show the logged-in user
    Whoami,
    /// List authentication realms
    Realms,
    /// Print the HA/cluster snapshot
    Status {
        /// Ignore the staleness window
        #[arg(long)]
        force: bool,
    },
    /// Keep the snapshot refreshed and print every change until Ctrl-C
    Watch {
        #[arg(long)]
        interval_secs: Option<u64>,
    },
    /// Load balancer
    Balance {
        #[command(subcommand)]
        action: BalanceCommand,
    },
}

#[derive(Subcommand)]
enum BalanceCommand {
    /// Show recommended migrations
    Analyze {
        #[arg(long)]
        cluster_id: Option<u64>,
    },
    /// Run the balancer (dry run unless --apply)
    Execute {
        #[arg(long)]
        apply: bool,
        #[arg(long)]
        cluster_id: Option<u64>,
    },
    /// Show saved and effective balancer settings
    Config,
    /// Show migration history
    Migrations {
        #[arg(long, default_value_t = 20)]
        limit: u32,
        #[arg(long)]
        status: Option<String>,
    },
}

/// Everything a command needs, wired once at startup
struct Panel {
    config: PanelConfig,
    navigator: Arc<Navigator>,
    gateway: Arc<Gateway>,
    sessions: SessionStore,
    cache: Arc<ClusterCache>,
}

impl Panel {
    fn build(config: PanelConfig) -> Result<Self, String> {
        let store = Arc::new(FileStore::open(config.state_file.clone()));
        let state = Arc::new(SessionState::rehydrate(store));
        let navigator = Arc::new(Navigator::new());

        let transport = HttpTransport::new(&config.api_url, config.request_timeout(), config.accept_invalid_certs)
            .map_err(|e| format!("Cannot create HTTP client: {}", e))?;
        let gateway = Arc::new(Gateway::standard(
            Arc::new(transport),
            state.clone(),
            navigator.clone(),
            &config.login_route,
        ));
        debug!("Gateway stages: {:?}", gateway.stage_names());

        let sessions = SessionStore::new(state.clone(), gateway.clone());
        let cache = ClusterCache::new(gateway.clone(), state, CacheOptions::from_config(&config));
        Ok(Self { config, navigator, gateway, sessions, cache })
    }

    fn session_expired(&self) -> bool {
        self.navigator.count(&self.config.login_route) > 0
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "dapx_panel=debug,dapx=debug" } else { "dapx_panel=info,dapx=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = match PanelConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(url) = cli.api_url {
        config.api_url = url.trim_end_matches('/').to_string();
    }
    debug!("API: {}  state: {}", config.api_url, config.state_file.display());

    let panel = match Panel::build(config) {
        Ok(panel) => panel,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = run(&panel, cli.command).await;
    panel.cache.shutdown();

    if panel.session_expired() {
        eprintln!("Session expired, run `dapx login`");
        return ExitCode::FAILURE;
    }
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(panel: &Panel, command: Command) -> Result<(), String> {
    match command {
        Command::Login { username, realm, password } => {
            let password = password.ok_or("No password given (use --password or DAPX_PASSWORD)")?;
            let credentials = Credentials { username, password, realm };
            let session = panel.sessions.login(&credentials).await.map_err(|e| e.to_string())?;
            match session.user {
                Some(user) => println!("Logged in as {} ({})", user.username, user.role.as_deref().unwrap_or("user")),
                None => println!("Logged in as {}", credentials.username),
            }
            Ok(())
        }
        Command::Logout => {
            panel.sessions.logout().map_err(|e| e.to_string())?;
            println!("Logged out");
            Ok(())
        }
        Command::Whoami => whoami(panel).await,
        Command::Realms => {
            let realms = panel.sessions.fetch_realms().await;
            if realms.is_empty() {
                return Err("No realms available".to_string());
            }
            for r in realms {
                println!("{:<12} {:<8} {}", r.realm, r.kind.as_deref().unwrap_or("-"), r.comment.as_deref().unwrap_or(""));
            }
            Ok(())
        }
        Command::Status { force } => status(panel, force).await,
        Command::Watch { interval_secs } => {
            let interval = interval_secs.map(Duration::from_secs).unwrap_or_else(|| panel.config.refresh_interval());
            watch(panel, interval).await
        }
        Command::Balance { action } => balance(panel, action).await,
    }
}

async fn whoami(panel: &Panel) -> Result<(), String> {
    if !panel.sessions.is_authenticated() {
        return Err("Not logged in".to_string());
    }
    let user = match panel.sessions.fetch_user().await {
        Ok(user) => user,
        Err(SessionError::Profile(e)) => {
            warn!("Showing cached profile, refresh failed: {}", e);
            panel.sessions.user().ok_or_else(|| e.to_string())?
        }
        Err(e) => return Err(e.to_string()),
    };
    println!("{}", user.username);
    if let Some(name) = &user.full_name { println!("  name:  {}", name); }
    if let Some(email) = &user.email { println!("  email: {}", email); }
    println!("  role:  {}{}", user.role.as_deref().unwrap_or("-"), if user.is_admin() { " (admin)" } else { "" });
    Ok(())
}

async fn status(panel: &Panel, force: bool) -> Result<(), String> {
    match panel.cache.fetch_cluster_data(force, false).await {
        FetchOutcome::NoCredential => return Err("Not logged in".to_string()),
        FetchOutcome::NoCoordinator => return Err("No node available to query cluster state".to_string()),
        outcome => debug!("Cluster fetch: {:?}", outcome),
    }
    let snap = panel.cache.snapshot();
    print_snapshot(&snap);
    match snap.error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

async fn watch(panel: &Panel, interval: Duration) -> Result<(), String> {
    let mut changes = panel.cache.subscribe();
    let mut redirects = panel.navigator.subscribe();

    if panel.cache.fetch_cluster_data(true, false).await == FetchOutcome::NoCredential {
        return Err("Not logged in".to_string());
    }
    println!("{}", summary(&panel.cache.snapshot()));
    panel.cache.start_background_refresh(interval);

    loop {
        tokio::select! {
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                println!("{}", summary(&panel.cache.snapshot()));
            }
            nav = redirects.recv() => {
                if let Ok(nav) = nav {
                    info!("Redirected to {}", nav.route);
                }
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }
    panel.cache.stop_background_refresh();
    Ok(())
}

async fn balance(panel: &Panel, action: BalanceCommand) -> Result<(), String> {
    let gw = &panel.gateway;
    match action {
        BalanceCommand::Analyze { cluster_id } => {
            let analysis = load_balancer::analyze(gw, cluster_id).await.map_err(|e| e.to_string())?;
            print_json(&analysis);
            panel.cache.set_analysis_result(analysis);
        }
        BalanceCommand::Execute { apply, cluster_id } => {
            if apply {
                warn!("Executing load balancer migrations");
            }
            let result = load_balancer::execute(gw, !apply, None, cluster_id).await.map_err(|e| e.to_string())?;
            print_json(&result);
        }
        BalanceCommand::Config => {
            let config = load_balancer::config(gw).await.map_err(|e| e.to_string())?;
            print_json(&config.effective);
        }
        BalanceCommand::Migrations { limit, status } => {
            let records = load_balancer::migrations(gw, limit, status.as_deref()).await.map_err(|e| e.to_string())?;
            for m in &records {
                println!(
                    "#{:<5} {:<10} vm {:<6} {} -> {}",
                    m.id,
                    m.status.as_deref().unwrap_or("-"),
                    m.vmid.map(|v| v.to_string()).unwrap_or_else(|| "-".into()),
                    m.source_node.as_deref().unwrap_or("?"),
                    m.target_node.as_deref().unwrap_or("?"),
                );
            }
            panel.cache.set_migration_history(records);
        }
    }
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => error!("Cannot render response: {}", e),
    }
}

fn summary(snap: &ClusterSnapshot) -> String {
    let online = snap.cluster_nodes.iter().filter(|n| n.is_online()).count();
    let started = snap.ha_resources.iter().filter(|r| r.state.as_deref() == Some("started")).count();
    let (name, quorum) = match &snap.cluster_status {
        Some(s) => (s.cluster_name.as_str(), if s.quorum { "quorate" } else { "NO QUORUM" }),
        None => ("?", "unknown quorum"),
    };
    let updated = snap.last_updated
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "never".into());
    let mut line = format!(
        "[{}] cluster {}: {}, {}/{} nodes online, {} HA resources ({} started), {} guests",
        updated, name, quorum, online, snap.cluster_nodes.len(), snap.ha_resources.len(), started, snap.available_guests.len()
    );
    if let Some(e) = &snap.error {
        line.push_str(&format!("  [{}]", e));
    }
    line
}

fn print_snapshot(snap: &ClusterSnapshot) {
    println!("{}", summary(snap));
    if !snap.cluster_nodes.is_empty() {
        println!("\nNodes:");
        for n in &snap.cluster_nodes {
            println!("  {:<16} {}", n.name, n.status.as_deref().unwrap_or("-"));
        }
    }
    if !snap.ha_resources.is_empty() {
        println!("\nHA resources:");
        for r in &snap.ha_resources {
            println!(
                "  {:<12} {:<10} group {:<10} on {}",
                r.sid,
                r.state.as_deref().unwrap_or("-"),
                r.group.as_deref().unwrap_or("-"),
                r.node.as_deref().unwrap_or("-"),
            );
        }
    }
    if !snap.ha_groups.is_empty() {
        println!("\nHA groups:");
        for g in &snap.ha_groups {
            println!("  {:<12} {}", g.group, g.nodes.as_deref().unwrap_or(""));
        }
    }
}
