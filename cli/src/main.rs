//! AID CLI - create and evolve Autonomic Identifiers.

use aid::agent::{Agent, Identifier};
use aid::client::{
    ClientConfig, CreateOptions, Identifiers, KeySource, LocalTransport, RotateOptions,
};
use aid::core::event::{Event, Role};
use aid::keeper::{Algorithm, GroupStrategy, Manager, RandyStrategy, SaltyStrategy, StoredKeySet};
use aid::{Prefix, Threshold};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Autonomic Identifier CLI
#[derive(Parser)]
#[command(name = "aid")]
#[command(about = "Autonomic Identifiers - self-certifying key event logs", long_about = None)]
struct Cli {
    /// Path to state file (default: <config dir>/aid-state.json)
    #[arg(short, long, global = true)]
    state: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a state file with a fresh salt
    Init {
        /// Force overwrite existing state
        #[arg(short, long)]
        force: bool,
    },
    /// Incept a new identifier
    Create {
        name: String,
        /// Number of signing keys
        #[arg(long)]
        count: Option<usize>,
        /// Number of next keys to commit to
        #[arg(long)]
        next_count: Option<usize>,
        /// Signing threshold (hex cutoff or weighted list)
        #[arg(long)]
        isith: Option<Threshold>,
        /// Next signing threshold
        #[arg(long)]
        nsith: Option<Threshold>,
        /// Witness identifier (repeatable)
        #[arg(long = "wit")]
        witnesses: Vec<String>,
        /// Witness receipt threshold
        #[arg(long)]
        toad: Option<u64>,
        /// Delegating identifier prefix
        #[arg(long)]
        delegator: Option<Prefix>,
        /// Commit to no next keys; the identifier can never rotate
        #[arg(long)]
        non_transferable: bool,
        /// Key strategy: salty or randy
        #[arg(long)]
        algo: Option<Algorithm>,
        /// JSON seal to anchor (repeatable)
        #[arg(long, value_parser = parse_json)]
        data: Vec<Value>,
    },
    /// Rotate to the committed next keys
    Rotate {
        name: String,
        #[arg(long)]
        next_count: Option<usize>,
        #[arg(long)]
        isith: Option<Threshold>,
        #[arg(long)]
        nsith: Option<Threshold>,
        #[arg(long)]
        toad: Option<u64>,
        /// Witness to remove (repeatable)
        #[arg(long = "cut")]
        cuts: Vec<String>,
        /// Witness to add (repeatable)
        #[arg(long = "add")]
        adds: Vec<String>,
        #[arg(long, value_parser = parse_json)]
        data: Vec<Value>,
    },
    /// Anchor data in an interaction event
    Interact {
        name: String,
        #[arg(long, value_parser = parse_json)]
        data: Vec<Value>,
    },
    /// Authorize an endpoint for a role, or withdraw the role without --eid
    Authorize {
        name: String,
        #[arg(long)]
        role: Role,
        #[arg(long)]
        eid: Option<String>,
    },
    /// List identifiers
    List,
    /// Show an identifier and its key state
    Show { name: String },
    /// Forget an identifier locally
    Delete { name: String },
}

fn parse_json(s: &str) -> std::result::Result<Value, serde_json::Error> {
    serde_json::from_str(s)
}

/// Stored state file format.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredState {
    #[serde(with = "hex_bytes")]
    salt: Vec<u8>,
    /// Salt-derivation index for the next salty identifier.
    pidx: u64,
    #[serde(default)]
    key_sets: Vec<StoredKeySet>,
    #[serde(default)]
    identifiers: Vec<Identifier>,
    created_at: String,
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        if bytes.is_empty() {
            return Err(serde::de::Error::custom("empty salt"));
        }
        Ok(bytes)
    }
}

fn get_state_path(cli_path: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = cli_path {
        return Ok(path);
    }

    let proj_dirs = directories::ProjectDirs::from("org", "aid", "aid")
        .context("Could not determine config directory")?;

    let config_dir = proj_dirs.config_dir();
    std::fs::create_dir_all(config_dir)?;

    Ok(config_dir.join("aid-state.json"))
}

fn load_state(path: &Path) -> Result<StoredState> {
    let contents = std::fs::read_to_string(path).with_context(|| {
        format!(
            "Could not read state file: {} (run `aid init` first)",
            path.display()
        )
    })?;

    serde_json::from_str(&contents).context("Invalid state file format")
}

fn save_state(path: &Path, state: &StoredState) -> Result<()> {
    let contents = serde_json::to_string_pretty(state)?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    std::fs::write(path, contents)?;

    // Owner-only: the file holds the salt and randy seeds
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }

    Ok(())
}

/// An orchestrator backed by a state file.
struct Session {
    path: PathBuf,
    salt: Vec<u8>,
    created_at: String,
    randy: Arc<RandyStrategy>,
    ids: Identifiers<LocalTransport, Manager>,
}

impl Session {
    fn open(path: PathBuf) -> Result<Self> {
        let stored = load_state(&path)?;

        let agent = Arc::new(Agent::restore(stored.identifiers));
        let randy = Arc::new(
            RandyStrategy::import(&stored.key_sets).context("Invalid randy key sets")?,
        );
        let manager = Manager::new()
            .with(SaltyStrategy::new(stored.salt.clone()))
            .with(randy.clone())
            .with(GroupStrategy);
        let ids = Identifiers::new(LocalTransport::new(agent), manager, ClientConfig::default())
            .with_pidx(stored.pidx);

        Ok(Self {
            path,
            salt: stored.salt,
            created_at: stored.created_at,
            randy,
            ids,
        })
    }

    async fn save(&self) -> Result<()> {
        let state = StoredState {
            salt: self.salt.clone(),
            pidx: self.ids.pidx().await,
            key_sets: self.randy.export(),
            identifiers: self.ids.transport().agent().snapshot(),
            created_at: self.created_at.clone(),
        };
        save_state(&self.path, &state)
    }
}

fn print_identifier(identifier: &Identifier) {
    let state = &identifier.state;
    println!("Identifier: {}", identifier.name);
    println!("  Prefix: {}", identifier.prefix);
    println!("  Algorithm: {}", identifier.params.algorithm());
    println!("  Sequence: {}", state.sequence_number);
    println!("  Signing threshold: {}", state.current_threshold);
    for (i, key) in state.current_keys.iter().enumerate() {
        println!("  Key {}: {}", i, key);
    }
    println!("  Next threshold: {}", state.next_threshold);
    println!("  Next key digests: {}", state.next_key_digests.len());
    if !state.witnesses.is_empty() {
        println!("  Witnesses: {} (toad {})", state.witnesses.join(", "), state.toad);
    }
    if let Some(delegator) = &state.delegator {
        println!("  Delegator: {}", delegator);
    }
    for role in &identifier.end_roles {
        println!(
            "  End role: {:?} -> {}",
            role.role,
            role.eid.as_deref().unwrap_or("-")
        );
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "State already exists at {}. Use --force to overwrite.",
            path.display()
        );
    }

    let state = StoredState {
        salt: SaltyStrategy::random_salt(),
        pidx: 0,
        key_sets: Vec::new(),
        identifiers: Vec::new(),
        created_at: chrono::Utc::now().to_rfc3339(),
    };
    save_state(path, &state)?;

    println!("Initialized AID state:");
    println!("  Saved to: {}", path.display());

    Ok(())
}

fn key_source(algo: Option<Algorithm>) -> Result<KeySource> {
    match algo {
        None => Ok(KeySource::Default),
        Some(Algorithm::Salty) => Ok(KeySource::Salty),
        Some(Algorithm::Randy) => Ok(KeySource::Randy),
        Some(Algorithm::Group) => {
            anyhow::bail!("Group identifiers need member key states and cannot be created here")
        }
    }
}

async fn run(session: &Session, command: Commands) -> Result<()> {
    let ids = &session.ids;

    match command {
        Commands::Init { .. } => anyhow::bail!("State is already initialized"),
        Commands::Create {
            name,
            count,
            next_count,
            isith,
            nsith,
            witnesses,
            toad,
            delegator,
            non_transferable,
            algo,
            data,
        } => {
            let options = CreateOptions {
                transferable: !non_transferable,
                count,
                next_count,
                current_threshold: isith,
                next_threshold: nsith,
                witnesses,
                toad,
                delegator,
                seals: data,
                keys: key_source(algo)?,
            };
            let created = ids
                .create(&name, options)
                .await
                .with_context(|| format!("Could not create '{name}'"))?;
            session.save().await?;

            println!("Created identifier:");
            print_identifier(&created.accepted);
        }
        Commands::Rotate {
            name,
            next_count,
            isith,
            nsith,
            toad,
            cuts,
            adds,
            data,
        } => {
            let options = RotateOptions {
                next_count,
                current_threshold: isith,
                next_threshold: nsith,
                cuts,
                adds,
                toad,
                seals: data,
                group: None,
            };
            let rotated = ids
                .rotate(&name, options)
                .await
                .with_context(|| format!("Could not rotate '{name}'"))?;
            session.save().await?;

            println!("Rotated identifier:");
            print_identifier(&rotated.accepted);
        }
        Commands::Interact { name, data } => {
            let anchored = ids
                .interact(&name, data)
                .await
                .with_context(|| format!("Could not anchor data for '{name}'"))?;
            session.save().await?;

            if let Ok(digest) = anchored.event.event.digest() {
                println!("Anchored interaction {}", digest);
            }
            println!("  Sequence: {}", anchored.accepted.state.sequence_number);
        }
        Commands::Authorize { name, role, eid } => {
            let submitted = ids
                .authorize(&name, role, eid.as_deref())
                .await
                .with_context(|| format!("Could not authorize for '{name}'"))?;
            session.save().await?;

            if let Event::Reply(reply) = &submitted.event.event {
                println!("Submitted {} for {:?}", reply.route, role);
            }
            println!("  End roles: {}", submitted.accepted.len());
        }
        Commands::List => {
            let all = ids.list().await?;
            if all.is_empty() {
                println!("No identifiers.");
            }
            for identifier in all {
                println!(
                    "{}\t{}\tsn={}",
                    identifier.name, identifier.prefix, identifier.state.sequence_number
                );
            }
        }
        Commands::Show { name } => {
            let identifier = ids.get(&name).await?;
            print_identifier(&identifier);
            println!("  Events: {}", identifier.events.len());
        }
        Commands::Delete { name } => {
            ids.delete(&name).await?;
            session.save().await?;
            println!("Deleted '{}'", name);
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let state_path = get_state_path(cli.state)?;

    if let Commands::Init { force } = cli.command {
        return cmd_init(&state_path, force);
    }

    let session = Session::open(state_path)?;
    run(&session, cli.command).await
}
