//! kpx: KDBX database command-line tool
//!
//! Commands:
//!   header <file>             - show the outer header without credentials
//!   dump <file>               - decrypt and print the group/entry tree
//!   search <file> <query>     - decrypt and list matching paths
//!   checksum <file>           - BLAKE2b digest of a file
//!   create <file> --name NAME - write a new empty database
//!   rekey <file>              - re-encrypt with a different KDF or cipher
//!   config show               - display the effective configuration

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use secrecy::{ExposeSecret, SecretString};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use kpx_core::config::{KdfConfig, KpxConfig};
use kpx_core::{CipherId, KdfAlgorithm, KpxError, KpxResult};
use kpx_crypto::{blake2b, load_keyfile, CompositeKey, KdfParameters};
use kpx_dom::{Document, Node, NodeId};
use kpx_format::{KdbxReader, KdbxWriter};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "kpx",
    version,
    about = "KDBX password database tool",
    long_about = "kpx: inspect, decrypt, search and re-encrypt KDBX 3.1 / 4 databases"
)]
struct Cli {
    /// Path to kpx.toml configuration file
    #[arg(long, short = 'c', env = "KPX_CONFIG", default_value = "kpx.toml")]
    config: PathBuf,

    /// Log level filter (RUST_LOG takes precedence)
    #[arg(long, env = "KPX_LOG", global = true)]
    log: Option<String>,

    /// Log output format
    #[arg(long, value_enum, global = true)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the outer header (no credentials needed)
    Header {
        file: PathBuf,
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Decrypt and print the group/entry tree
    Dump {
        file: PathBuf,
        /// Print protected values in clear
        #[arg(long)]
        show_protected: bool,
        #[command(flatten)]
        creds: Credentials,
    },

    /// Decrypt and list groups and entries matching a query
    Search {
        file: PathBuf,
        query: String,
        #[command(flatten)]
        creds: Credentials,
    },

    /// BLAKE2b digest of a file, hex encoded
    Checksum {
        file: PathBuf,
        /// Digest length in bytes (1..=64)
        #[arg(long, default_value_t = 64)]
        len: usize,
        /// Hex key for keyed hashing (up to 64 bytes)
        #[arg(long)]
        key: Option<String>,
    },

    /// Write a new empty database using the configured defaults
    Create {
        file: PathBuf,
        /// Name of the root group
        #[arg(long)]
        name: String,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
        #[command(flatten)]
        creds: Credentials,
    },

    /// Re-encrypt a database with changed KDF or cipher parameters
    Rekey {
        file: PathBuf,
        #[command(flatten)]
        creds: Credentials,
        #[command(flatten)]
        changes: RekeyArgs,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

#[derive(Args, Debug, Clone)]
struct Credentials {
    /// Master password (prompted for when neither this nor --keyfile is given)
    #[arg(long, env = "KPX_PASSWORD", hide_env_values = true)]
    password: Option<String>,
    /// Keyfile to combine with the password
    #[arg(long)]
    keyfile: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
struct RekeyArgs {
    /// Key derivation function
    #[arg(long, value_enum)]
    kdf: Option<KdfChoice>,
    /// AES-KDF rounds
    #[arg(long)]
    rounds: Option<u64>,
    /// Argon2d passes
    #[arg(long)]
    iterations: Option<u64>,
    /// Argon2d memory in KiB
    #[arg(long)]
    memory_kib: Option<u64>,
    /// Argon2d lanes
    #[arg(long)]
    parallelism: Option<u32>,
    /// Body cipher
    #[arg(long, value_enum)]
    cipher: Option<CipherChoice>,
    /// Prompt for a new master password
    #[arg(long)]
    change_password: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum LogFormat {
    Text,
    Json,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum KdfChoice {
    Aes,
    Argon2d,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum CipherChoice {
    Aes,
    Chacha20,
}

impl From<CipherChoice> for CipherId {
    fn from(choice: CipherChoice) -> Self {
        match choice {
            CipherChoice::Aes => CipherId::Aes,
            CipherChoice::Chacha20 => CipherId::ChaCha20,
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        let cancelled = e
            .downcast_ref::<KpxError>()
            .is_some_and(KpxError::is_cancelled);
        eprintln!("kpx: {e:#}");
        std::process::exit(if cancelled { 130 } else { 1 });
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = kpx_core::config::load(&cli.config)?;
    init_logging(&cli, &config);
    debug!(path = %cli.config.display(), "configuration loaded");

    match cli.command {
        Commands::Header { file, json } => cmd_header(&config, &file, json),
        Commands::Dump { file, show_protected, creds } => {
            cmd_dump(&config, &file, &creds, show_protected).await
        }
        Commands::Search { file, query, creds } => cmd_search(&config, &file, &query, &creds).await,
        Commands::Checksum { file, len, key } => cmd_checksum(&file, len, key.as_deref()),
        Commands::Create { file, name, force, creds } => {
            cmd_create(&config, &file, &name, force, &creds).await
        }
        Commands::Rekey { file, creds, changes } => cmd_rekey(&config, &file, &creds, &changes).await,
        Commands::Config { action: ConfigAction::Show } => cmd_config_show(&config, &cli.config),
    }
}

fn init_logging(cli: &Cli, config: &KpxConfig) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let level = cli.log.as_deref().unwrap_or(&config.log.level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let format = cli.log_format.unwrap_or(if config.log.format == "json" {
        LogFormat::Json
    } else {
        LogFormat::Text
    });

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Text => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

// ── Credentials ───────────────────────────────────────────────────────────────

/// Password first, then keyfile. Prompts when nothing was supplied.
fn read_credentials(creds: &Credentials) -> Result<CompositeKey> {
    let mut key = CompositeKey::new();
    let password = match (&creds.password, &creds.keyfile) {
        (Some(p), _) => Some(SecretString::from(p.clone())),
        (None, None) => Some(prompt_password("Password: ")?),
        (None, Some(_)) => None,
    };
    if let Some(p) = password {
        key.add_password(&p);
    }
    if let Some(path) = &creds.keyfile {
        let data = load_keyfile(path).with_context(|| format!("reading keyfile: {}", path.display()))?;
        key.add_keyfile(data);
    }
    Ok(key)
}

fn prompt_password(prompt: &str) -> Result<SecretString> {
    let entered = rpassword::prompt_password(prompt).context("reading password from terminal")?;
    Ok(SecretString::from(entered))
}

// ── Blocking work with spinner and Ctrl-C ─────────────────────────────────────

fn make_spinner(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{prefix:.bold} {spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// Run key derivation and the codec off the async runtime while a spinner
/// ticks; Ctrl-C cancels the token.
async fn run_blocking<T, F>(label: &str, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&CancellationToken) -> KpxResult<T> + Send + 'static,
{
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let spinner = make_spinner(label);
    spinner.set_message("deriving key...");
    let worker_cancel = cancel.clone();
    let result = tokio::task::spawn_blocking(move || f(&worker_cancel))
        .await
        .context("worker task failed");
    watcher.abort();
    spinner.finish_and_clear();

    Ok(result??)
}

/// Decrypt `file`, handing back the key that opened it for re-saving.
async fn open_document(
    config: &KpxConfig,
    file: &Path,
    creds: &Credentials,
) -> Result<(KdbxReader, Document, CompositeKey)> {
    let reader = KdbxReader::open(file, &config.limits)
        .with_context(|| format!("opening {}", file.display()))?;
    let key = read_credentials(creds)?;
    run_blocking("decrypt", move |cancel| {
        let document = reader.decrypt_body(&key, cancel)?;
        Ok((reader, document, key))
    })
    .await
}

// ── `kpx header` ──────────────────────────────────────────────────────────────

fn cmd_header(config: &KpxConfig, file: &Path, json: bool) -> Result<()> {
    let reader = KdbxReader::open(file, &config.limits)
        .with_context(|| format!("reading header of {}", file.display()))?;
    let summary = reader.header().summary();

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }
    println!("file:         {}", file.display());
    println!("  version:      {}", summary.version);
    println!("  cipher:       {:?}", summary.cipher);
    println!("  compression:  {:?}", summary.compression);
    println!("  kdf:          {} ({})", summary.kdf, summary.kdf_cost);
    if let Some(stream) = summary.inner_stream {
        println!("  inner stream: {stream:?}");
    }
    if let Some(data) = &summary.public_custom_data {
        println!("  custom data:  {} item(s)", data.len());
    }
    println!("  header size:  {} bytes", reader.header_bytes().len());
    Ok(())
}

// ── `kpx dump` ────────────────────────────────────────────────────────────────

async fn cmd_dump(config: &KpxConfig, file: &Path, creds: &Credentials, show_protected: bool) -> Result<()> {
    let (_, document, _) = open_document(config, file, creds).await?;
    println!("database: {}", document.meta.database_name);
    print_node(&document, document.tree.root(), 0, show_protected);
    Ok(())
}

fn print_node(document: &Document, id: NodeId, depth: usize, show_protected: bool) {
    let indent = "  ".repeat(depth);
    match document.tree.get(id) {
        Some(Node::Group(group)) => {
            println!("{indent}[{}]", group.name);
            for &child in document.tree.children(id) {
                print_node(document, child, depth + 1, show_protected);
            }
        }
        Some(Node::Entry(entry)) => {
            println!("{indent}- {}", entry.title().as_str());
            for field in entry.fields().iter().filter(|f| f.key() != "Title") {
                if field.is_protected() && !show_protected {
                    println!("{indent}    {}: ********", field.key());
                } else {
                    println!("{indent}    {}: {}", field.key(), field.clear().as_str());
                }
            }
            if !entry.override_url.is_empty() {
                // expansion may pull in protected values
                match document.resolve_url(id) {
                    Some(url) if show_protected => println!("{indent}    open: {}", url.as_str()),
                    _ => println!("{indent}    open: {}", entry.override_url),
                }
            }
            for attachment in &entry.binaries {
                let size = document
                    .binaries
                    .get(attachment.id)
                    .map(|b| b.data().len() as u64)
                    .unwrap_or(0);
                println!("{indent}    attachment: {} ({})", attachment.key, fmt_bytes(size));
            }
            if !entry.history.is_empty() {
                println!("{indent}    history: {} version(s)", entry.history.len());
            }
        }
        None => {}
    }
}

// ── `kpx search` ──────────────────────────────────────────────────────────────

async fn cmd_search(config: &KpxConfig, file: &Path, query: &str, creds: &Credentials) -> Result<()> {
    let (_, document, _) = open_document(config, file, creds).await?;
    let hits = document.search(query);
    info!(query, hits = hits.len(), "search complete");
    if hits.is_empty() {
        println!("no matches for '{query}'");
    }
    for id in hits {
        let marker = if document.tree.get(id).is_some_and(Node::is_group) { "group" } else { "entry" };
        println!("{marker}  {}", document.path_string(id));
    }
    Ok(())
}

// ── `kpx checksum` ────────────────────────────────────────────────────────────

fn cmd_checksum(file: &Path, len: usize, key_hex: Option<&str>) -> Result<()> {
    let data = std::fs::read(file).with_context(|| format!("reading {}", file.display()))?;
    let key = key_hex
        .map(|k| hex::decode(k.trim()).context("--key must be hex"))
        .transpose()?;
    let digest = blake2b(&data, key.as_deref(), len)?;
    println!("{}  {}", hex::encode(digest), file.display());
    Ok(())
}

// ── `kpx create` ──────────────────────────────────────────────────────────────

async fn cmd_create(
    config: &KpxConfig,
    file: &Path,
    name: &str,
    force: bool,
    creds: &Credentials,
) -> Result<()> {
    if file.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", file.display());
    }
    let key = read_credentials(creds)?;
    let document = Document::new(name, &config.database);
    let writer = KdbxWriter::new(key, &config.database, &config.kdf);
    let version = writer.version();

    let path = file.to_path_buf();
    run_blocking("encrypt", move |cancel| writer.write_file(&path, &document, cancel)).await?;
    println!("Created: {} ({version:?})", file.display());
    Ok(())
}

// ── `kpx rekey` ───────────────────────────────────────────────────────────────

/// New KDF parameters: the chosen algorithm with flags over config defaults,
/// or the existing algorithm with its costs adjusted.
fn rekey_kdf(current: &KdfParameters, defaults: &KdfConfig, changes: &RekeyArgs) -> KdfParameters {
    let algorithm = match changes.kdf {
        Some(KdfChoice::Aes) => KdfAlgorithm::Aes,
        Some(KdfChoice::Argon2d) => KdfAlgorithm::Argon2d,
        None => current.algorithm(),
    };
    let mut costs = defaults.clone();
    match current {
        KdfParameters::Aes { rounds, .. } => costs.aes_rounds = *rounds,
        KdfParameters::Argon2d(p) => {
            costs.argon2_iterations = p.iterations;
            costs.argon2_memory_kib = p.memory_kib;
            costs.argon2_parallelism = p.parallelism;
        }
    }
    let chosen = KdfConfig {
        algorithm,
        aes_rounds: changes.rounds.unwrap_or(costs.aes_rounds),
        argon2_iterations: changes.iterations.unwrap_or(costs.argon2_iterations),
        argon2_memory_kib: changes.memory_kib.unwrap_or(costs.argon2_memory_kib),
        argon2_parallelism: changes.parallelism.unwrap_or(costs.argon2_parallelism),
    };
    KdfParameters::from_config(&chosen)
}

/// Key to save with: the one that opened the file, unless a new password was
/// asked for. A new password must be typed twice; the keyfile stays.
fn rekey_key(opened: CompositeKey, creds: &Credentials, change_password: bool) -> Result<CompositeKey> {
    if !change_password {
        return Ok(opened);
    }
    let first = prompt_password("New password: ")?;
    let second = prompt_password("Repeat new password: ")?;
    if first.expose_secret() != second.expose_secret() {
        anyhow::bail!("passwords do not match");
    }
    let mut key = CompositeKey::new().with_password(&first);
    if let Some(path) = &creds.keyfile {
        let data = load_keyfile(path).with_context(|| format!("reading keyfile: {}", path.display()))?;
        key.add_keyfile(data);
    }
    Ok(key)
}

async fn cmd_rekey(config: &KpxConfig, file: &Path, creds: &Credentials, changes: &RekeyArgs) -> Result<()> {
    let (reader, document, opened) = open_document(config, file, creds).await?;
    let key = rekey_key(opened, creds, changes.change_password)?;

    let mut writer = KdbxWriter::from_reader(&reader, key);
    let kdf = rekey_kdf(writer.kdf(), &config.kdf, changes);
    kdf.validate(&config.limits)?;
    writer.set_kdf(kdf);
    if let Some(cipher) = changes.cipher {
        writer.set_cipher(cipher.into());
    }
    let summary = format!("{:?} / {:?} / {:?}", writer.version(), writer.cipher(), writer.kdf().algorithm());

    let path = file.to_path_buf();
    run_blocking("encrypt", move |cancel| writer.write_file(&path, &document, cancel)).await?;
    println!("Rekeyed: {} ({summary})", file.display());
    Ok(())
}

// ── `kpx config show` ─────────────────────────────────────────────────────────

fn cmd_config_show(config: &KpxConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

// ── Utilities ─────────────────────────────────────────────────────────────────

fn fmt_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn rekey_switches_algorithm_with_config_costs() {
        let current = KdfParameters::aes(6000);
        let defaults = KdfConfig::default();
        let changes = RekeyArgs {
            kdf: Some(KdfChoice::Argon2d),
            rounds: None,
            iterations: Some(3),
            memory_kib: None,
            parallelism: None,
            cipher: None,
            change_password: false,
        };
        match rekey_kdf(&current, &defaults, &changes) {
            KdfParameters::Argon2d(p) => {
                assert_eq!(p.iterations, 3);
                assert_eq!(p.memory_kib, defaults.argon2_memory_kib);
            }
            other => panic!("expected argon2d, got {other:?}"),
        }
    }

    #[test]
    fn rekey_keeps_algorithm_and_adjusts_cost() {
        let current = KdfParameters::aes(6000);
        let changes = RekeyArgs {
            kdf: None,
            rounds: Some(10_000),
            iterations: None,
            memory_kib: None,
            parallelism: None,
            cipher: None,
            change_password: false,
        };
        match rekey_kdf(&current, &KdfConfig::default(), &changes) {
            KdfParameters::Aes { rounds, .. } => assert_eq!(rounds, 10_000),
            other => panic!("expected aes, got {other:?}"),
        }
    }

    #[test]
    fn rekey_without_changes_keeps_costs() {
        let current = KdfParameters::argon2d(4, 1024, 2);
        let changes = RekeyArgs {
            kdf: None,
            rounds: None,
            iterations: None,
            memory_kib: None,
            parallelism: None,
            cipher: None,
            change_password: false,
        };
        match rekey_kdf(&current, &KdfConfig::default(), &changes) {
            KdfParameters::Argon2d(p) => {
                assert_eq!((p.iterations, p.memory_kib, p.parallelism), (4, 1024, 2));
            }
            other => panic!("expected argon2d, got {other:?}"),
        }
    }

    #[test]
    fn credentials_from_flags_do_not_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let keyfile = dir.path().join("db.key");
        std::fs::write(&keyfile, [7u8; 32]).unwrap();
        let creds = Credentials {
            password: Some("pw".into()),
            keyfile: Some(keyfile),
        };
        let key = read_credentials(&creds).unwrap();
        assert_eq!(key.tokens().len(), 2);
    }

    #[test]
    fn rekey_reuses_the_opening_key() {
        // nothing supplied on the command line; reading credentials here would prompt
        let creds = Credentials {
            password: None,
            keyfile: None,
        };
        let opened = CompositeKey::new().with_password(&SecretString::from("typed once"));
        let expected = opened.raw_key();
        let key = rekey_key(opened, &creds, false).unwrap();
        assert_eq!(*key.raw_key(), *expected);
    }

    #[tokio::test]
    async fn rekeyed_database_opens_with_original_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("vault.kdbx");
        let mut config = KpxConfig::default();
        config.kdf.algorithm = KdfAlgorithm::Aes;
        config.kdf.aes_rounds = 16;
        let creds = Credentials {
            password: Some("pw".into()),
            keyfile: None,
        };
        cmd_create(&config, &file, "Vault", false, &creds).await.unwrap();

        let changes = RekeyArgs {
            kdf: None,
            rounds: Some(32),
            iterations: None,
            memory_kib: None,
            parallelism: None,
            cipher: None,
            change_password: false,
        };
        cmd_rekey(&config, &file, &creds, &changes).await.unwrap();

        let (reader, document, _) = open_document(&config, &file, &creds).await.unwrap();
        match &reader.header().kdf {
            KdfParameters::Aes { rounds, .. } => assert_eq!(*rounds, 32),
            other => panic!("expected aes, got {other:?}"),
        }
        assert_eq!(document.meta.database_name, "Vault");
    }

    #[test]
    fn fmt_bytes_units() {
        assert_eq!(fmt_bytes(512), "512 B");
        assert_eq!(fmt_bytes(2048), "2.0 KB");
        assert_eq!(fmt_bytes(3 * 1024 * 1024), "3.0 MB");
    }
}
