use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use dialoguer::Password;
use indicatif::{ProgressBar, ProgressStyle};
use notecrypt::config::Config;
use notecrypt::container::{self, ContainerCodec};
use notecrypt::document::Document;
use notecrypt::kdf::KdfParams;
use notecrypt::search::{Highlighter, SearchOutcome, SearchSession};
use notecrypt::session::{NoteSession, SaveTarget};
use notecrypt::NoteError;
use serde::Serialize;
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable consulted before prompting for a password
const ENV_PASSWORD: &str = "NOTECRYPT_PASSWORD";

/// notecrypt - Password-protected notes with Argon2id and XChaCha20-Poly1305
#[derive(Parser)]
#[command(name = "notecrypt")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (JSON)
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encrypt plaintext into a new note
    Create {
        /// Note file to create
        output: PathBuf,

        /// Plaintext file (defaults to stdin)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Caret position to store, in characters
        #[arg(long, default_value_t = 0)]
        caret: usize,
    },

    /// Decrypt a note and print its text
    Show {
        /// Note file
        file: PathBuf,

        /// Write plaintext here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Find a query in a note, case-insensitively
    Search {
        /// Note file
        file: PathBuf,

        /// Text to find
        query: String,

        /// Start offset in characters (defaults to the stored caret)
        #[arg(short, long)]
        from: Option<usize>,

        /// Stop after this many hits
        #[arg(
            short,
            long,
            default_value_t = 10,
            value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..)
        )]
        max: usize,

        /// Print hits as JSON
        #[arg(long)]
        json: bool,
    },

    /// Append a line to a note and save it in place
    Append {
        /// Note file
        file: PathBuf,

        /// Text to append
        text: String,
    },

    /// Re-encrypt a note under a new password
    Passwd {
        /// Note file
        file: PathBuf,
    },

    /// Show container header fields (no password needed)
    Info {
        /// Note file
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured logging
    // Use RUST_LOG environment variable to control log level (e.g., RUST_LOG=info,notecrypt=debug)
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_thread_ids(false)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    info!(command = ?cli.command, "notecrypt starting");

    let cfg = Config::load_with_env(cli.config.as_deref())?;

    match cli.command {
        Commands::Create {
            output,
            input,
            caret,
        } => cmd_create(&output, input.as_ref(), caret).await,

        Commands::Show { file, output } => cmd_show(&file, output.as_ref()).await,

        Commands::Search {
            file,
            query,
            from,
            max,
            json,
        } => cmd_search(&cfg, &file, &query, from, max, json).await,

        Commands::Append { file, text } => cmd_append(&file, &text).await,

        Commands::Passwd { file } => cmd_passwd(&file).await,

        Commands::Info { file } => cmd_info(&file).await,
    }
}

/// Create a spinner for key derivation, which has no measurable progress
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Run codec work (Argon2id is deliberately slow) on the blocking pool
async fn run_blocking<T, F>(message: &str, work: F) -> Result<T>
where
    F: FnOnce() -> notecrypt::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let spinner = create_spinner(message);
    let result = tokio::task::spawn_blocking(work)
        .await
        .context("codec task failed")?;
    spinner.finish_and_clear();

    result.map_err(|e| match e {
        NoteError::WrongPasswordOrCorrupt => {
            anyhow::anyhow!("Password invalid (or the note is damaged)")
        }
        other => other.into(),
    })
}

/// Read the password from NOTECRYPT_PASSWORD or prompt for it.
/// Empty passwords are never accepted.
fn read_password(prompt: &str, confirm: bool) -> Result<String> {
    if let Ok(value) = std::env::var(ENV_PASSWORD) {
        if !value.is_empty() {
            debug!("using password from environment");
            return Ok(value);
        }
    }
    if !io::stdin().is_terminal() {
        bail!("No password provided and no TTY available. Set {ENV_PASSWORD}.");
    }

    let mut builder = Password::new().with_prompt(prompt);
    if confirm {
        builder = builder.with_confirmation("Confirm password", "Passwords do not match");
    }
    let password = builder
        .interact()
        .map_err(|e| anyhow::anyhow!("Failed to read password: {}", e))?;

    if password.is_empty() {
        bail!("Password cannot be empty");
    }
    Ok(password)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

async fn read_note(path: &Path) -> Result<Vec<u8>> {
    fs::read(path)
        .await
        .with_context(|| format!("reading {:?}", path))
}

async fn open_document(path: &Path) -> Result<Document> {
    let bytes = read_note(path).await?;
    let password = read_password(&format!("Password for {}", display_name(path)), false)?;
    run_blocking("Decrypting...", move || {
        Document::open(bytes.as_slice(), &password)
    })
    .await
}

/// Encrypt plaintext into a new note
async fn cmd_create(output: &Path, input: Option<&PathBuf>, caret: usize) -> Result<()> {
    if fs::try_exists(output).await.unwrap_or(false) {
        bail!(
            "Note '{}' already exists. Remove it first or use a different path.",
            output.display()
        );
    }

    let text = match input {
        Some(path) => fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {:?}", path))?,
        None => {
            let mut text = String::new();
            tokio::io::stdin()
                .read_to_string(&mut text)
                .await
                .context("reading plaintext from stdin")?;
            text
        }
    };

    let password = read_password("New password", true)?;
    let handle = output.display().to_string();
    let name = display_name(output);

    let bytes = run_blocking("Encrypting...", move || {
        let mut session = NoteSession::new(ContainerCodec::default());
        session.new_note();
        session.edit(text);
        session.set_caret(caret);
        let mut buf = Vec::new();
        session.save_as(&password, &mut buf, handle, name)?;
        Ok(buf)
    })
    .await?;

    fs::write(output, &bytes)
        .await
        .with_context(|| format!("writing {:?}", output))?;

    println!("Created {} ({} bytes)", output.display(), bytes.len());
    Ok(())
}

/// Decrypt a note to stdout or a file
async fn cmd_show(file: &Path, output: Option<&PathBuf>) -> Result<()> {
    let doc = open_document(file).await?;

    match output {
        Some(path) => {
            fs::write(path, doc.text())
                .await
                .with_context(|| format!("writing to {:?}", path))?;
            eprintln!("Decrypted {} chars -> {:?}", doc.text().chars().count(), path);
        }
        None => {
            io::stdout().write_all(doc.text().as_bytes())?;
            io::stdout().flush()?;
        }
    }

    doc.close();
    Ok(())
}

/// Remembers the range currently marked as the active hit
#[derive(Default)]
struct CurrentHit {
    range: Option<(usize, usize)>,
}

impl Highlighter for CurrentHit {
    fn clear_highlights(&mut self) {
        self.range = None;
    }

    fn add_highlight(&mut self, start: usize, end: usize, is_current: bool) {
        if is_current {
            self.range = Some((start, end));
        }
    }
}

#[derive(Debug, Serialize)]
struct SearchHit {
    offset: usize,
    line: usize,
    column: usize,
    context: String,
}

fn describe_hit(chars: &[char], start: usize, end: usize, context_chars: usize) -> SearchHit {
    let line_start = chars[..start]
        .iter()
        .rposition(|&c| c == '\n')
        .map_or(0, |i| i + 1);
    let line = chars[..start].iter().filter(|&&c| c == '\n').count() + 1;

    let from = start.saturating_sub(context_chars);
    let to = (end + context_chars).min(chars.len());
    let flat = |s: &[char]| -> String {
        s.iter().map(|&c| if c == '\n' { ' ' } else { c }).collect()
    };
    let context = format!(
        "{}[{}]{}",
        flat(&chars[from..start]),
        flat(&chars[start..end]),
        flat(&chars[end..to])
    );

    SearchHit {
        offset: start,
        line,
        column: start - line_start + 1,
        context,
    }
}

/// Successive find-next calls over one decrypted note
async fn cmd_search(
    cfg: &Config,
    file: &Path,
    query: &str,
    from: Option<usize>,
    max: usize,
    json: bool,
) -> Result<()> {
    let doc = open_document(file).await?;
    let text = doc.text();
    let chars: Vec<char> = text.chars().collect();
    let caret = from.unwrap_or_else(|| doc.clamped_caret());

    let mut session = SearchSession::new(CurrentHit::default(), cfg.min_query_len);
    let mut outcome = session.on_query_change(query, text, caret)?;
    if outcome == SearchOutcome::Skipped {
        bail!(
            "Query must be at least {} characters (min_query_len)",
            cfg.min_query_len
        );
    }

    let mut hits = Vec::new();
    let mut first = None;
    while let SearchOutcome::Found(offset) = outcome {
        if first == Some(offset) || hits.len() >= max {
            break;
        }
        first.get_or_insert(offset);

        let (start, end) = session
            .highlighter()
            .and_then(|h| h.range)
            .unwrap_or((offset, offset + query.chars().count()));
        hits.push(describe_hit(&chars, start, end, cfg.context_chars));

        outcome = session.on_query_submit(query, text, caret)?;
    }

    let total = session.searcher().map_or(0, |s| s.match_count());
    session.close();

    if json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
    } else if hits.is_empty() {
        println!("Not found: {}", query);
    } else {
        for hit in &hits {
            println!("{:>6}  {}:{}  {}", hit.offset, hit.line, hit.column, hit.context);
        }
        println!();
        println!("{} of {} match(es) shown", hits.len(), total);
    }

    doc.close();
    Ok(())
}

/// Open, append a line, save back in place
async fn cmd_append(file: &Path, addition: &str) -> Result<()> {
    let bytes = read_note(file).await?;
    let password = read_password(&format!("Password for {}", display_name(file)), false)?;
    let handle = file.display().to_string();
    let name = display_name(file);
    let addition = addition.to_string();

    let (out, title) = run_blocking("Re-encrypting...", move || {
        let mut session = NoteSession::new(ContainerCodec::default());
        session.begin_open();
        let text = {
            let doc = session.complete_open(bytes.as_slice(), &password, handle, name)?;
            let existing = doc.text();
            if existing.is_empty() || existing.ends_with('\n') {
                format!("{existing}{addition}\n")
            } else {
                format!("{existing}\n{addition}\n")
            }
        };
        let caret = text.chars().count();
        session.edit(text);
        session.set_caret(caret);
        let title = session.title();

        let mut buf = Vec::new();
        match session.save_target() {
            Some(SaveTarget::Existing(_)) => session.save(&password, &mut buf)?,
            _ => {
                return Err(NoteError::InvalidState(
                    "opened note has no save target".into(),
                ))
            }
        }
        session.close();
        Ok((buf, title))
    })
    .await?;

    fs::write(file, &out)
        .await
        .with_context(|| format!("writing {:?}", file))?;
    println!("Saved {}", title.trim_end_matches('*'));
    Ok(())
}

/// Re-encrypt under a new password with a fresh salt and nonce
async fn cmd_passwd(file: &Path) -> Result<()> {
    let mut doc = open_document(file).await?;
    let new_password = read_password("New password", true)?;

    let (doc, bytes) = run_blocking("Re-encrypting...", move || {
        let mut buf = Vec::new();
        doc.save(&new_password, &mut buf)?;
        Ok((doc, buf))
    })
    .await?;

    fs::write(file, &bytes)
        .await
        .with_context(|| format!("writing {:?}", file))?;
    doc.close();
    println!("Password changed for {}", file.display());
    Ok(())
}

/// Print header fields without decrypting
async fn cmd_info(file: &Path) -> Result<()> {
    let bytes = read_note(file).await?;
    let header = container::inspect(&bytes).with_context(|| format!("parsing {:?}", file))?;
    let kdf = KdfParams::default();

    println!("Note:            {}", file.display());
    println!("Format version:  {}", header.version);
    println!("Salt:            {} bytes", header.salt.len());
    println!("Nonce:           {} bytes", header.nonce.len());
    println!("Caret position:  {}", header.caret_position);
    println!("Ciphertext:      {} bytes", header.ciphertext_len);
    println!("Container size:  {} bytes", bytes.len());
    println!(
        "KDF:             Argon2id m={} KiB t={} p={}",
        kdf.memory_kib(),
        kdf.iterations(),
        kdf.parallelism()
    );
    Ok(())
}
