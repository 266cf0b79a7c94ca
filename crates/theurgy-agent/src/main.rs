//! # theurgy
//!
//! Console host: loads settings and persona definitions, wires the Gemini
//! client, a dry-run command executor and a file-backed trust table into a
//! [`SessionManager`], then chats over stdin.

#![deny(unsafe_code)]

mod host;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use theurgy_core::ids::{PersonaId, UserId};
use theurgy_core::persona::OverrideKey;
use theurgy_llm::gemini::{GeminiClient, GeminiConfig};
use theurgy_runtime::arbiter::{Disposition, ExecutionReport, PendingResolution};
use theurgy_runtime::boundary::{NoContext, PersonaCatalog};
use theurgy_runtime::policy::TrustLedger;
use theurgy_runtime::{SessionError, SessionManager, SessionManagerDeps, TurnResult};
use theurgy_settings::TheurgySettings;
use theurgy_store::{Store, StoreConfig};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::host::{DryRunExecutor, TrustTable};

/// Persona conversation console.
#[derive(Parser, Debug)]
#[command(name = "theurgy", about = "Converse with scripted personas")]
struct Cli {
    /// Settings file (defaults to `~/.theurgy/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Hold a conversation on stdin.
    Chat {
        /// Who is speaking.
        #[arg(long)]
        user: String,
        /// Persona to address.
        #[arg(long)]
        persona: String,
        /// Persona definition file (JSON array).
        #[arg(long)]
        definitions: PathBuf,
        /// Trust table (`{"user": {"persona": score}}`). Everyone scores 0 without one.
        #[arg(long)]
        trust: Option<PathBuf>,
    },
    /// Show or clear stored history.
    History {
        /// History owner.
        #[arg(long)]
        user: String,
        /// Persona; every persona's history is cleared when omitted with `--clear`.
        #[arg(long)]
        persona: Option<String>,
        /// Show only audit entries with a summary.
        #[arg(long)]
        audit: bool,
        /// Delete instead of showing.
        #[arg(long)]
        clear: bool,
    },
    /// Manage runtime overrides and show effective settings.
    Override {
        /// Persona to configure.
        #[arg(long)]
        persona: String,
        /// Persona definition file (JSON array).
        #[arg(long)]
        definitions: PathBuf,
        /// `key=value` to set, e.g. `cooldown_minutes=5`.
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,
        /// Key to clear.
        #[arg(long = "clear", value_name = "KEY")]
        clear: Vec<String>,
    },
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

fn load_settings(path: Option<&Path>) -> Result<TheurgySettings> {
    let path = path.map_or_else(theurgy_settings::settings_path, Path::to_path_buf);
    theurgy_settings::load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings: {}", path.display()))
}

fn open_store(settings: &TheurgySettings) -> Result<Arc<Store>> {
    let db_path = PathBuf::from(&settings.history.database_path);
    ensure_parent_dir(&db_path)?;
    let store = Store::open(
        &db_path.to_string_lossy(),
        StoreConfig {
            history_cap: settings.history.max_entries,
            ..StoreConfig::default()
        },
    )
    .context("Failed to open history database")?;
    Ok(Arc::new(store))
}

fn parse_override(arg: &str) -> Result<(OverrideKey, &str)> {
    let Some((key, value)) = arg.split_once('=') else {
        bail!("expected KEY=VALUE, got {arg:?}");
    };
    Ok((parse_key(key)?, value))
}

fn parse_key(key: &str) -> Result<OverrideKey> {
    OverrideKey::from_sql(key.trim()).with_context(|| {
        let known: Vec<_> = OverrideKey::ALL.into_iter().map(OverrideKey::as_sql).collect();
        format!("unknown setting {key:?} (known: {})", known.join(", "))
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Rendering
// ─────────────────────────────────────────────────────────────────────────────

fn render_reports(reports: &[ExecutionReport]) -> Vec<String> {
    reports
        .iter()
        .map(|r| {
            let mark = if r.success { "ok" } else { "failed" };
            format!("  [{mark}] /{}: {}", r.command, r.output)
        })
        .collect()
}

fn render_turn(persona_name: &str, result: &TurnResult) -> Vec<String> {
    match result {
        TurnResult::Reply {
            dialogue,
            disposition,
        } => {
            let mut lines = vec![format!("{persona_name}: {dialogue}")];
            match disposition {
                Disposition::Executed(reports) => lines.extend(render_reports(reports)),
                Disposition::Suggested(commands) => {
                    lines.push(format!("{persona_name} offers:"));
                    lines.extend(commands.iter().map(|c| format!("  /{c}")));
                    lines.push("Answer yes to accept or no to decline.".to_string());
                }
                Disposition::None => {}
            }
            lines
        }
        TurnResult::Fallback { dialogue } => vec![format!("{persona_name}: {dialogue}")],
        TurnResult::Resolved(PendingResolution::Executed(reports)) => render_reports(reports),
        TurnResult::Resolved(PendingResolution::Declined(count)) => {
            vec![format!("You decline {count} offering(s).")]
        }
        TurnResult::Resolved(PendingResolution::NothingPending) => {
            vec!["Nothing awaits your answer.".to_string()]
        }
        TurnResult::Ended { farewell } => vec![farewell.clone()],
        TurnResult::Discarded => Vec::new(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

async fn chat(
    settings: TheurgySettings,
    user: UserId,
    persona: PersonaId,
    definitions: &Path,
    trust: Option<&Path>,
) -> Result<()> {
    let catalog = PersonaCatalog::new(theurgy_settings::load_definitions(definitions)?);
    let trust = match trust {
        Some(path) => TrustTable::load(path)?,
        None => TrustTable::default(),
    };
    let gemini = GeminiConfig::from_settings(&settings.generation)?;
    let manager = Arc::new(SessionManager::new(SessionManagerDeps {
        store: open_store(&settings)?,
        settings,
        catalog: Arc::new(catalog),
        generator: Arc::new(GeminiClient::new(gemini)),
        executor: Arc::new(DryRunExecutor),
        trust: Arc::new(trust),
        context: Arc::new(NoContext),
    }));
    let shutdown = CancellationToken::new();
    let maintenance = manager.spawn_maintenance(shutdown.clone());

    let started = match manager.start_session(&user, &persona).await {
        Ok(started) => started,
        Err(e) if e.is_gating() || matches!(e, SessionError::SessionEnded) => {
            println!("{e}");
            shutdown.cancel();
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    println!("{}: {}", started.persona_name, started.greeting);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            let _ = manager.end_session(&user);
            break;
        };
        if line.trim().is_empty() {
            continue;
        }
        match manager.submit_utterance(&user, &line).await {
            Ok(result) => {
                for out in render_turn(&started.persona_name, &result) {
                    println!("{out}");
                }
                if matches!(result, TurnResult::Ended { .. }) {
                    break;
                }
            }
            Err(SessionError::TurnInFlight) => println!("{}", SessionError::TurnInFlight),
            Err(e) if e.is_gating() => {
                println!("{e}");
                break;
            }
            Err(e) => {
                tracing::error!(error = %e, "turn failed");
                println!("Something went wrong; try again.");
            }
        }
    }

    shutdown.cancel();
    let _ = maintenance.await;
    Ok(())
}

fn history(
    settings: &TheurgySettings,
    user: &UserId,
    persona: Option<&PersonaId>,
    audit: bool,
    clear: bool,
) -> Result<()> {
    let store = open_store(settings)?;
    match (persona, clear) {
        (Some(persona), true) => {
            let removed = store.clear_history(user, persona)?;
            println!("Removed {removed} entries.");
        }
        (None, true) => {
            let removed = store.clear_all_history(user)?;
            println!("Removed {removed} entries across all personas.");
        }
        (None, false) => bail!("--persona is required unless clearing"),
        (Some(persona), false) if audit => {
            for entry in store.audit_entries(user, persona)? {
                println!("{} {}: {}", entry.timestamp.to_rfc3339(), entry.speaker, entry.text);
            }
            let report = store.audit_report(user, persona)?;
            println!(
                "{} command(s), {} succeeded, {} failed, {} judgment(s)",
                report.commands_total,
                report.commands_succeeded,
                report.commands_failed(),
                report.decisions
            );
        }
        (Some(persona), false) => {
            for entry in store.history(user, persona)? {
                println!("{} {}: {}", entry.timestamp.to_rfc3339(), entry.speaker, entry.text);
            }
        }
    }
    Ok(())
}

fn configure(
    settings: &TheurgySettings,
    persona: &PersonaId,
    definitions: &Path,
    set: &[String],
    clear: &[String],
) -> Result<()> {
    let catalog = PersonaCatalog::new(theurgy_settings::load_definitions(definitions)?);
    let definition = catalog
        .get(persona)
        .with_context(|| format!("unknown persona: {persona}"))?;
    let ledger = TrustLedger::new(
        Arc::new(TrustTable::default()),
        open_store(settings)?,
        settings.limits.global_max_commands,
        settings.generation.model.clone(),
    );
    for key in clear {
        let _ = ledger.clear_override(persona, parse_key(key)?)?;
    }
    for arg in set {
        let (key, value) = parse_override(arg)?;
        ledger.set_override(persona, key, value)?;
    }
    for line in ledger.configuration_summary(&definition) {
        println!("{line}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let settings = load_settings(args.settings.as_deref())?;
    theurgy_core::logging::init_subscriber(&settings.logging.level, settings.logging.json);

    match args.command {
        Command::Chat {
            user,
            persona,
            definitions,
            trust,
        } => {
            chat(
                settings,
                UserId::from(user),
                PersonaId::from(persona),
                &definitions,
                trust.as_deref(),
            )
            .await
        }
        Command::History {
            user,
            persona,
            audit,
            clear,
        } => history(
            &settings,
            &UserId::from(user),
            persona.map(PersonaId::from).as_ref(),
            audit,
            clear,
        ),
        Command::Override {
            persona,
            definitions,
            set,
            clear,
        } => configure(&settings, &PersonaId::from(persona), &definitions, &set, &clear),
    }
}
