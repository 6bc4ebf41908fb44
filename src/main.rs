// Copyright (c) 2024-2025 Swipegate Contributors
// Licensed under the MIT License. See LICENSE file for details.

//! Kiosk terminal front end.
//!
//! Maps raw terminal key events onto the core's key symbols and renders the
//! hint channels. The access semantics all live in the library; this binary
//! is the display-layer collaborator.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use swipegate::{
    AccessController, AdminEnrollment, AuditLogger, JsonStore, Key, KioskConfig,
    DEFAULT_ACCESS_WINDOW_SECS, DEFAULT_ATTEMPT_WINDOW_SECS,
};

/// Exit codes following sysexits.h conventions
mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const ERROR: i32 = 1;
    /// Data error - audit log failed verification
    pub const DATA_ERR: i32 = 65;
}

#[derive(Parser)]
#[command(name = "swipegate", version, about = "Card-swipe access control for shared kiosk terminals")]
struct Cli {
    /// Path to the JSON user store (defaults to the platform data directory)
    #[arg(long)]
    store: Option<PathBuf>,

    /// Seconds a partial scan may stay pending
    #[arg(long, default_value_t = DEFAULT_ATTEMPT_WINDOW_SECS)]
    attempt_window: u64,

    /// Seconds a granted session stays valid
    #[arg(long, default_value_t = DEFAULT_ACCESS_WINDOW_SECS)]
    access_window: u64,

    /// Disable audit logging
    #[arg(long)]
    no_audit: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the kiosk access loop (default)
    Run,
    /// Enroll or retire admin cards
    Enroll {
        #[command(subcommand)]
        action: EnrollAction,
    },
    /// Inspect the audit log
    Audit {
        #[command(subcommand)]
        action: AuditAction,
    },
}

#[derive(Subcommand)]
enum EnrollAction {
    /// Scan a card to grant it the admin flag
    Add,
    /// Scan a card to revoke its admin flag
    Remove,
}

#[derive(Subcommand)]
enum AuditAction {
    /// Print all audit log lines
    Show,
    /// Verify the HMAC integrity chain
    Verify,
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("swipegate")
}

fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            exit_codes::ERROR
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    let dir = data_dir();
    let store_path = cli.store.clone().unwrap_or_else(|| dir.join("users.json"));

    let logger = AuditLogger::with_dir(dir.clone(), !cli.no_audit)
        .context("Failed to set up the audit log")?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Audit { action } => return run_audit(logger, action),
        command => {
            swipegate::init_audit_logger(logger);

            if let Some(parent) = store_path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {:?}", parent))?;
            }
            let store = Arc::new(
                JsonStore::open(&store_path)
                    .with_context(|| format!("Failed to open user store {:?}", store_path))?,
            );
            let config = KioskConfig::custom(
                Duration::from_secs(cli.attempt_window),
                Duration::from_secs(cli.access_window),
            );

            match command {
                Command::Run => run_kiosk(store, config),
                Command::Enroll { action } => run_enroll(store, config, action),
                Command::Audit { .. } => unreachable!("handled above"),
            }
        }
    }
}

/// RAII guard so a panic or early return restores the terminal.
struct RawMode;

impl RawMode {
    fn enable() -> Result<Self> {
        terminal::enable_raw_mode().context("Failed to enable raw terminal mode")?;
        Ok(Self)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

/// Map a terminal key event onto a core key symbol.
///
/// Tab stands in for the reader's submit key and Backspace for its cancel
/// key; both are ignored by the accumulator, as on the real keypad.
fn map_key(event: &KeyEvent) -> Option<Key> {
    match event.code {
        KeyCode::Enter => Some(Key::Enter),
        KeyCode::Tab => Some(Key::Submit),
        KeyCode::Backspace => Some(Key::Cancel),
        KeyCode::Char(c) => Some(Key::Char(c)),
        _ => None,
    }
}

fn is_quit(event: &KeyEvent) -> bool {
    event.code == KeyCode::Esc
        || (event.code == KeyCode::Char('c') && event.modifiers.contains(KeyModifiers::CONTROL))
}

fn redraw(hint: &str, last: &mut String) {
    if hint == last {
        return;
    }
    print!("\r\x1b[2K{}", hint.cyan().bold());
    let _ = std::io::stdout().flush();
    *last = hint.to_string();
}

fn run_kiosk(store: Arc<JsonStore>, config: KioskConfig) -> Result<i32> {
    let controller = AccessController::new(store, config);

    println!("{}", "swipegate kiosk (Esc to exit)".dimmed());
    let _raw = RawMode::enable()?;
    let mut last_hint = String::new();
    redraw(&controller.hint(), &mut last_hint);

    loop {
        // Poll with a timeout: timers change the hint without any input.
        if event::poll(Duration::from_millis(100)).context("Failed to poll terminal events")? {
            if let Event::Key(key_event) = event::read().context("Failed to read terminal event")? {
                if is_quit(&key_event) {
                    break;
                }
                if let Some(key) = map_key(&key_event) {
                    controller.handle_event(key);
                    // The submit key is the thumb press: consume the grant
                    // and commit the pending vote.
                    if key == Key::Submit && controller.check_regular_verified(false) {
                        match controller.register_vote() {
                            Ok(true) => {
                                print!("\r\x1b[2K{}\r\n", "Vote recorded".green().bold());
                            }
                            Ok(false) => {}
                            Err(e) => {
                                tracing::error!("VOTE: failed to record: {:#}", e);
                                print!(
                                    "\r\x1b[2K{}\r\n",
                                    "Vote failed, swipe again".red().bold()
                                );
                            }
                        }
                    }
                }
            }
        }
        redraw(&controller.hint(), &mut last_hint);
    }

    println!();
    Ok(exit_codes::SUCCESS)
}

fn run_enroll(store: Arc<JsonStore>, config: KioskConfig, action: EnrollAction) -> Result<i32> {
    let enrollment = AdminEnrollment::new(store, config);

    let label = match action {
        EnrollAction::Add => "add admin",
        EnrollAction::Remove => "remove admin",
    };
    println!("{}", format!("swipegate enroll: {} (Esc to exit)", label).dimmed());

    let _raw = RawMode::enable()?;
    let mut last_hint = String::new();
    redraw(&enrollment.hint(), &mut last_hint);

    loop {
        if event::poll(Duration::from_millis(100)).context("Failed to poll terminal events")? {
            if let Event::Key(key_event) = event::read().context("Failed to read terminal event")? {
                if is_quit(&key_event) {
                    break;
                }
                if let Some(key) = map_key(&key_event) {
                    match action {
                        EnrollAction::Add => enrollment.handle_new_admin(key),
                        EnrollAction::Remove => enrollment.handle_remove_admin(key),
                    };
                }
            }
        }
        redraw(&enrollment.hint(), &mut last_hint);
    }

    println!();
    Ok(exit_codes::SUCCESS)
}

fn run_audit(logger: AuditLogger, action: AuditAction) -> Result<i32> {
    match action {
        AuditAction::Show => {
            let entries = logger.read_all_entries().context("Failed to read the audit log")?;
            if entries.is_empty() {
                println!("{}", "audit log is empty".dimmed());
                return Ok(exit_codes::SUCCESS);
            }
            for line in entries {
                println!("{}", line);
            }
            Ok(exit_codes::SUCCESS)
        }
        AuditAction::Verify => match logger.verify_integrity() {
            Ok(count) => {
                println!("{} {} entries verified", "ok:".green().bold(), count);
                Ok(exit_codes::SUCCESS)
            }
            Err(e) => {
                eprintln!("{} {:#}", "integrity failure:".red().bold(), e);
                Ok(exit_codes::DATA_ERR)
            }
        },
    }
}
