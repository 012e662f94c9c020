//! # bdaybot CLI
//!
//! Group chat birthday reminder bot.
//!
//! Usage:
//!   bdaybot run                              # Telegram bot + daily reminders
//!   bdaybot run --console -100               # Local console chat, no Telegram
//!   bdaybot onboard                          # First-time setup
//!   bdaybot config show                      # Show configuration
//!   bdaybot upcoming --group -100 --days 30  # Upcoming birthdays of a group
//!   bdaybot set-time --group -100 18:30      # Change a group's reminder time

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use bdaybot_bot::{Dispatcher, Handler};
use bdaybot_channels::{ConsoleChannel, TelegramChannel};
use bdaybot_core::format::format_upcoming;
use bdaybot_core::traits::{BirthdayStore, Channel};
use bdaybot_core::types::NotifyTime;
use bdaybot_core::{BotConfig, Clock, SystemClock};
use bdaybot_scheduler::SchedulerEngine;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

/// How long tasks get to wind down after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(
    name = "bdaybot",
    version,
    about = "🎂 bdaybot: birthday reminders for group chats"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bot: chat handling and the reminder scheduler
    Run {
        /// Use the terminal as the chat with this id instead of Telegram
        #[arg(long, allow_negative_numbers = true)]
        console: Option<i64>,
    },

    /// First-time setup
    Onboard {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show system info
    Info,

    /// Print the upcoming birthdays of a group
    Upcoming {
        /// Chat id of the group
        #[arg(long, allow_negative_numbers = true)]
        group: i64,

        /// Days to look ahead
        #[arg(long, default_value_t = 7)]
        days: u32,
    },

    /// Set the daily reminder time of a group
    SetTime {
        /// Chat id of the group
        #[arg(long, allow_negative_numbers = true)]
        group: i64,

        /// Local time, HH:MM
        time: String,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config
    let config = if let Some(path) = &cli.config {
        BotConfig::load_from(Path::new(path))?
    } else {
        BotConfig::load()?
    };

    // Initialize logging
    let filter = if cli.verbose || config.debug {
        "bdaybot=debug,bdaybot_core=debug,bdaybot_store=debug,bdaybot_channels=debug,bdaybot_scheduler=debug,bdaybot_bot=debug"
    } else {
        "bdaybot=info,bdaybot_store=info,bdaybot_channels=info,bdaybot_scheduler=info,bdaybot_bot=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    match cli.command {
        Commands::Run { console } => run(config, console).await?,

        Commands::Onboard { force } => {
            println!("🎂 bdaybot: first-time setup\n");
            let path = BotConfig::default_path();
            if path.exists() && !force {
                println!("Config already exists: {}", path.display());
                println!("Use --force to overwrite it with defaults.");
            } else {
                BotConfig::default().save()?;
                println!("✅ Config saved to: {}", path.display());
            }
            std::fs::create_dir_all(BotConfig::home_dir())?;

            println!("\n📋 Next steps:");
            println!("  1. Create a bot with @BotFather and copy its token");
            println!("  2. Put it in {} under [telegram] bot_token,", path.display());
            println!("     or export TELEGRAM_BOT_TOKEN (a .env file works too)");
            println!("  3. Add the bot to a group and start it: bdaybot run");
        }

        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let mut shown = config.clone();
                if !shown.telegram.bot_token.is_empty() {
                    shown.telegram.bot_token = "***".into();
                }
                println!("{}", toml::to_string_pretty(&shown)?);
            }
        },

        Commands::Info => {
            println!("🎂 bdaybot v{}", env!("CARGO_PKG_VERSION"));
            println!("   Platform: {} / {}", std::env::consts::OS, std::env::consts::ARCH);
            println!("   Config: {}", BotConfig::default_path().display());
            println!("   Storage: {} ({})", config.storage.backend, config.database_path().display());
            println!(
                "   Telegram token: {}",
                if config.telegram.bot_token.is_empty() { "not set" } else { "set" }
            );
            println!(
                "   Scheduler: {} (tick {}s, lookahead {} days, dedup {})",
                if config.scheduler.enabled { "enabled" } else { "disabled" },
                config.scheduler.tick_secs,
                config.scheduler.lookahead_days,
                if config.scheduler.dedup_daily { "on" } else { "off" }
            );
            if let Ok(store) = open_store(&config) {
                let groups = store.list_all_groups().await?;
                println!("   Groups: {}", groups.len());
            }
        }

        Commands::Upcoming { group, days } => {
            let store = open_store(&config)?;
            let today = SystemClock.today();
            let records = store.list_upcoming(group, today, days).await?;
            if records.is_empty() {
                println!("No birthdays in the next {days} days.");
            } else {
                print!("{}", format_upcoming(&records, today));
            }
        }

        Commands::SetTime { group, time } => {
            let time: NotifyTime = time.parse()?;
            let store = open_store(&config)?;
            store.set_notify_time(group, time).await?;
            println!("✅ Group {group}: reminders at {time}");
        }
    }

    Ok(())
}

fn open_store(config: &BotConfig) -> Result<Arc<dyn BirthdayStore>> {
    let store = bdaybot_store::create_store(&config.storage, &config.database_path())?;
    Ok(Arc::from(store))
}

async fn run(config: BotConfig, console: Option<i64>) -> Result<()> {
    let store = open_store(&config)?;
    tracing::info!("Store: {} ({})", store.name(), config.database_path().display());

    let mut channel: Box<dyn Channel> = match console {
        Some(chat_id) => Box::new(ConsoleChannel::new(chat_id)),
        None => {
            config.validate_for_telegram()?;
            Box::new(TelegramChannel::new(&config.telegram))
        }
    };
    channel.connect().await?;
    let channel: Arc<dyn Channel> = Arc::from(channel);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scheduler = SchedulerEngine::new(
        store.clone(),
        channel.clone(),
        clock.clone(),
        config.scheduler.clone(),
    );
    let session_ttl = chrono::Duration::seconds(config.session.ttl_secs.min(86_400) as i64);
    let handler = Handler::new(store, session_ttl).with_bot_username(channel.bot_username());
    let dispatcher = Dispatcher::new(handler, channel.clone(), clock);

    let scheduler_task = tokio::spawn({
        let shutdown = shutdown_rx.clone();
        async move { scheduler.run(shutdown).await }
    });
    let mut dispatcher_task = tokio::spawn(async move { dispatcher.run(shutdown_rx).await });

    println!("🎂 bdaybot is running on {}. Press Ctrl+C to stop.", channel.name());

    let mut dispatcher_done = false;
    tokio::select! {
        _ = shutdown_signal() => {}
        result = &mut dispatcher_task => {
            dispatcher_done = true;
            match result {
                Ok(Ok(())) => tracing::info!("Event stream finished"),
                Ok(Err(e)) => tracing::error!("Dispatcher failed: {e}"),
                Err(e) => tracing::error!("Dispatcher task panicked: {e}"),
            }
        }
    }

    let _ = shutdown_tx.send(true);
    if !dispatcher_done && tokio::time::timeout(SHUTDOWN_GRACE, dispatcher_task).await.is_err() {
        tracing::warn!("Dispatcher did not stop within {}s", SHUTDOWN_GRACE.as_secs());
    }
    if tokio::time::timeout(SHUTDOWN_GRACE, scheduler_task).await.is_err() {
        tracing::warn!("Scheduler did not stop within {}s", SHUTDOWN_GRACE.as_secs());
    }

    println!("\n👋 bdaybot stopped.");
    Ok(())
}

/// Resolves on Ctrl+C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}
