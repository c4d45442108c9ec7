use std::sync::Arc;

use stolyarko_bot::channels::{Channel, CliChannel, TelegramApi, TelegramChannel};
use stolyarko_bot::config::{BotConfig, TelegramMode, Transport};
use stolyarko_bot::dispatcher::Dispatcher;
use stolyarko_bot::error::Error;
use stolyarko_bot::intake::{
    ConversationEngine, InMemorySessionStore, LogNotifier, Notifier, SessionStore,
    TelegramNotifier,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = BotConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {}", Error::from(e));
        eprintln!("  export BOT_TOKEN=123456:ABC...  (or INTAKE_CHANNEL=cli to try locally)");
        std::process::exit(1);
    });

    eprintln!("🪚 Stolyarko bot v{}", env!("CARGO_PKG_VERSION"));

    // ── Channel + staff notifier ─────────────────────────────────────────
    let (channel, notifier): (Arc<dyn Channel>, Arc<dyn Notifier>) = match &config.transport {
        Transport::Telegram(telegram) => {
            let api = TelegramApi::new(telegram.bot_token.clone());
            match &telegram.mode {
                TelegramMode::Polling => eprintln!("   Telegram: long polling"),
                TelegramMode::Webhook { public_url, port } => {
                    eprintln!("   Telegram: webhook {public_url} (listening on 0.0.0.0:{port})")
                }
            }
            eprintln!("   Staff chat: {}", config.admin_chat_id);

            let channel = TelegramChannel::new(api.clone(), telegram.mode.clone());
            if let Err(e) = channel.health_check().await {
                tracing::warn!("Telegram health check failed: {e}");
            }
            let channel: Arc<dyn Channel> = Arc::new(channel);
            let notifier: Arc<dyn Notifier> =
                Arc::new(TelegramNotifier::new(api, config.admin_chat_id.clone()));
            (channel, notifier)
        }
        Transport::Cli => {
            eprintln!("   CLI mode; submissions are written to the log");
            let channel: Arc<dyn Channel> = Arc::new(CliChannel::new());
            let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);
            (channel, notifier)
        }
    };

    match config.session_ttl {
        Some(ttl) => eprintln!("   Idle sessions expire after {} min\n", ttl.as_secs() / 60),
        None => eprintln!("   Idle session eviction disabled\n"),
    }

    // ── Conversation engine ─────────────────────────────────────────────
    let store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
    let engine = Arc::new(ConversationEngine::new(store));

    Dispatcher::new(channel, engine, notifier)
        .with_session_ttl(config.session_ttl)
        .run()
        .await?;

    Ok(())
}
