use anyhow::{Context, Result};
use serenity::{
    model::{gateway::GatewayIntents, id::ApplicationId},
    Client,
};
use songbird::{SerenityInit, Songbird};
use std::{sync::Arc, time::Duration};
use tokio::io::BufReader;
use tracing::{error, info, warn};

mod audio;
mod bot;
mod config;
mod error;
mod notify;
mod sources;
mod ui;

use crate::audio::player::{PlaybackServices, PlayerSettings};
use crate::audio::songbird_sink::SongbirdConnector;
use crate::bot::dispatcher::CommandDispatcher;
use crate::bot::registry::SessionRegistry;
use crate::bot::ReadyHandler;
use crate::config::Config;
use crate::notify::DiscordNotifier;
use crate::sources::YtDlpResolver;

fn main() -> Result<()> {
    // Logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("guild_jukebox=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Starting Guild Jukebox v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.worker_threads)
        .enable_all()
        .build()?;

    if std::env::args().any(|arg| arg == "--health-check") {
        return runtime.block_on(health_check(&config));
    }

    runtime.block_on(run(config))
}

async fn run(config: Config) -> Result<()> {
    info!("{}", config.summary());

    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;
    let (handler, ready) = ReadyHandler::new();

    let songbird = Songbird::serenity();
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(Arc::clone(&songbird))
        .await
        .context("Error creating Discord client")?;

    let cache = Arc::clone(&client.cache);
    let discord_http = Arc::clone(&client.http);
    tokio::spawn(async move {
        if let Err(why) = client.start().await {
            error!("Error running client: {:?}", why);
            std::process::exit(1);
        }
    });

    // Commands are only read once the gateway is up and the guild cache is filling.
    let gateway_app_id = ready
        .await
        .context("Gateway closed before becoming ready")?;
    let application_id = match config.application_id {
        Some(id) if id != gateway_app_id => {
            warn!("APPLICATION_ID {} differs from the gateway's {}", id, gateway_app_id);
            id
        }
        Some(id) => id,
        None => gateway_app_id,
    };

    discord_http.set_application_id(ApplicationId::new(application_id));
    let notifier = Arc::new(DiscordNotifier::new(discord_http));
    let http = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()?;

    let services = PlaybackServices {
        resolver: Arc::new(YtDlpResolver::new(&config)),
        connector: Arc::new(SongbirdConnector::new(songbird, http)),
        notifier: notifier.clone(),
    };
    let registry = Arc::new(SessionRegistry::new(
        services,
        PlayerSettings::from(&config),
        config.command_buffer,
    ));
    let dispatcher = CommandDispatcher::new(registry, Arc::new(cache), notifier);

    info!("🚀 Bot started, reading commands from stdin");
    tokio::select! {
        result = dispatcher.run(BufReader::new(tokio::io::stdin())) => {
            result?;
            info!("👋 Input closed, shutting down");
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("Error listening for Ctrl+C")?;
            info!("⚠️ Shutdown signal received, closing...");
        }
    }

    Ok(())
}

async fn health_check(config: &Config) -> Result<()> {
    let yt_dlp = async_process::Command::new(&config.ytdlp_path)
        .arg("--version")
        .output()
        .await
        .with_context(|| format!("Could not run {}", config.ytdlp_path))?;

    if yt_dlp.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("{} is not working", config.ytdlp_path);
    }
}
