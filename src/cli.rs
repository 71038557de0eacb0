use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::hipchat::{HipChatNotifier, RoomRegistry};
use crate::server::{self, AppState};
use crate::teamcity::TeamCityClient;

#[derive(Parser)]
#[command(name = "teamcity-buildbot")]
#[command(author, version, about = "HipChat bridge for TeamCity builds", long_about = None)]
pub struct Cli {
    /// Configuration file (YAML, TOML or JSON)
    #[arg(short, long, env = "BUILDBOT_CONFIG", default_value = "config.yaml")]
    config: PathBuf,

    /// Overrides the configured listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Overrides the configured external base URL
    #[arg(short, long)]
    base_url: Option<String>,
}

impl Cli {
    fn load_config(&self) -> Result<Config> {
        let mut config = Config::load(&self.config)?;
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(base_url) = &self.base_url {
            config.base_url = Some(base_url.clone());
        }
        Ok(config)
    }

    pub async fn execute(&self) -> Result<()> {
        let config = self.load_config()?;
        info!(
            "Loaded {} (TeamCity {} as {})",
            self.config.display(),
            config.teamcity.url,
            config.teamcity.username
        );
        if let Some(base_url) = &config.base_url {
            info!("External base URL: {base_url}");
        }

        let client = Arc::new(
            TeamCityClient::new(config.teamcity.clone(), &config.http)
                .context("Failed to create TeamCity client")?,
        );
        let notifier = Arc::new(
            HipChatNotifier::new(
                &config.hipchat_url,
                config.message_format,
                config.http.timeout(),
            )
            .context("Failed to create HipChat notifier")?,
        );
        info!("Replies are posted as {:?}", notifier.format());

        let state = AppState {
            dispatcher: Arc::new(Dispatcher::new(client, config.command_prefix.clone())),
            notifier,
            rooms: Arc::new(RoomRegistry::default()),
            watch_interval: config.watch.enabled.then(|| config.watch.interval()),
            shutdown: CancellationToken::new(),
        };

        server::serve(state, config.port).await
    }
}
