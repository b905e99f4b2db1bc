//! Boot sequence: collaborators, fleet status, games, then the main loop.
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::core::command::RemoteCommand;
use crate::core::engine::Engine;
use crate::core::game::GameContext;
use crate::core::presentation::{FaceState, Presentation};
use crate::core::registry::GameRegistry;
use crate::core::session::SessionController;
use crate::core::terminal::TerminalScreen;
use crate::games;
use crate::services::brain::{Brain, GeminiBrain};
use crate::services::cloud::{detect_device_id, spawn_uploader, CloudClient, CloudCommandFeed};
use crate::services::hardware::{Hardware, Voice};
use crate::services::poller::CommandPoller;
use crate::services::telemetry::Telemetry;

const GREETING: &str = "Olá, eu sou o Tirilo. Vamos brincar?";
const NET_DIR: &str = "/sys/class/net";
const UNKNOWN_DEVICE: &str = "00:00:00:00:00:00";

fn device_id(config: &Config) -> String {
    if let Some(id) = config.cloud.device_id.clone().filter(|id| !id.is_empty()) {
        return id;
    }
    detect_device_id(Path::new(NET_DIR)).unwrap_or_else(|| {
        warn!("no network interface address found, using placeholder device id");
        UNKNOWN_DEVICE.to_string()
    })
}

/// Run the robot until the user quits.
pub async fn run(config: Config) -> Result<()> {
    let cloud = if config.cloud.offline {
        info!("offline mode, fleet service disabled");
        None
    } else {
        let credentials = config.cloud_credentials()?;
        let device = device_id(&config);
        info!(%device, "device identified");
        Some(Arc::new(CloudClient::new(&credentials, device).context("building fleet client")?))
    };

    let hardware = Arc::new(Hardware::new(&config.voice));
    let brain = Arc::new(GeminiBrain::new(&config.brain, Handle::current()));

    let locked = match &cloud {
        Some(client) => {
            let status = client.check_status().await;
            if status.blocked {
                warn!("device is blocked by the fleet service");
            } else if let Some(clinic) = &status.clinic_id {
                let remote = client.fetch_config(clinic).await;
                if let Some(engine) = &remote.voice_engine {
                    hardware.set_engine(engine);
                }
                if let Some(prompt) = &remote.personality_prompt {
                    brain.configure(prompt);
                }
            }
            status.blocked
        }
        None => false,
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (telemetry, telemetry_rx) = Telemetry::channel();
    let mut tasks: Vec<JoinHandle<()>> = vec![spawn_uploader(cloud.clone(), telemetry_rx, shutdown_rx.clone())];

    let (command_tx, command_rx) = mpsc::unbounded_channel();
    match (&cloud, locked) {
        (Some(client), false) => {
            let feed = CloudCommandFeed::new(client.clone());
            tasks.push(CommandPoller::new(feed, config.poll_interval(), command_tx).spawn(shutdown_rx.clone()));
        }
        _ => drop(command_tx),
    }

    let screen = Arc::new(TerminalScreen::new(hardware.feed())?);
    let outcome = play(&config, &hardware, &brain, &screen, telemetry, command_rx, locked).await;

    info!("shutting down");
    let _ = shutdown_tx.send(true);
    let timeout = config.shutdown_timeout();
    for task in tasks {
        if tokio::time::timeout(timeout, task).await.is_err() {
            warn!("background task did not stop in time");
        }
    }
    let voice = hardware.clone();
    if let Err(e) = tokio::task::spawn_blocking(move || voice.shutdown(timeout)).await {
        warn!(error = %e, "voice shutdown failed");
    }
    screen.restore();
    outcome
}

/// Games, greeting and the main loop. Returns once the loop has quit.
async fn play(
    config: &Config,
    hardware: &Arc<Hardware>,
    brain: &Arc<GeminiBrain>,
    screen: &Arc<TerminalScreen>,
    telemetry: Telemetry,
    commands: mpsc::UnboundedReceiver<RemoteCommand>,
    locked: bool,
) -> Result<()> {
    let ctx = GameContext::new(hardware.clone(), screen.clone(), brain.clone(), telemetry);
    let mut registry = GameRegistry::new(games::builtin_catalog(), ctx.clone()).with_manifest_dir(config.games.dir.clone());

    if locked {
        screen.set_state(FaceState::Locked);
    } else {
        let report = registry.load_all();
        info!(loaded = report.loaded.len(), failed = report.errors.len(), "games loaded");
        screen.set_catalog(registry.descriptors());
        screen.set_state(FaceState::Idle);
        hardware.speak(GREETING);
    }

    let engine = Engine::new(SessionController::new(registry), &ctx, commands, config.frame_period()).locked(locked);
    // the loop holds the last game context clones; telemetry closes when it ends
    drop(ctx);
    if let Err(e) = tokio::task::spawn_blocking(move || engine.run()).await {
        error!(error = %e, "main loop aborted");
        anyhow::bail!("main loop aborted: {e}");
    }
    Ok(())
}
