use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::Config;
use crate::engine::{Command, Engine, EventCallback, Outputs, SnapshotCallback};
use crate::logger::{MessageLogMode, MessageLogger};
use crate::types::*;
use crate::{Error, Result};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct SmartLightClientBuilder {
    config: Config,
    event_callbacks: Vec<EventCallback>,
    snapshot_callbacks: Vec<SnapshotCallback>,
    log_mode: Option<MessageLogMode>,
    log_path: Option<String>,
}

impl SmartLightClientBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            event_callbacks: Vec::new(),
            snapshot_callbacks: Vec::new(),
            log_mode: None,
            log_path: None,
        }
    }

    pub fn on_event(mut self, f: impl Fn(&Event) + Send + Sync + 'static) -> Self {
        self.event_callbacks.push(Box::new(f));
        self
    }

    pub fn on_snapshot(mut self, f: impl Fn(&DeviceState) + Send + Sync + 'static) -> Self {
        self.snapshot_callbacks.push(Box::new(f));
        self
    }

    pub fn message_log(mut self, mode: MessageLogMode, path: impl Into<String>) -> Self {
        self.log_mode = Some(mode);
        self.log_path = Some(path.into());
        self
    }

    /// Validates the configuration and spawns the engine task.
    ///
    /// Must be called from within a tokio runtime. Unless simulation is
    /// enabled, the event stream starts connecting immediately.
    pub fn build(self) -> Result<SmartLightClient> {
        let config = self.config.validated()?;

        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        let logger = match (self.log_mode, self.log_path) {
            (Some(mode), Some(path)) => Some(MessageLogger::new(mode, &path)?),
            _ => None,
        };

        let (snapshot_tx, snapshot_rx) = watch::channel(DeviceState::default());
        let (status_tx, status_rx) = watch::channel(EngineStatus {
            reconnect_delay: config.reconnect_initial(),
            ..Default::default()
        });
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let stop = CancellationToken::new();

        let outputs = Outputs {
            snapshot: snapshot_tx,
            status: status_tx,
            event_callbacks: self.event_callbacks,
            snapshot_callbacks: self.snapshot_callbacks,
            logger,
        };
        let engine = Engine::new(config.clone(), http, outputs, stop.clone());
        let task = tokio::spawn(engine.run(command_rx));
        debug!(name = %config.display_name, simulation = config.simulation, "engine started");

        Ok(SmartLightClient {
            config,
            commands: command_tx,
            snapshot: snapshot_rx,
            status: status_rx,
            stop,
            task: Some(task),
        })
    }
}

/// Handle to a running air-conditioner engine.
///
/// Reads return the latest published state without waiting on the device.
/// Setters only queue a command for the engine task and return. The local
/// state changes when the engine picks the command up, so a `snapshot()`
/// taken right after a setter may still show the previous value; use
/// [`subscribe`](Self::subscribe) and `wait_for` to observe the change. The
/// device is brought in line in the background. Dropping the handle stops
/// the engine.
pub struct SmartLightClient {
    config: Config,
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<DeviceState>,
    status: watch::Receiver<EngineStatus>,
    stop: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SmartLightClient {
    pub fn builder(config: Config) -> SmartLightClientBuilder {
        SmartLightClientBuilder::new(config)
    }

    /// The validated configuration the engine runs with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn snapshot(&self) -> DeviceState {
        self.snapshot.borrow().clone()
    }

    /// A receiver that is notified each time the device state is republished.
    pub fn subscribe(&self) -> watch::Receiver<DeviceState> {
        self.snapshot.clone()
    }

    pub fn status(&self) -> EngineStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<EngineStatus> {
        self.status.clone()
    }

    /// Queues a mode change. Returns [`Error::EngineStopped`] once the engine
    /// is gone; success does not mean the snapshot already reflects it.
    pub fn set_target_mode(&self, mode: Mode) -> Result<()> {
        self.send(Command::SetMode(mode))
    }

    /// Host-facing variant of [`set_target_mode`](Self::set_target_mode).
    pub fn set_target_state(&self, state: TargetState) -> Result<()> {
        self.send(Command::SetMode(Mode::from(state)))
    }

    /// Clamped to 16..=30 °C and rounded to the nearest 0.5 when the engine
    /// applies it. NaN and infinities are ignored.
    pub fn set_target_temperature(&self, celsius: f64) -> Result<()> {
        self.send(Command::SetTargetTemperature(celsius))
    }

    pub fn set_fan_only(&self, on: bool) -> Result<()> {
        self.send(Command::SetFanOnly(on))
    }

    pub fn set_dry_mode(&self, on: bool) -> Result<()> {
        self.send(Command::SetDryMode(on))
    }

    pub fn set_beeper(&self, on: bool) -> Result<()> {
        self.send(Command::SetBeeper(on))
    }

    pub fn set_preset(&self, preset: Preset) -> Result<()> {
        self.send(Command::SetPreset(preset))
    }

    /// Switch-style preset control. Turning a preset off only has an effect
    /// while it is the active one.
    pub fn set_preset_enabled(&self, preset: Preset, on: bool) -> Result<()> {
        self.send(Command::SetPresetEnabled(preset, on))
    }

    pub fn set_swing(&self, swing: SwingMode) -> Result<()> {
        self.send(Command::SetSwing(swing))
    }

    pub fn set_swing_enabled(&self, on: bool) -> Result<()> {
        let swing = if on { SwingMode::Both } else { SwingMode::Off };
        self.send(Command::SetSwing(swing))
    }

    /// Stops the engine and waits for it to release its timers, stream and
    /// in-flight requests.
    pub async fn shutdown(mut self) {
        self.stop.cancel();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            debug!(error = %e, "engine task ended abnormally");
        }
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| Error::EngineStopped)
    }
}

impl Drop for SmartLightClient {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}
