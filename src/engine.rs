//! The task that owns all device state.
//!
//! Caller commands, stream traffic, HTTP completions and timers are all
//! handled from one `select!` loop, so each handler runs to completion before
//! the next starts and nothing here needs a lock.

use std::time::Duration;

use futures::StreamExt;
use reqwest::header::ACCEPT;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::ack::AckTracker;
use crate::backoff::Backoff;
use crate::config::Config;
use crate::diff::{CommandDiff, PendingSend, build_command_diff};
use crate::logger::MessageLogger;
use crate::model::Model;
use crate::protocol::{
    ClimateReport, StateUpdate, beeper_url, classify_state, climate_set_url, events_url,
};
use crate::sse::{SseMessage, SseParser};
use crate::timer::{TimerKind, Timers};
use crate::types::*;
use crate::{Error, Result};

/// Re-check interval for a send that is waiting on entity discovery.
pub(crate) const ENTITY_RETRY_INTERVAL: Duration = Duration::from_millis(1_500);
pub(crate) const DISCOVERY_WARNING_AFTER: Duration = Duration::from_secs(12);
pub(crate) const SIMULATION_FIRST_TICK: Duration = Duration::from_secs(1);
const OPTION_COMMAND_TIMEOUT: Duration = Duration::from_millis(4_000);
const BEEPER_COMMAND_TIMEOUT: Duration = Duration::from_millis(3_000);

pub(crate) type EventCallback = Box<dyn Fn(&Event) + Send + Sync>;
pub(crate) type SnapshotCallback = Box<dyn Fn(&DeviceState) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Command {
    SetMode(Mode),
    SetTargetTemperature(f64),
    SetFanOnly(bool),
    SetDryMode(bool),
    SetBeeper(bool),
    SetPreset(Preset),
    SetPresetEnabled(Preset, bool),
    SetSwing(SwingMode),
}

#[derive(Debug, Clone, Copy)]
enum Outbound {
    Climate { diff: CommandDiff, seq: u64 },
    Preset(Preset),
    Swing(SwingMode),
    Beeper(bool),
    AutoDisableBeeper,
}

impl Outbound {
    fn name(&self) -> &'static str {
        match self {
            Outbound::Climate { .. } => "climate",
            Outbound::Preset(_) => "preset",
            Outbound::Swing(_) => "swing",
            Outbound::Beeper(_) => "beeper",
            Outbound::AutoDisableBeeper => "auto_disable_beeper",
        }
    }
}

struct Completion {
    command: Outbound,
    result: Result<()>,
}

#[derive(Debug)]
enum StreamSignal {
    Opened,
    Message(SseMessage),
    Closed(String),
}

#[derive(Debug)]
struct StreamMessage {
    generation: u64,
    signal: StreamSignal,
}

/// Where the engine publishes what it learns.
pub(crate) struct Outputs {
    pub snapshot: watch::Sender<DeviceState>,
    pub status: watch::Sender<EngineStatus>,
    pub event_callbacks: Vec<EventCallback>,
    pub snapshot_callbacks: Vec<SnapshotCallback>,
    pub logger: Option<MessageLogger>,
}

pub(crate) struct Engine {
    config: Config,
    http: reqwest::Client,
    base_url: Option<String>,
    model: Model,
    pending: PendingSend,
    /// Sequence of the latest climate send, and of the latest one whose
    /// success was recorded. Older completions must not overwrite newer ones.
    climate_seq: u64,
    climate_seq_recorded: u64,
    climate_entity: Option<String>,
    ack: AckTracker,
    backoff: Backoff,
    timers: Timers,
    connection: ConnectionState,
    connected_at: Option<Instant>,
    generation: u64,
    reader: Option<JoinHandle<()>>,
    stream_tx: mpsc::UnboundedSender<StreamMessage>,
    stream_rx: mpsc::UnboundedReceiver<StreamMessage>,
    in_flight: JoinSet<Completion>,
    outputs: Outputs,
    stop: CancellationToken,
}

impl Engine {
    pub fn new(
        config: Config,
        http: reqwest::Client,
        outputs: Outputs,
        stop: CancellationToken,
    ) -> Self {
        let base_url = if config.simulation {
            None
        } else {
            config.host().map(crate::protocol::base_url)
        };
        let ack = AckTracker::new(config.ack_timeout());
        let backoff = Backoff::new(config.reconnect_initial(), config.reconnect_max());
        let (stream_tx, stream_rx) = mpsc::unbounded_channel();

        Self {
            config,
            http,
            base_url,
            model: Model::default(),
            pending: PendingSend::default(),
            climate_seq: 0,
            climate_seq_recorded: 0,
            climate_entity: None,
            ack,
            backoff,
            timers: Timers::default(),
            connection: ConnectionState::Disconnected,
            connected_at: None,
            generation: 0,
            reader: None,
            stream_tx,
            stream_rx,
            in_flight: JoinSet::new(),
            outputs,
            stop,
        }
    }

    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        self.start();

        loop {
            let next_deadline = self.timers.next_deadline();
            tokio::select! {
                _ = self.stop.cancelled() => break,
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(message) = self.stream_rx.recv() => self.handle_stream(message),
                Some(joined) = self.in_flight.join_next() => match joined {
                    Ok(completion) => self.handle_completion(completion),
                    Err(e) => debug!(error = %e, "command task ended abnormally"),
                },
                _ = sleep_until_deadline(next_deadline) => self.fire_due_timers(),
            }
        }

        self.teardown();
    }

    fn start(&mut self) {
        if self.config.simulation {
            info!(name = %self.config.display_name, "running in simulation mode");
            self.timers.arm(TimerKind::SimulationTick, SIMULATION_FIRST_TICK);
        } else {
            self.connect_stream();
        }
    }

    fn teardown(&mut self) {
        self.timers.clear();
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        self.in_flight.abort_all();
        self.connection = ConnectionState::Disconnected;
        self.publish_status();
        debug!("engine stopped");
    }

    // -- Caller commands --

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::SetMode(mode) => self.change_mode(mode),
            Command::SetTargetTemperature(requested) => {
                let Some(applied) = self.model.set_target_temperature(requested) else {
                    debug!(requested, "ignoring non-finite target temperature");
                    return;
                };
                debug!(requested, applied, "target temperature set");
                self.publish_snapshot();
                self.schedule_send();
            }
            Command::SetFanOnly(on) => self.toggle_mode(Mode::Fan, on),
            Command::SetDryMode(on) => self.toggle_mode(Mode::Dry, on),
            Command::SetBeeper(on) => self.change_beeper(on),
            Command::SetPreset(preset) => self.change_preset(preset),
            Command::SetPresetEnabled(preset, on) => {
                if on {
                    self.change_preset(preset);
                } else if self.model.state().preset == preset {
                    self.change_preset(Preset::None);
                }
            }
            Command::SetSwing(swing) => self.change_swing(swing),
        }
    }

    fn change_mode(&mut self, mode: Mode) {
        self.model.set_mode(mode);
        debug!(%mode, "mode set");
        self.publish_snapshot();
        self.schedule_send();
    }

    /// Switch-style control: on selects `mode`, off falls back to Off only
    /// while `mode` is the active one.
    fn toggle_mode(&mut self, mode: Mode, on: bool) {
        if on {
            self.change_mode(mode);
        } else if self.model.state().mode == mode {
            self.change_mode(Mode::Off);
        }
    }

    fn change_beeper(&mut self, on: bool) {
        if self.model.set_beeper(on) {
            self.emit(Event::BeeperChanged { on });
        }
        self.publish_snapshot();

        let Some(base) = self.base_url.as_deref() else {
            return;
        };
        let url = beeper_url(base, on);
        self.dispatch(Outbound::Beeper(on), url, BEEPER_COMMAND_TIMEOUT);
    }

    fn change_preset(&mut self, preset: Preset) {
        if self.config.simulation {
            self.model.set_preset(preset);
            self.publish_snapshot();
            return;
        }
        let (Some(base), Some(entity)) = (self.base_url.as_deref(), self.climate_entity.as_deref())
        else {
            debug!(preset = preset.as_wire_str(), "climate entity unknown, dropping preset request");
            return;
        };
        let url = climate_set_url(base, entity, &[("preset", preset.as_wire_str().to_string())]);
        self.dispatch(Outbound::Preset(preset), url, OPTION_COMMAND_TIMEOUT);
    }

    fn change_swing(&mut self, swing: SwingMode) {
        if self.config.simulation {
            self.model.set_swing(swing);
            self.publish_snapshot();
            return;
        }
        let (Some(base), Some(entity)) = (self.base_url.as_deref(), self.climate_entity.as_deref())
        else {
            debug!(swing = swing.as_wire_str(), "climate entity unknown, dropping swing request");
            return;
        };
        let url = climate_set_url(base, entity, &[("swing_mode", swing.as_wire_str().to_string())]);
        self.dispatch(Outbound::Swing(swing), url, OPTION_COMMAND_TIMEOUT);
    }

    // -- Outbound dispatch --

    fn schedule_send(&mut self) {
        if self.config.simulation {
            return;
        }
        self.timers.arm(TimerKind::Debounce, self.config.command_debounce());
    }

    fn flush_pending_send(&mut self) {
        if self.config.simulation {
            return;
        }
        let Some(entity) = self.climate_entity.as_deref() else {
            debug!("climate entity not discovered yet, deferring send");
            self.timers.arm(TimerKind::Debounce, ENTITY_RETRY_INTERVAL);
            return;
        };
        let Some(base) = self.base_url.as_deref() else {
            return;
        };

        let diff = build_command_diff(self.model.state(), &self.pending);
        if diff.is_empty() {
            debug!("no mode/temperature change to send");
            return;
        }

        let url = climate_set_url(base, entity, &diff.params());
        self.climate_seq += 1;
        let command = Outbound::Climate {
            diff,
            seq: self.climate_seq,
        };
        self.dispatch(command, url, self.config.command_timeout());
    }

    fn dispatch(&mut self, command: Outbound, url: String, timeout: Duration) {
        if self.config.verbose_logging {
            info!(command = command.name(), url = %url, "sending command");
        } else {
            debug!(command = command.name(), url = %url, "sending command");
        }
        if let Some(logger) = self.outputs.logger.as_mut() {
            logger.log_command(command.name(), &url);
        }

        let http = self.http.clone();
        self.in_flight.spawn(async move {
            let result = post_command(&http, &url, timeout).await;
            Completion { command, result }
        });
    }

    fn handle_completion(&mut self, completion: Completion) {
        let Completion { command, result } = completion;
        match (command, result) {
            (Outbound::Climate { seq, .. }, Ok(())) if seq < self.climate_seq_recorded => {
                debug!(seq, latest = self.climate_seq_recorded, "ignoring stale climate completion");
            }
            (Outbound::Climate { diff, seq }, Ok(())) => {
                self.climate_seq_recorded = seq;
                self.pending.record_sent(&diff);
                if let Some(previous) = self.ack.pending() {
                    debug!(
                        expected_mode = ?previous.expected_mode,
                        expected_target = ?previous.expected_target,
                        "replacing unacknowledged expectation"
                    );
                }
                let deadline = self
                    .ack
                    .start(diff.mode, diff.target_temperature, Instant::now());
                self.timers.arm_at(TimerKind::AckTimeout, deadline);
                let params = diff
                    .params()
                    .into_iter()
                    .map(|(key, value)| (key.to_string(), value))
                    .collect();
                self.emit(Event::CommandSent { params });
            }
            (Outbound::AutoDisableBeeper, Err(e)) => {
                debug!(error = %e, "auto-disable beeper request failed");
            }
            (command, Err(e)) => {
                warn!(command = command.name(), error = %e, "command request failed");
                self.emit(Event::CommandFailed {
                    command: command.name(),
                    message: e.to_string(),
                });
            }
            (command, Ok(())) => debug!(command = command.name(), "command accepted"),
        }
    }

    // -- Timers --

    fn fire_due_timers(&mut self) {
        for kind in self.timers.take_due(Instant::now()) {
            match kind {
                TimerKind::Debounce => self.flush_pending_send(),
                TimerKind::AckTimeout => self.expire_ack(),
                TimerKind::Reconnect => self.connect_stream(),
                TimerKind::DiscoveryWarning => self.warn_no_climate_state(),
                TimerKind::SimulationTick => self.simulation_tick(),
            }
        }
    }

    fn expire_ack(&mut self) {
        let Some(missed) = self.ack.expire() else {
            return;
        };
        warn!(
            expected_mode = ?missed.expected_mode,
            expected_target = ?missed.expected_target,
            waited_ms = missed.sent_at.elapsed().as_millis() as u64,
            "device did not acknowledge mode/temperature change"
        );
        self.emit(Event::AckTimedOut {
            expected_mode: missed.expected_mode,
            expected_target: missed.expected_target,
        });
    }

    fn warn_no_climate_state(&mut self) {
        if self.climate_entity.is_some() {
            return;
        }
        warn!("no climate state received yet, check device host and connectivity");
        self.emit(Event::ClimateStateMissing);
    }

    fn simulation_tick(&mut self) {
        self.model.drift(rand::random::<f64>());
        trace!(
            current = self.model.state().current_temperature,
            "simulated temperature drift"
        );
        self.publish_snapshot();
        self.timers
            .arm(TimerKind::SimulationTick, self.config.poll_interval());
    }

    // -- Event stream --

    fn connect_stream(&mut self) {
        let Some(base) = self.base_url.as_deref() else {
            return;
        };
        let url = events_url(base);

        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        self.generation += 1;
        self.connected_at = None;
        self.connection = ConnectionState::Connecting;
        self.publish_status();

        if self.climate_entity.is_none() && !self.timers.is_armed(TimerKind::DiscoveryWarning) {
            self.timers
                .arm(TimerKind::DiscoveryWarning, DISCOVERY_WARNING_AFTER);
        }

        debug!(url = %url, generation = self.generation, "connecting event stream");
        self.reader = Some(tokio::spawn(read_event_stream(
            self.http.clone(),
            url,
            self.generation,
            self.stream_tx.clone(),
        )));
    }

    fn handle_stream(&mut self, message: StreamMessage) {
        if message.generation != self.generation {
            trace!(generation = message.generation, "dropping message from stale stream");
            return;
        }

        match message.signal {
            StreamSignal::Opened => {
                info!("event stream connected");
                self.connected_at = Some(Instant::now());
                self.connection = ConnectionState::Connected;
                self.publish_status();
                if let Some(logger) = self.outputs.logger.as_mut() {
                    logger.log_stream("open", None);
                }
                self.emit(Event::StreamConnected);
            }
            StreamSignal::Message(sse) => self.handle_sse(sse),
            StreamSignal::Closed(reason) => self.handle_stream_failure(reason),
        }
    }

    fn handle_stream_failure(&mut self, reason: String) {
        self.reader = None;

        if let (Some(reset_after), Some(connected_at)) =
            (self.config.reconnect_reset_after(), self.connected_at)
            && connected_at.elapsed() >= reset_after
        {
            debug!("stream had been stable, resetting reconnect backoff");
            self.backoff.reset();
        }
        self.connected_at = None;

        let delay = self.backoff.next_delay();
        warn!(
            reason = %reason,
            retry_in_ms = delay.as_millis() as u64,
            "event stream failed, will reconnect"
        );
        self.timers.arm(TimerKind::Reconnect, delay);
        self.connection = ConnectionState::ErrorBackoff;
        self.publish_status();

        if let Some(logger) = self.outputs.logger.as_mut() {
            logger.log_stream("closed", Some(&reason));
        }
        self.emit(Event::StreamDisconnected {
            reason,
            retry_in: delay,
        });
    }

    fn handle_sse(&mut self, message: SseMessage) {
        match message.event.as_str() {
            "state" => self.handle_state_payload(&message.data),
            "ping" => trace!("stream keep-alive"),
            "log" => trace!(line = %message.data, "device log"),
            other => trace!(event = other, "ignoring stream message"),
        }
    }

    fn handle_state_payload(&mut self, data: &str) {
        let value: Value = match serde_json::from_str(data) {
            Ok(value) => value,
            Err(e) => {
                debug!(error = %e, "dropping malformed state event");
                return;
            }
        };
        if let Some(logger) = self.outputs.logger.as_mut() {
            logger.log_event("state", &value);
        }

        match classify_state(&value) {
            Some(StateUpdate::Climate(report)) => self.apply_climate(report),
            Some(StateUpdate::Humidity(humidity)) => {
                self.model.set_humidity(humidity);
                self.publish_snapshot();
            }
            Some(StateUpdate::OutdoorTemperature(celsius)) => {
                debug!(celsius, "outdoor temperature updated");
                self.model.set_outdoor_temperature(celsius);
                self.publish_snapshot();
            }
            Some(StateUpdate::Beeper(on)) => {
                if self.model.set_beeper(on) {
                    debug!(on, "beeper state updated");
                    self.emit(Event::BeeperChanged { on });
                    self.publish_snapshot();
                }
            }
            None => trace!("ignoring state for unhandled entity"),
        }
    }

    fn apply_climate(&mut self, report: ClimateReport) {
        if self.config.verbose_logging {
            info!(?report, "climate state");
        } else {
            debug!(?report, "climate state");
        }

        if self.climate_entity.is_none() {
            self.discover_entity(&report.id);
        }

        self.model.apply_climate(&report);
        if let Some(target) = report.target_temperature {
            self.pending.reconcile_target(target);
        }

        let (mode, target) = {
            let state = self.model.state();
            (state.mode, state.target_temperature)
        };
        if self.ack.check(mode, target) {
            self.timers.cancel(TimerKind::AckTimeout);
            debug!("device acknowledged mode/temperature change");
            self.emit(Event::AckConfirmed);
        }

        self.publish_snapshot();
    }

    fn discover_entity(&mut self, id: &str) {
        info!(id, "discovered climate entity");
        self.climate_entity = Some(id.to_string());
        self.timers.cancel(TimerKind::DiscoveryWarning);
        self.publish_status();
        self.emit(Event::ClimateEntityDiscovered { id: id.to_string() });

        if self.config.auto_disable_beeper_on_discovery
            && let Some(base) = self.base_url.as_deref()
        {
            let url = beeper_url(base, false);
            self.dispatch(Outbound::AutoDisableBeeper, url, BEEPER_COMMAND_TIMEOUT);
        }
    }

    // -- Publishing --

    fn publish_snapshot(&self) {
        let state = self.model.state();
        self.outputs.snapshot.send_replace(state.clone());
        for cb in &self.outputs.snapshot_callbacks {
            cb(state);
        }
    }

    fn publish_status(&self) {
        self.outputs.status.send_replace(EngineStatus {
            connection: self.connection,
            climate_entity_id: self.climate_entity.clone(),
            reconnect_delay: self.backoff.peek(),
        });
    }

    fn emit(&self, event: Event) {
        for cb in &self.outputs.event_callbacks {
            cb(&event);
        }
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

async fn post_command(http: &reqwest::Client, url: &str, timeout: Duration) -> Result<()> {
    http.post(url)
        .timeout(timeout)
        .send()
        .await?
        .error_for_status()?;
    Ok(())
}

async fn read_event_stream(
    http: reqwest::Client,
    url: String,
    generation: u64,
    tx: mpsc::UnboundedSender<StreamMessage>,
) {
    let reason = match pump_events(&http, &url, generation, &tx).await {
        Ok(()) => Error::StreamClosed.to_string(),
        Err(e) => e.to_string(),
    };
    let _ = tx.send(StreamMessage {
        generation,
        signal: StreamSignal::Closed(reason),
    });
}

async fn pump_events(
    http: &reqwest::Client,
    url: &str,
    generation: u64,
    tx: &mpsc::UnboundedSender<StreamMessage>,
) -> Result<()> {
    let response = http
        .get(url)
        .header(ACCEPT, "text/event-stream")
        .send()
        .await?
        .error_for_status()?;

    if tx
        .send(StreamMessage {
            generation,
            signal: StreamSignal::Opened,
        })
        .is_err()
    {
        return Ok(());
    }

    let mut body = response.bytes_stream();
    let mut parser = SseParser::default();
    while let Some(chunk) = body.next().await {
        for message in parser.feed(&chunk?) {
            let sent = tx.send(StreamMessage {
                generation,
                signal: StreamSignal::Message(message),
            });
            if sent.is_err() {
                return Ok(());
            }
        }
    }
    Ok(())
}
