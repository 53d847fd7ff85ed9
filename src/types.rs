use std::fmt;
use std::time::Duration;

/// Operating mode of the indoor unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Off,
    Cool,
    Heat,
    Auto,
    Fan,
    Dry,
}

impl Mode {
    pub const ALL: [Mode; 6] = [
        Mode::Off,
        Mode::Cool,
        Mode::Heat,
        Mode::Auto,
        Mode::Fan,
        Mode::Dry,
    ];

    pub fn as_wire_str(&self) -> &'static str {
        match self {
            Mode::Off => "OFF",
            Mode::Cool => "COOL",
            Mode::Heat => "HEAT",
            Mode::Auto => "HEAT_COOL",
            Mode::Fan => "FAN_ONLY",
            Mode::Dry => "DRY",
        }
    }

    /// Case-insensitive inverse of [`Mode::as_wire_str`]. Unknown strings yield `None`.
    pub fn from_wire_str(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_wire_str().eq_ignore_ascii_case(s))
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Preset {
    #[default]
    None,
    Boost,
    Eco,
    Sleep,
}

impl Preset {
    pub const ALL: [Preset; 4] = [Preset::None, Preset::Boost, Preset::Eco, Preset::Sleep];

    pub fn as_wire_str(&self) -> &'static str {
        match self {
            Preset::None => "NONE",
            Preset::Boost => "BOOST",
            Preset::Eco => "ECO",
            Preset::Sleep => "SLEEP",
        }
    }

    pub fn from_wire_str(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_wire_str().eq_ignore_ascii_case(s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SwingMode {
    #[default]
    Off,
    Both,
}

impl SwingMode {
    pub const ALL: [SwingMode; 2] = [SwingMode::Off, SwingMode::Both];

    pub fn as_wire_str(&self) -> &'static str {
        match self {
            SwingMode::Off => "OFF",
            SwingMode::Both => "BOTH",
        }
    }

    pub fn from_wire_str(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_wire_str().eq_ignore_ascii_case(s))
    }
}

/// Host-side target heating/cooling vocabulary. Fan and Dry have no native
/// representation and present as `Off`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TargetState {
    #[default]
    Off,
    Heat,
    Cool,
    Auto,
}

impl From<Mode> for TargetState {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Cool => TargetState::Cool,
            Mode::Heat => TargetState::Heat,
            Mode::Auto => TargetState::Auto,
            Mode::Off | Mode::Fan | Mode::Dry => TargetState::Off,
        }
    }
}

impl From<TargetState> for Mode {
    fn from(state: TargetState) -> Self {
        match state {
            TargetState::Off => Mode::Off,
            TargetState::Heat => Mode::Heat,
            TargetState::Cool => Mode::Cool,
            TargetState::Auto => Mode::Auto,
        }
    }
}

/// Host-side current heating/cooling vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CurrentState {
    #[default]
    Off,
    Heat,
    Cool,
}

/// Auto mode only reports heating or cooling once the setpoint is this far
/// from the room temperature.
pub const AUTO_INFERENCE_BAND_C: f64 = 0.3;

impl CurrentState {
    pub fn derive(mode: Mode, current: f64, target: f64) -> Self {
        match mode {
            Mode::Cool => CurrentState::Cool,
            Mode::Heat => CurrentState::Heat,
            Mode::Auto => {
                if target < current - AUTO_INFERENCE_BAND_C {
                    CurrentState::Cool
                } else if target > current + AUTO_INFERENCE_BAND_C {
                    CurrentState::Heat
                } else {
                    CurrentState::Off
                }
            }
            Mode::Off | Mode::Fan | Mode::Dry => CurrentState::Off,
        }
    }
}

/// Snapshot of everything known about the unit. Temperatures are Celsius.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceState {
    pub current_temperature: f64,
    pub target_temperature: f64,
    pub mode: Mode,
    pub target_state: TargetState,
    pub current_state: CurrentState,
    pub preset: Preset,
    pub swing_mode: SwingMode,
    pub humidity: f64,
    pub outdoor_temperature: Option<f64>,
    pub beeper_on: bool,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            current_temperature: 22.0,
            target_temperature: 22.0,
            mode: Mode::Off,
            target_state: TargetState::Off,
            current_state: CurrentState::Off,
            preset: Preset::None,
            swing_mode: SwingMode::Off,
            humidity: 45.0,
            outdoor_temperature: None,
            beeper_on: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    ErrorBackoff,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineStatus {
    pub connection: ConnectionState,
    pub climate_entity_id: Option<String>,
    /// Delay the next reconnect will wait after a stream failure.
    pub reconnect_delay: Duration,
}

/// Notifications emitted by the engine besides snapshot updates.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    StreamConnected,
    StreamDisconnected { reason: String, retry_in: Duration },
    ClimateEntityDiscovered { id: String },
    ClimateStateMissing,
    /// A mode/temperature command the device accepted over HTTP.
    CommandSent { params: Vec<(String, String)> },
    CommandFailed { command: &'static str, message: String },
    AckConfirmed,
    AckTimedOut { expected_mode: Option<Mode>, expected_target: Option<f64> },
    BeeperChanged { on: bool },
}
