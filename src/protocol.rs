use serde_json::Value;

use crate::types::{Mode, Preset, SwingMode};

pub const CLIMATE_ID_PREFIX: &str = "climate-";
pub const HUMIDITY_SENSOR_ID: &str = "sensor-air_conditioner_indoor_humidity";
pub const OUTDOOR_TEMPERATURE_ID_PREFIX: &str = "sensor-air_conditioner_outdoor_temperature";
pub const BEEPER_SWITCH_ID: &str = "switch-air_conditioner_beeper";

const BEEPER_SWITCH_PATH: &str = "/switch/air_conditioner_beeper";

/// The unit only accepts setpoints in this range.
pub const MIN_TARGET_C: f64 = 16.0;
pub const MAX_TARGET_C: f64 = 30.0;

/// Two temperatures closer than this are the same setpoint.
pub const TEMPERATURE_EPSILON: f64 = 0.001;

/// Round to the unit's 0.5 degree setpoint step.
pub fn round_to_step(celsius: f64) -> f64 {
    (celsius * 2.0).round() / 2.0
}

pub fn clamp_target(celsius: f64) -> f64 {
    round_to_step(celsius.clamp(MIN_TARGET_C, MAX_TARGET_C))
}

/// Wire format for `target_temperature`: one decimal.
pub fn format_temperature(celsius: f64) -> String {
    format!("{celsius:.1}")
}

pub fn temperatures_match(a: f64, b: f64) -> bool {
    (a - b).abs() <= TEMPERATURE_EPSILON
}

pub fn base_url(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{host}")
    }
}

pub fn events_url(base: &str) -> String {
    format!("{base}/events")
}

/// `climate-air_conditioner` is addressed as `air_conditioner` in command paths.
pub fn local_entity_id(entity_id: &str) -> &str {
    entity_id
        .strip_prefix(CLIMATE_ID_PREFIX)
        .unwrap_or(entity_id)
}

pub fn query_string(params: &[(&str, String)]) -> String {
    params
        .iter()
        .map(|(key, value)| format!("{key}={}", urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}

pub fn climate_set_url(base: &str, entity_id: &str, params: &[(&str, String)]) -> String {
    format!(
        "{base}/climate/{}/set?{}",
        local_entity_id(entity_id),
        query_string(params)
    )
}

pub fn beeper_url(base: &str, on: bool) -> String {
    let action = if on { "turn_on" } else { "turn_off" };
    format!("{base}{BEEPER_SWITCH_PATH}/{action}")
}

/// Numbers arrive either as JSON numbers or as numeric strings.
pub fn parse_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) struct ClimateReport {
    pub id: String,
    pub mode: Option<Mode>,
    pub current_temperature: Option<f64>,
    pub target_temperature: Option<f64>,
    pub preset: Option<Preset>,
    pub swing_mode: Option<SwingMode>,
}

/// A `state` event the engine knows how to apply.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum StateUpdate {
    Climate(ClimateReport),
    Humidity(f64),
    OutdoorTemperature(f64),
    Beeper(bool),
}

fn string_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(|v| v.as_str())
}

/// Classify a decoded `state` payload. Unknown ids and fields that cannot be
/// read yield `None` (or leave that field unset) rather than an error.
pub(crate) fn classify_state(value: &Value) -> Option<StateUpdate> {
    let id = string_field(value, "id")?;

    if id.starts_with(CLIMATE_ID_PREFIX) {
        return Some(StateUpdate::Climate(ClimateReport {
            id: id.to_string(),
            mode: string_field(value, "mode").and_then(Mode::from_wire_str),
            current_temperature: value.get("current_temperature").and_then(parse_number),
            target_temperature: value.get("target_temperature").and_then(parse_number),
            preset: string_field(value, "preset").and_then(Preset::from_wire_str),
            swing_mode: string_field(value, "swing_mode").and_then(SwingMode::from_wire_str),
        }));
    }

    if id == HUMIDITY_SENSOR_ID {
        let humidity = value.get("value").and_then(|v| v.as_f64())?;
        return Some(StateUpdate::Humidity(humidity));
    }

    if id.starts_with(OUTDOOR_TEMPERATURE_ID_PREFIX) {
        let temp = value.get("value").and_then(parse_number)?;
        return Some(StateUpdate::OutdoorTemperature(temp));
    }

    if id == BEEPER_SWITCH_ID {
        let raw = string_field(value, "value").or_else(|| string_field(value, "state"))?;
        return Some(StateUpdate::Beeper(raw.eq_ignore_ascii_case("on")));
    }

    None
}
