use crate::protocol::{format_temperature, round_to_step, temperatures_match};
use crate::types::{DeviceState, Mode};

/// Last values the device confirmed receiving over HTTP.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct PendingSend {
    pub last_sent_mode: Option<Mode>,
    pub last_sent_target: Option<f64>,
}

impl PendingSend {
    /// Record only the fields that were part of a successful request.
    pub fn record_sent(&mut self, diff: &CommandDiff) {
        if let Some(mode) = diff.mode {
            self.last_sent_mode = Some(mode);
        }
        if let Some(target) = diff.target_temperature {
            self.last_sent_target = Some(target);
        }
    }

    /// Fold a device-reported setpoint in, unless a different value is
    /// already recorded (that would hide a change still on its way).
    pub fn reconcile_target(&mut self, reported: f64) {
        match self.last_sent_target {
            None => self.last_sent_target = Some(reported),
            Some(sent) if temperatures_match(sent, reported) => {
                self.last_sent_target = Some(reported)
            }
            Some(_) => {}
        }
    }
}

/// Fields that differ between the desired state and what was last sent.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct CommandDiff {
    pub mode: Option<Mode>,
    pub target_temperature: Option<f64>,
}

impl CommandDiff {
    pub fn is_empty(&self) -> bool {
        self.mode.is_none() && self.target_temperature.is_none()
    }

    /// Query parameters in wire order: mode first, then setpoint.
    pub fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::with_capacity(2);
        if let Some(mode) = self.mode {
            params.push(("mode", mode.as_wire_str().to_string()));
        }
        if let Some(target) = self.target_temperature {
            params.push(("target_temperature", format_temperature(target)));
        }
        params
    }
}

pub(crate) fn build_command_diff(desired: &DeviceState, pending: &PendingSend) -> CommandDiff {
    let mode = (pending.last_sent_mode != Some(desired.mode)).then_some(desired.mode);

    let target = round_to_step(desired.target_temperature);
    let target_temperature = match pending.last_sent_target {
        Some(sent) if temperatures_match(target, sent) => None,
        _ => Some(target),
    };

    CommandDiff {
        mode,
        target_temperature,
    }
}
