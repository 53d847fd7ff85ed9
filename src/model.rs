use crate::protocol::{ClimateReport, clamp_target};
use crate::types::{CurrentState, DeviceState, Mode, Preset, SwingMode, TargetState};

/// Largest per-tick change of the simulated room temperature.
pub const SIMULATION_DRIFT_C: f64 = 0.1;

/// The single owner of [`DeviceState`]. Every mutation goes through here so
/// the derived host states never drift from mode and temperatures.
#[derive(Debug, Default)]
pub(crate) struct Model {
    state: DeviceState,
}

impl Model {
    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.state.mode = mode;
        self.derive();
    }

    /// Clamped to the device range and rounded to its step. Non-finite
    /// input is refused and leaves the state untouched.
    pub fn set_target_temperature(&mut self, celsius: f64) -> Option<f64> {
        if !celsius.is_finite() {
            return None;
        }
        self.state.target_temperature = clamp_target(celsius);
        self.derive();
        Some(self.state.target_temperature)
    }

    pub fn set_preset(&mut self, preset: Preset) {
        self.state.preset = preset;
    }

    pub fn set_swing(&mut self, swing: SwingMode) {
        self.state.swing_mode = swing;
    }

    /// Returns true if the value changed.
    pub fn set_beeper(&mut self, on: bool) -> bool {
        let changed = self.state.beeper_on != on;
        self.state.beeper_on = on;
        changed
    }

    pub fn set_humidity(&mut self, humidity: f64) {
        self.state.humidity = humidity;
    }

    pub fn set_outdoor_temperature(&mut self, celsius: f64) {
        self.state.outdoor_temperature = Some(celsius);
    }

    /// Apply what the device reported. Fields it did not report, or reported
    /// in a form we could not read, keep their previous values.
    pub fn apply_climate(&mut self, report: &ClimateReport) {
        if let Some(current) = report.current_temperature {
            self.state.current_temperature = current;
        }
        if let Some(target) = report.target_temperature {
            self.state.target_temperature = target;
        }
        if let Some(mode) = report.mode {
            self.state.mode = mode;
        }
        if let Some(preset) = report.preset {
            self.state.preset = preset;
        }
        if let Some(swing) = report.swing_mode {
            self.state.swing_mode = swing;
        }
        self.derive();
    }

    /// `unit` is a sample in `[0, 1)`; the room temperature moves by at most
    /// [`SIMULATION_DRIFT_C`] either way.
    pub fn drift(&mut self, unit: f64) {
        self.state.current_temperature += (unit - 0.5) * 2.0 * SIMULATION_DRIFT_C;
        self.derive();
    }

    fn derive(&mut self) {
        let state = &mut self.state;
        state.target_state = TargetState::from(state.mode);
        state.current_state = CurrentState::derive(
            state.mode,
            state.current_temperature,
            state.target_temperature,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(mode: &str, current: f64, target: f64) -> ClimateReport {
        ClimateReport {
            id: "climate-air_conditioner".to_string(),
            mode: Mode::from_wire_str(mode),
            current_temperature: Some(current),
            target_temperature: Some(target),
            ..Default::default()
        }
    }

    #[test]
    fn heat_cool_report_infers_heating() {
        let mut model = Model::default();
        model.apply_climate(&report("HEAT_COOL", 23.0, 24.0));
        let state = model.state();
        assert_eq!(state.mode, Mode::Auto);
        assert_eq!(state.target_state, TargetState::Auto);
        assert_eq!(state.current_state, CurrentState::Heat);
    }

    #[test]
    fn auto_inference_band() {
        let mut model = Model::default();
        model.apply_climate(&report("HEAT_COOL", 24.0, 22.0));
        assert_eq!(model.state().current_state, CurrentState::Cool);
        model.apply_climate(&report("HEAT_COOL", 24.0, 24.2));
        assert_eq!(model.state().current_state, CurrentState::Off);
    }

    #[test]
    fn fan_and_dry_present_as_off() {
        let mut model = Model::default();
        for mode in [Mode::Fan, Mode::Dry, Mode::Off] {
            model.set_mode(mode);
            assert_eq!(model.state().target_state, TargetState::Off);
            assert_eq!(model.state().current_state, CurrentState::Off);
        }
        model.set_mode(Mode::Cool);
        assert_eq!(model.state().current_state, CurrentState::Cool);
    }

    #[test]
    fn missing_fields_keep_previous_values() {
        let mut model = Model::default();
        model.apply_climate(&report("COOL", 26.0, 21.0));
        model.apply_climate(&ClimateReport {
            id: "climate-air_conditioner".to_string(),
            ..Default::default()
        });
        let state = model.state();
        assert_eq!(state.mode, Mode::Cool);
        assert_eq!(state.current_temperature, 26.0);
        assert_eq!(state.target_temperature, 21.0);
    }

    #[test]
    fn target_is_clamped_and_stepped() {
        let mut model = Model::default();
        assert_eq!(model.set_target_temperature(24.3), Some(24.5));
        assert_eq!(model.set_target_temperature(40.0), Some(30.0));
    }

    #[test]
    fn non_finite_target_is_refused() {
        let mut model = Model::default();
        model.set_target_temperature(25.0);
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert_eq!(model.set_target_temperature(bad), None);
        }
        assert_eq!(model.state().target_temperature, 25.0);
    }

    #[test]
    fn changing_target_rederives_auto() {
        let mut model = Model::default();
        model.set_mode(Mode::Auto);
        assert_eq!(model.state().current_state, CurrentState::Off);
        model.set_target_temperature(25.0);
        assert_eq!(model.state().current_state, CurrentState::Heat);
    }

    #[test]
    fn drift_is_bounded() {
        let mut model = Model::default();
        model.drift(0.0);
        assert!((model.state().current_temperature - 21.9).abs() < 1e-9);
        model.drift(0.5);
        assert!((model.state().current_temperature - 21.9).abs() < 1e-9);
    }
}
