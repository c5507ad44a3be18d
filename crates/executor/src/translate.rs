//! Translates a wire `ActuatorCommand` into the human-readable `state_str`
//! from the per-actuator table (spec §4.6). Used purely for the one-line
//! tracing entry the executor emits per action — the archived Knowledge row
//! keeps the structured command as-is, so this has no bearing on replay.

use poultry_common::model::{ActuatorCommand, ActuatorType};

pub fn describe_command(actuator: ActuatorType, command: &ActuatorCommand) -> String {
    match (actuator, command) {
        (ActuatorType::Fan, ActuatorCommand::FanSet { level, .. }) => {
            format!("SET {level}% (on={})", *level > 0)
        }
        (ActuatorType::Heater, ActuatorCommand::HeaterSet { level_pct, .. }) => {
            format!("SET {level_pct}% (on={})", *level_pct > 0)
        }
        (ActuatorType::Heater, ActuatorCommand::HeaterOnOff { action }) => {
            let level = if action.is_on() { 100 } else { 0 };
            format!("SET {level}% (on={})", action.is_on())
        }
        (ActuatorType::Inlet, ActuatorCommand::InletSet { open_pct, .. }) => {
            format!("OPEN {open_pct}% (on={})", *open_pct > 10)
        }
        (ActuatorType::FeedDispenser, ActuatorCommand::FeedOnOff { action }) => {
            if action.is_on() { "ON".to_string() } else { "OFF".to_string() }
        }
        (ActuatorType::FeedDispenser, ActuatorCommand::FeedPulse { amount_g }) => {
            format!("DISPENSE {amount_g}g (on=true)")
        }
        (ActuatorType::WaterValve, ActuatorCommand::WaterOnOff { action }) => {
            if action.is_on() { "ON".to_string() } else { "OFF".to_string() }
        }
        (ActuatorType::WaterValve, ActuatorCommand::WaterPulse { duration_s }) => {
            format!("OPEN {duration_s}s (on=true)")
        }
        (ActuatorType::Light, ActuatorCommand::LightSet { level_pct, .. }) => {
            format!("SET {level_pct}% (on={})", *level_pct > 0)
        }
        (_, other) => format!("UNRECOGNIZED {other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fan_set_describes_level_and_on_flag() {
        let desc = describe_command(ActuatorType::Fan, &ActuatorCommand::fan_set(45));
        assert_eq!(desc, "SET 45% (on=true)");
    }

    #[test]
    fn heater_on_off_describes_as_full_or_zero_level() {
        let desc = describe_command(ActuatorType::Heater, &ActuatorCommand::on_off(ActuatorType::Heater, true));
        assert_eq!(desc, "SET 100% (on=true)");
    }

    #[test]
    fn feed_pulse_describes_amount() {
        let desc = describe_command(ActuatorType::FeedDispenser, &ActuatorCommand::FeedPulse { amount_g: 12.0 });
        assert_eq!(desc, "DISPENSE 12g (on=true)");
    }

    #[test]
    fn unrecognized_pairing_falls_back_to_debug_format() {
        let desc = describe_command(ActuatorType::Fan, &ActuatorCommand::Unknown(serde_json::json!({})));
        assert!(desc.starts_with("UNRECOGNIZED"));
    }
}
