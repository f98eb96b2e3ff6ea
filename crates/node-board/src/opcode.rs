//! Opcode byte values shared with the node board firmware.

/// Host asks a board to start streaming measurements (common to all sensor boards).
pub const MEASURE_CONTINUOUS: u8 = 0x10;
/// Board announces itself (common to all boards).
pub const REPORT_ALIVE: u8 = 0xFF;

pub const SENSORS_GROUP_1: u8 = 0x06;
pub const SENSORS_GROUP_2: u8 = 0x07;
pub const SENSORS_GROUP_3: u8 = 0x08;
pub const SWITCH_ON: u8 = 0x09;
pub const SERVO_SET: u8 = 0x0A;

/// Known node opcodes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Opcode {
    SensorsGroup1,
    SensorsGroup2,
    SensorsGroup3,
    SwitchOn,
    ServoSet,
    MeasureContinuous,
    ReportAlive,
}

impl Opcode {
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            SENSORS_GROUP_1 => Some(Self::SensorsGroup1),
            SENSORS_GROUP_2 => Some(Self::SensorsGroup2),
            SENSORS_GROUP_3 => Some(Self::SensorsGroup3),
            SWITCH_ON => Some(Self::SwitchOn),
            SERVO_SET => Some(Self::ServoSet),
            MEASURE_CONTINUOUS => Some(Self::MeasureContinuous),
            REPORT_ALIVE => Some(Self::ReportAlive),
            _ => None,
        }
    }

    pub const fn byte(self) -> u8 {
        match self {
            Self::SensorsGroup1 => SENSORS_GROUP_1,
            Self::SensorsGroup2 => SENSORS_GROUP_2,
            Self::SensorsGroup3 => SENSORS_GROUP_3,
            Self::SwitchOn => SWITCH_ON,
            Self::ServoSet => SERVO_SET,
            Self::MeasureContinuous => MEASURE_CONTINUOUS,
            Self::ReportAlive => REPORT_ALIVE,
        }
    }

    /// Short human-readable name, as printed in bus traces.
    pub const fn name(self) -> &'static str {
        match self {
            Self::SensorsGroup1 => "Send 1-3",
            Self::SensorsGroup2 => "Send 4-6",
            Self::SensorsGroup3 => "Send 7-9",
            Self::SwitchOn => "Switch on",
            Self::ServoSet => "Servo set",
            Self::MeasureContinuous => "Measure continuous",
            Self::ReportAlive => "Report alive",
        }
    }
}

/// Name for any opcode byte, including ones this host does not know.
pub fn command_name(byte: u8) -> String {
    match Opcode::from_byte(byte) {
        Some(op) => op.name().to_string(),
        None => format!("no command found for key 0x{byte:02X}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_mapping_is_bijective() {
        for byte in 0..=u8::MAX {
            if let Some(op) = Opcode::from_byte(byte) {
                assert_eq!(op.byte(), byte);
            }
        }
    }

    #[test]
    fn names() {
        assert_eq!(command_name(SENSORS_GROUP_3), "Send 7-9");
        assert_eq!(command_name(SERVO_SET), "Servo set");
        assert_eq!(command_name(0x42), "no command found for key 0x42");
    }
}
