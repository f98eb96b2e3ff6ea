use crate::{AddressPair, Liveness, Slot, ANALOG_COUNT, SERVO_COUNT, SERVO_UNSET, SWITCH_COUNT};
use core::fmt;
use serde::Serialize;

/// Everything the host knows about one node board.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BoardState {
    pub readings: [u16; ANALOG_COUNT],
    pub switches: [bool; SWITCH_COUNT],
    /// Last commanded angle per servo; [`SERVO_UNSET`] until first written.
    pub servo_angles: [u16; SERVO_COUNT],
    /// Monotonic ms of the last frame that counts toward freshness.
    pub last_update_ms: Option<u64>,
    pub alive: bool,
    /// State left by the last liveness check.
    pub liveness: Liveness,
}

impl Default for BoardState {
    fn default() -> Self {
        Self {
            readings: [0; ANALOG_COUNT],
            switches: [false; SWITCH_COUNT],
            servo_angles: [SERVO_UNSET; SERVO_COUNT],
            last_update_ms: None,
            alive: false,
            liveness: Liveness::Stale,
        }
    }
}

impl BoardState {
    pub fn touch(&mut self, now_ms: u64) {
        self.last_update_ms = Some(now_ms);
    }
}

/// `An:<readings> Di:<switches>` as printed by the diagnostic dump.
impl fmt::Display for BoardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "An:")?;
        for r in &self.readings {
            write!(f, "{r} ")?;
        }
        write!(f, "Di:")?;
        for s in &self.switches {
            write!(f, "{} ", u8::from(*s))?;
        }
        Ok(())
    }
}

/// Serializable copy of one registered board, for JSON output.
#[derive(Debug, Clone, Serialize)]
pub struct BoardSnapshot {
    pub slot: Slot,
    pub name: String,
    pub address: AddressPair,
    pub alive: bool,
    pub liveness: Liveness,
    pub readings: Vec<u16>,
    pub switches: Vec<bool>,
    /// `None` for servos never commanded.
    pub servo_angles: Vec<Option<u16>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update_ms: Option<u64>,
}

impl BoardSnapshot {
    pub fn new(slot: Slot, name: &str, address: AddressPair, state: &BoardState) -> Self {
        Self {
            slot,
            name: name.to_string(),
            address,
            alive: state.alive,
            liveness: state.liveness,
            readings: state.readings.to_vec(),
            switches: state.switches.to_vec(),
            servo_angles: state
                .servo_angles
                .iter()
                .map(|&a| (a != SERVO_UNSET).then_some(a))
                .collect(),
            last_update_ms: state.last_update_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let state = BoardState::default();
        assert!(state.readings.iter().all(|&r| r == 0));
        assert!(state.switches.iter().all(|&s| !s));
        assert!(state.servo_angles.iter().all(|&a| a == SERVO_UNSET));
        assert_eq!(state.last_update_ms, None);
        assert!(!state.alive);
        assert_eq!(state.liveness, Liveness::Stale);
    }

    #[test]
    fn dump_line() {
        let mut state = BoardState::default();
        state.readings[0] = 258;
        state.switches[3] = true;
        assert_eq!(
            state.to_string(),
            "An:258 0 0 0 0 0 0 0 0 Di:0 0 0 1 0 "
        );
    }

    #[test]
    fn snapshot_hides_unset_servos() {
        let mut state = BoardState::default();
        state.servo_angles[1] = 90;
        let snap = BoardSnapshot::new(0, "node0", AddressPair::new(0x250, 0x251), &state);
        assert_eq!(snap.servo_angles, vec![None, Some(90), None]);
    }
}
