use crate::opcode::{MEASURE_CONTINUOUS, SERVO_SET};
use crate::{BoardState, NodeError, Result};

/// Servo-set payload: `[SERVO_SET, servo, angle_hi, angle_lo]`.
pub type ServoFrame = [u8; 4];

/// Build the servo command for `angle`, or `None` when that angle is already commanded.
///
/// `state.servo_angles` is updated before the frame is handed back, so a transport
/// failure afterwards leaves the new angle recorded.
pub fn set_servo(state: &mut BoardState, servo: u8, angle: u16) -> Result<Option<ServoFrame>> {
    let slot = state
        .servo_angles
        .get_mut(usize::from(servo))
        .ok_or(NodeError::InvalidServoIndex(servo))?;
    if *slot == angle {
        return Ok(None);
    }
    *slot = angle;
    let [hi, lo] = angle.to_be_bytes();
    Ok(Some([SERVO_SET, servo, hi, lo]))
}

/// Start request sent while probing a stale board.
pub fn start_request(mode: u8) -> [u8; 2] {
    [MEASURE_CONTINUOUS, mode]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SERVO_COUNT;

    // Board side of the servo frame.
    fn firmware_unpack(frame: &ServoFrame) -> (u8, u16) {
        (frame[1], u16::from(frame[2]) * 256 + u16::from(frame[3]))
    }

    #[test]
    fn second_identical_write_is_suppressed() -> anyhow::Result<()> {
        let mut state = BoardState::default();
        let first = set_servo(&mut state, 1, 90)?;
        assert_eq!(first, Some([SERVO_SET, 1, 0, 90]));
        assert_eq!(set_servo(&mut state, 1, 90)?, None);
        assert_eq!(state.servo_angles[1], 90);
        assert!(set_servo(&mut state, 1, 91)?.is_some());
        Ok(())
    }

    #[test]
    fn invalid_servo_is_rejected() {
        let mut state = BoardState::default();
        let err = set_servo(&mut state, SERVO_COUNT as u8, 10);
        assert!(matches!(err, Err(NodeError::InvalidServoIndex(3))));
        assert_eq!(state, BoardState::default());
    }

    #[test]
    fn unset_sentinel_only_matches_itself() -> anyhow::Result<()> {
        let mut state = BoardState::default();
        assert_eq!(set_servo(&mut state, 0, 0xFFFF)?, None);
        assert!(set_servo(&mut state, 0, 0)?.is_some());
        Ok(())
    }

    #[test]
    fn every_angle_survives_the_wire() -> anyhow::Result<()> {
        for angle in 0..=u16::MAX {
            let mut state = BoardState::default();
            state.servo_angles[2] = angle.wrapping_add(1);
            let frame = set_servo(&mut state, 2, angle)?
                .ok_or_else(|| anyhow::anyhow!("no frame for {angle}"))?;
            assert_eq!(firmware_unpack(&frame), (2, angle));
        }
        Ok(())
    }

    #[test]
    fn start_request_layout() {
        assert_eq!(start_request(0), [MEASURE_CONTINUOUS, 0]);
    }
}
