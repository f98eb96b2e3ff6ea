use crate::opcode::{SENSORS_GROUP_1, SENSORS_GROUP_2, SENSORS_GROUP_3, SWITCH_ON};
use crate::{BoardState, NodeError, Result, SWITCH_COUNT};

/// What a successfully decoded frame changed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Decoded {
    /// Three analog channels starting at `start`.
    Readings { start: usize, heartbeat: bool },
    Switch { index: usize, on: bool },
}

/// Apply one inbound status frame (byte 0 = opcode) to `state`.
///
/// Only the last sensor group and switch events refresh `last_update_ms`; the first two
/// groups arrive earlier in the same cycle and would make a half-updated board look fresh.
/// On any error `state` is left untouched.
pub fn decode(data: &[u8], state: &mut BoardState, now_ms: u64) -> Result<Decoded> {
    let Some(&opcode) = data.first() else {
        return Err(NodeError::ShortFrame { opcode: 0, len: 0 });
    };
    match opcode {
        SENSORS_GROUP_1 => decode_group(data, state, 0, None),
        SENSORS_GROUP_2 => decode_group(data, state, 3, None),
        SENSORS_GROUP_3 => decode_group(data, state, 6, Some(now_ms)),
        SWITCH_ON => {
            let byte = *data.get(1).ok_or(NodeError::ShortFrame {
                opcode,
                len: data.len(),
            })?;
            let index = byte >> 1;
            if usize::from(index) >= SWITCH_COUNT {
                return Err(NodeError::InvalidSwitchIndex(index));
            }
            let on = byte & 1 == 1;
            state.switches[usize::from(index)] = on;
            state.touch(now_ms);
            Ok(Decoded::Switch {
                index: usize::from(index),
                on,
            })
        }
        other => Err(NodeError::UnknownCommand(other)),
    }
}

fn decode_group(
    data: &[u8],
    state: &mut BoardState,
    start: usize,
    heartbeat: Option<u64>,
) -> Result<Decoded> {
    let values = unpack_group(data)?;
    state.readings[start..start + 3].copy_from_slice(&values);
    if let Some(now_ms) = heartbeat {
        state.touch(now_ms);
    }
    Ok(Decoded::Readings {
        start,
        heartbeat: heartbeat.is_some(),
    })
}

/// Bytes 1..=6 as three big-endian u16 values.
fn unpack_group(data: &[u8]) -> Result<[u16; 3]> {
    let Some(body) = data.get(1..7) else {
        return Err(NodeError::ShortFrame {
            opcode: data.first().copied().unwrap_or_default(),
            len: data.len(),
        });
    };
    let mut out = [0u16; 3];
    for (value, pair) in out.iter_mut().zip(body.chunks_exact(2)) {
        *value = u16::from(pair[0]) << 8 | u16::from(pair[1]);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::SERVO_SET;

    #[test]
    fn group_one_unpacks_big_endian() -> anyhow::Result<()> {
        let mut state = BoardState::default();
        let out = decode(
            &[SENSORS_GROUP_1, 0x01, 0x02, 0x00, 0x05, 0x00, 0x09, 0x00],
            &mut state,
            10,
        )?;
        assert_eq!(out, Decoded::Readings { start: 0, heartbeat: false });
        assert_eq!(&state.readings[..3], &[258, 5, 9]);
        assert_eq!(state.last_update_ms, None);
        Ok(())
    }

    #[test]
    fn group_two_fills_channels_three_to_five() -> anyhow::Result<()> {
        let mut state = BoardState::default();
        decode(&[SENSORS_GROUP_2, 0, 1, 0, 2, 0xFF, 0xFF], &mut state, 10)?;
        assert_eq!(&state.readings[3..6], &[1, 2, 0xFFFF]);
        assert!(state.readings[..3].iter().all(|&r| r == 0));
        assert_eq!(state.last_update_ms, None);
        Ok(())
    }

    #[test]
    fn group_three_is_the_heartbeat() -> anyhow::Result<()> {
        let mut state = BoardState::default();
        decode(&[SENSORS_GROUP_3, 0, 7, 0, 8, 1, 0, 0], &mut state, 1234)?;
        assert_eq!(&state.readings[6..], &[7, 8, 256]);
        assert_eq!(state.last_update_ms, Some(1234));
        Ok(())
    }

    #[test]
    fn short_group_leaves_readings_alone() {
        let mut state = BoardState::default();
        state.readings = [1; 9];
        let err = decode(&[SENSORS_GROUP_3, 0, 7, 0, 8], &mut state, 5);
        assert!(matches!(err, Err(NodeError::ShortFrame { len: 5, .. })));
        assert_eq!(state.readings, [1; 9]);
        assert_eq!(state.last_update_ms, None);
    }

    #[test]
    fn switch_on_sets_index_and_refreshes() -> anyhow::Result<()> {
        let mut state = BoardState::default();
        let out = decode(&[SWITCH_ON, (3 << 1) | 1, 0, 0, 0, 0, 0, 0], &mut state, 77)?;
        assert_eq!(out, Decoded::Switch { index: 3, on: true });
        assert!(state.switches[3]);
        assert_eq!(state.last_update_ms, Some(77));

        decode(&[SWITCH_ON, 3 << 1], &mut state, 78)?;
        assert!(!state.switches[3]);
        Ok(())
    }

    #[test]
    fn switch_index_out_of_range() {
        let mut state = BoardState::default();
        let err = decode(&[SWITCH_ON, (5 << 1) | 1], &mut state, 77);
        assert!(matches!(err, Err(NodeError::InvalidSwitchIndex(5))));
        assert_eq!(state, BoardState::default());
    }

    #[test]
    fn servo_set_echo_is_unknown_here() {
        let mut state = BoardState::default();
        let err = decode(&[SERVO_SET, 0, 0, 90], &mut state, 1);
        assert!(matches!(err, Err(NodeError::UnknownCommand(SERVO_SET))));
        assert_eq!(state, BoardState::default());
    }
}
