use crate::decode::{decode, Decoded};
use crate::opcode::{self, Opcode};
use crate::{
    AddressPair, AddressTable, BoardSnapshot, BoardState, Liveness, NodeError, Result, Slot,
};
use can_transport::{CanFrame, CanId};
use std::collections::VecDeque;

/// How many error records the registry keeps before dropping the oldest.
pub const ERROR_LOG_CAPACITY: usize = 32;

/// A registered board.
#[derive(Debug, Clone)]
pub struct Board {
    pub name: String,
    pub address: AddressPair,
    pub state: BoardState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    pub slot: Option<Slot>,
    pub message: String,
}

/// Result of routing one inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// No registered board transmits on this identifier.
    NotForUs,
    /// Handled as a command common to every board type.
    Common { slot: Slot, opcode: Opcode },
    Decoded { slot: Slot, decoded: Decoded },
}

/// Boards in registration order; slot = index.
#[derive(Debug, Clone)]
pub struct NodeRegistry {
    table: AddressTable,
    boards: Vec<Board>,
    errors: VecDeque<ErrorRecord>,
}

impl NodeRegistry {
    pub fn new(table: AddressTable) -> Self {
        Self {
            boards: Vec::with_capacity(table.capacity()),
            table,
            errors: VecDeque::with_capacity(ERROR_LOG_CAPACITY),
        }
    }

    pub fn table(&self) -> &AddressTable {
        &self.table
    }

    /// Assign the next free slot to `name`.
    pub fn register(&mut self, name: &str) -> Result<Slot> {
        let slot = self.boards.len();
        let address = match self.table.address_for(slot) {
            Ok(address) => address,
            Err(e) => {
                self.record(None, format!("too many node boards: {name} would be {slot}"));
                return Err(e);
            }
        };
        self.boards.push(Board {
            name: name.to_string(),
            address,
            state: BoardState::default(),
        });
        tracing::info!(
            slot,
            name,
            inbound = %format!("0x{:03X}", address.inbound),
            outbound = %format!("0x{:03X}", address.outbound),
            "node board registered"
        );
        Ok(slot)
    }

    pub fn len(&self) -> usize {
        self.boards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boards.is_empty()
    }

    pub fn board(&self, slot: Slot) -> Result<&Board> {
        self.boards.get(slot).ok_or(NodeError::NotFound(slot))
    }

    pub fn board_mut(&mut self, slot: Slot) -> Result<&mut Board> {
        self.boards.get_mut(slot).ok_or(NodeError::NotFound(slot))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Slot, &Board)> {
        self.boards.iter().enumerate()
    }

    pub fn alive_slots(&self) -> Vec<Slot> {
        self.iter()
            .filter(|(_, b)| b.state.alive)
            .map(|(slot, _)| slot)
            .collect()
    }

    /// Boards whose last probe failed.
    pub fn dead_count(&self) -> usize {
        self.boards
            .iter()
            .filter(|b| b.state.liveness == Liveness::Dead)
            .count()
    }

    /// First board whose status identifier is `id`.
    pub fn find_by_outbound(&self, id: CanId) -> Option<Slot> {
        if id.is_extended() {
            return None;
        }
        self.boards
            .iter()
            .position(|b| u32::from(b.address.outbound) == id.raw())
    }

    /// Route an inbound frame to its board and apply it.
    ///
    /// Decode failures are also appended to the error log; the frame is dropped and
    /// board state is unchanged.
    pub fn dispatch(&mut self, frame: &CanFrame, now_ms: u64) -> Result<Dispatch> {
        let Some(slot) = self.find_by_outbound(frame.id) else {
            return Ok(Dispatch::NotForUs);
        };
        let data = frame.payload();
        if data.first() == Some(&opcode::REPORT_ALIVE) {
            let state = &mut self.boards[slot].state;
            state.alive = true;
            // Alive, but freshness still comes from the heartbeat group
            if state.liveness == Liveness::Dead {
                state.liveness = Liveness::Stale;
            }
            return Ok(Dispatch::Common {
                slot,
                opcode: Opcode::ReportAlive,
            });
        }
        match decode(data, &mut self.boards[slot].state, now_ms) {
            Ok(decoded) => {
                tracing::debug!(slot, ?decoded, "decoded");
                Ok(Dispatch::Decoded { slot, decoded })
            }
            Err(e) => {
                let name = data
                    .first()
                    .map(|&op| opcode::command_name(op))
                    .unwrap_or_default();
                tracing::warn!(slot, command = %name, error = %e, "frame dropped");
                self.record(Some(slot), e.to_string());
                Err(e)
            }
        }
    }

    pub fn record(&mut self, slot: Option<Slot>, message: String) {
        if self.errors.len() == ERROR_LOG_CAPACITY {
            self.errors.pop_front();
        }
        self.errors.push_back(ErrorRecord { slot, message });
    }

    pub fn errors(&self) -> impl Iterator<Item = &ErrorRecord> {
        self.errors.iter()
    }

    pub fn clear_errors(&mut self) {
        self.errors.clear();
    }

    pub fn snapshots(&self) -> Vec<BoardSnapshot> {
        self.iter()
            .map(|(slot, b)| BoardSnapshot::new(slot, &b.name, b.address, &b.state))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MAX_BOARDS;

    fn frame(id: u16, data: &[u8]) -> anyhow::Result<CanFrame> {
        let id = CanId::standard(id).ok_or_else(|| anyhow::anyhow!("id"))?;
        CanFrame::new(id, data).ok_or_else(|| anyhow::anyhow!("len"))
    }

    #[test]
    fn slots_follow_registration_order() -> anyhow::Result<()> {
        let mut reg = NodeRegistry::new(AddressTable::sequential());
        assert_eq!(reg.register("left")?, 0);
        assert_eq!(reg.register("right")?, 1);
        assert_eq!(reg.board(1)?.address, AddressPair::new(0x252, 0x253));
        assert!(matches!(reg.board(2), Err(NodeError::NotFound(2))));
        Ok(())
    }

    #[test]
    fn ninth_board_is_rejected() -> anyhow::Result<()> {
        let mut reg = NodeRegistry::new(AddressTable::sequential());
        for i in 0..MAX_BOARDS {
            reg.register(&format!("node{i}"))?;
        }
        let err = reg.register("extra");
        assert!(matches!(err, Err(NodeError::CapacityExceeded { slot: 8, .. })));
        assert_eq!(reg.len(), MAX_BOARDS);
        assert_eq!(reg.errors().count(), 1);
        Ok(())
    }

    #[test]
    fn frames_route_by_status_id() -> anyhow::Result<()> {
        let mut reg = NodeRegistry::new(AddressTable::sequential());
        reg.register("a")?;
        reg.register("b")?;
        let out = reg.dispatch(&frame(0x253, &[0x06, 0, 1, 0, 2, 0, 3, 0])?, 50)?;
        assert_eq!(
            out,
            Dispatch::Decoded {
                slot: 1,
                decoded: Decoded::Readings { start: 0, heartbeat: false }
            }
        );
        assert_eq!(&reg.board(1)?.state.readings[..3], &[1, 2, 3]);
        assert_eq!(reg.board(0)?.state.readings, [0; 9]);

        // Commands to a board are not status frames
        assert_eq!(reg.dispatch(&frame(0x252, &[0x06, 0, 1])?, 50)?, Dispatch::NotForUs);
        Ok(())
    }

    #[test]
    fn report_alive_is_common() -> anyhow::Result<()> {
        let mut reg = NodeRegistry::new(AddressTable::sequential());
        reg.register("a")?;
        let out = reg.dispatch(&frame(0x251, &[opcode::REPORT_ALIVE])?, 1)?;
        assert_eq!(out, Dispatch::Common { slot: 0, opcode: Opcode::ReportAlive });
        assert!(reg.board(0)?.state.alive);
        assert_eq!(reg.board(0)?.state.last_update_ms, None);
        Ok(())
    }

    #[test]
    fn report_alive_clears_dead() -> anyhow::Result<()> {
        let mut reg = NodeRegistry::new(AddressTable::sequential());
        reg.register("a")?;
        reg.board_mut(0)?.state.liveness = Liveness::Dead;
        assert_eq!(reg.dead_count(), 1);
        reg.dispatch(&frame(0x251, &[opcode::REPORT_ALIVE])?, 1)?;
        assert_eq!(reg.board(0)?.state.liveness, Liveness::Stale);
        assert_eq!(reg.dead_count(), 0);
        Ok(())
    }

    #[test]
    fn unknown_command_is_logged_and_dropped() -> anyhow::Result<()> {
        let mut reg = NodeRegistry::new(AddressTable::sequential());
        reg.register("a")?;
        let err = reg.dispatch(&frame(0x251, &[0x42, 1, 2])?, 1);
        assert!(matches!(err, Err(NodeError::UnknownCommand(0x42))));
        assert_eq!(reg.board(0)?.state, BoardState::default());
        let rec = reg.errors().next().ok_or_else(|| anyhow::anyhow!("no record"))?;
        assert_eq!(rec.slot, Some(0));
        Ok(())
    }

    #[test]
    fn legacy_shared_id_reaches_the_first_board() -> anyhow::Result<()> {
        let mut reg = NodeRegistry::new(AddressTable::legacy());
        for i in 0..5 {
            reg.register(&format!("node{i}"))?;
        }
        let out = reg.dispatch(&frame(0x259, &[0x09, 1])?, 9)?;
        assert!(matches!(out, Dispatch::Decoded { slot: 3, .. }));
        Ok(())
    }

    #[test]
    fn error_log_is_bounded() {
        let mut reg = NodeRegistry::new(AddressTable::sequential());
        for i in 0..(ERROR_LOG_CAPACITY + 5) {
            reg.record(None, format!("e{i}"));
        }
        assert_eq!(reg.errors().count(), ERROR_LOG_CAPACITY);
        assert_eq!(reg.errors().next().map(|r| r.message.as_str()), Some("e5"));
    }
}
