use crate::{CanBus, CanFilter, CanFrame, Result, Timestamp, TransportError};
use std::collections::VecDeque;
use time::OffsetDateTime;

/// Callback invoked for every frame sent on a [`MockBus`]; the returned frames are
/// queued as if the far end had answered.
pub type Responder = Box<dyn FnMut(&CanFrame) -> Vec<CanFrame> + Send>;

/// A simple in-process mock bus. Each bus instance is independent.
///
/// Frames queued with [`MockBus::push_inbound`] (or produced by the responder) are
/// handed out by `recv` in order. `recv` never blocks: an empty queue is a timeout.
pub struct MockBus {
    name: String,
    inbox: VecDeque<CanFrame>,
    sent: Vec<CanFrame>,
    filters: Vec<CanFilter>,
    responder: Option<Responder>,
}

impl MockBus {
    /// Mock bus whose far end answers through `responder`.
    pub fn with_responder(name: &str, responder: Responder) -> Self {
        Self {
            responder: Some(responder),
            ..Self::empty(name)
        }
    }

    fn empty(name: &str) -> Self {
        Self {
            name: name.to_string(),
            inbox: VecDeque::new(),
            sent: Vec::new(),
            filters: Vec::new(),
            responder: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue a frame for a later `recv`.
    pub fn push_inbound(&mut self, frame: CanFrame) {
        self.inbox.push_back(frame);
    }

    /// Every frame passed to `send`, oldest first.
    pub fn sent(&self) -> &[CanFrame] {
        &self.sent
    }

    pub fn clear_sent(&mut self) {
        self.sent.clear();
    }

    pub fn filters(&self) -> &[CanFilter] {
        &self.filters
    }

    fn accepts(&self, frame: &CanFrame) -> bool {
        self.filters.is_empty() || self.filters.iter().any(|f| f.matches(frame.id))
    }
}

impl CanBus for MockBus {
    fn open(name: &str) -> Result<Self> {
        Ok(Self::empty(name))
    }

    fn set_filters(&mut self, filters: &[CanFilter]) -> Result<()> {
        self.filters = filters.to_vec();
        Ok(())
    }

    fn recv(&mut self, _timeout_ms: Option<u64>) -> Result<CanFrame> {
        while let Some(mut frame) = self.inbox.pop_front() {
            if !self.accepts(&frame) {
                tracing::trace!(bus = %self.name, id = %frame.id, "mock: filtered out");
                continue;
            }
            if frame.timestamp.is_none() {
                frame.timestamp = Some(Timestamp(OffsetDateTime::now_utc()));
            }
            return Ok(frame);
        }
        Err(TransportError::Timeout)
    }

    fn send(&mut self, frame: &CanFrame) -> Result<()> {
        if frame.len > 8 {
            return Err(TransportError::InvalidFrame("dlc > 8"));
        }
        self.sent.push(frame.clone());
        if let Some(responder) = self.responder.as_mut() {
            let replies = responder(frame);
            self.inbox.extend(replies);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CanId;

    fn id(raw: u16) -> anyhow::Result<CanId> {
        CanId::standard(raw).ok_or_else(|| anyhow::anyhow!("bad id {raw:#x}"))
    }

    fn frame(raw: u16, data: &[u8]) -> anyhow::Result<CanFrame> {
        CanFrame::new(id(raw)?, data).ok_or_else(|| anyhow::anyhow!("bad frame"))
    }

    #[test]
    fn empty_bus_times_out() -> anyhow::Result<()> {
        let mut bus = MockBus::open("mock0")?;
        let err = bus.recv(Some(0)).err().ok_or_else(|| anyhow::anyhow!("expected timeout"))?;
        assert!(err.is_timeout());
        Ok(())
    }

    #[test]
    fn inbound_frames_are_stamped_in_order() -> anyhow::Result<()> {
        let mut bus = MockBus::open("mock0")?;
        bus.push_inbound(frame(0x251, &[1])?);
        bus.push_inbound(frame(0x251, &[2])?);
        let first = bus.recv(Some(0))?;
        assert_eq!(first.payload(), &[1]);
        assert!(first.timestamp.is_some());
        assert_eq!(bus.recv(Some(0))?.payload(), &[2]);
        Ok(())
    }

    #[test]
    fn filters_drop_foreign_ids() -> anyhow::Result<()> {
        let mut bus = MockBus::open("mock0")?;
        bus.set_filters(&[CanFilter::exact(id(0x251)?)])?;
        bus.push_inbound(frame(0x300, &[9])?);
        bus.push_inbound(frame(0x251, &[7])?);
        assert_eq!(bus.recv(Some(0))?.payload(), &[7]);
        assert!(bus.recv(Some(0)).is_err());
        Ok(())
    }

    #[test]
    fn responder_replies_are_queued() -> anyhow::Result<()> {
        let reply = frame(0x251, &[0x08, 0, 1, 0, 2, 0, 3])?;
        let mut bus = MockBus::with_responder(
            "mock0",
            Box::new(move |sent: &CanFrame| {
                if sent.opcode() == Some(0x10) {
                    vec![reply.clone()]
                } else {
                    Vec::new()
                }
            }),
        );
        bus.send(&frame(0x250, &[0x0A, 0, 0, 90])?)?;
        assert!(bus.recv(Some(0)).is_err());
        bus.send(&frame(0x250, &[0x10, 0])?)?;
        assert_eq!(bus.recv(Some(0))?.opcode(), Some(0x08));
        assert_eq!(bus.sent().len(), 2);
        Ok(())
    }
}
