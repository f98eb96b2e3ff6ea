use core::fmt;
use time::OffsetDateTime;

/// 11-bit or 29-bit CAN identifier
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct CanId {
    raw: u32,
    extended: bool,
}

impl CanId {
    pub const fn standard(id11: u16) -> Option<Self> {
        if id11 <= 0x7FF {
            Some(Self {
                raw: id11 as u32,
                extended: false,
            })
        } else {
            None
        }
    }

    pub const fn extended(id29: u32) -> Option<Self> {
        if id29 <= 0x1FFF_FFFF {
            Some(Self {
                raw: id29,
                extended: true,
            })
        } else {
            None
        }
    }

    pub fn raw(&self) -> u32 {
        self.raw
    }
    pub fn is_extended(&self) -> bool {
        self.extended
    }
}

impl fmt::Display for CanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.extended {
            write!(f, "0x{raw:08X}", raw = self.raw)
        } else {
            write!(f, "0x{raw:03X}", raw = self.raw)
        }
    }
}

/// A classic CAN data frame, at most 8 data bytes
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CanFrame {
    pub id: CanId,
    pub len: u8,
    pub data: [u8; 8],
    pub timestamp: Option<Timestamp>,
}

impl CanFrame {
    pub fn new(id: CanId, data: &[u8]) -> Option<Self> {
        if data.len() > 8 {
            return None;
        }
        let mut buf = [0u8; 8];
        buf[..data.len()].copy_from_slice(data);
        Some(Self {
            id,
            len: data.len() as u8,
            data: buf,
            timestamp: None,
        })
    }

    /// The valid data bytes (`data[..len]`).
    pub fn payload(&self) -> &[u8] {
        let len = usize::from(self.len).min(self.data.len());
        &self.data[..len]
    }

    /// First payload byte, the opcode on node-style buses.
    pub fn opcode(&self) -> Option<u8> {
        self.payload().first().copied()
    }
}

impl fmt::Display for CanFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.id, self.len)?;
        for b in self.payload() {
            write!(f, " {b:02X}")?;
        }
        Ok(())
    }
}

/// Acceptance filter: a frame passes when `frame.id & mask == id & mask`
/// and the identifier kinds (standard/extended) agree.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CanFilter {
    pub id: CanId,
    pub mask: u32,
}

impl CanFilter {
    /// Filter that accepts exactly one identifier.
    pub fn exact(id: CanId) -> Self {
        let mask = if id.is_extended() { 0x1FFF_FFFF } else { 0x7FF };
        Self { id, mask }
    }

    pub fn matches(&self, id: CanId) -> bool {
        self.id.is_extended() == id.is_extended()
            && (self.id.raw() & self.mask) == (id.raw() & self.mask)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Timestamp(pub OffsetDateTime);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_id_range() {
        assert!(CanId::standard(0x7FF).is_some());
        assert!(CanId::standard(0x800).is_none());
        assert!(CanId::extended(0x2000_0000).is_none());
    }

    #[test]
    fn frame_payload_is_trimmed_to_len() -> anyhow::Result<()> {
        let id = CanId::standard(0x250).ok_or_else(|| anyhow::anyhow!("id"))?;
        let frame = CanFrame::new(id, &[0x0A, 1, 0, 90]).ok_or_else(|| anyhow::anyhow!("len"))?;
        assert_eq!(frame.payload(), &[0x0A, 1, 0, 90]);
        assert_eq!(frame.opcode(), Some(0x0A));
        assert_eq!(frame.to_string(), "0x250 [4] 0A 01 00 5A");
        assert!(CanFrame::new(id, &[0; 9]).is_none());
        Ok(())
    }

    #[test]
    fn exact_filter_matches_only_its_id() -> anyhow::Result<()> {
        let a = CanId::standard(0x251).ok_or_else(|| anyhow::anyhow!("id"))?;
        let b = CanId::standard(0x253).ok_or_else(|| anyhow::anyhow!("id"))?;
        let f = CanFilter::exact(a);
        assert!(f.matches(a));
        assert!(!f.matches(b));
        let ext = CanId::extended(0x251).ok_or_else(|| anyhow::anyhow!("id"))?;
        assert!(!f.matches(ext));
        Ok(())
    }
}
