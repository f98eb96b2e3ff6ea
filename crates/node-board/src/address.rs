//! Static slot → bus identifier table.

use crate::{NodeError, Result, Slot, MAX_BOARDS};
use can_transport::CanId;
use serde::{Deserialize, Serialize};

/// Bus identifiers of one board, named from the board's point of view.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct AddressPair {
    /// Identifier the board listens on (host → board commands).
    pub inbound: u16,
    /// Identifier the board transmits status frames on.
    pub outbound: u16,
}

impl AddressPair {
    pub const fn new(inbound: u16, outbound: u16) -> Self {
        Self { inbound, outbound }
    }

    pub fn inbound_id(&self) -> Result<CanId> {
        CanId::standard(self.inbound).ok_or(NodeError::InvalidAddress(self.inbound))
    }

    pub fn outbound_id(&self) -> Result<CanId> {
        CanId::standard(self.outbound).ok_or(NodeError::InvalidAddress(self.outbound))
    }

    fn shares_id_with(&self, other: &AddressPair) -> bool {
        let mine = [self.inbound, self.outbound];
        mine.contains(&other.inbound) || mine.contains(&other.outbound)
    }
}

const SEQUENTIAL: [AddressPair; MAX_BOARDS] = [
    AddressPair::new(0x250, 0x251),
    AddressPair::new(0x252, 0x253),
    AddressPair::new(0x254, 0x255),
    AddressPair::new(0x256, 0x257),
    AddressPair::new(0x258, 0x259),
    AddressPair::new(0x25A, 0x25B),
    AddressPair::new(0x25C, 0x25D),
    AddressPair::new(0x25E, 0x25F),
];

// Deployed firmware: slots 2 and 3 transmit on the next board's status id,
// so slots 3 and 4 share 0x259 and 0x255 is never used.
const LEGACY: [AddressPair; MAX_BOARDS] = [
    AddressPair::new(0x250, 0x251),
    AddressPair::new(0x252, 0x253),
    AddressPair::new(0x254, 0x257),
    AddressPair::new(0x256, 0x259),
    AddressPair::new(0x258, 0x259),
    AddressPair::new(0x25A, 0x25B),
    AddressPair::new(0x25C, 0x25D),
    AddressPair::new(0x25E, 0x25F),
];

/// Fixed lookup from registration slot to [`AddressPair`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AddressTable {
    pairs: [AddressPair; MAX_BOARDS],
    len: usize,
}

impl Default for AddressTable {
    fn default() -> Self {
        Self::sequential()
    }
}

impl AddressTable {
    /// One distinct identifier pair per slot.
    pub const fn sequential() -> Self {
        Self {
            pairs: SEQUENTIAL,
            len: MAX_BOARDS,
        }
    }

    /// Wire-compatible with boards running the original firmware table.
    pub const fn legacy() -> Self {
        Self {
            pairs: LEGACY,
            len: MAX_BOARDS,
        }
    }

    /// Table with one explicitly configured pair per slot, in slot order.
    pub fn custom(pairs: &[AddressPair]) -> Result<Self> {
        if pairs.len() > MAX_BOARDS {
            return Err(NodeError::CapacityExceeded {
                slot: pairs.len() - 1,
                capacity: MAX_BOARDS,
            });
        }
        let mut table = [AddressPair::new(0, 0); MAX_BOARDS];
        for (slot, pair) in pairs.iter().enumerate() {
            pair.inbound_id()?;
            pair.outbound_id()?;
            table[slot] = *pair;
        }
        Ok(Self {
            pairs: table,
            len: pairs.len(),
        })
    }

    /// Number of slots this table can address.
    pub fn capacity(&self) -> usize {
        self.len
    }

    pub fn address_for(&self, slot: Slot) -> Result<AddressPair> {
        self.pairs[..self.len]
            .get(slot)
            .copied()
            .ok_or(NodeError::CapacityExceeded {
                slot,
                capacity: self.len,
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = (Slot, AddressPair)> + '_ {
        self.pairs[..self.len].iter().copied().enumerate()
    }

    /// Slot pairs that share at least one identifier (including a board whose
    /// inbound equals its own outbound, reported as `(s, s)`).
    pub fn collisions(&self) -> Vec<(Slot, Slot)> {
        let mut out = Vec::new();
        for (a, pa) in self.iter() {
            if pa.inbound == pa.outbound {
                out.push((a, a));
            }
            for (b, pb) in self.iter().skip(a + 1) {
                if pa.shares_id_with(&pb) {
                    out.push((a, b));
                }
            }
        }
        out
    }

    pub fn is_injective(&self) -> bool {
        self.collisions().is_empty()
    }
}
