//! RC opcodes carried in the BTH and the header geometry they imply.

use crate::roce_hdr::roce_hdr_length::{BTH_BYTES, ICRC_BYTES, IMMDT_BYTES, RETH_BYTES};

/// BTH opcode values for the RC transport, as seen on the wire.
pub mod opcode_value {
    pub const RC_RDMA_WRITE_FIRST: u8 = 0x06;
    pub const RC_RDMA_WRITE_MIDDLE: u8 = 0x07;
    pub const RC_RDMA_WRITE_LAST: u8 = 0x08;
    pub const RC_RDMA_WRITE_LAST_IMD: u8 = 0x09;
    pub const RC_RDMA_WRITE_ONLY: u8 = 0x0a;
    pub const RC_RDMA_WRITE_ONLY_IMD: u8 = 0x0b;
    pub const RC_RDMA_ACK: u8 = 0x11;
}

/// The opcodes this crate understands. Everything outside the RDMA WRITE
/// family (SEND, READ, ATOMIC, ...) lands in `Unsupported` carrying the raw
/// byte and is excluded from write-operation tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoceOpcode {
    WriteFirst,
    WriteMiddle,
    WriteLast,
    WriteLastImm,
    WriteOnly,
    WriteOnlyImm,
    Ack,
    Unsupported(u8),
}

impl From<u8> for RoceOpcode {
    fn from(value: u8) -> Self {
        use opcode_value::*;
        match value {
            RC_RDMA_WRITE_FIRST => RoceOpcode::WriteFirst,
            RC_RDMA_WRITE_MIDDLE => RoceOpcode::WriteMiddle,
            RC_RDMA_WRITE_LAST => RoceOpcode::WriteLast,
            RC_RDMA_WRITE_LAST_IMD => RoceOpcode::WriteLastImm,
            RC_RDMA_WRITE_ONLY => RoceOpcode::WriteOnly,
            RC_RDMA_WRITE_ONLY_IMD => RoceOpcode::WriteOnlyImm,
            RC_RDMA_ACK => RoceOpcode::Ack,
            other => RoceOpcode::Unsupported(other),
        }
    }
}

impl RoceOpcode {
    #[inline]
    pub fn wire_value(&self) -> u8 {
        use opcode_value::*;
        match self {
            RoceOpcode::WriteFirst => RC_RDMA_WRITE_FIRST,
            RoceOpcode::WriteMiddle => RC_RDMA_WRITE_MIDDLE,
            RoceOpcode::WriteLast => RC_RDMA_WRITE_LAST,
            RoceOpcode::WriteLastImm => RC_RDMA_WRITE_LAST_IMD,
            RoceOpcode::WriteOnly => RC_RDMA_WRITE_ONLY,
            RoceOpcode::WriteOnlyImm => RC_RDMA_WRITE_ONLY_IMD,
            RoceOpcode::Ack => RC_RDMA_ACK,
            RoceOpcode::Unsupported(raw) => *raw,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RoceOpcode::WriteFirst => "RC_RDMA_WRITE_FIRST",
            RoceOpcode::WriteMiddle => "RC_RDMA_WRITE_MIDDLE",
            RoceOpcode::WriteLast => "RC_RDMA_WRITE_LAST",
            RoceOpcode::WriteLastImm => "RC_RDMA_WRITE_LAST_IMD",
            RoceOpcode::WriteOnly => "RC_RDMA_WRITE_ONLY",
            RoceOpcode::WriteOnlyImm => "RC_RDMA_WRITE_ONLY_IMD",
            RoceOpcode::Ack => "RC_RDMA_ACK",
            RoceOpcode::Unsupported(_) => "UNSUPPORTED",
        }
    }

    /// FIRST/ONLY packets carry a RETH and open a new write operation.
    #[inline]
    pub fn starts_write(&self) -> bool {
        matches!(
            self,
            RoceOpcode::WriteFirst | RoceOpcode::WriteOnly | RoceOpcode::WriteOnlyImm
        )
    }

    /// MIDDLE/LAST packets extend an already open write operation.
    #[inline]
    pub fn continues_write(&self) -> bool {
        matches!(
            self,
            RoceOpcode::WriteMiddle | RoceOpcode::WriteLast | RoceOpcode::WriteLastImm
        )
    }

    /// LAST/ONLY packets close the operation and trigger the length check.
    #[inline]
    pub fn ends_write(&self) -> bool {
        matches!(
            self,
            RoceOpcode::WriteLast
                | RoceOpcode::WriteLastImm
                | RoceOpcode::WriteOnly
                | RoceOpcode::WriteOnlyImm
        )
    }

    #[inline]
    pub fn has_reth(&self) -> bool {
        self.starts_write()
    }

    #[inline]
    pub fn has_immdt(&self) -> bool {
        matches!(self, RoceOpcode::WriteLastImm | RoceOpcode::WriteOnlyImm)
    }

    /// Non-payload bytes of the IBA frame for this opcode, BTH start through
    /// ICRC end. Subtracting this from the frame length yields the DMA
    /// payload contributed by the packet.
    #[inline]
    pub fn iba_overhead(&self) -> usize {
        let mut bytes = BTH_BYTES + ICRC_BYTES;
        if self.has_reth() {
            bytes += RETH_BYTES;
        }
        if self.has_immdt() {
            bytes += IMMDT_BYTES;
        }
        bytes
    }
}
