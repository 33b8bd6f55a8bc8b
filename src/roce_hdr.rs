//! Fixed-layout (de)serialization for the RoCEv2 header stack:
//! Ethernet / IPv4 / UDP / BTH / RETH / immediate data / ICRC trailer.
//!
//! All multi-byte fields are big endian on the wire except the ICRC trailer,
//! which is little endian. Decoding is pure: each `decode` takes a byte
//! slice, requires the fixed header length, and hands back the header plus
//! the remaining bytes. `encode_into` is the structural inverse and
//! round-trips through `decode`.

use crate::error::{Result, RoceError};
use bytes::{BufMut, BytesMut};

pub mod roce_hdr_length {
    pub const ETH_BYTES: usize = 14;
    pub const IPV4_BYTES: usize = 20;
    pub const UDP_BYTES: usize = 8;
    pub const BTH_BYTES: usize = 12;
    pub const RETH_BYTES: usize = 16;
    pub const IMMDT_BYTES: usize = 4;
    pub const ICRC_BYTES: usize = 4;
}
use roce_hdr_length::*;

pub mod ipv4_mask {
    pub const VERSION_MASK: u8 = 0xf0;
    pub const IHL_MASK: u8 = 0x0f;
    pub const DSCP_MASK: u8 = 0xfc;
    pub const ECN_MASK: u8 = 0x03;
    pub const FLAGS_MASK: u16 = 0xe000;
    pub const FRAG_OFFSET_MASK: u16 = 0x1fff;
}

pub mod bth_mask {
    pub const BTH_QPN_MASK: u32 = 0x00ff_ffff;
    pub const BTH_PSN_MASK: u32 = 0x00ff_ffff;
}

pub mod eth_mask {
    pub const MAC_MASK: u64 = 0x0000_ffff_ffff_ffff;
}

fn ensure_len(header: &'static str, need: usize, buf: &[u8]) -> Result<()> {
    if buf.len() < need {
        return Err(RoceError::TruncatedHeader {
            header,
            need,
            have: buf.len(),
        });
    }
    Ok(())
}

/******************************************************************************
 * Ethernet II
 ******************************************************************************/
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EthernetHeader {
    /// 48-bit destination MAC in the low bits.
    pub dest_mac: u64,
    /// 48-bit source MAC in the low bits.
    pub src_mac: u64,
    pub eth_type: u16,
}

impl EthernetHeader {
    pub fn decode(buf: &[u8]) -> Result<(Self, &[u8])> {
        ensure_len("ethernet", ETH_BYTES, buf)?;
        let mac = |b: &[u8]| {
            u64::from_be_bytes([0, 0, b[0], b[1], b[2], b[3], b[4], b[5]])
        };
        let hdr = EthernetHeader {
            dest_mac: mac(&buf[0..6]),
            src_mac: mac(&buf[6..12]),
            eth_type: u16::from_be_bytes([buf[12], buf[13]]),
        };
        Ok((hdr, &buf[ETH_BYTES..]))
    }

    pub fn encode_into(&self, out: &mut BytesMut) {
        out.put_slice(&(self.dest_mac & eth_mask::MAC_MASK).to_be_bytes()[2..8]);
        out.put_slice(&(self.src_mac & eth_mask::MAC_MASK).to_be_bytes()[2..8]);
        out.put_u16(self.eth_type);
    }
}

/******************************************************************************
 * IPv4
 ******************************************************************************/
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Header {
    pub version: u8,
    pub ihl: u8,
    pub dscp: u8,
    pub ecn: u8,
    pub total_length: u16,
    pub identification: u16,
    pub flags: u8,
    pub fragment_offset: u16,
    pub ttl: u8,
    pub protocol: u8,
    pub header_checksum: u16,
    pub source: u32,
    pub dest: u32,
}

impl Ipv4Header {
    pub fn decode(buf: &[u8]) -> Result<(Self, &[u8])> {
        ensure_len("ipv4", IPV4_BYTES, buf)?;
        let flags_frag = u16::from_be_bytes([buf[6], buf[7]]);
        let hdr = Ipv4Header {
            version: (buf[0] & ipv4_mask::VERSION_MASK) >> 4,
            ihl: buf[0] & ipv4_mask::IHL_MASK,
            dscp: (buf[1] & ipv4_mask::DSCP_MASK) >> 2,
            ecn: buf[1] & ipv4_mask::ECN_MASK,
            total_length: u16::from_be_bytes([buf[2], buf[3]]),
            identification: u16::from_be_bytes([buf[4], buf[5]]),
            flags: ((flags_frag & ipv4_mask::FLAGS_MASK) >> 13) as u8,
            fragment_offset: flags_frag & ipv4_mask::FRAG_OFFSET_MASK,
            ttl: buf[8],
            protocol: buf[9],
            header_checksum: u16::from_be_bytes([buf[10], buf[11]]),
            source: u32::from_be_bytes([buf[12], buf[13], buf[14], buf[15]]),
            dest: u32::from_be_bytes([buf[16], buf[17], buf[18], buf[19]]),
        };
        Ok((hdr, &buf[IPV4_BYTES..]))
    }

    pub fn encode_into(&self, out: &mut BytesMut) {
        out.put_u8((self.version << 4) | (self.ihl & ipv4_mask::IHL_MASK));
        out.put_u8((self.dscp << 2) | (self.ecn & ipv4_mask::ECN_MASK));
        out.put_u16(self.total_length);
        out.put_u16(self.identification);
        out.put_u16(
            (((self.flags as u16) << 13) & ipv4_mask::FLAGS_MASK)
                | (self.fragment_offset & ipv4_mask::FRAG_OFFSET_MASK),
        );
        out.put_u8(self.ttl);
        out.put_u8(self.protocol);
        out.put_u16(self.header_checksum);
        out.put_u32(self.source);
        out.put_u32(self.dest);
    }
}

/******************************************************************************
 * UDP
 ******************************************************************************/
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UdpHeader {
    pub source_port: u16,
    pub dest_port: u16,
    pub length: u16,
    pub checksum: u16,
}

impl UdpHeader {
    pub fn decode(buf: &[u8]) -> Result<(Self, &[u8])> {
        ensure_len("udp", UDP_BYTES, buf)?;
        let hdr = UdpHeader {
            source_port: u16::from_be_bytes([buf[0], buf[1]]),
            dest_port: u16::from_be_bytes([buf[2], buf[3]]),
            length: u16::from_be_bytes([buf[4], buf[5]]),
            checksum: u16::from_be_bytes([buf[6], buf[7]]),
        };
        Ok((hdr, &buf[UDP_BYTES..]))
    }

    pub fn encode_into(&self, out: &mut BytesMut) {
        out.put_u16(self.source_port);
        out.put_u16(self.dest_port);
        out.put_u16(self.length);
        out.put_u16(self.checksum);
    }
}

/******************************************************************************
 * Base Transport Header
 ******************************************************************************/
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Bth {
    pub opcode: u8,
    pub pkey: u16,
    /// 24-bit destination queue pair number.
    pub dest_qp: u32,
    /// Ack-request byte (bit 7 is the ack-request flag).
    pub ack_req: u8,
    /// 24-bit packet sequence number.
    pub psn: u32,
}

impl Bth {
    pub fn decode(buf: &[u8]) -> Result<(Self, &[u8])> {
        ensure_len("bth", BTH_BYTES, buf)?;
        let hdr = Bth {
            opcode: buf[0],
            // buf[1] is se/mig/pad/tver, buf[4] is reserved
            pkey: u16::from_be_bytes([buf[2], buf[3]]),
            dest_qp: u32::from_be_bytes([0, buf[5], buf[6], buf[7]]),
            ack_req: buf[8],
            psn: u32::from_be_bytes([0, buf[9], buf[10], buf[11]]),
        };
        Ok((hdr, &buf[BTH_BYTES..]))
    }

    pub fn encode_into(&self, out: &mut BytesMut) {
        out.put_u8(self.opcode);
        out.put_u8(0);
        out.put_u16(self.pkey);
        out.put_u8(0);
        out.put_slice(&(self.dest_qp & bth_mask::BTH_QPN_MASK).to_be_bytes()[1..4]);
        out.put_u8(self.ack_req);
        out.put_slice(&(self.psn & bth_mask::BTH_PSN_MASK).to_be_bytes()[1..4]);
    }
}

/******************************************************************************
 * RDMA Extended Transport Header
 ******************************************************************************/
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Reth {
    pub va: u64,
    pub rkey: u32,
    pub dma_length: u32,
}

impl Reth {
    pub fn decode(buf: &[u8]) -> Result<(Self, &[u8])> {
        ensure_len("reth", RETH_BYTES, buf)?;
        let hdr = Reth {
            va: u64::from_be_bytes(buf[0..8].try_into().unwrap()),
            rkey: u32::from_be_bytes(buf[8..12].try_into().unwrap()),
            dma_length: u32::from_be_bytes(buf[12..16].try_into().unwrap()),
        };
        Ok((hdr, &buf[RETH_BYTES..]))
    }

    pub fn encode_into(&self, out: &mut BytesMut) {
        out.put_u64(self.va);
        out.put_u32(self.rkey);
        out.put_u32(self.dma_length);
    }
}

/******************************************************************************
 * Immediate Extended Transport Header
 ******************************************************************************/
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Immdt {
    pub imm: u32,
}

impl Immdt {
    pub fn decode(buf: &[u8]) -> Result<(Self, &[u8])> {
        ensure_len("immdt", IMMDT_BYTES, buf)?;
        let hdr = Immdt {
            imm: u32::from_be_bytes(buf[0..4].try_into().unwrap()),
        };
        Ok((hdr, &buf[IMMDT_BYTES..]))
    }

    pub fn encode_into(&self, out: &mut BytesMut) {
        out.put_u32(self.imm);
    }
}

/******************************************************************************
 * Invariant CRC trailer
 ******************************************************************************/
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Icrc {
    /// ICRC value; stored little endian in the last 4 bytes of the packet.
    pub value: u32,
}

impl Icrc {
    pub fn decode(buf: &[u8]) -> Result<(Self, &[u8])> {
        ensure_len("icrc", ICRC_BYTES, buf)?;
        let hdr = Icrc {
            value: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
        };
        Ok((hdr, &buf[ICRC_BYTES..]))
    }

    pub fn encode_into(&self, out: &mut BytesMut) {
        out.put_u32_le(self.value);
    }
}
