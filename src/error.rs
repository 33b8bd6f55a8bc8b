use crate::roce_opcode::RoceOpcode;
use thiserror::Error;

/// Errors raised while decoding, building or CRC-checking RoCEv2 frames.
///
/// Header/length violations are fatal for the frame that raised them and for
/// nothing else; sequence and CRC mismatches are not errors at all, they are
/// counted by [`crate::roce_stream::RoceStreamValidator`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoceError {
    /// Buffer ends before a fixed-size header does.
    #[error("{header}: truncated header (need {need} bytes, have {have})")]
    TruncatedHeader {
        header: &'static str,
        need: usize,
        have: usize,
    },

    /// The ICRC engine only accepts whole 32-bit words.
    #[error("ICRC region of {len} bytes is not a multiple of 4")]
    InvalidCrcLength { len: usize },

    /// Builder payloads must be word aligned, RoCEv2 packets always are.
    #[error("payload of {len} bytes is not a multiple of 4")]
    InvalidPayloadLength { len: usize },

    /// An opcode demands an extension header the caller did not supply.
    #[error("opcode {opcode:?} requires a {header} header")]
    MissingHeader {
        opcode: RoceOpcode,
        header: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, RoceError>;
