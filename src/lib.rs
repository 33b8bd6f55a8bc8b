//! RoCEv2 packet decoding, invariant-CRC checking, and RDMA WRITE sequence
//! validation over captured Ethernet frames.
//!
//! The crate is pure in-memory plumbing: captured frames come from an
//! external tap/capture collaborator, and frames built here go out through
//! one. The pieces, leaf first:
//!
//! - [`roce_hdr`] — fixed-layout codecs for the Ethernet/IPv4/UDP/BTH/RETH
//!   stack plus the immediate word and the ICRC trailer.
//! - [`roce_icrc`] — the reflected CRC-32 engine, the ICRC parameters, and
//!   the in-flight-mutable-field mask.
//! - [`roce_opcode`] — the RC opcode enumeration and per-opcode geometry.
//! - [`roce_net`] — frame-level decode ([`decode_roce_frame`]) and the
//!   synthetic frame builder ([`build_frame`]).
//! - [`roce_stream`] — the per-operation PSN/length tracker and the
//!   aggregate pass/fail counters.

pub mod error;
pub mod roce_hdr;
pub mod roce_icrc;
pub mod roce_net;
pub mod roce_opcode;
pub mod roce_stream;

pub use error::{Result, RoceError};
pub use roce_net::{build_frame, decode_roce_frame, FrameParams, RocePacket};
pub use roce_opcode::RoceOpcode;
pub use roce_stream::{PsnMode, RoceStreamValidator, StreamCounters, WriteState};
