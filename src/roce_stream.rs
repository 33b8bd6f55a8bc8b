//! Cross-packet tracking of one segmented RDMA WRITE operation.
//!
//! The validator consumes decoded RoCEv2 packets in arrival order and keeps
//! the running expectation for one write at a time: the next PSN, the DMA
//! bytes accumulated so far, and the length/key the RETH declared up front.
//! Every RoCEv2 packet gets its ICRC checked whether or not it belongs to
//! the tracked operation.

use crate::error::Result;
use crate::roce_hdr::bth_mask::BTH_PSN_MASK;
use crate::roce_net::{decode_roce_frame, RocePacket};
use crate::roce_opcode::RoceOpcode;
use tracing::{debug, warn};

/// Where the expected starting PSN of an operation comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PsnMode {
    /// Seed from the FIRST/ONLY packet itself; the opening packet can never
    /// be a sequence error.
    FollowFirstPacket,
    /// Seed from a starting PSN negotiated out of band, so the opening
    /// packet is validated too.
    Expected(u32),
}

/// Aggregate verdict of a validation run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StreamCounters {
    pub icrc_errors: u32,
    pub psn_errors: u32,
    pub length_error: bool,
    pub operation_complete: bool,
}

/// Lifecycle of the single tracked write operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteState {
    Idle,
    Active {
        expected_psn: u32,
        accumulated_length: u32,
        declared_length: u32,
        remote_key: u32,
    },
    Closed {
        expected_psn: u32,
        accumulated_length: u32,
        declared_length: u32,
        remote_key: u32,
        length_ok: bool,
    },
}

/// Streaming/batch validator over a time-ordered frame sequence.
///
/// Not reentrant for more than one concurrent operation: a new FIRST/ONLY
/// packet resets the tracked state.
#[derive(Debug)]
pub struct RoceStreamValidator {
    mode: PsnMode,
    state: WriteState,
    counters: StreamCounters,
}

impl RoceStreamValidator {
    pub fn new(mode: PsnMode) -> Self {
        RoceStreamValidator {
            mode,
            state: WriteState::Idle,
            counters: StreamCounters::default(),
        }
    }

    #[inline]
    pub fn counters(&self) -> StreamCounters {
        self.counters
    }

    #[inline]
    pub fn state(&self) -> WriteState {
        self.state
    }

    /// True once a LAST/ONLY packet closed the tracked operation; streaming
    /// callers poll this to stop early.
    #[inline]
    pub fn operation_complete(&self) -> bool {
        self.counters.operation_complete
    }

    /// Feeds one captured frame. Non-RoCE frames are ignored; a truncated
    /// frame is an error for that frame only and leaves every counter and
    /// the session state untouched.
    pub fn process_frame(&mut self, frame: &[u8]) -> Result<Option<RocePacket>> {
        let pkt = match decode_roce_frame(frame)? {
            Some(pkt) => pkt,
            None => {
                debug!(len = frame.len(), "non-RoCE frame ignored");
                return Ok(None);
            }
        };

        self.check_icrc(&pkt);
        match pkt.opcode {
            RoceOpcode::WriteFirst | RoceOpcode::WriteOnly | RoceOpcode::WriteOnlyImm => {
                self.begin_write(&pkt);
            }
            RoceOpcode::WriteMiddle | RoceOpcode::WriteLast | RoceOpcode::WriteLastImm => {
                self.continue_write(&pkt);
            }
            // ICRC-checked above, otherwise invisible to the session
            RoceOpcode::Ack | RoceOpcode::Unsupported(_) => {}
        }
        Ok(Some(pkt))
    }

    /// Batch mode: folds an ordered capture into its aggregate counters.
    /// Frame-level decode errors are logged with their arrival index and
    /// skipped, so one mangled frame never aborts the run. Yields the same
    /// counters as feeding the frames through [`Self::process_frame`].
    pub fn run<I>(mut self, frames: I) -> StreamCounters
    where
        I: IntoIterator,
        I::Item: AsRef<[u8]>,
    {
        for (arrival, frame) in frames.into_iter().enumerate() {
            if let Err(err) = self.process_frame(frame.as_ref()) {
                warn!(arrival, %err, "frame skipped");
            }
        }
        self.counters
    }

    fn check_icrc(&mut self, pkt: &RocePacket) {
        debug!(
            opcode = pkt.opcode.name(),
            qp = pkt.dest_qp,
            psn = pkt.psn,
            received_icrc = format_args!("{:#010x}", pkt.received_icrc),
            computed_icrc = ?pkt.computed_icrc.map(|c| format!("{c:#010x}")),
            "RoCE packet received"
        );
        match pkt.computed_icrc {
            Some(computed) if computed == pkt.received_icrc => {}
            Some(computed) => {
                warn!(
                    received = format_args!("{:#010x}", pkt.received_icrc),
                    computed = format_args!("{computed:#010x}"),
                    "ICRC mismatch"
                );
                self.counters.icrc_errors += 1;
            }
            // unaligned region, the check was skipped upstream
            None => {}
        }
    }

    fn begin_write(&mut self, pkt: &RocePacket) {
        // decode_roce_frame always attaches a RETH to FIRST/ONLY packets
        let Some(reth) = pkt.reth else {
            warn!(opcode = pkt.opcode.name(), "write packet without RETH");
            return;
        };
        let expected_psn = match self.mode {
            PsnMode::FollowFirstPacket => pkt.psn,
            PsnMode::Expected(psn) => psn & BTH_PSN_MASK,
        };
        if pkt.psn != expected_psn {
            warn!(received = pkt.psn, expected = expected_psn, "wrong PSN");
            self.counters.psn_errors += 1;
        }
        let accumulated_length = pkt.payload_size() as u32;
        debug!(
            declared = reth.dma_length,
            remote_key = format_args!("{:#x}", reth.rkey),
            accumulated = accumulated_length,
            "write operation opened"
        );
        if pkt.opcode.ends_write() {
            self.close_write(expected_psn, accumulated_length, reth.dma_length, reth.rkey);
        } else {
            self.state = WriteState::Active {
                expected_psn,
                accumulated_length,
                declared_length: reth.dma_length,
                remote_key: reth.rkey,
            };
        }
    }

    fn continue_write(&mut self, pkt: &RocePacket) {
        let WriteState::Active {
            expected_psn,
            accumulated_length,
            declared_length,
            remote_key,
        } = self.state
        else {
            warn!(
                opcode = pkt.opcode.name(),
                psn = pkt.psn,
                "no active write operation, packet ignored for sequencing"
            );
            return;
        };
        let expected_psn = (expected_psn + 1) & BTH_PSN_MASK;
        if pkt.psn != expected_psn {
            warn!(received = pkt.psn, expected = expected_psn, "wrong PSN");
            self.counters.psn_errors += 1;
        }
        let accumulated_length = accumulated_length + pkt.payload_size() as u32;
        debug!(accumulated = accumulated_length, "write operation extended");
        if pkt.opcode.ends_write() {
            self.close_write(expected_psn, accumulated_length, declared_length, remote_key);
        } else {
            self.state = WriteState::Active {
                expected_psn,
                accumulated_length,
                declared_length,
                remote_key,
            };
        }
    }

    fn close_write(
        &mut self,
        expected_psn: u32,
        accumulated_length: u32,
        declared_length: u32,
        remote_key: u32,
    ) {
        let length_ok = accumulated_length == declared_length;
        if !length_ok {
            warn!(
                declared = declared_length,
                measured = accumulated_length,
                "DMA length does not match"
            );
            self.counters.length_error = true;
        }
        debug!(
            declared = declared_length,
            measured = accumulated_length,
            remote_key = format_args!("{remote_key:#x}"),
            "write operation complete"
        );
        self.counters.operation_complete = true;
        self.state = WriteState::Closed {
            expected_psn,
            accumulated_length,
            declared_length,
            remote_key,
            length_ok,
        };
    }
}
