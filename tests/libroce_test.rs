use etherparse::{IpHeader::Version4, PacketHeaders, TransportHeader::Udp};
use libroce::roce_hdr::{Bth, Reth};
use libroce::{
    build_frame, decode_roce_frame, FrameParams, PsnMode, RoceOpcode, RoceStreamValidator,
    StreamCounters,
};
use rand::Rng;
use tracing_test::traced_test;

fn write_frame(opcode: RoceOpcode, psn: u32, declared: Option<u32>, payload: &[u8]) -> Vec<u8> {
    build_frame(&FrameParams {
        opcode,
        pkey: 0xffff,
        psn,
        dest_qp: 0x10,
        ack_req: 0,
        reth: declared.map(|dma_length| Reth {
            va: 0x12341242,
            rkey: 0x234,
            dma_length,
        }),
        immdt: opcode.has_immdt().then_some(0xdeadbeef),
        payload,
    })
    .unwrap()
}

#[traced_test]
#[test]
fn libroce_check_golden_write_only_scenario() {
    // word + bitwise complement, 16 words / 64 bytes of payload
    let word: u32 = 0xa5a5_5a5a;
    let mut payload = Vec::with_capacity(64);
    for i in 0..16u32 {
        let w = if i % 2 == 0 { word } else { !word };
        payload.extend_from_slice(&w.to_be_bytes());
    }

    let frame = build_frame(&FrameParams {
        opcode: RoceOpcode::WriteOnly,
        pkey: 0xffff,
        psn: 136,
        dest_qp: 0x10,
        ack_req: 0,
        reth: Some(Reth {
            va: 0,
            rkey: 4143972420,
            dma_length: 64,
        }),
        immdt: None,
        payload: &payload,
    })
    .unwrap();

    // the trailer is the complemented CRC state, stored little endian
    let pkt = decode_roce_frame(&frame).unwrap().unwrap();
    let trailer = u32::from_le_bytes(frame[frame.len() - 4..].try_into().unwrap());
    assert_eq!(pkt.received_icrc, trailer);
    assert_eq!(pkt.computed_icrc, Some(trailer));
    assert_eq!(pkt.reth.unwrap().rkey, 4143972420);

    let counters = RoceStreamValidator::new(PsnMode::Expected(136)).run([&frame]);
    assert_eq!(
        counters,
        StreamCounters {
            icrc_errors: 0,
            psn_errors: 0,
            length_error: false,
            operation_complete: true,
        }
    );
}

#[traced_test]
#[test]
fn libroce_check_builder_against_etherparse() {
    let frame = write_frame(RoceOpcode::WriteOnly, 1, Some(16), &[0x42; 16]);
    let parsed = PacketHeaders::from_ethernet_slice(&frame).unwrap();

    let eth = parsed.link.unwrap();
    assert_eq!(eth.ether_type, 0x0800);
    assert_eq!(eth.destination, [0x02, 0x00, 0x0b, 0x01, 0xd4, 0x0a]);
    assert_eq!(eth.source, [0x02, 0x00, 0x0b, 0x01, 0xd4, 0x0b]);

    match parsed.ip {
        Some(Version4(ip, _)) => {
            assert_eq!(ip.protocol, 0x11);
            assert_eq!(ip.time_to_live, 64);
            assert_eq!(ip.source, [11, 1, 212, 11]);
            assert_eq!(ip.destination, [11, 1, 212, 10]);
        }
        other => panic!("expected an IPv4 header, got {other:?}"),
    }
    match parsed.transport {
        Some(Udp(udp)) => {
            assert_eq!(udp.destination_port, 4791);
            assert_eq!(udp.length as usize, 8 + 12 + 16 + 16 + 4);
        }
        other => panic!("expected a UDP header, got {other:?}"),
    }
}

#[traced_test]
#[test]
fn libroce_check_every_write_opcode_revalidates() {
    let payload = [0x77u8; 32];
    for opcode in [
        RoceOpcode::WriteFirst,
        RoceOpcode::WriteMiddle,
        RoceOpcode::WriteLast,
        RoceOpcode::WriteLastImm,
        RoceOpcode::WriteOnly,
        RoceOpcode::WriteOnlyImm,
    ] {
        let declared = opcode.has_reth().then_some(32);
        let frame = write_frame(opcode, 9, declared, &payload);
        let pkt = decode_roce_frame(&frame).unwrap().unwrap();
        assert_eq!(pkt.opcode, opcode);
        assert!(pkt.icrc_ok(), "bad ICRC for {}", opcode.name());
        assert_eq!(pkt.payload_size(), 32);
    }
}

#[traced_test]
#[test]
fn libroce_check_random_payload_round_trips() {
    let mut rng = rand::thread_rng();
    for _ in 0..32 {
        let words = rng.gen_range(1..64usize);
        let mut payload = vec![0u8; words * 4];
        rng.fill(payload.as_mut_slice());
        let psn = rng.gen::<u32>() & 0x00ff_ffff;
        let frame = write_frame(RoceOpcode::WriteOnly, psn, Some(payload.len() as u32), &payload);

        let counters = RoceStreamValidator::new(PsnMode::Expected(psn)).run([&frame]);
        assert_eq!(counters.icrc_errors, 0);
        assert_eq!(counters.psn_errors, 0);
        assert!(!counters.length_error);
        assert!(counters.operation_complete);
    }
}

#[traced_test]
#[test]
fn libroce_check_segmented_write_with_interleaved_noise() {
    let payload = [0u8; 32];
    let mut arp = write_frame(RoceOpcode::WriteMiddle, 999, None, &payload);
    arp[12..14].copy_from_slice(&0x0806u16.to_be_bytes());

    let frames = vec![
        arp, // ignored, leaves the session alone
        write_frame(RoceOpcode::WriteFirst, 100, Some(96), &payload),
        write_frame(RoceOpcode::WriteMiddle, 101, None, &payload),
        write_frame(RoceOpcode::WriteLast, 102, None, &payload),
    ];
    let counters = RoceStreamValidator::new(PsnMode::FollowFirstPacket).run(&frames);
    assert_eq!(
        counters,
        StreamCounters {
            icrc_errors: 0,
            psn_errors: 0,
            length_error: false,
            operation_complete: true,
        }
    );
}

#[traced_test]
#[test]
fn libroce_check_truncated_frame_does_not_abort_the_stream() {
    let payload = [0u8; 64];
    let good = write_frame(RoceOpcode::WriteOnly, 3, Some(64), &payload);
    let runt = good[..30].to_vec();

    let mut validator = RoceStreamValidator::new(PsnMode::FollowFirstPacket);
    assert!(validator.process_frame(&runt).is_err());
    assert_eq!(validator.counters(), StreamCounters::default());

    // batch mode skips the runt and still completes the operation
    let counters = RoceStreamValidator::new(PsnMode::FollowFirstPacket).run([&runt, &good]);
    assert_eq!(
        counters,
        StreamCounters {
            icrc_errors: 0,
            psn_errors: 0,
            length_error: false,
            operation_complete: true,
        }
    );
}

#[traced_test]
#[test]
fn libroce_check_corrupt_trailer_is_counted_and_logged() {
    let payload = [0u8; 16];
    let mut frame = write_frame(RoceOpcode::WriteOnly, 0, Some(16), &payload);
    let len = frame.len();
    frame[len - 1] ^= 0x01;

    let counters = RoceStreamValidator::new(PsnMode::FollowFirstPacket).run([&frame]);
    assert_eq!(counters.icrc_errors, 1);
    assert!(counters.operation_complete);
    assert!(logs_contain("ICRC mismatch"));
}

#[traced_test]
#[test]
fn libroce_check_random_bth_reth_round_trip() {
    let mut rng = rand::thread_rng();
    for _ in 0..256 {
        let bth = Bth {
            opcode: rng.gen(),
            pkey: rng.gen(),
            dest_qp: rng.gen::<u32>() & 0x00ff_ffff,
            ack_req: rng.gen(),
            psn: rng.gen::<u32>() & 0x00ff_ffff,
        };
        let mut buf = bytes::BytesMut::new();
        bth.encode_into(&mut buf);
        let (parsed, _) = Bth::decode(&buf).unwrap();
        assert_eq!(parsed, bth);

        let reth = Reth {
            va: rng.gen(),
            rkey: rng.gen(),
            dma_length: rng.gen(),
        };
        buf.clear();
        reth.encode_into(&mut buf);
        let (parsed, _) = Reth::decode(&buf).unwrap();
        assert_eq!(parsed, reth);
    }
}
