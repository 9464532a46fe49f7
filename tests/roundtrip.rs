//! End-to-end build/encrypt/process checks against the public `quiche_wire`
//! API, as opposed to the crate-internal unit tests in `src/framer.rs`.

use std::cell::RefCell;
use std::rc::Rc;

use bytes::Bytes;

use quiche_wire::crypto::{EncryptionLevel, NullDecrypter, NullEncrypter};
use quiche_wire::frame::{AckFrame, Frame, ReceivedPacketInfo, RstStreamErrorCode, RstStreamFrame, SentPacketInfo, StreamFrame};
use quiche_wire::framer::Framer;
use quiche_wire::packet::{PacketHeader, PacketPublicHeader};
use quiche_wire::visitor::FrameVisitor;
use quiche_wire::wire::SequenceNumberLength;

fn wired_framer(is_server: bool) -> Framer {
    let mut framer = Framer::new(1, is_server);
    framer.cryptor_mut().set_encrypter(EncryptionLevel::None, Box::new(NullEncrypter));
    framer.cryptor_mut().set_decrypter(Box::new(NullDecrypter));
    framer
}

#[test]
fn multiple_frames_in_one_packet_all_reach_the_visitor() {
    let mut sender = wired_framer(false);
    let mut receiver = wired_framer(true);

    let header = PacketHeader::new(PacketPublicHeader::new(0xABCD, SequenceNumberLength::Two), 1);
    let frames = vec![
        Frame::Stream(StreamFrame { stream_id: 3, offset: 0, fin: false, data: Bytes::from_static(b"hello") }),
        Frame::RstStream(RstStreamFrame {
            stream_id: 3,
            error_code: RstStreamErrorCode::NoError,
            error_details: "done".to_string(),
        }),
        Frame::Padding,
    ];

    let (packet, _entropy) = sender.build_data_packet(&header, &frames).unwrap();
    let encrypted = sender.encrypt_packet(EncryptionLevel::None, 1, &header, &packet, None).unwrap();

    let seen_stream = Rc::new(RefCell::new(Vec::new()));
    let seen_rst = Rc::new(RefCell::new(Vec::new()));
    let seen_stream_clone = seen_stream.clone();
    let seen_rst_clone = seen_rst.clone();

    let mut visitor = FrameVisitor::noop();
    visitor.on_stream_frame = Box::new(move |f| {
        seen_stream_clone.borrow_mut().push(f.clone());
        true
    });
    visitor.on_rst_stream_frame = Box::new(move |f| {
        seen_rst_clone.borrow_mut().push(f.clone());
        true
    });

    receiver.process_packet(&encrypted, &mut visitor).unwrap();

    assert_eq!(seen_stream.borrow().len(), 1);
    assert_eq!(seen_stream.borrow()[0].data, Bytes::from_static(b"hello"));
    assert_eq!(seen_rst.borrow().len(), 1);
    assert_eq!(seen_rst.borrow()[0].error_details, "done");
}

#[test]
fn ack_frame_survives_truncation_round_trip() {
    let mut sender = wired_framer(false);
    let mut receiver = wired_framer(true);

    let header = PacketHeader::new(PacketPublicHeader::new(7, SequenceNumberLength::One), 1);
    let ack = AckFrame {
        sent: SentPacketInfo { entropy_hash: 0, least_unacked: 1 },
        received: ReceivedPacketInfo { entropy_hash: 0, largest_observed: 1, delta_time_largest_observed_us: None, missing_packets: Default::default() },
    };
    let frames = vec![Frame::Ack(ack.clone())];

    let (packet, _entropy) = sender.build_data_packet(&header, &frames).unwrap();
    let encrypted = sender.encrypt_packet(EncryptionLevel::None, 1, &header, &packet, None).unwrap();

    let seen = Rc::new(RefCell::new(None));
    let seen_clone = seen.clone();
    let mut visitor = FrameVisitor::noop();
    visitor.on_ack_frame = Box::new(move |f| {
        *seen_clone.borrow_mut() = Some(f.clone());
        true
    });

    receiver.process_packet(&encrypted, &mut visitor).unwrap();
    assert_eq!(seen.borrow().as_ref().unwrap().received.largest_observed, 1);
}

#[test]
fn veto_from_on_packet_header_stops_frame_dispatch() {
    let mut sender = wired_framer(false);
    let mut receiver = wired_framer(true);

    let header = PacketHeader::new(PacketPublicHeader::new(7, SequenceNumberLength::One), 1);
    let frames = vec![Frame::Stream(StreamFrame { stream_id: 1, offset: 0, fin: false, data: Bytes::from_static(b"x") })];
    let (packet, _entropy) = sender.build_data_packet(&header, &frames).unwrap();
    let encrypted = sender.encrypt_packet(EncryptionLevel::None, 1, &header, &packet, None).unwrap();

    let mut visitor = FrameVisitor::noop();
    visitor.on_packet_header = Box::new(|_| false);
    visitor.on_stream_frame = Box::new(|_| panic!("frame dispatch should not run after a header veto"));

    receiver.process_packet(&encrypted, &mut visitor).unwrap();
}

#[test]
fn decryption_failure_is_reported_and_propagated() {
    let mut sender = wired_framer(false);
    let mut receiver = wired_framer(true);

    let header = PacketHeader::new(PacketPublicHeader::new(7, SequenceNumberLength::One), 1);
    let (packet, _entropy) = sender.build_data_packet(&header, &[Frame::Padding]).unwrap();
    let mut encrypted = sender.encrypt_packet(EncryptionLevel::None, 1, &header, &packet, None).unwrap().to_vec();
    *encrypted.last_mut().unwrap() ^= 0xFF;

    let errors = Rc::new(RefCell::new(Vec::new()));
    let errors_clone = errors.clone();
    let mut visitor = FrameVisitor::noop();
    visitor.on_error = Box::new(move |code, detail| errors_clone.borrow_mut().push((code, detail.to_string())));

    assert!(receiver.process_packet(&encrypted, &mut visitor).is_err());
    assert_eq!(errors.borrow().len(), 1);
}
