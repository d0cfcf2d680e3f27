//! Line framing over async streams.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use bidcos_engine::config::TransportConfig;
use bidcos_engine::core::address::Address;
use bidcos_engine::core::codec::BidCoSCodec;
use bidcos_engine::core::packet::{Packet, PacketBuilder, ParseWarning};
use futures::{SinkExt, StreamExt};
use tokio_util::codec::{FramedRead, FramedWrite};

const STICK_OUTPUT: &[u8] = b"V 1.61 CUL868\r\n\
A0D1AA0011D8A4C200A1B01050000\r\n\
A0A1B80021D8A4C200A1B00\r\n\
\r\n\
A0F1AA0011D8A4C200A1B0105\r\n";

#[tokio::test]
async fn test_framed_read_yields_packets_and_warnings() {
    let mut frames = FramedRead::new(STICK_OUTPUT, BidCoSCodec::default());

    let config = frames.next().await.unwrap().unwrap();
    assert!(config.is_clean());
    assert_eq!(config.value.message_type(), 0x01);
    assert_eq!(config.value.sender(), Address::new(0x1D8A4C));

    let ack = frames.next().await.unwrap().unwrap();
    assert!(ack.is_clean());
    assert_eq!(ack.value.control_byte(), 0x80);
    assert!(!ack.value.expects_response());

    let truncated = frames.next().await.unwrap().unwrap();
    assert_eq!(
        truncated.warnings,
        vec![ParseWarning::Truncated {
            declared: 0x0F,
            available: 2
        }]
    );

    assert!(frames.next().await.is_none());
}

#[tokio::test]
async fn test_stream_ending_without_newline() {
    let mut frames = FramedRead::new(
        &b"A0D1AA0011D8A4C200A1B01050000\r\nA0A1B80021D8A4C200A1B00"[..],
        BidCoSCodec::default(),
    );

    let config = frames.next().await.unwrap().unwrap();
    assert_eq!(config.value.message_type(), 0x01);
    let ack = frames.next().await.unwrap().unwrap();
    assert!(ack.is_clean());
    assert_eq!(ack.value.message_counter(), 0x1B);
    assert!(frames.next().await.is_none());
}

#[tokio::test]
async fn test_bare_hex_lines_without_prefix() {
    let codec = BidCoSCodec::from_config(&TransportConfig {
        frame_prefix: None,
        send_prefix: String::new(),
    });
    let mut frames = FramedRead::new(&b"0A1B80021D8A4C200A1B00\n"[..], codec);
    let ack = frames.next().await.unwrap().unwrap();
    assert!(ack.is_clean());
    assert_eq!(ack.value.serialize(), "0A1B80021D8A4C200A1B00");
}

#[tokio::test]
async fn test_framed_write_roundtrip() {
    let mut builder = PacketBuilder::new(0x01)
        .message_counter(0x2C)
        .control_byte(0xA0)
        .sender(Address::new(0x1D8A4C))
        .destination(Address::new(0x200A1B));
    builder.set_position(9.0, 1.0, &[0x01]).unwrap();
    builder.set_position(10.0, 1.0, &[0x08]).unwrap();
    let packet = builder.build();

    let mut sink = FramedWrite::new(Vec::new(), BidCoSCodec::default());
    sink.send(&packet).await.unwrap();
    sink.send(packet.clone()).await.unwrap();
    let written = sink.into_inner();
    assert_eq!(
        written,
        b"As0B2CA0011D8A4C200A1B0108\r\nAs0B2CA0011D8A4C200A1B0108\r\n".to_vec()
    );

    // the stick echoes with the receive prefix
    let echoed = String::from_utf8(written).unwrap().replace("As", "A");
    let frames = FramedRead::new(echoed.as_bytes(), BidCoSCodec::default());
    let decoded: Vec<Packet> = frames
        .map(|frame| frame.unwrap().into_inner())
        .collect()
        .await;
    assert_eq!(decoded, vec![packet.clone(), packet]);
}
