use crate::helpers::websocket_accept_key;
use crate::websocket::{Frame, FrameOpcode};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

#[test]
fn frames_map_from_codec_messages() {
    let frame = Frame::from_message(&Message::Text("hello".to_string())).unwrap();
    assert_eq!(frame.opcode, FrameOpcode::Text);
    assert_eq!(frame.as_text().unwrap(), "hello");
    assert!(frame.fin);

    let frame = Frame::from_message(&Message::Binary(vec![1, 2, 3])).unwrap();
    assert_eq!(frame.opcode, FrameOpcode::Binary);
    assert_eq!(&frame.payload[..], &[1, 2, 3]);

    let frame = Frame::from_message(&Message::Ping(Vec::new())).unwrap();
    assert_eq!(frame.opcode, FrameOpcode::Ping);

    let frame = Frame::from_message(&Message::Close(Some(CloseFrame {
        code: CloseCode::Normal,
        reason: "bye".into(),
    })))
    .unwrap();
    assert_eq!(frame.opcode, FrameOpcode::Close);
    assert_eq!(frame.as_text().unwrap(), "bye");
}

#[test]
fn frames_map_back_to_codec_messages() {
    assert!(matches!(
        Frame::text("x").into_message(),
        Message::Text(text) if text == "x"
    ));
    assert!(matches!(
        Frame::binary(vec![9]).into_message(),
        Message::Binary(bytes) if bytes == vec![9]
    ));
}

#[test]
fn opcode_names_are_lowercase() {
    assert_eq!(FrameOpcode::Text.to_string(), "text");
    assert_eq!(FrameOpcode::Binary.to_string(), "binary");
    assert_eq!(FrameOpcode::Close.to_string(), "close");
    assert_eq!(FrameOpcode::Continuation.to_string(), "continuation");
}

#[test]
fn accept_key_follows_the_handshake_rfc() {
    // The worked example from RFC 6455 section 1.3.
    assert_eq!(
        websocket_accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
        "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
    );
}
