//! Integration Test: Transport Confinement
//!
//! **Policy**: only `shellwire/core/src/transport/` speaks WebSocket.
//! Sessions and the CLI see decoded `Frame`s and `Channel`s; channel tag
//! bytes and raw messages never leak out of the transport layer.

use architectural_enforcement::{all_production_lines, report};

const TRANSPORT_DIR: &str = "shellwire/core/src/transport/";

const WIRE_ONLY: &[&str] = &[
    "tungstenite",
    "Message::Binary",
    "Message::Text",
    "Message::Close",
    "Message::Ping",
    "encode_binary",
    "decode_binary",
    "from_tag(",
    ".tag()",
];

#[test]
fn test_wire_details_stay_in_transport() {
    let violations: Vec<String> = all_production_lines()
        .iter()
        .filter(|line| !line.location().starts_with(TRANSPORT_DIR))
        .filter(|line| WIRE_ONLY.iter().any(|pattern| line.code.contains(pattern)))
        .map(|line| format!("{} - {}", line.location(), line.text.trim()))
        .collect();

    assert!(
        violations.is_empty(),
        "{}",
        report("Wire details outside the transport module", &violations)
    );
}

const CODEC_FILE: &str = "shellwire/core/src/transport/frame.rs";

const TAG_LITERALS: &[&str] = &["0x01", "0x02", "0x03", "0x04", "\\x01", "\\x02", "\\x03", "\\x04"];

#[test]
fn test_channel_tag_literals_only_in_codec() {
    let violations: Vec<String> = all_production_lines()
        .iter()
        .filter(|line| !line.location().starts_with(CODEC_FILE))
        .filter(|line| TAG_LITERALS.iter().any(|tag| line.code.contains(tag)))
        .map(|line| format!("{} - {}", line.location(), line.text.trim()))
        .collect();

    assert!(
        violations.is_empty(),
        "{}",
        report("Channel tag literals outside the frame codec", &violations)
    );
}
