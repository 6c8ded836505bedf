//! Protocol Module Tests
//!
//! Validates the wire grammar against its exact byte encoding.
//!
//! ## Test Scopes
//! - **Escaping**: Single-layer escape/strip and unescaped-delimiter scans.
//! - **Encoding**: Exact serialized bytes for representative messages.
//! - **Round-trips**: Serialize/deserialize through payloads containing
//!   every special character.
//! - **Rejection**: Unknown kinds and malformed frames fail to decode.

#[cfg(test)]
mod tests {
    use crate::protocol::escape::{add_escapes, find_unescaped, strip_escapes, KEY_SPECIALS};
    use crate::protocol::{Message, Payload, ProtocolError};
    use crate::store::key::Key;

    // ============================================================
    // ESCAPING
    // ============================================================

    #[test]
    fn test_escape_is_identity_without_specials() {
        assert_eq!(add_escapes("127.0.0.1:5001", KEY_SPECIALS), "127.0.0.1:5001");
    }

    #[test]
    fn test_escape_strip_restores_original() {
        let original = "a b|c]d}e\\f\ng";
        let escaped = add_escapes(original, KEY_SPECIALS);
        assert_ne!(escaped, original);
        assert_eq!(strip_escapes(&escaped), original);
    }

    #[test]
    fn test_strip_removes_exactly_one_layer() {
        // Double-escaped backslash: one strip leaves one escape pair.
        let twice = add_escapes(&add_escapes("\\", KEY_SPECIALS), KEY_SPECIALS);
        assert_eq!(twice, "\\\\\\\\");
        assert_eq!(strip_escapes(&twice), "\\\\");
        assert_eq!(strip_escapes(&strip_escapes(&twice)), "\\");
    }

    #[test]
    fn test_find_unescaped_skips_escaped_delimiters() {
        // "a\ b c" - the first space is escaped.
        let input = "a\\ b c";
        assert_eq!(find_unescaped(input, ' '), Some(4));
        assert_eq!(find_unescaped("abc", ' '), None);
    }

    // ============================================================
    // EXACT BYTES
    // ============================================================

    #[test]
    fn test_register_exact_bytes() {
        let msg = Message::register("127.0.0.1");
        assert_eq!(msg.serialize(), "Register -2 -1 {127.0.0.1}\n");
    }

    #[test]
    fn test_directory_exact_bytes() {
        let msg = Message::directory(1, vec!["10.0.0.1:5001".into(), "10.0.0.2:5002".into()]);
        assert_eq!(
            msg.serialize(),
            "Directory -1 1 {2 [10.0.0.1:5001 10.0.0.2:5002]}\n"
        );
    }

    #[test]
    fn test_put_exact_bytes() {
        let msg = Message::put(0, Key::new("color", 1), "\"red\"".to_string());
        assert_eq!(msg.serialize(), "Put 0 1 {color 1|\"red\"}\n");
    }

    #[test]
    fn test_kill_exact_bytes() {
        assert_eq!(Message::kill(-1, 2).serialize(), "Kill -1 2 {}\n");
    }

    // ============================================================
    // ROUND-TRIPS
    // ============================================================

    fn roundtrip(msg: Message) -> Message {
        Message::deserialize(&msg.serialize()).expect("frame should decode")
    }

    #[test]
    fn test_register_roundtrip() {
        let msg = Message::register("192.168.1.7:6000");
        assert_eq!(roundtrip(msg.clone()), msg);
    }

    #[test]
    fn test_directory_roundtrip_empty() {
        let msg = Message::directory(0, vec![]);
        assert_eq!(msg.serialize(), "Directory -1 0 {0 []}\n");
        assert_eq!(roundtrip(msg.clone()), msg);
    }

    #[test]
    fn test_handshake_kinds_roundtrip() {
        for msg in [Message::open(2), Message::connect(0), Message::greeting(1, 3)] {
            assert_eq!(roundtrip(msg.clone()), msg);
        }
    }

    #[test]
    fn test_put_roundtrip_with_special_value() {
        // Value text containing the terminator, the escape char and a brace.
        let msg = Message::put(2, Key::new("log", 0), "line1\nline2\\{x}".to_string());
        assert_eq!(roundtrip(msg.clone()), msg);
    }

    #[test]
    fn test_get_roundtrip_with_special_label() {
        let msg = Message::get(0, Key::new("a b|c]d}e", 1));
        assert_eq!(roundtrip(msg.clone()), msg);
    }

    #[test]
    fn test_wait_get_roundtrip() {
        let msg = Message::wait_get(3, Key::new("pending", 0));
        assert_eq!(roundtrip(msg.clone()), msg);
    }

    #[test]
    fn test_get_reply_roundtrip_empty_value() {
        // An empty value text is the absent-key reply.
        let msg = Message::get_reply(0, Key::new("missing", 1), String::new());
        assert_eq!(roundtrip(msg.clone()), msg);
    }

    #[test]
    fn test_text_roundtrip_with_specials() {
        let msg = Message::text(0, 1, "hello}\n\\world");
        assert_eq!(roundtrip(msg.clone()), msg);
    }

    #[test]
    fn test_kill_roundtrip() {
        let msg = Message::kill(2, -1);
        assert_eq!(roundtrip(msg.clone()), msg);
    }

    #[test]
    fn test_deserialize_without_trailing_terminator() {
        let msg = Message::deserialize("Get 0 1 {color 1}").unwrap();
        assert_eq!(msg.payload, Payload::Get { key: Key::new("color", 1) });
    }

    // ============================================================
    // REJECTION
    // ============================================================

    #[test]
    fn test_unknown_kind_rejected() {
        let err = Message::deserialize("Bogus 0 1 {}\n").unwrap_err();
        assert_eq!(err, ProtocolError::UnknownKind("Bogus".to_string()));
    }

    #[test]
    fn test_missing_brace_rejected() {
        let err = Message::deserialize("Kill 0 1 \n").unwrap_err();
        assert_eq!(err, ProtocolError::MissingDelimiter('{'));
    }

    #[test]
    fn test_bad_index_rejected() {
        let err = Message::deserialize("Kill zero 1 {}\n").unwrap_err();
        assert_eq!(err, ProtocolError::BadIndex("zero".to_string()));
    }

    #[test]
    fn test_negative_key_owner_rejected() {
        let err = Message::deserialize("Get 0 1 {color -1}\n").unwrap_err();
        assert_eq!(err, ProtocolError::NegativeOwner(-1));
    }

    #[test]
    fn test_bad_directory_count_rejected() {
        let err = Message::deserialize("Directory -1 0 {two [a b]}\n").unwrap_err();
        assert_eq!(err, ProtocolError::BadCount("two".to_string()));
    }
}
