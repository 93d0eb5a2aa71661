use super::*;

fn prim(s: &str) -> StreamToken {
    StreamToken::Primitive(Scalar::String(s.to_string()))
}

fn int(n: i64) -> StreamToken {
    StreamToken::Primitive(Scalar::Int(n))
}

fn page(chunks: &[&str]) -> String {
    chunks
        .iter()
        .map(|c| {
            let escaped = c.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n");
            format!("<script>window.__reactRouterContext.streamController.enqueue(\"{escaped}\");</script>\n")
        })
        .collect()
}

#[test]
fn decodes_flat_root_with_reference() {
    let tokens = decode_stream(r#"["hello",["$1",200]]"#).unwrap();
    assert_eq!(
        tokens,
        vec![
            StreamToken::ArrayOpen,
            prim("hello"),
            StreamToken::ArrayOpen,
            StreamToken::Reference(0),
            int(200),
            StreamToken::ArrayClose,
            StreamToken::ArrayClose,
        ]
    );
}

#[test]
fn objects_emit_keys_before_values() {
    let tokens = decode_stream(r#"[{"price":"£450,000","n":1.5}]"#).unwrap();
    assert_eq!(
        tokens,
        vec![
            StreamToken::ArrayOpen,
            StreamToken::ObjectOpen,
            StreamToken::Key("price".to_string()),
            prim("£450,000"),
            StreamToken::Key("n".to_string()),
            StreamToken::Primitive(Scalar::Float(1.5)),
            StreamToken::ObjectClose,
            StreamToken::ArrayClose,
        ]
    );
}

#[test]
fn markers_are_interpreted_in_value_position_only() {
    let tokens = decode_stream(r#"[{"$1":"$$1"},"$u","$Eboom"]"#).unwrap();
    assert_eq!(
        tokens,
        vec![
            StreamToken::ArrayOpen,
            StreamToken::ObjectOpen,
            StreamToken::Key("$1".to_string()),
            prim("$1"),
            StreamToken::ObjectClose,
            StreamToken::Primitive(Scalar::Null),
            StreamToken::Error("boom".to_string()),
            StreamToken::ArrayClose,
        ]
    );
}

#[test]
fn unknown_markers_fail() {
    for marker in ["$0", "$x", "$", "$1a"] {
        let stream = format!(r#"["{marker}"]"#);
        assert!(
            matches!(
                decode_stream(&stream),
                Err(DecodeError::UnknownMarker { offset: 1, .. })
            ),
            "marker {marker:?} should be rejected"
        );
    }
}

#[test]
fn numbers_split_into_int_and_float() {
    let tokens = decode_stream("[1,-2,3.0,4e2,9223372036854775808]").unwrap();
    assert_eq!(
        tokens[1..6],
        [
            int(1),
            int(-2),
            StreamToken::Primitive(Scalar::Float(3.0)),
            StreamToken::Primitive(Scalar::Float(400.0)),
            StreamToken::Primitive(Scalar::Float(9_223_372_036_854_775_808.0)),
        ]
    );
}

#[test]
fn json_string_escapes() {
    let tokens = decode_stream(r#"["a\"b\\c£🏠\n"]"#).unwrap();
    assert_eq!(tokens[1], prim("a\"b\\c£\u{1F3E0}\n"));
}

#[test]
fn unicode_escape_needs_four_hex_digits() {
    assert_eq!(decode_stream(r#"["\u00a3"]"#).unwrap()[1], prim("£"));
    for bad in [r#"["\u+123"]"#, r#"["\u-123"]"#, r#"["\u12g4"]"#, r#"["\u 123"]"#] {
        assert!(
            matches!(decode_stream(bad), Err(DecodeError::MalformedChunk { .. })),
            "{bad} should be malformed"
        );
    }
}

#[test]
fn deferred_frames_are_skipped() {
    let tokens = decode_stream("[1]\nP12:[\"$1\",{\"a\":2}]\nP13:{}\n").unwrap();
    assert_eq!(
        tokens,
        vec![StreamToken::ArrayOpen, int(1), StreamToken::ArrayClose]
    );
}

#[test]
fn invalid_deferred_frame_is_malformed() {
    assert!(matches!(
        decode_stream("[1]\nP12:[1,"),
        Err(DecodeError::MalformedChunk { offset: 4, .. })
    ));
}

#[test]
fn trailing_garbage_is_malformed() {
    assert!(matches!(
        decode_stream("[1] [2]"),
        Err(DecodeError::MalformedChunk { offset: 4, .. })
    ));
}

#[test]
fn root_must_be_an_array() {
    assert!(matches!(
        decode_stream(r#"{"a":1}"#),
        Err(DecodeError::MalformedChunk { offset: 0, .. })
    ));
    assert!(matches!(
        decode_stream("   "),
        Err(DecodeError::MalformedChunk { .. })
    ));
}

#[test]
fn truncated_structures_are_unterminated() {
    for stream in [r#"["a","#, r#"[{"a":1"#, r#"["abc"#, "[tr", "[[1]"] {
        assert!(
            matches!(
                decode_stream(stream),
                Err(DecodeError::UnterminatedStructure { .. })
            ),
            "{stream:?} should be unterminated"
        );
    }
}

#[test]
fn nesting_limit_is_enforced() {
    let ok = format!("{}{}", "[".repeat(MAX_DEPTH), "]".repeat(MAX_DEPTH));
    assert!(decode_stream(&ok).is_ok());

    let deep = format!("{}{}", "[".repeat(MAX_DEPTH + 1), "]".repeat(MAX_DEPTH + 1));
    assert!(matches!(
        decode_stream(&deep),
        Err(DecodeError::MalformedChunk { .. })
    ));
}

#[test]
fn decode_reads_enqueued_payloads() {
    let html = page(&["[\"hello\",", "[\"$1\",200]]\n"]);
    let tokens = decode(&html).unwrap();
    assert_eq!(tokens, decode_stream(r#"["hello",["$1",200]]"#).unwrap());
}

#[test]
fn split_at_any_character_decodes_identically() {
    let stream = "[\"hello\",[\"$1\",200],{\"price\":\"£450,000\",\"date_sold\":\"04 Nov 2023\",\"n\":-1.25e1}]\nP1:{\"x\":[1]}\n";
    let expected = decode_stream(stream).unwrap();
    let boundaries: Vec<usize> = stream
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(stream.len()))
        .collect();
    for split in boundaries {
        let (head, tail) = stream.split_at(split);
        let html = page(&[head, tail]);
        assert_eq!(
            decode(&html).unwrap(),
            expected,
            "split at byte {split} changed the decoding"
        );
    }
}

#[test]
fn page_without_stream_is_malformed() {
    assert!(matches!(
        decode("<html><h1>1 Example St</h1></html>"),
        Err(DecodeError::MalformedChunk { .. })
    ));
}
