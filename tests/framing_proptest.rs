//! Property-based tests for line framing and parsing.
//!
//! Verifies that:
//! 1. Splitting a byte stream at arbitrary points yields the same lines
//! 2. Empty lines never surface
//! 3. The parser and the formatting stripper never panic on random input

use proptest::prelude::*;
use slirc_bot::colors::strip_formatting;
use slirc_bot::line::LineBuffer;
use slirc_bot::message::RawMessage;

/// A line body without terminator bytes.
fn line_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[^\r\n]{1,200}").expect("valid regex")
}

fn lines_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(line_strategy(), 0..20)
}

fn stream(lines: &[String]) -> Vec<u8> {
    lines
        .iter()
        .flat_map(|line| line.bytes().chain(*b"\r\n"))
        .collect()
}

fn feed_in_chunks(data: &[u8], cuts: &[usize]) -> Vec<String> {
    let mut buffer = LineBuffer::new();
    let mut out = Vec::new();
    let mut start = 0;
    let mut points: Vec<usize> = cuts.iter().map(|c| c % (data.len() + 1)).collect();
    points.sort_unstable();
    for point in points.into_iter().chain(std::iter::once(data.len())) {
        out.extend(buffer.feed(&data[start..point.max(start)]));
        start = point.max(start);
    }
    out
}

proptest! {
    #[test]
    fn chunking_does_not_change_lines(
        lines in lines_strategy(),
        cuts in prop::collection::vec(any::<usize>(), 0..16),
    ) {
        let data = stream(&lines);
        prop_assert_eq!(feed_in_chunks(&data, &cuts), lines);
    }

    #[test]
    fn byte_at_a_time_matches_whole(lines in lines_strategy()) {
        let data = stream(&lines);
        let mut buffer = LineBuffer::new();
        let mut out = Vec::new();
        for byte in &data {
            out.extend(buffer.feed(std::slice::from_ref(byte)));
        }
        prop_assert_eq!(buffer.pending(), 0);
        prop_assert_eq!(out, lines);
    }

    #[test]
    fn blank_lines_are_skipped(lines in lines_strategy(), blanks in 1usize..5) {
        let mut data = Vec::new();
        for line in &lines {
            data.extend(std::iter::repeat(*b"\r\n").take(blanks).flatten());
            data.extend_from_slice(line.as_bytes());
            data.extend_from_slice(b"\r\n");
        }
        let mut buffer = LineBuffer::new();
        prop_assert_eq!(buffer.feed(&data), lines);
    }

    #[test]
    fn trailing_partial_stays_buffered(lines in lines_strategy(), tail in line_strategy()) {
        let mut data = stream(&lines);
        data.extend_from_slice(tail.as_bytes());
        let mut buffer = LineBuffer::new();
        prop_assert_eq!(buffer.feed(&data), lines);
        prop_assert_eq!(buffer.pending(), tail.len());
        prop_assert_eq!(buffer.feed(b"\r\n"), vec![tail]);
    }

    #[test]
    fn parse_never_panics(line in "[^\r\n]{0,300}") {
        let _ = RawMessage::parse(&line);
    }

    #[test]
    fn parsed_trailing_is_last_parameter(
        command in "[A-Z]{3,10}",
        middle in prop::collection::vec("[a-z#][a-z0-9]{0,8}", 0..5),
        trailing in "[^\r\n\0]{0,100}",
    ) {
        let mut line = command.clone();
        for param in &middle {
            line.push(' ');
            line.push_str(param);
        }
        line.push_str(" :");
        line.push_str(&trailing);

        let msg = RawMessage::parse(&line).unwrap();
        prop_assert_eq!(&msg.command, &command);
        prop_assert_eq!(&msg.parameters[..middle.len()], &middle[..]);
        prop_assert_eq!(msg.trailing(), trailing.as_str());
        prop_assert!(msg.last_parameter_is_trailing);
    }

    #[test]
    fn stripping_removes_control_bytes(text in any::<String>()) {
        let stripped = strip_formatting(&text);
        prop_assert!(stripped.bytes().all(|b| b >= 0x20));
    }
}

#[test]
fn test_only_terminators_yield_nothing() {
    let mut buffer = LineBuffer::new();
    assert!(buffer.feed(b"\r\n\r\n").is_empty());
    assert_eq!(buffer.pending(), 0);
}

#[test]
fn test_split_terminator() {
    let mut buffer = LineBuffer::new();
    assert!(buffer.feed(b"PING :a\r").is_empty());
    assert_eq!(buffer.feed(b"\nPING :b\r\n"), vec!["PING :a", "PING :b"]);
}
