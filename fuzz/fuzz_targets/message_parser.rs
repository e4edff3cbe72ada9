//! Fuzz target for framing and IRC message parsing
//!
//! Feeds arbitrary bytes through the line buffer in two chunks and parses
//! every line that comes out. Nothing may panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use slirc_bot::colors::strip_formatting;
use slirc_bot::ctcp::Ctcp;
use slirc_bot::line::LineBuffer;
use slirc_bot::message::RawMessage;

fuzz_target!(|data: &[u8]| {
    let split = data.first().map_or(0, |&b| b as usize % (data.len() + 1));
    let (head, tail) = data.split_at(split);

    let mut buffer = LineBuffer::new();
    let lines = buffer.feed(head).into_iter().chain(buffer.feed(tail));
    for line in lines {
        if let Ok(msg) = RawMessage::parse(&line) {
            let body = msg.trailing();
            let _ = strip_formatting(body);
            let _ = Ctcp::parse(body);
        }
    }
});
