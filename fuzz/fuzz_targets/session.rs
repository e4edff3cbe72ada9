//! Fuzz target for the session state machine
//!
//! Every parsable line is fed to a machine that has just connected. Any
//! outbound line it produces must stay a single line free of NUL.

#![no_main]

use libfuzzer_sys::fuzz_target;
use slirc_bot::line::LineBuffer;
use slirc_bot::message::RawMessage;
use slirc_bot::protocol::config::IrcConfig;
use slirc_bot::state::{Action, IrcMachine};

fuzz_target!(|data: &[u8]| {
    let mut machine = IrcMachine::new(IrcConfig::new("fuzzbot"));
    let _ = machine.start();

    let mut buffer = LineBuffer::new();
    for line in buffer.feed(data) {
        let Ok(msg) = RawMessage::parse(&line) else {
            continue;
        };
        for action in machine.feed(&msg) {
            if let Action::Send(out) = action {
                assert!(!out.contains(['\r', '\n', '\0']), "unsafe outbound line: {out:?}");
            }
        }
    }
});
