//! Benchmarks for the inbound path: framing, parsing and body cleanup.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use slirc_bot::colors::strip_formatting;
use slirc_bot::line::LineBuffer;
use slirc_bot::message::RawMessage;
use slirc_bot::protocol::config::IrcConfig;
use slirc_bot::state::IrcMachine;

/// Simple PING message
const SIMPLE_MESSAGE: &str = "PING :irc.example.com";

/// Message with source
const SOURCE_MESSAGE: &str = ":nick!user@host PRIVMSG #channel :Hello, world!";

/// Message with IRCv3 tags
const TAGGED_MESSAGE: &str = "@time=2023-01-01T00:00:00.000Z;msgid=abc123;+example/tag=value \
                              :nick!user@host PRIVMSG #channel :Hello with tags!";

/// Complex message with escaped tags
const COMPLEX_TAGS: &str = "@time=2023-01-01T12:00:00Z;msgid=msg-12345;+draft/reply=parent\\sid;\
                            batch=batch001;account=username \
                            :nick!user@host.example.com PRIVMSG #long-channel-name \
                            :This is a longer message with more content to parse";

/// Numeric response
const NUMERIC_RESPONSE: &str =
    ":irc.server.net 001 nickname :Welcome to the IRC Network nickname!user@host";

/// Heavily formatted body
const FORMATTED: &str = "\x02\x0304,01alert\x0f: \x1dsomething\x1d happened \
                         \x0312\x1fhere\x1f\x03 and \x04ff8800there\x04";

fn benchmark_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("Message Parsing");

    for (name, line) in [
        ("simple_ping", SIMPLE_MESSAGE),
        ("with_source", SOURCE_MESSAGE),
        ("with_tags", TAGGED_MESSAGE),
        ("complex_tags", COMPLEX_TAGS),
        ("numeric_response", NUMERIC_RESPONSE),
    ] {
        group.bench_function(name, |b| {
            b.iter(|| {
                let msg = RawMessage::parse(black_box(line)).unwrap();
                black_box(msg)
            })
        });
    }

    group.finish();
}

fn benchmark_framing(c: &mut Criterion) {
    let mut group = c.benchmark_group("Line Framing");

    let lines = [
        SIMPLE_MESSAGE,
        SOURCE_MESSAGE,
        TAGGED_MESSAGE,
        COMPLEX_TAGS,
        NUMERIC_RESPONSE,
    ];
    let stream: Vec<u8> = lines
        .iter()
        .cycle()
        .take(100)
        .flat_map(|line| line.bytes().chain(*b"\r\n"))
        .collect();

    for chunk in [1usize, 64, 1024, stream.len()] {
        group.bench_with_input(BenchmarkId::new("chunk", chunk), &chunk, |b, &chunk| {
            b.iter(|| {
                let mut buffer = LineBuffer::new();
                let mut lines = 0;
                for piece in stream.chunks(chunk) {
                    lines += buffer.feed(black_box(piece)).len();
                }
                black_box(lines)
            })
        });
    }

    group.finish();
}

fn benchmark_session(c: &mut Criterion) {
    let mut group = c.benchmark_group("Session");

    let mut machine = IrcMachine::new(IrcConfig::new("nickname"));
    let _ = machine.start();
    for line in [
        ":irc.server.net CAP * LS :message-tags",
        ":irc.server.net CAP nickname ACK :message-tags",
        ":irc.server.net 376 nickname :End of /MOTD command.",
    ] {
        let _ = machine.feed(&RawMessage::parse(line).unwrap());
    }
    let privmsg = RawMessage::parse(TAGGED_MESSAGE).unwrap();

    group.bench_function("privmsg_to_chat_message", |b| {
        b.iter(|| black_box(machine.feed(black_box(&privmsg))))
    });

    group.bench_function("strip_formatting", |b| {
        b.iter(|| black_box(strip_formatting(black_box(FORMATTED))))
    });

    group.finish();
}

criterion_group!(benches, benchmark_parsing, benchmark_framing, benchmark_session);
criterion_main!(benches);
