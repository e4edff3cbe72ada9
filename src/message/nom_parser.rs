//! Nom-based tokenizer for the head of an IRC line.
//!
//! The head is everything before the trailing parameter marker. It is made of
//! an optional tags token, an optional source token, the command and the
//! middle parameters, all separated by runs of spaces.

use nom::{
    bytes::complete::{take_till, take_till1, take_while, take_while1},
    character::complete::char,
    combinator::opt,
    error::{context, VerboseError},
    multi::many0,
    sequence::{preceded, terminated},
    IResult,
};

type ParseResult<I, O> = IResult<I, O, VerboseError<I>>;

fn spaces0(input: &str) -> ParseResult<&str, &str> {
    take_while(|c| c == ' ')(input)
}

fn spaces1(input: &str) -> ParseResult<&str, &str> {
    take_while1(|c| c == ' ')(input)
}

/// IRCv3 message tags (the part after `@` and before the first space).
fn parse_tags(input: &str) -> ParseResult<&str, &str> {
    context(
        "parsing IRCv3 message tags",
        preceded(char('@'), take_till(|c| c == ' ')),
    )(input)
}

/// Message source (the part after `:` and before the first space).
fn parse_source(input: &str) -> ParseResult<&str, &str> {
    context(
        "parsing message source",
        preceded(char(':'), take_till(|c| c == ' ')),
    )(input)
}

fn parse_command(input: &str) -> ParseResult<&str, &str> {
    context(
        "parsing IRC command",
        take_while1(|c: char| c.is_ascii_alphanumeric()),
    )(input)
}

fn parse_middle(input: &str) -> ParseResult<&str, &str> {
    take_till1(|c| c == ' ')(input)
}

/// Tokenized head of a line. Slices borrow from the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Head<'a> {
    /// Raw tags string without the leading `@`.
    pub tags: Option<&'a str>,
    /// Raw source string without the leading `:`.
    pub source: Option<&'a str>,
    /// Command token as it appeared on the wire.
    pub command: &'a str,
    /// Middle parameters in order.
    pub params: Vec<&'a str>,
    /// Input left over after the parameters (non-empty means the command
    /// token contained characters a command may not have).
    pub rest: &'a str,
}

/// Tokenize a line head.
///
/// ```text
/// [@tags] [:source] <command> [params...]
/// ```
pub fn parse_head(input: &str) -> ParseResult<&str, Head<'_>> {
    let (input, _) = spaces0(input)?;
    let (input, tags) = context(
        "parsing optional tags",
        opt(terminated(parse_tags, spaces0)),
    )(input)?;
    let (input, source) = context(
        "parsing optional source",
        opt(terminated(parse_source, spaces0)),
    )(input)?;
    let (input, command) = context("parsing required command", parse_command)(input)?;
    let (input, params) = many0(preceded(spaces1, parse_middle))(input)?;
    let (rest, _) = spaces0(input)?;

    Ok((
        rest,
        Head {
            tags,
            source,
            command,
            params,
            rest,
        },
    ))
}
