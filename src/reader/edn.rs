//! The EDN-like tokenizer/parser (component H, lower half): turns query
//! text into a generic [`Value`] tree — the `#6` grammar (whitespace,
//! comments, keywords, symbols, vectors/lists/maps/sets, tagged literals,
//! strings/numbers/booleans/nil).
//!
//! Grounded on `examples/original_source/hiku/edn.py`, reimplemented per
//! the redesign note (§9): the source structures this as cooperating
//! coroutines (one generator per lexical state, re-sent characters to
//! resume). Here that's a `Lexer` over `char_indices` with explicit
//! lookahead (`peek`/`bump`) and ordinary recursive-descent calls for
//! nested collections — no hidden continuations, no re-sent input.

use crate::error::EdnError;
use crate::name::Name;
use crate::value::{Reference, Value};
use std::iter::Peekable;
use std::str::CharIndices;
use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time};
use uuid::Uuid;

const STOP_CHARS: &str = " ,\n\r\t";
const SYMBOL_STOP_CHARS: &str = " ,\n\r\t{}[]()\";#";
const TAG_STOP_CHARS: &str = " ,\n\r\t{\"[(\\#";

struct Lexer<'a> {
    input: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Lexer {
            input,
            chars: input.char_indices().peekable(),
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn pos(&mut self) -> usize {
        self.chars.peek().map(|(i, _)| *i).unwrap_or(self.input.len())
    }

    fn bump(&mut self) -> Option<char> {
        self.chars.next().map(|(_, c)| c)
    }

    fn skip_ignorable(&mut self) {
        loop {
            match self.peek() {
                Some(c) if STOP_CHARS.contains(c) => {
                    self.bump();
                }
                Some(';') => {
                    while let Some(c) = self.bump() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                _ => break,
            }
        }
    }

    fn expect_literal(&mut self, rest: &str) -> Result<(), EdnError> {
        for expected in rest.chars() {
            let pos = self.pos();
            match self.bump() {
                Some(c) if c == expected => {}
                Some(c) => return Err(EdnError::UnexpectedChar(c, pos)),
                None => return Err(EdnError::UnexpectedEof),
            }
        }
        Ok(())
    }

    fn take_while(&mut self, mut pred: impl FnMut(char) -> bool) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if pred(c) {
                out.push(c);
                self.bump();
            } else {
                break;
            }
        }
        out
    }

    fn parse_string(&mut self) -> Result<Value, EdnError> {
        let start = self.pos();
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(EdnError::UnterminatedString(start)),
                Some('"') => return Ok(Value::Str(out)),
                Some('\\') => match self.bump() {
                    None => return Err(EdnError::UnterminatedString(start)),
                    Some('a') => out.push('\u{7}'),
                    Some('b') => out.push('\u{8}'),
                    Some('f') => out.push('\u{c}'),
                    Some('n') => out.push('\n'),
                    Some('r') => out.push('\r'),
                    Some('t') => out.push('\t'),
                    Some('v') => out.push('\u{b}'),
                    Some(other) => out.push(other),
                },
                Some(c) => out.push(c),
            }
        }
    }

    fn parse_character(&mut self) -> Result<Value, EdnError> {
        let first = self.bump().ok_or(EdnError::UnexpectedEof)?;
        if !first.is_alphabetic() {
            return Ok(Value::Str(first.to_string()));
        }
        let mut name = String::new();
        name.push(first);
        name.push_str(&self.take_while(|c| c.is_alphabetic()));
        if name.chars().count() == 1 {
            return Ok(Value::Str(name));
        }
        match name.as_str() {
            "newline" => Ok(Value::Str("\n".to_string())),
            "space" => Ok(Value::Str(" ".to_string())),
            "tab" => Ok(Value::Str("\t".to_string())),
            _ => Err(EdnError::UnknownCharLiteral(name)),
        }
    }

    fn parse_number(&mut self, lead: char) -> Result<Value, EdnError> {
        let mut raw = String::new();
        raw.push(lead);
        raw.push_str(&self.take_while(|c| "0123456789+-eEMN.".contains(c)));
        parse_number_literal(&raw)
    }

    fn parse_symbol_or_keyword(&mut self, lead: char) -> Result<Value, EdnError> {
        let mut raw = String::new();
        raw.push(lead);
        raw.push_str(&self.take_while(|c| !SYMBOL_STOP_CHARS.contains(c)));
        if let Some(name) = raw.strip_prefix(':') {
            Ok(Value::Keyword(Name::new(name)))
        } else {
            Ok(Value::Symbol(Name::new(raw)))
        }
    }

    fn parse_collection(&mut self, close: char) -> Result<Vec<Value>, EdnError> {
        let mut items = Vec::new();
        loop {
            self.skip_ignorable();
            match self.peek() {
                None => return Err(EdnError::UnexpectedEof),
                Some(c) if c == close => {
                    self.bump();
                    return Ok(items);
                }
                _ => items.push(self.parse_value()?),
            }
        }
    }

    fn parse_tagged(&mut self) -> Result<Value, EdnError> {
        if self.peek() == Some('{') {
            self.bump();
            let items = self.parse_collection('}')?;
            return Ok(Value::Set(items));
        }
        let tag_name = self.take_while(|c| !TAG_STOP_CHARS.contains(c));
        self.skip_ignorable();
        if self.peek().is_none() {
            return Err(EdnError::TaggedElementMissingValue);
        }
        let value = self.parse_value()?;
        match tag_name.as_str() {
            "inst" => {
                let raw = expect_string(&value, "inst")
                    .map_err(|msg| EdnError::InvalidInstant(format!("{value:?}"), msg))?;
                let parsed = parse_instant(raw)
                    .map_err(|msg| EdnError::InvalidInstant(raw.to_string(), msg))?;
                Ok(Value::Instant(parsed))
            }
            "uuid" => {
                let raw = expect_string(&value, "uuid")
                    .map_err(|msg| EdnError::InvalidUuid(format!("{value:?}"), msg))?;
                let parsed = Uuid::parse_str(raw)
                    .map_err(|e| EdnError::InvalidUuid(raw.to_string(), e.to_string()))?;
                Ok(Value::Uuid(parsed))
            }
            "graph/ref" => {
                // Mirrors the writer's own `#graph/ref [node ident]` shape
                // (§6 Result serialization) so a serialized index round-trips.
                match &value {
                    Value::Vector(items) if items.len() == 2 => {
                        let node = match &items[0] {
                            Value::Str(s) => Name::new(s.as_str()),
                            Value::Keyword(n) | Value::Symbol(n) => n.clone(),
                            other => {
                                return Err(EdnError::InvalidInstant(
                                    format!("{other:?}"),
                                    "expected a node name".to_string(),
                                ))
                            }
                        };
                        Ok(Value::Ref(Reference::new(node, items[1].clone())))
                    }
                    other => Err(EdnError::InvalidInstant(
                        format!("{other:?}"),
                        "expected [node ident]".to_string(),
                    )),
                }
            }
            _ => Ok(Value::Tagged(Name::new(tag_name), Box::new(value))),
        }
    }

    fn parse_value(&mut self) -> Result<Value, EdnError> {
        self.skip_ignorable();
        let pos = self.pos();
        let c = self.bump().ok_or(EdnError::UnexpectedEof)?;
        match c {
            't' => {
                self.expect_literal("rue")?;
                Ok(Value::Bool(true))
            }
            'f' => {
                self.expect_literal("alse")?;
                Ok(Value::Bool(false))
            }
            'n' => {
                self.expect_literal("il")?;
                Ok(Value::Nil)
            }
            '"' => self.parse_string(),
            '\\' => self.parse_character(),
            '0'..='9' => self.parse_number(c),
            '-' | '.' => match self.peek() {
                Some(next) if next.is_ascii_digit() => {
                    let second = self.bump().unwrap();
                    let mut raw = String::new();
                    raw.push(c);
                    raw.push(second);
                    raw.push_str(&self.take_while(|ch| "0123456789+-eEMN.".contains(ch)));
                    parse_number_literal(&raw)
                }
                _ => self.parse_symbol_or_keyword(c),
            },
            ':' => self.parse_symbol_or_keyword(c),
            c if c.is_alphabetic() => self.parse_symbol_or_keyword(c),
            '[' => Ok(Value::Vector(self.parse_collection(']')?)),
            '(' => Ok(Value::List(self.parse_collection(')')?)),
            '{' => {
                let flat = self.parse_collection('}')?;
                if flat.len() % 2 != 0 {
                    return Err(EdnError::OddMap);
                }
                let mut pairs = Vec::with_capacity(flat.len() / 2);
                let mut it = flat.into_iter();
                while let (Some(k), Some(v)) = (it.next(), it.next()) {
                    pairs.push((k, v));
                }
                Ok(Value::Map(pairs))
            }
            '#' => self.parse_tagged(),
            other => Err(EdnError::UnexpectedChar(other, pos)),
        }
    }
}

fn expect_string<'a>(value: &'a Value, tag: &str) -> Result<&'a str, String> {
    match value {
        Value::Str(s) => Ok(s.as_str()),
        _ => Err(format!("#{tag} expects a string literal")),
    }
}

fn parse_number_literal(raw: &str) -> Result<Value, EdnError> {
    let trimmed = raw.trim_end_matches(['M', 'N']);
    if trimmed.contains('.') || trimmed.contains('e') || trimmed.contains('E') {
        trimmed
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| EdnError::InvalidNumber(raw.to_string()))
    } else {
        trimmed
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| EdnError::InvalidNumber(raw.to_string()))
    }
}

/// Parses an ISO-8601 instant, truncated to 23 characters before parsing —
/// per the design note (§9), this is lossy below millisecond precision and
/// kept intentionally rather than guessed away.
fn parse_instant(raw: &str) -> Result<OffsetDateTime, String> {
    let end = raw.char_indices().nth(23).map(|(i, _)| i).unwrap_or(raw.len());
    let truncated = &raw[..end];
    if truncated.len() < 19 {
        return Err("instant literal is too short".to_string());
    }
    let expect_sep = |idx: usize, expected: u8| -> Result<(), String> {
        if truncated.as_bytes().get(idx) == Some(&expected) {
            Ok(())
        } else {
            Err(format!("expected {:?} at offset {idx}", expected as char))
        }
    };
    expect_sep(4, b'-')?;
    expect_sep(7, b'-')?;
    expect_sep(13, b':')?;
    expect_sep(16, b':')?;
    let separator = truncated.as_bytes().get(10).copied().unwrap_or(b' ');
    if separator != b'T' && separator != b't' && separator != b' ' {
        return Err("expected date/time separator".to_string());
    }

    let year: i32 = truncated[0..4].parse().map_err(|_| "invalid year".to_string())?;
    let month: u8 = truncated[5..7].parse().map_err(|_| "invalid month".to_string())?;
    let day: u8 = truncated[8..10].parse().map_err(|_| "invalid day".to_string())?;
    let hour: u8 = truncated[11..13].parse().map_err(|_| "invalid hour".to_string())?;
    let minute: u8 = truncated[14..16].parse().map_err(|_| "invalid minute".to_string())?;
    let second: u8 = truncated[17..19].parse().map_err(|_| "invalid second".to_string())?;

    let millisecond: u16 = if truncated.len() > 19 {
        if truncated.as_bytes().get(19) != Some(&b'.') {
            return Err("expected '.' before fractional seconds".to_string());
        }
        let mut digits = truncated[20..].to_string();
        while digits.len() < 3 {
            digits.push('0');
        }
        digits[..3].parse().map_err(|_| "invalid fractional seconds".to_string())?
    } else {
        0
    };

    let month = Month::try_from(month).map_err(|_| "invalid month".to_string())?;
    let date = Date::from_calendar_date(year, month, day).map_err(|e| e.to_string())?;
    let time = Time::from_hms_milli(hour, minute, second, millisecond).map_err(|e| e.to_string())?;
    Ok(PrimitiveDateTime::new(date, time).assume_utc())
}

/// Parses every top-level EDN form in `input`. `read` (component H, §6)
/// requires exactly one.
pub fn parse_all(input: &str) -> Result<Vec<Value>, EdnError> {
    let mut lexer = Lexer::new(input);
    let mut out = Vec::new();
    loop {
        lexer.skip_ignorable();
        if lexer.peek().is_none() {
            break;
        }
        out.push(lexer.parse_value()?);
    }
    Ok(out)
}
