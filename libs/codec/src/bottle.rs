//! Bottle: a self-describing list of values
//!
//! ## Purpose
//!
//! The structured payload used for commands, replies and text conversion.
//! A bottle holds integers, floats, strings, vocabulary words, raw blobs and
//! nested lists, and has both a tagged binary encoding and a printable form.
//!
//! ## Binary Layout
//!
//! ```text
//! [LIST tag | speciality : i32][count : i32] { [tag : i32][payload] } * count
//! ```
//!
//! When a speciality is present every element shares that tag and the
//! per-element tag is omitted. Strings carry their length including a
//! trailing NUL; blobs carry their raw length. Nested lists repeat the layout
//! with the list tag acting as the element tag.
//!
//! ## Text Form
//!
//! ```text
//! port (name /foo) (ip 10.0.0.1) (port_number 10002) (carrier tcp)
//! ```
//!
//! Strings are printed bare when that cannot be mistaken for a number or a
//! delimiter, otherwise quoted with backslash escapes. Vocabulary words print
//! as `[word]` and blobs as `{b0 b1 ...}`.

use crate::connection::{BytesReader, ConnectionReader, ConnectionWriter, PortReader, PortWriter};
use crate::error::{CodecError, Result};
use std::fmt;

pub const TAG_INT32: i32 = 1;
pub const TAG_STRING: i32 = 4;
pub const TAG_VOCAB: i32 = 9;
pub const TAG_FLOAT64: i32 = 10;
pub const TAG_BLOB: i32 = 12;
pub const TAG_INT64: i32 = 17;
pub const TAG_LIST: i32 = 256;

const MAX_DEPTH: usize = 64;

/// One element of a [`Bottle`]
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int32(i32),
    Int64(i64),
    Float64(f64),
    Vocab(i32),
    String(String),
    Blob(Vec<u8>),
    List(Bottle),
}

impl Value {
    /// Pack up to four ASCII characters into a vocabulary code
    pub fn vocab(word: &str) -> Self {
        Value::Vocab(encode_vocab(word))
    }

    fn tag(&self) -> i32 {
        match self {
            Value::Int32(_) => TAG_INT32,
            Value::Int64(_) => TAG_INT64,
            Value::Float64(_) => TAG_FLOAT64,
            Value::Vocab(_) => TAG_VOCAB,
            Value::String(_) => TAG_STRING,
            Value::Blob(_) => TAG_BLOB,
            Value::List(_) => TAG_LIST,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Int32(v) | Value::Vocab(v) => Some(*v),
            Value::Int64(v) => i32::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float64(v) => Some(*v),
            Value::Int32(v) => Some(f64::from(*v)),
            Value::Int64(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&Bottle> {
        match self {
            Value::List(b) => Some(b),
            _ => None,
        }
    }

    /// Render strings and vocabulary words as plain text, other values as printed
    pub fn to_plain_string(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Vocab(v) => decode_vocab(*v),
            other => other.to_string(),
        }
    }

    fn encode(&self, out: &mut dyn ConnectionWriter) {
        match self {
            Value::Int32(v) | Value::Vocab(v) => out.append_i32(*v),
            Value::Int64(v) => out.append_i64(*v),
            Value::Float64(v) => out.append_f64(*v),
            Value::String(s) => {
                out.append_i32(s.len() as i32 + 1);
                out.append_bytes(s.as_bytes());
                out.append_bytes(&[0]);
            }
            Value::Blob(bytes) => {
                out.append_i32(bytes.len() as i32);
                out.append_bytes(bytes);
            }
            Value::List(list) => list.encode_items(out),
        }
    }

    fn decode(tag: i32, reader: &mut dyn ConnectionReader, depth: usize) -> Result<Self> {
        if tag & TAG_LIST != 0 {
            return Bottle::decode_items(tag & !TAG_LIST, reader, depth + 1).map(Value::List);
        }
        match tag {
            TAG_INT32 => Ok(Value::Int32(reader.expect_i32()?)),
            TAG_INT64 => Ok(Value::Int64(reader.expect_i64()?)),
            TAG_FLOAT64 => Ok(Value::Float64(reader.expect_f64()?)),
            TAG_VOCAB => Ok(Value::Vocab(reader.expect_i32()?)),
            TAG_STRING => {
                let mut bytes = read_sized(reader)?;
                if bytes.last() == Some(&0) {
                    bytes.pop();
                }
                String::from_utf8(bytes)
                    .map(Value::String)
                    .map_err(|_| CodecError::utf8("string element"))
            }
            TAG_BLOB => read_sized(reader).map(Value::Blob),
            other => Err(CodecError::malformed(format!("unknown tag {}", other), 0)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int32(v) => write!(f, "{}", v),
            Value::Int64(v) => write!(f, "{}", v),
            Value::Float64(v) => write!(f, "{:?}", v),
            Value::Vocab(v) => write!(f, "[{}]", decode_vocab(*v)),
            Value::String(s) => write_string(f, s),
            Value::Blob(bytes) => {
                write!(f, "{{")?;
                for (i, b) in bytes.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", b)?;
                }
                write!(f, "}}")
            }
            Value::List(list) => write!(f, "({})", list),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Bottle> for Value {
    fn from(v: Bottle) -> Self {
        Value::List(v)
    }
}

/// Ordered list of [`Value`]s
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bottle {
    items: Vec<Value>,
}

impl Bottle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the printable form
    pub fn from_text(text: &str) -> Result<Self> {
        let mut parser = TextParser::new(text);
        let items = parser.items(None, 0)?;
        Ok(Self { items })
    }

    /// Decode the tagged binary form
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = BytesReader::new(bytes);
        Self::decode(&mut reader)
    }

    /// Encode the tagged binary form
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode(&mut out);
        out
    }

    pub fn add(&mut self, value: impl Into<Value>) -> &mut Self {
        self.items.push(value.into());
        self
    }

    pub fn with(mut self, value: impl Into<Value>) -> Self {
        self.items.push(value.into());
        self
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.items.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.items.iter()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Find a nested `(key value ...)` group and return the value after the key
    pub fn find(&self, key: &str) -> Option<&Value> {
        self.items.iter().find_map(|item| {
            let group = item.as_list()?;
            match group.get(0) {
                Some(Value::String(k)) if k == key => group.get(1),
                _ => None,
            }
        })
    }

    fn encode(&self, out: &mut dyn ConnectionWriter) {
        out.append_i32(TAG_LIST);
        self.encode_items(out);
    }

    fn encode_items(&self, out: &mut dyn ConnectionWriter) {
        out.append_i32(self.items.len() as i32);
        for item in &self.items {
            out.append_i32(item.tag());
            item.encode(out);
        }
    }

    fn decode(reader: &mut dyn ConnectionReader) -> Result<Self> {
        let code = reader.expect_i32()?;
        if code & TAG_LIST == 0 {
            return Err(CodecError::malformed(
                format!("expected list code, found {}", code),
                0,
            ));
        }
        Self::decode_items(code & !TAG_LIST, reader, 0)
    }

    fn decode_items(speciality: i32, reader: &mut dyn ConnectionReader, depth: usize) -> Result<Self> {
        if depth > MAX_DEPTH {
            return Err(CodecError::malformed("lists nested too deeply", 0));
        }
        let count = reader.expect_i32()?;
        if count < 0 {
            return Err(CodecError::malformed(format!("negative count {}", count), 4));
        }
        let mut items = Vec::new();
        for _ in 0..count {
            let tag = if speciality != 0 {
                speciality
            } else {
                reader.expect_i32()?
            };
            items.push(Value::decode(tag, reader, depth)?);
        }
        Ok(Self { items })
    }
}

impl fmt::Display for Bottle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, item) in self.items.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", item)?;
        }
        Ok(())
    }
}

impl PortWriter for Bottle {
    fn write(&self, writer: &mut dyn ConnectionWriter) -> Result<()> {
        if writer.is_text_mode() {
            writer.append_text(&self.to_string());
            writer.append_text("\n");
        } else {
            self.encode(writer);
        }
        Ok(())
    }
}

impl PortReader for Bottle {
    fn read(&mut self, reader: &mut dyn ConnectionReader) -> Result<()> {
        *self = if reader.is_text_mode() {
            let line = reader.expect_line()?;
            Self::from_text(&line)?
        } else {
            Self::decode(reader)?
        };
        Ok(())
    }
}

pub fn encode_vocab(word: &str) -> i32 {
    word.bytes()
        .take(4)
        .enumerate()
        .fold(0i32, |acc, (i, b)| acc | (i32::from(b) << (8 * i)))
}

pub fn decode_vocab(code: i32) -> String {
    code.to_le_bytes()
        .iter()
        .take_while(|b| **b != 0)
        .map(|b| char::from(*b))
        .collect()
}

fn read_sized(reader: &mut dyn ConnectionReader) -> Result<Vec<u8>> {
    let len = reader.expect_i32()?;
    if len < 0 {
        return Err(CodecError::malformed(format!("negative length {}", len), 0));
    }
    let len = len as usize;
    if let Some(available) = reader.size() {
        if len > available {
            return Err(CodecError::Truncated {
                need: len,
                available,
            });
        }
    }
    let mut bytes = vec![0u8; len];
    reader.expect_block(&mut bytes)?;
    Ok(bytes)
}

fn parse_number(token: &str) -> Option<Value> {
    let first = token.chars().next()?;
    if !(first.is_ascii_digit() || first == '-' || first == '+' || first == '.') {
        return None;
    }
    if let Ok(v) = token.parse::<i32>() {
        return Some(Value::Int32(v));
    }
    if let Ok(v) = token.parse::<i64>() {
        return Some(Value::Int64(v));
    }
    token.parse::<f64>().ok().map(Value::Float64)
}

fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || matches!(c, '"' | '(' | ')' | '[' | ']' | '{' | '}' | '\\')
}

fn write_string(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    let bare = !s.is_empty() && !s.chars().any(is_delimiter) && parse_number(s).is_none();
    if bare {
        return write!(f, "{}", s);
    }
    write!(f, "\"")?;
    for c in s.chars() {
        match c {
            '"' => write!(f, "\\\"")?,
            '\\' => write!(f, "\\\\")?,
            '\n' => write!(f, "\\n")?,
            '\r' => write!(f, "\\r")?,
            '\t' => write!(f, "\\t")?,
            other => write!(f, "{}", other)?,
        }
    }
    write!(f, "\"")
}

struct TextParser {
    chars: Vec<char>,
    pos: usize,
}

impl TextParser {
    fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn items(&mut self, close: Option<char>, depth: usize) -> Result<Vec<Value>> {
        if depth > MAX_DEPTH {
            return Err(CodecError::invalid_text("lists nested too deeply", self.pos));
        }
        let mut items = Vec::new();
        loop {
            self.skip_whitespace();
            let c = match self.peek() {
                Some(c) => c,
                None if close.is_some() => {
                    return Err(CodecError::invalid_text("unclosed list", self.pos))
                }
                None => return Ok(items),
            };
            if Some(c) == close {
                self.pos += 1;
                return Ok(items);
            }
            let value = match c {
                '(' => {
                    self.pos += 1;
                    Value::List(Bottle {
                        items: self.items(Some(')'), depth + 1)?,
                    })
                }
                '"' => Value::String(self.quoted()?),
                '[' => Value::Vocab(encode_vocab(&self.delimited(']')?)),
                '{' => Value::Blob(self.blob()?),
                ')' | ']' | '}' => {
                    return Err(CodecError::invalid_text(
                        format!("unexpected '{}'", c),
                        self.pos,
                    ))
                }
                _ => {
                    let token = self.token();
                    parse_number(&token).unwrap_or(Value::String(token))
                }
            };
            items.push(value);
        }
    }

    fn token(&mut self) -> String {
        let mut token = String::new();
        while let Some(c) = self.peek() {
            if is_delimiter(c) {
                break;
            }
            token.push(c);
            self.pos += 1;
        }
        token
    }

    fn quoted(&mut self) -> Result<String> {
        let start = self.pos;
        self.pos += 1;
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(CodecError::invalid_text("unterminated string", start)),
                Some('"') => return Ok(out),
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('r') => out.push('\r'),
                    Some('t') => out.push('\t'),
                    Some(other) => out.push(other),
                    None => return Err(CodecError::invalid_text("dangling escape", self.pos)),
                },
                Some(c) => out.push(c),
            }
        }
    }

    fn delimited(&mut self, close: char) -> Result<String> {
        let start = self.pos;
        self.pos += 1;
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(CodecError::invalid_text("unterminated group", start)),
                Some(c) if c == close => return Ok(out),
                Some(c) => out.push(c),
            }
        }
    }

    fn blob(&mut self) -> Result<Vec<u8>> {
        let start = self.pos;
        let body = self.delimited('}')?;
        body.split_whitespace()
            .map(|b| {
                b.parse::<u8>()
                    .map_err(|_| CodecError::invalid_text(format!("bad blob byte '{}'", b), start))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn port_reply() -> Bottle {
        Bottle::new()
            .with("port")
            .with(Bottle::new().with("name").with("/foo"))
            .with(Bottle::new().with("ip").with("10.0.0.1"))
            .with(Bottle::new().with("port_number").with(10002))
            .with(Bottle::new().with("carrier").with("tcp"))
    }

    #[test]
    fn test_text_form() {
        assert_eq!(
            port_reply().to_string(),
            "port (name /foo) (ip 10.0.0.1) (port_number 10002) (carrier tcp)"
        );
        let error = Bottle::new()
            .with("port")
            .with(Bottle::new().with("error").with(-2).with("port not known"));
        assert_eq!(error.to_string(), "port (error -2 \"port not known\")");
    }

    #[test]
    fn test_text_parse_mixed() {
        let b = Bottle::from_text("set /foo ips \"a b\" 3 2.5 [add] {1 2} (x (y))").unwrap();
        assert_eq!(b.len(), 9);
        assert_eq!(b.get(0), Some(&Value::from("set")));
        assert_eq!(b.get(3), Some(&Value::from("a b")));
        assert_eq!(b.get(4), Some(&Value::Int32(3)));
        assert_eq!(b.get(5), Some(&Value::Float64(2.5)));
        assert_eq!(b.get(6), Some(&Value::vocab("add")));
        assert_eq!(b.get(7), Some(&Value::Blob(vec![1, 2])));
        assert_eq!(b.get(8).and_then(Value::as_list).map(Bottle::len), Some(2));
    }

    #[test]
    fn test_text_parse_errors() {
        assert!(Bottle::from_text("(unclosed").is_err());
        assert!(Bottle::from_text("\"open").is_err());
        assert!(Bottle::from_text("stray )").is_err());
    }

    #[test]
    fn test_binary_layout() {
        let bytes = Bottle::new().with(5).with("hi").to_bytes();
        let mut expected = Vec::new();
        expected.extend_from_slice(&TAG_LIST.to_be_bytes());
        expected.extend_from_slice(&2i32.to_be_bytes());
        expected.extend_from_slice(&TAG_INT32.to_be_bytes());
        expected.extend_from_slice(&5i32.to_be_bytes());
        expected.extend_from_slice(&TAG_STRING.to_be_bytes());
        expected.extend_from_slice(&3i32.to_be_bytes());
        expected.extend_from_slice(b"hi\0");
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_binary_nested_decode() {
        let original = port_reply().with(Value::Int64(1 << 40)).with(Value::Float64(-0.5));
        let decoded = Bottle::from_bytes(&original.to_bytes()).unwrap();
        assert_eq!(decoded, original);
        assert_eq!(decoded.find("port_number"), Some(&Value::Int32(10002)));
    }

    #[test]
    fn test_specialized_list_decode() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(TAG_LIST | TAG_INT32).to_be_bytes());
        bytes.extend_from_slice(&3i32.to_be_bytes());
        for v in [7i32, 8, 9] {
            bytes.extend_from_slice(&v.to_be_bytes());
        }
        let decoded = Bottle::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.to_string(), "7 8 9");
    }

    #[test]
    fn test_binary_rejects_truncated_string() {
        let mut bytes = Bottle::new().with("hello").to_bytes();
        bytes.truncate(bytes.len() - 3);
        assert!(Bottle::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_numeric_looking_strings_are_quoted() {
        let b = Bottle::new().with("42").with("-").with("");
        assert_eq!(b.to_string(), "\"42\" - \"\"");
        let back = Bottle::from_text(&b.to_string()).unwrap();
        assert_eq!(back, b);
    }

    #[test]
    fn test_vocab_codes() {
        assert_eq!(decode_vocab(encode_vocab("del")), "del");
        assert_eq!(encode_vocab("a"), 97);
    }
}
