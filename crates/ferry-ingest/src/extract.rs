//! XML tree decoding and tag/value extraction
//!
//! [`decode`] turns a document into an [`Element`] tree; [`extract`] flattens that tree into
//! an [`ExtractedRecord`], a tag → values multimap in document order.
//!
//! An element's text is the character data before its first child element (text after a
//! child belongs to nobody), kept as written. Whitespace-only text counts as no text.
//!
//! ```rust
//! use ferry_ingest::extract::{decode, extract, Value};
//!
//! let root = decode(b"<a><b>1.5</b><b>x</b></a>").unwrap();
//! let record = extract(&root);
//! assert_eq!(record.get("b"), Some(&[Value::Number(1.5), Value::Text("x".into())][..]));
//! assert!(record.get("a").is_none());
//! ```

use ferry_common::FerryError;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// Why a document could not be turned into a tree
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("document is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),

    #[error("malformed XML at byte {position}: {message}")]
    Syntax { position: u64, message: String },

    #[error("no root element found")]
    NoRoot,

    #[error("unclosed element <{0}> at end of document")]
    Unclosed(String),

    #[error("content after the root element at byte {0}")]
    TrailingContent(u64),
}

impl From<DecodeError> for FerryError {
    fn from(e: DecodeError) -> Self {
        FerryError::Decode(e.to_string())
    }
}

/// A decoded element: qualified tag name as written, leading text, children in order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    pub tag: String,
    pub text: Option<String>,
    pub children: Vec<Element>,
}

impl Element {
    fn new(tag: String) -> Self {
        Self {
            tag,
            ..Self::default()
        }
    }

    /// Depth-first, parent before children
    pub fn walk(&self) -> Vec<&Element> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(node.children.iter().rev());
        }
        out
    }
}

/// One extracted value: numeric when the text parses as a finite float, the raw text otherwise
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Text(String),
}

impl Value {
    pub fn parse(text: &str) -> Self {
        // NaN and infinities would serialize as JSON null
        match text.trim().parse::<f64>() {
            Ok(number) if number.is_finite() => Value::Number(number),
            _ => Value::Text(text.to_string()),
        }
    }
}

/// Tag name → every value found under that tag, in document order
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct ExtractedRecord {
    values: BTreeMap<String, Vec<Value>>,
}

impl ExtractedRecord {
    pub fn push(&mut self, tag: &str, value: Value) {
        self.values.entry(tag.to_string()).or_default().push(value);
    }

    pub fn get(&self, tag: &str) -> Option<&[Value]> {
        self.values.get(tag).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of distinct tags
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn value_count(&self) -> usize {
        self.values.values().map(Vec::len).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Value])> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Flatten a tree into tag → values
pub fn extract(root: &Element) -> ExtractedRecord {
    let mut record = ExtractedRecord::default();
    for node in root.walk() {
        if let Some(text) = &node.text {
            record.push(&node.tag, Value::parse(text));
        }
    }
    record
}

/// Decode a whole document into its root element
pub fn decode(bytes: &[u8]) -> Result<Element, DecodeError> {
    let xml = std::str::from_utf8(bytes)?;
    let mut reader = Reader::from_str(xml);

    // Open elements, innermost last. `seen_child` marks when leading text is complete.
    let mut stack: Vec<(Element, bool)> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let position = reader.buffer_position() as u64;
        let event = reader.read_event().map_err(|e| DecodeError::Syntax {
            position: reader.error_position() as u64,
            message: e.to_string(),
        })?;

        match event {
            Event::Start(start) => {
                if root.is_some() {
                    return Err(DecodeError::TrailingContent(position));
                }
                let tag = std::str::from_utf8(start.name().as_ref())?.to_string();
                if let Some((_, seen_child)) = stack.last_mut() {
                    *seen_child = true;
                }
                stack.push((Element::new(tag), false));
            }
            Event::Empty(start) => {
                if root.is_some() {
                    return Err(DecodeError::TrailingContent(position));
                }
                let element = Element::new(std::str::from_utf8(start.name().as_ref())?.to_string());
                match stack.last_mut() {
                    Some((parent, seen_child)) => {
                        *seen_child = true;
                        parent.children.push(element);
                    }
                    None => root = Some(element),
                }
            }
            Event::End(_) => {
                // quick-xml has already checked the end name matches the open element
                let Some((mut element, _)) = stack.pop() else {
                    return Err(DecodeError::Syntax {
                        position,
                        message: "unexpected closing tag".to_string(),
                    });
                };
                element.text = element.text.filter(|text| !text.trim().is_empty());
                match stack.last_mut() {
                    Some((parent, _)) => parent.children.push(element),
                    None => root = Some(element),
                }
            }
            Event::Text(text) => {
                let text = text.unescape().map_err(|e| DecodeError::Syntax {
                    position,
                    message: e.to_string(),
                })?;
                append_text(&mut stack, &text, position)?;
            }
            Event::CData(data) => {
                let text = std::str::from_utf8(&data)?;
                append_text(&mut stack, text, position)?;
            }
            Event::Eof => break,
            // Declarations, comments, processing instructions, doctype
            _ => {}
        }
    }

    if let Some((open, _)) = stack.pop() {
        return Err(DecodeError::Unclosed(open.tag));
    }
    root.ok_or(DecodeError::NoRoot)
}

fn append_text(
    stack: &mut [(Element, bool)],
    text: &str,
    position: u64,
) -> Result<(), DecodeError> {
    match stack.last_mut() {
        Some((element, false)) => {
            element.text.get_or_insert_with(String::new).push_str(text);
            Ok(())
        }
        // Tail text after a child element is dropped
        Some((_, true)) => Ok(()),
        None if text.trim().is_empty() => Ok(()),
        None => Err(DecodeError::TrailingContent(position)),
    }
}
