//! DbObject tag stream decoder
//!
//! TOC and SB containers embed a self-describing nested record format: each
//! record is a one-byte type code, an optional null-terminated field name
//! (present inside objects, absent inside lists), and a value. Containers are
//! length-prefixed by a varint giving the body size and close with a 0x00
//! terminator record, which must land exactly on the declared boundary.
//!
//! Two consumer surfaces: [`DbEvents`] pulls records lazily, and
//! [`parse_root`] builds an owned [`DbNode`] tree with typed accessors on
//! top of it. Unknown field names are kept in the tree so callers can log
//! them; unknown type codes are fatal.

use crate::error::{Error, Result};
use crate::reader::FbReader;
use crate::types::{Guid, Sha1};

/// One-byte record type codes of this title's dialect. The high three bits
/// of the wire byte are reserved and must be clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCode {
    /// Container terminator.
    Eoo,
    List,
    Object,
    Bool,
    String,
    Int32,
    Int64,
    UInt32,
    UInt64,
    Float,
    Guid,
    Sha1,
    Blob,
}

impl TypeCode {
    pub fn from_byte(byte: u8) -> Result<Self> {
        if byte & 0xe0 != 0 {
            return Err(Error::FormatMismatch(format!(
                "type code {byte:#04x} has reserved bits set"
            )));
        }
        Ok(match byte {
            0x00 => Self::Eoo,
            0x01 => Self::List,
            0x02 => Self::Object,
            0x06 => Self::Bool,
            0x07 => Self::String,
            0x08 => Self::Int32,
            0x09 => Self::Int64,
            0x0a => Self::UInt32,
            0x0b => Self::UInt64,
            0x0c => Self::Float,
            0x0f => Self::Guid,
            0x10 => Self::Sha1,
            0x13 => Self::Blob,
            other => return Err(Error::UnknownTypeCode(other)),
        })
    }
}

/// Kind of a nested container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    List,
    Object,
}

/// A primitive field value.
#[derive(Debug, Clone, PartialEq)]
pub enum DbValue {
    Bool(bool),
    Int32(i32),
    Int64(i64),
    UInt32(u32),
    UInt64(u64),
    Float(f32),
    String(String),
    Blob(Vec<u8>),
    Sha1(Sha1),
    Guid(Guid),
}

/// Event emitted by the pull parser.
#[derive(Debug, Clone, PartialEq)]
pub enum DbEvent {
    BeginContainer {
        kind: ContainerKind,
        name: Option<String>,
    },
    Field {
        name: Option<String>,
        value: DbValue,
    },
    EndContainer,
}

struct Frame {
    kind: ContainerKind,
    end: usize,
}

/// Lazy pull parser over a tag stream. Yields the events for exactly one
/// root record, then `None`.
pub struct DbEvents<'a> {
    reader: FbReader<'a>,
    stack: Vec<Frame>,
    started: bool,
}

impl<'a> DbEvents<'a> {
    pub fn new(reader: FbReader<'a>) -> Self {
        Self {
            reader,
            stack: Vec::new(),
            started: false,
        }
    }

    pub fn next_event(&mut self) -> Result<Option<DbEvent>> {
        if !self.started {
            self.started = true;
            if self.reader.is_empty() {
                return Err(Error::FormatMismatch("empty tag stream".into()));
            }
            let code = TypeCode::from_byte(self.reader.read_u8()?)?;
            if code == TypeCode::Eoo {
                return Err(Error::FormatMismatch(
                    "tag stream root is a terminator".into(),
                ));
            }
            return self.begin_entry(code, None).map(Some);
        }

        let Some(frame) = self.stack.last() else {
            return Ok(None);
        };
        let (kind, end) = (frame.kind, frame.end);

        if self.reader.position() >= end {
            return Err(Error::FormatMismatch(format!(
                "container exceeded its declared end at offset {end}"
            )));
        }
        let code = TypeCode::from_byte(self.reader.read_u8()?)?;
        if code == TypeCode::Eoo {
            if self.reader.position() != end {
                return Err(Error::FormatMismatch(format!(
                    "container terminated at offset {} but declared end is {end}",
                    self.reader.position()
                )));
            }
            self.stack.pop();
            return Ok(Some(DbEvent::EndContainer));
        }

        let name = match kind {
            ContainerKind::Object => Some(self.reader.read_cstring()?),
            ContainerKind::List => None,
        };
        self.begin_entry(code, name).map(Some)
    }

    fn begin_entry(&mut self, code: TypeCode, name: Option<String>) -> Result<DbEvent> {
        let limit = self
            .stack
            .last()
            .map_or(usize::MAX, |frame| frame.end);

        match code {
            TypeCode::List | TypeCode::Object => {
                let body_len = self.reader.read_varint()? as usize;
                let end = self
                    .reader
                    .position()
                    .checked_add(body_len)
                    .ok_or_else(|| Error::FormatMismatch("container length overflow".into()))?;
                if end > self.reader.position() + self.reader.remaining() {
                    return Err(Error::truncated(
                        body_len,
                        self.reader.remaining(),
                    ));
                }
                if end > limit {
                    return Err(Error::FormatMismatch(
                        "container extends past its parent's declared end".into(),
                    ));
                }
                let kind = if code == TypeCode::List {
                    ContainerKind::List
                } else {
                    ContainerKind::Object
                };
                self.stack.push(Frame { kind, end });
                Ok(DbEvent::BeginContainer { kind, name })
            }
            code => {
                let value = read_value(&mut self.reader, code)?;
                if self.reader.position() > limit {
                    return Err(Error::FormatMismatch(
                        "value crosses its container's declared end".into(),
                    ));
                }
                Ok(DbEvent::Field { name, value })
            }
        }
    }
}

fn read_value<'a>(reader: &mut FbReader<'a>, code: TypeCode) -> Result<DbValue> {
    Ok(match code {
        TypeCode::Bool => DbValue::Bool(reader.read_u8()? != 0),
        TypeCode::String => DbValue::String(reader.read_sized_string()?),
        TypeCode::Int32 => DbValue::Int32(reader.read_i32()?),
        TypeCode::Int64 => DbValue::Int64(reader.read_i64()?),
        TypeCode::UInt32 => DbValue::UInt32(reader.read_u32()?),
        TypeCode::UInt64 => DbValue::UInt64(reader.read_u64()?),
        TypeCode::Float => DbValue::Float(reader.read_f32()?),
        TypeCode::Guid => DbValue::Guid(reader.read_guid()?),
        TypeCode::Sha1 => DbValue::Sha1(reader.read_sha1()?),
        TypeCode::Blob => {
            let len = reader.read_varint()? as usize;
            DbValue::Blob(reader.take(len)?.to_vec())
        }
        TypeCode::Eoo | TypeCode::List | TypeCode::Object => {
            return Err(Error::FormatMismatch(format!(
                "type code {code:?} is not a primitive value"
            )));
        }
    })
}

/// A node of the owned tree.
#[derive(Debug, Clone, PartialEq)]
pub enum DbNode {
    Value(DbValue),
    List(Vec<DbNode>),
    Object(DbObject),
}

/// An object: named entries in declared order. Field names the consumer does
/// not recognize stay here untouched.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DbObject {
    entries: Vec<(String, DbNode)>,
}

impl DbObject {
    pub fn entries(&self) -> impl Iterator<Item = (&str, &DbNode)> {
        self.entries.iter().map(|(name, node)| (name.as_str(), node))
    }

    pub fn field(&self, name: &str) -> Option<&DbNode> {
        self.entries
            .iter()
            .find(|(entry, _)| entry == name)
            .map(|(_, node)| node)
    }

    fn require(&self, name: &str) -> Result<&DbNode> {
        self.field(name)
            .ok_or_else(|| Error::FormatMismatch(format!("missing required field `{name}`")))
    }

    fn mismatch(name: &str) -> Error {
        Error::FormatMismatch(format!("field `{name}` has an unexpected type"))
    }

    pub fn require_str(&self, name: &str) -> Result<&str> {
        self.require(name)?
            .as_str()
            .ok_or_else(|| Self::mismatch(name))
    }

    pub fn require_u32(&self, name: &str) -> Result<u32> {
        self.require(name)?
            .as_u32()
            .ok_or_else(|| Self::mismatch(name))
    }

    pub fn require_u64(&self, name: &str) -> Result<u64> {
        self.require(name)?
            .as_u64()
            .ok_or_else(|| Self::mismatch(name))
    }

    pub fn require_sha1(&self, name: &str) -> Result<Sha1> {
        self.require(name)?
            .as_sha1()
            .ok_or_else(|| Self::mismatch(name))
    }

    pub fn require_guid(&self, name: &str) -> Result<Guid> {
        self.require(name)?
            .as_guid()
            .ok_or_else(|| Self::mismatch(name))
    }

    pub fn require_list(&self, name: &str) -> Result<&[DbNode]> {
        self.require(name)?
            .as_list()
            .ok_or_else(|| Self::mismatch(name))
    }

    /// Missing or non-boolean fields read as `false`.
    pub fn get_bool(&self, name: &str) -> bool {
        self.field(name).and_then(DbNode::as_bool).unwrap_or(false)
    }

    pub fn get_blob(&self, name: &str) -> Option<&[u8]> {
        self.field(name).and_then(DbNode::as_blob)
    }

    pub fn get_list(&self, name: &str) -> Option<&[DbNode]> {
        self.field(name).and_then(DbNode::as_list)
    }
}

impl DbNode {
    pub fn as_object(&self) -> Option<&DbObject> {
        match self {
            Self::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[DbNode]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Value(DbValue::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Value(DbValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    /// 32-bit reinterpretation: signed wire values keep their bit pattern,
    /// for flags words and packed identifiers.
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Self::Value(DbValue::UInt32(v)) => Some(*v),
            Self::Value(DbValue::Int32(v)) => Some(*v as u32),
            _ => None,
        }
    }

    /// Non-negative integer of any width; negative wire values read as `None`.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Value(DbValue::UInt32(v)) => Some(u64::from(*v)),
            Self::Value(DbValue::UInt64(v)) => Some(*v),
            Self::Value(DbValue::Int32(v)) => u64::try_from(*v).ok(),
            Self::Value(DbValue::Int64(v)) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Self::Value(DbValue::Float(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn as_sha1(&self) -> Option<Sha1> {
        match self {
            Self::Value(DbValue::Sha1(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn as_guid(&self) -> Option<Guid> {
        match self {
            Self::Value(DbValue::Guid(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Self::Value(DbValue::Blob(v)) => Some(v),
            _ => None,
        }
    }
}

enum Pending {
    List(Option<String>, Vec<DbNode>),
    Object(Option<String>, Vec<(String, DbNode)>),
}

/// Build the owned tree for the single root record of `reader`.
pub fn parse_root(reader: FbReader<'_>) -> Result<DbNode> {
    let mut events = DbEvents::new(reader);
    let mut stack: Vec<Pending> = Vec::new();
    let mut root: Option<DbNode> = None;

    while let Some(event) = events.next_event()? {
        match event {
            DbEvent::BeginContainer { kind, name } => {
                stack.push(match kind {
                    ContainerKind::List => Pending::List(name, Vec::new()),
                    ContainerKind::Object => Pending::Object(name, Vec::new()),
                });
            }
            DbEvent::Field { name, value } => {
                attach(&mut stack, &mut root, name, DbNode::Value(value));
            }
            DbEvent::EndContainer => {
                let (name, node) = match stack.pop() {
                    Some(Pending::List(name, items)) => (name, DbNode::List(items)),
                    Some(Pending::Object(name, entries)) => {
                        (name, DbNode::Object(DbObject { entries }))
                    }
                    None => {
                        return Err(Error::FormatMismatch(
                            "container terminator without a container".into(),
                        ));
                    }
                };
                attach(&mut stack, &mut root, name, node);
            }
        }
    }

    root.ok_or_else(|| Error::FormatMismatch("tag stream produced no root record".into()))
}

fn attach(
    stack: &mut [Pending],
    root: &mut Option<DbNode>,
    name: Option<String>,
    node: DbNode,
) {
    match stack.last_mut() {
        Some(Pending::List(_, items)) => items.push(node),
        Some(Pending::Object(_, entries)) => {
            entries.push((name.unwrap_or_default(), node));
        }
        None => *root = Some(node),
    }
}
