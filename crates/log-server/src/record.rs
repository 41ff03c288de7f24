// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log record model.
//!
//! A [`LogRecord`] is what a writer emits for a single logging call. On the
//! wire it is a flat mapping of field names to dynamically typed
//! [`FieldValue`]s; the well-known fields are lifted into typed struct
//! members and everything else is preserved in [`LogRecord::extra`].

use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::error::MalformedRecord;
use crate::level::{LogLevel, NOTSET};

/// Logger name used when a record does not carry one.
pub const ROOT_LOGGER: &str = "root";

/// Wire names of the fields lifted into [`LogRecord`] members.
pub mod fields {
    pub const NAME: &str = "name";
    pub const LEVELNO: &str = "levelno";
    pub const LEVELNAME: &str = "levelname";
    pub const MSG: &str = "msg";
    pub const ARGS: &str = "args";
    pub const PATHNAME: &str = "pathname";
    pub const FILENAME: &str = "filename";
    pub const MODULE: &str = "module";
    pub const FUNC_NAME: &str = "funcName";
    pub const LINENO: &str = "lineno";
    pub const CREATED: &str = "created";
    pub const MSECS: &str = "msecs";
    pub const EXC_TEXT: &str = "exc_text";
    pub const STACK_INFO: &str = "stack_info";
    pub const THREAD: &str = "thread";
    pub const THREAD_NAME: &str = "threadName";
    pub const PROCESS: &str = "process";
    pub const PROCESS_NAME: &str = "processName";
    pub const MESSAGE: &str = "message";

    /// Fields whose value must be text when present.
    pub const TEXT_FIELDS: &[&str] = &[
        NAME,
        LEVELNAME,
        MSG,
        PATHNAME,
        FILENAME,
        MODULE,
        FUNC_NAME,
        EXC_TEXT,
        STACK_INFO,
        THREAD_NAME,
        PROCESS_NAME,
        MESSAGE,
    ];
}

/// A dynamically typed value as carried in the MessagePack envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Nil,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Array(Vec<FieldValue>),
    Map(Vec<(FieldValue, FieldValue)>),
}

impl FieldValue {
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Nil => "nil",
            FieldValue::Bool(_) => "bool",
            FieldValue::Int(_) | FieldValue::UInt(_) => "integer",
            FieldValue::Float(_) => "float",
            FieldValue::Text(_) => "text",
            FieldValue::Bytes(_) => "bytes",
            FieldValue::Array(_) => "array",
            FieldValue::Map(_) => "map",
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Quoted representation, used by `%r` and inside containers.
    #[must_use]
    pub fn repr(&self) -> String {
        match self {
            FieldValue::Text(s) => format!("'{}'", s.replace('\'', "\\'")),
            other => other.to_string(),
        }
    }

    fn as_integer(&self) -> Option<i128> {
        match self {
            FieldValue::Bool(b) => Some(i128::from(*b)),
            FieldValue::Int(i) => Some(i128::from(*i)),
            FieldValue::UInt(u) => Some(i128::from(*u)),
            FieldValue::Float(f) if f.is_finite() => Some(f.trunc() as i128),
            _ => None,
        }
    }

    fn as_float(&self) -> Option<f64> {
        match self {
            FieldValue::Float(f) => Some(*f),
            FieldValue::Int(i) => Some(*i as f64),
            FieldValue::UInt(u) => Some(*u as f64),
            FieldValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Nil => f.write_str("None"),
            FieldValue::Bool(true) => f.write_str("True"),
            FieldValue::Bool(false) => f.write_str("False"),
            FieldValue::Int(i) => write!(f, "{i}"),
            FieldValue::UInt(u) => write!(f, "{u}"),
            FieldValue::Float(v) => write!(f, "{v:?}"),
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Bytes(b) => write!(f, "b'{}'", b.escape_ascii()),
            FieldValue::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    f.write_str(&item.repr())?;
                }
                f.write_str("]")
            }
            FieldValue::Map(entries) => {
                f.write_str("{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", k.repr(), v.repr())?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Nil => serializer.serialize_unit(),
            FieldValue::Bool(b) => serializer.serialize_bool(*b),
            FieldValue::Int(i) => serializer.serialize_i64(*i),
            FieldValue::UInt(u) => serializer.serialize_u64(*u),
            FieldValue::Float(f) => serializer.serialize_f64(*f),
            FieldValue::Text(s) => serializer.serialize_str(s),
            FieldValue::Bytes(b) => serializer.serialize_bytes(b),
            FieldValue::Array(items) => serializer.collect_seq(items),
            FieldValue::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for FieldValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(FieldValueVisitor)
    }
}

struct FieldValueVisitor;

impl<'de> Visitor<'de> for FieldValueVisitor {
    type Value = FieldValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a MessagePack value")
    }

    fn visit_unit<E: de::Error>(self) -> Result<FieldValue, E> {
        Ok(FieldValue::Nil)
    }

    fn visit_none<E: de::Error>(self) -> Result<FieldValue, E> {
        Ok(FieldValue::Nil)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<FieldValue, D::Error> {
        FieldValue::deserialize(deserializer)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<FieldValue, E> {
        Ok(FieldValue::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<FieldValue, E> {
        Ok(FieldValue::Int(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<FieldValue, E> {
        Ok(i64::try_from(v).map_or(FieldValue::UInt(v), FieldValue::Int))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<FieldValue, E> {
        Ok(FieldValue::Float(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<FieldValue, E> {
        Ok(FieldValue::Text(v.to_owned()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<FieldValue, E> {
        Ok(FieldValue::Text(v))
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<FieldValue, E> {
        Ok(FieldValue::Bytes(v.to_vec()))
    }

    fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<FieldValue, E> {
        Ok(FieldValue::Bytes(v))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<FieldValue, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0).min(1024));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(FieldValue::Array(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<FieldValue, A::Error> {
        let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0).min(1024));
        while let Some(entry) = map.next_entry()? {
            entries.push(entry);
        }
        Ok(FieldValue::Map(entries))
    }
}

/// A single log event produced by a writer.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    /// Name of the logger the record was emitted on; the sink routes by it.
    pub name: String,
    pub levelno: i64,
    pub levelname: String,
    /// Message template, possibly containing `%` directives.
    pub msg: String,
    /// Arguments for `msg`; an array for positional directives.
    pub args: Option<FieldValue>,
    pub pathname: Option<String>,
    pub filename: Option<String>,
    pub module: Option<String>,
    pub func_name: Option<String>,
    pub lineno: Option<i64>,
    /// Creation time in seconds since the Unix epoch.
    pub created: Option<f64>,
    pub msecs: Option<f64>,
    pub exc_text: Option<String>,
    pub stack_info: Option<String>,
    pub thread: Option<u64>,
    pub thread_name: Option<String>,
    pub process: Option<u64>,
    pub process_name: Option<String>,
    /// Pre-rendered message, when the writer already formatted it.
    pub message: Option<String>,
    /// Every field that is not one of the well-known ones above.
    pub extra: BTreeMap<String, FieldValue>,
}

impl LogRecord {
    /// Creates a record stamped with the current time and process.
    pub fn new(name: impl Into<String>, level: LogLevel, msg: impl Into<String>) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let current = std::thread::current();
        Self {
            name: name.into(),
            levelno: level.levelno(),
            levelname: level.as_str().to_string(),
            msg: msg.into(),
            args: None,
            pathname: None,
            filename: None,
            module: None,
            func_name: None,
            lineno: None,
            created: Some(now.as_secs_f64()),
            msecs: Some(f64::from(now.subsec_millis())),
            exc_text: None,
            stack_info: None,
            thread: None,
            thread_name: current.name().map(str::to_string),
            process: Some(u64::from(std::process::id())),
            process_name: None,
            message: None,
            extra: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_args(mut self, args: Vec<FieldValue>) -> Self {
        self.args = Some(FieldValue::Array(args));
        self
    }

    #[must_use]
    pub fn with_location(mut self, pathname: impl Into<String>, lineno: i64) -> Self {
        let pathname = pathname.into();
        self.filename = pathname
            .rsplit(['/', '\\'])
            .next()
            .map(str::to_string);
        self.pathname = Some(pathname);
        self.lineno = Some(lineno);
        self
    }

    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn level(&self) -> LogLevel {
        LogLevel::from_levelno(self.levelno)
    }

    /// Renders the user-facing message.
    ///
    /// A pre-rendered `message` wins. Otherwise `msg` is interpolated with
    /// `args` for the positional `%s %d %i %r %f %%` directives; templates
    /// that cannot be rendered are returned unchanged.
    #[must_use]
    pub fn get_message(&self) -> String {
        if let Some(message) = &self.message {
            return message.clone();
        }
        let rendered = match &self.args {
            None | Some(FieldValue::Nil) => None,
            Some(FieldValue::Array(items)) if items.is_empty() => None,
            Some(FieldValue::Array(items)) => render_percent(&self.msg, items),
            Some(FieldValue::Map(_)) => None,
            Some(single) => render_percent(&self.msg, std::slice::from_ref(single)),
        };
        rendered.unwrap_or_else(|| self.msg.clone())
    }

    /// Builds a record from decoded, text-keyed fields.
    pub fn from_fields(
        entries: impl IntoIterator<Item = (String, FieldValue)>,
    ) -> Result<Self, MalformedRecord> {
        let mut record = LogRecord {
            name: ROOT_LOGGER.to_string(),
            levelno: NOTSET,
            levelname: String::new(),
            msg: String::new(),
            args: None,
            pathname: None,
            filename: None,
            module: None,
            func_name: None,
            lineno: None,
            created: None,
            msecs: None,
            exc_text: None,
            stack_info: None,
            thread: None,
            thread_name: None,
            process: None,
            process_name: None,
            message: None,
            extra: BTreeMap::new(),
        };
        let mut levelno = None;
        let mut levelname = None;

        for (key, value) in entries {
            match key.as_str() {
                fields::NAME => {
                    if let Some(name) = text(fields::NAME, value)? {
                        record.name = name;
                    }
                }
                fields::LEVELNO => levelno = int(fields::LEVELNO, value)?,
                fields::LEVELNAME => levelname = text(fields::LEVELNAME, value)?,
                fields::MSG => record.msg = message_template(value),
                fields::ARGS => {
                    record.args = match value {
                        FieldValue::Nil => None,
                        other => Some(other),
                    }
                }
                fields::PATHNAME => record.pathname = text(fields::PATHNAME, value)?,
                fields::FILENAME => record.filename = text(fields::FILENAME, value)?,
                fields::MODULE => record.module = text(fields::MODULE, value)?,
                fields::FUNC_NAME => record.func_name = text(fields::FUNC_NAME, value)?,
                fields::LINENO => record.lineno = int(fields::LINENO, value)?,
                fields::CREATED => record.created = float(fields::CREATED, value)?,
                fields::MSECS => record.msecs = float(fields::MSECS, value)?,
                fields::EXC_TEXT => record.exc_text = text(fields::EXC_TEXT, value)?,
                fields::STACK_INFO => record.stack_info = text(fields::STACK_INFO, value)?,
                fields::THREAD => record.thread = uint(fields::THREAD, value)?,
                fields::THREAD_NAME => record.thread_name = text(fields::THREAD_NAME, value)?,
                fields::PROCESS => record.process = uint(fields::PROCESS, value)?,
                fields::PROCESS_NAME => {
                    record.process_name = text(fields::PROCESS_NAME, value)?;
                }
                fields::MESSAGE => record.message = text(fields::MESSAGE, value)?,
                _ => {
                    record.extra.insert(key, value);
                }
            }
        }

        record.levelno = match (levelno, levelname.as_deref()) {
            (Some(levelno), _) => levelno,
            (None, Some(name)) => name.parse::<LogLevel>().map_or(NOTSET, LogLevel::levelno),
            (None, None) => NOTSET,
        };
        record.levelname = match levelname {
            Some(name) => name,
            None if record.levelno == NOTSET => "NOTSET".to_string(),
            None => LogLevel::from_levelno(record.levelno).as_str().to_string(),
        };
        Ok(record)
    }

    /// Flattens the record into wire fields, well-known fields first.
    #[must_use]
    pub fn to_fields(&self) -> Vec<(String, FieldValue)> {
        fn opt<T: Into<FieldValue>>(value: Option<T>) -> FieldValue {
            value.map_or(FieldValue::Nil, Into::into)
        }

        let mut out = vec![
            (fields::NAME.to_string(), FieldValue::from(self.name.as_str())),
            (fields::LEVELNO.to_string(), FieldValue::Int(self.levelno)),
            (
                fields::LEVELNAME.to_string(),
                FieldValue::from(self.levelname.as_str()),
            ),
            (fields::MSG.to_string(), FieldValue::from(self.msg.as_str())),
            (
                fields::ARGS.to_string(),
                self.args.clone().unwrap_or(FieldValue::Nil),
            ),
            (fields::PATHNAME.to_string(), opt(self.pathname.clone())),
            (fields::FILENAME.to_string(), opt(self.filename.clone())),
            (fields::MODULE.to_string(), opt(self.module.clone())),
            (fields::FUNC_NAME.to_string(), opt(self.func_name.clone())),
            (fields::LINENO.to_string(), opt(self.lineno)),
            (fields::CREATED.to_string(), opt(self.created)),
            (fields::MSECS.to_string(), opt(self.msecs)),
            (fields::EXC_TEXT.to_string(), opt(self.exc_text.clone())),
            (fields::STACK_INFO.to_string(), opt(self.stack_info.clone())),
            (
                fields::THREAD.to_string(),
                self.thread.map_or(FieldValue::Nil, FieldValue::UInt),
            ),
            (fields::THREAD_NAME.to_string(), opt(self.thread_name.clone())),
            (
                fields::PROCESS.to_string(),
                self.process.map_or(FieldValue::Nil, FieldValue::UInt),
            ),
            (
                fields::PROCESS_NAME.to_string(),
                opt(self.process_name.clone()),
            ),
            (fields::MESSAGE.to_string(), opt(self.message.clone())),
        ];
        out.extend(self.extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        out
    }
}

impl Serialize for LogRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let entries = self.to_fields();
        let mut map = serializer.serialize_map(Some(entries.len()))?;
        for (k, v) in &entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

fn text(field: &'static str, value: FieldValue) -> Result<Option<String>, MalformedRecord> {
    match value {
        FieldValue::Nil => Ok(None),
        FieldValue::Text(s) => Ok(Some(s)),
        other => Err(MalformedRecord::FieldType {
            field,
            expected: "text",
            found: other.type_name(),
        }),
    }
}

fn int(field: &'static str, value: FieldValue) -> Result<Option<i64>, MalformedRecord> {
    match value {
        FieldValue::Nil => Ok(None),
        FieldValue::Int(i) => Ok(Some(i)),
        other => Err(MalformedRecord::FieldType {
            field,
            expected: "integer",
            found: other.type_name(),
        }),
    }
}

fn uint(field: &'static str, value: FieldValue) -> Result<Option<u64>, MalformedRecord> {
    match value {
        FieldValue::Nil => Ok(None),
        FieldValue::UInt(u) => Ok(Some(u)),
        FieldValue::Int(i) if i >= 0 => Ok(Some(i.unsigned_abs())),
        other => Err(MalformedRecord::FieldType {
            field,
            expected: "unsigned integer",
            found: other.type_name(),
        }),
    }
}

fn float(field: &'static str, value: FieldValue) -> Result<Option<f64>, MalformedRecord> {
    match value {
        FieldValue::Nil => Ok(None),
        FieldValue::Float(f) => Ok(Some(f)),
        FieldValue::Int(i) => Ok(Some(i as f64)),
        FieldValue::UInt(u) => Ok(Some(u as f64)),
        other => Err(MalformedRecord::FieldType {
            field,
            expected: "float",
            found: other.type_name(),
        }),
    }
}

// Writers may log non-string objects; they are stringified the way they
// would be rendered.
fn message_template(value: FieldValue) -> String {
    match value {
        FieldValue::Text(s) => s,
        other => other.to_string(),
    }
}

/// Renders `template % args` for positional `%s %r %d %i %f` directives.
///
/// Flags `-` and `0`, a field width and, for `%f`, a precision are applied;
/// `+`, space and `#` are accepted and ignored.
fn render_percent(template: &str, args: &[FieldValue]) -> Option<String> {
    let mut out = String::with_capacity(template.len() + args.len() * 8);
    let mut args = args.iter();
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let mut left_align = false;
        let mut zero_pad = false;
        while let Some(&flag) = chars.peek() {
            match flag {
                '-' => left_align = true,
                '0' => zero_pad = true,
                '+' | ' ' | '#' => {}
                _ => break,
            }
            chars.next();
        }
        let width = take_number(&mut chars).unwrap_or(0);
        let precision = if chars.peek() == Some(&'.') {
            chars.next();
            Some(take_number(&mut chars).unwrap_or(0))
        } else {
            None
        };

        let (piece, numeric) = match chars.next()? {
            '%' => {
                out.push('%');
                continue;
            }
            's' => (args.next()?.to_string(), false),
            'r' => (args.next()?.repr(), false),
            'd' | 'i' => (args.next()?.as_integer()?.to_string(), true),
            'f' | 'F' => {
                let value = args.next()?.as_float()?;
                (format!("{:.*}", precision.unwrap_or(6), value), true)
            }
            _ => return None,
        };
        pad(&mut out, &piece, width, left_align, zero_pad && numeric);
    }
    // Leftover arguments mean the template did not match the call.
    if args.next().is_some() {
        return None;
    }
    Some(out)
}

fn take_number(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Option<usize> {
    let mut number: Option<usize> = None;
    while let Some(digit) = chars.peek().and_then(|c| c.to_digit(10)) {
        number = Some(
            number
                .unwrap_or(0)
                .saturating_mul(10)
                .saturating_add(digit as usize),
        );
        chars.next();
    }
    number
}

fn pad(out: &mut String, piece: &str, width: usize, left_align: bool, zero_pad: bool) {
    let fill = width.saturating_sub(piece.chars().count());
    if left_align {
        out.push_str(piece);
        out.extend(std::iter::repeat(' ').take(fill));
    } else if zero_pad {
        let (sign, digits) = match piece.strip_prefix('-') {
            Some(digits) => ("-", digits),
            None => ("", piece),
        };
        out.push_str(sign);
        out.extend(std::iter::repeat('0').take(fill));
        out.push_str(digits);
    } else {
        out.extend(std::iter::repeat(' ').take(fill));
        out.push_str(piece);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields_of(pairs: Vec<(&str, FieldValue)>) -> Vec<(String, FieldValue)> {
        pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    #[test]
    fn test_from_fields_defaults_to_root_logger() {
        let record = LogRecord::from_fields(fields_of(vec![("msg", "hello".into())])).unwrap();
        assert_eq!(record.name, ROOT_LOGGER);
        assert_eq!(record.levelno, NOTSET);
        assert_eq!(record.levelname, "NOTSET");
        assert_eq!(record.msg, "hello");
    }

    #[test]
    fn test_from_fields_keeps_unknown_fields_as_extra() {
        let record = LogRecord::from_fields(fields_of(vec![
            ("name", "salt.minion".into()),
            ("levelno", FieldValue::Int(20)),
            ("minion_id", "minion-1".into()),
            ("jid", FieldValue::Int(20240101)),
        ]))
        .unwrap();
        assert_eq!(record.name, "salt.minion");
        assert_eq!(record.level(), LogLevel::Info);
        assert_eq!(record.levelname, "INFO");
        assert_eq!(record.extra.get("minion_id"), Some(&"minion-1".into()));
        assert_eq!(record.extra.get("jid"), Some(&FieldValue::Int(20240101)));
    }

    #[test]
    fn test_from_fields_derives_levelno_from_name() {
        let record =
            LogRecord::from_fields(fields_of(vec![("levelname", "WARNING".into())])).unwrap();
        assert_eq!(record.levelno, 30);
    }

    #[test]
    fn test_from_fields_rejects_wrong_types() {
        let err = LogRecord::from_fields(fields_of(vec![("lineno", "twelve".into())]))
            .unwrap_err();
        assert!(matches!(
            err,
            MalformedRecord::FieldType {
                field: "lineno",
                expected: "integer",
                found: "text"
            }
        ));
    }

    #[test]
    fn test_to_fields_round_trips_through_from_fields() {
        let record = LogRecord::new("child.worker", LogLevel::Warning, "disk at %d%%")
            .with_args(vec![FieldValue::Int(93)])
            .with_location("/srv/app/worker.py", 42)
            .with_extra("node", "n1");
        let back = LogRecord::from_fields(record.to_fields()).unwrap();
        assert_eq!(back, record);
        assert_eq!(back.filename.as_deref(), Some("worker.py"));
    }

    #[test]
    fn test_get_message_interpolates_positional_args() {
        let record = LogRecord::new("x", LogLevel::Info, "%s took %.2f s (%d tries, %r) 100%%")
            .with_args(vec![
                "job".into(),
                FieldValue::Float(1.5),
                FieldValue::Int(3),
                "ok".into(),
            ]);
        assert_eq!(record.get_message(), "job took 1.50 s (3 tries, 'ok') 100%");
    }

    #[test]
    fn test_get_message_applies_width_and_flags() {
        let record = LogRecord::new("x", LogLevel::Info, "[%5s|%-5s|%03d|%6.2f|%-4d]")
            .with_args(vec![
                "ab".into(),
                "cd".into(),
                FieldValue::Int(-7),
                FieldValue::Float(3.14159),
                FieldValue::Int(42),
            ]);
        assert_eq!(record.get_message(), "[   ab|cd   |-07|  3.14|42  ]");
    }

    #[test]
    fn test_get_message_falls_back_to_template() {
        let mismatched = LogRecord::new("x", LogLevel::Info, "%s and %s").with_args(vec!["a".into()]);
        assert_eq!(mismatched.get_message(), "%s and %s");

        let extra_args = LogRecord::new("x", LogLevel::Info, "plain").with_args(vec!["a".into()]);
        assert_eq!(extra_args.get_message(), "plain");

        let no_args = LogRecord::new("x", LogLevel::Info, "100%");
        assert_eq!(no_args.get_message(), "100%");
    }

    #[test]
    fn test_get_message_prefers_rendered_message() {
        let mut record = LogRecord::new("x", LogLevel::Info, "%s").with_args(vec!["a".into()]);
        record.message = Some("already rendered".to_string());
        assert_eq!(record.get_message(), "already rendered");
    }

    #[test]
    fn test_non_text_msg_is_stringified() {
        let record = LogRecord::from_fields(fields_of(vec![("msg", FieldValue::Int(7))])).unwrap();
        assert_eq!(record.msg, "7");
    }
}
