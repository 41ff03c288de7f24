// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! MessagePack envelope for log records.
//!
//! Every message is a single MessagePack value: either `nil`, the stop
//! sentinel, or a map of field names to values describing one record.
//! Older writers encoded keys and string values as raw byte strings; those
//! are decoded as UTF-8 text before the record is built.

use serde::Deserialize;

use crate::error::MalformedRecord;
use crate::record::{fields, FieldValue, LogRecord};

/// The stop sentinel on the wire: a MessagePack `nil`.
pub const SENTINEL: &[u8] = &[0xc0];

/// Outcome of decoding one message.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Sentinel,
    Record(LogRecord),
}

pub fn encode_record(record: &LogRecord) -> Result<Vec<u8>, rmp_serde::encode::Error> {
    rmp_serde::to_vec(record)
}

#[must_use]
pub fn encode_sentinel() -> Vec<u8> {
    SENTINEL.to_vec()
}

/// Decodes one message.
///
/// The sentinel check happens before anything else so that it can never be
/// confused with a record. Any top-level value other than `nil` or a map is
/// rejected, as is a payload with bytes left after its value.
pub fn decode(payload: &[u8]) -> Result<Decoded, MalformedRecord> {
    if payload == SENTINEL {
        return Ok(Decoded::Sentinel);
    }

    let mut rest = payload;
    let value = {
        let mut deserializer = rmp_serde::Deserializer::new(&mut rest);
        FieldValue::deserialize(&mut deserializer)?
    };
    if !rest.is_empty() {
        return Err(MalformedRecord::TrailingBytes(rest.len()));
    }

    match value {
        FieldValue::Map(mut entries) => {
            normalize_legacy(&mut entries)?;
            let entries = entries
                .into_iter()
                .map(|(key, value)| match key {
                    FieldValue::Text(key) => Ok((key, value)),
                    other => Err(MalformedRecord::InvalidKey(other.type_name().to_string())),
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Decoded::Record(LogRecord::from_fields(entries)?))
        }
        other => Err(MalformedRecord::NotAMapping(other.type_name())),
    }
}

/// Rewrites byte-string keys and values of a record map as text, in place.
///
/// Keys must decode as UTF-8. Values are decoded when they are valid UTF-8
/// (recursively through arrays and maps); a well-known text field that is
/// not valid UTF-8 makes the whole record malformed, while other binary
/// values are kept as bytes.
pub fn normalize_legacy(entries: &mut [(FieldValue, FieldValue)]) -> Result<(), MalformedRecord> {
    for (key, value) in entries.iter_mut() {
        if let FieldValue::Bytes(bytes) = key {
            match String::from_utf8(std::mem::take(bytes)) {
                Ok(text) => *key = FieldValue::Text(text),
                Err(e) => {
                    return Err(MalformedRecord::InvalidKey(format!(
                        "non UTF-8 bytes b'{}'",
                        e.as_bytes().escape_ascii()
                    )))
                }
            }
        }
        normalize_value(value);
        if let (FieldValue::Text(key), FieldValue::Bytes(_)) = (&*key, &*value) {
            if fields::TEXT_FIELDS.contains(&key.as_str()) {
                return Err(MalformedRecord::InvalidUtf8 { field: key.clone() });
            }
        }
    }
    Ok(())
}

fn normalize_value(value: &mut FieldValue) {
    match value {
        FieldValue::Bytes(bytes) => match String::from_utf8(std::mem::take(bytes)) {
            Ok(text) => *value = FieldValue::Text(text),
            Err(e) => *bytes = e.into_bytes(),
        },
        FieldValue::Array(items) => items.iter_mut().for_each(normalize_value),
        FieldValue::Map(entries) => {
            for (k, v) in entries.iter_mut() {
                normalize_value(k);
                normalize_value(v);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::LogLevel;
    use proptest::prelude::*;

    fn to_legacy(record: &LogRecord) -> Vec<u8> {
        let entries = record
            .to_fields()
            .into_iter()
            .map(|(k, v)| {
                let v = match v {
                    FieldValue::Text(s) => FieldValue::Bytes(s.into_bytes()),
                    other => other,
                };
                (FieldValue::Bytes(k.into_bytes()), v)
            })
            .collect();
        rmp_serde::to_vec(&FieldValue::Map(entries)).unwrap()
    }

    #[test]
    fn test_sentinel_is_nil() {
        assert_eq!(rmp_serde::to_vec(&FieldValue::Nil).unwrap(), SENTINEL);
        assert_eq!(decode(&encode_sentinel()).unwrap(), Decoded::Sentinel);
    }

    #[test]
    fn test_record_decodes_to_equal_record() {
        let record = LogRecord::new("salt.master", LogLevel::Error, "boom %s")
            .with_args(vec!["now".into()])
            .with_extra("attempt", FieldValue::Int(2));
        let payload = encode_record(&record).unwrap();
        assert_eq!(decode(&payload).unwrap(), Decoded::Record(record));
    }

    #[test]
    fn test_empty_map_is_a_root_record_not_a_sentinel() {
        let payload = rmp_serde::to_vec(&FieldValue::Map(vec![])).unwrap();
        match decode(&payload).unwrap() {
            Decoded::Record(record) => assert_eq!(record.name, "root"),
            Decoded::Sentinel => panic!("empty map must not be a sentinel"),
        }
    }

    #[test]
    fn test_legacy_bytes_are_normalized() {
        let record = LogRecord::new("legacy.writer", LogLevel::Info, "hello %s")
            .with_args(vec![FieldValue::Bytes(b"world".to_vec())])
            .with_extra("host", "db-1");
        let decoded = decode(&to_legacy(&record)).unwrap();

        let mut expected = record.clone();
        expected.args = Some(FieldValue::Array(vec!["world".into()]));
        assert_eq!(decoded, Decoded::Record(expected));
    }

    #[test]
    fn test_binary_extra_survives_normalization() {
        let mut entries = vec![
            (FieldValue::Bytes(b"name".to_vec()), FieldValue::Bytes(b"x".to_vec())),
            (FieldValue::from("blob"), FieldValue::Bytes(vec![0xff, 0xfe])),
        ];
        normalize_legacy(&mut entries).unwrap();
        assert_eq!(entries[0], (FieldValue::from("name"), FieldValue::from("x")));
        assert_eq!(entries[1].1, FieldValue::Bytes(vec![0xff, 0xfe]));
    }

    #[test]
    fn test_invalid_utf8_in_text_field_is_malformed() {
        let payload = rmp_serde::to_vec(&FieldValue::Map(vec![(
            FieldValue::from("name"),
            FieldValue::Bytes(vec![0xff]),
        )]))
        .unwrap();
        assert!(matches!(
            decode(&payload),
            Err(MalformedRecord::InvalidUtf8 { field }) if field == "name"
        ));
    }

    #[test]
    fn test_non_mapping_values_are_malformed() {
        let payload = rmp_serde::to_vec(&FieldValue::Int(42)).unwrap();
        assert!(matches!(
            decode(&payload),
            Err(MalformedRecord::NotAMapping("integer"))
        ));

        let payload = rmp_serde::to_vec(&FieldValue::Map(vec![(
            FieldValue::Int(1),
            FieldValue::Nil,
        )]))
        .unwrap();
        assert!(matches!(decode(&payload), Err(MalformedRecord::InvalidKey(_))));
    }

    #[test]
    fn test_nil_prefix_with_garbage_is_not_a_sentinel() {
        assert!(matches!(
            decode(&[0xc0, 0x93, 0x01]),
            Err(MalformedRecord::TrailingBytes(2))
        ));
    }

    #[test]
    fn test_record_followed_by_garbage_is_malformed() {
        let mut payload =
            encode_record(&LogRecord::new("child", LogLevel::Info, "hello")).unwrap();
        payload.extend_from_slice(&[0x01, 0x02, 0x03]);
        assert!(matches!(
            decode(&payload),
            Err(MalformedRecord::TrailingBytes(3))
        ));
    }

    #[test]
    fn test_garbage_is_undecodable() {
        assert!(matches!(decode(&[]), Err(MalformedRecord::Undecodable(_))));
        assert!(matches!(
            decode(&[0xc1]),
            Err(MalformedRecord::Undecodable(_))
        ));
    }

    proptest! {
        #[test]
        fn legacy_and_text_encodings_decode_identically(
            name in "[a-z][a-z0-9_.]{0,20}",
            msg in "\\PC{0,64}",
            key in "x_[a-z_]{1,12}",
            value in "\\PC{0,32}",
            lineno in 0i64..100_000,
        ) {
            let record = LogRecord::new(name, LogLevel::Debug, msg)
                .with_location("/tmp/module.py", lineno)
                .with_extra(key, value);
            let text = decode(&encode_record(&record).unwrap()).unwrap();
            let legacy = decode(&to_legacy(&record)).unwrap();
            prop_assert_eq!(&text, &legacy);
            prop_assert_eq!(text, Decoded::Record(record));
        }
    }
}
