//! Record file decoding.
//!
//! A record file is a JSON object whose values are records. The keys are
//! file-local labels and are dropped after decoding; a record is identified
//! by its own `id` field.

use std::fmt;
use std::marker::PhantomData;

use serde::de::{Deserialize, Deserializer, MapAccess, Visitor};

use crate::error::RecordError;
use crate::record::Identity;

/// Decode one record file.
///
/// Records come back ordered by their file-local key so the result does not
/// depend on hash order. A key that appears twice is an error rather than a
/// silent overwrite.
pub fn parse_records<R: Identity>(bytes: &[u8]) -> Result<Vec<R>, RecordError> {
    let Keyed(mut entries) = serde_json::from_slice::<Keyed<R>>(bytes)?;
    entries.sort_by(|(a, _), (b, _)| a.cmp(b));

    let mut records = Vec::with_capacity(entries.len());
    let mut previous: Option<String> = None;
    for (key, record) in entries {
        if previous.as_deref() == Some(key.as_str()) {
            return Err(RecordError::DuplicateKey { key });
        }
        if let Err(reason) = record.validate() {
            return Err(RecordError::Invalid { key, reason });
        }
        records.push(record);
        previous = Some(key);
    }
    Ok(records)
}

/// Every `(key, record)` pair of the top-level object, repeats included.
struct Keyed<R>(Vec<(String, R)>);

impl<'de, R: Identity> Deserialize<'de> for Keyed<R> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(KeyedVisitor(PhantomData))
    }
}

struct KeyedVisitor<R>(PhantomData<fn() -> R>);

impl<'de, R: Identity> Visitor<'de> for KeyedVisitor<R> {
    type Value = Keyed<R>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an object of user records")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
        while let Some((key, record)) = map.next_entry::<String, R>()? {
            entries.push((key, record));
        }
        Ok(Keyed(entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::User;

    #[test]
    fn parses_records_and_drops_keys() {
        let json = br#"{
            "u2": {"id": "2", "username": "bob", "password": "pw", "isAdmin": true},
            "u1": {"id": "1", "username": "alice", "password": "pw",
                   "email": "alice@example.com", "emailVerified": true,
                   "preferredLanguage": "en-US"}
        }"#;
        let users: Vec<User> = parse_records(json).unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].id, "1");
        assert_eq!(users[0].email, "alice@example.com");
        assert!(users[0].email_verified);
        assert_eq!(users[0].preferred_language.as_str(), "en-US");
        assert_eq!(users[1].id, "2");
        assert!(users[1].is_admin);
    }

    #[test]
    fn empty_object_is_no_records() {
        let users: Vec<User> = parse_records(b"{}").unwrap();
        assert!(users.is_empty());
    }

    #[test]
    fn syntax_error_is_decode_error() {
        let err = parse_records::<User>(b"{\"u1\": {").unwrap_err();
        assert!(matches!(err, RecordError::Decode(_)));
    }

    #[test]
    fn top_level_array_is_rejected() {
        let err = parse_records::<User>(br#"[{"id":"1","username":"a","password":"p"}]"#)
            .unwrap_err();
        assert!(matches!(err, RecordError::Decode(_)));
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let err = parse_records::<User>(br#"{"u1": {"id": "1", "password": "p"}}"#).unwrap_err();
        assert!(err.to_string().contains("username"));
    }

    #[test]
    fn wrong_field_type_is_rejected() {
        let err = parse_records::<User>(
            br#"{"u1": {"id": "1", "username": "a", "password": "p", "isAdmin": "yes"}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, RecordError::Decode(_)));
    }

    #[test]
    fn bad_language_tag_is_rejected() {
        let err = parse_records::<User>(
            br#"{"u1": {"id": "1", "username": "a", "password": "p", "preferredLanguage": "!!"}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, RecordError::Decode(_)));
    }

    #[test]
    fn empty_id_names_the_key() {
        let err = parse_records::<User>(br#"{"ghost": {"id": "", "username": "a", "password": "p"}}"#)
            .unwrap_err();
        match err {
            RecordError::Invalid { key, .. } => assert_eq!(key, "ghost"),
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn repeated_key_is_rejected() {
        let err = parse_records::<User>(
            br#"{
                "k": {"id": "1", "username": "alice", "password": "pw"},
                "k": {"id": "2", "username": "bob", "password": "pw"}
            }"#,
        )
        .unwrap_err();
        match err {
            RecordError::DuplicateKey { key } => assert_eq!(key, "k"),
            other => panic!("expected DuplicateKey, got {other:?}"),
        }
    }
}
