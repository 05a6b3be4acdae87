//! `extra_data` travels as a flat JSON object but is held as an ordered list.

use std::fmt;

use serde::de::{Error as _, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserializer, Serializer};

use super::model::ExtraValue;

type ExtraFields = Vec<(String, ExtraValue)>;

pub fn serialize_extra_as_map<S>(fields: &[(String, ExtraValue)], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut map = serializer.serialize_map(Some(fields.len()))?;
    for (key, value) in fields {
        map.serialize_entry(key, value)?;
    }
    map.end()
}

/// Rebuild the list in document order. A repeated key overwrites the
/// earlier value in place, matching `NormalizedEvent::set_extra`.
pub fn deserialize_extra_from_map<'de, D>(deserializer: D) -> Result<ExtraFields, D::Error>
where
    D: Deserializer<'de>,
{
    struct ExtraVisitor;

    impl<'de> Visitor<'de> for ExtraVisitor {
        type Value = ExtraFields;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("an object of string, number or boolean values")
        }

        fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut fields: ExtraFields = Vec::with_capacity(access.size_hint().unwrap_or(0).min(64));
            while let Some(key) = access.next_key::<String>()? {
                if key.is_empty() {
                    return Err(A::Error::custom("extra_data keys must not be empty"));
                }
                let value: ExtraValue = access.next_value()?;
                match fields.iter_mut().find(|(k, _)| *k == key) {
                    Some(slot) => slot.1 = value,
                    None => fields.push((key, value)),
                }
            }
            Ok(fields)
        }

        // A missing bag serializes as `null` from some exporters
        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(Vec::new())
        }
    }

    deserializer.deserialize_any(ExtraVisitor)
}
