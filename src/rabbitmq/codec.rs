// src/rabbitmq/codec.rs
use serde::de::value::{MapDeserializer, SeqDeserializer, StringDeserializer};
use serde::de::{DeserializeOwned, Deserializer, IntoDeserializer, Visitor};
use serde::{forward_to_deserialize_any, Serialize};
use serde_json::{Map, Value};

use super::errors::{MessagingError, Result};

/// Serializes a payload to its camelCase JSON body.
pub fn encode<T: Serialize>(payload: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(payload)?)
}

/// Parses a JSON body into `T`. Property names and unit enum variants are
/// matched without regard to case, so `OrderId`, `ORDERID` and `orderId`
/// all bind to `order_id`, and `"confirmed"` binds to `Confirmed`.
pub fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| MessagingError::DeserializationFailed(e.to_string()))?;
    T::deserialize(CaseInsensitive(value))
        .map_err(|e| MessagingError::DeserializationFailed(e.to_string()))
}

// Wraps a parsed JSON value and renames keys to the field names the target
// type asks for, recursively.
struct CaseInsensitive(Value);

impl CaseInsensitive {
    fn entries(map: Map<String, Value>, fields: &[&str]) -> Vec<(String, CaseInsensitive)> {
        map.into_iter()
            .map(|(key, value)| {
                let key = canonical(fields, key);
                (key, CaseInsensitive(value))
            })
            .collect()
    }
}

fn canonical(names: &[&str], key: String) -> String {
    names
        .iter()
        .find(|name| name.eq_ignore_ascii_case(&key))
        .map(|name| name.to_string())
        .unwrap_or(key)
}

impl<'de> IntoDeserializer<'de, serde_json::Error> for CaseInsensitive {
    type Deserializer = Self;

    fn into_deserializer(self) -> Self {
        self
    }
}

impl<'de> Deserializer<'de> for CaseInsensitive {
    type Error = serde_json::Error;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> std::result::Result<V::Value, Self::Error> {
        match self.0 {
            Value::Object(map) => {
                visitor.visit_map(MapDeserializer::new(Self::entries(map, &[]).into_iter()))
            }
            Value::Array(items) => {
                visitor.visit_seq(SeqDeserializer::new(items.into_iter().map(CaseInsensitive)))
            }
            other => other.deserialize_any(visitor),
        }
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> std::result::Result<V::Value, Self::Error> {
        match self.0 {
            Value::Null => visitor.visit_none(),
            other => visitor.visit_some(CaseInsensitive(other)),
        }
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> std::result::Result<V::Value, Self::Error> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> std::result::Result<V::Value, Self::Error> {
        match self.0 {
            Value::Object(map) => {
                visitor.visit_map(MapDeserializer::new(Self::entries(map, fields).into_iter()))
            }
            other => other.deserialize_struct(name, fields, visitor),
        }
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> std::result::Result<V::Value, Self::Error> {
        match self.0 {
            Value::String(variant) => {
                let access: StringDeserializer<serde_json::Error> =
                    canonical(variants, variant).into_deserializer();
                visitor.visit_enum(access)
            }
            other => other.deserialize_enum(name, variants, visitor),
        }
    }

    forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf unit unit_struct seq tuple tuple_struct map identifier ignored_any
    }
}
