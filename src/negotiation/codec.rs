//! Beans and the codecs that read and write them.

use axum::body::Bytes;
use serde::{de::DeserializeOwned, Serialize};
use std::borrow::Cow;
use std::fmt;
use thiserror::Error;

/// Name of a bean type, as declared by a route's `consumes`/`produces`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BeanType(Cow<'static, str>);

impl BeanType {
    pub const fn new(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BeanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A typed value exchanged between codecs and handlers.
#[derive(Debug, Clone, PartialEq)]
pub struct Bean {
    pub ty: BeanType,
    pub value: serde_json::Value,
}

impl Bean {
    pub fn new(ty: BeanType, value: serde_json::Value) -> Self {
        Self { ty, value }
    }

    /// Capture any serializable value as a bean of type `ty`.
    pub fn from_serialize<T: Serialize>(ty: BeanType, value: &T) -> Result<Self, CodecError> {
        let value = serde_json::to_value(value).map_err(|e| CodecError::Encode(e.to_string()))?;
        Ok(Self { ty, value })
    }

    /// Convert the bean into a concrete type.
    pub fn to_typed<T: DeserializeOwned>(&self) -> Result<T, CodecError> {
        serde_json::from_value(self.value.clone()).map_err(|e| CodecError::Decode(e.to_string()))
    }
}

/// Codec failures while reading or writing a body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("failed to encode body: {0}")]
    Encode(String),

    #[error("failed to decode body: {0}")]
    Decode(String),
}

/// Writes beans in one media type.
pub trait Serializer: Send + Sync {
    /// Value for the response `Content-Type` header.
    fn content_type(&self) -> &str;

    fn serialize(&self, bean: &Bean) -> Result<Bytes, CodecError>;
}

/// Reads request bodies of one media type into beans.
pub trait Deserializer: Send + Sync {
    fn deserialize(&self, ty: &BeanType, body: &[u8]) -> Result<Bean, CodecError>;
}

/// `application/json` codec.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl Serializer for JsonCodec {
    fn content_type(&self) -> &str {
        "application/json"
    }

    fn serialize(&self, bean: &Bean) -> Result<Bytes, CodecError> {
        serde_json::to_vec(&bean.value)
            .map(Bytes::from)
            .map_err(|e| CodecError::Encode(e.to_string()))
    }
}

impl Deserializer for JsonCodec {
    fn deserialize(&self, ty: &BeanType, body: &[u8]) -> Result<Bean, CodecError> {
        let value = serde_json::from_slice(body).map_err(|e| CodecError::Decode(e.to_string()))?;
        Ok(Bean::new(ty.clone(), value))
    }
}

/// `text/plain` codec: strings are written verbatim, other values as compact JSON.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextCodec;

impl Serializer for TextCodec {
    fn content_type(&self) -> &str {
        "text/plain; charset=utf-8"
    }

    fn serialize(&self, bean: &Bean) -> Result<Bytes, CodecError> {
        Ok(match &bean.value {
            serde_json::Value::String(s) => Bytes::from(s.clone()),
            other => Bytes::from(other.to_string()),
        })
    }
}

impl Deserializer for TextCodec {
    fn deserialize(&self, ty: &BeanType, body: &[u8]) -> Result<Bean, CodecError> {
        let text = std::str::from_utf8(body).map_err(|e| CodecError::Decode(e.to_string()))?;
        Ok(Bean::new(ty.clone(), serde_json::Value::String(text.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Greeting {
        message: String,
    }

    const GREETING: BeanType = BeanType::new("greeting");

    #[test]
    fn test_bean_typed_conversion() {
        let bean = Bean::from_serialize(GREETING, &Greeting { message: "hi".into() }).unwrap();
        assert_eq!(bean.ty, BeanType::named("greeting"));
        let back: Greeting = bean.to_typed().unwrap();
        assert_eq!(back.message, "hi");
    }

    #[test]
    fn test_json_codec() {
        let bean = JsonCodec.deserialize(&GREETING, br#"{"message":"hello"}"#).unwrap();
        assert_eq!(bean.value["message"], "hello");
        let bytes = Serializer::serialize(&JsonCodec, &bean).unwrap();
        assert_eq!(&bytes[..], br#"{"message":"hello"}"#);

        assert!(JsonCodec.deserialize(&GREETING, b"{not json").is_err());
    }

    #[test]
    fn test_text_codec() {
        let bean = TextCodec.deserialize(&GREETING, b"plain words").unwrap();
        let bytes = Serializer::serialize(&TextCodec, &bean).unwrap();
        assert_eq!(&bytes[..], b"plain words");

        let number = Bean::new(GREETING, serde_json::json!({"n": 1}));
        assert_eq!(&Serializer::serialize(&TextCodec, &number).unwrap()[..], br#"{"n":1}"#);
    }
}
