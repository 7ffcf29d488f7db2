//! Codec selection and caching.
//!
//! # Responsibilities
//! - Hold codec factories registered per (bean type, media type)
//! - Rank `Accept` preferences and pick the first registered serializer
//! - Look up the deserializer named by `Content-Type`
//! - Cache constructed codecs per (bean type, media type)
//!
//! # Design Decisions
//! - Registrations are frozen when the negotiator is built
//! - Caches are owned by the negotiator instance (no global state)
//! - At most one codec instance is ever retained per cache key

use dashmap::DashMap;
use std::sync::Arc;

use crate::negotiation::codec::{BeanType, Deserializer, JsonCodec, Serializer, TextCodec};
use crate::negotiation::media::{parse_accept, MediaType};
use crate::negotiation::NegotiationError;

type SerializerFactory = Arc<dyn Fn() -> Arc<dyn Serializer> + Send + Sync>;
type DeserializerFactory = Arc<dyn Fn() -> Arc<dyn Deserializer> + Send + Sync>;

struct Registration<F> {
    /// `None` applies to every bean type.
    bean: Option<BeanType>,
    media: MediaType,
    factory: F,
}

impl<F> Registration<F> {
    fn applies_to(&self, bean: &BeanType) -> bool {
        self.bean.as_ref().map_or(true, |b| b == bean)
    }
}

/// Collects codec registrations before the negotiator is frozen.
#[derive(Default)]
pub struct NegotiatorBuilder {
    serializers: Vec<Registration<SerializerFactory>>,
    deserializers: Vec<Registration<DeserializerFactory>>,
}

impl NegotiatorBuilder {
    /// Register a serializer factory for one bean type, or every bean type when `bean` is `None`.
    ///
    /// Bean-specific registrations are consulted before bean-agnostic ones.
    pub fn serializer<F>(
        mut self,
        bean: Option<BeanType>,
        media: &str,
        factory: F,
    ) -> Result<Self, NegotiationError>
    where
        F: Fn() -> Arc<dyn Serializer> + Send + Sync + 'static,
    {
        let media = parse_concrete(media)?;
        self.serializers.push(Registration {
            bean,
            media,
            factory: Arc::new(factory),
        });
        Ok(self)
    }

    /// Register a deserializer factory for one bean type, or every bean type when `bean` is `None`.
    pub fn deserializer<F>(
        mut self,
        bean: Option<BeanType>,
        media: &str,
        factory: F,
    ) -> Result<Self, NegotiationError>
    where
        F: Fn() -> Arc<dyn Deserializer> + Send + Sync + 'static,
    {
        let media = parse_concrete(media)?;
        self.deserializers.push(Registration {
            bean,
            media,
            factory: Arc::new(factory),
        });
        Ok(self)
    }

    pub fn build(mut self) -> Negotiator {
        // Stable: bean-specific registrations first, registration order otherwise
        self.serializers.sort_by_key(|r| r.bean.is_none());
        self.deserializers.sort_by_key(|r| r.bean.is_none());
        Negotiator {
            serializers: self.serializers,
            deserializers: self.deserializers,
            serializer_cache: DashMap::new(),
            deserializer_cache: DashMap::new(),
        }
    }
}

fn parse_concrete(media: &str) -> Result<MediaType, NegotiationError> {
    MediaType::parse(media)
        .filter(|m| m.kind() != "*" && m.subtype() != "*")
        .ok_or_else(|| NegotiationError::InvalidMediaType(media.to_string()))
}

/// Selects codecs from `Accept`/`Content-Type` headers.
///
/// Created with the server and dropped with it; the caches live exactly as
/// long as the negotiator.
pub struct Negotiator {
    serializers: Vec<Registration<SerializerFactory>>,
    deserializers: Vec<Registration<DeserializerFactory>>,
    serializer_cache: DashMap<(BeanType, MediaType), Arc<dyn Serializer>>,
    deserializer_cache: DashMap<(BeanType, MediaType), Arc<dyn Deserializer>>,
}

impl Negotiator {
    pub fn builder() -> NegotiatorBuilder {
        NegotiatorBuilder::default()
    }

    /// Negotiator with JSON and plain-text codecs for every bean type.
    pub fn with_defaults() -> Self {
        let json = MediaType::new("application", "json");
        let text = MediaType::new("text", "plain");
        let mut builder = Self::builder();
        builder.serializers.push(Registration {
            bean: None,
            media: json.clone(),
            factory: Arc::new(|| Arc::new(JsonCodec) as Arc<dyn Serializer>),
        });
        builder.serializers.push(Registration {
            bean: None,
            media: text.clone(),
            factory: Arc::new(|| Arc::new(TextCodec) as Arc<dyn Serializer>),
        });
        builder.deserializers.push(Registration {
            bean: None,
            media: json,
            factory: Arc::new(|| Arc::new(JsonCodec) as Arc<dyn Deserializer>),
        });
        builder.deserializers.push(Registration {
            bean: None,
            media: text,
            factory: Arc::new(|| Arc::new(TextCodec) as Arc<dyn Deserializer>),
        });
        builder.build()
    }

    /// Pick a serializer for `bean` from an `Accept` header value.
    pub fn create_serializer(
        &self,
        bean: &BeanType,
        accept: Option<&str>,
    ) -> Result<Arc<dyn Serializer>, NegotiationError> {
        for range in parse_accept(accept) {
            let found = self
                .serializers
                .iter()
                .find(|r| r.applies_to(bean) && range.media.covers(&r.media));
            if let Some(registration) = found {
                let key = (bean.clone(), registration.media.clone());
                if let Some(cached) = self.serializer_cache.get(&key) {
                    return Ok(Arc::clone(cached.value()));
                }
                let serializer = self
                    .serializer_cache
                    .entry(key)
                    .or_insert_with(|| {
                        tracing::debug!(bean = %bean, media = %registration.media, "Serializer created");
                        (registration.factory)()
                    });
                return Ok(Arc::clone(serializer.value()));
            }
        }
        Err(NegotiationError::NoAcceptableFormat {
            bean: bean.clone(),
            accept: accept.unwrap_or("*/*").to_string(),
        })
    }

    /// Pick the deserializer for `bean` named by a `Content-Type` header value.
    pub fn create_deserializer(
        &self,
        bean: &BeanType,
        content_type: Option<&str>,
    ) -> Result<Arc<dyn Deserializer>, NegotiationError> {
        let unsupported = || NegotiationError::UnsupportedFormat {
            bean: bean.clone(),
            content_type: content_type.unwrap_or("").to_string(),
        };
        let media = content_type
            .and_then(MediaType::parse)
            .ok_or_else(unsupported)?;

        let key = (bean.clone(), media);
        if let Some(cached) = self.deserializer_cache.get(&key) {
            return Ok(Arc::clone(cached.value()));
        }
        let registration = self
            .deserializers
            .iter()
            .find(|r| r.applies_to(bean) && r.media == key.1)
            .ok_or_else(unsupported)?;
        let deserializer = self.deserializer_cache.entry(key).or_insert_with(|| {
            tracing::debug!(bean = %bean, media = %registration.media, "Deserializer created");
            (registration.factory)()
        });
        Ok(Arc::clone(deserializer.value()))
    }

    /// Number of cached serializer instances.
    pub fn cached_serializers(&self) -> usize {
        self.serializer_cache.len()
    }

    /// Number of cached deserializer instances.
    pub fn cached_deserializers(&self) -> usize {
        self.deserializer_cache.len()
    }
}

impl Default for Negotiator {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::negotiation::codec::{Bean, CodecError};
    use axum::body::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    struct XmlCodec;

    impl Serializer for XmlCodec {
        fn content_type(&self) -> &str {
            "text/xml"
        }

        fn serialize(&self, bean: &Bean) -> Result<Bytes, CodecError> {
            Ok(Bytes::from(format!("<{0}>{1}</{0}>", bean.ty, bean.value)))
        }
    }

    const ORDER: BeanType = BeanType::new("order");

    fn counting_negotiator(created: Arc<AtomicUsize>) -> Negotiator {
        let json_created = Arc::clone(&created);
        Negotiator::builder()
            .serializer(Some(ORDER), "text/xml", move || {
                created.fetch_add(1, Ordering::SeqCst);
                Arc::new(XmlCodec)
            })
            .unwrap()
            .serializer(Some(ORDER), "application/json", move || {
                json_created.fetch_add(1, Ordering::SeqCst);
                Arc::new(JsonCodec)
            })
            .unwrap()
            .deserializer(None, "application/json", || Arc::new(JsonCodec))
            .unwrap()
            .build()
    }

    #[test]
    fn test_quality_ranking_selects_json() {
        let negotiator = counting_negotiator(Arc::new(AtomicUsize::new(0)));
        let serializer = negotiator
            .create_serializer(&ORDER, Some("text/xml; q=0.8, application/json"))
            .unwrap();
        assert_eq!(serializer.content_type(), "application/json");

        let xml = negotiator
            .create_serializer(&ORDER, Some("application/json;q=0.1, text/xml"))
            .unwrap();
        assert_eq!(xml.content_type(), "text/xml");
    }

    #[test]
    fn test_wildcard_uses_registration_order() {
        let negotiator = counting_negotiator(Arc::new(AtomicUsize::new(0)));
        let any = negotiator.create_serializer(&ORDER, None).unwrap();
        assert_eq!(any.content_type(), "text/xml");
        let app = negotiator
            .create_serializer(&ORDER, Some("application/*"))
            .unwrap();
        assert_eq!(app.content_type(), "application/json");
    }

    #[test]
    fn test_serializer_is_cached() {
        let created = Arc::new(AtomicUsize::new(0));
        let negotiator = counting_negotiator(Arc::clone(&created));

        let first = negotiator
            .create_serializer(&ORDER, Some("application/json"))
            .unwrap();
        let second = negotiator
            .create_serializer(&ORDER, Some("application/json; q=0.9"))
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert_eq!(negotiator.cached_serializers(), 1);
    }

    #[test]
    fn test_concurrent_first_creation_retains_one() {
        let created = Arc::new(AtomicUsize::new(0));
        let negotiator = Arc::new(counting_negotiator(Arc::clone(&created)));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let negotiator = Arc::clone(&negotiator);
                thread::spawn(move || {
                    negotiator
                        .create_serializer(&ORDER, Some("text/xml"))
                        .unwrap()
                })
            })
            .collect();
        let instances: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(negotiator.cached_serializers(), 1);
        assert!(instances.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(created.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_no_acceptable_format() {
        let negotiator = counting_negotiator(Arc::new(AtomicUsize::new(0)));
        let err = negotiator
            .create_serializer(&ORDER, Some("image/png"))
            .err()
            .unwrap();
        assert!(matches!(err, NegotiationError::NoAcceptableFormat { .. }));

        // Unregistered bean type
        let err = negotiator
            .create_serializer(&BeanType::new("invoice"), Some("*/*"))
            .err()
            .unwrap();
        assert!(matches!(err, NegotiationError::NoAcceptableFormat { .. }));
    }

    #[test]
    fn test_deserializer_lookup_and_cache() {
        let negotiator = counting_negotiator(Arc::new(AtomicUsize::new(0)));
        let first = negotiator
            .create_deserializer(&ORDER, Some("application/json; charset=utf-8"))
            .unwrap();
        let second = negotiator
            .create_deserializer(&ORDER, Some("Application/Json"))
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(negotiator.cached_deserializers(), 1);

        let bean = first.deserialize(&ORDER, br#"{"id":7}"#).unwrap();
        assert_eq!(bean.value["id"], 7);
    }

    #[test]
    fn test_unsupported_format() {
        let negotiator = counting_negotiator(Arc::new(AtomicUsize::new(0)));
        for content_type in [Some("text/xml"), Some("garbage"), None] {
            let err = negotiator
                .create_deserializer(&ORDER, content_type)
                .err()
                .unwrap();
            assert!(matches!(err, NegotiationError::UnsupportedFormat { .. }));
        }
    }

    #[test]
    fn test_registration_rejects_wildcards() {
        let result = Negotiator::builder().serializer(None, "application/*", || Arc::new(JsonCodec));
        assert!(result.is_err());
    }

    #[test]
    fn test_defaults_cover_json_and_text() {
        let negotiator = Negotiator::with_defaults();
        let bean = BeanType::new("anything");
        assert_eq!(
            negotiator
                .create_serializer(&bean, Some("text/plain"))
                .unwrap()
                .content_type(),
            "text/plain; charset=utf-8"
        );
        assert!(negotiator
            .create_deserializer(&bean, Some("application/json"))
            .is_ok());
    }
}
