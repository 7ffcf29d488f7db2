//! Media type parsing for `Accept` and `Content-Type` values.

use std::fmt;

/// A `type/subtype` pair, lower-cased, parameters stripped.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaType {
    kind: String,
    subtype: String,
}

impl MediaType {
    pub(crate) fn new(kind: &str, subtype: &str) -> Self {
        Self {
            kind: kind.to_ascii_lowercase(),
            subtype: subtype.to_ascii_lowercase(),
        }
    }

    /// Parse the essence of a media type (`text/html; charset=utf-8` → `text/html`).
    pub fn parse(value: &str) -> Option<Self> {
        let essence = value.split(';').next()?.trim();
        let (kind, subtype) = essence.split_once('/')?;
        let (kind, subtype) = (kind.trim(), subtype.trim());
        if kind.is_empty() || subtype.is_empty() || subtype.contains('/') {
            return None;
        }
        Some(Self {
            kind: kind.to_ascii_lowercase(),
            subtype: subtype.to_ascii_lowercase(),
        })
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn subtype(&self) -> &str {
        &self.subtype
    }

    /// True if this (possibly wildcard) range covers `concrete`.
    pub fn covers(&self, concrete: &MediaType) -> bool {
        (self.kind == "*" || self.kind == concrete.kind)
            && (self.subtype == "*" || self.subtype == concrete.subtype)
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.subtype)
    }
}

/// One entry of an `Accept` header with its quality value.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaRange {
    pub media: MediaType,
    pub quality: f32,
}

/// Parse an `Accept` header into media ranges ranked by descending quality.
///
/// Entries with equal quality keep their declaration order. Entries with
/// `q=0` or an unparseable media type are dropped; an unparseable `q`
/// counts as `q=0`. A missing or blank header is `*/*`.
pub fn parse_accept(header: Option<&str>) -> Vec<MediaRange> {
    let header = match header.map(str::trim) {
        Some(h) if !h.is_empty() => h,
        _ => {
            return vec![MediaRange {
                media: MediaType::new("*", "*"),
                quality: 1.0,
            }]
        }
    };

    let mut ranges: Vec<MediaRange> = header
        .split(',')
        .filter_map(|entry| {
            let mut parts = entry.split(';');
            let media = MediaType::parse(parts.next()?)?;
            let mut quality = 1.0_f32;
            for param in parts {
                if let Some((name, value)) = param.split_once('=') {
                    if name.trim().eq_ignore_ascii_case("q") {
                        quality = value
                            .trim()
                            .parse::<f32>()
                            .ok()
                            .filter(|q| q.is_finite())
                            .map(|q| q.clamp(0.0, 1.0))
                            .unwrap_or(0.0);
                    }
                }
            }
            (quality > 0.0).then_some(MediaRange { media, quality })
        })
        .collect();

    // Stable sort: ties keep declaration order
    ranges.sort_by(|a, b| b.quality.total_cmp(&a.quality));
    ranges
}
