//! Pull the few facts this check needs out of a SAML metadata document
//!
//! The document element must be an `EntityDescriptor` or an
//! `EntitiesDescriptor`. Its `validUntil` is the one that counts, and the
//! `entityID` of every `EntityDescriptor` element in the tree is collected.
//! Comments and processing instructions are never looked at.

use std::fmt;

use chrono::{DateTime, FixedOffset, Utc};
use roxmltree::Document;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RootKind {
    /// A single entity
    EntityDescriptor,
    /// An aggregate of entities, as published by federations
    EntitiesDescriptor,
}

impl fmt::Display for RootKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            RootKind::EntityDescriptor => f.write_str("EntityDescriptor"),
            RootKind::EntitiesDescriptor => f.write_str("EntitiesDescriptor"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Metadata {
    pub root: RootKind,
    /// The raw `validUntil` attribute of the document element
    pub valid_until: Option<String>,
    pub entity_ids: Vec<String>,
}

#[derive(Debug)]
pub enum MetadataError {
    Http(reqwest::Error),
    BadStatus(reqwest::StatusCode),
    Xml(roxmltree::Error),
    /// Well-formed XML with some other document element
    NotMetadata(String),
}

impl From<reqwest::Error> for MetadataError {
    fn from(e: reqwest::Error) -> MetadataError {
        MetadataError::Http(e)
    }
}

impl From<roxmltree::Error> for MetadataError {
    fn from(e: roxmltree::Error) -> MetadataError {
        MetadataError::Xml(e)
    }
}

impl MetadataError {
    pub fn is_timeout(&self) -> bool {
        match *self {
            MetadataError::Http(ref e) => e.is_timeout(),
            _ => false,
        }
    }
}

impl fmt::Display for MetadataError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            MetadataError::Http(ref e) => write!(f, "HTTP request failed: {}", e),
            MetadataError::BadStatus(status) => write!(f, "server answered {}", status),
            MetadataError::Xml(ref e) => write!(f, "document is not well-formed XML: {}", e),
            MetadataError::NotMetadata(ref root) => write!(
                f,
                "document element is {}, not EntityDescriptor or EntitiesDescriptor",
                root
            ),
        }
    }
}

/// Read the document element and the entity IDs out of `body`
pub fn parse(body: &str) -> Result<Metadata, MetadataError> {
    let doc = Document::parse(body)?;
    let element = doc.root_element();
    let root = match element.tag_name().name() {
        "EntityDescriptor" => RootKind::EntityDescriptor,
        "EntitiesDescriptor" => RootKind::EntitiesDescriptor,
        other => return Err(MetadataError::NotMetadata(other.to_owned())),
    };
    let valid_until = element.attribute("validUntil").map(|v| v.trim().to_owned());
    // descendants() starts with the element itself
    let entity_ids = element
        .descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "EntityDescriptor")
        .filter_map(|n| n.attribute("entityID"))
        .map(str::to_owned)
        .collect();

    Ok(Metadata {
        root,
        valid_until,
        entity_ids,
    })
}

/// `validUntil` is an `xs:dateTime`, which in practice is always RFC 3339
pub fn parse_valid_until(raw: &str) -> Result<DateTime<FixedOffset>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw)
}

/// Fractional days between `now` and `until`, negative once expired
pub fn days_left(until: &DateTime<FixedOffset>, now: &DateTime<Utc>) -> f64 {
    until.signed_duration_since(*now).num_seconds() as f64 / 86_400.0
}
