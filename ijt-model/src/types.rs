//! Small value types shared across the wire and the cache

use crate::lenient::{text_like, u32_like};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Correlation token pairing an asynchronous request with its reply.
///
/// The bridge treats a zero id as "no id", so issued ids start at 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(pub u64);

impl CallId {
    pub const FIRST: CallId = CallId(1);

    pub fn next(self) -> CallId {
        CallId(self.0 + 1)
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A browse name: a namespace index plus a name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QualifiedName {
    #[serde(rename = "NamespaceIndex", alias = "namespaceindex", default, deserialize_with = "u32_like_u16")]
    pub namespace: u16,
    #[serde(rename = "Name", alias = "name", default, deserialize_with = "text_like")]
    pub name: String,
}

fn u32_like_u16<'de, D: serde::Deserializer<'de>>(d: D) -> Result<u16, D::Error> {
    let n = u32_like(d)?;
    u16::try_from(n).map_err(serde::de::Error::custom)
}

impl QualifiedName {
    pub fn new(namespace: u16, name: impl Into<String>) -> Self {
        Self { namespace, name: name.into() }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.name)
    }
}

/// Human readable text with an optional locale.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizedText {
    #[serde(rename = "Locale", alias = "locale", default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(rename = "Text", alias = "text", default, deserialize_with = "text_like")]
    pub text: String,
}

impl LocalizedText {
    pub fn new(text: impl Into<String>) -> Self {
        Self { locale: None, text: text.into() }
    }
}

/// A symbolic path of browse names, used to locate well-known sub-objects
/// such as `AssetManagement/Assets/Tools` without knowing their identities.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RelativePath {
    pub elements: Vec<QualifiedName>,
}

#[derive(Serialize)]
struct WireElement<'a> {
    namespaceindex: u16,
    identifier: &'a str,
}

impl RelativePath {
    pub fn new(elements: Vec<QualifiedName>) -> Self {
        Self { elements }
    }

    /// Parse `a/b/c`, where each segment is either `name` (placed in
    /// `default_namespace`) or `ns:name`.
    pub fn parse(path: &str, default_namespace: u16) -> Self {
        let elements = path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| {
                let prefixed = segment
                    .split_once(':')
                    .and_then(|(ns, name)| ns.parse::<u16>().ok().map(|ns| (ns, name)));
                match prefixed {
                    Some((ns, name)) => QualifiedName::new(ns, name),
                    None => QualifiedName::new(default_namespace, segment),
                }
            })
            .collect();
        Self { elements }
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// The bridge expects the path as a JSON document inside a string field.
    pub fn to_wire(&self) -> String {
        let elements: Vec<WireElement<'_>> = self
            .elements
            .iter()
            .map(|e| WireElement { namespaceindex: e.namespace, identifier: &e.name })
            .collect();
        serde_json::to_string(&elements).unwrap_or_else(|_| "[]".to_string())
    }
}

impl fmt::Display for RelativePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, element) in self.elements.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            write!(f, "{}", element)?;
        }
        Ok(())
    }
}
