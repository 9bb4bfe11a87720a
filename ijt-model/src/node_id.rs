//! Namespace-qualified node identities
//!
//! Identities are server-assigned and stable for a session. The bridge
//! sends them either as text (`ns=0;i=84`, `ns=3;s=Tools`) or as an object
//! (`{"NamespaceIndex": "0", "Identifier": "84"}`); both decode to the
//! same `NodeId`. A `NodeId` always serializes to its text form.
//!
//! GUID (`g=`) and opaque (`b=`) identifiers are kept as their text and
//! only compared, never interpreted.

use crate::lenient::Scalar;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// The identifier part of a `NodeId`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Identifier {
    Numeric(u32),
    String(String),
    Guid(String),
    /// Base64 text of a ByteString identifier.
    Opaque(String),
}

impl Identifier {
    /// Numeric-looking text is a numeric identifier, anything else is a string identifier.
    pub fn from_text(text: &str) -> Self {
        match text.trim().parse::<u32>() {
            Ok(n) => Identifier::Numeric(n),
            Err(_) => Identifier::String(text.to_string()),
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Numeric(n) => write!(f, "i={}", n),
            Identifier::String(s) => write!(f, "s={}", s),
            Identifier::Guid(g) => write!(f, "g={}", g),
            Identifier::Opaque(b) => write!(f, "b={}", b),
        }
    }
}

/// Identity of one entity in the remote address space.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    pub namespace: u16,
    pub identifier: Identifier,
}

impl NodeId {
    pub fn numeric(namespace: u16, value: u32) -> Self {
        Self { namespace, identifier: Identifier::Numeric(value) }
    }

    pub fn string(namespace: u16, value: impl Into<String>) -> Self {
        Self { namespace, identifier: Identifier::String(value.into()) }
    }

    /// The numeric identifier, if this is a numeric node id.
    pub fn as_numeric(&self) -> Option<u32> {
        match self.identifier {
            Identifier::Numeric(n) => Some(n),
            _ => None,
        }
    }

    /// `84` for `ns=0;i=84`, `Tools` for `ns=3;s=Tools`.
    pub fn identifier_text(&self) -> String {
        match &self.identifier {
            Identifier::Numeric(n) => n.to_string(),
            Identifier::String(s) | Identifier::Guid(s) | Identifier::Opaque(s) => s.clone(),
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ns={};{}", self.namespace, self.identifier)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseNodeIdError {
    #[error("invalid namespace in node id '{0}'")]
    Namespace(String),
    #[error("missing identifier in node id '{0}'")]
    MissingIdentifier(String),
    #[error("unsupported identifier kind '{kind}' in node id '{input}'")]
    UnsupportedKind { kind: String, input: String },
    #[error("invalid numeric identifier in node id '{0}'")]
    Numeric(String),
}

impl FromStr for NodeId {
    type Err = ParseNodeIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        let (namespace, rest) = match input.strip_prefix("ns=") {
            Some(after) => {
                let (ns, rest) = after
                    .split_once(';')
                    .ok_or_else(|| ParseNodeIdError::MissingIdentifier(input.to_string()))?;
                let ns = ns
                    .parse::<u16>()
                    .map_err(|_| ParseNodeIdError::Namespace(input.to_string()))?;
                (ns, rest)
            }
            None => (0, input),
        };

        let (kind, value) = rest
            .split_once('=')
            .ok_or_else(|| ParseNodeIdError::MissingIdentifier(input.to_string()))?;
        let identifier = match kind {
            "i" => Identifier::Numeric(
                value
                    .parse()
                    .map_err(|_| ParseNodeIdError::Numeric(input.to_string()))?,
            ),
            "s" => Identifier::String(value.to_string()),
            "g" => Identifier::Guid(value.to_ascii_lowercase()),
            "b" => Identifier::Opaque(value.to_string()),
            other => {
                return Err(ParseNodeIdError::UnsupportedKind {
                    kind: other.to_string(),
                    input: input.to_string(),
                })
            }
        };
        Ok(NodeId { namespace, identifier })
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NodeIdRepr {
    Text(String),
    Object {
        #[serde(rename = "NamespaceIndex", alias = "namespaceIndex", alias = "namespace")]
        namespace: Scalar,
        #[serde(rename = "Identifier", alias = "identifier", alias = "value")]
        identifier: Scalar,
    },
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match NodeIdRepr::deserialize(deserializer)? {
            NodeIdRepr::Text(text) => text.parse().map_err(D::Error::custom),
            NodeIdRepr::Object { namespace, identifier } => {
                let namespace = namespace
                    .as_u32()
                    .and_then(|n| u16::try_from(n).ok())
                    .ok_or_else(|| D::Error::custom("invalid NamespaceIndex"))?;
                let identifier = match identifier {
                    Scalar::Int(_) | Scalar::Float(_) => Identifier::Numeric(
                        identifier
                            .as_u32()
                            .ok_or_else(|| D::Error::custom("invalid numeric Identifier"))?,
                    ),
                    other => Identifier::from_text(&other.into_text()),
                };
                Ok(NodeId { namespace, identifier })
            }
        }
    }
}
