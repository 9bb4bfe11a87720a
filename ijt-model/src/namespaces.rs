//! Namespace table of the remote server
//!
//! Namespace indices are assigned per server, so well-known companion
//! specifications have to be located by URI.

use crate::lenient::decode_embedded;
use serde_json::Value;

pub const OPC_UA: &str = "http://opcfoundation.org/UA/";
pub const DI: &str = "http://opcfoundation.org/UA/DI/";
pub const MACHINERY: &str = "http://opcfoundation.org/UA/Machinery/";
pub const MACHINERY_RESULT: &str = "http://opcfoundation.org/UA/Machinery/Result/";
pub const IJT_BASE: &str = "http://opcfoundation.org/UA/IJT/Base/";
pub const IJT_TIGHTENING: &str = "http://opcfoundation.org/UA/IJT/Tightening/";

/// Ordered list of namespace URIs; the position is the namespace index.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NamespaceTable {
    uris: Vec<String>,
}

impl NamespaceTable {
    pub fn new(uris: Vec<String>) -> Self {
        Self { uris }
    }

    /// Decode the `namespaces` field of a reply, which is either a JSON list
    /// or a JSON list embedded in a string.
    pub fn from_payload(field: &Value) -> Result<Self, serde_json::Error> {
        let uris: Vec<String> = decode_embedded(field.clone())?;
        Ok(Self { uris })
    }

    pub fn index_of(&self, uri: &str) -> Option<u16> {
        let wanted = uri.trim_end_matches('/');
        self.uris
            .iter()
            .position(|u| u.trim_end_matches('/') == wanted)
            .and_then(|i| u16::try_from(i).ok())
    }

    pub fn uri(&self, index: u16) -> Option<&str> {
        self.uris.get(usize::from(index)).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.uris.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uris.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.uris.iter().map(String::as_str)
    }
}
