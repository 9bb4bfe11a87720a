//! Browse and read payloads as the bridge encodes them
//!
//! These types mirror the wire shape and are deliberately permissive: the
//! client turns them into validated graph entities, and that step is where
//! unknown relation codes are rejected.

use crate::lenient::{bool_like, embedded, embedded_opt, Scalar};
use crate::node_class::NodeClass;
use crate::node_id::NodeId;
use crate::types::{LocalizedText, QualifiedName};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Attribute block of a browse or read reply.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawAttributes {
    #[serde(rename = "NodeId", default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
    /// Absent from partial replies such as a single-attribute read.
    #[serde(rename = "NodeClass", default, deserialize_with = "class_like_opt", skip_serializing_if = "Option::is_none")]
    pub node_class: Option<u32>,
    #[serde(rename = "BrowseName", default)]
    pub browse_name: QualifiedName,
    #[serde(rename = "DisplayName", default)]
    pub display_name: LocalizedText,
    #[serde(rename = "Description", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<LocalizedText>,
    #[serde(rename = "TypeDefinition", default, skip_serializing_if = "Option::is_none")]
    pub type_definition: Option<NodeId>,
    #[serde(rename = "DataType", default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<NodeId>,
    #[serde(rename = "Value", default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

fn default_class() -> u32 {
    NodeClass::Object.code()
}

/// Accepts `1`, `"1"`, `"NodeClass.Variable"` and `"Variable"`.
fn class_code(scalar: Scalar) -> u32 {
    if let Some(code) = scalar.as_u32() {
        return code;
    }
    let text = scalar.into_text();
    let name = text.rsplit('.').next().unwrap_or(&text);
    match name {
        "Variable" => NodeClass::Variable.code(),
        "Method" => NodeClass::Method.code(),
        _ => NodeClass::Object.code(),
    }
}

fn class_like<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
    Ok(class_code(Scalar::deserialize(d)?))
}

fn class_like_opt<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u32>, D::Error> {
    Ok(Option::<Scalar>::deserialize(d)?.map(class_code))
}

/// One outgoing or incoming reference, as browsed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawRelation {
    #[serde(rename = "ReferenceTypeId")]
    pub reference_type_id: NodeId,
    #[serde(rename = "IsForward", default = "default_forward", deserialize_with = "bool_like")]
    pub is_forward: bool,
    #[serde(rename = "NodeId")]
    pub node_id: NodeId,
    #[serde(rename = "BrowseName", default)]
    pub browse_name: QualifiedName,
    #[serde(rename = "DisplayName", default)]
    pub display_name: LocalizedText,
    #[serde(rename = "NodeClass", default = "default_class", deserialize_with = "class_like")]
    pub node_class: u32,
    #[serde(rename = "TypeDefinition", default, skip_serializing_if = "Option::is_none")]
    pub type_definition: Option<NodeId>,
}

fn default_forward() -> bool {
    true
}

impl RawRelation {
    pub fn new(reference_code: u32, is_forward: bool, target: NodeId, browse_name: QualifiedName) -> Self {
        let display_name = LocalizedText::new(browse_name.name.clone());
        Self {
            reference_type_id: NodeId::numeric(0, reference_code),
            is_forward,
            node_id: target,
            browse_name,
            display_name,
            node_class: NodeClass::Object.code(),
            type_definition: None,
        }
    }

    pub fn with_type_definition(mut self, type_definition: NodeId) -> Self {
        self.type_definition = Some(type_definition);
        self
    }

    pub fn with_class(mut self, class: NodeClass) -> Self {
        self.node_class = class.code();
        self
    }

    /// The numeric reference-type code; string-typed references have none.
    pub fn reference_code(&self) -> Option<u32> {
        self.reference_type_id.as_numeric()
    }

    /// The declared target type, ignoring the null id `ns=0;i=0`.
    pub fn declared_type_definition(&self) -> Option<&NodeId> {
        self.type_definition
            .as_ref()
            .filter(|id| **id != NodeId::numeric(0, 0))
    }
}

/// A browse or read reply body.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawNode {
    #[serde(rename = "nodeid", default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
    #[serde(default, deserialize_with = "embedded")]
    pub attributes: RawAttributes,
    /// `None` when the reply has no `relations` field at all (a read);
    /// `Some(vec![])` when the node was browsed and has no references.
    #[serde(default, deserialize_with = "embedded_opt", skip_serializing_if = "Option::is_none")]
    pub relations: Option<Vec<RawRelation>>,
    #[serde(default, deserialize_with = "embedded_opt", skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl RawNode {
    pub fn new(id: NodeId, class: NodeClass, browse_name: QualifiedName) -> Self {
        let display_name = LocalizedText::new(browse_name.name.clone());
        Self {
            node_id: Some(id.clone()),
            attributes: RawAttributes {
                node_id: Some(id),
                node_class: Some(class.code()),
                browse_name,
                display_name,
                ..Default::default()
            },
            relations: Some(Vec::new()),
            value: None,
        }
    }

    pub fn with_relation(mut self, relation: RawRelation) -> Self {
        self.relations.get_or_insert_with(Vec::new).push(relation);
        self
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    /// Decode from a reply payload.
    pub fn from_payload(data: &Value) -> Result<Self, serde_json::Error> {
        RawNode::deserialize(data)
    }

    /// Identity from the attribute block, else from the reply's `nodeid`.
    pub fn identity(&self) -> Option<&NodeId> {
        self.attributes.node_id.as_ref().or(self.node_id.as_ref())
    }

    /// The carried relations; empty when none were sent.
    pub fn relations(&self) -> &[RawRelation] {
        self.relations.as_deref().unwrap_or_default()
    }

    /// Whether the reply lists the node's references, i.e. came from a browse.
    pub fn carries_relations(&self) -> bool {
        self.relations.is_some()
    }

    /// Value from the reply's `value` field, else from the `Value` attribute.
    pub fn current_value(&self) -> Option<&Value> {
        self.value
            .as_ref()
            .or(self.attributes.value.as_ref())
            .filter(|v| !v.is_null())
    }
}
