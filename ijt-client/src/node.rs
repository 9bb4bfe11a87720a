//! Node graph model
//!
//! A `RemoteNode` is one cached entity of the remote address space. Its
//! identity never changes; everything else (attributes, relations, value)
//! is filled in incrementally as browse and read replies arrive, so a
//! node is shared as `Arc<RemoteNode>` and mutated through `merge_raw`.
//!
//! Relations point at targets by `NodeId` only. Resolving a target goes
//! through the owning `AddressSpace`, which keeps cycles in the remote
//! graph (parent ↔ child, result ↔ trace) from becoming reference cycles.

use crate::error::{ClientError, GraphError};
use ijt_model::{LocalizedText, NodeClass, NodeId, QualifiedName, RawNode, RawRelation, ReferenceType};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A directed, typed edge to another entity.
#[derive(Clone, Debug, PartialEq)]
pub struct Relation {
    pub reference_type: ReferenceType,
    pub is_forward: bool,
    pub target: NodeId,
    pub browse_name: QualifiedName,
    pub display_name: LocalizedText,
    pub target_class: NodeClass,
    pub type_definition: Option<NodeId>,
}

impl Relation {
    pub fn from_raw(raw: &RawRelation) -> Result<Self, GraphError> {
        let code = raw
            .reference_code()
            .ok_or_else(|| GraphError::NonNumericReference(raw.reference_type_id.clone()))?;
        Ok(Self {
            reference_type: ReferenceType::from_code(code)?,
            is_forward: raw.is_forward,
            target: raw.node_id.clone(),
            browse_name: raw.browse_name.clone(),
            display_name: raw.display_name.clone(),
            target_class: NodeClass::from_code(raw.node_class),
            type_definition: raw.declared_type_definition().cloned(),
        })
    }

    /// Same edge: type, direction and target.
    fn same_edge(&self, other: &Relation) -> bool {
        self.reference_type == other.reference_type
            && self.is_forward == other.is_forward
            && self.target == other.target
    }
}

/// How much of an entity has been fetched. Only ever moves forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LoadPhase {
    /// Known from a relation of another entity or from a read; never browsed.
    Discovered,
    /// Relations known.
    Browsed,
    /// Browsed and its value read.
    Read,
}

/// Point-in-time copy of a node's mutable state.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeSnapshot {
    pub class: NodeClass,
    pub browse_name: QualifiedName,
    pub display_name: LocalizedText,
    pub description: Option<LocalizedText>,
    pub relations: Vec<Relation>,
    pub value: Option<Value>,
    /// A read reply has been applied, possibly before any browse.
    pub value_read: bool,
    pub data_type: Option<NodeId>,
    pub type_definition: Option<NodeId>,
    pub phase: LoadPhase,
    pub links: HashMap<String, NodeId>,
}

#[derive(Debug)]
pub struct RemoteNode {
    id: NodeId,
    state: RwLock<NodeSnapshot>,
}

impl RemoteNode {
    /// Build a node from a browse or read reply. Every relation code must be
    /// mapped; targets are not resolved. Only a reply that lists relations
    /// yields a `Browsed` node; anything else stays `Discovered`.
    pub fn from_raw(raw: &RawNode) -> Result<Self, GraphError> {
        let id = raw.identity().cloned().ok_or(GraphError::MissingIdentity)?;
        let relations = raw
            .relations()
            .iter()
            .map(Relation::from_raw)
            .collect::<Result<Vec<_>, _>>()?;
        let attrs = &raw.attributes;
        let phase = if raw.carries_relations() { LoadPhase::Browsed } else { LoadPhase::Discovered };
        Ok(Self {
            id,
            state: RwLock::new(NodeSnapshot {
                class: attrs.node_class.map_or(NodeClass::Object, NodeClass::from_code),
                browse_name: attrs.browse_name.clone(),
                display_name: attrs.display_name.clone(),
                description: attrs.description.clone(),
                relations,
                value: raw.current_value().cloned(),
                value_read: false,
                data_type: attrs.data_type.clone(),
                type_definition: attrs.type_definition.clone(),
                phase,
                links: HashMap::new(),
            }),
        })
    }

    /// A placeholder for an entity only seen as the target of `relation`.
    pub fn discovered(relation: &Relation) -> Self {
        Self {
            id: relation.target.clone(),
            state: RwLock::new(NodeSnapshot {
                class: relation.target_class,
                browse_name: relation.browse_name.clone(),
                display_name: relation.display_name.clone(),
                description: None,
                relations: Vec::new(),
                value: None,
                value_read: false,
                data_type: None,
                type_definition: relation.type_definition.clone(),
                phase: LoadPhase::Discovered,
                links: HashMap::new(),
            }),
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, NodeSnapshot> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, NodeSnapshot> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Merge a later browse or read of the same entity. Only attributes the
    /// reply carries overwrite; relations are deduplicated by type,
    /// direction and target.
    pub fn merge_raw(&self, raw: &RawNode) -> Result<(), GraphError> {
        if let Some(actual) = raw.identity() {
            if *actual != self.id {
                return Err(GraphError::IdentityMismatch { expected: self.id.clone(), actual: actual.clone() });
            }
        }
        let incoming = raw
            .relations()
            .iter()
            .map(Relation::from_raw)
            .collect::<Result<Vec<_>, _>>()?;

        let attrs = &raw.attributes;
        let mut state = self.write_state();
        if let Some(code) = attrs.node_class {
            state.class = NodeClass::from_code(code);
        }
        if !attrs.browse_name.name.is_empty() {
            state.browse_name = attrs.browse_name.clone();
        }
        if !attrs.display_name.text.is_empty() {
            state.display_name = attrs.display_name.clone();
        }
        if attrs.description.is_some() {
            state.description = attrs.description.clone();
        }
        if attrs.data_type.is_some() {
            state.data_type = attrs.data_type.clone();
        }
        if attrs.type_definition.is_some() {
            state.type_definition = attrs.type_definition.clone();
        }
        if let Some(value) = raw.current_value() {
            state.value = Some(value.clone());
        }
        for relation in incoming {
            match state.relations.iter_mut().find(|r| r.same_edge(&relation)) {
                Some(existing) => *existing = relation,
                None => state.relations.push(relation),
            }
        }
        advance(&mut state, raw.carries_relations());
        Ok(())
    }

    /// Record a freshly read value. The node reaches `LoadPhase::Read` once
    /// it is also browsed.
    pub fn apply_value(&self, value: Option<Value>) {
        let mut state = self.write_state();
        if value.is_some() {
            state.value = value;
        }
        state.value_read = true;
        advance(&mut state, false);
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn class(&self) -> NodeClass {
        self.read_state().class
    }

    pub fn browse_name(&self) -> QualifiedName {
        self.read_state().browse_name.clone()
    }

    pub fn display_name(&self) -> LocalizedText {
        self.read_state().display_name.clone()
    }

    pub fn value(&self) -> Option<Value> {
        self.read_state().value.clone()
    }

    pub fn phase(&self) -> LoadPhase {
        self.read_state().phase
    }

    /// Browsed, and for variables also read.
    pub fn is_complete(&self) -> bool {
        let state = self.read_state();
        match state.class {
            NodeClass::Variable => state.phase >= LoadPhase::Read,
            _ => state.phase >= LoadPhase::Browsed,
        }
    }

    pub fn snapshot(&self) -> NodeSnapshot {
        self.read_state().clone()
    }

    // ==================== Relation queries ====================

    pub fn all_relations(&self) -> Vec<Relation> {
        self.read_state().relations.clone()
    }

    fn relations_where(&self, pred: impl Fn(&Relation) -> bool) -> Vec<Relation> {
        self.read_state()
            .relations
            .iter()
            .filter(|r| pred(r))
            .cloned()
            .collect()
    }

    /// Relations of one type, both directions.
    pub fn relations(&self, reference_type: ReferenceType) -> Vec<Relation> {
        self.relations_where(|r| r.reference_type == reference_type)
    }

    /// Forward relations, optionally of one type.
    pub fn child_relations(&self, reference_type: Option<ReferenceType>) -> Vec<Relation> {
        self.relations_where(|r| r.is_forward && reference_type.map_or(true, |t| r.reference_type == t))
    }

    /// Backward relations.
    pub fn parent_relations(&self) -> Vec<Relation> {
        self.relations_where(|r| !r.is_forward)
    }

    /// First relation, either direction, whose target has this browse name.
    pub fn named_relation(&self, browse_name: &str) -> Option<Relation> {
        self.read_state()
            .relations
            .iter()
            .find(|r| r.browse_name.name == browse_name)
            .cloned()
    }

    pub fn relation_to(&self, target: &NodeId) -> Option<Relation> {
        self.read_state()
            .relations
            .iter()
            .find(|r| r.target == *target)
            .cloned()
    }

    /// Forward relations whose target is typed `type_definition`.
    pub fn type_definition_relations(&self, type_definition: &NodeId) -> Vec<Relation> {
        self.relations_where(|r| r.is_forward && r.type_definition.as_ref() == Some(type_definition))
    }

    /// Forward relations pointing at methods.
    pub fn method_relations(&self) -> Vec<Relation> {
        self.relations_where(|r| r.is_forward && r.target_class == NodeClass::Method)
    }

    /// The forward relation to the child named `browse_name`. Never browses.
    pub fn child(&self, browse_name: &str) -> Result<Relation, ClientError> {
        self.read_state()
            .relations
            .iter()
            .find(|r| r.is_forward && r.browse_name.name == browse_name)
            .cloned()
            .ok_or_else(|| ClientError::ChildNotFound { parent: self.id.clone(), name: browse_name.to_string() })
    }

    /// The directly read type definition, else the first forward
    /// `hasTypeDefinition` target.
    pub fn type_definition(&self) -> Option<NodeId> {
        let state = self.read_state();
        state.type_definition.clone().or_else(|| {
            state
                .relations
                .iter()
                .find(|r| r.is_forward && r.reference_type == ReferenceType::HasTypeDefinition)
                .map(|r| r.target.clone())
        })
    }

    // ==================== Links ====================

    /// Attach a named link to another entity, e.g. a trace step to its result step.
    pub fn link(&self, name: impl Into<String>, target: NodeId) {
        self.write_state().links.insert(name.into(), target);
    }

    pub fn linked(&self, name: &str) -> Option<NodeId> {
        self.read_state().links.get(name).cloned()
    }

    // ==================== Class views ====================

    pub fn variant(&self) -> NodeVariant<'_> {
        match self.class() {
            NodeClass::Object => NodeVariant::Object(ObjectView { node: self }),
            NodeClass::Variable => NodeVariant::Variable(VariableView { node: self }),
            NodeClass::Method => NodeVariant::Method(MethodView { node: self }),
        }
    }
}

fn advance(state: &mut NodeSnapshot, browsed: bool) {
    if browsed {
        state.phase = state.phase.max(LoadPhase::Browsed);
    }
    if state.value_read && state.phase >= LoadPhase::Browsed {
        state.phase = LoadPhase::Read;
    }
}

/// Class-specific capabilities of a node.
pub enum NodeVariant<'a> {
    Object(ObjectView<'a>),
    Variable(VariableView<'a>),
    Method(MethodView<'a>),
}

pub struct ObjectView<'a> {
    node: &'a RemoteNode,
}

impl ObjectView<'_> {
    pub fn components(&self) -> Vec<Relation> {
        self.node.child_relations(Some(ReferenceType::Component))
    }

    pub fn properties(&self) -> Vec<Relation> {
        self.node.child_relations(Some(ReferenceType::HasProperty))
    }

    pub fn methods(&self) -> Vec<Relation> {
        self.node.method_relations()
    }
}

pub struct VariableView<'a> {
    node: &'a RemoteNode,
}

impl VariableView<'_> {
    pub fn value(&self) -> Option<Value> {
        self.node.value()
    }

    pub fn data_type(&self) -> Option<NodeId> {
        self.node.read_state().data_type.clone()
    }

    pub fn is_read(&self) -> bool {
        self.node.phase() == LoadPhase::Read
    }
}

pub struct MethodView<'a> {
    node: &'a RemoteNode,
}

impl MethodView<'_> {
    pub fn input_arguments(&self) -> Option<Relation> {
        self.node.child("InputArguments").ok()
    }

    pub fn output_arguments(&self) -> Option<Relation> {
        self.node.child("OutputArguments").ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool() -> RawNode {
        RawNode::new(NodeId::string(1, "Tool1"), NodeClass::Object, QualifiedName::new(1, "Tool1"))
            .with_relation(RawRelation::new(35, false, NodeId::string(1, "Tools"), QualifiedName::new(1, "Tools")))
            .with_relation(RawRelation::new(40, true, NodeId::numeric(3, 1002), QualifiedName::new(3, "ToolType")))
            .with_relation(
                RawRelation::new(46, true, NodeId::string(1, "Tool1.Serial"), QualifiedName::new(1, "SerialNumber"))
                    .with_class(NodeClass::Variable),
            )
    }

    #[test]
    fn test_relation_queries() {
        let node = RemoteNode::from_raw(&tool()).unwrap();
        assert_eq!(node.phase(), LoadPhase::Browsed);
        assert_eq!(node.child_relations(None).len(), 2);
        assert_eq!(node.child_relations(Some(ReferenceType::HasProperty)).len(), 1);
        assert_eq!(node.parent_relations()[0].target, NodeId::string(1, "Tools"));
        assert_eq!(node.relations(ReferenceType::Organizes).len(), 1);
        assert_eq!(node.named_relation("Tools").unwrap().reference_type, ReferenceType::Organizes);
        assert!(node.relation_to(&NodeId::string(1, "Tool1.Serial")).is_some());
        assert_eq!(node.child("SerialNumber").unwrap().target_class, NodeClass::Variable);
        assert_eq!(node.type_definition(), Some(NodeId::numeric(3, 1002)));
    }

    #[test]
    fn test_missing_child_is_an_error() {
        let node = RemoteNode::from_raw(&tool()).unwrap();
        // A parent is not a child.
        assert!(matches!(node.child("Tools"), Err(ClientError::ChildNotFound { .. })));
    }

    #[test]
    fn test_unmapped_relation_aborts() {
        let raw = tool().with_relation(RawRelation::new(9999, true, NodeId::numeric(1, 1), QualifiedName::new(1, "X")));
        assert_eq!(RemoteNode::from_raw(&raw).unwrap_err(), GraphError::UnmappedReference(9999));
    }

    #[test]
    fn test_type_definition_absent() {
        let raw = RawNode::new(NodeId::numeric(1, 7), NodeClass::Object, QualifiedName::new(1, "Bare"));
        let node = RemoteNode::from_raw(&raw).unwrap();
        assert_eq!(node.type_definition(), None);
        assert!(node.child_relations(None).is_empty());
    }

    #[test]
    fn test_direct_type_definition_wins() {
        let mut raw = tool();
        raw.attributes.type_definition = Some(NodeId::numeric(3, 1001));
        let node = RemoteNode::from_raw(&raw).unwrap();
        assert_eq!(node.type_definition(), Some(NodeId::numeric(3, 1001)));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let node = RemoteNode::from_raw(&tool()).unwrap();
        let before = node.snapshot();
        node.merge_raw(&tool()).unwrap();
        assert_eq!(node.snapshot(), before);

        let more = tool().with_relation(RawRelation::new(47, true, NodeId::string(1, "Tool1.Head"), QualifiedName::new(1, "Head")));
        node.merge_raw(&more).unwrap();
        assert_eq!(node.all_relations().len(), 4);
    }

    #[test]
    fn test_merge_rejects_other_identity() {
        let node = RemoteNode::from_raw(&tool()).unwrap();
        let other = RawNode::new(NodeId::string(1, "Tool2"), NodeClass::Object, QualifiedName::new(1, "Tool2"));
        assert!(matches!(node.merge_raw(&other), Err(GraphError::IdentityMismatch { .. })));
    }

    #[test]
    fn test_variable_completion_needs_read() {
        let raw = RawNode::new(NodeId::string(1, "Torque"), NodeClass::Variable, QualifiedName::new(1, "Torque"));
        let node = RemoteNode::from_raw(&raw).unwrap();
        assert!(!node.is_complete());
        node.apply_value(Some(json!(12.5)));
        assert!(node.is_complete());
        match node.variant() {
            NodeVariant::Variable(v) => assert_eq!(v.value(), Some(json!(12.5))),
            _ => panic!("expected a variable"),
        }
    }

    #[test]
    fn test_discovered_then_browsed() {
        let node = RemoteNode::from_raw(&tool()).unwrap();
        let rel = node.child("SerialNumber").unwrap();
        let serial = RemoteNode::discovered(&rel);
        assert_eq!(serial.phase(), LoadPhase::Discovered);
        assert!(!serial.is_complete());

        let raw = RawNode::new(rel.target.clone(), NodeClass::Variable, rel.browse_name.clone());
        serial.merge_raw(&raw).unwrap();
        assert_eq!(serial.phase(), LoadPhase::Browsed);
    }

    #[test]
    fn test_partial_merge_keeps_class() {
        let raw = RawNode::new(NodeId::string(1, "Torque"), NodeClass::Variable, QualifiedName::new(1, "Torque"));
        let node = RemoteNode::from_raw(&raw).unwrap();

        let partial = RawNode::from_payload(&json!({ "nodeid": "ns=1;s=Torque", "value": "12.5" })).unwrap();
        node.merge_raw(&partial).unwrap();

        assert_eq!(node.class(), NodeClass::Variable);
        assert_eq!(node.browse_name().name, "Torque");
        assert_eq!(node.value(), Some(json!(12.5)));
        assert!(matches!(node.variant(), NodeVariant::Variable(_)));
    }

    #[test]
    fn test_read_before_browse() {
        let read = RawNode::from_payload(&json!({ "nodeid": "ns=1;s=Tool1", "attribute": "Value", "value": "42" })).unwrap();
        let node = RemoteNode::from_raw(&read).unwrap();
        node.apply_value(read.current_value().cloned());

        assert_eq!(node.phase(), LoadPhase::Discovered);
        assert_eq!(node.value(), Some(json!(42)));
        assert!(!node.is_complete());

        node.merge_raw(&tool()).unwrap();
        assert_eq!(node.phase(), LoadPhase::Read);
        assert_eq!(node.child_relations(None).len(), 2);
        assert_eq!(node.value(), Some(json!(42)));
    }

    #[test]
    fn test_links_are_by_identity() {
        let node = RemoteNode::from_raw(&tool()).unwrap();
        node.link("result", NodeId::string(1, "Result42"));
        assert_eq!(node.linked("result"), Some(NodeId::string(1, "Result42")));
        assert_eq!(node.linked("trace"), None);
    }
}
