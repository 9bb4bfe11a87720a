//! The closed table of relation (reference) types
//!
//! Codes are part of the wire contract with the bridge and must match its
//! encoding exactly. The table is not extensible at runtime: an unknown code
//! is a fatal data error, because a silently mis-mapped relation would
//! corrupt graph traversal.

use std::fmt;

/// A mapped relation type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReferenceType {
    Organizes,
    HasModellingRule,
    HasTypeDefinition,
    GeneratesEvents,
    HasSubtype,
    HasProperty,
    Component,
    HasNotifier,
    Relation,
    HasInterface,
    HasAddin,
    Association,
}

/// Returned when a reference-type code is not part of the table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("referenceTypeId {0} not mapped")]
pub struct UnmappedReference(pub u32);

// (code, type, name, hierarchical)
const TABLE: &[(u32, ReferenceType, &str, bool)] = &[
    (35, ReferenceType::Organizes, "organizes", true),
    (37, ReferenceType::HasModellingRule, "hasModellingRule", true),
    (40, ReferenceType::HasTypeDefinition, "hasTypeDefinition", false),
    (41, ReferenceType::GeneratesEvents, "generatesEvents", false),
    (45, ReferenceType::HasSubtype, "hasSubtype", true),
    (46, ReferenceType::HasProperty, "hasProperty", true),
    (47, ReferenceType::Component, "component", true),
    (48, ReferenceType::HasNotifier, "hasNotifier", false),
    (61, ReferenceType::Relation, "relation", false),
    (17603, ReferenceType::HasInterface, "hasInterface", false),
    (17604, ReferenceType::HasAddin, "hasAddin", true),
    (24137, ReferenceType::Association, "association", false),
];

impl ReferenceType {
    /// Every mapped type, in code order.
    pub fn all() -> impl Iterator<Item = ReferenceType> {
        TABLE.iter().map(|(_, t, _, _)| *t)
    }

    pub fn from_code(code: u32) -> Result<Self, UnmappedReference> {
        TABLE
            .iter()
            .find(|(c, _, _, _)| *c == code)
            .map(|(_, t, _, _)| *t)
            .ok_or(UnmappedReference(code))
    }

    pub fn from_name(name: &str) -> Option<Self> {
        TABLE.iter().find(|(_, _, n, _)| *n == name).map(|(_, t, _, _)| *t)
    }

    // Every variant has exactly one row.
    fn entry(self) -> &'static (u32, ReferenceType, &'static str, bool) {
        TABLE
            .iter()
            .find(|(_, t, _, _)| *t == self)
            .unwrap_or(&TABLE[0])
    }

    pub fn code(self) -> u32 {
        self.entry().0
    }

    pub fn name(self) -> &'static str {
        self.entry().2
    }

    pub fn is_hierarchical(self) -> bool {
        self.entry().3
    }
}

impl fmt::Display for ReferenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
