//! A small tightening-system address space
//!
//! ```text
//! Root (ns=0;i=84)
//! └── Objects (ns=0;i=85)
//!     ├── Server (ns=0;i=2253)
//!     └── TighteningSystem (ns=1;s=TighteningSystem, type ns=3;i=1005)
//!         ├── SystemName (Variable, "Station 7")
//!         ├── AssetManagement
//!         │   └── Assets
//!         │       ├── Tools
//!         │       └── Controllers
//!         └── ResultManagement
//!             └── GetLatestResult (Method)
//! ```

use crate::SimBridge;
use ijt_model::namespaces;
use ijt_model::{NodeClass, NodeId, QualifiedName, RawNode, RawRelation, RelativePath};
use serde_json::json;

pub const ORGANIZES: u32 = 35;
pub const HAS_TYPE_DEFINITION: u32 = 40;
pub const HAS_PROPERTY: u32 = 46;
pub const COMPONENT: u32 = 47;

pub fn root() -> NodeId {
    NodeId::numeric(0, 84)
}

pub fn objects() -> NodeId {
    NodeId::numeric(0, 85)
}

pub fn server() -> NodeId {
    NodeId::numeric(0, 2253)
}

pub fn system() -> NodeId {
    NodeId::string(1, "TighteningSystem")
}

pub fn system_type() -> NodeId {
    NodeId::numeric(3, 1005)
}

pub fn system_name() -> NodeId {
    NodeId::string(1, "SystemName")
}

pub fn asset_management() -> NodeId {
    NodeId::string(1, "AssetManagement")
}

pub fn assets() -> NodeId {
    NodeId::string(1, "Assets")
}

pub fn tools() -> NodeId {
    NodeId::string(1, "Tools")
}

pub fn controllers() -> NodeId {
    NodeId::string(1, "Controllers")
}

pub fn result_management() -> NodeId {
    NodeId::string(1, "ResultManagement")
}

pub fn get_latest_result() -> NodeId {
    NodeId::string(1, "GetLatestResult")
}

/// Path from the tightening system to its tool folder.
pub fn tools_path() -> RelativePath {
    RelativePath::parse("AssetManagement/Assets/Tools", 1)
}

fn name(ns: u16, text: &str) -> QualifiedName {
    QualifiedName::new(ns, text)
}

fn folder(id: NodeId, browse_name: QualifiedName, parent: NodeId, parent_name: QualifiedName) -> RawNode {
    RawNode::new(id, NodeClass::Object, browse_name)
        .with_relation(RawRelation::new(ORGANIZES, false, parent, parent_name))
        .with_relation(RawRelation::new(HAS_TYPE_DEFINITION, true, NodeId::numeric(0, 61), name(0, "FolderType")))
}

/// Populate `bridge` with the tree above.
pub fn tightening_system(bridge: &SimBridge) {
    bridge.set_namespaces(vec![
        namespaces::OPC_UA.to_string(),
        "urn:sim:ijt".to_string(),
        namespaces::DI.to_string(),
        namespaces::IJT_BASE.to_string(),
        namespaces::IJT_TIGHTENING.to_string(),
    ]);

    bridge.add_node(
        RawNode::new(root(), NodeClass::Object, name(0, "Root"))
            .with_relation(RawRelation::new(ORGANIZES, true, objects(), name(0, "Objects"))),
    );
    bridge.add_node(
        RawNode::new(objects(), NodeClass::Object, name(0, "Objects"))
            .with_relation(RawRelation::new(ORGANIZES, false, root(), name(0, "Root")))
            .with_relation(
                RawRelation::new(ORGANIZES, true, server(), name(0, "Server"))
                    .with_type_definition(NodeId::numeric(0, 2004)),
            )
            .with_relation(
                RawRelation::new(ORGANIZES, true, system(), name(1, "TighteningSystem"))
                    .with_type_definition(system_type()),
            ),
    );
    bridge.add_node(
        RawNode::new(server(), NodeClass::Object, name(0, "Server"))
            .with_relation(RawRelation::new(ORGANIZES, false, objects(), name(0, "Objects"))),
    );
    bridge.add_node(
        RawNode::new(system(), NodeClass::Object, name(1, "TighteningSystem"))
            .with_relation(RawRelation::new(ORGANIZES, false, objects(), name(0, "Objects")))
            .with_relation(RawRelation::new(HAS_TYPE_DEFINITION, true, system_type(), name(3, "TighteningSystemType")))
            .with_relation(
                RawRelation::new(HAS_PROPERTY, true, system_name(), name(1, "SystemName"))
                    .with_class(NodeClass::Variable),
            )
            .with_relation(RawRelation::new(COMPONENT, true, asset_management(), name(1, "AssetManagement")))
            .with_relation(RawRelation::new(COMPONENT, true, result_management(), name(1, "ResultManagement"))),
    );
    bridge.add_node(
        RawNode::new(system_name(), NodeClass::Variable, name(1, "SystemName"))
            .with_relation(RawRelation::new(HAS_PROPERTY, false, system(), name(1, "TighteningSystem")))
            .with_value(json!("Station 7")),
    );
    bridge.add_node(
        RawNode::new(asset_management(), NodeClass::Object, name(1, "AssetManagement"))
            .with_relation(RawRelation::new(COMPONENT, false, system(), name(1, "TighteningSystem")))
            .with_relation(RawRelation::new(COMPONENT, true, assets(), name(1, "Assets"))),
    );
    bridge.add_node(
        folder(assets(), name(1, "Assets"), asset_management(), name(1, "AssetManagement"))
            .with_relation(RawRelation::new(ORGANIZES, true, tools(), name(1, "Tools")))
            .with_relation(RawRelation::new(ORGANIZES, true, controllers(), name(1, "Controllers"))),
    );
    bridge.add_node(folder(tools(), name(1, "Tools"), assets(), name(1, "Assets")));
    bridge.add_node(folder(controllers(), name(1, "Controllers"), assets(), name(1, "Assets")));
    bridge.add_node(
        RawNode::new(result_management(), NodeClass::Object, name(1, "ResultManagement"))
            .with_relation(RawRelation::new(COMPONENT, false, system(), name(1, "TighteningSystem")))
            .with_relation(
                RawRelation::new(COMPONENT, true, get_latest_result(), name(1, "GetLatestResult"))
                    .with_class(NodeClass::Method),
            ),
    );
    bridge.add_node(
        RawNode::new(get_latest_result(), NodeClass::Method, name(1, "GetLatestResult"))
            .with_relation(RawRelation::new(COMPONENT, false, result_management(), name(1, "ResultManagement")))
            .with_relation(
                RawRelation::new(HAS_PROPERTY, true, NodeId::string(1, "GetLatestResult.InputArguments"), name(0, "InputArguments"))
                    .with_class(NodeClass::Variable),
            )
            .with_relation(
                RawRelation::new(HAS_PROPERTY, true, NodeId::string(1, "GetLatestResult.OutputArguments"), name(0, "OutputArguments"))
                    .with_class(NodeClass::Variable),
            ),
    );

    bridge.add_path(system(), &tools_path(), tools());
    bridge.add_path(
        system(),
        &RelativePath::parse("ResultManagement/GetLatestResult", 1),
        get_latest_result(),
    );
    bridge.add_method_output(
        result_management(),
        get_latest_result(),
        json!([{ "ResultId": "R-1001", "OverallStatus": "OK" }]),
    );
}
