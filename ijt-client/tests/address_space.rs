//! Materialization of the remote address space.

mod common;

use common::{client, eventually, within};
use ijt_client::{ClientError, GraphError, LoadPhase, NodeVariant, RemoteNode};
use ijt_model::{Command, InboundKind, NodeClass, NodeId, QualifiedName, RawNode, RawRelation, ReferenceType};
use ijt_net_sim::{fixture, reply_frame};
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn test_concurrent_loads_share_one_browse() {
    let (bridge, client) = client();
    bridge.hold_replies();
    let space = client.address_space().clone();

    let loads: Vec<_> = (0..8)
        .map(|_| {
            let space = space.clone();
            tokio::spawn(async move { space.find_or_load(&fixture::system()).await })
        })
        .collect();
    eventually(|| client.session().correlator().pending_count() == 1).await;
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert_eq!(bridge.count_sent(Command::Browse), 1);

    bridge.release_replies();
    let mut nodes = Vec::new();
    for load in loads {
        nodes.push(within(load).await.unwrap().unwrap());
    }
    assert!(nodes.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    assert_eq!(bridge.count_sent(Command::Browse), 1);
}

#[tokio::test]
async fn test_component_child_then_cache_hit() {
    let (bridge, client) = client();
    let space = client.address_space();

    let n1 = space.find_or_load(&fixture::system()).await.unwrap();
    let components = n1.child_relations(Some(ReferenceType::Component));
    assert_eq!(components.len(), 2);

    let n2 = space.child(n1.id(), "AssetManagement").await.unwrap();
    assert_eq!(n2.id(), &fixture::asset_management());
    assert_eq!(n2.parent_relations()[0].target, fixture::system());
    let browses = bridge.count_sent(Command::Browse);

    let again = space.find_or_load(&fixture::asset_management()).await.unwrap();
    assert!(Arc::ptr_eq(&n2, &again));
    assert_eq!(bridge.count_sent(Command::Browse), browses);
}

#[tokio::test]
async fn test_resolve_relations_loads_every_target() {
    let (_bridge, client) = client();
    let space = client.address_space();

    let assets = space.find_or_load(&fixture::assets()).await.unwrap();
    let children = space
        .resolve_relations(&assets.child_relations(Some(ReferenceType::Organizes)))
        .await
        .unwrap();
    let names: Vec<String> = children.iter().map(|n| n.browse_name().name).collect();
    assert_eq!(names, vec!["Tools", "Controllers"]);
}

#[tokio::test]
async fn test_one_failed_relation_fails_the_batch() {
    let (bridge, client) = client();
    bridge.fail(Command::Browse, fixture::controllers(), "Browse Exception: BadUserAccessDenied");
    let space = client.address_space();

    let assets = space.find_or_load(&fixture::assets()).await.unwrap();
    let err = space
        .resolve_relations(&assets.child_relations(Some(ReferenceType::Organizes)))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Remote(_)));
}

#[tokio::test]
async fn test_missing_child_does_not_browse() {
    let (bridge, client) = client();
    let space = client.address_space();
    let system = space.find_or_load(&fixture::system()).await.unwrap();
    let browses = bridge.count_sent(Command::Browse);

    let err = space.child(system.id(), "JoiningProcessManagement").await.unwrap_err();
    assert!(matches!(err, ClientError::ChildNotFound { name, .. } if name == "JoiningProcessManagement"));
    assert_eq!(bridge.count_sent(Command::Browse), browses);
}

#[tokio::test]
async fn test_unmapped_reference_fails_the_load() {
    let (bridge, client) = client();
    let odd = NodeId::string(1, "Odd");
    bridge.add_node(
        RawNode::new(odd.clone(), NodeClass::Object, QualifiedName::new(1, "Odd"))
            .with_relation(RawRelation::new(12345, true, fixture::tools(), QualifiedName::new(1, "Tools"))),
    );

    let err = client.address_space().find_or_load(&odd).await.unwrap_err();
    assert_eq!(err, ClientError::Graph(GraphError::UnmappedReference(12345)));
    assert!(client.address_space().get(&odd).is_none());
}

#[tokio::test]
async fn test_type_definition_missing_is_none() {
    let (bridge, client) = client();
    let bare = NodeId::numeric(1, 500);
    bridge.add_node(RawNode::new(bare.clone(), NodeClass::Object, QualifiedName::new(1, "Bare")));

    let node = client.address_space().find_or_load(&bare).await.unwrap();
    assert_eq!(node.type_definition(), None);

    let system = client.address_space().find_or_load(&fixture::system()).await.unwrap();
    assert_eq!(system.type_definition(), Some(fixture::system_type()));
}

#[tokio::test]
async fn test_same_payload_same_structure() {
    let (_bridge, client) = client();
    let reply = client.session().browse(&fixture::system()).await.unwrap();

    let first = RemoteNode::from_raw(&RawNode::from_payload(&reply.message.data).unwrap()).unwrap();
    let second = RemoteNode::from_raw(&RawNode::from_payload(&reply.message.data).unwrap()).unwrap();
    assert_eq!(first.snapshot(), second.snapshot());
    assert_eq!(first.snapshot(), reply.node.unwrap().snapshot());
}

#[tokio::test]
async fn test_system_discovery() {
    let (bridge, client) = client();
    let space = client.address_space().clone();

    let (a, b) = tokio::join!(space.system(), space.system());
    let (a, b) = (a.unwrap(), b.unwrap());
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(a.id(), &fixture::system());
    assert_eq!(bridge.count_sent(Command::Browse), 3);

    space.system().await.unwrap();
    assert_eq!(bridge.count_sent(Command::Browse), 3);
}

#[tokio::test]
async fn test_system_not_found() {
    let (_bridge, client) = client_with_type("9999");
    let err = client.address_space().system().await.unwrap_err();
    assert_eq!(err, ClientError::SystemNotFound("9999".into()));
}

fn client_with_type(identifier: &str) -> (ijt_net_sim::SimBridge, ijt_client::Client) {
    common::client_with(
        ijt_client::ClientConfig::new(common::EP)
            .with_subscribe_on_connect(false)
            .with_system_type_definition(identifier),
    )
}

#[tokio::test]
async fn test_find_node_from_path() {
    let (_bridge, client) = client();
    let tools = client.address_space().find_node_from_path(&fixture::tools_path()).await.unwrap();
    assert_eq!(tools.id(), &fixture::tools());
    assert_eq!(tools.type_definition(), Some(NodeId::numeric(0, 61)));
}

#[tokio::test]
async fn test_load_value_reads_variable() {
    let (bridge, client) = client();
    let space = client.address_space();

    let name = space.child(&fixture::system(), "SystemName").await.unwrap();
    assert_eq!(name.phase(), LoadPhase::Browsed);
    assert!(!name.is_complete());

    let read = space.load_value(&fixture::system_name()).await.unwrap();
    assert!(Arc::ptr_eq(&name, &read));
    assert!(read.is_complete());
    match read.variant() {
        NodeVariant::Variable(var) => assert_eq!(var.value(), Some(json!("Station 7"))),
        _ => panic!("SystemName is a variable"),
    }
    assert_eq!(bridge.count_sent(Command::Read), 1);
}

#[tokio::test]
async fn test_method_call_returns_output() {
    let (_bridge, client) = client();
    let space = client.address_space();

    let management = space.find_or_load(&fixture::result_management()).await.unwrap();
    let method = management.method_relations().remove(0);
    let output = space.method_call(management.id(), &method.target, json!([])).await.unwrap();
    assert_eq!(output[0]["ResultId"], "R-1001");

    let node = space.find_or_load(&method.target).await.unwrap();
    match node.variant() {
        NodeVariant::Method(m) => {
            assert!(m.input_arguments().is_some());
            assert!(m.output_arguments().is_some());
        }
        _ => panic!("GetLatestResult is a method"),
    }
}

#[tokio::test]
async fn test_namespaces_and_extension() {
    let (_bridge, client) = client();
    let space = client.address_space();

    let table = space.namespaces().await.unwrap();
    assert_eq!(table.index_of(ijt_model::namespaces::IJT_BASE), Some(3));

    let ext = space
        .construct_extension(&NodeId::numeric(3, 3008), json!({ "EntityId": "T1" }))
        .await
        .unwrap();
    assert_eq!(ext["Body"]["EntityId"], "T1");
}

#[tokio::test]
async fn test_new_node_notifications_and_reset() {
    let (bridge, client) = client();
    let space = client.address_space();
    let mut new_nodes = space.subscribe_new_nodes();

    space.find_or_load(&fixture::root()).await.unwrap();
    assert_eq!(new_nodes.recv().await.unwrap(), fixture::root());
    assert_eq!(space.len(), 1);

    space.reset().await;
    assert!(space.is_empty());
    space.find_or_load(&fixture::root()).await.unwrap();
    assert_eq!(bridge.count_sent(Command::Browse), 2);
    assert_eq!(new_nodes.recv().await.unwrap(), fixture::root());
}

#[tokio::test]
async fn test_links_between_cached_nodes() {
    let (_bridge, client) = client();
    let space = client.address_space();
    space.find_or_load(&fixture::tools()).await.unwrap();
    space.find_or_load(&fixture::controllers()).await.unwrap();

    space.link(&fixture::tools(), "controller", &fixture::controllers()).unwrap();
    let linked = space.linked(&fixture::tools(), "controller").unwrap();
    assert_eq!(linked.id(), &fixture::controllers());

    let err = space.link(&NodeId::numeric(1, 1), "x", &fixture::tools()).unwrap_err();
    assert!(matches!(err, ClientError::NotCached(_)));
}

#[tokio::test]
async fn test_discovered_node_is_browsed_on_load() {
    let (bridge, client) = client();
    let space = client.address_space();
    let assets = space.find_or_load(&fixture::assets()).await.unwrap();

    let stub = space.discover(&assets.child("Tools").unwrap());
    assert_eq!(stub.phase(), LoadPhase::Discovered);
    let before = bridge.count_sent(Command::Browse);

    let tools = space.find_or_load(&fixture::tools()).await.unwrap();
    assert!(Arc::ptr_eq(&stub, &tools));
    assert_eq!(tools.phase(), LoadPhase::Browsed);
    assert_eq!(bridge.count_sent(Command::Browse), before + 1);
}

#[tokio::test]
async fn test_dropped_first_caller_does_not_fail_the_rest() {
    let (bridge, client) = client();
    bridge.hold_replies();
    let space = client.address_space().clone();

    let first = {
        let space = space.clone();
        tokio::spawn(async move { space.find_or_load(&fixture::tools()).await })
    };
    eventually(|| client.session().correlator().pending_count() == 1).await;
    let second = {
        let space = space.clone();
        tokio::spawn(async move { space.find_or_load(&fixture::tools()).await })
    };
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    first.abort();
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    bridge.release_replies();

    let tools = within(second).await.unwrap().unwrap();
    assert_eq!(tools.id(), &fixture::tools());
    assert!(Arc::ptr_eq(&tools, &space.get(&fixture::tools()).unwrap()));
    assert_eq!(bridge.count_sent(Command::Browse), 1);
}

#[tokio::test]
async fn test_read_does_not_stand_in_for_browse() {
    let (bridge, client) = client();
    bridge.ignore(Command::Read);
    let space = client.address_space().clone();

    let read = {
        let space = space.clone();
        tokio::spawn(async move { space.read(&fixture::assets(), "Value").await })
    };
    let correlator = client.session().correlator();
    eventually(|| correlator.pending_count() == 1).await;
    let id = correlator.last_issued().unwrap();
    let data = json!({ "nodeid": fixture::assets().to_string(), "attribute": "Value", "value": "42" });
    bridge.inject(reply_frame(InboundKind::ReadResult, common::EP, Some(id), data));
    assert_eq!(within(read).await.unwrap().unwrap()["value"], "42");

    let cached = space.get(&fixture::assets()).unwrap();
    assert_eq!(cached.phase(), LoadPhase::Discovered);
    assert_eq!(cached.value(), Some(json!(42)));

    let assets = space.find_or_load(&fixture::assets()).await.unwrap();
    assert!(Arc::ptr_eq(&cached, &assets));
    assert_eq!(bridge.count_sent(Command::Browse), 1);
    assert_eq!(assets.child_relations(Some(ReferenceType::Organizes)).len(), 2);
    assert_eq!(assets.phase(), LoadPhase::Read);
}

#[tokio::test]
async fn test_read_without_identity_still_settles() {
    let (bridge, client) = client();
    bridge.ignore(Command::Read);
    let space = client.address_space().clone();

    let read = {
        let space = space.clone();
        tokio::spawn(async move { space.read(&fixture::system_name(), "Value").await })
    };
    let correlator = client.session().correlator();
    eventually(|| correlator.pending_count() == 1).await;
    let id = correlator.last_issued().unwrap();
    bridge.inject(reply_frame(InboundKind::ReadResult, common::EP, Some(id), json!({ "value": "Station 7" })));

    assert_eq!(within(read).await.unwrap().unwrap()["value"], "Station 7");
    assert!(space.is_empty());
}

#[tokio::test]
async fn test_attribute_read_keeps_class() {
    let (_bridge, client) = client();
    let space = client.address_space();
    let name = space.child(&fixture::system(), "SystemName").await.unwrap();
    assert_eq!(name.class(), NodeClass::Variable);

    space.read(name.id(), "Value").await.unwrap();
    assert_eq!(name.class(), NodeClass::Variable);
    assert!(matches!(name.variant(), NodeVariant::Variable(_)));
    assert_eq!(name.phase(), LoadPhase::Read);
}
