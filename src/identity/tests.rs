use super::*;

#[test]
fn test_node_id_wire_layout() {
    let id = NodeId::new(1, 5).unwrap();
    assert_eq!(id.raw(), 0x0405);
    assert_eq!(id.to_bytes(), [0x05, 0x04]);
    assert_eq!(NodeId::from_bytes([0x05, 0x04]), id);
    assert_eq!(id.area(), 1);
    assert_eq!(id.node(), 5);
}

#[test]
fn test_node_id_range_checks() {
    assert!(NodeId::new(64, 1).is_err());
    assert!(NodeId::new(1, 1024).is_err());
    assert!(NodeId::new(63, 1023).is_ok());
}

#[test]
fn test_node_id_parse_and_display() {
    let id: NodeId = "2.17".parse().unwrap();
    assert_eq!(id, NodeId::new(2, 17).unwrap());
    assert_eq!(id.to_string(), "2.17");

    let bare: NodeId = "66".parse().unwrap();
    assert_eq!(bare.area(), 0);
    assert_eq!(bare.to_string(), "66");

    assert!("1.2.3".parse::<NodeId>().is_err());
    assert!("x".parse::<NodeId>().is_err());
    assert!("64.1".parse::<NodeId>().is_err());
}

#[test]
fn test_node_id_ordering_is_numeric() {
    let a = NodeId::new(1, 1023).unwrap();
    let b = NodeId::new(2, 1).unwrap();
    assert!(b > a);
    assert!(NodeId::new(1, 7).unwrap() > NodeId::new(1, 6).unwrap());
}

#[test]
fn test_area_mapping() {
    let id = NodeId::bare(2);
    let mapped = id.with_area(1);
    assert_eq!(mapped, NodeId::new(1, 2).unwrap());
    assert_eq!(mapped.without_area(), id);
    assert!(mapped.is_legacy_addressable(1));
    assert!(!mapped.is_legacy_addressable(3));
    assert!(!NodeId::new(1, 300).unwrap().is_legacy_addressable(1));
}

#[test]
fn test_node_id_serde() {
    let id: NodeId = serde_yaml::from_str("\"1.5\"").unwrap();
    assert_eq!(id, NodeId::new(1, 5).unwrap());
    let bare: NodeId = serde_yaml::from_str("42").unwrap();
    assert_eq!(bare, NodeId::bare(42));

    // text that looks like a float comes out quoted, so it reads back as text
    let yaml = serde_yaml::to_string(&id).unwrap();
    assert_eq!(serde_yaml::from_str::<NodeId>(&yaml).unwrap(), id);
    let yaml = serde_yaml::to_string(&NodeId::new(1, 10).unwrap()).unwrap();
    assert_eq!(serde_yaml::from_str::<NodeId>(&yaml).unwrap(), NodeId::new(1, 10).unwrap());
}

#[test]
fn test_station_address() {
    let id = NodeId::new(1, 2).unwrap();
    let mac = MacAddr::from_node(id);
    assert_eq!(mac.to_string(), "aa-00-04-00-02-04");
    assert_eq!(mac.node_id(), Some(id));
    assert!(!mac.is_multicast());
    assert!(MacAddr::ALL_ROUTERS.is_multicast());
    assert_eq!(MacAddr::ALL_ROUTERS.node_id(), None);

    let parsed: MacAddr = "aa:00:04:00:02:04".parse().unwrap();
    assert_eq!(parsed, mac);
    assert!("aa-00".parse::<MacAddr>().is_err());
}

#[test]
fn test_node_type_codes() {
    for code in 0..4 {
        let t = NodeType::from_wire(code).unwrap();
        assert_eq!(t.to_wire(), code);
    }
    assert!(NodeType::from_wire(4).is_none());
    assert!(NodeType::Level1Router.is_router());
    assert!(!NodeType::Endnode.is_router());
    assert!(!NodeType::Level2Router.valid_in(Phase::Phase3));
    assert!(NodeType::Level1Router.valid_in(Phase::Phase3));
    assert!(!NodeType::Phase2.valid_in(Phase::Phase4));
}

#[test]
fn test_version_phase() {
    assert_eq!(Version::PHASE2.phase(), Some(Phase::Phase2));
    assert_eq!(Version::PHASE3.phase(), Some(Phase::Phase3));
    assert_eq!(Version::PHASE4.phase(), Some(Phase::Phase4));
    assert_eq!(Version::new(3, 0, 0).phase(), None);
    assert_eq!(Version::PHASE3.to_string(), "1.3.0");
}

#[test]
fn test_local_node_validation() {
    let limits = Limits::default();
    let id = NodeId::new(1, 5).unwrap();
    let local = LocalNode::new(id, "test", Phase::Phase4, NodeType::Level2Router, limits).unwrap();
    assert_eq!(local.name(), "TEST");
    assert!(local.is_area_router());
    assert_eq!(local.wire_id(Phase::Phase3), NodeId::bare(5));
    assert_eq!(local.wire_id(Phase::Phase4), id);
    assert_eq!(local.localize(NodeId::bare(2), Phase::Phase3), NodeId::new(1, 2).unwrap());

    // Phase III nodes have no area
    assert!(LocalNode::new(id, "test", Phase::Phase3, NodeType::Level1Router, limits).is_err());
    assert!(LocalNode::new(NodeId::bare(5), "test", Phase::Phase3, NodeType::Level2Router, limits).is_err());
    assert!(LocalNode::new(NodeId::bare(5), "test", Phase::Phase4, NodeType::Endnode, limits).is_err());
    assert!(LocalNode::new(id, "toolongname", Phase::Phase4, NodeType::Endnode, limits).is_err());
}

#[test]
fn test_node_name_validation() {
    assert!(validate_node_name("REMOTE").is_ok());
    assert!(validate_node_name("node1").is_ok());
    assert!(validate_node_name("1234").is_err());
    assert!(validate_node_name("").is_err());
    assert!(validate_node_name("a-b").is_err());
}

#[test]
fn test_node_db_lookup() {
    let mut db = NodeDb::new();
    let id = NodeId::new(1, 3).unwrap();
    let mut rec = NodeRecord::new(id, "remote");
    rec.outbound_verification = Some(b"secret".to_vec());
    db.insert(rec).unwrap();

    assert_eq!(db.id_of("Remote"), Some(id));
    assert_eq!(db.name_of(id), Some("REMOTE"));
    assert_eq!(db.outbound_verification(id), b"secret");
    assert_eq!(db.inbound_verification(id), None);
    assert_eq!(db.outbound_verification(NodeId::new(1, 4).unwrap()), b"");

    // neither the address nor the name may repeat
    assert!(db.insert(NodeRecord::new(id, "other")).is_err());
    assert!(db.insert(NodeRecord::new(NodeId::new(1, 9).unwrap(), "REMOTE")).is_err());
    assert_eq!(db.len(), 1);
}
