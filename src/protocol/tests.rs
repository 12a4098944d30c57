use super::*;
use crate::identity::{MacAddr, NodeId, NodeType, Phase, Version};
use proptest::prelude::*;

fn nid(area: u8, node: u16) -> NodeId {
    NodeId::new(area, node).unwrap()
}

// ===== Canonical captures =====

#[test]
fn test_ptp_init_capture() {
    let bytes = b"\x01\x02\x04\x07\x10\x02\x02\x00\x00\x20\x00\x00";
    let Packet::PtpInit(init) = decode(bytes, PacketKind::PtpInit).unwrap() else {
        panic!("wrong kind");
    };
    assert_eq!(init.srcnode, nid(1, 2));
    assert_eq!(init.ntype, NodeType::Endnode);
    assert!(init.verif);
    assert_eq!(init.blksize, 528);
    assert_eq!(init.timer, 32);
    assert_eq!(init.tiver, Version::PHASE4);
    assert!(init.reserved.is_empty());
    assert_eq!(init.encode(), bytes.to_vec());

    let mut init = PtpInit::new(nid(2, 2), NodeType::Level1Router, false, 513, 64);
    init.tiver = Version::new(2, 1, 0);
    assert_eq!(init.encode(), b"\x01\x02\x08\x02\x01\x02\x02\x01\x00\x40\x00\x00".to_vec());
}

#[test]
fn test_ptp_init3_capture() {
    let bytes = b"\x01\x02\x00\x07\x10\x02\x01\x03\x00\x00";
    assert_eq!(classify_ptp(bytes, Phase::Phase4).unwrap(), PacketKind::PtpInit3);
    let init = PtpInit3::decode(bytes).unwrap();
    assert_eq!(init.srcnode, NodeId::bare(2));
    assert_eq!(init.ntype, NodeType::Endnode);
    assert!(init.verif);
    assert_eq!(init.tiver, Version::PHASE3);

    let mut init = PtpInit3::new(NodeId::bare(5), NodeType::Level1Router, false, 513);
    init.tiver = Version::new(1, 3, 2);
    assert_eq!(init.encode(), b"\x01\x05\x00\x02\x01\x02\x01\x03\x02\x00".to_vec());
}

#[test]
fn test_verify_and_hello_capture() {
    let v = PtpVerify::decode(b"\x03\x02\x0c\x04abcd").unwrap();
    assert_eq!(v.srcnode, nid(3, 2));
    assert_eq!(v.fcnval, b"abcd");
    assert_eq!(
        PtpVerify::new(nid(2, 3), b"foobar").encode(),
        b"\x03\x03\x08\x06foobar".to_vec()
    );

    let h = PtpHello::decode(b"\x05\x02\x00\x04abcd").unwrap();
    assert_eq!(h.srcnode, NodeId::bare(2));
    assert!(!is_test_data(&h.testdata));
    let h = PtpHello::new(NodeId::bare(3), 2);
    assert_eq!(h.encode(), b"\x05\x03\x00\x02\xaa\xaa".to_vec());
    assert!(is_test_data(&h.testdata));
}

#[test]
fn test_router_hello_capture() {
    let bytes = b"\x0b\x02\x00\x01\xaa\x00\x04\x00\x02\x04\x02\
                  \x10\x02\x40\x00\x80\x00\x00\
                  \x0f\x00\x00\x00\x00\x00\x00\x00\
                  \x07\xaa\x00\x04\x00\x07\x04\x9f";
    let hello = RouterHello::decode(bytes).unwrap();
    assert_eq!(hello.tiver, Version::new(2, 0, 1));
    assert_eq!(hello.id, nid(1, 2));
    assert_eq!(hello.ntype, NodeType::Level1Router);
    assert_eq!(hello.blksize, 528);
    assert_eq!(hello.priority, 64);
    assert_eq!(hello.timer, 128);
    assert_eq!(
        hello.rslist,
        vec![RsEntry {
            router: nid(1, 7),
            priority: 31,
            twoway: true
        }]
    );
    assert_eq!(hello.encode(), bytes.to_vec());

    let hello = RouterHello {
        tiver: Version::PHASE4,
        id: nid(2, 3),
        ntype: NodeType::Level2Router,
        blksize: 513,
        priority: 16,
        timer: 80,
        rslist: vec![
            RsEntry {
                router: nid(2, 2),
                priority: 32,
                twoway: false,
            },
            RsEntry {
                router: nid(2, 1),
                priority: 64,
                twoway: true,
            },
        ],
    };
    let expected: &[u8] = b"\x0b\x02\x00\x00\xaa\x00\x04\x00\x03\x08\x01\
                            \x01\x02\x10\x00\x50\x00\x00\
                            \x16\x00\x00\x00\x00\x00\x00\x00\
                            \x0e\xaa\x00\x04\x00\x02\x08\x20\
                            \xaa\x00\x04\x00\x01\x08\xc0";
    assert_eq!(hello.encode(), expected.to_vec());
}

#[test]
fn test_endnode_hello_capture() {
    let bytes = b"\x0d\x02\x00\x03\xaa\x00\x04\x00\x01\x0c\x03\x04\x02\
                  \x00\x00\x00\x00\x00\x00\x00\x00\x00\
                  \xaa\x00\x04\x00\xff\x0c\x14\x00\x00\x06abcdef";
    let hello = EndnodeHello::decode(bytes).unwrap();
    assert_eq!(hello.tiver, Version::new(2, 0, 3));
    assert_eq!(hello.id, nid(3, 1));
    assert_eq!(hello.ntype, NodeType::Endnode);
    assert_eq!(hello.blksize, 516);
    assert_eq!(hello.neighbor, MacAddr::from_node(nid(3, 255)));
    assert_eq!(hello.timer, 20);
    assert_eq!(hello.testdata, b"abcdef");
    assert_eq!(hello.encode(), bytes.to_vec());
}

#[test]
fn test_routing_captures() {
    let l1 = L1Routing::decode(b"\x07\x03\x00\x00\x02\x00\x05\x00\xff\x7f\x06\x08\x0d\x88").unwrap();
    assert_eq!(l1.srcnode, NodeId::bare(3));
    let entries: Vec<_> = l1.entries().map(|(id, e)| (id, e.via(5))).collect();
    assert_eq!(
        entries,
        vec![(5, RouteEntry { cost: 1028, hops: 32 }), (6, RouteEntry::new(11, 3))]
    );

    let l1 = L1Routing {
        srcnode: NodeId::bare(4),
        segments: vec![Segment::new(3, vec![RouteEntry::new(5, 1), RouteEntry::new(99, 5)])],
    };
    assert_eq!(
        l1.encode(),
        b"\x07\x04\x00\x00\x02\x00\x03\x00\x05\x04\x63\x14\x6e\x18".to_vec()
    );
    let l2 = L2Routing {
        srcnode: NodeId::bare(4),
        segments: l1.segments.clone(),
    };
    assert_eq!(
        l2.encode(),
        b"\x09\x04\x00\x00\x02\x00\x03\x00\x05\x04\x63\x14\x6e\x18".to_vec()
    );

    let p3 = Phase3Routing::decode(b"\x07\x03\x00\x00\xff\x7f\x06\x08\x05\x88").unwrap();
    let entries: Vec<_> = p3.entries().collect();
    assert_eq!(entries, vec![(1, RouteEntry::INFINITE), (2, RouteEntry::new(6, 2))]);
    let p3 = Phase3Routing {
        srcnode: NodeId::bare(4),
        entries: vec![RouteEntry::new(5, 1), RouteEntry::new(99, 5)],
    };
    assert_eq!(p3.encode(), b"\x07\x04\x00\x00\x05\x04\x63\x14\x68\x18".to_vec());
}

#[test]
fn test_routing_checksum_errors() {
    assert!(matches!(
        L1Routing::decode(b"\x07\x03\x00\x00\x02\x00\x05\x00\xff\x7f\x06\x08\x0c\x88"),
        Err(ProtocolError::ChecksumMismatch { .. })
    ));
    assert!(matches!(
        L2Routing::decode(b"\x09\x03\x00\x00\x02\x00\x05\x00\xff\x7f\x06\x08\x0c\x88"),
        Err(ProtocolError::ChecksumMismatch { .. })
    ));
    assert!(matches!(
        Phase3Routing::decode(b"\x07\x03\x00\x00\xff\x7f\x06\x08\x06\x88"),
        Err(ProtocolError::ChecksumMismatch { .. })
    ));
}

#[test]
fn test_routing_segment_bounds() {
    assert!(matches!(
        L1Routing::decode(b"\x07\x03\x00\x00\x00\x00\x07\x00\xff\x7f\x06\x08\x0d\x88"),
        Err(ProtocolError::InvalidSegment { count: 0, .. })
    ));
    assert!(matches!(
        L1Routing::decode(b"\x07\x03\x00\x00\x02\x00\x00\x04\xff\x7f\x06\x08\x08\x8c"),
        Err(ProtocolError::InvalidSegment { start: 1024, .. })
    ));
    assert!(matches!(
        L2Routing::decode(b"\x09\x03\x00\x00\x02\x00\x3f\x00\xff\x7f\x06\x08\x47\x88"),
        Err(ProtocolError::InvalidSegment { start: 63, .. })
    ));
}

#[test]
fn test_data_captures() {
    let short = ShortData::decode(b"\x02\x03\x04\x01\x08\x11abcdef payload").unwrap();
    assert!(!short.header.rqr);
    assert!(!short.header.rts);
    assert_eq!(short.header.dstnode, nid(1, 3));
    assert_eq!(short.header.srcnode, nid(2, 1));
    assert_eq!(short.header.visit, 17);
    assert_eq!(short.payload, b"abcdef payload");

    let mut header = DataHeader::new(nid(1, 1), nid(2, 2), true);
    header.visit = 1;
    let short = ShortData::new(header, b"new payload".to_vec());
    assert_eq!(short.encode(), b"\x0a\x02\x08\x01\x04\x01new payload".to_vec());

    let long = LongData::decode(
        b"\x26\x00\x00\xaa\x00\x04\x00\x03\x04\
          \x00\x00\xaa\x00\x04\x00\x01\x08\x00\x11\x00\x00abcdef payload",
    )
    .unwrap();
    assert!(long.ie);
    assert_eq!(long.header.dstnode, nid(1, 3));
    assert_eq!(long.header.srcnode, nid(2, 1));
    assert_eq!(long.header.visit, 17);
    assert_eq!(long.payload, b"abcdef payload");

    let long = LongData::new(header, true, b"new payload".to_vec());
    let expected: &[u8] = b"\x2e\x00\x00\xaa\x00\x04\x00\x02\x08\
                            \x00\x00\xaa\x00\x04\x00\x01\x04\x00\x01\
                            \x00\x00new payload";
    assert_eq!(long.encode(), expected.to_vec());
}

#[test]
fn test_phase2_captures() {
    let init = NodeInit::decode(
        b"\x58\x01\x07\x04TEST\x00\x00\x04\x02\x01\x02\x40\x00\x00\x00\x00\x03\x01\x00\x00",
    )
    .unwrap();
    assert_eq!(init.srcnode, 7);
    assert_eq!(init.nodename, "TEST");
    assert_eq!(init.int, 0);
    assert!(!init.verif);
    assert_eq!(init.rint, 0);
    assert_eq!(init.blksize, 516);
    assert_eq!(init.nspsize, 513);
    assert_eq!(init.maxlnks, 64);
    assert_eq!(init.commver, Version::new(3, 1, 0));
    assert_eq!(init.sysver, "");

    let mut init = NodeInit::new(17, "FOO", 516);
    init.verif = true;
    init.maxlnks = 128;
    init.nspsize = 511;
    init.sysver = "TESTING".into();
    let expected: &[u8] =
        b"\x58\x01\x11\x03FOO\x00\x01\x04\x02\xff\x01\x80\x00\x00\x00\x00\x03\x01\x00\x07TESTING";
    assert_eq!(init.encode(), expected.to_vec());

    let v = NodeVerify::decode(b"\x58\x02\x00PASSWORD").unwrap();
    assert_eq!(&v.password, b"PASSWORD");
    assert_eq!(NodeVerify::new(b"TESTING").encode(), b"\x58\x02\x00TESTING\x00".to_vec());
    assert!(NodeVerify::new(b"OVERIF").matches(b"OVERIF"));

    let nop = NopMsg::decode(b"\x08TESTDATA").unwrap();
    assert_eq!(nop.payload, b"TESTDATA");
}

#[test]
fn test_route_header() {
    let hdr = RouteHeader {
        dstnode: "REMOTE".into(),
        srcnode: "LOCAL".into(),
        payload: vec![0x18, 0, 0, 3, 0],
    };
    let bytes = hdr.encode();
    assert_eq!(bytes[0], ROUTE_HEADER_FLAG);
    assert_eq!(classify_phase2(&bytes).unwrap(), Some(PacketKind::RouteHeader));
    assert_eq!(RouteHeader::decode(&bytes).unwrap(), hdr);
}

#[test]
fn test_nsp_header() {
    let ci = NspHeader::decode(&[0x18, 0, 0, 0x03, 0x10]).unwrap();
    assert_eq!(ci.kind, NspKind::ConnectInit);
    assert_eq!(ci.srcaddr, 0x1003);
    let dc = disconnect_confirm(&ci, REASON_UNREACHABLE);
    assert_eq!(dc, vec![0x48, 0x03, 0x10, 0x00, 0x00, 39, 0]);
    let dc = NspHeader::decode(&dc).unwrap();
    assert_eq!(dc.kind, NspKind::DisconnectConfirm);
    assert_eq!(dc.dstaddr, 0x1003);
    assert!(NspHeader::decode(&[0x7f, 0, 0, 0, 0]).is_err());
}

// ===== Classification =====

#[test]
fn test_classify_ptp_phase() {
    let l1 = b"\x07\x03\x00\x00\x02\x00\x05\x00\xff\x7f\x06\x08\x0d\x88";
    assert_eq!(classify_ptp(l1, Phase::Phase4).unwrap(), PacketKind::L1Routing);
    assert_eq!(classify_ptp(l1, Phase::Phase3).unwrap(), PacketKind::Phase3Routing);
    let l2 = b"\x09\x03\x00\x00";
    assert!(matches!(
        classify_ptp(l2, Phase::Phase3),
        Err(ProtocolError::UnexpectedKind { kind: PacketKind::L2Routing, .. })
    ));
    let init4 = b"\x01\x02\x04\x02\x10\x02\x02\x00\x00\x0a\x00\x00";
    assert_eq!(classify_ptp(init4, Phase::Phase4).unwrap(), PacketKind::PtpInit);
    assert_eq!(classify_ptp(b"\x58\x02\x00OVERIF\x00\x00", Phase::Phase4).unwrap(), PacketKind::NodeVerify);
    assert_eq!(classify_ptp(b"\x02\x03\x04\x01\x08\x11", Phase::Phase4).unwrap(), PacketKind::ShortData);
    assert!(classify_ptp(b"\x0b", Phase::Phase4).is_err());
    assert!(classify_ptp(b"", Phase::Phase4).is_err());
}

#[test]
fn test_classify_lan() {
    assert_eq!(classify_lan(b"\x0b").unwrap(), PacketKind::RouterHello);
    assert_eq!(classify_lan(b"\x0d").unwrap(), PacketKind::EndnodeHello);
    assert_eq!(classify_lan(b"\x26").unwrap(), PacketKind::LongData);
    assert!(matches!(
        classify_lan(b"\x01"),
        Err(ProtocolError::UnexpectedKind { kind: PacketKind::PtpInit, .. })
    ));
}

#[test]
fn test_classify_phase2() {
    assert_eq!(classify_phase2(b"\x08\xaa").unwrap(), Some(PacketKind::Nop));
    assert_eq!(classify_phase2(b"\x58\x01").unwrap(), Some(PacketKind::NodeInit));
    assert_eq!(classify_phase2(b"\x18\x00\x00").unwrap(), None);
}

#[test]
fn test_strip_padding() {
    let buf = b"\x88Testing\x05\x02\x00\x00";
    assert_eq!(strip_padding(buf, true).unwrap(), b"\x05\x02\x00\x00");
    assert_eq!(strip_padding(buf, false), Err(ProtocolError::InvalidPadding(0x88)));
    assert!(strip_padding(b"\x85ab", true).is_err());
    assert_eq!(strip_padding(b"\x05", false).unwrap(), b"\x05");
}

#[test]
fn test_decode_rejects_short_and_wrong_tag() {
    assert!(matches!(
        decode(b"\x01\x02\x04", PacketKind::PtpInit),
        Err(ProtocolError::MessageTooShort { .. })
    ));
    // a hello is not an init even though they share the control prefix
    assert!(matches!(
        decode(b"\x05\x02\x00\x04abcd", PacketKind::PtpVerify),
        Err(ProtocolError::InvalidMessageType(0x05))
    ));
    // truncated image
    assert!(decode(b"\x05\x02\x00\x09abcd", PacketKind::PtpHello).is_err());
    // trailing garbage after a fixed layout
    assert!(matches!(
        decode(b"\x03\x02\x0c\x01ab", PacketKind::PtpVerify),
        Err(ProtocolError::TrailingBytes(1))
    ));
}

// ===== Round trips =====

fn arb_node() -> impl Strategy<Value = NodeId> {
    (1u8..=63, 1u16..=1023).prop_map(|(a, n)| NodeId::new(a, n).unwrap())
}

fn arb_entry() -> impl Strategy<Value = RouteEntry> {
    (0u16..=1023, 0u8..=31).prop_map(|(c, h)| RouteEntry::new(c, h))
}

fn arb_ntype() -> impl Strategy<Value = NodeType> {
    (0u8..4).prop_map(|c| NodeType::from_wire(c).unwrap())
}

proptest! {
    #[test]
    fn prop_init_roundtrip(src in arb_node(), ntype in arb_ntype(), verif: bool,
                           blksize: u16, timer: u16,
                           reserved in proptest::collection::vec(any::<u8>(), 0..64)) {
        let mut init = PtpInit::new(src, ntype, verif, blksize, timer);
        init.reserved = reserved;
        let packet = Packet::PtpInit(init);
        prop_assert_eq!(decode(&packet.encode(), PacketKind::PtpInit).unwrap(), packet);
    }

    #[test]
    fn prop_router_hello_roundtrip(id in arb_node(), prio in 0u8..128, timer: u16,
                                   routers in proptest::collection::vec((arb_node(), 0u8..128, any::<bool>()), 0..33)) {
        let hello = RouterHello {
            tiver: Version::PHASE4,
            id,
            ntype: NodeType::Level1Router,
            blksize: 1498,
            priority: prio,
            timer,
            rslist: routers.into_iter()
                .map(|(router, priority, twoway)| RsEntry { router, priority, twoway })
                .collect(),
        };
        let packet = Packet::RouterHello(hello);
        prop_assert_eq!(decode(&packet.encode(), PacketKind::RouterHello).unwrap(), packet);
    }

    #[test]
    fn prop_l1_roundtrip(src in arb_node(), start in 0u16..900,
                         entries in proptest::collection::vec(arb_entry(), 1..100)) {
        let msg = L1Routing { srcnode: src, segments: vec![Segment::new(start, entries)] };
        let packet = Packet::L1Routing(msg);
        prop_assert_eq!(decode(&packet.encode(), PacketKind::L1Routing).unwrap(), packet);
    }

    #[test]
    fn prop_l2_roundtrip(src in arb_node(), start in 1u16..30,
                         entries in proptest::collection::vec(arb_entry(), 1..30)) {
        let msg = L2Routing { srcnode: src, segments: vec![Segment::new(start, entries)] };
        let packet = Packet::L2Routing(msg);
        prop_assert_eq!(decode(&packet.encode(), PacketKind::L2Routing).unwrap(), packet);
    }

    #[test]
    fn prop_data_roundtrip(src in arb_node(), dst in arb_node(), rqr: bool, rts: bool,
                           visit in 0u8..64, ie: bool,
                           payload in proptest::collection::vec(any::<u8>(), 0..64)) {
        let header = DataHeader { dstnode: dst, srcnode: src, rqr, rts, visit };
        let short = Packet::ShortData(ShortData::new(header, payload.clone()));
        prop_assert_eq!(decode(&short.encode(), PacketKind::ShortData).unwrap(), short);
        let long = Packet::LongData(LongData::new(header, ie, payload));
        prop_assert_eq!(decode(&long.encode(), PacketKind::LongData).unwrap(), long);
    }

    #[test]
    fn prop_node_init_roundtrip(src in 1u16..=255, name in "[A-Z][A-Z0-9]{0,5}",
                                int in 0u8..8, rint in 0u8..4, verif: bool) {
        let mut init = NodeInit::new(src, &name, 576);
        init.int = int;
        init.rint = rint;
        init.verif = verif;
        let packet = Packet::NodeInit(init);
        prop_assert_eq!(decode(&packet.encode(), PacketKind::NodeInit).unwrap(), packet);
    }

    #[test]
    fn prop_decode_never_panics(kind_idx in 0usize..15,
                                bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
        const KINDS: [PacketKind; 15] = [
            PacketKind::PtpInit, PacketKind::PtpInit3, PacketKind::PtpVerify,
            PacketKind::PtpHello, PacketKind::L1Routing, PacketKind::L2Routing,
            PacketKind::Phase3Routing, PacketKind::RouterHello, PacketKind::EndnodeHello,
            PacketKind::ShortData, PacketKind::LongData, PacketKind::NodeInit,
            PacketKind::NodeVerify, PacketKind::Nop, PacketKind::RouteHeader,
        ];
        let _ = decode(&bytes, KINDS[kind_idx]);
    }
}
