//! Point-to-point circuit state machine.
//!
//! Both ends send an Init at the highest phase they run. A node that
//! receives an Init of an older phase falls back to that phase's Init;
//! one that receives a newer phase refuses it. Once the neighbor's Init
//! checks out (and its Verify, when this circuit requires one) the
//! circuit is up and the single adjacency is announced.

use std::time::Duration;

use tracing::{debug, info, warn};

use super::{
    format_error, Adjacency, AdjacencyState, CircuitCounters, CircuitCtx, CircuitEvent,
    CircuitParams, CircuitState, DownReason, InboundData, RejectReason, RoutingLevel, TimerToken,
    HELLO_TEST_LEN, T3_MULT,
};
use crate::compat::localize_header;
use crate::identity::{NodeId, NodeType, Phase, Version, MAX_LEGACY_NODE};
use crate::protocol::{
    self, classify_phase2, classify_ptp, is_test_data, strip_padding, NodeInit, NodeVerify,
    NopMsg, Packet, PacketKind, PtpHello, PtpInit, PtpInit3, PtpVerify, RouteEntry,
    TEST_DATA_BYTE,
};

/// Neighbor's Init, whichever generation it came in.
#[derive(Clone, Debug)]
struct NeighborInit {
    srcnode: NodeId,
    ntype: NodeType,
    verif: bool,
    blksize: u16,
    tiver: Version,
    timer: Option<u16>,
    name: Option<String>,
    int: u8,
    rint: u8,
}

impl NeighborInit {
    fn from_ptp(init: PtpInit) -> Self {
        Self {
            srcnode: init.srcnode,
            ntype: init.ntype,
            verif: init.verif,
            blksize: init.blksize,
            tiver: init.tiver,
            timer: Some(init.timer),
            name: None,
            int: 0,
            rint: 0,
        }
    }

    fn from_ptp3(init: PtpInit3) -> Self {
        Self {
            srcnode: init.srcnode,
            ntype: init.ntype,
            verif: init.verif,
            blksize: init.blksize,
            tiver: init.tiver,
            timer: None,
            name: None,
            int: 0,
            rint: 0,
        }
    }

    fn from_node_init(init: NodeInit) -> Self {
        Self {
            srcnode: NodeId::bare(init.srcnode),
            ntype: NodeType::Phase2,
            verif: init.verif,
            blksize: init.blksize,
            tiver: Version::PHASE2,
            timer: None,
            name: Some(init.nodename),
            int: init.int,
            rint: init.rint,
        }
    }
}

/// Neighbor's verification value.
enum Verification {
    Ptp(Vec<u8>),
    Phase2(NodeVerify),
}

impl Verification {
    fn matches(&self, expected: &[u8]) -> bool {
        match self {
            Verification::Ptp(value) => value.as_slice() == expected,
            Verification::Phase2(v) => v.matches(expected),
        }
    }
}

/// Point-to-point circuit.
#[derive(Debug)]
pub struct PtpCircuit {
    params: CircuitParams,
    state: CircuitState,
    /// Phase of the Init we offer; lowered when the neighbor is older.
    sent_phase: Phase,
    adj: Option<Adjacency>,
    counters: CircuitCounters,
}

impl PtpCircuit {
    pub fn new(params: CircuitParams) -> Self {
        Self {
            params,
            state: CircuitState::Halted,
            sent_phase: Phase::Phase4,
            adj: None,
            counters: CircuitCounters::default(),
        }
    }

    pub fn params(&self) -> &CircuitParams {
        &self.params
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn counters(&self) -> &CircuitCounters {
        &self.counters
    }

    /// The neighbor, once its Init has been accepted.
    pub fn adjacency(&self) -> Option<&Adjacency> {
        self.adj.as_ref()
    }

    // ========================================================================
    // Administrative Transitions
    // ========================================================================

    pub fn start(&mut self, ctx: &CircuitCtx<'_>, out: &mut Vec<CircuitEvent>) {
        if self.state != CircuitState::Halted {
            return;
        }
        debug!(circuit = %self.params.name, phase = %ctx.local.phase(), "Circuit starting");
        self.state = CircuitState::Initializing;
        self.sent_phase = ctx.local.phase();
        self.send_init(ctx, out);
        out.push(CircuitEvent::StartTimer(
            TimerToken::Hello(self.params.id),
            self.params.t3,
        ));
    }

    pub fn stop(&mut self, reason: DownReason, out: &mut Vec<CircuitEvent>) {
        if self.state == CircuitState::Halted {
            return;
        }
        self.drop_adjacency(reason, out);
        out.push(CircuitEvent::CancelTimer(TimerToken::Hello(self.params.id)));
        self.state = CircuitState::Halted;
        info!(circuit = %self.params.name, reason = %reason, "Circuit halted");
    }

    pub fn datalink_down(&mut self, ctx: &CircuitCtx<'_>, out: &mut Vec<CircuitEvent>) {
        if self.state == CircuitState::Halted {
            return;
        }
        self.reset(ctx, DownReason::DatalinkDown, false, out);
    }

    /// Withdraw the adjacency and cancel its listen timer.
    fn drop_adjacency(&mut self, reason: DownReason, out: &mut Vec<CircuitEvent>) {
        let Some(adj) = self.adj.take() else {
            return;
        };
        out.push(CircuitEvent::CancelTimer(TimerToken::Listen {
            circuit: self.params.id,
            neighbor: adj.neighbor,
        }));
        if adj.is_up() {
            self.counters.adjacency_down += 1;
            warn!(
                circuit = %self.params.name,
                neighbor = %adj.neighbor,
                reason = %reason,
                "Circuit down"
            );
            out.push(CircuitEvent::AdjacencyDown {
                neighbor: adj.neighbor,
                reason,
            });
        }
    }

    /// Back to `Initializing`. With `send_now` a fresh Init goes out at
    /// once; otherwise the next one waits for the hello timer.
    fn reset(
        &mut self,
        ctx: &CircuitCtx<'_>,
        reason: DownReason,
        send_now: bool,
        out: &mut Vec<CircuitEvent>,
    ) {
        self.drop_adjacency(reason, out);
        self.state = CircuitState::Initializing;
        self.sent_phase = ctx.local.phase();
        if send_now {
            self.send_init(ctx, out);
        }
        out.push(CircuitEvent::StartTimer(
            TimerToken::Hello(self.params.id),
            self.params.t3,
        ));
    }

    /// Back to Initializing. The next Init goes out on the hello timer, so
    /// two nodes that reject each other do not trade Inits back to back.
    fn reject(
        &mut self,
        ctx: &CircuitCtx<'_>,
        neighbor: Option<NodeId>,
        reason: RejectReason,
        out: &mut Vec<CircuitEvent>,
    ) {
        self.counters.record_reject(reason);
        if reason.is_verification() {
            warn!(circuit = %self.params.name, neighbor = ?neighbor, reason = %reason, "Verification reject");
        } else {
            warn!(circuit = %self.params.name, neighbor = ?neighbor, reason = %reason, "Initialization failure");
        }
        out.push(CircuitEvent::Rejected { neighbor, reason });
        self.reset(ctx, DownReason::Restarted, false, out);
    }

    // ========================================================================
    // Transmission
    // ========================================================================

    fn send(out: &mut Vec<CircuitEvent>, data: Vec<u8>) {
        out.push(CircuitEvent::Send { dst: None, data });
    }

    fn send_init(&self, ctx: &CircuitCtx<'_>, out: &mut Vec<CircuitEvent>) {
        let local = ctx.local;
        let verif = self.params.verify;
        let data = match self.sent_phase {
            Phase::Phase4 => PtpInit::new(
                local.wire_id(Phase::Phase4),
                local.node_type(),
                verif,
                self.params.blksize,
                self.params.t3_secs(),
            )
            .encode(),
            Phase::Phase3 => {
                // Phase III has no area routers
                let ntype = match local.node_type() {
                    NodeType::Level2Router => NodeType::Level1Router,
                    other => other,
                };
                PtpInit3::new(local.wire_id(Phase::Phase3), ntype, verif, self.params.blksize)
                    .encode()
            }
            Phase::Phase2 => {
                let mut init = NodeInit::new(local.id().node(), local.name(), self.params.blksize);
                init.verif = verif;
                init.int = ctx.intercept.int_flags();
                init.rint = ctx.intercept.rint_flags();
                init.encode()
            }
        };
        Self::send(out, data);
    }

    fn send_hello(&self, ctx: &CircuitCtx<'_>, adj: &Adjacency, out: &mut Vec<CircuitEvent>) {
        let data = match adj.phase {
            Phase::Phase2 => NopMsg {
                payload: vec![TEST_DATA_BYTE; HELLO_TEST_LEN],
            }
            .encode(),
            phase => PtpHello::new(ctx.local.wire_id(phase), HELLO_TEST_LEN).encode(),
        };
        Self::send(out, data);
    }

    fn listen_time(adj: &Adjacency) -> Duration {
        adj.hello_timer * T3_MULT
    }

    fn reset_listen(&self, out: &mut Vec<CircuitEvent>) {
        if let Some(adj) = &self.adj {
            out.push(CircuitEvent::StartTimer(
                TimerToken::Listen {
                    circuit: self.params.id,
                    neighbor: adj.neighbor,
                },
                Self::listen_time(adj),
            ));
        }
    }

    // ========================================================================
    // Reception
    // ========================================================================

    pub fn receive(&mut self, ctx: &CircuitCtx<'_>, data: &[u8], out: &mut Vec<CircuitEvent>) {
        if self.state == CircuitState::Halted {
            return;
        }
        self.counters.frames_received += 1;

        let neighbor_phase = self.adj.as_ref().map(|a| a.phase);
        if neighbor_phase == Some(Phase::Phase2) {
            self.receive_phase2(ctx, data, out);
            return;
        }

        let padding_ok = neighbor_phase.unwrap_or(ctx.local.phase()) == Phase::Phase4;
        let packet = strip_padding(data, padding_ok)
            .and_then(|buf| {
                let kind = classify_ptp(buf, neighbor_phase.unwrap_or(Phase::Phase4))?;
                protocol::decode(buf, kind)
            });
        let packet = match packet {
            Ok(p) => p,
            Err(e) => {
                format_error(&self.params, &mut self.counters, data, &e);
                return;
            }
        };

        match packet {
            Packet::PtpInit(init) => self.on_init(ctx, NeighborInit::from_ptp(init), out),
            Packet::PtpInit3(init) => self.on_init(ctx, NeighborInit::from_ptp3(init), out),
            Packet::NodeInit(init) => self.on_init(ctx, NeighborInit::from_node_init(init), out),
            Packet::PtpVerify(v) => self.on_verify(ctx, Verification::Ptp(v.fcnval), out),
            Packet::NodeVerify(v) => self.on_verify(ctx, Verification::Phase2(v), out),
            Packet::PtpHello(hello) => {
                if !is_test_data(&hello.testdata) {
                    debug!(circuit = %self.params.name, "Hello with invalid test data");
                    self.counters.format_errors += 1;
                    return;
                }
                if self.state.is_up() {
                    self.reset_listen(out);
                }
            }
            Packet::L1Routing(msg) => {
                let entries = msg.entries().collect();
                self.on_routing(ctx, RoutingLevel::Level1, entries, out);
            }
            Packet::Phase3Routing(msg) => {
                let entries = msg.entries().collect();
                self.on_routing(ctx, RoutingLevel::Level1, entries, out);
            }
            Packet::L2Routing(msg) => {
                let entries = msg.entries().collect();
                self.on_routing(ctx, RoutingLevel::Level2, entries, out);
            }
            Packet::ShortData(d) => self.on_data(ctx, d.header, false, d.payload, out),
            Packet::LongData(d) => self.on_data(ctx, d.header, d.ie, d.payload, out),
            other => {
                debug!(circuit = %self.params.name, kind = %other.kind(), "Unexpected packet");
            }
        }
    }

    /// Frames from a Phase II neighbor: node init messages, NOPs and
    /// NSP traffic with or without a route header.
    fn receive_phase2(&mut self, ctx: &CircuitCtx<'_>, data: &[u8], out: &mut Vec<CircuitEvent>) {
        let kind = match classify_phase2(data) {
            Ok(kind) => kind,
            Err(e) => {
                format_error(&self.params, &mut self.counters, data, &e);
                return;
            }
        };
        match kind {
            Some(kind @ (PacketKind::NodeInit | PacketKind::NodeVerify)) => {
                match protocol::decode(data, kind) {
                    Ok(Packet::NodeInit(init)) => {
                        self.on_init(ctx, NeighborInit::from_node_init(init), out)
                    }
                    Ok(Packet::NodeVerify(v)) => self.on_verify(ctx, Verification::Phase2(v), out),
                    Ok(_) => {}
                    Err(e) => format_error(&self.params, &mut self.counters, data, &e),
                }
            }
            Some(PacketKind::Nop) => {
                if self.state.is_up() {
                    self.reset_listen(out);
                }
            }
            Some(_) | None => {
                let Some(adj) = self.adj.as_ref().filter(|a| a.is_up()) else {
                    debug!(circuit = %self.params.name, "Phase II data before circuit up");
                    return;
                };
                out.push(CircuitEvent::Phase2Frame {
                    neighbor: adj.neighbor,
                    frame: data.to_vec(),
                });
                self.reset_listen(out);
            }
        }
    }

    fn validate(&self, ctx: &CircuitCtx<'_>, init: &NeighborInit, phase: Phase) -> Result<(), RejectReason> {
        let local = ctx.local;
        let limits = local.limits();
        let id = init.srcnode;
        match phase {
            Phase::Phase4 => {
                if id.area() == 0 || id.area() > limits.maxarea || id.node() == 0 || id.node() > limits.maxnodes {
                    return Err(RejectReason::AddressOutOfRange);
                }
                if !init.ntype.valid_in(Phase::Phase4) {
                    return Err(RejectReason::BadNodeType);
                }
                let both_l2 = local.is_area_router() && init.ntype == NodeType::Level2Router;
                if id.area() != local.area() && !both_l2 {
                    return Err(RejectReason::AreaMismatch);
                }
            }
            Phase::Phase3 => {
                let max = limits.maxnodes.min(MAX_LEGACY_NODE);
                if id.area() != 0 || id.node() == 0 || id.node() > max {
                    return Err(RejectReason::AddressOutOfRange);
                }
                if !init.ntype.valid_in(Phase::Phase3) {
                    return Err(RejectReason::BadNodeType);
                }
            }
            Phase::Phase2 => {
                if id.node() == 0 || id.node() > MAX_LEGACY_NODE {
                    return Err(RejectReason::AddressOutOfRange);
                }
            }
        }
        if local.localize(id, phase) == local.id() {
            return Err(RejectReason::AddressOutOfRange);
        }
        Ok(())
    }

    fn on_init(&mut self, ctx: &CircuitCtx<'_>, init: NeighborInit, out: &mut Vec<CircuitEvent>) {
        if matches!(self.state, CircuitState::Up | CircuitState::Verifying) {
            debug!(circuit = %self.params.name, "Init while running, restarting circuit");
            self.reset(ctx, DownReason::Restarted, true, out);
        }

        let neighbor_guess = init.srcnode;
        let phase = match init.tiver.phase() {
            Some(p) if p <= ctx.local.phase() => p,
            _ => {
                debug!(circuit = %self.params.name, tiver = %init.tiver, "Unsupported routing version");
                self.reject(ctx, Some(neighbor_guess), RejectReason::VersionSkew, out);
                return;
            }
        };
        if let Err(reason) = self.validate(ctx, &init, phase) {
            self.reject(ctx, Some(neighbor_guess), reason, out);
            return;
        }

        if phase < self.sent_phase {
            debug!(circuit = %self.params.name, phase = %phase, "Falling back to older Init");
            self.sent_phase = phase;
            self.send_init(ctx, out);
        }

        let neighbor = ctx.local.localize(init.srcnode, phase);
        if init.verif {
            let value = ctx.nodes.outbound_verification(neighbor);
            let data = match phase {
                Phase::Phase2 => NodeVerify::new(value).encode(),
                _ => PtpVerify::new(ctx.local.wire_id(phase), value).encode(),
            };
            Self::send(out, data);
        }

        let mut adj = Adjacency::new(
            self.params.id,
            neighbor,
            init.ntype,
            phase,
            init.blksize.min(self.params.blksize),
        );
        adj.hello_timer = match init.timer {
            Some(secs) if secs > 0 => Duration::from_secs(secs as u64),
            _ => self.params.t3,
        };
        adj.name = init.name.map(|n| n.to_ascii_uppercase());
        adj.int = init.int;
        adj.rint = init.rint;

        if self.params.verify {
            self.state = CircuitState::Verifying;
            let listen = Self::listen_time(&adj);
            self.adj = Some(adj);
            out.push(CircuitEvent::StartTimer(
                TimerToken::Listen {
                    circuit: self.params.id,
                    neighbor,
                },
                listen,
            ));
            debug!(circuit = %self.params.name, neighbor = %neighbor, "Waiting for verification");
        } else {
            self.come_up(adj, out);
        }
    }

    fn on_verify(&mut self, ctx: &CircuitCtx<'_>, value: Verification, out: &mut Vec<CircuitEvent>) {
        match self.state {
            CircuitState::Verifying => {}
            CircuitState::Up => {
                debug!(circuit = %self.params.name, "Verify while up, restarting circuit");
                self.reset(ctx, DownReason::Restarted, true, out);
                return;
            }
            _ => {
                let neighbor = self.adj.as_ref().map(|a| a.neighbor);
                self.reject(ctx, neighbor, RejectReason::UnexpectedPacket, out);
                return;
            }
        }
        let Some(adj) = self.adj.take() else {
            return;
        };
        let ok = ctx
            .nodes
            .inbound_verification(adj.neighbor)
            .is_some_and(|expected| value.matches(expected));
        if ok {
            self.come_up(adj, out);
        } else {
            let neighbor = adj.neighbor;
            self.adj = Some(adj);
            self.reject(ctx, Some(neighbor), RejectReason::InvalidVerification, out);
        }
    }

    fn come_up(&mut self, mut adj: Adjacency, out: &mut Vec<CircuitEvent>) {
        adj.state = AdjacencyState::Up;
        self.state = CircuitState::Up;
        info!(
            circuit = %self.params.name,
            neighbor = %adj.neighbor,
            node_type = %adj.node_type,
            phase = %adj.phase,
            blksize = adj.blksize,
            "Circuit up"
        );
        out.push(CircuitEvent::StartTimer(
            TimerToken::Listen {
                circuit: self.params.id,
                neighbor: adj.neighbor,
            },
            Self::listen_time(&adj),
        ));
        out.push(CircuitEvent::StartTimer(
            TimerToken::Hello(self.params.id),
            self.params.t3,
        ));
        out.push(CircuitEvent::AdjacencyUp(adj.clone()));
        self.adj = Some(adj);
    }

    fn on_routing(
        &mut self,
        ctx: &CircuitCtx<'_>,
        level: RoutingLevel,
        entries: Vec<(u16, RouteEntry)>,
        out: &mut Vec<CircuitEvent>,
    ) {
        let Some(adj) = self.adj.as_ref().filter(|a| a.is_up()) else {
            return;
        };
        let wanted = match level {
            RoutingLevel::Level1 => ctx.local.is_router() && adj.is_router(),
            RoutingLevel::Level2 => {
                ctx.local.is_area_router() && adj.node_type == NodeType::Level2Router
            }
        };
        let neighbor = adj.neighbor;
        self.reset_listen(out);
        if wanted {
            out.push(CircuitEvent::Routing {
                neighbor,
                level,
                entries,
            });
        }
    }

    fn on_data(
        &mut self,
        ctx: &CircuitCtx<'_>,
        header: protocol::DataHeader,
        ie: bool,
        payload: Vec<u8>,
        out: &mut Vec<CircuitEvent>,
    ) {
        let Some(adj) = self.adj.as_ref().filter(|a| a.is_up()) else {
            debug!(circuit = %self.params.name, "Data before circuit up");
            return;
        };
        let header = localize_header(ctx.local, adj.phase, header);
        out.push(CircuitEvent::Data(InboundData {
            neighbor: adj.neighbor,
            station: None,
            header,
            ie,
            payload,
        }));
        self.reset_listen(out);
    }

    // ========================================================================
    // Timers
    // ========================================================================

    pub fn timer(&mut self, ctx: &CircuitCtx<'_>, token: &TimerToken, out: &mut Vec<CircuitEvent>) {
        match *token {
            TimerToken::Hello(_) => self.hello_timer(ctx, out),
            TimerToken::Listen { neighbor, .. } => {
                if self.adj.as_ref().map(|a| a.neighbor) != Some(neighbor) {
                    return;
                }
                match self.state {
                    CircuitState::Verifying => {
                        self.reject(ctx, Some(neighbor), RejectReason::VerificationTimeout, out);
                    }
                    CircuitState::Up => {
                        self.reset(ctx, DownReason::ListenerTimeout, true, out);
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }

    fn hello_timer(&mut self, ctx: &CircuitCtx<'_>, out: &mut Vec<CircuitEvent>) {
        match self.state {
            CircuitState::Halted => return,
            CircuitState::Up => {
                if let Some(adj) = &self.adj {
                    self.send_hello(ctx, adj, out);
                }
            }
            CircuitState::Initializing | CircuitState::Verifying => self.send_init(ctx, out),
        }
        out.push(CircuitEvent::StartTimer(
            TimerToken::Hello(self.params.id),
            self.params.t3,
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::CircuitId;
    use crate::compat::InterceptMode;
    use crate::config::CircuitKind;
    use crate::identity::{Limits, LocalNode, NodeDb, NodeRecord};
    use crate::protocol::{DataHeader, ShortData};

    fn params(verify: bool) -> CircuitParams {
        CircuitParams {
            id: CircuitId::new(1),
            name: "ptp-1".to_string(),
            kind: CircuitKind::Ptp,
            cost: 4,
            t3: Duration::from_secs(10),
            priority: 64,
            nr: 10,
            verify,
            blksize: 576,
        }
    }

    fn local(phase: Phase, ntype: NodeType, id: NodeId) -> LocalNode {
        LocalNode::new(id, "LOCAL", phase, ntype, Limits::default()).unwrap()
    }

    fn node(area: u8, n: u16) -> NodeId {
        NodeId::new(area, n).unwrap()
    }

    fn sends(out: &[CircuitEvent]) -> Vec<&Vec<u8>> {
        out.iter()
            .filter_map(|e| match e {
                CircuitEvent::Send { data, .. } => Some(data),
                _ => None,
            })
            .collect()
    }

    fn has_up(out: &[CircuitEvent]) -> Option<&Adjacency> {
        out.iter().find_map(|e| match e {
            CircuitEvent::AdjacencyUp(a) => Some(a),
            _ => None,
        })
    }

    struct Fixture {
        local: LocalNode,
        nodes: NodeDb,
    }

    impl Fixture {
        fn new(local: LocalNode) -> Self {
            Self {
                local,
                nodes: NodeDb::new(),
            }
        }

        fn ctx(&self) -> CircuitCtx<'_> {
            CircuitCtx {
                local: &self.local,
                nodes: &self.nodes,
                intercept: InterceptMode::Offer,
            }
        }
    }

    fn started(fx: &Fixture, verify: bool) -> PtpCircuit {
        let mut c = PtpCircuit::new(params(verify));
        let mut out = Vec::new();
        c.start(&fx.ctx(), &mut out);
        c
    }

    #[test]
    fn test_start_sends_init() {
        let fx = Fixture::new(local(Phase::Phase4, NodeType::Level1Router, node(1, 1)));
        let mut c = PtpCircuit::new(params(false));
        let mut out = Vec::new();
        c.start(&fx.ctx(), &mut out);
        assert_eq!(c.state(), CircuitState::Initializing);
        let init = PtpInit::decode(sends(&out)[0]).unwrap();
        assert_eq!(init.srcnode, node(1, 1));
        assert_eq!(init.timer, 10);
        assert!(out.contains(&CircuitEvent::StartTimer(
            TimerToken::Hello(CircuitId::new(1)),
            Duration::from_secs(10)
        )));
    }

    #[test]
    fn test_init_brings_circuit_up() {
        let fx = Fixture::new(local(Phase::Phase4, NodeType::Level1Router, node(1, 1)));
        let mut c = started(&fx, false);
        let mut out = Vec::new();
        let init = PtpInit::new(node(1, 2), NodeType::Level1Router, false, 1000, 10);
        c.receive(&fx.ctx(), &init.encode(), &mut out);

        assert_eq!(c.state(), CircuitState::Up);
        let adj = has_up(&out).unwrap();
        assert_eq!(adj.neighbor, node(1, 2));
        assert_eq!(adj.blksize, 576);
        assert!(out.contains(&CircuitEvent::StartTimer(
            TimerToken::Listen {
                circuit: CircuitId::new(1),
                neighbor: node(1, 2)
            },
            Duration::from_secs(20)
        )));
    }

    #[test]
    fn test_hello_while_up_only_resets_listen() {
        let fx = Fixture::new(local(Phase::Phase4, NodeType::Level1Router, node(1, 1)));
        let mut c = started(&fx, false);
        let mut out = Vec::new();
        let init = PtpInit::new(node(1, 2), NodeType::Level1Router, false, 576, 10);
        c.receive(&fx.ctx(), &init.encode(), &mut out);
        let before = c.adjacency().cloned();

        out.clear();
        c.receive(&fx.ctx(), &PtpHello::new(node(1, 2), 10).encode(), &mut out);
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0], CircuitEvent::StartTimer(TimerToken::Listen { .. }, _)));
        assert_eq!(c.adjacency().cloned(), before);
    }

    #[test]
    fn test_area_mismatch_rejected() {
        let fx = Fixture::new(local(Phase::Phase4, NodeType::Level1Router, node(1, 1)));
        let mut c = started(&fx, false);
        let mut out = Vec::new();
        let init = PtpInit::new(node(2, 2), NodeType::Level1Router, false, 576, 10);
        c.receive(&fx.ctx(), &init.encode(), &mut out);
        assert_eq!(c.state(), CircuitState::Initializing);
        assert!(out.contains(&CircuitEvent::Rejected {
            neighbor: Some(node(2, 2)),
            reason: RejectReason::AreaMismatch
        }));
        assert_eq!(c.counters().init_failures, 1);
    }

    #[test]
    fn test_reject_waits_for_hello_timer() {
        let fx = Fixture::new(local(Phase::Phase4, NodeType::Level1Router, node(1, 1)));
        let mut c = started(&fx, false);
        let mut out = Vec::new();
        let init = PtpInit::new(node(2, 2), NodeType::Level1Router, false, 576, 10);
        c.receive(&fx.ctx(), &init.encode(), &mut out);
        assert!(sends(&out).is_empty());
        assert!(out.contains(&CircuitEvent::StartTimer(
            TimerToken::Hello(CircuitId::new(1)),
            Duration::from_secs(10)
        )));

        out.clear();
        c.timer(&fx.ctx(), &TimerToken::Hello(CircuitId::new(1)), &mut out);
        let init = PtpInit::decode(sends(&out)[0]).unwrap();
        assert_eq!(init.srcnode, node(1, 1));
        assert_eq!(c.state(), CircuitState::Initializing);
    }

    #[test]
    fn test_area_routers_may_cross_areas() {
        let fx = Fixture::new(local(Phase::Phase4, NodeType::Level2Router, node(1, 1)));
        let mut c = started(&fx, false);
        let mut out = Vec::new();
        let init = PtpInit::new(node(2, 2), NodeType::Level2Router, false, 576, 10);
        c.receive(&fx.ctx(), &init.encode(), &mut out);
        assert_eq!(c.state(), CircuitState::Up);
    }

    #[test]
    fn test_phase3_neighbor_gets_phase3_init() {
        let fx = Fixture::new(local(Phase::Phase4, NodeType::Level2Router, node(5, 1)));
        let mut c = started(&fx, false);
        let mut out = Vec::new();
        let init = PtpInit3::new(NodeId::bare(7), NodeType::Level1Router, false, 576);
        c.receive(&fx.ctx(), &init.encode(), &mut out);

        let reply = PtpInit3::decode(sends(&out)[0]).unwrap();
        assert_eq!(reply.srcnode, NodeId::bare(1));
        assert_eq!(reply.ntype, NodeType::Level1Router);
        let adj = has_up(&out).unwrap();
        assert_eq!(adj.neighbor, node(5, 7));
        assert_eq!(adj.phase, Phase::Phase3);
    }

    #[test]
    fn test_phase3_node_refuses_phase4() {
        let fx = Fixture::new(local(Phase::Phase3, NodeType::Level1Router, NodeId::bare(3)));
        let mut c = started(&fx, false);
        let mut out = Vec::new();
        let init = PtpInit::new(node(1, 2), NodeType::Level1Router, false, 576, 10);
        c.receive(&fx.ctx(), &init.encode(), &mut out);
        assert!(out.iter().any(|e| matches!(
            e,
            CircuitEvent::Rejected {
                reason: RejectReason::VersionSkew,
                ..
            }
        )));
        assert_eq!(c.state(), CircuitState::Initializing);
    }

    #[test]
    fn test_verification_required() {
        let mut fx = Fixture::new(local(Phase::Phase4, NodeType::Level1Router, node(1, 1)));
        let mut rec = NodeRecord::new(node(1, 2), "BETA");
        rec.inbound_verification = Some(b"SECRET".to_vec());
        fx.nodes.insert(rec).unwrap();

        let mut c = started(&fx, true);
        let mut out = Vec::new();
        let init = PtpInit::new(node(1, 2), NodeType::Level1Router, false, 576, 10);
        c.receive(&fx.ctx(), &init.encode(), &mut out);
        assert_eq!(c.state(), CircuitState::Verifying);
        assert!(has_up(&out).is_none());

        out.clear();
        c.receive(&fx.ctx(), &PtpVerify::new(node(1, 2), b"WRONG").encode(), &mut out);
        assert_eq!(c.state(), CircuitState::Initializing);
        assert_eq!(c.counters().verification_rejects, 1);

        out.clear();
        c.receive(&fx.ctx(), &init.encode(), &mut out);
        c.receive(&fx.ctx(), &PtpVerify::new(node(1, 2), b"SECRET").encode(), &mut out);
        assert_eq!(c.state(), CircuitState::Up);
        assert!(has_up(&out).is_some());
    }

    #[test]
    fn test_verification_timeout() {
        let fx = Fixture::new(local(Phase::Phase4, NodeType::Level1Router, node(1, 1)));
        let mut c = started(&fx, true);
        let mut out = Vec::new();
        let init = PtpInit::new(node(1, 2), NodeType::Level1Router, false, 576, 10);
        c.receive(&fx.ctx(), &init.encode(), &mut out);
        out.clear();
        let token = TimerToken::Listen {
            circuit: CircuitId::new(1),
            neighbor: node(1, 2),
        };
        c.timer(&fx.ctx(), &token, &mut out);
        assert_eq!(c.state(), CircuitState::Initializing);
        assert!(out.contains(&CircuitEvent::Rejected {
            neighbor: Some(node(1, 2)),
            reason: RejectReason::VerificationTimeout
        }));
    }

    #[test]
    fn test_neighbor_requests_verify() {
        let mut fx = Fixture::new(local(Phase::Phase4, NodeType::Level1Router, node(1, 1)));
        let mut rec = NodeRecord::new(node(1, 2), "BETA");
        rec.outbound_verification = Some(b"PW".to_vec());
        fx.nodes.insert(rec).unwrap();
        let mut c = started(&fx, false);
        let mut out = Vec::new();
        let init = PtpInit::new(node(1, 2), NodeType::Level1Router, true, 576, 10);
        c.receive(&fx.ctx(), &init.encode(), &mut out);
        let verify = PtpVerify::decode(sends(&out)[0]).unwrap();
        assert_eq!(verify.fcnval, b"PW");
    }

    #[test]
    fn test_listen_timeout_takes_circuit_down() {
        let fx = Fixture::new(local(Phase::Phase4, NodeType::Level1Router, node(1, 1)));
        let mut c = started(&fx, false);
        let mut out = Vec::new();
        let init = PtpInit::new(node(1, 2), NodeType::Level1Router, false, 576, 10);
        c.receive(&fx.ctx(), &init.encode(), &mut out);
        out.clear();
        let token = TimerToken::Listen {
            circuit: CircuitId::new(1),
            neighbor: node(1, 2),
        };
        c.timer(&fx.ctx(), &token, &mut out);
        assert!(out.contains(&CircuitEvent::AdjacencyDown {
            neighbor: node(1, 2),
            reason: DownReason::ListenerTimeout
        }));
        assert_eq!(c.state(), CircuitState::Initializing);
        assert!(c.adjacency().is_none());
        assert_eq!(c.counters().adjacency_down, 1);
    }

    #[test]
    fn test_init_while_up_restarts() {
        let fx = Fixture::new(local(Phase::Phase4, NodeType::Level1Router, node(1, 1)));
        let mut c = started(&fx, false);
        let mut out = Vec::new();
        let init = PtpInit::new(node(1, 2), NodeType::Level1Router, false, 576, 10);
        c.receive(&fx.ctx(), &init.encode(), &mut out);
        out.clear();
        c.receive(&fx.ctx(), &init.encode(), &mut out);
        let down = out
            .iter()
            .position(|e| matches!(e, CircuitEvent::AdjacencyDown { .. }))
            .unwrap();
        let up = out
            .iter()
            .position(|e| matches!(e, CircuitEvent::AdjacencyUp(_)))
            .unwrap();
        assert!(down < up);
        assert_eq!(c.state(), CircuitState::Up);
    }

    #[test]
    fn test_data_is_localized() {
        let fx = Fixture::new(local(Phase::Phase4, NodeType::Level1Router, node(4, 1)));
        let mut c = started(&fx, false);
        let mut out = Vec::new();
        let init = PtpInit3::new(NodeId::bare(9), NodeType::Endnode, false, 576);
        c.receive(&fx.ctx(), &init.encode(), &mut out);
        out.clear();

        let header = DataHeader::new(NodeId::bare(9), NodeId::bare(1), false);
        let frame = ShortData::new(header, b"abc".to_vec()).encode();
        c.receive(&fx.ctx(), &frame, &mut out);
        let data = out
            .iter()
            .find_map(|e| match e {
                CircuitEvent::Data(d) => Some(d),
                _ => None,
            })
            .unwrap();
        assert_eq!(data.header.srcnode, node(4, 9));
        assert_eq!(data.header.dstnode, node(4, 1));
        assert_eq!(data.payload, b"abc");
    }

    #[test]
    fn test_phase2_neighbor() {
        let fx = Fixture::new(local(Phase::Phase4, NodeType::Level1Router, node(1, 1)));
        let mut c = started(&fx, false);
        let mut out = Vec::new();
        let mut init = NodeInit::new(3, "tops", 576);
        init.rint = 3;
        c.receive(&fx.ctx(), &init.encode(), &mut out);

        let reply = NodeInit::decode(sends(&out)[0]).unwrap();
        assert_eq!(reply.nodename, "LOCAL");
        assert_eq!(reply.int, 7);
        let adj = has_up(&out).unwrap();
        assert_eq!(adj.neighbor, node(1, 3));
        assert_eq!(adj.name.as_deref(), Some("TOPS"));
        assert_eq!(adj.rint, 3);

        out.clear();
        c.timer(&fx.ctx(), &TimerToken::Hello(CircuitId::new(1)), &mut out);
        let nop = NopMsg::decode(sends(&out)[0]).unwrap();
        assert!(is_test_data(&nop.payload));

        out.clear();
        let nsp = [0x60, 0x78, 0x56, 0x34, 0x12];
        c.receive(&fx.ctx(), &nsp, &mut out);
        assert!(out.contains(&CircuitEvent::Phase2Frame {
            neighbor: node(1, 3),
            frame: nsp.to_vec()
        }));
    }

    #[test]
    fn test_malformed_frame_counted() {
        let fx = Fixture::new(local(Phase::Phase4, NodeType::Level1Router, node(1, 1)));
        let mut c = started(&fx, false);
        let mut out = Vec::new();
        c.receive(&fx.ctx(), &[0x01, 0x02], &mut out);
        assert!(out.is_empty());
        assert_eq!(c.counters().format_errors, 1);
        assert_eq!(c.state(), CircuitState::Initializing);
    }

    #[test]
    fn test_stop_withdraws_adjacency() {
        let fx = Fixture::new(local(Phase::Phase4, NodeType::Level1Router, node(1, 1)));
        let mut c = started(&fx, false);
        let mut out = Vec::new();
        let init = PtpInit::new(node(1, 2), NodeType::Level1Router, false, 576, 10);
        c.receive(&fx.ctx(), &init.encode(), &mut out);
        out.clear();
        c.stop(DownReason::Administrative, &mut out);
        assert_eq!(c.state(), CircuitState::Halted);
        assert!(out.contains(&CircuitEvent::AdjacencyDown {
            neighbor: node(1, 2),
            reason: DownReason::Administrative
        }));
        assert!(out.contains(&CircuitEvent::CancelTimer(TimerToken::Hello(CircuitId::new(1)))));
    }
}
