//! Broadcast (LAN) circuit state machine.
//!
//! Routers keep one adjacency per neighbor heard on the LAN. Router
//! neighbors come up once they list us in their router hello; endnode
//! neighbors come up on their first hello. Among the router adjacencies
//! that are up (plus this router) the highest (priority, address) is the
//! designated router.
//!
//! An endnode keeps a single router adjacency, the designated router it
//! advertises in its own hellos, and a cache of stations that recently
//! sent it traffic directly.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::{
    format_error, Adjacency, AdjacencyState, CircuitCounters, CircuitCtx, CircuitEvent,
    CircuitParams, CircuitState, DownReason, InboundData, RejectReason, RoutingLevel, TimerToken,
    BCT3_MULT, DR_DELAY, HELLO_TEST_LEN, PREV_HOP_LIFETIME, T2,
};
use crate::compat::localize_header;
use crate::identity::{MacAddr, NodeId, NodeType, Phase, Version};
use crate::protocol::{
    self, classify_lan, is_test_data, strip_padding, DataHeader, EndnodeHello, Packet,
    RouteEntry, RouterHello, RsEntry, TEST_DATA_BYTE,
};

/// LAN circuit.
#[derive(Debug)]
pub struct LanCircuit {
    params: CircuitParams,
    state: CircuitState,
    /// Local node address, recorded at start.
    local_id: NodeId,
    /// Local node routes.
    router: bool,
    adjacencies: BTreeMap<NodeId, Adjacency>,
    /// Designated router currently in effect.
    dr: Option<NodeId>,
    /// This router won the election and waits out the DR delay.
    dr_pending: bool,
    /// A hello went out less than T2 ago.
    holdoff: bool,
    /// Hello content changed during the holdoff.
    hello_pending: bool,
    /// Endnode: station each recently heard source sent from.
    prev_hop: HashMap<NodeId, MacAddr>,
    counters: CircuitCounters,
}

impl LanCircuit {
    pub fn new(params: CircuitParams) -> Self {
        Self {
            params,
            state: CircuitState::Halted,
            local_id: NodeId::default(),
            router: false,
            adjacencies: BTreeMap::new(),
            dr: None,
            dr_pending: false,
            holdoff: false,
            hello_pending: false,
            prev_hop: HashMap::new(),
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

    pub fn adjacency(&self, neighbor: NodeId) -> Option<&Adjacency> {
        self.adjacencies.get(&neighbor)
    }

    pub fn adjacencies(&self) -> impl Iterator<Item = &Adjacency> {
        self.adjacencies.values()
    }

    pub fn designated_router(&self) -> Option<NodeId> {
        self.dr
    }

    /// True if this router is the designated router.
    pub fn is_dr(&self) -> bool {
        self.router && self.dr == Some(self.local_id)
    }

    /// Station to send a packet for `dst` to when routing via `neighbor`.
    pub fn next_station(&self, dst: NodeId, neighbor: NodeId) -> MacAddr {
        if !self.router {
            if let Some(station) = self.prev_hop.get(&dst) {
                return *station;
            }
        }
        self.adjacencies
            .get(&neighbor)
            .and_then(|a| a.station)
            .unwrap_or_else(|| MacAddr::from_node(neighbor))
    }

    fn listen_token(&self, neighbor: NodeId) -> TimerToken {
        TimerToken::Listen {
            circuit: self.params.id,
            neighbor,
        }
    }

    // ========================================================================
    // Administrative Transitions
    // ========================================================================

    pub fn start(&mut self, ctx: &CircuitCtx<'_>, out: &mut Vec<CircuitEvent>) {
        if self.state != CircuitState::Halted {
            return;
        }
        self.local_id = ctx.local.id();
        self.router = ctx.local.is_router();
        self.state = CircuitState::Up;
        info!(
            circuit = %self.params.name,
            router = self.router,
            priority = self.params.priority,
            "LAN circuit up"
        );
        self.send_hello(ctx, out);
        if self.router {
            self.elect(out);
        }
    }

    pub fn stop(&mut self, reason: DownReason, out: &mut Vec<CircuitEvent>) {
        if self.state == CircuitState::Halted {
            return;
        }
        let neighbors: Vec<NodeId> = self.adjacencies.keys().copied().collect();
        for neighbor in neighbors {
            self.remove(neighbor, reason, out);
        }
        for node in self.prev_hop.drain().map(|(n, _)| n) {
            out.push(CircuitEvent::CancelTimer(TimerToken::PrevHop {
                circuit: self.params.id,
                node,
            }));
        }
        let id = self.params.id;
        out.push(CircuitEvent::CancelTimer(TimerToken::Hello(id)));
        out.push(CircuitEvent::CancelTimer(TimerToken::HelloHoldoff(id)));
        out.push(CircuitEvent::CancelTimer(TimerToken::DrDelay(id)));
        if self.dr.take().is_some() {
            out.push(CircuitEvent::DrChanged(None));
        }
        self.dr_pending = false;
        self.holdoff = false;
        self.hello_pending = false;
        self.state = CircuitState::Halted;
        info!(circuit = %self.params.name, reason = %reason, "LAN circuit halted");
    }

    /// Drop one adjacency, announcing it if it was up.
    fn remove(&mut self, neighbor: NodeId, reason: DownReason, out: &mut Vec<CircuitEvent>) -> Option<Adjacency> {
        let adj = self.adjacencies.remove(&neighbor)?;
        out.push(CircuitEvent::CancelTimer(self.listen_token(neighbor)));
        if adj.is_up() {
            self.counters.adjacency_down += 1;
            warn!(
                circuit = %self.params.name,
                neighbor = %neighbor,
                reason = %reason,
                "Adjacency down"
            );
            out.push(CircuitEvent::AdjacencyDown { neighbor, reason });
        }
        Some(adj)
    }

    fn reject(&mut self, neighbor: NodeId, reason: RejectReason, out: &mut Vec<CircuitEvent>) {
        self.counters.record_reject(reason);
        warn!(
            circuit = %self.params.name,
            neighbor = %neighbor,
            reason = %reason,
            "Adjacency rejected"
        );
        out.push(CircuitEvent::Rejected {
            neighbor: Some(neighbor),
            reason,
        });
    }

    // ========================================================================
    // Hellos
    // ========================================================================

    fn router_hello(&self, ctx: &CircuitCtx<'_>) -> RouterHello {
        let rslist = self
            .adjacencies
            .values()
            .filter(|a| a.is_router())
            .take(RouterHello::MAX_ROUTERS)
            .map(|a| RsEntry {
                router: a.neighbor,
                priority: a.priority,
                twoway: a.is_up(),
            })
            .collect();
        RouterHello {
            tiver: Version::PHASE4,
            id: ctx.local.id(),
            ntype: ctx.local.node_type(),
            blksize: self.params.blksize,
            priority: self.params.priority,
            timer: self.params.t3_secs(),
            rslist,
        }
    }

    fn endnode_hello(&self, ctx: &CircuitCtx<'_>) -> EndnodeHello {
        let neighbor = self
            .dr
            .and_then(|dr| self.adjacencies.get(&dr))
            .and_then(|a| a.station)
            .unwrap_or(MacAddr::NULL);
        EndnodeHello {
            tiver: Version::PHASE4,
            id: ctx.local.id(),
            ntype: NodeType::Endnode,
            blksize: self.params.blksize,
            neighbor,
            timer: self.params.t3_secs(),
            testdata: vec![TEST_DATA_BYTE; HELLO_TEST_LEN],
        }
    }

    fn send_hello(&mut self, ctx: &CircuitCtx<'_>, out: &mut Vec<CircuitEvent>) {
        if self.router {
            let data = self.router_hello(ctx).encode();
            if self.is_dr() {
                out.push(CircuitEvent::Send {
                    dst: Some(MacAddr::ALL_ENDNODES),
                    data: data.clone(),
                });
            }
            out.push(CircuitEvent::Send {
                dst: Some(MacAddr::ALL_ROUTERS),
                data,
            });
        } else {
            out.push(CircuitEvent::Send {
                dst: Some(MacAddr::ALL_ROUTERS),
                data: self.endnode_hello(ctx).encode(),
            });
        }
        let id = self.params.id;
        self.holdoff = true;
        self.hello_pending = false;
        out.push(CircuitEvent::StartTimer(TimerToken::HelloHoldoff(id), T2));
        out.push(CircuitEvent::StartTimer(TimerToken::Hello(id), self.params.t3));
    }

    /// Hello content changed: send now, or at the end of the holdoff.
    fn hello_changed(&mut self, ctx: &CircuitCtx<'_>, out: &mut Vec<CircuitEvent>) {
        if self.holdoff {
            self.hello_pending = true;
        } else {
            self.send_hello(ctx, out);
        }
    }

    // ========================================================================
    // Designated Router
    // ========================================================================

    /// Highest (priority, address) among the up routers of our area and
    /// this router.
    fn winner(&self) -> NodeId {
        let area = self.local_id.area();
        self.adjacencies
            .values()
            .filter(|a| a.is_up() && a.is_router() && a.neighbor.area() == area)
            .map(|a| a.rank())
            .chain(std::iter::once((self.params.priority, self.local_id)))
            .max()
            .map_or(self.local_id, |(_, id)| id)
    }

    /// Run the election and apply its result.
    fn elect(&mut self, out: &mut Vec<CircuitEvent>) {
        let winner = self.winner();
        if winner == self.local_id {
            if self.dr == Some(self.local_id) {
                return;
            }
            if self.dr.is_some() {
                self.set_dr(None, out);
            }
            if !self.dr_pending {
                self.dr_pending = true;
                out.push(CircuitEvent::StartTimer(
                    TimerToken::DrDelay(self.params.id),
                    DR_DELAY,
                ));
            }
            return;
        }
        if self.dr_pending {
            self.dr_pending = false;
            out.push(CircuitEvent::CancelTimer(TimerToken::DrDelay(self.params.id)));
        }
        if self.dr != Some(winner) {
            self.set_dr(Some(winner), out);
        }
    }

    fn set_dr(&mut self, dr: Option<NodeId>, out: &mut Vec<CircuitEvent>) {
        info!(
            circuit = %self.params.name,
            old = ?self.dr,
            new = ?dr,
            "Designated router change"
        );
        self.dr = dr;
        out.push(CircuitEvent::DrChanged(dr));
    }

    // ========================================================================
    // Reception
    // ========================================================================

    pub fn receive(
        &mut self,
        ctx: &CircuitCtx<'_>,
        src: Option<MacAddr>,
        data: &[u8],
        out: &mut Vec<CircuitEvent>,
    ) {
        if self.state == CircuitState::Halted {
            return;
        }
        self.counters.frames_received += 1;

        let packet = strip_padding(data, true).and_then(|buf| {
            let kind = classify_lan(buf)?;
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
            Packet::RouterHello(hello) => {
                if self.router {
                    self.on_router_hello(ctx, src, hello, out);
                } else {
                    self.on_router_hello_endnode(ctx, src, hello, out);
                }
            }
            Packet::EndnodeHello(hello) => {
                if self.router {
                    self.on_endnode_hello(ctx, src, hello, out);
                }
            }
            Packet::L1Routing(msg) => {
                let entries = msg.entries().collect();
                self.on_routing(ctx, msg.srcnode, RoutingLevel::Level1, entries, out);
            }
            Packet::L2Routing(msg) => {
                let entries = msg.entries().collect();
                self.on_routing(ctx, msg.srcnode, RoutingLevel::Level2, entries, out);
            }
            Packet::LongData(d) => self.on_data(ctx, src, d.header, d.ie, d.payload, out),
            Packet::ShortData(d) => self.on_data(ctx, src, d.header, false, d.payload, out),
            other => {
                debug!(circuit = %self.params.name, kind = %other.kind(), "Unexpected packet");
            }
        }
    }

    /// Common checks on a hello's sender. False means ignore the hello.
    fn check_sender(
        &mut self,
        ctx: &CircuitCtx<'_>,
        tiver: Version,
        id: NodeId,
        out: &mut Vec<CircuitEvent>,
    ) -> bool {
        if tiver.phase() != Some(Phase::Phase4) {
            debug!(circuit = %self.params.name, neighbor = %id, tiver = %tiver, "Hello version skew");
            return false;
        }
        if id == self.local_id {
            return false;
        }
        let limits = ctx.local.limits();
        if id.area() == 0 || id.area() > limits.maxarea || id.node() == 0 || id.node() > limits.maxnodes {
            self.reject(id, RejectReason::AddressOutOfRange, out);
            return false;
        }
        true
    }

    fn on_router_hello(
        &mut self,
        ctx: &CircuitCtx<'_>,
        src: Option<MacAddr>,
        hello: RouterHello,
        out: &mut Vec<CircuitEvent>,
    ) {
        let id = hello.id;
        if !self.check_sender(ctx, hello.tiver, id, out) {
            return;
        }
        if !hello.ntype.is_router() {
            self.reject(id, RejectReason::BadNodeType, out);
            return;
        }
        let both_l2 = ctx.local.is_area_router() && hello.ntype == NodeType::Level2Router;
        if id.area() != self.local_id.area() && !both_l2 {
            debug!(circuit = %self.params.name, neighbor = %id, "Router hello from other area ignored");
            return;
        }

        let mut changed = false;
        let moved = self
            .adjacencies
            .get(&id)
            .is_some_and(|a| a.node_type != hello.ntype || a.priority != hello.priority);
        if moved {
            self.remove(id, DownReason::AddressChange, out);
            changed = true;
        }

        if !self.adjacencies.contains_key(&id) {
            if !self.make_room(hello.priority, id, out) {
                return;
            }
            let mut adj = Adjacency::new(self.params.id, id, hello.ntype, Phase::Phase4, hello.blksize);
            adj.priority = hello.priority;
            debug!(circuit = %self.params.name, neighbor = %id, priority = hello.priority, "New router adjacency");
            self.adjacencies.insert(id, adj);
            changed = true;
        }

        let listed = hello.rslist.iter().find(|e| e.router == self.local_id);
        if let Some(entry) = listed {
            if entry.priority != self.params.priority {
                debug!(
                    circuit = %self.params.name,
                    neighbor = %id,
                    listed = entry.priority,
                    "Router hello lists us with wrong priority"
                );
                self.remove(id, DownReason::DataError, out);
                self.elect(out);
                self.hello_changed(ctx, out);
                return;
            }
        }

        let listen = self.hello_interval(hello.timer) * BCT3_MULT;
        let token = self.listen_token(id);
        let Some(adj) = self.adjacencies.get_mut(&id) else {
            return;
        };
        adj.blksize = hello.blksize.min(self.params.blksize);
        adj.hello_timer = listen / BCT3_MULT;
        adj.station = Some(src.unwrap_or_else(|| MacAddr::from_node(id)));
        out.push(CircuitEvent::StartTimer(token, listen));

        match (adj.state, listed.is_some()) {
            (AdjacencyState::Initializing, true) => {
                adj.state = AdjacencyState::Up;
                info!(circuit = %self.params.name, neighbor = %id, node_type = %adj.node_type, "Adjacency up");
                out.push(CircuitEvent::AdjacencyUp(adj.clone()));
                changed = true;
            }
            (AdjacencyState::Up, false) => {
                adj.state = AdjacencyState::Initializing;
                self.counters.adjacency_down += 1;
                warn!(circuit = %self.params.name, neighbor = %id, reason = %DownReason::Dropped, "Adjacency down");
                out.push(CircuitEvent::AdjacencyDown {
                    neighbor: id,
                    reason: DownReason::Dropped,
                });
                changed = true;
            }
            _ => {}
        }

        if changed {
            self.elect(out);
            self.hello_changed(ctx, out);
        }
    }

    /// Enforce the router limit before adding a router of `rank`.
    /// Returns false if the newcomer is the one refused.
    fn make_room(&mut self, priority: u8, id: NodeId, out: &mut Vec<CircuitEvent>) -> bool {
        let routers = self.adjacencies.values().filter(|a| a.is_router()).count();
        if routers < self.params.nr as usize {
            return true;
        }
        let lowest = self
            .adjacencies
            .values()
            .filter(|a| a.is_router())
            .map(|a| a.rank())
            .min();
        match lowest {
            Some(rank) if rank < (priority, id) => {
                let victim = rank.1;
                self.remove(victim, DownReason::Dropped, out);
                self.reject(victim, RejectReason::TooManyRouters, out);
                true
            }
            _ => {
                self.reject(id, RejectReason::TooManyRouters, out);
                false
            }
        }
    }

    fn on_endnode_hello(
        &mut self,
        ctx: &CircuitCtx<'_>,
        src: Option<MacAddr>,
        hello: EndnodeHello,
        out: &mut Vec<CircuitEvent>,
    ) {
        let id = hello.id;
        if !is_test_data(&hello.testdata) {
            self.counters.format_errors += 1;
            debug!(circuit = %self.params.name, neighbor = %id, "Endnode hello with invalid test data");
            return;
        }
        if !self.check_sender(ctx, hello.tiver, id, out) {
            return;
        }
        if hello.ntype != NodeType::Endnode {
            self.reject(id, RejectReason::BadNodeType, out);
            return;
        }
        if id.area() != self.local_id.area() {
            debug!(circuit = %self.params.name, neighbor = %id, "Endnode hello from other area ignored");
            return;
        }
        if self
            .adjacencies
            .get(&id)
            .is_some_and(|a| a.node_type != NodeType::Endnode)
        {
            self.remove(id, DownReason::AddressChange, out);
            self.elect(out);
            self.hello_changed(ctx, out);
        }

        let listen = self.hello_interval(hello.timer) * BCT3_MULT;
        let token = self.listen_token(id);
        let station = src.unwrap_or_else(|| MacAddr::from_node(id));
        let blksize = hello.blksize.min(self.params.blksize);
        match self.adjacencies.get_mut(&id) {
            Some(adj) => {
                adj.blksize = blksize;
                adj.hello_timer = listen / BCT3_MULT;
                adj.station = Some(station);
            }
            None => {
                let mut adj = Adjacency::new(self.params.id, id, NodeType::Endnode, Phase::Phase4, blksize);
                adj.state = AdjacencyState::Up;
                adj.hello_timer = listen / BCT3_MULT;
                adj.station = Some(station);
                info!(circuit = %self.params.name, neighbor = %id, node_type = %adj.node_type, "Adjacency up");
                out.push(CircuitEvent::AdjacencyUp(adj.clone()));
                self.adjacencies.insert(id, adj);
            }
        }
        out.push(CircuitEvent::StartTimer(token, listen));
    }

    /// Endnode: track the designated router.
    fn on_router_hello_endnode(
        &mut self,
        ctx: &CircuitCtx<'_>,
        src: Option<MacAddr>,
        hello: RouterHello,
        out: &mut Vec<CircuitEvent>,
    ) {
        let id = hello.id;
        if !self.check_sender(ctx, hello.tiver, id, out) {
            return;
        }
        if !hello.ntype.is_router() {
            self.reject(id, RejectReason::BadNodeType, out);
            return;
        }
        if id.area() != self.local_id.area() {
            return;
        }

        // only the designated router sends to all-endnodes; whoever did
        // last replaces the previous one
        if let Some(old) = self.dr.filter(|&old| old != id) {
            self.remove(old, DownReason::AddressChange, out);
            self.dr = None;
        }

        let listen = self.hello_interval(hello.timer) * BCT3_MULT;
        let token = self.listen_token(id);
        let station = src.unwrap_or_else(|| MacAddr::from_node(id));
        let blksize = hello.blksize.min(self.params.blksize);
        match self.adjacencies.get_mut(&id) {
            Some(adj) => {
                adj.priority = hello.priority;
                adj.blksize = blksize;
                adj.hello_timer = listen / BCT3_MULT;
                adj.station = Some(station);
            }
            None => {
                let mut adj = Adjacency::new(self.params.id, id, hello.ntype, Phase::Phase4, blksize);
                adj.state = AdjacencyState::Up;
                adj.priority = hello.priority;
                adj.hello_timer = listen / BCT3_MULT;
                adj.station = Some(station);
                info!(circuit = %self.params.name, neighbor = %id, "Adjacency up");
                out.push(CircuitEvent::AdjacencyUp(adj.clone()));
                self.adjacencies.insert(id, adj);
                self.set_dr(Some(id), out);
                self.hello_changed(ctx, out);
            }
        }
        out.push(CircuitEvent::StartTimer(token, listen));
    }

    fn hello_interval(&self, timer: u16) -> Duration {
        if timer == 0 {
            self.params.t3
        } else {
            Duration::from_secs(timer as u64)
        }
    }

    fn on_routing(
        &mut self,
        ctx: &CircuitCtx<'_>,
        srcnode: NodeId,
        level: RoutingLevel,
        entries: Vec<(u16, RouteEntry)>,
        out: &mut Vec<CircuitEvent>,
    ) {
        if !self.router {
            return;
        }
        let Some(adj) = self.adjacencies.get(&srcnode).filter(|a| a.is_up() && a.is_router()) else {
            debug!(circuit = %self.params.name, neighbor = %srcnode, "Routing message from non-adjacent node");
            return;
        };
        let wanted = match level {
            RoutingLevel::Level1 => adj.neighbor.area() == self.local_id.area(),
            RoutingLevel::Level2 => {
                ctx.local.is_area_router() && adj.node_type == NodeType::Level2Router
            }
        };
        if wanted {
            out.push(CircuitEvent::Routing {
                neighbor: srcnode,
                level,
                entries,
            });
        }
    }

    fn on_data(
        &mut self,
        ctx: &CircuitCtx<'_>,
        src: Option<MacAddr>,
        header: DataHeader,
        ie: bool,
        payload: Vec<u8>,
        out: &mut Vec<CircuitEvent>,
    ) {
        let header = localize_header(ctx.local, Phase::Phase4, header);
        let neighbor = if self.router {
            let Some(adj) = self
                .adjacencies
                .values()
                .find(|a| a.is_up() && src.is_some() && a.station == src)
            else {
                debug!(circuit = %self.params.name, station = ?src, "Data from non-adjacent station");
                return;
            };
            adj.neighbor
        } else {
            if header.dstnode != self.local_id {
                return;
            }
            if let (true, Some(station)) = (ie, src) {
                self.prev_hop.insert(header.srcnode, station);
                out.push(CircuitEvent::StartTimer(
                    TimerToken::PrevHop {
                        circuit: self.params.id,
                        node: header.srcnode,
                    },
                    PREV_HOP_LIFETIME,
                ));
            }
            src.and_then(|s| s.node_id()).unwrap_or(header.srcnode)
        };
        out.push(CircuitEvent::Data(InboundData {
            neighbor,
            station: src,
            header,
            ie,
            payload,
        }));
    }

    // ========================================================================
    // Timers
    // ========================================================================

    pub fn timer(&mut self, ctx: &CircuitCtx<'_>, token: &TimerToken, out: &mut Vec<CircuitEvent>) {
        if self.state == CircuitState::Halted {
            return;
        }
        match *token {
            TimerToken::Hello(_) => self.send_hello(ctx, out),
            TimerToken::HelloHoldoff(_) => {
                self.holdoff = false;
                if self.hello_pending {
                    self.send_hello(ctx, out);
                }
            }
            TimerToken::Listen { neighbor, .. } => {
                if self.remove(neighbor, DownReason::ListenerTimeout, out).is_none() {
                    return;
                }
                if self.router {
                    self.elect(out);
                } else if self.dr == Some(neighbor) {
                    self.set_dr(None, out);
                }
                self.hello_changed(ctx, out);
            }
            TimerToken::DrDelay(_) => {
                if !self.dr_pending {
                    return;
                }
                self.dr_pending = false;
                if self.winner() == self.local_id {
                    self.set_dr(Some(self.local_id), out);
                    self.send_hello(ctx, out);
                } else {
                    self.elect(out);
                }
            }
            TimerToken::PrevHop { node, .. } => {
                self.prev_hop.remove(&node);
            }
            _ => {}
        }
    }
}
