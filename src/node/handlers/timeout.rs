//! Timer wheel ticks and expired timer handling.

use std::time::Duration;

use crate::circuit::{CircuitCtx, TimerToken};
use crate::node::{Node, WorkItem};
use tracing::debug;

impl Node {
    /// Advance the timer wheel by `elapsed`, one tick at a time, applying
    /// each expiry as its own work item.
    pub fn advance(&mut self, elapsed: Duration) {
        let ticks = elapsed.as_nanos() / self.timers.tick().as_nanos();
        for _ in 0..ticks {
            self.tick_timers();
        }
    }

    /// Advance the wheel one tick.
    pub(in crate::node) fn tick_timers(&mut self) {
        for token in self.timers.advance() {
            self.process(WorkItem::Timer(token));
        }
    }

    pub(in crate::node) fn handle_timer(&mut self, token: TimerToken) {
        match token {
            TimerToken::RouteUpdate(id) => {
                self.send_routing_messages(id);
                if let Some(slot) = self.circuits.get(&id) {
                    let interval = self.route_interval(slot.circuit.kind());
                    self.timers.start(token, interval);
                }
            }
            TimerToken::RouteHoldoff => self.send_all_routing_messages(),
            TimerToken::Relay(key) => {
                if self.relays.remove(&key).is_some() {
                    debug!(neighbor = %key.neighbor, link = key.link, "Intercept relay expired");
                }
            }
            _ => {
                let Some(id) = token.circuit() else {
                    return;
                };
                let Some(slot) = self.circuits.get_mut(&id) else {
                    return;
                };
                let ctx = CircuitCtx {
                    local: &self.local,
                    nodes: &self.nodes,
                    intercept: self.intercept,
                };
                let mut out = Vec::new();
                slot.circuit.timer(&ctx, &token, &mut out);
                self.apply(id, out);
            }
        }
    }
}
