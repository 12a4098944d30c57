//! Dispatcher event loop.

use crate::node::{ControlRequest, Node, NodeError, WorkItem};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

impl Node {
    /// Run the dispatcher until a shutdown request arrives.
    ///
    /// Datalink events, control requests and timer wheel ticks are each
    /// turned into work items and applied one at a time. The loop never
    /// suspends while an item is being processed.
    pub async fn run(&mut self) -> Result<(), NodeError> {
        let mut events = self.event_rx.take().ok_or(NodeError::NotStarted)?;
        let Some(mut control) = self.control_rx.take() else {
            self.event_rx = Some(events);
            return Err(NodeError::NotStarted);
        };

        let mut tick = tokio::time::interval(self.timers.tick());
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(node = %self.local.id(), "Dispatcher started");

        loop {
            tokio::select! {
                Some(event) = events.recv() => {
                    self.process(WorkItem::Datalink(event));
                }
                request = control.recv() => {
                    match request {
                        Some(ControlRequest::Shutdown) => {
                            debug!("Shutdown requested");
                            break;
                        }
                        Some(request) => self.process(WorkItem::Control(request)),
                        None => break,
                    }
                }
                _ = tick.tick() => {
                    self.tick_timers();
                }
            }
        }

        self.event_rx = Some(events);
        self.control_rx = Some(control);
        info!(node = %self.local.id(), "Dispatcher stopped");
        Ok(())
    }
}
