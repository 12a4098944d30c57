//! Dispatcher loop and work item handlers.

mod control;
mod dispatch;
mod forwarding;
mod intercept;
mod routing;
mod rx_loop;
mod timeout;
