//! Execution layer: routes an approved, sized signal to a concrete order strategy, carries it
//! through to a fill, and owns closing a position back out again.

pub mod lifecycle;
pub mod poller;
pub mod router;
pub mod twap;

pub use lifecycle::{ClosureResult, OrderLifecycle};
pub use poller::OrderStatusPoller;
pub use router::{route, RoutingDecision};
pub use twap::{ChildOrder, TwapExecutor, TwapResult};
