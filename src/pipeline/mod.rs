//! The dispatch core: hooks, the middleware chain, the route table, the
//! request context and response sink, and the dispatcher that drives them.

pub mod context;
pub mod dispatcher;
pub mod events;
pub mod hook;
pub mod middleware;
pub mod pattern;
pub mod router;
pub mod sink;

pub use context::Context;
pub use dispatcher::{Dispatcher, ErrorHandler, Stage};
pub use events::{ErrorReport, RequestEvents};
pub use hook::{Callable, Flow, Handler, HandlerResult, Hook};
pub use middleware::MiddlewareChain;
pub use pattern::Pattern;
pub use router::{RouteMatch, RouteTable};
pub use sink::Sink;
