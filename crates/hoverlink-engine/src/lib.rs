pub mod capture;
pub mod config;
pub mod correlation;
pub mod dispatch;
pub mod history;
pub mod identity;
pub mod session;

pub use correlation::{DEFAULT_LINK_WINDOW_MS, ElementRequestIndex, link_request_to_interaction};
pub use dispatch::Dispatcher;
pub use hoverlink_common::protocol;
pub use identity::{DomElement, PathCursor, build_element_key, element_meta};
pub use session::{SessionError, TabSessions};
