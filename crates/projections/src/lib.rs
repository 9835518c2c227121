//! Read side of the marketplace settlement backend.
//!
//! - [`Projection`] turns stored events into a read model
//! - [`ProjectionProcessor`] feeds events from the store, on demand or from a
//!   background worker
//! - [`OrderBoardView`] lists orders by buyer, vendor and agent
//! - [`NotificationFeedView`] keeps a per-recipient feed and pushes each new
//!   entry to live sessions through a [`SessionRegistry`]

pub mod error;
pub mod notification;
pub mod processor;
pub mod projection;
pub mod read_model;
pub mod session;
pub mod views;

pub use error::{ProjectionError, Result};
pub use notification::{Notification, NotificationKind};
pub use processor::{ProjectionProcessor, ProjectionWorker};
pub use projection::{Projection, ProjectionPosition};
pub use read_model::ReadModel;
pub use session::{InProcessSessions, Session, SessionId, SessionRegistry};
pub use views::{NotificationFeedView, OrderBoardView, OrderSummary};
