//! Read model views.

pub mod notification_feed;
pub mod order_board;

pub use notification_feed::NotificationFeedView;
pub use order_board::{OrderBoardView, OrderSummary};
