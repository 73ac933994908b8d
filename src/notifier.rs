//! Change Notifier
//!
//! Periodically pushes fleet state to live subscribers, per [`Channel`].
//!
//! - [`SubscriberRegistry`]: concurrent set of live connections
//! - [`ChangeNotifier`]: read, encode once per channel, fan out
//! - [`BroadcastMessage`]: the JSON envelope

mod broadcaster;
mod payload;
mod registry;

pub use broadcaster::{ChangeNotifier, NotifierError};
pub use payload::{BroadcastMessage, Channel, RECENT_ALERTS_LIMIT};
pub use registry::{
    BroadcastReport, ChannelSubscriber, Subscriber, SubscriberError, SubscriberId,
    SubscriberRegistry,
};
