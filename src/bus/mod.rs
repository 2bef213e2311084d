//! Deferred-Operation Bus
//!
//! Topic-keyed publish/subscribe over TCP for returns and renewals. The router
//! of each site publishes; one worker per topic subscribes.
//!
//! ## Wire format
//! - Subscriber -> publisher: `SUBSCRIBE <TOPIC>` lines right after connecting.
//! - Publisher -> subscriber: `<TOPIC> <WorkerIntent JSON>` lines.
//!
//! Delivery is best-effort and at-most-once. A frame published while no
//! subscriber is connected, or while a subscriber's queue is full, is lost.
//! Order is kept per connection only.

pub mod publisher;
pub mod subscriber;
pub mod types;

pub use publisher::BusPublisher;
pub use subscriber::BusSubscriber;
pub use types::{Frame, FrameError, Topic};
