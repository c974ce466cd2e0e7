//! Broadcast hub for telemetry fan-out
//!
//! The hub keeps the set of live subscriber channels and pushes every sample
//! into each of them. It never waits on a consumer: every channel is a bounded
//! queue that evicts its oldest sample when full.
//!
//! # Architecture
//!
//! ```text
//!                         Arc<TelemetryHub>
//!                     ┌───────────────────────────┐
//!                     │ channels: HashMap<Id,     │
//!                     │   SubscriberChannel {     │
//!                     │     queue: VecDeque,      │
//!                     │     notify,               │
//!                     │   }                       │
//!                     │ >                         │
//!                     └─────────────┬─────────────┘
//!                                   │
//!         ┌─────────────────────────┼─────────────────────────┐
//!         │                         │                         │
//!         ▼                         ▼                         ▼
//!    [Producer]              [Subscription]            [Subscription]
//!    broadcast()             recv().await              recv().await
//!         │                         │                         │
//!         └──► push (drop-oldest) ──┴──► caller's transport ──┘
//! ```
//!
//! Samples are cheap to clone (reference counted payloads), so fan-out only
//! bumps reference counts.

pub mod channel;
pub mod store;

pub use channel::{PushOutcome, SubscriberChannel};
pub use store::{SubscriberId, Subscription, TelemetryHub};
