//! Webex integration - webhook-driven broadcast agent
//!
//! This crate connects the relay engine to the Webex platform:
//! - **Platform** (`platform`) - collaborator traits the engine consumes
//! - **Client** (`client`) - REST implementation of those traits
//! - **Broadcast** (`broadcast`, `enumerate`, `dispatch`) - message fan-out pipeline
//! - **Membership** (`membership`) - executes membership state machine actions
//! - **Events** (`events`, `engine`) - webhook parsing and routing
//! - **Webhooks** (`webhooks`) - webhook subscription management
//!
//! # Architecture
//!
//! ```text
//! Webhook → RelayEngine → EventDispatcher → BroadcastService  → Dispatcher → Webex
//!                                         → MembershipService → Webex
//! ```
//!
//! # Key Types
//!
//! - `WebexClient` - reqwest-backed platform adapter
//! - `InMemoryPlatform` - recording fake used by tests and dry runs
//! - `RelayEngine` - entry points for the HTTP transport

pub mod broadcast;
pub mod client;
pub mod dispatch;
pub mod engine;
pub mod enumerate;
pub mod events;
pub mod markup;
pub mod membership;
pub mod memory;
pub mod platform;
pub mod settings;
pub mod webhooks;

pub use client::WebexClient;
pub use engine::RelayEngine;
pub use memory::InMemoryPlatform;
pub use platform::{ChatPlatform, PlatformError};
pub use settings::RelaySettings;
