//! Shared type definitions for the Liveframe engine.
//!
//! Everything that crosses a crate boundary or the wire lives here:
//!
//! - [`ids`] -- strongly typed connection and session identifiers.
//! - [`event`] -- the [`Event`] value routed to view handlers.
//! - [`patch`] -- [`Patch`] and [`PatchOp`], the DOM update format.
//! - [`wire`] -- [`ClientMessage`] and [`ServerMessage`] frames.
//!
//! Wire types derive [`ts_rs::TS`] so the bridge script can be checked
//! against the same definitions the server serializes.

pub mod event;
pub mod ids;
pub mod patch;
pub mod wire;

pub use event::Event;
pub use ids::{SessionId, SocketId};
pub use patch::{NodePath, Patch, PatchOp};
pub use wire::{ClientMessage, ServerMessage};
