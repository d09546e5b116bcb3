//! `flowly-hub`: fan-out of broadcast frames to live viewer connections.
//!
//! # Overview
//!
//! A single [`Hub`] task owns the set of registered connections. Everything
//! else talks to it through a cloneable [`HubHandle`]: viewers register and
//! unregister, producers submit frames. Each connection has its own bounded
//! queue drained by a write pump; the hub only ever `try_send`s into it, and
//! a viewer whose queue is full is evicted instead of slowing the others.
//!
//! | Piece               | Runs in                     | Owns                      |
//! |---------------------|-----------------------------|---------------------------|
//! | [`Hub::run`]        | one task per process        | the connection set        |
//! | [`connection::write_pump`] | one task per viewer  | the queue receiver + sink |
//! | [`connection::read_pump`]  | the viewer's handler | the transport stream      |

use std::sync::Arc;

pub mod broadcaster;
pub mod connection;
pub mod error;
pub mod hub;

pub use broadcaster::Broadcaster;
pub use connection::{Connection, ConnectionId};
pub use error::{HubError, Result};
pub use hub::{Hub, HubHandle, HubStats};

/// One complete encoded message, shared by every queue it is enqueued on.
pub type Frame = Arc<str>;
