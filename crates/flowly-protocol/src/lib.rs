//! `flowly-protocol`: the frames broadcast to viewers.
//!
//! Every frame is one JSON document carrying a `type` discriminant:
//!
//! | `type`      | Payload field | Meaning                                    |
//! |-------------|---------------|--------------------------------------------|
//! | `"traffic"` | `pings`       | Edges observed since the previous sample   |
//! | `"mapping"` | `mapping`     | Node id → display alias, self-contained    |
//!
//! [`Address`] is the compact `"ip:port"` token used by the external log
//! schemas; it lives here so ingestion and tests share one codec.

pub mod address;
pub mod error;
pub mod message;

pub use address::{ip_node_id, Address};
pub use error::{AddressError, ProtocolError};
pub use message::{Edge, Message, TYPE_MAPPING, TYPE_TRAFFIC};
