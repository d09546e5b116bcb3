//! `flowly-sources`: producers that feed the broadcast hub.
//!
//! | Module      | Source                                        | Emits                 |
//! |-------------|-----------------------------------------------|-----------------------|
//! | `synthetic` | timers over a fixed demo topology             | traffic + mapping     |
//! | `ingest`    | external log records (Kafka), pluggable schema | traffic (+ mapping)  |
//!
//! Producers only see the hub through [`flowly_hub::Broadcaster`].

pub mod error;
pub mod ingest;
pub mod synthetic;

pub use error::IngestError;
pub use synthetic::SyntheticGenerator;
