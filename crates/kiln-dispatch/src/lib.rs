//! Kiln Dispatch
//!
//! Splitting experiment work across workers:
//! - Static distribution over a fixed, named [`UserPool`]
//! - Ticket-based distribution over a [`DynamicPool`] shared through the filesystem
//! - A file-backed [`SequenceDistributor`] cursor
//! - An HTTP ticket service ([`TicketServer`]) and its [`SequenceClient`]
//!
//! ```
//! use kiln_dispatch::{DistributeOptions, distribute};
//!
//! let split = distribute(&["a", "b", "c"], 0..10, DistributeOptions::default()).unwrap();
//! assert_eq!(split["a"], vec![0, 1, 2, 3]);
//! assert_eq!(split["c"], vec![7, 8, 9]);
//! ```

pub mod client;
pub mod distribute;
pub mod error;
pub mod sequence;
pub mod server;
pub mod tickets;
pub mod toggle;
pub mod user_pool;

pub use client::{ClientConfig, PollOptions, SequenceClient};
pub use distribute::{Assignment, DistributeOptions, distribute};
pub use error::{DispatchError, DispatchResult};
pub use sequence::{SequenceCursor, SequenceDistributor};
pub use server::{CaseLedger, CompleteAck, Health, LEDGER_FILE, Ledger, ServerConfig, TicketServer, URL_FILE};
pub use tickets::{DynamicPool, DynamicPoolOptions, TicketPool};
pub use toggle::{Toggle, ToggleGuard};
pub use user_pool::{UserPool, UserPoolConfig, UserPoolFormat, UserPoolKeys};
