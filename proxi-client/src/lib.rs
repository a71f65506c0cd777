//! Proxi Client - the User side of the proximity game
//!
//! Scans for the Company beacon, connects, streams the observed signal
//! strength and keeps a persisted point balance from the verdicts it gets
//! back.
//!
//! The pieces, from the inside out:
//! - `PointLedger`, `ConnectionSession`, `RecentPeerCache`: owned state
//! - `ProximityClient`: the state machine, driven by `ClientEvent`s and
//!   answering with `Action`s
//! - `Client`: async runner that executes actions against a `Central`
//!   transport and feeds its events back in

mod cache;
mod central;
mod client;
mod config;
mod error;
mod ledger;
mod machine;
mod session;

pub use cache::{RECENT_PEER_CAPACITY, RecentPeerCache};
pub use central::{Candidate, Central, event_channel};
pub use client::Client;
pub use config::{ClientConfig, proxi_home};
pub use error::{StoreError, TransportError};
pub use ledger::{LedgerStore, PointLedger};
pub use machine::{Action, ClientEvent, ClientState, ProximityClient};
pub use session::ConnectionSession;

pub use proxi_proto::{ProximityZone, SignalSample, Verdict, VerdictPacket};
