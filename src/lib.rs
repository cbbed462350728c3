//! Concent: a trusted third-party mediator for a decentralized compute marketplace.
//!
//! Two subsystems sit at the core of this crate:
//!
//! - **MiddleMan relay** ([`relay`], [`frame`], [`io`]) — a framed, bidirectional,
//!   multiplexing router between many front-end (Golem app) connections and the single
//!   persistent Signing Service connection. Every frame is ECDSA-signed; the relay
//!   verifies signatures on the way in and signs on the way out, and tracks in-flight
//!   requests so a response can be routed back to the front-end connection that asked
//!   for it even after that connection's own request queue has moved on.
//!
//! - **Bankster** ([`bankster`], [`arbitration`], [`store`], [`oracle`]) — the
//!   deposit-claim ledger. It decides whether a provider's or requestor's on-chain
//!   deposit can cover a claim, finalizes accepted claims into on-chain transactions via
//!   the [`oracle::ChainOracle`] it's configured with, and reconciles claims that were
//!   never finalized.
//!
//! # Modules
//!
//! - [`config`] — CLI args, JSON config file, and the keys/economic parameters Bankster
//!   and the relay need.
//! - [`telemetry`] — structured logging setup.
//! - [`sig_down`] — SIGTERM/SIGINT handling for graceful shutdown.
//! - [`timestamp`] — the Unix timestamp type used throughout the ledger.
//! - [`types`] — public keys, Ethereum addresses, and transaction hashes.
//! - [`frame`] — the wire frame codec (escape-encoding, signing, decoding).
//! - [`io`] — read-one-frame / write-one-frame over an async byte stream.
//! - [`relay`] — the MiddleMan relay's connection pool, message tracker, authentication
//!   handshake, and the four producer/consumer coroutines.
//! - [`oracle`] — the [`oracle::ChainOracle`] trait Bankster calls into for on-chain reads
//!   and writes.
//! - [`store`] — the `control` store: clients, deposit accounts, and deposit claims.
//! - [`messages`] — the minimal business-message fields Bankster needs from the signed
//!   Golem protocol messages it never itself decodes.
//! - [`bankster`] — deposit-claim admission, finalization, and overdue-acceptance
//!   settlement.
//! - [`arbitration`] — the subtask-lifecycle boundary that calls into Bankster.

pub mod arbitration;
pub mod bankster;
pub mod config;
pub mod frame;
pub mod io;
pub mod messages;
pub mod oracle;
pub mod relay;
pub mod sig_down;
pub mod store;
pub mod telemetry;
pub mod timestamp;
pub mod types;
