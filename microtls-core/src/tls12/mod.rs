//! TLS 1.2 client support.
//!
//! TLS 1.2 is kept for servers that do not speak TLS 1.3 yet (RFC 8996
//! deprecates it). Only ECDHE key exchange with AEAD suites is offered.
//!
//! ```text
//! tls12/
//! ├── client.rs    - client handshake state machine
//! ├── messages/    - Certificate, ServerKeyExchange, ServerHelloDone, ClientKeyExchange
//! ├── prf.rs       - PRF, master secret, key block and Finished verify_data
//! └── record.rs    - AEAD record protection with explicit nonces
//! ```
//!
//! Not supported: CBC suites, RC4, static RSA key exchange, compression,
//! renegotiation and session resumption.

pub mod client;
pub mod messages;
pub mod prf;
pub mod record;

pub use client::{Tls12ClientHandshake, Tls12ClientState};
pub use prf::{
    compute_extended_master_secret, compute_key_block, compute_master_secret, compute_verify_data,
    KeyBlock, Tls12Prf,
};
pub use record::Tls12RecordProtection;
