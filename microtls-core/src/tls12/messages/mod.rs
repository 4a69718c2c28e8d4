//! TLS 1.2 Handshake Messages
//!
//! Messages that only exist in TLS 1.2 ECDHE handshakes:
//! - ServerKeyExchange: server's ephemeral ECDHE public key + signature
//! - ClientKeyExchange: client's ephemeral ECDHE public key
//! - ServerHelloDone: empty message ending the server's first flight
//! - Tls12Certificate: TLS 1.2 Certificate format (no context, no extensions)

pub mod certificate;
pub mod client_key_exchange;
pub mod server_hello_done;
pub mod server_key_exchange;

pub use certificate::Tls12Certificate;
pub use client_key_exchange::ClientKeyExchange;
pub use server_hello_done::ServerHelloDone;
pub use server_key_exchange::ServerKeyExchange;
