//! # microtls
//!
//! A small, blocking TLS client for TLS 1.3 and TLS 1.2:
//! - TLS 1.3 with AES-128-GCM, AES-256-GCM and ChaCha20-Poly1305
//! - TLS 1.2 ECDHE-ECDSA and ECDHE-RSA with the same AEADs
//! - X25519, secp256r1 and secp384r1 key exchange
//! - Chain and hostname verification against caller-supplied trust anchors
//! - SNI and ALPN
//!
//! The client is generic over its [`Transport`], its cryptography
//! ([`microtls_crypto::CryptoProvider`]) and its [`Runtime`], so the same
//! code runs over `std::net` or a board's network driver.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::net::Ipv4Addr;
//! use microtls::{Client, ClientOptions, TcpTransport, Transport};
//! # fn example<C: microtls::microtls_crypto::CryptoProvider>(
//! #     crypto: &C,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//!
//! let mut transport = TcpTransport::tcp()?;
//! transport.connect(Ipv4Addr::new(192, 0, 2, 10), 8443)?;
//!
//! let options = ClientOptions::builder()
//!     .with_hostname("sensor-hub.local")
//!     .with_trust_anchor(std::fs::read("ca.der")?)
//!     .with_alpn_protocols(&[b"mqtt"])
//!     .build()?;
//!
//! let mut client: Client<'_, _, _> = Client::init(&mut transport, crypto, options)?;
//! client.connect()?;
//! client.send_all(b"hello")?;
//!
//! let mut buf = [0u8; 1024];
//! loop {
//!     match client.recv(&mut buf)? {
//!         0 => break,
//!         n => println!("{} bytes", n),
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Shared Buffers
//!
//! Many clients on a small device can share one [`BufferPool`] instead of
//! each allocating record buffers, via [`Client::init_with_pool`].

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    unused_qualifications
)]
#![forbid(unsafe_code)]

// Re-export core types
pub use microtls_core::{
    self, alert, cipher, error, protocol, ConnectionPhase, Error, ErrorKind, ProtocolVersion,
    Result, Transport, TransportError,
};

// Re-export specific types
pub use microtls_core::alert::AlertDescription;
pub use microtls_core::cipher::CipherSuite;
pub use microtls_crypto::KeyExchangeAlgorithm;

// Re-export crypto interface
pub use microtls_crypto;

// Public modules
pub mod client;
pub mod pool;
pub mod runtime;
pub mod transport;

// Re-exports
pub use client::{Client, ClientOptions, ClientOptionsBuilder};
pub use pool::BufferPool;
pub use runtime::{Runtime, RuntimeMutex, SpinRuntime, StdRuntime};
pub use transport::TcpTransport;

/// microtls version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get the microtls version.
pub fn version() -> &'static str {
    VERSION
}
