//! Handshake message bodies.
//!
//! Messages shared by TLS 1.2 and 1.3 live here; TLS 1.2-only messages are
//! in [`crate::tls12::messages`]. Every decoder reads through
//! [`crate::codec::Reader`] and rejects trailing bytes.

pub mod certificate;
pub mod certificate_verify;
pub mod client_hello;
pub mod encrypted_extensions;
pub mod finished;
pub mod key_update;
pub mod new_session_ticket;
pub mod server_hello;

pub use certificate::{Certificate, CertificateEntry};
pub use certificate_verify::CertificateVerify;
pub use client_hello::ClientHello;
pub use encrypted_extensions::EncryptedExtensions;
pub use finished::Finished;
pub use key_update::KeyUpdate;
pub use new_session_ticket::NewSessionTicket;
pub use server_hello::{ServerHello, HELLO_RETRY_REQUEST_RANDOM};
