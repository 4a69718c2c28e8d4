//! TLS client options and the blocking client.

use core::fmt;

use microtls_core::cipher::CipherSuite;
use microtls_core::{Config, ConfigBuilder, Connection, ConnectionPhase, Error, Result};
use microtls_core::{ProtocolVersion, Transport};
use microtls_crypto::{CryptoProvider, KeyExchangeAlgorithm};

use crate::pool::BufferPool;
use crate::runtime::{Runtime, StdRuntime};

/// Options for a [`Client`].
///
/// Built with [`ClientOptions::builder`]. Both verification steps are on by
/// default, so a trust anchor and a hostname are required unless turned off.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    config: Config,
}

impl ClientOptions {
    /// Create a new options builder.
    pub fn builder() -> ClientOptionsBuilder {
        ClientOptionsBuilder::default()
    }

    /// The validated engine configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }
}

/// Builder for [`ClientOptions`].
#[derive(Debug, Clone, Default)]
pub struct ClientOptionsBuilder {
    config: ConfigBuilder,
}

impl ClientOptionsBuilder {
    /// Server name sent in SNI and checked against the certificate.
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.config = self.config.with_hostname(hostname);
        self
    }

    /// Enable or disable certificate chain verification.
    pub fn with_verify_certificate_chain(mut self, verify: bool) -> Self {
        self.config = self.config.with_verify_certificate_chain(verify);
        self
    }

    /// Enable or disable hostname verification.
    pub fn with_verify_hostname(mut self, verify: bool) -> Self {
        self.config = self.config.with_verify_hostname(verify);
        self
    }

    /// Skip both chain and hostname verification.
    #[deprecated(note = "use with_verify_certificate_chain and with_verify_hostname")]
    pub fn with_skip_verify(mut self, skip: bool) -> Self {
        self.config = self
            .config
            .with_verify_certificate_chain(!skip)
            .with_verify_hostname(!skip);
        self
    }

    /// Transport send/receive timeout.
    pub fn with_timeout_ms(mut self, timeout_ms: u32) -> Self {
        self.config = self.config.with_timeout_ms(timeout_ms);
        self
    }

    /// Add a DER trust anchor.
    pub fn with_trust_anchor(mut self, der: impl Into<Vec<u8>>) -> Self {
        self.config = self.config.with_trust_anchor(der);
        self
    }

    /// ALPN protocols to offer, in preference order.
    pub fn with_alpn_protocols(mut self, protocols: &[&[u8]]) -> Self {
        self.config = self.config.with_alpn_protocols(protocols);
        self
    }

    /// Cipher suites to offer, in preference order.
    pub fn with_cipher_suites(mut self, suites: &[CipherSuite]) -> Self {
        self.config = self.config.with_cipher_suites(suites);
        self
    }

    /// Key exchange groups to offer, in preference order.
    pub fn with_groups(mut self, groups: &[KeyExchangeAlgorithm]) -> Self {
        self.config = self.config.with_groups(groups);
        self
    }

    /// Bound on a single handshake message.
    pub fn with_max_handshake_message_size(mut self, size: usize) -> Self {
        self.config = self.config.with_max_handshake_message_size(size);
        self
    }

    /// Validate certificates at a fixed UNIX time instead of the system clock.
    pub fn with_current_time(mut self, unix_seconds: u64) -> Self {
        self.config = self.config.with_current_time(unix_seconds);
        self
    }

    /// Build the options.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for an inconsistent combination, see
    /// [`ConfigBuilder::build`].
    pub fn build(self) -> Result<ClientOptions> {
        Ok(ClientOptions {
            config: self.config.build()?,
        })
    }
}

/// Blocking TLS client over a caller-owned transport.
///
/// The transport must already be connected. A client runs one handshake;
/// after a failure or close it only reports [`Error::ConnectionClosed`].
///
/// # Example
///
/// ```rust,no_run
/// use std::net::Ipv4Addr;
/// use microtls::{Client, ClientOptions, TcpTransport, Transport};
/// # fn example<C: microtls::microtls_crypto::CryptoProvider>(
/// #     crypto: &C,
/// #     ca_der: Vec<u8>,
/// # ) -> Result<(), Box<dyn std::error::Error>> {
/// let mut transport = TcpTransport::tcp()?;
/// transport.connect(Ipv4Addr::new(192, 0, 2, 10), 443)?;
///
/// let options = ClientOptions::builder()
///     .with_hostname("device.example")
///     .with_trust_anchor(ca_der)
///     .build()?;
/// let mut client: Client<'_, _, _> = Client::init(&mut transport, crypto, options)?;
/// client.connect()?;
/// client.send_all(b"ping")?;
/// let mut buf = [0u8; 256];
/// let n = client.recv(&mut buf)?;
/// client.close();
/// # Ok(())
/// # }
/// ```
pub struct Client<'a, T: Transport, C: CryptoProvider, R: Runtime = StdRuntime> {
    connection: Connection<'a, T, C>,
    pool: Option<&'a BufferPool<R>>,
}

impl<T: Transport, C: CryptoProvider, R: Runtime> fmt::Debug for Client<'_, T, C, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("connection", &self.connection)
            .field("pooled", &self.pool.is_some())
            .finish()
    }
}

impl<'a, T: Transport, C: CryptoProvider, R: Runtime> Client<'a, T, C, R> {
    /// Client with its own record buffers.
    pub fn init(transport: &'a mut T, crypto: &'a C, options: ClientOptions) -> Result<Self> {
        tracing::debug!(hostname = %options.config.hostname, "Client initialized");
        Ok(Self {
            connection: Connection::new(transport, crypto, options.config),
            pool: None,
        })
    }

    /// Client whose record buffers are borrowed from `pool` until it drops.
    ///
    /// # Errors
    ///
    /// `InternalError` if the pool has fewer than two free buffers.
    pub fn init_with_pool(
        transport: &'a mut T,
        crypto: &'a C,
        options: ClientOptions,
        pool: &'a BufferPool<R>,
    ) -> Result<Self> {
        let (read_buf, write_buf) = pool
            .acquire_pair()
            .ok_or_else(|| Error::InternalError("Buffer pool exhausted".into()))?;
        tracing::debug!(
            hostname = %options.config.hostname,
            available = pool.available(),
            "Client initialized from pool"
        );
        Ok(Self {
            connection: Connection::with_buffers(
                transport,
                crypto,
                options.config,
                read_buf,
                write_buf,
            ),
            pool: Some(pool),
        })
    }

    /// Run the TLS handshake.
    ///
    /// # Errors
    ///
    /// Any handshake failure. The client is unusable afterwards.
    pub fn connect(&mut self) -> Result<()> {
        self.connection.handshake()
    }

    /// Send up to one record of `data`, returning the count sent.
    pub fn send(&mut self, data: &[u8]) -> Result<usize> {
        self.connection.send(data)
    }

    /// Send all of `data`.
    pub fn send_all(&mut self, data: &[u8]) -> Result<()> {
        self.connection.send_all(data)
    }

    /// Read application data. `Ok(0)` means the server closed the session.
    pub fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.connection.recv(buf)
    }

    /// Negotiated protocol version, `None` until connected.
    pub fn version(&self) -> Option<ProtocolVersion> {
        self.connection.version()
    }

    /// Negotiated cipher suite, `None` until connected.
    pub fn cipher_suite(&self) -> Option<CipherSuite> {
        self.connection.cipher_suite()
    }

    /// Protocol selected through ALPN.
    pub fn alpn_protocol(&self) -> Option<&[u8]> {
        self.connection.alpn_protocol()
    }

    /// Lifecycle phase.
    pub fn phase(&self) -> ConnectionPhase {
        self.connection.phase()
    }

    /// Send close_notify (best effort) and close the transport.
    pub fn close(&mut self) {
        self.connection.close();
    }

    /// Release the client, wiping its state and returning pooled buffers.
    pub fn deinit(self) {}
}

impl<T: Transport, C: CryptoProvider, R: Runtime> Drop for Client<'_, T, C, R> {
    fn drop(&mut self) {
        let (read_buf, write_buf) = self.connection.take_buffers();
        if let Some(pool) = self.pool {
            pool.release(read_buf);
            pool.release(write_buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use microtls_core::testing::{self, LoopbackTransport, TestServer};
    use microtls_crypto_rustcrypto::RustCryptoProvider;

    fn options() -> ClientOptions {
        ClientOptions::builder()
            .with_hostname("localhost")
            .with_trust_anchor(testing::CA_P256)
            .with_current_time(testing::NOW)
            .build()
            .unwrap()
    }

    #[test]
    fn test_options_defaults() {
        let options = options();
        let config = options.config();
        assert!(config.verify_certificate_chain);
        assert!(config.verify_hostname);
        assert_eq!(config.timeout_ms, 30_000);
        assert_eq!(config.max_handshake_message_size, 32 * 1024);
        assert!(config.alpn_protocols.is_empty());
    }

    #[test]
    fn test_options_validation() {
        // Chain verification without a trust anchor
        let result = ClientOptions::builder().with_hostname("localhost").build();
        assert!(matches!(result, Err(Error::InvalidConfig(_))));

        // Hostname verification without a hostname
        let result = ClientOptions::builder()
            .with_trust_anchor(testing::CA_P256)
            .build();
        assert!(matches!(result, Err(Error::InvalidConfig(_))));

        let result = ClientOptions::builder()
            .with_verify_certificate_chain(false)
            .with_verify_hostname(false)
            .with_timeout_ms(0)
            .build();
        assert!(matches!(result, Err(Error::InvalidConfig(_))));

        let result = ClientOptions::builder()
            .with_verify_certificate_chain(false)
            .with_verify_hostname(false)
            .with_alpn_protocols(&[b""])
            .build();
        assert!(matches!(result, Err(Error::InvalidConfig(_))));

        let result = ClientOptions::builder()
            .with_verify_certificate_chain(false)
            .with_verify_hostname(false)
            .with_cipher_suites(&[])
            .build();
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    #[allow(deprecated)]
    fn test_skip_verify_sets_both_toggles() {
        let options = ClientOptions::builder().with_skip_verify(true).build().unwrap();
        assert!(!options.config().verify_certificate_chain);
        assert!(!options.config().verify_hostname);
    }

    #[test]
    fn test_client_lifecycle() {
        let provider = RustCryptoProvider::new();
        let server = TestServer::tls13(CipherSuite::Aes128GcmSha256);
        let mut transport = LoopbackTransport::new(&provider, server);
        let mut client: Client<'_, _, _> =
            Client::init(&mut transport, &provider, options()).unwrap();
        assert_eq!(client.version(), None);
        assert_eq!(client.phase(), ConnectionPhase::Start);

        client.connect().unwrap();
        assert_eq!(client.version(), Some(ProtocolVersion::Tls13));
        assert_eq!(client.cipher_suite(), Some(CipherSuite::Aes128GcmSha256));
        assert_eq!(client.alpn_protocol(), None);

        client.send_all(b"ping").unwrap();
        let mut buf = [0u8; 8];
        let n = client.recv(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"ping");

        client.close();
        assert_eq!(client.phase(), ConnectionPhase::Closed);
        assert_eq!(client.connect(), Err(Error::ConnectionClosed));
        client.deinit();
    }

    #[test]
    fn test_pooled_client_returns_buffers() {
        let provider = RustCryptoProvider::new();
        let pool = BufferPool::<StdRuntime>::new(2, 1024);
        {
            let server = TestServer::tls12(CipherSuite::Tls12EcdheEcdsaWithAes128GcmSha256);
            let mut transport = LoopbackTransport::new(&provider, server);
            let mut client =
                Client::init_with_pool(&mut transport, &provider, options(), &pool).unwrap();
            assert_eq!(pool.available(), 0);
            client.connect().unwrap();
            client.send_all(b"pooled").unwrap();

            // A second client cannot get buffers while the first holds them
            let server = TestServer::tls13(CipherSuite::Aes128GcmSha256);
            let mut other = LoopbackTransport::new(&provider, server);
            let result = Client::init_with_pool(&mut other, &provider, options(), &pool);
            assert!(matches!(result, Err(Error::InternalError(_))));
        }
        assert_eq!(pool.available(), 2);
    }
}
