//! NewSessionTicket message (RFC 8446 Section 4.6.1).
//!
//! Resumption is not supported: tickets are parsed for well-formedness and
//! then dropped.

use bytes::{BufMut, BytesMut};

use crate::codec::{self, Reader};
use crate::error::{Error, Result};
use crate::extensions::Extensions;

/// NewSessionTicket message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSessionTicket {
    /// Ticket lifetime in seconds
    pub ticket_lifetime: u32,
    /// Obfuscation value for the ticket age
    pub ticket_age_add: u32,
    /// Per-ticket nonce
    pub ticket_nonce: Vec<u8>,
    /// Opaque ticket
    pub ticket: Vec<u8>,
    /// Extensions
    pub extensions: Extensions,
}

impl NewSessionTicket {
    /// Encode to bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = BytesMut::new();
        buf.put_u32(self.ticket_lifetime);
        buf.put_u32(self.ticket_age_add);
        codec::put_vec_u8(&mut buf, &self.ticket_nonce)?;
        codec::put_vec_u16(&mut buf, &self.ticket)?;
        self.extensions.encode_into(&mut buf)?;
        Ok(buf.to_vec())
    }

    /// Decode from bytes.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut r = Reader::new(data, "NewSessionTicket");
        let ticket_lifetime = r.u32()?;
        let ticket_age_add = r.u32()?;
        let ticket_nonce = r.vec_u8()?.to_vec();
        let ticket = r.vec_u16()?.to_vec();
        if ticket.is_empty() {
            return Err(Error::InvalidMessage("Empty session ticket".into()));
        }
        let extensions = Extensions::read(&mut r)?;
        r.finish()?;
        Ok(Self {
            ticket_lifetime,
            ticket_age_add,
            ticket_nonce,
            ticket,
            extensions,
        })
    }
}
