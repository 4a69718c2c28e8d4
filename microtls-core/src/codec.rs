//! Bounds-checked wire readers and length-prefixed writers.
//!
//! Every decoder in the engine reads through [`Reader`], so truncated or
//! oversized input surfaces as `InvalidMessage` instead of a panic in
//! `bytes::Buf`.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{Error, Result};

/// Cursor over untrusted bytes.
#[derive(Debug, Clone, Copy)]
pub struct Reader<'a> {
    data: &'a [u8],
    context: &'static str,
}

impl<'a> Reader<'a> {
    /// Read `data`; `context` names the structure in error messages.
    pub fn new(data: &'a [u8], context: &'static str) -> Self {
        Self { data, context }
    }

    fn truncated(&self) -> Error {
        Error::InvalidMessage(format!("{} truncated", self.context))
    }

    /// Bytes left.
    pub fn remaining(&self) -> usize {
        self.data.len()
    }

    /// Whether everything has been consumed.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Read a `u8`.
    pub fn u8(&mut self) -> Result<u8> {
        if self.data.is_empty() {
            return Err(self.truncated());
        }
        Ok(self.data.get_u8())
    }

    /// Read a big-endian `u16`.
    pub fn u16(&mut self) -> Result<u16> {
        if self.data.len() < 2 {
            return Err(self.truncated());
        }
        Ok(self.data.get_u16())
    }

    /// Read a big-endian `u32`.
    pub fn u32(&mut self) -> Result<u32> {
        if self.data.len() < 4 {
            return Err(self.truncated());
        }
        Ok(self.data.get_u32())
    }

    /// Read a big-endian 24-bit length.
    pub fn u24(&mut self) -> Result<usize> {
        if self.data.len() < 3 {
            return Err(self.truncated());
        }
        Ok(self.data.get_uint(3) as usize)
    }

    /// Take exactly `len` bytes.
    pub fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.data.len() < len {
            return Err(self.truncated());
        }
        let (head, tail) = self.data.split_at(len);
        self.data = tail;
        Ok(head)
    }

    /// Take a fixed-size array.
    pub fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// `opaque x<0..2^8-1>`
    pub fn vec_u8(&mut self) -> Result<&'a [u8]> {
        let len = self.u8()? as usize;
        self.take(len)
    }

    /// `opaque x<0..2^16-1>`
    pub fn vec_u16(&mut self) -> Result<&'a [u8]> {
        let len = self.u16()? as usize;
        self.take(len)
    }

    /// `opaque x<0..2^24-1>`
    pub fn vec_u24(&mut self) -> Result<&'a [u8]> {
        let len = self.u24()?;
        self.take(len)
    }

    /// Sub-reader over a `u16`-prefixed block.
    pub fn sub_u16(&mut self) -> Result<Reader<'a>> {
        let context = self.context;
        Ok(Reader::new(self.vec_u16()?, context))
    }

    /// Sub-reader over a `u24`-prefixed block.
    pub fn sub_u24(&mut self) -> Result<Reader<'a>> {
        let context = self.context;
        Ok(Reader::new(self.vec_u24()?, context))
    }

    /// Everything not yet read.
    pub fn rest(&mut self) -> &'a [u8] {
        let rest = self.data;
        self.data = &[];
        rest
    }

    /// Fail unless all input has been consumed.
    pub fn finish(&self) -> Result<()> {
        if self.data.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidMessage(format!(
                "{} has {} trailing bytes",
                self.context,
                self.data.len()
            )))
        }
    }
}

/// Write `body` behind a `u8` length.
pub fn put_vec_u8(buf: &mut BytesMut, body: &[u8]) -> Result<()> {
    let len = u8::try_from(body.len())
        .map_err(|_| Error::InternalError("u8-prefixed field too long".into()))?;
    buf.put_u8(len);
    buf.put_slice(body);
    Ok(())
}

/// Write `body` behind a `u16` length.
pub fn put_vec_u16(buf: &mut BytesMut, body: &[u8]) -> Result<()> {
    let len = u16::try_from(body.len())
        .map_err(|_| Error::InternalError("u16-prefixed field too long".into()))?;
    buf.put_u16(len);
    buf.put_slice(body);
    Ok(())
}

/// Write `body` behind a 24-bit length.
pub fn put_vec_u24(buf: &mut BytesMut, body: &[u8]) -> Result<()> {
    if body.len() > 0x00FF_FFFF {
        return Err(Error::InternalError("u24-prefixed field too long".into()));
    }
    buf.put_uint(body.len() as u64, 3);
    buf.put_slice(body);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_primitives() {
        let data = [0x01, 0x02, 0x03, 0x00, 0x00, 0x02, 0xAA, 0xBB, 0x01, 0xCC];
        let mut r = Reader::new(&data, "test");
        assert_eq!(r.u8().unwrap(), 0x01);
        assert_eq!(r.u16().unwrap(), 0x0203);
        assert_eq!(r.vec_u24().unwrap(), &[0xAA, 0xBB]);
        assert_eq!(r.vec_u8().unwrap(), &[0xCC]);
        r.finish().unwrap();
    }

    #[test]
    fn test_reader_truncation_is_an_error() {
        let mut r = Reader::new(&[0x00, 0x05, 0x01], "ServerHello");
        assert!(matches!(
            r.vec_u16(),
            Err(Error::InvalidMessage(msg)) if msg.contains("ServerHello")
        ));
        assert!(Reader::new(&[], "x").u8().is_err());
        assert!(Reader::new(&[0], "x").u16().is_err());
        assert!(Reader::new(&[0, 0], "x").u24().is_err());
        assert!(Reader::new(&[1, 2, 3], "x").array::<4>().is_err());
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut r = Reader::new(&[1, 2], "x");
        r.u8().unwrap();
        assert!(r.finish().is_err());
    }

    #[test]
    fn test_writers() {
        let mut buf = BytesMut::new();
        put_vec_u8(&mut buf, b"ab").unwrap();
        put_vec_u16(&mut buf, b"c").unwrap();
        put_vec_u24(&mut buf, b"").unwrap();
        assert_eq!(&buf[..], &[2, b'a', b'b', 0, 1, b'c', 0, 0, 0]);
        assert!(put_vec_u8(&mut buf, &[0u8; 256]).is_err());
    }
}
