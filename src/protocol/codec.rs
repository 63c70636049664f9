//! Big-endian packet writer and bounds-checked reader.

use crate::error::DecodeError;

/// Append-only builder for request bodies.
#[derive(Debug, Default, Clone)]
pub struct PacketWriter {
    buf: Vec<u8>,
}

impl PacketWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            buf: Vec::with_capacity(cap),
        }
    }

    pub fn put_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_bits().to_be_bytes());
    }

    /// `1` or `0` as a `u32` flag.
    pub fn put_flag(&mut self, v: bool) {
        self.put_u32(u32::from(v));
    }

    /// Count-prefixed length: collection sizes always travel as `u32`.
    ///
    /// Saturates at `u32::MAX`; such a body is larger than
    /// [`MAX_REQUEST_LEN`](crate::protocol::MAX_REQUEST_LEN) and fails to frame.
    pub fn put_len(&mut self, len: usize) {
        self.put_u32(u32::try_from(len).unwrap_or(u32::MAX));
    }

    /// Length-prefixed string.
    pub fn put_str(&mut self, s: &str) {
        self.put_bytes(s.as_bytes());
    }

    /// Length-prefixed byte string.
    pub fn put_bytes(&mut self, b: &[u8]) {
        self.put_len(b.len());
        self.buf.extend_from_slice(b);
    }

    /// Bytes with no length prefix.
    pub fn put_raw(&mut self, b: &[u8]) {
        self.buf.extend_from_slice(b);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

/// Sequential cursor over a response body.
///
/// Every read is checked against the remaining length; a short buffer yields
/// a [`DecodeError`] instead of a panic or a silently truncated value.
#[derive(Debug, Clone)]
pub struct PacketReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PacketReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn offset(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, n: usize, what: &'static str) -> Result<&'a [u8], DecodeError> {
        if n > self.remaining() {
            return Err(DecodeError {
                offset: self.pos,
                wanted: n,
                remaining: self.remaining(),
                what,
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self, what: &'static str) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, what)?);
        Ok(out)
    }

    pub fn get_u16(&mut self) -> Result<u16, DecodeError> {
        Ok(u16::from_be_bytes(self.array("u16")?))
    }

    pub fn get_u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_be_bytes(self.array("u32")?))
    }

    pub fn get_i32(&mut self) -> Result<i32, DecodeError> {
        Ok(i32::from_be_bytes(self.array("i32")?))
    }

    pub fn get_u64(&mut self) -> Result<u64, DecodeError> {
        Ok(u64::from_be_bytes(self.array("u64")?))
    }

    pub fn get_f32(&mut self) -> Result<f32, DecodeError> {
        Ok(f32::from_bits(u32::from_be_bytes(self.array("f32")?)))
    }

    /// Length-prefixed byte string. A zero length consumes nothing past the prefix.
    pub fn get_bytes(&mut self) -> Result<&'a [u8], DecodeError> {
        let len = self.get_u32()? as usize;
        if len == 0 {
            return Ok(&[]);
        }
        self.take(len, "string body")
    }

    /// Length-prefixed string; invalid UTF-8 is replaced rather than rejected.
    pub fn get_string(&mut self) -> Result<String, DecodeError> {
        Ok(String::from_utf8_lossy(self.get_bytes()?).into_owned())
    }

    /// Read a `u32` element count and check that `count * min_item_len` bytes
    /// could still follow, so a corrupt count fails before anything is allocated.
    pub fn get_count(
        &mut self,
        min_item_len: usize,
        what: &'static str,
    ) -> Result<usize, DecodeError> {
        let start = self.pos;
        let count = self.get_u32()? as usize;
        let needed = count.saturating_mul(min_item_len);
        if needed > self.remaining() {
            return Err(DecodeError {
                offset: start,
                wanted: needed,
                remaining: self.remaining(),
                what,
            });
        }
        Ok(count)
    }
}
