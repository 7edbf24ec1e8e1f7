//! Little-endian property reading over unescaped payloads, and the matching
//! typed writes on [`NodeWriter`].
//!
//! Strings are Latin-1 on disk. Every byte maps to the char with the same code
//! point, so decoding is lossless and encoding rejects anything above U+00FF.

use mapforge_core::Position;

use super::node::NodeWriter;
use crate::MapError;

/// Payload parse failure; the decoder adds offset and node path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadError(pub String);

impl PayloadError {
    fn truncated(what: &str) -> Self {
        PayloadError(format!("payload truncated reading {what}"))
    }
}

pub type PayloadResult<T> = Result<T, PayloadError>;

/// Cursor over one node's unescaped payload.
pub struct PropReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PropReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn seek(&mut self, pos: usize) {
        self.pos = pos.min(self.data.len());
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_exhausted(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Everything not yet read.
    pub fn rest(&mut self) -> Vec<u8> {
        let rest = self.data[self.pos..].to_vec();
        self.pos = self.data.len();
        rest
    }

    fn take<const N: usize>(&mut self, what: &str) -> PayloadResult<[u8; N]> {
        let end = self.pos + N;
        let bytes = self
            .data
            .get(self.pos..end)
            .ok_or_else(|| PayloadError::truncated(what))?;
        self.pos = end;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    pub fn u8(&mut self, what: &str) -> PayloadResult<u8> {
        Ok(self.take::<1>(what)?[0])
    }

    pub fn u16(&mut self, what: &str) -> PayloadResult<u16> {
        Ok(u16::from_le_bytes(self.take(what)?))
    }

    pub fn u32(&mut self, what: &str) -> PayloadResult<u32> {
        Ok(u32::from_le_bytes(self.take(what)?))
    }

    pub fn i32(&mut self, what: &str) -> PayloadResult<i32> {
        Ok(i32::from_le_bytes(self.take(what)?))
    }

    pub fn f32(&mut self, what: &str) -> PayloadResult<f32> {
        Ok(f32::from_le_bytes(self.take(what)?))
    }

    pub fn f64(&mut self, what: &str) -> PayloadResult<f64> {
        Ok(f64::from_le_bytes(self.take(what)?))
    }

    fn latin1(&mut self, len: usize, what: &str) -> PayloadResult<String> {
        let end = self.pos + len;
        let bytes = self
            .data
            .get(self.pos..end)
            .ok_or_else(|| PayloadError::truncated(what))?;
        self.pos = end;
        Ok(bytes.iter().map(|&b| char::from(b)).collect())
    }

    /// u16 length prefixed string.
    pub fn string(&mut self, what: &str) -> PayloadResult<String> {
        let len = self.u16(what)?;
        self.latin1(usize::from(len), what)
    }

    /// u32 length prefixed string.
    pub fn long_string(&mut self, what: &str) -> PayloadResult<String> {
        let len = self.u32(what)?;
        self.latin1(len as usize, what)
    }

    pub fn position_value(&mut self, what: &str) -> PayloadResult<Position> {
        let x = self.u16(what)?;
        let y = self.u16(what)?;
        let z = self.u8(what)?;
        Ok(Position::new(x, y, z))
    }

    /// Fail unless every byte was consumed.
    pub fn expect_end(&self, node: &str) -> PayloadResult<()> {
        if self.is_exhausted() {
            Ok(())
        } else {
            Err(PayloadError(format!(
                "{} unexpected trailing bytes in {node}",
                self.remaining()
            )))
        }
    }
}

fn latin1_bytes(text: &str) -> Result<Vec<u8>, MapError> {
    text.chars()
        .map(|c| {
            u8::try_from(u32::from(c)).map_err(|_| {
                MapError::Encode(format!("character {c:?} in {text:?} is not Latin-1"))
            })
        })
        .collect()
}

impl NodeWriter {
    /// u16 length prefixed Latin-1 string.
    pub fn string(&mut self, text: &str) -> Result<(), MapError> {
        let bytes = latin1_bytes(text)?;
        let len = u16::try_from(bytes.len()).map_err(|_| {
            MapError::Encode(format!("string of {} bytes exceeds 65535", bytes.len()))
        })?;
        self.u16(len);
        self.bytes(&bytes);
        Ok(())
    }

    /// u32 length prefixed Latin-1 string.
    pub fn long_string(&mut self, text: &str) -> Result<(), MapError> {
        let bytes = latin1_bytes(text)?;
        let len = u32::try_from(bytes.len())
            .map_err(|_| MapError::Encode("string exceeds 4 GiB".to_string()))?;
        self.u32(len);
        self.bytes(&bytes);
        Ok(())
    }

    pub fn position_value(&mut self, pos: Position) {
        self.u16(pos.x);
        self.u16(pos.y);
        self.u8(pos.z);
    }
}
