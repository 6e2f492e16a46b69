//! Log formatting helpers

use std::fmt;

/// Logical address shown as `0x0EF1`
#[derive(Debug, Clone, Copy)]
pub struct Addr(pub u16);

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

/// Uppercase hex dump truncated to `limit` bytes
pub struct HexDump<'a> {
    data: &'a [u8],
    limit: usize,
}

impl<'a> HexDump<'a> {
    pub fn new(data: &'a [u8], limit: usize) -> Self {
        Self { data, limit }
    }
}

impl fmt::Display for HexDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown = &self.data[..self.data.len().min(self.limit)];
        for (i, byte) in shown.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{:02X}", byte)?;
        }
        if shown.len() < self.data.len() {
            write!(f, " ... ({} bytes)", self.data.len())?;
        }
        Ok(())
    }
}
