//! Flat, bounds-checked, little-endian byte memory

use super::error::{ExecError, ExecResult};

/// Addresses below this are never mapped
pub const NULL_GUARD: usize = 16;

pub struct Memory {
    bytes: Vec<u8>,
}

impl Memory {
    pub fn new(size: usize) -> Self {
        Self { bytes: vec![0; size] }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    fn range(&self, address: i64, size: usize) -> ExecResult<std::ops::Range<usize>> {
        let start = usize::try_from(address).map_err(|_| ExecError::OutOfBounds { address, size })?;
        if start < NULL_GUARD {
            return Err(ExecError::NullPointer { address });
        }
        match start.checked_add(size) {
            Some(end) if end <= self.bytes.len() => Ok(start..end),
            _ => Err(ExecError::OutOfBounds { address, size }),
        }
    }

    /// Read `size` bytes, sign or zero extended to 64 bits
    pub fn load(&self, address: i64, size: usize, signed: bool) -> ExecResult<i64> {
        let range = self.range(address, size)?;
        let mut image = [0u8; 8];
        image[..size].copy_from_slice(&self.bytes[range]);
        let raw = u64::from_le_bytes(image);
        if size >= 8 {
            return Ok(raw as i64);
        }
        let shift = 64 - size * 8;
        Ok(if signed {
            ((raw << shift) as i64) >> shift
        } else {
            raw as i64
        })
    }

    /// Write the low `size` bytes of `value`
    pub fn store(&mut self, address: i64, size: usize, value: i64) -> ExecResult<()> {
        let range = self.range(address, size)?;
        self.bytes[range].copy_from_slice(&value.to_le_bytes()[..size]);
        Ok(())
    }

    pub fn write_bytes(&mut self, address: i64, data: &[u8]) -> ExecResult<()> {
        let range = self.range(address, data.len())?;
        self.bytes[range].copy_from_slice(data);
        Ok(())
    }

    pub fn read_bytes(&self, address: i64, len: usize) -> ExecResult<&[u8]> {
        let range = self.range(address, len)?;
        Ok(&self.bytes[range])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_little_endian_round_trip() {
        let mut mem = Memory::new(64);
        mem.store(16, 4, 0x0102_0304).unwrap();
        assert_eq!(mem.read_bytes(16, 4).unwrap(), &[4, 3, 2, 1]);
        assert_eq!(mem.load(16, 2, false).unwrap(), 0x0304);
    }

    #[test]
    fn test_sign_extension() {
        let mut mem = Memory::new(64);
        mem.store(20, 1, -1).unwrap();
        assert_eq!(mem.load(20, 1, true).unwrap(), -1);
        assert_eq!(mem.load(20, 1, false).unwrap(), 255);
    }

    #[test]
    fn test_narrow_store_leaves_neighbours() {
        let mut mem = Memory::new(64);
        mem.store(24, 8, -1).unwrap();
        mem.store(25, 1, 0).unwrap();
        assert_eq!(mem.read_bytes(24, 4).unwrap(), &[0xff, 0, 0xff, 0xff]);
    }

    #[test]
    fn test_bounds() {
        let mut mem = Memory::new(32);
        assert_eq!(mem.load(0, 4, true), Err(ExecError::NullPointer { address: 0 }));
        assert_eq!(
            mem.store(30, 4, 1),
            Err(ExecError::OutOfBounds { address: 30, size: 4 })
        );
        assert_eq!(mem.load(-8, 1, true), Err(ExecError::OutOfBounds { address: -8, size: 1 }));
    }
}
