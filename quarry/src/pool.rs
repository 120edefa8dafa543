//! Numeric resource pools.
//!
//! TCP ports and device minor numbers are drawn from external pools. The
//! contract consumed by the factories is [`NumberPool`]; [`BitmapPool`]
//! is the bit-vector implementation over a closed range used for tests
//! and controller bootstrap.

use std::sync::RwLock;

use crate::error::{QuarryError, QuarryResult};

pub trait NumberPool: Send + Sync {
    /// Allocates the lowest free number at or after the internal search
    /// hint. Fails with `PoolExhausted` when no number is available.
    fn auto_allocate(&self) -> QuarryResult<u32>;

    /// Allocates a caller-chosen number. Fails with `ValueInUse` when the
    /// number is already taken.
    fn allocate(&self, nr: u32) -> QuarryResult<()>;

    fn deallocate(&self, nr: u32);

    fn is_allocated(&self, nr: u32) -> bool;
}

struct PoolInner {
    bits: Vec<u64>,
    allocated: usize,
    /// Next-free search starts here, one past the last allocation.
    hint: u32,
}

/// Number allocation pool over the closed range `[start, end]`.
pub struct BitmapPool {
    start: u32,
    end: u32,
    inner: RwLock<PoolInner>,
}

impl BitmapPool {
    pub fn new(start: u32, end: u32) -> Self {
        assert!(start <= end, "invalid pool range");
        let size = (end - start + 1) as usize;
        Self {
            start,
            end,
            inner: RwLock::new(PoolInner {
                bits: vec![0; (size + 63) / 64],
                allocated: 0,
                hint: 0,
            }),
        }
    }

    pub fn size(&self) -> usize {
        (self.end - self.start + 1) as usize
    }

    pub fn allocated_count(&self) -> usize {
        self.inner.read().unwrap().allocated
    }

    pub fn available_count(&self) -> usize {
        self.size() - self.allocated_count()
    }

    fn check_range(&self, nr: u32) -> QuarryResult<()> {
        if nr < self.start || nr > self.end {
            Err(QuarryError::ValueOutOfRange {
                kind: "pool number",
                value: nr as u64,
                min: self.start as u64,
                max: self.end as u64,
            })
        } else {
            Ok(())
        }
    }

    fn test_bit(inner: &PoolInner, offset: usize) -> bool {
        inner.bits[offset / 64] & (1u64 << (offset % 64)) != 0
    }

    fn set_bit(inner: &mut PoolInner, offset: usize) {
        inner.bits[offset / 64] |= 1u64 << (offset % 64);
    }

    fn clear_bit(inner: &mut PoolInner, offset: usize) {
        inner.bits[offset / 64] &= !(1u64 << (offset % 64));
    }
}

impl NumberPool for BitmapPool {
    fn auto_allocate(&self) -> QuarryResult<u32> {
        let size = self.size();
        let mut inner = self.inner.write().unwrap();
        if inner.allocated == size {
            return Err(QuarryError::PoolExhausted);
        }
        let first = inner.hint as usize % size;
        for probe in 0..size {
            let offset = (first + probe) % size;
            if !Self::test_bit(&inner, offset) {
                Self::set_bit(&mut inner, offset);
                inner.allocated += 1;
                inner.hint = (offset as u32 + 1) % size as u32;
                return Ok(self.start + offset as u32);
            }
        }
        Err(QuarryError::PoolExhausted)
    }

    fn allocate(&self, nr: u32) -> QuarryResult<()> {
        self.check_range(nr)?;
        let offset = (nr - self.start) as usize;
        let mut inner = self.inner.write().unwrap();
        if Self::test_bit(&inner, offset) {
            return Err(QuarryError::ValueInUse(nr));
        }
        Self::set_bit(&mut inner, offset);
        inner.allocated += 1;
        Ok(())
    }

    fn deallocate(&self, nr: u32) {
        if nr < self.start || nr > self.end {
            return;
        }
        let offset = (nr - self.start) as usize;
        let mut inner = self.inner.write().unwrap();
        if Self::test_bit(&inner, offset) {
            Self::clear_bit(&mut inner, offset);
            inner.allocated -= 1;
        }
    }

    fn is_allocated(&self, nr: u32) -> bool {
        if nr < self.start || nr > self.end {
            return false;
        }
        let offset = (nr - self.start) as usize;
        Self::test_bit(&self.inner.read().unwrap(), offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_allocate_sequence() {
        let pool = BitmapPool::new(7000, 7009);
        assert_eq!(7000, pool.auto_allocate().unwrap());
        assert_eq!(7001, pool.auto_allocate().unwrap());
        pool.deallocate(7000);
        // the hint moves forward; freed numbers are found on wrap-around
        assert_eq!(7002, pool.auto_allocate().unwrap());
        assert_eq!(2, pool.allocated_count());
        assert_eq!(8, pool.available_count());
    }

    #[test]
    fn test_explicit_allocate() {
        let pool = BitmapPool::new(0, 63);
        pool.allocate(42).unwrap();
        assert!(pool.is_allocated(42));
        assert!(matches!(
            pool.allocate(42).unwrap_err(),
            QuarryError::ValueInUse(42)
        ));
        pool.deallocate(42);
        assert!(!pool.is_allocated(42));

        pool.allocate(64).unwrap_err();
    }

    #[test]
    fn test_exhaustion() {
        let pool = BitmapPool::new(1, 3);
        for _ in 0..3 {
            pool.auto_allocate().unwrap();
        }
        assert!(matches!(
            pool.auto_allocate().unwrap_err(),
            QuarryError::PoolExhausted
        ));
        pool.deallocate(2);
        assert_eq!(2, pool.auto_allocate().unwrap());
    }

    #[test]
    fn test_auto_skips_explicitly_allocated() {
        let pool = BitmapPool::new(10, 14);
        pool.allocate(10).unwrap();
        pool.allocate(11).unwrap();
        assert_eq!(12, pool.auto_allocate().unwrap());
    }
}
