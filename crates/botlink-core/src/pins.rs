//! Pin pool and read cache
//!
//! Pins move one way: a pin starts in the available pool and leaves it when
//! hardware is attached, never to return within the session. Readings come
//! only from bulk refreshes; the cache holds the sentinel for anything not
//! yet (or not successfully) read.

/// Cache value meaning "never read or refresh failed"
pub(crate) const STALE_READING: i32 = -1;

/// One bank of pins (digital or analog): the pool of still-free pins plus
/// the bulk-read cache aligned to it.
#[derive(Debug, Clone)]
pub(crate) struct PinBank {
    available: Vec<u8>,
    cache: Option<Vec<i32>>,
}

impl PinBank {
    pub(crate) fn new(pins: &[u8]) -> Self {
        Self {
            available: pins.to_vec(),
            cache: None,
        }
    }

    pub(crate) fn available(&self) -> &[u8] {
        &self.available
    }

    pub(crate) fn len(&self) -> usize {
        self.available.len()
    }

    pub(crate) fn contains(&self, pin: u8) -> bool {
        self.available.contains(&pin)
    }

    /// Remove `pin` from the pool. Returns false if it was not available.
    /// The cached reading (if any) is removed alongside so the cache stays
    /// aligned with the pool.
    pub(crate) fn take(&mut self, pin: u8) -> bool {
        match self.available.iter().position(|&p| p == pin) {
            Some(idx) => {
                self.available.remove(idx);
                if let Some(cache) = &mut self.cache {
                    cache.remove(idx);
                }
                true
            }
            None => false,
        }
    }

    /// Mark every cached reading stale ahead of a refresh.
    pub(crate) fn reset_cache(&mut self) {
        self.cache = Some(vec![STALE_READING; self.available.len()]);
    }

    /// Commit a full set of refreshed readings, in pool order.
    pub(crate) fn commit(&mut self, values: Vec<i32>) {
        debug_assert_eq!(values.len(), self.available.len());
        self.cache = Some(values);
    }

    /// Whether any refresh has been attempted this session.
    pub(crate) fn has_readings(&self) -> bool {
        self.cache.is_some()
    }

    /// Cached reading for `pin`, or None if the pin is not in the pool.
    pub(crate) fn reading(&self, pin: u8) -> Option<i32> {
        let idx = self.available.iter().position(|&p| p == pin)?;
        Some(
            self.cache
                .as_ref()
                .map(|cache| cache[idx])
                .unwrap_or(STALE_READING),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn take_is_one_way() {
        let mut bank = PinBank::new(&[2, 3, 4]);
        assert!(bank.contains(3));
        assert!(bank.take(3));
        assert!(!bank.contains(3));
        // taking again fails; the pin never returns to the pool
        assert!(!bank.take(3));
        assert_eq!(bank.available(), &[2, 4]);
    }

    #[test]
    fn readings_follow_pool_order() {
        let mut bank = PinBank::new(&[0, 1, 2]);
        bank.reset_cache();
        bank.commit(vec![100, 200, 300]);
        assert_eq!(bank.reading(0), Some(100));
        assert_eq!(bank.reading(2), Some(300));
        assert_eq!(bank.reading(5), None);
    }

    #[test]
    fn reset_marks_everything_stale() {
        let mut bank = PinBank::new(&[0, 1]);
        bank.commit(vec![10, 20]);
        bank.reset_cache();
        assert_eq!(bank.reading(0), Some(STALE_READING));
        assert_eq!(bank.reading(1), Some(STALE_READING));
    }

    #[test]
    fn take_keeps_cache_aligned() {
        let mut bank = PinBank::new(&[5, 6, 7]);
        bank.commit(vec![50, 60, 70]);
        bank.take(6);
        assert_eq!(bank.reading(5), Some(50));
        assert_eq!(bank.reading(7), Some(70));
        assert_eq!(bank.reading(6), None);
    }

    #[test]
    fn unrefreshed_bank_has_no_readings() {
        let bank = PinBank::new(&[0]);
        assert!(!bank.has_readings());
        assert_eq!(bank.reading(0), Some(STALE_READING));
    }
}
