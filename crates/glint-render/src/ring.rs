// SPDX-License-Identifier: CEPL-1.0

/// Current-frame index into the per-slot arrays: always in `[0, len)`,
/// moved only by [`RingIndex::advance`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RingIndex {
    value: usize,
    len: usize,
}

impl RingIndex {
    /// `len` is clamped to at least 1.
    pub fn new(len: usize) -> Self {
        Self {
            value: 0,
            len: len.max(1),
        }
    }

    #[inline]
    pub fn get(self) -> usize {
        self.value
    }

    #[inline]
    pub fn len(self) -> usize {
        self.len
    }

    pub fn advance(&mut self) {
        self.value = (self.value + 1) % self.len;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_after_len_steps() {
        let mut ring = RingIndex::new(3);
        let seen: Vec<usize> = (0..7)
            .map(|_| {
                let v = ring.get();
                ring.advance();
                v
            })
            .collect();
        assert_eq!(seen, [0, 1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn zero_len_is_clamped() {
        let mut ring = RingIndex::new(0);
        assert_eq!(ring.len(), 1);
        ring.advance();
        assert_eq!(ring.get(), 0);
    }
}
