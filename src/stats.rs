//------------ Counters ------------------------------------------------------

// Per-family, per-prefix-length counts of stored prefixes. The per-length
// breakdown is kept incrementally because insert and delete know the length
// of the prefix they touched anyway; the totals are just sums over it.

use crate::types::errors::PrefixStoreError;

#[derive(Clone, Debug)]
pub(crate) struct Counters {
    v4: [usize; 33],
    v6: [usize; 129],
}

impl Counters {
    pub(crate) fn new() -> Self {
        Counters {
            v4: [0; 33],
            v6: [0; 129],
        }
    }

    pub(crate) fn inc_v4(&mut self, len: u8) {
        self.v4[len as usize] += 1;
    }

    pub(crate) fn dec_v4(&mut self, len: u8) {
        self.v4[len as usize] -= 1;
    }

    pub(crate) fn inc_v6(&mut self, len: u8) {
        self.v6[len as usize] += 1;
    }

    pub(crate) fn dec_v6(&mut self, len: u8) {
        self.v6[len as usize] -= 1;
    }

    pub(crate) fn v4_count(&self) -> usize {
        self.v4.iter().sum()
    }

    pub(crate) fn v6_count(&self) -> usize {
        self.v6.iter().sum()
    }

    pub(crate) fn v4_count_for_len(
        &self,
        len: u8,
    ) -> Result<usize, PrefixStoreError> {
        self.v4
            .get(len as usize)
            .copied()
            .ok_or(PrefixStoreError::PrefixLengthInvalid)
    }

    pub(crate) fn v6_count_for_len(
        &self,
        len: u8,
    ) -> Result<usize, PrefixStoreError> {
        self.v6
            .get(len as usize)
            .copied()
            .ok_or(PrefixStoreError::PrefixLengthInvalid)
    }
}

impl Default for Counters {
    fn default() -> Self {
        Self::new()
    }
}
