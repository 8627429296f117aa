//! Radio channel selection

use crate::{LinkError, Result};

/// 5 GHz channels scanned by the operator, in switching order
pub const DEFAULT_CHANNELS: [u16; 28] = [
    36, 40, 44, 48, 52, 56, 60, 64, 100, 104, 108, 112, 116, 120, 124, 128, 132, 136, 140, 144,
    149, 153, 157, 161, 165, 169, 171, 173,
];

/// Current index into an ordered list of radio channels
///
/// Increment and decrement both wrap modulo the list length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSelector {
    channels: Vec<u16>,
    index: usize,
}

impl ChannelSelector {
    pub fn new(channels: Vec<u16>) -> Result<Self> {
        Self::with_index(channels, 0)
    }

    pub fn with_index(channels: Vec<u16>, index: usize) -> Result<Self> {
        if channels.is_empty() {
            return Err(LinkError::config("channel list must not be empty"));
        }
        if index >= channels.len() {
            return Err(LinkError::config(format!(
                "channel index {} out of range for {} channels",
                index,
                channels.len()
            )));
        }
        Ok(Self { channels, index })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn current(&self) -> u16 {
        self.channels[self.index]
    }

    pub fn channels(&self) -> &[u16] {
        &self.channels
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Advance to the next channel, wrapping to the first
    pub fn next(&mut self) -> u16 {
        self.index = (self.index + 1) % self.channels.len();
        self.current()
    }

    /// Step back to the previous channel, wrapping to the last
    pub fn previous(&mut self) -> u16 {
        let len = self.channels.len();
        self.index = (self.index + len - 1) % len;
        self.current()
    }

    /// Jump to an explicit index; out-of-range leaves the selection untouched
    pub fn select(&mut self, index: usize) -> Option<u16> {
        if index >= self.channels.len() {
            return None;
        }
        self.index = index;
        Some(self.current())
    }
}

impl Default for ChannelSelector {
    fn default() -> Self {
        Self { channels: DEFAULT_CHANNELS.to_vec(), index: 0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_list_is_rejected() {
        assert!(ChannelSelector::new(Vec::new()).is_err());
        assert!(ChannelSelector::with_index(vec![36, 40], 2).is_err());
    }

    #[test]
    fn previous_from_zero_wraps_to_last() {
        let mut selector = ChannelSelector::default();
        assert_eq!(selector.previous(), 173);
        assert_eq!(selector.index(), DEFAULT_CHANNELS.len() - 1);
        assert_eq!(selector.next(), 36);
    }

    #[test]
    fn select_out_of_range_is_ignored() {
        let mut selector = ChannelSelector::new(vec![36, 40, 44]).unwrap();
        assert_eq!(selector.select(2), Some(44));
        assert_eq!(selector.select(3), None);
        assert_eq!(selector.current(), 44);
    }

    proptest! {
        #[test]
        fn n_nexts_return_to_start(channels in prop::collection::vec(1u16..200, 1..40)) {
            let len = channels.len();
            let mut selector = ChannelSelector::new(channels).unwrap();
            for _ in 0..len {
                selector.next();
            }
            prop_assert_eq!(selector.index(), 0);
        }

        #[test]
        fn next_then_previous_is_identity(
            channels in prop::collection::vec(1u16..200, 1..40),
            start in 0usize..40
        ) {
            let start = start % channels.len();
            let mut selector = ChannelSelector::with_index(channels, start).unwrap();
            selector.next();
            selector.previous();
            prop_assert_eq!(selector.index(), start);
        }
    }
}
