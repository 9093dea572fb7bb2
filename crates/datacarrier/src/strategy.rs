/// Overflow policy applied when a write targets a full channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
#[repr(u8)]
pub enum BufferStrategy {
    /// Wait until a slot frees up or the channel closes.
    #[default]
    Blocking = 0,
    /// Drop the new item if no slot is free right now.
    IfPossible = 1,
    /// Evict the oldest unread item to make room for the new one.
    SkipToLatest = 2,
}

impl BufferStrategy {
    #[inline]
    pub(crate) const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Inverse of `as_u8`. Unknown tags decode to `Blocking`.
    #[inline]
    pub(crate) const fn from_u8(tag: u8) -> Self {
        match tag {
            1 => Self::IfPossible,
            2 => Self::SkipToLatest,
            _ => Self::Blocking,
        }
    }

    /// Returns `true` if writes under this policy can suspend the caller.
    #[inline]
    pub const fn may_block(self) -> bool {
        matches!(self, Self::Blocking)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_roundtrip() {
        for strategy in [
            BufferStrategy::Blocking,
            BufferStrategy::IfPossible,
            BufferStrategy::SkipToLatest,
        ] {
            assert_eq!(BufferStrategy::from_u8(strategy.as_u8()), strategy);
        }
        assert_eq!(BufferStrategy::from_u8(200), BufferStrategy::Blocking);
    }

    #[test]
    fn test_only_blocking_may_block() {
        assert!(BufferStrategy::Blocking.may_block());
        assert!(!BufferStrategy::IfPossible.may_block());
        assert!(!BufferStrategy::SkipToLatest.may_block());
    }
}
