use crate::abi;

/// Defines the base direction of a paragraph.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    /// Resolved by the native component from the text itself.
    #[default]
    Default,
    /// Text is set horizontally from right to left.
    RightToLeft,
    /// Text is set horizontally from left to right.
    LeftToRight,
    /// Text is set vertically from top to bottom.
    TopToBottom,
}

impl Direction {
    pub(crate) fn to_raw(self) -> u32 {
        match self {
            Direction::Default     => abi::RAQM_DIRECTION_DEFAULT,
            Direction::RightToLeft => abi::RAQM_DIRECTION_RTL,
            Direction::LeftToRight => abi::RAQM_DIRECTION_LTR,
            Direction::TopToBottom => abi::RAQM_DIRECTION_TTB,
        }
    }

    pub(crate) fn from_raw(dir: u32) -> Option<Self> {
        match dir {
            abi::RAQM_DIRECTION_DEFAULT => Some(Direction::Default),
            abi::RAQM_DIRECTION_RTL => Some(Direction::RightToLeft),
            abi::RAQM_DIRECTION_LTR => Some(Direction::LeftToRight),
            abi::RAQM_DIRECTION_TTB => Some(Direction::TopToBottom),
            _ => None,
        }
    }

    /// Checks that direction is horizontal.
    pub fn is_horizontal(self) -> bool {
        self != Direction::TopToBottom
    }
}

impl std::str::FromStr for Direction {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err("invalid direction");
        }

        // Like hb-shape, only the first letter matters.
        match s.as_bytes()[0].to_ascii_lowercase() {
            b'd' => Ok(Direction::Default),
            b'r' => Ok(Direction::RightToLeft),
            b'l' => Ok(Direction::LeftToRight),
            b't' => Ok(Direction::TopToBottom),
            _ => Err("invalid direction"),
        }
    }
}

/// How the native component treats the bytes handed to a blob.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum MemoryMode {
    /// The native component copies the bytes into its own allocation.
    Duplicate,
    /// The bytes are referenced and never written to.
    ReadOnly,
    /// The bytes are referenced and may be modified in place.
    #[default]
    Writable,
    /// Referenced; the native component copies them if it ever needs to write.
    ReadOnlyMayMakeWritable,
}

impl MemoryMode {
    pub(crate) fn to_raw(self) -> u32 {
        match self {
            MemoryMode::Duplicate => abi::HB_MEMORY_MODE_DUPLICATE,
            MemoryMode::ReadOnly => abi::HB_MEMORY_MODE_READONLY,
            MemoryMode::Writable => abi::HB_MEMORY_MODE_WRITABLE,
            MemoryMode::ReadOnlyMayMakeWritable => abi::HB_MEMORY_MODE_READONLY_MAY_MAKE_WRITABLE,
        }
    }

    pub(crate) fn from_raw(mode: u32) -> Option<Self> {
        match mode {
            abi::HB_MEMORY_MODE_DUPLICATE => Some(MemoryMode::Duplicate),
            abi::HB_MEMORY_MODE_READONLY => Some(MemoryMode::ReadOnly),
            abi::HB_MEMORY_MODE_WRITABLE => Some(MemoryMode::Writable),
            abi::HB_MEMORY_MODE_READONLY_MAY_MAKE_WRITABLE => Some(MemoryMode::ReadOnlyMayMakeWritable),
            _ => None,
        }
    }

    /// Checks that the blob keeps referencing the caller's bytes.
    ///
    /// When `true`, the bytes must stay allocated until every face, font
    /// and session built on top of the blob is gone.
    pub fn borrows_data(self) -> bool {
        self != MemoryMode::Duplicate
    }
}

impl std::str::FromStr for MemoryMode {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "duplicate" => Ok(MemoryMode::Duplicate),
            "readonly" => Ok(MemoryMode::ReadOnly),
            "writable" => Ok(MemoryMode::Writable),
            "readonly-may-make-writable" => Ok(MemoryMode::ReadOnlyMayMakeWritable),
            _ => Err("invalid memory mode"),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn direction_from_str() {
        assert_eq!(Direction::from_str("ltr"), Ok(Direction::LeftToRight));
        assert_eq!(Direction::from_str("RTL"), Ok(Direction::RightToLeft));
        assert_eq!(Direction::from_str("ttb"), Ok(Direction::TopToBottom));
        assert_eq!(Direction::from_str("default"), Ok(Direction::Default));
        assert!(Direction::from_str("").is_err());
        assert!(Direction::from_str("btt").is_err());
    }

    #[test]
    fn direction_raw_values() {
        assert_eq!(Direction::Default.to_raw(), 0);
        assert_eq!(Direction::RightToLeft.to_raw(), 1);
        assert_eq!(Direction::LeftToRight.to_raw(), 2);
        assert_eq!(Direction::TopToBottom.to_raw(), 3);
        assert_eq!(Direction::from_raw(4), None);
    }

    #[test]
    fn memory_mode_raw_values() {
        assert_eq!(MemoryMode::Writable.to_raw(), 2);
        assert_eq!(MemoryMode::from_raw(0), Some(MemoryMode::Duplicate));
        assert!(!MemoryMode::Duplicate.borrows_data());
        assert!(MemoryMode::ReadOnly.borrows_data());
        assert_eq!(MemoryMode::from_str("Writable"), Ok(MemoryMode::Writable));
    }
}
