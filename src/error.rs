use thiserror::Error;

/// A specialized `Result` type for shaping operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors produced while marshaling a shaping request across the native boundary.
///
/// Glyph records that cannot be mapped back to a font or a character are not
/// errors: they are flagged on the decoded entry instead.
#[derive(Debug, Error)]
pub enum Error {
    /// The linear memory could not grow.
    #[error("out of memory: cannot grow the linear memory by {pages} page(s)")]
    OutOfMemory {
        /// Requested number of pages.
        pages: u32,
    },

    /// The native allocator returned a null pointer.
    #[error("allocation of {size} byte(s) failed")]
    AllocationFailed {
        /// Requested size in bytes.
        size: u32,
    },

    /// The native component rejected a font binary.
    #[error("font '{key}' is not a valid font")]
    InvalidFont {
        /// The caller's key for the font.
        key: String,
    },

    /// The layout call failed or produced an unusable glyph array.
    #[error("layout failed: {0}")]
    LayoutFailed(String),

    /// A read or write went past the end of the linear memory.
    ///
    /// The memory is not used again after this error.
    #[error("access of {len} byte(s) at {offset:#x} is outside of the {size} byte linear memory")]
    OutOfBoundsAccess {
        /// Start address of the access.
        offset: u32,
        /// Length of the access.
        len: u32,
        /// Linear memory size at the time of the access.
        size: usize,
    },

    /// A previous out-of-bounds access made the linear memory unusable.
    #[error("the linear memory is unusable after an out-of-bounds access")]
    RegionPoisoned,

    /// Session configuration happened before the text was set.
    #[error("session text is not set")]
    TextNotSet,

    /// The session text can only be set once.
    #[error("session text is already set")]
    TextAlreadySet,

    /// A font range does not fit the session text.
    #[error("range {start}+{len} does not fit a {text_len} byte text on character boundaries")]
    InvalidRange {
        /// Start byte.
        start: u32,
        /// Length in bytes.
        len: u32,
        /// Text length in bytes.
        text_len: u32,
    },

    /// A native entry point returned a failure status.
    #[error("native call '{0}' failed")]
    NativeCallFailed(&'static str),

    /// The native module does not export a required entry point.
    #[error("native module does not export '{0}'")]
    MissingExport(String),

    /// The native module trapped.
    #[error("native module trapped: {0}")]
    Trap(String),
}

#[cfg(feature = "wasm-shaper")]
impl From<wasmi::Error> for Error {
    fn from(e: wasmi::Error) -> Self {
        Error::Trap(e.to_string())
    }
}
