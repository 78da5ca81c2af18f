use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// The variants map one-to-one onto the failure classes of the overlay reconstruction
/// pipeline: collaborator access, snapshot (table) construction, live-state walking and
/// stack unwinding. Parse-time errors abort snapshot construction and never replace a
/// previously cached snapshot; unwinding errors abort only the current unwind step.
///
/// # Error Categories
///
/// ## Lifecycle
/// - [`Error::NotInitialized`] - The overlay engine has not loaded its tables yet; retry later
///
/// ## Snapshot construction
/// - [`Error::OutOfBounds`] - A table read would cross its computed end boundary
/// - [`Error::Malformed`] - Corrupted table or control-block contents
/// - [`Error::UnsupportedConfiguration`] - Engine build options this library cannot handle
/// - [`Error::SymbolMissing`] - A required symbol could not be resolved
///
/// ## Live state access
/// - [`Error::Memory`] - The collaborator failed to read target memory
/// - [`Error::Register`] - The collaborator failed to read a register
///
/// ## Unwinding
/// - [`Error::StackCorruption`] - The overlay stack does not terminate or holds non-token data
/// - [`Error::Usage`] - An operation was invoked on values outside its domain
///
/// ## I/O and External Errors
/// - [`Error::FileError`] - Filesystem I/O errors (snapshot-file hosts)
/// - [`Error::GoblinErr`] - ELF parsing errors from the goblin crate
#[derive(Error, Debug)]
pub enum Error {
    /// The overlay engine has not initialised its tables yet.
    ///
    /// Any read attempted before the engine signals initialisation fails with this
    /// error. It is recoverable: the caller should retry after the engine's event
    /// breakpoint has fired.
    #[error("Overlay engine is not initialised yet")]
    NotInitialized,

    /// An out of bound access was attempted while parsing the overlay tables.
    ///
    /// A table read would have crossed the boundary implied by the tables page or
    /// the multi-group table offset. The snapshot build aborts; a previously cached
    /// snapshot stays untouched.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// The overlay tables or control block are damaged and could not be parsed.
    ///
    /// The error includes the source location where the malformation was detected
    /// for debugging purposes.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// The engine was built with options this library does not support.
    ///
    /// Raised for an unknown eviction policy byte, or a multi-group index field
    /// offset other than 11 or 14. Detected before any table parsing is attempted.
    #[error("Unsupported engine configuration: {0}")]
    UnsupportedConfiguration(String),

    /// The overlay stack does not unwind to a recognisable state.
    ///
    /// Raised when walking the overlay stack reaches neither the bottom sentinel
    /// nor a genuine return address within the bounded number of hops, or when a
    /// record's token field does not carry the overlay indication where a token
    /// is required.
    #[error("Overlay stack corruption: {0}")]
    StackCorruption(String),

    /// An operation was invoked on values outside its domain.
    ///
    /// For example address translation on an address that is not inside the cache
    /// region, or on a token whose overlay bit is clear.
    #[error("Usage error: {0}")]
    Usage(String),

    /// The collaborator failed to read target memory.
    ///
    /// Carries the address and length of the failed read so the front-end can
    /// report which access was rejected by the target.
    #[error("Failed to read {length} bytes of target memory at {address:#010x}")]
    Memory {
        /// Start address of the failed read
        address: u32,
        /// Number of bytes requested
        length: usize,
    },

    /// The collaborator failed to read a register.
    #[error("Failed to read register '{0}'")]
    Register(String),

    /// A required symbol could not be resolved by the collaborator.
    ///
    /// The overlay engine's control block fields, region bounds and code labels
    /// are located by name; a missing one means the image was built without the
    /// engine or without symbols.
    #[error("Failed to resolve required symbol '{0}'")]
    SymbolMissing(String),

    /// File I/O error.
    ///
    /// Wraps standard I/O errors that can occur while opening or mapping a
    /// memory-snapshot file.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Error from the goblin crate during ELF parsing.
    ///
    /// The goblin crate is used to index the firmware ELF's symbol table.
    /// This error wraps any failures from that parsing layer.
    #[error("{0}")]
    GoblinErr(#[from] goblin::error::Error),
}
