use std::fmt;

/// An overlay token, the opaque 32-bit handle callers use to invoke overlaid code.
///
/// Tokens encode either a direct code address or an overlay reference:
/// - Bit 0 is the overlay indication; when clear the value is a plain address and
///   none of the other fields apply
/// - Bits 16..1 hold the overlay group id (or the multi-group id when bit 31 is set)
/// - Bits 26..17 hold the function offset within the group, in 4-byte units
/// - Bit 31 marks a multi-group token, which resolves through the multi-group table
///   to one of several interchangeable plain tokens
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OverlayToken(pub u32);

impl OverlayToken {
    /// Creates a new token from a raw 32-bit value
    #[must_use]
    pub fn new(value: u32) -> Self {
        OverlayToken(value)
    }

    /// Builds a plain overlay token from its fields.
    ///
    /// `func_offset_bytes` must be 4-byte aligned and below 4 KiB; the excess bits
    /// are truncated to the 10-bit field, matching the table encoding.
    #[must_use]
    pub fn from_parts(group_id: u16, func_offset_bytes: u32, multi_group: bool) -> Self {
        let mut value = 1u32;
        value |= u32::from(group_id) << 1;
        value |= ((func_offset_bytes / 4) & 0x3ff) << 17;
        if multi_group {
            value |= 1 << 31;
        }
        OverlayToken(value)
    }

    /// Returns the raw token value
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Returns true if this is a null token (value 0)
    ///
    /// A null token terminates a multi-group in the flat table.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Whether the overlay indication (bit 0) is set.
    ///
    /// A value with bit 0 clear is a direct code address, not a token.
    #[must_use]
    pub fn is_overlay(&self) -> bool {
        self.0 & 1 != 0
    }

    /// Whether this token refers to a multi-group (bit 31).
    #[must_use]
    pub fn is_multi_group(&self) -> bool {
        self.0 & (1 << 31) != 0
    }

    /// The overlay group id, or the multi-group id when [`Self::is_multi_group`].
    #[must_use]
    pub fn group_id(&self) -> u16 {
        ((self.0 >> 1) & 0xffff) as u16
    }

    /// The function offset within the group, in bytes.
    ///
    /// Stored as a 10-bit count of 4-byte units.
    #[must_use]
    pub fn func_offset_bytes(&self) -> u32 {
        ((self.0 >> 17) & 0x3ff) * 4
    }
}

impl From<u32> for OverlayToken {
    fn from(value: u32) -> Self {
        OverlayToken(value)
    }
}

impl From<OverlayToken> for u32 {
    fn from(token: OverlayToken) -> Self {
        token.0
    }
}

impl fmt::Debug for OverlayToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_overlay() {
            write!(
                f,
                "OverlayToken(0x{:08x}, {}: {}, offset: 0x{:x})",
                self.0,
                if self.is_multi_group() {
                    "multi-group"
                } else {
                    "group"
                },
                self.group_id(),
                self.func_offset_bytes()
            )
        } else {
            write!(f, "OverlayToken(0x{:08x}, address)", self.0)
        }
    }
}

impl fmt::Display for OverlayToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}
