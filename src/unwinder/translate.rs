//! Cache-to-storage return address translation.
//!
//! A return address saved on the overlay stack points at wherever the caller's group
//! sat in the cache when the call was made. By the time the backtrace runs, that
//! slot may hold a different group entirely - the address is only meaningful once
//! mapped back to the group's fixed storage placement, which is what debug
//! information describes.

use crate::overlay::{EngineConfig, OverlayStackFrame, ParsedSnapshot};
use crate::Result;

/// Translate the cache-resident return address `ra` back to its storage equivalent.
///
/// `frame` is the overlay stack record whose return-address field produced `ra`; its
/// token identifies the group, its alignment field the right-shift the group was
/// loaded with, and its multi-group index disambiguates multi-group tokens.
///
/// The modular term recovers the function-relative offset the processor actually
/// reached inside the cache copy: the whole group was shifted by the recorded
/// alignment when it was copied into its slot, and group offsets wrap within the
/// configured maximum group size.
///
/// # Errors
/// [`Error::Usage`](crate::Error::Usage) when `ra` is not a cache address or the
/// frame's token is not an overlay token;
/// [`Error::StackCorruption`](crate::Error::StackCorruption) /
/// [`Error::Malformed`](crate::Error::Malformed) when a multi-group token does not
/// resolve.
pub fn translate_return_address(
    snapshot: &ParsedSnapshot,
    config: &EngineConfig,
    frame: &OverlayStackFrame,
    ra: u32,
) -> Result<u32> {
    if !snapshot.cache().region().contains(ra) {
        return Err(crate::Error::Usage(format!(
            "address {ra:#010x} is not inside the overlay cache {}",
            snapshot.cache().region()
        )));
    }
    if !frame.token().is_overlay() {
        return Err(crate::Error::Usage(format!(
            "frame at {:#010x} holds a direct address, not an overlay token",
            frame.frame_address()
        )));
    }

    let token = snapshot.resolve_token(frame.token(), frame.multi_group_index())?;
    let group = snapshot.group(token.group_id())?;

    let func_offset = token.func_offset_bytes();
    let alignment = frame.alignment_bytes(config);
    let max_group_size = config.max_group_size_bytes();

    let group_offset = func_offset.wrapping_add(
        ra.wrapping_sub(func_offset)
            .wrapping_sub(alignment)
            % max_group_size,
    );

    Ok(group.base_address().wrapping_add(group_offset))
}
