use crate::overlay::token::OverlayToken;

/// Group id value marking an unoccupied cache slot. Never a real group.
pub const EMPTY_SLOT_GROUP_ID: u16 = 0xffff;

/// One overlay group: a relocatable unit of code/data pageable into the cache.
///
/// Groups are numbered by their position in the group table; the table encodes each
/// group's storage placement as a scaled offset, which the loader resolves into the
/// absolute `base_address` here.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct OverlayGroup {
    id: u16,
    base_address: u32,
    size_bytes: u32,
}

impl OverlayGroup {
    pub(crate) fn new(id: u16, base_address: u32, size_bytes: u32) -> Self {
        OverlayGroup {
            id,
            base_address,
            size_bytes,
        }
    }

    /// The group number; its index in the group table.
    #[must_use]
    pub fn id(&self) -> u16 {
        self.id
    }

    /// Absolute storage address of the group's first byte.
    #[must_use]
    pub fn base_address(&self) -> u32 {
        self.base_address
    }

    /// Size of the group in bytes; always a multiple of the cache entry size.
    #[must_use]
    pub fn size_bytes(&self) -> u32 {
        self.size_bytes
    }

    /// First storage address past the group.
    #[must_use]
    pub fn end_address(&self) -> u32 {
        self.base_address + self.size_bytes
    }
}

/// One member of a multi-group: a plain token resolved against the group table.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct MultiGroupMember {
    token: OverlayToken,
    group_id: u16,
    func_offset_bytes: u32,
}

impl MultiGroupMember {
    pub(crate) fn new(token: OverlayToken) -> Self {
        MultiGroupMember {
            token,
            group_id: token.group_id(),
            func_offset_bytes: token.func_offset_bytes(),
        }
    }

    /// The member's plain overlay token.
    #[must_use]
    pub fn token(&self) -> OverlayToken {
        self.token
    }

    /// The overlay group this member's function lives in.
    #[must_use]
    pub fn group_id(&self) -> u16 {
        self.group_id
    }

    /// Offset of the function within its group, in bytes.
    #[must_use]
    pub fn func_offset_bytes(&self) -> u32 {
        self.func_offset_bytes
    }
}

/// A multi-group: interchangeable aliases of one logical function across groups.
///
/// The linker emits a multi-group when the same function was duplicated into several
/// overlay groups; a multi-group token then resolves at call time to whichever copy
/// is cheapest to use. All members refer to the same code block, so they share one
/// function size.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct MultiGroup {
    number: u16,
    index: u16,
    members: Vec<MultiGroupMember>,
    function_size_bytes: u32,
    function_name: Option<String>,
}

impl MultiGroup {
    pub(crate) fn new(
        number: u16,
        index: u16,
        members: Vec<MultiGroupMember>,
        function_size_bytes: u32,
    ) -> Self {
        MultiGroup {
            number,
            index,
            members,
            function_size_bytes,
            function_name: None,
        }
    }

    /// The multi-group number; its position among the multi-groups.
    #[must_use]
    pub fn number(&self) -> u16 {
        self.number
    }

    /// Flat multi-group-table index of this multi-group's first member.
    ///
    /// Overlay stack records store member positions relative to the flat table, so
    /// this is what frame indices resolve against.
    #[must_use]
    pub fn index(&self) -> u16 {
        self.index
    }

    /// The members, in table order.
    #[must_use]
    pub fn members(&self) -> &[MultiGroupMember] {
        &self.members
    }

    /// Size in bytes of the shared function, identical across members.
    #[must_use]
    pub fn function_size_bytes(&self) -> u32 {
        self.function_size_bytes
    }

    /// Human-readable name of the shared function, when the front-end supplied one.
    #[must_use]
    pub fn function_name(&self) -> Option<&str> {
        self.function_name.as_deref()
    }

    /// Attach the function name resolved by the front-end.
    pub fn set_function_name(&mut self, name: impl Into<String>) {
        self.function_name = Some(name.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_addresses() {
        let group = OverlayGroup::new(2, 0x9000_0400, 0x600);
        assert_eq!(group.id(), 2);
        assert_eq!(group.base_address(), 0x9000_0400);
        assert_eq!(group.end_address(), 0x9000_0a00);
    }

    #[test]
    fn test_member_field_extraction() {
        let token = OverlayToken::from_parts(9, 0x10, false);
        let member = MultiGroupMember::new(token);
        assert_eq!(member.group_id(), 9);
        assert_eq!(member.func_offset_bytes(), 0x10);
        assert_eq!(member.token(), token);
    }

    #[test]
    fn test_multi_group_accessors() {
        let members = vec![
            MultiGroupMember::new(OverlayToken::from_parts(1, 0, false)),
            MultiGroupMember::new(OverlayToken::from_parts(4, 0, false)),
        ];
        let mut mg = MultiGroup::new(0, 0, members, 0x200);
        assert_eq!(mg.members().len(), 2);
        assert_eq!(mg.function_size_bytes(), 0x200);
        assert!(mg.function_name().is_none());

        mg.set_function_name("render_tile");
        assert_eq!(mg.function_name(), Some("render_tile"));
    }
}
