//! Effect flags carried on fibers and hook effects.

use bitflags::bitflags;

bitflags! {
    /// What commit has to do for a fiber.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Flags: u32 {
        /// Insert or move the host nodes of this fiber.
        const PLACEMENT      = 1 << 1;
        /// Apply a host update, or run layout effects for function components.
        const UPDATE         = 1 << 2;
        /// `deletions` holds children to remove.
        const CHILD_DELETION = 1 << 4;
        /// Clear direct text content before placing fiber children.
        const CONTENT_RESET  = 1 << 5;
        /// Passive effects are pending.
        const PASSIVE        = 1 << 11;

        const MUTATION_MASK = Self::PLACEMENT.bits()
            | Self::UPDATE.bits()
            | Self::CHILD_DELETION.bits()
            | Self::CONTENT_RESET.bits();
    }
}

bitflags! {
    /// Tag of a hook effect.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct HookFlags: u8 {
        /// The effect must fire in this commit.
        const HAS_EFFECT = 0b0001;
        /// `use_layout_effect`.
        const LAYOUT     = 0b0100;
        /// `use_effect`.
        const PASSIVE    = 0b1000;
    }
}
