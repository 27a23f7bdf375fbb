use crate::model::Slot;

/// Minutes covered by one slot index.
pub const SLOT_MINUTES: u32 = 5;

/// Slot indices in a day; a valid range lies within `[0, SLOTS_PER_DAY]`.
pub const SLOTS_PER_DAY: Slot = (24 * 60 / SLOT_MINUTES) as Slot;

/// Upper bound on the slots one service may consume (a full day).
pub const MAX_REQUIRED_SLOTS: u32 = SLOTS_PER_DAY as u32;

pub const MAX_NAME_LEN: usize = 120;
pub const MAX_PHONE_LEN: usize = 32;
pub const MIN_PHONE_DIGITS: usize = 8;
pub const MAX_PHONE_DIGITS: usize = 15;
pub const MAX_NOTES_LEN: usize = 500;
pub const MAX_SEARCH_LEN: usize = 120;
