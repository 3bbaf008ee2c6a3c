pub const TAPPING_TERM: u16 = 0;
pub const PERMISSIVE_HOLD: u16 = 1;

pub const TAPPING_TERM_DEFAULT: u16 = 200;
pub const PERMISSIVE_HOLD_DEFAULT: bool = false;
