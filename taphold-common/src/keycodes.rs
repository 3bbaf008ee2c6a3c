pub mod key_range {
    pub const BASIC_MIN: u16 = 0x4;
    pub const BASIC_A: u16 = 0x4;
    pub const BASIC_1: u16 = 0x1e;
    pub const BASIC_0: u16 = 0x27;
    pub const BASIC_MAX: u16 = 0xdf;
    pub const MODIFIER_MIN: u16 = 0xe0;
    pub const MODIFIER_MAX: u16 = 0xe7;

    pub fn is_modifier(code: u16) -> bool {
        (MODIFIER_MIN..=MODIFIER_MAX).contains(&code)
    }

    pub fn is_basic(code: u16) -> bool {
        (BASIC_MIN..=BASIC_MAX).contains(&code)
    }
}

#[cfg(test)]
#[path = "keycodes_test.rs"]
mod test;
