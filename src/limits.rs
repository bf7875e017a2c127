//! Input limits enforced at join time.

pub const MAX_NAME_LEN: usize = 256;
pub const MAX_EMAIL_LEN: usize = 320;
pub const MAX_PHONE_LEN: usize = 32;
pub const MAX_RESTAURANT_ID_LEN: usize = 64;
pub const MAX_PARTY_SIZE: u32 = 50;
pub const MAX_PREFERRED_TIMES: usize = 48;
