//! Exit statuses from BSD `<sysexits.h>`. libc only exports these for the
//! BSDs and Apple targets.

pub const EX_OK: i32 = 0;
pub const EX_USAGE: i32 = 64;
pub const EX_NOINPUT: i32 = 66;
pub const EX_UNAVAILABLE: i32 = 69;
pub const EX_OSERR: i32 = 71;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_match_sysexits_h() {
        assert_eq!(
            [EX_OK, EX_USAGE, EX_NOINPUT, EX_UNAVAILABLE, EX_OSERR],
            [0, 64, 66, 69, 71]
        );
    }
}
