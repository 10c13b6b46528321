pub mod attendance;
pub mod class;
pub mod student;
pub mod teacher;

/// Mobile numbers are exactly 10 ASCII digits everywhere in this API.
pub(crate) fn is_valid_mobile(value: &str) -> bool {
    value.len() == 10 && value.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod mobile_validation {
    use super::is_valid_mobile;

    #[test]
    fn accepts_ten_digits() {
        assert!(is_valid_mobile("0123456789"));
    }

    #[test]
    fn rejects_wrong_lengths_and_non_digits() {
        assert!(!is_valid_mobile("012345678"));
        assert!(!is_valid_mobile("01234567890"));
        assert!(!is_valid_mobile("01234s6789"));
        assert!(!is_valid_mobile("+123456789"));
    }
}
