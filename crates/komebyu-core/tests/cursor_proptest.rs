use komebyu_core::normalize_at;
use proptest::prelude::*;

proptest! {
    #[test]
    fn second_valued_cursors_are_unchanged(at in 0_i64..1_000_000_000_000) {
        prop_assert_eq!(normalize_at(at), at);
    }

    #[test]
    fn millisecond_valued_cursors_become_seconds(
        seconds in 1_000_000_000_i64..4_000_000_000,
        millis in 0_i64..1000,
    ) {
        let at = seconds * 1000 + millis;
        prop_assert_eq!(normalize_at(at), seconds);
    }
}
