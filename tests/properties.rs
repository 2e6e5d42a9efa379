//! Property tests for literal substitution.

use anchor_patch::{apply_rules, ApplyOptions, PatchRule};
use proptest::prelude::*;

proptest! {
    /// Anchors are built from letters the surrounding pieces never use, so
    /// the anchor occurs exactly `pieces.len() - 1` times with no overlap.
    #[test]
    fn every_occurrence_is_replaced(
        pieces in prop::collection::vec("[a-c]{1,8}", 1..6),
        anchor in "[x-z]{1,4}",
        replacement in "[a-z]{0,6}",
    ) {
        let mut text = pieces.join(&anchor);
        let expected_count = pieces.len() - 1;
        let rule = PatchRule::new("r", anchor.clone(), replacement.clone());

        let outcomes = apply_rules(&mut text, &[rule], &ApplyOptions::default()).unwrap();

        prop_assert_eq!(outcomes[0].occurrences(), expected_count);
        prop_assert_eq!(outcomes[0].matched(), expected_count > 0);
        prop_assert_eq!(text, pieces.join(&replacement));
    }

    #[test]
    fn absent_anchor_is_a_no_op(
        original in "[a-m \n]{0,40}",
        anchor in "[n-z]{1,6}",
        replacement in "[a-z]{0,6}",
    ) {
        let mut text = original.clone();
        let rule = PatchRule::new("r", anchor, replacement);

        let outcomes = apply_rules(&mut text, &[rule], &ApplyOptions::default()).unwrap();

        prop_assert!(!outcomes[0].matched());
        prop_assert_eq!(outcomes[0].occurrences(), 0);
        prop_assert_eq!(text.as_bytes(), original.as_bytes());
    }

    #[test]
    fn matched_iff_occurrences(
        text in "[ab]{0,12}",
        anchor in "[ab]{1,3}",
    ) {
        let mut working = text.clone();
        let rule = PatchRule::new("r", anchor.clone(), "-");

        let outcomes = apply_rules(&mut working, &[rule], &ApplyOptions::default()).unwrap();

        prop_assert_eq!(outcomes[0].matched(), outcomes[0].occurrences() > 0);
        prop_assert_eq!(outcomes[0].occurrences(), text.matches(anchor.as_str()).count());
    }
}
