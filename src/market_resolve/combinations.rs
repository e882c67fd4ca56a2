// ============================================================================
// Cross-product option generation for composite markets
// ============================================================================
//
// Combined options are enumerated by nested iteration over the referenced
// topics in reference order, the first topic varying slowest. A combination
// is therefore a mixed-radix number whose digits are the per-topic option
// indices, most significant digit first.
//
// ============================================================================

use crate::models::Topic;

/// Joins the per-topic parts of one combined option
pub const COMBINATION_SEPARATOR: &str = " & ";

/// Number of combinations for the given per-topic option counts, or `None`
/// on overflow.
pub fn combination_count(option_counts: &[usize]) -> Option<usize> {
    option_counts
        .iter()
        .try_fold(1usize, |acc, count| acc.checked_mul(*count))
}

/// Label of one topic's contribution to a combined option
pub fn option_label(topic: &Topic, option_index: usize) -> String {
    format!("{}: {}", topic.title, topic.options[option_index])
}

/// Every combined option, in cross-product order.
pub fn combine_options(topics: &[&Topic]) -> Vec<String> {
    let mut combinations: Vec<Vec<String>> = vec![Vec::new()];

    for topic in topics {
        let mut next = Vec::with_capacity(combinations.len() * topic.options.len());
        for combo in &combinations {
            for option_index in 0..topic.options.len() {
                let mut extended = combo.clone();
                extended.push(option_label(topic, option_index));
                next.push(extended);
            }
        }
        combinations = next;
    }

    combinations
        .into_iter()
        .map(|parts| parts.join(COMBINATION_SEPARATOR))
        .collect()
}

/// Index into the combined options of the given per-topic outcomes.
///
/// Returns `None` if the lengths differ or an outcome is out of range.
pub fn combination_index(option_counts: &[usize], outcomes: &[usize]) -> Option<usize> {
    if option_counts.len() != outcomes.len() {
        return None;
    }
    option_counts
        .iter()
        .zip(outcomes)
        .try_fold(0usize, |acc, (count, outcome)| {
            if outcome >= count {
                return None;
            }
            acc.checked_mul(*count)?.checked_add(*outcome)
        })
}

/// Inverse of [`combination_index`]: per-topic outcomes of a combined index.
pub fn combination_outcomes(option_counts: &[usize], mut index: usize) -> Option<Vec<usize>> {
    let mut outcomes = vec![0; option_counts.len()];
    for (slot, count) in outcomes.iter_mut().zip(option_counts).rev() {
        if *count == 0 {
            return None;
        }
        *slot = index % count;
        index /= count;
    }
    (index == 0).then_some(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::HashSet;

    fn topic(title: &str, options: &[&str]) -> Topic {
        Topic::new(
            1,
            "ALICE".into(),
            title.into(),
            options.iter().map(|o| o.to_string()).collect(),
            dec!(1),
            0,
        )
    }

    #[test]
    fn test_first_topic_varies_slowest() {
        let a = topic("Rain", &["Yes", "No"]);
        let b = topic("Team", &["Red", "Blue", "Draw"]);
        let combined = combine_options(&[&a, &b]);

        assert_eq!(combined.len(), 6);
        assert_eq!(combined[0], "Rain: Yes & Team: Red");
        assert_eq!(combined[1], "Rain: Yes & Team: Blue");
        assert_eq!(combined[2], "Rain: Yes & Team: Draw");
        assert_eq!(combined[3], "Rain: No & Team: Red");
        assert_eq!(combined[5], "Rain: No & Team: Draw");
    }

    #[test]
    fn test_cross_product_completeness() {
        let a = topic("A", &["a0", "a1"]);
        let b = topic("B", &["b0", "b1", "b2"]);
        let c = topic("C", &["c0", "c1", "c2", "c3"]);
        let combined = combine_options(&[&a, &b, &c]);

        assert_eq!(combined.len(), 2 * 3 * 4);
        assert_eq!(combination_count(&[2, 3, 4]), Some(24));
        let unique: HashSet<&String> = combined.iter().collect();
        assert_eq!(unique.len(), combined.len());
    }

    #[test]
    fn test_index_matches_enumeration_order() {
        let a = topic("A", &["a0", "a1"]);
        let b = topic("B", &["b0", "b1", "b2"]);
        let c = topic("C", &["c0", "c1"]);
        let topics = [&a, &b, &c];
        let counts = [2, 3, 2];
        let combined = combine_options(&topics);

        for (index, label) in combined.iter().enumerate() {
            let outcomes = combination_outcomes(&counts, index).unwrap();
            assert_eq!(combination_index(&counts, &outcomes), Some(index));

            let expected: Vec<String> = topics
                .iter()
                .zip(&outcomes)
                .map(|(t, o)| option_label(t, *o))
                .collect();
            assert_eq!(*label, expected.join(COMBINATION_SEPARATOR));
        }
    }

    #[test]
    fn test_index_rejects_bad_outcomes() {
        assert_eq!(combination_index(&[2, 3], &[0, 3]), None);
        assert_eq!(combination_index(&[2, 3], &[1]), None);
        assert_eq!(combination_outcomes(&[2, 3], 6), None);
    }

    #[test]
    fn test_count_overflow() {
        assert_eq!(combination_count(&[usize::MAX, 2]), None);
    }
}
