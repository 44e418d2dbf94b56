//! A/B variant selection for sequence steps.
//!
//! Selection is stateless and re-rolled on every send. Leads are not pinned
//! to an arm: the same lead can get the original on one step and a variant
//! on the next.

use rand::Rng;

use crate::models::{Step, StepContent};

/// The outcome of a selection: content to render plus the arm label
/// recorded for stats.
#[derive(Debug, Clone)]
pub struct Selection {
    pub content: StepContent,
    pub variant_tag: String,
}

/// Pick the step's own content or one of its variants, uniformly at random.
/// Each of the N variants plus the original gets probability 1/(N+1).
pub fn select(step: &Step, rng: &mut impl Rng) -> Selection {
    if step.variants.is_empty() {
        return Selection {
            content: step.content(),
            variant_tag: "A".to_string(),
        };
    }

    let roll: f64 = rng.r#gen();
    match pick_index(roll, step.variants.len()) {
        None => Selection {
            content: step.content(),
            variant_tag: "A".to_string(),
        },
        Some(index) => {
            let variant = &step.variants[index];
            Selection {
                content: variant.content(),
                variant_tag: variant.name.clone(),
            }
        }
    }
}

/// Map a uniform roll in [0,1) to an arm: None for the original, Some(i) for
/// variant i. Rolls at or below 1/(N+1) keep the original; the rest of the
/// interval is scaled evenly across the variants. An index that rounds up to
/// N wraps to 0.
fn pick_index(roll: f64, n: usize) -> Option<usize> {
    let threshold = 1.0 / (n as f64 + 1.0);
    if roll <= threshold {
        return None;
    }
    let index = (((roll - threshold) / (1.0 - threshold)) * n as f64).floor() as usize;
    Some(if index >= n { 0 } else { index })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Variant;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use uuid::Uuid;

    fn step_with_variants(names: &[&str]) -> Step {
        let mut step = Step::new(Uuid::new_v4(), 1, "Original subject", "Original body");
        let variants = names
            .iter()
            .map(|name| {
                Variant::new(
                    step.id,
                    *name,
                    format!("{name} subject"),
                    format!("{name} body"),
                )
            })
            .collect();
        step = step.with_variants(variants);
        step
    }

    #[test]
    fn no_variants_always_original() {
        let step = step_with_variants(&[]);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let selection = select(&step, &mut rng);
            assert_eq!(selection.variant_tag, "A");
            assert_eq!(selection.content.subject, "Original subject");
        }
    }

    #[test]
    fn pick_index_boundaries() {
        // Two variants: threshold is 1/3
        assert_eq!(pick_index(0.0, 2), None);
        assert_eq!(pick_index(1.0 / 3.0, 2), None);
        assert_eq!(pick_index(0.34, 2), Some(0));
        assert_eq!(pick_index(0.67, 2), Some(1));
        assert_eq!(pick_index(0.999, 2), Some(1));
        // An overflowing index wraps to the first variant
        assert_eq!(pick_index(1.0, 2), Some(0));
    }

    #[test]
    fn arms_are_roughly_uniform() {
        let step = step_with_variants(&["B", "C"]);
        let mut rng = StdRng::seed_from_u64(42);

        let mut counts = std::collections::HashMap::new();
        let draws = 9000;
        for _ in 0..draws {
            let selection = select(&step, &mut rng);
            *counts.entry(selection.variant_tag).or_insert(0usize) += 1;
        }

        // Each of A, B, C expects draws/3; allow 10% drift
        let expected = draws / 3;
        let tolerance = expected / 10;
        for tag in ["A", "B", "C"] {
            let count = counts.get(tag).copied().unwrap_or(0);
            assert!(
                count.abs_diff(expected) < tolerance,
                "arm {tag} drew {count}, expected ~{expected}"
            );
        }
    }

    #[test]
    fn selection_is_rerolled_per_call() {
        let step = step_with_variants(&["B"]);
        let mut rng = StdRng::seed_from_u64(3);

        let tags: std::collections::HashSet<String> =
            (0..50).map(|_| select(&step, &mut rng).variant_tag).collect();
        assert!(tags.len() > 1, "expected both arms across 50 rolls");
    }

    #[test]
    fn variant_selection_carries_variant_content() {
        let step = step_with_variants(&["B"]);
        let mut rng = StdRng::seed_from_u64(1);

        // Roll until the variant arm comes up
        let selection = std::iter::repeat_with(|| select(&step, &mut rng))
            .find(|s| s.variant_tag == "B")
            .unwrap();
        assert_eq!(selection.content.subject, "B subject");
        assert_eq!(selection.content.body, "B body");
    }
}
