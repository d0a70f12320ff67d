//! Milestone thresholds worth revealing.
//!
//! The sequence is `1, 3, 5` and then `10, 25, 50` times every power of
//! ten: `10, 25, 50, 100, 250, 500, 1000, ...`. It grows roughly
//! geometrically, so each reveal point still means something at scale.

/// Iterator over the full milestone sequence, ascending, stopping before
/// `u64` overflow.
pub fn milestones() -> impl Iterator<Item = u64> {
    let small = [1u64, 3, 5].into_iter();
    let decades = (1u32..).map_while(|exp| 10u64.checked_pow(exp)).flat_map(|scale| {
        [10u64, 25, 50]
            .into_iter()
            .filter_map(move |step| step.checked_mul(scale / 10))
    });
    small.chain(decades)
}

/// Milestones `<= total_moment_count`, ascending. Empty for zero.
pub fn recommended_thresholds(total_moment_count: u64) -> Vec<u64> {
    milestones()
        .take_while(|&m| m <= total_moment_count)
        .collect()
}

/// The next milestone strictly above `count`, if any.
pub fn next_milestone(count: u64) -> Option<u64> {
    milestones().find(|&m| m > count)
}
