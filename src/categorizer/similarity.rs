//! Partial-ratio string similarity.
//!
//! The shorter string is slid across the longer one; each equally long
//! window is scored with the Indel similarity `2 * LCS / (len_a + len_b)`
//! and the best window wins. Scores are in `[0, 100]`.

/// Case-insensitive partial ratio between `a` and `b`.
///
/// Symmetric in its arguments. Returns 0 when either string is empty.
pub fn partial_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.to_lowercase().chars().collect();
    let b: Vec<char> = b.to_lowercase().chars().collect();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let (short, long) = if a.len() <= b.len() { (&a, &b) } else { (&b, &a) };

    // Every window has the same length, so the DP rows are allocated once.
    let mut previous = vec![0usize; short.len() + 1];
    let mut current = vec![0usize; short.len() + 1];
    let mut best = 0;
    for window in long.windows(short.len()) {
        best = best.max(lcs_len(short, window, &mut previous, &mut current));
        if best == short.len() {
            break;
        }
    }

    // Both sides have short.len() chars, so 200 * lcs / (2 * len) reduces to this.
    // Integer numerator keeps round scores like 90 exact.
    (100 * best) as f64 / short.len() as f64
}

/// Length of the longest common subsequence. `previous` and `current` are
/// scratch rows of length `b.len() + 1`.
fn lcs_len<'r>(a: &[char], b: &[char], mut previous: &'r mut [usize], mut current: &'r mut [usize]) -> usize {
    previous.fill(0);
    current.fill(0);
    for &ca in a {
        for (j, &cb) in b.iter().enumerate() {
            current[j + 1] = if ca == cb {
                previous[j] + 1
            } else {
                current[j].max(previous[j + 1])
            };
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}
