/// clamp limits x to the closed interval [lo, hi]. NaN is mapped to lo so that a malformed value
/// can never leak into the simulation state.
pub fn clamp(x: f64, lo: f64, hi: f64) -> f64 {
    if x.is_nan() {
        return lo;
    }
    x.max(lo).min(hi)
}

/// round_to rounds x to the given number of decimals (halfway cases away from zero).
pub fn round_to(x: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (x * factor).round() / factor
}

/// argmin returns the index of the minimum value in the array x, None for an empty array. On
/// ties the first occurrence wins.
pub fn argmin<T: PartialOrd + Copy>(x: &[T]) -> Option<usize> {
    let mut iter = x.iter().enumerate();
    let (mut idx_min, &first) = iter.next()?;
    let mut val_min = first;

    for (i, &val) in iter {
        if val < val_min {
            val_min = val;
            idx_min = i;
        }
    }

    Some(idx_min)
}
