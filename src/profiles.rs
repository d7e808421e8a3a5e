//! Splitting a segment into profiles (single dives or climbs) and filling
//! GPS positions between fixes.

use log::debug;
use std::ops::Range;

/// Thresholds for turning-point detection and for discarding spurious
/// profiles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfileParams {
    /// Depth reversal (m) needed to confirm a turning point.
    pub min_reversal:   f64,
    /// Profiles spanning less depth than this (m) are merged into the next.
    pub min_depth_span: f64,
    /// Profiles with fewer depth readings are merged into the next.
    pub min_points:     usize,
}

impl Default for ProfileParams {
    fn default() -> Self {
        ProfileParams { min_reversal: 1.0, min_depth_span: 2.0, min_points: 3 }
    }
}

/// Row ranges of each profile. The ranges are contiguous and together
/// cover every row; a series with no detectable profile is one range.
///
/// `depth` holds `fill` (or NaN) where no depth was reported.
pub fn split_profiles(depth: &[f64], fill: f64, params: &ProfileParams) -> Vec<Range<usize>> {
    let n = depth.len();
    if n == 0 {
        return Vec::new();
    }
    let valid: Vec<(usize, f64)> = depth
        .iter()
        .copied()
        .enumerate()
        .filter(|&(_, d)| !d.is_nan() && d != fill)
        .collect();
    if valid.len() < 2 {
        return vec![0..n];
    }

    // ---------------- turning points ----------------
    // track the running extreme; once depth reverses past it by
    // `min_reversal`, the extreme becomes a profile boundary
    let mut extrema: Vec<usize> = vec![valid[0].0];
    let mut direction = 0i8;
    let (mut ext_row, mut ext_depth) = valid[0];
    for &(row, d) in &valid[1..] {
        match direction {
            0 => {
                if (d - ext_depth).abs() >= params.min_reversal {
                    direction = if d > ext_depth { 1 } else { -1 };
                    ext_row = row;
                    ext_depth = d;
                }
            }
            1 if d >= ext_depth => {
                ext_row = row;
                ext_depth = d;
            }
            -1 if d <= ext_depth => {
                ext_row = row;
                ext_depth = d;
            }
            _ if (d - ext_depth).abs() >= params.min_reversal => {
                extrema.push(ext_row);
                direction = -direction;
                ext_row = row;
                ext_depth = d;
            }
            _ => {}
        }
    }
    let last_valid = valid[valid.len() - 1].0;
    if *extrema.last().unwrap_or(&0) != last_valid {
        extrema.push(last_valid);
    }

    // ---------------- filter ----------------
    // each profile ends at an extremum (inclusive); short or shallow ones
    // are folded into the following profile
    let mut ends: Vec<usize> = Vec::new();
    let mut start_ext = extrema[0];
    for &end_ext in &extrema[1..] {
        let span: Vec<f64> = valid
            .iter()
            .filter(|&&(row, _)| row >= start_ext && row <= end_ext)
            .map(|&(_, d)| d)
            .collect();
        let (lo, hi) = span
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &d| (lo.min(d), hi.max(d)));
        if span.len() >= params.min_points && hi - lo >= params.min_depth_span {
            ends.push(end_ext);
        }
        start_ext = end_ext;
    }

    let mut ranges = Vec::with_capacity(ends.len().max(1));
    let mut start = 0;
    for end in ends {
        if end + 1 > start {
            ranges.push(start..end + 1);
            start = end + 1;
        }
    }
    match ranges.last_mut() {
        Some(last) if start < n => last.end = n,
        Some(_) => {}
        None => ranges.push(0..n),
    }
    debug!("split {n} rows into {} profiles", ranges.len());
    ranges
}

/// Linearly interpolates `lat`/`lon` between valid fixes, in place. Rows
/// before the first or after the last fix take that fix. Without any fix
/// the columns are left untouched.
pub fn interpolate_gps(time: &[f64], lat: &mut [f64], lon: &mut [f64], fill: f64) {
    let is_fix = |la: f64, lo: f64| !la.is_nan() && la != fill && !lo.is_nan() && lo != fill;
    let fixes: Vec<usize> = (0..time.len()).filter(|&i| is_fix(lat[i], lon[i])).collect();
    let (Some(&first), Some(&last)) = (fixes.first(), fixes.last()) else {
        return;
    };

    for i in 0..first {
        lat[i] = lat[first];
        lon[i] = lon[first];
    }
    for i in last + 1..time.len() {
        lat[i] = lat[last];
        lon[i] = lon[last];
    }
    for pair in fixes.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        let dt = time[b] - time[a];
        for i in a + 1..b {
            let w = if dt > 0.0 { (time[i] - time[a]) / dt } else { 0.0 };
            lat[i] = lat[a] + w * (lat[b] - lat[a]);
            lon[i] = lon[a] + w * (lon[b] - lon[a]);
        }
    }
}

/// Value of `values` at time `t`, linear between the valid samples around
/// it and held flat past either end. `None` when no sample is valid.
pub fn value_at(time: &[f64], values: &[f64], t: f64, fill: f64) -> Option<f64> {
    let valid: Vec<(f64, f64)> = time
        .iter()
        .zip(values)
        .filter(|&(_, &v)| !v.is_nan() && v != fill)
        .map(|(&ti, &v)| (ti, v))
        .collect();
    let (&(t0, v0), &(tn, vn)) = (valid.first()?, valid.last()?);
    if t <= t0 {
        return Some(v0);
    }
    if t >= tn {
        return Some(vn);
    }
    let b = valid.partition_point(|&(ti, _)| ti <= t);
    let ((ta, va), (tb, vb)) = (valid[b - 1], valid[b]);
    let w = if tb > ta { (t - ta) / (tb - ta) } else { 0.0 };
    Some(va + w * (vb - va))
}
