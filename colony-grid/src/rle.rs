//! Run-length decoding for index grids.

/// One `(count, value)` pair as sent on the wire.
pub type Run = (u32, u32);

/// Expand `runs` into a dense array of exactly `expected_len` entries.
///
/// Runs past `expected_len` are truncated and a short input leaves the tail
/// zero-filled. Malformed input never panics and never errors: the result is
/// always a best-effort fill of the requested length.
pub fn decode(runs: &[Run], expected_len: usize) -> Vec<u32> {
    let mut out = Vec::with_capacity(expected_len);

    for &(count, value) in runs {
        let remaining = expected_len - out.len();
        if remaining == 0 {
            break;
        }
        let take = (count as usize).min(remaining);
        out.extend(std::iter::repeat(value).take(take));
    }

    out.resize(expected_len, 0);
    out
}
