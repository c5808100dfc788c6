//! Individual preprocessing steps

pub mod color;
pub mod contrast;
pub mod denoise;
pub mod grayscale;
pub mod morphology;
pub mod threshold;

/// Map a possibly out-of-range coordinate into `0..len`, mirroring about the
/// edge samples without repeating them (`dcb|abcd|cba`).
pub(crate) fn reflect_101(i: i64, len: usize) -> usize {
    let n = len as i64;
    if n <= 1 {
        return 0;
    }
    let period = 2 * (n - 1);
    let i = i.rem_euclid(period);
    if i >= n {
        (period - i) as usize
    } else {
        i as usize
    }
}
