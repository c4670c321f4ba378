// Delta coding and fixed-point quantization.
//
// Ids, coordinates, timestamps, changesets, uids and string indices are
// stored as signed increments from the previous element. Running sums start
// at 0 for every sequence (every dense group, every way's refs, every
// relation's memids).
//
// Arithmetic wraps, so `from_deltas(to_deltas(x)) == x` for every i64
// sequence, including ones whose steps overflow.

// ---------------------------------------------------------------------------
// Delta coding
// ---------------------------------------------------------------------------

/// Turns absolute values into deltas, one at a time.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeltaEncoder {
    last: i64,
}

impl DeltaEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn delta(&mut self, value: i64) -> i64 {
        let d = value.wrapping_sub(self.last);
        self.last = value;
        d
    }
}

/// Running sum that turns deltas back into absolute values.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeltaDecoder {
    acc: i64,
}

impl DeltaDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn value(&mut self, delta: i64) -> i64 {
        self.acc = self.acc.wrapping_add(delta);
        self.acc
    }
}

/// `deltas[0] = seq[0]`, `deltas[i] = seq[i] - seq[i-1]`.
pub fn to_deltas(seq: &[i64]) -> Vec<i64> {
    let mut out = Vec::with_capacity(seq.len());
    extend_deltas(&mut out, seq.iter().copied());
    out
}

/// Inverse of [`to_deltas`].
pub fn from_deltas(deltas: &[i64]) -> Vec<i64> {
    let mut out = Vec::with_capacity(deltas.len());
    extend_values(&mut out, deltas.iter().copied());
    out
}

/// Append the deltas of `values` to `out`, starting the sum at 0.
pub fn extend_deltas(out: &mut Vec<i64>, values: impl IntoIterator<Item = i64>) {
    let mut enc = DeltaEncoder::new();
    out.extend(values.into_iter().map(|v| enc.delta(v)));
}

/// Append the running sums of `deltas` to `out`, starting the sum at 0.
pub fn extend_values(out: &mut Vec<i64>, deltas: impl IntoIterator<Item = i64>) {
    let mut dec = DeltaDecoder::new();
    out.extend(deltas.into_iter().map(|d| dec.value(d)));
}

// ---------------------------------------------------------------------------
// Quantization
// ---------------------------------------------------------------------------

/// Nanodegrees per degree.
const NANO: f64 = 1e9;

/// Degrees to stored units: `(round(value * 1e9) - offset) / granularity`.
#[inline]
pub fn encode_coord(value: f64, offset: i64, granularity: i32) -> i64 {
    let nanos = (value * NANO).round() as i64;
    nanos.wrapping_sub(offset) / i64::from(granularity)
}

/// Stored units to degrees: `1e-9 * (offset + granularity * stored)`.
#[inline]
pub fn decode_coord(stored: i64, offset: i64, granularity: i32) -> f64 {
    let nanos = offset.wrapping_add(i64::from(granularity).wrapping_mul(stored));
    nanos as f64 / NANO
}

/// Unix milliseconds to stored units.
#[inline]
pub fn encode_timestamp(millis: i64, date_granularity: i32) -> i64 {
    millis / i64::from(date_granularity)
}

/// Stored units to unix milliseconds.
#[inline]
pub fn decode_timestamp(stored: i64, date_granularity: i32) -> i64 {
    stored.wrapping_mul(i64::from(date_granularity))
}
