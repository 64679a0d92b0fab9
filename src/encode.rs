//! Ordinate and count-field codecs.
//!
//! The canonical stream is little-endian throughout. Ordinates are written
//! either as 8-byte IEEE-754 doubles (standard mode) or as lossy 4-byte
//! fixed-point integers (compact mode, for size-constrained index
//! representations). Count fields are plain `u32` unless the shrink option
//! is enabled, in which case every count carries a low tag bit and small
//! counts collapse to a single byte.

/// Ordinate encoding mode, selected once per build and signalled
/// out-of-band — the byte stream itself does not record it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// 8-byte IEEE-754 doubles, the canonical form.
    #[default]
    Standard,
    /// 4-byte fixed-point integers via an affine transform of the
    /// geographic-degree range; lossy by design.
    Compact,
}

impl Encoding {
    /// On-wire size of one ordinate.
    pub fn ordinate_size(self) -> usize {
        match self {
            Encoding::Standard => 8,
            Encoding::Compact => 4,
        }
    }
}

/// Scale constant for the compact fixed-point encoding. Chosen so the
/// shifted degree range [0, 360] spans the full `u32` range.
pub const COMPACT_SCALE: f64 = 0x00B6_0B60 as f64;

/// Encode one ordinate as a compact fixed-point integer.
pub fn encode_compact(v: f64) -> u32 {
    ((v + 180.0) * COMPACT_SCALE + 0.5) as u32
}

/// Inverse of [`encode_compact`] (up to quantization loss).
pub fn decode_compact(raw: u32) -> f64 {
    raw as f64 / COMPACT_SCALE - 180.0
}

/// Resolved width of one count field.
///
/// With shrink enabled every count carries a tag in its lowest bit: a
/// packed byte is `(n << 1) | 1`, a wide field is `n << 1` in four bytes.
/// With shrink disabled (the canonical form) counts are plain `u32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountWidth {
    Packed(u8),
    Wide(u32),
}

/// Decide the width of a count field at emission time.
pub fn count_width(n: u32, shrink: bool) -> CountWidth {
    if !shrink {
        CountWidth::Wide(n)
    } else if n <= 0x7F {
        CountWidth::Packed(((n as u8) << 1) | 1)
    } else {
        CountWidth::Wide(n << 1)
    }
}

/// Append one count field to the output buffer.
pub fn write_count(out: &mut Vec<u8>, n: u32, shrink: bool) {
    match count_width(n, shrink) {
        CountWidth::Packed(b) => out.push(b),
        CountWidth::Wide(w) => out.extend_from_slice(&w.to_le_bytes()),
    }
}

/// Append one coordinate tuple (`vals` in on-wire order) to the output.
pub fn write_ordinates(out: &mut Vec<u8>, vals: &[f64], encoding: Encoding) {
    match encoding {
        Encoding::Standard => {
            for v in vals {
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
        Encoding::Compact => {
            for v in vals {
                out.extend_from_slice(&encode_compact(*v).to_le_bytes());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compact_roundtrip_is_close() {
        for v in [-180.0, -75.25, 0.0, 0.5, 120.125, 180.0] {
            let back = decode_compact(encode_compact(v));
            assert!((back - v).abs() < 1e-6, "{v} -> {back}");
        }
    }

    #[test]
    fn compact_is_monotonic() {
        assert!(encode_compact(-180.0) < encode_compact(0.0));
        assert!(encode_compact(0.0) < encode_compact(180.0));
    }

    #[test]
    fn count_plain_without_shrink() {
        assert_eq!(count_width(5, false), CountWidth::Wide(5));
        assert_eq!(count_width(300, false), CountWidth::Wide(300));

        let mut out = Vec::new();
        write_count(&mut out, 3, false);
        assert_eq!(out, 3u32.to_le_bytes());
    }

    #[test]
    fn count_packs_small_values_with_shrink() {
        assert_eq!(count_width(0, true), CountWidth::Packed(0x01));
        assert_eq!(count_width(3, true), CountWidth::Packed(0x07));
        assert_eq!(count_width(0x7F, true), CountWidth::Packed(0xFF));

        let mut out = Vec::new();
        write_count(&mut out, 3, true);
        assert_eq!(out, [0x07]);
    }

    #[test]
    fn count_tags_wide_values_with_shrink() {
        assert_eq!(count_width(128, true), CountWidth::Wide(256));

        let mut out = Vec::new();
        write_count(&mut out, 128, true);
        assert_eq!(out, 256u32.to_le_bytes());
        // low bit clear marks the wide form
        assert_eq!(out[0] & 1, 0);
    }

    #[test]
    fn ordinates_standard_little_endian() {
        let mut out = Vec::new();
        write_ordinates(&mut out, &[1.0, 2.0], Encoding::Standard);
        assert_eq!(out.len(), 16);
        assert_eq!(&out[0..8], &1.0f64.to_le_bytes());
        assert_eq!(&out[8..16], &2.0f64.to_le_bytes());
    }

    #[test]
    fn ordinates_compact_are_four_bytes() {
        let mut out = Vec::new();
        write_ordinates(&mut out, &[10.0, -20.0, 3.0], Encoding::Compact);
        assert_eq!(out.len(), 12);
        assert_eq!(&out[0..4], &encode_compact(10.0).to_le_bytes());
    }
}
