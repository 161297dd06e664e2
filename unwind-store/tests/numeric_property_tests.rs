//! Property-Based Tests for the NUMERIC Wire Codec
//!
//! Captured NUMERIC values replay into inverse statements, so
//! encode-then-decode must reproduce the canonical form of any decimal
//! text exactly — same digits, same scale, no float detours.

use bytes::BytesMut;
use proptest::prelude::*;
use unwind_store::numeric::{decode_numeric, encode_numeric};

/// Canonical form: sign dropped for zero, leading integer zeros trimmed,
/// fractional digits kept verbatim (scale is significant).
fn canonical(negative: bool, int_digits: &str, frac_digits: Option<&str>) -> String {
    let int_trimmed = int_digits.trim_start_matches('0');
    let int_part = if int_trimmed.is_empty() { "0" } else { int_trimmed };
    let is_zero = int_part == "0" && frac_digits.map_or(true, |f| f.bytes().all(|b| b == b'0'));
    let mut s = String::new();
    if negative && !is_zero {
        s.push('-');
    }
    s.push_str(int_part);
    if let Some(frac) = frac_digits {
        s.push('.');
        s.push_str(frac);
    }
    s
}

proptest! {
    /// Round-trip over arbitrary decimal layouts, including leading zeros
    /// and long runs on either side of the point.
    #[test]
    fn roundtrip_is_canonical(
        negative in any::<bool>(),
        int_digits in "[0-9]{1,40}",
        frac_digits in proptest::option::of("[0-9]{1,40}"),
    ) {
        let mut text = String::new();
        if negative {
            text.push('-');
        }
        text.push_str(&int_digits);
        if let Some(frac) = &frac_digits {
            text.push('.');
            text.push_str(frac);
        }

        let mut buf = BytesMut::new();
        encode_numeric(&text, &mut buf).expect("decimal text must encode");
        let decoded = decode_numeric(&buf).expect("encoded value must decode");
        prop_assert_eq!(decoded, canonical(negative, &int_digits, frac_digits.as_deref()));
    }

    /// Integers survive unchanged through the codec.
    #[test]
    fn roundtrip_i64(v in any::<i64>()) {
        let mut buf = BytesMut::new();
        encode_numeric(&v.to_string(), &mut buf).unwrap();
        prop_assert_eq!(decode_numeric(&buf).unwrap(), v.to_string());
    }
}
