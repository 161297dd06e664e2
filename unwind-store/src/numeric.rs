//! Exact-text NUMERIC codec
//!
//! Captured NUMERIC values must round-trip exactly; going through f64 would
//! silently corrupt them. tokio-postgres has no text-exact numeric type, so
//! this module speaks the binary wire format directly: a header of
//! `{ndigits, weight, sign, dscale}` followed by base-10000 digit groups.

use bytes::{BufMut, BytesMut};
use postgres_types::{FromSql, Type};

const SIGN_POSITIVE: u16 = 0x0000;
const SIGN_NEGATIVE: u16 = 0x4000;
const SIGN_NAN: u16 = 0xC000;

/// A NUMERIC value carried as exact decimal text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PgNumeric(pub String);

impl<'a> FromSql<'a> for PgNumeric {
    fn from_sql(
        _ty: &Type,
        raw: &'a [u8],
    ) -> Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        decode_numeric(raw).map(PgNumeric).map_err(Into::into)
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

fn read_u16(raw: &[u8], pos: usize) -> Result<u16, String> {
    raw.get(pos..pos + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or_else(|| "numeric value truncated".to_string())
}

/// Decode a binary NUMERIC into exact decimal text.
pub fn decode_numeric(raw: &[u8]) -> Result<String, String> {
    let ndigits = read_u16(raw, 0)? as usize;
    let weight = read_u16(raw, 2)? as i16 as i32;
    let sign = read_u16(raw, 4)?;
    let dscale = read_u16(raw, 6)? as usize;

    if sign == SIGN_NAN {
        return Ok("NaN".to_string());
    }
    if sign != SIGN_POSITIVE && sign != SIGN_NEGATIVE {
        return Err(format!("invalid numeric sign word {sign:#06x}"));
    }

    let mut digits = Vec::with_capacity(ndigits);
    for i in 0..ndigits {
        let d = read_u16(raw, 8 + i * 2)?;
        if d > 9999 {
            return Err(format!("invalid base-10000 digit {d}"));
        }
        digits.push(d);
    }

    let mut text = String::new();
    if sign == SIGN_NEGATIVE {
        text.push('-');
    }

    // Integer part: digit group at index i carries weight (weight - i).
    if weight < 0 {
        text.push('0');
    } else {
        for i in 0..=weight as usize {
            let group = digits.get(i).copied().unwrap_or(0);
            if i == 0 {
                text.push_str(&group.to_string());
            } else {
                text.push_str(&format!("{group:04}"));
            }
        }
    }

    if dscale > 0 {
        let mut frac = String::with_capacity(dscale + 4);
        let mut k = 0i32;
        while frac.len() < dscale {
            let idx = weight + 1 + k;
            let group = if idx < 0 {
                0
            } else {
                digits.get(idx as usize).copied().unwrap_or(0)
            };
            frac.push_str(&format!("{group:04}"));
            k += 1;
        }
        frac.truncate(dscale);
        text.push('.');
        text.push_str(&frac);
    }

    Ok(text)
}

/// Encode exact decimal text as a binary NUMERIC into `out`.
///
/// Accepts `[-]digits[.digits]` and `NaN`; exponent notation is rejected
/// rather than approximated.
pub fn encode_numeric(text: &str, out: &mut BytesMut) -> Result<(), String> {
    let trimmed = text.trim();
    if trimmed.eq_ignore_ascii_case("nan") {
        out.put_u16(0);
        out.put_i16(0);
        out.put_u16(SIGN_NAN);
        out.put_u16(0);
        return Ok(());
    }

    let (negative, unsigned) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };

    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((i, f)) => (i, f),
        None => (unsigned, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(format!("not a decimal number: {text:?}"));
    }
    if !int_part.bytes().all(|b| b.is_ascii_digit())
        || !frac_part.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(format!("not a decimal number: {text:?}"));
    }

    let dscale = frac_part.len();
    if dscale > 0x3FFF {
        return Err(format!("numeric scale {dscale} out of range"));
    }

    // Align both sides of the decimal point to 4-digit group boundaries.
    let int_pad = (4 - int_part.len() % 4) % 4;
    let frac_pad = (4 - frac_part.len() % 4) % 4;
    let mut aligned = String::with_capacity(int_pad + unsigned.len() + frac_pad);
    aligned.extend(std::iter::repeat('0').take(int_pad));
    aligned.push_str(int_part);
    aligned.push_str(frac_part);
    aligned.extend(std::iter::repeat('0').take(frac_pad));

    let mut digits: Vec<u16> = aligned
        .as_bytes()
        .chunks(4)
        .map(|chunk| {
            chunk
                .iter()
                .fold(0u16, |acc, b| acc * 10 + u16::from(b - b'0'))
        })
        .collect();

    let mut weight = ((int_part.len() + int_pad) / 4) as i32 - 1;

    // Postgres never stores leading or trailing zero groups.
    while digits.first() == Some(&0) {
        digits.remove(0);
        weight -= 1;
    }
    while digits.last() == Some(&0) {
        digits.pop();
    }

    let sign = if digits.is_empty() {
        weight = 0;
        SIGN_POSITIVE
    } else if negative {
        SIGN_NEGATIVE
    } else {
        SIGN_POSITIVE
    };

    if digits.len() > u16::MAX as usize || weight > i16::MAX as i32 || weight < i16::MIN as i32 {
        return Err(format!("numeric value out of range: {text:?}"));
    }

    out.put_u16(digits.len() as u16);
    out.put_i16(weight as i16);
    out.put_u16(sign);
    out.put_u16(dscale as u16);
    for d in digits {
        out.put_u16(d);
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
