//! Fixed-point amounts in the Avro `decimal` logical type.
//!
//! The wire form is the two's-complement big-endian encoding of the unscaled
//! integer (`amount × 10^scale`); the scale lives in the schema, not the bytes.

use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use std::str::FromStr;

use super::CodecError;
use crate::domain::AMOUNT_PRECISION;

/// Anything that may carry a decimal value, tagged by how it was produced.
#[derive(Debug, Clone, PartialEq)]
pub enum DecimalSource {
    /// Already a decimal, passed through untouched.
    Native(BigDecimal),
    /// Unscaled two's-complement bytes as read off the wire.
    RawBytes(Vec<u8>),
    /// A plain number from a loosely typed source.
    Numeric(f64),
}

/// Encodes `amount` at `scale` into the minimal big-endian two's-complement bytes.
pub fn encode(amount: Option<&BigDecimal>, scale: i64) -> Result<Vec<u8>, CodecError> {
    let amount = amount.ok_or_else(|| CodecError::Encoding("amount is missing".to_string()))?;

    let rescaled = amount.with_scale(scale);
    if &rescaled != amount {
        return Err(CodecError::Encoding(format!(
            "amount {} has more than {} fractional digits",
            amount, scale
        )));
    }

    let (unscaled, _) = rescaled.as_bigint_and_exponent();
    let limit = BigInt::from(10u8).pow(AMOUNT_PRECISION as u32);
    if unscaled.magnitude() >= limit.magnitude() {
        return Err(CodecError::Encoding(format!(
            "amount {} exceeds {} digits of precision",
            amount, AMOUNT_PRECISION
        )));
    }

    Ok(unscaled.to_signed_bytes_be())
}

/// Rebuilds a decimal from its unscaled bytes. Only borrows `bytes`.
pub fn decode(bytes: &[u8], scale: i64) -> Result<BigDecimal, CodecError> {
    if bytes.is_empty() {
        return Err(CodecError::Decoding("decimal byte sequence is empty".to_string()));
    }

    Ok(BigDecimal::new(BigInt::from_signed_bytes_be(bytes), scale))
}

pub fn to_decimal(value: DecimalSource, scale: i64) -> Result<BigDecimal, CodecError> {
    match value {
        DecimalSource::Native(decimal) => Ok(decimal),
        DecimalSource::RawBytes(bytes) => decode(&bytes, scale),
        DecimalSource::Numeric(number) => numeric_to_decimal(number),
    }
}

fn numeric_to_decimal(number: f64) -> Result<BigDecimal, CodecError> {
    if !number.is_finite() {
        return Err(CodecError::Encoding(format!(
            "unable to convert {} to a decimal",
            number
        )));
    }

    BigDecimal::from_str(&number.to_string())
        .map_err(|e| CodecError::Encoding(format!("unable to convert {}: {}", number, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(value: &str) -> BigDecimal {
        BigDecimal::from_str(value).unwrap()
    }

    #[test]
    fn test_encode_uses_minimal_twos_complement() {
        // 150.75 -> 15075 -> 0x3AE3
        assert_eq!(encode(Some(&dec("150.75")), 2).unwrap(), vec![0x3A, 0xE3]);
        // 1.28 -> 128 needs a leading zero byte to stay positive
        assert_eq!(encode(Some(&dec("1.28")), 2).unwrap(), vec![0x00, 0x80]);
        assert_eq!(encode(Some(&dec("0")), 2).unwrap(), vec![0x00]);
        assert_eq!(encode(Some(&dec("-1.00")), 2).unwrap(), vec![0x9C]);
        assert_eq!(encode(Some(&dec("-1.29")), 2).unwrap(), vec![0xFF, 0x7F]);
    }

    #[test]
    fn test_encode_pads_short_scale() {
        assert_eq!(encode(Some(&dec("12")), 2).unwrap(), encode(Some(&dec("12.00")), 2).unwrap());
    }

    #[test]
    fn test_round_trip_edges() {
        for value in [
            "0.01",
            "0.99",
            "1.00",
            "150.75",
            "127.99",
            "128.00",
            "32767.67",
            "9999999999999999.99",
            "1234567890123456.78",
        ] {
            let bytes = encode(Some(&dec(value)), 2).unwrap();
            assert_eq!(decode(&bytes, 2).unwrap(), dec(value), "value {}", value);
        }
    }

    #[test]
    fn test_encode_missing_amount_fails() {
        assert!(matches!(encode(None, 2), Err(CodecError::Encoding(_))));
    }

    #[test]
    fn test_encode_rejects_lossy_rescale() {
        assert!(matches!(
            encode(Some(&dec("1.234")), 2),
            Err(CodecError::Encoding(_))
        ));
    }

    #[test]
    fn test_encode_rejects_excess_precision() {
        assert!(matches!(
            encode(Some(&dec("10000000000000000.00")), 2),
            Err(CodecError::Encoding(_))
        ));
    }

    #[test]
    fn test_decode_empty_fails() {
        assert!(matches!(decode(&[], 2), Err(CodecError::Decoding(_))));
    }

    #[test]
    fn test_decode_leaves_input_untouched() {
        let bytes = vec![0x3A, 0xE3];
        let first = decode(&bytes, 2).unwrap();
        let second = decode(&bytes, 2).unwrap();
        assert_eq!(first, second);
        assert_eq!(bytes, vec![0x3A, 0xE3]);
    }

    #[test]
    fn test_to_decimal_variants() {
        assert_eq!(
            to_decimal(DecimalSource::Native(dec("42.10")), 2).unwrap(),
            dec("42.10")
        );
        assert_eq!(
            to_decimal(DecimalSource::RawBytes(vec![0x3A, 0xE3]), 2).unwrap(),
            dec("150.75")
        );
        assert_eq!(
            to_decimal(DecimalSource::Numeric(150.75), 2).unwrap(),
            dec("150.75")
        );
        assert!(matches!(
            to_decimal(DecimalSource::Numeric(f64::NAN), 2),
            Err(CodecError::Encoding(_))
        ));
        assert!(matches!(
            to_decimal(DecimalSource::RawBytes(Vec::new()), 2),
            Err(CodecError::Decoding(_))
        ));
    }
}
