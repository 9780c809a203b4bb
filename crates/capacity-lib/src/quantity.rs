//! Resource quantity parsing
//!
//! Converts the quantity strings found on the command line and in the
//! Kubernetes API (`250m`, `2`, `100mb`, `16318052Ki`) into normalized
//! integer units: milli-cores for CPU and bytes for memory.
//!
//! The `try_*` functions are strict and return a [`QuantityError`]. The
//! lenient `parse_*` functions never fail: an unparsable quantity becomes
//! zero and a warning is logged, so one bad value on one container cannot
//! abort a cluster-wide estimate.

use thiserror::Error;
use tracing::warn;

const KIB: i128 = 1 << 10;
const MIB: i128 = 1 << 20;
const GIB: i128 = 1 << 30;
const TIB: i128 = 1 << 40;
const PIB: i128 = 1 << 50;
const EIB: i128 = 1 << 60;

/// Error returned by the strict quantity parsers
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantityError {
    #[error("empty {kind} quantity")]
    Empty { kind: &'static str },

    #[error("invalid {kind} quantity '{input}'")]
    Invalid { kind: &'static str, input: String },

    #[error("unknown {kind} suffix '{suffix}' in '{input}'")]
    UnknownSuffix {
        kind: &'static str,
        suffix: String,
        input: String,
    },

    #[error("{kind} quantity '{input}' is out of range")]
    Overflow { kind: &'static str, input: String },
}

/// Parse a CPU quantity into milli-cores, returning 0 on bad input.
pub fn parse_cpu(text: &str) -> u64 {
    match try_parse_cpu(text) {
        Ok(millis) => millis,
        Err(e) => {
            warn!(input = %text, error = %e, "Treating unparsable CPU quantity as zero");
            0
        }
    }
}

/// Parse a memory quantity into bytes, returning 0 on bad input.
pub fn parse_memory(text: &str) -> i64 {
    match try_parse_memory(text) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(input = %text, error = %e, "Treating unparsable memory quantity as zero");
            0
        }
    }
}

/// Parse an allocatable pod count, returning 0 on bad input.
pub fn parse_pod_count(text: &str) -> u32 {
    match try_parse_pod_count(text) {
        Ok(count) => count,
        Err(e) => {
            warn!(input = %text, error = %e, "Treating unparsable pod count as zero");
            0
        }
    }
}

/// Strict CPU parser.
///
/// `"<n>m"` is a milli-core literal. Anything without the suffix is a count
/// of whole cores, so `"2"` is 2000 and never 2 milli-cores. Decimal cores
/// (`"0.5"`) are accepted and floored to the milli-core.
pub fn try_parse_cpu(text: &str) -> Result<u64, QuantityError> {
    const KIND: &str = "cpu";
    let input = text.trim();
    if input.is_empty() {
        return Err(QuantityError::Empty { kind: KIND });
    }

    if let Some(millis) = input.strip_suffix('m') {
        if !is_unsigned_integer(millis) {
            return Err(invalid(KIND, input));
        }
        return millis.parse::<u64>().map_err(|_| overflow(KIND, input));
    }

    let (whole, fraction) = split_decimal(input).ok_or_else(|| invalid(KIND, input))?;
    let whole: u64 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| overflow(KIND, input))?
    };

    // Only the first three fractional digits survive the conversion.
    let mut fraction_millis = 0u64;
    for (i, digit) in fraction.bytes().take(3).enumerate() {
        fraction_millis += u64::from(digit - b'0') * 10u64.pow(2 - i as u32);
    }

    whole
        .checked_mul(1000)
        .and_then(|millis| millis.checked_add(fraction_millis))
        .ok_or_else(|| overflow(KIND, input))
}

/// Strict memory parser.
///
/// Kubernetes canonical suffixes are matched case-sensitively first
/// (`Ki`/`Mi`/`Gi`.. binary, `k`/`M`/`G`.. decimal, `m` milli). Human
/// byte-size suffixes (`mb`, `GB`, `kib`, `g`) are then matched without
/// regard to case and always use binary multiples.
pub fn try_parse_memory(text: &str) -> Result<i64, QuantityError> {
    const KIND: &str = "memory";
    let input = text.trim();
    if input.is_empty() {
        return Err(QuantityError::Empty { kind: KIND });
    }

    let split = input
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '+'))
        .unwrap_or(input.len());
    let (number, suffix) = input.split_at(split);
    let number = number.strip_prefix('+').unwrap_or(number);
    let (whole, fraction) = split_decimal(number).ok_or_else(|| invalid(KIND, input))?;

    let scale = memory_scale(suffix).ok_or_else(|| QuantityError::UnknownSuffix {
        kind: KIND,
        suffix: suffix.to_string(),
        input: input.to_string(),
    })?;

    let bytes = scale_decimal(whole, fraction, scale).ok_or_else(|| overflow(KIND, input))?;
    i64::try_from(bytes).map_err(|_| overflow(KIND, input))
}

/// Strict pod-count parser. Pod ceilings are plain integers.
pub fn try_parse_pod_count(text: &str) -> Result<u32, QuantityError> {
    const KIND: &str = "pods";
    let input = text.trim();
    if input.is_empty() {
        return Err(QuantityError::Empty { kind: KIND });
    }
    if !is_unsigned_integer(input) {
        return Err(invalid(KIND, input));
    }
    input.parse().map_err(|_| overflow(KIND, input))
}

/// Multiplier applied to the mantissa, as a numerator/denominator pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Scale {
    numerator: i128,
    denominator: i128,
}

impl Scale {
    const fn times(numerator: i128) -> Self {
        Self {
            numerator,
            denominator: 1,
        }
    }
}

fn memory_scale(suffix: &str) -> Option<Scale> {
    let canonical = match suffix {
        "" => Some(Scale::times(1)),
        "Ki" => Some(Scale::times(KIB)),
        "Mi" => Some(Scale::times(MIB)),
        "Gi" => Some(Scale::times(GIB)),
        "Ti" => Some(Scale::times(TIB)),
        "Pi" => Some(Scale::times(PIB)),
        "Ei" => Some(Scale::times(EIB)),
        "k" => Some(Scale::times(1_000)),
        "M" => Some(Scale::times(1_000_000)),
        "G" => Some(Scale::times(1_000_000_000)),
        "T" => Some(Scale::times(1_000_000_000_000)),
        "P" => Some(Scale::times(1_000_000_000_000_000)),
        "E" => Some(Scale::times(1_000_000_000_000_000_000)),
        "m" => Some(Scale {
            numerator: 1,
            denominator: 1_000,
        }),
        _ => None,
    };
    if canonical.is_some() {
        return canonical;
    }

    if let Some(Ok(exponent)) = suffix.strip_prefix(['e', 'E']).map(str::parse::<u32>) {
        return 10i128.checked_pow(exponent).map(Scale::times);
    }

    let multiple = match suffix.to_ascii_lowercase().as_str() {
        "b" => 1,
        "k" | "kb" | "kib" => KIB,
        "mb" | "mib" => MIB,
        "g" | "gb" | "gib" => GIB,
        "t" | "tb" | "tib" => TIB,
        "p" | "pb" | "pib" => PIB,
        "eb" | "eib" => EIB,
        _ => return None,
    };
    Some(Scale::times(multiple))
}

/// Compute floor((whole.fraction) * scale) without going through floats.
fn scale_decimal(whole: &str, fraction: &str, scale: Scale) -> Option<i128> {
    let mut digits = String::with_capacity(whole.len() + fraction.len());
    digits.push_str(whole);
    digits.push_str(fraction);
    let digits = digits.trim_start_matches('0');
    if digits.len() > 30 {
        return None;
    }
    let mantissa: i128 = if digits.is_empty() { 0 } else { digits.parse().ok()? };
    let fraction_divisor = 10i128.checked_pow(fraction.len() as u32)?;

    let numerator = mantissa.checked_mul(scale.numerator)?;
    let denominator = fraction_divisor.checked_mul(scale.denominator)?;
    Some(numerator / denominator)
}

/// Split `"12.50"` into `("12", "50")`. Either side may be empty, not both.
fn split_decimal(number: &str) -> Option<(&str, &str)> {
    let (whole, fraction) = match number.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (number, ""),
    };
    let digits_only = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if (whole.is_empty() && fraction.is_empty()) || !digits_only(whole) || !digits_only(fraction) {
        return None;
    }
    Some((whole, fraction))
}

fn is_unsigned_integer(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn invalid(kind: &'static str, input: &str) -> QuantityError {
    QuantityError::Invalid {
        kind,
        input: input.to_string(),
    }
}

fn overflow(kind: &'static str, input: &str) -> QuantityError {
    QuantityError::Overflow {
        kind,
        input: input.to_string(),
    }
}
