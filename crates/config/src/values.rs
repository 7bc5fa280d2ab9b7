//! Parsers for the compound values carried in the environment
//!
//! Every parser here is total: malformed input maps to a documented fallback
//! instead of an error, so a typo in an optional tuning knob never prevents
//! the stream from starting.

use std::fmt;

/// Values accepted as `true` by [`parse_bool`] (compared case-insensitively).
pub const TRUTHY_VALUES: &[&str] = &["1", "true", "yes", "y", "on"];

/// Extension list used when the configured list is empty.
pub const DEFAULT_EXTENSION: &str = ".mkv";

/// Largest denominator kept when a decimal frame rate is converted to a ratio.
///
/// 1001 keeps the NTSC family (24000/1001, 30000/1001, 60000/1001) exact.
pub const MAX_FPS_DENOMINATOR: u128 = 1001;

/// Interprets a boolean environment value.
pub fn parse_bool(raw: &str) -> bool {
    let lower = raw.trim().to_lowercase();
    TRUTHY_VALUES.contains(&lower.as_str())
}

/// Parses a comma and/or space separated extension list.
///
/// Each entry is lowercased and normalized to carry a leading dot, so
/// `"MKV, .mp4 webm"` becomes `[".mkv", ".mp4", ".webm"]`.
pub fn parse_extensions(raw: &str) -> Vec<String> {
    let exts: Vec<String> = raw
        .replace(' ', ",")
        .split(',')
        .map(|part| part.trim().to_lowercase())
        .filter(|part| !part.is_empty())
        .map(|part| {
            if part.starts_with('.') {
                part
            } else {
                format!(".{}", part)
            }
        })
        .collect();

    if exts.is_empty() {
        vec![DEFAULT_EXTENSION.to_string()]
    } else {
        exts
    }
}

/// Parses a bitrate such as `"3000k"` or `"2.5M"` into kbps.
///
/// A trailing `k` multiplies by 1 and a trailing `m` by 1000 (case-insensitive);
/// a bare number is already kbps. Fractional results are truncated. Empty,
/// negative or unparsable input yields `default_kbps`.
pub fn parse_kbps(value: &str, default_kbps: u32) -> u32 {
    let raw = value.trim();
    if raw.is_empty() {
        return default_kbps;
    }

    let (number, factor) = match raw.chars().last() {
        Some('k') | Some('K') => (&raw[..raw.len() - 1], 1.0),
        Some('m') | Some('M') => (&raw[..raw.len() - 1], 1000.0),
        _ => (raw, 1.0),
    };

    match number.trim().parse::<f64>() {
        Ok(n) if n.is_finite() && n >= 0.0 => {
            let kbps = n * factor;
            if kbps > u32::MAX as f64 {
                default_kbps
            } else {
                kbps as u32
            }
        }
        _ => default_kbps,
    }
}

/// An exact frame rate expressed as `num / den` frames per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameRate {
    pub num: u32,
    pub den: u32,
}

impl FrameRate {
    /// Rate used when a probed stream does not report a usable one.
    pub const FALLBACK: FrameRate = FrameRate { num: 24, den: 1 };

    /// Builds a reduced ratio, rejecting zero numerators or denominators.
    pub fn new(num: u32, den: u32) -> Option<Self> {
        if num == 0 || den == 0 {
            return None;
        }
        let g = gcd(num as u128, den as u128) as u32;
        Some(Self {
            num: num / g,
            den: den / g,
        })
    }

    /// Frames per second as a float, for display only.
    pub fn as_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Parses a ratio as reported by a media probe.
///
/// Accepts `"N/D"` or a decimal; decimals are kept to millisecond-frame
/// precision (`"29.97"` becomes 2997/100). Returns `None` for anything that
/// does not describe a positive rate.
pub fn parse_ratio(raw: &str) -> Option<FrameRate> {
    let raw = raw.trim();
    if let Some((num, den)) = raw.split_once('/') {
        let num = num.trim().parse::<u32>().ok()?;
        let den = den.trim().parse::<u32>().ok()?;
        return FrameRate::new(num, den);
    }

    let value = raw.parse::<f64>().ok()?;
    if !value.is_finite() || value <= 0.0 || value * 1000.0 > u32::MAX as f64 {
        return None;
    }
    FrameRate::new((value * 1000.0) as u32, 1000)
}

/// Parses a configured output frame rate.
///
/// Empty input means "no override". `"N/D"` is taken literally; a decimal is
/// approximated by the closest ratio whose denominator does not exceed
/// [`MAX_FPS_DENOMINATOR`], so `"29.97002997"` resolves to 30000/1001.
pub fn parse_fps(raw: &str) -> Option<FrameRate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if raw.contains('/') {
        return parse_ratio(raw);
    }

    let fps = raw.parse::<f64>().ok()?;
    if !fps.is_finite() || fps <= 0.0 || fps > 1_000_000.0 {
        return None;
    }

    let scale: u128 = 1_000_000;
    let num = (fps * scale as f64).round() as u128;
    let (num, den) = limit_denominator(num, scale, MAX_FPS_DENOMINATOR);
    FrameRate::new(u32::try_from(num).ok()?, u32::try_from(den).ok()?)
}

fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a.max(1)
}

/// Closest fraction to `num/den` with a denominator of at most `max_den`.
///
/// Walks the continued-fraction convergents and then picks between the last
/// convergent and the best semiconvergent.
fn limit_denominator(num: u128, den: u128, max_den: u128) -> (u128, u128) {
    let g = gcd(num, den);
    let (num, den) = (num / g, den / g);
    if den <= max_den {
        return (num, den);
    }

    let (mut p0, mut q0, mut p1, mut q1) = (0u128, 1u128, 1u128, 0u128);
    let (mut n, mut d) = (num, den);
    loop {
        let a = n / d;
        let q2 = q0 + a * q1;
        if q2 > max_den {
            break;
        }
        let p2 = p0 + a * p1;
        p0 = p1;
        q0 = q1;
        p1 = p2;
        q1 = q2;
        let r = n - a * d;
        n = d;
        d = r;
        if d == 0 {
            return (p1, q1);
        }
    }

    let k = (max_den - q0) / q1;
    let (bound_p, bound_q) = (p0 + k * p1, q0 + k * q1);

    // |p/q - num/den| scaled by q*den, cross-multiplied to avoid division.
    let error = |p: u128, q: u128| -> u128 {
        let lhs = p * den;
        let rhs = num * q;
        lhs.abs_diff(rhs)
    };
    if error(p1, q1) * bound_q <= error(bound_p, bound_q) * q1 {
        (p1, q1)
    } else {
        (bound_p, bound_q)
    }
}
