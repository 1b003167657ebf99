//! Encoded-polyline codec at five decimal places.
//!
//! The Directions API returns one polyline per step; legs are stitched from
//! their steps by decoding, dropping the shared joint and re-encoding.

use geo::Coord;
use thiserror::Error;

const PRECISION: f64 = 1e5;

/// A polyline string could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolylineError {
    /// A character outside the encoding alphabet was found.
    #[error("invalid polyline character {character:?} at byte {index}")]
    InvalidCharacter {
        /// Offending character.
        character: char,
        /// Byte offset into the input.
        index: usize,
    },
    /// The input ended in the middle of a value.
    #[error("polyline ended mid-value")]
    Truncated,
}

/// Decode a polyline into positions with `x` = longitude.
pub fn decode(encoded: &str) -> Result<Vec<Coord<f64>>, PolylineError> {
    let mut bytes = encoded.bytes().enumerate();
    let mut points = Vec::new();
    let (mut lat, mut lng) = (0_i64, 0_i64);

    while let Some(first) = bytes.next() {
        let mut next = || bytes.next();
        lat += read_value(first, &mut next)?;
        let second = next().ok_or(PolylineError::Truncated)?;
        lng += read_value(second, &mut next)?;
        points.push(Coord {
            x: scale_down(lng),
            y: scale_down(lat),
        });
    }
    Ok(points)
}

fn read_value(
    (mut index, mut byte): (usize, u8),
    next: &mut impl FnMut() -> Option<(usize, u8)>,
) -> Result<i64, PolylineError> {
    let mut result = 0_i64;
    let mut shift = 0_u32;
    loop {
        let chunk = byte
            .checked_sub(63)
            .filter(|chunk| *chunk < 64 && shift < 64)
            .ok_or(PolylineError::InvalidCharacter {
                character: char::from(byte),
                index,
            })?;
        result |= i64::from(chunk & 0x1f) << shift;
        shift += 5;
        if chunk < 0x20 {
            break;
        }
        (index, byte) = next().ok_or(PolylineError::Truncated)?;
    }
    Ok(if result & 1 == 1 {
        !(result >> 1)
    } else {
        result >> 1
    })
}

/// Encode positions (`x` = longitude) as a polyline.
#[must_use]
pub fn encode(points: &[Coord<f64>]) -> String {
    let mut encoded = String::new();
    let (mut last_lat, mut last_lng) = (0_i64, 0_i64);
    for point in points {
        let (lat, lng) = (scale_up(point.y), scale_up(point.x));
        write_value(lat - last_lat, &mut encoded);
        write_value(lng - last_lng, &mut encoded);
        (last_lat, last_lng) = (lat, lng);
    }
    encoded
}

fn write_value(delta: i64, out: &mut String) {
    let mut value = if delta < 0 { !(delta << 1) } else { delta << 1 };
    while value >= 0x20 {
        out.push(to_char((value & 0x1f) | 0x20));
        value >>= 5;
    }
    out.push(to_char(value));
}

#[expect(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "callers pass values below 64"
)]
fn to_char(value: i64) -> char {
    char::from((value + 63) as u8)
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "coordinates scaled by 1e5 fit comfortably in i64"
)]
fn scale_up(value: f64) -> i64 {
    (value * PRECISION).round() as i64
}

#[expect(
    clippy::cast_precision_loss,
    reason = "scaled coordinates stay well inside f64's exact integer range"
)]
fn scale_down(value: i64) -> f64 {
    value as f64 / PRECISION
}

/// Join consecutive polylines, dropping each repeated joint point.
pub fn stitch<'a>(parts: impl IntoIterator<Item = &'a str>) -> Result<String, PolylineError> {
    let mut points: Vec<Coord<f64>> = Vec::new();
    for part in parts {
        let decoded = decode(part)?;
        let skip = usize::from(points.last().is_some_and(|last| decoded.first() == Some(last)));
        points.extend(decoded.into_iter().skip(skip));
    }
    Ok(encode(&points))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    // Example from the encoding algorithm's documentation.
    const SAMPLE: &str = "_p~iF~ps|U_ulLnnqC_mqNvxq`@";

    fn sample_points() -> Vec<Coord<f64>> {
        vec![
            Coord { x: -120.2, y: 38.5 },
            Coord { x: -120.95, y: 40.7 },
            Coord { x: -126.453, y: 43.252 },
        ]
    }

    #[rstest]
    fn decodes_documented_sample() {
        let points = decode(SAMPLE).expect("decode sample");
        assert_eq!(points.len(), 3);
        for (actual, expected) in points.iter().zip(sample_points()) {
            assert!((actual.x - expected.x).abs() < 1e-9);
            assert!((actual.y - expected.y).abs() < 1e-9);
        }
    }

    #[rstest]
    fn encodes_documented_sample() {
        assert_eq!(encode(&sample_points()), SAMPLE);
    }

    #[rstest]
    #[case("_p~iF", PolylineError::Truncated)]
    #[case("_p~i", PolylineError::Truncated)]
    fn rejects_truncated_input(#[case] input: &str, #[case] expected: PolylineError) {
        assert_eq!(decode(input), Err(expected));
    }

    #[rstest]
    fn rejects_characters_outside_alphabet() {
        let err = decode("_p~iF ps|U").expect_err("space is invalid");
        assert!(matches!(err, PolylineError::InvalidCharacter { character: ' ', index: 5 }));
    }

    #[rstest]
    fn stitch_drops_shared_joint() {
        let points = sample_points();
        let first = encode(&points[..2]);
        let second = encode(&points[1..]);
        let stitched = stitch([first.as_str(), second.as_str()]).expect("stitch");
        assert_eq!(stitched, SAMPLE);
    }
}
