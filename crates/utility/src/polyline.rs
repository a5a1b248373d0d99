//! Encoded polyline format as used by common mapping platforms.
//!
//! Every coordinate is stored as the delta to its predecessor, scaled by 1e5,
//! zig-zag encoded and written as 5-bit groups offset by 63. A group with the
//! 0x20 bit set is followed by another group of the same value.
//!
//! See <https://developers.google.com/maps/documentation/utilities/polylinealgorithm>

use std::{error, fmt};

use crate::geo::Coordinate;

const PRECISION: f64 = 1e5;
const CHUNK_OFFSET: u8 = 63;
const CONTINUATION_BIT: i64 = 0x20;
const CHUNK_MASK: i64 = 0x1f;
/// Seven groups carry 35 bits, enough for any 32 bit value.
const MAX_SHIFT: u32 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The input ended in the middle of a value or after a latitude without
    /// its longitude.
    UnexpectedEnd { position: usize },
    /// A byte outside of the printable range `63..=126`.
    InvalidByte { position: usize, byte: u8 },
    /// A value with more groups than fit into 32 bits.
    Overflow { position: usize },
}

impl error::Error for DecodeError {}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DecodeError::UnexpectedEnd { position } => {
                write!(f, "polyline ended unexpectedly at byte {}", position)
            }
            DecodeError::InvalidByte { position, byte } => {
                write!(f, "invalid polyline byte {:#04x} at {}", byte, position)
            }
            DecodeError::Overflow { position } => {
                write!(f, "polyline value overflows at byte {}", position)
            }
        }
    }
}

/// Decodes an encoded polyline into its coordinates.
///
/// An empty string decodes to an empty path. Malformed input is rejected as a
/// whole, the path is never truncated.
pub fn decode(encoded: &str) -> Result<Vec<Coordinate>, DecodeError> {
    let bytes = encoded.as_bytes();
    let mut coordinates = Vec::with_capacity(bytes.len() / 4);
    let mut index = 0;
    let mut latitude: i64 = 0;
    let mut longitude: i64 = 0;

    while index < bytes.len() {
        latitude += next_value(bytes, &mut index)?;
        if index >= bytes.len() {
            return Err(DecodeError::UnexpectedEnd { position: index });
        }
        longitude += next_value(bytes, &mut index)?;
        coordinates.push(Coordinate::new(
            latitude as f64 / PRECISION,
            longitude as f64 / PRECISION,
        ));
    }

    Ok(coordinates)
}

fn next_value(bytes: &[u8], index: &mut usize) -> Result<i64, DecodeError> {
    let mut raw: i64 = 0;
    let mut shift: u32 = 0;
    loop {
        let position = *index;
        let byte = *bytes
            .get(position)
            .ok_or(DecodeError::UnexpectedEnd { position })?;
        if !(CHUNK_OFFSET..=126).contains(&byte) {
            return Err(DecodeError::InvalidByte { position, byte });
        }
        if shift > MAX_SHIFT {
            return Err(DecodeError::Overflow { position });
        }
        let chunk = (byte - CHUNK_OFFSET) as i64;
        raw |= (chunk & CHUNK_MASK) << shift;
        shift += 5;
        *index += 1;
        if chunk & CONTINUATION_BIT == 0 {
            break;
        }
    }

    // zig-zag
    Ok(if raw & 1 != 0 {
        -((raw + 1) >> 1)
    } else {
        raw >> 1
    })
}

/// Encodes coordinates, rounding them to five decimal places.
pub fn encode(coordinates: &[Coordinate]) -> String {
    let mut encoded = String::with_capacity(coordinates.len() * 8);
    let mut previous = (0_i64, 0_i64);
    for coordinate in coordinates {
        let latitude = (coordinate.latitude * PRECISION).round() as i64;
        let longitude = (coordinate.longitude * PRECISION).round() as i64;
        encode_value(latitude - previous.0, &mut encoded);
        encode_value(longitude - previous.1, &mut encoded);
        previous = (latitude, longitude);
    }
    encoded
}

fn encode_value(value: i64, out: &mut String) {
    let mut raw = if value < 0 { !(value << 1) } else { value << 1 };
    while raw >= CONTINUATION_BIT {
        out.push(char::from(
            ((CONTINUATION_BIT | (raw & CHUNK_MASK)) as u8) + CHUNK_OFFSET,
        ));
        raw >>= 5;
    }
    out.push(char::from(raw as u8 + CHUNK_OFFSET));
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    const REFERENCE: &str = "_p~iF~ps|U_ulLnnqC_mqNvxq`@";

    fn reference_path() -> Vec<Coordinate> {
        vec![
            Coordinate::new(38.5, -120.2),
            Coordinate::new(40.7, -120.95),
            Coordinate::new(43.252, -126.453),
        ]
    }

    #[test]
    fn decodes_reference_polyline() {
        assert_eq!(decode(REFERENCE).unwrap(), reference_path());
    }

    #[test]
    fn encodes_reference_polyline() {
        assert_eq!(encode(&reference_path()), REFERENCE);
    }

    #[test]
    fn empty_input_is_empty_path() {
        assert_eq!(decode("").unwrap(), vec![]);
        assert_eq!(encode(&[]), "");
    }

    #[test]
    fn round_trip_keeps_five_decimals() {
        let path = vec![
            Coordinate::new(54.32331, 10.12278),
            Coordinate::new(54.32012, 10.13991),
            Coordinate::new(54.31498, 10.13204),
            Coordinate::new(-33.86785, 151.20732),
            Coordinate::new(0.0, -0.00001),
        ];
        let decoded = decode(&encode(&path)).unwrap();
        assert_eq!(decoded.len(), path.len());
        for (original, decoded) in path.iter().zip(&decoded) {
            assert!((original.latitude - decoded.latitude).abs() < 1e-5);
            assert!((original.longitude - decoded.longitude).abs() < 1e-5);
        }
    }

    prop_compose! {
        fn coordinate()(
            latitude in -90.0_f64..=90.0,
            longitude in -180.0_f64..=180.0
        ) -> Coordinate {
            Coordinate::new(latitude, longitude)
        }
    }

    proptest! {
        #[test]
        fn any_path_survives_a_round_trip(path in prop::collection::vec(coordinate(), 0..64)) {
            let decoded = decode(&encode(&path)).unwrap();
            prop_assert_eq!(decoded.len(), path.len());
            for (original, decoded) in path.iter().zip(&decoded) {
                prop_assert!((original.latitude - decoded.latitude).abs() < 1e-5);
                prop_assert!((original.longitude - decoded.longitude).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn truncated_value_is_rejected() {
        // "_p~i" is the beginning of a latitude whose last group is missing
        assert_eq!(
            decode("_p~i"),
            Err(DecodeError::UnexpectedEnd { position: 4 })
        );
    }

    #[test]
    fn latitude_without_longitude_is_rejected() {
        assert_eq!(
            decode("_p~iF"),
            Err(DecodeError::UnexpectedEnd { position: 5 })
        );
        // the full first pair followed by a lone latitude
        assert_eq!(
            decode("_p~iF~ps|U_ulL"),
            Err(DecodeError::UnexpectedEnd { position: 14 })
        );
    }

    #[test]
    fn invalid_bytes_are_rejected() {
        assert_eq!(
            decode("_p~iF ps|U"),
            Err(DecodeError::InvalidByte {
                position: 5,
                byte: b' '
            })
        );
    }

    #[test]
    fn overlong_values_are_rejected() {
        // eight continuation groups
        assert_eq!(
            decode("~~~~~~~~?"),
            Err(DecodeError::Overflow { position: 7 })
        );
    }
}
