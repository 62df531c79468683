//! Binary payload stored for each device.
//!
//! `UserApps` is the protobuf message
//!
//! ```text
//! message UserApps {
//!     optional double lat = 1;
//!     optional double lon = 2;
//!     repeated uint32 apps = 3 [packed=true];
//! }
//! ```
//!
//! so values stay readable by existing protobuf consumers.

use bytes::Bytes;
use prost::Message;
use snafu::prelude::*;

use crate::error::{AppIdOutOfRangeSnafu, DecodeError, EncodeError, PayloadSnafu};
use crate::source::AppsInstalled;

/// Geolocation and installed apps of one device.
#[derive(Clone, PartialEq, Message)]
pub struct UserApps {
    #[prost(double, optional, tag = "1")]
    pub lat: Option<f64>,
    #[prost(double, optional, tag = "2")]
    pub lon: Option<f64>,
    #[prost(uint32, repeated, packed = "true", tag = "3")]
    pub apps: Vec<u32>,
}

impl TryFrom<&AppsInstalled> for UserApps {
    type Error = EncodeError;

    /// Fails if any app id is negative or larger than `u32::MAX`.
    fn try_from(record: &AppsInstalled) -> Result<Self, Self::Error> {
        let apps = record
            .apps
            .iter()
            .map(|&app_id| u32::try_from(app_id).ok().context(AppIdOutOfRangeSnafu { app_id }))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            lat: Some(record.lat),
            lon: Some(record.lon),
            apps,
        })
    }
}

impl UserApps {
    /// Serialize to bytes. Identical values always produce identical bytes.
    pub fn to_bytes(&self) -> Bytes {
        Bytes::from(self.encode_to_vec())
    }

    /// Parse a stored value.
    pub fn from_bytes(data: &[u8]) -> Result<Self, DecodeError> {
        Self::decode(data).context(PayloadSnafu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(apps: Vec<i64>) -> AppsInstalled {
        AppsInstalled {
            dev_type: "idfa".to_string(),
            dev_id: "id123".to_string(),
            lat: 55.55,
            lon: 37.37,
            apps,
        }
    }

    #[test]
    fn test_round_trip() {
        let payload = UserApps::try_from(&record(vec![42, 43, 300, 70_000, u32::MAX as i64]))
            .unwrap();
        let decoded = UserApps::from_bytes(&payload.to_bytes()).unwrap();
        assert_eq!(decoded.lat, Some(55.55));
        assert_eq!(decoded.lon, Some(37.37));
        assert_eq!(decoded.apps, vec![42, 43, 300, 70_000, u32::MAX]);
    }

    #[test]
    fn test_known_wire_bytes() {
        let payload = UserApps {
            lat: Some(1.0),
            lon: Some(2.0),
            apps: vec![1, 150],
        };
        let mut expected = vec![0x09];
        expected.extend_from_slice(&1.0f64.to_le_bytes());
        expected.push(0x11);
        expected.extend_from_slice(&2.0f64.to_le_bytes());
        expected.extend_from_slice(&[0x1a, 0x03, 0x01, 0x96, 0x01]);
        assert_eq!(payload.to_bytes().as_ref(), expected.as_slice());
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let payload = UserApps::try_from(&record(vec![7, 7, 1])).unwrap();
        assert_eq!(payload.to_bytes(), payload.to_bytes());
        assert_eq!(
            payload.to_bytes(),
            UserApps::try_from(&record(vec![7, 7, 1])).unwrap().to_bytes()
        );
    }

    #[test]
    fn test_empty_apps_omit_field() {
        let payload = UserApps::try_from(&record(vec![])).unwrap();
        let bytes = payload.to_bytes();
        assert_eq!(bytes.len(), 18);
        assert_eq!(UserApps::from_bytes(&bytes).unwrap(), payload);
    }

    #[test]
    fn test_zero_coordinates_are_still_written() {
        let payload = UserApps {
            lat: Some(0.0),
            lon: Some(0.0),
            apps: vec![],
        };
        assert_eq!(payload.to_bytes().len(), 18);
    }

    #[test]
    fn test_out_of_range_app_ids_are_rejected() {
        assert!(matches!(
            UserApps::try_from(&record(vec![1, -5])),
            Err(EncodeError::AppIdOutOfRange { app_id: -5 })
        ));
        assert!(matches!(
            UserApps::try_from(&record(vec![u32::MAX as i64 + 1])),
            Err(EncodeError::AppIdOutOfRange { .. })
        ));
    }

    #[test]
    fn test_decode_unpacked_and_unknown_fields() {
        let mut bytes = vec![0x18, 0x05, 0x18, 0x06];
        // unknown varint field 9
        bytes.extend_from_slice(&[0x48, 0x01]);
        bytes.push(0x09);
        bytes.extend_from_slice(&3.5f64.to_le_bytes());
        let decoded = UserApps::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.apps, vec![5, 6]);
        assert_eq!(decoded.lat, Some(3.5));
        assert_eq!(decoded.lon, None);
    }

    #[test]
    fn test_decode_truncated() {
        let bytes = UserApps {
            lat: Some(1.0),
            lon: Some(2.0),
            apps: vec![1, 2, 3],
        }
        .to_bytes();
        let result = UserApps::from_bytes(&bytes[..bytes.len() - 1]);
        assert!(matches!(result, Err(DecodeError::Payload { .. })));
    }

    #[test]
    fn test_decode_rejects_overlong_varint() {
        // Ten-byte varint whose last byte carries bits past 64.
        let bytes = [
            0x18, 0x81, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x7e,
        ];
        assert!(UserApps::from_bytes(&bytes).is_err());
    }
}
