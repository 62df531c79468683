//! Parsing of app-install lines.
//!
//! Line format: `devtype\tdevid\tlat\tlon\tapp1,app2,...`

use snafu::prelude::*;
use tracing::debug;

use crate::error::{
    EmptyDeviceIdSnafu, EmptyDeviceTypeSnafu, InvalidLatitudeSnafu, InvalidLongitudeSnafu,
    ParseError, TooFewFieldsSnafu,
};

const MIN_FIELDS: usize = 5;

/// One parsed input record.
#[derive(Debug, Clone, PartialEq)]
pub struct AppsInstalled {
    pub dev_type: String,
    pub dev_id: String,
    pub lat: f64,
    pub lon: f64,
    pub apps: Vec<i64>,
}

impl AppsInstalled {
    /// Memcached key for this record: `"<dev_type>:<dev_id>"`.
    pub fn key(&self) -> String {
        format!("{}:{}", self.dev_type, self.dev_id)
    }
}

/// Parse a single line into a record.
///
/// Unparsable app ids are dropped individually; every other malformed
/// field rejects the whole line.
pub fn parse_line(line: &str) -> Result<AppsInstalled, ParseError> {
    let parts: Vec<&str> = line.trim().split('\t').collect();
    ensure!(
        parts.len() >= MIN_FIELDS,
        TooFewFieldsSnafu { count: parts.len() }
    );

    let (dev_type, dev_id, lat_str, lon_str, raw_apps) =
        (parts[0], parts[1], parts[2], parts[3], parts[4]);
    ensure!(!dev_type.is_empty(), EmptyDeviceTypeSnafu);
    ensure!(!dev_id.is_empty(), EmptyDeviceIdSnafu);

    let lat = lat_str
        .parse::<f64>()
        .context(InvalidLatitudeSnafu { value: lat_str })?;
    let lon = lon_str
        .parse::<f64>()
        .context(InvalidLongitudeSnafu { value: lon_str })?;

    Ok(AppsInstalled {
        dev_type: dev_type.to_string(),
        dev_id: dev_id.to_string(),
        lat,
        lon,
        apps: parse_apps(raw_apps),
    })
}

fn parse_apps(raw: &str) -> Vec<i64> {
    raw.split(',')
        .filter_map(|token| {
            let token = token.trim();
            match token.parse::<i64>() {
                Ok(app_id) => Some(app_id),
                Err(e) => {
                    debug!("Invalid app ID '{}': {}", token, e);
                    None
                }
            }
        })
        .collect()
}
