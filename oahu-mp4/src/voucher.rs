//! License documents handed out alongside protected titles.
//!
//! ```json
//! {
//!   "key": "0f2b...",
//!   "iv": "7c1e...",
//!   "rules": [{ "name": "DefaultExpiresRule", "parameters": [{ "expireDate": "2030-01-01T00:00:00Z", "type": "EXPIRES" }] }]
//! }
//! ```

use crate::{Error, Result};
use base64::Engine;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, path::Path};

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Voucher {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub iv: Option<String>,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Rule {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Parameter {
    #[serde(rename = "expireDate", default)]
    pub expire_date: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

impl Parameter {
    /// Expiry as UTC. Timestamps without a zone are taken as UTC, bare dates
    /// as midnight.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let value = self.expire_date.as_deref()?.trim();

        if let Ok(x) = DateTime::parse_from_rfc3339(value) {
            return Some(x.with_timezone(&Utc));
        }

        for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
            if let Ok(x) = NaiveDateTime::parse_from_str(value, format) {
                return Some(x.and_utc());
            }
        }

        NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .ok()
            .and_then(|x| x.and_hms_opt(0, 0, 0))
            .map(|x| x.and_utc())
    }
}

impl Rule {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.parameters
            .iter()
            .filter_map(|x| x.expires_at())
            .any(|x| x < now)
    }
}

impl Voucher {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load<T: AsRef<Path>>(path: T) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Decodes the content key and IV.
    pub fn key_material(&self) -> Result<KeyMaterial> {
        let key = self
            .key
            .as_deref()
            .map(str::trim)
            .filter(|x| !x.is_empty())
            .ok_or_else(|| Error::LicenseUnavailable("voucher carries no content key".to_owned()))?;

        KeyMaterial::parse(key, self.iv.as_deref().filter(|x| !x.trim().is_empty()))
    }

    pub fn expired_rules(&self, now: DateTime<Utc>) -> Vec<&Rule> {
        self.rules.iter().filter(|x| x.is_expired(now)).collect()
    }
}

/// Decoded 128-bit content key and optional book-wide IV.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    pub key: [u8; 16],
    pub iv: Option<[u8; 16]>,
}

impl KeyMaterial {
    pub fn new(key: [u8; 16], iv: Option<[u8; 16]>) -> Self {
        Self { key, iv }
    }

    /// Parses a key and IV given either as 32 hex digits or as base64.
    pub fn parse(key: &str, iv: Option<&str>) -> Result<Self> {
        Ok(Self {
            key: decode_16(key, "key")?,
            iv: iv.map(|x| decode_16(x, "iv")).transpose()?,
        })
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("key", &"<redacted>")
            .field("iv", &self.iv.map(hex::encode))
            .finish()
    }
}

fn decode_16(value: &str, what: &str) -> Result<[u8; 16]> {
    let value = value.trim();
    let bytes = if value.len() == 32 && value.bytes().all(|x| x.is_ascii_hexdigit()) {
        hex::decode(value)
            .map_err(|e| Error::InvalidKey(format!("{} is not valid hex ({})", what, e)))?
    } else {
        base64::engine::general_purpose::STANDARD
            .decode(value)
            .map_err(|e| {
                Error::InvalidKey(format!("{} is neither hex nor base64 ({})", what, e))
            })?
    };

    bytes.as_slice().try_into().map_err(|_| {
        Error::InvalidKey(format!("{} is {} bytes long, expected 16", what, bytes.len()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const VOUCHER: &str = r#"{
        "key": "2b7e151628aed2a6abf7158809cf4f3c",
        "iv": "8PHy8/T19vf4+fr7/P3+/w==",
        "rules": [
            { "name": "DefaultExpiresRule", "parameters": [{ "expireDate": "2020-01-01T00:00:00Z", "type": "EXPIRES" }] },
            { "name": "NotBefore", "parameters": [{ "expireDate": "2099-12-31T00:00:00", "type": "EXPIRES" }] },
            { "name": "AllowedUsers", "parameters": [{ "type": "DIRECTED_IDS" }] }
        ]
    }"#;

    #[test]
    fn test_key_material() {
        let voucher = Voucher::from_json(VOUCHER).unwrap();
        let material = voucher.key_material().unwrap();

        assert_eq!(material.key[0], 0x2b);
        assert_eq!(material.iv.unwrap()[0], 0xf0);
        assert_eq!(material.iv.unwrap()[15], 0xff);
        assert!(!format!("{:?}", material).contains("2b7e"));
    }

    #[test]
    fn test_expired_rules() {
        let voucher = Voucher::from_json(VOUCHER).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();

        let expired = voucher.expired_rules(now);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].name, "DefaultExpiresRule");
    }

    #[test]
    fn test_bad_json_propagates() {
        assert!(matches!(
            Voucher::from_json("{\"key\": "),
            Err(Error::Voucher(_))
        ));
    }

    #[test]
    fn test_missing_or_short_key() {
        let voucher = Voucher::from_json("{}").unwrap();
        assert!(matches!(
            voucher.key_material(),
            Err(Error::LicenseUnavailable(_))
        ));

        assert!(matches!(
            KeyMaterial::parse("AAEC", None),
            Err(Error::InvalidKey(_))
        ));
    }
}
