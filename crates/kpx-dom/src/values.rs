//! Scalar encodings shared by every document part: booleans, integers,
//! UUIDs, colors and timestamps.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use uuid::Uuid;

use kpx_core::{FormatVersion, KpxError, KpxResult};

/// Seconds between 0001-01-01T00:00:00Z and the Unix epoch
pub const EPOCH_OFFSET_SECS: i64 = 62_135_596_800;

const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Current time truncated to whole seconds.
pub fn now() -> DateTime<Utc> {
    truncate(Utc::now())
}

pub fn truncate(dt: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_opt(dt.timestamp(), 0).single().unwrap_or(dt)
}

/// Default expiry for items that never expire
pub fn never() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(9999, 12, 31, 23, 59, 59)
        .single()
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

pub fn format_date(dt: &DateTime<Utc>, version: FormatVersion) -> String {
    match version {
        FormatVersion::V3 => dt.format(ISO_FORMAT).to_string(),
        FormatVersion::V4 => {
            let secs = dt.timestamp() + EPOCH_OFFSET_SECS;
            STANDARD.encode(secs.to_le_bytes())
        }
    }
}

/// Accepts both the ISO-8601 and the base64 seconds encodings.
pub fn parse_date(text: &str) -> KpxResult<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(truncate(dt.with_timezone(&Utc)));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, ISO_FORMAT) {
        return Ok(Utc.from_utc_datetime(&naive));
    }
    let bytes = STANDARD
        .decode(text)
        .map_err(|_| KpxError::document(format!("unparseable timestamp {text:?}")))?;
    let raw: [u8; 8] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| KpxError::document(format!("timestamp must be 8 bytes, got {}", bytes.len())))?;
    let secs = i64::from_le_bytes(raw) - EPOCH_OFFSET_SECS;
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| KpxError::document(format!("timestamp {secs} out of range")))
}

pub fn format_bool(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

pub fn parse_bool(text: &str) -> KpxResult<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(KpxError::document(format!("invalid boolean {other:?}"))),
    }
}

pub fn format_nullable_bool(value: Option<bool>) -> &'static str {
    match value {
        None => "null",
        Some(true) => "true",
        Some(false) => "false",
    }
}

pub fn parse_nullable_bool(text: &str) -> KpxResult<Option<bool>> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") {
        return Ok(None);
    }
    parse_bool(trimmed).map(Some)
}

pub fn parse_int<T: std::str::FromStr>(name: &str, text: &str) -> KpxResult<T> {
    text.trim()
        .parse()
        .map_err(|_| KpxError::document(format!("invalid integer in <{name}>: {text:?}")))
}

pub fn format_uuid(uuid: &Uuid) -> String {
    STANDARD.encode(uuid.as_bytes())
}

pub fn parse_uuid(text: &str) -> KpxResult<Uuid> {
    let bytes = STANDARD
        .decode(text.trim())
        .map_err(|_| KpxError::document(format!("invalid UUID {text:?}")))?;
    Uuid::from_slice(&bytes).map_err(|_| KpxError::document(format!("UUID must be 16 bytes, got {}", bytes.len())))
}

/// The nil UUID stands for "no reference".
pub fn parse_optional_uuid(text: &str) -> KpxResult<Option<Uuid>> {
    if text.trim().is_empty() {
        return Ok(None);
    }
    let uuid = parse_uuid(text)?;
    Ok((!uuid.is_nil()).then_some(uuid))
}

pub fn format_optional_uuid(uuid: Option<&Uuid>) -> String {
    format_uuid(uuid.unwrap_or(&Uuid::nil()))
}

/// `#RRGGBB`, empty for none.
pub type Color = [u8; 3];

pub fn format_color(color: Option<&Color>) -> String {
    match color {
        Some([r, g, b]) => format!("#{r:02X}{g:02X}{b:02X}"),
        None => String::new(),
    }
}

pub fn parse_color(text: &str) -> KpxResult<Option<Color>> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    let hex_part = text
        .strip_prefix('#')
        .filter(|h| h.len() == 6)
        .ok_or_else(|| KpxError::document(format!("invalid color {text:?}")))?;
    let mut color = [0u8; 3];
    for (i, c) in color.iter_mut().enumerate() {
        *c = u8::from_str_radix(&hex_part[i * 2..i * 2 + 2], 16)
            .map_err(|_| KpxError::document(format!("invalid color {text:?}")))?;
    }
    Ok(Some(color))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_v4_date_encoding() {
        let epoch = Utc.timestamp_opt(0, 0).unwrap();
        let encoded = format_date(&epoch, FormatVersion::V4);
        assert_eq!(
            STANDARD.decode(&encoded).unwrap(),
            EPOCH_OFFSET_SECS.to_le_bytes().to_vec()
        );
        assert_eq!(parse_date(&encoded).unwrap(), epoch);
    }

    #[test]
    fn test_v3_date_encoding() {
        let dt = Utc.with_ymd_and_hms(2017, 3, 4, 5, 6, 7).unwrap();
        assert_eq!(format_date(&dt, FormatVersion::V3), "2017-03-04T05:06:07Z");
        assert_eq!(parse_date("2017-03-04T05:06:07Z").unwrap(), dt);
        // Either encoding is accepted regardless of container version
        assert_eq!(parse_date(&format_date(&dt, FormatVersion::V4)).unwrap(), dt);
    }

    #[test]
    fn test_dates_truncate_to_seconds() {
        let parsed = parse_date("2020-01-01T00:00:00.750Z").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(now().timestamp_subsec_nanos(), 0);
    }

    #[test]
    fn test_never_expires_default() {
        assert_eq!(format_date(&never(), FormatVersion::V3), "9999-12-31T23:59:59Z");
    }

    #[test]
    fn test_bool_forms() {
        assert!(parse_bool("True").unwrap());
        assert!(!parse_bool("false").unwrap());
        assert!(parse_bool("yes").is_err());
        assert_eq!(parse_nullable_bool("null").unwrap(), None);
        assert_eq!(parse_nullable_bool("TRUE").unwrap(), Some(true));
        assert_eq!(format_nullable_bool(Some(false)), "false");
    }

    #[test]
    fn test_uuid_base64() {
        let uuid = Uuid::from_bytes([0xAB; 16]);
        let encoded = format_uuid(&uuid);
        assert_eq!(encoded.len(), 24);
        assert_eq!(parse_uuid(&encoded).unwrap(), uuid);
        assert_eq!(parse_optional_uuid("AAAAAAAAAAAAAAAAAAAAAA==").unwrap(), None);
        assert!(parse_uuid("AAAA").is_err());
    }

    #[test]
    fn test_color_forms() {
        assert_eq!(parse_color("#FF8000").unwrap(), Some([0xFF, 0x80, 0x00]));
        assert_eq!(parse_color("").unwrap(), None);
        assert!(parse_color("red").is_err());
        assert_eq!(format_color(Some(&[1, 2, 255])), "#0102FF");
    }
}
