//! Application-marker payload.
//!
//! A short fixed byte sequence embedded in advertising/manufacturer data lets
//! peers recognize this protocol irrespective of platform: three magic bytes,
//! a protocol version, a platform tag, then the UTF-8 display name. Scan
//! results are classified against the marker first and against legacy name
//! prefixes as a fallback, since some radios strip manufacturer data from
//! inquiry results.

use thiserror::Error;
use tracing::trace;

/// Magic bytes opening every marker payload.
pub const MARKER_MAGIC: [u8; 3] = *b"NMP";

/// Marker payload protocol version.
pub const PROTOCOL_VERSION: u8 = 0x01;

/// Legacy device-name prefixes recognized as same-protocol peers.
pub const PEER_NAME_PREFIXES: [&str; 2] = ["iOS_", "Android_"];

/// Errors from marker payload parsing.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BeaconError {
    #[error("marker payload too short: {0} bytes")]
    TooShort(usize),

    #[error("marker magic mismatch")]
    BadMagic,

    #[error("marker display name is not valid UTF-8")]
    BadName,
}

/// Decoded application marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerPayload {
    pub version: u8,
    pub platform_tag: u8,
    pub display_name: String,
}

impl MarkerPayload {
    /// Build a marker for this device.
    pub fn new(platform_tag: u8, display_name: impl Into<String>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            platform_tag,
            display_name: display_name.into(),
        }
    }

    /// Serialize into advertising manufacturer data.
    pub fn encode(&self) -> Vec<u8> {
        let name = self.display_name.as_bytes();
        let mut out = Vec::with_capacity(5 + name.len());
        out.extend_from_slice(&MARKER_MAGIC);
        out.push(self.version);
        out.push(self.platform_tag);
        out.extend_from_slice(name);
        out
    }

    /// Parse manufacturer data back into a marker.
    pub fn decode(bytes: &[u8]) -> Result<Self, BeaconError> {
        if bytes.len() < 5 {
            return Err(BeaconError::TooShort(bytes.len()));
        }
        if bytes[0..3] != MARKER_MAGIC {
            return Err(BeaconError::BadMagic);
        }
        let display_name =
            std::str::from_utf8(&bytes[5..]).map_err(|_| BeaconError::BadName)?;
        Ok(Self {
            version: bytes[3],
            platform_tag: bytes[4],
            display_name: display_name.to_string(),
        })
    }
}

/// Result of classifying a scanned device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerClass {
    /// A device speaking this protocol.
    Peer { display_name: String },
    /// Anything else seen by the radio.
    Unrelated,
}

impl PeerClass {
    pub fn is_peer(&self) -> bool {
        matches!(self, PeerClass::Peer { .. })
    }
}

/// Classify a scan/inquiry hit from its advertised name and manufacturer
/// data. Marker bytes take precedence; name prefixes cover radios that do
/// not relay manufacturer data.
pub fn classify(device_name: Option<&str>, manufacturer_data: Option<&[u8]>) -> PeerClass {
    if let Some(data) = manufacturer_data {
        match MarkerPayload::decode(data) {
            Ok(marker) => {
                let display_name = if marker.display_name.is_empty() {
                    device_name.unwrap_or("Unknown").to_string()
                } else {
                    marker.display_name
                };
                return PeerClass::Peer { display_name };
            }
            Err(err) => trace!(
                "manufacturer data {} is not a marker: {}",
                hex::encode(data),
                err
            ),
        }
    }

    if let Some(name) = device_name {
        if PEER_NAME_PREFIXES.iter().any(|p| name.starts_with(p)) {
            return PeerClass::Peer {
                display_name: name.to_string(),
            };
        }
    }

    PeerClass::Unrelated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_roundtrip() {
        let marker = MarkerPayload::new(0x01, "Android_Pixel");
        let decoded = MarkerPayload::decode(&marker.encode()).unwrap();
        assert_eq!(decoded, marker);
        assert_eq!(decoded.version, PROTOCOL_VERSION);
    }

    #[test]
    fn test_marker_layout() {
        let marker = MarkerPayload::new(0x02, "iOS_iPhone");
        let bytes = marker.encode();
        assert_eq!(&bytes[0..3], b"NMP");
        assert_eq!(bytes[3], 0x01);
        assert_eq!(bytes[4], 0x02);
        assert_eq!(&bytes[5..], b"iOS_iPhone");
    }

    #[test]
    fn test_decode_too_short() {
        assert_eq!(
            MarkerPayload::decode(b"NMP\x01"),
            Err(BeaconError::TooShort(4))
        );
    }

    #[test]
    fn test_decode_bad_magic() {
        assert_eq!(
            MarkerPayload::decode(b"XYZ\x01\x01name"),
            Err(BeaconError::BadMagic)
        );
    }

    #[test]
    fn test_decode_bad_utf8() {
        let mut bytes = MarkerPayload::new(0x01, "ok").encode();
        bytes.push(0xFF);
        bytes.push(0xFE);
        assert_eq!(MarkerPayload::decode(&bytes), Err(BeaconError::BadName));
    }

    #[test]
    fn test_classify_by_marker() {
        let data = MarkerPayload::new(0x02, "iOS_iPad").encode();
        let class = classify(Some("ignored"), Some(&data));
        assert_eq!(
            class,
            PeerClass::Peer {
                display_name: "iOS_iPad".to_string()
            }
        );
    }

    #[test]
    fn test_classify_marker_with_empty_name_uses_device_name() {
        let data = MarkerPayload::new(0x01, "").encode();
        let class = classify(Some("Android_Tab"), Some(&data));
        assert_eq!(
            class,
            PeerClass::Peer {
                display_name: "Android_Tab".to_string()
            }
        );
    }

    #[test]
    fn test_classify_by_name_prefix() {
        assert!(classify(Some("iOS_iPhone"), None).is_peer());
        assert!(classify(Some("Android_Pixel"), None).is_peer());
        assert!(!classify(Some("JBL Speaker"), None).is_peer());
    }

    #[test]
    fn test_classify_unrelated() {
        assert_eq!(classify(None, None), PeerClass::Unrelated);
        assert_eq!(
            classify(Some("Headphones"), Some(b"\x4c\x00\x02\x15")),
            PeerClass::Unrelated
        );
    }
}
