//! Service identifier normalization.
//!
//! Service ids arrive as free-form strings and must come out as canonical
//! 128-bit UUIDs. Short hex forms are expanded against the standard
//! Bluetooth base UUID; full undashed forms are re-dashed. The rules are
//! deliberately forgiving about case, whitespace and a `0x` prefix, and
//! strict about everything else.

use tracing::debug;
use uuid::Uuid;

use crate::error::EngineError;

/// Tail of the Bluetooth base UUID used to expand short-form ids.
pub const BLUETOOTH_BASE_SUFFIX: &str = "-0000-1000-8000-00805f9b34fb";

/// Service UUID used when the caller provides none.
pub const DEFAULT_SERVICE_UUID: &str = "fa87c0d0-afac-11de-8a39-0800200c9a66";

/// Normalize a service id string into a canonical UUID.
///
/// Accepted forms, after trimming, lowercasing and dropping a `0x` prefix:
/// 4 to 8 hex digits (zero-padded to 8 and expanded against the Bluetooth
/// base), a full dashed UUID, or 32 undashed hex digits.
pub fn normalize(input: &str) -> Result<Uuid, EngineError> {
    let cleaned = input.trim().to_ascii_lowercase();
    let cleaned = cleaned.strip_prefix("0x").unwrap_or(&cleaned);

    if cleaned.len() < 4 {
        return Err(EngineError::InvalidIdentifier(input.to_string()));
    }

    let candidate = if cleaned.len() <= 8 && cleaned.chars().all(|c| c.is_ascii_hexdigit()) {
        format!("{:0>8}{}", cleaned, BLUETOOTH_BASE_SUFFIX)
    } else if cleaned.len() == 32 && cleaned.chars().all(|c| c.is_ascii_hexdigit()) {
        format!(
            "{}-{}-{}-{}-{}",
            &cleaned[0..8],
            &cleaned[8..12],
            &cleaned[12..16],
            &cleaned[16..20],
            &cleaned[20..32]
        )
    } else if is_dashed_uuid(cleaned) {
        cleaned.to_string()
    } else {
        return Err(EngineError::InvalidIdentifier(input.to_string()));
    };

    Uuid::parse_str(&candidate).map_err(|_| EngineError::InvalidIdentifier(input.to_string()))
}

/// True for exactly the 8-4-4-4-12 dashed hex layout. `Uuid::parse_str`
/// also tolerates braced and `urn:uuid:` spellings, which we reject.
fn is_dashed_uuid(s: &str) -> bool {
    const GROUPS: [usize; 5] = [8, 4, 4, 4, 12];
    let mut parts = s.split('-');
    let ok = GROUPS.iter().all(|&len| {
        parts
            .next()
            .is_some_and(|g| g.len() == len && g.chars().all(|c| c.is_ascii_hexdigit()))
    });
    ok && parts.next().is_none()
}

/// Normalize an optional service id, falling back to the default UUID when
/// absent or unusable.
pub fn normalize_or_default(input: Option<&str>) -> Uuid {
    match input {
        Some(raw) => normalize(raw).unwrap_or_else(|_| {
            debug!("unusable service id {:?}, using default", raw);
            default_uuid()
        }),
        None => default_uuid(),
    }
}

fn default_uuid() -> Uuid {
    uuid::uuid!("fa87c0d0-afac-11de-8a39-0800200c9a66")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_short_form_expanded_against_base() {
        assert_eq!(
            normalize("ABCD").unwrap().to_string(),
            "0000abcd-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(
            normalize("0xABCD").unwrap().to_string(),
            "0000abcd-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(
            normalize("fa87c0d0").unwrap().to_string(),
            "fa87c0d0-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn test_full_dashed_form_passes_through() {
        assert_eq!(
            normalize("  FA87C0D0-AFAC-11DE-8A39-0800200C9A66  ")
                .unwrap()
                .to_string(),
            DEFAULT_SERVICE_UUID
        );
    }

    #[test]
    fn test_undashed_form_is_redashed() {
        assert_eq!(
            normalize("fa87c0d0afac11de8a390800200c9a66")
                .unwrap()
                .to_string(),
            DEFAULT_SERVICE_UUID
        );
    }

    #[test]
    fn test_too_short_rejected() {
        assert!(matches!(
            normalize("abc"),
            Err(EngineError::InvalidIdentifier(_))
        ));
        assert!(matches!(
            normalize("  "),
            Err(EngineError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(normalize("not-a-uuid").is_err());
        assert!(normalize("12345g78").is_err());
    }

    #[test]
    fn test_only_plain_dashed_layout_accepted() {
        assert!(normalize("{fa87c0d0-afac-11de-8a39-0800200c9a66}").is_err());
        assert!(normalize("urn:uuid:fa87c0d0-afac-11de-8a39-0800200c9a66").is_err());
        assert!(normalize("fa87c0d0afac-11de-8a39-0800-200c9a66").is_err());
        assert!(normalize("fa87c0d0-afac-11de-8a39-0800200c9a66-").is_err());
    }

    #[test]
    fn test_default_fallback() {
        assert_eq!(
            normalize_or_default(None).to_string(),
            DEFAULT_SERVICE_UUID
        );
        assert_eq!(
            normalize_or_default(Some("zz")).to_string(),
            DEFAULT_SERVICE_UUID
        );
        assert_eq!(
            normalize_or_default(Some("abcd")).to_string(),
            "0000abcd-0000-1000-8000-00805f9b34fb"
        );
    }

    proptest! {
        #[test]
        fn prop_normalization_is_idempotent(hex in "[0-9a-fA-F]{4,8}") {
            let first = normalize(&hex).unwrap();
            let second = normalize(&first.to_string()).unwrap();
            prop_assert_eq!(first, second);
        }

        #[test]
        fn prop_case_and_whitespace_insensitive(hex in "[0-9a-f]{8}") {
            let plain = normalize(&hex).unwrap();
            let noisy = normalize(&format!("  0x{}  ", hex.to_ascii_uppercase())).unwrap();
            prop_assert_eq!(plain, noisy);
        }
    }
}
