//! Strongly Typed Identifiers
//!
//! Newtype wrappers around [`Uuid`] so that tenant and provider identifiers
//! cannot be confused at compile time.
//!
//! # Example
//!
//! ```
//! use fedra_core::{TenantId, ProviderId};
//!
//! let tenant = TenantId::new();
//! let provider = ProviderId::new();
//!
//! fn requires_tenant(id: TenantId) -> String {
//!     id.to_string()
//! }
//!
//! let _ = requires_tenant(tenant);
//! // requires_tenant(provider); // does not compile
//! ```

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use uuid::Uuid;

/// Error type for ID parsing failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// The type of ID that failed to parse.
    pub id_type: &'static str,
    /// The underlying UUID parse error message.
    pub message: String,
}

impl Display for ParseIdError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Failed to parse {}: {}", self.id_type, self.message)
    }
}

impl std::error::Error for ParseIdError {}

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random ID using UUID v4.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an ID from an existing UUID.
            #[must_use]
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns a reference to the underlying UUID.
            #[must_use]
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Uuid::parse_str(s)
                    .map(Self)
                    .map_err(|e| ParseIdError {
                        id_type: stringify!($name),
                        message: e.to_string(),
                    })
            }
        }
    };
}

define_id!(
    /// Strongly typed identifier for tenants (zones).
    ///
    /// Every piece of federation trust material belongs to exactly one
    /// tenant; this type is what keeps the partitions apart in signatures.
    TenantId
);

define_id!(
    /// Strongly typed identifier for provider configuration records.
    ///
    /// Identifies one registered federation endpoint definition within a
    /// tenant, and the metadata provider handle parsed from it.
    ProviderId
);

#[cfg(test)]
mod tests {
    use super::*;

    mod tenant_id_tests {
        use super::*;

        #[test]
        fn test_new_creates_valid_id() {
            let id = TenantId::new();
            let id_str = id.to_string();
            assert_eq!(id_str.len(), 36);
            assert!(id_str.contains('-'));
        }

        #[test]
        fn test_from_uuid_preserves_value() {
            let uuid = Uuid::new_v4();
            let id = TenantId::from_uuid(uuid);
            assert_eq!(id.as_uuid(), &uuid);
        }

        #[test]
        fn test_display_returns_uuid_string() {
            let uuid = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
            let id = TenantId::from_uuid(uuid);
            assert_eq!(id.to_string(), "550e8400-e29b-41d4-a716-446655440000");
        }

        #[test]
        fn test_uuid_conversions() {
            let uuid = Uuid::new_v4();
            let id: TenantId = uuid.into();
            let back: Uuid = id.into();
            assert_eq!(uuid, back);
        }
    }

    mod provider_id_tests {
        use super::*;

        #[test]
        fn test_new_creates_distinct_ids() {
            assert_ne!(ProviderId::new(), ProviderId::new());
        }

        #[test]
        fn test_from_uuid_preserves_value() {
            let uuid = Uuid::new_v4();
            let id = ProviderId::from_uuid(uuid);
            assert_eq!(id.as_uuid(), &uuid);
        }
    }

    mod from_str_tests {
        use super::*;

        #[test]
        fn test_parse_valid_uuid() {
            let id: TenantId = "550e8400-e29b-41d4-a716-446655440000".parse().unwrap();
            assert_eq!(id.to_string(), "550e8400-e29b-41d4-a716-446655440000");
        }

        #[test]
        fn test_parse_invalid_uuid_returns_error() {
            let result: std::result::Result<TenantId, _> = "not-a-uuid".parse();
            let err = result.unwrap_err();
            assert_eq!(err.id_type, "TenantId");
            assert!(!err.message.is_empty());
        }

        #[test]
        fn test_error_display_names_type() {
            let result: std::result::Result<ProviderId, _> = "invalid".parse();
            let display = result.unwrap_err().to_string();
            assert!(display.contains("ProviderId"));
            assert!(display.contains("Failed to parse"));
        }
    }

    mod serde_tests {
        use super::*;

        #[test]
        fn test_tenant_id_serde_roundtrip() {
            let original = TenantId::new();
            let json = serde_json::to_string(&original).unwrap();
            let deserialized: TenantId = serde_json::from_str(&json).unwrap();
            assert_eq!(original, deserialized);
        }

        #[test]
        fn test_serializes_as_plain_string() {
            let uuid = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
            let id = ProviderId::from_uuid(uuid);
            let json = serde_json::to_string(&id).unwrap();
            assert_eq!(json, "\"550e8400-e29b-41d4-a716-446655440000\"");
        }
    }

    mod hash_eq_tests {
        use super::*;
        use std::collections::HashMap;

        #[test]
        fn test_same_uuid_is_equal() {
            let uuid = Uuid::new_v4();
            assert_eq!(TenantId::from_uuid(uuid), TenantId::from_uuid(uuid));
        }

        #[test]
        fn test_can_use_as_hashmap_key() {
            let mut map: HashMap<TenantId, &str> = HashMap::new();
            let id1 = TenantId::new();
            let id2 = TenantId::new();
            map.insert(id1, "acme");
            map.insert(id2, "beta");
            assert_eq!(map.get(&id1), Some(&"acme"));
            assert_eq!(map.get(&id2), Some(&"beta"));
        }
    }
}
