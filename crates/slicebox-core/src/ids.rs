//! Surrogate identifier newtypes used across the persistence and transfer layers.
//!
//! Each identifier wraps a `Uuid` so callers cannot accidentally mix up a
//! `BoxId` with an `OutgoingTransactionId`, for example, while still
//! round-tripping cleanly through `serde` and `sqlx`.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! uuid_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a fresh random identifier.
            #[allow(clippy::disallowed_methods)]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}-{}", $prefix, self.0)
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
    };
}

uuid_id!(BoxId, "box");
uuid_id!(OutgoingTransactionId, "outgoing-tx");
uuid_id!(OutgoingImageId, "outgoing-image");
uuid_id!(OutgoingTagValueId, "outgoing-tag");
uuid_id!(IncomingTransactionId, "incoming-tx");
uuid_id!(IncomingImageId, "incoming-image");
uuid_id!(AnonymizationKeyId, "anon-key");

/// Storage-layer key for a stored DICOM object. Opaque to callers of
/// `slicebox-storage`; produced by `ObjectStore::image_name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageId(pub String);

impl ImageId {
    #[allow(clippy::disallowed_methods)]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for ImageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
