//! Stable integer identities.
//!
//! Every persisted entity carries a `u64` id assigned once by the store. The
//! value `0` is reserved for entities that have not been persisted yet.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! catalog_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// The id of an entity that has not been persisted.
            pub const TRANSIENT: Self = Self(0);

            pub fn is_valid(self) -> bool {
                self.0 != 0
            }

            pub fn value(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }
    };
}

catalog_id!(SchemaId);
catalog_id!(ClassId);
catalog_id!(PropertyId);
catalog_id!(EnumerationId);
catalog_id!(KindOfQuantityId);
catalog_id!(PropertyCategoryId);
catalog_id!(UnitSystemId);
catalog_id!(PhenomenonId);
catalog_id!(UnitId);
catalog_id!(FormatId);

/// Identity of a backing store, used to detect definitions that belong to
/// another store.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreIdentity(pub String);

impl StoreIdentity {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }
}

impl fmt::Display for StoreIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
