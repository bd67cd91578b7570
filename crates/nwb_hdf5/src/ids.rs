//! Arena index wrappers.
//!
//! Resolved objects and table columns refer to each other by index into
//! an owning vector rather than by pointer.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! define_arena_id {
    ($name:ident, $label:expr) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(usize);

        impl $name {
            pub fn new(index: usize) -> Self {
                Self(index)
            }

            pub fn index(self) -> usize {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", $label, self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let digits = s.strip_prefix(concat!($label, "#")).unwrap_or(s);
                digits.parse().map(Self)
            }
        }
    };
}

define_arena_id!(ObjectId, "object");
define_arena_id!(ColumnId, "column");
