//! Closed-set categorical values with a stable id and a canonical name.
//!
//! An enumeration is persisted and transmitted by its **name**, never its
//! integer id, so that adding or reordering members does not corrupt stored
//! data. Each enumeration type owns one process-wide [`EnumerationRegistry`],
//! built on first access and kept for the life of the process.
//!
//! Declare enumerations with the [`enumeration!`](crate::enumeration) macro:
//!
//! ```
//! storekit_types::enumeration! {
//!     /// How a sensor reading was captured.
//!     pub enum CaptureMode: "capture_mode" {
//!         Manual = 1 => "Manual",
//!         Scheduled = 2 => "Scheduled",
//!     }
//! }
//!
//! use storekit_types::Enumeration;
//! assert_eq!(CaptureMode::from_name("Scheduled").unwrap(), CaptureMode::Scheduled);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use thiserror::Error;
use tracing::debug;

/// Lookup of an enumeration member by name or id failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupFailed {
    #[error("'{name}' is not a member of {type_name}")]
    UnknownName { type_name: &'static str, name: String },

    #[error("{id} is not a member id of {type_name}")]
    UnknownId { type_name: &'static str, id: i32 },
}

/// A closed set of named values with stable integer ids.
///
/// Implementors provide the declared members and a `'static` registry slot;
/// lookups go through the registry and never fall back to a default.
pub trait Enumeration: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static {
    /// Name of the enumeration type, used in errors and logs.
    const TYPE_NAME: &'static str;

    /// Members in declaration order.
    fn declared() -> &'static [Self];

    /// Stable integer id of this member.
    fn id(self) -> i32;

    /// Canonical persisted name of this member.
    fn name(self) -> &'static str;

    /// The process-wide registry for this type, built on first call.
    fn registry() -> &'static EnumerationRegistry<Self>;

    /// Looks up a member by its canonical name.
    fn from_name(name: &str) -> Result<Self, LookupFailed> {
        Self::registry().by_name(name)
    }

    /// Looks up a member by its id.
    fn from_id(id: i32) -> Result<Self, LookupFailed> {
        Self::registry().by_id(id)
    }

    /// All registered members, ordered by id.
    fn all() -> &'static [Self] {
        Self::registry().members()
    }
}

/// Id and name indexes over one enumeration type.
#[derive(Debug)]
pub struct EnumerationRegistry<T: Enumeration> {
    members: Vec<T>,
    by_id: HashMap<i32, T>,
    by_name: HashMap<&'static str, T>,
}

impl<T: Enumeration> EnumerationRegistry<T> {
    /// Builds the registry from `T::declared()`.
    ///
    /// # Panics
    /// Panics if two members share an id or a name. That is a defect in the
    /// enumeration declaration, not a runtime condition.
    pub fn build() -> Self {
        let declared = T::declared();
        let mut by_id = HashMap::with_capacity(declared.len());
        let mut by_name = HashMap::with_capacity(declared.len());

        for &member in declared {
            if let Some(existing) = by_id.insert(member.id(), member) {
                panic!(
                    "enumeration {}: id {} declared for both {:?} and {:?}",
                    T::TYPE_NAME,
                    member.id(),
                    existing,
                    member
                );
            }
            if let Some(existing) = by_name.insert(member.name(), member) {
                panic!(
                    "enumeration {}: name '{}' declared for both {:?} and {:?}",
                    T::TYPE_NAME,
                    member.name(),
                    existing,
                    member
                );
            }
        }

        let mut members = declared.to_vec();
        members.sort_by_key(|m| m.id());

        debug!(enumeration = T::TYPE_NAME, members = members.len(), "Enumeration registered");

        Self {
            members,
            by_id,
            by_name,
        }
    }

    /// Members ordered by id.
    pub fn members(&self) -> &[T] {
        &self.members
    }

    /// Looks up a member by name.
    pub fn by_name(&self, name: &str) -> Result<T, LookupFailed> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| LookupFailed::UnknownName {
                type_name: T::TYPE_NAME,
                name: name.to_string(),
            })
    }

    /// Looks up a member by id.
    pub fn by_id(&self, id: i32) -> Result<T, LookupFailed> {
        self.by_id
            .get(&id)
            .copied()
            .ok_or(LookupFailed::UnknownId {
                type_name: T::TYPE_NAME,
                id,
            })
    }
}

/// Declares a Rust enum as an [`Enumeration`].
///
/// Generates the enum, the trait impl with its registry slot, `Display` and
/// `FromStr` by name, `TryFrom<i32>` by id, and serde impls that read and
/// write the name.
#[macro_export]
macro_rules! enumeration {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident : $type_name:literal {
            $(
                $(#[$vmeta:meta])*
                $variant:ident = $id:literal => $display:literal
            ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $(
                $(#[$vmeta])*
                $variant,
            )+
        }

        impl $crate::Enumeration for $name {
            const TYPE_NAME: &'static str = $type_name;

            fn declared() -> &'static [Self] {
                &[$(Self::$variant),+]
            }

            fn id(self) -> i32 {
                match self {
                    $(Self::$variant => $id,)+
                }
            }

            fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => $display,)+
                }
            }

            fn registry() -> &'static $crate::EnumerationRegistry<Self> {
                static REGISTRY: ::std::sync::OnceLock<$crate::EnumerationRegistry<$name>> =
                    ::std::sync::OnceLock::new();
                REGISTRY.get_or_init($crate::EnumerationRegistry::build)
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str($crate::Enumeration::name(*self))
            }
        }

        impl ::std::str::FromStr for $name {
            type Err = $crate::LookupFailed;

            fn from_str(s: &str) -> ::std::result::Result<Self, Self::Err> {
                <Self as $crate::Enumeration>::from_name(s)
            }
        }

        impl ::std::convert::TryFrom<i32> for $name {
            type Error = $crate::LookupFailed;

            fn try_from(id: i32) -> ::std::result::Result<Self, Self::Error> {
                <Self as $crate::Enumeration>::from_id(id)
            }
        }

        impl $crate::__private::serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> ::std::result::Result<S::Ok, S::Error>
            where
                S: $crate::__private::serde::Serializer,
            {
                serializer.serialize_str($crate::Enumeration::name(*self))
            }
        }

        impl<'de> $crate::__private::serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> ::std::result::Result<Self, D::Error>
            where
                D: $crate::__private::serde::Deserializer<'de>,
            {
                let name = <::std::string::String as $crate::__private::serde::Deserialize>::deserialize(
                    deserializer,
                )?;
                <Self as $crate::Enumeration>::from_name(&name)
                    .map_err(<D::Error as $crate::__private::serde::de::Error>::custom)
            }
        }
    };
}
