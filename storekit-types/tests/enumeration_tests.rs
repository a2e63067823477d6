use pretty_assertions::assert_eq;
use proptest::prelude::*;
use storekit_types::{Enumeration, EnumerationRegistry, LookupFailed};

storekit_types::enumeration! {
    /// Lifecycle of a monitored device.
    pub enum DeviceState: "device_state" {
        Offline = 3 => "Offline",
        Provisioning = 1 => "Provisioning",
        Online = 2 => "Online",
    }
}

storekit_types::enumeration! {
    enum Grade: "grade" {
        First = 1 => "First",
        Second = 2 => "Second",
    }
}

// ── Lookup ───────────────────────────────────────────────────────

#[test]
fn from_name_finds_every_member() {
    for &member in DeviceState::all() {
        assert_eq!(DeviceState::from_name(member.name()).unwrap(), member);
    }
}

#[test]
fn from_id_finds_every_member() {
    for &member in DeviceState::all() {
        assert_eq!(DeviceState::from_id(member.id()).unwrap(), member);
    }
}

#[test]
fn unknown_name_fails_with_lookup_error() {
    let err = DeviceState::from_name("__nonexistent__").unwrap_err();
    assert_eq!(
        err,
        LookupFailed::UnknownName {
            type_name: "device_state",
            name: "__nonexistent__".into(),
        }
    );
}

#[test]
fn unknown_id_fails_with_lookup_error() {
    let err = DeviceState::from_id(99).unwrap_err();
    assert!(matches!(err, LookupFailed::UnknownId { id: 99, .. }));
}

#[test]
fn name_lookup_is_case_sensitive() {
    assert!(DeviceState::from_name("online").is_err());
}

#[test]
fn all_is_ordered_by_id() {
    assert_eq!(
        DeviceState::all(),
        &[
            DeviceState::Provisioning,
            DeviceState::Online,
            DeviceState::Offline
        ]
    );
}

#[test]
fn all_is_restartable() {
    let first: Vec<_> = DeviceState::all().iter().collect();
    let second: Vec<_> = DeviceState::all().iter().collect();
    assert_eq!(first, second);
}

#[test]
fn registry_is_built_once() {
    let a = DeviceState::registry() as *const _;
    let b = DeviceState::registry() as *const _;
    assert_eq!(a, b);
}

#[test]
fn registries_are_per_type() {
    assert_eq!(Grade::all().len(), 2);
    assert_eq!(DeviceState::all().len(), 3);
    assert!(Grade::from_name("Online").is_err());
}

// ── Conversions and serde ────────────────────────────────────────

#[test]
fn display_and_from_str_use_name() {
    assert_eq!(DeviceState::Online.to_string(), "Online");
    assert_eq!("Offline".parse::<DeviceState>().unwrap(), DeviceState::Offline);
}

#[test]
fn try_from_uses_id() {
    assert_eq!(DeviceState::try_from(1).unwrap(), DeviceState::Provisioning);
    assert!(DeviceState::try_from(0).is_err());
}

#[test]
fn serializes_by_name_not_id() {
    let json = serde_json::to_string(&DeviceState::Online).unwrap();
    assert_eq!(json, "\"Online\"");
}

#[test]
fn deserialize_unknown_name_is_an_error() {
    let err = serde_json::from_str::<DeviceState>("\"Rebooting\"").unwrap_err();
    assert!(err.to_string().contains("Rebooting"));
}

#[test]
fn deserialize_rejects_integer_ids() {
    assert!(serde_json::from_str::<DeviceState>("2").is_err());
}

// ── Registration defects ─────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Clashing {
    A,
    B,
}

impl Enumeration for Clashing {
    const TYPE_NAME: &'static str = "clashing";

    fn declared() -> &'static [Self] {
        &[Self::A, Self::B]
    }

    fn id(self) -> i32 {
        7
    }

    fn name(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
        }
    }

    fn registry() -> &'static EnumerationRegistry<Self> {
        static REGISTRY: std::sync::OnceLock<EnumerationRegistry<Clashing>> =
            std::sync::OnceLock::new();
        REGISTRY.get_or_init(EnumerationRegistry::build)
    }
}

#[test]
#[should_panic(expected = "id 7 declared for both")]
fn duplicate_id_fails_fast_at_registration() {
    let _ = Clashing::from_name("A");
}

// ── Properties ───────────────────────────────────────────────────

proptest! {
    #[test]
    fn arbitrary_unknown_names_never_resolve(name in "[a-z_]{1,24}") {
        // Every declared name starts with an uppercase letter.
        prop_assert!(DeviceState::from_name(&name).is_err());
    }

    #[test]
    fn id_roundtrip_matches_name_roundtrip(index in 0usize..3) {
        let member = DeviceState::all()[index];
        let via_id = DeviceState::from_id(member.id()).unwrap();
        let via_name = DeviceState::from_name(member.name()).unwrap();
        prop_assert_eq!(via_id, via_name);
    }
}
