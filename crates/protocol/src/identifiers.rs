//! Newtype identifiers.
//!
//! Every concept that has an identity is represented as a distinct newtype
//! wrapping a primitive. This prevents accidentally interchanging, for
//! example, an [`OperationName`] with a [`SubsystemName`] even though both are
//! strings under the hood.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display, and a
// TryFrom<String> that deserialisation goes through.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String")]
        pub struct $name(String);

        impl TryFrom<String> for $name {
            type Error = String;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
                    .ok_or_else(|| concat!(stringify!($name), " must not be empty").to_string())
            }
        }

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Interface identity tokens
// ---------------------------------------------------------------------------

/// Identity token of one capability interface version.
///
/// Callers request capabilities by the exact token of the version they were
/// built against. A token is bound to one slot list forever; the value itself
/// carries no meaning beyond being distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InterfaceId(Uuid);

impl InterfaceId {
    /// Creates an [`InterfaceId`] from a 128-bit constant.
    pub const fn from_u128(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }

    /// Parses an [`InterfaceId`] from its hyphenated textual form.
    pub fn parse_str(value: &str) -> Option<Self> {
        Uuid::parse_str(value).ok().map(Self)
    }

    /// Creates an [`InterfaceId`] from an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Returns the underlying [`Uuid`].
    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for InterfaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{{}}}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Operation context identity
// ---------------------------------------------------------------------------

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one operation context within this process.
///
/// Allocated from a process-wide counter, so two live contexts never share an
/// id. Propagated through spans so engine-side and caller-side logs correlate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContextId(u64);

impl ContextId {
    /// Allocates the next unused context id.
    pub fn next() -> Self {
        Self(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the underlying integer value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Identifiers: string-backed
// ---------------------------------------------------------------------------

string_id! {
    /// Name of one remote operation, e.g. `"CreateName"`.
    ///
    /// An operation occupies one slot in a capability interface; its `Begin`
    /// and `End` halves share the name.
    OperationName
}

string_id! {
    /// Names a subsystem whose capability surface evolves as a ladder of
    /// interface versions (e.g. `"PropertyManagement"`, `"Query"`).
    SubsystemName
}

string_id! {
    /// A gateway connection endpoint in `"host:port"` form.
    Endpoint
}

string_id! {
    /// A property name within a naming-store entry.
    PropertyName
}

string_id! {
    /// Names a node of the cluster the engine manages.
    NodeName
}

// ---------------------------------------------------------------------------

/// A hierarchical name in the naming store, always of the form `fabric:/…`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub struct FabricName(String);

impl TryFrom<String> for FabricName {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value.as_str())
            .ok_or_else(|| format!("'{value}' does not start with {}", Self::SCHEME))
    }
}

impl FabricName {
    /// The scheme every name starts with.
    pub const SCHEME: &'static str = "fabric:/";

    /// Creates a [`FabricName`], returning `None` unless `value` starts with
    /// `fabric:/`.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let v = value.into();
        if v.starts_with(Self::SCHEME) {
            Some(Self(v.trim_end_matches('/').to_string()).fixup_root())
        } else {
            None
        }
    }

    fn fixup_root(self) -> Self {
        // Trimming turns the root `fabric:/` into `fabric:`.
        if self.0.len() < Self::SCHEME.len() {
            Self(Self::SCHEME.to_string())
        } else {
            self
        }
    }

    /// Returns the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if `self` is a strict descendant of `ancestor`.
    pub fn is_descendant_of(&self, ancestor: &FabricName) -> bool {
        if ancestor.0 == Self::SCHEME {
            return self.0.len() > Self::SCHEME.len() && self.0.starts_with(Self::SCHEME);
        }
        self.0.len() > ancestor.0.len()
            && self.0.starts_with(ancestor.as_str())
            && self.0.as_bytes()[ancestor.0.len()] == b'/'
    }

    /// Returns `true` if `self` is a direct child of `parent`.
    pub fn is_child_of(&self, parent: &FabricName) -> bool {
        if !self.is_descendant_of(parent) {
            return false;
        }
        let offset = if parent.0 == Self::SCHEME {
            Self::SCHEME.len()
        } else {
            parent.0.len() + 1
        };
        !self.0[offset..].contains('/')
    }
}

impl std::fmt::Display for FabricName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_string_ids_are_rejected() {
        assert!(OperationName::new("").is_none());
        assert_eq!(OperationName::new("CreateName").unwrap().as_str(), "CreateName");
    }

    #[test]
    fn test_context_ids_are_unique() {
        let a = ContextId::next();
        let b = ContextId::next();
        assert_ne!(a, b);
        assert!(b.as_u64() > a.as_u64());
    }

    #[test]
    fn test_interface_id_round_trips_through_text() {
        let id = InterfaceId::from_u128(0x2061227e_0142_4fa4_8a3f_8f1d7a3a3c01);
        let parsed = InterfaceId::parse_str(&id.as_uuid().to_string()).unwrap();
        assert_eq!(id, parsed);
        assert!(id.to_string().starts_with('{'));
    }

    #[test]
    fn test_fabric_name_requires_scheme() {
        assert!(FabricName::new("http://x").is_none());
        assert_eq!(FabricName::new("fabric:/app/").unwrap().as_str(), "fabric:/app");
        assert_eq!(FabricName::new("fabric:/").unwrap().as_str(), "fabric:/");
    }

    #[test]
    fn test_fabric_name_hierarchy() {
        let root = FabricName::new("fabric:/").unwrap();
        let app = FabricName::new("fabric:/app").unwrap();
        let svc = FabricName::new("fabric:/app/svc").unwrap();
        let sibling = FabricName::new("fabric:/application").unwrap();

        assert!(app.is_child_of(&root));
        assert!(svc.is_descendant_of(&root));
        assert!(!svc.is_child_of(&root));
        assert!(svc.is_child_of(&app));
        assert!(!sibling.is_descendant_of(&app));
        assert!(!app.is_descendant_of(&app));
    }

    #[test]
    fn test_deserialised_names_are_validated() {
        let name: FabricName = serde_json::from_value(serde_json::json!("fabric:/app/")).unwrap();
        assert_eq!(name.as_str(), "fabric:/app");
        let unscoped = serde_json::json!("a\u{e9}\u{e9}\u{e9}\u{e9}");
        assert!(serde_json::from_value::<FabricName>(unscoped).is_err());
        assert!(serde_json::from_value::<PropertyName>(serde_json::json!("")).is_err());
        assert!(serde_json::from_value::<NodeName>(serde_json::json!("_Node_0")).is_ok());

        let root: FabricName = serde_json::from_value(serde_json::json!("fabric:/")).unwrap();
        assert!(!root.is_descendant_of(&root));
        assert!(!root.is_child_of(&root));
        assert!(name.is_descendant_of(&root));
    }
}
