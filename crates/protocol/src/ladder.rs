//! Capability interface ladders.
//!
//! A subsystem's capability surface grows release over release as a linear
//! chain of interface versions. Version *N* redeclares every slot of version
//! *N−1* in unchanged order and appends new slots after them, so a handle to
//! version *N* can stand in wherever version *N−1* is expected.
//!
//! [`InterfaceLadder::new`] + [`InterfaceLadder::extend`] make that invariant
//! hold by construction. Ladders assembled from external descriptors go
//! through [`InterfaceLadder::from_descriptors`], which validates it.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{InterfaceId, OperationName, SubsystemName};

/// Errors raised while building or validating a ladder.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LadderError {
    /// A subsystem name was empty.
    #[error("ladder declared with an empty subsystem name")]
    EmptySubsystem,

    /// The ladder has no versions.
    #[error("ladder for {subsystem} has no versions")]
    Empty {
        /// Subsystem of the offending ladder.
        subsystem: SubsystemName,
    },

    /// Versions are not numbered 1..=N in order.
    #[error("{subsystem} version {found} appears where version {expected} was expected")]
    VersionGap {
        /// Subsystem of the offending ladder.
        subsystem: SubsystemName,
        /// Version number expected at this position.
        expected: u32,
        /// Version number actually found.
        found: u32,
    },

    /// Two versions share one identity token.
    #[error("interface id {id} is declared more than once")]
    DuplicateId {
        /// The reused identity token.
        id: InterfaceId,
    },

    /// A catalog already holds a ladder for this subsystem.
    #[error("a ladder for {subsystem} is already registered")]
    DuplicateSubsystem {
        /// The subsystem registered twice.
        subsystem: SubsystemName,
    },

    /// A descriptor names a subsystem other than the ladder's.
    #[error("version {version} belongs to {found}, not {subsystem}")]
    ForeignSubsystem {
        /// Subsystem of the ladder.
        subsystem: SubsystemName,
        /// Version carrying the wrong subsystem.
        version: u32,
        /// Subsystem the descriptor names.
        found: SubsystemName,
    },

    /// A version does not start with its predecessor's slots in the same order.
    #[error("{subsystem} v{version} does not redeclare v{} slots in order (first difference at slot {slot})", .version - 1)]
    BrokenPrefix {
        /// Subsystem of the offending ladder.
        subsystem: SubsystemName,
        /// Version whose slot list diverges.
        version: u32,
        /// Index of the first diverging slot.
        slot: usize,
    },

    /// A slot was declared with an empty operation name.
    #[error("{subsystem} v{version} declares a slot with an empty name")]
    EmptySlot {
        /// Subsystem of the offending ladder.
        subsystem: SubsystemName,
        /// Version with the empty slot.
        version: u32,
    },

    /// One operation name occupies two slots of the same version.
    #[error("{subsystem} v{version} declares '{operation}' twice")]
    DuplicateSlot {
        /// Subsystem of the offending ladder.
        subsystem: SubsystemName,
        /// Version with the duplicate.
        version: u32,
        /// The duplicated operation.
        operation: OperationName,
    },
}

// ---------------------------------------------------------------------------
// Descriptors
// ---------------------------------------------------------------------------

/// One version of a capability interface: its identity token and ordered
/// operation slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceDescriptor {
    /// Identity token callers request this version by.
    pub id: InterfaceId,
    /// Subsystem whose ladder this version belongs to.
    pub subsystem: SubsystemName,
    /// 1-based version number within the ladder.
    pub version: u32,
    /// Operation slots in binary order.
    pub slots: Vec<OperationName>,
}

impl InterfaceDescriptor {
    /// Returns the slot index of `operation`, if this version declares it.
    pub fn slot_index(&self, operation: &str) -> Option<usize> {
        self.slots.iter().position(|s| s.as_str() == operation)
    }

    /// Returns `true` if this version declares `operation`.
    pub fn declares(&self, operation: &str) -> bool {
        self.slot_index(operation).is_some()
    }

    /// Returns the conventional interface name: the subsystem name for
    /// version 1, suffixed with the version number after that (`QueryClient`,
    /// `QueryClient2`, ...).
    pub fn display_name(&self) -> String {
        if self.version <= 1 {
            self.subsystem.to_string()
        } else {
            format!("{}{}", self.subsystem, self.version)
        }
    }
}

// ---------------------------------------------------------------------------
// Ladder
// ---------------------------------------------------------------------------

/// The ordered chain of interface versions of one subsystem.
///
/// Deserialised ladders pass through [`InterfaceLadder::from_descriptors`],
/// so every instance satisfies [`InterfaceLadder::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "LadderRecord")]
pub struct InterfaceLadder {
    subsystem: SubsystemName,
    versions: Vec<InterfaceDescriptor>,
}

/// Unvalidated wire form of an [`InterfaceLadder`].
#[derive(Deserialize)]
struct LadderRecord {
    subsystem: SubsystemName,
    versions: Vec<InterfaceDescriptor>,
}

impl TryFrom<LadderRecord> for InterfaceLadder {
    type Error = LadderError;

    fn try_from(record: LadderRecord) -> Result<Self, Self::Error> {
        Self::from_descriptors(record.subsystem, record.versions)
    }
}

impl InterfaceLadder {
    /// Starts a ladder with its version-1 interface.
    pub fn new(
        subsystem: SubsystemName,
        root_id: InterfaceId,
        root_slots: &[&str],
    ) -> Result<Self, LadderError> {
        let mut ladder = Self {
            subsystem,
            versions: Vec::new(),
        };
        ladder.push_version(root_id, Vec::new(), root_slots)?;
        Ok(ladder)
    }

    /// Appends a new version that redeclares every existing slot and then adds
    /// `appended_slots` after them.
    ///
    /// An empty `appended_slots` is allowed: a version may exist only to pin a
    /// new identity token.
    pub fn extend(mut self, id: InterfaceId, appended_slots: &[&str]) -> Result<Self, LadderError> {
        let inherited = self
            .versions
            .last()
            .map(|v| v.slots.clone())
            .unwrap_or_default();
        self.push_version(id, inherited, appended_slots)?;
        Ok(self)
    }

    fn push_version(
        &mut self,
        id: InterfaceId,
        mut slots: Vec<OperationName>,
        appended: &[&str],
    ) -> Result<(), LadderError> {
        if self.versions.iter().any(|v| v.id == id) {
            return Err(LadderError::DuplicateId { id });
        }
        let version = self.versions.len() as u32 + 1;
        for name in appended {
            let operation = OperationName::new(*name).ok_or_else(|| LadderError::EmptySlot {
                subsystem: self.subsystem.clone(),
                version,
            })?;
            if slots.contains(&operation) {
                return Err(LadderError::DuplicateSlot {
                    subsystem: self.subsystem.clone(),
                    version,
                    operation,
                });
            }
            slots.push(operation);
        }
        self.versions.push(InterfaceDescriptor {
            id,
            subsystem: self.subsystem.clone(),
            version,
            slots,
        });
        Ok(())
    }

    /// Assembles a ladder from externally supplied descriptors and validates
    /// the append-only invariant.
    pub fn from_descriptors(
        subsystem: SubsystemName,
        mut descriptors: Vec<InterfaceDescriptor>,
    ) -> Result<Self, LadderError> {
        descriptors.sort_by_key(|d| d.version);
        let ladder = Self {
            subsystem,
            versions: descriptors,
        };
        ladder.validate()?;
        Ok(ladder)
    }

    /// Checks the ladder invariants:
    ///
    /// - versions are numbered 1..=N contiguously;
    /// - identity tokens are distinct;
    /// - no version declares one operation twice;
    /// - version *N−1*'s slots are an order-preserving prefix of version *N*'s.
    pub fn validate(&self) -> Result<(), LadderError> {
        if self.versions.is_empty() {
            return Err(LadderError::Empty {
                subsystem: self.subsystem.clone(),
            });
        }
        let mut ids = HashSet::new();
        for (index, current) in self.versions.iter().enumerate() {
            let expected = index as u32 + 1;
            if current.version != expected {
                return Err(LadderError::VersionGap {
                    subsystem: self.subsystem.clone(),
                    expected,
                    found: current.version,
                });
            }
            if current.subsystem != self.subsystem {
                return Err(LadderError::ForeignSubsystem {
                    subsystem: self.subsystem.clone(),
                    version: current.version,
                    found: current.subsystem.clone(),
                });
            }
            if !ids.insert(current.id) {
                return Err(LadderError::DuplicateId { id: current.id });
            }
            let mut seen = HashSet::new();
            for slot in &current.slots {
                if !seen.insert(slot) {
                    return Err(LadderError::DuplicateSlot {
                        subsystem: self.subsystem.clone(),
                        version: current.version,
                        operation: slot.clone(),
                    });
                }
            }
            if index > 0 {
                let previous = &self.versions[index - 1];
                if let Some(slot) = first_prefix_violation(&previous.slots, &current.slots) {
                    return Err(LadderError::BrokenPrefix {
                        subsystem: self.subsystem.clone(),
                        version: current.version,
                        slot,
                    });
                }
            }
        }
        Ok(())
    }

    /// Returns the subsystem this ladder describes.
    pub fn subsystem(&self) -> &SubsystemName {
        &self.subsystem
    }

    /// Returns all versions, oldest first.
    pub fn versions(&self) -> &[InterfaceDescriptor] {
        &self.versions
    }

    /// Returns the descriptor of `version`.
    pub fn get(&self, version: u32) -> Option<&InterfaceDescriptor> {
        version
            .checked_sub(1)
            .and_then(|i| self.versions.get(i as usize))
    }

    /// Returns the newest version.
    pub fn latest(&self) -> &InterfaceDescriptor {
        // Every constructor, deserialisation included, rejects empty ladders.
        &self.versions[self.versions.len() - 1]
    }

    /// Returns the descriptor identified by `id`.
    pub fn by_id(&self, id: InterfaceId) -> Option<&InterfaceDescriptor> {
        self.versions.iter().find(|v| v.id == id)
    }

    /// Returns the slot index of `operation` in `version`.
    pub fn slot_index(&self, version: u32, operation: &str) -> Option<usize> {
        self.get(version).and_then(|d| d.slot_index(operation))
    }

    /// Returns the lowest version that declares `operation`.
    pub fn introduced_in(&self, operation: &str) -> Option<u32> {
        self.versions
            .iter()
            .find(|v| v.declares(operation))
            .map(|v| v.version)
    }

    /// Returns `true` if a handle to version `from` may be used where version
    /// `to` is expected.
    ///
    /// Only downward (or same-version) conversions are always valid.
    pub fn is_upcast_compatible(&self, from: u32, to: u32) -> bool {
        match (self.get(from), self.get(to)) {
            (Some(f), Some(t)) => from >= to && f.slots.starts_with(&t.slots),
            _ => false,
        }
    }
}

/// Returns the first index at which `previous` is not a prefix of `current`.
fn first_prefix_violation(previous: &[OperationName], current: &[OperationName]) -> Option<usize> {
    for (i, slot) in previous.iter().enumerate() {
        match current.get(i) {
            Some(c) if c == slot => continue,
            _ => return Some(i),
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subsystem() -> SubsystemName {
        SubsystemName::new("Sample").unwrap()
    }

    fn ladder() -> InterfaceLadder {
        InterfaceLadder::new(subsystem(), InterfaceId::from_u128(1), &["A", "B"])
            .and_then(|l| l.extend(InterfaceId::from_u128(2), &["C"]))
            .and_then(|l| l.extend(InterfaceId::from_u128(3), &["D", "E"]))
            .unwrap()
    }

    #[test]
    fn test_extend_redeclares_and_appends() {
        let l = ladder();
        let names: Vec<&str> = l.latest().slots.iter().map(|s| s.as_str()).collect();
        assert_eq!(names, ["A", "B", "C", "D", "E"]);
        assert_eq!(l.slot_index(2, "C"), Some(2));
        assert_eq!(l.slot_index(1, "C"), None);
        assert_eq!(l.introduced_in("D"), Some(3));
    }

    #[test]
    fn test_every_version_prefixes_the_next() {
        let l = ladder();
        for pair in l.versions().windows(2) {
            assert!(pair[1].slots.starts_with(&pair[0].slots));
            assert!(pair[1].slots.len() >= pair[0].slots.len());
        }
        l.validate().unwrap();
    }

    #[test]
    fn test_extend_rejects_reused_id_and_duplicate_slot() {
        let dup_id = ladder().extend(InterfaceId::from_u128(2), &["F"]);
        assert!(matches!(dup_id, Err(LadderError::DuplicateId { .. })));

        let dup_slot = ladder().extend(InterfaceId::from_u128(9), &["A"]);
        assert!(matches!(dup_slot, Err(LadderError::DuplicateSlot { version: 4, .. })));
    }

    #[test]
    fn test_validate_detects_reordered_slots() {
        let mut descriptors = ladder().versions().to_vec();
        descriptors[1].slots.swap(0, 1);
        let result = InterfaceLadder::from_descriptors(subsystem(), descriptors);
        assert_eq!(
            result,
            Err(LadderError::BrokenPrefix {
                subsystem: subsystem(),
                version: 2,
                slot: 0,
            })
        );
    }

    #[test]
    fn test_validate_detects_removed_slot() {
        let mut descriptors = ladder().versions().to_vec();
        descriptors[2].slots.remove(2);
        let result = InterfaceLadder::from_descriptors(subsystem(), descriptors);
        assert!(matches!(
            result,
            Err(LadderError::BrokenPrefix { version: 3, slot: 2, .. })
        ));
    }

    #[test]
    fn test_validate_detects_version_gap() {
        let mut descriptors = ladder().versions().to_vec();
        descriptors.remove(1);
        let result = InterfaceLadder::from_descriptors(subsystem(), descriptors);
        assert!(matches!(
            result,
            Err(LadderError::VersionGap { expected: 2, found: 3, .. })
        ));
    }

    #[test]
    fn test_upcast_only_goes_down() {
        let l = ladder();
        assert!(l.is_upcast_compatible(3, 1));
        assert!(l.is_upcast_compatible(2, 2));
        assert!(!l.is_upcast_compatible(1, 2));
        assert!(!l.is_upcast_compatible(4, 1));
    }

    #[test]
    fn test_deserialisation_validates_ladder() {
        let text = serde_json::to_string(&ladder()).unwrap();
        let parsed: InterfaceLadder = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, ladder());
        assert_eq!(parsed.latest().version, 3);

        let empty = serde_json::json!({ "subsystem": "Sample", "versions": [] });
        assert!(serde_json::from_value::<InterfaceLadder>(empty).is_err());

        let mut broken = serde_json::to_value(ladder()).unwrap();
        broken["versions"][2]["slots"] = serde_json::json!(["A", "D"]);
        assert!(serde_json::from_value::<InterfaceLadder>(broken).is_err());
    }
}
