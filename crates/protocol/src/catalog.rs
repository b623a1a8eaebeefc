//! Capability negotiation.
//!
//! A [`CapabilityCatalog`] knows every ladder a client was built with. An
//! engine reports, through [`EngineCapabilities`], the highest version of each
//! subsystem it implements. Negotiating an identity token against the two
//! either yields the requested descriptor or a
//! [`FabricError::CapabilityMismatch`]; a request is never silently served by
//! a lower version.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::ladder::{InterfaceDescriptor, InterfaceLadder, LadderError};
use crate::{FabricError, InterfaceId, SubsystemName};

// ---------------------------------------------------------------------------
// Engine side
// ---------------------------------------------------------------------------

/// Highest implemented interface version per subsystem, as reported by an
/// engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineCapabilities {
    highest: BTreeMap<String, u32>,
}

impl EngineCapabilities {
    /// Creates an empty capability set (the engine implements nothing).
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that the engine implements `subsystem` up to `highest_version`.
    #[must_use]
    pub fn with(mut self, subsystem: &SubsystemName, highest_version: u32) -> Self {
        self.highest
            .insert(subsystem.as_str().to_string(), highest_version);
        self
    }

    /// Returns the highest implemented version of `subsystem`.
    pub fn highest_version(&self, subsystem: &str) -> Option<u32> {
        self.highest.get(subsystem).copied()
    }

    /// Returns `true` if the engine implements `descriptor`'s version.
    pub fn supports(&self, descriptor: &InterfaceDescriptor) -> bool {
        self.highest_version(descriptor.subsystem.as_str())
            .is_some_and(|h| descriptor.version <= h)
    }

    /// Iterates `(subsystem, highest_version)` pairs in subsystem order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.highest.iter().map(|(s, v)| (s.as_str(), *v))
    }
}

// ---------------------------------------------------------------------------
// Client side
// ---------------------------------------------------------------------------

/// Every ladder known to a client, with an index from identity token to
/// `(subsystem, version)`.
#[derive(Debug, Clone, Default)]
pub struct CapabilityCatalog {
    ladders: BTreeMap<String, InterfaceLadder>,
    index: HashMap<InterfaceId, (String, u32)>,
}

impl CapabilityCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a ladder after validating it.
    ///
    /// Rejects a second ladder for the same subsystem and identity tokens
    /// already used by another ladder.
    pub fn register(&mut self, ladder: InterfaceLadder) -> Result<(), LadderError> {
        ladder.validate()?;
        let key = ladder.subsystem().as_str().to_string();
        if self.ladders.contains_key(&key) {
            return Err(LadderError::DuplicateSubsystem {
                subsystem: ladder.subsystem().clone(),
            });
        }
        if let Some(clash) = ladder
            .versions()
            .iter()
            .find(|d| self.index.contains_key(&d.id))
        {
            return Err(LadderError::DuplicateId { id: clash.id });
        }
        for descriptor in ladder.versions() {
            self.index
                .insert(descriptor.id, (key.clone(), descriptor.version));
        }
        self.ladders.insert(key, ladder);
        Ok(())
    }

    /// Builder-style [`CapabilityCatalog::register`].
    pub fn with_ladder(mut self, ladder: InterfaceLadder) -> Result<Self, LadderError> {
        self.register(ladder)?;
        Ok(self)
    }

    /// Returns the ladder of `subsystem`.
    pub fn ladder(&self, subsystem: &str) -> Option<&InterfaceLadder> {
        self.ladders.get(subsystem)
    }

    /// Iterates all ladders in subsystem order.
    pub fn ladders(&self) -> impl Iterator<Item = &InterfaceLadder> {
        self.ladders.values()
    }

    /// Resolves an identity token to its descriptor.
    pub fn lookup(&self, id: InterfaceId) -> Option<&InterfaceDescriptor> {
        let (subsystem, version) = self.index.get(&id)?;
        self.ladders.get(subsystem)?.get(*version)
    }

    /// Resolves `id` and checks the engine implements it.
    pub fn negotiate(
        &self,
        id: InterfaceId,
        engine: &EngineCapabilities,
    ) -> Result<&InterfaceDescriptor, FabricError> {
        let Some(descriptor) = self.lookup(id) else {
            tracing::warn!(interface = %id, "requested interface identity is unknown");
            return Err(FabricError::CapabilityMismatch {
                requested: id,
                subsystem: None,
                requested_version: None,
                highest_supported: None,
            });
        };
        if engine.supports(descriptor) {
            return Ok(descriptor);
        }
        let highest = engine.highest_version(descriptor.subsystem.as_str());
        tracing::warn!(
            interface = %id,
            subsystem = %descriptor.subsystem,
            requested_version = descriptor.version,
            highest_supported = ?highest,
            "engine does not implement requested interface version"
        );
        Err(FabricError::CapabilityMismatch {
            requested: id,
            subsystem: Some(descriptor.subsystem.clone()),
            requested_version: Some(descriptor.version),
            highest_supported: highest,
        })
    }

    /// Returns the newest version of `subsystem` that both this catalog and
    /// the engine know.
    pub fn best_supported(
        &self,
        subsystem: &str,
        engine: &EngineCapabilities,
    ) -> Option<&InterfaceDescriptor> {
        let ladder = self.ladders.get(subsystem)?;
        let highest = engine.highest_version(subsystem)?;
        ladder.get(highest.min(ladder.latest().version))
    }
}
