//! Control loaders.
//!
//! During synchronization every control of the structure description is handed
//! to the loader registered for its kind. A loader declares the control's items
//! and registers its event handlers and write listeners through the
//! [`BridgeContext`]. Kinds without a registered loader fall back to
//! [`GenericControlLoader`].

use crate::bridge::BridgeContext;
use crate::ack::WriteOptions;
use crate::error::BridgeResult;
use crate::store::ObjectCommon;
use async_trait::async_trait;
use lxbridge_protocol::{ControlDescriptor, ControllerUuid, ItemId, StructureFile, ValueType};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// The closed set of control kinds the bridge distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ControlKind {
    /// On/off switch.
    Switch,
    /// Dimmable light.
    Dimmer,
    /// Momentary push button.
    Pushbutton,
    /// Blind or shutter.
    Jalousie,
    /// Read-only analog value.
    InfoOnlyAnalog,
    /// Read-only digital value.
    InfoOnlyDigital,
    /// Read-only text.
    TextState,
    /// Any other control type.
    Unknown,
}

impl ControlKind {
    /// All kinds.
    pub const ALL: [ControlKind; 8] = [
        ControlKind::Switch,
        ControlKind::Dimmer,
        ControlKind::Pushbutton,
        ControlKind::Jalousie,
        ControlKind::InfoOnlyAnalog,
        ControlKind::InfoOnlyDigital,
        ControlKind::TextState,
        ControlKind::Unknown,
    ];

    /// Resolves the kind from a structure `type` string.
    pub fn from_type(control_type: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|kind| {
                *kind != ControlKind::Unknown && kind.as_str().eq_ignore_ascii_case(control_type)
            })
            .unwrap_or(ControlKind::Unknown)
    }

    /// Returns the structure `type` string of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlKind::Switch => "Switch",
            ControlKind::Dimmer => "Dimmer",
            ControlKind::Pushbutton => "Pushbutton",
            ControlKind::Jalousie => "Jalousie",
            ControlKind::InfoOnlyAnalog => "InfoOnlyAnalog",
            ControlKind::InfoOnlyDigital => "InfoOnlyDigital",
            ControlKind::TextState => "TextState",
            ControlKind::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for ControlKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Translates one control into items and handler registrations.
#[async_trait]
pub trait ControlLoader: Send + Sync {
    /// Loads a control. `uuid` is the key of the control in the structure.
    async fn load(
        &self,
        ctx: &BridgeContext,
        kind: ControlKind,
        uuid: &ControllerUuid,
        control: &ControlDescriptor,
    ) -> BridgeResult<()>;
}

/// Returns the item path prefix for a control.
///
/// Characters the host does not accept in a path segment are replaced by `_`.
pub fn item_prefix(uuid: &ControllerUuid) -> ItemId {
    ItemId::new(sanitize_segment(uuid.as_str()))
}

fn sanitize_segment(segment: &str) -> String {
    segment
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Exposes every state of a control as a read-only item.
///
/// Items are named `<control uuid>.<state name>` and follow the controller's
/// value events.
#[derive(Debug, Default)]
pub struct GenericControlLoader;

#[async_trait]
impl ControlLoader for GenericControlLoader {
    async fn load(
        &self,
        ctx: &BridgeContext,
        kind: ControlKind,
        uuid: &ControllerUuid,
        control: &ControlDescriptor,
    ) -> BridgeResult<()> {
        let prefix = item_prefix(uuid);
        for (name, state_uuid) in control.state_uuids() {
            let id = prefix.child(&sanitize_segment(&name));
            let common = ObjectCommon::new(format!("{} {name}", control.name), "value", ValueType::Mixed);
            ctx.register_writable_item(id, common, state_uuid, None, WriteOptions::default())
                .await?;
        }
        debug!(%uuid, %kind, name = %control.name, "control loaded as read-only states");
        Ok(())
    }
}

/// Result of loading a structure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadSummary {
    /// Controls loaded successfully, by kind.
    pub loaded: BTreeMap<ControlKind, usize>,
    /// Controls handled by the fallback loader.
    pub fallback: usize,
    /// Controls whose loader failed.
    pub failed: usize,
}

impl LoadSummary {
    /// Returns the number of controls loaded successfully.
    pub fn total_loaded(&self) -> usize {
        self.loaded.values().sum()
    }
}

/// Maps control kinds to loaders.
pub struct LoaderRegistry {
    loaders: HashMap<ControlKind, Arc<dyn ControlLoader>>,
    fallback: Arc<dyn ControlLoader>,
}

impl LoaderRegistry {
    /// Creates a registry where every kind uses the generic loader.
    pub fn new() -> Self {
        Self {
            loaders: HashMap::new(),
            fallback: Arc::new(GenericControlLoader),
        }
    }

    /// Registers the loader for a kind.
    pub fn with_loader(mut self, kind: ControlKind, loader: Arc<dyn ControlLoader>) -> Self {
        self.register(kind, loader);
        self
    }

    /// Registers the loader for a kind, replacing an earlier one.
    pub fn register(&mut self, kind: ControlKind, loader: Arc<dyn ControlLoader>) {
        self.loaders.insert(kind, loader);
    }

    /// Returns true if a dedicated loader is registered for the kind.
    pub fn has_loader(&self, kind: ControlKind) -> bool {
        self.loaders.contains_key(&kind)
    }

    /// Returns the loader for a kind, or the fallback.
    pub fn loader_for(&self, kind: ControlKind) -> Arc<dyn ControlLoader> {
        self.loaders
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.fallback))
    }

    /// Loads every control of the structure, sub-controls after their parent.
    ///
    /// A failing control is logged and skipped; its sub-controls are still loaded.
    pub async fn load_structure(&self, ctx: &BridgeContext, structure: &StructureFile) -> LoadSummary {
        let mut summary = LoadSummary::default();
        let mut pending: Vec<(&ControllerUuid, &ControlDescriptor)> =
            structure.controls.iter().rev().collect();

        while let Some((uuid, control)) = pending.pop() {
            let kind = ControlKind::from_type(&control.control_type);
            if !self.has_loader(kind) {
                summary.fallback += 1;
            }

            match self.loader_for(kind).load(ctx, kind, uuid, control).await {
                Ok(()) => *summary.loaded.entry(kind).or_default() += 1,
                Err(e) => {
                    summary.failed += 1;
                    warn!(%uuid, %kind, name = %control.name, error = %e, "failed to load control");
                }
            }

            pending.extend(control.sub_controls.iter().rev());
        }

        debug!(
            loaded = summary.total_loaded(),
            fallback = summary.fallback,
            failed = summary.failed,
            "structure loaded"
        );
        summary
    }
}

impl Default for LoaderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_from_type() {
        assert_eq!(ControlKind::from_type("Switch"), ControlKind::Switch);
        assert_eq!(ControlKind::from_type("infoonlyanalog"), ControlKind::InfoOnlyAnalog);
        assert_eq!(ControlKind::from_type("LightControllerV2"), ControlKind::Unknown);
        assert_eq!(ControlKind::from_type("Unknown"), ControlKind::Unknown);
        assert_eq!(ControlKind::Jalousie.to_string(), "Jalousie");
    }

    #[test]
    fn prefix_replaces_path_separators() {
        assert_eq!(
            item_prefix(&ControllerUuid::from("0f1e.ab*cd")).as_str(),
            "0f1e_ab_cd"
        );
        assert_eq!(
            item_prefix(&ControllerUuid::from("0f1e-ab")).as_str(),
            "0f1e-ab"
        );
    }

    #[test]
    fn registry_falls_back_to_generic() {
        struct Nothing;

        #[async_trait]
        impl ControlLoader for Nothing {
            async fn load(
                &self,
                _ctx: &BridgeContext,
                _kind: ControlKind,
                _uuid: &ControllerUuid,
                _control: &ControlDescriptor,
            ) -> BridgeResult<()> {
                Ok(())
            }
        }

        let registry = LoaderRegistry::new().with_loader(ControlKind::Switch, Arc::new(Nothing));
        assert!(registry.has_loader(ControlKind::Switch));
        assert!(!registry.has_loader(ControlKind::Dimmer));
        assert!(Arc::ptr_eq(
            &registry.loader_for(ControlKind::Dimmer),
            &registry.fallback
        ));
    }
}
