//! Control loaders used by the replay command.
//!
//! Switches and dimmers become writable items that send commands to the
//! controller; every other kind falls back to the generic read-only loader.

use async_trait::async_trait;
use lxbridge_engine::{
    item_prefix, BridgeContext, BridgeError, BridgeResult, ControlKind, ControlLoader,
    LoaderRegistry, ObjectCommon, WriteOptions,
};
use lxbridge_protocol::{ControlDescriptor, ControllerUuid, ValueType};
use std::sync::Arc;

/// Builds the registry the replay command loads structures with.
pub fn registry() -> LoaderRegistry {
    LoaderRegistry::new()
        .with_loader(ControlKind::Switch, Arc::new(SwitchLoader))
        .with_loader(ControlKind::Dimmer, Arc::new(DimmerLoader))
}

fn state_named(control: &ControlDescriptor, name: &str) -> BridgeResult<ControllerUuid> {
    control
        .state_uuids()
        .into_iter()
        .find(|(state, _)| state == name)
        .map(|(_, uuid)| uuid)
        .ok_or_else(|| {
            BridgeError::Handler(format!("{} has no '{name}' state", control.name))
        })
}

/// `<uuid>.active`, sends `on`/`off`.
struct SwitchLoader;

#[async_trait]
impl ControlLoader for SwitchLoader {
    async fn load(
        &self,
        ctx: &BridgeContext,
        _kind: ControlKind,
        uuid: &ControllerUuid,
        control: &ControlDescriptor,
    ) -> BridgeResult<()> {
        let state = state_named(control, "active")?;
        let common = ObjectCommon::new(&control.name, "switch", ValueType::Boolean).writable();
        ctx.register_writable_item(
            item_prefix(uuid).child("active"),
            common,
            state,
            Some(ctx.command_listener(control.uuid_action.clone())),
            WriteOptions::default().skip_if_unchanged(),
        )
        .await
    }
}

/// `<uuid>.position`, sends the clamped level as a number.
struct DimmerLoader;

#[async_trait]
impl ControlLoader for DimmerLoader {
    async fn load(
        &self,
        ctx: &BridgeContext,
        _kind: ControlKind,
        uuid: &ControllerUuid,
        control: &ControlDescriptor,
    ) -> BridgeResult<()> {
        let state = state_named(control, "position")?;
        let common = ObjectCommon::new(&control.name, "level.dimmer", ValueType::Number)
            .writable()
            .with_unit("%")
            .with_range(0.0, 100.0);
        ctx.register_writable_item(
            item_prefix(uuid).child("position"),
            common,
            state,
            Some(ctx.command_listener(control.uuid_action.clone())),
            WriteOptions::default().with_integer_range(Some(0), Some(100)),
        )
        .await
    }
}
