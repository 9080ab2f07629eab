//! Per-receiver update block builders
//!
//! Create block:
//! ```text
//! u8    UpdateType::CreateObject (CreateObject2 for the receiver's own object)
//! guid  packed object guid
//! u8    TypeId
//! u32   payload size
//! u8    viewer flags
//! ...   every fragment's create data, in TypeMask order
//! ```
//!
//! Values block:
//! ```text
//! u8    UpdateType::Values
//! guid  packed object guid
//! u32   payload size
//! u32   changed TypeMask
//! ...   every changed fragment's update data, in TypeMask order
//! ```
//!
//! A full values block has the same layout with every present fragment in the
//! TypeMask and every visible field written.

use tracing::trace;

use super::frame::{UpdateBlock, UpdateType};
use super::viewer::{resolve_viewer_flags, ViewContext, VisibilityPolicy};
use super::WriteOptions;
use crate::game::entity::WorldEntity;
use crate::game::guid::ObjectGuid;
use crate::net::buffer::PacketBuffer;
use crate::net::sink::ByteSink;

/// Resolve how `receiver` sees `entity`
pub fn view_context<'a>(
    entity: &WorldEntity,
    receiver: ObjectGuid,
    policy: &'a dyn VisibilityPolicy,
    options: WriteOptions,
) -> ViewContext<'a> {
    ViewContext {
        object: entity.guid(),
        object_type: entity.type_id(),
        receiver,
        flags: resolve_viewer_flags(entity.guid(), entity.owner(), receiver, policy),
        policy,
        options,
    }
}

/// Full snapshot of `entity` for a receiver that does not know it yet
pub fn build_create_block(
    entity: &WorldEntity,
    receiver: ObjectGuid,
    policy: &dyn VisibilityPolicy,
    options: WriteOptions,
) -> UpdateBlock {
    let ctx = view_context(entity, receiver, policy, options);
    let update_type = if ctx.is_self() {
        UpdateType::CreateObject2
    } else {
        UpdateType::CreateObject
    };

    let mut payload = PacketBuffer::with_capacity(256);
    payload.write_u8(ctx.flags.bits());
    entity.write_create(&mut payload, &ctx);
    payload.flush_bits();

    let mut data = PacketBuffer::with_capacity(payload.len() + 24);
    data.write_u8(update_type as u8);
    data.write_packed_guid(entity.guid());
    data.write_u8(entity.type_id() as u8);
    data.write_u32(payload.len() as u32);
    data.append(&payload);

    trace!(
        guid = %entity.guid(),
        receiver = %receiver,
        flags = ?ctx.flags,
        size = data.len(),
        "Built create block"
    );

    UpdateBlock {
        update_type,
        guid: entity.guid(),
        data,
    }
}

/// Changed fields of `entity`, or `None` when nothing changed since the last clear
pub fn build_values_block(
    entity: &WorldEntity,
    receiver: ObjectGuid,
    policy: &dyn VisibilityPolicy,
    options: WriteOptions,
) -> Option<UpdateBlock> {
    if !entity.is_changed() {
        return None;
    }

    let ctx = view_context(entity, receiver, policy, options);
    let mut payload = PacketBuffer::with_capacity(128);
    entity.write_update(&mut payload, &ctx);
    Some(values_block(entity, &ctx, payload))
}

/// Every visible field of `entity` as a values block, whether or not it changed
///
/// Used to resynchronize a receiver that missed a values block.
pub fn build_full_values_block(
    entity: &WorldEntity,
    receiver: ObjectGuid,
    policy: &dyn VisibilityPolicy,
    options: WriteOptions,
) -> UpdateBlock {
    let ctx = view_context(entity, receiver, policy, options);
    let mut payload = PacketBuffer::with_capacity(256);
    entity.write_full_update(&mut payload, &ctx);
    values_block(entity, &ctx, payload)
}

fn values_block(entity: &WorldEntity, ctx: &ViewContext<'_>, mut payload: PacketBuffer) -> UpdateBlock {
    payload.flush_bits();

    let mut data = PacketBuffer::with_capacity(payload.len() + 24);
    data.write_u8(UpdateType::Values as u8);
    data.write_packed_guid(entity.guid());
    data.write_u32(payload.len() as u32);
    data.append(&payload);

    trace!(
        guid = %entity.guid(),
        receiver = %ctx.receiver,
        fragments = ?entity.changed_fragments(),
        size = data.len(),
        "Built values block"
    );

    UpdateBlock {
        update_type: UpdateType::Values,
        guid: entity.guid(),
        data,
    }
}
