//! Per-viewer visibility
//!
//! Each record type carries a static [`VisibilityTable`] naming the fields that
//! are restricted to some relationship. For every (object, receiver) pair the
//! relationship is resolved once into [`ViewerFlags`], turned into an allowed
//! mask and ANDed with the record's changes before anything is written.
//!
//! Some values also depend on who is looking. Those are projected by the
//! functions in [`overrides`] at write time and never touch stored data.

use bitflags::bitflags;
use tracing::trace;

use super::mask::UpdateMask;
use super::WriteOptions;
use crate::game::entity::TypeId;
use crate::game::guid::ObjectGuid;

bitflags! {
    /// Relationship between the receiver and the object being written
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ViewerFlags: u8 {
        /// Receiver is the object or owns it
        const OWNER = 1 << 0;
        /// Receiver is in the object's party or raid
        const PARTY_MEMBER = 1 << 1;
        /// Receiver controls the unit (pets, vehicles, charmed units)
        const UNIT_ALL = 1 << 2;
        /// Receiver has an empathy effect on the object
        const EMPATH = 1 << 3;
    }
}

/// Bits `first..=last` need at least one of `flags`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisibilityRule {
    first: usize,
    last: usize,
    flags: ViewerFlags,
}

impl VisibilityRule {
    pub const fn bit(bit: usize, flags: ViewerFlags) -> Self {
        Self {
            first: bit,
            last: bit,
            flags,
        }
    }

    /// Inclusive range, typically an array bit and its element bits
    pub const fn range(first: usize, last: usize, flags: ViewerFlags) -> Self {
        Self { first, last, flags }
    }

    #[inline]
    fn covers(&self, bit: usize) -> bool {
        (self.first..=self.last).contains(&bit)
    }
}

/// Static list of restricted fields for one record type
///
/// Bits not covered by any rule are public.
#[derive(Debug, Clone, Copy)]
pub struct VisibilityTable {
    rules: &'static [VisibilityRule],
}

impl VisibilityTable {
    /// Every field public
    pub const PUBLIC: VisibilityTable = VisibilityTable { rules: &[] };

    pub const fn new(rules: &'static [VisibilityRule]) -> Self {
        Self { rules }
    }

    /// Flags of which at least one is needed to see `bit` (empty = public)
    pub fn required_flags(&self, bit: usize) -> ViewerFlags {
        self.rules
            .iter()
            .filter(|rule| rule.covers(bit))
            .fold(ViewerFlags::empty(), |acc, rule| acc | rule.flags)
    }

    /// Whether a viewer with `flags` may see `bit`
    pub fn is_visible(&self, bit: usize, flags: ViewerFlags) -> bool {
        let required = self.required_flags(bit);
        required.is_empty() || required.intersects(flags)
    }

    /// Mask of every bit a viewer with `flags` may receive
    pub fn allowed_mask(&self, bit_count: usize, flags: ViewerFlags) -> UpdateMask {
        let mut allowed = UpdateMask::all(bit_count);
        for rule in self.rules {
            for bit in rule.first..=rule.last {
                if !self.is_visible(bit, flags) {
                    allowed.reset(bit);
                }
            }
        }
        allowed
    }
}

/// World knowledge the visibility rules need
///
/// Injected by the caller; the replication core never looks anything up
/// on its own.
pub trait VisibilityPolicy {
    /// Relationship flags of `receiver` toward `object`, `None` when unknown
    fn relationship(&self, object: ObjectGuid, receiver: ObjectGuid) -> Option<ViewerFlags>;

    /// Whether `object` is close enough to `receiver` to be replicated
    fn is_in_range(&self, object: ObjectGuid, receiver: ObjectGuid) -> bool;

    /// `object` is controlled by a player of the other faction grouped with `receiver`
    fn is_cross_faction_party_member(&self, object: ObjectGuid, receiver: ObjectGuid) -> bool;

    /// Faction template of `receiver`, if it has one
    fn faction_template_of(&self, receiver: ObjectGuid) -> Option<u32>;

    /// `receiver` may loot `object`
    fn can_loot(&self, object: ObjectGuid, receiver: ObjectGuid) -> bool;

    /// `object` has been tapped by someone other than `receiver`
    fn is_tapped_by_other(&self, object: ObjectGuid, receiver: ObjectGuid) -> bool;

    /// `receiver` already skinned `object`
    fn is_skinned_by(&self, object: ObjectGuid, receiver: ObjectGuid) -> bool;

    /// `receiver` can see gossip options on `object`
    fn can_see_gossip(&self, object: ObjectGuid, receiver: ObjectGuid) -> bool;

    /// `receiver` can see the spell-click interaction on `object`
    fn can_see_spell_click(&self, object: ObjectGuid, receiver: ObjectGuid) -> bool;

    /// Display shown to game masters instead of the stored one
    fn game_master_display(&self, _object: ObjectGuid, _receiver: ObjectGuid) -> Option<u32> {
        None
    }
}

/// Resolve how `receiver` relates to `object`
///
/// An unresolved pair is treated as a stranger.
pub fn resolve_viewer_flags(
    object: ObjectGuid,
    owner: ObjectGuid,
    receiver: ObjectGuid,
    policy: &dyn VisibilityPolicy,
) -> ViewerFlags {
    let Some(mut flags) = policy.relationship(object, receiver) else {
        trace!(
            object = %object,
            receiver = %receiver,
            "Unresolved viewer relationship, using stranger visibility"
        );
        return ViewerFlags::empty();
    };

    if receiver == object || (!owner.is_empty() && receiver == owner) {
        flags |= ViewerFlags::OWNER;
    }
    flags
}

/// Everything a record writer needs to know about the current receiver
#[derive(Clone, Copy)]
pub struct ViewContext<'a> {
    pub object: ObjectGuid,
    pub object_type: TypeId,
    pub receiver: ObjectGuid,
    pub flags: ViewerFlags,
    pub policy: &'a dyn VisibilityPolicy,
    pub options: WriteOptions,
}

impl<'a> ViewContext<'a> {
    /// Whether this receiver may see `bit` of a record using `table`
    #[inline]
    pub fn sees(&self, table: &VisibilityTable, bit: usize) -> bool {
        table.is_visible(bit, self.flags)
    }

    /// Receiver is looking at itself
    pub fn is_self(&self) -> bool {
        self.object == self.receiver
    }
}

impl std::fmt::Debug for ViewContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewContext")
            .field("object", &self.object)
            .field("object_type", &self.object_type)
            .field("receiver", &self.receiver)
            .field("flags", &self.flags)
            .field("options", &self.options)
            .finish()
    }
}

/// Receiver-dependent value projections
pub mod overrides {
    use super::ViewContext;
    use crate::game::entity::TypeId;
    use crate::update::fields::object::UnitDynamicFlags;
    use crate::update::fields::unit::NpcFlags;

    /// Grouped players of the other faction see the unit as their own faction
    pub fn faction_template(stored: u32, ctx: &ViewContext<'_>) -> u32 {
        if ctx.is_self() || !ctx.policy.is_cross_faction_party_member(ctx.object, ctx.receiver) {
            return stored;
        }
        ctx.policy.faction_template_of(ctx.receiver).unwrap_or(stored)
    }

    /// Loot, tap and skin flags as this receiver is allowed to see them
    pub fn dynamic_flags(stored: u32, ctx: &ViewContext<'_>) -> u32 {
        if !matches!(ctx.object_type, TypeId::Unit | TypeId::Player) {
            return stored;
        }

        let mut flags = UnitDynamicFlags::from_bits_retain(stored);
        flags.remove(UnitDynamicFlags::TAPPED);
        if ctx.object_type == TypeId::Unit {
            if ctx.policy.is_tapped_by_other(ctx.object, ctx.receiver) {
                flags.insert(UnitDynamicFlags::TAPPED);
            }
            if !ctx.policy.can_loot(ctx.object, ctx.receiver) {
                flags.remove(UnitDynamicFlags::LOOTABLE);
            }
            if flags.contains(UnitDynamicFlags::CAN_SKIN)
                && ctx.policy.is_skinned_by(ctx.object, ctx.receiver)
            {
                flags.remove(UnitDynamicFlags::CAN_SKIN);
            }
        }
        flags.bits()
    }

    /// Interaction flags hidden from receivers that could not use them
    pub fn npc_flags(stored: u32, ctx: &ViewContext<'_>) -> u32 {
        let mut flags = NpcFlags::from_bits_retain(stored);
        if !ctx.policy.can_see_gossip(ctx.object, ctx.receiver) {
            flags.remove(NpcFlags::GOSSIP | NpcFlags::QUEST_GIVER);
        }
        if !ctx.policy.can_see_spell_click(ctx.object, ctx.receiver) {
            flags.remove(NpcFlags::SPELL_CLICK);
        }
        flags.bits()
    }

    /// Game masters may be shown a different model
    pub fn display_id(stored: u32, ctx: &ViewContext<'_>) -> u32 {
        ctx.policy
            .game_master_display(ctx.object, ctx.receiver)
            .unwrap_or(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::guid::HighGuid;
    use crate::game::relations::RelationTable;

    static TABLE: VisibilityTable = VisibilityTable::new(&[
        VisibilityRule::range(2, 3, ViewerFlags::OWNER),
        VisibilityRule::bit(3, ViewerFlags::EMPATH),
        VisibilityRule::bit(5, ViewerFlags::PARTY_MEMBER),
    ]);

    #[test]
    fn test_stranger_sees_public_bits_only() {
        let allowed = TABLE.allowed_mask(8, ViewerFlags::empty());
        assert_eq!(allowed.to_string(), "11001011");
    }

    #[test]
    fn test_flags_open_their_bits() {
        let owner = TABLE.allowed_mask(8, ViewerFlags::OWNER);
        assert!(owner.test(2));
        assert!(owner.test(3));
        assert!(!owner.test(5));

        let empath = TABLE.allowed_mask(8, ViewerFlags::EMPATH);
        assert!(!empath.test(2));
        assert!(empath.test(3));

        let party = TABLE.allowed_mask(8, ViewerFlags::PARTY_MEMBER);
        assert!(party.test(5));
        assert!(!party.test(2));
    }

    #[test]
    fn test_allowed_mask_filters_every_dirty_bit() {
        let dirty = UpdateMask::all(8);
        for flags in [
            ViewerFlags::empty(),
            ViewerFlags::OWNER,
            ViewerFlags::PARTY_MEMBER,
            ViewerFlags::EMPATH,
            ViewerFlags::UNIT_ALL,
        ] {
            let effective = &dirty & &TABLE.allowed_mask(8, flags);
            for bit in 0..8 {
                if !TABLE.is_visible(bit, flags) {
                    assert!(!effective.test(bit), "bit {} leaked to {:?}", bit, flags);
                }
            }
            assert!(effective.is_consistent());
        }
    }

    #[test]
    fn test_unresolved_receiver_is_stranger() {
        let relations = RelationTable::new();
        let item = ObjectGuid::create(HighGuid::Item, 0, 25, 1);
        let owner = ObjectGuid::player(1);

        let flags = resolve_viewer_flags(item, owner, owner, &relations);
        assert_eq!(flags, ViewerFlags::empty());
    }

    #[test]
    fn test_owner_and_policy_flags() {
        let mut relations = RelationTable::new();
        let player = ObjectGuid::player(1);
        relations.add_receiver(player);

        let item = ObjectGuid::create(HighGuid::Item, 0, 25, 1);
        assert_eq!(
            resolve_viewer_flags(item, player, player, &relations),
            ViewerFlags::OWNER
        );

        let pet = ObjectGuid::create(HighGuid::Creature, 0, 3, 2);
        relations.relate(pet, player, ViewerFlags::UNIT_ALL);
        assert_eq!(
            resolve_viewer_flags(pet, player, player, &relations),
            ViewerFlags::OWNER | ViewerFlags::UNIT_ALL
        );

        let stranger = ObjectGuid::player(2);
        relations.add_receiver(stranger);
        assert_eq!(
            resolve_viewer_flags(pet, player, stranger, &relations),
            ViewerFlags::empty()
        );
    }
}
