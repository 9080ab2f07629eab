//! Player fragment

use crate::error::ProtocolError;
use crate::game::guid::ObjectGuid;
use crate::net::sink::ByteSink;
use crate::update::dynamic::DynamicUpdateField;
use crate::update::field::{OptionalUpdateField, UpdateField, UpdateFieldArray};
use crate::update::mask::UpdateMask;
use crate::update::record::{ChangeTracked, UpdateRecord};
use crate::update::value::{TrackedElement, UpdateValue};
use crate::update::viewer::{ViewContext, ViewerFlags, VisibilityRule, VisibilityTable};

pub const MAX_QUEST_LOG_SIZE: usize = 25;
pub const MAX_QUEST_OBJECTIVES: usize = 4;
pub const MAX_DECLINED_NAME_CASES: usize = 5;

/// Bit width of the name length prefix
const NAME_LENGTH_BITS: usize = 6;
/// Longest name the length prefix can carry
pub const MAX_NAME_LENGTH: usize = (1 << NAME_LENGTH_BITS) - 1;
/// Bit width of each declined name length prefix
const DECLINED_NAME_LENGTH_BITS: usize = 7;

/// Bits of [`PlayerData`]
pub mod bits {
    pub const CUSTOMIZATIONS: usize = 1;
    pub const NAME: usize = 2;
    pub const GUILD: usize = 3;
    pub const PLAYER_FLAGS: usize = 4;
    pub const GUILD_RANK: usize = 5;
    pub const DECLINED_NAMES: usize = 6;
    pub const PLAYER_TITLE: usize = 7;
    pub const HONOR_LEVEL: usize = 8;
    pub const QUEST_LOG: usize = 9;
    pub const QUEST_LOG_FIRST: usize = 10;
}

/// One character appearance choice
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChrCustomizationChoice {
    pub option_id: u32,
    pub choice_id: u32,
}

impl UpdateValue for ChrCustomizationChoice {
    fn write_value<S: ByteSink + ?Sized>(&self, sink: &mut S) {
        sink.write_u32(self.option_id);
        sink.write_u32(self.choice_id);
    }
}

impl TrackedElement for ChrCustomizationChoice {}

/// Grammatical case forms of the character name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeclinedNames {
    pub names: [String; MAX_DECLINED_NAME_CASES],
}

impl UpdateValue for DeclinedNames {
    fn write_value<S: ByteSink + ?Sized>(&self, sink: &mut S) {
        for name in &self.names {
            sink.write_size_bits(DECLINED_NAME_LENGTH_BITS, name.len());
        }
        sink.flush_bits();
        for name in &self.names {
            sink.write_string(name);
        }
    }
}

impl TrackedElement for DeclinedNames {}

/// One quest log slot
#[derive(Debug, Clone, PartialEq)]
pub struct QuestLog {
    pub quest_id: UpdateField<i32>,
    pub state_flags: UpdateField<u32>,
    pub end_time: UpdateField<i64>,
    pub objective_progress: UpdateFieldArray<i16, MAX_QUEST_OBJECTIVES>,
}

impl Default for QuestLog {
    fn default() -> Self {
        Self {
            quest_id: UpdateField::at(1),
            state_flags: UpdateField::at(2),
            end_time: UpdateField::at(3),
            objective_progress: UpdateFieldArray::new(4, 5),
        }
    }
}

impl UpdateRecord for QuestLog {
    const BIT_COUNT: usize = 9;

    fn write_create<S: ByteSink + ?Sized>(&self, sink: &mut S, _ctx: &ViewContext<'_>) {
        self.quest_id.write(sink);
        self.state_flags.write(sink);
        self.end_time.write(sink);
        for i in 0..MAX_QUEST_OBJECTIVES {
            self.objective_progress.write_element(sink, i);
        }
    }

    fn write_update<S: ByteSink + ?Sized>(
        &self,
        sink: &mut S,
        mask: &UpdateMask,
        _ignore_nested: bool,
        _ctx: &ViewContext<'_>,
    ) {
        if mask.test(0) {
            if mask.test(1) {
                self.quest_id.write(sink);
            }
            if mask.test(2) {
                self.state_flags.write(sink);
            }
            if mask.test(3) {
                self.end_time.write(sink);
            }
        }
        if mask.test(4) {
            for i in 0..MAX_QUEST_OBJECTIVES {
                if mask.test(self.objective_progress.element_bit(i)) {
                    self.objective_progress.write_element(sink, i);
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerData {
    pub customizations: DynamicUpdateField<ChrCustomizationChoice>,
    pub name: UpdateField<String>,
    pub guild: UpdateField<ObjectGuid>,
    pub player_flags: UpdateField<u32>,
    pub guild_rank: UpdateField<u8>,
    pub declined_names: OptionalUpdateField<DeclinedNames>,
    pub player_title: UpdateField<u32>,
    pub honor_level: UpdateField<u32>,
    pub quest_log: UpdateFieldArray<ChangeTracked<QuestLog>, MAX_QUEST_LOG_SIZE>,
}

impl Default for PlayerData {
    fn default() -> Self {
        Self {
            customizations: DynamicUpdateField::new(bits::CUSTOMIZATIONS),
            name: UpdateField::at(bits::NAME),
            guild: UpdateField::at(bits::GUILD),
            player_flags: UpdateField::at(bits::PLAYER_FLAGS),
            guild_rank: UpdateField::at(bits::GUILD_RANK),
            declined_names: OptionalUpdateField::new(bits::DECLINED_NAMES),
            player_title: UpdateField::at(bits::PLAYER_TITLE),
            honor_level: UpdateField::at(bits::HONOR_LEVEL),
            quest_log: UpdateFieldArray::new(bits::QUEST_LOG, bits::QUEST_LOG_FIRST),
        }
    }
}

impl PlayerData {
    /// Reject names the length prefix cannot represent
    pub fn check_name(name: &str) -> Result<(), ProtocolError> {
        if name.len() > MAX_NAME_LENGTH {
            return Err(ProtocolError::InvalidStringLength {
                length: name.len(),
                max: MAX_NAME_LENGTH,
            });
        }
        Ok(())
    }

    fn write_name<S: ByteSink + ?Sized>(&self, sink: &mut S) {
        sink.write_size_bits(NAME_LENGTH_BITS, self.name.get().len());
        sink.write_string(self.name.get());
    }

    fn write_declined_names<S: ByteSink + ?Sized>(&self, sink: &mut S) {
        if self.declined_names.write_presence(sink) {
            if let Some(names) = self.declined_names.get() {
                names.write_value(sink);
            }
        }
    }
}

impl ChangeTracked<PlayerData> {
    /// Rename the character, rejecting names the length prefix cannot carry
    pub fn set_name(&mut self, name: &str) -> Result<(), ProtocolError> {
        PlayerData::check_name(name)?;
        self.modify(|p| &mut p.name).set(name.to_string());
        Ok(())
    }
}

impl UpdateRecord for PlayerData {
    const BIT_COUNT: usize = bits::QUEST_LOG_FIRST + MAX_QUEST_LOG_SIZE;

    const VISIBILITY: VisibilityTable = VisibilityTable::new(&[
        VisibilityRule::bit(bits::DECLINED_NAMES, ViewerFlags::OWNER),
        VisibilityRule::range(
            bits::QUEST_LOG,
            bits::QUEST_LOG_FIRST + MAX_QUEST_LOG_SIZE - 1,
            ViewerFlags::OWNER.union(ViewerFlags::PARTY_MEMBER),
        ),
    ]);

    fn write_create<S: ByteSink + ?Sized>(&self, sink: &mut S, ctx: &ViewContext<'_>) {
        sink.write_bit(ctx.options.skip_quest_log_changes_mask);
        sink.write_size_bits(
            ctx.options.dynamic_size_bits as usize,
            self.customizations.len(),
        );
        sink.flush_bits();

        for choice in self.customizations.iter() {
            choice.write_value(sink);
        }
        self.write_name(sink);
        self.guild.write(sink);
        self.player_flags.write(sink);
        self.guild_rank.write(sink);
        if ctx.sees(&Self::VISIBILITY, bits::DECLINED_NAMES) {
            self.write_declined_names(sink);
        }
        self.player_title.write(sink);
        self.honor_level.write(sink);
        if ctx.sees(&Self::VISIBILITY, bits::QUEST_LOG) {
            for quest in self.quest_log.iter() {
                quest.write_create(sink, ctx);
            }
        }
        sink.flush_bits();
    }

    fn write_update<S: ByteSink + ?Sized>(
        &self,
        sink: &mut S,
        mask: &UpdateMask,
        ignore_nested: bool,
        ctx: &ViewContext<'_>,
    ) {
        let skip_quest_log_changes_mask = ctx.options.skip_quest_log_changes_mask;
        sink.write_bit(skip_quest_log_changes_mask);
        if mask.test(0) && mask.test(bits::CUSTOMIZATIONS) {
            if ignore_nested {
                self.customizations
                    .write_complete_update_mask(sink, ctx.options.dynamic_size_bits);
            } else {
                self.customizations
                    .write_update_mask(sink, ctx.options.dynamic_size_bits);
            }
        }
        sink.flush_bits();

        if mask.test(0) {
            if mask.test(bits::CUSTOMIZATIONS) {
                for (i, choice) in self.customizations.iter().enumerate() {
                    if ignore_nested || self.customizations.has_changed(i) {
                        choice.write_value(sink);
                    }
                }
            }
            if mask.test(bits::NAME) {
                self.write_name(sink);
            }
            if mask.test(bits::GUILD) {
                self.guild.write(sink);
            }
            if mask.test(bits::PLAYER_FLAGS) {
                self.player_flags.write(sink);
            }
            if mask.test(bits::GUILD_RANK) {
                self.guild_rank.write(sink);
            }
            if mask.test(bits::DECLINED_NAMES) {
                self.write_declined_names(sink);
            }
            if mask.test(bits::PLAYER_TITLE) {
                self.player_title.write(sink);
            }
            if mask.test(bits::HONOR_LEVEL) {
                self.honor_level.write(sink);
            }
        }
        if mask.test(bits::QUEST_LOG) {
            for (i, quest) in self.quest_log.iter().enumerate() {
                if !mask.test(self.quest_log.element_bit(i)) {
                    continue;
                }
                if skip_quest_log_changes_mask {
                    quest.write_create(sink, ctx);
                } else {
                    quest.write_update(sink, ignore_nested, ctx);
                }
            }
        }
        sink.flush_bits();
    }

    fn clear_nested_changes(&mut self) {
        self.customizations.clear_changes();
        self.declined_names.clear_changes();
        self.quest_log.clear_changes();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::entity::TypeId;
    use crate::game::relations::RelationTable;
    use crate::net::buffer::PacketBuffer;
    use crate::update::record::{read_mask_header, HasChangesMask};
    use crate::update::WriteOptions;

    fn context(
        relations: &RelationTable,
        flags: ViewerFlags,
        skip_quest_log_changes_mask: bool,
    ) -> ViewContext<'_> {
        ViewContext {
            object: ObjectGuid::player(1),
            object_type: TypeId::Player,
            receiver: ObjectGuid::player(2),
            flags,
            policy: relations,
            options: WriteOptions {
                skip_quest_log_changes_mask,
                ..WriteOptions::default()
            },
        }
    }

    fn player_with_quest() -> ChangeTracked<PlayerData> {
        let mut player = ChangeTracked::<PlayerData>::default();
        player
            .modify_at(|p| &mut p.quest_log, 3)
            .modify(|q| &mut q.quest_id)
            .set(12345);
        player
    }

    #[test]
    fn test_quest_log_uses_nested_mask_by_default() {
        let relations = RelationTable::new();
        let player = player_with_quest();

        let mut buf = PacketBuffer::new();
        player.write_update(&mut buf, false, &context(&relations, ViewerFlags::PARTY_MEMBER, false));
        let mut reader = PacketBuffer::from_bytes(buf.as_bytes());

        let mask = read_mask_header(&mut reader, PlayerData::BIT_COUNT, 32).unwrap();
        assert!(mask.test(bits::QUEST_LOG_FIRST + 3));
        assert!(!reader.read_bit().unwrap());
        reader.reset_bit_reader();

        let nested = read_mask_header(&mut reader, QuestLog::BIT_COUNT, 32).unwrap();
        assert!(nested.test(1));
        assert_eq!(reader.read_i32().unwrap(), 12345);
        assert!(!reader.has_remaining());
    }

    #[test]
    fn test_quest_log_sent_in_full_when_skipping_masks() {
        let relations = RelationTable::new();
        let player = player_with_quest();

        let mut buf = PacketBuffer::new();
        player.write_update(&mut buf, false, &context(&relations, ViewerFlags::PARTY_MEMBER, true));
        let mut reader = PacketBuffer::from_bytes(buf.as_bytes());

        read_mask_header(&mut reader, PlayerData::BIT_COUNT, 32).unwrap();
        assert!(reader.read_bit().unwrap());
        assert_eq!(reader.read_i32().unwrap(), 12345);
        assert_eq!(reader.read_u32().unwrap(), 0);
        assert_eq!(reader.read_i64().unwrap(), 0);
        for _ in 0..MAX_QUEST_OBJECTIVES {
            assert_eq!(reader.read_u16().unwrap(), 0);
        }
        assert!(!reader.has_remaining());
    }

    #[test]
    fn test_quest_log_hidden_from_strangers() {
        let player = player_with_quest();
        let effective = player.effective_mask(ViewerFlags::empty());
        assert!(!effective.test(bits::QUEST_LOG));
        assert!(!effective.test(bits::QUEST_LOG_FIRST + 3));
        assert!(effective.test(0));
    }

    #[test]
    fn test_name_is_length_prefixed() {
        let relations = RelationTable::new();
        let mut player = ChangeTracked::<PlayerData>::default();
        player.modify(|p| &mut p.name).set("Jaina".to_string());

        let mut buf = PacketBuffer::new();
        player.write_update(&mut buf, false, &context(&relations, ViewerFlags::empty(), false));
        let mut reader = PacketBuffer::from_bytes(buf.as_bytes());

        read_mask_header(&mut reader, PlayerData::BIT_COUNT, 32).unwrap();
        reader.read_bit().unwrap();
        reader.reset_bit_reader();
        assert_eq!(reader.read_bits(NAME_LENGTH_BITS).unwrap(), 5);
        assert_eq!(reader.read_string(5).unwrap(), "Jaina");
    }

    #[test]
    fn test_check_name() {
        assert!(PlayerData::check_name("Thrall").is_ok());
        assert_eq!(
            PlayerData::check_name(&"x".repeat(64)),
            Err(ProtocolError::InvalidStringLength {
                length: 64,
                max: 63
            })
        );
    }

    #[test]
    fn test_set_name_rejects_long_names() {
        let mut player = ChangeTracked::<PlayerData>::default();
        assert!(player.set_name("Sylvanas").is_ok());
        assert_eq!(player.name.get(), "Sylvanas");

        player.clear_changes_mask();
        assert!(player.set_name(&"x".repeat(70)).is_err());
        assert_eq!(player.name.get(), "Sylvanas");
        assert!(!player.is_changed());
    }

    #[test]
    #[should_panic(expected = "does not fit in a 6-bit prefix")]
    fn test_unchecked_long_name_panics_on_write() {
        let relations = RelationTable::new();
        let mut player = ChangeTracked::<PlayerData>::default();
        player.modify(|p| &mut p.name).set("x".repeat(70));

        let mut buf = PacketBuffer::new();
        player.write_update(&mut buf, false, &context(&relations, ViewerFlags::empty(), false));
    }

    #[test]
    #[should_panic(expected = "does not fit in a 7-bit prefix")]
    fn test_long_declined_name_panics_on_write() {
        let mut names = DeclinedNames::default();
        names.names[2] = "y".repeat(128);

        let mut buf = PacketBuffer::new();
        names.write_value(&mut buf);
    }

    #[test]
    fn test_declined_names_owner_only() {
        let relations = RelationTable::new();
        let mut player = ChangeTracked::<PlayerData>::default();
        player
            .modify_optional(|p| &mut p.declined_names)
            .get_or_insert_default()
            .names[0] = "Jainy".to_string();

        let stranger = player.effective_mask(ViewerFlags::empty());
        assert!(!stranger.test(bits::DECLINED_NAMES));

        let mut buf = PacketBuffer::new();
        player.write_create(&mut buf, &context(&relations, ViewerFlags::OWNER, false));
        let owner_len = buf.as_bytes().len();

        let mut buf = PacketBuffer::new();
        player.write_create(&mut buf, &context(&relations, ViewerFlags::empty(), false));
        assert!(buf.as_bytes().len() < owner_len);
    }
}
