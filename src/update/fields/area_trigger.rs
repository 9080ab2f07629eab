//! Area trigger fragment

use crate::error::ProtocolError;
use crate::game::guid::ObjectGuid;
use crate::net::buffer::PacketBuffer;
use crate::net::sink::ByteSink;
use crate::update::field::UpdateField;
use crate::update::mask::UpdateMask;
use crate::update::record::{ChangeTracked, UpdateRecord};
use crate::update::value::{TrackedElement, UpdateValue};
use crate::update::viewer::ViewContext;

/// Bits of [`AreaTriggerData`]
pub mod bits {
    pub const CASTER: usize = 1;
    pub const DURATION: usize = 2;
    pub const SPELL_ID: usize = 3;
    pub const SHAPE: usize = 4;
    pub const BOUNDS_RADIUS_2D: usize = 5;
    pub const TIME_TO_TARGET: usize = 6;
}

/// Geometry of an area trigger, written as a type tag followed by its payload
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AreaTriggerShape {
    Sphere {
        radius: f32,
        radius_target: f32,
    },
    Box {
        extents: [f32; 3],
        extents_target: [f32; 3],
    },
    Cylinder {
        radius: f32,
        radius_target: f32,
        height: f32,
        height_target: f32,
    },
    Disk {
        inner_radius: f32,
        outer_radius: f32,
        height: f32,
    },
}

impl Default for AreaTriggerShape {
    fn default() -> Self {
        AreaTriggerShape::Sphere {
            radius: 0.0,
            radius_target: 0.0,
        }
    }
}

impl AreaTriggerShape {
    pub fn type_tag(&self) -> u8 {
        match self {
            AreaTriggerShape::Sphere { .. } => 0,
            AreaTriggerShape::Box { .. } => 1,
            AreaTriggerShape::Cylinder { .. } => 3,
            AreaTriggerShape::Disk { .. } => 4,
        }
    }

    /// Largest horizontal extent, used for the 2D bounds radius
    pub fn max_radius(&self) -> f32 {
        match *self {
            AreaTriggerShape::Sphere {
                radius,
                radius_target,
            }
            | AreaTriggerShape::Cylinder {
                radius,
                radius_target,
                ..
            } => radius.max(radius_target),
            AreaTriggerShape::Box {
                extents,
                extents_target,
            } => {
                let x = extents[0].max(extents_target[0]);
                let y = extents[1].max(extents_target[1]);
                (x * x + y * y).sqrt()
            }
            AreaTriggerShape::Disk { outer_radius, .. } => outer_radius,
        }
    }

    /// Decode a shape written by [`UpdateValue::write_value`]
    pub fn read(reader: &mut PacketBuffer) -> Result<Self, ProtocolError> {
        let tag = reader.read_u8()?;
        let shape = match tag {
            0 => AreaTriggerShape::Sphere {
                radius: reader.read_f32()?,
                radius_target: reader.read_f32()?,
            },
            1 => {
                let mut extents = [0.0; 3];
                for value in extents.iter_mut() {
                    *value = reader.read_f32()?;
                }
                let mut extents_target = [0.0; 3];
                for value in extents_target.iter_mut() {
                    *value = reader.read_f32()?;
                }
                AreaTriggerShape::Box {
                    extents,
                    extents_target,
                }
            }
            3 => AreaTriggerShape::Cylinder {
                radius: reader.read_f32()?,
                radius_target: reader.read_f32()?,
                height: reader.read_f32()?,
                height_target: reader.read_f32()?,
            },
            4 => AreaTriggerShape::Disk {
                inner_radius: reader.read_f32()?,
                outer_radius: reader.read_f32()?,
                height: reader.read_f32()?,
            },
            other => return Err(ProtocolError::InvalidShapeType(other)),
        };
        Ok(shape)
    }
}

impl UpdateValue for AreaTriggerShape {
    fn write_value<S: ByteSink + ?Sized>(&self, sink: &mut S) {
        sink.write_u8(self.type_tag());
        match *self {
            AreaTriggerShape::Sphere {
                radius,
                radius_target,
            } => {
                sink.write_f32(radius);
                sink.write_f32(radius_target);
            }
            AreaTriggerShape::Box {
                extents,
                extents_target,
            } => {
                for value in extents.iter().chain(extents_target.iter()) {
                    sink.write_f32(*value);
                }
            }
            AreaTriggerShape::Cylinder {
                radius,
                radius_target,
                height,
                height_target,
            } => {
                sink.write_f32(radius);
                sink.write_f32(radius_target);
                sink.write_f32(height);
                sink.write_f32(height_target);
            }
            AreaTriggerShape::Disk {
                inner_radius,
                outer_radius,
                height,
            } => {
                sink.write_f32(inner_radius);
                sink.write_f32(outer_radius);
                sink.write_f32(height);
            }
        }
    }
}

impl TrackedElement for AreaTriggerShape {}

#[derive(Debug, Clone, PartialEq)]
pub struct AreaTriggerData {
    pub caster: UpdateField<ObjectGuid>,
    pub duration: UpdateField<u32>,
    pub spell_id: UpdateField<i32>,
    pub shape: UpdateField<AreaTriggerShape>,
    pub bounds_radius_2d: UpdateField<f32>,
    pub time_to_target: UpdateField<u32>,
}

impl Default for AreaTriggerData {
    fn default() -> Self {
        Self {
            caster: UpdateField::at(bits::CASTER),
            duration: UpdateField::at(bits::DURATION),
            spell_id: UpdateField::at(bits::SPELL_ID),
            shape: UpdateField::at(bits::SHAPE),
            bounds_radius_2d: UpdateField::at(bits::BOUNDS_RADIUS_2D),
            time_to_target: UpdateField::at(bits::TIME_TO_TARGET),
        }
    }
}

impl UpdateRecord for AreaTriggerData {
    const BIT_COUNT: usize = 7;

    fn write_create<S: ByteSink + ?Sized>(&self, sink: &mut S, _ctx: &ViewContext<'_>) {
        self.caster.write(sink);
        self.duration.write(sink);
        self.spell_id.write(sink);
        self.shape.write(sink);
        self.bounds_radius_2d.write(sink);
        self.time_to_target.write(sink);
    }

    fn write_update<S: ByteSink + ?Sized>(
        &self,
        sink: &mut S,
        mask: &UpdateMask,
        _ignore_nested: bool,
        _ctx: &ViewContext<'_>,
    ) {
        if mask.test(0) {
            if mask.test(bits::CASTER) {
                self.caster.write(sink);
            }
            if mask.test(bits::DURATION) {
                self.duration.write(sink);
            }
            if mask.test(bits::SPELL_ID) {
                self.spell_id.write(sink);
            }
            if mask.test(bits::SHAPE) {
                self.shape.write(sink);
            }
            if mask.test(bits::BOUNDS_RADIUS_2D) {
                self.bounds_radius_2d.write(sink);
            }
            if mask.test(bits::TIME_TO_TARGET) {
                self.time_to_target.write(sink);
            }
        }
        sink.flush_bits();
    }
}

impl ChangeTracked<AreaTriggerData> {
    /// Replace the shape and keep the 2D bounds radius in step with it
    pub fn set_shape(&mut self, shape: AreaTriggerShape) {
        let radius = shape.max_radius();
        self.modify(|a| &mut a.shape).set(shape);
        if *self.bounds_radius_2d.get() != radius {
            self.modify(|a| &mut a.bounds_radius_2d).set(radius);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_reads_back() {
        let shapes = [
            AreaTriggerShape::Sphere {
                radius: 5.0,
                radius_target: 8.0,
            },
            AreaTriggerShape::Box {
                extents: [1.0, 2.0, 3.0],
                extents_target: [4.0, 5.0, 6.0],
            },
            AreaTriggerShape::Disk {
                inner_radius: 2.0,
                outer_radius: 10.0,
                height: 1.5,
            },
        ];

        for shape in shapes {
            let mut buf = PacketBuffer::new();
            shape.write_value(&mut buf);
            let mut reader = PacketBuffer::from_bytes(buf.as_bytes());
            assert_eq!(AreaTriggerShape::read(&mut reader).unwrap(), shape);
            assert!(!reader.has_remaining());
        }
    }

    #[test]
    fn test_unknown_shape_tag_is_rejected() {
        let mut reader = PacketBuffer::from_bytes(&[2, 0, 0, 0, 0]);
        assert_eq!(
            AreaTriggerShape::read(&mut reader),
            Err(ProtocolError::InvalidShapeType(2))
        );
    }

    #[test]
    fn test_box_bounds_radius() {
        let shape = AreaTriggerShape::Box {
            extents: [3.0, 4.0, 1.0],
            extents_target: [0.0, 0.0, 0.0],
        };
        assert_eq!(shape.max_radius(), 5.0);
    }

    #[test]
    fn test_set_shape_updates_bounds_radius() {
        use crate::update::record::HasChangesMask;

        let mut trigger = ChangeTracked::<AreaTriggerData>::default();
        trigger.set_shape(AreaTriggerShape::Cylinder {
            radius: 4.0,
            radius_target: 6.0,
            height: 2.0,
            height_target: 2.0,
        });
        assert_eq!(*trigger.bounds_radius_2d.get(), 6.0);
        assert!(trigger.changes_mask().test(bits::SHAPE));
        assert!(trigger.changes_mask().test(bits::BOUNDS_RADIUS_2D));

        trigger.clear_changes_mask();
        trigger.set_shape(AreaTriggerShape::Disk {
            inner_radius: 1.0,
            outer_radius: 6.0,
            height: 1.0,
        });
        assert!(trigger.changes_mask().test(bits::SHAPE));
        assert!(!trigger.changes_mask().test(bits::BOUNDS_RADIUS_2D));
    }
}
