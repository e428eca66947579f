//! The instructions reflection cares about, decoded into a closed set of variants.

use crate::reader::Instruction;
use crate::ReflectError;

/// Opcodes of the instructions that [`Op`] decodes.
pub mod opcode {
    /// `OpEntryPoint`
    pub const ENTRY_POINT: u16 = 15;
    /// `OpTypeImage`
    pub const TYPE_IMAGE: u16 = 25;
    /// `OpTypeSampledImage`
    pub const TYPE_SAMPLED_IMAGE: u16 = 27;
    /// `OpTypeRuntimeArray`
    pub const TYPE_RUNTIME_ARRAY: u16 = 29;
    /// `OpTypePointer`
    pub const TYPE_POINTER: u16 = 32;
    /// `OpVariable`
    pub const VARIABLE: u16 = 59;
    /// `OpDecorate`
    pub const DECORATE: u16 = 71;
    /// `OpTypeAccelerationStructureKHR`
    pub const TYPE_ACCELERATION_STRUCTURE: u16 = 5341;
}

/// The storage class of a pointer or variable.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum StorageClass {
    /// Opaque handles: images, samplers and acceleration structures.
    UniformConstant,
    /// Uniform buffer blocks.
    Uniform,
    /// Image texel pointers.
    Image,
    /// Storage buffer blocks.
    StorageBuffer,
    /// Push constant blocks.
    PushConstant,
    /// Any other storage class, which never holds a descriptor.
    Other(u32),
}

impl StorageClass {
    /// Decode a raw storage class operand.
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => StorageClass::UniformConstant,
            2 => StorageClass::Uniform,
            9 => StorageClass::PushConstant,
            11 => StorageClass::Image,
            12 => StorageClass::StorageBuffer,
            other => StorageClass::Other(other),
        }
    }
}

/// The decorations that locate a resource.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Decoration {
    /// `Binding`: the binding index within a descriptor set.
    Binding,
    /// `DescriptorSet`: the descriptor set index.
    DescriptorSet,
    /// Any other decoration.
    Other(u32),
}

impl Decoration {
    /// Decode a raw decoration operand.
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            33 => Decoration::Binding,
            34 => Decoration::DescriptorSet,
            other => Decoration::Other(other),
        }
    }
}

/// The `Sampled` operand of an image type.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ImageSampling {
    /// Only known at run time.
    Runtime,
    /// Used with a sampler.
    Sampled,
    /// Used without a sampler, as a storage image.
    Storage,
    /// Not a valid value.
    Invalid(u32),
}

impl ImageSampling {
    /// Decode a raw `Sampled` operand.
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => ImageSampling::Runtime,
            1 => ImageSampling::Sampled,
            2 => ImageSampling::Storage,
            other => ImageSampling::Invalid(other),
        }
    }
}

/// A decoded instruction. Anything reflection doesn't look at is [`Op::Other`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Op {
    /// `OpEntryPoint`
    EntryPoint {
        /// The raw execution model.
        model: u32,
        /// The id of the entry point function.
        function: u32,
        /// The name of the entry point.
        name: String,
    },
    /// `OpDecorate`
    Decorate {
        /// The decorated id.
        target: u32,
        /// The decoration.
        decoration: Decoration,
        /// The first literal of the decoration, if any.
        value: Option<u32>,
    },
    /// `OpVariable`
    Variable {
        /// The id of the variable's pointer type.
        result_type: u32,
        /// The id of the variable.
        result: u32,
        /// Where the variable lives.
        storage_class: StorageClass,
    },
    /// `OpTypeImage`
    TypeImage {
        /// The id of the image type.
        result: u32,
        /// The id of the sampled component type.
        sampled_type: u32,
        /// The raw dimensionality.
        dim: u32,
        /// The raw depth flag.
        depth: u32,
        /// Whether the image is arrayed.
        arrayed: bool,
        /// Whether the image is multisampled.
        multisampled: bool,
        /// How the image is accessed.
        sampling: ImageSampling,
        /// The raw image format.
        format: u32,
    },
    /// `OpTypeSampledImage`
    TypeSampledImage {
        /// The id of the sampled image type.
        result: u32,
        /// The id of the wrapped image type.
        image: u32,
    },
    /// `OpTypeRuntimeArray`
    TypeRuntimeArray {
        /// The id of the array type.
        result: u32,
        /// The id of the element type.
        element: u32,
    },
    /// `OpTypePointer`
    TypePointer {
        /// The id of the pointer type.
        result: u32,
        /// The storage class pointed into.
        storage_class: StorageClass,
        /// The id of the pointee type.
        pointee: u32,
    },
    /// `OpTypeAccelerationStructureKHR`
    TypeAccelerationStructure {
        /// The id of the acceleration structure type.
        result: u32,
    },
    /// Any instruction reflection skips.
    Other {
        /// The opcode of the skipped instruction.
        opcode: u16,
    },
}

impl Op {
    /// Decode an instruction.
    pub fn decode(inst: &Instruction) -> Result<Op, ReflectError> {
        let op = match inst.opcode() {
            opcode::ENTRY_POINT => Op::EntryPoint {
                model: inst.word(1)?,
                function: inst.word(2)?,
                name: inst.string(3)?,
            },
            opcode::DECORATE => {
                let decoration = Decoration::from_raw(inst.word(2)?);
                let value = match decoration {
                    Decoration::Binding | Decoration::DescriptorSet => Some(inst.word(3)?),
                    Decoration::Other(_) => inst.optional_word(3),
                };

                Op::Decorate {
                    target: inst.word(1)?,
                    decoration,
                    value,
                }
            }
            opcode::VARIABLE => Op::Variable {
                result_type: inst.word(1)?,
                result: inst.word(2)?,
                storage_class: StorageClass::from_raw(inst.word(3)?),
            },
            opcode::TYPE_IMAGE => Op::TypeImage {
                result: inst.word(1)?,
                sampled_type: inst.word(2)?,
                dim: inst.word(3)?,
                depth: inst.word(4)?,
                arrayed: inst.word(5)? != 0,
                multisampled: inst.word(6)? != 0,
                sampling: ImageSampling::from_raw(inst.word(7)?),
                format: inst.word(8)?,
            },
            opcode::TYPE_SAMPLED_IMAGE => Op::TypeSampledImage {
                result: inst.word(1)?,
                image: inst.word(2)?,
            },
            opcode::TYPE_RUNTIME_ARRAY => Op::TypeRuntimeArray {
                result: inst.word(1)?,
                element: inst.word(2)?,
            },
            opcode::TYPE_POINTER => Op::TypePointer {
                result: inst.word(1)?,
                storage_class: StorageClass::from_raw(inst.word(2)?),
                pointee: inst.word(3)?,
            },
            opcode::TYPE_ACCELERATION_STRUCTURE => Op::TypeAccelerationStructure {
                result: inst.word(1)?,
            },
            opcode => Op::Other { opcode },
        };

        Ok(op)
    }

    /// The id this instruction defines, for the instructions reflection indexes by id.
    pub fn result_id(&self) -> Option<u32> {
        match *self {
            Op::Variable { result, .. }
            | Op::TypeImage { result, .. }
            | Op::TypeSampledImage { result, .. }
            | Op::TypeRuntimeArray { result, .. }
            | Op::TypePointer { result, .. }
            | Op::TypeAccelerationStructure { result } => Some(result),
            Op::EntryPoint { .. } | Op::Decorate { .. } | Op::Other { .. } => None,
        }
    }
}
