#![deny(
    missing_docs,
    rustdoc::broken_intra_doc_links,
    rustdoc::private_intra_doc_links
)]
#![warn(rustdoc::all)]
#![doc = include_str!("../README.md")]

use quickerr::error;

pub use crate::op::{opcode, Decoration, ImageSampling, Op, StorageClass};
pub use crate::reader::{Instruction, Reader, HEADER_WORDS, MAGIC};
pub use crate::reflection::{Binding, DescriptorKind, EntryPoint, Reflection, ShaderStage};

mod op;
mod parse;
mod reader;
mod reflection;
mod resolve;

error! {
    /// The error that occurs when the first word of a module is not the SPIR-V magic number.
    pub BadMagic
    "invalid magic number `{found}`"
    found: u32
}

error! {
    /// The error that occurs when a module is too short to hold the fixed header.
    pub TruncatedHeader
    "module holds {words} words, which is not enough for the header"
    words: usize
}

error! {
    /// The error that occurs when an instruction claims more words than the stream has left.
    pub TruncatedInstruction
    "instruction at word {position} claims {claimed} words but only {remaining} remain"
    position: usize,
    claimed: u32,
    remaining: usize,
}

impl TruncatedInstruction {
    /// The word offset of the truncated instruction within the module.
    pub fn position(&self) -> usize {
        self.position
    }
}

error! {
    /// The error that occurs when an instruction has a word count of zero.
    pub EmptyInstruction
    "instruction at word {position} has a word count of zero"
    position: usize
}

impl EmptyInstruction {
    /// The word offset of the empty instruction within the module.
    pub fn position(&self) -> usize {
        self.position
    }
}

error! {
    /// The error that occurs when an instruction is too short for an operand it must carry.
    pub MissingOperand
    "instruction {opcode} at word {position} is missing operand {operand}"
    opcode: u16,
    position: usize,
    operand: usize,
}

error! {
    /// The error that occurs when a string operand runs to the end of its instruction without a
    /// terminating nul.
    pub UnterminatedString
    "string operand of instruction at word {position} is not nul-terminated"
    position: usize
}

error! {
    /// The error that occurs when an entry point uses an execution model with no shader stage.
    pub UnsupportedExecutionModel
    "execution model `{model}` does not map to a shader stage"
    model: u32
}

error! {
    /// The error that occurs when a binding is decorated with only one of its two indices.
    pub MissingDecoration
    "binding `%{id}` doesn't have a {decoration} index"
    id: u32,
    decoration: &'static str,
}

error! {
    /// The error that occurs when a set or binding decoration targets something other than a
    /// variable.
    pub NotAVariable
    "decoration target `%{id}` is not a variable"
    id: u32
}

error! {
    /// The error that occurs when a decorated variable's type is not a pointer.
    pub NotAPointer
    "type of variable `%{id}` is not a pointer"
    id: u32
}

error! {
    /// The error that occurs when a binding's type does not match any known descriptor kind.
    pub InvalidDescriptorType
    "invalid descriptor type for binding `%{id}`"
    id: u32
}

error! {
    /// The error that occurs when two variables of one module occupy the same binding slot.
    pub DuplicateBinding
    "set {set} binding {binding} is declared more than once"
    set: u32,
    binding: u32,
}

error! {
    /// The error that occurs when a SPIR-V module cannot be reflected.
    pub ReflectError
    "invalid SPIR-V shader"
    /// The first word was not the magic number.
    BadMagic,
    /// The module ended inside the header.
    TruncatedHeader,
    /// An instruction ran past the end of the module.
    TruncatedInstruction,
    /// An instruction had a word count of zero.
    EmptyInstruction,
    /// An instruction was missing an operand.
    MissingOperand,
    /// A string operand was not terminated.
    UnterminatedString,
    /// An entry point had an unsupported execution model.
    UnsupportedExecutionModel,
    /// A binding was missing its set or binding index.
    MissingDecoration,
    /// A binding decoration targeted a non-variable.
    NotAVariable,
    /// A binding variable was not of pointer type.
    NotAPointer,
    /// A binding could not be classified.
    InvalidDescriptorType,
    /// Two bindings shared a slot.
    DuplicateBinding,
}
