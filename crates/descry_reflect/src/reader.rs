//! A forward-only cursor over the words of a SPIR-V module.

use crate::{
    BadMagic, EmptyInstruction, MissingOperand, ReflectError, TruncatedHeader,
    TruncatedInstruction, UnterminatedString,
};

/// The first word of every SPIR-V module.
pub const MAGIC: u32 = 0x0723_0203;

/// The number of words in the module header: magic, version, generator, id bound and schema.
pub const HEADER_WORDS: usize = 5;

fn word_at(bytes: &[u8], index: usize) -> u32 {
    let start = index * 4;
    let word = &bytes[start..start + 4];
    u32::from_le_bytes([word[0], word[1], word[2], word[3]])
}

/// Yields the instructions of a module one at a time.
///
/// A reader is created over the raw bytes of a module, checks the magic number and skips the
/// header. Trailing bytes that don't form a whole word are ignored. Once an error has been
/// yielded, the reader is exhausted.
#[derive(Clone, Debug)]
pub struct Reader<'a> {
    bytes: &'a [u8],
    words: usize,
    position: usize,
}

impl<'a> Reader<'a> {
    /// Validate the header of `bytes` and position the cursor on the first instruction.
    pub fn new(bytes: &'a [u8]) -> Result<Self, ReflectError> {
        let words = bytes.len() / 4;

        if words < HEADER_WORDS {
            return Err(TruncatedHeader { words })?;
        }

        let found = word_at(bytes, 0);
        if found != MAGIC {
            return Err(BadMagic { found })?;
        }

        Ok(Self {
            bytes,
            words,
            position: HEADER_WORDS,
        })
    }

    /// Whether there are any words left to read.
    pub fn has_more(&self) -> bool {
        self.position < self.words
    }

    /// The word offset of the next instruction.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Read the next instruction and advance past it.
    pub fn next_instruction(&mut self) -> Result<Instruction<'a>, ReflectError> {
        let position = self.position;
        let remaining = self.words - position;
        let claimed = word_at(self.bytes, position) >> 16;

        if claimed == 0 {
            self.position = self.words;
            return Err(EmptyInstruction { position })?;
        }

        if claimed as usize > remaining {
            self.position = self.words;
            return Err(TruncatedInstruction {
                position,
                claimed,
                remaining,
            })?;
        }

        let end = position + claimed as usize;
        self.position = end;

        Ok(Instruction {
            bytes: &self.bytes[position * 4..end * 4],
            position,
        })
    }
}

impl<'a> Iterator for Reader<'a> {
    type Item = Result<Instruction<'a>, ReflectError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.has_more().then(|| self.next_instruction())
    }
}

/// A view of one instruction. Word 0 packs the opcode in its low half and the word count in its
/// high half; the remaining words are operands.
#[derive(Copy, Clone, Debug)]
pub struct Instruction<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> Instruction<'a> {
    /// The opcode of this instruction.
    pub fn opcode(&self) -> u16 {
        (word_at(self.bytes, 0) & 0xFFFF) as u16
    }

    /// The number of words in this instruction, including the first.
    pub fn word_count(&self) -> u16 {
        (word_at(self.bytes, 0) >> 16) as u16
    }

    /// The word offset of this instruction within the module.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Read word `index` of this instruction, where word 0 is the opcode word.
    pub fn word(&self, index: usize) -> Result<u32, ReflectError> {
        if index >= self.bytes.len() / 4 {
            return Err(MissingOperand {
                opcode: self.opcode(),
                position: self.position,
                operand: index,
            })?;
        }

        Ok(word_at(self.bytes, index))
    }

    /// Read word `index` if the instruction is long enough to have it.
    pub fn optional_word(&self, index: usize) -> Option<u32> {
        (index < self.bytes.len() / 4).then(|| word_at(self.bytes, index))
    }

    /// Read a nul-terminated UTF-8 string starting at word `index`.
    ///
    /// Invalid UTF-8 is replaced rather than rejected.
    pub fn string(&self, index: usize) -> Result<String, ReflectError> {
        // Make sure the operand exists at all before scanning it.
        self.word(index)?;

        let bytes = &self.bytes[index * 4..];
        let len = bytes
            .iter()
            .position(|&byte| byte == 0)
            .ok_or(UnterminatedString {
                position: self.position,
            })?;

        Ok(String::from_utf8_lossy(&bytes[..len]).into_owned())
    }
}
