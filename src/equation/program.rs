//! Equation bytecode representation and codec

use std::fmt;

use bytes::{Buf, BufMut, BytesMut};
use tracing::trace;

use super::vm::{ChannelValues, EvalError, evaluate};

/// Equation opcodes
pub mod opcode {
    /// End of program
    pub const END: u8 = 0x00;
    /// Push a channel value (2-byte channel immediate)
    pub const PUSH_CHANNEL: u8 = 0x01;
    /// Push a constant (4-byte float immediate)
    pub const PUSH_CONST: u8 = 0x02;
    /// Negate top of stack
    pub const NEGATE: u8 = 0x04;
    /// Subtract
    pub const SUB: u8 = 0x05;
    /// Add
    pub const ADD: u8 = 0x06;
    /// Multiply
    pub const MUL: u8 = 0x07;
    /// Divide
    pub const DIV: u8 = 0x08;
    /// Power
    pub const POW: u8 = 0x09;
    /// e^x
    pub const EXP: u8 = 0x0A;
    /// Natural logarithm
    pub const LN: u8 = 0x0B;
    /// Base-2 logarithm
    pub const LOG2: u8 = 0x0C;
    /// Absolute value
    pub const ABS: u8 = 0x0D;
    /// Truncate toward zero
    pub const TRUNCATE: u8 = 0x0E;
    /// Square root
    pub const SQRT: u8 = 0x0F;
}

/// One equation instruction
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Instruction {
    /// Terminate; the single remaining stack value is the result
    End,
    /// Push the value of a channel (1-based)
    PushChannel(u16),
    /// Push a constant
    PushConst(f32),
    /// `-x`
    Negate,
    /// `lhs - rhs`
    Sub,
    /// `lhs + rhs`
    Add,
    /// `lhs * rhs`
    Mul,
    /// `lhs / rhs`
    Div,
    /// `lhs ^ rhs`
    Pow,
    /// `e^x`
    Exp,
    /// `ln(x)`
    Ln,
    /// `log2(x)`
    Log2,
    /// `|x|`
    Abs,
    /// `x` truncated toward zero
    TruncateToInt,
    /// `sqrt(x)`
    Sqrt,
    /// Opcode outside the documented set, kept for round-tripping
    UnknownOpcode(u8),
}

impl Instruction {
    /// Map an immediate-free opcode to its instruction
    #[must_use]
    pub const fn from_simple_opcode(op: u8) -> Self {
        match op {
            opcode::END => Self::End,
            opcode::NEGATE => Self::Negate,
            opcode::SUB => Self::Sub,
            opcode::ADD => Self::Add,
            opcode::MUL => Self::Mul,
            opcode::DIV => Self::Div,
            opcode::POW => Self::Pow,
            opcode::EXP => Self::Exp,
            opcode::LN => Self::Ln,
            opcode::LOG2 => Self::Log2,
            opcode::ABS => Self::Abs,
            opcode::TRUNCATE => Self::TruncateToInt,
            opcode::SQRT => Self::Sqrt,
            other => Self::UnknownOpcode(other),
        }
    }

    /// Opcode byte
    #[must_use]
    pub const fn opcode(self) -> u8 {
        match self {
            Self::End => opcode::END,
            Self::PushChannel(_) => opcode::PUSH_CHANNEL,
            Self::PushConst(_) => opcode::PUSH_CONST,
            Self::Negate => opcode::NEGATE,
            Self::Sub => opcode::SUB,
            Self::Add => opcode::ADD,
            Self::Mul => opcode::MUL,
            Self::Div => opcode::DIV,
            Self::Pow => opcode::POW,
            Self::Exp => opcode::EXP,
            Self::Ln => opcode::LN,
            Self::Log2 => opcode::LOG2,
            Self::Abs => opcode::ABS,
            Self::TruncateToInt => opcode::TRUNCATE,
            Self::Sqrt => opcode::SQRT,
            Self::UnknownOpcode(op) => op,
        }
    }

    /// Encoded size including the immediate
    #[must_use]
    pub const fn encoded_len(self) -> usize {
        match self {
            Self::PushChannel(_) => 3,
            Self::PushConst(_) => 5,
            _ => 1,
        }
    }

    /// Write the instruction to `dst`
    pub fn encode_into(self, dst: &mut impl BufMut) {
        dst.put_u8(self.opcode());
        match self {
            Self::PushChannel(channel) => dst.put_u16(channel),
            Self::PushConst(value) => dst.put_f32(value),
            _ => {}
        }
    }

    /// Assembly mnemonic
    #[must_use]
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Self::End => "END",
            Self::PushChannel(_) => "PUSH_CHANNEL",
            Self::PushConst(_) => "PUSH_CONST",
            Self::Negate => "NEG",
            Self::Sub => "SUB",
            Self::Add => "ADD",
            Self::Mul => "MUL",
            Self::Div => "DIV",
            Self::Pow => "POW",
            Self::Exp => "EXP",
            Self::Ln => "LN",
            Self::Log2 => "LOG2",
            Self::Abs => "ABS",
            Self::TruncateToInt => "INT",
            Self::Sqrt => "SQRT",
            Self::UnknownOpcode(_) => "UNKNOWN",
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PushChannel(channel) => write!(f, "{} C{channel}", self.mnemonic()),
            Self::PushConst(value) => write!(f, "{} {value}", self.mnemonic()),
            Self::UnknownOpcode(op) => write!(f, "{} {op:#04x}", self.mnemonic()),
            _ => f.write_str(self.mnemonic()),
        }
    }
}

/// Decoded equation program
///
/// A well-formed program ends with [`Instruction::End`]. Programs decoded
/// from bytes that ran out before an End opcode are flagged as malformed;
/// evaluating them fails with [`EvalError::Unterminated`].
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EquationProgram {
    instructions: Vec<Instruction>,
    malformed: bool,
}

/// Decode one program from the start of `bytes`
///
/// Stops after the first End opcode. Running out of input first, including
/// in the middle of an immediate, yields a program flagged as malformed.
#[must_use]
pub fn decode_program(mut bytes: &[u8]) -> EquationProgram {
    let mut instructions = Vec::new();

    while bytes.has_remaining() {
        let op = bytes.get_u8();
        let instruction = match op {
            opcode::PUSH_CHANNEL => {
                if bytes.remaining() < 2 {
                    trace!(op, "truncated channel immediate");
                    break;
                }
                Instruction::PushChannel(bytes.get_u16())
            }
            opcode::PUSH_CONST => {
                if bytes.remaining() < 4 {
                    trace!(op, "truncated float immediate");
                    break;
                }
                Instruction::PushConst(bytes.get_f32())
            }
            other => Instruction::from_simple_opcode(other),
        };

        instructions.push(instruction);
        if instruction == Instruction::End {
            return EquationProgram {
                instructions,
                malformed: false,
            };
        }
    }

    EquationProgram {
        instructions,
        malformed: true,
    }
}

impl EquationProgram {
    /// Build a program from instructions
    ///
    /// Instructions after the first End are dropped, since evaluation and
    /// decoding both stop there. Without any End the program is flagged
    /// malformed.
    #[must_use]
    pub fn new(mut instructions: Vec<Instruction>) -> Self {
        let end = instructions.iter().position(|i| *i == Instruction::End);
        if let Some(end) = end {
            instructions.truncate(end + 1);
        }
        let malformed = end.is_none();
        Self {
            instructions,
            malformed,
        }
    }

    /// Start building a program
    #[must_use]
    pub fn builder() -> ProgramBuilder {
        ProgramBuilder::default()
    }

    /// Decode from bytes, see [`decode_program`]
    #[must_use]
    pub fn decode(bytes: &[u8]) -> Self {
        decode_program(bytes)
    }

    /// Instructions in program order
    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Whether the program lacks its terminating End
    #[must_use]
    pub const fn is_malformed(&self) -> bool {
        self.malformed
    }

    /// Encoded size in bytes
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        self.instructions.iter().map(|i| i.encoded_len()).sum()
    }

    /// Write the bytecode to `dst`
    pub fn encode_into(&self, dst: &mut impl BufMut) {
        for instruction in &self.instructions {
            instruction.encode_into(dst);
        }
    }

    /// Encode to bytecode
    #[must_use]
    pub fn encode(&self) -> BytesMut {
        let mut dst = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut dst);
        dst
    }

    /// Channels the program reads, in order of first use
    #[must_use]
    pub fn referenced_channels(&self) -> Vec<u16> {
        let mut channels = Vec::new();
        for instruction in &self.instructions {
            if let Instruction::PushChannel(channel) = *instruction {
                if !channels.contains(&channel) {
                    channels.push(channel);
                }
            }
        }
        channels
    }

    /// Evaluate against channel values, see [`evaluate`]
    pub fn evaluate<V: ChannelValues + ?Sized>(&self, values: &V) -> Result<f32, EvalError> {
        evaluate(self, values)
    }
}

impl fmt::Display for EquationProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, instruction) in self.instructions.iter().enumerate() {
            if index > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{instruction}")?;
        }
        if self.malformed {
            f.write_str(" <unterminated>")?;
        }
        Ok(())
    }
}

/// Fluent program construction
#[derive(Debug, Clone, Default)]
pub struct ProgramBuilder {
    instructions: Vec<Instruction>,
}

impl ProgramBuilder {
    /// Append any instruction
    #[must_use]
    pub fn op(mut self, instruction: Instruction) -> Self {
        self.instructions.push(instruction);
        self
    }

    /// Push a channel value
    #[must_use]
    pub fn push_channel(self, channel: u16) -> Self {
        self.op(Instruction::PushChannel(channel))
    }

    /// Push a constant
    #[must_use]
    pub fn push_const(self, value: f32) -> Self {
        self.op(Instruction::PushConst(value))
    }

    /// Terminate and build
    #[must_use]
    pub fn end(self) -> EquationProgram {
        self.op(Instruction::End).build()
    }

    /// Build without appending End
    #[must_use]
    pub fn build(self) -> EquationProgram {
        EquationProgram::new(self.instructions)
    }
}
