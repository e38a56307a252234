//! Computed-channel equations
//!
//! The instrument stores equations as a small stack-machine bytecode in the
//! trailer of the configuration block. This module decodes and encodes that
//! bytecode, evaluates it against a set of channel values and compiles it
//! from infix text such as `20*log(C1/C2)`.
//!
//! Binary operators take their right-hand operand from the top of the
//! stack: `PushChannel(1), PushChannel(2), Sub` computes `C1 - C2`.

mod compiler;
mod program;
mod vm;

pub use compiler::{CompileError, MAX_NESTING, compile};
pub use program::{EquationProgram, Instruction, ProgramBuilder, decode_program, opcode};
pub use vm::{ChannelValues, EvalError, evaluate};
