//! Stack-machine evaluation

use std::collections::{BTreeMap, HashMap};

use thiserror::Error;
use tracing::trace;

use super::program::{EquationProgram, Instruction};

/// Source of channel values for evaluation
///
/// Channels are 1-based, as they appear in `PushChannel` immediates.
pub trait ChannelValues {
    /// Current value of `channel`, or `None` when unavailable
    fn channel_value(&self, channel: u16) -> Option<f32>;
}

impl ChannelValues for HashMap<u16, f32> {
    fn channel_value(&self, channel: u16) -> Option<f32> {
        self.get(&channel).copied()
    }
}

impl ChannelValues for BTreeMap<u16, f32> {
    fn channel_value(&self, channel: u16) -> Option<f32> {
        self.get(&channel).copied()
    }
}

/// Values indexed by position: element 0 is channel 1
///
/// Only meaningful when channels 1..=n are all enabled. Pair reading values
/// with their channels through [`crate::codec::Reading::channel_values`].
impl ChannelValues for [f32] {
    fn channel_value(&self, channel: u16) -> Option<f32> {
        let index = usize::from(channel).checked_sub(1)?;
        self.get(index).copied()
    }
}

impl<F> ChannelValues for F
where
    F: Fn(u16) -> Option<f32>,
{
    fn channel_value(&self, channel: u16) -> Option<f32> {
        self(channel)
    }
}

/// Evaluation failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    /// A referenced channel has no value
    #[error("channel {channel} has no value")]
    MissingChannel {
        /// Channel number from the instruction
        channel: u16,
    },

    /// An operator found too few operands
    #[error("stack underflow at instruction {position}")]
    StackUnderflow {
        /// Index of the failing instruction
        position: usize,
    },

    /// End reached with other than exactly one value on the stack
    #[error("stack holds {depth} values at END, expected 1")]
    StackImbalance {
        /// Stack depth at END
        depth: usize,
    },

    /// Opcode outside the documented set
    #[error("unknown opcode {opcode:#04x} at instruction {position}")]
    UnknownOpcode {
        /// Raw opcode
        opcode: u8,
        /// Index of the failing instruction
        position: usize,
    },

    /// Program ran out before END
    #[error("program has no END instruction")]
    Unterminated,
}

/// Evaluate `program` against `values`
///
/// Arithmetic follows IEEE-754 single precision: division by zero and
/// logarithms of non-positive values produce infinities or NaN rather than
/// errors.
///
/// # Errors
///
/// See [`EvalError`].
pub fn evaluate<V>(program: &EquationProgram, values: &V) -> Result<f32, EvalError>
where
    V: ChannelValues + ?Sized,
{
    let mut stack: Vec<f32> = Vec::with_capacity(8);

    for (position, &instruction) in program.instructions().iter().enumerate() {
        let underflow = EvalError::StackUnderflow { position };

        match instruction {
            Instruction::End => {
                return match stack.as_slice() {
                    [result] => {
                        trace!(result, "equation evaluated");
                        Ok(*result)
                    }
                    _ => Err(EvalError::StackImbalance { depth: stack.len() }),
                };
            }
            Instruction::PushChannel(channel) => {
                let value = values
                    .channel_value(channel)
                    .ok_or(EvalError::MissingChannel { channel })?;
                stack.push(value);
            }
            Instruction::PushConst(value) => stack.push(value),
            Instruction::UnknownOpcode(opcode) => {
                return Err(EvalError::UnknownOpcode { opcode, position });
            }
            Instruction::Negate
            | Instruction::Exp
            | Instruction::Ln
            | Instruction::Log2
            | Instruction::Abs
            | Instruction::TruncateToInt
            | Instruction::Sqrt => {
                let x = stack.pop().ok_or(underflow)?;
                stack.push(apply_unary(instruction, x));
            }
            Instruction::Sub
            | Instruction::Add
            | Instruction::Mul
            | Instruction::Div
            | Instruction::Pow => {
                let rhs = stack.pop().ok_or(underflow.clone())?;
                let lhs = stack.pop().ok_or(underflow)?;
                stack.push(apply_binary(instruction, lhs, rhs));
            }
        }
    }

    Err(EvalError::Unterminated)
}

fn apply_unary(instruction: Instruction, x: f32) -> f32 {
    match instruction {
        Instruction::Negate => -x,
        Instruction::Exp => x.exp(),
        Instruction::Ln => x.ln(),
        Instruction::Log2 => x.log2(),
        Instruction::Abs => x.abs(),
        Instruction::TruncateToInt => x.trunc(),
        Instruction::Sqrt => x.sqrt(),
        _ => x,
    }
}

fn apply_binary(instruction: Instruction, lhs: f32, rhs: f32) -> f32 {
    match instruction {
        Instruction::Sub => lhs - rhs,
        Instruction::Add => lhs + rhs,
        Instruction::Mul => lhs * rhs,
        Instruction::Div => lhs / rhs,
        Instruction::Pow => lhs.powf(rhs),
        _ => lhs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program(instructions: &[Instruction]) -> EquationProgram {
        EquationProgram::new(instructions.to_vec())
    }

    fn no_values() -> HashMap<u16, f32> {
        HashMap::new()
    }

    #[test]
    fn test_division_operand_order() {
        let p = program(&[
            Instruction::PushConst(10.0),
            Instruction::PushConst(2.0),
            Instruction::Div,
            Instruction::End,
        ]);
        assert_eq!(evaluate(&p, &no_values()), Ok(5.0));
    }

    #[test]
    fn test_subtraction_with_channels() {
        let p = program(&[
            Instruction::PushChannel(1),
            Instruction::PushChannel(2),
            Instruction::Sub,
            Instruction::End,
        ]);
        let values: BTreeMap<u16, f32> = [(1, 7.5), (2, 2.5)].into_iter().collect();
        assert_eq!(p.evaluate(&values), Ok(5.0));
    }

    #[test]
    fn test_decibel_ratio() {
        let p = program(&[
            Instruction::PushConst(20.0),
            Instruction::PushChannel(1),
            Instruction::PushChannel(2),
            Instruction::Div,
            Instruction::Log2,
            Instruction::Mul,
            Instruction::End,
        ]);
        let values = [8.0_f32, 2.0];
        assert_eq!(evaluate(&p, &values[..]), Ok(40.0));

        let values = [1.0_f32, 10.0];
        assert_eq!(evaluate(&p, &values[..]), Ok(20.0 * 0.1_f32.log2()));
    }

    #[test]
    fn test_unary_functions() {
        let cases = [
            (Instruction::Negate, 2.5, -2.5),
            (Instruction::Abs, -3.0, 3.0),
            (Instruction::TruncateToInt, -3.7, -3.0),
            (Instruction::Sqrt, 16.0, 4.0),
            (Instruction::Exp, 0.0, 1.0),
            (Instruction::Ln, 1.0, 0.0),
        ];
        for (op, input, expected) in cases {
            let p = program(&[Instruction::PushConst(input), op, Instruction::End]);
            assert_eq!(evaluate(&p, &no_values()), Ok(expected), "{op}");
        }
    }

    #[test]
    fn test_closure_source() {
        let p = program(&[
            Instruction::PushChannel(3),
            Instruction::PushConst(2.0),
            Instruction::Pow,
            Instruction::End,
        ]);
        let source = |channel: u16| (channel == 3).then_some(3.0_f32);
        assert_eq!(evaluate(&p, &source), Ok(9.0));
    }

    #[test]
    fn test_missing_channel() {
        let p = program(&[Instruction::PushChannel(9), Instruction::End]);
        assert_eq!(
            evaluate(&p, &no_values()),
            Err(EvalError::MissingChannel { channel: 9 })
        );
    }

    #[test]
    fn test_underflow() {
        let p = program(&[Instruction::PushConst(1.0), Instruction::Add, Instruction::End]);
        assert_eq!(
            evaluate(&p, &no_values()),
            Err(EvalError::StackUnderflow { position: 1 })
        );
    }

    #[test]
    fn test_imbalance_at_end() {
        let p = program(&[
            Instruction::PushConst(1.0),
            Instruction::PushConst(2.0),
            Instruction::End,
        ]);
        assert_eq!(
            evaluate(&p, &no_values()),
            Err(EvalError::StackImbalance { depth: 2 })
        );

        let empty = program(&[Instruction::End]);
        assert_eq!(
            evaluate(&empty, &no_values()),
            Err(EvalError::StackImbalance { depth: 0 })
        );
    }

    #[test]
    fn test_unknown_opcode_and_unterminated() {
        let p = program(&[Instruction::PushConst(1.0), Instruction::UnknownOpcode(0x03)]);
        assert_eq!(
            evaluate(&p, &no_values()),
            Err(EvalError::UnknownOpcode {
                opcode: 0x03,
                position: 1
            })
        );

        let open = program(&[Instruction::PushConst(1.0)]);
        assert_eq!(evaluate(&open, &no_values()), Err(EvalError::Unterminated));
    }

    #[test]
    fn test_division_by_zero_is_infinite() {
        let p = program(&[
            Instruction::PushConst(1.0),
            Instruction::PushConst(0.0),
            Instruction::Div,
            Instruction::End,
        ]);
        let result = evaluate(&p, &no_values()).unwrap();
        assert!(result.is_infinite());
    }
}
