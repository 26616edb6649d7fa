//! Bytecode instruction set, encoder, and disassembler.
//!
//! Instructions are a flat byte stream: a one-byte opcode followed by
//! big-endian operands, each two bytes wide. The compiler emits the stream
//! with [`make`], the VM decodes operands in place, and [`Instructions::disassemble`]
//! renders it for `--verbose` dumps and tests. Operand widths live in a
//! static table ([`Op::operand_widths`]) so every consumer steps the stream
//! the same way.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A single opcode byte.
///
/// The discriminants are part of the image format and must not be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Op {
    /// Push `pool[operand]` onto the main stack.
    Constant = 0,
    /// Pop `operand` integers off the main stack, push their wrapping sum.
    Add = 1,
    /// Pop the callee, capture `operand` arguments, push a new frame.
    Call = 2,
    /// Pop the current frame; the return value stays on the main stack.
    ReturnValue = 3,
    /// Pop `arity` values, push an instance of `pool[ctor]`. Operands: ctor, arity.
    Construct = 4,
    /// Match the top of the frame stack against `pool[ctor]`; on mismatch
    /// reset the frame and jump. Operands: ctor, fail address.
    MatchConstructor = 5,
    /// Pop the frame-stack top into `variables[operand]`.
    BindVariable = 6,
    /// Pop an instance off the frame stack, push its fields (leftmost on top).
    ExpandArgs = 7,
    /// Match the frame-stack top against `pool[operand]`; on mismatch reset
    /// the frame and jump. Operands: pool index, fail address.
    MatchConstant = 8,
    /// The rule cascade is exhausted: halt with a match failure.
    MatchFailed = 9,
    /// Push `variables[operand]` onto the main stack.
    Variable = 10,
    /// Pop the main-stack top and render it to the output.
    Print = 11,
}

impl Op {
    /// The mnemonic used by the disassembler.
    pub fn name(self) -> &'static str {
        match self {
            Op::Constant => "OpConstant",
            Op::Add => "OpAdd",
            Op::Call => "OpCall",
            Op::ReturnValue => "OpReturnValue",
            Op::Construct => "OpConstruct",
            Op::MatchConstructor => "OpMatchConstructor",
            Op::BindVariable => "OpBindVariable",
            Op::ExpandArgs => "OpExpandArgs",
            Op::MatchConstant => "OpMatchConstant",
            Op::MatchFailed => "OpMatchFailed",
            Op::Variable => "OpVariable",
            Op::Print => "OpPrint",
        }
    }

    /// Width in bytes of each operand, in order.
    pub fn operand_widths(self) -> &'static [usize] {
        match self {
            Op::Constant => &[2],
            Op::Add => &[2],
            Op::Call => &[2],
            Op::ReturnValue => &[],
            Op::Construct => &[2, 2],
            Op::MatchConstructor => &[2, 2],
            Op::BindVariable => &[2],
            Op::ExpandArgs => &[],
            Op::MatchConstant => &[2, 2],
            Op::MatchFailed => &[],
            Op::Variable => &[2],
            Op::Print => &[],
        }
    }

    /// Total encoded size of an instruction with this opcode.
    pub fn instruction_len(self) -> usize {
        1 + self.operand_widths().iter().sum::<usize>()
    }
}

impl TryFrom<u8> for Op {
    type Error = Error;

    fn try_from(byte: u8) -> Result<Op, Error> {
        Ok(match byte {
            0 => Op::Constant,
            1 => Op::Add,
            2 => Op::Call,
            3 => Op::ReturnValue,
            4 => Op::Construct,
            5 => Op::MatchConstructor,
            6 => Op::BindVariable,
            7 => Op::ExpandArgs,
            8 => Op::MatchConstant,
            9 => Op::MatchFailed,
            10 => Op::Variable,
            11 => Op::Print,
            other => return Err(Error::UnknownOpcode(other)),
        })
    }
}

/// Encode one instruction: the opcode byte followed by its operands.
pub fn make(op: Op, operands: &[usize]) -> Vec<u8> {
    let widths = op.operand_widths();
    debug_assert_eq!(operands.len(), widths.len());

    let mut instruction = Vec::with_capacity(op.instruction_len());
    instruction.push(op as u8);
    for (&width, &operand) in widths.iter().zip(operands) {
        match width {
            2 => instruction.extend_from_slice(&(operand as u16).to_be_bytes()),
            _ => unreachable!("unsupported operand width {width}"),
        }
    }
    instruction
}

/// Decode the operands following an opcode byte. Returns the operand values
/// and the number of bytes consumed. The caller must supply at least the
/// bytes named by [`Op::operand_widths`].
pub fn read_operands(op: Op, ins: &[u8]) -> (Vec<usize>, usize) {
    let mut operands = Vec::with_capacity(op.operand_widths().len());
    let mut offset = 0;
    for &width in op.operand_widths() {
        match width {
            2 => operands.push(read_u16(&ins[offset..]) as usize),
            _ => unreachable!("unsupported operand width {width}"),
        }
        offset += width;
    }
    (operands, offset)
}

/// Read a big-endian u16 from the front of a byte slice.
pub fn read_u16(ins: &[u8]) -> u16 {
    u16::from_be_bytes([ins[0], ins[1]])
}

/// A compiled instruction stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Instructions(pub Vec<u8>);

impl Instructions {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Render the stream one instruction per line, e.g.
    ///
    /// ```text
    /// 0000 OpConstant 0
    /// 0003 OpMatchConstructor 1 16
    /// ```
    ///
    /// Undecodable bytes produce an `ERROR:` line instead of aborting, so a
    /// partially corrupt stream still dumps as far as possible.
    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        let mut pos = 0;
        while pos < self.0.len() {
            let op = match Op::try_from(self.0[pos]) {
                Ok(op) => op,
                Err(_) => {
                    let _ = writeln!(out, "{pos:04} ERROR: opcode {} undefined", self.0[pos]);
                    pos += 1;
                    continue;
                }
            };
            if pos + op.instruction_len() > self.0.len() {
                let _ = writeln!(out, "{pos:04} ERROR: truncated {}", op.name());
                break;
            }
            let (operands, read) = read_operands(op, &self.0[pos + 1..]);
            let _ = write!(out, "{pos:04} {}", op.name());
            for operand in operands {
                let _ = write!(out, " {operand}");
            }
            out.push('\n');
            pos += 1 + read;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn make_encodes_big_endian_operands() {
        assert_eq!(make(Op::Constant, &[65534]), vec![0, 255, 254]);
        assert_eq!(make(Op::Construct, &[1, 2]), vec![4, 0, 1, 0, 2]);
        assert_eq!(make(Op::ReturnValue, &[]), vec![3]);
    }

    #[test]
    fn read_operands_inverts_make() {
        let cases: &[(Op, &[usize])] = &[
            (Op::Constant, &[65535]),
            (Op::Add, &[3]),
            (Op::Call, &[2]),
            (Op::Construct, &[7, 2]),
            (Op::MatchConstructor, &[0, 16]),
            (Op::MatchConstant, &[4, 25]),
            (Op::BindVariable, &[9]),
            (Op::Variable, &[9]),
            (Op::ReturnValue, &[]),
            (Op::ExpandArgs, &[]),
            (Op::MatchFailed, &[]),
            (Op::Print, &[]),
        ];
        for &(op, operands) in cases {
            let encoded = make(op, operands);
            let (decoded, read) = read_operands(op, &encoded[1..]);
            assert_eq!(decoded, operands, "{}", op.name());
            assert_eq!(read, encoded.len() - 1, "{}", op.name());
        }
    }

    #[test]
    fn unknown_opcode_byte_is_rejected() {
        assert!(matches!(Op::try_from(12), Err(Error::UnknownOpcode(12))));
        assert!(matches!(Op::try_from(255), Err(Error::UnknownOpcode(255))));
    }

    #[test]
    fn disassemble_formats_offsets_and_operands() {
        let mut stream = Vec::new();
        stream.extend(make(Op::MatchConstructor, &[0, 16]));
        stream.extend(make(Op::ExpandArgs, &[]));
        stream.extend(make(Op::BindVariable, &[0]));
        stream.extend(make(Op::Constant, &[3]));
        stream.extend(make(Op::ReturnValue, &[]));
        let ins = Instructions(stream);

        let expected = "\
0000 OpMatchConstructor 0 16
0005 OpExpandArgs
0006 OpBindVariable 0
0009 OpConstant 3
0012 OpReturnValue
";
        assert_eq!(ins.disassemble(), expected);
    }

    #[test]
    fn disassemble_reports_bad_bytes() {
        let ins = Instructions(vec![200]);
        assert_eq!(ins.disassemble(), "0000 ERROR: opcode 200 undefined\n");

        let ins = Instructions(vec![Op::Constant as u8, 0]);
        assert_eq!(ins.disassemble(), "0000 ERROR: truncated OpConstant\n");
    }
}
