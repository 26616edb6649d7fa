//! Stack-based bytecode virtual machine.
//!
//! The VM loads an [`Image`], wraps its top-level instructions in a
//! synthetic function, and runs a fetch-decode-execute loop over call
//! frames. Two stacks cooperate: the **main stack** is shared across frames
//! and carries expression operands, call arguments, and return values; each
//! frame additionally owns a private **frame stack** used only by the
//! pattern-matching opcodes to hold the scrutinees of the rule currently
//! being tried. When a rule fails, the frame stack is restored to its
//! entry state and control jumps to the next rule, so every rule sees the
//! arguments exactly as the caller pushed them.

use crate::bytecode::{Op, read_u16};
use crate::error::{Error, Result};
use crate::image::Image;
use crate::value::{CompiledFunction, Instance, Value};

/// Maximum call depth.
pub const MAX_FRAMES: usize = 1024;
/// Maximum height of the main stack and of any frame stack.
pub const STACK_SIZE: usize = 2048;

/// A single activation record.
struct Frame {
    func: CompiledFunction,
    /// Index of the next byte to execute.
    ip: usize,
    /// Arguments captured from the caller's stack on `OpCall`. `args[0]` is
    /// the value the caller pushed last, i.e. the rightmost argument.
    args: Vec<Value>,
    /// The scrutinee workspace for pattern matching.
    stack: Vec<Value>,
}

impl Frame {
    fn new(func: CompiledFunction, args: Vec<Value>) -> Result<Frame> {
        let mut frame = Frame {
            func,
            ip: 0,
            args,
            stack: Vec::new(),
        };
        frame.reset()?;
        Ok(frame)
    }

    /// Restore the frame stack to its state at function entry: arguments
    /// pushed in reverse index order, leaving the rightmost argument on top.
    fn reset(&mut self) -> Result<()> {
        self.stack.clear();
        let args = self.args.clone();
        for arg in args.into_iter().rev() {
            self.push(arg)?;
        }
        Ok(())
    }

    fn push(&mut self, value: Value) -> Result<()> {
        if self.stack.len() >= STACK_SIZE {
            return Err(Error::StackOverflow);
        }
        self.stack.push(value);
        Ok(())
    }

    fn pop(&mut self) -> Result<Value> {
        self.stack.pop().ok_or(Error::StackUnderflow)
    }

    fn top(&self) -> Result<&Value> {
        self.stack.last().ok_or(Error::StackUnderflow)
    }

    /// Read the two-byte operand at `ip` and advance past it.
    fn fetch_u16(&mut self) -> Result<u16> {
        let bytes = self.func.instructions.as_bytes();
        if self.ip + 2 > bytes.len() {
            return Err(Error::Decode("truncated instruction stream".to_string()));
        }
        let operand = read_u16(&bytes[self.ip..]);
        self.ip += 2;
        Ok(operand)
    }
}

/// The virtual machine. Create one per image with [`Vm::new`], drive it
/// with [`Vm::run`], then inspect [`Vm::stack_top`] and drain
/// [`Vm::take_output`].
#[derive(Debug)]
pub struct Vm {
    constants: Vec<Value>,
    /// The flat variable slot table, written by `OpBindVariable` and read
    /// by `OpVariable`.
    variables: Vec<Option<Value>>,
    /// The main stack, shared across frames.
    stack: Vec<Value>,
    /// Lines produced by `OpPrint`, in order.
    output: Vec<String>,
    main: CompiledFunction,
}

impl Vm {
    pub fn new(image: Image) -> Vm {
        Vm {
            constants: image.constants,
            variables: vec![None; image.var_count as usize + 1],
            stack: Vec::with_capacity(STACK_SIZE),
            output: Vec::new(),
            main: CompiledFunction {
                instructions: image.instructions,
            },
        }
    }

    /// Execute the image's top-level instructions to completion.
    pub fn run(&mut self) -> Result<()> {
        let main = Frame::new(self.main.clone(), Vec::new())?;
        let mut frames = Vec::with_capacity(MAX_FRAMES);
        frames.push(main);
        self.exec(&mut frames)
    }

    /// The value left on top of the main stack, if any. After a successful
    /// [`Vm::run`] this is the program's result.
    pub fn stack_top(&self) -> Option<&Value> {
        self.stack.last()
    }

    /// Take and clear the buffered `print` output.
    pub fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.output)
    }

    // -----------------------------------------------------------------------
    // Dispatch loop
    // -----------------------------------------------------------------------

    fn exec(&mut self, frames: &mut Vec<Frame>) -> Result<()> {
        while let Some(frame) = frames.last_mut() {
            if frame.ip >= frame.func.instructions.len() {
                // Only the top-level frame runs off the end; compiled
                // functions always leave through OpReturnValue or
                // OpMatchFailed.
                frames.pop();
                continue;
            }
            let op = Op::try_from(frame.func.instructions.as_bytes()[frame.ip])?;
            frame.ip += 1;

            match op {
                Op::Constant => {
                    let index = frame.fetch_u16()?;
                    let value = self.constant(index)?.clone();
                    self.push(value)?;
                }

                Op::Variable => {
                    let slot = frame.fetch_u16()?;
                    let value = self
                        .variables
                        .get(slot as usize)
                        .ok_or_else(|| Error::Decode(format!("variable slot {slot} out of range")))?
                        .clone()
                        .ok_or(Error::UnboundVariable(slot))?;
                    self.push(value)?;
                }

                Op::Add => {
                    let count = frame.fetch_u16()?;
                    let mut sum: i64 = 0;
                    for _ in 0..count {
                        match self.pop()? {
                            Value::Integer(n) => sum = sum.wrapping_add(n),
                            other => {
                                return Err(Error::Type {
                                    expected: "INTEGER",
                                    got: other.type_name(),
                                });
                            }
                        }
                    }
                    self.push(Value::Integer(sum))?;
                }

                Op::Print => {
                    let value = self.pop()?;
                    self.output.push(value.to_string());
                }

                Op::Construct => {
                    let ctor_index = frame.fetch_u16()?;
                    let arity = frame.fetch_u16()?;
                    let constructor = match self.constant(ctor_index)? {
                        Value::Constructor(c) => c.clone(),
                        other => {
                            return Err(Error::Type {
                                expected: "CONSTRUCTOR",
                                got: other.type_name(),
                            });
                        }
                    };
                    let mut args = Vec::with_capacity(arity as usize);
                    for _ in 0..arity {
                        args.push(self.pop()?);
                    }
                    args.reverse();
                    self.push(Value::Instance(Instance { constructor, args }))?;
                }

                Op::Call => {
                    let argc = frame.fetch_u16()?;
                    let func = match self.pop()? {
                        Value::CompiledFunction(f) => f,
                        other => {
                            return Err(Error::Type {
                                expected: "COMPILED_FUNCTION",
                                got: other.type_name(),
                            });
                        }
                    };
                    let mut args = Vec::with_capacity(argc as usize);
                    for _ in 0..argc {
                        args.push(self.pop()?);
                    }
                    if frames.len() >= MAX_FRAMES {
                        return Err(Error::StackOverflow);
                    }
                    frames.push(Frame::new(func, args)?);
                }

                Op::ReturnValue => {
                    // The return value is already on the shared main stack.
                    frames.pop();
                }

                Op::MatchConstructor => {
                    let ctor_index = frame.fetch_u16()?;
                    let fail_addr = frame.fetch_u16()?;
                    let expected = match self.constant(ctor_index)? {
                        Value::Constructor(c) => c.clone(),
                        other => {
                            return Err(Error::Type {
                                expected: "CONSTRUCTOR",
                                got: other.type_name(),
                            });
                        }
                    };
                    let matched = match frame.top()? {
                        Value::Instance(instance) => instance.constructor == expected,
                        other => {
                            return Err(Error::Type {
                                expected: "INSTANCE",
                                got: other.type_name(),
                            });
                        }
                    };
                    if matched {
                        // Nothing to expand for a nullary constructor; the
                        // scrutinee is fully consumed here.
                        if expected.arity == 0 {
                            frame.pop()?;
                        }
                    } else {
                        frame.reset()?;
                        frame.ip = fail_addr as usize;
                    }
                }

                Op::ExpandArgs => {
                    let instance = match frame.pop()? {
                        Value::Instance(instance) => instance,
                        other => {
                            return Err(Error::Type {
                                expected: "INSTANCE",
                                got: other.type_name(),
                            });
                        }
                    };
                    // Push the fields in reverse so the leftmost ends on top.
                    for arg in instance.args.into_iter().rev() {
                        frame.push(arg)?;
                    }
                }

                Op::MatchConstant => {
                    let pool_index = frame.fetch_u16()?;
                    let fail_addr = frame.fetch_u16()?;
                    let expected = match self.constant(pool_index)? {
                        Value::Integer(n) => *n,
                        other => {
                            return Err(Error::Type {
                                expected: "INTEGER",
                                got: other.type_name(),
                            });
                        }
                    };
                    let actual = match frame.pop()? {
                        Value::Integer(n) => n,
                        other => {
                            return Err(Error::Type {
                                expected: "INTEGER",
                                got: other.type_name(),
                            });
                        }
                    };
                    if actual != expected {
                        frame.reset()?;
                        frame.ip = fail_addr as usize;
                    }
                }

                Op::BindVariable => {
                    let slot = frame.fetch_u16()?;
                    let value = frame.pop()?;
                    let cell = self.variables.get_mut(slot as usize).ok_or_else(|| {
                        Error::Decode(format!("variable slot {slot} out of range"))
                    })?;
                    *cell = Some(value);
                }

                Op::MatchFailed => return Err(Error::MatchFailure),
            }
        }
        Ok(())
    }

    fn constant(&self, index: u16) -> Result<&Value> {
        self.constants
            .get(index as usize)
            .ok_or_else(|| Error::Decode(format!("constant index {index} out of range")))
    }

    fn push(&mut self, value: Value) -> Result<()> {
        if self.stack.len() >= STACK_SIZE {
            return Err(Error::StackOverflow);
        }
        self.stack.push(value);
        Ok(())
    }

    fn pop(&mut self) -> Result<Value> {
        self.stack.pop().ok_or(Error::StackUnderflow)
    }
}
