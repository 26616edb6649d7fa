//! Matcha — a bytecode toolchain for a small pattern-matching functional
//! language.
//!
//! The language has algebraic data types, functions defined as ordered
//! pattern-matched rules, and integer arithmetic:
//!
//! ```text
//! type [List x]: Cons x [List x] | Nil .
//!
//! fun (sum [List Int]) -> Int :
//!   (sum [Cons x xs]) -> (+ x (sum xs)) |
//!   (sum [Nil])       -> 0 .
//!
//! (sum [Cons 1 [Cons 2 [Cons 3 [Nil]]]])
//! ```
//!
//! The crate is a pipeline of small pieces: [`parse`] produces the program
//! tree, [`Compiler`] lowers it to a bytecode [`Image`], the image codec
//! writes and reads the compact on-disk form, and [`Vm`] evaluates it. Two
//! binaries (`matchac` and `matchavm`) wrap the two ends of that pipeline.
//!
//! Function rules compile to a cascade: each rule's patterns become match
//! opcodes that either fall through into the rule's body or jump to the
//! next rule with the argument workspace restored, and a function whose
//! rules are exhausted fails with a match error.
//!
//! # Quick start
//!
//! ```
//! use matcha::{Compiler, Vm, parse};
//!
//! let program = parse("(+ 1 2)").unwrap();
//! let image = Compiler::compile(&program).unwrap();
//! let mut vm = Vm::new(image);
//! vm.run().unwrap();
//! assert_eq!(vm.stack_top().map(ToString::to_string), Some("3".to_string()));
//! ```

pub mod ast;
mod bytecode;
mod compiler;
mod error;
mod image;
mod lexer;
mod parser;
mod pattern;
mod value;
mod vm;

pub use bytecode::{Instructions, Op, make, read_operands, read_u16};
pub use compiler::Compiler;
pub use error::{Error, Result};
pub use image::Image;
pub use parser::parse;
pub use value::{CompiledFunction, Constructor, Instance, Value};
pub use vm::{MAX_FRAMES, STACK_SIZE, Vm};
