//! Compile-time pattern IR.
//!
//! While lowering a function rule the compiler first resolves the rule's
//! surface patterns into this tree: constructor references become pool
//! indices, integer constants are interned, and variables receive their
//! global slot. The tree is transient — it never appears in the emitted
//! image; it exists so that lowering (and its right-to-left argument order)
//! operates on fully resolved data.

use crate::value::Constructor;

#[derive(Debug, Clone)]
pub enum Pattern {
    /// Destructure an instance of `ctor`; sub-patterns match its fields in
    /// declaration order.
    Constructor {
        ctor: Constructor,
        ctor_idx: u16,
        args: Vec<Pattern>,
    },
    /// Match an exact interned integer.
    Const { value: i64, pool_idx: u16 },
    /// Always succeeds; binds the scrutinee to a variable slot.
    Variable { name: String, slot: u16 },
}
