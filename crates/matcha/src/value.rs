//! Runtime value model.
//!
//! Four kinds of value flow through the toolchain: integers, constructor
//! descriptors, constructed instances, and compiled function bodies. The
//! compiler places integers, constructors, and functions into the constant
//! pool; instances normally exist only at runtime, but the image codec
//! round-trips them anyway because the format is shared with other producers.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::bytecode::Instructions;

/// A static descriptor of one algebraic alternative: `Cons` with arity 2
/// under the supertype `List`, say. Two constructors are equal only when all
/// three fields agree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constructor {
    pub name: String,
    pub arity: u16,
    pub supertype: String,
}

/// A constructed value: a constructor descriptor plus exactly
/// `constructor.arity` argument values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub constructor: Constructor,
    pub args: Vec<Value>,
}

/// The body of one compiled function. Arguments arrive on the caller's
/// stack; there is no parameter list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledFunction {
    pub instructions: Instructions,
}

/// A runtime value. Instances are never compared for equality at runtime;
/// the derived `PartialEq` exists for the codec round-trip and tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    Integer(i64),
    Constructor(Constructor),
    Instance(Instance),
    CompiledFunction(CompiledFunction),
}

impl Value {
    /// The tag string identifying this value kind, as written into the
    /// constants section of a bytecode image.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "INTEGER",
            Value::Constructor(_) => "CONSTRUCTOR",
            Value::Instance(_) => "INSTANCE",
            Value::CompiledFunction(_) => "COMPILED_FUNCTION",
        }
    }
}

impl fmt::Display for Constructor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Constructor(name={}, arity={}, supertype={})",
            self.name, self.arity, self.supertype
        )
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.args.is_empty() {
            return write!(f, "{}", self.constructor.name);
        }
        write!(f, "{}(", self.constructor.name)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{arg}")?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "{n}"),
            Value::Constructor(c) => write!(f, "{c}"),
            Value::Instance(i) => write!(f, "{i}"),
            Value::CompiledFunction(func) => {
                write!(f, "CompiledFunction({} bytes)", func.instructions.len())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nil() -> Instance {
        Instance {
            constructor: Constructor {
                name: "Nil".to_string(),
                arity: 0,
                supertype: "List".to_string(),
            },
            args: vec![],
        }
    }

    #[test]
    fn equality_is_false_across_tags() {
        let ctor = Value::Constructor(nil().constructor);
        assert_ne!(Value::Integer(0), ctor);
        assert_ne!(Value::Integer(0), Value::Instance(nil()));
    }

    #[test]
    fn constructors_compare_all_three_fields() {
        let a = Constructor {
            name: "Nil".to_string(),
            arity: 0,
            supertype: "List".to_string(),
        };
        let mut b = a.clone();
        assert_eq!(a, b);
        b.supertype = "Tree".to_string();
        assert_ne!(a, b);
    }

    #[test]
    fn display_renders_nested_instances() {
        let cons = Constructor {
            name: "Cons".to_string(),
            arity: 2,
            supertype: "List".to_string(),
        };
        let list = Value::Instance(Instance {
            constructor: cons.clone(),
            args: vec![Value::Integer(1), Value::Instance(nil())],
        });
        assert_eq!(list.to_string(), "Cons(1, Nil)");
    }
}
