//! Bytecode compiler: translates the program tree into an [`Image`].
//!
//! The compiler makes a single pass over the top-level definitions. Type
//! definitions populate the constant pool with constructor descriptors;
//! function definitions lower into [`CompiledFunction`] pool entries; bare
//! expressions compile into the top-level instruction stream that the VM
//! runs first.
//!
//! Function lowering is where the interesting work happens. Each rule of a
//! multi-rule function compiles to a straight-line prefix of match opcodes
//! followed by its body and a return; the match opcodes carry a fail address
//! that is left as zero while the rule is being emitted and back-patched to
//! the start of the next rule (or the terminal `OpMatchFailed`) once that
//! offset is known. All addresses are relative to the function's own
//! instruction blob, which is extracted into the pool when lowering ends.

use std::collections::HashMap;

use crate::ast;
use crate::bytecode::{Instructions, Op, make};
use crate::error::{Error, Result};
use crate::image::Image;
use crate::pattern::Pattern;
use crate::value::{CompiledFunction, Constructor, Value};

/// Compiles a parsed program into a bytecode image.
pub struct Compiler {
    /// The top-level instruction stream. Swapped out for a scratch buffer
    /// while a function body is being lowered.
    instructions: Instructions,
    constants: Vec<Value>,
    /// Constructor name → pool index of its descriptor.
    constructors: HashMap<String, u16>,
    /// Function name → pool index of its compiled body.
    functions: HashMap<String, u16>,
    /// Interned integer literals.
    integers: HashMap<i64, u16>,
    /// Variable slot per (function, rule index, variable name).
    variables: HashMap<(String, usize, String), u16>,
    var_count: u16,
}

/// The (function, rule) pair whose variables are currently in scope, or
/// `None` at the top level where no variables exist.
type Scope<'a> = Option<(&'a str, usize)>;

impl Compiler {
    /// Compile a program into an [`Image`].
    pub fn compile(program: &ast::Program) -> Result<Image> {
        let mut compiler = Compiler {
            instructions: Instructions::default(),
            constants: Vec::new(),
            constructors: HashMap::new(),
            functions: HashMap::new(),
            integers: HashMap::new(),
            variables: HashMap::new(),
            var_count: 0,
        };
        for definition in &program.definitions {
            match definition {
                ast::Definition::Type(type_def) => compiler.compile_type_def(type_def)?,
                ast::Definition::Fun(fun_def) => compiler.compile_fun_def(fun_def)?,
                ast::Definition::Expr(expr) => compiler.compile_expr(expr, None)?,
            }
        }
        Ok(Image {
            instructions: compiler.instructions,
            constants: compiler.constants,
            var_count: compiler.var_count as u32,
        })
    }

    // -----------------------------------------------------------------------
    // Definitions
    // -----------------------------------------------------------------------

    /// Allocate one constructor descriptor per alternative. Constructor
    /// names are the unique key across the whole program; shadowing an
    /// existing name is rejected.
    fn compile_type_def(&mut self, type_def: &ast::TypeDef) -> Result<()> {
        for alternative in &type_def.alternatives {
            if self.constructors.contains_key(&alternative.name) {
                return Err(Error::DuplicateConstructor(alternative.name.clone()));
            }
            let descriptor = Constructor {
                name: alternative.name.clone(),
                arity: alternative.params.len() as u16,
                supertype: type_def.name.clone(),
            };
            let index = self.add_constant(Value::Constructor(descriptor));
            self.constructors.insert(alternative.name.clone(), index);
        }
        Ok(())
    }

    /// Lower a function definition into a `CompiledFunction` pool entry.
    ///
    /// The pool slot is reserved (and the name registered) before the body
    /// is lowered so that recursive references resolve to the right index.
    fn compile_fun_def(&mut self, fun_def: &ast::FunDef) -> Result<()> {
        let fn_index = self.add_constant(Value::CompiledFunction(CompiledFunction::default()));
        self.functions.insert(fun_def.name.clone(), fn_index);

        let saved = std::mem::take(&mut self.instructions);

        let mut rule_starts = Vec::with_capacity(fun_def.rules.len());
        let mut match_sites: Vec<Vec<usize>> = Vec::with_capacity(fun_def.rules.len());
        for (rule_index, rule) in fun_def.rules.iter().enumerate() {
            rule_starts.push(self.instructions.len());

            // Arguments sit on the frame stack with the leftmost deepest, so
            // the rightmost pattern is lowered (and therefore matched) first.
            let mut sites = Vec::new();
            for surface in rule.patterns.iter().rev() {
                let pattern = self.resolve_pattern(&fun_def.name, rule_index, surface)?;
                self.lower_pattern(&pattern, &mut sites);
            }
            match_sites.push(sites);

            self.compile_expr(&rule.body, Some((fun_def.name.as_str(), rule_index)))?;
            self.emit(Op::ReturnValue, &[]);
        }
        let failed_at = self.emit(Op::MatchFailed, &[]);

        for (rule_index, sites) in match_sites.iter().enumerate() {
            let fail_target = match rule_starts.get(rule_index + 1) {
                Some(&next_rule) => next_rule,
                None => failed_at,
            };
            for &site in sites {
                self.patch_fail_addr(site, fail_target as u16);
            }
        }

        let body = std::mem::replace(&mut self.instructions, saved);
        self.constants[fn_index as usize] =
            Value::CompiledFunction(CompiledFunction { instructions: body });
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Patterns
    // -----------------------------------------------------------------------

    /// Resolve a surface pattern against the interning tables: constructor
    /// names become pool indices, integer constants are interned, and each
    /// variable gets a slot keyed by (function, rule, name).
    fn resolve_pattern(
        &mut self,
        fun_name: &str,
        rule_index: usize,
        surface: &ast::Pattern,
    ) -> Result<Pattern> {
        match surface {
            ast::Pattern::Constructor { name, args } => {
                let ctor_idx = *self
                    .constructors
                    .get(name)
                    .ok_or_else(|| Error::UnknownConstructor(name.clone()))?;
                let Value::Constructor(ctor) = self.constants[ctor_idx as usize].clone() else {
                    unreachable!("constructor table points at a non-constructor");
                };
                if args.len() != ctor.arity as usize {
                    return Err(Error::ConstructorArity {
                        name: name.clone(),
                        expected: ctor.arity,
                        got: args.len(),
                    });
                }
                let args = args
                    .iter()
                    .map(|arg| self.resolve_pattern(fun_name, rule_index, arg))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Pattern::Constructor {
                    ctor,
                    ctor_idx,
                    args,
                })
            }
            ast::Pattern::Literal(value) => Ok(Pattern::Const {
                value: *value,
                pool_idx: self.intern_integer(*value),
            }),
            ast::Pattern::Variable(name) => {
                let key = (fun_name.to_string(), rule_index, name.clone());
                let slot = match self.variables.get(&key) {
                    Some(&slot) => slot,
                    None => {
                        let slot = self.var_count;
                        self.var_count += 1;
                        self.variables.insert(key, slot);
                        slot
                    }
                };
                Ok(Pattern::Variable {
                    name: name.clone(),
                    slot,
                })
            }
        }
    }

    /// Emit the opcodes for one resolved pattern, appending the offset of
    /// every emitted pattern opcode to `sites`. Fail addresses are emitted
    /// as zero; the back-patch pass fills them in.
    fn lower_pattern(&mut self, pattern: &Pattern, sites: &mut Vec<usize>) {
        match pattern {
            Pattern::Constructor {
                ctor,
                ctor_idx,
                args,
            } => {
                sites.push(self.emit(Op::MatchConstructor, &[*ctor_idx as usize, 0]));
                if ctor.arity > 0 {
                    self.emit(Op::ExpandArgs, &[]);
                    for arg in args {
                        self.lower_pattern(arg, sites);
                    }
                }
            }
            Pattern::Const { pool_idx, .. } => {
                sites.push(self.emit(Op::MatchConstant, &[*pool_idx as usize, 0]));
            }
            Pattern::Variable { slot, .. } => {
                sites.push(self.emit(Op::BindVariable, &[*slot as usize]));
            }
        }
    }

    /// Rewrite the fail address of the match opcode at `site`. Bind
    /// positions carry no fail operand and are skipped; for the match
    /// opcodes the fail address is the final two bytes of the instruction.
    fn patch_fail_addr(&mut self, site: usize, target: u16) {
        let Ok(op) = Op::try_from(self.instructions.0[site]) else {
            panic!("recorded match site does not hold an opcode");
        };
        match op {
            Op::MatchConstructor | Op::MatchConstant => {
                let at = site + op.instruction_len() - 2;
                self.instructions.0[at..at + 2].copy_from_slice(&target.to_be_bytes());
            }
            _ => {}
        }
    }

    // -----------------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------------

    fn compile_expr(&mut self, expr: &ast::Expr, scope: Scope<'_>) -> Result<()> {
        match expr {
            ast::Expr::Literal(value) => {
                let index = self.intern_integer(*value);
                self.emit(Op::Constant, &[index as usize]);
            }
            ast::Expr::Variable(name) => {
                let Some((fun_name, rule_index)) = scope else {
                    return Err(Error::UndefinedVariable(name.clone()));
                };
                let key = (fun_name.to_string(), rule_index, name.clone());
                let slot = *self
                    .variables
                    .get(&key)
                    .ok_or_else(|| Error::UndefinedVariable(name.clone()))?;
                self.emit(Op::Variable, &[slot as usize]);
            }
            ast::Expr::Construct { name, args } => {
                let ctor_idx = *self
                    .constructors
                    .get(name)
                    .ok_or_else(|| Error::UnknownConstructor(name.clone()))?;
                let Value::Constructor(ctor) = &self.constants[ctor_idx as usize] else {
                    unreachable!("constructor table points at a non-constructor");
                };
                if args.len() != ctor.arity as usize {
                    return Err(Error::ConstructorArity {
                        name: name.clone(),
                        expected: ctor.arity,
                        got: args.len(),
                    });
                }
                for arg in args {
                    self.compile_expr(arg, scope)?;
                }
                self.emit(Op::Construct, &[ctor_idx as usize, args.len()]);
            }
            ast::Expr::Call { name, args } => match name.as_str() {
                "+" => {
                    for arg in args {
                        self.compile_expr(arg, scope)?;
                    }
                    self.emit(Op::Add, &[args.len()]);
                }
                "print" => {
                    for arg in args {
                        self.compile_expr(arg, scope)?;
                    }
                    self.emit(Op::Print, &[]);
                }
                _ => {
                    for arg in args {
                        self.compile_expr(arg, scope)?;
                    }
                    let fn_index = *self
                        .functions
                        .get(name)
                        .ok_or_else(|| Error::UnknownFunction(name.clone()))?;
                    self.emit(Op::Constant, &[fn_index as usize]);
                    self.emit(Op::Call, &[args.len()]);
                }
            },
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Pools and emission
    // -----------------------------------------------------------------------

    fn add_constant(&mut self, value: Value) -> u16 {
        assert!(
            self.constants.len() < u16::MAX as usize,
            "constant pool exceeds 16-bit indices"
        );
        self.constants.push(value);
        (self.constants.len() - 1) as u16
    }

    /// Intern an integer literal: the first occurrence adds a pool entry,
    /// later occurrences reuse its index.
    fn intern_integer(&mut self, value: i64) -> u16 {
        if let Some(&index) = self.integers.get(&value) {
            return index;
        }
        let index = self.add_constant(Value::Integer(value));
        self.integers.insert(value, index);
        index
    }

    /// Append one encoded instruction and return its offset.
    fn emit(&mut self, op: Op, operands: &[usize]) -> usize {
        let position = self.instructions.len();
        self.instructions.0.extend(make(op, operands));
        position
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use pretty_assertions::assert_eq;

    fn compile(source: &str) -> Image {
        Compiler::compile(&parse(source).unwrap()).unwrap()
    }

    fn compile_err(source: &str) -> Error {
        Compiler::compile(&parse(source).unwrap()).unwrap_err()
    }

    fn concat(parts: &[Vec<u8>]) -> Instructions {
        Instructions(parts.concat())
    }

    fn ctor(name: &str, arity: u16, supertype: &str) -> Value {
        Value::Constructor(Constructor {
            name: name.to_string(),
            arity,
            supertype: supertype.to_string(),
        })
    }

    #[test]
    fn compiles_integer_arithmetic() {
        let image = compile("(+ 1 2)");
        assert_eq!(
            image.constants,
            vec![Value::Integer(1), Value::Integer(2)]
        );
        assert_eq!(
            image.instructions,
            concat(&[
                make(Op::Constant, &[0]),
                make(Op::Constant, &[1]),
                make(Op::Add, &[2]),
            ])
        );
    }

    #[test]
    fn interns_repeated_integer_literals() {
        let image = compile("(+ 1 1 2)");
        assert_eq!(
            image.constants,
            vec![Value::Integer(1), Value::Integer(2)]
        );
        assert_eq!(
            image.instructions,
            concat(&[
                make(Op::Constant, &[0]),
                make(Op::Constant, &[0]),
                make(Op::Constant, &[1]),
                make(Op::Add, &[3]),
            ])
        );
    }

    #[test]
    fn type_definitions_fill_the_pool_in_order() {
        let image = compile("type [List x]: Cons x [List x] | Nil .");
        assert_eq!(
            image.constants,
            vec![ctor("Cons", 2, "List"), ctor("Nil", 0, "List")]
        );
        assert!(image.instructions.is_empty());
    }

    #[test]
    fn constructor_literals_compile_to_construct() {
        let image = compile(
            "type [List x]: Cons x [List x] | Nil .
             [Cons 1 [Nil]]",
        );
        assert_eq!(
            image.constants,
            vec![
                ctor("Cons", 2, "List"),
                ctor("Nil", 0, "List"),
                Value::Integer(1),
            ]
        );
        assert_eq!(
            image.instructions,
            concat(&[
                make(Op::Constant, &[2]),
                make(Op::Construct, &[1, 0]),
                make(Op::Construct, &[0, 2]),
            ])
        );
    }

    #[test]
    fn lowers_a_rule_cascade_with_back_patched_fail_addresses() {
        let image = compile(
            "type [List x]: Cons x [List x] | Nil .
             fun (sum [List Int]) -> Int :
             (sum [Cons x xs]) -> 1 |
             (sum [Nil]) -> 0 .",
        );

        // Pool: Cons, Nil, the reserved function slot, then the interned
        // literals in order of first use.
        assert_eq!(image.constants.len(), 5);
        assert_eq!(image.constants[0], ctor("Cons", 2, "List"));
        assert_eq!(image.constants[1], ctor("Nil", 0, "List"));
        assert_eq!(image.constants[3], Value::Integer(1));
        assert_eq!(image.constants[4], Value::Integer(0));

        let Value::CompiledFunction(fun) = &image.constants[2] else {
            panic!("expected the function at pool index 2");
        };
        // Rule 1 fails to offset 16 (the start of rule 2); rule 2 fails to
        // offset 25 (the terminal OpMatchFailed).
        assert_eq!(
            fun.instructions,
            concat(&[
                make(Op::MatchConstructor, &[0, 16]),
                make(Op::ExpandArgs, &[]),
                make(Op::BindVariable, &[0]),
                make(Op::BindVariable, &[1]),
                make(Op::Constant, &[3]),
                make(Op::ReturnValue, &[]),
                make(Op::MatchConstructor, &[1, 25]),
                make(Op::Constant, &[4]),
                make(Op::ReturnValue, &[]),
                make(Op::MatchFailed, &[]),
            ])
        );
        assert_eq!(image.var_count, 2);
    }

    #[test]
    fn lowers_patterns_right_to_left_and_bodies_with_variables() {
        let image = compile(
            "fun (second Int Int) -> Int :
             (second x y) -> y .",
        );

        let Value::CompiledFunction(fun) = &image.constants[0] else {
            panic!("expected the function at pool index 0");
        };
        // The rightmost pattern is lowered first, so y takes slot 0.
        assert_eq!(
            fun.instructions,
            concat(&[
                make(Op::BindVariable, &[0]),
                make(Op::BindVariable, &[1]),
                make(Op::Variable, &[0]),
                make(Op::ReturnValue, &[]),
                make(Op::MatchFailed, &[]),
            ])
        );
        assert_eq!(image.var_count, 2);
    }

    #[test]
    fn constant_patterns_match_interned_literals() {
        let image = compile(
            "fun (isZero Int) -> Int :
             (isZero 0) -> 1 |
             (isZero x) -> 0 .",
        );

        let Value::CompiledFunction(fun) = &image.constants[0] else {
            panic!("expected the function at pool index 0");
        };
        assert_eq!(
            fun.instructions,
            concat(&[
                make(Op::MatchConstant, &[1, 9]),
                make(Op::Constant, &[2]),
                make(Op::ReturnValue, &[]),
                make(Op::BindVariable, &[0]),
                make(Op::Constant, &[1]),
                make(Op::ReturnValue, &[]),
                make(Op::MatchFailed, &[]),
            ])
        );
    }

    #[test]
    fn calls_push_arguments_then_the_callee() {
        let image = compile(
            "fun (test Int Int) -> Int :
             (test x y) -> 0 .

             (test 2 3)",
        );
        assert_eq!(
            image.instructions,
            concat(&[
                make(Op::Constant, &[2]),
                make(Op::Constant, &[3]),
                make(Op::Constant, &[0]),
                make(Op::Call, &[2]),
            ])
        );
    }

    #[test]
    fn recursive_references_resolve_to_the_reserved_slot() {
        let image = compile(
            "type [List x]: Cons x [List x] | Nil .
             fun (len [List Int]) -> Int :
             (len [Cons x xs]) -> (+ 1 (len xs)) |
             (len [Nil]) -> 0 .",
        );
        let Value::CompiledFunction(fun) = &image.constants[2] else {
            panic!("expected the function at pool index 2");
        };
        let dump = fun.instructions.disassemble();
        // The recursive call pushes the function's own pool index.
        assert!(dump.contains("OpConstant 2"), "{dump}");
        assert!(dump.contains("OpCall 1"), "{dump}");
    }

    #[test]
    fn print_compiles_to_a_single_opcode() {
        let image = compile("(print (+ 1 2))");
        assert_eq!(
            image.instructions,
            concat(&[
                make(Op::Constant, &[0]),
                make(Op::Constant, &[1]),
                make(Op::Add, &[2]),
                make(Op::Print, &[]),
            ])
        );
    }

    #[test]
    fn rejects_an_undefined_variable() {
        let err = compile_err(
            "fun (f Int) -> Int :
             (f x) -> y .",
        );
        assert!(matches!(err, Error::UndefinedVariable(name) if name == "y"));
    }

    #[test]
    fn rejects_an_unknown_constructor_in_a_pattern() {
        let err = compile_err(
            "fun (f Int) -> Int :
             (f [Cons x xs]) -> x .",
        );
        assert!(matches!(err, Error::UnknownConstructor(name) if name == "Cons"));
    }

    #[test]
    fn rejects_an_unknown_function() {
        let err = compile_err("(missing 1)");
        assert!(matches!(err, Error::UnknownFunction(name) if name == "missing"));
    }

    #[test]
    fn rejects_a_shadowed_constructor_name() {
        let err = compile_err(
            "type [List x]: Cons x [List x] | Nil .
             type [Tree x]: Node x | Nil .",
        );
        assert!(matches!(err, Error::DuplicateConstructor(name) if name == "Nil"));
    }

    #[test]
    fn rejects_a_constructor_applied_at_the_wrong_arity() {
        let err = compile_err(
            "type [List x]: Cons x [List x] | Nil .
             [Cons 1]",
        );
        assert!(matches!(
            err,
            Error::ConstructorArity { expected: 2, got: 1, .. }
        ));
    }
}
