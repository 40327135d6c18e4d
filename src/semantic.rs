//! Análisis semántico.
//!
//! Cada nodo se valida en el momento en que se construye. Algunas clases de
//! nodo, además de validarse, reservan recursos del programa: slots de
//! scratch space para variables, etiquetas para macros de control de flujo
//! y enlaces de constantes. Estas tablas viven en un [`Context`] que dura
//! exactamente una compilación.

use std::{
    collections::{HashMap, HashSet},
    fmt::{self, Display},
    rc::Rc,
    sync::Arc,
};

use log::debug;

use crate::{
    config::Config,
    error::{Compile, CompileError},
    langspec::{LangSpec, OpcodeSpec},
    lex::{Keyword, Token, TokenKind, LABEL_SUFFIX, NONSTRICT_MARKER},
    parse::{Constant, Instruction, Node, NodeKind},
    source::Located,
};

/// Capacidad del scratch space, en slots.
pub const MAX_SCRATCH_SPACE: usize = 256;

/// Sufijo de la etiqueta de salida de un `#while`.
pub const WHILE_END_SUFFIX: &str = "_end";

/// Categoría de una etiqueta generada.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum LabelKind {
    In,
    Case,
    While,
}

impl Display for LabelKind {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self {
            LabelKind::In => "in",
            LabelKind::Case => "case",
            LabelKind::While => "while",
        };

        fmt.write_str(prefix)
    }
}

/// Tablas de asignación de una compilación.
#[derive(Default)]
struct Allocations {
    scratch: Vec<Rc<str>>,
    labels: HashMap<LabelKind, u32>,
    label_names: HashSet<Rc<str>>,
    constants: HashMap<Rc<str>, Rc<Node>>,
}

/// Contexto de una compilación.
pub struct Context<'a> {
    spec: &'a LangSpec,
    config: Rc<Config>,
    allocations: Allocations,
}

impl<'a> Context<'a> {
    pub fn new(spec: &'a LangSpec, config: Config) -> Self {
        Context {
            spec,
            config: Rc::new(config),
            allocations: Default::default(),
        }
    }

    pub fn config(&self) -> &Rc<Config> {
        &self.config
    }

    /// Slot asignado a una variable, si existe.
    pub fn scratch_slot(&self, name: &str) -> Option<usize> {
        self.allocations
            .scratch
            .iter()
            .position(|allocated| allocated.as_ref() == name)
    }

    /// Valida y construye un nodo a partir de su token de cabeza y sus
    /// hijos, ya construidos.
    pub fn build(&mut self, token: Located<Token>, children: Vec<Node>) -> Compile<Node> {
        match token.val().kind() {
            TokenKind::Opcode => self.opcode(token, children),
            TokenKind::Bytes => self.literal(token, children, "byte"),
            TokenKind::Int => self.literal(token, children, "int"),
            TokenKind::Variable => self.variable(token, children),
            TokenKind::Constant => self.constant(token, children),
            TokenKind::Label => self.label(token, children),
            TokenKind::Comment => Ok(self.node(token, children, NodeKind::Comment)),
            TokenKind::Root => Ok(self.node(token, children, NodeKind::Root)),

            TokenKind::Keyword(keyword) => match keyword {
                Keyword::Case => self.case(token, children),
                Keyword::In => self.switch(token, children),
                Keyword::While => self.repeat(token, children),
                Keyword::Fn => Ok(self.node(token, children, NodeKind::Function)),
                Keyword::Itxn => self.inner_transaction(token, children),
            },

            TokenKind::Open | TokenKind::Close => {
                let error = CompileError::InvalidToken(token.val().text().clone());
                Err(fail(&token, error))
            }
        }
    }

    fn node(&self, token: Located<Token>, children: Vec<Node>, kind: NodeKind) -> Node {
        Node::new(token, children, Rc::clone(&self.config), kind)
    }

    fn opcode(&mut self, token: Located<Token>, children: Vec<Node>) -> Compile<Node> {
        let nonstrict = self.config.honors_nonstrict_marker() && token.val().is_nonstrict();

        let head = token.val().head();
        let name = match nonstrict {
            true => head.strip_prefix(NONSTRICT_MARKER).unwrap_or(head),
            false => head,
        };

        let spec = self.lookup(&token, name)?;
        let immediates = token.val().args().map(Rc::from).collect();
        let instruction = Instruction { spec, immediates };

        if !nonstrict {
            self.check(&token, &instruction, &children)?;
        }

        Ok(self.node(token, children, NodeKind::Opcode(instruction)))
    }

    /// Los literales son pseudoinstrucciones cuyo único argumento
    /// inmediato es el texto del literal.
    fn literal(&mut self, token: Located<Token>, children: Vec<Node>, pseudo: &str) -> Compile<Node> {
        let spec = self.lookup(&token, pseudo)?;
        let instruction = Instruction {
            spec,
            immediates: vec![token.val().text().clone()],
        };

        self.check(&token, &instruction, &children)?;
        Ok(self.node(token, children, NodeKind::Opcode(instruction)))
    }

    /// Una variable con hijos es una definición (`store`), sin hijos
    /// es una lectura (`load`).
    fn variable(&mut self, token: Located<Token>, children: Vec<Node>) -> Compile<Node> {
        let name = token.val().text().clone();
        let defines = children.iter().any(|child| !child.is_comment());

        let (opcode, slot) = if defines {
            let slot = self
                .allocate_scratch(&name)
                .ok_or_else(|| fail(&token, CompileError::ScratchOverflow(name.clone())))?;

            ("store", slot)
        } else {
            let slot = self
                .scratch_slot(&name)
                .ok_or_else(|| fail(&token, CompileError::ScratchNotFound(name.clone())))?;

            ("load", slot)
        };

        let instruction = Instruction {
            spec: self.lookup(&token, opcode)?,
            immediates: vec![Rc::from(slot.to_string())],
        };

        self.check(&token, &instruction, &children)?;

        let node = self.node(token, children, NodeKind::Variable(instruction));
        Ok(node.with_doc(name))
    }

    fn constant(&mut self, token: Located<Token>, children: Vec<Node>) -> Compile<Node> {
        let name = token.val().text().clone();

        let mut values = children.iter().filter(|child| !child.is_comment());
        let kind = match (values.next(), values.next()) {
            (None, _) => {
                let bound = self
                    .allocations
                    .constants
                    .get(&name)
                    .ok_or_else(|| fail(&token, CompileError::ConstantNotDefined(name.clone())))?;

                Constant::Reference(Rc::clone(bound))
            }

            (Some(value), None) => {
                if !value.is_literal() {
                    return Err(fail(&token, CompileError::ConstantLiteral));
                } else if self.allocations.constants.contains_key(&name) {
                    return Err(fail(&token, CompileError::ConstantRedefined(name)));
                }

                debug!("Bound constant `{}` to `{}`", name, value.token().val().text());

                let bound = Rc::new(value.clone());
                self.allocations.constants.insert(name.clone(), bound);

                Constant::Definition
            }

            (Some(_), Some(_)) => return Err(fail(&token, CompileError::ConstantArity)),
        };

        let node = self.node(token, children, NodeKind::Const(kind));
        Ok(node.with_doc(name))
    }

    /// Las etiquetas del usuario comparten espacio de nombres con las
    /// generadas por macros.
    fn label(&mut self, token: Located<Token>, children: Vec<Node>) -> Compile<Node> {
        let text = token.val().text();
        let name: Rc<str> = Rc::from(text.strip_suffix(LABEL_SUFFIX).unwrap_or(text));

        if !self.allocations.label_names.insert(Rc::clone(&name)) {
            return Err(fail(&token, CompileError::LabelRedefined(name)));
        }

        Ok(self.node(token, children, NodeKind::Label))
    }

    fn case(&mut self, token: Located<Token>, children: Vec<Node>) -> Compile<Node> {
        if count(&children) < 2 {
            return Err(fail(&token, CompileError::CaseArity));
        }

        let label = self.allocate_label(LabelKind::Case);
        Ok(self.node(token, children, NodeKind::Case { label }))
    }

    fn switch(&mut self, token: Located<Token>, children: Vec<Node>) -> Compile<Node> {
        if count(&children) < 2 {
            return Err(fail(&token, CompileError::InArity));
        }

        let all_cases = children
            .iter()
            .filter(|child| !child.is_comment())
            .all(|child| matches!(child.kind(), NodeKind::Case { .. }));

        if !all_cases {
            return Err(fail(&token, CompileError::InNotCase));
        }

        let label = self.allocate_label(LabelKind::In);
        Ok(self.node(token, children, NodeKind::In { label }))
    }

    fn repeat(&mut self, token: Located<Token>, children: Vec<Node>) -> Compile<Node> {
        if count(&children) < 2 {
            return Err(fail(&token, CompileError::WhileArity));
        }

        let label = self.allocate_label(LabelKind::While);
        Ok(self.node(token, children, NodeKind::While { label }))
    }

    fn inner_transaction(&mut self, token: Located<Token>, children: Vec<Node>) -> Compile<Node> {
        if count(&children) < 1 {
            return Err(fail(&token, CompileError::ItxnArity));
        }

        let all_fields = children
            .iter()
            .filter(|child| !child.is_comment())
            .all(|child| match child.kind() {
                NodeKind::Opcode(instruction) => instruction.spec.name == "itxn_field",
                _ => false,
            });

        if !all_fields {
            return Err(fail(&token, CompileError::ItxnField));
        }

        Ok(self.node(token, children, NodeKind::InnerTransaction))
    }

    /// Verifica aridades de pila y de argumentos inmediatos.
    fn check(
        &self,
        token: &Located<Token>,
        instruction: &Instruction,
        children: &[Node],
    ) -> Compile<()> {
        if !self.config.is_strict() {
            return Ok(());
        }

        let spec = &instruction.spec;

        let expected = spec.arg_count();
        let found: usize = children.iter().map(Node::returns).sum();
        if found != expected {
            return Err(fail(token, CompileError::StackArgs { expected, found }));
        }

        let details = &spec.immediate_details;
        if details.is_empty() {
            return Ok(());
        }

        let expected = details.len();
        let found = instruction.immediates.len();
        let accepted = match spec.is_variadic() {
            true => found + 1 >= expected,
            false => found == expected,
        };

        if !accepted {
            return Err(fail(token, CompileError::ImmediateArgs { expected, found }));
        }

        for (arg, detail) in instruction.immediates.iter().zip(details) {
            let reference = match &detail.reference {
                Some(reference) => reference,
                None => continue,
            };

            let valid = self.spec.field_names(&spec.name, reference);
            if !valid.contains(&arg.as_ref()) {
                let error = CompileError::InvalidArg {
                    arg: Rc::clone(arg),
                    valid: valid.join(", "),
                };

                return Err(fail(token, error));
            }
        }

        Ok(())
    }

    fn lookup(&self, token: &Located<Token>, name: &str) -> Compile<Arc<OpcodeSpec>> {
        self.spec
            .opcode(name)
            .cloned()
            .ok_or_else(|| fail(token, CompileError::InvalidOpcode(Rc::from(name))))
    }

    fn allocate_scratch(&mut self, name: &Rc<str>) -> Option<usize> {
        if self.config.reuses_scratch() {
            if let Some(slot) = self.scratch_slot(name) {
                return Some(slot);
            }
        }

        let scratch = &mut self.allocations.scratch;
        let slot = scratch.len();
        if slot >= MAX_SCRATCH_SPACE {
            return None;
        }

        scratch.push(Rc::clone(name));
        debug!("Allocated scratch slot {} for `{}`", slot, name);

        Some(slot)
    }

    /// Reserva la siguiente etiqueta libre de la categoría dada. Se saltan
    /// los números cuyo nombre ya fue declarado por el usuario.
    fn allocate_label(&mut self, kind: LabelKind) -> Rc<str> {
        let Allocations { labels, label_names, .. } = &mut self.allocations;
        let counter = labels.entry(kind).or_insert(0);

        loop {
            let label: Rc<str> = Rc::from(format!("{}_{}", kind, counter));
            *counter += 1;

            let end: Option<Rc<str>> = match kind {
                LabelKind::While => Some(Rc::from(format!("{}{}", label, WHILE_END_SUFFIX))),
                _ => None,
            };

            let taken = label_names.contains(&label)
                || end.as_ref().is_some_and(|end| label_names.contains(end));

            if taken {
                debug!("Skipped label `{}`, already declared", label);
                continue;
            }

            label_names.insert(Rc::clone(&label));
            label_names.extend(end);

            debug!("Allocated label `{}`", label);
            return label;
        }
    }
}

fn count(children: &[Node]) -> usize {
    children.iter().filter(|child| !child.is_comment()).count()
}

fn fail(token: &Located<Token>, error: CompileError) -> Located<CompileError> {
    Located::at(error, token.location().clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{compile, config::CompileOptions};
    use assert2::{check, let_assert};

    fn build(source: &str) -> Compile<Node> {
        build_with(source, Config::default())
    }

    fn build_with(source: &str, config: Config) -> Compile<Node> {
        compile(source.as_bytes(), "<test>", &config, LangSpec::bundled())
    }

    fn slots(root: &Node) -> Vec<String> {
        root.children()
            .iter()
            .filter_map(Node::instruction)
            .map(Instruction::statement)
            .collect()
    }

    #[test]
    fn stack_arity_matches() {
        check!(build("(return (+ 1 2))").is_ok());
        check!(build("(app_global_put \"key\" (itob 3))").is_ok());

        let_assert!(Err(error) = build("(return (+ 1))"));
        let_assert!(CompileError::StackArgs { expected: 2, found: 1 } = error.val());

        let_assert!(Err(error) = build("(return 1 2)"));
        let_assert!(CompileError::StackArgs { expected: 1, found: 2 } = error.val());
    }

    #[test]
    fn comments_do_not_count() {
        check!(build("(return `exit code` 1)").is_ok());
    }

    #[test]
    fn nonstrict_marker_skips_checks() {
        check!(build("(?return 1 2)").is_ok());
        check!(build("?pop").is_ok());

        let without_marker =
            Config::default().with_options(CompileOptions::all() - CompileOptions::NONSTRICT_MARKER);

        let_assert!(Err(error) = build_with("?pop", without_marker));
        let_assert!(CompileError::InvalidOpcode(name) = error.val());
        check!(name.as_ref() == "?pop");
    }

    #[test]
    fn lenient_config_skips_checks() {
        let lenient = Config::default().with_options(CompileOptions::all() - CompileOptions::STRICT);
        check!(build_with("(return 1 2) txn (gtxn.0 1)", lenient).is_ok());
    }

    #[test]
    fn invalid_opcode() {
        let_assert!(Err(error) = build("\n  (frobnicate 1)"));
        let_assert!(CompileError::InvalidOpcode(name) = error.val());
        check!(name.as_ref() == "frobnicate");

        let start = error.location().start();
        check!((start.line(), start.column()) == (2, 4));
    }

    #[test]
    fn immediate_arity() {
        check!(build("(return txn.Fee)").is_ok());
        check!(build("(pop gtxn.0.Sender)").is_ok());

        let_assert!(Err(error) = build("(pop gtxn.0)"));
        let_assert!(CompileError::ImmediateArgs { expected: 2, found: 1 } = error.val());

        let_assert!(Err(error) = build("(pop txn.Fee.Sender)"));
        let_assert!(CompileError::ImmediateArgs { expected: 1, found: 2 } = error.val());
    }

    #[test]
    fn variadic_immediates() {
        check!(build("(switch.a.b.c 1) a: b: c:").is_ok());
        check!(build("(switch 1)").is_ok());
        check!(build("pushints.1.2.3 ?pop ?pop ?pop").is_ok());
    }

    #[test]
    fn reference_args() {
        check!(build("(#itxn (itxn_field.Receiver txn.Sender))").is_ok());

        let_assert!(Err(error) = build("(pop txn.Nope)"));
        let_assert!(CompileError::InvalidArg { arg, valid } = error.val());
        check!(arg.as_ref() == "Nope");
        check!(valid.starts_with("Sender, Fee, "));
    }

    #[test]
    fn scratch_slots() {
        let_assert!(Ok(root) = build("($x 1) ($y 2) ($x 3) (return $y)"));
        check!(slots(&root) == ["store 0", "store 1", "store 0", "return"]);

        let_assert!([.., ret] = root.children());
        let_assert!([load] = ret.children());
        check!(load.instruction().map(Instruction::statement) == Some("load 1".to_owned()));
        check!(load.doc().map(|doc| doc.to_string()) == Some("$y".to_owned()));
    }

    #[test]
    fn scratch_without_reuse() {
        let config = Config::default().with_options(CompileOptions::all() - CompileOptions::REUSE_SCRATCH);
        let_assert!(Ok(root) = build_with("($x 1) ($y 2) ($x 3) (return $x)", config));
        let statements = slots(&root);
        check!(&statements[..3] == ["store 0", "store 1", "store 2"]);

        let_assert!([.., ret] = root.children());
        let_assert!([load] = ret.children());
        check!(load.instruction().map(Instruction::statement) == Some("load 0".to_owned()));
    }

    #[test]
    fn undefined_variable() {
        let_assert!(Err(error) = build("(return $z)"));
        let_assert!(CompileError::ScratchNotFound(name) = error.val());
        check!(name.as_ref() == "$z");
    }

    #[test]
    fn scratch_capacity() {
        let mut source: String = (0..MAX_SCRATCH_SPACE).map(|i| format!("($v{} 1)\n", i)).collect();

        let_assert!(Ok(root) = build(&source));
        let_assert!(Some(last) = root.children().last());
        check!(last.instruction().map(Instruction::statement) == Some("store 255".to_owned()));

        source.push_str("($overflow 1)");
        let_assert!(Err(error) = build(&source));
        let_assert!(CompileError::ScratchOverflow(name) = error.val());
        check!(name.as_ref() == "$overflow");
        check!(error.location().start().line() == 257);
    }

    #[test]
    fn constants() {
        let_assert!(Ok(root) = build("(@limit 10) (return (< @limit 20))"));
        let_assert!([definition, ret] = root.children());
        check!(matches!(definition.kind(), NodeKind::Const(Constant::Definition)));
        check!(definition.returns() == 0);

        let_assert!([less] = ret.children());
        let_assert!([reference, _] = less.children());
        check!(reference.returns() == 1);
        check!(reference.instruction().map(Instruction::statement) == Some("int 10".to_owned()));
    }

    #[test]
    fn constant_errors() {
        let_assert!(Err(error) = build("(@c 1) (@c 2)"));
        check!(matches!(error.val(), CompileError::ConstantRedefined(_)));
        check!(error.location().start().column() == 9);

        let_assert!(Err(error) = build("(return @c) (@c 1)"));
        check!(matches!(error.val(), CompileError::ConstantNotDefined(_)));

        let_assert!(Err(error) = build("(@c 1 2)"));
        check!(matches!(error.val(), CompileError::ConstantArity));

        let_assert!(Err(error) = build("(@c (+ 1 2))"));
        check!(matches!(error.val(), CompileError::ConstantLiteral));
    }

    #[test]
    fn macro_arity() {
        let_assert!(Err(error) = build("(#case 1)"));
        check!(matches!(error.val(), CompileError::CaseArity));

        let_assert!(Err(error) = build("(#in (#case 1 (pop 2)))"));
        check!(matches!(error.val(), CompileError::InArity));

        let_assert!(Err(error) = build("(#in (#case 1 (pop 2)) (pop 3))"));
        check!(matches!(error.val(), CompileError::InNotCase));

        let_assert!(Err(error) = build("(#while `forever` 1)"));
        check!(matches!(error.val(), CompileError::WhileArity));

        let_assert!(Err(error) = build("(#itxn)"));
        check!(matches!(error.val(), CompileError::ItxnArity));

        let_assert!(Err(error) = build("(#itxn (itxn_field.Fee 1) (pop 1))"));
        check!(matches!(error.val(), CompileError::ItxnField));
    }

    #[test]
    fn labels_are_unique() {
        let_assert!(Ok(root) = build("(#case 1 (pop 2)) (#case 3 (pop 4)) (#while 1 (pop 5))"));

        let labels: Vec<_> = root
            .children()
            .iter()
            .filter_map(|child| match child.kind() {
                NodeKind::Case { label } | NodeKind::While { label } => Some(label.to_string()),
                _ => None,
            })
            .collect();

        check!(labels == ["case_0", "case_1", "while_0"]);
    }

    #[test]
    fn generated_labels_skip_declared_names() {
        let_assert!(Ok(root) = build("(case_0: (pop 1)) (while_1_end: (pop 2)) (#case 1 (pop 3)) (#while 0 (pop 4)) (#while 0 (pop 5))"));

        let labels: Vec<_> = root
            .children()
            .iter()
            .filter_map(|child| match child.kind() {
                NodeKind::Case { label } | NodeKind::While { label } => Some(label.to_string()),
                _ => None,
            })
            .collect();

        check!(labels == ["case_1", "while_0", "while_2"]);
    }

    #[test]
    fn declared_labels_cannot_reuse_names() {
        let_assert!(Err(error) = build("(#case 1 (pop 2)) (case_0: (pop 3))"));
        let_assert!(CompileError::LabelRedefined(name) = error.val());
        check!(name.as_ref() == "case_0");
        check!(error.location().start().column() == 20);

        let_assert!(Err(error) = build("(#while 0 (pop 1)) while_0_end:"));
        check!(matches!(error.val(), CompileError::LabelRedefined(_)));

        let_assert!(Err(error) = build("main: (b.main) main:"));
        check!(matches!(error.val(), CompileError::LabelRedefined(_)));
    }

    #[test]
    fn contexts_are_independent() {
        let_assert!(Ok(_) = build("($x 1) (@c 2) (#case 1 (pop 2))"));
        let_assert!(Ok(root) = build("($y 1) (@c 3) (#case 1 (pop 2))"));

        let_assert!([store, _, case] = root.children());
        check!(store.instruction().map(Instruction::statement) == Some("store 0".to_owned()));
        let_assert!(NodeKind::Case { label } = case.kind());
        check!(label.as_ref() == "case_0");
    }
}
