//! Generación de código.
//!
//! Recorre un árbol ya validado y produce las líneas de salida. Las macros
//! de control de flujo se expanden aquí en saltos y etiquetas. Todas las
//! etiquetas fueron asignadas durante la validación, por lo cual emitir el
//! mismo árbol dos veces produce exactamente la misma salida.

use std::{
    io::{self, Write},
    rc::Rc,
};

use crate::{
    ir::Line,
    lex::LABEL_SUFFIX,
    parse::{Constant, Instruction, Node, NodeKind},
    semantic::WHILE_END_SUFFIX,
};

/// Emite las líneas de un árbol.
pub fn emit(root: &Node) -> Vec<Line> {
    let mut emitter = Emitter { lines: Vec::new() };
    emitter.node(root);
    emitter.lines
}

/// Escribe las líneas de un árbol, una por línea de texto.
pub fn write<W: Write>(root: &Node, output: &mut W) -> io::Result<()> {
    for line in emit(root) {
        writeln!(output, "{}", line)?;
    }

    Ok(())
}

struct Emitter {
    lines: Vec<Line>,
}

impl Emitter {
    fn push(&mut self, line: Line) {
        self.lines.push(line);
    }

    fn node(&mut self, node: &Node) {
        match node.kind() {
            NodeKind::Root => {
                self.push(Line::Pragma(node.config().pragma_version));
                self.children(node);
            }

            NodeKind::Opcode(instruction) | NodeKind::Variable(instruction) => {
                self.children(node);
                self.instruction(instruction, node.doc());
            }

            NodeKind::Label => {
                let text = node.token().val().text();
                let label = text.strip_suffix(LABEL_SUFFIX).unwrap_or(text);

                self.push(Line::Label(Rc::from(label)));
                self.children(node);
            }

            NodeKind::Comment | NodeKind::Const(Constant::Definition) => (),

            NodeKind::Const(Constant::Reference(bound)) => {
                if let Some(instruction) = bound.instruction() {
                    self.children(bound);
                    self.instruction(instruction, node.doc());
                }
            }

            NodeKind::Case { label } => self.case(node, label, None),

            NodeKind::In { label } => {
                for case in node.noncomments() {
                    if let NodeKind::Case { label: own } = case.kind() {
                        self.case(case, own, Some(label));
                    }
                }

                self.push(Line::Label(Rc::clone(label)));
            }

            NodeKind::While { label } => {
                let end: Rc<str> = Rc::from(format!("{}{}", label, WHILE_END_SUFFIX));
                let mut children = node.noncomments();

                self.push(Line::Label(Rc::clone(label)));
                if let Some(condition) = children.next() {
                    self.node(condition);
                }

                emit!(self, "bz {}", end);
                children.for_each(|child| self.node(child));
                emit!(self, "b {}", label);

                self.push(Line::Label(end));
            }

            NodeKind::Function => self.children(node),

            NodeKind::InnerTransaction => {
                emit!(self, "itxn_begin");
                self.children(node);
                emit!(self, "itxn_submit");
            }
        }
    }

    fn children(&mut self, node: &Node) {
        for child in node.children() {
            self.node(child);
        }
    }

    fn instruction(&mut self, instruction: &Instruction, doc: Option<&Rc<str>>) {
        self.push(Line::Instruction {
            statement: instruction.statement(),
            comment: doc.cloned(),
        });
    }

    /// Condición, salto a la etiqueta del caso si es falsa, cuerpo y, si el
    /// caso pertenece a un `#in`, salto a la salida compartida.
    fn case(&mut self, node: &Node, label: &Rc<str>, exit: Option<&Rc<str>>) {
        let mut children = node.noncomments();
        if let Some(condition) = children.next() {
            self.node(condition);
        }

        emit!(self, "bz {}", label);
        children.for_each(|child| self.node(child));

        if let Some(exit) = exit {
            emit!(self, "b {}", exit);
        }

        self.push(Line::Label(Rc::clone(label)));
    }
}
