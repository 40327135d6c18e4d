//! Análisis sintáctico.
//!
//! Cada forma entre paréntesis tiene una cabeza, que determina la clase
//! del nodo, seguida de sus hijos. Un token fuera de paréntesis es un nodo
//! sin hijos. No existe un árbol sin validar: cada nodo se entrega a
//! [`Context::build()`] en cuanto se conocen todos sus hijos, por lo cual
//! la validación semántica ocurre durante el mismo recorrido.

use std::{rc::Rc, sync::Arc};

use crate::{
    config::Config,
    error::{Compile, CompileError},
    langspec::OpcodeSpec,
    lex::{Token, TokenKind},
    semantic::Context,
    source::{Located, Location},
};

/// Nodo del árbol sintáctico.
#[derive(Debug, Clone)]
pub struct Node {
    token: Located<Token>,
    children: Vec<Node>,
    doc: Option<Rc<str>>,
    config: Rc<Config>,
    kind: NodeKind,
}

/// Clase de un nodo, junto a lo que se resolvió al validarlo.
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Programa completo.
    Root,

    /// Instrucción primitiva, incluyendo literales.
    Opcode(Instruction),

    /// Destino de saltos; sus hijos se emiten después de la etiqueta.
    Label,

    /// No emite nada.
    Comment,

    /// Acceso a scratch space, ya reescrito como `store` o `load`.
    Variable(Instruction),

    Const(Constant),

    /// `#case`, con su etiqueta de salida ya asignada.
    Case { label: Rc<str> },

    /// `#in`, con su etiqueta de salida compartida ya asignada.
    In { label: Rc<str> },

    /// `#while`. La etiqueta de fin se deriva de la de inicio.
    While { label: Rc<str> },

    /// `#fn`, solo agrupa.
    Function,

    /// `#itxn`, bloque de campos de una transacción interna.
    InnerTransaction,
}

/// Definición o uso de una constante.
#[derive(Debug, Clone)]
pub enum Constant {
    /// La definición no emite nada; su único hijo es el literal.
    Definition,

    /// Una referencia emite el literal enlazado en la definición.
    Reference(Rc<Node>),
}

/// Instrucción resuelta contra la tabla de especificación.
#[derive(Debug, Clone)]
pub struct Instruction {
    pub spec: Arc<OpcodeSpec>,
    pub immediates: Vec<Rc<str>>,
}

impl Instruction {
    /// Nombre de la instrucción seguido de sus argumentos inmediatos.
    pub fn statement(&self) -> String {
        let mut statement = self.spec.name.clone();
        for immediate in &self.immediates {
            statement.push(' ');
            statement.push_str(immediate);
        }

        statement
    }
}

impl Node {
    pub(crate) fn new(
        token: Located<Token>,
        children: Vec<Node>,
        config: Rc<Config>,
        kind: NodeKind,
    ) -> Self {
        Node {
            token,
            children,
            doc: None,
            config,
            kind,
        }
    }

    /// Agrega documentación, que se emite como comentario al final
    /// de la línea del nodo.
    pub(crate) fn with_doc(self, doc: Rc<str>) -> Self {
        Node {
            doc: Some(doc),
            ..self
        }
    }

    pub fn token(&self) -> &Located<Token> {
        &self.token
    }

    pub fn location(&self) -> &Location {
        self.token.location()
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub fn doc(&self) -> Option<&Rc<str>> {
        self.doc.as_ref()
    }

    pub fn config(&self) -> &Rc<Config> {
        &self.config
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Hijos que no son comentarios. Las reglas de aridad solo
    /// consideran a estos.
    pub fn noncomments(&self) -> impl Iterator<Item = &Node> {
        self.children.iter().filter(|child| !child.is_comment())
    }

    pub fn is_comment(&self) -> bool {
        matches!(self.kind, NodeKind::Comment)
    }

    /// Determina si el nodo es un literal entero o de bytes.
    pub fn is_literal(&self) -> bool {
        matches!(self.kind, NodeKind::Opcode(_))
            && matches!(self.token.val().kind(), TokenKind::Int | TokenKind::Bytes)
    }

    /// Instrucción resuelta, si el nodo emite una.
    pub fn instruction(&self) -> Option<&Instruction> {
        match &self.kind {
            NodeKind::Opcode(instruction) | NodeKind::Variable(instruction) => Some(instruction),
            NodeKind::Const(Constant::Reference(bound)) => bound.instruction(),
            _ => None,
        }
    }

    /// Cantidad de valores que este nodo deja en la pila.
    ///
    /// Solo las instrucciones, las variables y las referencias a
    /// constantes aportan valores.
    pub fn returns(&self) -> usize {
        self.instruction()
            .map_or(0, |instruction| instruction.spec.return_count())
    }
}

/// Construye el árbol de un programa completo a partir de un flujo de tokens.
///
/// `start` es la ubicación a la que se asocia el nodo raíz.
pub fn parse<I>(tokens: I, start: Location, context: &mut Context<'_>) -> Compile<Node>
where
    I: Iterator<Item = Compile<Located<Token>>>,
{
    let mut parser = Parser { tokens, context };

    let mut children = Vec::new();
    while let Some(token) = parser.next()? {
        children.push(parser.form(token)?);
    }

    parser
        .context
        .build(Located::at(Token::root(), start), children)
}

struct Parser<'c, 's, I> {
    tokens: I,
    context: &'c mut Context<'s>,
}

impl<I> Parser<'_, '_, I>
where
    I: Iterator<Item = Compile<Located<Token>>>,
{
    fn form(&mut self, token: Located<Token>) -> Compile<Node> {
        match token.val().kind() {
            TokenKind::Open => self.group(token),
            TokenKind::Close | TokenKind::Root => Err(invalid(token)),
            _ => self.context.build(token, Vec::new()),
        }
    }

    fn group(&mut self, open: Located<Token>) -> Compile<Node> {
        let head = self.inside(&open)?;
        if let TokenKind::Open | TokenKind::Close | TokenKind::Root = head.val().kind() {
            return Err(invalid(head));
        }

        let mut children = Vec::new();
        loop {
            let token = self.inside(&open)?;
            if token.val().kind() == TokenKind::Close {
                break;
            }

            children.push(self.form(token)?);
        }

        self.context.build(head, children)
    }

    /// Siguiente token dentro de la forma que abre `open`.
    fn inside(&mut self, open: &Located<Token>) -> Compile<Located<Token>> {
        self.next()?.ok_or_else(|| {
            Located::at(CompileError::UnclosedExpression, open.location().clone())
        })
    }

    fn next(&mut self) -> Compile<Option<Located<Token>>> {
        self.tokens.next().transpose()
    }
}

fn invalid(token: Located<Token>) -> Located<CompileError> {
    token.map(|token| CompileError::InvalidToken(token.text().clone()))
}
