//! Análisis léxico.
//!
//! # Tokenization
//! Esta es la primera fase del compilador. Descompone un [`InputStream`]
//! (flujo de caracteres) en unidades léxicas denominadas tokens. Los espacios
//! en blanco se descartan durante esta operación, pero los comentarios se
//! preservan como tokens, ya que ocupan una posición en el árbol. Cada token
//! emitido esta asociado a una ubicación en el código fuente original, lo
//! cual permite rastrear errores en tanto los mismos como constructos más
//! elevados de fases posteriores.
//!
//! # Contenido de un token
//! Todo token conserva su texto original. Un átomo puede tener la forma
//! `cabeza.arg1.arg2`, en cuyo caso la cabeza es el nombre lógico y el resto
//! de segmentos son argumentos inmediatos escritos en línea.
//!
//! # Reglas importantes del lenguaje
//! - `(` y `)` siempre son tokens de un carácter.
//! - Los comentarios se delimitan con `` ` `` y las cadenas de bytes con `"`.
//!   Un delimitador sin cerrar consume hasta el final de la entrada.
//! - Una secuencia de dígitos decimales es un literal entero.
//! - Un átomo que termina en `:` define una etiqueta, uno que comienza con
//!   `$` es una variable y uno que comienza con `@` es una constante.
//! - `#in`, `#case`, `#while`, `#fn` e `#itxn` son palabras clave.
//!
//! # Errores
//! El único error posible es de E/S. Tras él, el lexer no emite más tokens.

use crate::{
    error::{Compile, CompileError},
    source::{InputStream, Located, Location},
};

use std::{
    fmt::{self, Display},
    iter::Peekable,
    mem,
    rc::Rc,
    str::FromStr,
};

/// Delimitador de comentarios.
pub const COMMENT: char = '`';

/// Delimitador de cadenas de bytes.
pub const STRING: char = '"';

/// Sufijo de definición de etiquetas.
pub const LABEL_SUFFIX: char = ':';

/// Prefijo de variables.
pub const VARIABLE_PREFIX: char = '$';

/// Prefijo de constantes.
pub const CONSTANT_PREFIX: char = '@';

/// Marca que desactiva las verificaciones de aridad para un solo nodo.
pub const NONSTRICT_MARKER: char = '?';

/// Separador de argumentos inmediatos en línea.
pub const ARG_SEPARATOR: char = '.';

/// Clase de un token.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TokenKind {
    /// `(`
    Open,

    /// `)`
    Close,

    /// Literal de cadena de bytes, con sus delimitadores.
    Bytes,

    /// Literal entero.
    Int,

    /// Nombre de instrucción.
    Opcode,

    /// Definición de etiqueta.
    Label,

    /// Referencia a variable.
    Variable,

    /// Referencia a constante.
    Constant,

    /// Comentario, sin sus delimitadores.
    Comment,

    /// Palabra clave.
    Keyword(Keyword),

    /// Marcador virtual del inicio del programa.
    Root,
}

/// Una palabra clave.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Keyword {
    In,
    Case,
    While,
    Fn,
    Itxn,
}

impl Display for Keyword {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Keyword::*;
        let string = match self {
            In => "#in",
            Case => "#case",
            While => "#while",
            Fn => "#fn",
            Itxn => "#itxn",
        };

        fmt.write_str(string)
    }
}

impl FromStr for Keyword {
    type Err = ();

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        use Keyword::*;

        const KEYWORDS: &[(&str, Keyword)] = &[
            ("#in", In),
            ("#case", Case),
            ("#while", While),
            ("#fn", Fn),
            ("#itxn", Itxn),
        ];

        KEYWORDS
            .iter()
            .find(|&&(name, _)| name == string)
            .map(|&(_, keyword)| keyword)
            .ok_or(())
    }
}

/// Objeto resultante del análisis léxico.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    kind: TokenKind,
    text: Rc<str>,
}

impl Token {
    pub fn new<S: Into<Rc<str>>>(kind: TokenKind, text: S) -> Self {
        Token {
            kind,
            text: text.into(),
        }
    }

    /// Token virtual que representa al programa completo.
    pub fn root() -> Self {
        Token::new(TokenKind::Root, "")
    }

    pub fn kind(&self) -> TokenKind {
        self.kind
    }

    /// Texto original, tal y como aparece en el código fuente.
    pub fn text(&self) -> &Rc<str> {
        &self.text
    }

    /// Nombre lógico: el texto previo al primer separador de argumentos.
    ///
    /// Literales y comentarios no se fragmentan.
    pub fn head(&self) -> &str {
        match self.kind {
            TokenKind::Bytes | TokenKind::Int | TokenKind::Comment => &self.text,
            _ => self
                .text
                .split(ARG_SEPARATOR)
                .next()
                .unwrap_or_default(),
        }
    }

    /// Argumentos inmediatos escritos en línea después de la cabeza.
    pub fn args(&self) -> impl Iterator<Item = &str> {
        let rest = match self.kind {
            TokenKind::Bytes | TokenKind::Int | TokenKind::Comment => None,
            _ => self
                .text
                .split_once(ARG_SEPARATOR)
                .map(|(_, rest)| rest),
        };

        rest.into_iter().flat_map(|rest| rest.split(ARG_SEPARATOR))
    }

    /// Determina si el token lleva la marca que desactiva verificaciones.
    pub fn is_nonstrict(&self) -> bool {
        self.kind == TokenKind::Opcode
            && self.text.len() > NONSTRICT_MARKER.len_utf8()
            && self.text.starts_with(NONSTRICT_MARKER)
    }
}

impl Display for Token {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use TokenKind::*;

        match self.kind {
            TokenKind::Keyword(keyword) => write!(fmt, "keyword `{}`", keyword),
            Label => write!(fmt, "label `{}`", self.text),
            Variable => write!(fmt, "variable `{}`", self.text),
            Constant => write!(fmt, "constant `{}`", self.text),
            Comment => write!(fmt, "comment `{}`", self.text),
            Bytes | Int => write!(fmt, "literal `{}`", self.text),
            Root => fmt.write_str("program root"),
            Open | Close | Opcode => write!(fmt, "`{}`", self.text),
        }
    }
}

/// Máquina de estados para análisis léxico.
///
/// Un lexer puede encontrarse en uno de diversos estados. La
/// salida del lexer, así como su siguiente estado, se define
/// a partir de tanto su estado actual como el siguiente carácter
/// encontrado en el flujo de entrada.
pub struct Lexer<S: Iterator> {
    source: Peekable<S>,
    state: State,
    start: Location,
    last: Location,
}

/// Posibles estados del lexer.
enum State {
    /// Estado que ocurre antes de encontrar el inicio de un token.
    Start,

    /// Estado terminal tras un error de E/S.
    Error,

    /// Estado de completitud; siempre emite el token incluido
    /// y pasa a [`State::Start`].
    Complete(TokenKind, String),

    /// Dentro de un comentario, hasta encontrar el delimitador de cierre.
    Comment(String),

    /// Dentro de una cadena de bytes, hasta encontrar el delimitador de cierre.
    Bytes(String),

    /// Literal entero.
    ///
    /// Este estado incluirá dígitos en el token mientras que
    /// el siguiente carácter sea un dígito.
    Integer(String),

    /// Término que será clasificado al terminar.
    Atom(String),
}

impl<S: InputStream> Lexer<S> {
    /// Crea un lexer en estado inicial a partir de un flujo.
    pub fn new(start: Location, source: S) -> Self {
        let last = start.clone();
        Lexer {
            source: source.peekable(),
            state: State::Start,
            start,
            last,
        }
    }

    /// Intenta construir un siguiente token.
    fn lex(&mut self) -> Result<Option<(TokenKind, String)>, CompileError> {
        use State::*;

        loop {
            // Se espera un siguiente carácter, fallando si hay error de E/S
            let next_char = match self.source.peek() {
                None => None,
                Some(Ok((c, location))) => {
                    // La posición de origen se mueve junto al flujo siempre
                    // que no se haya encontrado una frontera de token
                    if let Start = self.state {
                        self.start = location.clone();
                    }

                    Some(*c)
                }

                Some(Err(_)) => match self.source.next() {
                    Some(Err(error)) => return Err(error.into()),
                    _ => unreachable!(),
                },
            };

            // Switch table principal, determina cambios de estado
            // y de salida del lexer a partir de combinaciones del
            // estado actual y el siguiente carácter
            match (&mut self.state, next_char) {
                (Error, _) => return Ok(None),

                // Paréntesis y delimitadores
                (Start, None) => return Ok(None),
                (Start, Some('(')) => self.state = Complete(TokenKind::Open, "(".into()),
                (Start, Some(')')) => self.state = Complete(TokenKind::Close, ")".into()),
                (Start, Some(COMMENT)) => self.state = Comment(String::new()),
                (Start, Some(STRING)) => self.state = Bytes(STRING.to_string()),

                // Inicio de un literal o un átomo. No se consume el carácter,
                // ya que esta lógica ya está implementada en los respectivos
                // estados de acumulación
                (Start, Some(c)) if c.is_ascii_digit() => {
                    self.state = Integer(String::new());
                    continue;
                }

                (Start, Some(c)) if c.is_whitespace() => (),
                (Start, Some(_)) => {
                    self.state = Atom(String::new());
                    continue;
                }

                // Emisión retardada de tokens cualesquiera
                (Complete(kind, text), _) => return Ok(Some((*kind, mem::take(text)))),

                // Los comentarios se preservan sin sus delimitadores
                (Comment(text), Some(COMMENT)) => {
                    self.state = Complete(TokenKind::Comment, mem::take(text))
                }
                (Comment(text), Some(c)) => text.push(c),
                (Comment(text), None) => return Ok(Some((TokenKind::Comment, mem::take(text)))),

                // Las cadenas se preservan con sus delimitadores, incluso si
                // la entrada termina antes del cierre
                (Bytes(text), Some(STRING)) => {
                    text.push(STRING);
                    self.state = Complete(TokenKind::Bytes, mem::take(text));
                }
                (Bytes(text), Some(c)) => text.push(c),
                (Bytes(text), None) => {
                    text.push(STRING);
                    return Ok(Some((TokenKind::Bytes, mem::take(text))));
                }

                // Acumulación dígito por dígito de literales enteros
                (Integer(digits), Some(c)) if c.is_ascii_digit() => digits.push(c),
                (Integer(digits), _) => return Ok(Some((TokenKind::Int, mem::take(digits)))),

                // Extensión de términos
                (Atom(text), Some(c)) if is_atom_char(c) => text.push(c),
                (Atom(text), _) => {
                    let text = mem::take(text);
                    return Ok(Some((classify(&text), text)));
                }
            }

            // Si no hubo `continue` ni retorno, aquí se consume el carácter
            // que se observó con lookahead anteriormente
            if let Some(Ok((_, location))) = self.source.next() {
                self.last = location;
            }
        }
    }
}

impl<S: InputStream> Iterator for Lexer<S> {
    type Item = Compile<Located<Token>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.lex() {
            Ok(None) => None,
            Ok(Some((kind, text))) => {
                self.state = State::Start;

                let location = Location::span(self.start.clone(), &self.last);
                Some(Ok(Located::at(Token::new(kind, text), location)))
            }

            Err(error) => {
                self.state = State::Error;
                Some(Err(Located::at(error, self.last.clone())))
            }
        }
    }
}

/// Determina si un carácter puede pertenecer a un átomo.
fn is_atom_char(c: char) -> bool {
    !c.is_whitespace() && !matches!(c, '(' | ')' | COMMENT | STRING)
}

/// Clasifica un átomo completo, en orden de prioridad.
fn classify(text: &str) -> TokenKind {
    if text.ends_with(LABEL_SUFFIX) {
        TokenKind::Label
    } else if text.starts_with(VARIABLE_PREFIX) {
        TokenKind::Variable
    } else if text.starts_with(CONSTANT_PREFIX) {
        TokenKind::Constant
    } else if let Ok(keyword) = Keyword::from_str(text) {
        TokenKind::Keyword(keyword)
    } else {
        TokenKind::Opcode
    }
}
