//! Errores de compilación y su presentación.
//!
//! Toda falla de compilación es un [`CompileError`] acompañado de la
//! ubicación del token que la provocó. No existe recuperación: el primer
//! error aborta la compilación completa y no se produce salida alguna.

use crate::source::{Located, Location};
use std::{
    error::Error,
    fmt::{self, Display},
    io,
    rc::Rc,
};

use thiserror::Error;

/// Resultado de cualquier fase del compilador.
pub type Compile<T> = Result<T, Located<CompileError>>;

/// Error de compilación.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum CompileError {
    /// Error de E/S originado por el flujo de entrada.
    #[error("I/O error: {0}")]
    Input(#[from] io::Error),

    /// Se alcanzó el final de la entrada dentro de un paréntesis abierto.
    #[error("Unclosed expression")]
    UnclosedExpression,

    /// Un token que no puede iniciar ni encabezar una expresión.
    #[error("Invalid token `{0}`")]
    InvalidToken(Rc<str>),

    /// El nombre no existe en la especificación de instrucciones.
    #[error("Invalid opcode `{0}`")]
    InvalidOpcode(Rc<str>),

    #[error("Invalid number of stack args: expected {expected}, found {found}")]
    StackArgs { expected: usize, found: usize },

    #[error("Invalid number of immediate args: expected {expected}, found {found}")]
    ImmediateArgs { expected: usize, found: usize },

    /// Un argumento inmediato fuera del conjunto enumerado de valores.
    #[error("Invalid arg `{arg}`, need one of the following: {valid}")]
    InvalidArg { arg: Rc<str>, valid: String },

    #[error("Scratch space overflow while allocating `{0}`")]
    ScratchOverflow(Rc<str>),

    #[error("Scratch space not found for `{0}`")]
    ScratchNotFound(Rc<str>),

    #[error("Constant not defined yet: `{0}`")]
    ConstantNotDefined(Rc<str>),

    #[error("Constant already defined: `{0}`")]
    ConstantRedefined(Rc<str>),

    #[error("Constants require exactly one child")]
    ConstantArity,

    #[error("Constants accept only byte or int literals")]
    ConstantLiteral,

    /// Toda etiqueta, declarada o generada, es única en una compilación.
    #[error("Label already defined: `{0}`")]
    LabelRedefined(Rc<str>),

    #[error("#case requires at least two children")]
    CaseArity,

    #[error("#in requires at least two children")]
    InArity,

    #[error("#in requires all children to be a #case")]
    InNotCase,

    #[error("#while requires at least two children")]
    WhileArity,

    #[error("#itxn requires at least one child")]
    ItxnArity,

    #[error("#itxn requires all children to be itxn_field")]
    ItxnField,
}

mod sealed {
    pub trait Sealed {}
}

pub trait LocatedError: sealed::Sealed {
    fn source(&self) -> &dyn Error;
    fn location(&self) -> &Location;
}

/// Reporte de un error listo para mostrarse al usuario.
pub struct Diagnostics {
    kind: &'static str,
    error: Box<dyn 'static + LocatedError>,
}

impl Diagnostics {
    pub fn kind(self, kind: &'static str) -> Self {
        Diagnostics { kind, ..self }
    }
}

impl<E: 'static + LocatedError> From<E> for Diagnostics {
    fn from(error: E) -> Self {
        Diagnostics {
            kind: "error",
            error: Box::new(error),
        }
    }
}

impl Display for Diagnostics {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Diagnostics { kind, error } = self;
        writeln!(fmt, "{}: {}", kind, error.source())?;

        let location = error.location();
        writeln!(fmt, " --> {}", location)?;

        let (start, end) = (location.start(), location.end());
        let digits = start.line().to_string().chars().count();

        let shown = location.source().with_line(start.line(), |line| {
            // Solo se subraya la primera línea de tokens multilínea
            let length = line.chars().count() as u32 + 1;
            let last = if end.line() == start.line() {
                end.column().saturating_sub(1).max(start.column())
            } else {
                length
            };

            let skip = (start.column() - 1) as usize;
            let highlight = (last - start.column() + 1) as usize;

            writeln!(fmt, "{:digits$} |", "", digits = digits)?;
            writeln!(fmt, "{:>digits$} | {}", start.line(), line, digits = digits)?;
            writeln!(
                fmt,
                "{:digits$} | {:skip$}{:^<highlight$}",
                "",
                "",
                "",
                digits = digits,
                skip = skip,
                highlight = highlight
            )
        });

        if let Some(result) = shown {
            result?;
        }

        Ok(())
    }
}

impl<E: Error> sealed::Sealed for Located<E> {}

impl<E: Error> LocatedError for Located<E> {
    fn source(&self) -> &dyn Error {
        self.as_ref()
    }

    fn location(&self) -> &Location {
        Located::location(self)
    }
}
