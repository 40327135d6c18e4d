//! Representación de la salida.
//!
//! La salida del compilador es una secuencia plana de líneas de TEAL. No
//! hay más estructura que esta: las etiquetas se emiten simbólicamente y su
//! resolución a desplazamientos queda a cargo del ensamblador.

use std::{
    fmt::{self, Display},
    rc::Rc,
};

/// Una línea de salida.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// `#pragma version N`, siempre la primera línea.
    Pragma(u32),

    /// Una instrucción con sus argumentos inmediatos y un comentario opcional.
    Instruction {
        statement: String,
        comment: Option<Rc<str>>,
    },

    /// Destino de saltos, sin el `:` final.
    Label(Rc<str>),
}

impl Line {
    pub fn instruction<S: Into<String>>(statement: S) -> Self {
        Line::Instruction {
            statement: statement.into(),
            comment: None,
        }
    }
}

impl Display for Line {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Line::Pragma(version) => write!(fmt, "#pragma version {}", version),
            Line::Instruction {
                statement,
                comment: None,
            } => fmt.write_str(statement),

            Line::Instruction {
                statement,
                comment: Some(comment),
            } => write!(fmt, "{} // {}", statement, comment),

            Line::Label(label) => write!(fmt, "{}:", label),
        }
    }
}
