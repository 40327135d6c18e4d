//! Compilador de expresiones S a ensamblador TEAL.
//!
//! # Front end
//! Cada programa deriva de un único flujo de código fuente. Este flujo se
//! somete primero a análisis léxico en [`lex`], de lo cual se obtiene un
//! flujo de tokens. Los tokens se disponen en un árbol sintáctico por
//! medio de análisis sintáctico en [`parse`]. Cada nodo se valida en
//! [`semantic`] en el momento en que se construye, consultando la tabla de
//! instrucciones de [`langspec`] y reservando slots de scratch space,
//! etiquetas y constantes.
//!
//! # Back end
//! El árbol validado se recorre en [`codegen`], donde las macros de control
//! de flujo se expanden en saltos y etiquetas, produciendo la secuencia de
//! líneas descrita en [`ir`]. La resolución de etiquetas a desplazamientos
//! y el ensamblado final quedan fuera de este crate.

use std::io::BufRead;

#[macro_use]
mod macros;

pub mod codegen;
pub mod config;
pub mod error;
pub mod ir;
pub mod langspec;
pub mod lex;
pub mod parse;
pub mod semantic;
pub mod source;

use crate::{
    config::Config, error::Compile, langspec::LangSpec, lex::Lexer, parse::Node,
    semantic::Context,
};

/// Compila un flujo de código fuente hasta obtener el árbol validado.
///
/// `name` identifica al origen en los mensajes de error. Cada invocación
/// trabaja sobre sus propias tablas de asignación.
pub fn compile<R: BufRead>(
    reader: R,
    name: &str,
    config: &Config,
    spec: &LangSpec,
) -> Compile<Node> {
    let (start, stream) = source::consume(reader, name);
    let mut context = Context::new(spec, config.clone());

    parse::parse(Lexer::new(start.clone(), stream), start, &mut context)
}

/// Compila una cadena con la tabla de instrucciones incluida en el crate.
pub fn compile_str(source: &str, config: &Config) -> Compile<Node> {
    compile(source.as_bytes(), "<input>", config, LangSpec::bundled())
}
