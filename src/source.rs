//! Rastreo de ubicaciones originales en código fuente.
//!
//! Cada token, cada nodo y cada error que el compilador construye
//! lleva cuenta de la posición del código fuente de donde proviene,
//! lo cual permite señalar con exactitud el punto donde falla una
//! compilación.

use std::{
    cell::RefCell,
    fmt::{self, Debug, Display, Formatter},
    io::{self, BufRead},
    iter,
    ops::Range,
    rc::Rc,
};

/// Un flujo de entrada, carácter por carácter.
pub trait InputStream: Iterator<Item = Result<(char, Location), io::Error>> {}

impl<I> InputStream for I where I: Iterator<Item = Result<(char, Location), io::Error>> {}

/// Un objeto cualquiera con una posición original asociada.
#[derive(Debug, Clone)]
pub struct Located<T> {
    location: Location,
    value: T,
}

impl<T> Located<T> {
    /// Obtiene el valor.
    pub fn val(&self) -> &T {
        &self.value
    }

    /// Obtiene la ubicación.
    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Construye a partir de un valor y una ubicación.
    pub fn at(value: T, location: Location) -> Self {
        Located { value, location }
    }

    /// Transforma el valor con la misma ubicación.
    pub fn map<U, F>(self, map: F) -> Located<U>
    where
        F: FnOnce(T) -> U,
    {
        Located {
            value: map(self.value),
            location: self.location,
        }
    }
}

impl<T> AsRef<T> for Located<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}

/// Una ubicación está conformada por un origen y un rango de posiciones.
///
/// El final del rango es exclusivo: apunta a la posición inmediatamente
/// posterior al último carácter cubierto.
#[derive(Clone)]
pub struct Location {
    from: Rc<Source>,
    position: Range<Position>,
}

impl Location {
    /// Unifica un rango de ubicaciones. Se asume el mismo origen.
    pub fn span(from: Location, to: &Location) -> Self {
        Location {
            from: from.from,
            position: from.position.start..to.position.end,
        }
    }

    /// Obtiene la posición de inicio.
    pub fn start(&self) -> Position {
        self.position.start
    }

    /// Obtiene la posición de fin.
    pub fn end(&self) -> Position {
        self.position.end
    }

    /// Origen de esta ubicación.
    pub(crate) fn source(&self) -> &Source {
        &self.from
    }
}

impl Display for Location {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:", self.from.name)?;

        let Range { start, end } = self.position;
        if end.line == start.line && end.column <= start.column + 1 {
            // Solo se señala una columna en específico
            write!(formatter, "{}", start)
        } else {
            write!(formatter, "[{}-{}]", start, end.back())
        }
    }
}

impl Debug for Location {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        <Self as Display>::fmt(self, formatter)
    }
}

/// Una posición línea-columna en un archivo, junto a su desplazamiento
/// absoluto en caracteres desde el inicio de la entrada.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Position {
    line: u32,
    column: u32,
    offset: usize,
}

impl Position {
    /// Obtiene el número de línea.
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Obtiene el número de columna.
    pub fn column(&self) -> u32 {
        self.column
    }

    /// Obtiene el desplazamiento absoluto.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Incrementa el número de columna.
    pub fn advance(self) -> Position {
        Position {
            column: self.column + 1,
            offset: self.offset + 1,
            ..self
        }
    }

    /// Decrementa el número de columna.
    pub fn back(self) -> Position {
        Position {
            column: self.column.saturating_sub(1).max(1),
            offset: self.offset.saturating_sub(1),
            ..self
        }
    }

    /// Incrementa el número de línea y retorna a la columna 1.
    pub fn newline(self) -> Position {
        Position {
            line: self.line + 1,
            column: 1,
            offset: self.offset + 1,
        }
    }
}

impl Default for Position {
    fn default() -> Self {
        Position {
            line: 1,
            column: 1,
            offset: 0,
        }
    }
}

impl Display for Position {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:{}", self.line, self.column)
    }
}

/// Transforma un flujo de entrada estándar en uno que itera por carácter.
///
/// La ubicación que se retorna junto al flujo corresponde al inicio de
/// la entrada. Cada carácter emitido lleva consigo su propia ubicación.
/// Los finales de línea se normalizan a `'\n'`.
pub fn consume<R, S>(reader: R, name: S) -> (Location, impl InputStream)
where
    R: BufRead,
    S: Into<String>,
{
    let source = Rc::new(Source {
        name: name.into(),
        lines: Default::default(),
    });

    let start = Location {
        from: Rc::clone(&source),
        position: Position::default()..Position::default().advance(),
    };

    // `read_line` conserva el terminador, de modo que una última línea sin
    // salto de línea no recibe uno sintético
    let mut reader = reader;
    let lines = iter::from_fn(move || {
        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => Some(Ok(line)),
            Err(error) => Some(Err(error)),
        }
    });

    let mut here = Position::default();
    let chars = lines
        .map(move |line| {
            let located = line.map(|mut line| {
                let terminated = line.ends_with('\n');
                if terminated {
                    line.pop();
                    if line.ends_with('\r') {
                        line.pop();
                    }
                }

                let newline = terminated.then_some('\n');

                let mut chars = Vec::with_capacity(line.len() + 1);
                for c in line.chars().chain(newline) {
                    let at = here;
                    here = match c {
                        '\n' => at.newline(),
                        _ => at.advance(),
                    };

                    let location = Location {
                        from: Rc::clone(&source),
                        position: at..at.advance(),
                    };

                    chars.push((c, location));
                }

                source.lines.borrow_mut().push(line);
                chars.into_iter()
            });

            Fallible::new(located)
        })
        .flatten()
        .fuse();

    (start, chars)
}

/// Nombre de origen e histórico interior de líneas.
pub(crate) struct Source {
    name: String,
    lines: RefCell<Vec<String>>,
}

impl Source {
    /// Invoca a `callback` con el contenido de una línea (base 1), si ya
    /// fue leída.
    pub(crate) fn with_line<F, R>(&self, line: u32, callback: F) -> Option<R>
    where
        F: FnOnce(&str) -> R,
    {
        let index = (line as usize).checked_sub(1)?;
        self.lines.borrow().get(index).map(|line| callback(line))
    }
}

/// Un iterador que emite un solo error o encapsula las salidas de
/// otro iterador en `Ok`, pero nunca ambas.
struct Fallible<I, E>(Result<I, iter::Once<E>>);

impl<I, E> Fallible<I, E> {
    /// Crea un iterador a partir de un `Result`.
    pub fn new(result: Result<I, E>) -> Self {
        Fallible(result.map_err(iter::once))
    }
}

impl<I: Iterator, E> Iterator for Fallible<I, E> {
    type Item = Result<I::Item, E>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.0 {
            Ok(ok) => ok.next().map(Ok),
            Err(error) => error.next().map(Err),
        }
    }
}
