//! Configuración de compilación.

use bitflags::bitflags;

/// Versión de TEAL que se estampa en la directiva `#pragma version`
/// cuando no se indica otra.
pub const DEFAULT_PRAGMA_VERSION: u32 = 8;

bitflags! {
    /// Opciones a aplicar durante la compilación.
    pub struct CompileOptions: u32 {
        /// Verificar aridades de pila y de argumentos inmediatos.
        const STRICT = 0x01;

        /// Respetar la marca `?` que desactiva las verificaciones para
        /// un solo nodo. Sin esta opción, la marca forma parte del nombre.
        const NONSTRICT_MARKER = 0x02;

        /// Reutilizar el slot de scratch space en definiciones repetidas
        /// de una misma variable, en vez de asignar uno nuevo.
        const REUSE_SCRATCH = 0x04;
    }
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions::all()
    }
}

/// Registro de configuración, compartido por todo el árbol sintáctico.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub pragma_version: u32,
    pub options: CompileOptions,
}

impl Config {
    pub fn with_pragma_version(self, pragma_version: u32) -> Self {
        Config {
            pragma_version,
            ..self
        }
    }

    pub fn with_options(self, options: CompileOptions) -> Self {
        Config { options, ..self }
    }

    pub fn is_strict(&self) -> bool {
        self.options.contains(CompileOptions::STRICT)
    }

    pub fn honors_nonstrict_marker(&self) -> bool {
        self.options.contains(CompileOptions::NONSTRICT_MARKER)
    }

    pub fn reuses_scratch(&self) -> bool {
        self.options.contains(CompileOptions::REUSE_SCRATCH)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            pragma_version: DEFAULT_PRAGMA_VERSION,
            options: Default::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::check;

    #[test]
    fn defaults_enable_everything() {
        let config = Config::default();
        check!(config.pragma_version == 8);
        check!(config.is_strict());
        check!(config.honors_nonstrict_marker());
        check!(config.reuses_scratch());
    }

    #[test]
    fn options_can_be_removed() {
        let config = Config::default()
            .with_pragma_version(6)
            .with_options(CompileOptions::all() - CompileOptions::STRICT);

        check!(config.pragma_version == 6);
        check!(!config.is_strict());
        check!(config.reuses_scratch());
    }
}
