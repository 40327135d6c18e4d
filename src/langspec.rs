//! Tabla de especificación de instrucciones.
//!
//! Describe cada instrucción de la máquina virtual objetivo: tipos de
//! argumentos y retornos en pila, descriptores de argumentos inmediatos y
//! los conjuntos enumerados de campos válidos para argumentos de
//! referencia. La tabla se carga una sola vez y es inmutable a partir de
//! entonces. El crate incluye una copia en [`LangSpec::bundled()`].

use std::{
    collections::HashMap,
    fs::File,
    io::{self, BufReader, Read},
    path::Path,
    sync::{Arc, LazyLock},
};

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error al cargar una tabla de instrucciones.
#[derive(Error, Debug)]
pub enum LangSpecError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Malformed instruction table: {0}")]
    Json(#[from] serde_json::Error),
}

/// Tipo de un valor en pila.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StackType {
    #[serde(rename = "uint64")]
    Uint64,
    #[serde(rename = "[]byte")]
    Bytes,
    #[serde(rename = "any")]
    Any,
    #[serde(rename = "bool")]
    Bool,
    #[serde(rename = "addr")]
    Address,
    #[serde(rename = "bigint")]
    BigInt,
    #[serde(rename = "hash")]
    Hash,
    #[serde(rename = "key")]
    Key,
    #[serde(rename = "method")]
    Method,
    #[serde(rename = "none")]
    None,
    #[serde(other)]
    Other,
}

/// Codificación binaria de un argumento inmediato.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Encoding {
    #[serde(rename = "uint8")]
    Byte,
    #[serde(rename = "int8")]
    Int8,
    #[serde(rename = "int16 (big-endian)")]
    Label,
    #[serde(rename = "varuint")]
    Int,
    #[serde(rename = "varuint length, bytes")]
    Bytes,
    #[serde(rename = "varuint count, [varuint ...]")]
    Ints,
    #[serde(rename = "varuint count, [varuint length, bytes ...]")]
    Bytess,
    #[serde(rename = "varuint count, [int16 (big-endian) ...]")]
    Labels,
    #[serde(other)]
    Other,
}

impl Encoding {
    /// Determina si la codificación es una lista de longitud variable.
    pub fn is_list(self) -> bool {
        matches!(self, Encoding::Ints | Encoding::Bytess | Encoding::Labels)
    }
}

/// Descriptor de un argumento inmediato.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImmediateArg {
    pub name: String,
    #[serde(default)]
    pub comment: String,
    pub encoding: Encoding,

    /// Grupo de campos enumerados al que debe pertenecer el argumento.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

/// Un valor enumerado de campo.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Field {
    pub name: String,
    #[serde(rename = "Type")]
    pub stack_type: StackType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub value: u32,
}

/// Especificación de una instrucción.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OpcodeSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opcode: Option<u8>,
    pub name: String,
    #[serde(default)]
    pub size: u32,
    #[serde(default)]
    pub cost: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_extra: Option<String>,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<StackType>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub returns: Vec<StackType>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub immediate_details: Vec<ImmediateArg>,
}

impl OpcodeSpec {
    /// Cantidad de valores que la instrucción consume de la pila.
    pub fn arg_count(&self) -> usize {
        self.args.len()
    }

    /// Cantidad de valores que la instrucción deja en la pila.
    pub fn return_count(&self) -> usize {
        self.returns.len()
    }

    /// Si el último argumento inmediato es una lista, la instrucción
    /// acepta una cantidad variable de inmediatos.
    pub fn is_variadic(&self) -> bool {
        self.immediate_details
            .last()
            .map_or(false, |arg| arg.encoding.is_list())
    }
}

/// Forma serializada de la tabla.
#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawLangSpec {
    version: u32,
    ops: Vec<OpcodeSpec>,
    #[serde(default)]
    pseudo_ops: Vec<OpcodeSpec>,
    #[serde(default)]
    fields: HashMap<String, Vec<Field>>,
}

/// Tabla de instrucciones lista para consulta.
#[derive(Debug)]
pub struct LangSpec {
    version: u32,
    opcodes: HashMap<String, Arc<OpcodeSpec>>,
    fields: HashMap<String, Vec<Field>>,
}

static BUNDLED: LazyLock<LangSpec> = LazyLock::new(|| {
    LangSpec::from_reader(include_str!("langspec.json").as_bytes())
        .expect("bundled instruction table must be well-formed")
});

impl LangSpec {
    /// Tabla incluida en el crate, cargada la primera vez que se solicita.
    pub fn bundled() -> &'static LangSpec {
        &BUNDLED
    }

    /// Carga una tabla desde JSON.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, LangSpecError> {
        let RawLangSpec {
            version,
            ops,
            pseudo_ops,
            fields,
        } = serde_json::from_reader(reader)?;

        // Las pseudoinstrucciones reemplazan instrucciones homónimas
        let opcodes: HashMap<_, _> = ops
            .into_iter()
            .chain(pseudo_ops)
            .map(|spec| (spec.name.clone(), Arc::new(spec)))
            .collect();

        debug!(
            "Loaded instruction table v{} with {} opcodes and {} field groups",
            version,
            opcodes.len(),
            fields.len()
        );

        Ok(LangSpec {
            version,
            opcodes,
            fields,
        })
    }

    /// Carga una tabla desde un archivo JSON.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, LangSpecError> {
        let file = File::open(path)?;
        LangSpec::from_reader(BufReader::new(file))
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Busca una instrucción por nombre.
    pub fn opcode(&self, name: &str) -> Option<&Arc<OpcodeSpec>> {
        self.opcodes.get(name)
    }

    /// Conjunto enumerado de campos válidos para un argumento de
    /// referencia. Se busca primero por nombre de instrucción y luego
    /// por el grupo de referencia del descriptor.
    pub fn fields(&self, opcode: &str, reference: &str) -> &[Field] {
        [opcode, reference]
            .iter()
            .filter_map(|key| self.fields.get(*key))
            .find(|fields| !fields.is_empty())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Nombres de los campos retornados por [`LangSpec::fields()`].
    pub fn field_names(&self, opcode: &str, reference: &str) -> Vec<&str> {
        self.fields(opcode, reference)
            .iter()
            .map(|field| field.name.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::{check, let_assert};

    #[test]
    fn bundled_table_loads() {
        let spec = LangSpec::bundled();
        check!(spec.version() == 8);

        let_assert!(Some(add) = spec.opcode("+"));
        check!(add.arg_count() == 2);
        check!(add.return_count() == 1);
        check!(add.immediate_details.is_empty());

        let_assert!(Some(store) = spec.opcode("store"));
        check!(store.args == [StackType::Any]);
        check!(store.immediate_details.len() == 1);

        check!(spec.opcode("frobnicate").is_none());
    }

    #[test]
    fn pseudo_ops_are_available() {
        let spec = LangSpec::bundled();

        let_assert!(Some(int) = spec.opcode("int"));
        check!(int.opcode.is_none());
        check!(int.returns == [StackType::Uint64]);

        let_assert!(Some(byte) = spec.opcode("byte"));
        check!(byte.returns == [StackType::Bytes]);
    }

    #[test]
    fn reference_fields_fall_back_to_group() {
        let spec = LangSpec::bundled();

        let names = spec.field_names("itxn_field", "txn");
        check!(names.contains(&"Receiver"));
        check!(names.contains(&"Amount"));

        check!(spec.field_names("global", "global").contains(&"MinTxnFee"));
        check!(spec.fields("nope", "nope").is_empty());
    }

    #[test]
    fn list_encodings_are_variadic() {
        let spec = LangSpec::bundled();

        let_assert!(Some(switch) = spec.opcode("switch"));
        check!(switch.is_variadic());

        let_assert!(Some(gtxn) = spec.opcode("gtxn"));
        check!(!gtxn.is_variadic());
    }

    #[test]
    fn pseudo_op_overrides_op() {
        let table = r#"{
            "Version": 1,
            "Ops": [{"Name": "x", "Size": 1, "Args": ["uint64"]}],
            "PseudoOps": [{"Name": "x", "Size": 0, "Returns": ["strange"]}]
        }"#;

        let_assert!(Ok(spec) = LangSpec::from_reader(table.as_bytes()));
        let_assert!(Some(x) = spec.opcode("x"));
        check!(x.args.is_empty());
        check!(x.returns == [StackType::Other]);
    }

    #[test]
    fn malformed_table() {
        let_assert!(Err(LangSpecError::Json(_)) = LangSpec::from_reader("{".as_bytes()));
    }
}
