//! Decoded module description and the binary decoder producing it.

use crate::{
    opcode,
    reader::{BinaryReader, DecodeError, DecodeErrorKind},
    types::{
        ExportEntry,
        ExternalKind,
        FuncType,
        GlobalType,
        ImportDesc,
        ImportEntry,
        Limits,
        TableType,
    },
    Error,
};
use alloc::{boxed::Box, rc::Rc, string::String, vec::Vec};
use wasmlite_core::ValueType;

/// The magic bytes every module starts with: `\0asm`.
const WASM_MAGIC: [u8; 4] = [0x00, 0x61, 0x73, 0x6D];
/// The only supported binary format version.
const WASM_VERSION: u32 = 1;

/// Per-kind counts of the module's imports.
#[derive(Copy, Clone, Debug, Default)]
pub(crate) struct ImportCounts {
    pub funcs: u32,
    pub tables: u32,
    pub memories: u32,
    pub globals: u32,
}

/// A global declaration together with its raw initializer expression,
/// terminated by `end`.
#[derive(Clone, Debug)]
pub(crate) struct GlobalEntry {
    pub ty: GlobalType,
    pub init_expr: Box<[u8]>,
}

/// The code of one locally-defined function.
#[derive(Clone, Debug)]
pub(crate) struct FuncBody {
    /// Local declarations as `(count, type)` runs, excluding parameters.
    pub locals: Box<[(u32, ValueType)]>,
    /// The body bytes, inclusive of the terminating `end`.
    pub code: Rc<[u8]>,
}

/// How a data segment is applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DataMode {
    /// Copied into a memory at instantiation time.
    Active {
        /// The index of the target memory.
        mem_idx: u32,
    },
    /// Kept for later use; never applied by this engine.
    Passive,
}

/// A data segment.
#[derive(Clone, Debug)]
pub(crate) struct DataSegment {
    pub mode: DataMode,
    /// Raw offset expression, empty for passive segments.
    pub offset_expr: Box<[u8]>,
    pub init: Box<[u8]>,
}

/// An element segment. Parsed for structural completeness; tables are never
/// populated by this engine.
#[derive(Clone, Debug)]
pub(crate) struct ElementSegment {
    #[allow(dead_code)]
    pub table_idx: u32,
    #[allow(dead_code)]
    pub offset_expr: Box<[u8]>,
    #[allow(dead_code)]
    pub func_indices: Box<[u32]>,
}

/// A custom section: its name and raw payload.
#[derive(Clone, Debug)]
pub struct CustomSection {
    name: String,
    payload: Box<[u8]>,
}

impl CustomSection {
    /// Returns the name of this custom section.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the raw payload of this custom section.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

/// A deserialized module, ready for instantiation.
///
/// The decoder performs the structural checks execution relies on (magic
/// bytes, version, section framing, the `0x60` function-type marker, known
/// value types, body sizes) and deliberately defers everything else;
/// modules are assumed to be well formed enough to execute.
#[derive(Debug)]
pub struct Module {
    pub(crate) types: Vec<FuncType>,
    pub(crate) imports: Vec<ImportEntry>,
    pub(crate) import_counts: ImportCounts,
    /// Indices into `imports` of the function-kind entries, in order.
    pub(crate) func_imports: Vec<u32>,
    /// Type indices of the locally-defined functions.
    pub(crate) func_types: Vec<u32>,
    pub(crate) tables: Vec<TableType>,
    pub(crate) memories: Vec<Limits>,
    pub(crate) globals: Vec<GlobalEntry>,
    pub(crate) exports: Vec<ExportEntry>,
    pub(crate) start: Option<u32>,
    pub(crate) codes: Vec<FuncBody>,
    #[allow(dead_code)]
    pub(crate) elements: Vec<ElementSegment>,
    pub(crate) data: Vec<DataSegment>,
    pub(crate) customs: Vec<CustomSection>,
}

impl Module {
    /// Decodes a module from the given buffer.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the buffer is not a structurally sound wasm binary.
    ///
    /// # Examples
    ///
    /// ```rust
    /// // Minimal module: `\0asm` magic plus version 1.
    /// let module = wasmlite::Module::from_buffer(
    ///     &[0x00, 0x61, 0x73, 0x6D, 0x01, 0x00, 0x00, 0x00]
    /// ).expect("failed to load minimal module");
    /// assert!(module.types().is_empty());
    /// ```
    pub fn from_buffer<B: AsRef<[u8]>>(buffer: B) -> Result<Module, Error> {
        decode_module(buffer.as_ref()).map_err(Error::Decode)
    }

    /// Returns the function types declared by this module.
    pub fn types(&self) -> &[FuncType] {
        &self.types
    }

    /// Returns the imports declared by this module.
    pub fn imports(&self) -> &[ImportEntry] {
        &self.imports
    }

    /// Returns the exports declared by this module.
    pub fn exports(&self) -> &[ExportEntry] {
        &self.exports
    }

    /// Returns the index of the start function, if one is declared.
    pub fn start_func(&self) -> Option<u32> {
        self.start
    }

    /// Returns the custom sections of this module, in order of appearance.
    pub fn custom_sections(&self) -> &[CustomSection] {
        &self.customs
    }

    /// Returns the number of imported functions.
    pub fn import_func_count(&self) -> u32 {
        self.import_counts.funcs
    }

    /// Returns the type of the function with the given index, counting
    /// imported functions first.
    pub(crate) fn func_type(&self, func_idx: u32) -> Option<&FuncType> {
        let type_idx = if func_idx < self.import_counts.funcs {
            let import = &self.imports[self.func_imports[func_idx as usize] as usize];
            match import.desc {
                ImportDesc::Func(type_idx) => type_idx,
                _ => return None,
            }
        } else {
            *self
                .func_types
                .get((func_idx - self.import_counts.funcs) as usize)?
        };
        self.types.get(type_idx as usize)
    }

    /// Returns the body of the locally-defined function with the given
    /// function index.
    pub(crate) fn func_body(&self, func_idx: u32) -> Option<&FuncBody> {
        let code_idx = func_idx.checked_sub(self.import_counts.funcs)?;
        self.codes.get(code_idx as usize)
    }

    /// Returns the import entry backing the imported function with the
    /// given function index.
    pub(crate) fn func_import(&self, func_idx: u32) -> Option<&ImportEntry> {
        let import_idx = *self.func_imports.get(func_idx as usize)?;
        self.imports.get(import_idx as usize)
    }

    /// Returns the declared table with the given index, if any.
    pub(crate) fn table_by_index(&self, table_idx: u32) -> Option<&TableType> {
        self.tables.get(table_idx as usize)
    }
}

/// Section IDs of the binary format.
mod section {
    pub const CUSTOM: u8 = 0;
    pub const TYPE: u8 = 1;
    pub const IMPORT: u8 = 2;
    pub const FUNCTION: u8 = 3;
    pub const TABLE: u8 = 4;
    pub const MEMORY: u8 = 5;
    pub const GLOBAL: u8 = 6;
    pub const EXPORT: u8 = 7;
    pub const START: u8 = 8;
    pub const ELEMENT: u8 = 9;
    pub const CODE: u8 = 10;
    pub const DATA: u8 = 11;
    pub const DATA_COUNT: u8 = 12;
}

fn decode_module(bytes: &[u8]) -> Result<Module, DecodeError> {
    let mut r = BinaryReader::new(bytes);

    let magic = r
        .read_bytes(4)
        .map_err(|_| DecodeError::new(DecodeErrorKind::InvalidMagic, 0))?;
    if magic != WASM_MAGIC {
        return Err(DecodeError::new(DecodeErrorKind::InvalidMagic, 0));
    }
    let version = r
        .read_u32_le()
        .map_err(|_| DecodeError::new(DecodeErrorKind::InvalidVersion, 4))?;
    if version != WASM_VERSION {
        return Err(DecodeError::new(DecodeErrorKind::InvalidVersion, 4));
    }

    let mut module = Module {
        types: Vec::new(),
        imports: Vec::new(),
        import_counts: ImportCounts::default(),
        func_imports: Vec::new(),
        func_types: Vec::new(),
        tables: Vec::new(),
        memories: Vec::new(),
        globals: Vec::new(),
        exports: Vec::new(),
        start: None,
        codes: Vec::new(),
        elements: Vec::new(),
        data: Vec::new(),
        customs: Vec::new(),
    };

    while !r.is_at_end() {
        let section_id = r.read_u8()?;
        let section_size = r.read_var_u32()? as usize;
        let section_start = r.pos();
        let payload = r.read_bytes(section_size)?;
        let mut s = BinaryReader::at(payload, 0);

        match section_id {
            section::CUSTOM => {
                let name = s.read_name()?;
                let payload = payload[s.pos()..].into();
                module.customs.push(CustomSection { name, payload });
                // Custom payloads are opaque; nothing left to check.
                continue;
            }
            section::TYPE => decode_type_section(&mut s, &mut module)?,
            section::IMPORT => decode_import_section(&mut s, &mut module)?,
            section::FUNCTION => {
                let count = s.read_var_u32()?;
                for _ in 0..count {
                    module.func_types.push(s.read_var_u32()?);
                }
            }
            section::TABLE => {
                let count = s.read_var_u32()?;
                for _ in 0..count {
                    module.tables.push(read_table_type(&mut s)?);
                }
            }
            section::MEMORY => {
                let count = s.read_var_u32()?;
                for _ in 0..count {
                    module.memories.push(s.read_limits()?);
                }
            }
            section::GLOBAL => decode_global_section(&mut s, &mut module)?,
            section::EXPORT => decode_export_section(&mut s, &mut module)?,
            section::START => {
                module.start = Some(s.read_var_u32()?);
            }
            section::ELEMENT => decode_element_section(&mut s, &mut module)?,
            section::CODE => decode_code_section(&mut s, &mut module)?,
            section::DATA => decode_data_section(&mut s, &mut module)?,
            section::DATA_COUNT => {
                s.read_var_u32()?;
            }
            // Unknown section IDs are skipped.
            _ => continue,
        }

        if !s.is_at_end() {
            return Err(DecodeError::new(
                DecodeErrorKind::InvalidSection,
                section_start + s.pos(),
            ));
        }
    }

    if module.func_types.len() != module.codes.len() {
        return Err(DecodeError::new(DecodeErrorKind::InvalidCode, r.pos()));
    }

    Ok(module)
}

fn decode_type_section(s: &mut BinaryReader, module: &mut Module) -> Result<(), DecodeError> {
    let count = s.read_var_u32()?;
    for _ in 0..count {
        let marker = s.read_u8()?;
        if marker != 0x60 {
            return Err(s.error(DecodeErrorKind::InvalidFuncType));
        }
        let param_count = s.read_var_u32()?;
        let mut params = Vec::with_capacity(param_count as usize);
        for _ in 0..param_count {
            params.push(s.read_value_type()?);
        }
        let result_count = s.read_var_u32()?;
        let mut results = Vec::with_capacity(result_count as usize);
        for _ in 0..result_count {
            results.push(s.read_value_type()?);
        }
        module.types.push(FuncType::new(params, results));
    }
    Ok(())
}

fn decode_import_section(s: &mut BinaryReader, module: &mut Module) -> Result<(), DecodeError> {
    let count = s.read_var_u32()?;
    for _ in 0..count {
        let module_name = s.read_name()?;
        let field = s.read_name()?;
        let kind = s.read_u8()?;
        let desc = match kind {
            0x00 => {
                module.func_imports.push(module.imports.len() as u32);
                module.import_counts.funcs += 1;
                ImportDesc::Func(s.read_var_u32()?)
            }
            0x01 => {
                module.import_counts.tables += 1;
                ImportDesc::Table(read_table_type(s)?)
            }
            0x02 => {
                module.import_counts.memories += 1;
                ImportDesc::Memory(s.read_limits()?)
            }
            0x03 => {
                module.import_counts.globals += 1;
                ImportDesc::Global(read_global_type(s)?)
            }
            _ => return Err(s.error(DecodeErrorKind::InvalidImport)),
        };
        module.imports.push(ImportEntry {
            module: module_name,
            field,
            desc,
        });
    }
    Ok(())
}

fn decode_global_section(s: &mut BinaryReader, module: &mut Module) -> Result<(), DecodeError> {
    let count = s.read_var_u32()?;
    for _ in 0..count {
        let ty = read_global_type(s)?;
        let init_expr = read_init_expr(s)?;
        module.globals.push(GlobalEntry { ty, init_expr });
    }
    Ok(())
}

fn decode_export_section(s: &mut BinaryReader, module: &mut Module) -> Result<(), DecodeError> {
    let count = s.read_var_u32()?;
    for _ in 0..count {
        let field = s.read_name()?;
        let kind_byte = s.read_u8()?;
        let kind = ExternalKind::from_byte(kind_byte)
            .ok_or_else(|| s.error(DecodeErrorKind::InvalidExport))?;
        let index = s.read_var_u32()?;
        module.exports.push(ExportEntry { field, kind, index });
    }
    Ok(())
}

fn decode_element_section(s: &mut BinaryReader, module: &mut Module) -> Result<(), DecodeError> {
    let count = s.read_var_u32()?;
    for _ in 0..count {
        let flags = s.read_var_u32()?;
        if flags != 0 {
            // Only the MVP active-by-offset form is understood.
            return Err(s.error(DecodeErrorKind::InvalidSection));
        }
        let offset_expr = read_init_expr(s)?;
        let func_count = s.read_var_u32()?;
        let mut func_indices = Vec::with_capacity(func_count as usize);
        for _ in 0..func_count {
            func_indices.push(s.read_var_u32()?);
        }
        module.elements.push(ElementSegment {
            table_idx: 0,
            offset_expr,
            func_indices: func_indices.into(),
        });
    }
    Ok(())
}

fn decode_code_section(s: &mut BinaryReader, module: &mut Module) -> Result<(), DecodeError> {
    let count = s.read_var_u32()?;
    for _ in 0..count {
        let body_size = s.read_var_u32()? as usize;
        let body_start = s.pos();
        let body_end = body_start
            .checked_add(body_size)
            .ok_or_else(|| s.error(DecodeErrorKind::InvalidCode))?;

        let decl_count = s.read_var_u32()?;
        let mut locals = Vec::with_capacity(decl_count as usize);
        let mut total: u32 = 0;
        for _ in 0..decl_count {
            let count = s.read_var_u32()?;
            let ty = s.read_value_type()?;
            total = total
                .checked_add(count)
                .ok_or_else(|| s.error(DecodeErrorKind::InvalidCode))?;
            locals.push((count, ty));
        }

        // Scan the expression to the matching `end`, verifying every opcode
        // and its immediates along the way. The scan is what establishes
        // where the body really stops.
        let code_start = s.pos();
        opcode::skip_to_block_end(s, 1)?;
        if s.pos() != body_end {
            return Err(DecodeError::new(DecodeErrorKind::InvalidCode, s.pos()));
        }
        let code = s.slice(code_start, body_end);
        module.codes.push(FuncBody {
            locals: locals.into(),
            code: code.into(),
        });
    }
    Ok(())
}

fn decode_data_section(s: &mut BinaryReader, module: &mut Module) -> Result<(), DecodeError> {
    let count = s.read_var_u32()?;
    for _ in 0..count {
        let flags = s.read_var_u32()?;
        let (mode, offset_expr) = match flags {
            // Active segment against the default memory.
            0 => (DataMode::Active { mem_idx: 0 }, read_init_expr(s)?),
            1 => (DataMode::Passive, Box::default()),
            2 => {
                let mem_idx = s.read_var_u32()?;
                (DataMode::Active { mem_idx }, read_init_expr(s)?)
            }
            _ => return Err(s.error(DecodeErrorKind::InvalidSection)),
        };
        let len = s.read_var_u32()? as usize;
        let init = s.read_bytes(len)?.into();
        module.data.push(DataSegment {
            mode,
            offset_expr,
            init,
        });
    }
    Ok(())
}

fn read_table_type(s: &mut BinaryReader) -> Result<TableType, DecodeError> {
    let elem = s.read_value_type()?;
    let limits = s.read_limits()?;
    Ok(TableType::new(elem, limits))
}

fn read_global_type(s: &mut BinaryReader) -> Result<GlobalType, DecodeError> {
    let content = s.read_value_type()?;
    let mutable = match s.read_u8()? {
        0x00 => false,
        0x01 => true,
        _ => return Err(s.error(DecodeErrorKind::InvalidGlobal)),
    };
    Ok(GlobalType::new(content, mutable))
}

/// Captures a constant expression as its raw bytes, inclusive of the
/// terminating `end`, by scanning opcodes with immediate skipping.
fn read_init_expr(s: &mut BinaryReader) -> Result<Box<[u8]>, DecodeError> {
    let start = s.pos();
    opcode::skip_to_block_end(s, 1)?;
    Ok(s.slice(start, s.pos()).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::DecodeErrorKind;

    #[test]
    fn empty_module_decodes() {
        let module =
            Module::from_buffer([0x00, 0x61, 0x73, 0x6D, 0x01, 0x00, 0x00, 0x00]).unwrap();
        assert!(module.types().is_empty());
        assert!(module.imports().is_empty());
        assert!(module.exports().is_empty());
    }

    fn decode_err(bytes: &[u8]) -> DecodeError {
        match Module::from_buffer(bytes) {
            Err(Error::Decode(e)) => e,
            other => panic!("expected a decode error, got {:?}", other),
        }
    }

    #[test]
    fn bad_magic_is_rejected() {
        let err = decode_err(&[0x00, 0x61, 0x73, 0x6E, 0x01, 0x00, 0x00, 0x00]);
        assert_eq!(err.kind(), DecodeErrorKind::InvalidMagic);
        let err = decode_err(&[0x00, 0x61]);
        assert_eq!(err.kind(), DecodeErrorKind::InvalidMagic);
    }

    #[test]
    fn bad_version_is_rejected() {
        let err = decode_err(&[0x00, 0x61, 0x73, 0x6D, 0x02, 0x00, 0x00, 0x00]);
        assert_eq!(err.kind(), DecodeErrorKind::InvalidVersion);
    }

    #[test]
    fn type_section_requires_func_marker() {
        // type section with one entry not starting with 0x60
        let bytes = [
            0x00, 0x61, 0x73, 0x6D, 0x01, 0x00, 0x00, 0x00, // header
            0x01, 0x04, 0x01, 0x5F, 0x00, 0x00, // type section
        ];
        assert_eq!(decode_err(&bytes).kind(), DecodeErrorKind::InvalidFuncType);
    }

    #[test]
    fn unknown_sections_are_skipped() {
        let bytes = [
            0x00, 0x61, 0x73, 0x6D, 0x01, 0x00, 0x00, 0x00, // header
            0x3F, 0x02, 0xDE, 0xAD, // unknown section id 63
        ];
        assert!(Module::from_buffer(bytes).is_ok());
    }

    #[test]
    fn custom_sections_are_retained() {
        let bytes = [
            0x00, 0x61, 0x73, 0x6D, 0x01, 0x00, 0x00, 0x00, // header
            0x00, 0x06, 0x04, b'n', b'a', b'm', b'e', 0x2A, // custom "name", payload [42]
        ];
        let module = Module::from_buffer(bytes).unwrap();
        assert_eq!(module.custom_sections().len(), 1);
        assert_eq!(module.custom_sections()[0].name(), "name");
        assert_eq!(module.custom_sections()[0].payload(), &[0x2A]);
    }

    #[test]
    fn code_body_must_fill_its_declared_size() {
        // One type () -> (), one function, code body declares 4 bytes but
        // the expression ends after 2.
        let bytes = [
            0x00, 0x61, 0x73, 0x6D, 0x01, 0x00, 0x00, 0x00, // header
            0x01, 0x04, 0x01, 0x60, 0x00, 0x00, // type section
            0x03, 0x02, 0x01, 0x00, // function section
            0x0A, 0x06, 0x01, 0x04, 0x00, 0x01, 0x0B, 0x0B, // code section
        ];
        assert_eq!(decode_err(&bytes).kind(), DecodeErrorKind::InvalidCode);
    }

    #[test]
    fn truncated_body_is_eof() {
        let bytes = [
            0x00, 0x61, 0x73, 0x6D, 0x01, 0x00, 0x00, 0x00, // header
            0x01, 0x04, 0x01, 0x60, 0x00, 0x00, // type section
            0x03, 0x02, 0x01, 0x00, // function section
            0x0A, 0x04, 0x01, 0x02, 0x00, 0x01, // code: body never ends
        ];
        let err = decode_err(&bytes);
        assert_eq!(err.kind(), DecodeErrorKind::UnexpectedEof);
    }
}
