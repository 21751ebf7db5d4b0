use alloc::{boxed::Box, string::String};
use wasmlite_core::ValueType;

/// Signature of a function: zero or more parameter types and a list of
/// result types.
///
/// Two function types are equal if their parameter and result lists are
/// equal. A function with more than one result can be decoded but not
/// invoked by this engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncType {
    params: Box<[ValueType]>,
    results: Box<[ValueType]>,
}

impl FuncType {
    /// Creates a new function type with the given parameters and results.
    pub fn new<P, R>(params: P, results: R) -> Self
    where
        P: Into<Box<[ValueType]>>,
        R: Into<Box<[ValueType]>>,
    {
        FuncType {
            params: params.into(),
            results: results.into(),
        }
    }

    /// Returns the parameter types of this function type.
    pub fn params(&self) -> &[ValueType] {
        &self.params
    }

    /// Returns the result types of this function type.
    pub fn results(&self) -> &[ValueType] {
        &self.results
    }

    /// Returns the single result type, if there is exactly one.
    pub fn return_type(&self) -> Option<ValueType> {
        self.results.first().copied()
    }
}

/// Resizable limits of a linear memory or table.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Limits {
    min: u32,
    max: Option<u32>,
}

impl Limits {
    /// Creates new limits.
    pub fn new(min: u32, max: Option<u32>) -> Self {
        Limits { min, max }
    }

    /// Returns the minimum size.
    pub fn min(&self) -> u32 {
        self.min
    }

    /// Returns the maximum size, if one was declared.
    pub fn max(&self) -> Option<u32> {
        self.max
    }
}

/// Description of a global variable: its value type and mutability.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GlobalType {
    content: ValueType,
    mutable: bool,
}

impl GlobalType {
    pub(crate) fn new(content: ValueType, mutable: bool) -> Self {
        GlobalType { content, mutable }
    }

    /// Returns the type of the global's value.
    pub fn content_type(&self) -> ValueType {
        self.content
    }

    /// Returns whether the global may be mutated.
    pub fn is_mutable(&self) -> bool {
        self.mutable
    }
}

/// Description of a table: its element type and limits.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TableType {
    elem: ValueType,
    limits: Limits,
}

impl TableType {
    pub(crate) fn new(elem: ValueType, limits: Limits) -> Self {
        TableType { elem, limits }
    }

    /// Returns the element type of the table.
    pub fn elem_type(&self) -> ValueType {
        self.elem
    }

    /// Returns the limits of the table.
    pub fn limits(&self) -> &Limits {
        &self.limits
    }
}

/// The kind of an imported or exported entity.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ExternalKind {
    /// A function.
    Func,
    /// A table.
    Table,
    /// A linear memory.
    Memory,
    /// A global variable.
    Global,
}

impl ExternalKind {
    pub(crate) fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Func),
            0x01 => Some(Self::Table),
            0x02 => Some(Self::Memory),
            0x03 => Some(Self::Global),
            _ => None,
        }
    }
}

/// Kind-specific descriptor of an import.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImportDesc {
    /// An imported function with the given type index.
    Func(u32),
    /// An imported table.
    Table(TableType),
    /// An imported linear memory.
    Memory(Limits),
    /// An imported global variable.
    Global(GlobalType),
}

impl ImportDesc {
    /// Returns the [`ExternalKind`] this descriptor belongs to.
    pub fn kind(&self) -> ExternalKind {
        match self {
            ImportDesc::Func(_) => ExternalKind::Func,
            ImportDesc::Table(_) => ExternalKind::Table,
            ImportDesc::Memory(_) => ExternalKind::Memory,
            ImportDesc::Global(_) => ExternalKind::Global,
        }
    }
}

/// A single import entry: module name, field name and descriptor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportEntry {
    pub(crate) module: String,
    pub(crate) field: String,
    pub(crate) desc: ImportDesc,
}

impl ImportEntry {
    /// Returns the module name of this import.
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Returns the field name of this import.
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Returns the kind-specific descriptor of this import.
    pub fn desc(&self) -> &ImportDesc {
        &self.desc
    }
}

/// A single export entry.
///
/// Export names are not required to be unique; lookups resolve to the first
/// matching entry in declaration order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportEntry {
    pub(crate) field: String,
    pub(crate) kind: ExternalKind,
    pub(crate) index: u32,
}

impl ExportEntry {
    /// Returns the exported name.
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Returns the kind of the exported entity.
    pub fn kind(&self) -> ExternalKind {
        self.kind
    }

    /// Returns the index of the exported entity within its index space.
    pub fn index(&self) -> u32 {
        self.index
    }
}

/// The type of a structured control block.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BlockType {
    /// The block produces no values.
    Empty,
    /// The block produces a single value of the given type.
    Value(ValueType),
    /// The block's type is given by a function type index.
    TypeIndex(u32),
}
