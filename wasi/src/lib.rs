//! WASI preview1 host support for the wasmlite interpreter.
//!
//! The shim implements a fixed subset of the `wasi_snapshot_preview1`
//! catalog against a small file-descriptor table: `fd_read`, `fd_write`,
//! `fd_close`, `proc_exit`, `clock_time_get`, `random_get` and the
//! two-phase `args_*` / `environ_*` pairs. All guest parameters are
//! pointers and lengths into the instance's linear memory; failures surface
//! as WASI errnos in the `i32` result, never as traps.
//!
//! A [`WasiCtx`] implements [`Externals`], so wiring it up is a matter of
//! instantiating the module, handing the context the instance's memory and
//! invoking `_start`:
//!
//! ```rust
//! use std::rc::Rc;
//! use wasmlite::{Module, ModuleInstance};
//! use wasmlite_wasi::WasiCtx;
//!
//! let wasm = wat::parse_str(r#"(module (memory (export "memory") 1))"#).unwrap();
//! let module = Rc::new(Module::from_buffer(wasm).unwrap());
//! let not_started = ModuleInstance::new(&module).unwrap();
//!
//! let mut wasi = WasiCtx::new();
//! wasi.push_arg("demo.wasm");
//! if let Some(memory) = not_started.not_started_instance().memory_by_index(0) {
//!     wasi.set_memory(memory);
//! }
//! let instance = not_started.run_start(&mut wasi).unwrap();
//! # let _ = instance;
//! ```

mod preview1;

pub use preview1::errno;

use std::collections::BTreeMap;
use std::io::{self, Read, Write};
use wasmlite::{Externals, MemoryRef, RuntimeArgs, Trap, Value};

/// The module name the shim answers under.
pub const PREVIEW1_MODULE_NAME: &str = "wasi_snapshot_preview1";

/// A host-side file descriptor.
#[derive(Debug)]
pub enum Descriptor {
    /// The process's standard input.
    Stdin,
    /// The process's standard output.
    Stdout,
    /// The process's standard error.
    Stderr,
    /// An in-memory stream, readable from the front and appendable at the
    /// back. Used by tests and by embedders that capture guest output.
    Buffer {
        /// Bytes not yet consumed by `fd_read` / written by `fd_write`.
        data: Vec<u8>,
        /// Read position within `data`.
        read_pos: usize,
    },
}

impl Descriptor {
    /// Creates an in-memory descriptor pre-filled with `data`.
    pub fn buffer(data: Vec<u8>) -> Descriptor {
        Descriptor::Buffer { data, read_pos: 0 }
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        match self {
            Descriptor::Stdin => Err(io::Error::from(io::ErrorKind::Unsupported)),
            Descriptor::Stdout => {
                let mut stdout = io::stdout().lock();
                stdout.write_all(bytes)?;
                Ok(bytes.len())
            }
            Descriptor::Stderr => {
                let mut stderr = io::stderr().lock();
                stderr.write_all(bytes)?;
                Ok(bytes.len())
            }
            Descriptor::Buffer { data, .. } => {
                data.extend_from_slice(bytes);
                Ok(bytes.len())
            }
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Descriptor::Stdin => io::stdin().lock().read(buf),
            Descriptor::Stdout | Descriptor::Stderr => {
                Err(io::Error::from(io::ErrorKind::Unsupported))
            }
            Descriptor::Buffer { data, read_pos } => {
                let available = &data[(*read_pos).min(data.len())..];
                let n = available.len().min(buf.len());
                buf[..n].copy_from_slice(&available[..n]);
                *read_pos += n;
                Ok(n)
            }
        }
    }
}

/// The state of one WASI "process": arguments, environment, file
/// descriptors and the recorded exit status.
///
/// The context must be pointed at the instance's linear memory with
/// [`set_memory`] before any wasm code that uses WASI runs.
///
/// [`set_memory`]: #method.set_memory
#[derive(Debug)]
pub struct WasiCtx {
    args: Vec<String>,
    envs: Vec<String>,
    fds: BTreeMap<u32, Descriptor>,
    memory: Option<MemoryRef>,
    exit_code: Option<i32>,
}

impl Default for WasiCtx {
    fn default() -> Self {
        Self::new()
    }
}

impl WasiCtx {
    /// Creates a context with the standard descriptors 0, 1 and 2 wired to
    /// the host's stdio and no arguments or environment.
    pub fn new() -> WasiCtx {
        let mut fds = BTreeMap::new();
        fds.insert(0, Descriptor::Stdin);
        fds.insert(1, Descriptor::Stdout);
        fds.insert(2, Descriptor::Stderr);
        WasiCtx {
            args: Vec::new(),
            envs: Vec::new(),
            fds,
            memory: None,
            exit_code: None,
        }
    }

    /// Appends a guest argument. The first argument is conventionally the
    /// module's file name.
    pub fn push_arg(&mut self, arg: impl Into<String>) {
        self.args.push(arg.into());
    }

    /// Appends a `NAME=value` environment entry.
    pub fn push_env(&mut self, name: &str, value: &str) {
        self.envs.push(format!("{}={}", name, value));
    }

    /// Hands the context the linear memory all pointer arguments refer to.
    pub fn set_memory(&mut self, memory: MemoryRef) {
        self.memory = Some(memory);
    }

    /// Replaces the descriptor registered under `fd`.
    pub fn set_fd(&mut self, fd: u32, descriptor: Descriptor) {
        self.fds.insert(fd, descriptor);
    }

    /// Removes and returns the bytes accumulated in an in-memory
    /// descriptor, if `fd` is one.
    pub fn take_buffer(&mut self, fd: u32) -> Option<Vec<u8>> {
        match self.fds.remove(&fd) {
            Some(Descriptor::Buffer { data, .. }) => Some(data),
            Some(other) => {
                self.fds.insert(fd, other);
                None
            }
            None => None,
        }
    }

    /// Returns the exit status recorded by `proc_exit`, if any.
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    pub(crate) fn record_exit(&mut self, code: i32) {
        self.exit_code = Some(code);
    }

    pub(crate) fn args(&self) -> &[String] {
        &self.args
    }

    pub(crate) fn envs(&self) -> &[String] {
        &self.envs
    }

    pub(crate) fn fd_mut(&mut self, fd: u32) -> Option<&mut Descriptor> {
        self.fds.get_mut(&fd)
    }

    pub(crate) fn close_fd(&mut self, fd: u32) -> bool {
        self.fds.remove(&fd).is_some()
    }

    pub(crate) fn memory(&self) -> Option<&MemoryRef> {
        self.memory.as_ref()
    }
}

impl Externals for WasiCtx {
    fn invoke_import(
        &mut self,
        module: &str,
        field: &str,
        args: RuntimeArgs,
    ) -> Result<Option<Value>, Trap> {
        if module != PREVIEW1_MODULE_NAME {
            log::warn!("unknown import module {}.{}", module, field);
            return Ok(Some(Value::I32(errno::NOSYS)));
        }
        self.dispatch_preview1(field, args)
    }

    fn exit_status(&self) -> Option<i32> {
        self.exit_code
    }
}
