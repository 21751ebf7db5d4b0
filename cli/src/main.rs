//! The `wasmlite` executable: runs a WebAssembly module under the WASI
//! preview1 shim.
//!
//! The process exit status is the status recorded by `proc_exit`, 0 when
//! the invoked function returns normally, and 1 with a diagnostic on
//! stderr when decoding, instantiation or execution fails.

use anyhow::{anyhow, bail, Context, Error, Result};
use clap::Parser;
use std::{ffi::OsStr, fs, path::PathBuf, process, rc::Rc, str::FromStr};
use wasmlite::{Module, ModuleInstance, NotStartedModuleRef, ProcExit};
use wasmlite_wasi::WasiCtx;

/// A `NAME=value` command line argument.
#[derive(Debug, Clone)]
struct KeyValue {
    key: String,
    value: String,
}

impl FromStr for KeyValue {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (key, value) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("invalid NAME=value pair: no `=` found in `{}`", s))?;
        Ok(KeyValue {
            key: key.to_string(),
            value: value.to_string(),
        })
    }
}

/// Runs a WebAssembly module with WASI preview1 host support.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// The file containing the WebAssembly module to execute.
    #[arg(value_name = "MODULE")]
    wasm_file: PathBuf,

    /// The exported function to invoke instead of `_start`.
    #[arg(long = "invoke", value_name = "FUNCTION")]
    invoke: Option<String>,

    /// An environment variable made available to the module.
    #[arg(long = "env", value_name = "NAME=VAL", value_parser = KeyValue::from_str)]
    envs: Vec<KeyValue>,

    /// Arguments forwarded to the module via WASI.
    #[arg(value_name = "ARGS", trailing_var_arg = true, allow_hyphen_values = true)]
    func_args: Vec<String>,
}

impl Args {
    /// The arguments the WASI invocation expects: the module file name
    /// first, then the forwarded arguments.
    fn argv(&self) -> Vec<String> {
        let module_name = self
            .wasm_file
            .file_name()
            .and_then(OsStr::to_str)
            .unwrap_or("")
            .to_string();
        let mut argv = Vec::with_capacity(self.func_args.len() + 1);
        argv.push(module_name);
        argv.extend_from_slice(&self.func_args);
        argv
    }

    fn wasi_context(&self, not_started: &NotStartedModuleRef) -> WasiCtx {
        let mut wasi = WasiCtx::new();
        for arg in self.argv() {
            wasi.push_arg(arg);
        }
        for KeyValue { key, value } in &self.envs {
            wasi.push_env(key, value);
        }
        if let Some(memory) = not_started.not_started_instance().memory_by_index(0) {
            wasi.set_memory(memory);
        }
        wasi
    }

    fn invoked(&self) -> &str {
        self.invoke.as_deref().unwrap_or("_start")
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let status = run(&args)?;
    if status != 0 {
        process::exit(status);
    }
    Ok(())
}

/// Loads, instantiates and runs the module, returning the process exit
/// status.
fn run(args: &Args) -> Result<i32> {
    let wasm_file = args.wasm_file.display();
    let wasm = fs::read(&args.wasm_file)
        .with_context(|| format!("failed to read Wasm file {}", wasm_file))?;
    let module = Module::from_buffer(wasm)
        .map_err(|error| anyhow!("failed to load Wasm module {}: {}", wasm_file, error))?;

    let invoked = args.invoked();
    if !module
        .exports()
        .iter()
        .any(|export| export.field() == invoked)
    {
        bail!("module {} does not export a function {:?}", wasm_file, invoked);
    }

    let module = Rc::new(module);
    let not_started = ModuleInstance::new(&module)
        .map_err(|error| anyhow!("failed to instantiate Wasm module: {}", error))?;
    let mut wasi = args.wasi_context(&not_started);

    log::debug!("running {} from {}", invoked, wasm_file);
    let outcome = not_started
        .run_start(&mut wasi)
        .and_then(|instance| instance.call(&mut wasi, invoked, &[]).map(|_| ()));

    match outcome {
        Ok(()) => Ok(0),
        Err(error) => {
            if let Some(exit) = proc_exit_status(&error) {
                return Ok(exit);
            }
            Err(anyhow!("failed during execution of {}: {}", invoked, error))
        }
    }
}

/// Extracts the exit status when the error is the `proc_exit` pseudo-trap.
fn proc_exit_status(error: &wasmlite::Error) -> Option<i32> {
    error
        .as_host_error()
        .and_then(|host| host.downcast_ref::<ProcExit>())
        .map(|exit| exit.0)
}
