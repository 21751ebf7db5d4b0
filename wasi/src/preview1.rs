//! The `wasi_snapshot_preview1` functions the shim implements.
//!
//! Every function takes pointers and lengths into the guest's linear
//! memory and returns its errno as an `i32` result. Bad guest pointers
//! yield `FAULT`; unknown descriptors yield `BADF`; functions outside the
//! implemented catalog yield `NOSYS`.

use crate::WasiCtx;
use std::time::{SystemTime, UNIX_EPOCH};
use wasmlite::{MemoryRef, RuntimeArgs, Trap, Value};

/// The WASI preview1 errno values used by this shim.
pub mod errno {
    /// No error occurred.
    pub const SUCCESS: i32 = 0;
    /// Bad file descriptor.
    pub const BADF: i32 = 8;
    /// Bad address: a guest pointer was out of bounds.
    pub const FAULT: i32 = 21;
    /// Invalid argument.
    pub const INVAL: i32 = 28;
    /// An I/O error occurred on the host side.
    pub const IO: i32 = 29;
    /// The function is not implemented by this shim.
    pub const NOSYS: i32 = 52;
}

/// Size of one guest `iovec`: a `u32` buffer pointer plus a `u32` length.
const IOVEC_SIZE: u32 = 8;

const CLOCK_REALTIME: u32 = 0;
const CLOCK_MONOTONIC: u32 = 1;

fn read_u32(memory: &MemoryRef, ptr: u32) -> Result<u32, i32> {
    memory.get_value::<u32>(ptr).map_err(|_| errno::FAULT)
}

fn write_u32(memory: &MemoryRef, ptr: u32, value: u32) -> Result<(), i32> {
    memory.set_value::<u32>(ptr, value).map_err(|_| errno::FAULT)
}

fn write_u64(memory: &MemoryRef, ptr: u32, value: u64) -> Result<(), i32> {
    memory.set_value::<u64>(ptr, value).map_err(|_| errno::FAULT)
}

fn read_bytes(memory: &MemoryRef, ptr: u32, len: u32) -> Result<Vec<u8>, i32> {
    let mut bytes = vec![0u8; len as usize];
    memory.get_into(ptr, &mut bytes).map_err(|_| errno::FAULT)?;
    Ok(bytes)
}

fn write_bytes(memory: &MemoryRef, ptr: u32, bytes: &[u8]) -> Result<(), i32> {
    memory.set(ptr, bytes).map_err(|_| errno::FAULT)
}

/// Nanoseconds of the monotonic clock, measured from the first use within
/// this process.
fn monotonic_now() -> u64 {
    use std::sync::OnceLock;
    use std::time::Instant;
    static BASE: OnceLock<Instant> = OnceLock::new();
    let base = *BASE.get_or_init(Instant::now);
    Instant::now().duration_since(base).as_nanos() as u64
}

impl WasiCtx {
    pub(crate) fn dispatch_preview1(
        &mut self,
        field: &str,
        args: RuntimeArgs,
    ) -> Result<Option<Value>, Trap> {
        let result = match field {
            "args_sizes_get" => {
                self.sizes_get(true, args.nth_checked(0)?, args.nth_checked(1)?)
            }
            "args_get" => self.list_get(true, args.nth_checked(0)?, args.nth_checked(1)?),
            "environ_sizes_get" => {
                self.sizes_get(false, args.nth_checked(0)?, args.nth_checked(1)?)
            }
            "environ_get" => self.list_get(false, args.nth_checked(0)?, args.nth_checked(1)?),
            "fd_write" => self.fd_write(
                args.nth_checked(0)?,
                args.nth_checked(1)?,
                args.nth_checked(2)?,
                args.nth_checked(3)?,
            ),
            "fd_read" => self.fd_read(
                args.nth_checked(0)?,
                args.nth_checked(1)?,
                args.nth_checked(2)?,
                args.nth_checked(3)?,
            ),
            "fd_close" => self.fd_close(args.nth_checked(0)?),
            "clock_time_get" => self.clock_time_get(
                args.nth_checked(0)?,
                args.nth_checked::<i64>(1)?,
                args.nth_checked(2)?,
            ),
            "random_get" => self.random_get(args.nth_checked(0)?, args.nth_checked(1)?),
            "proc_exit" => {
                let code: i32 = args.nth_checked(0)?;
                log::trace!("proc_exit(code={})", code);
                self.record_exit(code);
                return Ok(None);
            }
            unknown => {
                log::warn!("unimplemented WASI function {}", unknown);
                Err(errno::NOSYS)
            }
        };
        let errno = match result {
            Ok(errno) | Err(errno) => errno,
        };
        log::trace!("{} -> errno {}", field, errno);
        Ok(Some(Value::I32(errno)))
    }

    fn memory_or_fault(&self) -> Result<MemoryRef, i32> {
        self.memory().cloned().ok_or(errno::FAULT)
    }

    /// First phase of `args_get` / `environ_get`: the entry count and the
    /// total byte budget of the packed, NUL-terminated buffer.
    fn sizes_get(&mut self, args: bool, count_ptr: u32, buf_size_ptr: u32) -> Result<i32, i32> {
        let memory = self.memory_or_fault()?;
        let list = if args { self.args() } else { self.envs() };
        let count = list.len() as u32;
        let buf_size = list.iter().map(|entry| entry.len() as u32 + 1).sum();
        write_u32(&memory, count_ptr, count)?;
        write_u32(&memory, buf_size_ptr, buf_size)?;
        Ok(errno::SUCCESS)
    }

    /// Second phase: a pointer array at `list_ptr` and the packed bytes at
    /// `buf_ptr`.
    fn list_get(&mut self, args: bool, list_ptr: u32, buf_ptr: u32) -> Result<i32, i32> {
        let memory = self.memory_or_fault()?;
        let list = if args { self.args() } else { self.envs() };
        let mut cursor = buf_ptr;
        for (i, entry) in list.iter().enumerate() {
            write_u32(&memory, list_ptr.wrapping_add(4 * i as u32), cursor)?;
            write_bytes(&memory, cursor, entry.as_bytes())?;
            write_bytes(&memory, cursor.wrapping_add(entry.len() as u32), &[0])?;
            cursor = cursor.wrapping_add(entry.len() as u32 + 1);
        }
        Ok(errno::SUCCESS)
    }

    /// Gathers `iovs_len` iovecs and concatenate-writes them to `fd`,
    /// storing the total number of bytes written at `nwritten_ptr`.
    fn fd_write(
        &mut self,
        fd: u32,
        iovs_ptr: u32,
        iovs_len: u32,
        nwritten_ptr: u32,
    ) -> Result<i32, i32> {
        log::trace!("fd_write(fd={}, iovs={}x{})", fd, iovs_ptr, iovs_len);
        let memory = self.memory_or_fault()?;
        let mut gathered = Vec::new();
        for i in 0..iovs_len {
            let iov = iovs_ptr.wrapping_add(i * IOVEC_SIZE);
            let buf_ptr = read_u32(&memory, iov)?;
            let buf_len = read_u32(&memory, iov.wrapping_add(4))?;
            gathered.extend_from_slice(&read_bytes(&memory, buf_ptr, buf_len)?);
        }
        let descriptor = self.fd_mut(fd).ok_or(errno::BADF)?;
        let written = descriptor.write(&gathered).map_err(|_| errno::IO)?;
        write_u32(&memory, nwritten_ptr, written as u32)?;
        Ok(errno::SUCCESS)
    }

    /// Scatter-reads from `fd` into `iovs_len` iovecs, storing the total
    /// number of bytes read at `nread_ptr`. A short read terminates early.
    fn fd_read(
        &mut self,
        fd: u32,
        iovs_ptr: u32,
        iovs_len: u32,
        nread_ptr: u32,
    ) -> Result<i32, i32> {
        log::trace!("fd_read(fd={}, iovs={}x{})", fd, iovs_ptr, iovs_len);
        let memory = self.memory_or_fault()?;
        let mut total = 0u32;
        for i in 0..iovs_len {
            let iov = iovs_ptr.wrapping_add(i * IOVEC_SIZE);
            let buf_ptr = read_u32(&memory, iov)?;
            let buf_len = read_u32(&memory, iov.wrapping_add(4))?;
            let mut buf = vec![0u8; buf_len as usize];
            let descriptor = self.fd_mut(fd).ok_or(errno::BADF)?;
            let n = descriptor.read(&mut buf).map_err(|_| errno::IO)?;
            write_bytes(&memory, buf_ptr, &buf[..n])?;
            total += n as u32;
            if n < buf_len as usize {
                break;
            }
        }
        write_u32(&memory, nread_ptr, total)?;
        Ok(errno::SUCCESS)
    }

    fn fd_close(&mut self, fd: u32) -> Result<i32, i32> {
        log::trace!("fd_close(fd={})", fd);
        if self.close_fd(fd) {
            Ok(errno::SUCCESS)
        } else {
            Err(errno::BADF)
        }
    }

    /// Writes a 64-bit nanosecond timestamp of the requested clock.
    fn clock_time_get(&mut self, clock_id: u32, _precision: i64, time_ptr: u32) -> Result<i32, i32> {
        let memory = self.memory_or_fault()?;
        let now = match clock_id {
            CLOCK_REALTIME => SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_err(|_| errno::IO)?
                .as_nanos() as u64,
            CLOCK_MONOTONIC => monotonic_now(),
            _ => return Err(errno::INVAL),
        };
        write_u64(&memory, time_ptr, now)?;
        Ok(errno::SUCCESS)
    }

    /// Fills `buf_len` bytes at `buf_ptr` with cryptographically secure
    /// random data.
    fn random_get(&mut self, buf_ptr: u32, buf_len: u32) -> Result<i32, i32> {
        let memory = self.memory_or_fault()?;
        let mut bytes = vec![0u8; buf_len as usize];
        getrandom::getrandom(&mut bytes).map_err(|_| errno::IO)?;
        write_bytes(&memory, buf_ptr, &bytes)?;
        Ok(errno::SUCCESS)
    }
}

#[cfg(test)]
mod tests {
    use super::errno;
    use crate::{Descriptor, WasiCtx, PREVIEW1_MODULE_NAME};
    use wasmlite::memory_units::Pages;
    use wasmlite::{Externals, MemoryInstance, MemoryRef, Value};

    fn ctx_with_memory() -> (WasiCtx, MemoryRef) {
        let memory = MemoryInstance::alloc(Pages(1), None).unwrap();
        let mut ctx = WasiCtx::new();
        ctx.set_memory(memory.clone());
        (ctx, memory)
    }

    fn call(ctx: &mut WasiCtx, field: &str, args: &[Value]) -> Option<Value> {
        ctx.invoke_import(PREVIEW1_MODULE_NAME, field, args.into())
            .unwrap()
    }

    fn call_errno(ctx: &mut WasiCtx, field: &str, args: &[Value]) -> i32 {
        match call(ctx, field, args) {
            Some(Value::I32(errno)) => errno,
            other => panic!("expected an errno result, got {:?}", other),
        }
    }

    #[test]
    fn fd_write_gathers_iovecs() {
        let (mut ctx, memory) = ctx_with_memory();
        ctx.set_fd(1, Descriptor::buffer(Vec::new()));

        // Guest layout: the string at 64, two iovecs at 0.
        memory.set(64, b"Hello\n").unwrap();
        memory.set_value::<u32>(0, 64).unwrap(); // iov[0].ptr
        memory.set_value::<u32>(4, 4).unwrap(); // iov[0].len = "Hell"
        memory.set_value::<u32>(8, 68).unwrap(); // iov[1].ptr
        memory.set_value::<u32>(12, 2).unwrap(); // iov[1].len = "o\n"

        let errno = call_errno(
            &mut ctx,
            "fd_write",
            &[Value::I32(1), Value::I32(0), Value::I32(2), Value::I32(32)],
        );
        assert_eq!(errno, errno::SUCCESS);
        assert_eq!(memory.get_value::<u32>(32).unwrap(), 6);
        assert_eq!(ctx.take_buffer(1).unwrap(), b"Hello\n");
    }

    #[test]
    fn fd_write_to_an_unknown_fd_is_badf() {
        let (mut ctx, memory) = ctx_with_memory();
        memory.set_value::<u32>(0, 64).unwrap();
        memory.set_value::<u32>(4, 0).unwrap();
        let errno = call_errno(
            &mut ctx,
            "fd_write",
            &[Value::I32(9), Value::I32(0), Value::I32(1), Value::I32(32)],
        );
        assert_eq!(errno, errno::BADF);
    }

    #[test]
    fn fd_read_stops_at_a_short_read() {
        let (mut ctx, memory) = ctx_with_memory();
        ctx.set_fd(0, Descriptor::buffer(b"abc".to_vec()));

        // One iovec asking for 10 bytes at 128.
        memory.set_value::<u32>(0, 128).unwrap();
        memory.set_value::<u32>(4, 10).unwrap();

        let errno = call_errno(
            &mut ctx,
            "fd_read",
            &[Value::I32(0), Value::I32(0), Value::I32(1), Value::I32(32)],
        );
        assert_eq!(errno, errno::SUCCESS);
        assert_eq!(memory.get_value::<u32>(32).unwrap(), 3);
        let mut read_back = [0u8; 3];
        memory.get_into(128, &mut read_back).unwrap();
        assert_eq!(&read_back, b"abc");
    }

    #[test]
    fn args_are_exposed_in_two_phases() {
        let (mut ctx, memory) = ctx_with_memory();
        ctx.push_arg("demo.wasm");
        ctx.push_arg("-v");

        let errno = call_errno(
            &mut ctx,
            "args_sizes_get",
            &[Value::I32(0), Value::I32(4)],
        );
        assert_eq!(errno, errno::SUCCESS);
        assert_eq!(memory.get_value::<u32>(0).unwrap(), 2);
        assert_eq!(memory.get_value::<u32>(4).unwrap(), 13);

        let errno = call_errno(&mut ctx, "args_get", &[Value::I32(16), Value::I32(64)]);
        assert_eq!(errno, errno::SUCCESS);
        assert_eq!(memory.get_value::<u32>(16).unwrap(), 64);
        assert_eq!(memory.get_value::<u32>(20).unwrap(), 74);
        let mut packed = [0u8; 13];
        memory.get_into(64, &mut packed).unwrap();
        assert_eq!(&packed, b"demo.wasm\0-v\0");
    }

    #[test]
    fn environ_entries_are_name_value_pairs() {
        let (mut ctx, memory) = ctx_with_memory();
        ctx.push_env("PATH", "/bin");

        let errno = call_errno(
            &mut ctx,
            "environ_sizes_get",
            &[Value::I32(0), Value::I32(4)],
        );
        assert_eq!(errno, errno::SUCCESS);
        assert_eq!(memory.get_value::<u32>(0).unwrap(), 1);
        assert_eq!(memory.get_value::<u32>(4).unwrap(), 10);

        call_errno(&mut ctx, "environ_get", &[Value::I32(16), Value::I32(64)]);
        let mut packed = [0u8; 10];
        memory.get_into(64, &mut packed).unwrap();
        assert_eq!(&packed, b"PATH=/bin\0");
    }

    #[test]
    fn clock_time_get_writes_nanoseconds() {
        let (mut ctx, memory) = ctx_with_memory();
        let errno = call_errno(
            &mut ctx,
            "clock_time_get",
            &[Value::I32(0), Value::I64(0), Value::I32(8)],
        );
        assert_eq!(errno, errno::SUCCESS);
        // A realtime timestamp after 2020 in nanoseconds.
        assert!(memory.get_value::<u64>(8).unwrap() > 1_577_836_800_000_000_000);

        let errno = call_errno(
            &mut ctx,
            "clock_time_get",
            &[Value::I32(9), Value::I64(0), Value::I32(8)],
        );
        assert_eq!(errno, errno::INVAL);
    }

    #[test]
    fn random_get_fills_the_requested_range() {
        let (mut ctx, memory) = ctx_with_memory();
        memory.set(100, &[0u8; 16]).unwrap();
        let errno = call_errno(
            &mut ctx,
            "random_get",
            &[Value::I32(100), Value::I32(16)],
        );
        assert_eq!(errno, errno::SUCCESS);
        // Out-of-bounds destination is a FAULT, not a trap.
        let errno = call_errno(
            &mut ctx,
            "random_get",
            &[Value::I32(65530), Value::I32(16)],
        );
        assert_eq!(errno, errno::FAULT);
    }

    #[test]
    fn fd_close_is_badf_the_second_time() {
        let (mut ctx, _memory) = ctx_with_memory();
        assert_eq!(call_errno(&mut ctx, "fd_close", &[Value::I32(2)]), errno::SUCCESS);
        assert_eq!(call_errno(&mut ctx, "fd_close", &[Value::I32(2)]), errno::BADF);
    }

    #[test]
    fn proc_exit_records_the_status_and_returns_nothing() {
        let (mut ctx, _memory) = ctx_with_memory();
        let result = call(&mut ctx, "proc_exit", &[Value::I32(3)]);
        assert_eq!(result, None);
        assert_eq!(ctx.exit_code(), Some(3));
        assert_eq!(ctx.exit_status(), Some(3));
    }

    #[test]
    fn unknown_functions_return_nosys() {
        let (mut ctx, _memory) = ctx_with_memory();
        assert_eq!(
            call_errno(&mut ctx, "path_open", &[]),
            errno::NOSYS
        );
    }
}
