//! Memory reads for evaluating load nodes.

use rustc_hash::FxHashMap;
use tracing::trace;

use crate::expr::WordType;

/// Fixed-width integer reads at virtual addresses.
///
/// A failed read returns `None`; it never panics.
pub trait Memory: Sync {
    /// Unsigned byte at `addr`.
    fn read_u8(&self, addr: u64) -> Option<u8>;
    /// Unsigned 16-bit word at `addr`.
    fn read_u16(&self, addr: u64) -> Option<u16>;
    /// Unsigned 32-bit word at `addr`.
    fn read_u32(&self, addr: u64) -> Option<u32>;
    /// Unsigned 64-bit word at `addr`.
    fn read_u64(&self, addr: u64) -> Option<u64>;
    /// Signed byte at `addr`.
    fn read_i8(&self, addr: u64) -> Option<i8>;
    /// Signed 16-bit word at `addr`.
    fn read_i16(&self, addr: u64) -> Option<i16>;
    /// Signed 32-bit word at `addr`.
    fn read_i32(&self, addr: u64) -> Option<i32>;
    /// Signed 64-bit word at `addr`.
    fn read_i64(&self, addr: u64) -> Option<i64>;

    /// Read `word` at `addr`, widened according to its signedness.
    fn read(&self, word: WordType, addr: u64) -> Option<i128> {
        match word {
            WordType::U8 => self.read_u8(addr).map(i128::from),
            WordType::U16 => self.read_u16(addr).map(i128::from),
            WordType::U32 => self.read_u32(addr).map(i128::from),
            WordType::U64 => self.read_u64(addr).map(i128::from),
            WordType::I8 => self.read_i8(addr).map(i128::from),
            WordType::I16 => self.read_i16(addr).map(i128::from),
            WordType::I32 => self.read_i32(addr).map(i128::from),
            WordType::I64 => self.read_i64(addr).map(i128::from),
        }
    }
}

/// Memory backed by a map from `(word type, address)` to value.
///
/// A value is only visible to reads of the word type it was inserted with.
#[derive(Clone, Debug, Default)]
pub struct MapMemory {
    values: FxHashMap<(WordType, u64), i128>,
}

impl MapMemory {
    /// Empty memory; every read fails.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` for reads of `word` at `addr`.
    pub fn insert(&mut self, word: WordType, addr: u64, value: i128) {
        self.values.insert((word, addr), value);
    }

    /// Lay out consecutive entries of `word` starting at `base`.
    #[must_use]
    pub fn with_table(mut self, word: WordType, base: u64, values: impl IntoIterator<Item = i128>) -> Self {
        let stride = u64::from(word.bits() / 8);
        let mut addr = base;
        for value in values {
            self.insert(word, addr, value);
            addr = addr.wrapping_add(stride);
        }
        self
    }

    /// Number of stored words.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no word is stored.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn get<T: TryFrom<i128>>(&self, word: WordType, addr: u64) -> Option<T> {
        let value = self.values.get(&(word, addr))?;
        T::try_from(*value).ok()
    }
}

impl Memory for MapMemory {
    fn read_u8(&self, addr: u64) -> Option<u8> {
        self.get(WordType::U8, addr)
    }

    fn read_u16(&self, addr: u64) -> Option<u16> {
        self.get(WordType::U16, addr)
    }

    fn read_u32(&self, addr: u64) -> Option<u32> {
        self.get(WordType::U32, addr)
    }

    fn read_u64(&self, addr: u64) -> Option<u64> {
        self.get(WordType::U64, addr)
    }

    fn read_i8(&self, addr: u64) -> Option<i8> {
        self.get(WordType::I8, addr)
    }

    fn read_i16(&self, addr: u64) -> Option<i16> {
        self.get(WordType::I16, addr)
    }

    fn read_i32(&self, addr: u64) -> Option<i32> {
        self.get(WordType::I32, addr)
    }

    fn read_i64(&self, addr: u64) -> Option<i64> {
        self.get(WordType::I64, addr)
    }
}

/// Memory of a live process, read with `process_vm_readv`.
#[derive(Clone, Copy, Debug)]
pub struct ProcessMemory {
    pid: i32,
}

impl Default for ProcessMemory {
    fn default() -> Self {
        Self::current()
    }
}

impl ProcessMemory {
    /// Memory of the calling process.
    pub fn current() -> Self {
        Self {
            pid: i32::try_from(std::process::id()).unwrap_or(0),
        }
    }

    /// Memory of another process. Reads need ptrace permission on it.
    pub const fn attach(pid: i32) -> Self {
        Self { pid }
    }

    /// Process whose memory is read.
    pub const fn pid(&self) -> i32 {
        self.pid
    }

    fn read_bytes<const N: usize>(&self, addr: u64) -> Option<[u8; N]> {
        let mut buf = [0u8; N];
        match read_remote(self.pid, addr, &mut buf) {
            Ok(n) if n == N => Some(buf),
            Ok(n) => {
                trace!(pid = self.pid, addr = format!("{:#x}", addr), read = n, "short read");
                None
            }
            Err(err) => {
                trace!(pid = self.pid, addr = format!("{:#x}", addr), %err, "read failed");
                None
            }
        }
    }
}

#[cfg(target_os = "linux")]
fn read_remote(pid: i32, addr: u64, buf: &mut [u8]) -> Result<usize, String> {
    use nix::sys::uio::{RemoteIoVec, process_vm_readv};
    use nix::unistd::Pid;
    use std::io::IoSliceMut;

    let base = usize::try_from(addr).map_err(|e| e.to_string())?;
    let remote = [RemoteIoVec {
        base,
        len: buf.len(),
    }];
    let mut local = [IoSliceMut::new(buf)];
    process_vm_readv(Pid::from_raw(pid), &mut local, &remote).map_err(|e| e.to_string())
}

#[cfg(not(target_os = "linux"))]
fn read_remote(_pid: i32, _addr: u64, _buf: &mut [u8]) -> Result<usize, String> {
    Err("process memory reads are only supported on Linux".to_string())
}

macro_rules! process_reads {
    ($($name:ident => $ty:ty),* $(,)?) => {
        impl Memory for ProcessMemory {
            $(
                fn $name(&self, addr: u64) -> Option<$ty> {
                    self.read_bytes(addr).map(<$ty>::from_ne_bytes)
                }
            )*
        }
    };
}

process_reads! {
    read_u8 => u8,
    read_u16 => u16,
    read_u32 => u32,
    read_u64 => u64,
    read_i8 => i8,
    read_i16 => i16,
    read_i32 => i32,
    read_i64 => i64,
}
