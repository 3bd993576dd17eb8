//! Runtime allocator introspection.
//!
//! The backing allocator is whatever `malloc` resolves to, possibly swapped
//! in with `LD_PRELOAD`. Its statistics entry points are looked up with
//! `dlsym(RTLD_DEFAULT, ..)` once; every report branches on what was found.
//! A missing symbol is never fatal.

#![allow(unsafe_code)]

use std::ffi::{CStr, c_char, c_int, c_void};
use std::fmt::Write as _;
use std::ptr::NonNull;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::size_class::{KIB, MIB};

type MallctlFn =
    unsafe extern "C" fn(*const c_char, *mut c_void, *mut usize, *mut c_void, usize) -> c_int;
type MallctlNameToMibFn = unsafe extern "C" fn(*const c_char, *mut usize, *mut usize) -> c_int;
type MallctlByMibFn =
    unsafe extern "C" fn(*const usize, usize, *mut c_void, *mut usize, *mut c_void, usize) -> c_int;
type MiGoodSizeFn = unsafe extern "C" fn(usize) -> usize;
type MiStatsPrintFn = unsafe extern "C" fn(*mut c_void);
type UsableSizeFn = unsafe extern "C" fn(*mut c_void) -> usize;

/// jemalloc's pseudo-arena index that aggregates every arena.
const MALLCTL_ARENAS_ALL: usize = 4096;

/// Sizes reported through `mi_good_size`.
pub const GOOD_SIZE_PROBES: [usize; 9] = [16, 32, 64, 128, 256, 512, 1024, 2048, 4096];

/// Which optional entry points resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub mallctl: bool,
    pub mallctl_by_mib: bool,
    pub mi_stats_print: bool,
    pub mi_good_size: bool,
    pub malloc_usable_size: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocatorFamily {
    Jemalloc,
    Mimalloc,
    /// No vendor statistics API; usually the platform allocator.
    Unknown,
}

/// Why a statistics query produced nothing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Unavailable {
    #[error("{0} not found")]
    MissingSymbol(&'static str),
    #[error("failed to update epoch")]
    EpochRefresh,
    #[error("stats not available (allocator built without statistics)")]
    StatsDisabled,
    #[error("failed to look up {0}")]
    Lookup(&'static str),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JemallocStats {
    pub allocated: usize,
    pub active: usize,
    pub metadata: usize,
    pub resident: usize,
    pub mapped: usize,
}

/// Live regions of one allocator size bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinStat {
    pub size: usize,
    pub live: usize,
}

impl BinStat {
    #[must_use]
    pub fn total_bytes(&self) -> usize {
        self.size * self.live
    }
}

/// Resolved optional allocator entry points.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllocatorProbe {
    mallctl: Option<MallctlFn>,
    name_to_mib: Option<MallctlNameToMibFn>,
    by_mib: Option<MallctlByMibFn>,
    mi_stats_print: Option<MiStatsPrintFn>,
    mi_good_size: Option<MiGoodSizeFn>,
    usable_size: Option<UsableSizeFn>,
}

/// # Safety
///
/// `F` must be an `extern "C"` function pointer type matching the real
/// signature of `name`.
unsafe fn resolve<F: Copy>(name: &CStr) -> Option<F> {
    debug_assert_eq!(size_of::<F>(), size_of::<*mut c_void>());
    // SAFETY: `name` is NUL-terminated; RTLD_DEFAULT searches the global scope.
    let sym = unsafe { libc::dlsym(libc::RTLD_DEFAULT, name.as_ptr()) };
    if sym.is_null() {
        None
    } else {
        // SAFETY: caller guarantees `F` is the symbol's function pointer type.
        Some(unsafe { std::mem::transmute_copy::<*mut c_void, F>(&sym) })
    }
}

impl AllocatorProbe {
    /// Look up every optional symbol in the running process.
    #[must_use]
    pub fn detect() -> Self {
        // SAFETY: each type alias mirrors the C prototype of its symbol.
        unsafe {
            Self {
                mallctl: resolve(c"mallctl"),
                name_to_mib: resolve(c"mallctlnametomib"),
                by_mib: resolve(c"mallctlbymib"),
                mi_stats_print: resolve(c"mi_stats_print"),
                mi_good_size: resolve(c"mi_good_size"),
                usable_size: resolve(c"malloc_usable_size"),
            }
        }
    }

    /// A probe that found nothing.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            mallctl: self.mallctl.is_some(),
            mallctl_by_mib: self.name_to_mib.is_some() && self.by_mib.is_some(),
            mi_stats_print: self.mi_stats_print.is_some(),
            mi_good_size: self.mi_good_size.is_some(),
            malloc_usable_size: self.usable_size.is_some(),
        }
    }

    #[must_use]
    pub fn family(&self) -> AllocatorFamily {
        if self.mallctl.is_some() {
            AllocatorFamily::Jemalloc
        } else if self.mi_stats_print.is_some() || self.mi_good_size.is_some() {
            AllocatorFamily::Mimalloc
        } else {
            AllocatorFamily::Unknown
        }
    }

    fn mallctl_read<T: Copy + Default>(&self, name: &CStr) -> Option<T> {
        let mallctl = self.mallctl?;
        let mut value = T::default();
        let mut len = size_of::<T>();
        // SAFETY: `value` is a writable `T` of `len` bytes; no new value.
        let rc = unsafe {
            mallctl(
                name.as_ptr(),
                (&raw mut value).cast(),
                &mut len,
                std::ptr::null_mut(),
                0,
            )
        };
        (rc == 0).then_some(value)
    }

    fn refresh_epoch(&self) -> Result<(), Unavailable> {
        let mallctl = self.mallctl.ok_or(Unavailable::MissingSymbol("mallctl"))?;
        let mut epoch: u64 = 1;
        let mut len = size_of::<u64>();
        // SAFETY: reads and writes one u64.
        let rc = unsafe {
            mallctl(
                c"epoch".as_ptr(),
                (&raw mut epoch).cast(),
                &mut len,
                (&raw mut epoch).cast(),
                len,
            )
        };
        if rc == 0 {
            Ok(())
        } else {
            Err(Unavailable::EpochRefresh)
        }
    }

    /// Global jemalloc counters after an epoch refresh.
    pub fn jemalloc_stats(&self) -> Result<JemallocStats, Unavailable> {
        self.refresh_epoch()?;
        let read = |name: &CStr| self.mallctl_read::<usize>(name).ok_or(Unavailable::StatsDisabled);
        Ok(JemallocStats {
            allocated: read(c"stats.allocated")?,
            active: read(c"stats.active")?,
            metadata: read(c"stats.metadata")?,
            resident: read(c"stats.resident")?,
            mapped: read(c"stats.mapped")?,
        })
    }

    /// Walk one indexed jemalloc family (`arenas.bin.<i>.size` paired with
    /// its merged-arena live counter). Only non-empty entries are returned.
    fn indexed_stats(
        &self,
        count_name: &'static CStr,
        size_name: &'static CStr,
        live_name: &'static CStr,
    ) -> Result<Vec<BinStat>, Unavailable> {
        let (Some(to_mib), Some(by_mib)) = (self.name_to_mib, self.by_mib) else {
            return Err(Unavailable::MissingSymbol("mallctlbymib"));
        };
        let count = self
            .mallctl_read::<u32>(count_name)
            .ok_or(Unavailable::Lookup("index count"))?;

        let mut size_mib = [0usize; 4];
        let mut size_len = size_mib.len();
        let mut live_mib = [0usize; 6];
        let mut live_len = live_mib.len();
        // SAFETY: each MIB buffer holds `*_len` entries.
        unsafe {
            if to_mib(size_name.as_ptr(), size_mib.as_mut_ptr(), &mut size_len) != 0 {
                return Err(Unavailable::Lookup("size MIB"));
            }
            if to_mib(live_name.as_ptr(), live_mib.as_mut_ptr(), &mut live_len) != 0 {
                return Err(Unavailable::Lookup("live-count MIB"));
            }
        }
        live_mib[2] = MALLCTL_ARENAS_ALL;

        let read_mib = |mib: &[usize]| -> Option<usize> {
            let mut value = 0usize;
            let mut len = size_of::<usize>();
            // SAFETY: `mib` came from mallctlnametomib; `value` is one usize.
            let rc = unsafe {
                by_mib(
                    mib.as_ptr(),
                    mib.len(),
                    (&raw mut value).cast(),
                    &mut len,
                    std::ptr::null_mut(),
                    0,
                )
            };
            (rc == 0).then_some(value)
        };

        let mut out = Vec::new();
        for index in 0..count as usize {
            size_mib[2] = index;
            live_mib[4] = index;
            let (Some(size), Some(live)) = (
                read_mib(&size_mib[..size_len]),
                read_mib(&live_mib[..live_len]),
            ) else {
                continue;
            };
            if live > 0 {
                out.push(BinStat { size, live });
            }
        }
        Ok(out)
    }

    /// Live regions per small size bin, merged across arenas.
    pub fn jemalloc_bins(&self) -> Result<Vec<BinStat>, Unavailable> {
        self.indexed_stats(
            c"arenas.nbins",
            c"arenas.bin.0.size",
            c"stats.arenas.0.bins.0.curregs",
        )
    }

    /// Live large extents per size, merged across arenas.
    pub fn jemalloc_large_extents(&self) -> Result<Vec<BinStat>, Unavailable> {
        self.indexed_stats(
            c"arenas.nlextents",
            c"arenas.lextent.0.size",
            c"stats.arenas.0.lextents.0.curlextents",
        )
    }

    /// `(requested, rounded)` pairs from `mi_good_size`.
    #[must_use]
    pub fn good_sizes(&self) -> Option<Vec<(usize, usize)>> {
        let good = self.mi_good_size?;
        Some(
            GOOD_SIZE_PROBES
                .iter()
                // SAFETY: mi_good_size is a pure function of its argument.
                .map(|&s| (s, unsafe { good(s) }))
                .collect(),
        )
    }

    /// Write mimalloc's own statistics to stderr.
    pub fn dump_mimalloc_stats(&self) -> bool {
        match self.mi_stats_print {
            Some(print) => {
                // SAFETY: a null output argument selects the default sink.
                unsafe { print(std::ptr::null_mut()) };
                true
            }
            None => false,
        }
    }

    /// Usable bytes of a live block, when the allocator exposes it.
    ///
    /// # Safety
    ///
    /// `ptr` must be a live block returned by the process `malloc`.
    #[must_use]
    pub unsafe fn usable_size(&self, ptr: NonNull<u8>) -> Option<usize> {
        let usable = self.usable_size?;
        // SAFETY: forwarded caller contract.
        Some(unsafe { usable(ptr.as_ptr().cast()) })
    }

    /// Human-readable statistics section. Absent capabilities produce a
    /// "not available" line.
    #[must_use]
    pub fn render(&self, expected_user_bytes: usize) -> String {
        let mut out = String::new();
        let rule = crate::protocol::RULE;
        let _ = writeln!(out);
        match self.family() {
            AllocatorFamily::Jemalloc => match self.jemalloc_stats() {
                Ok(stats) => {
                    let _ = writeln!(out, "{rule}\njemalloc Statistics:\n{rule}");
                    for (label, value) in [
                        ("allocated", stats.allocated),
                        ("active", stats.active),
                        ("metadata", stats.metadata),
                        ("resident", stats.resident),
                        ("mapped", stats.mapped),
                    ] {
                        let _ = writeln!(out, "  {:<10} {value} bytes ({})", format!("{label}:"), mb(value));
                    }
                    render_expected(&mut out, expected_user_bytes);
                    match self.jemalloc_bins() {
                        Ok(bins) => render_bins(&mut out, "Per-bin statistics (small allocations)", &bins),
                        Err(why) => {
                            let _ = writeln!(out, "  (per-bin stats skipped: {why})");
                        }
                    }
                    if let Ok(extents) = self.jemalloc_large_extents()
                        && !extents.is_empty()
                    {
                        render_bins(&mut out, "Per-extent statistics (large allocations)", &extents);
                    }
                }
                Err(why) => {
                    let _ = writeln!(out, "[jemalloc stats] {why}");
                }
            },
            AllocatorFamily::Mimalloc => {
                let _ = writeln!(out, "{rule}\nmimalloc Statistics:\n{rule}");
                if let Some(sizes) = self.good_sizes() {
                    let _ = writeln!(out, "  Size class examples:");
                    for (requested, rounded) in sizes {
                        let _ = writeln!(out, "    mi_good_size({requested}) = {rounded}");
                    }
                }
                render_expected(&mut out, expected_user_bytes);
            }
            AllocatorFamily::Unknown => {
                let _ = writeln!(out, "[allocator stats] not available (no jemalloc or mimalloc API found)");
                render_expected(&mut out, expected_user_bytes);
            }
        }
        out
    }
}

fn mb(bytes: usize) -> String {
    format!("{:.2} MB", bytes as f64 / MIB as f64)
}

fn render_expected(out: &mut String, bytes: usize) {
    let _ = writeln!(out, "\n  Expected user allocation: {bytes} bytes ({})", mb(bytes));
}

fn render_bins(out: &mut String, title: &str, bins: &[BinStat]) {
    let _ = writeln!(out, "\n  {title}:");
    let _ = writeln!(out, "  {:>10}  {:>12}  {:>15}", "size", "count", "total_bytes");
    for bin in bins {
        let total = bin.total_bytes();
        if total >= MIB && bin.size % MIB == 0 {
            let _ = writeln!(
                out,
                "  {:>8}MB  {:>12}  {:>13}MB",
                bin.size / MIB,
                bin.live,
                total / MIB
            );
        } else if bin.size >= KIB && bin.size % KIB == 0 && total >= KIB {
            let _ = writeln!(
                out,
                "  {:>8}KB  {:>12}  {:>13}KB",
                bin.size / KIB,
                bin.live,
                total / KIB
            );
        } else {
            let _ = writeln!(out, "  {:>10}  {:>12}  {:>15}", bin.size, bin.live, total);
        }
    }
}
