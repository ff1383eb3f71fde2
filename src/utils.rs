//! Utility functions shared by the learner

use anyhow::Result;
use std::fs;
use std::path::Path;

/// File I/O utilities
pub mod io {
    use super::*;

    /// Ensure directory exists
    pub fn ensure_dir_exists<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        if !path.exists() {
            fs::create_dir_all(path)?;
        }
        Ok(())
    }

    /// Replace `path` with the file at `staged` in a single rename
    pub fn replace_file<P: AsRef<Path>, Q: AsRef<Path>>(staged: P, path: Q) -> Result<()> {
        fs::rename(staged.as_ref(), path.as_ref())?;
        Ok(())
    }

    /// Safe file write with atomic operation
    pub fn write_file_atomic<P: AsRef<Path>>(path: P, content: &[u8]) -> Result<()> {
        let path = path.as_ref();
        let temp_path = path.with_extension("tmp");

        fs::write(&temp_path, content)?;
        replace_file(temp_path, path)
    }
}

/// Memory utilities
pub mod memory {
    /// Resident set size of this process in megabytes (10^6 bytes)
    ///
    /// Linux reads the current `VmRSS` from `/proc/self/status`. macOS has no
    /// procfs and reports the peak resident size from `getrusage`. Other
    /// platforms return `None`.
    pub fn resident_memory_mb() -> Option<f64> {
        resident_memory_bytes().map(|bytes| bytes as f64 / 1_000_000.0)
    }

    #[cfg(target_os = "linux")]
    fn resident_memory_bytes() -> Option<u64> {
        std::fs::read_to_string("/proc/self/status")
            .ok()
            .and_then(|status| parse_vm_rss(&status))
    }

    #[cfg(target_os = "macos")]
    fn resident_memory_bytes() -> Option<u64> {
        // SAFETY: `rusage` is plain data, so a zeroed value is valid, and
        // getrusage only writes into the struct it is handed.
        unsafe {
            let mut usage: sys::rusage = std::mem::zeroed();
            if sys::getrusage(sys::RUSAGE_SELF, &mut usage) != 0 {
                return None;
            }
            // bytes on macOS
            u64::try_from(usage.ru_maxrss).ok()
        }
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    fn resident_memory_bytes() -> Option<u64> {
        None
    }

    #[cfg(target_os = "macos")]
    mod sys {
        #[repr(C)]
        #[derive(Debug, Copy, Clone)]
        pub struct timeval {
            pub tv_sec: i64,
            pub tv_usec: i32,
        }

        #[repr(C)]
        #[derive(Debug, Copy, Clone)]
        pub struct rusage {
            pub ru_utime: timeval,
            pub ru_stime: timeval,
            pub ru_maxrss: i64,
            pub ru_ixrss: i64,
            pub ru_idrss: i64,
            pub ru_isrss: i64,
            pub ru_minflt: i64,
            pub ru_majflt: i64,
            pub ru_nswap: i64,
            pub ru_inblock: i64,
            pub ru_oublock: i64,
            pub ru_msgsnd: i64,
            pub ru_msgrcv: i64,
            pub ru_nsignals: i64,
            pub ru_nvcsw: i64,
            pub ru_nivcsw: i64,
        }

        pub const RUSAGE_SELF: i32 = 0;

        extern "C" {
            pub fn getrusage(who: i32, usage: *mut rusage) -> i32;
        }
    }

    /// Extract `VmRSS` from a procfs status dump, in bytes
    #[cfg_attr(not(target_os = "linux"), allow(dead_code))]
    pub(crate) fn parse_vm_rss(status: &str) -> Option<u64> {
        status
            .lines()
            .find(|line| line.starts_with("VmRSS:"))
            .and_then(|line| line.split_whitespace().nth(1))
            .and_then(|kb| kb.parse::<u64>().ok())
            .map(|kb| kb * 1024)
    }
}

/// Performance timing utilities
pub mod timing {
    use std::time::{Duration, Instant};

    /// Simple timer for measuring performance
    pub struct Timer {
        start: Instant,
        name: String,
    }

    impl Timer {
        /// Start a new timer
        pub fn new(name: impl Into<String>) -> Self {
            Self {
                start: Instant::now(),
                name: name.into(),
            }
        }

        /// Get elapsed time
        pub fn elapsed(&self) -> Duration {
            self.start.elapsed()
        }

        /// Get elapsed time in seconds
        pub fn elapsed_secs(&self) -> f64 {
            self.elapsed().as_secs_f64()
        }

        /// Stop timer and log result
        pub fn stop(self) -> Duration {
            let elapsed = self.elapsed();
            tracing::debug!("Timer '{}' elapsed: {:.4}s", self.name, elapsed.as_secs_f64());
            elapsed
        }
    }
}
