use super::SourceFailure;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const DEFAULT_STATM_PATH: &str = "/proc/self/statm";

/// Upper bound on read attempts for interrupted reads of the counter file.
const MAX_READ_ATTEMPTS: usize = 3;

/// Outcome of one resident-memory query that is not a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResidentReading {
    Bytes(u64),
    /// The platform has no counter file; the field is left untouched.
    Unsupported,
    /// Page-size discovery failed; the field is left untouched for this sample.
    PageSizeUnknown,
}

pub trait ResidentMemorySource: Send + Sync {
    fn read_resident(&self) -> Result<ResidentReading, SourceFailure>;
}

impl<T: ResidentMemorySource + ?Sized> ResidentMemorySource for Arc<T> {
    fn read_resident(&self) -> Result<ResidentReading, SourceFailure> {
        (**self).read_resident()
    }
}

#[derive(Debug, Clone, Copy)]
enum PageSize {
    System,
    Fixed(i64),
}

/// Reads the process size from a `/proc/<pid>/statm`-style file.
///
/// Only the first whitespace-delimited integer is used; it is a page count and
/// gets multiplied by the page size discovered independently.
#[derive(Debug, Clone)]
pub struct StatmSource {
    path: PathBuf,
    platform_supported: bool,
    page_size: PageSize,
}

impl Default for StatmSource {
    fn default() -> Self {
        Self::new()
    }
}

impl StatmSource {
    pub fn new() -> Self {
        Self::at_path(DEFAULT_STATM_PATH)
    }

    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            platform_supported: cfg!(target_os = "linux"),
            page_size: PageSize::System,
        }
    }

    /// A source for a platform without the counter file convention.
    pub fn unsupported() -> Self {
        Self::at_path(DEFAULT_STATM_PATH).with_platform_support(false)
    }

    pub fn with_platform_support(mut self, supported: bool) -> Self {
        self.platform_supported = supported;
        self
    }

    /// Override page-size discovery. Non-positive values behave like a failed lookup.
    pub fn with_page_size(mut self, page_size: i64) -> Self {
        self.page_size = PageSize::Fixed(page_size);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn page_size(&self) -> i64 {
        match self.page_size {
            PageSize::System => system_page_size(),
            PageSize::Fixed(size) => size,
        }
    }
}

impl ResidentMemorySource for StatmSource {
    fn read_resident(&self) -> Result<ResidentReading, SourceFailure> {
        if !self.platform_supported {
            return Ok(ResidentReading::Unsupported);
        }
        let page_size = self.page_size();
        if page_size <= 0 {
            return Ok(ResidentReading::PageSizeUnknown);
        }
        let content = read_with_retry(&self.path).map_err(|error| SourceFailure::ResidentRead {
            path: self.path.clone(),
            error,
        })?;
        // A page count too large to express in bytes is as bad as no count.
        let bytes = parse_page_count(&content)
            .and_then(|pages| pages.checked_mul(page_size.unsigned_abs()))
            .ok_or_else(|| SourceFailure::ParseFailure {
                path: self.path.clone(),
                content: content.clone(),
            })?;
        Ok(ResidentReading::Bytes(bytes))
    }
}

/// First whitespace-delimited integer of the counter file.
pub fn parse_page_count(content: &str) -> Option<u64> {
    content.split_whitespace().next()?.parse().ok()
}

#[cfg(unix)]
pub fn system_page_size() -> i64 {
    // SAFETY: sysconf only reads a configuration value and has no side effects.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    size as i64
}

#[cfg(not(unix))]
pub fn system_page_size() -> i64 {
    -1
}

fn read_with_retry(path: &Path) -> std::io::Result<String> {
    let mut attempt = 1;
    loop {
        match std::fs::read_to_string(path) {
            Err(err)
                if matches!(err.kind(), ErrorKind::Interrupted | ErrorKind::WouldBlock)
                    && attempt < MAX_READ_ATTEMPTS =>
            {
                attempt += 1;
            }
            other => return other,
        }
    }
}
