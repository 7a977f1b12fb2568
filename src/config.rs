//! Address-space layout configuration.
//!
//! `BASE`, `MAX_ADDR` and the host page size together bound every virtual
//! address the manager will ever see. Callers provide `base`/`max_addr`;
//! the page size is read from the host once at [`init`](crate::init) time.

/// Describes the virtual address-space layout shared by every process the
/// manager tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddressSpaceConfig {
    /// Virtual start of the user region (inclusive).
    pub base: usize,
    /// Virtual end of the user region (inclusive).
    pub max_addr: usize,
    /// Page size, in bytes, read from the host.
    pub page_size: usize,
}

impl AddressSpaceConfig {
    /// Builds a config with the page size read from the host via
    /// `sysconf(_SC_PAGESIZE)`.
    #[must_use]
    pub fn new(base: usize, max_addr: usize) -> Self {
        Self {
            base,
            max_addr,
            page_size: host_page_size(),
        }
    }

    /// The maximum number of pages a single process may hold:
    /// `(MAX_ADDR - BASE + 1) / PAGE_SIZE`.
    #[must_use]
    pub fn max_pages(&self) -> usize {
        (self.max_addr - self.base + 1) / self.page_size
    }

    /// The virtual address of the page at `index` within a process's
    /// address space.
    #[must_use]
    pub fn vaddr_of(&self, index: usize) -> usize {
        self.base + index * self.page_size
    }
}

/// Reads the page size of the host via `sysconf(_SC_PAGESIZE)`.
///
/// # Panics
/// Panics if the host reports a non-positive page size, which would
/// indicate a broken `libc` implementation.
#[must_use]
pub fn host_page_size() -> usize {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    assert!(size > 0, "host reported a non-positive page size");
    size as usize
}
