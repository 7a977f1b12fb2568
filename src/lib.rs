//! A user-space demand-paging virtual-memory manager.
//!
//! The manager tracks, per process, a flat list of lazily-backed pages and
//! multiplexes a fixed pool of physical frames across every process with a
//! second-chance (clock) replacement policy. It never touches real
//! hardware: every mapping, protection change and disk transfer is driven
//! through the [`Mmu`] trait, so the policy implemented here (who gets
//! evicted, when a page is re-zeroed versus read back from disk, how
//! protection escalates on repeated faults) can be exercised against a
//! simulated address space.
//!
//! Call [`init`] once with an [`AddressSpaceConfig`] and an [`Mmu`]
//! implementation before using any other function.

mod block;
mod config;
mod error;
mod frame;
mod logger;
mod manager;
mod mmu;
mod page;
mod process;

pub use config::{host_page_size, AddressSpaceConfig};
pub use error::{ExtendError, SyslogError};
pub use manager::{create, destroy, extend, fault, init, syslog};
pub use mmu::Mmu;
pub use page::Prot;
pub use process::Pid;
