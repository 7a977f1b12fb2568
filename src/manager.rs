//! The Lifecycle Coordinator, Fault Handler and Replacement Engine: the
//! single global lock that every public operation runs behind.
//!
//! One lazily-initialized, mutex-guarded global singleton owns every piece
//! of mutable state: the process table, the frame table, the block
//! allocator and the `Mmu` handle. `std::sync::OnceLock` provides the lazy
//! init, `std::sync::Mutex` the single process-wide lock.

use std::sync::{Mutex, OnceLock};

use crate::block::BlockAllocator;
use crate::config::AddressSpaceConfig;
use crate::error::{ExtendError, SyslogError};
use crate::frame::FrameTable;
use crate::logger;
use crate::mmu::Mmu;
use crate::page::{Page, Prot};
use crate::process::{Pid, ProcessTable};

struct State {
    processes: ProcessTable,
    frames: FrameTable,
    blocks: BlockAllocator,
    mmu: Box<dyn Mmu>,
}

/// The manager singleton. Holds the (immutable, once-set) address-space
/// configuration plus a single mutex guarding every table and the `Mmu`
/// handle; that mutex serializes all state mutations and MMU calls.
struct Pager {
    config: AddressSpaceConfig,
    state: Mutex<State>,
}

static PAGER: OnceLock<Pager> = OnceLock::new();

fn pager() -> &'static Pager {
    PAGER
        .get()
        .expect("pager::init must be called before any other pager operation")
}

/// Initializes the manager. Must be called exactly once before
/// any other operation.
///
/// # Panics
/// Panics if called more than once.
pub fn init(config: AddressSpaceConfig, nframes: usize, nblocks: usize, mmu: impl Mmu + 'static) {
    logger::install();

    let pager = Pager {
        config,
        state: Mutex::new(State {
            processes: ProcessTable::new(),
            frames: FrameTable::new(nframes),
            blocks: BlockAllocator::new(nblocks),
            mmu: Box::new(mmu),
        }),
    };

    if PAGER.set(pager).is_err() {
        panic!("pager::init called more than once");
    }

    log::info!(
        "pager initialized: {nframes} frames, {nblocks} blocks, page size {}",
        config.page_size
    );
}

/// Registers a new process with an empty page list.
pub fn create(pid: Pid) {
    let pager = pager();
    let mut state = pager.state.lock().unwrap_or_else(|e| e.into_inner());
    state.processes.create(pid);
    log::debug!("process {pid} created");
}

/// Reserves the next page of `pid`'s address space.
pub fn extend(pid: Pid) -> Result<usize, ExtendError> {
    let pager = pager();
    let mut state = pager.state.lock().unwrap_or_else(|e| e.into_inner());
    state.extend(pid, &pager.config)
}

/// Handles a page fault delivered for `(pid, addr)`.
pub fn fault(pid: Pid, addr: usize) {
    let pager = pager();
    let mut state = pager.state.lock().unwrap_or_else(|e| e.into_inner());
    state.fault(pid, addr, &pager.config);
}

/// Hex-dumps `len` bytes starting at `addr` from `pid`'s reserved range.
/// Returns the formatted, already-terminated output on success so the
/// caller can print it after releasing the lock.
pub fn syslog(pid: Pid, addr: usize, len: usize) -> Result<String, SyslogError> {
    let pager = pager();
    let bytes = {
        let mut state = pager.state.lock().unwrap_or_else(|e| e.into_inner());
        state.syslog(pid, addr, len, &pager.config)?
    };

    let mut out = String::with_capacity(bytes.len() * 2 + 1);
    for byte in &bytes {
        use std::fmt::Write as _;
        let _ = write!(out, "{byte:02x}");
    }
    if !bytes.is_empty() {
        out.push('\n');
    }
    Ok(out)
}

/// Releases every resource held by `pid`. A no-op if the
/// process is unknown.
pub fn destroy(pid: Pid) {
    let pager = pager();
    let mut state = pager.state.lock().unwrap_or_else(|e| e.into_inner());
    state.destroy(pid);
}

impl State {
    fn extend(&mut self, pid: Pid, config: &AddressSpaceConfig) -> Result<usize, ExtendError> {
        if !self.processes.contains(pid) {
            return Err(ExtendError::UnknownProcess);
        }

        let block = self.blocks.claim().ok_or(ExtendError::OutOfSpace)?;

        let process = self
            .processes
            .find_mut(pid)
            .expect("checked contains() above");
        if process.npages() >= config.max_pages() {
            // Tentative block claimed but the process is already full: no
            // partial side effects survive a failed extend.
            self.blocks.release(block);
            return Err(ExtendError::OutOfSpace);
        }

        let index = process.npages();
        let vaddr = config.vaddr_of(index);
        process.push_page(Page::builder().vaddr(vaddr).block(block).build());

        log::debug!("pid {pid}: extended with page {index} at {vaddr:#x} (block {block})");
        Ok(vaddr)
    }

    fn fault(&mut self, pid: Pid, addr: usize, config: &AddressSpaceConfig) {
        let Some(page_index) = self.resolve(pid, addr, config) else {
            return;
        };

        let frame = self
            .processes
            .find(pid)
            .and_then(|p| p.page(page_index))
            .and_then(|p| p.frame);

        match frame {
            Some(frame) => {
                // Resident fault: a protection fault.
                self.upgrade_protection(pid, page_index, frame);
            }
            None => {
                let frame = self.obtain_frame();
                self.map_page(pid, page_index, frame);
                log::trace!("pid {pid}: paged in page {page_index} into frame {frame}");
            }
        }
    }

    fn syslog(
        &mut self,
        pid: Pid,
        addr: usize,
        len: usize,
        config: &AddressSpaceConfig,
    ) -> Result<Vec<u8>, SyslogError> {
        let Some(process) = self.processes.find(pid) else {
            return Err(SyslogError::UnknownProcess);
        };

        let reserved_end = config.base + process.npages() * config.page_size;
        let in_range = addr >= config.base
            && addr
                .checked_add(len)
                .is_some_and(|end| end <= reserved_end);
        if !in_range {
            return Err(SyslogError::InvalidArgument);
        }

        if len == 0 {
            return Ok(Vec::new());
        }

        let mut out = Vec::with_capacity(len);
        let mut cursor = addr;
        let end = addr + len;

        while cursor < end {
            let page_index = (cursor - config.base) / config.page_size;
            let page_vaddr = config.vaddr_of(page_index);
            let page_end = page_vaddr + config.page_size;
            let chunk_end = end.min(page_end);

            let frame = self.touch_for_read(pid, page_index);

            let page_size = config.page_size;
            let pmem = self.mmu.pmem();
            for vaddr in cursor..chunk_end {
                let offset = vaddr - page_vaddr;
                out.push(pmem[frame * page_size + offset]);
            }

            cursor = chunk_end;
        }

        Ok(out)
    }

    fn destroy(&mut self, pid: Pid) {
        let Some(process) = self.processes.remove(pid) else {
            return;
        };

        for page in process.pages() {
            if let Some(frame) = page.frame {
                self.frames.clear(frame);
            }
            self.blocks.release(page.block);
        }

        log::debug!(
            "pid {pid}: destroyed, released {} page(s)",
            process.npages()
        );
    }

    /// Resolves `(pid, addr)` to a page index, or `None` on the silent
    /// no-op conditions (unknown pid, out-of-range index).
    fn resolve(&self, pid: Pid, addr: usize, config: &AddressSpaceConfig) -> Option<usize> {
        let process = self.processes.find(pid)?;
        let offset = addr.checked_sub(config.base)?;
        let page_index = offset / config.page_size;
        (page_index < process.npages()).then_some(page_index)
    }

    /// Protection-upgrade sub-machine for a resident fault.
    fn upgrade_protection(&mut self, pid: Pid, page_index: usize, frame: usize) {
        let page = self
            .processes
            .find_mut(pid)
            .and_then(|p| p.page_mut(page_index))
            .expect("resolved page must exist");

        let new_prot = if page.prot == Prot::NONE {
            // Ambiguous: could be a read or a write. Restore READ (or
            // READ_WRITE if a prior writer had already dirtied the page)
            // and let a genuine write re-fault to upgrade.
            if page.dirty {
                Prot::READ_WRITE
            } else {
                Prot::READ
            }
        } else {
            // prot = READ ⇒ this must be a write (a READ mapping cannot
            // trap on a read). prot = READ_WRITE ⇒ idempotent, still a
            // write. Either way the page becomes dirty.
            page.dirty = true;
            Prot::READ_WRITE
        };

        page.prot = new_prot;
        let vaddr = page.vaddr;
        self.mmu.chprot(pid, vaddr, new_prot);
        self.frames.set_referenced(frame, true);
    }

    /// Ensures `(pid, page_index)` is resident with at least read access,
    /// without treating the access as a write. Used only by
    /// the diagnostic reader.
    fn touch_for_read(&mut self, pid: Pid, page_index: usize) -> usize {
        let frame = self
            .processes
            .find(pid)
            .and_then(|p| p.page(page_index))
            .and_then(|p| p.frame);

        match frame {
            Some(frame) => {
                let page = self
                    .processes
                    .find_mut(pid)
                    .and_then(|p| p.page_mut(page_index))
                    .expect("resolved page must exist");

                if page.prot == Prot::NONE {
                    let new_prot = if page.dirty { Prot::READ_WRITE } else { Prot::READ };
                    page.prot = new_prot;
                    let vaddr = page.vaddr;
                    self.mmu.chprot(pid, vaddr, new_prot);
                }

                self.frames.set_referenced(frame, true);
                frame
            }
            None => {
                let frame = self.obtain_frame();
                self.map_page(pid, page_index, frame);
                frame
            }
        }
    }

    /// Maps `(pid, page_index)` into `frame`.
    fn map_page(&mut self, pid: Pid, page_index: usize, frame: usize) {
        let page = self
            .processes
            .find_mut(pid)
            .and_then(|p| p.page_mut(page_index))
            .expect("resolved page must exist");

        if page.on_disk {
            self.mmu.disk_read(page.block, frame);
        } else {
            self.mmu.zero_fill(frame);
        }

        page.frame = Some(frame);
        page.prot = Prot::READ;
        page.dirty = false;
        let vaddr = page.vaddr;

        self.mmu.resident(pid, vaddr, frame, Prot::READ);
        self.frames.occupy(frame, pid, page_index);

        // Don't immediately revisit the slot we just filled.
        let next = (frame + 1) % self.frames.len();
        self.frames.set_hand(next);
    }

    /// Second-chance replacement engine.
    fn obtain_frame(&mut self) -> usize {
        if let Some(free) = self.frames.find_free() {
            return free;
        }

        let bound = 2 * self.frames.len();
        for _ in 0..bound {
            let hand = self.frames.hand();
            let record = self.frames.get(hand);

            if !record.in_use {
                self.frames.advance_hand();
                return hand;
            }

            let (owner_pid, page_index) = record
                .owner
                .expect("an in-use frame always records its owner");

            let owner_page_exists = self
                .processes
                .find(owner_pid)
                .is_some_and(|p| page_index < p.npages());

            if !owner_page_exists {
                // Defensive: the owner vanished without clearing the frame.
                self.frames.clear(hand);
                self.frames.advance_hand();
                return hand;
            }

            if record.referenced {
                let vaddr = self
                    .processes
                    .find(owner_pid)
                    .and_then(|p| p.page(page_index))
                    .expect("owner page exists")
                    .vaddr;

                self.mmu.chprot(owner_pid, vaddr, Prot::NONE);

                let page = self
                    .processes
                    .find_mut(owner_pid)
                    .and_then(|p| p.page_mut(page_index))
                    .expect("owner page exists");
                page.prot = Prot::NONE;

                self.frames.set_referenced(hand, false);
                self.frames.advance_hand();
                continue;
            }

            // Evict.
            let page = self
                .processes
                .find_mut(owner_pid)
                .and_then(|p| p.page_mut(page_index))
                .expect("owner page exists");
            let vaddr = page.vaddr;
            let block = page.block;
            let dirty = page.dirty;

            self.mmu.nonresident(owner_pid, vaddr);
            if dirty {
                self.mmu.disk_write(hand, block);
                page.dirty = false;
                page.on_disk = true;
            }
            page.frame = None;
            page.prot = Prot::NONE;

            self.frames.clear(hand);
            self.frames.advance_hand();
            return hand;
        }

        unreachable!(
            "second-chance replacement must evict within 2 * nframes steps"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::UnsafeCell;

    /// A simulated MMU: physical memory is a flat byte buffer. `pmem`
    /// needs no internal locking of its own. [`Mmu`]'s contract already
    /// requires every call to happen while the manager holds its global
    /// lock, so the tests below never call a `MockMmu` method concurrently
    /// with another.
    struct MockMmu {
        pmem: UnsafeCell<Vec<u8>>,
        page_size: usize,
    }

    impl MockMmu {
        fn new(nframes: usize, page_size: usize) -> Self {
            Self {
                pmem: UnsafeCell::new(vec![0u8; nframes * page_size]),
                page_size,
            }
        }

        fn pmem_mut(&self) -> &mut [u8] {
            unsafe { &mut *self.pmem.get() }
        }
    }

    impl Mmu for MockMmu {
        fn resident(&self, _pid: Pid, _vaddr: usize, _frame: usize, _prot: Prot) {}

        fn nonresident(&self, _pid: Pid, _vaddr: usize) {}

        fn chprot(&self, _pid: Pid, _vaddr: usize, _prot: Prot) {}

        fn zero_fill(&self, frame: usize) {
            let start = frame * self.page_size;
            self.pmem_mut()[start..start + self.page_size].fill(0);
        }

        fn disk_read(&self, block: usize, frame: usize) {
            let start = frame * self.page_size;
            // The mock disk stores byte `block` repeated across the page,
            // so a read-back is distinguishable from a zero-fill.
            self.pmem_mut()[start..start + self.page_size].fill(block as u8 + 1);
        }

        fn disk_write(&self, _frame: usize, _block: usize) {}

        fn pmem(&self) -> &[u8] {
            unsafe { &*self.pmem.get() }
        }
    }

    fn test_state(
        nframes: usize,
        nblocks: usize,
        page_size: usize,
    ) -> (State, AddressSpaceConfig) {
        let config = AddressSpaceConfig {
            base: 0x1000,
            max_addr: 0x1000 + nblocks * page_size - 1,
            page_size,
        };
        let state = State {
            processes: ProcessTable::new(),
            frames: FrameTable::new(nframes),
            blocks: BlockAllocator::new(nblocks),
            mmu: Box::new(MockMmu::new(nframes, page_size)),
        };
        (state, config)
    }

    #[test]
    fn first_touch_zero_fills_and_maps_read_only() {
        let (mut state, config) = test_state(4, 4, 64);
        state.processes.create(1);
        let vaddr = state.extend(1, &config).unwrap();

        state.fault(1, vaddr, &config);

        let page = state.processes.find(1).unwrap().page(0).unwrap();
        assert!(page.is_resident());
        assert_eq!(page.prot, Prot::READ);
        assert!(!page.dirty);
    }

    #[test]
    fn write_fault_upgrades_to_read_write_and_marks_dirty() {
        let (mut state, config) = test_state(4, 4, 64);
        state.processes.create(1);
        let vaddr = state.extend(1, &config).unwrap();

        state.fault(1, vaddr, &config); // first touch: READ
        state.fault(1, vaddr, &config); // write fault: upgrade

        let page = state.processes.find(1).unwrap().page(0).unwrap();
        assert_eq!(page.prot, Prot::READ_WRITE);
        assert!(page.dirty);
    }

    #[test]
    fn second_chance_spares_a_referenced_frame_once() {
        let (mut state, config) = test_state(1, 2, 64);
        state.processes.create(1);
        let a = state.extend(1, &config).unwrap();
        let b = state.extend(1, &config).unwrap();

        state.fault(1, a, &config); // occupies the only frame
        // Faulting on b forces the engine to consider evicting page a's
        // frame. Its referenced bit is set, so the first pass downgrades
        // it to NONE instead of evicting it outright.
        state.fault(1, b, &config);

        let page_a = state.processes.find(1).unwrap().page(0).unwrap();
        assert!(!page_a.is_resident());
        assert_eq!(page_a.prot, Prot::NONE);

        let page_b = state.processes.find(1).unwrap().page(1).unwrap();
        assert!(page_b.is_resident());
    }

    #[test]
    fn dirty_page_is_written_back_before_eviction() {
        let (mut state, config) = test_state(1, 2, 64);
        state.processes.create(1);
        let a = state.extend(1, &config).unwrap();
        let b = state.extend(1, &config).unwrap();

        state.fault(1, a, &config);
        state.fault(1, a, &config); // write fault: dirty = true

        // With a single frame, faulting on b must evict a. Its referenced
        // bit is set, so the clock gives it one extra pass before
        // reclaiming the same slot. `on_disk` only ever becomes true on
        // the dirty branch of eviction, so this is sufficient evidence a
        // write-back happened rather than a silent drop.
        state.fault(1, b, &config);

        assert!(state.processes.find(1).unwrap().page(0).unwrap().on_disk);

        let page_b = state.processes.find(1).unwrap().page(1).unwrap();
        assert!(page_b.is_resident());
    }

    #[test]
    fn extend_on_unknown_process_claims_no_block() {
        let (mut state, config) = test_state(2, 2, 64);
        assert_eq!(state.extend(99, &config), Err(ExtendError::UnknownProcess));
        assert_eq!(state.blocks.in_use(), 0);
    }

    #[test]
    fn extend_releases_its_block_when_the_process_is_already_full() {
        // More blocks than a process may ever use (max_pages = 1), so the
        // second extend claims a block before discovering the process is
        // full and must release it again.
        let (mut state, _discard) = test_state(2, 2, 64);
        let config = AddressSpaceConfig {
            base: 0x1000,
            max_addr: 0x1000 + 64 - 1,
            page_size: 64,
        };
        state.processes.create(1);

        assert!(state.extend(1, &config).is_ok());
        assert_eq!(state.blocks.in_use(), 1);

        assert_eq!(state.extend(1, &config), Err(ExtendError::OutOfSpace));
        assert_eq!(state.blocks.in_use(), 1);
    }

    #[test]
    fn destroy_releases_frames_and_blocks() {
        let (mut state, config) = test_state(2, 2, 64);
        state.processes.create(1);
        let vaddr = state.extend(1, &config).unwrap();
        state.fault(1, vaddr, &config);
        assert_eq!(state.blocks.in_use(), 1);

        state.destroy(1);

        assert!(!state.processes.contains(1));
        assert_eq!(state.blocks.in_use(), 0);
        assert!(state.frames.find_free().is_some());
    }

    #[test]
    fn destroy_unknown_pid_is_a_no_op() {
        let (mut state, _config) = test_state(2, 2, 64);
        state.destroy(42); // must not panic
    }

    #[test]
    fn fault_on_unknown_pid_or_out_of_range_index_is_a_silent_no_op() {
        let (mut state, config) = test_state(2, 2, 64);
        state.processes.create(1);
        state.fault(99, config.base, &config); // unknown pid
        state.fault(1, config.base, &config); // no pages yet: out of range
        assert!(!state.processes.find(1).unwrap().pages().iter().any(Page::is_resident));
    }

    #[test]
    fn syslog_rejects_a_range_outside_the_reserved_area() {
        let (mut state, config) = test_state(2, 2, 64);
        state.processes.create(1);
        let vaddr = state.extend(1, &config).unwrap();

        assert_eq!(
            state.syslog(1, vaddr, 128, &config),
            Err(SyslogError::InvalidArgument)
        );
        assert_eq!(
            state.syslog(99, vaddr, 1, &config),
            Err(SyslogError::UnknownProcess)
        );
    }

    #[test]
    fn syslog_of_zero_length_succeeds_with_no_bytes() {
        let (mut state, config) = test_state(2, 2, 64);
        state.processes.create(1);
        let vaddr = state.extend(1, &config).unwrap();

        assert_eq!(state.syslog(1, vaddr, 0, &config), Ok(Vec::new()));
    }

    #[test]
    fn syslog_forces_residency_and_reads_through_pmem() {
        let (mut state, config) = test_state(2, 2, 64);
        state.processes.create(1);
        let vaddr = state.extend(1, &config).unwrap();

        // Page is non-resident; syslog must page it in itself.
        let bytes = state.syslog(1, vaddr, 4, &config).unwrap();
        assert_eq!(bytes.len(), 4);
        assert!(state.processes.find(1).unwrap().page(0).unwrap().is_resident());
    }

    #[test]
    fn syslog_does_not_treat_the_access_as_a_write() {
        let (mut state, config) = test_state(2, 2, 64);
        state.processes.create(1);
        let vaddr = state.extend(1, &config).unwrap();

        state.syslog(1, vaddr, 1, &config).unwrap();

        let page = state.processes.find(1).unwrap().page(0).unwrap();
        assert_eq!(page.prot, Prot::READ);
        assert!(!page.dirty);
    }
}
