//! Process Descriptor and Process Table.

use crate::page::Page;
use std::collections::HashMap;

/// Process identifier. A bare `i32` (mirroring `pid_t`) rather than a
/// newtype: the manager never interprets it beyond equality and hashing.
pub type Pid = i32;

/// A process's pages, in allocation order. Page `i` lives at virtual
/// address `BASE + i * PAGE_SIZE`. This indexed shape gives O(1)
/// address-to-page lookup, and extension only ever appends.
#[derive(Debug, Default)]
pub struct Process {
    pages: Vec<Page>,
}

impl Process {
    #[must_use]
    pub fn npages(&self) -> usize {
        self.pages.len()
    }

    #[must_use]
    pub fn page(&self, index: usize) -> Option<&Page> {
        self.pages.get(index)
    }

    #[must_use]
    pub fn page_mut(&mut self, index: usize) -> Option<&mut Page> {
        self.pages.get_mut(index)
    }

    pub fn push_page(&mut self, page: Page) -> usize {
        self.pages.push(page);
        self.pages.len() - 1
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }
}

/// Maps process ids to their page lists.
#[derive(Debug, Default)]
pub struct ProcessTable {
    processes: HashMap<Pid, Process>,
}

impl ProcessTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new process with an empty page list. Behavior on a
    /// duplicate pid is undefined by contract: the caller guarantees
    /// uniqueness.
    pub fn create(&mut self, pid: Pid) {
        self.processes.insert(pid, Process::default());
    }

    #[must_use]
    pub fn find(&self, pid: Pid) -> Option<&Process> {
        self.processes.get(&pid)
    }

    #[must_use]
    pub fn find_mut(&mut self, pid: Pid) -> Option<&mut Process> {
        self.processes.get_mut(&pid)
    }

    /// Removes and returns the process, or `None` if it was already absent
    /// (`destroy` is a no-op on an unknown pid).
    pub fn remove(&mut self, pid: Pid) -> Option<Process> {
        self.processes.remove(&pid)
    }

    #[must_use]
    pub fn contains(&self, pid: Pid) -> bool {
        self.processes.contains_key(&pid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::Page;

    #[test]
    fn create_then_find_round_trips() {
        let mut table = ProcessTable::new();
        table.create(10);
        assert!(table.find(10).is_some());
        assert!(table.find(11).is_none());
    }

    #[test]
    fn destroy_unknown_pid_is_a_no_op() {
        let mut table = ProcessTable::new();
        assert!(table.remove(42).is_none());
    }

    #[test]
    fn pages_append_in_order() {
        let mut table = ProcessTable::new();
        table.create(10);
        let proc = table.find_mut(10).unwrap();
        let a = proc.push_page(Page::builder().vaddr(0x1000).block(0).build());
        let b = proc.push_page(Page::builder().vaddr(0x2000).block(1).build());
        assert_eq!(a, 0);
        assert_eq!(b, 1);
        assert_eq!(proc.npages(), 2);
    }
}
