//! The per-page metadata record and the protection bitflags it carries.

use bitflags::bitflags;
use typed_builder::TypedBuilder;

bitflags! {
    /// Protection of a page's current mapping. `NONE` is the empty set;
    /// `READ_WRITE` is `READ | WRITE`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Prot: u8 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
    }
}

impl Prot {
    pub const NONE: Prot = Prot::empty();
    pub const READ_WRITE: Prot = Prot::READ.union(Prot::WRITE);
}

/// Per-page metadata. `block` is assigned once at [`extend`][1]
/// time and never reassigned; `frame` is `None` while the page is
/// non-resident.
///
/// [1]: crate::extend
#[derive(TypedBuilder, Debug, Clone)]
pub struct Page {
    /// Virtual address, equal to `BASE + index * PAGE_SIZE`.
    pub vaddr: usize,

    /// Backing-store block assigned to this page for its whole lifetime.
    pub block: usize,

    /// Current physical frame, or `None` if non-resident.
    #[builder(default)]
    pub frame: Option<usize>,

    /// Current protection.
    #[builder(default = Prot::NONE)]
    pub prot: Prot,

    /// Set on a write since the page was last written to disk or first
    /// mapped. A dirty page is always resident (invariant 4).
    #[builder(default)]
    pub dirty: bool,

    /// Set once the backing block holds valid data (written back by an
    /// eviction).
    #[builder(default)]
    pub on_disk: bool,
}

impl Page {
    #[must_use]
    pub fn is_resident(&self) -> bool {
        self.frame.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prot_read_write_is_the_union() {
        assert_eq!(Prot::READ_WRITE, Prot::READ | Prot::WRITE);
        assert!(Prot::READ_WRITE.contains(Prot::READ));
        assert!(Prot::READ_WRITE.contains(Prot::WRITE));
    }

    #[test]
    fn fresh_page_is_non_resident_and_unprotected() {
        let page = Page::builder().vaddr(0x1000).block(0).build();
        assert!(!page.is_resident());
        assert_eq!(page.prot, Prot::NONE);
        assert!(!page.dirty);
        assert!(!page.on_disk);
    }
}
