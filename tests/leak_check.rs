use acid_map::AcidMap;

mod alloc {
    use std::alloc::{Layout, System};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[global_allocator]
    static ALLOCATOR: Alloc = Alloc;

    static RESIDENT: AtomicUsize = AtomicUsize::new(0);

    pub fn resident() -> usize {
        RESIDENT.load(Ordering::Relaxed) / 1_000_000
    }

    #[derive(Default, Debug, Clone, Copy)]
    struct Alloc;

    unsafe impl std::alloc::GlobalAlloc for Alloc {
        unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
            let ret = System.alloc(layout);
            assert_ne!(
                ret,
                std::ptr::null_mut(),
                "alloc returned null pointer for layout {layout:?}"
            );
            RESIDENT.fetch_add(layout.size(), Ordering::Relaxed);
            std::ptr::write_bytes(ret, 0xa1, layout.size());
            ret
        }

        unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
            std::ptr::write_bytes(ptr, 0xde, layout.size());
            RESIDENT.fetch_sub(layout.size(), Ordering::Relaxed);
            System.dealloc(ptr, layout)
        }
    }
}

#[test]
fn leak_check() {
    let n: u64 = 16 * 1024;

    let resident_before = alloc::resident();

    for _ in 0..64 {
        let map = AcidMap::new();

        for i in 0..n {
            map.insert(i, i);
        }

        // a cursor in the middle turns half the removals below into a
        // tombstone chain hanging off it
        let mut cur = map.find(&(n / 2));

        for i in 0..n {
            assert_eq!(map.remove(&i), Some(i));
        }
        assert!(map.is_empty());

        assert!(cur.is_removed());
        assert_eq!(cur.entry(), Some((n / 2, n / 2)));
        cur.move_next();
        assert!(cur.is_end());

        // a second round reclaimed through cursor drop rather than
        // through advancing
        for i in 0..n {
            map.insert(i, i);
        }
        let held = map.find(&0);
        map.clear();
        assert_eq!(held.entry(), Some((0, 0)));
        drop(held);
        drop(cur);
        drop(map);
    }

    let resident_after = alloc::resident();

    assert_eq!(
        resident_after, resident_before,
        "leaked {} mb",
        resident_after.saturating_sub(resident_before)
    );
}
