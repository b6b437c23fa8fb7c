//! Property tests for the universal invariants every blob must satisfy,
//! regardless of the specific bytes or offsets involved.

use blobtree::testing::InMemoryBlockStore;
use blobtree::BlobStore;
use proptest::prelude::*;

const BLOCK_SIZE: u64 = 40; // L = 32

fn new_store() -> BlobStore<InMemoryBlockStore> {
    BlobStore::new(InMemoryBlockStore::new(BLOCK_SIZE)).expect("block size is valid")
}

proptest! {
    /// Writing bytes and reading them back at the same range always
    /// yields exactly what was written.
    #[test]
    fn round_trip(offset in 0u64..500, data in proptest::collection::vec(any::<u8>(), 0..200)) {
        let store = new_store();
        let blob = store.create().unwrap();
        blob.write(&data, offset).unwrap();

        let mut readback = vec![0u8; data.len()];
        blob.read(&mut readback, offset, data.len() as u64).unwrap();
        prop_assert_eq!(readback, data);
    }

    /// Growing a blob zero-fills every newly exposed byte.
    #[test]
    fn zero_fill_on_grow(initial in 0u64..64, grow_to in 64u64..500) {
        let store = new_store();
        let blob = store.create().unwrap();
        blob.write(&vec![0xEE; initial as usize], 0).unwrap();

        blob.resize(grow_to).unwrap();
        prop_assert_eq!(blob.size().unwrap(), grow_to);

        let mut tail = vec![0u8; (grow_to - initial) as usize];
        blob.read(&mut tail, initial, grow_to - initial).unwrap();
        prop_assert!(tail.iter().all(|&b| b == 0));
    }

    /// Shrinking a blob and growing it back never resurrects the old
    /// tail bytes: the newly exposed region reads as zero.
    #[test]
    fn shrink_truncates(full in 64u64..500, shrink_to in 0u64..64) {
        let store = new_store();
        let blob = store.create().unwrap();
        blob.write(&vec![0x42; full as usize], 0).unwrap();

        blob.resize(shrink_to).unwrap();
        prop_assert_eq!(blob.size().unwrap(), shrink_to);

        blob.resize(full).unwrap();
        let mut tail = vec![0u8; (full - shrink_to) as usize];
        blob.read(&mut tail, shrink_to, full - shrink_to).unwrap();
        prop_assert!(tail.iter().all(|&b| b == 0));
    }

    /// After a write, `size()` is at least `offset + data.len()`.
    #[test]
    fn size_after_write(offset in 0u64..500, data in proptest::collection::vec(any::<u8>(), 0..200)) {
        let store = new_store();
        let blob = store.create().unwrap();
        blob.write(&data, offset).unwrap();
        prop_assert!(blob.size().unwrap() >= offset + data.len() as u64);
    }

    /// The blob's identifier never changes across any sequence of resizes.
    #[test]
    fn identifier_stable_across_resizes(sizes in proptest::collection::vec(0u64..500, 1..10)) {
        let store = new_store();
        let blob = store.create().unwrap();
        let id = blob.id();
        for size in sizes {
            blob.resize(size).unwrap();
            prop_assert_eq!(blob.id(), id);
        }
    }

    /// Resizing to the current size changes nothing observable.
    #[test]
    fn no_op_resize_preserves_content(data in proptest::collection::vec(any::<u8>(), 1..200)) {
        let store = new_store();
        let blob = store.create().unwrap();
        blob.write(&data, 0).unwrap();
        let size = blob.size().unwrap();

        blob.resize(size).unwrap();
        prop_assert_eq!(blob.size().unwrap(), size);

        let mut readback = vec![0u8; data.len()];
        blob.read(&mut readback, 0, data.len() as u64).unwrap();
        prop_assert_eq!(readback, data);
    }
}
