//! Process-wide revision allocation
//!
//! Every snapshot minted by any hub in the process takes its revision from a
//! single counter. Revisions are strictly increasing and never reused, so a
//! revision number identifies one snapshot across all hubs.

use parking_lot::{const_mutex, Mutex};

/// Last revision handed out
static LAST_REVISION: Mutex<u64> = const_mutex(0);

/// Allocate the next revision number
pub(crate) fn next_revision() -> u64 {
    let mut last = LAST_REVISION.lock();
    *last += 1;
    *last
}

/// The most recently allocated revision (0 if none yet)
pub fn last_revision() -> u64 {
    *LAST_REVISION.lock()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;

    #[test]
    fn test_revisions_strictly_increase() {
        let a = next_revision();
        let b = next_revision();
        assert!(b > a);
        assert!(last_revision() >= b);
    }

    #[test]
    fn test_revisions_unique_across_threads() {
        let handles: Vec<_> = (0..4)
            .map(|_| thread::spawn(|| (0..100).map(|_| next_revision()).collect::<Vec<_>>()))
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for revision in handle.join().unwrap() {
                assert!(seen.insert(revision), "revision {} handed out twice", revision);
            }
        }
        assert_eq!(seen.len(), 400);
    }
}
