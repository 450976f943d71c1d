//! Simulate-then-commit.
//!
//! A target's advertised space can shrink between the moment it was scanned
//! and the moment we transfer, because other nodes tick in between. So every
//! move first asks both sides what they would do without mutating, and only
//! commits the smaller of the two answers.

use tracing::warn;

use crate::access::{HandleRef, LocalStore, MeshAccess};

/// Move up to `amount` from the local store into `target`.
///
/// Returns the amount actually moved; 0 means the probe refused.
pub fn push<W: MeshAccess>(store: &mut LocalStore<'_>, world: &mut W, target: HandleRef, amount: i64) -> i64 {
    if amount <= 0 {
        return 0;
    }
    let offered = store.handle(world).extract(amount, true);
    if offered <= 0 {
        return 0;
    }
    let accepted = match world.handle_mut(target) {
        Some(sink) => sink.receive(offered, true),
        None => return 0,
    };
    if accepted <= 0 {
        return 0;
    }

    let received = match world.handle_mut(target) {
        Some(sink) => sink.receive(accepted, false),
        None => return 0,
    };
    let removed = store.handle(world).extract(received, false);
    check_balanced(store, received, removed);
    removed
}

/// Move up to `amount` from `source` into the local store.
pub fn pull<W: MeshAccess>(store: &mut LocalStore<'_>, world: &mut W, source: HandleRef, amount: i64) -> i64 {
    if amount <= 0 {
        return 0;
    }
    let available = match world.handle_mut(source) {
        Some(from) => from.extract(amount, true),
        None => return 0,
    };
    if available <= 0 {
        return 0;
    }
    let accepted = store.handle(world).receive(available, true);
    if accepted <= 0 {
        return 0;
    }

    let removed = match world.handle_mut(source) {
        Some(from) => from.extract(accepted, false),
        None => return 0,
    };
    let received = store.handle(world).receive(removed, false);
    check_balanced(store, removed, received);
    received
}

fn check_balanced(store: &LocalStore<'_>, moved_out: i64, moved_in: i64) {
    if moved_out != moved_in {
        // Only reachable if a handle mutates during simulate.
        warn!(
            position = %store.position(),
            moved_out,
            moved_in,
            "unbalanced commit"
        );
        debug_assert_eq!(moved_out, moved_in, "commit phase diverged from simulate phase");
    }
}
