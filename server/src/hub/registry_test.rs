use super::*;

fn sender() -> (EventSender, mpsc::Receiver<Arc<BroadcastEvent>>) {
    mpsc::channel(4)
}

#[test]
fn register_assigns_distinct_ids_per_connection() {
    let registry = ConnectionRegistry::new();
    let board_id = Uuid::new_v4();
    let (tx, _rx) = sender();

    let a = registry.register(board_id, tx.clone());
    let b = registry.register(board_id, tx);
    assert_ne!(a, b);
    assert_eq!(registry.connection_count(board_id), 2);
}

#[test]
fn unregister_is_idempotent() {
    let registry = ConnectionRegistry::new();
    let board_id = Uuid::new_v4();
    let (tx, _rx) = sender();
    let id = registry.register(board_id, tx);

    assert!(registry.unregister(board_id, id));
    assert!(!registry.unregister(board_id, id));
    assert!(!registry.unregister(Uuid::new_v4(), id));
}

#[test]
fn empty_board_entry_is_pruned() {
    let registry = ConnectionRegistry::new();
    let board_id = Uuid::new_v4();
    let (tx, _rx) = sender();
    let id = registry.register(board_id, tx);
    assert_eq!(registry.board_ids(), vec![board_id]);

    registry.unregister(board_id, id);
    assert!(registry.board_ids().is_empty());
    assert_eq!(registry.total_connections(), 0);
}

#[test]
fn register_after_prune_creates_fresh_entry() {
    let registry = ConnectionRegistry::new();
    let board_id = Uuid::new_v4();
    let (tx, _rx) = sender();
    let first = registry.register(board_id, tx.clone());
    registry.unregister(board_id, first);

    registry.register(board_id, tx);
    assert_eq!(registry.connection_count(board_id), 1);
}

#[test]
fn boards_are_isolated() {
    let registry = ConnectionRegistry::new();
    let board_a = Uuid::new_v4();
    let board_b = Uuid::new_v4();
    let (tx, _rx) = sender();
    let a = registry.register(board_a, tx.clone());
    registry.register(board_b, tx);

    // Unregistering under the wrong board does nothing.
    assert!(!registry.unregister(board_b, a));
    assert_eq!(registry.connection_count(board_a), 1);
    assert_eq!(registry.total_connections(), 2);
}

#[test]
fn with_board_prunes_when_closure_empties_set() {
    let registry = ConnectionRegistry::new();
    let board_id = Uuid::new_v4();
    let (tx, _rx) = sender();
    let id = registry.register(board_id, tx);

    let removed = registry.with_board(board_id, |conns| conns.remove(id).is_some());
    assert_eq!(removed, Some(true));
    assert!(registry.board_ids().is_empty());
    assert_eq!(registry.with_board(board_id, |conns| conns.len()), None);
}

#[test]
fn concurrent_register_and_unregister_leave_consistent_count() {
    let registry = Arc::new(ConnectionRegistry::new());
    let board_id = Uuid::new_v4();
    let (tx, _rx) = mpsc::channel(1);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let registry = Arc::clone(&registry);
            let tx: EventSender = tx.clone();
            std::thread::spawn(move || {
                for _ in 0..50 {
                    let id = registry.register(board_id, tx.clone());
                    assert!(registry.unregister(board_id, id));
                }
                registry.register(board_id, tx)
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("worker thread");
    }
    assert_eq!(registry.connection_count(board_id), 8);
}
