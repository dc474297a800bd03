use super::*;

#[test]
fn test_arena_insert_get_remove() {
    let mut arena = Arena::new();
    let a = arena.insert("a");
    let b = arena.insert("b");

    assert_eq!(arena.len(), 2);
    assert_eq!(arena.get(a), Some(&"a"));
    assert_eq!(arena.get(b), Some(&"b"));

    assert_eq!(arena.remove(a), Some("a"));
    assert_eq!(arena.remove(a), None, "double remove must be a no-op");
    assert_eq!(arena.get(a), None);
    assert_eq!(arena.len(), 1);
}

#[test]
fn test_arena_stale_handle_after_reuse() {
    let mut arena = Arena::new();
    let old = arena.insert(1u32);
    arena.remove(old);

    let new = arena.insert(2u32);
    assert_eq!(new.slot(), old.slot(), "vacant slot should be reused");
    assert_ne!(new, old);
    assert_eq!(arena.get(old), None, "stale handle must not see the new value");
    assert_eq!(arena.get(new), Some(&2));

    if let Some(v) = arena.get_mut(old) {
        *v = 3;
    }
    assert_eq!(arena.get(new), Some(&2));
}

#[test]
fn test_arena_clear_invalidates_handles() {
    let mut arena = Arena::new();
    let handles: Vec<_> = (0..4).map(|i| arena.insert(i)).collect();
    arena.clear();

    assert!(arena.is_empty());
    for h in &handles {
        assert!(!arena.contains(*h), "{h} survived clear");
    }

    let reused = arena.insert(10);
    assert!(handles.iter().all(|h| *h != reused));
    assert_eq!(arena.iter().count(), 1);
}

#[test]
fn test_arena_iter_order() {
    let mut arena = Arena::new();
    let a = arena.insert('a');
    let b = arena.insert('b');
    let c = arena.insert('c');
    arena.remove(b);

    let got: Vec<_> = arena.iter().map(|(h, v)| (h, *v)).collect();
    assert_eq!(got, vec![(a, 'a'), (c, 'c')]);

    for (_, v) in arena.iter_mut() {
        *v = v.to_ascii_uppercase();
    }
    assert_eq!(arena.get(c), Some(&'C'));
}
