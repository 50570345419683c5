//! Tests for the shared symbol table

use std::sync::Arc;

use crate::symbols::SymbolTable;

#[test]
fn test_intern_returns_equal_content() {
    let table = SymbolTable::new();
    let sym = table.intern("job");
    assert_eq!(&*sym, "job");
}

#[test]
fn test_intern_deduplicates() {
    let table = SymbolTable::new();
    let a = table.intern("instance");
    let b = table.intern("instance");
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(table.len(), 1);
}

#[test]
fn test_intern_distinct_strings() {
    let table = SymbolTable::new();
    let a = table.intern("foo");
    let b = table.intern("bar");
    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(table.len(), 2);
}

#[test]
fn test_is_empty() {
    let table = SymbolTable::new();
    assert!(table.is_empty());
    table.intern("x");
    assert!(!table.is_empty());
}

#[test]
fn test_interned_handle_outlives_table() {
    let sym;
    {
        let table = SymbolTable::new();
        sym = table.intern("survivor");
    }
    assert_eq!(&*sym, "survivor");
}

#[test]
fn test_concurrent_intern_is_canonical() {
    let table = Arc::new(SymbolTable::new());
    let strings: Vec<String> = (0..64).map(|i| format!("label_{i}")).collect();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let table = Arc::clone(&table);
        let strings = strings.clone();
        handles.push(std::thread::spawn(move || {
            strings
                .iter()
                .map(|s| table.intern(s))
                .collect::<Vec<Arc<str>>>()
        }));
    }

    let results: Vec<Vec<Arc<str>>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    // Every thread must have received the same canonical handle per string.
    for col in 0..strings.len() {
        let first = &results[0][col];
        for row in &results[1..] {
            assert!(Arc::ptr_eq(first, &row[col]));
        }
    }
    assert_eq!(table.len(), strings.len());
}
