#![allow(missing_docs)]

use std::{collections::HashSet, sync::Arc, thread};

use imagegear::naming::{allocate, base_name};

#[test]
fn parallel_allocations_of_one_name_never_collide() {
    const THREADS: usize = 128;
    let barrier = Arc::new(std::sync::Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                allocate("holiday photo.jpg")
            })
        })
        .collect();

    let names: HashSet<String> = handles
        .into_iter()
        .map(|handle| handle.join().expect("allocation thread panicked"))
        .collect();
    assert_eq!(names.len(), THREADS);
    assert!(names.iter().all(|name| name.ends_with("-holiday_photo.jpg")));
}

#[test]
fn traversal_input_yields_a_plain_name() {
    for input in [
        "../../etc/passwd",
        "..\\..\\windows\\system32\\config",
        "/absolute/path/.png",
        "....//....//x.gif",
        "..",
        "",
    ] {
        let name = allocate(input);
        assert!(!name.contains('/'), "{input:?} -> {name}");
        assert!(!name.contains('\\'), "{input:?} -> {name}");
        assert!(!name.contains(".."), "{input:?} -> {name}");
        assert_eq!(base_name(&name), Some(name.as_str()));
    }
}
