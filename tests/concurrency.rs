//! Concurrent use of association memories.

use std::sync::{Arc, Mutex};
use std::thread;

use naa::prelude::*;

fn params(seed: u64) -> AssociationMemoryParams {
    AssociationMemoryParams {
        activation_threshold: 5,
        min_threshold: 3,
        max_new_synapse_count: 5,
        max_synapses_per_segment: 32,
        max_segments_per_cell: 8,
        seed,
        ..Default::default()
    }
}

fn target(id: AreaId, name: &str, seed: u64) -> AssociationMemory {
    let mut rng = Random::new(seed);
    let mut area = CorticalArea::new(id, name, 100);
    area.randomize_active_cells(0.05, &mut rng);
    AssociationMemory::new(params(seed), area).unwrap()
}

#[test]
fn test_targets_share_a_source_area() {
    let mut rng = Random::new(1);
    let mut x = CorticalArea::new(1, "X", 1024);
    x.randomize_active_cells(0.02, &mut rng);

    let mut sequential: Vec<AssociationMemory> = (2..6)
        .map(|id| target(id, "T", u64::from(id)))
        .collect();
    for memory in &mut sequential {
        for _ in 0..10 {
            memory.compute(&x, true).unwrap();
        }
    }

    let mut parallel: Vec<AssociationMemory> = (2..6)
        .map(|id| target(id, "T", u64::from(id)))
        .collect();
    thread::scope(|s| {
        for memory in &mut parallel {
            let x = &x;
            s.spawn(move || {
                for _ in 0..10 {
                    memory.compute(x, true).unwrap();
                }
            });
        }
    });

    for (a, b) in sequential.iter().zip(&parallel) {
        assert_eq!(a.area().connections(), b.area().connections());
        assert_eq!(a.active_apical_segments(None).len(), 5);
    }
}

#[test]
fn test_shared_memory_behind_mutex() {
    let memory = Arc::new(Mutex::new(target(2, "Y", 9)));
    let sources: Vec<CorticalArea> = (0..4)
        .map(|i| {
            let mut rng = Random::new(100 + i);
            let mut area = CorticalArea::new(10 + i as AreaId, format!("S{i}"), 512);
            area.randomize_active_cells(0.02, &mut rng);
            area
        })
        .collect();

    let handles: Vec<_> = sources
        .into_iter()
        .map(|source| {
            let memory = Arc::clone(&memory);
            thread::spawn(move || {
                for _ in 0..5 {
                    let mut guard = memory.lock().unwrap();
                    guard.compute(&source, true).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let memory = memory.lock().unwrap();
    assert_eq!(memory.iteration(), 20);
    memory.area().connections().check_consistency().unwrap();
    assert!(memory.active_cells_without_apical_segments().is_empty());
}
