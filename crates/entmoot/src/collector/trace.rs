//! Cycle detection over tracked Objects.
//!
//! Trial deletion: for every tracked Object, subtract the references held
//! by other tracked Objects (and the collector's own hold) from its strong
//! count. Whatever is left comes from outside the tracked graph: the module
//! table, evaluator stacks, host handles. Those Objects are roots. Marking
//! from the roots with a worklist leaves the unreachable cycles unmarked.

use std::collections::{HashMap, HashSet};

use super::Tracked;
use crate::collector::forest::Forest;
use crate::modules::ModuleTable;
use crate::object::Id;

/// Ids of tracked Objects unreachable from any root.
///
/// Must run while mutators are stopped.
pub(crate) fn unreachable(forest: &Forest<Tracked>, modules: &ModuleTable) -> HashSet<Id> {
    let objects = forest.items();
    let index: HashMap<Id, usize> = objects
        .iter()
        .enumerate()
        .map(|(slot, tracked)| (tracked.0.id(), slot))
        .collect();

    let mut internal = vec![0usize; objects.len()];
    for tracked in &objects {
        tracked.0.for_each_reference(|child| {
            if let Some(&slot) = index.get(&child.id()) {
                internal[slot] += 1;
            }
        });
    }

    let mut marked = vec![false; objects.len()];
    let mut work = Vec::new();
    for (slot, tracked) in objects.iter().enumerate() {
        // One hold is the forest's own.
        let held = tracked.0.use_count().saturating_sub(1);
        if held > internal[slot] {
            marked[slot] = true;
            work.push(slot);
        }
    }
    modules.for_each(|module| {
        if let Some(&slot) = index.get(&module.id()) {
            if !marked[slot] {
                marked[slot] = true;
                work.push(slot);
            }
        }
    });

    while let Some(slot) = work.pop() {
        objects[slot].0.for_each_reference(|child| {
            if let Some(&next) = index.get(&child.id()) {
                if !marked[next] {
                    marked[next] = true;
                    work.push(next);
                }
            }
        });
    }

    objects
        .iter()
        .zip(marked)
        .filter(|(_, marked)| !marked)
        .map(|(tracked, _)| tracked.0.id())
        .collect()
}
