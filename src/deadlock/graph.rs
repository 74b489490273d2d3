use super::ThreadRecord;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// `waiter` is blocked on `lock`, which `owner` holds
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WaitEdge {
    pub waiter: String,
    pub owner: String,
    pub lock: String,
}

/// Wait-for graph over parsed threads.
///
/// A thread waits on at most one lock, so every node has at most one
/// outgoing edge and each cycle is a deadlock.
#[derive(Clone, Debug, Default)]
pub struct WaitGraph {
    /// Thread ids in dump order
    order: Vec<String>,
    edges: HashMap<String, WaitEdge>,
}

impl WaitGraph {
    pub fn from_threads(threads: &[ThreadRecord]) -> Self {
        let mut graph = Self::default();
        for thread in threads {
            graph.order.push(thread.id.clone());
            if let Some(lock) = &thread.waiting_on {
                graph.edges.insert(
                    thread.id.clone(),
                    WaitEdge {
                        waiter: thread.id.clone(),
                        owner: lock.owner_id.clone(),
                        lock: lock.id.clone(),
                    },
                );
            }
        }
        graph
    }

    /// Edge leaving `thread_id`, if that thread is waiting
    pub fn waits_for(&self, thread_id: &str) -> Option<&WaitEdge> {
        self.edges.get(thread_id)
    }

    /// All edges, in dump order of their waiters
    pub fn edges(&self) -> Vec<&WaitEdge> {
        self.order.iter().filter_map(|id| self.edges.get(id)).collect()
    }

    /// Every cycle once, as thread ids, rotated to start at the member that
    /// appears first in the dump.
    pub fn find_cycles(&self) -> Vec<Vec<String>> {
        let position: HashMap<&str, usize> = self
            .order
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();

        let mut visited: HashSet<&str> = HashSet::new();
        let mut cycles = Vec::new();

        for start in &self.order {
            if visited.contains(start.as_str()) {
                continue;
            }

            // Walk the single outgoing edge until the chain ends or loops
            let mut path: Vec<&str> = Vec::new();
            let mut on_path: HashMap<&str, usize> = HashMap::new();
            let mut node = start.as_str();

            loop {
                if let Some(&index) = on_path.get(node) {
                    let mut cycle: Vec<String> = path[index..].iter().map(|s| s.to_string()).collect();
                    let first = cycle
                        .iter()
                        .enumerate()
                        .min_by_key(|(_, id)| position.get(id.as_str()).copied().unwrap_or(usize::MAX))
                        .map(|(i, _)| i)
                        .unwrap_or(0);
                    cycle.rotate_left(first);
                    cycles.push(cycle);
                    break;
                }
                if visited.contains(node) || !position.contains_key(node) {
                    break;
                }

                visited.insert(node);
                on_path.insert(node, path.len());
                path.push(node);

                match self.edges.get(node) {
                    Some(edge) => node = edge.owner.as_str(),
                    None => break,
                }
            }
        }

        cycles
    }

    pub fn has_deadlock(&self) -> bool {
        !self.find_cycles().is_empty()
    }
}
