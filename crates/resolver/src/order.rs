//! Topological levels over a dependency map.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

/// Assigns each node its level (`0` without dependencies, otherwise one more
/// than its deepest dependency) using Kahn's algorithm.
///
/// `deps` maps every node to the nodes it depends on; dependencies outside
/// the key set are ignored. On a cycle, returns every node that lies on one
/// (nodes merely downstream of a cycle are not included).
pub(crate) fn levels(deps: &BTreeMap<usize, Vec<usize>>) -> Result<HashMap<usize, usize>, Vec<usize>> {
    let mut waiting: HashMap<usize, usize> = HashMap::with_capacity(deps.len());
    let mut dependents: HashMap<usize, Vec<usize>> = HashMap::new();
    for (&node, node_deps) in deps {
        let inside: BTreeSet<usize> = node_deps
            .iter()
            .copied()
            .filter(|d| deps.contains_key(d))
            .collect();
        for &dep in &inside {
            dependents.entry(dep).or_default().push(node);
        }
        waiting.insert(node, inside.len());
    }

    let mut level: HashMap<usize, usize> = HashMap::with_capacity(deps.len());
    let mut ready: VecDeque<usize> = deps
        .keys()
        .copied()
        .filter(|n| waiting[n] == 0)
        .collect();
    for &node in &ready {
        level.insert(node, 0);
    }

    while let Some(node) = ready.pop_front() {
        let next = level[&node] + 1;
        for &dependent in dependents.get(&node).map(Vec::as_slice).unwrap_or_default() {
            let entry = level.entry(dependent).or_insert(0);
            *entry = (*entry).max(next);
            if let Some(count) = waiting.get_mut(&dependent) {
                *count -= 1;
                if *count == 0 {
                    ready.push_back(dependent);
                }
            }
        }
    }

    if waiting.values().all(|&count| count == 0) {
        return Ok(level);
    }

    let stuck: BTreeSet<usize> = waiting
        .iter()
        .filter(|&(_, &count)| count > 0)
        .map(|(&node, _)| node)
        .collect();
    Err(stuck
        .iter()
        .copied()
        .filter(|&node| reaches(deps, &stuck, node, node))
        .collect())
}

/// Whether `target` is reachable from `from` through at least one edge,
/// walking only nodes in `within`.
fn reaches(
    deps: &BTreeMap<usize, Vec<usize>>,
    within: &BTreeSet<usize>,
    from: usize,
    target: usize,
) -> bool {
    let mut seen = BTreeSet::new();
    let mut stack: Vec<usize> = deps[&from].clone();
    while let Some(node) = stack.pop() {
        if node == target {
            return true;
        }
        if !within.contains(&node) || !seen.insert(node) {
            continue;
        }
        stack.extend(deps[&node].iter().copied());
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn graph(edges: &[(usize, &[usize])]) -> BTreeMap<usize, Vec<usize>> {
        edges.iter().map(|(n, d)| (*n, d.to_vec())).collect()
    }

    #[test]
    fn levels_follow_longest_dependency_chain() {
        let deps = graph(&[(0, &[]), (1, &[0]), (2, &[0, 1]), (3, &[])]);
        let levels = levels(&deps).unwrap();
        assert_eq!(levels[&0], 0);
        assert_eq!(levels[&1], 1);
        assert_eq!(levels[&2], 2);
        assert_eq!(levels[&3], 0);
    }

    #[test]
    fn cycle_reports_participants_only() {
        // 0 <-> 1 form a cycle, 2 depends on it, 3 is independent.
        let deps = graph(&[(0, &[1]), (1, &[0]), (2, &[1]), (3, &[])]);
        assert_eq!(levels(&deps).unwrap_err(), vec![0, 1]);
    }

    #[test]
    fn dependencies_outside_the_graph_are_ignored() {
        let deps = graph(&[(5, &[42])]);
        assert_eq!(levels(&deps).unwrap()[&5], 0);
    }

    fn dag() -> impl Strategy<Value = BTreeMap<usize, Vec<usize>>> {
        (1usize..40).prop_flat_map(|n| {
            proptest::collection::vec(proptest::collection::vec(any::<prop::sample::Index>(), 0..4), n)
                .prop_map(|picks| {
                    picks
                        .into_iter()
                        .enumerate()
                        .map(|(node, picks)| {
                            // Edges only point to lower-numbered nodes.
                            let deps = if node == 0 {
                                Vec::new()
                            } else {
                                picks.iter().map(|p| p.index(node)).collect()
                            };
                            (node, deps)
                        })
                        .collect()
                })
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(128))]

        #[test]
        fn every_dependency_has_a_lower_level(deps in dag()) {
            let levels = levels(&deps).unwrap();
            prop_assert_eq!(levels.len(), deps.len());
            for (node, node_deps) in &deps {
                for dep in node_deps {
                    prop_assert!(levels[dep] < levels[node]);
                }
                let expected = node_deps.iter().map(|d| levels[d] + 1).max().unwrap_or(0);
                prop_assert_eq!(levels[node], expected);
            }
        }

        #[test]
        fn a_back_edge_on_a_path_is_always_detected(deps in dag(), pick in any::<prop::sample::Index>()) {
            let mut deps = deps;
            let candidates: Vec<(usize, usize)> = deps
                .iter()
                .flat_map(|(n, ds)| ds.iter().map(move |d| (*n, *d)))
                .collect();
            prop_assume!(!candidates.is_empty());
            let (node, dep) = candidates[pick.index(candidates.len())];
            deps.get_mut(&dep).unwrap().push(node);

            let cycle = levels(&deps).unwrap_err();
            prop_assert!(cycle.contains(&node));
            prop_assert!(cycle.contains(&dep));
        }
    }
}
