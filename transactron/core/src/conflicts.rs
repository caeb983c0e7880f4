//! The conflict graph between transactions and the priority order used by
//! the schedulers.
use crate::endpoint::{EndpointIdx, Priority};
use crate::method_map::MethodMap;
use crate::registry::Registry;
use ahash::{AHashMap, AHashSet};
use itertools::Itertools;
use std::collections::BTreeSet;
use transactron_utils::{Error, TransactronResult, WeightGraph};

pub struct ConflictGraph {
    graph: WeightGraph<EndpointIdx>,
    /// Transactions that must be considered before the key.
    priority_preds: AHashMap<EndpointIdx, AHashSet<EndpointIdx>>,
    porder: AHashMap<EndpointIdx, usize>,
    order: Vec<EndpointIdx>,
}

/// Whether two transactions can never run together because some pair of
/// their bodies, or the bodies of the methods they reach, sit on exclusive
/// control paths.
fn transactions_exclusive(
    registry: &Registry,
    map: &MethodMap,
    t1: EndpointIdx,
    t2: EndpointIdx,
) -> bool {
    let tms1 = std::iter::once(t1).chain(map.methods_by_transaction(t1).iter().copied());
    let tms2 = std::iter::once(t2)
        .chain(map.methods_by_transaction(t2).iter().copied())
        .collect_vec();
    tms1.cartesian_product(tms2).any(|(a, b)| {
        let (a, b) = (registry.endpoint(a), registry.endpoint(b));
        a.ctrl_path.exclusive_with(&b.ctrl_path) || a.predicate.exclusive_with(&b.predicate)
    })
}

/// Whether the two calls of `m` meet at a nonexclusive method.
fn calls_nonexclusive(
    registry: &Registry,
    map: &MethodMap,
    t1: EndpointIdx,
    t2: EndpointIdx,
    m: EndpointIdx,
) -> bool {
    map.ancestors(t1, m)
        .iter()
        .zip(map.ancestors(t2, m))
        .take_while(|(a, b)| a == b)
        .last()
        .is_some_and(|(a, _)| registry.endpoint(*a).flags.nonexclusive)
}

impl ConflictGraph {
    pub fn new(registry: &Registry, map: &MethodMap) -> TransactronResult<Self> {
        let mut graph: WeightGraph<EndpointIdx> = map.transactions().iter().copied().into();
        let mut priority_preds: AHashMap<_, AHashSet<_>> = map
            .transactions()
            .iter()
            .map(|t| (*t, AHashSet::new()))
            .collect();

        for &m in map.methods() {
            for (&t1, &t2) in map
                .transactions_by_method(m)
                .iter()
                .tuple_combinations()
            {
                if t1 == t2
                    || transactions_exclusive(registry, map, t1, t2)
                    || map.predicate(t1, m).exclusive_with(&map.predicate(t2, m))
                    || calls_nonexclusive(registry, map, t1, t2, m)
                {
                    continue;
                }
                log::trace!(
                    "`{}' and `{}' conflict on `{}'",
                    registry.name(t1),
                    registry.name(t2),
                    registry.name(m)
                );
                graph.add_edge(&t1, &t2);
            }
        }

        for (start, info) in registry.endpoints() {
            for rel in &info.relations {
                let end = registry.endpoint(rel.end);
                if !rel.conflict
                    && end.defined
                    && end.def_order < info.def_order
                    && !rel.silence_warning
                {
                    log::warn!(
                        "{}",
                        rel.pos.format(format!(
                            "`{}` scheduled before `{}`, but defined afterwards",
                            info.name, end.name
                        ))
                    );
                }
                for ts in map.transactions_for(start) {
                    for te in map.transactions_for(rel.end) {
                        if ts == te {
                            continue;
                        }
                        if rel.conflict && !transactions_exclusive(registry, map, ts, te) {
                            graph.add_edge(&ts, &te);
                        }
                        match rel.priority {
                            Priority::Left => {
                                priority_preds.entry(te).or_default().insert(ts);
                            }
                            Priority::Right => {
                                priority_preds.entry(ts).or_default().insert(te);
                            }
                            Priority::Undefined => (),
                        }
                    }
                }
            }
        }

        let order = Self::priority_order(registry, map, &priority_preds)?;
        let porder = order.iter().enumerate().map(|(i, t)| (*t, i)).collect();
        Ok(ConflictGraph {
            graph,
            priority_preds,
            porder,
            order,
        })
    }

    /// Topological order of the priority edges. Among transactions that are
    /// free to go next, the one declared first wins.
    fn priority_order(
        registry: &Registry,
        map: &MethodMap,
        preds: &AHashMap<EndpointIdx, AHashSet<EndpointIdx>>,
    ) -> TransactronResult<Vec<EndpointIdx>> {
        let position: AHashMap<EndpointIdx, usize> = map
            .transactions()
            .iter()
            .enumerate()
            .map(|(i, t)| (*t, i))
            .collect();
        let mut indegree: Vec<usize> = map
            .transactions()
            .iter()
            .map(|t| preds.get(t).map_or(0, |p| p.len()))
            .collect();
        let mut succs: Vec<Vec<usize>> = vec![vec![]; indegree.len()];
        for (t, ps) in preds {
            for p in ps {
                succs[position[p]].push(position[t]);
            }
        }
        let mut free: BTreeSet<usize> = (0..indegree.len()).filter(|i| indegree[*i] == 0).collect();
        let mut order = Vec::with_capacity(indegree.len());
        while let Some(i) = free.pop_first() {
            order.push(map.transactions()[i]);
            for &s in &succs[i] {
                indegree[s] -= 1;
                if indegree[s] == 0 {
                    free.insert(s);
                }
            }
        }
        if order.len() < indegree.len() {
            let stuck = (0..indegree.len())
                .filter(|i| indegree[*i] > 0)
                .map(|i| map.transactions()[i])
                .collect_vec();
            let names = stuck.iter().map(|t| registry.name(*t)).collect();
            return Err(Error::priority_cycle(names).with_pos(&registry.endpoint(stuck[0]).pos));
        }
        Ok(order)
    }

    pub fn conflicts(&self, a: EndpointIdx, b: EndpointIdx) -> bool {
        self.graph.has_edge(&a, &b)
    }

    pub fn neighbors(&self, t: EndpointIdx) -> Vec<EndpointIdx> {
        self.graph.neighbors(&t).into_iter().copied().collect()
    }

    pub fn edge_count(&self) -> usize {
        self.graph
            .nodes()
            .map(|t| self.graph.degree(t))
            .sum::<usize>()
            / 2
    }

    /// Connected components, each sorted by priority order.
    pub fn components(&self) -> Vec<Vec<EndpointIdx>> {
        self.graph
            .components()
            .into_iter()
            .map(|mut cc| {
                cc.sort_by_key(|t| self.porder[t]);
                cc
            })
            .collect()
    }

    /// Position of `t` in the priority order.
    pub fn order(&self, t: EndpointIdx) -> usize {
        self.porder[&t]
    }

    /// All transactions in priority order.
    pub fn porder(&self) -> &[EndpointIdx] {
        &self.order
    }

    /// Conflicting transactions that have priority over `t`. While any of
    /// them is runnable, `t` may not be granted.
    pub fn masking(&self, t: EndpointIdx) -> Vec<EndpointIdx> {
        let Some(preds) = self.priority_preds.get(&t) else {
            return vec![];
        };
        preds
            .iter()
            .copied()
            .filter(|p| self.conflicts(*p, t))
            .sorted_by_key(|p| self.porder[p])
            .collect()
    }
}
