//! Merging of simultaneous transactions.
//!
//! Transactions that must run together are closed transitively into maximal
//! groups. Each group is replaced by a fresh transaction that calls every
//! member, and the members become methods. Groups never contain two
//! transactions that were declared independent.
use crate::conflicts::ConflictGraph;
use crate::endpoint::{EndpointIdx, EndpointKind, Priority};
use crate::method_map::MethodMap;
use crate::registry::Registry;
use ahash::{AHashMap, AHashSet};
use itertools::Itertools;
use std::collections::{BTreeSet, VecDeque};
use transactron_ir::{Design, Expr, ModuleBuilder, Value};
use transactron_utils::{Error, Id, TransactronResult};

type Group = BTreeSet<EndpointIdx>;

/// Name of the module that holds the merged transactions.
pub const MERGE_MODULE: &str = "merge_manager";

/// Replace every maximal group of simultaneous transactions by a single
/// transaction. Returns the new transactions.
pub fn merge(registry: &mut Registry, design: &mut Design) -> TransactronResult<Vec<EndpointIdx>> {
    let map = MethodMap::new(registry)?;
    let all = registry.endpoints().map(|(idx, _)| idx).collect_vec();

    // Orderings between simultaneous endpoints are meaningless.
    for &idx in &all {
        let info = registry.endpoint_mut(idx);
        let sims: AHashSet<_> = info.simultaneous.iter().copied().collect();
        info.relations.retain(|r| {
            r.conflict || r.priority == Priority::Undefined || !sims.contains(&r.end)
        });
    }

    let mut independents: AHashMap<EndpointIdx, AHashSet<EndpointIdx>> = AHashMap::new();
    for &idx in &all {
        let info = registry.endpoint(idx);
        let indeps: AHashSet<EndpointIdx> = std::iter::once(idx)
            .chain(info.independent.iter().copied())
            .flat_map(|e| map.transactions_for(e))
            .collect();
        for &t1 in &indeps {
            independents.entry(t1).or_default().extend(indeps.iter().copied());
        }
    }
    let independent = |a: &EndpointIdx, b: &EndpointIdx| {
        independents.get(a).is_some_and(|s| s.contains(b))
    };

    let mut pairs: BTreeSet<Group> = BTreeSet::new();
    for &idx in &all {
        let info = registry.endpoint(idx);
        for &sim in &info.simultaneous {
            for (t1, t2) in map
                .transactions_for(idx)
                .into_iter()
                .cartesian_product(map.transactions_for(sim))
            {
                if t1 == t2 {
                    continue;
                }
                if independent(&t2, &t1) {
                    return Err(Error::unsatisfiable_simultaneity(
                        info.name,
                        registry.name(sim),
                    )
                    .with_pos(&info.pos)
                    .with_annotation(&registry.endpoint(sim).pos, "other endpoint"));
                }
                pairs.insert([t1, t2].into_iter().collect());
            }
        }
    }
    if pairs.is_empty() {
        return Ok(vec![]);
    }

    // Transitive closure, skipping groups that join independent transactions.
    let conflicting = |group: &Group| {
        group
            .iter()
            .tuple_combinations()
            .any(|(a, b)| independent(a, b))
    };
    let mut closed: BTreeSet<Group> = BTreeSet::new();
    let mut queue: VecDeque<Group> = pairs.iter().cloned().collect();
    while let Some(group) = queue.pop_front() {
        if closed.contains(&group) || conflicting(&group) {
            continue;
        }
        for other in &pairs {
            if !group.is_disjoint(other) && !other.is_subset(&group) {
                queue.push_back(group.union(other).copied().collect());
            }
        }
        closed.insert(group);
    }
    let groups = closed
        .iter()
        .filter(|g| !closed.iter().any(|g2| g != &g2 && g.is_subset(g2)))
        .cloned()
        .collect_vec();

    for group in &groups {
        for &t in group {
            registry.endpoint_mut(t).kind = EndpointKind::Method;
        }
    }

    let top = design.top();
    let mut top = ModuleBuilder::new(design, top);
    let mut ir = top.child(MERGE_MODULE);
    let mut merged = vec![];
    for group in &groups {
        let Some(&first) = group.first() else {
            continue;
        };
        let name = group.iter().map(|t| registry.name(*t)).join("_");
        let pos = registry.endpoint(first).pos;
        let idx = registry.register_transaction(&mut ir, Id::new(name), pos, false)?;
        let request = registry.endpoint(idx).ready;
        ir.top_comb(request, true);
        registry.push_body(idx, ir.ctrl_path(), ir.predicate())?;
        for &t in group {
            registry.record_call(&mut ir, t, Value::empty(), Expr::one(), pos)?;
        }
        registry.pop_body(idx)?;
        log::debug!(
            "merged simultaneous transactions into `{}'",
            registry.name(idx)
        );
        merged.push(idx);
    }
    Ok(merged)
}

/// Checks that the transactions running each pair of simultaneous endpoints
/// lie in one conflict component, so that a single scheduler grants them.
pub fn check_components(
    registry: &Registry,
    map: &MethodMap,
    conflicts: &ConflictGraph,
) -> TransactronResult<()> {
    let component: AHashMap<EndpointIdx, usize> = conflicts
        .components()
        .into_iter()
        .enumerate()
        .flat_map(|(i, cc)| cc.into_iter().map(move |t| (t, i)))
        .collect();
    for (idx, info) in registry.endpoints() {
        for &sim in &info.simultaneous {
            let spanned: BTreeSet<usize> = map
                .transactions_for(idx)
                .into_iter()
                .chain(map.transactions_for(sim))
                .filter_map(|t| component.get(&t).copied())
                .collect();
            if spanned.len() > 1 {
                return Err(Error::simultaneity_across_components(info.name, registry.name(sim))
                    .with_pos(&info.pos)
                    .with_annotation(&registry.endpoint(sim).pos, "other endpoint"));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Context, ElaborationConfig, Endpoint, Transaction};
    use transactron_utils::ErrorKind;

    fn three(m: &mut crate::TModule) -> [Transaction; 3] {
        let ts = ["a", "b", "c"].map(|n| Transaction::new(m, n).unwrap());
        for t in &ts {
            t.body(m, true, |_| Ok(())).unwrap();
        }
        ts
    }

    #[test]
    fn groups_are_closed_transitively() {
        let mut ctx = Context::new("top", ElaborationConfig::default());
        let mut m = ctx.top();
        let [a, b, c] = three(&mut m);
        a.simultaneous(&mut m, &[&b]).unwrap();
        c.simultaneous(&mut m, &[&b]).unwrap();
        drop(m);
        let (registry, design) = ctx.parts_mut();
        let merged = merge(registry, design).unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(registry.name(merged[0]), "a_b_c");
        for t in [a, b, c] {
            assert!(registry.endpoint(t.endpoint()).is_method());
        }
        assert_eq!(registry.transactions().collect_vec(), merged);
    }

    #[test]
    fn alternatives_stay_apart() {
        let mut ctx = Context::new("top", ElaborationConfig::default());
        let mut m = ctx.top();
        let [a, b, c] = three(&mut m);
        a.simultaneous_alternatives(&mut m, &[&b, &c]).unwrap();
        drop(m);
        let (registry, design) = ctx.parts_mut();
        let merged = merge(registry, design).unwrap();
        let names = merged.iter().map(|t| registry.name(*t)).collect_vec();
        assert_eq!(names, ["a_b", "a_c"]);
    }

    #[test]
    fn merged_groups_share_a_component() {
        let mut ctx = Context::new("top", ElaborationConfig::default());
        let mut m = ctx.top();
        let [a, b, _] = three(&mut m);
        a.simultaneous(&mut m, &[&b]).unwrap();
        drop(m);
        let (registry, design) = ctx.parts_mut();

        // Unmerged, `a` and `b` do not conflict and are scheduled apart.
        let map = MethodMap::new(registry).unwrap();
        let conflicts = ConflictGraph::new(registry, &map).unwrap();
        assert_eq!(conflicts.components().len(), 3);
        let err = check_components(registry, &map, &conflicts).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::SimultaneityAcrossComponents(..)));

        merge(registry, design).unwrap();
        let map = MethodMap::new(registry).unwrap();
        let conflicts = ConflictGraph::new(registry, &map).unwrap();
        assert_eq!(conflicts.components().len(), 2);
        check_components(registry, &map, &conflicts).unwrap();
    }

    #[test]
    fn independent_and_simultaneous_is_unsatisfiable() {
        let mut ctx = Context::new("top", ElaborationConfig::default());
        let mut m = ctx.top();
        let [a, b, _] = three(&mut m);
        a.simultaneous(&mut m, &[&b]).unwrap();
        m.registry_mut()
            .independent(a.endpoint(), &[b.endpoint()], transactron_utils::GPosIdx::UNKNOWN)
            .unwrap();
        drop(m);
        let (registry, design) = ctx.parts_mut();
        let err = merge(registry, design).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::UnsatisfiableSimultaneity(..)));
    }
}
