//! Reachability over the call graph.
use crate::endpoint::EndpointIdx;
use crate::registry::Registry;
use ahash::AHashMap;
use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;
use transactron_ir::{Expr, PathPredicate, Value};
use transactron_utils::{Error, TransactronResult};

/// Reports the first cycle of the caller → callee graph.
pub fn check_call_graph(registry: &Registry) -> TransactronResult<()> {
    let mut graph = DiGraphMap::<EndpointIdx, ()>::new();
    for (idx, info) in registry.endpoints() {
        graph.add_node(idx);
        for callee in info.callees() {
            graph.add_edge(idx, callee, ());
        }
    }
    for mut scc in tarjan_scc(&graph) {
        let looped = scc.len() > 1 || graph.contains_edge(scc[0], scc[0]);
        if looped {
            scc.sort();
            let names = scc.iter().map(|idx| registry.name(*idx)).collect();
            let first = registry.endpoint(scc[0]);
            return Err(Error::cycle_in_call_graph(names).with_pos(&first.pos));
        }
    }
    Ok(())
}

type Call = (EndpointIdx, EndpointIdx);

/// For every transaction, the methods it reaches and how it reaches them.
#[derive(Default)]
pub struct MethodMap {
    transactions: Vec<EndpointIdx>,
    methods: Vec<EndpointIdx>,
    methods_by_transaction: AHashMap<EndpointIdx, Vec<EndpointIdx>>,
    transactions_by_method: AHashMap<EndpointIdx, Vec<EndpointIdx>>,
    /// `ready` of the method, refined by its argument validator.
    readiness_by_call: AHashMap<Call, Expr>,
    /// The method followed by its callers up to, and excluding, the
    /// transaction.
    ancestors_by_call: AHashMap<Call, Vec<EndpointIdx>>,
    /// Conjunction of the call enables along the call chain.
    enable_by_call: AHashMap<Call, Expr>,
    /// Literals that hold whenever the transaction calls the method.
    predicate_by_call: AHashMap<Call, PathPredicate>,
    method_parents: AHashMap<EndpointIdx, Vec<EndpointIdx>>,
}

impl MethodMap {
    /// Walk the call graph from every transaction of `registry`. The call
    /// graph must be acyclic.
    pub fn new(registry: &Registry) -> TransactronResult<Self> {
        let mut map = MethodMap::default();
        for t in registry.transactions() {
            map.transactions.push(t);
            map.methods_by_transaction.insert(t, vec![]);
            let mut chain = Chain {
                transaction: t,
                ancestors: vec![],
                enables: vec![],
                literals: registry.endpoint(t).predicate.literals().to_vec(),
            };
            map.visit(registry, t, &mut chain)?;
        }
        for (idx, info) in registry.endpoints() {
            for callee in info.callees() {
                map.method_parents.entry(callee).or_default().push(idx);
            }
        }
        Ok(map)
    }

    fn visit(
        &mut self,
        registry: &Registry,
        source: EndpointIdx,
        chain: &mut Chain,
    ) -> TransactronResult<()> {
        let t = chain.transaction;
        for (&method, usage) in &registry.endpoint(source).uses {
            let info = registry.endpoint(method);
            let called = &self.methods_by_transaction[&t];
            if called.contains(&method) {
                let pos = usage.calls.first().map(|c| c.pos).unwrap_or(info.pos);
                return Err(Error::repeated_call(info.name, registry.name(t))
                    .with_pos(&pos)
                    .with_post_msg(Some(format!(
                        "`{}` is reached twice through the calls of `{}`",
                        info.name,
                        registry.name(t)
                    ))));
            }
            if !self.transactions_by_method.contains_key(&method) {
                self.methods.push(method);
            }
            self.methods_by_transaction.entry(t).or_default().push(method);
            self.transactions_by_method.entry(method).or_default().push(t);

            let mut ready = Expr::from(info.ready);
            if let Some(validator) = &info.validator {
                ready &= validator(&Value::of(usage.arg, info.layout_in.clone()));
            }
            self.readiness_by_call.insert((t, method), ready);

            chain.ancestors.insert(0, method);
            chain.enables.push(usage.enable.into());
            let added = usage.predicate().literals().to_vec();
            let n_added = added.len();
            chain.literals.extend(added);

            self.ancestors_by_call
                .insert((t, method), chain.ancestors.clone());
            self.enable_by_call
                .insert((t, method), Expr::and_all(chain.enables.iter().cloned()));
            self.predicate_by_call
                .insert((t, method), PathPredicate::new(chain.literals.clone()));

            let res = if info.flags.external {
                Ok(())
            } else {
                self.visit(registry, method, chain)
            };

            chain.literals.truncate(chain.literals.len() - n_added);
            chain.enables.pop();
            chain.ancestors.remove(0);
            res?;
        }
        Ok(())
    }

    /// Transactions in declaration order.
    pub fn transactions(&self) -> &[EndpointIdx] {
        &self.transactions
    }

    /// Reachable methods, in order of discovery.
    pub fn methods(&self) -> &[EndpointIdx] {
        &self.methods
    }

    pub fn is_transaction(&self, idx: EndpointIdx) -> bool {
        self.methods_by_transaction.contains_key(&idx)
    }

    pub fn methods_by_transaction(&self, t: EndpointIdx) -> &[EndpointIdx] {
        self.methods_by_transaction
            .get(&t)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn transactions_by_method(&self, m: EndpointIdx) -> &[EndpointIdx] {
        self.transactions_by_method
            .get(&m)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// The transactions through which `elem` runs: the transaction itself,
    /// or every transaction that reaches the method.
    pub fn transactions_for(&self, elem: EndpointIdx) -> Vec<EndpointIdx> {
        if self.is_transaction(elem) {
            vec![elem]
        } else {
            self.transactions_by_method(elem).to_vec()
        }
    }

    pub fn readiness(&self, t: EndpointIdx, m: EndpointIdx) -> Expr {
        self.readiness_by_call
            .get(&(t, m))
            .cloned()
            .unwrap_or_else(Expr::one)
    }

    pub fn ancestors(&self, t: EndpointIdx, m: EndpointIdx) -> &[EndpointIdx] {
        self.ancestors_by_call
            .get(&(t, m))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn enable(&self, t: EndpointIdx, m: EndpointIdx) -> Expr {
        self.enable_by_call
            .get(&(t, m))
            .cloned()
            .unwrap_or_else(Expr::zero)
    }

    pub fn predicate(&self, t: EndpointIdx, m: EndpointIdx) -> PathPredicate {
        self.predicate_by_call
            .get(&(t, m))
            .cloned()
            .unwrap_or_default()
    }

    /// Direct callers of `m`, transactions and methods alike.
    pub fn method_parents(&self, m: EndpointIdx) -> &[EndpointIdx] {
        self.method_parents
            .get(&m)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// State of the walk along one call chain.
struct Chain {
    transaction: EndpointIdx,
    ancestors: Vec<EndpointIdx>,
    enables: Vec<Expr>,
    literals: Vec<Expr>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Context, ElaborationConfig, Endpoint, Method, Transaction};
    use transactron_utils::ErrorKind;

    #[test]
    fn chains_through_methods() {
        let mut ctx = Context::new("top", ElaborationConfig::default());
        let mut m = ctx.top();
        let leaf = Method::build("leaf").create(&mut m).unwrap();
        let mid = Method::build("mid").create(&mut m).unwrap();
        leaf.define(&mut m, true, |_, _| Ok(Value::empty())).unwrap();
        mid.define(&mut m, true, |m, _| leaf.call(m, ())).unwrap();
        let t = Transaction::new(&mut m, "t").unwrap();
        t.body(&mut m, true, |m| mid.call(m, ()).map(|_| ())).unwrap();

        let reg = m.registry();
        let map = MethodMap::new(reg).unwrap();
        let (t, mid, leaf) = (t.endpoint(), mid.endpoint(), leaf.endpoint());
        assert_eq!(map.methods_by_transaction(t), &[mid, leaf]);
        assert_eq!(map.ancestors(t, leaf), &[leaf, mid]);
        assert_eq!(map.method_parents(leaf), &[mid]);
        assert_eq!(map.transactions_for(leaf), vec![t]);
    }

    #[test]
    fn diamond_is_a_repeated_call() {
        let mut ctx = Context::new("top", ElaborationConfig::default());
        let mut m = ctx.top();
        let leaf = Method::build("leaf").create(&mut m).unwrap();
        let a = Method::build("a").create(&mut m).unwrap();
        let b = Method::build("b").create(&mut m).unwrap();
        leaf.define(&mut m, true, |_, _| Ok(Value::empty())).unwrap();
        a.define(&mut m, true, |m, _| leaf.call(m, ())).unwrap();
        b.define(&mut m, true, |m, _| leaf.call(m, ())).unwrap();
        let t = Transaction::new(&mut m, "t").unwrap();
        t.body(&mut m, true, |m| {
            a.call(m, ())?;
            b.call(m, ())?;
            Ok(())
        })
        .unwrap();
        let err = MethodMap::new(m.registry()).err().unwrap();
        assert!(matches!(err.kind(), ErrorKind::RepeatedCall { .. }));
    }
}
