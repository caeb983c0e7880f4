//! Execution profiles of simulated designs.
//!
//! A [ProfileCollector] samples the control signals of every transaction and
//! method after each settled cycle and records, per cycle, which endpoints
//! ran and which were locked by whom. Transactions and methods are referred
//! to by the index of their endpoint.
use crate::conflicts::ConflictGraph;
use crate::method_map::MethodMap;
use crate::registry::Registry;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::Path;
use transactron_ir::{Signal, Simulator};
use transactron_utils::IndexRef;

/// Name and source location of a transaction or method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileInfo {
    pub name: String,
    pub src_loc: (String, u32),
    pub is_transaction: bool,
}

/// Statistics of one transaction or method.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunStat {
    pub name: String,
    pub src_loc: String,
    /// For transactions, the cycles in which it was runnable but lost to a
    /// conflicting transaction. For methods, the cycles in which a running
    /// caller did not enable the call.
    pub locked: usize,
    pub run: usize,
}

impl RunStat {
    fn make(info: &ProfileInfo) -> Self {
        RunStat {
            name: info.name.clone(),
            src_loc: format!("{}:{}", info.src_loc.0, info.src_loc.1),
            ..Default::default()
        }
    }
}

/// A statistics tree; `callers` break method statistics down by caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunStatNode {
    pub stat: RunStat,
    pub callers: BTreeMap<usize, RunStatNode>,
}

impl RunStatNode {
    fn make(info: &ProfileInfo) -> Self {
        RunStatNode {
            stat: RunStat::make(info),
            callers: BTreeMap::new(),
        }
    }
}

/// Static information needed to interpret samples.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileData {
    pub transactions_and_methods: BTreeMap<usize, ProfileInfo>,
    pub method_parents: BTreeMap<usize, Vec<usize>>,
    pub transaction_conflicts: BTreeMap<usize, Vec<usize>>,
}

impl ProfileData {
    pub fn make(registry: &Registry, map: &MethodMap, conflicts: &ConflictGraph) -> Self {
        let mut data = ProfileData::default();
        let endpoints = map.transactions().iter().chain(map.methods());
        for &idx in endpoints {
            let info = registry.endpoint(idx);
            data.transactions_and_methods.insert(
                idx.index(),
                ProfileInfo {
                    name: info.name.to_string(),
                    src_loc: (info.pos.file().to_string(), info.pos.line()),
                    is_transaction: map.is_transaction(idx),
                },
            );
        }
        for &m in map.methods() {
            let parents = map.method_parents(m).iter().map(|p| p.index()).collect();
            data.method_parents.insert(m.index(), parents);
        }
        for &t in map.transactions() {
            let neighbors = conflicts
                .neighbors(t)
                .into_iter()
                .map(|n| n.index())
                .collect();
            data.transaction_conflicts.insert(t.index(), neighbors);
        }
        data
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TransactionSamples {
    pub request: bool,
    pub runnable: bool,
    pub grant: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MethodSamples {
    pub run: bool,
}

/// Control signal values of one cycle.
#[derive(Debug, Clone, Default)]
pub struct ProfileSamples {
    pub transactions: BTreeMap<usize, TransactionSamples>,
    pub methods: BTreeMap<usize, MethodSamples>,
}

/// What happened in one cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CycleProfile {
    /// Transactions that were runnable but not granted, with a conflicting
    /// transaction that was granted instead; methods whose caller ran
    /// without enabling them, with that caller.
    pub locked: BTreeMap<usize, usize>,
    /// Running transactions (no caller) and methods (with their caller).
    pub running: BTreeMap<usize, Option<usize>>,
}

impl CycleProfile {
    pub fn make(samples: &ProfileSamples, data: &ProfileData) -> Self {
        let mut cprof = CycleProfile::default();
        let no_parents = vec![];

        for (&t, s) in &samples.transactions {
            if s.grant {
                cprof.running.insert(t, None);
            } else if s.request && s.runnable {
                let winner = data
                    .transaction_conflicts
                    .get(&t)
                    .into_iter()
                    .flatten()
                    .find(|t2| samples.transactions.get(*t2).is_some_and(|s2| s2.grant));
                if let Some(&t2) = winner {
                    cprof.locked.insert(t, t2);
                }
            }
        }

        let running: BTreeSet<usize> = cprof
            .running
            .keys()
            .copied()
            .chain(samples.methods.iter().filter(|(_, s)| s.run).map(|(m, _)| *m))
            .collect();

        for (&m, s) in &samples.methods {
            let parents = data.method_parents.get(&m).unwrap_or(&no_parents);
            let caller = parents.iter().copied().find(|p| running.contains(p));
            match caller {
                Some(p) if s.run => {
                    cprof.running.insert(m, Some(p));
                }
                Some(p) => {
                    cprof.locked.insert(m, p);
                }
                None if s.run => {
                    cprof.running.insert(m, None);
                }
                None => (),
            }
        }
        cprof
    }
}

/// A recorded simulation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub transactions_and_methods: BTreeMap<usize, ProfileInfo>,
    pub cycles: Vec<CycleProfile>,
}

impl Profile {
    pub fn encode<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let file = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    pub fn decode<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(file)?)
    }

    fn node(&self, i: usize) -> RunStatNode {
        self.transactions_and_methods
            .get(&i)
            .map(RunStatNode::make)
            .unwrap_or_default()
    }

    /// Per-transaction statistics. With `recursive`, each node also lists
    /// the methods the transaction ran or was locked on.
    pub fn analyze_transactions(&self, recursive: bool) -> Vec<RunStatNode> {
        let mut stats: BTreeMap<usize, RunStatNode> = self
            .transactions_and_methods
            .iter()
            .filter(|(_, info)| info.is_transaction)
            .map(|(i, info)| (*i, RunStatNode::make(info)))
            .collect();

        for c in &self.cycles {
            let mut called: BTreeMap<usize, BTreeSet<usize>> = BTreeMap::new();
            for (&i, j) in &c.running {
                if let Some(j) = j {
                    called.entry(*j).or_default().insert(i);
                }
            }
            for (&i, &j) in &c.locked {
                called.entry(j).or_default().insert(i);
            }
            for &i in c.running.keys() {
                if let Some(node) = stats.get_mut(&i) {
                    self.rec_transaction(c, &called, node, i, recursive);
                }
            }
            for &i in c.locked.keys() {
                if let Some(node) = stats.get_mut(&i) {
                    node.stat.locked += 1;
                }
            }
        }
        stats.into_values().collect()
    }

    fn rec_transaction(
        &self,
        c: &CycleProfile,
        called: &BTreeMap<usize, BTreeSet<usize>>,
        node: &mut RunStatNode,
        i: usize,
        recursive: bool,
    ) {
        if c.running.contains_key(&i) {
            node.stat.run += 1;
        } else if c.locked.contains_key(&i) {
            node.stat.locked += 1;
        }
        if recursive {
            for &j in called.get(&i).into_iter().flatten() {
                let child = node.callers.entry(j).or_insert_with(|| self.node(j));
                self.rec_transaction(c, called, child, j, recursive);
            }
        }
    }

    /// Per-method statistics. With `recursive`, each node is broken down by
    /// the chain of callers up to the transaction.
    pub fn analyze_methods(&self, recursive: bool) -> Vec<RunStatNode> {
        let mut stats: BTreeMap<usize, RunStatNode> = self
            .transactions_and_methods
            .iter()
            .filter(|(_, info)| !info.is_transaction)
            .map(|(i, info)| (*i, RunStatNode::make(info)))
            .collect();

        for c in &self.cycles {
            for &i in c.running.keys() {
                if let Some(node) = stats.get_mut(&i) {
                    self.rec_method(c, node, i, false, recursive);
                }
            }
            for &i in c.locked.keys() {
                if let Some(node) = stats.get_mut(&i) {
                    self.rec_method(c, node, i, true, recursive);
                }
            }
        }
        stats.into_values().collect()
    }

    fn rec_method(
        &self,
        c: &CycleProfile,
        node: &mut RunStatNode,
        i: usize,
        locking_call: bool,
        recursive: bool,
    ) {
        let caller = if let Some(caller) = c.running.get(&i) {
            if locking_call {
                node.stat.locked += 1;
            } else {
                node.stat.run += 1;
            }
            *caller
        } else {
            node.stat.locked += 1;
            c.locked.get(&i).copied()
        };
        if let (true, Some(caller)) = (recursive, caller) {
            let child = node
                .callers
                .entry(caller)
                .or_insert_with(|| self.node(caller));
            self.rec_method(c, child, caller, locking_call, recursive);
        }
    }
}

/// Samples a running simulation into a [Profile].
pub struct ProfileCollector {
    data: ProfileData,
    transactions: Vec<(usize, Signal, Signal, Signal)>,
    methods: Vec<(usize, Signal)>,
    profile: Profile,
}

impl ProfileCollector {
    pub fn new(registry: &Registry, map: &MethodMap, data: ProfileData) -> Self {
        let transactions = map
            .transactions()
            .iter()
            .map(|&t| {
                let info = registry.endpoint(t);
                (t.index(), info.ready, info.runnable, info.run)
            })
            .collect();
        let methods = map
            .methods()
            .iter()
            .map(|&m| (m.index(), registry.endpoint(m).run))
            .collect();
        let profile = Profile {
            transactions_and_methods: data.transactions_and_methods.clone(),
            cycles: vec![],
        };
        ProfileCollector {
            data,
            transactions,
            methods,
            profile,
        }
    }

    /// Record the current, settled cycle.
    pub fn sample(&mut self, sim: &Simulator) {
        let mut samples = ProfileSamples::default();
        for &(i, request, runnable, grant) in &self.transactions {
            samples.transactions.insert(
                i,
                TransactionSamples {
                    request: sim.get(request) != 0,
                    runnable: sim.get(runnable) != 0,
                    grant: sim.get(grant) != 0,
                },
            );
        }
        for &(i, run) in &self.methods {
            samples.methods.insert(i, MethodSamples { run: sim.get(run) != 0 });
        }
        self.profile
            .cycles
            .push(CycleProfile::make(&samples, &self.data));
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn finish(self) -> Profile {
        self.profile
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(name: &str, is_transaction: bool) -> ProfileInfo {
        ProfileInfo {
            name: name.to_string(),
            src_loc: ("design.rs".to_string(), 1),
            is_transaction,
        }
    }

    fn data() -> ProfileData {
        // Transactions 0 and 1 both call method 2.
        ProfileData {
            transactions_and_methods: [
                (0, info("a", true)),
                (1, info("b", true)),
                (2, info("m", false)),
            ]
            .into_iter()
            .collect(),
            method_parents: [(2, vec![0, 1])].into_iter().collect(),
            transaction_conflicts: [(0, vec![1]), (1, vec![0])].into_iter().collect(),
        }
    }

    #[test]
    fn cycle_profile_records_locks() {
        let samples = ProfileSamples {
            transactions: [
                (0, TransactionSamples { request: true, runnable: true, grant: true }),
                (1, TransactionSamples { request: true, runnable: true, grant: false }),
            ]
            .into_iter()
            .collect(),
            methods: [(2, MethodSamples { run: true })].into_iter().collect(),
        };
        let cprof = CycleProfile::make(&samples, &data());
        assert_eq!(cprof.running.get(&0), Some(&None));
        assert_eq!(cprof.running.get(&2), Some(&Some(0)));
        assert_eq!(cprof.locked.get(&1), Some(&0));
    }

    #[test]
    fn analysis_counts_runs_and_locks() {
        let data = data();
        let ran_a = CycleProfile {
            locked: [(1, 0)].into_iter().collect(),
            running: [(0, None), (2, Some(0))].into_iter().collect(),
        };
        let ran_b = CycleProfile {
            locked: [(0, 1)].into_iter().collect(),
            running: [(1, None), (2, Some(1))].into_iter().collect(),
        };
        let profile = Profile {
            transactions_and_methods: data.transactions_and_methods.clone(),
            cycles: vec![ran_a.clone(), ran_b, ran_a],
        };
        let ts = profile.analyze_transactions(false);
        assert_eq!((ts[0].stat.run, ts[0].stat.locked), (2, 1));
        assert_eq!((ts[1].stat.run, ts[1].stat.locked), (1, 2));

        let ms = profile.analyze_methods(true);
        assert_eq!(ms[0].stat.run, 3);
        assert_eq!(ms[0].callers[&0].stat.run, 2);
        assert_eq!(ms[0].callers[&1].stat.run, 1);
    }
}
