//! The sidecar that locates Transactron signals in an elaborated design.
use crate::conflicts::ConflictGraph;
use crate::hw_log::LogLevel;
use crate::method_map::MethodMap;
use crate::profiler::ProfileData;
use crate::registry::Registry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::Path;
use transactron_ir::{Design, Signal};
use transactron_utils::IndexRef;

/// Format version written into every [GenerationInfo]. Bumped whenever the
/// layout of the sidecar changes.
pub const GENERATION_INFO_VERSION: u32 = 1;

/// Hierarchical name of a signal: the module path followed by its name.
pub type SignalPath = Vec<String>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricLocation {
    pub description: String,
    pub regs: BTreeMap<String, SignalPath>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSignalsLocation {
    pub request: SignalPath,
    pub runnable: SignalPath,
    pub grant: SignalPath,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodSignalsLocation {
    pub run: SignalPath,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecordInfo {
    pub logger_name: String,
    pub level: LogLevel,
    pub format_str: String,
    pub location: (String, u32),
    pub trigger: SignalPath,
    pub fields: Vec<SignalPath>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationInfo {
    pub version: u32,
    pub metrics_location: BTreeMap<String, MetricLocation>,
    /// Keyed by endpoint index, as in [ProfileData].
    pub transaction_signals_location: BTreeMap<usize, TransactionSignalsLocation>,
    pub method_signals_location: BTreeMap<usize, MethodSignalsLocation>,
    pub profile_data: ProfileData,
    pub logs: Vec<LogRecordInfo>,
}

impl GenerationInfo {
    pub fn new(
        design: &Design,
        registry: &Registry,
        map: &MethodMap,
        conflicts: &ConflictGraph,
    ) -> Self {
        let path = |sig: Signal| design.path(sig.idx);

        let metrics_location = registry
            .metrics()
            .iter()
            .map(|metric| {
                let regs = metric
                    .regs
                    .iter()
                    .map(|reg| (reg.name.clone(), path(reg.signal)))
                    .collect();
                let location = MetricLocation {
                    description: metric.description.clone(),
                    regs,
                };
                (metric.name.clone(), location)
            })
            .collect();

        let transaction_signals_location = map
            .transactions()
            .iter()
            .map(|&t| {
                let info = registry.endpoint(t);
                let location = TransactionSignalsLocation {
                    request: path(info.ready),
                    runnable: path(info.runnable),
                    grant: path(info.run),
                };
                (t.index(), location)
            })
            .collect();

        let method_signals_location = map
            .methods()
            .iter()
            .map(|&m| {
                let run = path(registry.endpoint(m).run);
                (m.index(), MethodSignalsLocation { run })
            })
            .collect();

        let logs = registry
            .logs()
            .iter()
            .map(|rec| LogRecordInfo {
                logger_name: rec.logger.to_string(),
                level: rec.level,
                format_str: rec.format.clone(),
                location: (rec.pos.file().to_string(), rec.pos.line()),
                trigger: path(rec.trigger),
                fields: rec.fields.iter().map(|f| path(*f)).collect(),
            })
            .collect();

        GenerationInfo {
            version: GENERATION_INFO_VERSION,
            metrics_location,
            transaction_signals_location,
            method_signals_location,
            profile_data: ProfileData::make(registry, map, conflicts),
            logs,
        }
    }

    pub fn encode<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let file = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    /// Reads a sidecar written by [GenerationInfo::encode]. Sidecars of
    /// another format version are rejected.
    pub fn decode<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = BufReader::new(File::open(path)?);
        let info: GenerationInfo = serde_json::from_reader(file)?;
        if info.version != GENERATION_INFO_VERSION {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "generation info has version {}, expected {GENERATION_INFO_VERSION}",
                    info.version
                ),
            ));
        }
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw_log::HardwareLogger;
    use crate::{Context, ElaborationConfig, Method, Transaction};
    use transactron_ir::Value;

    #[test]
    fn locates_control_signals() {
        let mut ctx = Context::new("top", ElaborationConfig::default());
        let mut m = ctx.top();
        let mut cm = m.child("unit");
        let meth = Method::build("poke").create(&mut cm).unwrap();
        meth.define(&mut cm, true, |_, _| Ok(Value::empty())).unwrap();
        drop(cm);
        let t = Transaction::new(&mut m, "t").unwrap();
        t.body(&mut m, true, |m| meth.call(m, ()).map(|_| ())).unwrap();
        HardwareLogger::new("gen").warning(&mut m, t.grant, "fired", &[]);
        drop(m);

        let elab = ctx.finish().unwrap();
        let info = &elab.gen_info;
        let (ti, tl) = info.transaction_signals_location.iter().next().unwrap();
        assert_eq!(tl.grant, vec!["top", "t_grant"]);
        assert!(info.profile_data.transactions_and_methods[ti].is_transaction);
        let ml = info.method_signals_location.values().next().unwrap();
        assert_eq!(ml.run, vec!["top", "unit", "poke_run"]);
        assert_eq!(info.logs[0].format_str, "fired");
        assert_eq!(info.logs[0].level, LogLevel::Warning);

        let text = serde_json::to_string(info).unwrap();
        let back: GenerationInfo = serde_json::from_str(&text).unwrap();
        assert_eq!(&back, info);
        assert_eq!(info.version, GENERATION_INFO_VERSION);
    }

    #[test]
    fn other_versions_are_rejected() {
        let mut ctx = Context::new("top", ElaborationConfig::default());
        let mut m = ctx.top();
        let t = Transaction::new(&mut m, "t").unwrap();
        t.body(&mut m, true, |_| Ok(())).unwrap();
        drop(m);
        let mut info = ctx.finish().unwrap().gen_info;
        info.version = GENERATION_INFO_VERSION + 1;
        let path = std::env::temp_dir()
            .join(format!("transactron-gen-version-{}.json", std::process::id()));
        info.encode(&path).unwrap();
        let err = GenerationInfo::decode(&path).unwrap_err();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
