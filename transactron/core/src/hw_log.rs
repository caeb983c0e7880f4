//! Logging from inside the hardware.
//!
//! A log record is triggered by a signal and formats the values of a list of
//! signals. Records are collected during elaboration and rendered by a
//! [LogPrinter] while the design is simulated.
use crate::context::TModule;
use serde::{Deserialize, Serialize};
use regex::Regex;
use std::str::FromStr;
use transactron_ir::{Expr, SimError, SimResult, Signal, Simulator};
use transactron_utils::{GPosIdx, Id};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    fn as_log(self) -> log::Level {
        match self {
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Info => log::Level::Info,
            LogLevel::Warning => log::Level::Warn,
            LogLevel::Error => log::Level::Error,
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            _ => Err(format!(
                "log level must be one of debug, info, warn, error; got `{s}'"
            )),
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone)]
pub struct LogRecord {
    pub logger: Id,
    pub level: LogLevel,
    /// Message template; each `{}` takes the next field.
    pub format: String,
    pub trigger: Signal,
    pub fields: Vec<Signal>,
    pub pos: GPosIdx,
}

impl LogRecord {
    pub fn message(&self, values: &[u64]) -> String {
        format_message(&self.format, values)
    }
}

/// Substitutes `values` for the `{}` placeholders of `format`. `{:x}` and
/// `{:b}` render in hex and binary, `{{` and `}}` are literal braces.
pub fn format_message(format: &str, values: &[u64]) -> String {
    let mut out = String::with_capacity(format.len());
    let mut values = values.iter();
    let mut rest = format;
    while let Some(i) = rest.find(['{', '}']) {
        out.push_str(&rest[..i]);
        rest = &rest[i..];
        if rest.starts_with("{{") || rest.starts_with("}}") {
            out.push_str(&rest[..1]);
            rest = &rest[2..];
            continue;
        }
        let spec = rest.find('}').map(|end| (&rest[1..end], end));
        match spec {
            Some((spec, end)) if rest.starts_with('{') => {
                let value = values.next();
                match (spec, value) {
                    (_, None) => out.push_str(&rest[..=end]),
                    (":x", Some(v)) => out.push_str(&format!("{v:x}")),
                    (":b", Some(v)) => out.push_str(&format!("{v:b}")),
                    (_, Some(v)) => out.push_str(&v.to_string()),
                }
                rest = &rest[end + 1..];
            }
            _ => {
                out.push_str(&rest[..1]);
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// A named source of hardware log records. Names are hierarchical, with
/// levels separated by periods, e.g. `core.fifo`.
#[derive(Debug, Clone, Copy)]
pub struct HardwareLogger {
    name: Id,
}

impl HardwareLogger {
    pub fn new<S: Into<Id>>(name: S) -> Self {
        HardwareLogger { name: name.into() }
    }

    pub fn name(&self) -> Id {
        self.name
    }

    /// Register a record. The record fires in cycles in which `trigger` is
    /// high and the enclosing control blocks, bodies included, are active.
    #[track_caller]
    pub fn log<E: Into<Expr>>(
        &self,
        m: &mut TModule,
        level: LogLevel,
        trigger: E,
        format: &str,
        args: &[Expr],
    ) {
        let pos = GPosIdx::caller();
        let trigger_sig = m.signal(format!("{}_log_trigger", self.name), 1);
        m.comb(trigger_sig, trigger);
        let fields = args
            .iter()
            .enumerate()
            .map(|(i, arg)| {
                let sig = m.signal(format!("{}_log_field{i}", self.name), arg.width());
                m.top_comb(sig, arg.clone());
                sig
            })
            .collect();
        m.registry_mut().logs.push(LogRecord {
            logger: self.name,
            level,
            format: format.to_string(),
            trigger: trigger_sig,
            fields,
            pos,
        });
    }

    #[track_caller]
    pub fn debug<E: Into<Expr>>(&self, m: &mut TModule, trigger: E, format: &str, args: &[Expr]) {
        self.log(m, LogLevel::Debug, trigger, format, args)
    }

    #[track_caller]
    pub fn info<E: Into<Expr>>(&self, m: &mut TModule, trigger: E, format: &str, args: &[Expr]) {
        self.log(m, LogLevel::Info, trigger, format, args)
    }

    #[track_caller]
    pub fn warning<E: Into<Expr>>(&self, m: &mut TModule, trigger: E, format: &str, args: &[Expr]) {
        self.log(m, LogLevel::Warning, trigger, format, args)
    }

    /// An error record stops the simulation when it fires.
    #[track_caller]
    pub fn error<E: Into<Expr>>(&self, m: &mut TModule, trigger: E, format: &str, args: &[Expr]) {
        self.log(m, LogLevel::Error, trigger, format, args)
    }

    /// An error record that fires when `value` is false.
    #[track_caller]
    pub fn assertion<E: Into<Expr>>(&self, m: &mut TModule, value: E, format: &str, args: &[Expr]) {
        self.log(m, LogLevel::Error, !value.into(), format, args)
    }
}

/// Renders the records that fire in a simulated cycle through `log`.
pub struct LogPrinter<'a> {
    records: Vec<&'a LogRecord>,
}

impl<'a> LogPrinter<'a> {
    /// Print records of at least `level` whose logger name matches
    /// `namespace` anywhere.
    pub fn new(records: &'a [LogRecord], level: LogLevel, namespace: &Regex) -> Self {
        let records = records
            .iter()
            .filter(|r| r.level >= level && namespace.is_match(r.logger.as_str()))
            .collect();
        LogPrinter { records }
    }

    /// Handle the current, settled cycle. Fails with
    /// [SimError::HardwareError] if an error record fired.
    pub fn handle(&self, sim: &Simulator) -> SimResult<()> {
        let mut error = None;
        for record in &self.records {
            if sim.get(record.trigger) == 0 {
                continue;
            }
            let values = record.fields.iter().map(|f| sim.get(*f)).collect::<Vec<_>>();
            let message = record.message(&values);
            let (file, line) = (record.pos.file(), record.pos.line());
            log::log!(
                target: record.logger.as_str(),
                record.level.as_log(),
                "{} [{file}:{line}] {message}",
                sim.cycle()
            );
            if record.level == LogLevel::Error && error.is_none() {
                error = Some(format!("{}: [{file}:{line}] {message}", record.logger));
            }
        }
        match error {
            Some(message) => Err(SimError::HardwareError {
                cycle: sim.cycle(),
                message,
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Context, ElaborationConfig};

    #[test]
    fn formats_placeholders() {
        assert_eq!(format_message("a={} b={:x}", &[3, 255]), "a=3 b=ff");
        assert_eq!(format_message("{{}} {:b}", &[5]), "{} 101");
        assert_eq!(format_message("missing {}", &[]), "missing {}");
    }

    #[test]
    fn assertions_stop_the_simulation() {
        let mut ctx = Context::new("top", ElaborationConfig::default());
        let mut m = ctx.top();
        let cnt = m.register("cnt", 2, 0);
        m.sync(cnt, Expr::from(cnt) + Expr::constant(1, 2));
        let logger = HardwareLogger::new("test.counter");
        logger.info(&mut m, true, "count {}", &[cnt.into()]);
        logger.assertion(&mut m, Expr::from(cnt).neq(Expr::constant(2, 2)), "reached two", &[]);
        drop(m);
        let elab = ctx.finish().unwrap();
        let mut sim = elab.simulator().unwrap();
        let printer = LogPrinter::new(elab.registry.logs(), LogLevel::Debug, &Regex::new("^test").unwrap());
        printer.handle(&sim).unwrap();
        sim.step().unwrap();
        printer.handle(&sim).unwrap();
        sim.step().unwrap();
        let err = printer.handle(&sim).unwrap_err();
        assert!(matches!(err, SimError::HardwareError { cycle: 2, .. }));

        let quiet = LogPrinter::new(elab.registry.logs(), LogLevel::Info, &Regex::new("other").unwrap());
        assert!(quiet.handle(&sim).is_ok());
    }

    #[test]
    fn namespaces_are_regular_expressions() {
        let mut ctx = Context::new("top", ElaborationConfig::default());
        let mut m = ctx.top();
        for name in ["core.fetch", "core.decode", "lsu.store"] {
            HardwareLogger::new(name).info(&mut m, true, "tick", &[]);
        }
        drop(m);
        let elab = ctx.finish().unwrap();
        let count = |pattern: &str| {
            LogPrinter::new(elab.registry.logs(), LogLevel::Debug, &Regex::new(pattern).unwrap())
                .records
                .len()
        };
        assert_eq!(count(".*"), 3);
        assert_eq!(count("^core\\."), 2);
        assert_eq!(count("fetch|store"), 2);
        assert_eq!(count("decode$"), 1);
        assert_eq!(count("^store"), 0);
    }
}
