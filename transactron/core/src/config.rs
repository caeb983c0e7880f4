use std::str::FromStr;

/// Environment variable that forces the elaboration report.
pub const VERBOSE_ENV: &str = "TRANSACTRON_VERBOSE";

/// Which scheduler is generated for each connected component of the
/// conflict graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulerKind {
    /// A rotating pointer selects which transaction is served first.
    #[default]
    RoundRobin,
    /// Transactions are always served in priority order.
    Eager,
}

impl FromStr for SchedulerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "round-robin" | "rr" => Ok(SchedulerKind::RoundRobin),
            "eager" => Ok(SchedulerKind::Eager),
            _ => Err(format!(
                "unknown scheduler `{s}', expected `round-robin' or `eager'"
            )),
        }
    }
}

impl std::fmt::Display for SchedulerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedulerKind::RoundRobin => write!(f, "round-robin"),
            SchedulerKind::Eager => write!(f, "eager"),
        }
    }
}

/// Options that control elaboration.
#[derive(Debug, Clone, Default)]
pub struct ElaborationConfig {
    pub scheduler: SchedulerKind,
    /// Emit the per-transaction and per-method report at `info` level.
    pub verbose: bool,
    /// Generate hardware metrics registers.
    pub metrics: bool,
}

impl ElaborationConfig {
    /// The default configuration, made verbose when `TRANSACTRON_VERBOSE`
    /// is set to a non-empty value.
    pub fn from_env() -> Self {
        let verbose = std::env::var(VERBOSE_ENV).is_ok_and(|v| !v.is_empty());
        Self::default().verbose(verbose)
    }

    pub fn scheduler(mut self, scheduler: SchedulerKind) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn metrics(mut self, metrics: bool) -> Self {
        self.metrics = metrics;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scheduler_kinds() {
        assert_eq!("eager".parse::<SchedulerKind>(), Ok(SchedulerKind::Eager));
        assert_eq!("rr".parse::<SchedulerKind>(), Ok(SchedulerKind::RoundRobin));
        assert!("fifo".parse::<SchedulerKind>().is_err());
        let config = ElaborationConfig::default().metrics(true);
        assert_eq!(config.scheduler, SchedulerKind::RoundRobin);
        assert!(config.metrics && !config.verbose);
    }
}
