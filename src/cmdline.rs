use argh::FromArgs;
use std::path::PathBuf;
use transactron_core::{LogLevel, SchedulerKind};

#[derive(FromArgs, Debug)]
#[argh(help_triggers("-h", "--help"))]
/// Elaborate and simulate a Transactron demo design
pub struct Opts {
    /// design to elaborate, see --list-designs
    #[argh(positional, default = "String::from(\"pipeline\")")]
    pub design: String,

    /// number of cycles to simulate
    #[argh(option, short = 'n', default = "20")]
    pub cycles: u64,

    /// scheduler generated for each conflict component: round-robin or eager
    #[argh(option, default = "SchedulerKind::RoundRobin")]
    pub scheduler: SchedulerKind,

    /// write the netlist to this file
    #[argh(option)]
    pub netlist: Option<PathBuf>,

    /// write the generation info, as JSON, to this file
    #[argh(option, long = "gen-info")]
    pub gen_info: Option<PathBuf>,

    /// write the profile of the simulation, as JSON, to this file
    #[argh(option)]
    pub profile: Option<PathBuf>,

    /// logging level of the tool
    #[argh(option, long = "log-level", default = "log::LevelFilter::Warn")]
    pub log_level: log::LevelFilter,

    /// lowest level of hardware log records to print
    #[argh(option, long = "hw-log-level", default = "LogLevel::Info")]
    pub hw_log_level: LogLevel,

    /// only print hardware log records whose logger name matches this regular
    /// expression
    #[argh(option, long = "hw-log-filter", default = "String::from(\".*\")")]
    pub hw_log_filter: String,

    /// print the per-transaction statistics as JSON
    #[argh(switch, long = "stats-json")]
    pub stats_json: bool,

    /// generate hardware metrics
    #[argh(switch)]
    pub metrics: bool,

    /// emit the elaboration report at info level
    #[argh(switch, short = 'v')]
    pub verbose: bool,

    /// list the available designs and exit
    #[argh(switch, long = "list-designs")]
    pub list_designs: bool,
}
