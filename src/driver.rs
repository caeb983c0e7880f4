//! Driver for the demo designs.
use crate::cmdline::Opts;
use crate::designs;
use anyhow::{Context as _, anyhow};
use itertools::Itertools;
use regex::Regex;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use transactron_core::{
    Elaboratable, Elaborated, ElaborationConfig, LogLevel, Profile, elaborate,
    profiler::RunStatNode,
};

/// What a simulation run produced.
#[derive(Debug)]
pub struct Run {
    pub profile: Profile,
    /// Final value of every metric register, keyed by `metric.register`.
    pub metrics: BTreeMap<String, u64>,
}

/// Elaborate `design` as the top module `name`.
pub fn elaborate_design(
    name: &str,
    design: &dyn Elaboratable,
    config: ElaborationConfig,
) -> anyhow::Result<Elaborated> {
    Ok(elaborate(name, design, config)?)
}

/// Simulate `cycles` cycles, sampling the profile and printing the hardware
/// log records of at least `level` from loggers whose name matches the
/// regular expression `filter`.
pub fn simulate(
    elab: &Elaborated,
    cycles: u64,
    level: LogLevel,
    filter: &str,
) -> anyhow::Result<Run> {
    let filter =
        Regex::new(filter).with_context(|| format!("invalid log filter `{filter}'"))?;
    let mut sim = elab.simulator()?;
    let mut collector = elab.profile_collector();
    let printer = elab.log_printer(level, &filter);
    for _ in 0..cycles {
        collector.sample(&sim);
        printer.handle(&sim)?;
        sim.step()?;
    }
    let sim = &sim;
    let metrics = elab
        .registry
        .metrics()
        .iter()
        .flat_map(|metric| {
            metric.regs.iter().map(move |reg| {
                (format!("{}.{}", metric.name, reg.name), sim.get(reg.signal))
            })
        })
        .collect();
    Ok(Run {
        profile: collector.finish(),
        metrics,
    })
}

fn write_stats<W: Write>(out: &mut W, stats: &[RunStatNode], depth: usize) -> std::io::Result<()> {
    for node in stats {
        writeln!(
            out,
            "{:indent$}{:<24} run {:>5}  locked {:>5}  {}",
            "",
            node.stat.name,
            node.stat.run,
            node.stat.locked,
            node.stat.src_loc,
            indent = depth * 2
        )?;
        write_stats(out, &node.callers.values().cloned().collect_vec(), depth + 1)?;
    }
    Ok(())
}

/// Run the driver from the command line.
pub fn run() -> anyhow::Result<()> {
    let opts: Opts = argh::from_env();

    env_logger::Builder::new()
        .format_timestamp(None)
        .filter_level(opts.log_level)
        .target(env_logger::Target::Stderr)
        .init();

    if opts.list_designs {
        println!("{}", designs::NAMES.iter().map(|n| format!("- {n}")).join("\n"));
        return Ok(());
    }

    let design = designs::by_name(&opts.design).ok_or_else(|| {
        anyhow!(
            "unknown design `{}', expected one of: {}",
            opts.design,
            designs::NAMES.join(", ")
        )
    })?;
    let config = ElaborationConfig::from_env();
    let verbose = config.verbose || opts.verbose;
    let config = config
        .scheduler(opts.scheduler)
        .metrics(opts.metrics)
        .verbose(verbose);
    log::info!("elaborating `{}' with the {} scheduler", opts.design, config.scheduler);
    let elab = elaborate_design(&opts.design, design.as_ref(), config)?;

    if let Some(path) = &opts.netlist {
        let mut out = BufWriter::new(
            File::create(path).with_context(|| format!("cannot create {}", path.display()))?,
        );
        elab.write_netlist(&mut out)?;
        out.flush()?;
    }
    if let Some(path) = &opts.gen_info {
        elab.gen_info
            .encode(path)
            .with_context(|| format!("cannot write {}", path.display()))?;
    }

    let run = simulate(&elab, opts.cycles, opts.hw_log_level, &opts.hw_log_filter)?;
    if let Some(path) = &opts.profile {
        run.profile
            .encode(path)
            .with_context(|| format!("cannot write {}", path.display()))?;
    }

    let stats = run.profile.analyze_transactions(true);
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if opts.stats_json {
        serde_json::to_writer_pretty(&mut out, &stats)?;
        writeln!(out)?;
    } else {
        writeln!(out, "{} cycles of `{}'", opts.cycles, opts.design)?;
        write_stats(&mut out, &stats, 0)?;
        for (name, value) in &run.metrics {
            writeln!(out, "{name} = {value}")?;
        }
    }
    Ok(())
}
