//! Hardware metrics: registers that count events in the simulated design.
//!
//! Metrics are generated only when [ElaborationConfig::metrics] is set.
//! Otherwise every metric elaborates to nothing and its operations are
//! no-ops.
//!
//! [ElaborationConfig::metrics]: crate::config::ElaborationConfig::metrics
use crate::context::TModule;
use crate::method::Method;
use itertools::Itertools;
use transactron_ir::{Expr, Layout, Signal, Value};
use transactron_utils::{Error, GPosIdx, TransactronResult, bits_for};

/// A register that holds the value of a metric.
#[derive(Debug, Clone)]
pub struct MetricRegister {
    pub name: String,
    pub description: String,
    pub signal: Signal,
}

#[derive(Debug, Clone)]
pub struct MetricInfo {
    /// Fully qualified name, with levels separated by periods.
    pub name: String,
    pub description: String,
    pub regs: Vec<MetricRegister>,
}

fn check_unique(m: &TModule, name: &str, pos: &GPosIdx) -> TransactronResult<()> {
    if m.registry().metrics().iter().any(|info| info.name == name) {
        return Err(Error::misc(format!("metric `{name}` is already registered")).with_pos(pos));
    }
    Ok(())
}

fn metric_register(
    name: impl Into<String>,
    description: impl Into<String>,
    signal: Signal,
) -> MetricRegister {
    MetricRegister {
        name: name.into(),
        description: description.into(),
        signal,
    }
}

/// Counts the cycles in which its `incr` method runs.
#[derive(Debug, Clone)]
pub struct HwCounter {
    name: String,
    inner: Option<(Method, Signal)>,
}

impl HwCounter {
    #[track_caller]
    pub fn new(
        m: &mut TModule,
        name: &str,
        description: &str,
        width: u32,
    ) -> TransactronResult<Self> {
        let pos = GPosIdx::caller();
        if !m.config().metrics {
            return Ok(HwCounter {
                name: name.to_string(),
                inner: None,
            });
        }
        check_unique(m, name, &pos)?;

        let mut cm = m.child(name.replace('.', "_"));
        let count = cm.register("count", width, 0);
        let incr = Method::build("incr").create(&mut cm)?;
        incr.define(&mut cm, true, |m, _| {
            m.sync(count, Expr::from(count) + Expr::constant(1, width));
            Ok(Value::empty())
        })?;

        cm.registry_mut().metrics.push(MetricInfo {
            name: name.to_string(),
            description: description.to_string(),
            regs: vec![MetricRegister {
                name: "count".to_string(),
                description: "the value of the counter".to_string(),
                signal: count,
            }],
        });
        log::debug!("registered metric `{name}'");
        Ok(HwCounter {
            name: name.to_string(),
            inner: Some((incr, count)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// The counter register, if metrics are enabled.
    pub fn count(&self) -> Option<Signal> {
        self.inner.as_ref().map(|(_, count)| *count)
    }

    /// Increment the counter in cycles in which the enclosing body runs and
    /// `cond` holds.
    #[track_caller]
    pub fn incr<E: Into<Expr>>(&self, m: &mut TModule, cond: E) -> TransactronResult<()> {
        match &self.inner {
            Some((incr, _)) => incr.call_if(m, cond, ()).map(|_| ()),
            None => Ok(()),
        }
    }
}

/// A family of counters, one per tag. A single counter is incremented at a
/// time, selected by the tag passed to [incr](TaggedCounter::incr).
///
/// When every tag is a power of two the tag is read as a one-hot value and
/// each counter tests a single bit of it.
#[derive(Debug, Clone)]
pub struct TaggedCounter {
    name: String,
    tag_width: u32,
    one_hot: bool,
    inner: Option<(Method, Vec<(u64, Signal)>)>,
}

impl TaggedCounter {
    #[track_caller]
    pub fn new(
        m: &mut TModule,
        name: &str,
        description: &str,
        tags: &[u64],
        width: u32,
    ) -> TransactronResult<Self> {
        let pos = GPosIdx::caller();
        let Some(&max_tag) = tags.iter().max() else {
            return Err(Error::misc(format!("tagged counter `{name}` has no tags")).with_pos(&pos));
        };
        if let Some(dup) = tags.iter().duplicates().next() {
            return Err(Error::misc(format!("tag {dup} of `{name}` is given twice")).with_pos(&pos));
        }
        let tag_width = bits_for(max_tag);
        let one_hot = tags.iter().all(|t| t.is_power_of_two());
        if !m.config().metrics {
            return Ok(TaggedCounter {
                name: name.to_string(),
                tag_width,
                one_hot,
                inner: None,
            });
        }
        check_unique(m, name, &pos)?;

        let mut cm = m.child(name.replace('.', "_"));
        let counters = tags
            .iter()
            .sorted()
            .map(|&tag| (tag, cm.register(format!("count_{tag}"), width, 0)))
            .collect_vec();
        let incr = Method::build("incr").i(tag_width).create(&mut cm)?;
        incr.define(&mut cm, true, |m, tag| {
            for &(value, count) in &counters {
                let hit = if one_hot {
                    tag.expr().clone().get_bit(value.trailing_zeros())
                } else {
                    tag.expr().clone().eq_const(value)
                };
                m.if_(hit, |m| {
                    m.sync(count, count + Expr::constant(1, width));
                    Ok(())
                })?;
            }
            Ok(Value::empty())
        })?;

        let regs = counters
            .iter()
            .map(|&(value, count)| {
                let shown = if one_hot {
                    format!("1<<{}", value.trailing_zeros())
                } else {
                    value.to_string()
                };
                metric_register(
                    value.to_string(),
                    format!("the counter for tag {value} (value={shown})"),
                    count,
                )
            })
            .collect();
        cm.registry_mut().metrics.push(MetricInfo {
            name: name.to_string(),
            description: description.to_string(),
            regs,
        });
        log::debug!("registered tagged metric `{name}' with {} tags", counters.len());
        Ok(TaggedCounter {
            name: name.to_string(),
            tag_width,
            one_hot,
            inner: Some((incr, counters)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag_width(&self) -> u32 {
        self.tag_width
    }

    pub fn one_hot(&self) -> bool {
        self.one_hot
    }

    /// The register counting `tag`, if metrics are enabled.
    pub fn counter(&self, tag: u64) -> Option<Signal> {
        let (_, counters) = self.inner.as_ref()?;
        counters.iter().find(|(t, _)| *t == tag).map(|(_, c)| *c)
    }

    /// Increment the counter of `tag` when `cond` holds.
    #[track_caller]
    pub fn incr<T, E>(&self, m: &mut TModule, tag: T, cond: E) -> TransactronResult<()>
    where
        T: Into<Expr>,
        E: Into<Expr>,
    {
        match &self.inner {
            Some((incr, _)) => {
                let tag = Value::new(tag.into(), Layout::bits(self.tag_width));
                incr.call_if(m, cond, tag).map(|_| ())
            }
            None => Ok(()),
        }
    }
}

/// Registers of an enabled [HwExpHistogram].
#[derive(Debug, Clone)]
pub struct HistogramRegs {
    pub count: Signal,
    pub sum: Signal,
    pub min: Signal,
    pub max: Signal,
    pub buckets: Vec<Signal>,
}

/// A histogram of samples over buckets of exponentially growing size:
/// `[0, 1)`, `[1, 2)`, `[2, 4)` and so on, the last bucket being unbounded.
/// It also tracks the number of samples, their sum and the extreme values.
#[derive(Debug, Clone)]
pub struct HwExpHistogram {
    name: String,
    sample_width: u32,
    inner: Option<(Method, HistogramRegs)>,
}

impl HwExpHistogram {
    #[track_caller]
    pub fn new(
        m: &mut TModule,
        name: &str,
        description: &str,
        bucket_count: u32,
        sample_width: u32,
        width: u32,
    ) -> TransactronResult<Self> {
        let pos = GPosIdx::caller();
        if bucket_count < 2 {
            return Err(Error::misc(format!("histogram `{name}` needs at least two buckets")).with_pos(&pos));
        }
        if !m.config().metrics {
            return Ok(HwExpHistogram {
                name: name.to_string(),
                sample_width,
                inner: None,
            });
        }
        check_unique(m, name, &pos)?;

        let mut cm = m.child(name.replace('.', "_"));
        let regs = HistogramRegs {
            count: cm.register("count", width, 0),
            sum: cm.register("sum", width, 0),
            min: cm.register("min", sample_width, transactron_utils::math::mask(sample_width)),
            max: cm.register("max", sample_width, 0),
            buckets: (0..bucket_count)
                .map(|i| cm.register(format!("bucket{i}"), width, 0))
                .collect(),
        };

        // Bounds past the sample width are never reached.
        let at_least = |sample: &Expr, log: u32| {
            if log >= sample_width {
                Expr::zero()
            } else {
                sample.clone().geq(Expr::constant(1 << log, sample_width))
            }
        };
        let below = |sample: &Expr, log: u32| {
            if log >= sample_width {
                Expr::one()
            } else {
                sample.clone().lt(Expr::constant(1 << log, sample_width))
            }
        };

        let add = Method::build("add").i(sample_width).create(&mut cm)?;
        add.define(&mut cm, true, |m, sample| {
            let sample = sample.into_expr();
            m.sync(regs.count, regs.count + Expr::constant(1, width));
            m.sync(regs.sum, regs.sum + sample.clone().resize(width));
            m.if_(Expr::from(regs.max).lt(sample.clone()), |m| {
                m.sync(regs.max, sample.clone());
                Ok(())
            })?;
            m.if_(sample.clone().lt(regs.min), |m| {
                m.sync(regs.min, sample.clone());
                Ok(())
            })?;
            let last = bucket_count - 1;
            for (i, &bucket) in regs.buckets.iter().enumerate() {
                let i = i as u32;
                let hit = match i {
                    0 => sample.clone().eq_const(0),
                    _ if i == last => at_least(&sample, i - 1),
                    _ => at_least(&sample, i - 1) & below(&sample, i),
                };
                m.if_(hit, |m| {
                    m.sync(bucket, bucket + Expr::constant(1, width));
                    Ok(())
                })?;
            }
            Ok(Value::empty())
        })?;

        let mut metric_regs = vec![
            metric_register("count", "the count of events that have been observed", regs.count),
            metric_register("sum", "the total sum of all observed values", regs.sum),
            metric_register("max", "the maximum of all observed values", regs.max),
            metric_register("min", "the minimum of all observed values", regs.min),
        ];
        for (i, &bucket) in regs.buckets.iter().enumerate() {
            let start = if i == 0 { 0 } else { 1u128 << (i - 1) };
            let end = if i as u32 == bucket_count - 1 {
                "inf".to_string()
            } else {
                (1u128 << i).to_string()
            };
            metric_regs.push(metric_register(
                format!("bucket-{end}"),
                format!("the cumulative counter for the observation bucket [{start}, {end})"),
                bucket,
            ));
        }
        cm.registry_mut().metrics.push(MetricInfo {
            name: name.to_string(),
            description: description.to_string(),
            regs: metric_regs,
        });
        log::debug!("registered histogram `{name}' with {bucket_count} buckets");
        Ok(HwExpHistogram {
            name: name.to_string(),
            sample_width,
            inner: Some((add, regs)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sample_width(&self) -> u32 {
        self.sample_width
    }

    pub fn regs(&self) -> Option<&HistogramRegs> {
        self.inner.as_ref().map(|(_, regs)| regs)
    }

    /// Record `sample` in cycles in which the enclosing body runs.
    #[track_caller]
    pub fn add<E: Into<Expr>>(&self, m: &mut TModule, sample: E) -> TransactronResult<()> {
        match &self.inner {
            Some((add, _)) => {
                let sample = Value::new(sample.into(), Layout::bits(self.sample_width));
                add.call(m, sample).map(|_| ())
            }
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Context, ElaborationConfig, Transaction};
    use transactron_utils::ErrorKind;

    #[test]
    fn counts_runs_when_enabled() {
        let mut ctx = Context::new("top", ElaborationConfig::default().metrics(true));
        let mut m = ctx.top();
        let counter = HwCounter::new(&mut m, "test.events", "events seen", 4).unwrap();
        let odd = m.register("odd", 1, 0);
        m.sync(odd, !odd);
        let t = Transaction::new(&mut m, "t").unwrap();
        t.body(&mut m, true, |m| counter.incr(m, odd)).unwrap();
        let err = HwCounter::new(&mut m, "test.events", "again", 4).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Misc(_)));
        drop(m);

        let elab = ctx.finish().unwrap();
        let mut sim = elab.simulator().unwrap();
        sim.run(5).unwrap();
        let count = counter.count().unwrap();
        assert_eq!(sim.get(count), 2);
        assert_eq!(elab.registry.metrics()[0].regs[0].signal, count);
    }

    #[test]
    fn disabled_metrics_elaborate_to_nothing() {
        let mut ctx = Context::new("top", ElaborationConfig::default());
        let mut m = ctx.top();
        let counter = HwCounter::new(&mut m, "test.events", "events seen", 4).unwrap();
        let t = Transaction::new(&mut m, "t").unwrap();
        t.body(&mut m, true, |m| counter.incr(m, true)).unwrap();
        assert!(!counter.enabled());
        assert!(m.registry().metrics().is_empty());
        assert_eq!(m.registry().methods().count(), 0);
    }

    #[test]
    fn tagged_counter_counts_each_tag() {
        let mut ctx = Context::new("top", ElaborationConfig::default().metrics(true));
        let mut m = ctx.top();
        let counter = TaggedCounter::new(&mut m, "test.tags", "by tag", &[9, 3, 5], 8).unwrap();
        assert!(!counter.one_hot());
        assert_eq!(counter.tag_width(), 4);
        let tag = m.signal("tag", counter.tag_width());
        let en = m.signal("en", 1);
        let t = Transaction::new(&mut m, "t").unwrap();
        t.body(&mut m, en, |m| counter.incr(m, tag, true)).unwrap();
        drop(m);

        let elab = ctx.finish().unwrap();
        let mut sim = elab.simulator().unwrap();
        sim.set(en, 1).unwrap();
        for v in [3, 5, 3, 7, 9, 3] {
            sim.set(tag, v).unwrap();
            sim.step().unwrap();
        }
        let count = |tag| sim.get(counter.counter(tag).unwrap());
        assert_eq!((count(3), count(5), count(9)), (3, 1, 1));
        let names = elab.registry.metrics()[0].regs.iter().map(|r| r.name.as_str()).collect_vec();
        assert_eq!(names, ["3", "5", "9"]);
    }

    #[test]
    fn power_of_two_tags_are_one_hot() {
        let mut ctx = Context::new("top", ElaborationConfig::default().metrics(true));
        let mut m = ctx.top();
        let counter = TaggedCounter::new(&mut m, "test.onehot", "", &[1, 2, 4], 8).unwrap();
        assert!(counter.one_hot());
        let tag = m.signal("tag", counter.tag_width());
        let t = Transaction::new(&mut m, "t").unwrap();
        t.body(&mut m, true, |m| counter.incr(m, tag, true)).unwrap();
        drop(m);

        let elab = ctx.finish().unwrap();
        assert!(elab.registry.metrics()[0].regs[2].description.contains("1<<2"));
        let mut sim = elab.simulator().unwrap();
        for v in [4, 4, 1, 0] {
            sim.set(tag, v).unwrap();
            sim.step().unwrap();
        }
        assert_eq!(sim.get(counter.counter(4).unwrap()), 2);
        assert_eq!(sim.get(counter.counter(1).unwrap()), 1);
        assert_eq!(sim.get(counter.counter(2).unwrap()), 0);
    }

    #[test]
    fn histogram_sorts_samples_into_buckets() {
        let mut ctx = Context::new("top", ElaborationConfig::default().metrics(true));
        let mut m = ctx.top();
        let hist = HwExpHistogram::new(&mut m, "test.hist", "samples", 4, 4, 16).unwrap();
        let sample = m.signal("sample", 4);
        let t = Transaction::new(&mut m, "t").unwrap();
        t.body(&mut m, true, |m| hist.add(m, sample)).unwrap();
        drop(m);

        let elab = ctx.finish().unwrap();
        let names = elab.registry.metrics()[0].regs.iter().map(|r| r.name.as_str()).collect_vec();
        assert_eq!(
            names,
            ["count", "sum", "max", "min", "bucket-1", "bucket-2", "bucket-4", "bucket-inf"]
        );
        let mut sim = elab.simulator().unwrap();
        let regs = hist.regs().unwrap().clone();
        assert_eq!(sim.get(regs.min), 15);
        for v in [3, 1, 4, 15, 2, 0] {
            sim.set(sample, v).unwrap();
            sim.step().unwrap();
        }
        assert_eq!(sim.get(regs.count), 6);
        assert_eq!(sim.get(regs.sum), 25);
        assert_eq!((sim.get(regs.min), sim.get(regs.max)), (0, 15));
        let buckets = regs.buckets.iter().map(|b| sim.get(*b)).collect_vec();
        assert_eq!(buckets, [1, 1, 2, 2]);
    }

    #[test]
    fn malformed_metrics_are_rejected() {
        let mut ctx = Context::new("top", ElaborationConfig::default().metrics(true));
        let mut m = ctx.top();
        let err = TaggedCounter::new(&mut m, "test.none", "", &[], 8).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Misc(_)));
        let err = TaggedCounter::new(&mut m, "test.dup", "", &[2, 2], 8).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Misc(_)));
        let err = HwExpHistogram::new(&mut m, "test.hist", "", 1, 8, 8).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Misc(_)));
    }

    #[test]
    fn disabled_histograms_ignore_samples() {
        let mut ctx = Context::new("top", ElaborationConfig::default());
        let mut m = ctx.top();
        let hist = HwExpHistogram::new(&mut m, "test.hist", "", 3, 8, 8).unwrap();
        let t = Transaction::new(&mut m, "t").unwrap();
        t.body(&mut m, true, |m| hist.add(m, Expr::constant(5, 8))).unwrap();
        assert!(hist.regs().is_none());
        assert!(m.registry().metrics().is_empty());
    }
}
