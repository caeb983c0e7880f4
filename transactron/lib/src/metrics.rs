//! Metrics built from library components.
use crate::fifo::Fifo;
use transactron_core::metrics::HwExpHistogram;
use transactron_core::{Method, TModule};
use transactron_ir::{Expr, Value};
use transactron_utils::{Error, GPosIdx, TransactronResult, bits_for};

/// Measures the number of cycles between the start and the stop of events,
/// e.g. the latency of requests, and collects them in a [HwExpHistogram].
///
/// Up to `slots` events may be in flight. They have to stop in the order in
/// which they started. Latencies above `max_latency` wrap around.
#[derive(Debug, Clone)]
pub struct LatencyMeasurer {
    histogram: HwExpHistogram,
    inner: Option<(Method, Method)>,
}

impl LatencyMeasurer {
    #[track_caller]
    pub fn new(
        m: &mut TModule,
        name: &str,
        description: &str,
        slots: u32,
        max_latency: u64,
    ) -> TransactronResult<Self> {
        let pos = GPosIdx::caller();
        if slots == 0 {
            return Err(Error::misc(format!("latency measurer `{name}` needs a slot")).with_pos(&pos));
        }
        let epoch_width = bits_for(max_latency);
        let histogram = HwExpHistogram::new(m, name, description, epoch_width + 1, epoch_width, 32)?;
        if !m.config().metrics {
            return Ok(LatencyMeasurer {
                histogram,
                inner: None,
            });
        }

        let mut m = m.child(format!("{}_latency", name.replace('.', "_")));
        let m = &mut m;
        let fifo = Fifo::new(m, epoch_width, slots)?;
        let epoch = m.register("epoch", epoch_width, 0);
        m.sync(epoch, epoch + Expr::constant(1, epoch_width));

        let start = Method::build("start").create(m)?;
        let stop = Method::build("stop").create(m)?;
        start.define(m, true, |m, _| fifo.write.call(m, epoch))?;
        stop.define(m, true, |m, _| {
            let started = fifo.read.call(m, ())?;
            histogram.add(m, epoch - started.into_expr())?;
            Ok(Value::empty())
        })?;

        Ok(LatencyMeasurer {
            histogram,
            inner: Some((start, stop)),
        })
    }

    pub fn histogram(&self) -> &HwExpHistogram {
        &self.histogram
    }

    /// Start an event. Blocks while every slot is taken.
    #[track_caller]
    pub fn start(&self, m: &mut TModule) -> TransactronResult<()> {
        match &self.inner {
            Some((start, _)) => start.call(m, ()).map(|_| ()),
            None => Ok(()),
        }
    }

    /// Stop the oldest event in flight. Blocks while there is none.
    #[track_caller]
    pub fn stop(&self, m: &mut TModule) -> TransactronResult<()> {
        match &self.inner {
            Some((_, stop)) => stop.call(m, ()).map(|_| ()),
            None => Ok(()),
        }
    }
}
