//! Small designs exercised by the driver.
use crate::prelude::*;
use transactron_core::LogLevel;
use transactron_lib::ConnectTrans;

/// Names accepted by [by_name].
pub const NAMES: [&str; 4] = ["alternation", "priority", "pipeline", "handshake"];

pub fn by_name(name: &str) -> Option<Box<dyn Elaboratable>> {
    match name {
        "alternation" => Some(Box::new(SharedCounter { priority: false })),
        "priority" => Some(Box::new(SharedCounter { priority: true })),
        "pipeline" => Some(Box::new(Pipeline { depth: 4 })),
        "handshake" => Some(Box::new(Handshake)),
        _ => None,
    }
}

/// Two transactions that want to increment the same counter in every cycle.
/// Without priority they take turns; with priority `a` always wins.
pub struct SharedCounter {
    pub priority: bool,
}

impl Elaboratable for SharedCounter {
    fn elaborate(&self, m: &mut TModule) -> TransactronResult<()> {
        let count = m.register("count", 8, 0);
        let last = m.register("last", 1, 0);
        let inc = Method::build("inc").i(1).create(m)?;
        def_method!(m, inc, |m, arg| {
            m.sync(count, Expr::from(count) + Expr::constant(1, 8));
            m.sync(last, arg);
            Ok(Value::empty())
        })?;

        let logger = HardwareLogger::new("demo.counter");
        let a = Transaction::new(m, "a")?;
        body!(m, a, |m| {
            inc.call(m, Expr::constant(0, 1))?;
            logger.debug(m, true, "a increments {}", &[count.into()]);
            Ok(())
        })?;
        let b = Transaction::new(m, "b")?;
        body!(m, b, |m| {
            inc.call(m, Expr::constant(1, 1))?;
            logger.debug(m, true, "b increments {}", &[count.into()]);
            Ok(())
        })?;
        if self.priority {
            a.add_conflict(m, &b, Priority::Left)?;
        }
        Ok(())
    }
}

/// A producer that fills a FIFO with consecutive numbers and a consumer
/// that drains it every other cycle into a running sum.
pub struct Pipeline {
    pub depth: u32,
}

impl Elaboratable for Pipeline {
    fn elaborate(&self, m: &mut TModule) -> TransactronResult<()> {
        let fifo = Fifo::new(m, 8, self.depth)?;
        let produced = m.register("produced", 8, 0);
        let sum = m.register("sum", 8, 0);
        let slow = m.register("slow", 1, 0);
        m.sync(slow, !slow);
        let consumed = HwCounter::new(m, "pipeline.consumed", "values taken from the queue", 16)?;
        let logger = HardwareLogger::new("pipeline");

        let producer = Transaction::new(m, "producer")?;
        body!(m, producer, |m| {
            fifo.write.call(m, produced)?;
            m.sync(produced, Expr::from(produced) + Expr::constant(1, 8));
            Ok(())
        })?;

        let consumer = Transaction::new(m, "consumer")?;
        body!(m, consumer, request = slow, |m| {
            let value = fifo.read.call(m, ())?;
            logger.info(m, true, "consumed {}", &[value.expr().clone()]);
            m.sync(sum, Expr::from(sum) + value);
            consumed.incr(m, true)
        })?;

        let level_width = fifo.level.width;
        logger.assertion(
            m,
            Expr::from(fifo.level).lt(Expr::constant(self.depth as u64 + 1, level_width)),
            "queue level {} out of range",
            &[fifo.level.into()],
        );
        logger.log(
            m,
            LogLevel::Warning,
            Expr::from(fifo.level).eq_const(self.depth as u64),
            "queue full",
            &[],
        );
        Ok(())
    }
}

/// A requester and a responder joined by a [Connect]: the request and its
/// reply travel in the same cycle.
pub struct Handshake;

impl Elaboratable for Handshake {
    fn elaborate(&self, m: &mut TModule) -> TransactronResult<()> {
        let conn = Connect::new(m, 8, 8)?;
        let pipe = Pipe::new(m, 8)?;
        let next = m.register("next", 8, 0);
        let replies = m.register("replies", 8, 0);

        let requester = Transaction::new(m, "requester")?;
        body!(m, requester, |m| {
            let reply = conn.write.call(m, next)?;
            m.sync(next, Expr::from(next) + Expr::constant(1, 8));
            m.sync(replies, reply);
            Ok(())
        })?;

        // The responder answers with the request doubled and keeps a copy in
        // the pipe, which a separate transaction drains.
        let responder = Transaction::new(m, "responder")?;
        body!(m, responder, |m| {
            let reply = m.signal("reply", 8);
            let request = conn.read.call(m, reply)?.into_expr();
            m.top_comb(reply, request.clone() + request);
            pipe.write.call(m, reply)?;
            Ok(())
        })?;
        let sink = Method::build("sink").i(8).create(m)?;
        let last = m.register("last", 8, 0);
        def_method!(m, sink, |m, arg| {
            m.sync(last, arg);
            Ok(Value::empty())
        })?;
        ConnectTrans::new(m, &sink, &pipe.read)?;
        Ok(())
    }
}
