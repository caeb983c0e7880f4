use transactron_core::{Endpoint, Method, Priority, TModule};
use transactron_ir::{Expr, Layout, Signal, Value};
use transactron_utils::{Error, GPosIdx, TransactronResult, bits_for, ceil_log2};

/// A first-in, first-out queue of `depth` entries.
///
/// `write` is ready when the queue is not full and `read` when it is not
/// empty. Both may run in the same cycle. `peek` returns the head without
/// removing it and may be called by any number of transactions. `clear`
/// empties the queue and takes priority over `read` and `write`.
#[derive(Debug, Clone)]
pub struct Fifo {
    pub read: Method,
    pub peek: Method,
    pub write: Method,
    pub clear: Method,
    /// Number of stored entries.
    pub level: Signal,
    /// The oldest entry. Only meaningful while `level` is nonzero.
    pub head: Signal,
    depth: u32,
}

impl Fifo {
    #[track_caller]
    pub fn new<L: Into<Layout>>(m: &mut TModule, layout: L, depth: u32) -> TransactronResult<Self> {
        let pos = GPosIdx::caller();
        if depth == 0 {
            return Err(Error::misc("a FIFO needs at least one entry").with_pos(&pos));
        }
        let layout = layout.into();
        let width = layout.width();
        let mut m = m.child("fifo");
        let m = &mut m;

        let read = Method::build("read").o(layout.clone()).create(m)?;
        let peek = Method::build("peek")
            .o(layout.clone())
            .nonexclusive()
            .create(m)?;
        let write = Method::build("write").i(layout.clone()).create(m)?;
        let clear = Method::build("clear").create(m)?;
        clear.add_conflict(m, &read, Priority::Left)?;
        clear.add_conflict(m, &write, Priority::Left)?;

        let idx_width = ceil_log2(depth as u64).max(1);
        let level_width = bits_for(depth as u64);
        let buff: Vec<Signal> = (0..depth)
            .map(|i| m.register(format!("buff{i}"), width, 0))
            .collect();
        let read_idx = m.register("read_idx", idx_width, 0);
        let write_idx = m.register("write_idx", idx_width, 0);
        let level = m.register("level", level_width, 0);
        let incr = |idx: Signal| {
            Expr::from(idx)
                .eq_const(depth as u64 - 1)
                .mux(Expr::constant(0, idx_width), Expr::from(idx) + Expr::constant(1, idx_width))
        };

        let head = m.signal("head", width);
        m.top_comb(
            head,
            Expr::one_hot_mux(
                width,
                buff.iter()
                    .enumerate()
                    .map(|(i, b)| (Expr::from(read_idx).eq_const(i as u64), Expr::from(*b))),
            ),
        );
        let read_ready = Expr::from(level).neq(Expr::constant(0, level_width));
        let write_ready = Expr::from(level).neq(Expr::constant(depth as u64, level_width));

        let (read_run, write_run) = (Expr::from(read.run), Expr::from(write.run));
        m.if_(read_run.clone() & !write_run.clone(), |m| {
            m.sync(level, Expr::from(level) - Expr::constant(1, level_width));
            Ok(())
        })?;
        m.if_(write_run & !read_run, |m| {
            m.sync(level, Expr::from(level) + Expr::constant(1, level_width));
            Ok(())
        })?;

        write.define(m, write_ready, |m, arg| {
            for (i, b) in buff.iter().enumerate() {
                m.if_(Expr::from(write_idx).eq_const(i as u64), |m| {
                    m.sync(*b, arg.expr().clone());
                    Ok(())
                })?;
            }
            m.sync(write_idx, incr(write_idx));
            Ok(Value::empty())
        })?;

        read.define(m, read_ready.clone(), |m, _| {
            m.sync(read_idx, incr(read_idx));
            Ok(Value::of(head, layout.clone()))
        })?;

        peek.define(m, read_ready, |_, _| Ok(Value::of(head, layout.clone())))?;

        clear.define(m, true, |m, _| {
            m.sync(level, Expr::constant(0, level_width));
            m.sync(read_idx, Expr::constant(0, idx_width));
            m.sync(write_idx, Expr::constant(0, idx_width));
            Ok(Value::empty())
        })?;

        Ok(Fifo {
            read,
            peek,
            write,
            clear,
            level,
            head,
            depth,
        })
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }
}

/// A counting semaphore holding up to `max_count` permits.
///
/// `acquire` is ready while fewer than `max_count` permits are taken and
/// `release` while at least one is. Both may run in the same cycle. `clear`
/// returns every permit and takes priority over the other two.
#[derive(Debug, Clone)]
pub struct Semaphore {
    pub acquire: Method,
    pub release: Method,
    pub clear: Method,
    /// Number of taken permits.
    pub count: Signal,
}

impl Semaphore {
    #[track_caller]
    pub fn new(m: &mut TModule, max_count: u32) -> TransactronResult<Self> {
        let pos = GPosIdx::caller();
        if max_count == 0 {
            return Err(Error::misc("a semaphore needs at least one permit").with_pos(&pos));
        }
        let width = bits_for(max_count as u64);
        let mut m = m.child("semaphore");
        let m = &mut m;

        let acquire = Method::build("acquire").create(m)?;
        let release = Method::build("release").create(m)?;
        let clear = Method::build("clear").create(m)?;
        clear.add_conflict(m, &acquire, Priority::Left)?;
        clear.add_conflict(m, &release, Priority::Left)?;

        let count = m.register("count", width, 0);
        m.if_(clear.run, |m| {
            m.sync(count, Expr::constant(0, width));
            Ok(())
        })?;
        m.else_(|m| {
            let acquired = Expr::from(acquire.run).resize(width);
            let released = Expr::from(release.run).resize(width);
            m.sync(count, count + acquired - released);
            Ok(())
        })?;

        let acquire_ready = Expr::from(count).lt(Expr::constant(max_count as u64, width));
        let release_ready = Expr::from(count).neq(Expr::constant(0, width));
        acquire.define(m, acquire_ready, |_, _| Ok(Value::empty()))?;
        release.define(m, release_ready, |_, _| Ok(Value::empty()))?;
        clear.define(m, true, |_, _| Ok(Value::empty()))?;

        Ok(Semaphore {
            acquire,
            release,
            clear,
            count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::AdapterTrans;
    use transactron_core::{Context, ElaborationConfig};
    use transactron_utils::ErrorKind;

    #[test]
    fn keeps_order_and_blocks_when_full() {
        let mut ctx = Context::new("top", ElaborationConfig::default());
        let mut m = ctx.top();
        let fifo = Fifo::new(&mut m, 8, 2).unwrap();
        let write = AdapterTrans::new(&mut m, &fifo.write).unwrap();
        let read = AdapterTrans::new(&mut m, &fifo.read).unwrap();
        let peek = AdapterTrans::new(&mut m, &fifo.peek).unwrap();
        drop(m);
        let elab = ctx.finish().unwrap();
        let mut sim = elab.simulator().unwrap();

        sim.set(read.en, 1).unwrap();
        assert_eq!(sim.get(read.done), 0);
        sim.set(read.en, 0).unwrap();

        sim.set(write.en, 1).unwrap();
        for v in [5, 6] {
            sim.set(write.data_in, v).unwrap();
            assert_eq!(sim.get(write.done), 1);
            sim.step().unwrap();
        }
        assert_eq!(sim.get(fifo.level), 2);

        sim.set(write.data_in, 7).unwrap();
        assert_eq!(sim.get(write.done), 0);
        sim.set(peek.en, 1).unwrap();
        assert_eq!(sim.get(peek.data_out), 5);
        sim.set(read.en, 1).unwrap();
        assert_eq!(sim.get(read.done), 1);
        assert_eq!(sim.get(read.data_out), 5);
        sim.step().unwrap();

        // One entry left: the write and the read go through together.
        assert_eq!(sim.get(write.done), 1);
        assert_eq!(sim.get(read.data_out), 6);
        sim.step().unwrap();
        assert_eq!(sim.get(fifo.level), 1);
        assert_eq!(sim.get(read.data_out), 7);
    }

    #[test]
    fn clear_empties_the_queue() {
        let mut ctx = Context::new("top", ElaborationConfig::default());
        let mut m = ctx.top();
        let fifo = Fifo::new(&mut m, 4, 3).unwrap();
        let write = AdapterTrans::new(&mut m, &fifo.write).unwrap();
        let clear = AdapterTrans::new(&mut m, &fifo.clear).unwrap();
        drop(m);
        let elab = ctx.finish().unwrap();
        let mut sim = elab.simulator().unwrap();

        sim.set(write.en, 1).unwrap();
        sim.set(write.data_in, 3).unwrap();
        sim.run(2).unwrap();
        assert_eq!(sim.get(fifo.level), 2);
        sim.set(clear.en, 1).unwrap();
        assert_eq!(sim.get(clear.done), 1);
        assert_eq!(sim.get(write.done), 0);
        sim.step().unwrap();
        assert_eq!(sim.get(fifo.level), 0);
    }

    #[test]
    fn rejects_empty_queues() {
        let mut ctx = Context::new("top", ElaborationConfig::default());
        let mut m = ctx.top();
        let err = Fifo::new(&mut m, 4, 0).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Misc(_)));
    }

    #[test]
    fn semaphore_counts_permits() {
        let mut ctx = Context::new("top", ElaborationConfig::default());
        let mut m = ctx.top();
        let sem = Semaphore::new(&mut m, 2).unwrap();
        let acquire = AdapterTrans::new(&mut m, &sem.acquire).unwrap();
        let release = AdapterTrans::new(&mut m, &sem.release).unwrap();
        let clear = AdapterTrans::new(&mut m, &sem.clear).unwrap();
        drop(m);
        let elab = ctx.finish().unwrap();
        let mut sim = elab.simulator().unwrap();

        sim.set(release.en, 1).unwrap();
        assert_eq!(sim.get(release.done), 0);
        sim.set(release.en, 0).unwrap();

        sim.set(acquire.en, 1).unwrap();
        sim.run(2).unwrap();
        assert_eq!(sim.get(sem.count), 2);
        assert_eq!(sim.get(acquire.done), 0);

        sim.set(release.en, 1).unwrap();
        assert_eq!(sim.get(release.done), 1);
        sim.step().unwrap();
        assert_eq!(sim.get(sem.count), 1);
        assert_eq!((sim.get(acquire.done), sim.get(release.done)), (1, 1));
        sim.step().unwrap();
        assert_eq!(sim.get(sem.count), 1);

        sim.set(clear.en, 1).unwrap();
        assert_eq!(sim.get(clear.done), 1);
        assert_eq!((sim.get(acquire.done), sim.get(release.done)), (0, 0));
        sim.step().unwrap();
        assert_eq!(sim.get(sem.count), 0);
    }

    #[test]
    fn rejects_semaphores_without_permits() {
        let mut ctx = Context::new("top", ElaborationConfig::default());
        let mut m = ctx.top();
        let err = Semaphore::new(&mut m, 0).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Misc(_)));
    }
}
