//! Addressable storage behind transactional ports.
use itertools::Itertools;
use transactron_core::{Method, TModule};
use transactron_ir::{Expr, Layout, Signal, Value};
use transactron_utils::{Error, GPosIdx, TransactronResult, bits_for};

/// The cells of a memory with a single write port.
#[derive(Debug, Clone)]
struct Cells {
    cells: Vec<Signal>,
    width: u32,
    granularity: Option<u32>,
}

impl Cells {
    fn new(
        m: &mut TModule,
        elem_count: u32,
        width: u32,
        granularity: Option<u32>,
        pos: &GPosIdx,
    ) -> TransactronResult<Self> {
        if elem_count == 0 {
            return Err(Error::misc("a memory needs at least one element").with_pos(pos));
        }
        if let Some(g) = granularity {
            if g == 0 || width % g != 0 {
                return Err(Error::misc(format!(
                    "write granularity {g} does not divide the data width {width}"
                ))
                .with_pos(pos));
            }
        }
        let cells = (0..elem_count)
            .map(|i| m.register(format!("mem{i}"), width, 0))
            .collect();
        Ok(Cells {
            cells,
            width,
            granularity,
        })
    }

    fn addr_width(&self) -> u32 {
        bits_for(self.cells.len() as u64 - 1)
    }

    /// Layout of the write argument: `addr`, `data` and, when writes are
    /// split into parts, a `mask` with one bit per part.
    fn write_layout(&self, data: &Layout) -> Layout {
        let mut fields = vec![
            ("addr", Layout::bits(self.addr_width())),
            ("data", data.clone()),
        ];
        if let Some(g) = self.granularity {
            fields.push(("mask", Layout::bits(self.width / g)));
        }
        Layout::structure(fields)
    }

    fn read(&self, addr: &Expr) -> Expr {
        Expr::one_hot_mux(
            self.width,
            self.cells
                .iter()
                .enumerate()
                .map(|(i, c)| (addr.clone().eq_const(i as u64), Expr::from(*c))),
        )
    }

    /// `old` with the parts selected by the write argument replaced.
    fn merged(&self, old: Expr, arg: &Value) -> TransactronResult<Expr> {
        let data = arg.get("data")?;
        let Some(g) = self.granularity else {
            return Ok(data);
        };
        let mask = arg.get("mask")?;
        Ok(Expr::cat((0..self.width / g).map(|j| {
            let (lo, part) = (j * g, g);
            mask.clone()
                .get_bit(j)
                .mux(data.clone().slice(lo, part), old.clone().slice(lo, part))
        })))
    }

    fn write(&self, m: &mut TModule, arg: &Value) -> TransactronResult<()> {
        let addr = arg.get("addr")?;
        for (i, &cell) in self.cells.iter().enumerate() {
            let value = self.merged(cell.into(), arg)?;
            m.if_(addr.clone().eq_const(i as u64), |m| {
                m.sync(cell, value);
                Ok(())
            })?;
        }
        Ok(())
    }
}

/// A memory with a registered read port.
///
/// `read_req` takes an `addr` and the data appears on `read_resp` from the
/// next cycle on. Two requests may be outstanding; a third one waits until a
/// response is taken. A transparent bank returns the data written to the
/// same address in the cycle of the request.
#[derive(Debug, Clone)]
pub struct MemoryBank {
    pub read_req: Method,
    pub read_resp: Method,
    pub write: Method,
}

impl MemoryBank {
    #[track_caller]
    pub fn new<L: Into<Layout>>(
        m: &mut TModule,
        data_layout: L,
        elem_count: u32,
        granularity: Option<u32>,
        transparent: bool,
    ) -> TransactronResult<Self> {
        let pos = GPosIdx::caller();
        let data_layout = data_layout.into();
        let width = data_layout.width();
        let mut m = m.child("memory_bank");
        let m = &mut m;
        let cells = Cells::new(m, elem_count, width, granularity, &pos)?;

        let read_req = Method::build("read_req")
            .i(Layout::structure([("addr", cells.addr_width())]))
            .create(m)?;
        let read_resp = Method::build("read_resp").o(data_layout.clone()).create(m)?;
        let write = Method::build("write")
            .i(cells.write_layout(&data_layout))
            .create(m)?;

        let read_data = m.register("read_data", width, 0);
        let output_valid = m.register("read_output_valid", 1, 0);
        let overflow_valid = m.register("overflow_valid", 1, 0);
        let overflow_data = m.register("overflow_data", width, 0);

        // An unanswered response moves to the overflow buffer when another
        // request comes in.
        m.if_(
            Expr::from(output_valid) & !overflow_valid & read_req.run & !read_resp.run,
            |m| {
                m.sync(overflow_valid, true);
                m.sync(overflow_data, read_data);
                Ok(())
            },
        )?;
        m.elif(Expr::from(overflow_valid) & read_resp.run, |m| {
            m.sync(overflow_valid, false);
            Ok(())
        })?;
        m.if_(read_req.run, |m| {
            m.sync(output_valid, true);
            Ok(())
        })?;
        m.elif(Expr::from(read_resp.run) & !overflow_valid, |m| {
            m.sync(output_valid, false);
            Ok(())
        })?;

        let write_arg = write.data_in();
        read_req.define(m, !overflow_valid, |m, arg| {
            let addr = arg.get("addr")?;
            let mut value = cells.read(&addr);
            if transparent {
                let same = Expr::from(write.run) & write_arg.get("addr")?.eq(addr);
                value = same.mux(cells.merged(value.clone(), &write_arg)?, value);
            }
            m.sync(read_data, value);
            Ok(Value::empty())
        })?;

        read_resp.define(m, Expr::from(output_valid) | overflow_valid, |_, _| {
            let value = Expr::from(overflow_valid).mux(overflow_data, read_data);
            Ok(Value::new(value, data_layout.clone()))
        })?;

        write.define(m, true, |m, arg| {
            cells.write(m, &arg)?;
            Ok(Value::empty())
        })?;

        Ok(MemoryBank {
            read_req,
            read_resp,
            write,
        })
    }
}

/// A memory whose `read` returns the data in the same cycle. Writes become
/// visible in the next cycle.
#[derive(Debug, Clone)]
pub struct AsyncMemoryBank {
    pub read: Method,
    pub write: Method,
}

impl AsyncMemoryBank {
    #[track_caller]
    pub fn new<L: Into<Layout>>(
        m: &mut TModule,
        data_layout: L,
        elem_count: u32,
        granularity: Option<u32>,
    ) -> TransactronResult<Self> {
        let pos = GPosIdx::caller();
        let data_layout = data_layout.into();
        let mut m = m.child("async_memory_bank");
        let m = &mut m;
        let cells = Cells::new(m, elem_count, data_layout.width(), granularity, &pos)?;

        let read = Method::build("read")
            .i(Layout::structure([("addr", cells.addr_width())]))
            .o(data_layout.clone())
            .create(m)?;
        let write = Method::build("write")
            .i(cells.write_layout(&data_layout))
            .create(m)?;

        read.define(m, true, |_, arg| {
            let addr = arg.get("addr")?;
            Ok(Value::new(cells.read(&addr), data_layout.clone()))
        })?;
        write.define(m, true, |m, arg| {
            cells.write(m, &arg)?;
            Ok(Value::empty())
        })?;

        Ok(AsyncMemoryBank { read, write })
    }
}

/// A memory addressed by content: entries are looked up by comparing a key
/// with the key of every valid entry.
///
/// `push` stores a new entry in a free slot and is ready while one is left.
/// `read` returns the data of a matching entry together with `not_found`,
/// `write` replaces the data of a matching entry and `remove` frees it.
/// When several entries share a key the one in the lowest slot is used.
#[derive(Debug, Clone)]
pub struct ContentAddressableMemory {
    pub read: Method,
    pub write: Method,
    pub remove: Method,
    pub push: Method,
}

impl ContentAddressableMemory {
    #[track_caller]
    pub fn new<A, D>(
        m: &mut TModule,
        address_layout: A,
        data_layout: D,
        entries: u32,
    ) -> TransactronResult<Self>
    where
        A: Into<Layout>,
        D: Into<Layout>,
    {
        let pos = GPosIdx::caller();
        if entries == 0 {
            return Err(Error::misc("a content addressable memory needs at least one entry").with_pos(&pos));
        }
        let (address_layout, data_layout) = (address_layout.into(), data_layout.into());
        let data_width = data_layout.width();
        let mut m = m.child("cam");
        let m = &mut m;

        let key_layout = Layout::structure([("addr", address_layout.clone())]);
        let entry_layout = Layout::structure([
            ("addr", address_layout.clone()),
            ("data", data_layout.clone()),
        ]);
        let read_layout = Layout::structure([("data", data_layout.clone()), ("not_found", 1.into())]);
        let write_layout = Layout::structure([("not_found", 1u32)]);

        let read = Method::build("read")
            .i(key_layout.clone())
            .o(read_layout.clone())
            .create(m)?;
        let write = Method::build("write")
            .i(entry_layout.clone())
            .o(write_layout.clone())
            .create(m)?;
        let remove = Method::build("remove").i(key_layout).create(m)?;
        let push = Method::build("push").i(entry_layout).create(m)?;

        let slots = (0..entries)
            .map(|i| {
                (
                    m.register(format!("valid{i}"), 1, 0),
                    m.register(format!("addr{i}"), address_layout.width(), 0),
                    m.register(format!("data{i}"), data_width, 0),
                )
            })
            .collect_vec();
        let hits = |arg: &Value| -> TransactronResult<Vec<Expr>> {
            let addr = arg.get("addr")?;
            Ok(Expr::priority(
                slots
                    .iter()
                    .map(|&(valid, key, _)| Expr::from(valid) & Expr::from(key).eq(addr.clone())),
            ))
        };

        let full = Expr::and_all(slots.iter().map(|&(valid, _, _)| Expr::from(valid)));
        push.define(m, !full, |m, arg| {
            let free = Expr::priority(slots.iter().map(|&(valid, _, _)| !valid));
            let (addr, data) = (arg.get("addr")?, arg.get("data")?);
            for (&(valid, key, value), chosen) in slots.iter().zip(free) {
                m.if_(chosen, |m| {
                    m.sync(valid, true);
                    m.sync(key, addr.clone());
                    m.sync(value, data.clone());
                    Ok(())
                })?;
            }
            Ok(Value::empty())
        })?;

        write.define(m, true, |m, arg| {
            let hits = hits(&arg)?;
            let data = arg.get("data")?;
            for (&(_, _, value), hit) in slots.iter().zip(hits.iter()) {
                m.if_(hit.clone(), |m| {
                    m.sync(value, data.clone());
                    Ok(())
                })?;
            }
            Value::from_fields(&write_layout, [("not_found", !Expr::or_all(hits))])
        })?;

        read.define(m, true, |_, arg| {
            let hits = hits(&arg)?;
            let data = Expr::one_hot_mux(
                data_width,
                slots
                    .iter()
                    .zip(hits.iter())
                    .map(|(&(_, _, value), hit)| (hit.clone(), Expr::from(value))),
            );
            Value::from_fields(
                &read_layout,
                [("data", data), ("not_found", !Expr::or_all(hits))],
            )
        })?;

        remove.define(m, true, |m, arg| {
            for (&(valid, _, _), hit) in slots.iter().zip(hits(&arg)?) {
                m.if_(hit, |m| {
                    m.sync(valid, false);
                    Ok(())
                })?;
            }
            Ok(Value::empty())
        })?;

        Ok(ContentAddressableMemory {
            read,
            write,
            remove,
            push,
        })
    }
}
