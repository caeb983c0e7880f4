//! Helpers for request-response style interfaces.
use crate::connectors::Forwarder;
use crate::fifo::Fifo;
use transactron_core::{Method, TModule};
use transactron_ir::{Expr, Layout, Value};
use transactron_utils::{Error, GPosIdx, TransactronResult, ceil_log2};

/// Pairs the arguments of a request with the results that come back for it.
///
/// Arguments wait in a two-entry FIFO and results in a [Forwarder], so the
/// callee has to keep offering a result until `read` takes it. A full FIFO
/// blocks `write_args`, which limits the number of requests in flight.
#[derive(Debug, Clone)]
pub struct ArgumentsToResultsZipper {
    pub write_args: Method,
    pub write_results: Method,
    /// Returns a struct with the fields `args` and `results`.
    pub read: Method,
}

impl ArgumentsToResultsZipper {
    #[track_caller]
    pub fn new<A, R>(m: &mut TModule, args_layout: A, results_layout: R) -> TransactronResult<Self>
    where
        A: Into<Layout>,
        R: Into<Layout>,
    {
        let (args_layout, results_layout) = (args_layout.into(), results_layout.into());
        let output_layout = Layout::structure([
            ("args", args_layout.clone()),
            ("results", results_layout.clone()),
        ]);
        let mut m = m.child("zipper");
        let m = &mut m;

        let fifo = Fifo::new(m, args_layout.clone(), 2)?;
        let forwarder = Forwarder::new(m, results_layout.clone())?;

        let write_args = Method::build("write_args").i(args_layout).create(m)?;
        let write_results = Method::build("write_results").i(results_layout).create(m)?;
        let read = Method::build("read").o(output_layout.clone()).create(m)?;

        write_args.proxy(m, &fifo.write)?;
        write_results.proxy(m, &forwarder.write)?;
        read.define(m, true, |m, _| {
            let args = fifo.read.call(m, ())?;
            let results = forwarder.read.call(m, ())?;
            Value::from_fields(
                &output_layout,
                [("args", args.into_expr()), ("results", results.into_expr())],
            )
        })?;

        Ok(ArgumentsToResultsZipper {
            write_args,
            write_results,
            read,
        })
    }
}

/// Lets several clients share a server that takes requests through one
/// method and answers them in order through another.
///
/// Request `i` goes through `serialize_in[i]` and its response comes back
/// through `serialize_out[i]`. Up to `depth` requests may be waiting for a
/// response.
#[derive(Debug, Clone)]
pub struct Serializer {
    pub serialize_in: Vec<Method>,
    pub serialize_out: Vec<Method>,
    /// Forgets every pending request.
    pub clear: Method,
}

impl Serializer {
    #[track_caller]
    pub fn new(
        m: &mut TModule,
        port_count: u32,
        request: &Method,
        response: &Method,
        depth: u32,
    ) -> TransactronResult<Self> {
        let pos = GPosIdx::caller();
        if port_count == 0 {
            return Err(Error::misc("a serializer needs at least one port").with_pos(&pos));
        }
        let id_width = ceil_log2(port_count as u64).max(1);
        let mut m = m.child("serializer");
        let m = &mut m;

        let pending = Fifo::new(m, id_width, depth)?;
        let mut serialize_in = Vec::with_capacity(port_count as usize);
        let mut serialize_out = Vec::with_capacity(port_count as usize);
        for i in 0..port_count as u64 {
            let input = Method::like(m, format!("serialize_in{i}"), request)?;
            input.define(m, true, |m, arg| {
                pending.write.call(m, Expr::constant(i, id_width))?;
                request.call(m, arg)
            })?;
            serialize_in.push(input);

            let output = Method::like(m, format!("serialize_out{i}"), response)?;
            let owns_head = Expr::from(pending.head).eq_const(i);
            output.define(m, owns_head, |m, arg| {
                pending.read.call(m, ())?;
                response.call(m, arg)
            })?;
            serialize_out.push(output);
        }

        let clear = Method::build("clear").create(m)?;
        clear.proxy(m, &pending.clear)?;
        log::debug!("serializer with {port_count} ports and {depth} pending requests");

        Ok(Serializer {
            serialize_in,
            serialize_out,
            clear,
        })
    }
}
