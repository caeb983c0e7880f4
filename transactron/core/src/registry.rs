//! The registry collects every transaction, method, call and relation
//! declared while a design is elaborated.
use crate::config::ElaborationConfig;
use crate::endpoint::{
    CallRecord, EndpointIdx, EndpointInfo, EndpointKind, MethodFlags, MethodUse, Priority,
    Relation,
};
use crate::hw_log::LogRecord;
use crate::metrics::MetricInfo;
use linked_hash_map::LinkedHashMap;
use transactron_ir::{
    CtrlPath, Expr, Layout, ModuleBuilder, PathPredicate, Value,
};
use transactron_utils::{Error, GPosIdx, Id, IndexedMap, TransactronResult};

pub struct Registry {
    config: ElaborationConfig,
    endpoints: IndexedMap<EndpointIdx, EndpointInfo>,
    /// Bodies that are currently open, innermost last.
    stack: Vec<EndpointIdx>,
    def_counter: usize,
    finalized: bool,
    pub(crate) logs: Vec<LogRecord>,
    pub(crate) metrics: Vec<MetricInfo>,
}

impl Registry {
    pub fn new(config: ElaborationConfig) -> Self {
        Registry {
            config,
            endpoints: IndexedMap::new(),
            stack: vec![],
            def_counter: 0,
            finalized: false,
            logs: vec![],
            metrics: vec![],
        }
    }

    pub fn config(&self) -> &ElaborationConfig {
        &self.config
    }

    pub fn endpoint(&self, idx: EndpointIdx) -> &EndpointInfo {
        &self.endpoints[idx]
    }

    pub(crate) fn endpoint_mut(&mut self, idx: EndpointIdx) -> &mut EndpointInfo {
        &mut self.endpoints[idx]
    }

    pub fn endpoints(&self) -> impl Iterator<Item = (EndpointIdx, &EndpointInfo)> {
        self.endpoints.iter()
    }

    /// Transactions in declaration order.
    pub fn transactions(&self) -> impl Iterator<Item = EndpointIdx> + '_ {
        self.endpoints
            .iter()
            .filter(|(_, e)| e.is_transaction())
            .map(|(idx, _)| idx)
    }

    /// Methods in declaration order.
    pub fn methods(&self) -> impl Iterator<Item = EndpointIdx> + '_ {
        self.endpoints
            .iter()
            .filter(|(_, e)| e.is_method())
            .map(|(idx, _)| idx)
    }

    /// The first endpoint named `name`.
    pub fn find<S: AsRef<str>>(&self, name: S) -> Option<EndpointIdx> {
        let name = name.as_ref();
        self.endpoints
            .iter()
            .find(|(_, e)| e.name == name)
            .map(|(idx, _)| idx)
    }

    pub fn name(&self, idx: EndpointIdx) -> Id {
        self.endpoints[idx].name
    }

    /// Hardware log records, in registration order.
    pub fn logs(&self) -> &[LogRecord] {
        &self.logs
    }

    pub fn metrics(&self) -> &[MetricInfo] {
        &self.metrics
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub(crate) fn set_finalized(&mut self) {
        self.finalized = true;
    }

    fn check_open(&self, what: &str, pos: GPosIdx) -> TransactronResult<()> {
        if self.finalized {
            Err(Error::finalized(what).with_pos(&pos))
        } else {
            Ok(())
        }
    }

    /////////////// Registration ///////////////

    /// Declare a transaction owned by the module of `ir`. Only `inner`
    /// transactions may be given a body while another body is open.
    pub fn register_transaction(
        &mut self,
        ir: &mut ModuleBuilder,
        name: Id,
        pos: GPosIdx,
        inner: bool,
    ) -> TransactronResult<EndpointIdx> {
        self.check_open(&format!("transaction `{name}`"), pos)?;
        let info = EndpointInfo {
            name,
            kind: EndpointKind::Transaction,
            pos,
            module: ir.module(),
            ready: ir.signal(format!("{name}_request"), 1),
            run: ir.signal(format!("{name}_grant"), 1),
            runnable: ir.signal(format!("{name}_runnable"), 1),
            data_in: ir.signal(format!("{name}_data_in"), 0),
            data_out: ir.signal(format!("{name}_data_out"), 0),
            layout_in: Layout::empty(),
            layout_out: Layout::empty(),
            flags: MethodFlags::default(),
            combiner: None,
            validator: None,
            defined: false,
            def_order: 0,
            inner,
            ctrl_path: CtrlPath::default(),
            predicate: PathPredicate::default(),
            uses: LinkedHashMap::new(),
            relations: vec![],
            simultaneous: vec![],
            independent: vec![],
        };
        log::trace!("registered transaction `{name}' at {pos}");
        Ok(self.endpoints.push(info))
    }

    /// Declare a method owned by the module of `ir`.
    pub fn register_method(
        &mut self,
        ir: &mut ModuleBuilder,
        name: Id,
        layout_in: Layout,
        layout_out: Layout,
        flags: MethodFlags,
        pos: GPosIdx,
    ) -> TransactronResult<EndpointIdx> {
        self.check_open(&format!("method `{name}`"), pos)?;
        let ready = ir.signal(format!("{name}_ready"), 1);
        let info = EndpointInfo {
            name,
            kind: EndpointKind::Method,
            pos,
            module: ir.module(),
            ready,
            run: ir.signal(format!("{name}_run"), 1),
            runnable: ready,
            data_in: ir.signal(format!("{name}_data_in"), layout_in.width()),
            data_out: ir.signal(format!("{name}_data_out"), layout_out.width()),
            layout_in,
            layout_out,
            flags,
            combiner: None,
            validator: None,
            defined: false,
            def_order: 0,
            inner: false,
            ctrl_path: CtrlPath::default(),
            predicate: PathPredicate::default(),
            uses: LinkedHashMap::new(),
            relations: vec![],
            simultaneous: vec![],
            independent: vec![],
        };
        log::trace!("registered method `{name}' at {pos}");
        Ok(self.endpoints.push(info))
    }

    /////////////// Bodies ///////////////

    /// The innermost open body.
    pub fn current(&self) -> Option<EndpointIdx> {
        self.stack.last().copied()
    }

    /// Open the body of `idx`. Calls recorded until the matching
    /// [pop_body](Registry::pop_body) are attributed to `idx`.
    pub fn push_body(
        &mut self,
        idx: EndpointIdx,
        ctrl_path: CtrlPath,
        predicate: PathPredicate,
    ) -> TransactronResult<()> {
        let info = &self.endpoints[idx];
        self.check_open(&format!("the body of `{}`", info.name), info.pos)?;
        if info.defined {
            return Err(Error::double_definition(info.name).with_pos(&info.pos));
        }
        if let Some(parent) = self.current() {
            if info.is_transaction() && !info.inner {
                let parent = &self.endpoints[parent];
                return Err(Error::nesting_violation(format!(
                    "body of transaction `{}` opened inside the body of {} `{}`",
                    info.name,
                    parent.kind_name(),
                    parent.name
                ))
                .with_pos(&info.pos)
                .with_annotation(&parent.pos, "enclosing body"));
            }
            let pos = info.pos;
            self.endpoints[parent].relations.push(Relation {
                end: idx,
                priority: Priority::Left,
                conflict: false,
                silence_warning: false,
                pos,
            });
        }
        let def_order = self.def_counter;
        self.def_counter += 1;
        let info = &mut self.endpoints[idx];
        info.defined = true;
        info.def_order = def_order;
        info.ctrl_path = ctrl_path;
        info.predicate = predicate;
        self.stack.push(idx);
        Ok(())
    }

    /// Close the body of `idx`, which must be the innermost open one.
    pub fn pop_body(&mut self, idx: EndpointIdx) -> TransactronResult<()> {
        match self.stack.pop() {
            Some(top) if top == idx => Ok(()),
            _ => Err(Error::nesting_violation(format!(
                "body of `{}` closed out of order",
                self.endpoints[idx].name
            ))
            .with_pos(&self.endpoints[idx].pos)),
        }
    }

    /////////////// Calls ///////////////

    /// Record a call of `callee` from the innermost open body and return
    /// the callee's output.
    ///
    /// The argument is driven unconditionally; `enable` is combined with
    /// the control blocks that surround the call.
    pub fn record_call(
        &mut self,
        ir: &mut ModuleBuilder,
        callee: EndpointIdx,
        arg: Value,
        enable: Expr,
        pos: GPosIdx,
    ) -> TransactronResult<Value> {
        let callee_info = &self.endpoints[callee];
        let name = callee_info.name;
        self.check_open(&format!("a call of `{name}`"), pos)?;
        let caller = self
            .current()
            .ok_or_else(|| Error::no_current_body().with_pos(&pos))?;
        if callee_info.is_transaction() {
            return Err(Error::call_to_transaction(name)
                .with_pos(&pos)
                .with_annotation(&callee_info.pos, "transaction declared here"));
        }
        let layout_matches = arg.layout() == &callee_info.layout_in
            || (matches!(arg.layout(), Layout::Bits(_))
                && arg.width() == callee_info.layout_in.width());
        if !layout_matches {
            return Err(Error::layout_mismatch(
                format!("argument of `{name}`"),
                &callee_info.layout_in,
                arg.layout(),
            )
            .with_pos(&pos)
            .with_annotation(&callee_info.pos, "method declared here"));
        }
        let ret = Value::of(callee_info.data_out, callee_info.layout_out.clone());
        let width = callee_info.layout_in.width();

        let ctrl_path = ir.ctrl_path();
        let predicate = ir.predicate();
        if let Some(usage) = self.endpoints[caller].uses.get(&callee) {
            let clash = usage.calls.iter().find(|call| {
                !call.ctrl_path.exclusive_with(&ctrl_path)
                    && !call.predicate.exclusive_with(&predicate)
            });
            if let Some(prev) = clash {
                return Err(Error::repeated_call(name, self.endpoints[caller].name)
                    .with_pos(&pos)
                    .with_annotation(&prev.pos, "previous call"));
            }
        }

        let arg_sig = ir.signal(format!("{name}_arg"), width);
        ir.top_comb(arg_sig, arg.into_expr());
        let enable_sig = ir.signal(format!("{name}_enable"), 1);
        ir.av_comb(enable_sig, enable);
        let record = CallRecord {
            ctrl_path,
            predicate,
            arg: arg_sig,
            enable: enable_sig,
            pos,
        };

        let uses = &mut self.endpoints[caller].uses;
        match uses.get_mut(&callee) {
            Some(usage) => usage.calls.push(record),
            None => {
                let usage = MethodUse {
                    arg: ir.signal(format!("{name}_use_arg"), width),
                    enable: ir.signal(format!("{name}_use_enable"), 1),
                    calls: vec![record],
                };
                uses.insert(callee, usage);
            }
        }
        Ok(ret)
    }

    /////////////// Relations ///////////////

    fn same_module(&self, a: EndpointIdx, b: EndpointIdx) -> bool {
        self.endpoints[a].module == self.endpoints[b].module
    }

    /// `start` and `end` never run in the same cycle. Declaring the same
    /// conflict twice has no further effect.
    pub fn declare_conflict(
        &mut self,
        start: EndpointIdx,
        end: EndpointIdx,
        priority: Priority,
        pos: GPosIdx,
    ) -> TransactronResult<()> {
        self.check_open("a conflict", pos)?;
        let exists = self.endpoints[start]
            .relations
            .iter()
            .any(|r| r.conflict && r.end == end && r.priority == priority);
        if exists {
            return Ok(());
        }
        let silence_warning = !self.same_module(start, end);
        self.endpoints[start].relations.push(Relation {
            end,
            priority,
            conflict: true,
            silence_warning,
            pos,
        });
        Ok(())
    }

    /// `start` is considered before `end` by the scheduler, without adding
    /// a conflict.
    pub fn schedule_before(
        &mut self,
        start: EndpointIdx,
        end: EndpointIdx,
        pos: GPosIdx,
    ) -> TransactronResult<()> {
        self.check_open("a scheduling order", pos)?;
        let silence_warning = !self.same_module(start, end);
        self.endpoints[start].relations.push(Relation {
            end,
            priority: Priority::Left,
            conflict: false,
            silence_warning,
            pos,
        });
        Ok(())
    }

    /// `elem` runs in exactly the cycles in which each of `others` runs.
    pub fn simultaneous(
        &mut self,
        elem: EndpointIdx,
        others: &[EndpointIdx],
        pos: GPosIdx,
    ) -> TransactronResult<()> {
        self.check_open("a simultaneity constraint", pos)?;
        self.endpoints[elem].simultaneous.extend_from_slice(others);
        Ok(())
    }

    /// `elem` and `others` are never merged into one simultaneity group.
    pub fn independent(
        &mut self,
        elem: EndpointIdx,
        others: &[EndpointIdx],
        pos: GPosIdx,
    ) -> TransactronResult<()> {
        self.check_open("an independence constraint", pos)?;
        self.endpoints[elem].independent.extend_from_slice(others);
        Ok(())
    }

    /// `elem` runs together with each of `others`, but the alternatives are
    /// considered separately, so at most one of them runs in a cycle.
    pub fn simultaneous_alternatives(
        &mut self,
        elem: EndpointIdx,
        others: &[EndpointIdx],
        pos: GPosIdx,
    ) -> TransactronResult<()> {
        self.simultaneous(elem, others, pos)?;
        if let Some((first, rest)) = others.split_first() {
            self.independent(*first, rest, pos)?;
        }
        Ok(())
    }
}
