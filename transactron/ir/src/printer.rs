//! Implements a formatter for [Design]s. Signals are printed grouped by
//! module, followed by the assignments that drive them.
use crate::{Assignment, Design, Domain, Expr, ModuleIdx, SignalKind};
use itertools::Itertools;
use std::io;

/// Printer for the IR.
pub struct Printer;

impl Printer {
    /// Render `expr` using hierarchical signal names relative to the top.
    pub fn format_expr(design: &Design, expr: &Expr) -> String {
        expr.render(&|sig| Self::short_name(design, sig.idx))
    }

    fn short_name(design: &Design, sig: crate::SignalIdx) -> String {
        design.path(sig).into_iter().skip(1).join(".")
    }

    fn format_assignment(design: &Design, assign: &Assignment) -> String {
        let op = match assign.domain {
            Domain::Comb => "=",
            Domain::Sync => "<=",
        };
        let dst = Self::short_name(design, assign.dst.idx);
        let src = Self::format_expr(design, &assign.src);
        if assign.guard.is_true() {
            format!("{dst} {op} {src};")
        } else {
            format!(
                "{dst} {op} {} ? {src};",
                Self::format_expr(design, &assign.guard)
            )
        }
    }

    /// Prints out the whole design, one module after another.
    pub fn write_design<F: io::Write>(design: &Design, f: &mut F) -> io::Result<()> {
        for (idx, _) in design.modules() {
            Self::write_module(design, idx, f)?;
        }
        Ok(())
    }

    /// Prints the signals of one module and the assignments to them, in the
    /// order they were added. Zero-width signals are left out.
    pub fn write_module<F: io::Write>(
        design: &Design,
        module: ModuleIdx,
        f: &mut F,
    ) -> io::Result<()> {
        let path = design.module_path(module).iter().join(".");
        writeln!(f, "module {path} {{")?;
        for (_, data) in design.signals().filter(|(_, d)| d.module == module && d.width > 0) {
            let kind = match data.kind {
                SignalKind::Wire => "wire",
                SignalKind::Reg => "reg",
            };
            if data.init != 0 {
                writeln!(f, "  {kind} {}: {} = {};", data.name, data.width, data.init)?;
            } else {
                writeln!(f, "  {kind} {}: {};", data.name, data.width)?;
            }
        }
        for assign in design
            .assignments()
            .iter()
            .filter(|a| a.dst.width > 0 && design.signal(a.dst.idx).module == module)
        {
            writeln!(f, "  {}", Self::format_assignment(design, assign))?;
        }
        writeln!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ModuleBuilder;

    #[test]
    fn prints_guarded_assignments() {
        let mut design = Design::new("top");
        let top = design.top();
        let mut m = ModuleBuilder::new(&mut design, top);
        let en = m.signal("en", 1);
        let cnt = m.register("cnt", 4, 0);
        m.enter_if(en);
        m.sync(cnt, cnt + Expr::constant(1, 4));
        m.leave().unwrap();

        let mut out = vec![];
        Printer::write_design(&design, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("module top {"));
        assert!(text.contains("reg cnt: 4;"));
        assert!(text.contains("cnt <= en ? (cnt + 4'd1);"));
    }
}
