use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use transactron::prelude::*;

/// `width` transactions, each calling two of `width` shared methods, so that
/// every transaction conflicts with its neighbours.
struct Ring {
    width: usize,
}

impl Elaboratable for Ring {
    fn elaborate(&self, m: &mut TModule) -> TransactronResult<()> {
        let methods = (0..self.width)
            .map(|i| {
                let meth = Method::build(format!("m{i}")).i(4).create(m)?;
                let reg = m.register(format!("r{i}"), 4, 0);
                def_method!(m, meth, |m, arg| {
                    m.sync(reg, arg);
                    Ok(Value::empty())
                })?;
                Ok(meth)
            })
            .collect::<TransactronResult<Vec<_>>>()?;
        for i in 0..self.width {
            let t = Transaction::new(m, format!("t{i}"))?;
            let (a, b) = (&methods[i], &methods[(i + 1) % self.width]);
            body!(m, t, |m| {
                a.call(m, Expr::constant(i as u64 % 16, 4))?;
                b.call(m, Expr::constant(1, 4)).map(|_| ())
            })?;
        }
        Ok(())
    }
}

fn elaboration_bench(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring");
    for width in [8, 32, 128] {
        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, &width| {
            b.iter(|| elaborate("ring", &Ring { width }, ElaborationConfig::default()).unwrap())
        });
    }
    group.finish();
}

criterion_group! {
    name = elaboration;
    config = Criterion::default().sample_size(20);
    targets = elaboration_bench
}
criterion_main!(elaboration);
