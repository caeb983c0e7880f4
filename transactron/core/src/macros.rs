/// Define the body of a method.
///
/// ```ignore
/// def_method!(m, self.read, ready = valid, |m, _arg| {
///     m.sync(valid, false);
///     Ok(Value::of(data, layout.clone()))
/// })?;
/// ```
#[macro_export]
macro_rules! def_method {
    ($m:expr, $method:expr, |$mm:pat_param, $arg:pat_param| $body:expr) => {
        $method.define($m, true, |$mm, $arg| $body)
    };
    ($m:expr, $method:expr, ready = $ready:expr, |$mm:pat_param, $arg:pat_param| $body:expr) => {
        $method.define($m, $ready, |$mm, $arg| $body)
    };
}

/// Define the body of a transaction, requested unconditionally unless a
/// `request` is given.
#[macro_export]
macro_rules! body {
    ($m:expr, $t:expr, |$mm:pat_param| $body:expr) => {
        $t.body($m, true, |$mm| $body)
    };
    ($m:expr, $t:expr, request = $req:expr, |$mm:pat_param| $body:expr) => {
        $t.body($m, $req, |$mm| $body)
    };
}
