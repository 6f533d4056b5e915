//! 内嵌 prelude：用 Tern 自身写的高阶函数，VM 启动时执行一次

pub const SOURCE: &str = r#"
var id = |x| x;
var compose = |f, g| |x| f(g(x));
var fold = |f, acc, xs| if len(xs) == 0: acc else: fold(f, f(acc, head(xs)), tail(xs));
var map = |f, xs| fold(|acc, x| push(acc, f(x)), [], xs);
var filter = |p, xs| fold(|acc, x| if p(x): push(acc, x) else: acc, [], xs);
var reverse = |xs| fold(|acc, x| [x] + acc, [], xs);
var sum = |xs| fold(|a, b| a + b, 0, xs);
var apply = |f, args| if len(args) == 0: f else: apply(f(head(args)), tail(args));
"#;
