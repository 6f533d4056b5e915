//! 闭包测试
//!
//! 捕获、部分应用与 Cell

mod common;
use common::{get_int, run_code};
use tern_core::{RuntimeError, Value};

// ===== 捕获 =====

#[test]
fn test_closure_captures_parameter() {
    assert_eq!(get_int(&run_code("var make = |x| |y| x + y; make(1)(2)").unwrap()), Some(3));
}

#[test]
fn test_capture_through_enclosing_functions() {
    let result = run_code("var f = |a| |b| |c| a * 100 + b * 10 + c; f(1)(2)(3)").unwrap();
    assert_eq!(get_int(&result), Some(123));
}

#[test]
fn test_capture_is_a_copy() {
    // 创建闭包时拷贝，之后的赋值看不到
    let result = run_code(
        r#"
        {
            var x = 1;
            var f = || x;
            x = 2;
            f()
        }
    "#,
    )
    .unwrap();
    assert_eq!(get_int(&result), Some(1));
}

#[test]
fn test_cell_shares_state() {
    let result = run_code(
        r#"
        {
            var c = cell(0);
            var inc = || cell_set(c, cell_get(c) + 1);
            inc();
            inc();
            inc();
            cell_get(c)
        }
    "#,
    )
    .unwrap();
    assert_eq!(get_int(&result), Some(3));
}

#[test]
fn test_counter_factory() {
    let result = run_code(
        r#"
        var counter = || {
            var c = cell(0);
            || { cell_set(c, cell_get(c) + 1); cell_get(c) }
        };
        var a = counter();
        var b = counter();
        a(); a(); b();
        a() * 10 + b()
    "#,
    )
    .unwrap();
    assert_eq!(get_int(&result), Some(32));
}

// ===== 部分应用 =====

#[test]
fn test_partial_application_chain() {
    assert_eq!(get_int(&run_code("var f = |a, b, c| a + b + c; f(1)(2)(3)").unwrap()), Some(6));
    assert_eq!(get_int(&run_code("var f = |a, b, c| a + b + c; f(1, 2)(3)").unwrap()), Some(6));
}

#[test]
fn test_partial_application_of_native() {
    assert_eq!(get_int(&run_code("var add3 = add(3); add3(4)").unwrap()), Some(7));
    assert_eq!(get_int(&run_code("var half = |x| x / 2; map(half, [4, 8])[1]").unwrap()), Some(4));
}

#[test]
fn test_partial_too_many_args() {
    let err = run_code("var f = |a, b| a; f(1)(2, 3)").unwrap_err();
    assert!(matches!(err.runtime(), Some(RuntimeError::ArityMismatch { .. })));
}

#[test]
fn test_partial_display() {
    let value = run_code("var f = |a, b| a; f(1)").unwrap();
    assert!(matches!(value, Value::PartialApp(_)));
}

// ===== prelude 高阶函数 =====

#[test]
fn test_prelude_higher_order() {
    assert_eq!(run_code("map(|x| x * x, [1, 2, 3])").unwrap().to_string(), "[1, 4, 9]");
    assert_eq!(
        run_code("filter(|x| x % 2 == 0, range(0, 7))").unwrap().to_string(),
        "[0, 2, 4, 6]"
    );
    assert_eq!(get_int(&run_code("fold(|a, b| a * b, 1, [1, 2, 3, 4])").unwrap()), Some(24));
    assert_eq!(get_int(&run_code("compose(|x| x * 2, |x| x + 1)(4)").unwrap()), Some(10));
    assert_eq!(get_int(&run_code("apply(|a, b, c| a - b - c, [10, 3, 2])").unwrap()), Some(5));
    assert_eq!(get_int(&run_code("id(7)").unwrap()), Some(7));
}
