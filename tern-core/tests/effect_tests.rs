//! 代数效应测试
//!
//! handle / with、续体恢复、守卫与重新抛出

mod common;
use common::{get_int, get_string, run_code, run_in};
use tern_core::{RuntimeError, Value, Vm};

// ===== 基础 =====

#[test]
fn test_resume_with_value() {
    let result = run_code(
        r#"
        effect Ask;
        handle Ask(0) + 1 with { Ask(x, k) => k(41) }
    "#,
    )
    .unwrap();
    assert_eq!(get_int(&result), Some(42));
}

#[test]
fn test_clause_without_resume_aborts() {
    let result = run_code(
        r#"
        effect Fail;
        handle Fail(1) + 100 with { Fail(x) => x * 2 }
    "#,
    )
    .unwrap();
    assert_eq!(get_int(&result), Some(2));
}

#[test]
fn test_body_without_effects() {
    let result = run_code("effect Ask; handle 5 with { Ask(x, k) => k(0) }").unwrap();
    assert_eq!(get_int(&result), Some(5));
}

#[test]
fn test_unhandled_effect() {
    let err = run_code("effect Oops; Oops(1)").unwrap_err();
    assert_eq!(err.runtime(), Some(&RuntimeError::UnhandledEffect("Oops".into())));
}

#[test]
fn test_handler_removed_after_body() {
    let err = run_code(
        r#"
        effect Ask;
        handle 1 with { Ask(x, k) => k(1) };
        Ask(0)
    "#,
    )
    .unwrap_err();
    assert_eq!(err.runtime(), Some(&RuntimeError::UnhandledEffect("Ask".into())));
}

#[test]
fn test_same_name_effects_are_distinct() {
    let err = run_code(
        r#"
        var a = new_effect("E");
        var b = new_effect("E");
        handle b(1) with { a(x, k) => k(x) }
    "#,
    )
    .unwrap_err();
    assert_eq!(err.runtime(), Some(&RuntimeError::UnhandledEffect("E".into())));
}

// ===== 续体 =====

#[test]
fn test_effect_raised_deep_in_recursion() {
    let result = run_code(
        r#"
        effect Ask;
        var f = |n| if n == 0: Ask(0) else: 1 + f(n - 1);
        handle f(5) with { Ask(x, k) => k(10) }
    "#,
    )
    .unwrap();
    assert_eq!(get_int(&result), Some(15));
}

#[test]
fn test_multiple_effects_in_one_body() {
    let result = run_code(
        r#"
        effect Get;
        handle Get(0) + Get(0) with { Get(x, k) => k(21) }
    "#,
    )
    .unwrap();
    assert_eq!(get_int(&result), Some(42));
}

#[test]
fn test_multi_shot_resume() {
    let result = run_code(
        r#"
        effect Choose;
        handle Choose(0) + 10 with { Choose(x, k) => k(1) + k(2) }
    "#,
    )
    .unwrap();
    assert_eq!(get_int(&result), Some(23));
}

#[test]
fn test_clause_post_processes_result() {
    let result = run_code(
        r#"
        effect Ask;
        handle Ask(0) * 2 with { Ask(x, k) => k(5) + 1000 }
    "#,
    )
    .unwrap();
    assert_eq!(get_int(&result), Some(1010));
}

#[test]
fn test_many_tail_resumes_stay_shallow() {
    let result = run_code(
        r#"
        effect Tick;
        var loop = |n| if n == 0: 0 else: { Tick(n); loop(n - 1) };
        handle loop(3000) with { Tick(x, k) => k(x) }
    "#,
    )
    .unwrap();
    assert_eq!(get_int(&result), Some(0));
}

#[test]
fn test_collect_with_cell() {
    let result = run_code(
        r#"
        effect Yield;
        {
            var out = cell([]);
            handle { Yield(1); Yield(2); Yield(3); 0 } with {
                Yield(x, k) => { cell_set(out, push(cell_get(out), x)); k(none) }
            };
            cell_get(out)
        }
    "#,
    )
    .unwrap();
    assert_eq!(result.to_string(), "[1, 2, 3]");
}

#[test]
fn test_exception_style_handler() {
    let result = run_code(
        r#"
        effect Raise;
        var safe_div = |a, b| if b == 0: Raise("division by zero") else: a / b;
        handle safe_div(1, 0) with { Raise(msg) => msg }
    "#,
    )
    .unwrap();
    assert_eq!(get_string(&result), Some("division by zero".into()));
}

// ===== 守卫与嵌套 =====

#[test]
fn test_guarded_clauses() {
    let program = |n: i64| {
        format!(
            r#"
            effect E;
            handle E({}) with {{ E(x) if x > 3 => "big", E(x) => "small" }}
        "#,
            n
        )
    };
    assert_eq!(get_string(&run_code(&program(5)).unwrap()), Some("big".into()));
    assert_eq!(get_string(&run_code(&program(1)).unwrap()), Some("small".into()));
}

#[test]
fn test_guard_failure_reraises_to_outer_handler() {
    let result = run_code(
        r#"
        effect E;
        handle (handle E(1) with { E(x, k) if x > 3 => k("inner") })
        with { E(x, k) => k("outer") }
    "#,
    )
    .unwrap();
    assert_eq!(get_string(&result), Some("outer".into()));
}

#[test]
fn test_guard_failure_without_outer_handler() {
    let err = run_code(
        r#"
        effect E;
        handle E(1) with { E(x, k) if x > 3 => k(0) }
    "#,
    )
    .unwrap_err();
    assert_eq!(err.runtime(), Some(&RuntimeError::UnhandledEffect("E".into())));
}

#[test]
fn test_guard_error_propagates() {
    let mut vm = Vm::new();
    let err = run_in(
        &mut vm,
        r#"
        effect E;
        var fallback_ran = cell(false);
        handle E(1) with {
            E(x, k) if panic("guard boom") => k(0),
            E(x, k) => { cell_set(fallback_ran, true); k(5) }
        }
    "#,
    )
    .unwrap_err();
    assert_eq!(err.runtime(), Some(&RuntimeError::Panic("guard boom".into())));
    // 守卫出错不会落到兜底子句
    assert_eq!(run_in(&mut vm, "cell_get(fallback_ran)").unwrap(), Value::Bool(false));
}

#[test]
fn test_inner_handler_shadows_outer() {
    let result = run_code(
        r#"
        effect Ask;
        handle (handle Ask(0) with { Ask(x, k) => k(1) }) + Ask(0)
        with { Ask(x, k) => k(100) }
    "#,
    )
    .unwrap();
    assert_eq!(get_int(&result), Some(101));
}

#[test]
fn test_multiple_effects_one_handler() {
    let result = run_code(
        r#"
        effect A;
        effect B;
        handle A(1) + B(2) with { A(x, k) => k(x * 10), B(x, k) => k(x * 100) }
    "#,
    )
    .unwrap();
    assert_eq!(get_int(&result), Some(210));
}

#[test]
fn test_effect_path_on_module_record() {
    let result = run_code(
        r#"
        var io = record { Read: new_effect("Read") };
        handle io.Read(0) + 1 with { io.Read(x, k) => k(7) }
    "#,
    )
    .unwrap();
    assert_eq!(get_int(&result), Some(8));
}

#[test]
fn test_duplicate_catch_all_is_rejected() {
    let err = run_code("effect A; handle 1 with { A(x) => 1, A(y) => 2 }").unwrap_err();
    assert!(matches!(err, common::ExecError::Compile(_)));
}
