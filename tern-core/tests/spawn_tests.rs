//! spawn / join 测试

mod common;
use common::{get_int, run_code};
use tern_core::RuntimeError;

#[test]
fn test_spawn_and_join() {
    assert_eq!(get_int(&run_code("join(spawn(|| 1 + 2))").unwrap()), Some(3));
}

#[test]
fn test_several_tasks() {
    let result = run_code(
        r#"
        var a = spawn(|| sum(range(0, 100)));
        var b = spawn(|| 10);
        join(a) + join(b)
    "#,
    )
    .unwrap();
    assert_eq!(get_int(&result), Some(4960));
}

#[test]
fn test_tasks_share_globals() {
    let result = run_code(
        r#"
        join(spawn(|| { child_value = 9; 0 }));
        child_value
    "#,
    )
    .unwrap();
    assert_eq!(get_int(&result), Some(9));
}

#[test]
fn test_tasks_share_cells() {
    let result = run_code(
        r#"
        var shared = cell(0);
        join(spawn(|| cell_set(shared, 5)));
        cell_get(shared)
    "#,
    )
    .unwrap();
    assert_eq!(get_int(&result), Some(5));
}

#[test]
fn test_task_error_is_reraised() {
    let err = run_code("join(spawn(|| panic(\"bad\")))").unwrap_err();
    assert_eq!(err.runtime(), Some(&RuntimeError::Panic("bad".into())));
}

#[test]
fn test_task_has_its_own_handlers() {
    let err = run_code(
        r#"
        effect E;
        handle join(spawn(|| E(1))) with { E(x, k) => k(x) }
    "#,
    )
    .unwrap_err();
    assert_eq!(err.runtime(), Some(&RuntimeError::UnhandledEffect("E".into())));

    let result = run_code(
        r#"
        effect E;
        join(spawn(|| handle E(1) with { E(x, k) => k(x + 1) }))
    "#,
    )
    .unwrap();
    assert_eq!(get_int(&result), Some(2));
}

#[test]
fn test_join_twice_fails() {
    let err = run_code("var t = spawn(|| 1); join(t); join(t)").unwrap_err();
    assert!(matches!(err.runtime(), Some(RuntimeError::TaskFailed(_))));
}
