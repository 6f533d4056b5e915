//! Tern CLI - Command line interface
//!
//! Project-based execution - all configuration from project.json

use clap::Parser;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process;
use tracing::info;

mod config;
mod logging;
mod platform;

use crate::config::LogConfig;
use crate::logging::LogFormat;
use crate::platform::print_error_with_source;
use tern_api::{compile_with_config, execute, init_config, Code, CompilerConfig, LimitConfig, Phase, RunConfig, Value};

/// project.json 结构
#[derive(Debug, Deserialize)]
struct ProjectJson {
    /// 入口文件路径（相对 project.json 所在目录）
    entry: String,
    /// 编译器配置
    #[serde(default)]
    compiler: ProjectCompiler,
    /// 执行限制
    #[serde(default)]
    limits: LimitConfig,
}

/// 编译器配置
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ProjectCompiler {
    /// 是否仅编译，不执行
    compile_only: bool,
    /// 是否输出字节码（JSON 格式）
    dump_bytecode: bool,
    /// 是否显示执行步骤
    show_steps: bool,
    /// 是否显示源码
    show_source: bool,
    /// 是否记录行号
    emit_debug_info: Option<bool>,
    /// 是否加载 prelude
    load_prelude: Option<bool>,
    /// 日志级别: "silent", "error", "warn", "info", "debug", "trace"
    log_level: Option<String>,
    /// 分阶段日志级别，如 { "vm": "trace" }
    log_phases: HashMap<Phase, String>,
}

#[derive(Parser)]
#[command(
    name = "tern",
    about = "Tern programming language - Project-based execution",
    version
)]
struct Cli {
    /// Configuration file path
    #[arg(value_name = "CONFIG", default_value = "project.json")]
    config: PathBuf,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Compact)]
    log_format: LogFormat,
}

fn main() {
    let cli = Cli::parse();

    let project = match read_project_json(&cli.config) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    let log_config = LogConfig::from_strings(
        project.compiler.log_level.as_deref(),
        &project.compiler.log_phases,
    );
    logging::init(&log_config, cli.log_format);

    let entry_path = resolve_entry_path(&cli.config, &project.entry);
    let source = match std::fs::read_to_string(&entry_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: Cannot read entry file '{}': {}", entry_path.display(), e);
            process::exit(1);
        }
    };

    let run_config = build_run_config(&project);
    // 全局单例，供库内 quick_run 等接口使用
    let _ = init_config(run_config.clone());
    info!(entry = %entry_path.display(), "starting");

    if run_config.show_source {
        println!("[Source]");
        for (i, line) in source.lines().enumerate() {
            println!("{:3} | {}", i + 1, line);
        }
        println!("[Execution Result]");
    }

    if run_config.show_steps {
        println!("[Tern VM - Bytecode Execution]");
        println!("======================");
        println!("Entry: {}", entry_path.display());
    }

    let code = match handle_run(&source, &run_config) {
        Ok(()) => 0,
        Err(e) => {
            print_error_with_source(&e, &source);
            1
        }
    };
    process::exit(code);
}

/// Read and parse project.json
fn read_project_json(path: &Path) -> Result<ProjectJson, String> {
    if !path.exists() {
        return Err(format!(
            "'{}' not found\n\nThe current directory is not a Tern project.\nHint: create '{}' with an 'entry' field",
            path.display(),
            path.display()
        ));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read '{}': {}", path.display(), e))?;
    parse_project_json(&content).map_err(|e| format!("failed to parse '{}': {}", path.display(), e))
}

fn parse_project_json(content: &str) -> Result<ProjectJson, String> {
    let project: ProjectJson = serde_json::from_str(content).map_err(|e| e.to_string())?;
    if project.entry.is_empty() {
        return Err("'entry' must not be empty".to_string());
    }
    Ok(project)
}

/// Resolve entry file path relative to project.json directory
fn resolve_entry_path(project_path: &Path, entry: &str) -> PathBuf {
    let base_dir = project_path.parent().unwrap_or(Path::new("."));
    base_dir.join(entry)
}

/// Build run configuration from project.json
fn build_run_config(project: &ProjectJson) -> RunConfig {
    let compiler = &project.compiler;
    let defaults = RunConfig::default();
    RunConfig {
        show_steps: compiler.show_steps,
        dump_bytecode: compiler.dump_bytecode,
        show_source: compiler.show_source,
        compile_only: compiler.compile_only,
        compiler: CompilerConfig {
            emit_debug_info: compiler
                .emit_debug_info
                .unwrap_or(defaults.compiler.emit_debug_info),
        },
        limits: project.limits.clone(),
        load_prelude: compiler.load_prelude.unwrap_or(defaults.load_prelude),
    }
}

fn handle_run(source: &str, config: &RunConfig) -> Result<(), tern_api::TernError> {
    if config.show_steps {
        println!("[Compilation]");
    }
    let compiled = compile_with_config(source, config)?;
    if config.show_steps {
        println!("Constants: {}", compiled.code.consts.len());
        println!("Bytecode: {} bytes", compiled.code.instrs.len());
        println!("Locals: {}", compiled.code.local_count);
    }
    if config.dump_bytecode {
        let json = build_json_output(&compiled.code, "main");
        match serde_json::to_string_pretty(&json) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("Error: cannot render bytecode: {}", e),
        }
    }
    if config.compile_only {
        if config.show_steps {
            println!("Compilation successful");
        }
        return Ok(());
    }

    if config.show_steps {
        println!("[Execution]");
    }
    let output = execute(compiled)?;
    if config.show_steps {
        println!("Execution successful");
        println!("Return value: {}", output.value);
    } else if output.value != Value::None {
        // 非 step 模式只打印程序的最终值
        println!("{}", output.value);
    }
    Ok(())
}

/// JSON 格式输出编译结果（递归展开嵌套函数）
fn build_json_output(code: &Code, name: &str) -> serde_json::Value {
    use serde_json::json;

    let bytecode: Vec<serde_json::Value> = match code.instructions() {
        Ok(instrs) => instrs
            .iter()
            .map(|instr| {
                let mut entry = json!({
                    "offset": instr.offset,
                    "opcode": instr.op.name(),
                    "line": code.lines.get(instr.offset).copied().unwrap_or(0),
                });
                if let Some(operand) = instr.operand() {
                    entry["operand"] = json!(operand);
                }
                entry
            })
            .collect(),
        Err(e) => vec![json!({ "error": e.to_string() })],
    };

    let constants: Vec<String> = code.consts.iter().map(|c| c.to_string()).collect();

    let functions: Vec<serde_json::Value> = code
        .nested()
        .map(|(idx, nested)| {
            let nested_name = match &nested.name {
                Some(n) => format!("{}#{}", n, idx),
                None => format!("{}#lambda_{}", name, idx),
            };
            build_json_output(nested, &nested_name)
        })
        .collect();

    let mut result = json!({
        "name": name,
        "arity": code.arity(),
        "locals": code.local_count,
        "constants": constants,
        "bytecode": bytecode,
    });
    if !functions.is_empty() {
        result["functions"] = json!(functions);
    }
    result
}
