//! CLI 格式化输出
//!
//! 提供命令行友好的错误显示和源码上下文打印。

use tern_api::TernError;

/// 错误行前后显示的上下文行数
const CONTEXT_LINES: usize = 3;

/// 打印错误并显示源代码上下文
pub fn print_error_with_source(e: &TernError, source: &str) {
    eprintln!("error: {}", e);
    if let Some(line) = e.line() {
        eprint!("{}", render_source_context(source, line, e.column()));
    }
}

/// 渲染错误行附近的源码；有列号时在错误行下方标出位置
pub fn render_source_context(source: &str, error_line: usize, error_col: Option<usize>) -> String {
    let lines: Vec<&str> = source.lines().collect();
    if error_line == 0 || error_line > lines.len() {
        return String::new();
    }

    let start_line = error_line.saturating_sub(CONTEXT_LINES).max(1);
    let end_line = (error_line + CONTEXT_LINES).min(lines.len());
    let width = end_line.to_string().len();
    let separator = format!("{}|--\n", "-".repeat(width + 1));

    let mut out = separator.clone();
    for line_idx in start_line..=end_line {
        out.push_str(&format!("{:>width$} | {}\n", line_idx, lines[line_idx - 1], width = width));
        if line_idx == error_line {
            if let Some(col) = error_col {
                let marker = " ".repeat(col.saturating_sub(1));
                out.push_str(&format!("{} | {}^\n", " ".repeat(width), marker));
            }
        }
    }
    out.push_str(&separator);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_with_marker() {
        let out = render_source_context("var a = 1;\nvar = 2;\na", 2, Some(5));
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "--|--");
        assert_eq!(lines[1], "1 | var a = 1;");
        assert_eq!(lines[2], "2 | var = 2;");
        assert_eq!(lines[3], "  |     ^");
        assert_eq!(lines[4], "3 | a");
    }

    #[test]
    fn test_context_without_column() {
        let out = render_source_context("1 / 0", 1, None);
        assert!(!out.contains('^'));
        assert!(out.contains("1 | 1 / 0"));
    }

    #[test]
    fn test_line_out_of_range() {
        assert!(render_source_context("x", 5, None).is_empty());
        assert!(render_source_context("x", 0, None).is_empty());
    }
}
