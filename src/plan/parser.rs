//! 响应解析：从 Planner 的自由文本中提取有序命令序列
//!
//! 扫描器按顺序查找第一个「未标注或标注为当前方言别名」的代码块，取其内部；找不到时退回整段文本
//! 并标记为回退。随后逐行去除首尾空白与列表标记（`1.`、`-`、`*` 后接空白），丢弃空行、注释行与栅栏行。
//! 空结果是合法输出，由上游判定为失败。

use crate::platform::OsFamily;

const FENCE: &str = "```";

/// 解析结果
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParsedPlan {
    pub commands: Vec<String>,
    /// 是否来自代码块；false 表示走了回退路径
    pub fenced: bool,
}

impl ParsedPlan {
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// 回退路径且解析出了命令：需要向用户提示可信度降低
    pub fn used_fallback(&self) -> bool {
        !self.fenced && !self.commands.is_empty()
    }
}

pub fn parse_plan(text: &str, family: OsFamily) -> ParsedPlan {
    match find_fenced_block(text, family.fence_aliases()) {
        Some(body) => ParsedPlan {
            commands: extract_commands(body),
            fenced: true,
        },
        None => {
            tracing::debug!("no fenced block in planner response, falling back to raw text");
            ParsedPlan {
                commands: extract_commands(text.trim()),
                fenced: false,
            }
        }
    }
}

/// 返回第一个可接受代码块的内部文本。
///
/// 开栏之后到行尾为信息串，其首词即标签；标签为空或属于 `aliases`（大小写不敏感）时接受。
/// 单行代码块（如 ```` ```ls -la``` ````）没有信息串，除非首词恰好是别名。
/// 只有标签不匹配的代码块被跳过；可接受的代码块内部为空时返回空串（解析为空计划）。
/// 没有闭栏的代码块视为不存在。
pub fn find_fenced_block<'a>(text: &'a str, aliases: &[&str]) -> Option<&'a str> {
    let mut rest = text;
    loop {
        let open = rest.find(FENCE)?;
        let after_open = &rest[open + FENCE.len()..];
        let close = after_open.find(FENCE)?;
        let inner = &after_open[..close];
        rest = &after_open[close + FENCE.len()..];

        let (tag, body) = split_info_string(inner);
        if tag.is_empty() || aliases.iter().any(|a| a.eq_ignore_ascii_case(tag)) {
            // 第一个可接受的块即为结果，即使为空
            return Some(body.trim());
        }
    }
}

/// 拆分代码块内部为（标签, 正文）
fn split_info_string(inner: &str) -> (&str, &str) {
    match inner.find('\n') {
        Some(nl) => {
            let info = &inner[..nl];
            let tag = info.split_whitespace().next().unwrap_or("");
            (tag, &inner[nl + 1..])
        }
        None => {
            let trimmed = inner.trim_start();
            let first = trimmed.split_whitespace().next().unwrap_or("");
            let is_tag = [OsFamily::Posix, OsFamily::Windows]
                .iter()
                .flat_map(|f| f.fence_aliases())
                .any(|a| a.eq_ignore_ascii_case(first));
            if is_tag {
                (first, &trimmed[first.len()..])
            } else {
                ("", inner)
            }
        }
    }
}

/// 逐行清洗为命令序列
pub fn extract_commands(body: &str) -> Vec<String> {
    body.lines()
        .map(str::trim)
        .map(strip_list_marker)
        .filter(|line| !line.is_empty() && !is_comment(line) && !line.starts_with(FENCE))
        .map(String::from)
        .collect()
}

fn is_comment(line: &str) -> bool {
    line.starts_with('#') || line.starts_with("//")
}

/// 去掉行首的 `数字.`、`-`、`*` 列表标记（标记后必须跟空白）；行内其余内容原样保留
fn strip_list_marker(line: &str) -> &str {
    let marker_len = if line.starts_with('-') || line.starts_with('*') {
        1
    } else {
        let digits = line.bytes().take_while(u8::is_ascii_digit).count();
        if digits > 0 && line[digits..].starts_with('.') {
            digits + 1
        } else {
            return line;
        }
    };
    let after = &line[marker_len..];
    if after.starts_with(char::is_whitespace) {
        after.trim_start()
    } else {
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn posix(text: &str) -> ParsedPlan {
        parse_plan(text, OsFamily::Posix)
    }

    #[test]
    fn test_single_fenced_block() {
        let text = "Here you go:\n```bash\nmkdir out\n# make the dir\n\n1. cd out\n- touch a.txt\n* ls\n```\nDone.";
        let plan = posix(text);
        assert!(plan.fenced);
        assert_eq!(plan.commands, vec!["mkdir out", "cd out", "touch a.txt", "ls"]);
    }

    #[test]
    fn test_untagged_block() {
        let plan = posix("```\necho one\necho two\n```");
        assert!(plan.fenced);
        assert_eq!(plan.commands, vec!["echo one", "echo two"]);
    }

    #[test]
    fn test_tag_is_case_insensitive() {
        let plan = posix("```BASH\npwd\n```");
        assert!(plan.fenced);
        assert_eq!(plan.commands, vec!["pwd"]);
    }

    #[test]
    fn test_only_first_matching_block_used() {
        let plan = posix("```sh\necho first\n```\ntext\n```sh\necho second\n```");
        assert_eq!(plan.commands, vec!["echo first"]);
    }

    #[test]
    fn test_block_with_other_dialect_skipped() {
        let text = "```python\nprint('x')\n```\n```shell\nls\n```";
        assert_eq!(posix(text).commands, vec!["ls"]);
        // Windows 下 shell 标签不属于别名，两个块都被跳过，走回退
        let plan = parse_plan(text, OsFamily::Windows);
        assert!(!plan.fenced);
    }

    #[test]
    fn test_windows_dialect() {
        let plan = parse_plan("```bat\r\ndir\r\necho done\r\n```", OsFamily::Windows);
        assert!(plan.fenced);
        assert_eq!(plan.commands, vec!["dir", "echo done"]);
    }

    #[test]
    fn test_inline_block() {
        assert_eq!(posix("run ```ls -la``` now").commands, vec!["ls -la"]);
        assert_eq!(posix("```bash ls -la```").commands, vec!["ls -la"]);
    }

    #[test]
    fn test_inner_whitespace_preserved() {
        let plan = posix("```bash\n   for f in *; do   echo \"$f\"; done\n```");
        assert_eq!(plan.commands, vec!["for f in *; do   echo \"$f\"; done"]);
    }

    #[test]
    fn test_fallback_without_block() {
        let plan = posix("  1. ls\n2. pwd\n// note\n");
        assert!(!plan.fenced);
        assert!(plan.used_fallback());
        assert_eq!(plan.commands, vec!["ls", "pwd"]);
    }

    #[test]
    fn test_unterminated_block_falls_back() {
        let plan = posix("```bash\necho hi");
        assert!(!plan.fenced);
        assert_eq!(plan.commands, vec!["echo hi"]);
    }

    #[test]
    fn test_empty_input_is_not_an_error() {
        let plan = posix("   \n");
        assert!(plan.is_empty());
        assert!(!plan.used_fallback());
    }

    #[test]
    fn test_comment_only_block_yields_empty() {
        let plan = posix("```bash\n# nothing to do\n// really\n```");
        assert!(plan.fenced);
        assert!(plan.is_empty());
    }

    #[test]
    fn test_empty_block_does_not_fall_through_to_prose() {
        let plan = posix("```bash\n```\nSorry, I cannot do that safely.");
        assert!(plan.fenced);
        assert!(plan.is_empty());
        assert!(!plan.used_fallback());
    }

    #[test]
    fn test_empty_block_does_not_fall_through_to_next_block() {
        let plan = posix("```bash\n```\n```bash\nrm -rf build\n```");
        assert!(plan.fenced);
        assert!(plan.is_empty());
        assert_eq!(find_fenced_block("```\n\n```\n```\nls\n```", &["bash"]), Some(""));
    }

    #[test]
    fn test_list_marker_requires_whitespace() {
        assert_eq!(strip_list_marker("-la"), "-la");
        assert_eq!(strip_list_marker("*.txt"), "*.txt");
        assert_eq!(strip_list_marker("10. make"), "make");
        assert_eq!(strip_list_marker("3.14"), "3.14");
        assert_eq!(strip_list_marker("- rm tmp"), "rm tmp");
    }

    #[test]
    fn test_shebang_is_dropped() {
        let plan = posix("```bash\n#!/bin/bash\nset -e\nls\n```");
        assert_eq!(plan.commands, vec!["set -e", "ls"]);
    }
}
