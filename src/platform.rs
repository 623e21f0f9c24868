//! 平台探测：操作系统族
//!
//! 只支持两族：类 POSIX（bash）与 Windows（cmd）。操作系统族决定 Planner 的方言标签、
//! 解析器接受的代码块标签、临时脚本扩展名、解释器与是否需要可执行位。

use serde::Serialize;

use crate::core::InitError;

/// 操作系统族
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum OsFamily {
    Posix,
    Windows,
}

impl OsFamily {
    /// 探测当前进程所在平台；其他平台返回 UnsupportedOs（初始化期致命错误）
    pub fn detect() -> Result<Self, InitError> {
        Self::from_os_name(std::env::consts::OS)
    }

    pub fn from_os_name(os: &str) -> Result<Self, InitError> {
        match os {
            "linux" | "macos" | "freebsd" | "openbsd" | "netbsd" | "dragonfly" => Ok(Self::Posix),
            "windows" => Ok(Self::Windows),
            other => Err(InitError::UnsupportedOs(other.to_string())),
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Posix => "Linux/macOS",
            Self::Windows => "Windows",
        }
    }

    /// Planner 输出代码块应使用的方言标签
    pub fn dialect(self) -> &'static str {
        match self {
            Self::Posix => "bash",
            Self::Windows => "cmd",
        }
    }

    /// 解析器认可的代码块标签（大小写不敏感）
    pub fn fence_aliases(self) -> &'static [&'static str] {
        match self {
            Self::Posix => &["bash", "sh", "shell", "zsh"],
            Self::Windows => &["cmd", "bat", "batch"],
        }
    }

    pub fn script_extension(self) -> &'static str {
        match self {
            Self::Posix => "sh",
            Self::Windows => "bat",
        }
    }

    pub fn line_separator(self) -> &'static str {
        match self {
            Self::Posix => "\n",
            Self::Windows => "\r\n",
        }
    }

    pub fn needs_exec_bit(self) -> bool {
        matches!(self, Self::Posix)
    }

    /// 解释器程序与脚本路径之前的参数；脚本路径作为独立 argv 追加，不经过 shell 拼接
    pub fn interpreter(self) -> (&'static str, &'static [&'static str]) {
        match self {
            Self::Posix => ("/bin/bash", &[]),
            Self::Windows => ("cmd.exe", &["/c"]),
        }
    }
}
