//! 临时脚本文件
//!
//! 文件名包含进程号、纳秒时间戳与进程内序号，避免冲突；POSIX 下设置 0o755。
//! 创建与删除包住单次执行：调用方在任何结果下都要调用 remove。

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::platform::OsFamily;

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

#[derive(Debug)]
pub struct TempScript {
    path: PathBuf,
}

impl TempScript {
    pub fn unique_path(dir: &Path, family: OsFamily) -> PathBuf {
        let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
        dir.join(format!(
            "taskpilot_script_{}_{}_{}.{}",
            std::process::id(),
            nanos,
            seq,
            family.script_extension()
        ))
    }

    /// 写入脚本内容并设置权限；任一步失败都会尝试清理已写出的文件
    pub async fn create(dir: &Path, family: OsFamily, content: &str) -> io::Result<Self> {
        let path = Self::unique_path(dir, family);
        let script = Self { path };
        if let Err(e) = script.write(family, content).await {
            let _ = tokio::fs::remove_file(&script.path).await;
            return Err(e);
        }
        tracing::debug!(path = %script.path.display(), "temporary script written");
        Ok(script)
    }

    async fn write(&self, family: OsFamily, content: &str) -> io::Result<()> {
        tokio::fs::write(&self.path, content).await?;
        if family.needs_exec_bit() {
            set_executable(&self.path).await?;
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn remove(self) -> io::Result<()> {
        tokio::fs::remove_file(&self.path).await
    }
}

#[cfg(unix)]
async fn set_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).await
}

#[cfg(not(unix))]
async fn set_executable(_path: &Path) -> io::Result<()> {
    Ok(())
}
