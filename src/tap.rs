//! Stderr tap: pass a bot's log stream through and keep heartbeat failures and forced
//! logouts on disk.

use chrono::Utc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::warn;

use pulseguard_monitor::signal::scan;
use pulseguard_monitor::{EvidenceLog, FailureKind};

/// Forced-logout marker printed by the bot framework.
const FORCED_LOGOUT_MARKER: &str = "用户可能退出";

/// Whether a log line reports a failed heartbeat or a forced logout.
pub(crate) fn is_recorded_failure(line: &str) -> bool {
    scan(line).is_some_and(|m| match m.kind {
        FailureKind::HeartbeatFailed => true,
        FailureKind::LoggedOut => line.contains(FORCED_LOGOUT_MARKER),
        _ => false,
    })
}

/// Echo every line to `echo` and append recorded failures to `log`.
///
/// Returns the number of lines recorded.
pub(crate) async fn run_tap<R, W>(reader: R, mut echo: W, log: &EvidenceLog) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    let mut captured = 0;

    while let Some(line) = lines.next_line().await? {
        echo.write_all(line.as_bytes()).await?;
        echo.write_all(b"\n").await?;
        echo.flush().await?;

        if is_recorded_failure(&line) {
            match log.append(&line, Utc::now()).await {
                Ok(()) => captured += 1,
                Err(e) => warn!("Cannot record failure line: {}", e),
            }
        }
    }
    Ok(captured)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_failure_line_detection() {
        assert!(is_recorded_failure("12:00 wxid_a 心跳失败"));
        assert!(is_recorded_failure("Heartbeat FAILED for wxid_a"));
        assert!(is_recorded_failure("wxid_a 用户可能退出, please log in again"));
        assert!(!is_recorded_failure("wxid_a 已退出"));
        assert!(!is_recorded_failure("wxid_a 获取新消息失败"));
        assert!(!is_recorded_failure("message received"));
    }

    #[tokio::test]
    async fn test_tap_echoes_and_records() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("heartbeat_errors.txt");
        let log = EvidenceLog::new(&path, 10, Duration::from_secs(300));

        let input = "starting\nwxid_a 心跳失败\nok\nHeartbeat failed: timeout\nwxid_a 用户可能退出\n";
        let mut echo = Vec::new();
        let captured = run_tap(input.as_bytes(), &mut echo, &log).await.unwrap();

        assert_eq!(captured, 3);
        assert_eq!(String::from_utf8(echo).unwrap(), input);

        let recorded = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = recorded.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("wxid_a 心跳失败"));
        assert!(lines[2].ends_with("wxid_a 用户可能退出"));
    }
}
