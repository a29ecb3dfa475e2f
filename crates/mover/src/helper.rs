//! The per-segment helper subprocess and its line-oriented command
//! protocol, per §4.D and §6 "Helper protocol": one command per line on
//! stdin, one `oid status[:error]` response per line on stdout.

use std::path::Path;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::error::{MoverError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HelperCommand {
    Backup { relation_oid: u32, pipe_path: String },
    Restore { relation_oid: u32, pipe_path: String, offset: u64, length: u64 },
    Done,
    Abort,
}

impl HelperCommand {
    pub fn encode(&self) -> String {
        match self {
            HelperCommand::Backup { relation_oid, pipe_path } => {
                format!("BACKUP {relation_oid} {pipe_path}\n")
            }
            HelperCommand::Restore { relation_oid, pipe_path, offset, length } => {
                format!("RESTORE {relation_oid} {pipe_path} {offset} {length}\n")
            }
            HelperCommand::Done => "DONE\n".to_string(),
            HelperCommand::Abort => "ABORT\n".to_string(),
        }
    }

    /// Parses one command line, the inverse of [`Self::encode`]. Used by
    /// the `gpbackup-helper` binary, which reads these lines off its
    /// stdin rather than writing them.
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim_end();
        let mut parts = line.split(' ');
        let verb = parts
            .next()
            .ok_or_else(|| MoverError::HelperProtocol(format!("empty command line: {line:?}")))?;

        match verb {
            "DONE" => Ok(HelperCommand::Done),
            "ABORT" => Ok(HelperCommand::Abort),
            "BACKUP" => {
                let relation_oid = parse_oid(&mut parts, line)?;
                let pipe_path = parts
                    .next()
                    .ok_or_else(|| MoverError::HelperProtocol(format!("missing pipe path in: {line:?}")))?
                    .to_string();
                Ok(HelperCommand::Backup { relation_oid, pipe_path })
            }
            "RESTORE" => {
                let relation_oid = parse_oid(&mut parts, line)?;
                let pipe_path = parts
                    .next()
                    .ok_or_else(|| MoverError::HelperProtocol(format!("missing pipe path in: {line:?}")))?
                    .to_string();
                let offset: u64 = parts
                    .next()
                    .ok_or_else(|| MoverError::HelperProtocol(format!("missing offset in: {line:?}")))?
                    .parse()
                    .map_err(|_| MoverError::HelperProtocol(format!("non-numeric offset in: {line:?}")))?;
                let length: u64 = parts
                    .next()
                    .ok_or_else(|| MoverError::HelperProtocol(format!("missing length in: {line:?}")))?
                    .parse()
                    .map_err(|_| MoverError::HelperProtocol(format!("non-numeric length in: {line:?}")))?;
                Ok(HelperCommand::Restore { relation_oid, pipe_path, offset, length })
            }
            other => Err(MoverError::HelperProtocol(format!("unrecognized command {other:?} in: {line:?}"))),
        }
    }
}

fn parse_oid<'a>(parts: &mut impl Iterator<Item = &'a str>, line: &str) -> Result<u32> {
    parts
        .next()
        .ok_or_else(|| MoverError::HelperProtocol(format!("missing oid in: {line:?}")))?
        .parse()
        .map_err(|_| MoverError::HelperProtocol(format!("non-numeric oid in: {line:?}")))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelperResponse {
    pub relation_oid: u32,
    pub ok: bool,
    pub error: Option<String>,
}

impl HelperResponse {
    pub fn ok(relation_oid: u32) -> Self {
        Self { relation_oid, ok: true, error: None }
    }

    pub fn failed(relation_oid: u32, error: impl Into<String>) -> Self {
        Self { relation_oid, ok: false, error: Some(error.into()) }
    }

    /// Renders one `oid status[:error]` line, the inverse of
    /// [`Self::parse`]. `error` must not itself contain a newline; a
    /// `:`-separated `error` is fine since the response grammar only
    /// splits on the first `:`.
    pub fn encode(&self) -> String {
        match (&self.ok, &self.error) {
            (true, _) => format!("{} ok\n", self.relation_oid),
            (false, Some(error)) => format!("{} failed:{}\n", self.relation_oid, error.replace('\n', " ")),
            (false, None) => format!("{} failed:unknown error\n", self.relation_oid),
        }
    }

    /// Parses one `oid status[:error]` line, per §6. `status` is `ok` or
    /// `failed`; a `failed` status must carry an `:error` suffix.
    pub fn parse(line: &str) -> Result<Self> {
        let mut parts = line.trim_end().splitn(2, ' ');
        let oid_str = parts
            .next()
            .ok_or_else(|| MoverError::HelperProtocol(format!("empty response line: {line:?}")))?;
        let rest = parts
            .next()
            .ok_or_else(|| MoverError::HelperProtocol(format!("missing status in: {line:?}")))?;

        let relation_oid: u32 = oid_str
            .parse()
            .map_err(|_| MoverError::HelperProtocol(format!("non-numeric oid in: {line:?}")))?;

        let (status, error) = match rest.split_once(':') {
            Some((status, error)) => (status, Some(error.to_string())),
            None => (rest, None),
        };

        match status {
            "ok" => Ok(Self { relation_oid, ok: true, error: None }),
            "failed" => {
                let error = error.ok_or_else(|| {
                    MoverError::HelperProtocol(format!("failed response missing :error in: {line:?}"))
                })?;
                Ok(Self { relation_oid, ok: false, error: Some(error) })
            }
            other => Err(MoverError::HelperProtocol(format!(
                "unrecognized status {other:?} in: {line:?}"
            ))),
        }
    }
}

/// One long-lived helper child process, bound to a single segment host.
pub struct HelperHandle {
    child: async_process::Child,
    stdin: tokio::fs::File,
    reader: BufReader<tokio::fs::File>,
}

impl HelperHandle {
    /// Spawns `executable` with stdio piped, per §4.D's "one long-lived
    /// helper child process ... speaks a line-oriented command protocol
    /// over its stdin/stdout." `args` configures the helper's fixed
    /// per-run parameters (backup directory, timestamp, content id,
    /// compression, single-file mode) that don't vary per command and so
    /// are passed once at startup rather than repeated on every line.
    pub fn spawn<I, S>(executable: &Path, args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let mut command = std::process::Command::new(executable);
        command
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let std_child = command.spawn()?;
        let mut child: async_process::Child = std_child.into();
        child.kill_on_drop(true);

        let stdin = child.stdin.take().expect("helper spawned with piped stdin");
        let stdout = child.stdout.take().expect("helper spawned with piped stdout");

        Ok(Self {
            child,
            stdin,
            reader: BufReader::new(stdout),
        })
    }

    /// The helper's OS process id, for registering a synchronous
    /// cleanup-ledger `SIGTERM` action alongside the pipe it owns.
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    pub async fn send(&mut self, command: &HelperCommand) -> Result<()> {
        self.stdin.write_all(command.encode().as_bytes()).await?;
        self.stdin.flush().await?;
        Ok(())
    }

    /// Reads one response line. Returns `Ok(None)` on a clean EOF (the
    /// helper exited after `DONE`).
    pub async fn recv(&mut self) -> Result<Option<HelperResponse>> {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line).await?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(HelperResponse::parse(&line)?))
    }

    pub async fn shutdown(mut self) -> Result<std::process::ExitStatus> {
        self.send(&HelperCommand::Done).await?;
        drop(self.stdin);
        Ok(self.child.wait().await?)
    }

    /// Forcibly terminates the helper, used by the orchestrator's abort
    /// path after the grace period in §4.D's failure semantics elapses.
    pub async fn kill(self) -> Result<()> {
        self.child.wait().await?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_encode_backup_command() {
        let command = HelperCommand::Backup {
            relation_oid: 16412,
            pipe_path: "/data1/gpbackup_-1/.../gpbackup_20260727120000_pipe".to_string(),
        };
        assert_eq!(
            command.encode(),
            "BACKUP 16412 /data1/gpbackup_-1/.../gpbackup_20260727120000_pipe\n"
        );
    }

    #[test]
    fn test_encode_restore_command() {
        let command = HelperCommand::Restore {
            relation_oid: 16412,
            pipe_path: "/data1/pipe".to_string(),
            offset: 100,
            length: 200,
        };
        assert_eq!(command.encode(), "RESTORE 16412 /data1/pipe 100 200\n");
    }

    #[test]
    fn test_parse_ok_response() {
        let response = HelperResponse::parse("16412 ok\n").unwrap();
        assert_eq!(response, HelperResponse { relation_oid: 16412, ok: true, error: None });
    }

    #[test]
    fn test_parse_failed_response_requires_error() {
        let response = HelperResponse::parse("16412 failed:pipe closed early\n").unwrap();
        assert_eq!(
            response,
            HelperResponse { relation_oid: 16412, ok: false, error: Some("pipe closed early".to_string()) }
        );

        assert!(HelperResponse::parse("16412 failed\n").is_err());
    }

    #[test]
    fn test_parse_rejects_non_numeric_oid() {
        assert!(HelperResponse::parse("abc ok\n").is_err());
    }

    #[test]
    fn test_command_parse_is_inverse_of_encode() {
        let commands = [
            HelperCommand::Backup { relation_oid: 16412, pipe_path: "/data1/pipe".to_string() },
            HelperCommand::Restore { relation_oid: 16412, pipe_path: "/data1/pipe".to_string(), offset: 100, length: 200 },
            HelperCommand::Done,
            HelperCommand::Abort,
        ];
        for command in commands {
            assert_eq!(HelperCommand::parse(&command.encode()).unwrap(), command);
        }
    }

    #[test]
    fn test_command_parse_rejects_unknown_verb() {
        assert!(HelperCommand::parse("FROBNICATE 1\n").is_err());
    }

    #[test]
    fn test_command_parse_rejects_truncated_restore() {
        assert!(HelperCommand::parse("RESTORE 16412 /data1/pipe 100\n").is_err());
    }

    #[test]
    fn test_response_encode_is_inverse_of_parse() {
        let ok = HelperResponse::ok(16412);
        assert_eq!(HelperResponse::parse(&ok.encode()).unwrap(), ok);

        let failed = HelperResponse::failed(16412, "pipe closed early");
        assert_eq!(HelperResponse::parse(&failed.encode()).unwrap(), failed);
    }
}
