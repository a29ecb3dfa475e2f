//! The per-segment helper process, per §4.D and §6 "Helper protocol": one
//! command per line on stdin, one `oid status[:error]` response per line
//! on stdout. Owns the only place in this workspace that frames
//! single-data-file tables and applies gzip compression, per §9's
//! "compression framing belongs inside the helper, not the database side,
//! so the database's COPY speaks raw bytes."
//!
//! This process is never invoked directly by a user; the orchestrator
//! spawns one per segment host, passing its fixed per-run parameters
//! (backup directory, timestamp, content id, compression, single-file
//! mode) once at startup, per `gpbackup_mover::helper`'s `HelperHandle`.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use gpbackup_archive::{Layout, Timestamp};
use gpbackup_mover::{HelperCommand, HelperResponse};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    Backup,
    Restore,
}

#[derive(Debug, Parser)]
#[command(name = "gpbackup-helper", version)]
struct Args {
    /// Whether the pipes this helper drains are being written by `COPY ...
    /// TO PROGRAM` (backup) or read by `COPY ... FROM PROGRAM` (restore).
    #[arg(long, value_enum)]
    mode: Mode,

    #[arg(long = "backup-dir")]
    backup_dir: PathBuf,

    #[arg(long)]
    timestamp: String,

    #[arg(long = "content-id")]
    content_id: i32,

    #[arg(long = "single-data-file")]
    single_data_file: bool,

    #[arg(long = "compression-level")]
    compression_level: Option<u32>,
}

#[tokio::main]
async fn main() {
    gpbackup_ops::init(false, false);
    let args = Args::parse();

    if let Err(e) = run(args).await {
        tracing::error!(error = %e, "helper failed");
        eprintln!("gpbackup-helper: {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let timestamp = Timestamp::parse(&args.timestamp)
        .ok_or_else(|| anyhow::anyhow!("not a 14-digit timestamp: {}", args.timestamp))?;
    let layout = Layout::new(args.backup_dir.clone(), timestamp);
    let compression = args.compression_level;
    let content_id = args.content_id;
    let single_data_file = args.single_data_file;

    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let command = match HelperCommand::parse(&line) {
            Ok(command) => command,
            Err(e) => {
                tracing::warn!(line = %line, error = %e, "ignoring unparseable command");
                continue;
            }
        };

        let response = match command {
            HelperCommand::Done | HelperCommand::Abort => break,
            HelperCommand::Backup { relation_oid, pipe_path } if matches!(args.mode, Mode::Backup) => {
                let layout = layout.clone();
                tokio::task::spawn_blocking(move || {
                    backup_one(&layout, content_id, relation_oid, &pipe_path, single_data_file, compression)
                })
                .await
                .expect("backup_one does not panic")
            }
            HelperCommand::Restore { relation_oid, pipe_path, offset, length } if matches!(args.mode, Mode::Restore) => {
                let layout = layout.clone();
                tokio::task::spawn_blocking(move || {
                    restore_one(
                        &layout,
                        content_id,
                        relation_oid,
                        &pipe_path,
                        single_data_file,
                        compression,
                        offset,
                        length,
                    )
                })
                .await
                .expect("restore_one does not panic")
            }
            HelperCommand::Backup { relation_oid, .. } => {
                HelperResponse::failed(relation_oid, format!("BACKUP command sent to a {:?}-mode helper", args.mode))
            }
            HelperCommand::Restore { relation_oid, .. } => {
                HelperResponse::failed(relation_oid, format!("RESTORE command sent to a {:?}-mode helper", args.mode))
            }
        };

        stdout.write_all(response.encode().as_bytes()).await?;
        stdout.flush().await?;
    }

    Ok(())
}

/// Drains `pipe_path` (the database's `COPY ... TO PROGRAM` end) into this
/// table's archive location, per §4.D. In single-file mode the table's
/// bytes are framed with a `-- oid N` header and `-- end oid N` terminator
/// and appended to the segment's shared pipe file, one gzip member per
/// table so a later restore can seek directly to this table's byte range
/// and decompress only it; in per-table mode the table gets its own file.
fn backup_one(
    layout: &Layout,
    content_id: i32,
    relation_oid: u32,
    pipe_path: &str,
    single_data_file: bool,
    compression: Option<u32>,
) -> HelperResponse {
    match backup_one_inner(layout, content_id, relation_oid, pipe_path, single_data_file, compression) {
        Ok(()) => HelperResponse::ok(relation_oid),
        Err(e) => HelperResponse::failed(relation_oid, e.to_string()),
    }
}

fn backup_one_inner(
    layout: &Layout,
    content_id: i32,
    relation_oid: u32,
    pipe_path: &str,
    single_data_file: bool,
    compression: Option<u32>,
) -> io::Result<()> {
    let mut source = File::open(pipe_path)?;

    if single_data_file {
        let archive_path = layout.segment_pipe_file(content_id);
        if let Some(parent) = archive_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut archive = OpenOptions::new().create(true).append(true).open(archive_path)?;
        archive.write_all(format!("-- oid {relation_oid}\n").as_bytes())?;
        copy_payload(&mut source, &mut archive, compression)?;
        archive.write_all(format!("-- end oid {relation_oid}\n").as_bytes())?;
        archive.flush()
    } else {
        let table_path = layout.segment_table_file(content_id, relation_oid);
        if let Some(parent) = table_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut target = File::create(table_path)?;
        copy_payload(&mut source, &mut target, compression)?;
        target.flush()
    }
}

fn copy_payload(source: &mut impl Read, target: &mut impl Write, compression: Option<u32>) -> io::Result<()> {
    if let Some(level) = compression {
        let mut encoder = GzEncoder::new(target, Compression::new(level));
        io::copy(source, &mut encoder)?;
        encoder.finish()?;
        Ok(())
    } else {
        io::copy(source, target)?;
        Ok(())
    }
}

/// Feeds `pipe_path` (the database's `COPY ... FROM PROGRAM` end) with one
/// table's bytes, read back from wherever `backup_one` put them. `offset`/
/// `length` select this table's framed block within the shared single-file
/// archive; both are `0` in per-table mode, where the whole file belongs
/// to one table.
#[allow(clippy::too_many_arguments)]
fn restore_one(
    layout: &Layout,
    content_id: i32,
    relation_oid: u32,
    pipe_path: &str,
    single_data_file: bool,
    compression: Option<u32>,
    offset: u64,
    length: u64,
) -> HelperResponse {
    match restore_one_inner(layout, content_id, relation_oid, pipe_path, single_data_file, compression, offset, length)
    {
        Ok(()) => HelperResponse::ok(relation_oid),
        Err(e) => HelperResponse::failed(relation_oid, e.to_string()),
    }
}

#[allow(clippy::too_many_arguments)]
fn restore_one_inner(
    layout: &Layout,
    content_id: i32,
    relation_oid: u32,
    pipe_path: &str,
    single_data_file: bool,
    compression: Option<u32>,
    offset: u64,
    length: u64,
) -> io::Result<()> {
    let payload = if single_data_file {
        let archive_path = layout.segment_pipe_file(content_id);
        let mut archive = File::open(archive_path)?;
        archive.seek(SeekFrom::Start(offset))?;
        let mut framed = vec![0u8; length as usize];
        archive.read_exact(&mut framed)?;
        strip_frame(&framed, relation_oid)?.to_vec()
    } else {
        let table_path = layout.segment_table_file(content_id, relation_oid);
        std::fs::read(table_path)?
    };

    let mut sink = File::create(pipe_path)?;
    if compression.is_some() {
        let mut decoder = GzDecoder::new(payload.as_slice());
        io::copy(&mut decoder, &mut sink)?;
    } else {
        sink.write_all(&payload)?;
    }
    sink.flush()
}

/// Strips the `-- oid N` / `-- end oid N` framing `backup_one_inner`
/// wrote around a table's single-file-mode bytes.
fn strip_frame(framed: &[u8], relation_oid: u32) -> io::Result<&[u8]> {
    let header = format!("-- oid {relation_oid}\n");
    let footer = format!("-- end oid {relation_oid}\n");
    let after_header = framed.strip_prefix(header.as_bytes()).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("single-file block for oid {relation_oid} missing expected header"),
        )
    })?;
    after_header.strip_suffix(footer.as_bytes()).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("single-file block for oid {relation_oid} missing expected terminator"),
        )
    })
}

#[cfg(test)]
mod test {
    use super::*;

    fn make_pipe(dir: &std::path::Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        nix::unistd::mkfifo(&path, nix::sys::stat::Mode::from_bits_truncate(0o600)).unwrap();
        path
    }

    #[test]
    fn test_strip_frame_round_trips() {
        let mut framed = Vec::new();
        framed.extend_from_slice(b"-- oid 16412\n");
        framed.extend_from_slice(b"hello world");
        framed.extend_from_slice(b"-- end oid 16412\n");
        assert_eq!(strip_frame(&framed, 16412).unwrap(), b"hello world");
    }

    #[test]
    fn test_strip_frame_rejects_wrong_oid() {
        let mut framed = Vec::new();
        framed.extend_from_slice(b"-- oid 1\n");
        framed.extend_from_slice(b"payload");
        framed.extend_from_slice(b"-- end oid 1\n");
        assert!(strip_frame(&framed, 2).is_err());
    }

    #[test]
    fn test_copy_payload_uncompressed() {
        let mut source = std::io::Cursor::new(b"abc".to_vec());
        let mut target = Vec::new();
        copy_payload(&mut source, &mut target, None).unwrap();
        assert_eq!(target, b"abc");
    }

    #[test]
    fn test_copy_payload_compressed_round_trips() {
        let mut source = std::io::Cursor::new(b"row one\nrow two\n".to_vec());
        let mut target = Vec::new();
        copy_payload(&mut source, &mut target, Some(6)).unwrap();
        assert_ne!(target, b"row one\nrow two\n");

        let mut decoder = GzDecoder::new(target.as_slice());
        let mut round_tripped = Vec::new();
        decoder.read_to_end(&mut round_tripped).unwrap();
        assert_eq!(round_tripped, b"row one\nrow two\n");
    }

    #[test]
    fn test_backup_then_restore_per_table_mode() {
        let dir = tempfile::tempdir().unwrap();
        let timestamp = Timestamp::parse("20260727153000").unwrap();
        let layout = Layout::new(dir.path().join("gpbackup"), timestamp);

        let backup_pipe = make_pipe(dir.path(), "backup_xfer");
        let writer = {
            let backup_pipe = backup_pipe.clone();
            std::thread::spawn(move || {
                let mut pipe = File::create(&backup_pipe).unwrap();
                pipe.write_all(b"1\tfoo\n2\tbar\n").unwrap();
            })
        };
        backup_one_inner(&layout, 0, 16412, backup_pipe.to_str().unwrap(), false, Some(6)).unwrap();
        writer.join().unwrap();

        let table_path = layout.segment_table_file(0, 16412);
        assert!(table_path.exists());

        let restore_pipe = make_pipe(dir.path(), "restore_xfer");
        let reader = {
            let restore_pipe = restore_pipe.clone();
            std::thread::spawn(move || {
                let mut pipe = File::open(&restore_pipe).unwrap();
                let mut buf = Vec::new();
                pipe.read_to_end(&mut buf).unwrap();
                buf
            })
        };
        restore_one_inner(&layout, 0, 16412, restore_pipe.to_str().unwrap(), false, Some(6), 0, 0).unwrap();
        let restored = reader.join().unwrap();
        assert_eq!(restored, b"1\tfoo\n2\tbar\n");
    }

    #[test]
    fn test_backup_then_restore_single_file_mode_two_tables() {
        let dir = tempfile::tempdir().unwrap();
        let timestamp = Timestamp::parse("20260727153000").unwrap();
        let layout = Layout::new(dir.path().join("gpbackup"), timestamp);

        for (oid, body) in [(100u32, b"first table".to_vec()), (200u32, b"second table, longer".to_vec())] {
            let pipe = make_pipe(dir.path(), &format!("xfer_{oid}"));
            let writer = {
                let pipe = pipe.clone();
                let body = body.clone();
                std::thread::spawn(move || {
                    let mut f = File::create(&pipe).unwrap();
                    f.write_all(&body).unwrap();
                })
            };
            backup_one_inner(&layout, -1, oid, pipe.to_str().unwrap(), true, None).unwrap();
            writer.join().unwrap();
        }

        let archive_path = layout.segment_pipe_file(-1);
        let archive_len = std::fs::metadata(&archive_path).unwrap().len();
        assert!(archive_len > 0);

        // Recover each table's framed range by scanning for its header,
        // the way the orchestrator's `DataEntry::single_file_range` would
        // have recorded it from file-length deltas around each append.
        let contents = std::fs::read(&archive_path).unwrap();
        let first_header = b"-- oid 100\n";
        let first_end = b"-- end oid 100\n";
        let first_start = 0u64;
        let first_len = (first_header.len() + "first table".len() + first_end.len()) as u64;

        let restore_pipe = make_pipe(dir.path(), "restore_xfer_100");
        let reader = {
            let restore_pipe = restore_pipe.clone();
            std::thread::spawn(move || {
                let mut pipe = File::open(&restore_pipe).unwrap();
                let mut buf = Vec::new();
                pipe.read_to_end(&mut buf).unwrap();
                buf
            })
        };
        restore_one_inner(
            &layout,
            -1,
            100,
            restore_pipe.to_str().unwrap(),
            true,
            None,
            first_start,
            first_len,
        )
        .unwrap();
        assert_eq!(reader.join().unwrap(), b"first table");
        assert!(contents.len() as u64 > first_len);
    }
}
