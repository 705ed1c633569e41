//! Direct channel over TCP: runs the chunked transfer protocol over one
//! stream using length-prefixed frames.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use beam_core::wire::{self, FrameReader};
use beam_core::{
    frame_channel, send_paced, ChunkDecoder, ChunkEncoder, DecodeEvent, Progress, ReceivedFile,
    TransferError, TransferMetadata,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

use crate::config::Config;

const READ_BUF: usize = 64 * 1024;
const DEFAULT_MIME: &str = "application/octet-stream";

/// Send the file at `path` to a receiver listening on `addr`. The file is
/// read frame by frame while sending.
pub async fn send_file(addr: SocketAddr, path: &Path, cfg: &Config) -> anyhow::Result<Progress> {
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("opening {}", path.display()))?;
    let size = file.metadata().await?.len();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_owned());
    let metadata = TransferMetadata {
        name,
        size,
        mime_type: DEFAULT_MIME.to_owned(),
    };
    let stream = TcpStream::connect(addr)
        .await
        .with_context(|| format!("connecting to {addr}"))?;
    info!(event = "transfer_initiated", %addr, name = %metadata.name, size = metadata.size, "Sending file");
    send_stream(stream, metadata, BufReader::with_capacity(READ_BUF, file), cfg).await
}

/// Stream one transfer read from `source` into `writer`, paced against the
/// writer task's queue.
pub async fn send_stream<W, R>(
    writer: W,
    metadata: TransferMetadata,
    source: R,
    cfg: &Config,
) -> anyhow::Result<Progress>
where
    W: AsyncWrite + Unpin + Send + 'static,
    R: AsyncRead + Unpin,
{
    let encoder = ChunkEncoder::new(metadata, source, cfg.frame_size)?;
    let (mut sink, mut frames) = frame_channel(cfg.backlog_ceiling);
    let backlog = sink.backlog();
    let writer_task = tokio::spawn(async move {
        let mut writer = writer;
        // Dropping `frames` on error closes the backlog and aborts the sender.
        while let Some(frame) = frames.recv().await {
            let bytes = wire::encode_frame(&frame)?;
            writer.write_all(&bytes).await?;
        }
        writer.flush().await?;
        writer.shutdown().await?;
        anyhow::Ok(())
    });

    let mut last_percent = None;
    let sent = send_paced(encoder, &mut sink, &backlog, cfg.stall_timeout(), |p| {
        if last_percent != Some(p.percent) {
            last_percent = Some(p.percent);
            debug!(event = "transfer_progress", bytes = p.bytes_moved, total = p.total_bytes, percent = p.percent, "Sent");
        }
    })
    .await;
    drop(sink);

    let written = writer_task.await.context("writer task panicked")?;
    // A writer failure surfaces as `Aborted` from the sender; report the cause.
    written.context("writing to direct channel")?;
    let progress = sent?;
    info!(event = "transfer_sent", bytes = progress.bytes_moved, "Transfer sent");
    Ok(progress)
}

/// Accept one connection on `listen`, receive one transfer and write it into `dir`.
pub async fn receive_file(listen: SocketAddr, dir: &Path) -> anyhow::Result<PathBuf> {
    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("binding {listen}"))?;
    info!(event = "receiver_listening", addr = %listener.local_addr()?, "Waiting for sender");
    let (stream, peer) = listener.accept().await?;
    info!(event = "sender_connected", %peer, "Sender connected");
    let file = receive_stream(stream).await?;
    let path = dir.join(sanitize_file_name(&file.metadata.name));
    tokio::fs::write(&path, &file.data)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    info!(event = "transfer_received", path = %path.display(), bytes = file.data.len(), "File saved");
    Ok(path)
}

/// Decode frames from `reader` until one transfer completes.
pub async fn receive_stream<R>(mut reader: R) -> anyhow::Result<ReceivedFile>
where
    R: AsyncRead + Unpin,
{
    let mut decoder = ChunkDecoder::new();
    let mut frames = FrameReader::new();
    let mut chunk = vec![0u8; READ_BUF];
    loop {
        while let Some(frame) = frames
            .next_frame()
            .context("decoding direct-channel frame")?
        {
            match decoder.push(frame)? {
                Some(DecodeEvent::Started(m)) => {
                    info!(event = "transfer_started", name = %m.name, size = m.size, mime = %m.mime_type, "Receiving file")
                }
                Some(DecodeEvent::Progress(p)) => {
                    debug!(event = "transfer_progress", bytes = p.bytes_moved, total = p.total_bytes, percent = p.percent, "Received")
                }
                Some(DecodeEvent::Complete { file, .. }) => return Ok(file),
                None => {}
            }
        }
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            if frames.buffered() > 0 {
                debug!(event = "partial_frame", bytes = frames.buffered(), "Stream ended inside a frame");
            }
            bail!(TransferError::Aborted);
        }
        frames.extend(&chunk[..n]);
    }
}

/// Keep only the final path component, restricted to a safe character set.
fn sanitize_file_name(name: &str) -> String {
    let last = name
        .rsplit(['/', '\\'])
        .find(|part| !part.is_empty() && *part != "." && *part != "..")
        .unwrap_or("");
    let safe: String = last
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '.' | '-' | '_' | ' '))
        .collect();
    let safe = safe.trim_start_matches('.').to_owned();
    if safe.is_empty() {
        "file".to_owned()
    } else {
        safe
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(name: &str, size: usize) -> TransferMetadata {
        TransferMetadata {
            name: name.to_owned(),
            size: size as u64,
            mime_type: DEFAULT_MIME.to_owned(),
        }
    }

    #[tokio::test]
    async fn transfer_over_duplex_stream() {
        let data: Vec<u8> = (0..300_000u32).map(|i| (i % 241) as u8).collect();
        let (a, b) = tokio::io::duplex(8 * 1024);
        let cfg = Config {
            frame_size: 4096,
            backlog_ceiling: 16 * 1024,
            ..Config::default()
        };
        let receiver = tokio::spawn(receive_stream(b));
        let sent = send_stream(a, meta("big.bin", data.len()), &data[..], &cfg)
            .await
            .unwrap();
        assert_eq!(sent.percent, 100);
        let file = receiver.await.unwrap().unwrap();
        assert_eq!(file.metadata.name, "big.bin");
        assert_eq!(file.data, data);
    }

    #[tokio::test]
    async fn truncated_stream_is_an_error() {
        let data = vec![1u8; 100];
        let mut encoder = ChunkEncoder::new(meta("cut.bin", 100), &data[..], 16).unwrap();
        let mut bytes = Vec::new();
        // Metadata and two data frames, then the connection drops.
        for _ in 0..3 {
            let emitted = encoder.next_frame().await.unwrap().unwrap();
            bytes.extend(wire::encode_frame(&emitted.frame).unwrap());
        }
        let err = receive_stream(&bytes[..]).await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<TransferError>(),
            Some(&TransferError::Aborted)
        );
    }

    #[tokio::test]
    async fn largest_frame_size_goes_through() {
        let len = beam_core::MAX_FRAME_SIZE + 10;
        let (a, b) = tokio::io::duplex(1024 * 1024);
        let cfg = Config {
            frame_size: beam_core::MAX_FRAME_SIZE,
            ..Config::default()
        };
        let receiver = tokio::spawn(receive_stream(b));
        let source = tokio::io::repeat(0x5A).take(len as u64);
        let sent = send_stream(a, meta("max.bin", len), source, &cfg).await.unwrap();
        assert_eq!(sent.bytes_moved, len as u64);
        let file = receiver.await.unwrap().unwrap();
        assert_eq!(file.data.len(), len);
        assert!(file.data.iter().all(|&x| x == 0x5A));
    }

    #[tokio::test]
    async fn frame_size_over_wire_limit_is_refused_up_front() {
        let (a, _b) = tokio::io::duplex(64);
        let cfg = Config {
            frame_size: beam_core::MAX_FRAME_SIZE + 1,
            ..Config::default()
        };
        let err = send_stream(a, meta("x.bin", 1), &[0u8][..], &cfg)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TransferError>(),
            Some(TransferError::FrameSizeTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn tcp_send_and_receive() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("hello.txt");
        tokio::fs::write(&src, b"hello over the direct channel").await.unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let receiver = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            receive_stream(stream).await
        });
        send_file(addr, &src, &Config::default()).await.unwrap();
        let file = receiver.await.unwrap().unwrap();
        assert_eq!(file.metadata.name, "hello.txt");
        assert_eq!(file.data, b"hello over the direct channel");
    }

    #[test]
    fn file_names_are_sanitized() {
        assert_eq!(sanitize_file_name("photo.jpg"), "photo.jpg");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\Users\\me\\doc.pdf"), "doc.pdf");
        assert_eq!(sanitize_file_name(".."), "file");
        assert_eq!(sanitize_file_name(".bashrc"), "bashrc");
        assert_eq!(sanitize_file_name("a<b>c.txt"), "abc.txt");
    }
}
