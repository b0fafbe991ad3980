use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;

use crate::error::ExecError;
use crate::history::HistoryLogger;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStream {
    Stdout,
    Stderr,
}

impl LineStream {
    fn label(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            Self::Stdout => "OUT ",
            Self::Stderr => "ERR ",
        }
    }
}

/// Streams `rd` into the history logger one prefixed line at a time. Resolves
/// once the stream closes, with the number of bytes read.
pub fn pump_to_history<R>(
    rd: R,
    stream: LineStream,
    logger: Arc<dyn HistoryLogger>,
) -> JoinHandle<Result<u64, ExecError>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(pump(rd, stream, move |line| {
        logger.log(&format!("{}{}", stream.prefix(), line))
    }))
}

/// Reads a stream to the end, discarding it.
pub fn drain(rd: Box<dyn AsyncRead + Unpin + Send>) -> JoinHandle<Result<u64, ExecError>> {
    tokio::spawn(pump(rd, LineStream::Stdout, |_| {}))
}

/// Collects a whole stream in memory.
pub fn collect(mut rd: Box<dyn AsyncRead + Unpin + Send>) -> JoinHandle<Result<String, ExecError>> {
    tokio::spawn(async move {
        let mut buf = Vec::new();
        rd.read_to_end(&mut buf)
            .await
            .map_err(|e| ExecError::StreamIo {
                stream: LineStream::Stderr.label(),
                source: e,
            })?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    })
}

async fn pump<R, F>(mut rd: R, stream: LineStream, mut on_line: F) -> Result<u64, ExecError>
where
    R: AsyncRead + Unpin + Send,
    F: FnMut(&str) + Send,
{
    let mut buf = vec![0u8; 8 * 1024];
    let mut total = 0u64;
    let mut line_buf: Vec<u8> = Vec::with_capacity(4 * 1024);

    loop {
        let n = rd.read(&mut buf).await.map_err(|e| ExecError::StreamIo {
            stream: stream.label(),
            source: e,
        })?;
        if n == 0 {
            break;
        }
        total += n as u64;

        line_buf.extend_from_slice(&buf[..n]);
        while let Some(pos) = line_buf.iter().position(|&b| b == b'\n') {
            let mut one = line_buf.drain(..=pos).collect::<Vec<u8>>();
            trim_newline(&mut one);
            on_line(&String::from_utf8_lossy(&one));
        }
    }

    // EOF: the last line may lack its '\n'.
    if !line_buf.is_empty() {
        trim_newline(&mut line_buf);
        if !line_buf.is_empty() {
            on_line(&String::from_utf8_lossy(&line_buf));
        }
    }

    Ok(total)
}

fn trim_newline(buf: &mut Vec<u8>) {
    if buf.last() == Some(&b'\n') {
        buf.pop();
    }
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
}
