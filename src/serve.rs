//! Line-delimited JSON-RPC serving loop.

use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tracing::{debug, error, info, warn};

use crate::error::{Result, TransportError};
use crate::front::FrontServer;
use crate::protocol::{self, codes};

/// Longest accepted message line.
pub const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Serves `front` over a pair of byte streams until the reader reaches EOF.
///
/// Each inbound line is one JSON-RPC message; each reply is written as one
/// line. Blank lines are ignored.
pub async fn serve<R, W>(front: &FrontServer, reader: R, mut writer: W) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));

    while let Some(line) = lines.next().await {
        let reply = match line {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                debug!("<- {}", trimmed);
                front.handle_message(trimmed).await
            }
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                warn!("Discarding message longer than {} bytes", MAX_LINE_LENGTH);
                Some(protocol::error(None, codes::PARSE_ERROR, "Message too large").to_string())
            }
            Err(LinesCodecError::Io(e)) => {
                error!("Error reading input: {}", e);
                return Err(TransportError::ReceiveFailed(e.to_string()).into());
            }
        };

        if let Some(reply) = reply {
            debug!("-> {}", reply);
            write_line(&mut writer, &reply).await?;
        }
    }

    info!("Input closed, '{}' shutting down", front.name());
    Ok(())
}

/// Serves `front` on the process's stdin and stdout.
pub async fn serve_stdio(front: &FrontServer) -> Result<()> {
    info!("Serving '{}' on stdio", front.name());
    serve(front, tokio::io::stdin(), tokio::io::stdout()).await
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> Result<()> {
    let send = |e: std::io::Error| TransportError::SendFailed(e.to_string());
    writer.write_all(line.as_bytes()).await.map_err(send)?;
    writer.write_all(b"\n").await.map_err(send)?;
    writer.flush().await.map_err(send)?;
    Ok(())
}
