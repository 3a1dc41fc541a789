use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use log::{debug, warn};
use shared::{decode_packet, encode_packet, Packet};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

pub type ClientResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Largest frame the client will accept
pub const MAX_FRAME_LENGTH: usize = 64 * 1024;

/// Framed TCP link to the match server
pub struct Connection {
    reader: FramedRead<OwnedReadHalf, LengthDelimitedCodec>,
    writer: FramedWrite<OwnedWriteHalf, LengthDelimitedCodec>,
}

impl Connection {
    pub async fn connect(server_addr: &str) -> ClientResult<Self> {
        let stream = TcpStream::connect(server_addr).await?;
        stream.set_nodelay(true)?;
        debug!("Connected to {}", server_addr);
        Ok(Self::from_stream(stream))
    }

    pub fn from_stream(stream: TcpStream) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self {
            reader: FramedRead::new(read_half, frame_codec()),
            writer: FramedWrite::new(write_half, frame_codec()),
        }
    }

    pub async fn send(&mut self, packet: &Packet) -> ClientResult<()> {
        let data = encode_packet(packet)?;
        self.writer.send(Bytes::from(data)).await?;
        Ok(())
    }

    /// Next packet from the server, or None once the server closed the stream
    ///
    /// Frames that fail to decode are skipped.
    pub async fn recv(&mut self) -> ClientResult<Option<Packet>> {
        while let Some(frame) = self.reader.next().await {
            match decode_packet(&frame?) {
                Ok(packet) => return Ok(Some(packet)),
                Err(e) => warn!("Failed to decode packet from server: {}", e),
            }
        }
        Ok(None)
    }
}

fn frame_codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(MAX_FRAME_LENGTH)
        .new_codec()
}
