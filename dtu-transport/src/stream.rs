//! Byte channel abstraction shared by the meter UART and the cloud socket
//!
//! The bridge never looks below this trait: link pumps read chunks, write
//! queued frames and react to EOF, whichever physical channel is behind it.

use async_trait::async_trait;
use dtu_core::{DtuError, DtuResult};
use std::time::Duration;

/// Stream accessor interface to a physical byte channel (meter UART or cloud socket)
#[async_trait]
pub trait StreamAccessor: Send + Sync {
    /// Bound reads and writes; `None` waits indefinitely
    ///
    /// An expired read surfaces as `DtuError::Timeout`, which link pumps
    /// treat as "nothing arrived" rather than a failure.
    async fn set_timeout(&mut self, timeout: Option<Duration>) -> DtuResult<()>;

    /// Read whatever has arrived into `buf`, returning 0 at EOF
    ///
    /// Implementations mark themselves closed before returning 0.
    async fn read(&mut self, buf: &mut [u8]) -> DtuResult<usize>;

    /// Read at most `max_bytes` into a fresh buffer
    ///
    /// Serial reads routinely return a fragment of a frame. An empty result
    /// is EOF: the UART was unplugged or hung up, or the cloud peer closed.
    async fn read_chunk(&mut self, max_bytes: usize) -> DtuResult<Vec<u8>> {
        let mut buf = vec![0u8; max_bytes];
        let n = self.read(&mut buf).await?;
        buf.truncate(n);
        Ok(buf)
    }

    /// Write part or all of `buf`, returning how much was accepted
    async fn write(&mut self, buf: &[u8]) -> DtuResult<usize>;

    /// Write a whole frame, failing with `WriteZero` if the channel stalls
    async fn write_all(&mut self, buf: &[u8]) -> DtuResult<()> {
        let mut written = 0;
        while written < buf.len() {
            let n = self.write(&buf[written..]).await?;
            if n == 0 {
                return Err(DtuError::Connection(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "channel accepted no bytes mid-frame",
                )));
            }
            written += n;
        }
        Ok(())
    }

    /// Push written bytes onto the wire
    async fn flush(&mut self) -> DtuResult<()>;

    /// True before `open` and after EOF, a read error or `close`
    fn is_closed(&self) -> bool;

    /// Release the channel; `open` may be called again afterwards
    async fn close(&mut self) -> DtuResult<()>;
}

/// A byte channel that can be (re)established, e.g. after the cloud drops
#[async_trait]
pub trait TransportLayer: StreamAccessor {
    /// Open the port or connect the socket
    async fn open(&mut self) -> DtuResult<()>;
}
