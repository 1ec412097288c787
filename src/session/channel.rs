use std::time::Instant;

use crate::codec::{Frame, FrameDecoder};
use crate::error::{Error, Result};
use crate::transport::Transport;

/// Largest single read from the socket
const READ_CHUNK: usize = 64 * 1024;

/// A transport paired with its frame decoder
#[derive(Debug)]
pub(crate) struct Channel {
    pub transport: Transport,
    decoder: FrameDecoder,
}

impl Channel {
    pub fn new(transport: Transport) -> Self {
        Self {
            transport,
            decoder: FrameDecoder::new(),
        }
    }

    /// Next frame, waiting at most until `deadline`
    ///
    /// `Ok(None)` means the deadline passed.
    pub fn next_frame_before(&mut self, deadline: Instant) -> Result<Option<Frame>> {
        loop {
            if let Some(frame) = self.decoder.next_frame()? {
                return Ok(Some(frame));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            if self.transport.wait_readable(Some(deadline - now))? {
                let chunk = self.transport.read(READ_CHUNK)?;
                self.decoder.feed(&chunk);
            }
        }
    }

    /// Every frame that can be decoded without blocking
    ///
    /// The flag is `true` when the peer hung up; frames that arrived before the
    /// hang-up are still returned.
    pub fn drain(&mut self) -> Result<(Vec<Frame>, bool)> {
        let mut hung_up = false;
        loop {
            match self.transport.read(READ_CHUNK) {
                Ok(chunk) if chunk.is_empty() => break,
                Ok(chunk) => self.decoder.feed(&chunk),
                Err(Error::ConnectionLost(_)) => {
                    hung_up = true;
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        let mut frames = Vec::new();
        while let Some(frame) = self.decoder.next_frame()? {
            frames.push(frame);
        }
        Ok((frames, hung_up))
    }
}
