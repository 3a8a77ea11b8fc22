//! Length-scoped message reader
//!
//! Each incoming message is read through a [`StreamConnectionReader`] that
//! refuses to read past the payload length announced by the carrier's index.
//! Text carriers announce no length; their reader is unbounded and payload
//! types read lines.

use crate::carriers::ConnectionState;
use crate::Result;
use codec::{BufferedWriter, CodecError, ConnectionReader, ConnectionWriter};
use std::io::{Cursor, Read};

/// Reader bookkeeping that outlives a single borrow of the stream
pub(crate) struct ReadSession {
    remaining: Option<usize>,
    text_mode: bool,
    buffered: Option<Cursor<Vec<u8>>>,
    pub(crate) reply: BufferedWriter<'static>,
}

impl ReadSession {
    pub(crate) fn new() -> Self {
        Self {
            remaining: Some(0),
            text_mode: false,
            buffered: None,
            reply: BufferedWriter::new(),
        }
    }

    pub(crate) fn with_pool_sizes(initial: usize, max: usize) -> Self {
        Self {
            reply: BufferedWriter::with_pool_sizes(initial, max),
            ..Self::new()
        }
    }

    /// Start reading a message straight off the stream
    pub(crate) fn begin(&mut self, len: Option<usize>, text_mode: bool) {
        self.remaining = len;
        self.text_mode = text_mode;
        self.buffered = None;
        self.reply.reset(text_mode);
    }

    /// Start reading a message that was already pulled off the stream
    pub(crate) fn begin_buffered(&mut self, payload: Vec<u8>, text_mode: bool) {
        self.remaining = Some(payload.len());
        self.text_mode = text_mode;
        self.buffered = Some(Cursor::new(payload));
        self.reply.reset(text_mode);
    }

    /// Skip whatever the payload reader left unread
    pub(crate) fn drain(&mut self, state: &mut ConnectionState) -> Result<()> {
        if self.buffered.take().is_some() {
            self.remaining = Some(0);
            return Ok(());
        }
        if let Some(left) = self.remaining {
            if left > 0 {
                state.discard(left)?;
            }
            self.remaining = Some(0);
        }
        Ok(())
    }
}

/// [`ConnectionReader`] over the current message on a protocol's stream
pub struct StreamConnectionReader<'s> {
    state: &'s mut ConnectionState,
    session: &'s mut ReadSession,
}

impl<'s> StreamConnectionReader<'s> {
    pub(crate) fn new(state: &'s mut ConnectionState, session: &'s mut ReadSession) -> Self {
        Self { state, session }
    }
}

impl ConnectionReader for StreamConnectionReader<'_> {
    fn expect_block(&mut self, buf: &mut [u8]) -> codec::Result<()> {
        if let Some(available) = self.session.remaining {
            if buf.len() > available {
                return Err(CodecError::Truncated {
                    need: buf.len(),
                    available,
                });
            }
        }
        match self.session.buffered.as_mut() {
            Some(cursor) => cursor.read_exact(buf)?,
            None => self.state.read_exact_io(buf)?,
        }
        if let Some(available) = self.session.remaining.as_mut() {
            *available -= buf.len();
        }
        Ok(())
    }

    fn is_text_mode(&self) -> bool {
        self.session.text_mode
    }

    fn size(&self) -> Option<usize> {
        self.session.remaining
    }

    fn writer(&mut self) -> Option<&mut dyn ConnectionWriter> {
        if !self.session.text_mode && !self.state.reply_expected() {
            return None;
        }
        Some(&mut self.session.reply)
    }

    fn is_active(&self) -> bool {
        self.state.is_ok()
    }
}
