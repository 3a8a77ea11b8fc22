//! Pooled Serialization Buffer
//!
//! ## Purpose
//!
//! Accumulates one outgoing message as an ordered list of blocks without
//! copying caller-owned data, then emits it onto a stream with one write per
//! block. Blocks survive [`BufferedWriter::restart`] so steady-state traffic
//! stops allocating after the first few messages.
//!
//! ## Architecture Role
//!
//! ```text
//! PortWriter ─► BufferedWriter ─► Carrier::write ─► stream
//!                 │
//!                 ├── header blocks  (carrier preamble, written first)
//!                 └── body blocks    (payload)
//! ```
//!
//! ## Memory Model
//!
//! - Small appends are copied into a pool block. When the active pool block
//!   is full a new one is allocated, doubling from the initial pool size up
//!   to a 64 KiB cap. A chunk larger than the cap gets a block of its own.
//! - [`BufferedWriter::append_block`] stores a borrowed reference. The
//!   borrow is tracked by the `'a` lifetime, so the caller's bytes cannot
//!   change or go away before the message is written.
//! - Each list keeps a used count separate from its length; restarting only
//!   resets the counts and reuses owned storage in place.

use crate::bottle::Bottle;
use crate::connection::{BytesReader, ConnectionWriter, PortReader};
use crate::error::Result;
use std::io::{self, Write};
use tracing::debug;

/// First pool block size
pub const INITIAL_POOL_SIZE: usize = 1024;

/// Pool blocks stop doubling at this size
pub const MAX_POOL_SIZE: usize = 65536;

enum Storage<'a> {
    Owned(Vec<u8>),
    Borrowed(&'a [u8]),
}

/// One contiguous piece of a message
struct ManagedBlock<'a> {
    storage: Storage<'a>,
    used: usize,
}

impl<'a> ManagedBlock<'a> {
    fn owned(capacity: usize) -> Self {
        Self {
            storage: Storage::Owned(vec![0u8; capacity]),
            used: 0,
        }
    }

    fn borrowed(data: &'a [u8]) -> Self {
        Self {
            storage: Storage::Borrowed(data),
            used: data.len(),
        }
    }

    fn capacity(&self) -> usize {
        match &self.storage {
            Storage::Owned(buf) => buf.len(),
            Storage::Borrowed(_) => 0,
        }
    }

    fn remaining(&self) -> usize {
        match &self.storage {
            Storage::Owned(buf) => buf.len() - self.used,
            Storage::Borrowed(_) => 0,
        }
    }

    fn push(&mut self, data: &[u8]) {
        if let Storage::Owned(buf) = &mut self.storage {
            buf[self.used..self.used + data.len()].copy_from_slice(data);
            self.used += data.len();
        }
    }

    fn bytes(&self) -> &[u8] {
        match &self.storage {
            Storage::Owned(buf) => &buf[..self.used],
            Storage::Borrowed(data) => &data[..self.used],
        }
    }
}

#[derive(Default)]
struct BlockList<'a> {
    blocks: Vec<ManagedBlock<'a>>,
    used: usize,
    pool: Option<usize>,
}

impl<'a> BlockList<'a> {
    fn push_borrowed(&mut self, data: &'a [u8]) {
        let block = ManagedBlock::borrowed(data);
        if self.used < self.blocks.len() {
            self.blocks[self.used] = block;
        } else {
            self.blocks.push(block);
        }
        self.used += 1;
        self.pool = None;
    }

    fn push_copy(&mut self, data: &[u8], pool_size: &mut usize, max_pool: usize) {
        if data.is_empty() {
            return;
        }
        let pool = self.pool;
        let index = match pool {
            Some(index) if self.blocks[index].remaining() >= data.len() => index,
            _ => self.start_pool(data.len(), pool_size, max_pool),
        };
        self.blocks[index].push(data);
    }

    fn start_pool(&mut self, needed: usize, pool_size: &mut usize, max_pool: usize) -> usize {
        let capacity = (*pool_size).max(needed);
        if *pool_size < max_pool {
            *pool_size = (*pool_size * 2).min(max_pool);
        }

        let index = self.used;
        let reusable = index < self.blocks.len() && self.blocks[index].capacity() >= needed;
        if reusable {
            self.blocks[index].used = 0;
        } else if index < self.blocks.len() {
            self.blocks[index] = ManagedBlock::owned(capacity);
        } else {
            self.blocks.push(ManagedBlock::owned(capacity));
        }
        self.used += 1;
        self.pool = Some(index);
        index
    }

    fn active(&self) -> impl Iterator<Item = &ManagedBlock<'a>> {
        self.blocks[..self.used].iter()
    }

    fn byte_len(&self) -> usize {
        self.active().map(|b| b.used).sum()
    }

    fn restart(&mut self) {
        self.used = 0;
        self.pool = None;
    }

    fn clear(&mut self) {
        self.blocks.clear();
        self.restart();
    }

    fn collect(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.byte_len());
        for block in self.active() {
            out.extend_from_slice(block.bytes());
        }
        out
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Target {
    Header,
    Body,
}

/// Block-pooling writer for one message at a time
pub struct BufferedWriter<'a> {
    header: BlockList<'a>,
    body: BlockList<'a>,
    target: Target,
    pool_size: usize,
    initial_pool_size: usize,
    max_pool_size: usize,
    text_mode: bool,
    convert_pending: bool,
    reply_handler: Option<&'a mut (dyn PortReader + Send)>,
}

impl<'a> BufferedWriter<'a> {
    pub fn new() -> Self {
        Self::with_pool_sizes(INITIAL_POOL_SIZE, MAX_POOL_SIZE)
    }

    pub fn with_pool_sizes(initial: usize, max: usize) -> Self {
        let initial = initial.max(1);
        Self {
            header: BlockList::default(),
            body: BlockList::default(),
            target: Target::Body,
            pool_size: initial,
            initial_pool_size: initial,
            max_pool_size: max.max(initial),
            text_mode: false,
            convert_pending: false,
            reply_handler: None,
        }
    }

    /// Start a new message, keeping allocated blocks for reuse
    pub fn reset(&mut self, text_mode: bool) {
        self.restart();
        self.text_mode = text_mode;
    }

    /// Drop the current message but keep every block
    pub fn restart(&mut self) {
        self.header.restart();
        self.body.restart();
        self.target = Target::Body;
        self.pool_size = self.initial_pool_size;
        self.convert_pending = false;
        self.reply_handler = None;
    }

    /// Drop the current message and release all storage
    pub fn clear(&mut self) {
        self.restart();
        self.header.clear();
        self.body.clear();
    }

    /// Route subsequent appends to the header list until the next restart
    pub fn add_to_header(&mut self) {
        self.target = Target::Header;
    }

    fn list(&mut self) -> &mut BlockList<'a> {
        match self.target {
            Target::Header => &mut self.header,
            Target::Body => &mut self.body,
        }
    }

    /// Reference `data` without copying it
    pub fn append_block(&mut self, data: &'a [u8]) {
        if data.is_empty() {
            return;
        }
        self.list().push_borrowed(data);
    }

    /// Copy `data` into pooled storage
    pub fn append_block_copy(&mut self, data: &[u8]) {
        let max = self.max_pool_size;
        let mut pool_size = self.pool_size;
        self.list().push_copy(data, &mut pool_size, max);
        self.pool_size = pool_size;
    }

    /// Ask the writer to render its binary body as a text line at write time
    pub fn convert_text_mode(&mut self) -> bool {
        if !self.text_mode {
            self.convert_pending = true;
        }
        true
    }

    pub fn is_text_mode(&self) -> bool {
        self.text_mode || self.convert_pending
    }

    pub fn set_reply_handler(&mut self, handler: &'a mut (dyn PortReader + Send)) {
        self.reply_handler = Some(handler);
    }

    pub fn has_reply_handler(&self) -> bool {
        self.reply_handler.is_some()
    }

    pub fn take_reply_handler(&mut self) -> Option<&'a mut (dyn PortReader + Send)> {
        self.reply_handler.take()
    }

    /// Finish the message: apply any deferred text conversion
    pub fn stop_write(&mut self) {
        if !self.convert_pending {
            return;
        }
        self.convert_pending = false;
        let body = self.body.collect();
        match Bottle::from_bytes(&body) {
            Ok(bottle) => {
                let line = format!("{}\n", bottle);
                self.body.restart();
                self.text_mode = true;
                let mut pool_size = self.pool_size;
                self.body
                    .push_copy(line.as_bytes(), &mut pool_size, self.max_pool_size);
                self.pool_size = pool_size;
            }
            Err(e) => {
                debug!(error = %e, bytes = body.len(), "body is not a bottle, sending unconverted");
            }
        }
    }

    /// Total bytes in header and body
    pub fn size(&self) -> usize {
        self.header.byte_len() + self.body.byte_len()
    }

    pub fn header_size(&self) -> usize {
        self.header.byte_len()
    }

    pub fn body_size(&self) -> usize {
        self.body.byte_len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Number of blocks a write will emit
    pub fn block_count(&self) -> usize {
        self.header.used + self.body.used
    }

    /// Header then body, flattened
    pub fn to_bytes(&mut self) -> Vec<u8> {
        self.stop_write();
        let mut out = self.header.collect();
        out.extend_from_slice(&self.body.collect());
        out
    }

    /// Emit header blocks then body blocks, one write per block, then flush
    pub fn write_to<W: Write + ?Sized>(&mut self, out: &mut W) -> io::Result<()> {
        self.stop_write();
        for block in self.header.active().chain(self.body.active()) {
            out.write_all(block.bytes())?;
        }
        out.flush()
    }

    /// Loop the message back into `reader` without touching a stream
    pub fn write_to_reader(&mut self, reader: &mut dyn PortReader) -> Result<()> {
        let text_mode = self.is_text_mode();
        let bytes = self.to_bytes();
        let mut source = if text_mode {
            BytesReader::text(&bytes)
        } else {
            BytesReader::new(&bytes)
        };
        reader.read(&mut source)
    }
}

impl Default for BufferedWriter<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionWriter for BufferedWriter<'_> {
    fn append_bytes(&mut self, data: &[u8]) {
        self.append_block_copy(data);
    }

    fn is_text_mode(&self) -> bool {
        BufferedWriter::is_text_mode(self)
    }

    fn convert_text_mode(&mut self) -> bool {
        BufferedWriter::convert_text_mode(self)
    }
}
