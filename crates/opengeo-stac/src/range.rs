//! Lazy `Read + Seek` view over a remote object fetched with HTTP range
//! requests.
//!
//! The TIFF decoder seeks to the IFD, the tile offset arrays and then to each
//! chunk it decodes; [`RangeSource`] turns those accesses into block-aligned
//! range requests and keeps fetched blocks for the lifetime of one decode.

use std::collections::HashMap;
use std::io::{self, Read, Seek, SeekFrom};

use opengeo_core::error::{OpengeoError, Result};
use reqwest::header::{CONTENT_RANGE, RANGE};
use reqwest::StatusCode;

use crate::client::send_with_retry;

/// Default block size for range requests
pub const DEFAULT_BLOCK_SIZE: u64 = 256 * 1024;

/// Most blocks coalesced into one request
const MAX_BLOCKS_PER_REQUEST: u64 = 64;

/// Bytes returned by one range fetch
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched {
    /// Offset of the first returned byte; servers ignoring `Range` return 0
    pub offset: u64,
    pub bytes: Vec<u8>,
    /// Size of the whole object
    pub total: u64,
}

/// Source of byte ranges of one object
pub trait ReadRange {
    /// Fetch bytes `start..=end`. Implementations may return the whole
    /// object instead when the server does not honour ranges.
    fn read_range(&mut self, start: u64, end: u64) -> Result<Fetched>;
}

/// `Read + Seek` adapter with a block cache over a [`ReadRange`]
pub struct RangeSource<F: ReadRange> {
    fetcher: F,
    block_size: u64,
    len: u64,
    pos: u64,
    blocks: HashMap<u64, Vec<u8>>,
    whole: Option<Vec<u8>>,
    fetched_bytes: u64,
    failure: Option<OpengeoError>,
}

impl<F: ReadRange> RangeSource<F> {
    /// Fetch the first block to learn the object size
    pub fn open(mut fetcher: F, block_size: u64) -> Result<Self> {
        let block_size = block_size.max(1);
        let first = fetcher.read_range(0, block_size - 1)?;
        let mut source = Self {
            fetcher,
            block_size,
            len: first.total,
            pos: 0,
            blocks: HashMap::new(),
            whole: None,
            fetched_bytes: 0,
            failure: None,
        };
        source.store(first);
        Ok(source)
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes transferred so far
    pub fn fetched_bytes(&self) -> u64 {
        self.fetched_bytes
    }

    /// The transport error behind the last failed read, if any. Decoders
    /// only see an `io::Error`; callers use this to recover the cause.
    pub fn take_failure(&mut self) -> Option<OpengeoError> {
        self.failure.take()
    }

    fn store(&mut self, fetched: Fetched) {
        self.fetched_bytes += fetched.bytes.len() as u64;
        if fetched.offset == 0 && fetched.bytes.len() as u64 >= fetched.total {
            self.blocks.clear();
            self.whole = Some(fetched.bytes);
            return;
        }
        let first_block = fetched.offset / self.block_size;
        for (i, chunk) in fetched.bytes.chunks(self.block_size as usize).enumerate() {
            self.blocks.insert(first_block + i as u64, chunk.to_vec());
        }
    }

    /// Make blocks `first..first + count` resident, fetching the missing
    /// prefix run in one request
    fn ensure(&mut self, first: u64, count: u64) -> io::Result<()> {
        if self.whole.is_some() || self.blocks.contains_key(&first) {
            return Ok(());
        }
        let last_block = self.len.saturating_sub(1) / self.block_size;
        let mut end_block = first;
        while end_block + 1 < first + count
            && end_block < last_block
            && !self.blocks.contains_key(&(end_block + 1))
        {
            end_block += 1;
        }

        let start = first * self.block_size;
        let end = ((end_block + 1) * self.block_size).min(self.len) - 1;
        match self.fetcher.read_range(start, end) {
            Ok(fetched) => {
                self.store(fetched);
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                self.failure = Some(e);
                Err(io::Error::other(message))
            }
        }
    }
}

impl<F: ReadRange> Read for RangeSource<F> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || self.pos >= self.len {
            return Ok(0);
        }

        if let Some(whole) = &self.whole {
            let start = self.pos as usize;
            let n = (whole.len() - start).min(buf.len());
            buf[..n].copy_from_slice(&whole[start..start + n]);
            self.pos += n as u64;
            return Ok(n);
        }

        let block = self.pos / self.block_size;
        let within = self.pos - block * self.block_size;
        let wanted = (within + buf.len() as u64).div_ceil(self.block_size);
        self.ensure(block, wanted.min(MAX_BLOCKS_PER_REQUEST))?;

        // `ensure` may have switched to a whole-object buffer
        if self.whole.is_some() {
            return self.read(buf);
        }
        let data = self
            .blocks
            .get(&block)
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "range not returned"))?;
        let within = within as usize;
        if within >= data.len() {
            return Ok(0);
        }
        let n = (data.len() - within).min(buf.len());
        buf[..n].copy_from_slice(&data[within..within + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl<F: ReadRange> Seek for RangeSource<F> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.len.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        };
        match target {
            Some(target) => {
                self.pos = target;
                Ok(target)
            }
            None => Err(io::Error::new(io::ErrorKind::InvalidInput, "seek before start")),
        }
    }
}

/// Total size from a `Content-Range: bytes 0-1023/4096` header
fn parse_content_range(value: &str) -> Option<(u64, u64)> {
    let rest = value.trim().strip_prefix("bytes")?.trim();
    let (range, total) = rest.split_once('/')?;
    let (start, _) = range.split_once('-')?;
    Some((start.trim().parse().ok()?, total.trim().parse().ok()?))
}

/// [`ReadRange`] over HTTP(S), driven on the reader's runtime
pub(crate) struct HttpRange<'a> {
    pub client: &'a reqwest::Client,
    pub runtime: &'a tokio::runtime::Runtime,
    pub href: &'a str,
    pub max_retries: u32,
}

impl ReadRange for HttpRange<'_> {
    fn read_range(&mut self, start: u64, end: u64) -> Result<Fetched> {
        let href = self.href;
        self.runtime.block_on(async {
            let header = format!("bytes={}-{}", start, end);
            let response = send_with_retry(href, self.max_retries, || {
                self.client.get(href).header(RANGE, header.as_str())
            })
            .await?
            .ok_or_else(|| OpengeoError::UpstreamUnavailable {
                url: href.to_string(),
                reason: "asset not found (HTTP 404)".to_string(),
            })?;

            let partial = response.status() == StatusCode::PARTIAL_CONTENT;
            let content_range = response
                .headers()
                .get(CONTENT_RANGE)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_content_range);

            let bytes = response
                .bytes()
                .await
                .map_err(|e| OpengeoError::UpstreamUnavailable {
                    url: href.to_string(),
                    reason: format!("Failed to download asset: {}", e),
                })?
                .to_vec();
            tracing::debug!("Fetched {} bytes at offset {} from {}", bytes.len(), start, href);

            Ok(match (partial, content_range) {
                (true, Some((offset, total))) => Fetched { offset, bytes, total },
                _ => Fetched { offset: 0, total: bytes.len() as u64, bytes },
            })
        })
    }
}
