//! Splits the live encoder's unframed stdout into (manifest, segment) pairs.
//!
//! The encoder writes a segment's transport-stream bytes followed by the
//! playlist text that references it. The only boundary available on the pipe
//! is the playlist's last line, a segment reference ending in `.ts\n`. Segment
//! payloads can end in the same four bytes, so a candidate boundary is only
//! accepted once the rewritten playlist ends with the segment name this
//! demuxer expects next.
//!
//! A missed boundary is not recoverable: the stale `#EXTM3U` stays first in
//! the buffer and every later candidate fails validation. The buffer is
//! therefore capped, and exceeding the cap is reported as [`DemuxStalled`].

use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tracing::trace;

use super::playlist::{
    manifest_name, media_sequence, rewrite_segment_references, segment_name, TAG_HEADER,
    TAG_MEDIA_SEQUENCE,
};
use crate::domain::jobs::Resolution;

const CANDIDATE_TAIL: &[u8] = b".ts\n";

/// Default cap on bytes held while waiting for a validated boundary.
pub const DEFAULT_MAX_BUFFERED: usize = 64 * 1024 * 1024;

/// One validated unit ready to be shipped to the node.
#[derive(Debug, Clone, PartialEq)]
pub struct DemuxedSegment {
    pub sequence_index: u64,
    pub manifest_name: String,
    pub segment_name: String,
    /// Rewritten playlist text
    pub manifest: Bytes,
    pub segment: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("no segment boundary within {buffered} buffered bytes, expecting index {expected_index}")]
pub struct DemuxStalled {
    pub buffered: usize,
    pub expected_index: u64,
}

/// Why a candidate boundary was rejected. Rejections are expected and only traced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BoundaryCheck {
    MissingMarkers,
    ValidationMismatch,
}

struct Split {
    offset: usize,
    manifest: String,
    next_index: u64,
}

#[derive(Debug)]
pub struct ManifestSegmentDemuxer {
    resolution: Resolution,
    buffer: BytesMut,
    max_buffered: usize,
    expected_index: u64,
    expected_tail: String,
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

impl ManifestSegmentDemuxer {
    pub fn new(resolution: Resolution) -> Self {
        Self::with_limit(resolution, DEFAULT_MAX_BUFFERED)
    }

    pub fn with_limit(resolution: Resolution, max_buffered: usize) -> Self {
        Self {
            resolution,
            buffer: BytesMut::new(),
            max_buffered,
            expected_index: 0,
            expected_tail: Self::tail_for(resolution, 0),
        }
    }

    fn tail_for(resolution: Resolution, index: u64) -> String {
        format!("{}\n", segment_name(resolution, index))
    }

    /// Sequence index the next emitted segment will carry.
    pub fn expected_index(&self) -> u64 {
        self.expected_index
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Appends a stdout chunk; yields a segment when the chunk completes a validated boundary.
    ///
    /// Once the buffer outgrows its cap it is dropped and the stall is returned.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Option<DemuxedSegment>, DemuxStalled> {
        self.buffer.extend_from_slice(chunk);
        if self.buffer.ends_with(CANDIDATE_TAIL) {
            match self.split() {
                Ok(split) => return Ok(Some(self.emit(split))),
                Err(check) => trace!(
                    resolution = %self.resolution,
                    expected = self.expected_index,
                    buffered = self.buffer.len(),
                    ?check,
                    "candidate boundary rejected"
                ),
            }
        }

        if self.buffer.len() > self.max_buffered {
            let stalled = DemuxStalled {
                buffered: self.buffer.len(),
                expected_index: self.expected_index,
            };
            self.buffer = BytesMut::new();
            return Err(stalled);
        }
        Ok(None)
    }

    fn split(&self) -> Result<Split, BoundaryCheck> {
        let offset =
            find(&self.buffer, TAG_HEADER.as_bytes()).ok_or(BoundaryCheck::MissingMarkers)?;
        let text = &self.buffer[offset..];
        if find(text, TAG_MEDIA_SEQUENCE.as_bytes()).is_none() {
            return Err(BoundaryCheck::MissingMarkers);
        }

        let text = std::str::from_utf8(text).map_err(|_| BoundaryCheck::ValidationMismatch)?;
        let first_index = media_sequence(text).ok_or(BoundaryCheck::ValidationMismatch)?;
        let (manifest, next_index) =
            rewrite_segment_references(text, self.resolution, first_index);

        if !manifest.ends_with(&self.expected_tail) {
            return Err(BoundaryCheck::ValidationMismatch);
        }
        Ok(Split {
            offset,
            manifest,
            next_index,
        })
    }

    fn emit(&mut self, split: Split) -> DemuxedSegment {
        let segment = self.buffer.split_to(split.offset).freeze();
        self.buffer.clear();

        let sequence_index = self.expected_index;
        self.expected_index = split.next_index;
        self.expected_tail = Self::tail_for(self.resolution, self.expected_index);

        DemuxedSegment {
            sequence_index,
            manifest_name: manifest_name(self.resolution),
            segment_name: segment_name(self.resolution, sequence_index),
            manifest: Bytes::from(split.manifest),
            segment,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Manifest as the encoder writes it to the pipe, listing `count` segments from `first`.
    fn encoder_manifest(first: u64, count: u64) -> String {
        let mut text = format!(
            "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:6\n{}:{}\n",
            TAG_MEDIA_SEQUENCE, first
        );
        for i in first..first + count {
            text.push_str(&format!("#EXTINF:6.000000,\npipe:{}.ts\n", i));
        }
        text
    }

    fn payload(index: u64) -> Vec<u8> {
        let mut bytes = vec![0x47u8; 188];
        bytes[1] = index as u8;
        bytes
    }

    /// Stream of `n` segment+manifest pairs with a window of at most `window` entries.
    fn stream(n: u64, window: u64) -> Vec<Vec<u8>> {
        let mut chunks = Vec::new();
        for i in 0..n {
            let first = (i + 1).saturating_sub(window);
            chunks.push(payload(i));
            chunks.push(encoder_manifest(first, i + 1 - first).into_bytes());
        }
        chunks
    }

    fn run(chunks: &[Vec<u8>]) -> Vec<DemuxedSegment> {
        let mut demuxer = ManifestSegmentDemuxer::new(Resolution::P720);
        chunks
            .iter()
            .filter_map(|chunk| demuxer.push(chunk).unwrap())
            .collect()
    }

    #[test]
    fn emits_consecutive_indices_from_zero() {
        let emitted = run(&stream(30, 20));
        assert_eq!(emitted.len(), 30);
        for (i, segment) in emitted.iter().enumerate() {
            assert_eq!(segment.sequence_index, i as u64);
            assert_eq!(segment.segment_name, format!("segment-720p-{}.ts", i));
            assert_eq!(segment.manifest_name, "manifest-720p.m3u8");
            assert_eq!(segment.segment.as_ref(), payload(i as u64).as_slice());
        }
    }

    #[test]
    fn manifest_is_rewritten() {
        let emitted = run(&stream(3, 20));
        let manifest = std::str::from_utf8(&emitted[2].manifest).unwrap();
        assert!(manifest.starts_with("#EXTM3U\n"));
        assert!(manifest.contains("segment-720p-0.ts\n"));
        assert!(manifest.ends_with("segment-720p-2.ts\n"));
        assert!(!manifest.contains("pipe:"));
    }

    #[test]
    fn sliding_manifest_window_keeps_numbering() {
        let emitted = run(&stream(25, 5));
        let last = emitted.last().unwrap();
        assert_eq!(last.sequence_index, 24);
        let manifest = std::str::from_utf8(&last.manifest).unwrap();
        assert!(manifest.contains("segment-720p-20.ts\n"));
        assert!(!manifest.contains("segment-720p-19.ts"));
    }

    #[test]
    fn identical_streams_demux_identically() {
        let chunks = stream(12, 20);
        let key = |segments: Vec<DemuxedSegment>| {
            segments
                .into_iter()
                .map(|s| (s.manifest_name, s.segment_name, s.sequence_index))
                .collect::<Vec<_>>()
        };
        assert_eq!(key(run(&chunks)), key(run(&chunks)));
    }

    #[test]
    fn split_chunks_never_skip_indices() {
        let whole: Vec<u8> = stream(6, 20).concat();
        let mut demuxer = ManifestSegmentDemuxer::new(Resolution::P720);
        let emitted: Vec<_> = whole
            .chunks(7)
            .filter_map(|chunk| demuxer.push(chunk).unwrap())
            .collect();
        // a manifest ending exactly at a chunk edge is the only visible boundary
        assert!(emitted
            .iter()
            .enumerate()
            .all(|(i, s)| s.sequence_index == i as u64));
        assert_eq!(
            emitted.len() as u64,
            demuxer.expected_index(),
            "indices advance exactly once per emission"
        );
    }

    #[test]
    fn binary_false_positive_is_absorbed() {
        let mut demuxer = ManifestSegmentDemuxer::new(Resolution::P720);
        let mut tricky = payload(0);
        tricky.extend_from_slice(b"xx.ts\n");
        assert_eq!(demuxer.push(&tricky), Ok(None));
        assert_eq!(demuxer.expected_index(), 0);

        let mut more = payload(1);
        more.extend_from_slice(b"#EXT-X-MEDIA-SEQUENCE:9\nnot-really.ts\n");
        assert_eq!(demuxer.push(&more), Ok(None), "media sequence without a header");

        let emitted = demuxer
            .push(encoder_manifest(0, 1).as_bytes())
            .unwrap()
            .expect("true boundary");
        assert_eq!(emitted.sequence_index, 0);
        assert_eq!(emitted.segment.len(), tricky.len() + more.len());
        assert_eq!(demuxer.buffered_len(), 0);
    }

    #[test]
    fn mismatched_tail_is_not_emitted() {
        let mut demuxer = ManifestSegmentDemuxer::new(Resolution::P720);
        demuxer.push(&payload(0)).unwrap();
        // a manifest whose last entry would be index 1 while 0 is expected
        assert_eq!(demuxer.push(encoder_manifest(0, 2).as_bytes()), Ok(None));
        assert_eq!(demuxer.expected_index(), 0);
        assert!(demuxer.buffered_len() > 0);
    }

    #[test]
    fn glued_read_stalls_once_the_cap_is_exceeded() {
        let mut demuxer = ManifestSegmentDemuxer::with_limit(Resolution::P720, 4096);
        // the boundary after manifest 0 is hidden inside one read
        let glued = [payload(0), encoder_manifest(0, 1).into_bytes(), payload(1)].concat();
        assert_eq!(demuxer.push(&glued), Ok(None));

        let rest = std::iter::once(encoder_manifest(0, 2).into_bytes())
            .chain(stream(40, 20).into_iter().skip(4));
        let mut stall = None;
        for chunk in rest {
            match demuxer.push(&chunk) {
                Ok(emitted) => assert_eq!(emitted, None, "nothing validates after a missed boundary"),
                Err(stalled) => {
                    stall = Some(stalled);
                    break;
                }
            }
        }
        let stall = stall.expect("cap reached");
        assert!(stall.buffered > 4096);
        assert_eq!(stall.expected_index, 0);
        assert_eq!(demuxer.buffered_len(), 0);
    }

    #[test]
    fn buffer_below_the_cap_keeps_accumulating() {
        let mut demuxer = ManifestSegmentDemuxer::with_limit(Resolution::P720, 4096);
        assert_eq!(demuxer.push(&[0x47u8; 4096]), Ok(None));
        assert_eq!(demuxer.buffered_len(), 4096);
        assert!(demuxer.push(&[0x47u8]).is_err());
    }
}
