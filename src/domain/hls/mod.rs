//! HLS playlist handling and the live manifest/segment demuxer.

pub mod demuxer;
pub mod playlist;

pub use demuxer::{DemuxedSegment, ManifestSegmentDemuxer};
