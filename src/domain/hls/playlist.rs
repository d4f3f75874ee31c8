//! Naming and text helpers for HLS media playlists.

use crate::domain::jobs::Resolution;

pub const SEGMENT_PREFIX: &str = "segment";
pub const MANIFEST_PREFIX: &str = "manifest";

pub const TAG_HEADER: &str = "#EXTM3U";
pub const TAG_MEDIA_SEQUENCE: &str = "#EXT-X-MEDIA-SEQUENCE";
const TAG_INF: &str = "#EXTINF:";

pub fn manifest_name(resolution: Resolution) -> String {
    format!("{}-{}.m3u8", MANIFEST_PREFIX, resolution)
}

pub fn segment_name(resolution: Resolution, index: u64) -> String {
    format!("{}-{}-{}.ts", SEGMENT_PREFIX, resolution, index)
}

/// Value of the `#EXT-X-MEDIA-SEQUENCE:N` line.
pub fn media_sequence(manifest: &str) -> Option<u64> {
    manifest
        .lines()
        .find_map(|line| line.trim().strip_prefix(TAG_MEDIA_SEQUENCE))
        .and_then(|rest| rest.strip_prefix(':'))
        .and_then(|value| value.trim().parse().ok())
}

fn is_segment_reference(line: &str) -> bool {
    !line.starts_with('#') && line.trim_end().ends_with(".ts")
}

/// Renames every segment reference to `segment-<res>-<k>.ts`, `k` counting up
/// from `first_index`. Returns the rewritten text and the index the next
/// reference would receive.
pub fn rewrite_segment_references(
    manifest: &str,
    resolution: Resolution,
    first_index: u64,
) -> (String, u64) {
    let mut next = first_index;
    let mut rewritten = String::with_capacity(manifest.len());

    for line in manifest.split_inclusive('\n') {
        let (body, newline) = match line.strip_suffix('\n') {
            Some(body) => (body, "\n"),
            None => (line, ""),
        };
        if is_segment_reference(body) {
            rewritten.push_str(&segment_name(resolution, next));
            rewritten.push_str(newline);
            next += 1;
        } else {
            rewritten.push_str(line);
        }
    }
    (rewritten, next)
}

/// Duration of the last `#EXTINF` entry, i.e. the newest segment.
pub fn last_segment_duration(manifest: &str) -> Option<f64> {
    manifest
        .lines()
        .rev()
        .find_map(|line| line.trim().strip_prefix(TAG_INF))
        .and_then(|rest| rest.split(',').next())
        .and_then(|value| value.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:6\n#EXT-X-MEDIA-SEQUENCE:3\n#EXTINF:6.006000,\npipe3.ts\n#EXTINF:5.500000,\npipe4.ts\n";

    #[test]
    fn names() {
        assert_eq!(manifest_name(Resolution::P720), "manifest-720p.m3u8");
        assert_eq!(segment_name(Resolution::P240, 17), "segment-240p-17.ts");
    }

    #[test]
    fn parses_media_sequence() {
        assert_eq!(media_sequence(MANIFEST), Some(3));
        assert_eq!(media_sequence("#EXTM3U\n"), None);
        assert_eq!(media_sequence("#EXT-X-MEDIA-SEQUENCE:abc\n"), None);
    }

    #[test]
    fn rewrites_references_in_order() {
        let (rewritten, next) = rewrite_segment_references(MANIFEST, Resolution::P1080, 3);
        assert!(rewritten.contains("#EXTINF:6.006000,\nsegment-1080p-3.ts\n"));
        assert!(rewritten.ends_with("#EXTINF:5.500000,\nsegment-1080p-4.ts\n"));
        assert!(!rewritten.contains("pipe"));
        assert_eq!(next, 5);
    }

    #[test]
    fn last_duration() {
        assert_eq!(last_segment_duration(MANIFEST), Some(5.5));
        assert_eq!(last_segment_duration("#EXTM3U\n"), None);
    }
}
