use crate::domain::jobs::Resolution;

/// Encoding targets for one step of the resolution ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rung {
    pub video_kbps: u32,
    pub audio_kbps: u32,
    pub framerate: u32,
    /// Keyframe interval in frames
    pub gop: u32,
}

const FRAMERATE: u32 = 30;

pub fn rung(resolution: Resolution) -> Rung {
    let (video_kbps, audio_kbps) = match resolution {
        Resolution::P2160 => (20000, 192),
        Resolution::P1440 => (12000, 192),
        Resolution::P1080 => (6000, 160),
        Resolution::P720 => (4000, 128),
        Resolution::P480 => (2000, 128),
        Resolution::P360 => (1200, 96),
        Resolution::P240 => (700, 64),
    };
    Rung {
        video_kbps,
        audio_kbps,
        framerate: FRAMERATE,
        gop: FRAMERATE * 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitrate_decreases_down_the_ladder() {
        let rates: Vec<u32> = Resolution::LADDER.iter().map(|r| rung(*r).video_kbps).collect();
        assert!(rates.windows(2).all(|pair| pair[0] > pair[1]));
    }

    #[test]
    fn gop_is_two_seconds() {
        let r = rung(Resolution::P720);
        assert_eq!(r.gop, r.framerate * 2);
    }
}
