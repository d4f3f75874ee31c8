use std::fmt;
use std::str::FromStr;

/// Video acceleration family the H.264 encoder is picked from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareProfile {
    Cpu,
    Nvidia,
    Intel,
    Amd,
    Apple,
}

impl HardwareProfile {
    /// Hardware families in detection order.
    const ACCELERATED: [HardwareProfile; 4] = [
        HardwareProfile::Nvidia,
        HardwareProfile::Intel,
        HardwareProfile::Amd,
        HardwareProfile::Apple,
    ];

    pub fn h264_encoder(&self) -> &'static str {
        match self {
            HardwareProfile::Cpu => "libx264",
            HardwareProfile::Nvidia => "h264_nvenc",
            HardwareProfile::Intel => "h264_qsv",
            HardwareProfile::Amd => "h264_amf",
            HardwareProfile::Apple => "h264_videotoolbox",
        }
    }

    /// Accelerated encoders named in `-encoders` output, in detection order.
    ///
    /// A listed encoder is only compiled in; the device may still be missing.
    pub fn listed_accelerators(listing: &str) -> Vec<HardwareProfile> {
        HardwareProfile::ACCELERATED
            .into_iter()
            .filter(|profile| {
                listing
                    .split_whitespace()
                    .any(|word| word == profile.h264_encoder())
            })
            .collect()
    }
}

impl fmt::Display for HardwareProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HardwareProfile::Cpu => "cpu",
            HardwareProfile::Nvidia => "nvidia",
            HardwareProfile::Intel => "intel",
            HardwareProfile::Amd => "amd",
            HardwareProfile::Apple => "apple",
        };
        f.write_str(name)
    }
}

/// Configured choice: probe the encoder, or force a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareSelection {
    Auto,
    Fixed(HardwareProfile),
}

impl FromStr for HardwareSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let profile = match s.trim().to_ascii_lowercase().as_str() {
            "auto" => return Ok(HardwareSelection::Auto),
            "cpu" => HardwareProfile::Cpu,
            "nvidia" => HardwareProfile::Nvidia,
            "intel" => HardwareProfile::Intel,
            "amd" => HardwareProfile::Amd,
            "apple" => HardwareProfile::Apple,
            other => return Err(format!("unknown hardware profile: {}", other)),
        };
        Ok(HardwareSelection::Fixed(profile))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "Encoders:\n V....D libx264              libx264 H.264\n V....D h264_qsv             H.264 (Intel Quick Sync Video)\n V....D h264_nvenc           NVIDIA NVENC H.264 encoder\n";

    #[test]
    fn listed_candidates_in_detection_order() {
        assert_eq!(
            HardwareProfile::listed_accelerators(LISTING),
            vec![HardwareProfile::Nvidia, HardwareProfile::Intel]
        );
    }

    #[test]
    fn software_only_build_lists_nothing() {
        let listing = " V....D libx264   libx264 H.264\n";
        assert!(HardwareProfile::listed_accelerators(listing).is_empty());
    }

    #[test]
    fn parse_selection() {
        assert_eq!("AUTO".parse(), Ok(HardwareSelection::Auto));
        assert_eq!("intel".parse(), Ok(HardwareSelection::Fixed(HardwareProfile::Intel)));
        assert!("tpu".parse::<HardwareSelection>().is_err());
    }
}
