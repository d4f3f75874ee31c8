use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::domain::encoding::args::{duration_probe_args, encoder_listing_args, encoder_trial_args};
use crate::domain::encoding::{HardwareProfile, HardwareSelection};
use crate::error::{EngineError, EngineResult};
use crate::ports::process::{CapturedOutput, ProcessLauncher, StdinMode};

/// Binaries and the encoder profile every invocation is built for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    pub encoder: String,
    pub prober: String,
    pub hardware: HardwareProfile,
}

/// Short-lived prober/encoder invocations whose output is parsed whole.
#[derive(Clone)]
pub struct MediaProbe {
    launcher: Arc<dyn ProcessLauncher>,
}

impl MediaProbe {
    pub fn new(launcher: Arc<dyn ProcessLauncher>) -> Self {
        Self { launcher }
    }

    async fn run(&self, program: &str, args: &[String]) -> EngineResult<CapturedOutput> {
        Ok(self
            .launcher
            .launch(program, args, StdinMode::Null)?
            .wait_output()
            .await)
    }

    pub async fn duration_seconds(&self, prober: &str, source: &Path) -> EngineResult<f64> {
        let output = self.run(prober, &duration_probe_args(source)).await?;
        if !output.success() {
            return Err(EngineError::Probe(format!(
                "{} exited with {:?}: {}",
                prober,
                output.code,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        let text = String::from_utf8_lossy(&output.stdout);
        text.trim()
            .parse::<f64>()
            .ok()
            .filter(|seconds| seconds.is_finite() && *seconds >= 0.0)
            .ok_or_else(|| EngineError::Probe(format!("unparsable duration {:?}", text.trim())))
    }

    /// Resolves `auto`: every accelerated H.264 encoder the build ships is
    /// tried with a short synthetic encode, the first that works wins. Never fails.
    pub async fn hardware(&self, encoder: &str, selection: HardwareSelection) -> HardwareProfile {
        let HardwareSelection::Fixed(profile) = selection else {
            return self.detect(encoder).await;
        };
        profile
    }

    async fn detect(&self, encoder: &str) -> HardwareProfile {
        let listing = match self.run(encoder, &encoder_listing_args()).await {
            Ok(output) if output.success() => output,
            Ok(output) => {
                warn!(encoder, code = ?output.code, "hardware detection failed, using cpu");
                return HardwareProfile::Cpu;
            }
            Err(e) => {
                warn!(encoder, error = %e, "hardware detection failed, using cpu");
                return HardwareProfile::Cpu;
            }
        };

        let candidates = HardwareProfile::listed_accelerators(&String::from_utf8_lossy(&listing.stdout));
        for profile in candidates {
            match self.run(encoder, &encoder_trial_args(profile)).await {
                Ok(trial) if trial.success() => {
                    info!(encoder, %profile, "hardware profile detected");
                    return profile;
                }
                Ok(trial) => debug!(
                    encoder,
                    %profile,
                    code = ?trial.code,
                    stderr = %String::from_utf8_lossy(&trial.stderr).trim(),
                    "hardware encoder listed but unusable"
                ),
                Err(e) => debug!(encoder, %profile, error = %e, "hardware trial failed"),
            }
        }
        info!(encoder, "no usable hardware encoder, using cpu");
        HardwareProfile::Cpu
    }

    pub async fn toolchain(
        &self,
        encoder: &str,
        prober: &str,
        selection: HardwareSelection,
    ) -> Toolchain {
        Toolchain {
            encoder: encoder.to_string(),
            prober: prober.to_string(),
            hardware: self.hardware(encoder, selection).await,
        }
    }
}
