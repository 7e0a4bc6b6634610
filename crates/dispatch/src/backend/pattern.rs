//! Built-in procedural backend
//!
//! Renders layered interference patterns as PNG. Colors derive from the prompt,
//! shapes from the seeded generator, detail from the step count and contrast
//! from the guidance scale. It lets the service run end to end on machines
//! without an inference runtime.

use std::f64::consts::TAU;
use std::io::Cursor;
use std::sync::Arc;

use image::{ImageFormat, Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::Rng;
use tracing::debug;

use super::{BackendError, BackendLoader, ComputeBackend, DeviceId, GenerationParams};

const VERSION: &str = concat!("pattern-", env!("CARGO_PKG_VERSION"));
const MAX_OCTAVES: u32 = 8;

/// Loader exposing a fixed number of virtual devices
#[derive(Debug, Clone)]
pub struct PatternLoader {
    devices: usize,
}

impl PatternLoader {
    pub fn new(devices: usize) -> Self {
        Self { devices }
    }
}

impl BackendLoader for PatternLoader {
    fn device_count(&self) -> usize {
        self.devices
    }

    fn load(&self, device: DeviceId) -> Result<Arc<dyn ComputeBackend>, BackendError> {
        if device.rank() as usize >= self.devices {
            return Err(BackendError::DeviceUnavailable {
                device,
                reason: format!("only {} virtual devices configured", self.devices),
            });
        }
        debug!(%device, version = VERSION, "Pattern backend loaded");
        Ok(Arc::new(PatternBackend::new(device)))
    }
}

/// Deterministic procedural image generator
#[derive(Debug, Clone)]
pub struct PatternBackend {
    device: DeviceId,
}

impl PatternBackend {
    pub fn new(device: DeviceId) -> Self {
        Self { device }
    }

    pub fn device(&self) -> DeviceId {
        self.device
    }

    fn render(
        &self,
        params: &GenerationParams,
        palette: u64,
        rng: &mut StdRng,
    ) -> Result<Vec<u8>, BackendError> {
        let base = [
            (palette as u8) ^ rng.gen::<u8>(),
            ((palette >> 8) as u8) ^ rng.gen::<u8>(),
            ((palette >> 16) as u8) ^ rng.gen::<u8>(),
        ];
        let freq_x: f64 = rng.gen_range(0.5..6.0);
        let freq_y: f64 = rng.gen_range(0.5..6.0);
        let phase: f64 = rng.gen_range(0.0..TAU);
        let contrast = 0.35 + (params.guidance / 40.0).clamp(0.0, 0.5);
        let octaves = params.steps.clamp(1, MAX_OCTAVES);

        let width = f64::from(params.width.max(1));
        let height = f64::from(params.height.max(1));

        let image = RgbImage::from_fn(params.width, params.height, |x, y| {
            let u = f64::from(x) / width;
            let v = f64::from(y) / height;

            let mut wave = 0.0;
            let mut amplitude = 1.0;
            let mut total = 0.0;
            for octave in 0..octaves {
                let scale = f64::from(1u32 << octave);
                wave += amplitude
                    * ((u * freq_x * scale + phase).sin() * (v * freq_y * scale - phase).cos());
                total += amplitude;
                amplitude *= 0.5;
            }
            let t = (wave / total) * 0.5 + 0.5;

            let shade = |channel: u8, shift: f64| {
                let value = f64::from(channel) * (1.0 - contrast)
                    + 255.0 * contrast * (t + shift).fract();
                value.clamp(0.0, 255.0) as u8
            };
            Rgb([shade(base[0], 0.0), shade(base[1], 0.33), shade(base[2], 0.66)])
        });

        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .map_err(|e| BackendError::Generation(format!("png encoding failed: {e}")))?;
        Ok(bytes)
    }
}

impl ComputeBackend for PatternBackend {
    fn version(&self) -> &str {
        VERSION
    }

    fn generate(
        &self,
        params: &GenerationParams,
        rng: &mut StdRng,
    ) -> Result<Vec<Vec<u8>>, BackendError> {
        if params.width == 0 || params.height == 0 {
            return Err(BackendError::Generation("empty canvas".into()));
        }
        let palette = fnv1a(params.prompt.as_bytes());
        (0..params.batch_size)
            .map(|_| self.render(params, palette, rng))
            .collect()
    }
}

/// Stable 64-bit FNV-1a, independent of the std hasher's seed
fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |hash, byte| (hash ^ u64::from(*byte)).wrapping_mul(PRIME))
}
