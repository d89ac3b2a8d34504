//! Size-targeted adaptive compression.
//!
//! Without a budget the image is encoded once at the baseline quality. With a
//! budget the compressor walks quality down in fixed steps, then shrinks the
//! raster geometrically and walks quality down again, until the encoding fits
//! or the attempt caps in [`SearchConfig`] run out. An unreachable budget is
//! not an error: the smallest encoding seen is returned, flagged
//! [`BudgetOutcome::Unreachable`].

use image::imageops::FilterType;
use image::{DynamicImage, Rgb};
use log::{debug, info, warn};

use crate::codec::{
    clamp_quality, CodecAdapter, CodecRegistry, DecodedImage, Encode, OutputCodec, WHITE,
};
use crate::error::{CompressError, Result};
use crate::size::Budget;

/// Tunables of the bounded search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchConfig {
    /// Quality points removed per descent step.
    pub quality_step: u8,
    /// Lowest quality ever attempted during a descent.
    pub quality_floor: u8,
    /// Encode attempts allowed per quality descent.
    pub max_quality_attempts: u32,
    /// Per-step dimension multiplier of the resolution descent.
    pub shrink_ratio: f32,
    pub max_downscale_steps: u32,
    /// Starting quality of each descent after a downscale, capped by the
    /// request's baseline.
    pub rescale_start_quality: u8,
    /// Colour transparency is composed over for opaque codecs.
    pub background: Rgb<u8>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            quality_step: 10,
            quality_floor: 10,
            max_quality_attempts: 10,
            shrink_ratio: 0.9,
            max_downscale_steps: 8,
            rescale_start_quality: 75,
            background: WHITE,
        }
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.quality_step == 0 {
            return Err(CompressError::InvalidConfig("quality step must be positive".into()));
        }
        if !(1..=100).contains(&self.quality_floor) {
            return Err(CompressError::InvalidConfig(format!(
                "quality floor {} outside 1-100",
                self.quality_floor
            )));
        }
        if self.max_quality_attempts == 0 {
            return Err(CompressError::InvalidConfig(
                "at least one attempt per descent is required".into(),
            ));
        }
        if !(self.shrink_ratio > 0.0 && self.shrink_ratio < 1.0) {
            return Err(CompressError::InvalidConfig(format!(
                "shrink ratio {} outside (0, 1)",
                self.shrink_ratio
            )));
        }
        Ok(())
    }

    /// Upper bound on encode attempts for a budgeted request.
    pub fn max_total_attempts(&self) -> u32 {
        self.max_quality_attempts
            .saturating_mul(self.max_downscale_steps.saturating_add(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionRequest {
    pub codec: OutputCodec,
    /// Baseline quality, 1-100. Out-of-range values are clamped.
    pub quality: u8,
    /// Maximum output size in bytes.
    pub budget: Option<u64>,
}

impl CompressionRequest {
    pub fn new(codec: OutputCodec, quality: u8) -> Self {
        Self {
            codec,
            quality,
            budget: None,
        }
    }

    pub fn with_budget_bytes(mut self, bytes: u64) -> Self {
        self.budget = Some(bytes);
        self
    }

    pub fn with_budget(self, budget: Budget) -> Result<Self> {
        Ok(self.with_budget_bytes(budget.to_bytes()?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetOutcome {
    NoBudget,
    Met,
    /// The caps ran out; the result is the smallest encoding found.
    Unreachable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompressionResult {
    pub bytes: Vec<u8>,
    pub quality: u8,
    /// Dimension multiplier applied to the input, 1.0 when not resized.
    pub scale: f32,
    pub byte_count: usize,
    pub width: u32,
    pub height: u32,
    /// Encode attempts made by the search.
    pub attempts: u32,
    pub outcome: BudgetOutcome,
}

impl CompressionResult {
    pub fn budget_met(&self) -> bool {
        self.outcome != BudgetOutcome::Unreachable
    }

    pub fn was_resized(&self) -> bool {
        self.scale < 1.0
    }
}

/// One encoding produced during the search.
struct Candidate {
    bytes: Vec<u8>,
    quality: u8,
    scale: f32,
    width: u32,
    height: u32,
}

impl Candidate {
    fn into_result(self, attempts: u32, outcome: BudgetOutcome) -> CompressionResult {
        CompressionResult {
            byte_count: self.bytes.len(),
            bytes: self.bytes,
            quality: self.quality,
            scale: self.scale,
            width: self.width,
            height: self.height,
            attempts,
            outcome,
        }
    }
}

/// Mutable state of one budgeted search. Lives only for a single request.
struct Search<'a, E: Encode> {
    encoder: &'a E,
    codec: OutputCodec,
    budget: u64,
    config: &'a SearchConfig,
    attempts: u32,
    best: Option<Candidate>,
}

impl<E: Encode> Search<'_, E> {
    fn attempt(&mut self, image: &DynamicImage, quality: u8, scale: f32) -> Result<bool> {
        let bytes = self.encoder.encode(image, self.codec, quality)?;
        self.attempts += 1;
        debug!(
            "attempt {}: {} q={} scale={:.3} {}x{} -> {} bytes",
            self.attempts,
            self.codec,
            quality,
            scale,
            image.width(),
            image.height(),
            bytes.len()
        );

        let fits = bytes.len() as u64 <= self.budget;
        let smaller = self
            .best
            .as_ref()
            .map_or(true, |best| bytes.len() < best.bytes.len());
        if fits || smaller {
            self.best = Some(Candidate {
                bytes,
                quality,
                scale,
                width: image.width(),
                height: image.height(),
            });
        }
        Ok(fits)
    }

    /// Quality descent on one raster. Returns true once the budget is met.
    fn descend(&mut self, image: &DynamicImage, start: u8, scale: f32) -> Result<bool> {
        let mut quality = start;
        let mut tries = 0;
        loop {
            if self.attempt(image, quality, scale)? {
                return Ok(true);
            }
            tries += 1;
            if !self.codec.has_quality_axis() || tries >= self.config.max_quality_attempts {
                return Ok(false);
            }
            match next_quality(quality, self.config) {
                Some(next) => quality = next,
                None => return Ok(false),
            }
        }
    }
}

/// The next quality of a descent, or `None` at the floor.
fn next_quality(current: u8, config: &SearchConfig) -> Option<u8> {
    if current <= config.quality_floor {
        return None;
    }
    Some(
        current
            .saturating_sub(config.quality_step)
            .max(config.quality_floor),
    )
}

fn scaled_dimensions(width: u32, height: u32, scale: f32) -> (u32, u32) {
    let w = ((width as f32 * scale).round() as u32).max(1);
    let h = ((height as f32 * scale).round() as u32).max(1);
    (w, h)
}

/// Runs size-targeted searches with a given encoder.
pub struct Compressor<E: Encode = CodecAdapter> {
    encoder: E,
    config: SearchConfig,
}

impl Default for Compressor<CodecAdapter> {
    fn default() -> Self {
        Self::new(SearchConfig::default())
    }
}

impl Compressor<CodecAdapter> {
    pub fn new(config: SearchConfig) -> Self {
        Self {
            encoder: CodecAdapter::with_background(config.background),
            config,
        }
    }
}

impl<E: Encode> Compressor<E> {
    pub fn with_encoder(encoder: E, config: SearchConfig) -> Self {
        Self { encoder, config }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn encoder(&self) -> &E {
        &self.encoder
    }

    pub fn compress(
        &self,
        image: &DecodedImage,
        request: &CompressionRequest,
    ) -> Result<CompressionResult> {
        self.config.validate()?;
        let baseline = clamp_quality(request.quality);
        let source = &image.image;

        let Some(budget) = request.budget else {
            let bytes = self.encoder.encode(source, request.codec, baseline)?;
            let candidate = Candidate {
                bytes,
                quality: baseline,
                scale: 1.0,
                width: source.width(),
                height: source.height(),
            };
            return Ok(candidate.into_result(1, BudgetOutcome::NoBudget));
        };
        if budget == 0 {
            return Err(CompressError::InvalidBudget("budget must be positive".into()));
        }

        let mut search = Search {
            encoder: &self.encoder,
            codec: request.codec,
            budget,
            config: &self.config,
            attempts: 0,
            best: None,
        };

        // Descents never start below the floor; lossless codecs ignore quality.
        let floor = self.config.quality_floor;
        let (start_quality, rescale_quality) = if request.codec.has_quality_axis() {
            let rescale = baseline.min(clamp_quality(self.config.rescale_start_quality));
            (baseline.max(floor), rescale.max(floor))
        } else {
            (baseline, baseline)
        };
        let mut met = search.descend(source, start_quality, 1.0)?;

        let mut last_dims = (source.width(), source.height());
        let mut step = 1;
        while !met && step <= self.config.max_downscale_steps {
            let scale = self.config.shrink_ratio.powi(step as i32);
            let (w, h) = scaled_dimensions(source.width(), source.height(), scale);
            if (w, h) == last_dims {
                debug!("raster cannot shrink below {}x{}", w, h);
                break;
            }
            last_dims = (w, h);
            let resized = source.resize_exact(w, h, FilterType::Lanczos3);
            met = search.descend(&resized, rescale_quality, scale)?;
            step += 1;
        }

        let attempts = search.attempts;
        let best = search
            .best
            .ok_or_else(|| CompressError::InvalidConfig("search made no attempts".into()))?;
        let outcome = if met {
            BudgetOutcome::Met
        } else {
            warn!(
                "budget of {} bytes unreachable for {}; best effort is {} bytes",
                budget,
                request.codec,
                best.bytes.len()
            );
            BudgetOutcome::Unreachable
        };
        info!(
            "{} search finished after {} attempts: q={} scale={:.3} {} bytes",
            request.codec,
            attempts,
            best.quality,
            best.scale,
            best.bytes.len()
        );
        Ok(best.into_result(attempts, outcome))
    }
}

/// Decode `input` and run a search with the default configuration.
pub fn compress(
    input: &[u8],
    codec: OutputCodec,
    quality: u8,
    budget: Option<Budget>,
) -> Result<CompressionResult> {
    let mut request = CompressionRequest::new(codec, quality);
    if let Some(budget) = budget {
        request = request.with_budget(budget)?;
    }
    let image = CodecRegistry::default().decode(input)?;
    Compressor::<CodecAdapter>::default().compress(&image, &request)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    /// Encoder whose output size is `width * height * quality / divisor`,
    /// recording every call.
    pub(crate) struct FakeEncoder {
        divisor: u64,
        fail_on_call: Option<usize>,
        calls: Mutex<Vec<(u8, u32, u32)>>,
    }

    impl FakeEncoder {
        pub(crate) fn new(divisor: u64) -> Self {
            Self {
                divisor,
                fail_on_call: None,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn failing_on(mut self, call: usize) -> Self {
            self.fail_on_call = Some(call);
            self
        }

        pub(crate) fn calls(&self) -> Vec<(u8, u32, u32)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Encode for FakeEncoder {
        fn encode(&self, image: &DynamicImage, codec: OutputCodec, quality: u8) -> Result<Vec<u8>> {
            let mut calls = self.calls.lock().unwrap();
            calls.push((quality, image.width(), image.height()));
            if self.fail_on_call == Some(calls.len()) {
                return Err(CompressError::EncodeFailure {
                    codec,
                    quality,
                    reason: "injected".into(),
                });
            }
            let pixels = image.width() as u64 * image.height() as u64;
            let len = if codec.has_quality_axis() {
                pixels * quality as u64 / self.divisor
            } else {
                pixels / self.divisor
            };
            let len = len.max(1);
            Ok(vec![0u8; len as usize])
        }
    }

    fn raster(w: u32, h: u32) -> DecodedImage {
        DecodedImage::from_image(DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([9, 9, 9]))))
    }

    fn compressor(divisor: u64) -> Compressor<FakeEncoder> {
        Compressor::with_encoder(FakeEncoder::new(divisor), SearchConfig::default())
    }

    #[test]
    fn test_no_budget_single_attempt() {
        let c = compressor(100);
        let result = c
            .compress(&raster(100, 100), &CompressionRequest::new(OutputCodec::Jpeg, 85))
            .unwrap();

        assert_eq!(result.quality, 85);
        assert_eq!(result.attempts, 1);
        assert_eq!(result.scale, 1.0);
        assert_eq!(result.outcome, BudgetOutcome::NoBudget);
        assert_eq!(result.byte_count, 8500);
        assert_eq!(c.encoder().calls().len(), 1);
    }

    #[test]
    fn test_no_budget_quality_clamped() {
        let c = compressor(100);
        let low = c
            .compress(&raster(10, 10), &CompressionRequest::new(OutputCodec::Jpeg, 0))
            .unwrap();
        let high = c
            .compress(&raster(10, 10), &CompressionRequest::new(OutputCodec::Jpeg, 200))
            .unwrap();
        assert_eq!(low.quality, 1);
        assert_eq!(high.quality, 100);
    }

    #[test]
    fn test_baseline_within_budget_stops_immediately() {
        let c = compressor(100);
        let request = CompressionRequest::new(OutputCodec::Jpeg, 85).with_budget_bytes(8500);
        let result = c.compress(&raster(100, 100), &request).unwrap();

        assert_eq!(result.quality, 85);
        assert_eq!(result.attempts, 1);
        assert_eq!(result.outcome, BudgetOutcome::Met);
    }

    #[test]
    fn test_quality_descent_sequence() {
        let c = compressor(100);
        // 100x100 at q -> 100 * q bytes; 25 is the first tried that fits 3000.
        let request = CompressionRequest::new(OutputCodec::Jpeg, 85).with_budget_bytes(3000);
        let result = c.compress(&raster(100, 100), &request).unwrap();

        let qualities: Vec<u8> = c.encoder().calls().iter().map(|c| c.0).collect();
        assert_eq!(qualities, vec![85, 75, 65, 55, 45, 35, 25]);
        assert_eq!(result.quality, 25);
        assert_eq!(result.scale, 1.0);
        assert_eq!(result.outcome, BudgetOutcome::Met);
        assert!(result.byte_count <= 3000);
    }

    #[test]
    fn test_floor_is_tried_but_never_crossed() {
        let c = compressor(1);
        let request = CompressionRequest::new(OutputCodec::Jpeg, 85).with_budget_bytes(1);
        c.compress(&raster(40, 40), &request).unwrap();

        let calls = c.encoder().calls();
        let first_level: Vec<u8> = calls
            .iter()
            .take_while(|(_, w, _)| *w == 40)
            .map(|c| c.0)
            .collect();
        assert_eq!(first_level, vec![85, 75, 65, 55, 45, 35, 25, 15, 10]);
        assert!(calls.iter().all(|(q, _, _)| *q >= 10));
    }

    #[test]
    fn test_baseline_below_floor_starts_at_floor() {
        let c = compressor(1);
        let request = CompressionRequest::new(OutputCodec::Jpeg, 5).with_budget_bytes(1);
        let result = c.compress(&raster(20, 20), &request).unwrap();

        let calls = c.encoder().calls();
        assert!(calls.iter().all(|(q, _, _)| *q == 10));
        // One attempt per resolution level: the floor leaves nothing to descend.
        assert_eq!(calls.iter().filter(|(_, w, _)| *w == 20).count(), 1);
        assert_eq!(result.quality, 10);
        assert_eq!(result.outcome, BudgetOutcome::Unreachable);
    }

    #[test]
    fn test_no_budget_below_floor_keeps_baseline() {
        let c = compressor(1);
        let result = c
            .compress(&raster(20, 20), &CompressionRequest::new(OutputCodec::Jpeg, 5))
            .unwrap();
        assert_eq!(result.quality, 5);
    }

    #[test]
    fn test_max_total_attempts_saturates() {
        let config = SearchConfig {
            max_quality_attempts: 100_000,
            max_downscale_steps: u32::MAX,
            ..SearchConfig::default()
        };
        assert_eq!(config.max_total_attempts(), u32::MAX);
        assert_eq!(SearchConfig::default().max_total_attempts(), 90);
    }

    #[test]
    fn test_downscale_when_quality_alone_fails() {
        let c = compressor(100);
        // At the floor 100x100 gives 1000 bytes; needs a smaller raster.
        let request = CompressionRequest::new(OutputCodec::Jpeg, 85).with_budget_bytes(700);
        let result = c.compress(&raster(100, 100), &request).unwrap();

        assert_eq!(result.outcome, BudgetOutcome::Met);
        assert!(result.byte_count <= 700);
        assert!(result.was_resized());
        assert!(result.width < 100 && result.height < 100);
        // The descent after a downscale restarts at the capped rescale quality.
        let calls = c.encoder().calls();
        let restart = calls.iter().find(|(_, w, _)| *w == 90).unwrap();
        assert_eq!(restart.0, 75);
    }

    #[test]
    fn test_unreachable_returns_smallest() {
        let c = compressor(1);
        let request = CompressionRequest::new(OutputCodec::Jpeg, 85).with_budget_bytes(1);
        let result = c.compress(&raster(200, 150), &request).unwrap();

        let config = SearchConfig::default();
        let calls = c.encoder().calls();
        let smallest = calls
            .iter()
            .map(|(q, w, h)| *w as usize * *h as usize * *q as usize)
            .min()
            .unwrap();

        assert_eq!(result.outcome, BudgetOutcome::Unreachable);
        assert!(!result.budget_met());
        assert_eq!(result.byte_count, smallest);
        assert_eq!(result.attempts as usize, calls.len());
        assert!(result.attempts <= config.max_total_attempts());
        assert_eq!(result.quality, 10);
    }

    #[test]
    fn test_attempts_bounded_for_any_size() {
        for (w, h) in [(1, 1), (3, 2), (64, 48), (4000, 10)] {
            let c = compressor(1);
            let request = CompressionRequest::new(OutputCodec::WebP, 100).with_budget_bytes(1);
            let result = c.compress(&raster(w, h), &request).unwrap();
            assert!(result.attempts <= SearchConfig::default().max_total_attempts());
            assert_eq!(result.byte_count, result.bytes.len());
        }
    }

    #[test]
    fn test_lossless_codec_only_shrinks() {
        let c = compressor(1);
        let request = CompressionRequest::new(OutputCodec::Png, 85).with_budget_bytes(5000);
        let result = c.compress(&raster(100, 100), &request).unwrap();

        let calls = c.encoder().calls();
        let widths: Vec<u32> = calls.iter().map(|c| c.1).collect();
        // One attempt per resolution level: 100, 90, 81, 73 (5329), 66 (4356).
        assert_eq!(widths, vec![100, 90, 81, 73, 66]);
        assert_eq!(result.outcome, BudgetOutcome::Met);
        assert_eq!(result.quality, 85);
    }

    #[test]
    fn test_encode_failure_aborts_request() {
        let c = Compressor::with_encoder(FakeEncoder::new(1).failing_on(3), SearchConfig::default());
        let request = CompressionRequest::new(OutputCodec::Jpeg, 85).with_budget_bytes(1);
        let err = c.compress(&raster(50, 50), &request).unwrap_err();
        assert!(matches!(err, CompressError::EncodeFailure { quality: 65, .. }));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = SearchConfig {
            shrink_ratio: 1.0,
            ..SearchConfig::default()
        };
        let c = Compressor::with_encoder(FakeEncoder::new(1), config);
        let err = c
            .compress(&raster(5, 5), &CompressionRequest::new(OutputCodec::Jpeg, 80))
            .unwrap_err();
        assert!(matches!(err, CompressError::InvalidConfig(_)));
    }

    #[test]
    fn test_tiny_raster_stops_shrinking() {
        let c = compressor(1);
        let request = CompressionRequest::new(OutputCodec::Bmp, 80).with_budget_bytes(1);
        let result = c.compress(&raster(1, 1), &request).unwrap();
        assert_eq!(result.attempts, 1);
        assert_eq!(result.outcome, BudgetOutcome::Met);
    }
}
