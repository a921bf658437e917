//! Host-side feedback sinks: a smoothed level meter and a logging status
//! sink. The device build would drive an RGB LED from the same traits.

use parking_lot::Mutex;
use tracing::{debug, info};

use fieldrec_foundation::{LevelSink, StatusIndicator, StatusSink};

const AVG_WEIGHT: f32 = 0.3;
const PEAK_WEIGHT: f32 = 0.9;
const DECAY: f32 = 0.8;
const FLOOR: f32 = 64.0;
const CEIL: f32 = 255.0;
const LEVEL_SCALE: f32 = 80.0;

/// Turns per-frame loudness into a brightness value in the 64..=255 range
/// a PWM channel would take. Rises instantly, falls with a short decay so
/// speech pauses do not make the indicator flicker.
pub struct LevelMeter {
    state: Mutex<LevelState>,
}

struct LevelState {
    intensity: f32,
    frames: u64,
}

impl LevelMeter {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LevelState {
                intensity: FLOOR,
                frames: 0,
            }),
        }
    }

    /// Current brightness, floor 64 (idle glow) to 255 (full scale).
    pub fn intensity(&self) -> u8 {
        self.state.lock().intensity as u8
    }
}

impl Default for LevelMeter {
    fn default() -> Self {
        Self::new()
    }
}

impl LevelSink for LevelMeter {
    fn report_level(&self, sum: u64, peak: i32, sample_count: usize) {
        if sample_count == 0 {
            return;
        }
        let average = (sum / sample_count as u64) as f32;
        let combined = average * AVG_WEIGHT + peak as f32 * PEAK_WEIGHT;
        let target = (FLOOR + combined / LEVEL_SCALE).clamp(FLOOR, CEIL);

        let mut state = self.state.lock();
        state.intensity = if target > state.intensity {
            target
        } else {
            state.intensity * DECAY + target * (1.0 - DECAY)
        };
        state.frames += 1;
        if state.frames % 16 == 0 {
            debug!(
                "Level: avg={:.0} peak={} intensity={:.0}",
                average, peak, state.intensity
            );
        }
    }
}

/// Narrates status changes to the log instead of an LED.
pub struct LogStatusSink;

impl StatusSink for LogStatusSink {
    fn set_status(&self, indicator: StatusIndicator) {
        info!("Status: {:?}", indicator);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loud_frame_raises_intensity_immediately() {
        let meter = LevelMeter::new();
        meter.report_level(20_000 * 1024, 30_000, 1024);
        assert_eq!(meter.intensity(), 255);
    }

    #[test]
    fn silence_decays_back_toward_the_floor() {
        let meter = LevelMeter::new();
        meter.report_level(20_000 * 1024, 30_000, 1024);
        assert_eq!(meter.intensity(), 255);

        for _ in 0..60 {
            meter.report_level(0, 0, 1024);
        }
        assert!(meter.intensity() <= 65, "got {}", meter.intensity());
    }

    #[test]
    fn quiet_audio_stays_near_the_floor() {
        let meter = LevelMeter::new();
        for _ in 0..10 {
            meter.report_level(50 * 1024, 120, 1024);
        }
        let level = meter.intensity();
        assert!((64..=70).contains(&level), "got {}", level);
    }

    #[test]
    fn empty_frame_is_ignored() {
        let meter = LevelMeter::new();
        meter.report_level(0, 0, 0);
        assert_eq!(meter.intensity(), 64);
    }
}
