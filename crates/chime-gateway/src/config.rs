use std::time::Duration;

use chime_types::models::MediaKind;
use rand::Rng;

use crate::registry::DEFAULT_CAPACITY;
use crate::window::AdmissionWindow;

/// Heartbeat interval: a Ping every 15 seconds, two missed Pongs drop the connection.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Bounded, randomized pause applied after a multimedia header is admitted
/// or refused, before its chunks are consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionDelay {
    pub min: Duration,
    pub max: Duration,
}

impl AdmissionDelay {
    pub const NONE: Self = Self {
        min: Duration::ZERO,
        max: Duration::ZERO,
    };

    pub fn fixed(delay: Duration) -> Self {
        Self {
            min: delay,
            max: delay,
        }
    }

    /// Pick a delay uniformly in `[min, max]`.
    pub fn sample(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        Duration::from_millis(rand::rng().random_range(min..=max))
    }
}

impl Default for AdmissionDelay {
    fn default() -> Self {
        Self {
            min: Duration::from_millis(1000),
            max: Duration::from_millis(2000),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub max_connections: usize,
    pub text_window: AdmissionWindow,
    pub voice_window: AdmissionWindow,
    pub video_window: AdmissionWindow,
    pub admission_delay: AdmissionDelay,
    pub heartbeat_interval: Duration,
}

impl GatewayConfig {
    pub fn media_window(&self, kind: MediaKind) -> AdmissionWindow {
        match kind {
            MediaKind::Voice => self.voice_window,
            MediaKind::Video => self.video_window,
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_CAPACITY,
            text_window: AdmissionWindow::TEXT,
            voice_window: AdmissionWindow::VOICE,
            video_window: AdmissionWindow::VIDEO,
            admission_delay: AdmissionDelay::default(),
            heartbeat_interval: HEARTBEAT_INTERVAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_stays_in_bounds() {
        let delay = AdmissionDelay::default();
        for _ in 0..100 {
            let d = delay.sample();
            assert!(d >= delay.min && d <= delay.max);
        }
        assert_eq!(AdmissionDelay::NONE.sample(), Duration::ZERO);
        assert_eq!(
            AdmissionDelay::fixed(Duration::from_millis(5)).sample(),
            Duration::from_millis(5)
        );
    }

    #[test]
    fn test_media_window_by_kind() {
        let config = GatewayConfig::default();
        assert_eq!(config.media_window(MediaKind::Voice), AdmissionWindow::VOICE);
        assert_eq!(config.media_window(MediaKind::Video), AdmissionWindow::VIDEO);
    }
}
