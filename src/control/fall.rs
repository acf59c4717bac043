//! Fall detection from the pitch deviation

/// Deviation from pitch zero that counts as falling (degrees)
pub const FALL_ANGLE_DEG: f32 = 45.0;

/// Ticks the fall angle must be exceeded before the robot is declared fallen
pub const FALL_CONFIRM_TICKS: u16 = 50;

/// Deviation below which a fallen robot counts as standing again (degrees)
pub const UPRIGHT_ANGLE_DEG: f32 = 10.0;

/// Ticks inside the upright window before a fallen robot recovers
pub const UPRIGHT_CONFIRM_TICKS: u16 = 250;

/// Debounced upright/fallen estimator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub struct FallDetector {
    enabled: bool,
    fallen: bool,
    /// Consecutive ticks spent in the condition that would flip `fallen`
    duration_count: u16,
}

impl Default for FallDetector {
    fn default() -> Self {
        Self::new(true)
    }
}

impl FallDetector {
    pub const fn new(enabled: bool) -> Self {
        Self {
            enabled,
            fallen: false,
            duration_count: 0,
        }
    }

    pub fn is_fallen(&self) -> bool {
        self.fallen
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn duration_count(&self) -> u16 {
        self.duration_count
    }

    /// Disabling forces the upright state
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.fallen = false;
            self.duration_count = 0;
        }
    }

    /// Feeds one tick of pitch and returns whether the robot is fallen
    pub fn update(&mut self, pitch: f32, pitch_zero: f32) -> bool {
        if !self.enabled {
            return false;
        }

        let deviation = libm::fabsf(pitch - pitch_zero);
        if self.fallen {
            if deviation < UPRIGHT_ANGLE_DEG {
                self.duration_count = self.duration_count.saturating_add(1);
                if self.duration_count >= UPRIGHT_CONFIRM_TICKS {
                    self.fallen = false;
                    self.duration_count = 0;
                    info!("Upright again");
                }
            } else {
                self.duration_count = 0;
            }
        } else if deviation > FALL_ANGLE_DEG || deviation.is_nan() {
            self.duration_count = self.duration_count.saturating_add(1);
            if self.duration_count > FALL_CONFIRM_TICKS {
                self.fallen = true;
                self.duration_count = 0;
                warn!("Fall detected at pitch {}", pitch);
            }
        } else {
            self.duration_count = 0;
        }
        self.fallen
    }
}
