//! Tunable parameters
//!
//! The UI can retune P/I/D of every loop and move the pitch zero. Both are
//! persisted together as one flash record:
//!
//! ```text
//! 0..12   angle    P, I, D   f32 LE
//! 12..24  speed    P, I, D
//! 24..36  position P, I, D
//! 36..48  yaw      P, I, D
//! 48..52  pitch zero (degrees)
//! ```
//!
//! Integral and output limits are not tunable and always come from
//! [`GainTable::DEFAULT`].

use crate::control::pid::PidGains;

/// Pitch zero used when nothing is stored (degrees)
///
/// Balance point of the reference chassis, which sits slightly nose down.
pub const DEFAULT_PITCH_ZERO: f32 = -2.1;

/// Pitch zero may never leave `[-limit, limit]` (degrees)
pub const PITCH_ZERO_LIMIT_DEG: f32 = 5.0;

/// Gains and limits of all four loops
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub struct GainTable {
    /// Pitch error (deg) to duty
    pub angle: PidGains,
    /// Wheel speed error (deg/s) to pitch target offset (deg)
    pub speed: PidGains,
    /// Wheel position error (deg) to pitch target offset (deg)
    pub position: PidGains,
    /// Yaw rate error (deg/s) to differential duty
    pub yaw: PidGains,
}

impl GainTable {
    pub const DEFAULT: Self = Self {
        angle: PidGains::new(0.6, 10.0, 0.016, 0.1, 1.0),
        speed: PidGains::new(0.003, 0.0, 0.0, 1000.0, PITCH_ZERO_LIMIT_DEG),
        position: PidGains::new(0.0, 0.0, 0.0, 1000.0, PITCH_ZERO_LIMIT_DEG),
        yaw: PidGains::new(0.025, 0.0, 0.0, 100.0, 0.3),
    };

    /// Default limits with the given P/I/D
    pub fn with_tuning(tuning: &PidTuning) -> Self {
        let d = Self::DEFAULT;
        let t = tuning;
        Self {
            angle: d.angle.with_pid(t.angle.p, t.angle.i, t.angle.d),
            speed: d.speed.with_pid(t.speed.p, t.speed.i, t.speed.d),
            position: d.position.with_pid(t.position.p, t.position.i, t.position.d),
            yaw: d.yaw.with_pid(t.yaw.p, t.yaw.i, t.yaw.d),
        }
    }
}

impl Default for GainTable {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// The tunable part of one loop
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub struct PidTerms {
    pub p: f32,
    pub i: f32,
    pub d: f32,
}

impl From<PidGains> for PidTerms {
    fn from(gains: PidGains) -> Self {
        Self {
            p: gains.p,
            i: gains.i,
            d: gains.d,
        }
    }
}

/// P/I/D of all loops, in wire and storage order angle, speed, position, yaw
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub struct PidTuning {
    pub angle: PidTerms,
    pub speed: PidTerms,
    pub position: PidTerms,
    pub yaw: PidTerms,
}

impl PidTuning {
    /// Encoded size, twelve `f32`
    pub const LEN: usize = 48;

    pub fn from_gains(gains: &GainTable) -> Self {
        Self {
            angle: gains.angle.into(),
            speed: gains.speed.into(),
            position: gains.position.into(),
            yaw: gains.yaw.into(),
        }
    }

    fn terms(&self) -> [PidTerms; 4] {
        [self.angle, self.speed, self.position, self.yaw]
    }

    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let mut buf = [0u8; Self::LEN];
        let values = self.terms().into_iter().flat_map(|t| [t.p, t.i, t.d]);
        for (chunk, value) in buf.chunks_exact_mut(4).zip(values) {
            chunk.copy_from_slice(&value.to_le_bytes());
        }
        buf
    }

    /// Decodes twelve floats; rejects short input and non-finite values
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let bytes = bytes.get(..Self::LEN)?;
        let mut values = [0f32; 12];
        for (value, chunk) in values.iter_mut().zip(bytes.chunks_exact(4)) {
            *value = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            if !value.is_finite() {
                return None;
            }
        }
        let terms = |n: usize| PidTerms {
            p: values[n * 3],
            i: values[n * 3 + 1],
            d: values[n * 3 + 2],
        };
        Some(Self {
            angle: terms(0),
            speed: terms(1),
            position: terms(2),
            yaw: terms(3),
        })
    }
}

/// Persisted parameter record
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub struct ParamSet {
    pub tuning: PidTuning,
    /// Degrees
    pub pitch_zero: f32,
}

impl Default for ParamSet {
    fn default() -> Self {
        Self {
            tuning: PidTuning::from_gains(&GainTable::DEFAULT),
            pitch_zero: DEFAULT_PITCH_ZERO,
        }
    }
}

impl ParamSet {
    pub const STORED_LEN: usize = PidTuning::LEN + 4;

    pub fn gain_table(&self) -> GainTable {
        GainTable::with_tuning(&self.tuning)
    }

    pub fn to_bytes(&self) -> [u8; Self::STORED_LEN] {
        let mut buf = [0u8; Self::STORED_LEN];
        buf[..PidTuning::LEN].copy_from_slice(&self.tuning.to_bytes());
        buf[PidTuning::LEN..].copy_from_slice(&self.pitch_zero.to_le_bytes());
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::STORED_LEN {
            return None;
        }
        let tuning = PidTuning::from_bytes(bytes)?;
        let p = &bytes[PidTuning::LEN..];
        let pitch_zero = f32::from_le_bytes([p[0], p[1], p[2], p[3]]);
        if !pitch_zero.is_finite() {
            return None;
        }
        Some(Self { tuning, pitch_zero })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_carry_the_reference_tuning() {
        let params = ParamSet::default();
        assert_eq!(params.tuning.angle, PidTerms { p: 0.6, i: 10.0, d: 0.016 });
        assert_eq!(params.tuning.speed.p, 0.003);
        assert_eq!(params.tuning.position, PidTerms::default());
        assert_eq!(params.tuning.yaw.p, 0.025);
        assert_eq!(params.gain_table(), GainTable::DEFAULT);
        assert_eq!(params.pitch_zero, -2.1);
        assert!(params.pitch_zero.abs() <= PITCH_ZERO_LIMIT_DEG);
    }

    #[test]
    fn record_layout_is_angle_first_pitch_zero_last() {
        let mut params = ParamSet::default();
        params.pitch_zero = -2.5;
        let bytes = params.to_bytes();
        assert_eq!(bytes.len(), 52);
        assert_eq!(&bytes[0..4], &0.6f32.to_le_bytes());
        assert_eq!(&bytes[36..40], &0.025f32.to_le_bytes());
        assert_eq!(&bytes[48..52], &(-2.5f32).to_le_bytes());
        assert_eq!(ParamSet::from_bytes(&bytes), Some(params));
    }

    #[test]
    fn damaged_record_is_rejected() {
        let mut bytes = ParamSet::default().to_bytes();
        assert_eq!(ParamSet::from_bytes(&bytes[..51]), None);
        bytes[4..8].copy_from_slice(&f32::NAN.to_le_bytes());
        assert_eq!(ParamSet::from_bytes(&bytes), None);
    }

    #[test]
    fn retuning_keeps_limits() {
        let mut tuning = PidTuning::default();
        tuning.angle = PidTerms { p: 1.0, i: 0.0, d: 0.0 };
        let gains = GainTable::with_tuning(&tuning);
        assert_eq!(gains.angle.p, 1.0);
        assert_eq!(gains.angle.output_limit, GainTable::DEFAULT.angle.output_limit);
        assert_eq!(gains.yaw.integral_limit, GainTable::DEFAULT.yaw.integral_limit);
    }
}
