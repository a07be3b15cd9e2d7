//! Trial acceptance rules.
//!
//! [`classify`] is the outlier gate applied to every processed trial.
//! [`turning_fail`] and [`elytra_fail`] are response policies that look only
//! at the response slice of a trial; the default run does not apply them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::GateConfig;
use crate::types::{Side, StimulusKey};

/// Why a trial was dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RejectReason {
    /// Two angle samples `jump_lag` apart differ by more than the limit
    TrackingJump,
    /// No finite body-angle sample
    NonFiniteAngle,
    /// Right trial ends above `+return_limit_deg`
    RightNotReturned,
    /// Left trial ends below `-return_limit_deg`
    LeftNotReturned,
    /// Both trial moves backward faster than the limit
    BackwardMotion,
    /// Turning response policy: no turn beyond the response threshold
    NoTurnResponse,
    /// Elytra response policy: no forward burst beyond the threshold
    NoForwardResponse,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RejectReason::TrackingJump => "tracking jump",
            RejectReason::NonFiniteAngle => "no finite body angle",
            RejectReason::RightNotReturned => "right turn did not return",
            RejectReason::LeftNotReturned => "left turn did not return",
            RejectReason::BackwardMotion => "backward motion",
            RejectReason::NoTurnResponse => "no turning response",
            RejectReason::NoForwardResponse => "no forward response",
        };
        f.write_str(text)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Accept,
    Reject(RejectReason),
}

impl Verdict {
    pub fn is_accept(&self) -> bool {
        matches!(self, Verdict::Accept)
    }
}

fn has_tracking_jump(angles: &[f64], lag: usize, limit: f64) -> bool {
    angles.len() > lag
        && angles
            .iter()
            .zip(&angles[lag..])
            .any(|(a, b)| (a - b).abs() > limit)
}

/// Apply the outlier gate to one processed trial.
///
/// Rules are checked in a fixed order and the first failing rule is
/// reported.
pub fn classify(
    body_angle: &[f64],
    forward_velocity: &[f64],
    key: &StimulusKey,
    config: &GateConfig,
) -> Verdict {
    if has_tracking_jump(body_angle, config.jump_lag, config.jump_limit_deg) {
        return Verdict::Reject(RejectReason::TrackingJump);
    }
    if !body_angle.iter().any(|a| a.is_finite()) {
        return Verdict::Reject(RejectReason::NonFiniteAngle);
    }
    let last = body_angle.last().copied().unwrap_or(f64::NAN);
    match key.side {
        Side::Right if last > config.return_limit_deg => {
            Verdict::Reject(RejectReason::RightNotReturned)
        }
        Side::Left if last < -config.return_limit_deg => {
            Verdict::Reject(RejectReason::LeftNotReturned)
        }
        Side::Both
            if forward_velocity
                .iter()
                .any(|&v| v < config.backward_velocity_limit) =>
        {
            Verdict::Reject(RejectReason::BackwardMotion)
        }
        _ => Verdict::Accept,
    }
}

/// Convenience wrapper: true when [`classify`] rejects.
pub fn trial_is_outlier(
    body_angle: &[f64],
    forward_velocity: &[f64],
    key: &StimulusKey,
    config: &GateConfig,
) -> bool {
    !classify(body_angle, forward_velocity, key, config).is_accept()
}

fn response_slice<'a>(series: &'a [f64], config: &GateConfig) -> &'a [f64] {
    &series[config.response_range(series.len())]
}

/// Turning trial whose body angle never passes the response threshold in
/// the stimulated direction during the response slice.
///
/// An empty response slice counts as a failure. Non-turning keys never fail.
pub fn turning_fail(body_angle: &[f64], key: &StimulusKey, config: &GateConfig) -> bool {
    let slice = response_slice(body_angle, config);
    match key.side {
        Side::Right => {
            let min = slice.iter().copied().fold(f64::INFINITY, f64::min);
            min > -config.turning_response_deg
        }
        Side::Left => {
            let max = slice.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            max < config.turning_response_deg
        }
        Side::Both | Side::None => false,
    }
}

/// Elytra trial whose forward velocity never exceeds the response threshold
/// during the response slice. Only `Both` keys can fail.
pub fn elytra_fail(forward_velocity: &[f64], key: &StimulusKey, config: &GateConfig) -> bool {
    if key.side != Side::Both {
        return false;
    }
    let max = response_slice(forward_velocity, config)
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    max < config.elytra_response_mm_s
}

/// Response policy for the key's category, if it has one.
pub fn response_failure(
    body_angle: &[f64],
    forward_velocity: &[f64],
    key: &StimulusKey,
    config: &GateConfig,
) -> Option<RejectReason> {
    match key.side {
        Side::Right | Side::Left if turning_fail(body_angle, key, config) => {
            Some(RejectReason::NoTurnResponse)
        }
        Side::Both if elytra_fail(forward_velocity, key, config) => {
            Some(RejectReason::NoForwardResponse)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(side: Side) -> StimulusKey {
        StimulusKey::new(side, 20)
    }

    fn flat(n: usize) -> Vec<f64> {
        vec![0.0; n]
    }

    #[test]
    fn test_quiet_trial_accepted() {
        let config = GateConfig::default();
        for side in [Side::Right, Side::Left, Side::Both, Side::None] {
            assert_eq!(classify(&flat(70), &flat(69), &key(side), &config), Verdict::Accept);
        }
    }

    #[test]
    fn test_right_final_angle_above_limit_rejected() {
        let config = GateConfig::default();
        let mut angles: Vec<f64> = (0..70).map(|i| i as f64 * 6.0 / 69.0).collect();
        angles[69] = 6.0;
        assert_eq!(
            classify(&angles, &flat(69), &key(Side::Right), &config),
            Verdict::Reject(RejectReason::RightNotReturned)
        );
        // The same trace is fine for a left stimulus
        assert!(classify(&angles, &flat(69), &key(Side::Left), &config).is_accept());
    }

    #[test]
    fn test_left_final_angle_below_limit_rejected() {
        let config = GateConfig::default();
        let angles: Vec<f64> = (0..70).map(|i| -(i as f64) * 0.1).collect();
        assert_eq!(
            classify(&angles, &flat(69), &key(Side::Left), &config),
            Verdict::Reject(RejectReason::LeftNotReturned)
        );
    }

    #[test]
    fn test_jump_rejected_regardless_of_side() {
        let config = GateConfig::default();
        let mut angles = flat(70);
        angles[30] = 45.0;
        for side in [Side::Right, Side::Left, Side::Both] {
            assert_eq!(
                classify(&angles, &flat(69), &key(side), &config),
                Verdict::Reject(RejectReason::TrackingJump)
            );
        }
    }

    #[test]
    fn test_jump_checks_lag_not_neighbours() {
        let config = GateConfig::default();
        // 9° per sample: 36° across any 4 samples, 45° across 5
        let angles: Vec<f64> = (0..20).map(|i| i as f64 * 9.0).collect();
        assert!(trial_is_outlier(&angles, &flat(19), &key(Side::None), &config));
        let angles: Vec<f64> = (0..20).map(|i| i as f64 * 7.0).collect();
        assert!(!trial_is_outlier(&angles, &flat(19), &key(Side::None), &config));
    }

    #[test]
    fn test_all_nan_rejected() {
        let config = GateConfig::default();
        assert_eq!(
            classify(&[f64::NAN; 10], &flat(9), &key(Side::Both), &config),
            Verdict::Reject(RejectReason::NonFiniteAngle)
        );
        assert!(trial_is_outlier(&[], &[], &key(Side::Right), &config));
    }

    #[test]
    fn test_backward_motion_only_for_both() {
        let config = GateConfig::default();
        let mut fwd = flat(69);
        fwd[40] = -5.5;
        assert_eq!(
            classify(&flat(70), &fwd, &key(Side::Both), &config),
            Verdict::Reject(RejectReason::BackwardMotion)
        );
        assert!(classify(&flat(70), &fwd, &key(Side::Right), &config).is_accept());
    }

    #[test]
    fn test_classify_is_deterministic() {
        let config = GateConfig::default();
        let angles: Vec<f64> = (0..70).map(|i| (i as f64 * 0.3).sin() * 10.0).collect();
        let fwd: Vec<f64> = (0..69).map(|i| (i as f64 * 0.2).cos()).collect();
        let first = classify(&angles, &fwd, &key(Side::Left), &config);
        for _ in 0..5 {
            assert_eq!(classify(&angles, &fwd, &key(Side::Left), &config), first);
        }
    }

    #[test]
    fn test_turning_fail_uses_response_slice() {
        let config = GateConfig::default();
        let mut angles = flat(115);
        // Response slice of 115 samples spans roughly [15, 65)
        angles[10] = -20.0;
        assert!(turning_fail(&angles, &key(Side::Right), &config));
        angles[40] = -4.0;
        assert!(!turning_fail(&angles, &key(Side::Right), &config));
        assert!(turning_fail(&angles, &key(Side::Left), &config));
        angles[41] = 3.5;
        assert!(!turning_fail(&angles, &key(Side::Left), &config));
        assert!(!turning_fail(&flat(115), &key(Side::Both), &config));
    }

    #[test]
    fn test_turning_fail_empty_slice() {
        let config = GateConfig::default();
        assert!(turning_fail(&[], &key(Side::Right), &config));
        assert!(turning_fail(&[], &key(Side::Left), &config));
    }

    #[test]
    fn test_elytra_fail() {
        let config = GateConfig::default();
        let mut fwd = flat(115);
        assert!(elytra_fail(&fwd, &key(Side::Both), &config));
        fwd[30] = 4.0;
        assert!(!elytra_fail(&fwd, &key(Side::Both), &config));
        assert!(!elytra_fail(&flat(115), &key(Side::Right), &config));
        // Burst outside the response slice does not count
        let mut late = flat(115);
        late[100] = 10.0;
        assert!(elytra_fail(&late, &key(Side::Both), &config));
    }

    #[test]
    fn test_response_failure_dispatch() {
        let config = GateConfig::default();
        assert_eq!(
            response_failure(&flat(115), &flat(114), &key(Side::Left), &config),
            Some(RejectReason::NoTurnResponse)
        );
        assert_eq!(
            response_failure(&flat(115), &flat(114), &key(Side::Both), &config),
            Some(RejectReason::NoForwardResponse)
        );
        assert_eq!(
            response_failure(&flat(115), &flat(114), &key(Side::None), &config),
            None
        );
    }
}
