//! Per-user invite metrics and the anti-spam allowance derived from them.

use serde::{Deserialize, Serialize};
use strum::Display;

/// Historical signals about a user's invitations, maintained by the platform.
///
/// Read-only to this crate. A user with no recorded metrics is treated as
/// [`UserMetrics::default`], which is not allowed to invite.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UserMetrics {
  /// Share of past invites that were accepted, in `[0, 1]`.
  pub invite_success_rate: f64,
  pub spam_reports:        u32,
  /// Accumulated reputation; never negative.
  pub karma_score:         f64,
}

/// Why an invitation was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
  #[strum(to_string = "too many spam reports")]
  TooManySpamReports,
  #[strum(to_string = "invite success rate too low")]
  LowSuccessRate,
  #[strum(to_string = "daily invite limit reached")]
  DailyLimitReached,
}

/// Thresholds of the anti-spam policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AntiSpamPolicy {
  /// Success rate must be strictly above this.
  pub min_success_rate: f64,
  /// Spam reports must be strictly below this.
  pub max_spam_reports: u32,
  /// Lower bound of the daily allowance.
  pub daily_floor:      u32,
  /// Invites granted per karma point.
  pub karma_multiplier: f64,
  /// Upper bound of the daily allowance, whatever the karma.
  pub daily_ceiling:    u32,
}

impl Default for AntiSpamPolicy {
  fn default() -> Self {
    Self {
      min_success_rate: 0.3,
      max_spam_reports: 5,
      daily_floor:      10,
      karma_multiplier: 10.0,
      daily_ceiling:    50,
    }
  }
}

/// Outcome of evaluating [`UserMetrics`] against an [`AntiSpamPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteAllowance {
  pub allowed:     bool,
  pub daily_limit: u32,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub reason:      Option<BlockReason>,
}

impl AntiSpamPolicy {
  /// Pure evaluation of the policy; no state is read or written.
  pub fn evaluate(&self, metrics: &UserMetrics) -> InviteAllowance {
    let reason = if metrics.spam_reports >= self.max_spam_reports {
      Some(BlockReason::TooManySpamReports)
    } else if !(metrics.invite_success_rate > self.min_success_rate) {
      Some(BlockReason::LowSuccessRate)
    } else {
      None
    };

    InviteAllowance {
      allowed: reason.is_none(),
      daily_limit: self.daily_limit(metrics.karma_score),
      reason,
    }
  }

  /// `max(floor, karma × multiplier)`, bounded above by the ceiling.
  pub fn daily_limit(&self, karma_score: f64) -> u32 {
    let karma = if karma_score.is_finite() { karma_score.max(0.0) } else { 0.0 };
    let scaled = (karma * self.karma_multiplier).floor();
    let ceiling = self.daily_ceiling.max(self.daily_floor);
    let limit = if scaled >= f64::from(ceiling) { ceiling } else { scaled as u32 };
    limit.max(self.daily_floor)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn metrics(rate: f64, reports: u32, karma: f64) -> UserMetrics {
    UserMetrics {
      invite_success_rate: rate,
      spam_reports:        reports,
      karma_score:         karma,
    }
  }

  #[test]
  fn reputable_user_is_allowed() {
    let a = AntiSpamPolicy::default().evaluate(&metrics(0.5, 2, 500.0));
    assert_eq!(a, InviteAllowance { allowed: true, daily_limit: 50, reason: None });
  }

  #[test]
  fn five_spam_reports_block_regardless_of_success_rate() {
    let policy = AntiSpamPolicy::default();
    for rate in [0.0, 0.31, 0.9, 1.0] {
      for reports in [5, 6, 100] {
        let a = policy.evaluate(&metrics(rate, reports, 900.0));
        assert!(!a.allowed);
        assert_eq!(a.reason, Some(BlockReason::TooManySpamReports));
      }
    }
  }

  #[test]
  fn success_rate_must_be_strictly_above_threshold() {
    let policy = AntiSpamPolicy::default();
    let a = policy.evaluate(&metrics(0.3, 0, 1.0));
    assert!(!a.allowed);
    assert_eq!(a.reason, Some(BlockReason::LowSuccessRate));
    assert!(policy.evaluate(&metrics(0.3001, 0, 1.0)).allowed);
  }

  #[test]
  fn unknown_user_is_not_allowed() {
    let a = AntiSpamPolicy::default().evaluate(&UserMetrics::default());
    assert!(!a.allowed);
    assert_eq!(a.daily_limit, 10);
  }

  #[test]
  fn daily_limit_never_below_floor() {
    let policy = AntiSpamPolicy::default();
    for karma in [0.0, 0.5, 1.0, 2.5, -3.0, f64::NAN, 1e12, f64::INFINITY] {
      assert!(policy.daily_limit(karma) >= 10, "karma {karma}");
    }
  }

  #[test]
  fn daily_limit_scales_with_karma_between_floor_and_ceiling() {
    let policy = AntiSpamPolicy::default();
    assert_eq!(policy.daily_limit(0.0), 10);
    assert_eq!(policy.daily_limit(1.0), 10);
    assert_eq!(policy.daily_limit(2.0), 20);
    assert_eq!(policy.daily_limit(3.7), 37);
    assert_eq!(policy.daily_limit(5.0), 50);
    assert_eq!(policy.daily_limit(6.0), 50);
    assert_eq!(policy.daily_limit(500.0), 50);
  }
}
