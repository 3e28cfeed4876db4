//! Confirmation policy
//!
//! Maps a confirmation count and the request's speed preference to a
//! settlement decision.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpeedPolicy {
    HighSpeed,
    MediumSpeed,
    LowMediumSpeed,
    LowSpeed,
    /// Anything the listener does not recognise; never settles
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationPolicy {
    pub high_speed: u64,
    pub medium_speed: u64,
    pub low_medium_speed: u64,
    pub low_speed: u64,
}

impl ConfirmationPolicy {
    /// Parse `high,medium,lowmedium,low`
    pub fn from_csv(value: &str) -> Option<Self> {
        let parts: Vec<u64> = value
            .split(',')
            .map(|p| p.trim().parse().ok())
            .collect::<Option<Vec<_>>>()?;
        match parts.as_slice() {
            [high, medium, low_medium, low] => Some(Self {
                high_speed: *high,
                medium_speed: *medium,
                low_medium_speed: *low_medium,
                low_speed: *low,
            }),
            _ => None,
        }
    }

    pub fn threshold(&self, speed: SpeedPolicy) -> Option<u64> {
        match speed {
            SpeedPolicy::HighSpeed => Some(self.high_speed),
            SpeedPolicy::MediumSpeed => Some(self.medium_speed),
            SpeedPolicy::LowMediumSpeed => Some(self.low_medium_speed),
            SpeedPolicy::LowSpeed => Some(self.low_speed),
            SpeedPolicy::Unknown => None,
        }
    }

    pub fn is_settled(&self, confirmation_count: u64, speed: SpeedPolicy) -> bool {
        self.threshold(speed)
            .map(|required| confirmation_count >= required)
            .unwrap_or(false)
    }
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self {
            high_speed: 5,
            medium_speed: 10,
            low_medium_speed: 20,
            low_speed: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_thresholds() {
        let policy = ConfirmationPolicy::default();
        assert!(!policy.is_settled(4, SpeedPolicy::HighSpeed));
        assert!(policy.is_settled(5, SpeedPolicy::HighSpeed));
        assert!(!policy.is_settled(9, SpeedPolicy::MediumSpeed));
        assert!(policy.is_settled(10, SpeedPolicy::MediumSpeed));
        assert!(policy.is_settled(20, SpeedPolicy::LowMediumSpeed));
        assert!(!policy.is_settled(29, SpeedPolicy::LowSpeed));
        assert!(policy.is_settled(30, SpeedPolicy::LowSpeed));
    }

    #[test]
    fn test_unknown_never_settles() {
        let policy = ConfirmationPolicy::default();
        assert!(!policy.is_settled(u64::MAX, SpeedPolicy::Unknown));
        let parsed: SpeedPolicy = serde_json::from_str("\"TurboSpeed\"").unwrap();
        assert_eq!(parsed, SpeedPolicy::Unknown);
    }

    #[test]
    fn test_monotonic_in_confirmations() {
        let policy = ConfirmationPolicy::default();
        for speed in [
            SpeedPolicy::HighSpeed,
            SpeedPolicy::MediumSpeed,
            SpeedPolicy::LowMediumSpeed,
            SpeedPolicy::LowSpeed,
        ] {
            let mut settled = false;
            for count in 0..64 {
                let now = policy.is_settled(count, speed);
                assert!(!settled || now, "{:?} un-settled at {}", speed, count);
                settled = now;
            }
            assert!(settled);
        }
    }

    #[test]
    fn test_from_csv() {
        let policy = ConfirmationPolicy::from_csv("1, 2,3,4").unwrap();
        assert_eq!(policy.threshold(SpeedPolicy::LowMediumSpeed), Some(3));
        assert!(ConfirmationPolicy::from_csv("1,2,3").is_none());
        assert!(ConfirmationPolicy::from_csv("a,b,c,d").is_none());
    }
}
