use serde::{Deserialize, Serialize};

/// Context-usage band, ordered by severity.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    /// [0, 30)
    #[default]
    Peak,
    /// [30, 50)
    Good,
    /// [50, 70)
    Degrading,
    /// [70, 100]
    Poor,
}

/// Exclusive upper bound of each tier below [`Tier::Poor`].
const BOUNDS: [(u32, Tier); 3] = [(30, Tier::Peak), (50, Tier::Good), (70, Tier::Degrading)];

/// First tier whose upper bound exceeds `percent`; [`Tier::Poor`] otherwise.
pub fn classify_tier(percent: u32) -> Tier {
    BOUNDS
        .iter()
        .find(|(upper, _)| percent < *upper)
        .map_or(Tier::Poor, |(_, tier)| *tier)
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Peak => "PEAK",
            Tier::Good => "GOOD",
            Tier::Degrading => "DEGRADING",
            Tier::Poor => "POOR",
        }
    }

    /// Tiers that may produce warnings at all.
    pub fn is_warning(self) -> bool {
        self >= Tier::Degrading
    }

    /// Advisory text for this tier at `percent`.
    pub fn advisory(self, percent: u32) -> String {
        match self {
            Tier::Peak => format!("Context {percent}% used. Plenty of room."),
            Tier::Good => format!("Context {percent}% used. Keep reads focused."),
            Tier::Degrading => format!(
                "Context {percent}% used. Output quality may start to degrade; finish the current task and avoid large reads."
            ),
            Tier::Poor => format!(
                "Context {percent}% used. Checkpoint progress now and continue in a fresh session."
            ),
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundaries() {
        assert_eq!(classify_tier(0), Tier::Peak);
        assert_eq!(classify_tier(29), Tier::Peak);
        assert_eq!(classify_tier(30), Tier::Good);
        assert_eq!(classify_tier(49), Tier::Good);
        assert_eq!(classify_tier(50), Tier::Degrading);
        assert_eq!(classify_tier(69), Tier::Degrading);
        assert_eq!(classify_tier(70), Tier::Poor);
        assert_eq!(classify_tier(100), Tier::Poor);
        assert_eq!(classify_tier(250), Tier::Poor);
    }

    #[test]
    fn severity_order() {
        assert!(Tier::Peak < Tier::Good);
        assert!(Tier::Good < Tier::Degrading);
        assert!(Tier::Degrading < Tier::Poor);
        assert!(!Tier::Good.is_warning());
        assert!(Tier::Degrading.is_warning());
    }

    #[test]
    fn serializes_upper_case() {
        assert_eq!(
            serde_json::to_string(&Tier::Degrading).expect("json"),
            "\"DEGRADING\""
        );
    }
}
