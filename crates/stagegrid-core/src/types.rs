use serde::{Deserialize, Serialize};

/// How a percentage of a total is rounded to a count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundingMode {
    /// Floor. `33%` of 10 is 3.
    #[default]
    Down,
    /// Ceiling. `33%` of 10 is 4.
    Up,
}
