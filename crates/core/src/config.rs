use serde::{Deserialize, Serialize};

/// Default airtime weight for the 1 Mbit/s rate, in hundredths.
pub const DEFAULT_WEIGHT_1: u32 = 100;
/// Default airtime weight for the 2 Mbit/s rate, in hundredths.
pub const DEFAULT_WEIGHT_2: u32 = 180;
/// Default airtime weight for the 5.5 Mbit/s rate, in hundredths.
pub const DEFAULT_WEIGHT_5: u32 = 260;
/// Default airtime weight for the 11 Mbit/s rate, in hundredths.
pub const DEFAULT_WEIGHT_11: u32 = 600;

/// Estimator tuning. Set once at startup and treated as process-lifetime
/// constants thereafter.
///
/// Each weight approximates the relative goodput of one transmission rate and
/// scales that rate's candidate throughput during bitrate selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricConfig {
    pub weight_1: u32,
    pub weight_2: u32,
    pub weight_5: u32,
    pub weight_11: u32,
    /// When disabled, the combined throughput estimate degrades to the
    /// product of the two 1 Mbit/s delivery fractions and the result of the
    /// bitrate search is ignored.
    pub two_way_metrics: bool,
}

impl Default for MetricConfig {
    fn default() -> Self {
        MetricConfig {
            weight_1: DEFAULT_WEIGHT_1,
            weight_2: DEFAULT_WEIGHT_2,
            weight_5: DEFAULT_WEIGHT_5,
            weight_11: DEFAULT_WEIGHT_11,
            two_way_metrics: true,
        }
    }
}
