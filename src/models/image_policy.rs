use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::CategoryRecord;

/// Which image resolution to show for a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImagePolicy {
    /// Low-res on low-data networks, high-res otherwise.
    #[default]
    Adaptive,
    High,
    Low,
}

impl ImagePolicy {
    /// Picks the image URL for `record` under this policy.
    ///
    /// Falls back to the other resolution when the preferred URL is empty.
    pub fn select<'a>(&self, record: &'a CategoryRecord, low_data: bool) -> &'a str {
        let prefer_low = match self {
            ImagePolicy::Adaptive => low_data,
            ImagePolicy::High => false,
            ImagePolicy::Low => true,
        };
        let (preferred, fallback) = if prefer_low {
            (&record.low_res_image_url, &record.high_res_image_url)
        } else {
            (&record.high_res_image_url, &record.low_res_image_url)
        };
        if preferred.is_empty() {
            fallback
        } else {
            preferred
        }
    }
}

impl fmt::Display for ImagePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImagePolicy::Adaptive => write!(f, "adaptive"),
            ImagePolicy::High => write!(f, "high"),
            ImagePolicy::Low => write!(f, "low"),
        }
    }
}

impl FromStr for ImagePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "adaptive" => Ok(ImagePolicy::Adaptive),
            "high" => Ok(ImagePolicy::High),
            "low" => Ok(ImagePolicy::Low),
            _ => Err(format!(
                "Invalid image policy '{}'. Valid options: adaptive, high, low",
                s
            )),
        }
    }
}
