//! Analytics Models
//!
//! Aggregate snapshots computed by the hosted `get-analytics` and
//! `get-customer-segments` functions. The engine treats them as opaque
//! read models.

use serde::{Deserialize, Serialize};

/// Store-level aggregate metrics snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsSnapshot {
    pub total_customers: i64,
    pub repeat_customers: i64,
    pub stamps_issued: i64,
    pub prizes_redeemed: i64,
    pub avg_visit_frequency: f64,
    pub top_customer: Option<String>,
    pub referral_signups: i64,
    pub top_referrer: Option<String>,
    /// Whether any customer is currently viewing their card
    pub is_live: bool,
}

/// Customer segmentation counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentCounts {
    pub new: i64,
    pub loyal: i64,
    pub vips: i64,
    pub at_risk: i64,
}

/// Visit statistics across the customer base
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VisitStats {
    pub total_visits: i64,
    pub avg_visits_per_customer: f64,
}

/// Segmentation response of `get-customer-segments`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerSegments {
    pub segments: SegmentCounts,
    pub visit_stats: VisitStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segments_round_trip() {
        let segments = CustomerSegments {
            segments: SegmentCounts {
                new: 4,
                loyal: 12,
                vips: 3,
                at_risk: 2,
            },
            visit_stats: VisitStats {
                total_visits: 210,
                avg_visits_per_customer: 3.5,
            },
        };
        let json = serde_json::to_string(&segments).unwrap();
        let back: CustomerSegments = serde_json::from_str(&json).unwrap();
        assert_eq!(back, segments);
    }
}
