//! Domain Models
//!
//! Entities as observed through the hosted backend's rows. The backend
//! owns the authoritative schema; these structs mirror what the engine
//! reads and displays.

pub mod analytics;
pub mod customer;
pub mod location;
pub mod loyalty_card;
pub mod reward;
pub mod store;
pub mod store_hours;

pub use analytics::{AnalyticsSnapshot, CustomerSegments, SegmentCounts, VisitStats};
pub use customer::{Customer, CustomerMatch};
pub use location::Location;
pub use loyalty_card::{CardDetails, CustomerCardRow, LoyaltyCard};
pub use reward::Reward;
pub use store::{Store, SubscriptionStatus};
pub use store_hours::StoreHours;
