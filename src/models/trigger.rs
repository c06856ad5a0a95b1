//! Trigger names shared by the detector and the follow-up catalog.

/// User talked about renovating, moving, or furnishing a new home.
pub const RENOVATION_MENTIONED: &str = "renovation_mentioned";
/// User asked about prices, discounts, or budget.
pub const PRICE_ASKED: &str = "price_asked";
/// User asked for a designer, consultation, or showroom visit.
pub const CONSULTATION_REQUESTED: &str = "consultation_requested";
/// User sounded unsure about which product fits.
pub const CONFUSION_DETECTED: &str = "confusion_detected";
/// User complained about an order or product.
pub const COMPLAINT_DETECTED: &str = "complaint_detected";
/// User needs something quickly.
pub const URGENT_REQUEST: &str = "urgent_request";
/// User is browsing without time pressure.
pub const JUST_BROWSING: &str = "just_browsing";
/// Derived: the user has mentioned two or more product categories.
pub const MULTIPLE_CATEGORIES: &str = "multiple_categories";
/// Derived: the user is within their first few messages.
pub const FIRST_VISIT: &str = "first_visit";
