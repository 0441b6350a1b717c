use std::fmt;

use serde::{Deserialize, Serialize};

// ── Actor roles ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Provider,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Provider => "provider",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "customer" => Some(Role::Customer),
            "provider" => Some(Role::Provider),
            _ => None,
        }
    }
}

// ── Service catalog ──

/// The fixed catalog of trades a provider can offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
pub enum ServiceType {
    Carpenter,
    Electrician,
    Tailor,
    Plumber,
    Painter,
    Mechanic,
    #[serde(rename = "House Maid")]
    #[sqlx(rename = "House Maid")]
    HouseMaid,
    #[serde(rename = "Mehendi Artist")]
    #[sqlx(rename = "Mehendi Artist")]
    MehendiArtist,
    Cobbler,
    Washerman,
    #[serde(rename = "Iron Man")]
    #[sqlx(rename = "Iron Man")]
    IronMan,
    #[serde(rename = "AC Repair")]
    #[sqlx(rename = "AC Repair")]
    AcRepair,
}

impl ServiceType {
    pub const ALL: [ServiceType; 12] = [
        ServiceType::Carpenter,
        ServiceType::Electrician,
        ServiceType::Tailor,
        ServiceType::Plumber,
        ServiceType::Painter,
        ServiceType::Mechanic,
        ServiceType::HouseMaid,
        ServiceType::MehendiArtist,
        ServiceType::Cobbler,
        ServiceType::Washerman,
        ServiceType::IronMan,
        ServiceType::AcRepair,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ServiceType::Carpenter => "Carpenter",
            ServiceType::Electrician => "Electrician",
            ServiceType::Tailor => "Tailor",
            ServiceType::Plumber => "Plumber",
            ServiceType::Painter => "Painter",
            ServiceType::Mechanic => "Mechanic",
            ServiceType::HouseMaid => "House Maid",
            ServiceType::MehendiArtist => "Mehendi Artist",
            ServiceType::Cobbler => "Cobbler",
            ServiceType::Washerman => "Washerman",
            ServiceType::IronMan => "Iron Man",
            ServiceType::AcRepair => "AC Repair",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            ServiceType::Carpenter => "🪚",
            ServiceType::Electrician => "⚡",
            ServiceType::Tailor => "🧵",
            ServiceType::Plumber => "🔧",
            ServiceType::Painter => "🎨",
            ServiceType::Mechanic => "🔩",
            ServiceType::HouseMaid => "🏠",
            ServiceType::MehendiArtist => "✋",
            ServiceType::Cobbler => "👞",
            ServiceType::Washerman => "👔",
            ServiceType::IronMan => "♨️",
            ServiceType::AcRepair => "❄️",
        }
    }
}

// ── Booking state machine ──

/// Booking lifecycle: pending → confirmed → completed, with cancelled
/// reachable from either active state. Completed and cancelled are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    /// An active booking occupies its slot; terminal bookings release it.
    pub fn is_active(self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }

    pub fn valid_transitions(self) -> &'static [BookingStatus] {
        match self {
            BookingStatus::Pending => &[BookingStatus::Confirmed, BookingStatus::Cancelled],
            BookingStatus::Confirmed => &[BookingStatus::Completed, BookingStatus::Cancelled],
            BookingStatus::Completed | BookingStatus::Cancelled => &[],
        }
    }

    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        self.valid_transitions().contains(&next)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Database models ──

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Profile {
    pub user_id: String,
    pub name: String,
    pub role: Role,
    pub contact: String,
    pub city: String,
    pub area: String,
    pub photo_url: Option<String>,
    pub id_verified: bool,
    pub id_verified_at: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ServiceProfile {
    pub id: String,
    pub user_id: String,
    pub service_type: ServiceType,
    pub bio: String,
    pub experience_years: i64,
    pub is_available: bool,
    pub rating: f64,
    pub review_count: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AvailabilityTemplate {
    pub service_profile_id: String,
    pub day_of_week: i64,
    pub is_available: bool,
    pub start_hour: i64,
    pub end_hour: i64,
    pub slot_duration_minutes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Booking {
    pub id: String,
    pub booking_code: String,
    pub customer_id: String,
    pub provider_user_id: String,
    pub service_profile_id: String,
    pub booking_date: String,
    pub time_slot: String,
    pub status: BookingStatus,
    pub service_note: String,
    pub cancellation_reason: Option<String>,
    pub created_at: String,
}

// ── API request types ──

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub service_profile_id: String,
    pub booking_date: String,
    pub time_slot: String,
    #[serde(default)]
    pub service_note: String,
}

#[derive(Debug, Deserialize)]
pub struct CancelBookingRequest {
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct RescheduleBookingRequest {
    pub booking_date: String,
    pub time_slot: String,
}

#[derive(Debug, Deserialize)]
pub struct ProviderQuery {
    pub service_type: Option<ServiceType>,
    pub city: Option<String>,
    pub min_rating: Option<f64>,
    #[serde(default)]
    pub verified_only: bool,
    pub q: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SlotsQuery {
    pub date: String,
}

#[derive(Debug, Deserialize)]
pub struct UpsertProfileRequest {
    pub name: String,
    #[serde(default)]
    pub contact: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub area: String,
    pub photo_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpsertServiceProfileRequest {
    pub service_type: ServiceType,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub experience_years: i64,
    #[serde(default = "default_true")]
    pub is_available: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct SetAvailabilityRequest {
    pub templates: Vec<TemplateEntry>,
}

#[derive(Debug, Deserialize)]
pub struct TemplateEntry {
    pub day_of_week: i64,
    pub is_available: bool,
    #[serde(default = "default_start_hour")]
    pub start_hour: i64,
    #[serde(default = "default_end_hour")]
    pub end_hour: i64,
    #[serde(default = "default_slot_minutes")]
    pub slot_duration_minutes: i64,
}

fn default_start_hour() -> i64 {
    8
}

fn default_end_hour() -> i64 {
    20
}

fn default_slot_minutes() -> i64 {
    60
}

#[derive(Debug, Deserialize)]
pub struct CreateReviewRequest {
    pub service_profile_id: String,
    pub rating: i64,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub id_number: String,
}

// ── API response types ──

#[derive(Debug, Serialize)]
pub struct ServiceTypeInfo {
    pub name: &'static str,
    pub icon: &'static str,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct ProviderSummary {
    pub service_profile_id: String,
    pub user_id: String,
    pub name: String,
    pub service_type: ServiceType,
    pub city: String,
    pub area: String,
    pub bio: String,
    pub experience_years: i64,
    pub photo_url: Option<String>,
    pub verified: bool,
    pub is_available: bool,
    pub rating: f64,
    pub review_count: i64,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct ReviewView {
    pub id: String,
    pub customer_name: String,
    pub rating: i64,
    pub comment: String,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct ProviderDetail {
    #[serde(flatten)]
    pub provider: ProviderSummary,
    pub reviews: Vec<ReviewView>,
}

#[derive(Debug, Serialize)]
pub struct SlotStatus {
    pub label: String,
    pub taken: bool,
}

#[derive(Debug, Serialize)]
pub struct DaySlots {
    pub date: String,
    pub available: bool,
    pub slots: Vec<SlotStatus>,
}

/// Returned from Create and Reschedule; the code is what customers quote.
#[derive(Debug, Serialize)]
pub struct BookingConfirmation {
    pub id: String,
    pub booking_code: String,
    pub status: BookingStatus,
    pub booking_date: String,
    pub time_slot: String,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct CustomerBookingView {
    pub id: String,
    pub booking_code: String,
    pub booking_date: String,
    pub time_slot: String,
    pub status: BookingStatus,
    pub service_note: String,
    pub cancellation_reason: Option<String>,
    pub provider_name: String,
    pub service_type: ServiceType,
    pub service_profile_id: String,
    pub created_at: String,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct ProviderBookingView {
    pub id: String,
    pub booking_code: String,
    pub booking_date: String,
    pub time_slot: String,
    pub status: BookingStatus,
    pub service_note: String,
    pub customer_name: String,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub ok: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
            code: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(msg.into()),
            code: None,
        }
    }

    pub fn error_coded(msg: impl Into<String>, code: &'static str) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(msg.into()),
            code: Some(code),
        }
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATUSES: [BookingStatus; 4] = [
        BookingStatus::Pending,
        BookingStatus::Confirmed,
        BookingStatus::Completed,
        BookingStatus::Cancelled,
    ];

    #[test]
    fn test_transition_table_is_closed() {
        // Every (from, to) pair not listed here must be rejected.
        let allowed = [
            (BookingStatus::Pending, BookingStatus::Confirmed),
            (BookingStatus::Pending, BookingStatus::Cancelled),
            (BookingStatus::Confirmed, BookingStatus::Completed),
            (BookingStatus::Confirmed, BookingStatus::Cancelled),
        ];
        for from in ALL_STATUSES {
            for to in ALL_STATUSES {
                let expected = allowed.contains(&(from, to));
                assert_eq!(
                    from.can_transition_to(to),
                    expected,
                    "transition {from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        assert!(BookingStatus::Completed.valid_transitions().is_empty());
        assert!(BookingStatus::Cancelled.valid_transitions().is_empty());
    }

    #[test]
    fn test_active_statuses() {
        assert!(BookingStatus::Pending.is_active());
        assert!(BookingStatus::Confirmed.is_active());
        assert!(!BookingStatus::Completed.is_active());
        assert!(!BookingStatus::Cancelled.is_active());
    }

    #[test]
    fn test_no_self_transitions() {
        for status in ALL_STATUSES {
            assert!(!status.can_transition_to(status));
        }
    }

    #[test]
    fn test_service_catalog_size() {
        assert_eq!(ServiceType::ALL.len(), 12);
    }

    #[test]
    fn test_multi_word_trade_names() {
        assert_eq!(ServiceType::HouseMaid.as_str(), "House Maid");
        assert_eq!(ServiceType::AcRepair.as_str(), "AC Repair");
        assert_eq!(
            serde_json::to_string(&ServiceType::MehendiArtist).unwrap(),
            "\"Mehendi Artist\""
        );
    }

    #[test]
    fn test_role_parse() {
        assert_eq!(Role::parse("customer"), Some(Role::Customer));
        assert_eq!(Role::parse("provider"), Some(Role::Provider));
        assert_eq!(Role::parse("admin"), None);
    }
}
