//! Domain records: projects, their nested detail, categories, bids and contacts.
//!
//! Field sets mirror what the hosted store returns after column mapping.
//! Nested detail is assembled client-side from several independent reads.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::ParseError;
use crate::ids::{AggregateId, BidId, CategoryId, ContactId};

macro_rules! literal_enum {
    ($(#[$meta:meta])* $name:ident, $kind:literal, { $($(#[$vmeta:meta])* $variant:ident => $lit:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                $(#[$vmeta])*
                #[serde(rename = $lit)]
                $variant,
            )+
        }

        impl $name {
            /// The stored literal for this value.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $lit,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($lit => Ok(Self::$variant),)+
                    other => Err(ParseError::unknown($kind, other)),
                }
            }
        }
    };
}

literal_enum!(
    /// Lifecycle status of a project.
    AggregateStatus, "aggregate status", {
        /// Under construction.
        Realization => "realization",
        /// Still in the tendering stage.
        Tender => "tender",
        /// Hidden from the active board.
        Archived => "archived",
    }
);

literal_enum!(
    /// Status of a demand category.
    CategoryStatus, "category status", {
        /// Inquiries not yet sent.
        Open => "open",
        /// Offers being negotiated.
        Negotiating => "negotiating",
        /// Closed without a contract.
        Closed => "closed",
        /// Contract signed with a winner.
        Contracted => "contracted",
    }
);

literal_enum!(
    /// Pipeline status of a bid.
    BidStatus, "bid status", {
        /// Inquiry sent, no offer yet.
        Sent => "sent",
        /// Offer received.
        Offer => "offer",
        /// Offer shortlisted.
        Shortlist => "shortlist",
        /// Selected winner.
        Contracted => "contracted",
        /// Offer rejected.
        Rejected => "rejected",
    }
);

literal_enum!(
    /// Connection state of the document integration for one project.
    IntegrationStatus, "integration status", {
        /// Linked and usable.
        Connected => "connected",
        /// Not linked.
        Disconnected => "disconnected",
        /// Linked but last call failed.
        Error => "error",
    }
);

literal_enum!(
    /// Role of the signed-in user.
    Role, "role", {
        /// Regular account.
        User => "user",
        /// Administrator.
        Admin => "admin",
        /// Offline demo session backed by the local blob.
        Demo => "demo",
    }
);

impl Default for AggregateStatus {
    fn default() -> Self {
        Self::Realization
    }
}

impl Default for CategoryStatus {
    fn default() -> Self {
        Self::Open
    }
}

impl Default for BidStatus {
    fn default() -> Self {
        Self::Sent
    }
}

impl Default for IntegrationStatus {
    fn default() -> Self {
        Self::Disconnected
    }
}

/// A top-level work item (a project) as listed during bootstrap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    /// Project identifier.
    pub id: AggregateId,
    /// Display name.
    pub name: String,
    /// Site location.
    #[serde(default)]
    pub location: String,
    /// Lifecycle status.
    #[serde(default)]
    pub status: AggregateStatus,
    /// Owner email, merged in from permission metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// Emails the project is shared with.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shared_with: Vec<String>,
}

impl Aggregate {
    /// Create an active project with no permission metadata.
    pub fn new(id: impl Into<AggregateId>, name: &str, location: &str) -> Self {
        Self {
            id: id.into(),
            name: name.to_string(),
            location: location.to_string(),
            status: AggregateStatus::Realization,
            owner: None,
            shared_with: Vec::new(),
        }
    }
}

/// One row of the aggregate list: the project plus its integration settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRecord {
    /// The listed project.
    pub aggregate: Aggregate,
    /// Integration settings stored on the project row.
    #[serde(default)]
    pub integration: IntegrationSettings,
}

/// Ownership and sharing for one project, from the bulk permission lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionMetadata {
    /// Project the metadata belongs to.
    pub aggregate_id: AggregateId,
    /// Owner email.
    pub owner: String,
    /// Emails the project is shared with.
    #[serde(default)]
    pub shared_with: Vec<String>,
}

/// Contract terms agreed with the investor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractTerms {
    /// Invoice maturity in days.
    pub maturity_days: u32,
    /// Warranty in months.
    pub warranty_months: u32,
    /// Retention terms, free text.
    #[serde(default)]
    pub retention: String,
    /// Site facilities charge, percent.
    #[serde(default)]
    pub site_facilities_percent: f64,
    /// Insurance charge, percent.
    #[serde(default)]
    pub insurance_percent: f64,
}

impl Default for ContractTerms {
    fn default() -> Self {
        Self {
            maturity_days: 30,
            warranty_months: 60,
            retention: String::new(),
            site_facilities_percent: 0.0,
            insurance_percent: 0.0,
        }
    }
}

/// A priced change to the investor contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Amendment {
    /// Amendment identifier.
    pub id: String,
    /// Display label.
    pub label: String,
    /// Price delta.
    #[serde(default)]
    pub price: f64,
}

/// Investor-side financial summary of a project.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FinancialSummary {
    /// Contracted price.
    #[serde(default)]
    pub contract_price: f64,
    /// Amendments, fetched separately and merged in.
    #[serde(default)]
    pub amendments: Vec<Amendment>,
}

/// Document integration settings stored per project.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IntegrationSettings {
    /// Whether folder sync is switched on.
    #[serde(default)]
    pub enabled: bool,
    /// Connection state.
    #[serde(default)]
    pub status: IntegrationStatus,
    /// Storage provider name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Root folder link.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_link: Option<String>,
}

impl IntegrationSettings {
    /// Enabled and connected settings for the given provider.
    pub fn connected(provider: &str) -> Self {
        Self {
            enabled: true,
            status: IntegrationStatus::Connected,
            provider: Some(provider.to_string()),
            root_link: None,
        }
    }

    /// Outbound sync is allowed only when enabled and connected.
    pub fn is_ready(&self) -> bool {
        self.enabled && self.status == IntegrationStatus::Connected
    }
}

/// A demand category: one tender package under a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineCategory {
    /// Category identifier.
    pub id: CategoryId,
    /// Display title.
    pub title: String,
    /// Budget as displayed to the user.
    #[serde(default)]
    pub budget_display: String,
    /// Budget agreed in the investor contract.
    #[serde(default)]
    pub contract_budget: f64,
    /// Internally planned budget.
    #[serde(default)]
    pub plan_budget: f64,
    /// Category status.
    #[serde(default)]
    pub status: CategoryStatus,
    /// Free-text description.
    #[serde(default)]
    pub description: String,
    /// Offer deadline (ISO date).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<String>,
    /// Realization start (ISO date).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realization_start: Option<String>,
    /// Realization end (ISO date).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realization_end: Option<String>,
    /// Number of bids, derived when bids are merged.
    #[serde(default)]
    pub bid_count: usize,
}

impl LineCategory {
    /// Create an open category with the given title.
    pub fn new(id: impl Into<CategoryId>, title: &str) -> Self {
        Self {
            id: id.into(),
            title: title.to_string(),
            budget_display: String::new(),
            contract_budget: 0.0,
            plan_budget: 0.0,
            status: CategoryStatus::Open,
            description: String::new(),
            deadline: None,
            realization_start: None,
            realization_end: None,
            bid_count: 0,
        }
    }
}

/// An offer from a contact entity against one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bid {
    /// Bid identifier.
    pub id: BidId,
    /// Category the bid belongs to.
    pub category_id: CategoryId,
    /// Bidding subcontractor.
    pub contact_id: ContactId,
    /// Company name at the time of bidding.
    #[serde(default)]
    pub company_name: String,
    /// Contact person.
    #[serde(default)]
    pub contact_person: String,
    /// Price as displayed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_display: Option<String>,
    /// Notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Pipeline status.
    #[serde(default)]
    pub status: BidStatus,
    /// Selection round, if shortlisting ran in rounds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection_round: Option<u32>,
    /// Contract signed; independent of `status`.
    #[serde(default)]
    pub signed: bool,
}

impl Bid {
    /// Create a freshly sent bid.
    pub fn new(
        id: impl Into<BidId>,
        category_id: impl Into<CategoryId>,
        contact_id: impl Into<ContactId>,
        company_name: &str,
    ) -> Self {
        Self {
            id: id.into(),
            category_id: category_id.into(),
            contact_id: contact_id.into(),
            company_name: company_name.to_string(),
            contact_person: String::new(),
            price_display: None,
            notes: None,
            tags: Vec::new(),
            status: BidStatus::Sent,
            selection_round: None,
            signed: false,
        }
    }
}

/// A person at a contact entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactPerson {
    /// Person identifier.
    pub id: String,
    /// Full name.
    pub name: String,
    /// Phone.
    #[serde(default)]
    pub phone: String,
    /// Email.
    #[serde(default)]
    pub email: String,
    /// Position at the company.
    #[serde(default)]
    pub position: String,
}

/// A vendor or subcontractor. Top-level, referenced by bids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactEntity {
    /// Contact identifier.
    pub id: ContactId,
    /// Company name.
    pub company: String,
    /// Specializations; never empty.
    #[serde(default = "default_specializations")]
    pub specializations: Vec<String>,
    /// People at the company.
    #[serde(default)]
    pub contacts: Vec<ContactPerson>,
    /// Company registration number.
    #[serde(default)]
    pub registration_id: String,
    /// Region.
    #[serde(default)]
    pub region: String,
    /// Status from the contact status taxonomy.
    #[serde(default = "default_contact_status")]
    pub status_id: String,
}

impl ContactEntity {
    /// Create a contact with default specialization and status.
    pub fn new(id: impl Into<ContactId>, company: &str) -> Self {
        Self {
            id: id.into(),
            company: company.to_string(),
            specializations: default_specializations(),
            contacts: Vec::new(),
            registration_id: String::new(),
            region: String::new(),
            status_id: default_contact_status(),
        }
    }
}

fn default_specializations() -> Vec<String> {
    vec!["Other".to_string()]
}

fn default_contact_status() -> String {
    "available".to_string()
}

/// One entry of the contact status taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusConfig {
    /// Status identifier, referenced by `ContactEntity::status_id`.
    pub id: String,
    /// Display label.
    pub label: String,
    /// Display color.
    pub color: String,
}

impl StatusConfig {
    /// Create a status entry.
    pub fn new(id: &str, label: &str, color: &str) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            color: color.to_string(),
        }
    }
}

/// Full nested record for one project, hydrated lazily.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateDetail {
    /// Project identifier.
    pub id: AggregateId,
    /// Project title.
    pub title: String,
    /// Site location.
    #[serde(default)]
    pub location: String,
    /// Lifecycle status.
    #[serde(default)]
    pub status: AggregateStatus,
    /// Demand categories.
    #[serde(default)]
    pub categories: Vec<LineCategory>,
    /// Investor contract terms, if recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract: Option<ContractTerms>,
    /// Investor financials, if recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub financials: Option<FinancialSummary>,
    /// Document integration settings.
    #[serde(default)]
    pub integration: IntegrationSettings,
    /// Bids keyed by category.
    #[serde(default)]
    pub bids: BTreeMap<CategoryId, Vec<Bid>>,
}

impl AggregateDetail {
    /// Empty detail created alongside a new project.
    pub fn empty(aggregate: &Aggregate) -> Self {
        Self {
            id: aggregate.id.clone(),
            title: aggregate.name.clone(),
            location: aggregate.location.clone(),
            status: aggregate.status,
            categories: Vec::new(),
            contract: None,
            financials: None,
            integration: IntegrationSettings::default(),
            bids: BTreeMap::new(),
        }
    }

    /// Look up a category by id.
    pub fn category(&self, id: &CategoryId) -> Option<&LineCategory> {
        self.categories.iter().find(|c| &c.id == id)
    }

    /// Whether the category belongs to this detail.
    pub fn has_category(&self, id: &CategoryId) -> bool {
        self.category(id).is_some()
    }

    /// Look up a bid by id across all categories.
    pub fn bid(&self, id: &BidId) -> Option<&Bid> {
        self.bids.values().flatten().find(|b| &b.id == id)
    }

    /// Total number of bids across all categories.
    pub fn bid_total(&self) -> usize {
        self.bids.values().map(Vec::len).sum()
    }
}

/// The signed-in user as reported by the session collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// User identifier.
    pub user_id: String,
    /// User email.
    pub email: String,
    /// User role.
    pub role: Role,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_enums_round_trip_through_str() {
        assert_eq!("shortlist".parse::<BidStatus>(), Ok(BidStatus::Shortlist));
        assert_eq!(BidStatus::Contracted.to_string(), "contracted");
        assert!("won".parse::<BidStatus>().is_err());
        assert_eq!(
            "archived".parse::<AggregateStatus>(),
            Ok(AggregateStatus::Archived)
        );
    }

    #[test]
    fn literal_enums_serialize_lowercase() {
        let json = serde_json::to_string(&CategoryStatus::Negotiating).unwrap();
        assert_eq!(json, "\"negotiating\"");
    }

    #[test]
    fn integration_ready_requires_enabled_and_connected() {
        let mut settings = IntegrationSettings::connected("gdrive");
        assert!(settings.is_ready());

        settings.status = IntegrationStatus::Error;
        assert!(!settings.is_ready());

        settings.status = IntegrationStatus::Connected;
        settings.enabled = false;
        assert!(!settings.is_ready());
    }

    #[test]
    fn contract_terms_defaults() {
        let terms = ContractTerms::default();
        assert_eq!(terms.maturity_days, 30);
        assert_eq!(terms.warranty_months, 60);
    }

    #[test]
    fn contact_defaults_fill_missing_fields() {
        let contact: ContactEntity =
            serde_json::from_str(r#"{"id":"c1","company":"Stavby s.r.o."}"#).unwrap();
        assert_eq!(contact.specializations, vec!["Other".to_string()]);
        assert_eq!(contact.status_id, "available");
    }

    #[test]
    fn detail_lookups() {
        let aggregate = Aggregate::new("p1", "Bytový dům", "Brno");
        let mut detail = AggregateDetail::empty(&aggregate);
        detail.categories.push(LineCategory::new("c1", "Elektro"));
        detail
            .bids
            .insert("c1".into(), vec![Bid::new("b1", "c1", "s1", "ElektroMont")]);

        assert!(detail.has_category(&"c1".into()));
        assert!(!detail.has_category(&"c2".into()));
        assert_eq!(detail.bid(&"b1".into()).map(|b| b.status), Some(BidStatus::Sent));
        assert_eq!(detail.bid_total(), 1);
    }
}
