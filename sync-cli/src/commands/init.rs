//! Create the store, optionally seeded with demo data.

use anyhow::Result;
use tracing::info;

use sync_core::refresh_bid_counts;
use sync_types::{
    Aggregate, AggregateDetail, AggregateStatus, Amendment, Bid, BidStatus, CategoryStatus,
    ContactEntity, ContactPerson, ContractTerms, Dataset, FinancialSummary, IntegrationSettings,
    LineCategory, StatusConfig,
};

use crate::config::Context;

/// Run the init command.
pub async fn run(ctx: &Context, demo: bool) -> Result<()> {
    if ctx.is_initialized() {
        anyhow::bail!(
            "Store already initialized. Delete {} to reinitialize.",
            ctx.store_path().display()
        );
    }

    let backend = ctx.connect().await?;
    let data = if demo {
        demo_dataset()
    } else {
        Dataset::default()
    };
    backend.seed(&data, &ctx.store_path()).await?;
    info!(store = %ctx.store_path().display(), demo, "Store initialized");

    println!("Store initialized successfully!");
    println!();
    println!("  Store:     {} ({})", ctx.store_path().display(), backend.kind());
    if !ctx.local {
        println!("  Owner:     {}", ctx.user);
    }
    println!("  Projects:  {}", data.aggregates.len());
    println!("  Contacts:  {}", data.contacts.len());
    println!();
    println!("Next steps:");
    println!("  1. Look at the board: bidsync show");
    println!("  2. Add a category:    bidsync category add <project> <title>");

    Ok(())
}

/// Two projects with a handful of categories, bids and subcontractors.
pub fn demo_dataset() -> Dataset {
    let mut data = Dataset::default();

    data.contacts = vec![
        contact("demo-s1", "Elmont s.r.o.", "Electrical", "Jana Horáková"),
        contact("demo-s2", "Elektro Novák", "Electrical", "Petr Novák"),
        contact("demo-s3", "Klima Plus a.s.", "HVAC", "Tomáš Dvořák"),
    ];
    data.statuses = vec![
        StatusConfig::new("available", "Available", "green"),
        StatusConfig::new("busy", "Busy", "orange"),
        StatusConfig::new("blacklisted", "Do not use", "red"),
    ];

    let office = Aggregate::new("demo-p1", "Polyfunkční dům", "Brno");
    let mut detail = AggregateDetail::empty(&office);
    detail.integration = IntegrationSettings::connected("gdrive");
    detail.contract = Some(ContractTerms {
        retention: "5 % until handover".to_string(),
        site_facilities_percent: 1.5,
        insurance_percent: 0.3,
        ..ContractTerms::default()
    });
    detail.financials = Some(FinancialSummary {
        contract_price: 48_500_000.0,
        amendments: vec![Amendment {
            id: "demo-a1".to_string(),
            label: "Extra underground parking".to_string(),
            price: 2_100_000.0,
        }],
    });

    let mut electrical = LineCategory::new("demo-c1", "Elektroinstalace");
    electrical.contract_budget = 1_250_000.0;
    electrical.plan_budget = 1_100_000.0;
    electrical.budget_display = "1 250 000 Kč".to_string();
    electrical.status = CategoryStatus::Negotiating;
    electrical.deadline = Some("2026-11-30".to_string());
    let hvac = LineCategory::new("demo-c2", "Vzduchotechnika");
    detail.categories = vec![electrical, hvac];

    let mut offer = Bid::new("demo-b1", "demo-c1", "demo-s1", "Elmont s.r.o.");
    offer.contact_person = "Jana Horáková".to_string();
    offer.price_display = Some("1 180 000 Kč".to_string());
    offer.status = BidStatus::Offer;
    offer.selection_round = Some(1);
    let sent = Bid::new("demo-b2", "demo-c1", "demo-s2", "Elektro Novák");
    let hvac_bid = Bid::new("demo-b3", "demo-c2", "demo-s3", "Klima Plus a.s.");
    detail.bids.insert("demo-c1".into(), vec![offer, sent]);
    detail.bids.insert("demo-c2".into(), vec![hvac_bid]);
    refresh_bid_counts(&mut detail);
    data.details_by_id.insert(office.id.clone(), detail);

    let mut school = Aggregate::new("demo-p2", "Rekonstrukce školy", "Zlín");
    school.status = AggregateStatus::Tender;
    let mut detail = AggregateDetail::empty(&school);
    detail.categories = vec![LineCategory::new("demo-c3", "Střecha")];
    refresh_bid_counts(&mut detail);
    data.details_by_id.insert(school.id.clone(), detail);

    data.aggregates = vec![office, school];
    data
}

fn contact(id: &str, company: &str, specialization: &str, person: &str) -> ContactEntity {
    let mut entity = ContactEntity::new(id, company);
    entity.specializations = vec![specialization.to_string()];
    entity.region = "Jihomoravský".to_string();
    entity.contacts.push(ContactPerson {
        id: format!("{id}-1"),
        name: person.to_string(),
        phone: String::new(),
        email: String::new(),
        position: "Sales".to_string(),
    });
    entity
}
