//! Fine-grained reads over an in-memory [`Dataset`].
//!
//! Shared by the backends that keep the whole dataset in one value.

use sync_types::{
    AggregateId, AggregateRecord, Amendment, Bid, ContractTerms, Dataset, FinancialSummary,
    LineCategory,
};

pub(crate) fn records(data: &Dataset) -> Vec<AggregateRecord> {
    data.aggregates
        .iter()
        .map(|aggregate| AggregateRecord {
            aggregate: aggregate.clone(),
            integration: data
                .detail(&aggregate.id)
                .map(|d| d.integration.clone())
                .unwrap_or_default(),
        })
        .collect()
}

pub(crate) fn categories(data: &Dataset, id: &AggregateId) -> Vec<LineCategory> {
    data.detail(id)
        .map(|d| d.categories.clone())
        .unwrap_or_default()
}

pub(crate) fn contract(data: &Dataset, id: &AggregateId) -> Option<ContractTerms> {
    data.detail(id).and_then(|d| d.contract.clone())
}

pub(crate) fn financials(data: &Dataset, id: &AggregateId) -> Option<FinancialSummary> {
    data.detail(id)
        .and_then(|d| d.financials.as_ref())
        .map(|f| FinancialSummary {
            contract_price: f.contract_price,
            amendments: Vec::new(),
        })
}

pub(crate) fn amendments(data: &Dataset, id: &AggregateId) -> Vec<Amendment> {
    data.detail(id)
        .and_then(|d| d.financials.as_ref())
        .map(|f| f.amendments.clone())
        .unwrap_or_default()
}

pub(crate) fn bids(data: &Dataset) -> Vec<Bid> {
    data.details_by_id
        .values()
        .flat_map(|d| d.bids.values().flatten().cloned())
        .collect()
}
