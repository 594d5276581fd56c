//! Hydration ordering and additive merges.
//!
//! Every function here builds a complete new value before touching the
//! dataset, so a caller that holds the write lock for one call commits
//! atomically. Merges are additive: committing one aggregate never removes
//! or alters another aggregate's detail.

use std::collections::{BTreeMap, HashMap, HashSet};

use sync_types::{
    Aggregate, AggregateDetail, AggregateId, AggregateRecord, Amendment, Bid, CategoryId,
    ContractTerms, Dataset, FinancialSummary, LineCategory, PermissionMetadata,
};

/// Hydration order: the priority aggregate first, the rest in list order.
///
/// A priority id that is not listed is ignored.
pub fn hydration_queue(ids: &[AggregateId], priority: Option<&AggregateId>) -> Vec<AggregateId> {
    let mut queue = Vec::with_capacity(ids.len());
    if let Some(first) = priority.filter(|p| ids.contains(p)) {
        queue.push(first.clone());
    }
    queue.extend(ids.iter().filter(|id| Some(*id) != priority).cloned());
    queue
}

/// Merge ownership and sharing metadata into the listed aggregates.
pub fn merge_permissions(
    records: &[AggregateRecord],
    permissions: &[PermissionMetadata],
) -> Vec<Aggregate> {
    let by_id: HashMap<&AggregateId, &PermissionMetadata> =
        permissions.iter().map(|p| (&p.aggregate_id, p)).collect();

    records
        .iter()
        .map(|record| {
            let mut aggregate = record.aggregate.clone();
            if let Some(meta) = by_id.get(&aggregate.id) {
                aggregate.owner = Some(meta.owner.clone());
                aggregate.shared_with = meta.shared_with.clone();
            }
            aggregate
        })
        .collect()
}

/// Replace the aggregate list and drop details of aggregates no longer listed.
///
/// Details of surviving aggregates stay until they are re-hydrated.
pub fn commit_list(data: &mut Dataset, aggregates: Vec<Aggregate>) {
    let listed: HashSet<&AggregateId> = aggregates.iter().map(|a| &a.id).collect();
    data.details_by_id.retain(|id, _| listed.contains(id));
    data.aggregates = aggregates;
}

/// The four nested resources fetched for one aggregate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetailParts {
    /// Demand categories.
    pub categories: Vec<LineCategory>,
    /// Contract terms, if recorded.
    pub contract: Option<ContractTerms>,
    /// Financial summary, if recorded.
    pub financials: Option<FinancialSummary>,
    /// Amendments to the financial summary.
    pub amendments: Vec<Amendment>,
}

/// Assemble one aggregate's detail from its list record and nested parts.
///
/// Bids committed earlier for this aggregate are carried over, filtered to
/// categories that still exist, until the bid phase replaces them.
pub fn build_detail(
    record: &AggregateRecord,
    parts: DetailParts,
    previous: Option<&AggregateDetail>,
) -> AggregateDetail {
    let DetailParts {
        mut categories,
        contract,
        financials,
        amendments,
    } = parts;

    let known: HashSet<&CategoryId> = categories.iter().map(|c| &c.id).collect();
    let bids: BTreeMap<CategoryId, Vec<Bid>> = previous
        .map(|prev| {
            prev.bids
                .iter()
                .filter(|(category, _)| known.contains(category))
                .map(|(category, bids)| (category.clone(), bids.clone()))
                .collect()
        })
        .unwrap_or_default();

    for category in &mut categories {
        category.bid_count = bids.get(&category.id).map_or(0, Vec::len);
    }

    AggregateDetail {
        id: record.aggregate.id.clone(),
        title: record.aggregate.name.clone(),
        location: record.aggregate.location.clone(),
        status: record.aggregate.status,
        categories,
        contract,
        financials: financials.map(|summary| FinancialSummary {
            amendments,
            ..summary
        }),
        integration: record.integration.clone(),
        bids,
    }
}

/// Commit one aggregate's detail without touching any other entry.
pub fn commit_detail(data: &mut Dataset, detail: AggregateDetail) {
    data.details_by_id.insert(detail.id.clone(), detail);
}

/// Bids grouped by owning aggregate, then category.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BidPartition {
    /// Resolved bids.
    pub by_aggregate: BTreeMap<AggregateId, BTreeMap<CategoryId, Vec<Bid>>>,
    /// Bids whose category is not part of any hydrated detail.
    pub orphans: usize,
}

/// Partition a flat bid collection using the hydrated category maps.
///
/// Bids whose category does not resolve are counted and dropped.
pub fn partition_bids(data: &Dataset, bids: Vec<Bid>) -> BidPartition {
    let owner: HashMap<&CategoryId, &AggregateId> = data
        .details_by_id
        .values()
        .flat_map(|detail| detail.categories.iter().map(move |c| (&c.id, &detail.id)))
        .collect();

    let mut partition = BidPartition::default();
    for bid in bids {
        match owner.get(&bid.category_id) {
            Some(aggregate_id) => partition
                .by_aggregate
                .entry((*aggregate_id).clone())
                .or_default()
                .entry(bid.category_id.clone())
                .or_default()
                .push(bid),
            None => partition.orphans += 1,
        }
    }
    partition
}

/// Replace bids of hydrated details and recompute category bid counts.
///
/// With `only`, just that aggregate is touched.
pub fn commit_bids(data: &mut Dataset, mut partition: BidPartition, only: Option<&AggregateId>) {
    for (id, detail) in data.details_by_id.iter_mut() {
        if only.is_some_and(|target| target != id) {
            continue;
        }
        let known: HashSet<CategoryId> = detail.categories.iter().map(|c| c.id.clone()).collect();
        let mut bids = partition.by_aggregate.remove(id).unwrap_or_default();
        bids.retain(|category, _| known.contains(category));
        detail.bids = bids;
        refresh_bid_counts(detail);
    }
}

/// Recompute each category's `bid_count` from the detail's bid map.
pub fn refresh_bid_counts(detail: &mut AggregateDetail) {
    for category in &mut detail.categories {
        category.bid_count = detail.bids.get(&category.id).map_or(0, Vec::len);
    }
}
