//! Local application of mutations and slice capture for rollback.
//!
//! The same [`apply_mutation`] runs for the optimistic in-memory change and
//! for the local blob store, so in offline mode the two cannot diverge.

use thiserror::Error;

use sync_types::{
    Aggregate, AggregateDetail, AggregateId, CategoryId, ContactEntity, ContactId, Dataset,
    Mutation, Slice, StatusConfig,
};

use crate::hydration::refresh_bid_counts;

/// A mutation that cannot be applied to the current dataset.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplyError {
    /// The aggregate is not listed.
    #[error("unknown aggregate: {0}")]
    UnknownAggregate(AggregateId),

    /// The aggregate is listed but its detail has not been hydrated yet.
    #[error("detail not loaded for aggregate: {0}")]
    DetailNotLoaded(AggregateId),

    /// The category does not belong to the aggregate's detail.
    #[error("unknown category {category} in aggregate {aggregate}")]
    UnknownCategory {
        /// Owning aggregate.
        aggregate: AggregateId,
        /// Missing category.
        category: CategoryId,
    },

    /// A category with this id already exists.
    #[error("category already exists: {0}")]
    DuplicateCategory(CategoryId),

    /// The contact does not exist.
    #[error("unknown contact: {0}")]
    UnknownContact(ContactId),
}

/// Apply a mutation to the dataset in place.
///
/// On error the dataset is left unchanged.
pub fn apply_mutation(data: &mut Dataset, mutation: &Mutation) -> Result<(), ApplyError> {
    match mutation {
        Mutation::AddAggregate { aggregate } => {
            data.aggregates.retain(|a| a.id != aggregate.id);
            data.aggregates.insert(0, aggregate.clone());
            data.details_by_id
                .entry(aggregate.id.clone())
                .or_insert_with(|| AggregateDetail::empty(aggregate));
        }
        Mutation::DeleteAggregate { aggregate_id } => {
            require_listed(data, aggregate_id)?;
            data.aggregates.retain(|a| &a.id != aggregate_id);
            data.details_by_id.remove(aggregate_id);
        }
        Mutation::SetAggregateStatus {
            aggregate_id,
            status,
        } => {
            let entry = data
                .aggregates
                .iter_mut()
                .find(|a| &a.id == aggregate_id)
                .ok_or_else(|| ApplyError::UnknownAggregate(aggregate_id.clone()))?;
            entry.status = *status;
            if let Some(detail) = data.details_by_id.get_mut(aggregate_id) {
                detail.status = *status;
            }
        }
        Mutation::UpdateDetail {
            aggregate_id,
            patch,
        } => {
            let detail = detail_mut(data, aggregate_id)?;
            if let Some(title) = &patch.title {
                detail.title = title.clone();
            }
            if let Some(location) = &patch.location {
                detail.location = location.clone();
            }
            if let Some(contract) = &patch.contract {
                detail.contract = Some(contract.clone());
            }
            if let Some(financials) = &patch.financials {
                detail.financials = Some(financials.clone());
            }
            if let Some(integration) = &patch.integration {
                detail.integration = integration.clone();
            }
            if let Some(entry) = data.aggregates.iter_mut().find(|a| &a.id == aggregate_id) {
                if let Some(title) = &patch.title {
                    entry.name = title.clone();
                }
                if let Some(location) = &patch.location {
                    entry.location = location.clone();
                }
            }
        }
        Mutation::AddCategory {
            aggregate_id,
            category,
        } => {
            let detail = detail_mut(data, aggregate_id)?;
            if detail.has_category(&category.id) {
                return Err(ApplyError::DuplicateCategory(category.id.clone()));
            }
            let mut category = category.clone();
            category.bid_count = 0;
            detail.categories.push(category);
        }
        Mutation::EditCategory {
            aggregate_id,
            category,
        } => {
            let detail = detail_mut(data, aggregate_id)?;
            let slot = detail
                .categories
                .iter_mut()
                .find(|c| c.id == category.id)
                .ok_or_else(|| ApplyError::UnknownCategory {
                    aggregate: aggregate_id.clone(),
                    category: category.id.clone(),
                })?;
            let bid_count = slot.bid_count;
            *slot = category.clone();
            slot.bid_count = bid_count;
        }
        Mutation::DeleteCategory {
            aggregate_id,
            category_id,
        } => {
            let detail = detail_mut(data, aggregate_id)?;
            if !detail.has_category(category_id) {
                return Err(ApplyError::UnknownCategory {
                    aggregate: aggregate_id.clone(),
                    category: category_id.clone(),
                });
            }
            detail.categories.retain(|c| &c.id != category_id);
            detail.bids.remove(category_id);
        }
        Mutation::UpsertBid { aggregate_id, bid } => {
            let detail = detail_mut(data, aggregate_id)?;
            if !detail.has_category(&bid.category_id) {
                return Err(ApplyError::UnknownCategory {
                    aggregate: aggregate_id.clone(),
                    category: bid.category_id.clone(),
                });
            }
            let in_place = detail
                .bids
                .get(&bid.category_id)
                .is_some_and(|bucket| bucket.iter().any(|b| b.id == bid.id));
            if in_place {
                for slot in detail.bids.values_mut().flatten() {
                    if slot.id == bid.id {
                        *slot = bid.clone();
                    }
                }
            } else {
                // The bid may be moving between categories.
                for bids in detail.bids.values_mut() {
                    bids.retain(|b| b.id != bid.id);
                }
                detail.bids.retain(|_, bids| !bids.is_empty());
                detail
                    .bids
                    .entry(bid.category_id.clone())
                    .or_default()
                    .push(bid.clone());
            }
            refresh_bid_counts(detail);
        }
        Mutation::AddContact { contact } => {
            data.contacts.push(normalize_contact(contact.clone()));
        }
        Mutation::UpdateContact { contact } => {
            let slot = data
                .contacts
                .iter_mut()
                .find(|c| c.id == contact.id)
                .ok_or_else(|| ApplyError::UnknownContact(contact.id.clone()))?;
            *slot = normalize_contact(contact.clone());
        }
        Mutation::DeleteContacts { ids } => {
            data.contacts.retain(|c| !ids.contains(&c.id));
        }
        Mutation::UpsertContacts { contacts } => {
            for contact in contacts {
                let contact = normalize_contact(contact.clone());
                match data.contacts.iter_mut().find(|c| c.id == contact.id) {
                    Some(slot) => *slot = contact,
                    None => data.contacts.push(contact),
                }
            }
        }
        Mutation::SetStatuses { statuses } => {
            data.statuses = statuses.clone();
        }
    }
    Ok(())
}

/// Fill a missing specialization with the default.
pub fn normalize_contact(mut contact: ContactEntity) -> ContactEntity {
    contact.specializations.retain(|s| !s.trim().is_empty());
    if contact.specializations.is_empty() {
        contact.specializations.push("Other".to_string());
    }
    contact
}

fn require_listed(data: &Dataset, id: &AggregateId) -> Result<(), ApplyError> {
    match data.aggregate(id) {
        Some(_) => Ok(()),
        None => Err(ApplyError::UnknownAggregate(id.clone())),
    }
}

fn detail_mut<'a>(
    data: &'a mut Dataset,
    id: &AggregateId,
) -> Result<&'a mut AggregateDetail, ApplyError> {
    if data.aggregate(id).is_none() && !data.details_by_id.contains_key(id) {
        return Err(ApplyError::UnknownAggregate(id.clone()));
    }
    data.details_by_id
        .get_mut(id)
        .ok_or_else(|| ApplyError::DetailNotLoaded(id.clone()))
}

#[derive(Debug, Clone, PartialEq)]
enum Captured {
    ListEntry {
        id: AggregateId,
        entry: Option<(usize, Aggregate)>,
    },
    Detail {
        id: AggregateId,
        detail: Option<AggregateDetail>,
    },
    Contacts(Vec<ContactEntity>),
    Statuses(Vec<StatusConfig>),
}

/// Pre-mutation copy of the slices a mutation touches.
///
/// Restoring writes back exactly those slices: other aggregates, and list
/// entries other than the captured ones, keep whatever was committed since.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SliceSnapshot {
    captured: Vec<Captured>,
}

impl SliceSnapshot {
    /// Copy the given slices out of the dataset.
    pub fn capture(data: &Dataset, slices: &[Slice]) -> Self {
        let captured = slices
            .iter()
            .map(|slice| match slice {
                Slice::ListEntry(id) => Captured::ListEntry {
                    id: id.clone(),
                    entry: data
                        .aggregates
                        .iter()
                        .position(|a| &a.id == id)
                        .map(|index| (index, data.aggregates[index].clone())),
                },
                Slice::Detail(id) => Captured::Detail {
                    id: id.clone(),
                    detail: data.details_by_id.get(id).cloned(),
                },
                Slice::Contacts => Captured::Contacts(data.contacts.clone()),
                Slice::Statuses => Captured::Statuses(data.statuses.clone()),
            })
            .collect();
        Self { captured }
    }

    /// Write the captured slices back.
    pub fn restore(self, data: &mut Dataset) {
        for captured in self.captured {
            match captured {
                Captured::ListEntry { id, entry } => {
                    data.aggregates.retain(|a| a.id != id);
                    if let Some((index, aggregate)) = entry {
                        let index = index.min(data.aggregates.len());
                        data.aggregates.insert(index, aggregate);
                    }
                }
                Captured::Detail { id, detail } => match detail {
                    Some(detail) => {
                        data.details_by_id.insert(id, detail);
                    }
                    None => {
                        data.details_by_id.remove(&id);
                    }
                },
                Captured::Contacts(contacts) => data.contacts = contacts,
                Captured::Statuses(statuses) => data.statuses = statuses,
            }
        }
    }

    /// Number of captured slices.
    pub fn len(&self) -> usize {
        self.captured.len()
    }

    /// Whether nothing was captured.
    pub fn is_empty(&self) -> bool {
        self.captured.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sync_types::{
        AggregateStatus, Bid, BidStatus, ContractTerms, DetailPatch, LineCategory,
    };

    fn dataset() -> Dataset {
        let mut data = Dataset::default();
        for id in ["p1", "p2"] {
            let aggregate = Aggregate::new(id, &format!("Project {id}"), "Ostrava");
            let mut detail = AggregateDetail::empty(&aggregate);
            detail.categories.push(LineCategory::new(format!("{id}-c1"), "Zemní práce"));
            data.details_by_id.insert(aggregate.id.clone(), detail);
            data.aggregates.push(aggregate);
        }
        data
    }

    fn bid(status: BidStatus) -> Bid {
        let mut bid = Bid::new("b1", "p1-c1", "s1", "Kopex");
        bid.status = status;
        bid
    }

    #[test]
    fn add_aggregate_goes_first_with_empty_detail() {
        let mut data = dataset();
        let m = Mutation::AddAggregate {
            aggregate: Aggregate::new("p3", "Sklad", "Zlín"),
        };
        apply_mutation(&mut data, &m).unwrap();
        assert_eq!(data.aggregates[0].id, AggregateId::from("p3"));
        assert_eq!(data.detail(&"p3".into()).unwrap().title, "Sklad");
    }

    #[test]
    fn archive_updates_list_and_detail() {
        let mut data = dataset();
        let m = Mutation::SetAggregateStatus {
            aggregate_id: "p1".into(),
            status: AggregateStatus::Archived,
        };
        apply_mutation(&mut data, &m).unwrap();
        assert_eq!(data.aggregates[0].status, AggregateStatus::Archived);
        assert_eq!(
            data.detail(&"p1".into()).unwrap().status,
            AggregateStatus::Archived
        );
    }

    #[test]
    fn upsert_bid_inserts_then_replaces() {
        let mut data = dataset();
        let insert = Mutation::UpsertBid {
            aggregate_id: "p1".into(),
            bid: bid(BidStatus::Sent),
        };
        apply_mutation(&mut data, &insert).unwrap();

        let update = Mutation::UpsertBid {
            aggregate_id: "p1".into(),
            bid: bid(BidStatus::Shortlist),
        };
        apply_mutation(&mut data, &update).unwrap();

        let detail = data.detail(&"p1".into()).unwrap();
        assert_eq!(detail.bid_total(), 1);
        assert_eq!(detail.categories[0].bid_count, 1);
        assert_eq!(
            detail.bid(&"b1".into()).unwrap().status,
            BidStatus::Shortlist
        );
    }

    #[test]
    fn bid_into_unknown_category_is_rejected() {
        let mut data = dataset();
        let before = data.clone();
        let mut orphan = bid(BidStatus::Sent);
        orphan.category_id = "nope".into();
        let err = apply_mutation(
            &mut data,
            &Mutation::UpsertBid {
                aggregate_id: "p1".into(),
                bid: orphan,
            },
        )
        .unwrap_err();
        assert!(matches!(err, ApplyError::UnknownCategory { .. }));
        assert_eq!(data, before);
    }

    #[test]
    fn delete_category_drops_its_bids() {
        let mut data = dataset();
        apply_mutation(
            &mut data,
            &Mutation::UpsertBid {
                aggregate_id: "p1".into(),
                bid: bid(BidStatus::Offer),
            },
        )
        .unwrap();
        apply_mutation(
            &mut data,
            &Mutation::DeleteCategory {
                aggregate_id: "p1".into(),
                category_id: "p1-c1".into(),
            },
        )
        .unwrap();
        let detail = data.detail(&"p1".into()).unwrap();
        assert!(detail.categories.is_empty());
        assert_eq!(detail.bid_total(), 0);
    }

    #[test]
    fn duplicate_category_is_rejected() {
        let mut data = dataset();
        let err = apply_mutation(
            &mut data,
            &Mutation::AddCategory {
                aggregate_id: "p1".into(),
                category: LineCategory::new("p1-c1", "Again"),
            },
        )
        .unwrap_err();
        assert_eq!(err, ApplyError::DuplicateCategory("p1-c1".into()));
    }

    #[test]
    fn category_on_unhydrated_aggregate_reports_not_loaded() {
        let mut data = dataset();
        data.aggregates.push(Aggregate::new("p9", "Later", "Plzeň"));
        let err = apply_mutation(
            &mut data,
            &Mutation::AddCategory {
                aggregate_id: "p9".into(),
                category: LineCategory::new("x", "Střecha"),
            },
        )
        .unwrap_err();
        assert_eq!(err, ApplyError::DetailNotLoaded("p9".into()));
    }

    #[test]
    fn detail_patch_renames_list_entry() {
        let mut data = dataset();
        apply_mutation(
            &mut data,
            &Mutation::UpdateDetail {
                aggregate_id: "p2".into(),
                patch: DetailPatch {
                    title: Some("Renamed".into()),
                    contract: Some(ContractTerms::default()),
                    ..Default::default()
                },
            },
        )
        .unwrap();
        assert_eq!(data.aggregates[1].name, "Renamed");
        let detail = data.detail(&"p2".into()).unwrap();
        assert_eq!(detail.title, "Renamed");
        assert_eq!(detail.contract.as_ref().unwrap().warranty_months, 60);
    }

    #[test]
    fn contacts_get_default_specialization() {
        let mut data = dataset();
        let mut contact = ContactEntity::new("s1", "Kopex");
        contact.specializations = vec![" ".into()];
        apply_mutation(&mut data, &Mutation::AddContact { contact }).unwrap();
        assert_eq!(data.contacts[0].specializations, vec!["Other".to_string()]);
    }

    #[test]
    fn upsert_contacts_replaces_and_appends() {
        let mut data = dataset();
        data.contacts.push(ContactEntity::new("s1", "Old name"));
        apply_mutation(
            &mut data,
            &Mutation::UpsertContacts {
                contacts: vec![
                    ContactEntity::new("s1", "New name"),
                    ContactEntity::new("s2", "Second"),
                ],
            },
        )
        .unwrap();
        assert_eq!(data.contacts.len(), 2);
        assert_eq!(data.contacts[0].company, "New name");
    }

    #[test]
    fn rollback_restores_only_captured_slices() {
        let mut data = dataset();
        let m = Mutation::UpsertBid {
            aggregate_id: "p1".into(),
            bid: bid(BidStatus::Contracted),
        };
        let snapshot = SliceSnapshot::capture(&data, &m.affected());
        apply_mutation(&mut data, &m).unwrap();

        // A concurrent commit to another aggregate must survive the rollback.
        data.details_by_id
            .get_mut(&AggregateId::from("p2"))
            .unwrap()
            .title = "Hydrated meanwhile".into();

        snapshot.restore(&mut data);
        assert!(data.detail(&"p1".into()).unwrap().bid(&"b1".into()).is_none());
        assert_eq!(data.detail(&"p2".into()).unwrap().title, "Hydrated meanwhile");
    }

    #[test]
    fn rollback_of_add_and_delete_aggregate() {
        let mut data = dataset();
        let add = Mutation::AddAggregate {
            aggregate: Aggregate::new("p3", "New", "Kladno"),
        };
        let snapshot = SliceSnapshot::capture(&data, &add.affected());
        apply_mutation(&mut data, &add).unwrap();
        snapshot.restore(&mut data);
        assert!(data.aggregate(&"p3".into()).is_none());
        assert!(data.detail(&"p3".into()).is_none());

        let before = data.clone();
        let delete = Mutation::DeleteAggregate {
            aggregate_id: "p2".into(),
        };
        let snapshot = SliceSnapshot::capture(&data, &delete.affected());
        apply_mutation(&mut data, &delete).unwrap();
        snapshot.restore(&mut data);
        assert_eq!(data, before);
    }
}
