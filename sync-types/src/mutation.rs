//! User-initiated mutations and their reconciliation metadata.
//!
//! A [`Mutation`] is both the optimistic local change and the payload of the
//! remote write. Each kind declares which state slices it touches, how a
//! failed write is reconciled, and whether it triggers an outbound sync.

use serde::{Deserialize, Serialize};

use crate::ids::{AggregateId, CategoryId, ContactId};
use crate::model::{
    Aggregate, AggregateStatus, Bid, ContactEntity, ContractTerms, FinancialSummary,
    IntegrationSettings, LineCategory, StatusConfig,
};
use crate::sync::SyncRequest;

/// Field-level patch of an aggregate's detail. `None` fields are untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DetailPatch {
    /// Replace the project title (also renames the list entry).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Replace the site location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Replace the contract terms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract: Option<ContractTerms>,
    /// Replace the financial summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub financials: Option<FinancialSummary>,
    /// Replace the integration settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integration: Option<IntegrationSettings>,
}

impl DetailPatch {
    /// Whether the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.location.is_none()
            && self.contract.is_none()
            && self.financials.is_none()
            && self.integration.is_none()
    }
}

/// A user-initiated change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Mutation {
    /// Create a project and its empty detail.
    AddAggregate {
        /// The new project.
        aggregate: Aggregate,
    },
    /// Delete a project and its detail.
    DeleteAggregate {
        /// Project to delete.
        aggregate_id: AggregateId,
    },
    /// Change a project's lifecycle status (archive toggle).
    SetAggregateStatus {
        /// Project to update.
        aggregate_id: AggregateId,
        /// New status.
        status: AggregateStatus,
    },
    /// Patch contract terms, financials or integration settings.
    UpdateDetail {
        /// Project to update.
        aggregate_id: AggregateId,
        /// Fields to replace.
        patch: DetailPatch,
    },
    /// Create a demand category.
    AddCategory {
        /// Owning project.
        aggregate_id: AggregateId,
        /// The new category.
        category: LineCategory,
    },
    /// Replace a demand category's fields.
    EditCategory {
        /// Owning project.
        aggregate_id: AggregateId,
        /// The edited category.
        category: LineCategory,
    },
    /// Delete a demand category and its bids.
    DeleteCategory {
        /// Owning project.
        aggregate_id: AggregateId,
        /// Category to delete.
        category_id: CategoryId,
    },
    /// Insert or replace a bid (status and signed changes included).
    UpsertBid {
        /// Owning project.
        aggregate_id: AggregateId,
        /// The bid as it should be stored.
        bid: Bid,
    },
    /// Create a contact.
    AddContact {
        /// The new contact.
        contact: ContactEntity,
    },
    /// Replace a contact.
    UpdateContact {
        /// The edited contact.
        contact: ContactEntity,
    },
    /// Delete contacts by id.
    DeleteContacts {
        /// Contacts to delete.
        ids: Vec<ContactId>,
    },
    /// Insert or replace many contacts (imports, merges).
    UpsertContacts {
        /// Contacts to store.
        contacts: Vec<ContactEntity>,
    },
    /// Replace the contact status taxonomy.
    SetStatuses {
        /// The full taxonomy.
        statuses: Vec<StatusConfig>,
    },
}

/// How a failed remote write is reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Silently refetch the affected slices, discarding the optimistic value.
    Reload,
    /// Restore the slices captured before the optimistic apply.
    Rollback,
}

/// A region of shared state that one mutation may touch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Slice {
    /// One entry of the aggregate list, including its position.
    ListEntry(AggregateId),
    /// One aggregate's detail.
    Detail(AggregateId),
    /// The contact collection.
    Contacts,
    /// The contact status taxonomy.
    Statuses,
}

impl Mutation {
    /// Short action name used in logs and failure alerts.
    pub fn label(&self) -> &'static str {
        match self {
            Self::AddAggregate { .. } => "add project",
            Self::DeleteAggregate { .. } => "delete project",
            Self::SetAggregateStatus { .. } => "change project status",
            Self::UpdateDetail { .. } => "update project detail",
            Self::AddCategory { .. } => "add category",
            Self::EditCategory { .. } => "edit category",
            Self::DeleteCategory { .. } => "delete category",
            Self::UpsertBid { .. } => "update bid",
            Self::AddContact { .. } => "add contact",
            Self::UpdateContact { .. } => "update contact",
            Self::DeleteContacts { .. } => "delete contacts",
            Self::UpsertContacts { .. } => "import contacts",
            Self::SetStatuses { .. } => "update contact statuses",
        }
    }

    /// The aggregate this mutation targets, if any.
    pub fn aggregate_id(&self) -> Option<&AggregateId> {
        match self {
            Self::AddAggregate { aggregate } => Some(&aggregate.id),
            Self::DeleteAggregate { aggregate_id }
            | Self::SetAggregateStatus { aggregate_id, .. }
            | Self::UpdateDetail { aggregate_id, .. }
            | Self::AddCategory { aggregate_id, .. }
            | Self::EditCategory { aggregate_id, .. }
            | Self::DeleteCategory { aggregate_id, .. }
            | Self::UpsertBid { aggregate_id, .. } => Some(aggregate_id),
            Self::AddContact { .. }
            | Self::UpdateContact { .. }
            | Self::DeleteContacts { .. }
            | Self::UpsertContacts { .. }
            | Self::SetStatuses { .. } => None,
        }
    }

    /// Slices of shared state this mutation reads and writes.
    pub fn affected(&self) -> Vec<Slice> {
        match self {
            Self::AddAggregate { aggregate } => {
                vec![
                    Slice::ListEntry(aggregate.id.clone()),
                    Slice::Detail(aggregate.id.clone()),
                ]
            }
            Self::DeleteAggregate { aggregate_id }
            | Self::SetAggregateStatus { aggregate_id, .. } => {
                vec![
                    Slice::ListEntry(aggregate_id.clone()),
                    Slice::Detail(aggregate_id.clone()),
                ]
            }
            Self::UpdateDetail {
                aggregate_id,
                patch,
            } => {
                if patch.title.is_some() || patch.location.is_some() {
                    vec![
                        Slice::ListEntry(aggregate_id.clone()),
                        Slice::Detail(aggregate_id.clone()),
                    ]
                } else {
                    vec![Slice::Detail(aggregate_id.clone())]
                }
            }
            Self::AddCategory { aggregate_id, .. }
            | Self::EditCategory { aggregate_id, .. }
            | Self::DeleteCategory { aggregate_id, .. }
            | Self::UpsertBid { aggregate_id, .. } => vec![Slice::Detail(aggregate_id.clone())],
            Self::AddContact { .. }
            | Self::UpdateContact { .. }
            | Self::DeleteContacts { .. }
            | Self::UpsertContacts { .. } => vec![Slice::Contacts],
            Self::SetStatuses { .. } => vec![Slice::Statuses],
        }
    }

    /// Reconciliation strategy when the remote write fails.
    ///
    /// Category changes are reloaded from the store; everything else is
    /// rolled back to the captured snapshot.
    pub fn recovery(&self) -> Recovery {
        match self {
            Self::AddCategory { .. } | Self::EditCategory { .. } | Self::DeleteCategory { .. } => {
                Recovery::Reload
            }
            _ => Recovery::Rollback,
        }
    }

    /// Outbound integration request to enqueue after a successful write.
    pub fn external_sync(&self) -> Option<SyncRequest> {
        match self {
            Self::AddCategory {
                aggregate_id,
                category,
            }
            | Self::EditCategory {
                aggregate_id,
                category,
            } => Some(SyncRequest::upsert(
                aggregate_id.clone(),
                category.id.clone(),
                &category.title,
            )),
            Self::DeleteCategory {
                aggregate_id,
                category_id,
            } => Some(SyncRequest::archive(
                aggregate_id.clone(),
                category_id.clone(),
            )),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::SyncAction;

    fn add_category() -> Mutation {
        Mutation::AddCategory {
            aggregate_id: "p1".into(),
            category: LineCategory::new("c1", "Elektro"),
        }
    }

    #[test]
    fn category_mutations_reload_and_sync() {
        let m = add_category();
        assert_eq!(m.recovery(), Recovery::Reload);
        let req = m.external_sync().unwrap();
        assert_eq!(req.action, SyncAction::Upsert);
        assert_eq!(req.category_title.as_deref(), Some("Elektro"));

        let delete = Mutation::DeleteCategory {
            aggregate_id: "p1".into(),
            category_id: "c1".into(),
        };
        assert_eq!(delete.recovery(), Recovery::Reload);
        assert_eq!(delete.external_sync().unwrap().action, SyncAction::Archive);
    }

    #[test]
    fn bid_and_contact_mutations_roll_back_without_sync() {
        let bid = Mutation::UpsertBid {
            aggregate_id: "p1".into(),
            bid: Bid::new("b1", "c1", "s1", "Firma"),
        };
        assert_eq!(bid.recovery(), Recovery::Rollback);
        assert!(bid.external_sync().is_none());
        assert_eq!(bid.affected(), vec![Slice::Detail("p1".into())]);

        let contacts = Mutation::DeleteContacts {
            ids: vec!["s1".into()],
        };
        assert_eq!(contacts.recovery(), Recovery::Rollback);
        assert_eq!(contacts.affected(), vec![Slice::Contacts]);
        assert!(contacts.aggregate_id().is_none());
    }

    #[test]
    fn aggregate_mutations_touch_list_and_detail() {
        let m = Mutation::SetAggregateStatus {
            aggregate_id: "p1".into(),
            status: AggregateStatus::Archived,
        };
        assert_eq!(
            m.affected(),
            vec![Slice::ListEntry("p1".into()), Slice::Detail("p1".into())]
        );
    }

    #[test]
    fn detail_patch_touches_list_only_when_renaming() {
        let contract_only = Mutation::UpdateDetail {
            aggregate_id: "p1".into(),
            patch: DetailPatch {
                contract: Some(ContractTerms::default()),
                ..Default::default()
            },
        };
        assert_eq!(contract_only.affected(), vec![Slice::Detail("p1".into())]);

        let rename = Mutation::UpdateDetail {
            aggregate_id: "p1".into(),
            patch: DetailPatch {
                title: Some("Nový název".to_string()),
                ..Default::default()
            },
        };
        assert_eq!(rename.affected().len(), 2);
    }

    #[test]
    fn mutation_serializes_with_kind_tag() {
        let json = serde_json::to_value(add_category()).unwrap();
        assert_eq!(json["kind"], "add_category");
        assert_eq!(json["aggregate_id"], "p1");
    }
}
