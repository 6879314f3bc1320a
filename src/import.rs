//! Submission of prepared items and reconciliation of the backend's answer.
//!
//! The batch is never reordered between encoding and reconciliation, so the
//! indexes the backend returns always refer to positions in `items`.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;

use crate::api::{BatchOutcome, SyncClient};
use crate::record::ImportItem;
use crate::storage::ContentStager;

/// One rejected item as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub name: String,
    pub reason: String,
}

/// User-facing result of an import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportSummary {
    Imported { count: usize },
    /// The backend refused the whole batch; its message is shown verbatim.
    Rejected(String),
    /// Some or all items were refused with individual reasons.
    ItemsRejected {
        accepted: usize,
        failures: Vec<ItemFailure>,
    },
    Transport(String),
    /// An item could not be encoded, so nothing was sent.
    Invalid {
        index: usize,
        name: String,
        reason: String,
    },
}

impl fmt::Display for ImportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportSummary::Imported { .. } => f.write_str("All files got imported"),
            ImportSummary::Rejected(message) | ImportSummary::Transport(message) => {
                f.write_str(message)
            }
            ImportSummary::ItemsRejected { failures, .. } => {
                f.write_str("Some files are invalid:")?;
                for (n, failure) in failures.iter().enumerate() {
                    write!(f, "\n{}. {}: {}", n + 1, failure.name, failure.reason)?;
                }
                Ok(())
            }
            ImportSummary::Invalid { name, reason, .. } => {
                write!(f, "{name} cannot be submitted: {reason}")
            }
        }
    }
}

#[derive(Debug)]
pub struct ImportReport {
    pub summary: ImportSummary,
    /// Items the user still has to deal with, in original order, with their
    /// rejection text attached and staged files intact.
    pub retained: Vec<ImportItem>,
    /// Staged copies deleted after confirmation.
    pub cleaned: usize,
}

/// Items split by the backend's verdict.
#[derive(Debug, Default)]
pub struct Reconciled {
    pub confirmed: Vec<ImportItem>,
    pub retained: Vec<ImportItem>,
    /// Items that carry a rejection reason, in batch order.
    pub failures: Vec<ItemFailure>,
}

/// Partitions `items` according to `outcome`.
///
/// Rejections are looked up by original position, so every listed index
/// lands on exactly the item that was sent there. Only
/// [`BatchOutcome::AllAccepted`] and [`BatchOutcome::PartiallyAccepted`]
/// confirm anything.
pub fn reconcile(items: Vec<ImportItem>, outcome: &BatchOutcome) -> Reconciled {
    let reasons: HashMap<usize, &str> = outcome
        .rejections()
        .iter()
        .map(|r| (r.index, r.reason.as_str()))
        .collect();

    let mut reconciled = Reconciled::default();
    for (index, mut item) in items.into_iter().enumerate() {
        item.error = reasons.get(&index).map(|r| r.to_string());
        if let Some(reason) = &item.error {
            reconciled.failures.push(ItemFailure {
                name: item.display_name(index),
                reason: reason.clone(),
            });
        }

        let confirmed = match outcome {
            BatchOutcome::AllAccepted { .. } => true,
            BatchOutcome::PartiallyAccepted { .. } => item.error.is_none(),
            BatchOutcome::AllRejected { .. } | BatchOutcome::TransportError(_) => false,
        };

        if confirmed {
            reconciled.confirmed.push(item);
        } else {
            reconciled.retained.push(item);
        }
    }
    reconciled
}

/// Drives one submission: encode, send, reconcile, clean up.
#[derive(Debug, Clone)]
pub struct Importer {
    client: SyncClient,
    stager: ContentStager,
}

impl Importer {
    pub fn new(client: SyncClient, stager: ContentStager) -> Self {
        Self { client, stager }
    }

    /// Submits `items` as one batch.
    ///
    /// Staged files of confirmed items are deleted; everything else stays on
    /// disk so rejected items can be fixed and resubmitted without another
    /// upload.
    pub async fn import(&self, items: Vec<ImportItem>) -> ImportReport {
        if items.is_empty() {
            tracing::warn!("Import called with no items");
            return ImportReport {
                summary: ImportSummary::Imported { count: 0 },
                retained: items,
                cleaned: 0,
            };
        }

        let mut records = Vec::with_capacity(items.len());
        let mut unreadable = None;
        for (index, item) in items.iter().enumerate() {
            let mut record = item.record.clone();
            if let Some(staged) = &item.staged {
                match tokio::fs::read(&staged.storage_path).await {
                    Ok(bytes) => record.inline_audio = Some(bytes),
                    Err(e) => {
                        unreadable = Some((index, format!("staged file is no longer available ({e})")));
                        break;
                    }
                }
            }
            records.push(record);
        }
        if let Some((index, reason)) = unreadable {
            return invalid(items, index, reason);
        }

        let outcome = match self.client.submit(&records).await {
            Ok(outcome) => outcome,
            Err(e) => return invalid(items, e.index, e.source.to_string()),
        };
        let Reconciled {
            confirmed,
            retained,
            failures,
        } = reconcile(items, &outcome);

        let summary = match &outcome {
            BatchOutcome::AllAccepted { .. } => ImportSummary::Imported {
                count: confirmed.len(),
            },
            BatchOutcome::TransportError(message) => ImportSummary::Transport(message.clone()),
            BatchOutcome::AllRejected { reason, rejections } if rejections.is_empty() => {
                ImportSummary::Rejected(reason.clone())
            }
            // every listed index was dropped as unusable
            BatchOutcome::PartiallyAccepted { .. } if failures.is_empty() => {
                ImportSummary::Imported {
                    count: confirmed.len(),
                }
            }
            BatchOutcome::AllRejected { .. } | BatchOutcome::PartiallyAccepted { .. } => {
                ImportSummary::ItemsRejected {
                    accepted: confirmed.len(),
                    failures,
                }
            }
        };

        let cleaned = self.clean_up(&confirmed, &retained);
        tracing::info!(
            confirmed = confirmed.len(),
            retained = retained.len(),
            cleaned,
            "Import finished"
        );

        ImportReport {
            summary,
            retained,
            cleaned,
        }
    }

    /// Deletes staged copies of confirmed items. A path still referenced by a
    /// retained item (same content staged twice) is left alone.
    fn clean_up(&self, confirmed: &[ImportItem], retained: &[ImportItem]) -> usize {
        let still_needed: HashSet<&PathBuf> = retained
            .iter()
            .filter_map(|item| item.staged.as_ref())
            .map(|staged| &staged.storage_path)
            .collect();

        let mut cleaned = 0;
        for staged in confirmed.iter().filter_map(|item| item.staged.as_ref()) {
            if still_needed.contains(&staged.storage_path) {
                tracing::debug!(path = %staged.storage_path.display(), "Staged file shared with a retained item, keeping it");
                continue;
            }
            match self.stager.remove(staged) {
                Ok(true) => cleaned += 1,
                Ok(false) => {
                    tracing::debug!(path = %staged.storage_path.display(), "Staged file already removed")
                }
                Err(e) => {
                    tracing::warn!(path = %staged.storage_path.display(), error = %e, "Failed to remove staged file")
                }
            }
        }
        cleaned
    }
}

fn invalid(mut items: Vec<ImportItem>, index: usize, reason: String) -> ImportReport {
    let name = items
        .get(index)
        .map(|item| item.display_name(index))
        .unwrap_or_else(|| format!("Index {index}"));
    tracing::warn!(index, item = %name, reason = %reason, "Batch not submitted, item is invalid");

    if let Some(item) = items.get_mut(index) {
        item.error = Some(reason.clone());
    }
    ImportReport {
        summary: ImportSummary::Invalid {
            index,
            name,
            reason,
        },
        retained: items,
        cleaned: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ItemRejection;
    use crate::record::SubmissionRecord;
    use pretty_assertions::assert_eq;

    fn items(n: usize) -> Vec<ImportItem> {
        (0..n)
            .map(|i| {
                let mut record = SubmissionRecord::from_url(format!("https://cdn.example.com/{i}.mp3"), "Standard");
                record.title = format!("item {i}");
                ImportItem::new(record)
            })
            .collect()
    }

    fn titles(items: &[ImportItem]) -> Vec<&str> {
        items.iter().map(|i| i.record.title.as_str()).collect()
    }

    #[test]
    fn test_partial_rejection_splits_by_index() {
        let outcome = BatchOutcome::PartiallyAccepted {
            rejections: vec![ItemRejection::new(1, "bad duration")],
        };
        let reconciled = reconcile(items(3), &outcome);

        assert_eq!(titles(&reconciled.confirmed), vec!["item 0", "item 2"]);
        assert_eq!(titles(&reconciled.retained), vec!["item 1"]);
        assert_eq!(reconciled.retained[0].error.as_deref(), Some("bad duration"));
        assert_eq!(
            reconciled.failures,
            vec![ItemFailure {
                name: "item 1".to_string(),
                reason: "bad duration".to_string(),
            }]
        );
    }

    #[test]
    fn test_partial_without_usable_indexes_confirms_all() {
        let outcome = BatchOutcome::PartiallyAccepted {
            rejections: Vec::new(),
        };
        let reconciled = reconcile(items(2), &outcome);

        assert_eq!(reconciled.confirmed.len(), 2);
        assert!(reconciled.retained.is_empty());
        assert!(reconciled.failures.is_empty());
    }

    #[test]
    fn test_all_rejected_confirms_nothing() {
        let outcome = BatchOutcome::AllRejected {
            reason: "Payload too large. The limit is 10 bytes.".to_string(),
            rejections: Vec::new(),
        };
        let reconciled = reconcile(items(2), &outcome);

        assert!(reconciled.confirmed.is_empty());
        assert!(reconciled.retained.iter().all(|i| i.error.is_none()));
        assert!(reconciled.failures.is_empty());
    }

    #[test]
    fn test_transport_error_confirms_nothing() {
        let reconciled = reconcile(items(2), &BatchOutcome::TransportError("timeout".to_string()));
        assert!(reconciled.confirmed.is_empty());
        assert_eq!(reconciled.retained.len(), 2);
    }

    #[test]
    fn test_summary_lists_failures() {
        let summary = ImportSummary::ItemsRejected {
            accepted: 1,
            failures: vec![
                ItemFailure {
                    name: "a.mp3".to_string(),
                    reason: "no title".to_string(),
                },
                ItemFailure {
                    name: "Index 2".to_string(),
                    reason: "unknown".to_string(),
                },
            ],
        };
        assert_eq!(
            summary.to_string(),
            "Some files are invalid:\n1. a.mp3: no title\n2. Index 2: unknown"
        );
        assert_eq!(ImportSummary::Imported { count: 2 }.to_string(), "All files got imported");
    }
}
