//! Image/run reconciliation
//!
//! Given a batch of `(name, capture time)` pairs for one lab, make sure each
//! capture has exactly one canonical image record and link it to the run
//! whose runtime lies within the tolerance window of the capture time.
//!
//! Items are processed independently and in order. A failure on one item is
//! reported as a warning and does not undo or stop its siblings.

use bb_common::db::{Image, Lab};
use bb_common::{Error, Result};
use chrono::{DateTime, TimeDelta, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::db::images::{self, ImageMetadata, NewImage};
use crate::db::{labs, runs};
use crate::locks::KeyedLocks;
use crate::notify::{Notification, Notifier};

/// Captures to reconcile against one lab
#[derive(Debug, Clone)]
pub struct CaptureBatch {
    pub lab: String,
    pub names: Vec<String>,
    pub created: Vec<DateTime<Utc>>,
    /// Re-evaluate run links even where one is already set
    pub force_match: bool,
    /// Applied to images created by this batch
    pub metadata: ImageMetadata,
}

#[derive(Debug, Default)]
pub struct ReconcileOutcome {
    pub images: Vec<Image>,
    pub warnings: Vec<String>,
    /// Number of image records created
    pub created: usize,
}

impl ReconcileOutcome {
    fn warn(&mut self, message: String) {
        warn!("{}", message);
        self.warnings.push(message);
    }
}

/// Pick the canonical record among images sharing a capture key
///
/// The lowest id wins; the ids of the others are returned alongside.
pub fn pick_canonical(mut matches: Vec<Image>) -> Option<(Image, Vec<i64>)> {
    matches.sort_by_key(|image| image.id);
    let mut iter = matches.into_iter();
    let canonical = iter.next()?;
    Some((canonical, iter.map(|image| image.id).collect()))
}

pub struct Reconciler {
    pool: SqlitePool,
    notifier: Arc<dyn Notifier>,
    locks: KeyedLocks,
    tolerance: TimeDelta,
}

impl Reconciler {
    pub fn new(pool: SqlitePool, notifier: Arc<dyn Notifier>, tolerance: Duration) -> Result<Self> {
        let tolerance = TimeDelta::from_std(tolerance)
            .map_err(|_| Error::Config(format!("match tolerance out of range: {:?}", tolerance)))?;
        Ok(Self {
            pool,
            notifier,
            locks: KeyedLocks::new(),
            tolerance,
        })
    }

    pub fn tolerance(&self) -> TimeDelta {
        self.tolerance
    }

    /// Find or create every capture of the batch and link it to its run
    pub async fn reconcile(&self, batch: &CaptureBatch) -> Result<ReconcileOutcome> {
        if batch.names.len() != batch.created.len() {
            return Err(Error::InvalidInput(format!(
                "names and created must have the same length ({} != {})",
                batch.names.len(),
                batch.created.len()
            )));
        }
        let lab = labs::require_by_name(&self.pool, &batch.lab).await?;

        if !batch.force_match {
            if let Some(images) = self.existing_batch(&lab, batch).await? {
                info!(
                    lab = %lab.name,
                    count = images.len(),
                    "All captures already cataloged"
                );
                return Ok(ReconcileOutcome {
                    images,
                    ..Default::default()
                });
            }
        }

        let mut outcome = ReconcileOutcome::default();
        for (index, (name, created)) in batch.names.iter().zip(&batch.created).enumerate() {
            let _guard = self.locks.acquire(&KeyedLocks::image_key(lab.id, name)).await;
            match self.reconcile_one(&lab, name, *created, batch, &mut outcome).await {
                Ok(image) => outcome.images.push(image),
                Err(e) => outcome.warn(format!("item {} ('{}') failed: {}", index, name, e)),
            }
        }

        info!(
            lab = %lab.name,
            requested = batch.names.len(),
            returned = outcome.images.len(),
            created = outcome.created,
            warnings = outcome.warnings.len(),
            "Reconciled capture batch"
        );
        Ok(outcome)
    }

    /// The batch's images when every capture already has exactly one record
    async fn existing_batch(&self, lab: &Lab, batch: &CaptureBatch) -> Result<Option<Vec<Image>>> {
        let mut found = Vec::with_capacity(batch.names.len());
        for (name, created) in batch.names.iter().zip(&batch.created) {
            let mut matches = images::find_by_key(&self.pool, lab.id, name, *created).await?;
            if matches.len() != 1 {
                return Ok(None);
            }
            found.append(&mut matches);
        }
        Ok(Some(found))
    }

    async fn reconcile_one(
        &self,
        lab: &Lab,
        name: &str,
        created: DateTime<Utc>,
        batch: &CaptureBatch,
        outcome: &mut ReconcileOutcome,
    ) -> Result<Image> {
        let matches = images::find_by_key(&self.pool, lab.id, name, created).await?;
        let mut image = match pick_canonical(matches) {
            Some((canonical, discarded)) => {
                if !discarded.is_empty() {
                    outcome.warn(format!(
                        "duplicate images for '{}' at {}: using id {}, ignoring ids {:?}",
                        name,
                        bb_common::time::to_api(&created),
                        canonical.id,
                        discarded
                    ));
                }
                canonical
            }
            None => {
                let new_image =
                    NewImage::captured(name, created, lab.id, batch.metadata.clone());
                let image = images::insert(&self.pool, &new_image).await?;
                outcome.created += 1;
                self.notifier.publish(Notification {
                    lab: lab.name.clone(),
                    image_id: image.id,
                    message: image.name.clone(),
                });
                image
            }
        };

        if image.run_id.is_none() || batch.force_match {
            // The image is already stored; a failed link leaves it unlinked
            match self.link_run(lab, image.clone(), created, outcome).await {
                Ok(linked) => image = linked,
                Err(e) => outcome.warn(format!(
                    "image '{}' (id {}) kept without a run: {}",
                    image.name, image.id, e
                )),
            }
        }
        Ok(image)
    }

    async fn link_run(
        &self,
        lab: &Lab,
        image: Image,
        at: DateTime<Utc>,
        outcome: &mut ReconcileOutcome,
    ) -> Result<Image> {
        let candidates =
            runs::find_in_window(&self.pool, lab.id, at - self.tolerance, at + self.tolerance)
                .await?;

        let Some((run, others)) = candidates.split_first() else {
            outcome.warn(format!(
                "no run within {}s of {} for image '{}'",
                self.tolerance.num_seconds(),
                bb_common::time::to_api(&at),
                image.name
            ));
            return Ok(image);
        };

        if !others.is_empty() {
            outcome.warn(format!(
                "{} runs within {}s of image '{}': linked run {}",
                candidates.len(),
                self.tolerance.num_seconds(),
                image.name,
                run.id
            ));
        }
        if image.run_id == Some(run.id) {
            return Ok(image);
        }
        images::set_run(&self.pool, image.id, run.id).await
    }
}
