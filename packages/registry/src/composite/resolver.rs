use common::payload::{SubmittedDonor, SubmittedSample, SubmittedSpecimen};
use sea_orm::sea_query::OnConflict;
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, Set};
use serde::Serialize;
use tracing::debug;

use crate::entity::{donor, sample, specimen};
use crate::error::RegistryError;
use crate::ids::{EntityKind, IdAllocator};

/// Ids of the donor → specimen → sample chain a submitted sample resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSample {
    pub donor_id: String,
    pub specimen_id: String,
    pub sample_id: String,
}

/// A persisted sample together with its specimen and donor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompositeEntity {
    pub sample: sample::Model,
    pub specimen: specimen::Model,
    pub donor: donor::Model,
}

/// Indices of `samples` sorted by `(donor, specimen, sample)` submitter ids.
///
/// Resolving in this order makes every writer take the unique-key locks of the composite
/// tables in the same sequence, so two submissions naming the same keys in different orders
/// wait on each other instead of deadlocking. Equal keys keep their submitted order.
pub fn lock_order(samples: &[SubmittedSample]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..samples.len()).collect();
    order.sort_by(|&a, &b| {
        let key = |s: &SubmittedSample| {
            (
                s.donor.submitter_donor_id.clone(),
                s.specimen.submitter_specimen_id.clone(),
                s.submitter_sample_id.clone(),
            )
        };
        key(&samples[a]).cmp(&key(&samples[b]))
    });
    order
}

/// `Ok(true)` when an insert that ignores conflicts actually wrote a row.
fn inserted(result: Result<u64, DbErr>) -> Result<bool, DbErr> {
    match result {
        Ok(0) | Err(DbErr::RecordNotInserted) => Ok(false),
        Ok(_) => Ok(true),
        Err(e) => Err(e),
    }
}

/// Resolves submitted samples to persisted rows by business key.
///
/// Each level is looked up by its key within the parent. A miss inserts with a fresh id and
/// `ON CONFLICT DO NOTHING`; when that insert loses a race the next round finds the winner's
/// row. A hit keeps the id and overwrites differing non-key fields.
pub struct CompositeEntityResolver<'a, C: ConnectionTrait> {
    conn: &'a C,
    ids: &'a dyn IdAllocator,
    max_attempts: u32,
}

impl<'a, C: ConnectionTrait> CompositeEntityResolver<'a, C> {
    pub fn new(conn: &'a C, ids: &'a dyn IdAllocator, max_attempts: u32) -> Self {
        Self {
            conn,
            ids,
            max_attempts: max_attempts.max(1),
        }
    }

    pub async fn resolve_sample(
        &self,
        study_id: &str,
        submitted: &SubmittedSample,
    ) -> Result<ResolvedSample, RegistryError> {
        let donor_id = self.resolve_donor(study_id, &submitted.donor).await?;
        let specimen_id = self
            .resolve_specimen(&donor_id, &submitted.specimen)
            .await?;
        let sample_id = self.resolve_sample_row(&specimen_id, submitted).await?;
        Ok(ResolvedSample {
            donor_id,
            specimen_id,
            sample_id,
        })
    }

    async fn resolve_donor(
        &self,
        study_id: &str,
        submitted: &SubmittedDonor,
    ) -> Result<String, RegistryError> {
        let key = &submitted.submitter_donor_id;
        for attempt in 1..=self.max_attempts {
            let existing = donor::Entity::find()
                .filter(donor::Column::StudyId.eq(study_id))
                .filter(donor::Column::SubmitterDonorId.eq(key.as_str()))
                .one(self.conn)
                .await?;

            if let Some(existing) = existing {
                if existing.gender != submitted.gender || existing.info != submitted.info {
                    debug!(donor_id = %existing.id, "Overwriting donor attributes");
                    let mut active: donor::ActiveModel = existing.clone().into();
                    active.gender = Set(submitted.gender.clone());
                    active.info = Set(submitted.info.clone());
                    active.update(self.conn).await?;
                }
                return Ok(existing.id);
            }

            let id = self.ids.new_id(EntityKind::Donor);
            let model = donor::ActiveModel {
                id: Set(id.clone()),
                study_id: Set(study_id.to_string()),
                submitter_donor_id: Set(key.clone()),
                gender: Set(submitted.gender.clone()),
                info: Set(submitted.info.clone()),
            };
            let result = donor::Entity::insert(model)
                .on_conflict(
                    OnConflict::columns([
                        donor::Column::StudyId,
                        donor::Column::SubmitterDonorId,
                    ])
                    .do_nothing()
                    .to_owned(),
                )
                .exec_without_returning(self.conn)
                .await;
            if inserted(result)? {
                return Ok(id);
            }
            debug!(attempt, submitter_donor_id = %key, "Donor insert lost a race, re-reading");
        }
        Err(self.exhausted(EntityKind::Donor, key))
    }

    async fn resolve_specimen(
        &self,
        donor_id: &str,
        submitted: &SubmittedSpecimen,
    ) -> Result<String, RegistryError> {
        let key = &submitted.submitter_specimen_id;
        for attempt in 1..=self.max_attempts {
            let existing = specimen::Entity::find()
                .filter(specimen::Column::DonorId.eq(donor_id))
                .filter(specimen::Column::SubmitterSpecimenId.eq(key.as_str()))
                .one(self.conn)
                .await?;

            if let Some(existing) = existing {
                let stale = existing.specimen_type != submitted.specimen_type
                    || existing.specimen_tissue_source != submitted.specimen_tissue_source
                    || existing.tumour_normal_designation != submitted.tumour_normal_designation
                    || existing.info != submitted.info;
                if stale {
                    debug!(specimen_id = %existing.id, "Overwriting specimen attributes");
                    let mut active: specimen::ActiveModel = existing.clone().into();
                    active.specimen_type = Set(submitted.specimen_type.clone());
                    active.specimen_tissue_source = Set(submitted.specimen_tissue_source.clone());
                    active.tumour_normal_designation =
                        Set(submitted.tumour_normal_designation.clone());
                    active.info = Set(submitted.info.clone());
                    active.update(self.conn).await?;
                }
                return Ok(existing.id);
            }

            let id = self.ids.new_id(EntityKind::Specimen);
            let model = specimen::ActiveModel {
                id: Set(id.clone()),
                donor_id: Set(donor_id.to_string()),
                submitter_specimen_id: Set(key.clone()),
                specimen_type: Set(submitted.specimen_type.clone()),
                specimen_tissue_source: Set(submitted.specimen_tissue_source.clone()),
                tumour_normal_designation: Set(submitted.tumour_normal_designation.clone()),
                info: Set(submitted.info.clone()),
            };
            let result = specimen::Entity::insert(model)
                .on_conflict(
                    OnConflict::columns([
                        specimen::Column::DonorId,
                        specimen::Column::SubmitterSpecimenId,
                    ])
                    .do_nothing()
                    .to_owned(),
                )
                .exec_without_returning(self.conn)
                .await;
            if inserted(result)? {
                return Ok(id);
            }
            debug!(attempt, submitter_specimen_id = %key, "Specimen insert lost a race, re-reading");
        }
        Err(self.exhausted(EntityKind::Specimen, key))
    }

    async fn resolve_sample_row(
        &self,
        specimen_id: &str,
        submitted: &SubmittedSample,
    ) -> Result<String, RegistryError> {
        let key = &submitted.submitter_sample_id;
        for attempt in 1..=self.max_attempts {
            let existing = sample::Entity::find()
                .filter(sample::Column::SpecimenId.eq(specimen_id))
                .filter(sample::Column::SubmitterSampleId.eq(key.as_str()))
                .one(self.conn)
                .await?;

            if let Some(existing) = existing {
                let stale = existing.sample_type != submitted.sample_type
                    || existing.matched_normal_submitter_sample_id
                        != submitted.matched_normal_submitter_sample_id
                    || existing.info != submitted.info;
                if stale {
                    debug!(sample_id = %existing.id, "Overwriting sample attributes");
                    let mut active: sample::ActiveModel = existing.clone().into();
                    active.sample_type = Set(submitted.sample_type.clone());
                    active.matched_normal_submitter_sample_id =
                        Set(submitted.matched_normal_submitter_sample_id.clone());
                    active.info = Set(submitted.info.clone());
                    active.update(self.conn).await?;
                }
                return Ok(existing.id);
            }

            let id = self.ids.new_id(EntityKind::Sample);
            let model = sample::ActiveModel {
                id: Set(id.clone()),
                specimen_id: Set(specimen_id.to_string()),
                submitter_sample_id: Set(key.clone()),
                sample_type: Set(submitted.sample_type.clone()),
                matched_normal_submitter_sample_id: Set(
                    submitted.matched_normal_submitter_sample_id.clone()
                ),
                info: Set(submitted.info.clone()),
            };
            let result = sample::Entity::insert(model)
                .on_conflict(
                    OnConflict::columns([
                        sample::Column::SpecimenId,
                        sample::Column::SubmitterSampleId,
                    ])
                    .do_nothing()
                    .to_owned(),
                )
                .exec_without_returning(self.conn)
                .await;
            if inserted(result)? {
                return Ok(id);
            }
            debug!(attempt, submitter_sample_id = %key, "Sample insert lost a race, re-reading");
        }
        Err(self.exhausted(EntityKind::Sample, key))
    }

    fn exhausted(&self, kind: EntityKind, key: &str) -> RegistryError {
        RegistryError::Internal(format!(
            "could not resolve {kind} '{key}' after {} attempts",
            self.max_attempts
        ))
    }

    /// Reassemble one sample with its specimen and donor.
    pub async fn read(&self, sample_id: &str) -> Result<CompositeEntity, RegistryError> {
        let sample = sample::Entity::find_by_id(sample_id.to_string())
            .one(self.conn)
            .await?
            .ok_or_else(|| RegistryError::Internal(format!("sample '{sample_id}' is missing")))?;
        let specimen = specimen::Entity::find_by_id(sample.specimen_id.clone())
            .one(self.conn)
            .await?
            .ok_or_else(|| {
                RegistryError::Internal(format!("specimen '{}' is missing", sample.specimen_id))
            })?;
        let donor = donor::Entity::find_by_id(specimen.donor_id.clone())
            .one(self.conn)
            .await?
            .ok_or_else(|| {
                RegistryError::Internal(format!("donor '{}' is missing", specimen.donor_id))
            })?;
        Ok(CompositeEntity {
            sample,
            specimen,
            donor,
        })
    }
}
