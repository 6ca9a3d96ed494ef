//! Response shapes
//!
//! List endpoints use flat shapes with foreign keys by id. Retrieve, create
//! and update return the detail shape, which nests related records where a
//! client would otherwise need a second request.

use bb_common::db::{
    Atom, Camera, Dataset, Image, JsonMap, Lab, Project, Run, UserProfile,
};
use bb_common::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashMap;

use crate::db::{datasets, images, labs, projects, runs};

/// Image columns shared by the list and detail shapes
#[derive(Debug, Clone, Serialize)]
pub struct ImageFields {
    pub id: i64,
    pub name: String,
    pub created: DateTime<Utc>,
    pub notes: Option<String>,
    pub filepath: Option<String>,
    pub tags: JsonMap,
    pub thumbnail: Option<String>,
    pub total_atoms: Option<f64>,
    pub odpath: Option<String>,
    pub atomsperpixel: Option<String>,
    pub cropi: JsonMap,
    pub settings: JsonMap,
    pub pixel_size: Option<f64>,
    pub atom: Atom,
}

impl From<Image> for ImageFields {
    fn from(image: Image) -> Self {
        Self {
            id: image.id,
            name: image.name,
            created: image.created,
            notes: image.notes,
            filepath: image.filepath,
            tags: image.tags,
            thumbnail: image.thumbnail,
            total_atoms: image.total_atoms,
            odpath: image.odpath,
            atomsperpixel: image.atomsperpixel,
            cropi: image.cropi,
            settings: image.settings,
            pixel_size: image.pixel_size,
            atom: image.atom,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageListItem {
    #[serde(flatten)]
    pub fields: ImageFields,
    pub run: Option<i64>,
    pub lab: Option<i64>,
}

impl From<Image> for ImageListItem {
    fn from(image: Image) -> Self {
        let run = image.run_id;
        let lab = image.lab_id;
        Self {
            fields: image.into(),
            run,
            lab,
        }
    }
}

/// Run as nested in an image
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub id: i64,
    pub runtime: DateTime<Utc>,
    pub workday: NaiveDate,
    pub bad_shot: bool,
    pub parameters: JsonMap,
}

impl From<&Run> for RunSummary {
    fn from(run: &Run) -> Self {
        Self {
            id: run.id,
            runtime: run.runtime,
            workday: run.workday,
            bad_shot: run.bad_shot,
            parameters: run.parameters.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageDetail {
    #[serde(flatten)]
    pub fields: ImageFields,
    pub run: Option<RunSummary>,
    /// Lab name
    pub lab: Option<String>,
}

/// Detail shapes for a set of images, resolving each run and lab once
pub async fn image_details(pool: &SqlitePool, batch: Vec<Image>) -> Result<Vec<ImageDetail>> {
    let mut run_cache: HashMap<i64, Option<RunSummary>> = HashMap::new();
    let mut lab_cache: HashMap<i64, Option<String>> = HashMap::new();
    let mut details = Vec::with_capacity(batch.len());

    for image in batch {
        let run = match image.run_id {
            Some(id) => {
                if !run_cache.contains_key(&id) {
                    let summary = runs::get(pool, id).await?.as_ref().map(RunSummary::from);
                    run_cache.insert(id, summary);
                }
                run_cache.get(&id).cloned().flatten()
            }
            None => None,
        };
        let lab = match image.lab_id {
            Some(id) => {
                if !lab_cache.contains_key(&id) {
                    let name = labs::get(pool, id).await?.map(|lab| lab.name);
                    lab_cache.insert(id, name);
                }
                lab_cache.get(&id).cloned().flatten()
            }
            None => None,
        };
        details.push(ImageDetail {
            fields: image.into(),
            run,
            lab,
        });
    }
    Ok(details)
}

pub async fn image_detail(pool: &SqlitePool, image: Image) -> Result<ImageDetail> {
    let mut details = image_details(pool, vec![image]).await?;
    Ok(details.remove(0))
}

/// Image as nested in a run
#[derive(Debug, Clone, Serialize)]
pub struct ImageSummary {
    pub id: i64,
    pub name: String,
    pub created: DateTime<Utc>,
    pub filepath: Option<String>,
    pub atom: Atom,
}

impl From<Image> for ImageSummary {
    fn from(image: Image) -> Self {
        Self {
            id: image.id,
            name: image.name,
            created: image.created,
            filepath: image.filepath,
            atom: image.atom,
        }
    }
}

/// Run columns shared by the list and detail shapes
#[derive(Debug, Clone, Serialize)]
pub struct RunFields {
    pub id: i64,
    pub created: DateTime<Utc>,
    pub runtime: DateTime<Utc>,
    pub workday: NaiveDate,
    pub parameters: JsonMap,
    pub bad_shot: bool,
    pub notes: String,
    pub lab: Option<i64>,
    pub dataset: Option<i64>,
}

impl From<Run> for RunFields {
    fn from(run: Run) -> Self {
        Self {
            id: run.id,
            created: run.created,
            runtime: run.runtime,
            workday: run.workday,
            parameters: run.parameters,
            bad_shot: run.bad_shot,
            notes: run.notes,
            lab: run.lab_id,
            dataset: run.dataset_id,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunListItem {
    #[serde(flatten)]
    pub fields: RunFields,
    pub images: Vec<i64>,
}

pub async fn run_list_item(pool: &SqlitePool, run: Run) -> Result<RunListItem> {
    let images = runs::image_ids(pool, run.id).await?;
    Ok(RunListItem {
        fields: run.into(),
        images,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct RunDetail {
    #[serde(flatten)]
    pub fields: RunFields,
    pub images: Vec<ImageSummary>,
}

pub async fn run_detail(pool: &SqlitePool, run: Run) -> Result<RunDetail> {
    let images = images::list_for_run(pool, run.id)
        .await?
        .into_iter()
        .map(ImageSummary::from)
        .collect();
    Ok(RunDetail {
        fields: run.into(),
        images,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct LabView {
    pub id: i64,
    pub name: String,
    pub created: DateTime<Utc>,
    pub info: Option<String>,
    pub photo: Option<String>,
    pub runs: Vec<i64>,
    pub projects: Vec<i64>,
    pub userprofiles: Vec<i64>,
}

pub async fn lab_view(pool: &SqlitePool, lab: Lab) -> Result<LabView> {
    let relations = labs::relations(pool, lab.id).await?;
    Ok(LabView {
        id: lab.id,
        name: lab.name,
        created: lab.created,
        info: lab.info,
        photo: lab.photo,
        runs: relations.runs,
        projects: relations.projects,
        userprofiles: relations.userprofiles,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectView {
    pub id: i64,
    pub name: String,
    pub created: DateTime<Utc>,
    pub notes: String,
    pub lab: Option<i64>,
    pub datasets: Vec<i64>,
}

pub async fn project_view(pool: &SqlitePool, project: Project) -> Result<ProjectView> {
    let datasets = projects::dataset_ids(pool, project.id).await?;
    Ok(ProjectView {
        id: project.id,
        name: project.name,
        created: project.created,
        notes: project.notes,
        lab: project.lab_id,
        datasets,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetView {
    pub id: i64,
    pub name: String,
    pub created: DateTime<Utc>,
    pub notes: String,
    pub flag: String,
    pub tags: JsonMap,
    pub project: Option<i64>,
    pub lab: Option<i64>,
    pub runs: Vec<i64>,
}

pub async fn dataset_view(pool: &SqlitePool, dataset: Dataset) -> Result<DatasetView> {
    let runs = datasets::run_ids(pool, dataset.id).await?;
    Ok(DatasetView {
        id: dataset.id,
        name: dataset.name,
        created: dataset.created,
        notes: dataset.notes,
        flag: dataset.flag,
        tags: dataset.tags,
        project: dataset.project_id,
        lab: dataset.lab_id,
        runs,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct CameraView {
    pub id: i64,
    pub name: String,
    pub sdk_id: Option<String>,
    pub created: DateTime<Utc>,
    pub magnification: Option<f64>,
    pub axis: Option<String>,
    pub pixel_size: Option<f64>,
    pub double_imaging: bool,
    pub active: bool,
    pub calibration_dataset: Option<i64>,
    pub lab: Option<i64>,
}

impl From<Camera> for CameraView {
    fn from(camera: Camera) -> Self {
        Self {
            id: camera.id,
            name: camera.name,
            sdk_id: camera.sdk_id,
            created: camera.created,
            magnification: camera.magnification,
            axis: camera.axis,
            pixel_size: camera.pixel_size,
            double_imaging: camera.double_imaging,
            active: camera.active,
            calibration_dataset: camera.calibration_dataset_id,
            lab: camera.lab_id,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UserProfileView {
    pub id: i64,
    pub username: String,
    pub lab: Option<i64>,
    pub description: Option<String>,
}

impl From<UserProfile> for UserProfileView {
    fn from(profile: UserProfile) -> Self {
        Self {
            id: profile.id,
            username: profile.username,
            lab: profile.lab_id,
            description: profile.description,
        }
    }
}
