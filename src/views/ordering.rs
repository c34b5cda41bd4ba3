use database::tables::project;
use diesel::prelude::*;
use serde::Deserialize;
use utoipa::IntoParams;
use utoipa::ToSchema;

use atelier_models::prelude::DynOrderExpr;

#[derive(Debug, Clone, Copy, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ProjectOrderingParam {
    #[serde(default)]
    pub ordering: ProjectOrdering,
}

/// How a project listing is sorted
#[derive(Debug, Clone, Copy, Default, Deserialize, ToSchema)]
pub enum ProjectOrdering {
    NameAsc,
    NameDesc,
    CreationDateAsc,
    CreationDateDesc,
    LastModifiedAsc,
    #[default]
    LastModifiedDesc,
}

impl ProjectOrdering {
    pub fn as_project_ordering(&self) -> DynOrderExpr<project::table> {
        match self {
            ProjectOrdering::NameAsc => Box::new(project::name.asc()),
            ProjectOrdering::NameDesc => Box::new(project::name.desc()),
            ProjectOrdering::CreationDateAsc => Box::new(project::creation_date.asc()),
            ProjectOrdering::CreationDateDesc => Box::new(project::creation_date.desc()),
            ProjectOrdering::LastModifiedAsc => Box::new(project::last_modification.asc()),
            ProjectOrdering::LastModifiedDesc => Box::new(project::last_modification.desc()),
        }
    }
}
