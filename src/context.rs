use std::path::PathBuf;

use fs_err as fs;
use log::{debug, info};

use crate::{
    error::WorkflowError,
    options::Global,
    shotgrid_api::{get_client, EntityType, Filter, Project, ShotgridApiClient},
};

/// The local directories the workflows read from and write into.
#[derive(Debug, Clone)]
pub struct Directories {
    pub download_dir: PathBuf,
    pub temp_dir: PathBuf,
}

impl Directories {
    pub fn create_all(&self) -> Result<(), WorkflowError> {
        fs::create_dir_all(&self.download_dir)?;
        fs::create_dir_all(&self.temp_dir)?;
        Ok(())
    }
}

/// An authenticated session bound to the one project every operation works
/// in. Built once at startup and handed to each command.
pub struct ProjectContext {
    pub client: Box<dyn ShotgridApiClient>,
    pub project_id: u64,
    pub project_name: String,
    pub directories: Directories,
}

impl ProjectContext {
    pub async fn connect(global: &Global) -> Result<Self, WorkflowError> {
        let directories = Directories {
            download_dir: global.download_dir.clone(),
            temp_dir: global.temp_dir.clone(),
        };
        directories.create_all()?;

        debug!("Connecting to {} as {}", global.server_url, global.script_name);
        let client = get_client(global.credentials()).await?;

        Self::resolve(client, &global.project, directories).await
    }

    /// Look up `project_name` through an already authenticated client.
    pub async fn resolve(
        client: Box<dyn ShotgridApiClient>,
        project_name: &str,
        directories: Directories,
    ) -> Result<Self, WorkflowError> {
        let project = client
            .find_one(
                EntityType::Project,
                &[Filter::is("name", project_name)],
                &["id", "name"],
            )
            .await?
            .map(Project::from)
            .ok_or_else(|| WorkflowError::ProjectNotFound(project_name.to_owned()))?;

        info!("Loaded project {} (ID: {})", project_name, project.id);

        Ok(Self {
            client,
            project_id: project.id,
            project_name: project_name.to_owned(),
            directories,
        })
    }

    pub fn project_link(&self) -> serde_json::Value {
        EntityType::Project.link(self.project_id)
    }
}
