//! Filesystem-backed collaborators used by the `dispatch` subcommand.
//!
//! A model directory holds the unit identity, the charm configuration, secrets and relation data:
//!
//! ```text
//! <model>/unit.yaml                          app-name, namespace, leader
//! <model>/config.yaml                        charm configuration options
//! <model>/status                             last reported status
//! <model>/secrets/<label>
//! <model>/relations/<endpoint>/<id>/remote-app
//! <model>/relations/<endpoint>/<id>/remote.yaml
//! <model>/relations/<endpoint>/<id>/local.yaml
//! ```
//!
//! A workload root stands in for the container filesystem, with the Pebble state kept under
//! `.pebble/`.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use serde::{de::DeserializeOwned, Deserialize};
use snafu::{ensure, ResultExt};
use tokio::{fs, io::AsyncWriteExt};

use crate::{
    backend::{
        self, ParseSnafu, ReadSnafu, RestartCommandFailedSnafu, RunRestartCommandSnafu,
        SerializeSnafu, UnknownRelationSnafu, WriteSnafu,
    },
    config::CharmConfig,
    layer::Layer,
    relations::{Relation, RelationData, RelationStore},
    state::SecretStore,
    status::Status,
    unit::Unit,
    workload::Workload,
};

type Result<T, E = backend::Error> = std::result::Result<T, E>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct UnitFile {
    app_name: String,
    namespace: String,
    #[serde(default)]
    leader: bool,
}

/// The collaborators backed by one model directory.
pub struct LocalModel {
    pub unit: LocalUnit,
    pub secrets: LocalSecrets,
    pub relations: LocalRelations,
    pub config: CharmConfig,
}

impl LocalModel {
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let unit_path = dir.join("unit.yaml");
        let content = fs::read(&unit_path)
            .await
            .context(ReadSnafu { path: &unit_path })?;
        let unit: UnitFile =
            serde_yaml::from_slice(&content).context(ParseSnafu { path: &unit_path })?;
        let config = read_yaml(&dir.join("config.yaml"))
            .await?
            .unwrap_or_default();
        Ok(Self {
            unit: LocalUnit {
                status_path: dir.join("status"),
                app_name: unit.app_name,
                namespace: unit.namespace,
                leader: unit.leader,
            },
            secrets: LocalSecrets {
                dir: dir.join("secrets"),
            },
            relations: LocalRelations {
                dir: dir.join("relations"),
            },
            config,
        })
    }
}

pub struct LocalUnit {
    app_name: String,
    namespace: String,
    leader: bool,
    status_path: PathBuf,
}

impl Unit for LocalUnit {
    fn app_name(&self) -> &str {
        &self.app_name
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn is_leader(&self) -> Result<bool> {
        Ok(self.leader)
    }

    async fn set_status(&self, status: &Status) -> Result<()> {
        write(&self.status_path, status.to_string().as_bytes()).await
    }
}

pub struct LocalSecrets {
    dir: PathBuf,
}

impl SecretStore for LocalSecrets {
    async fn get(&self, label: &str) -> Result<Option<Vec<u8>>> {
        read_optional(&self.dir.join(label)).await
    }

    async fn put(&self, label: &str, content: Vec<u8>) -> Result<()> {
        write(&self.dir.join(label), &content).await
    }

    async fn delete(&self, label: &str) -> Result<bool> {
        let path = self.dir.join(label);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(source) => Err(backend::Error::Remove { source, path }),
        }
    }
}

pub struct LocalRelations {
    dir: PathBuf,
}

impl LocalRelations {
    async fn relation(&self, endpoint: &str, id: u32) -> Result<Relation> {
        let dir = self.dir.join(endpoint).join(id.to_string());
        let remote_app = read_optional(&dir.join("remote-app"))
            .await?
            .map(|app| String::from_utf8_lossy(&app).trim().to_string())
            .filter(|app| !app.is_empty());
        Ok(Relation {
            id,
            remote_app,
            remote_app_data: read_yaml(&dir.join("remote.yaml"))
                .await?
                .unwrap_or_default(),
            app_data: read_yaml(&dir.join("local.yaml")).await?.unwrap_or_default(),
        })
    }
}

impl RelationStore for LocalRelations {
    async fn relations(&self, endpoint: &str) -> Result<Vec<Relation>> {
        let dir = self.dir.join(endpoint);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(backend::Error::Read { source, path: dir }),
        };
        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .context(ReadSnafu { path: &dir })?
        {
            if let Some(id) = entry.file_name().to_str().and_then(|name| name.parse().ok()) {
                ids.push(id);
            }
        }
        ids.sort_unstable();

        let mut relations = Vec::with_capacity(ids.len());
        for id in ids {
            relations.push(self.relation(endpoint, id).await?);
        }
        Ok(relations)
    }

    async fn update_app_data(
        &self,
        endpoint: &str,
        relation_id: u32,
        data: RelationData,
    ) -> Result<()> {
        let dir = self.dir.join(endpoint).join(relation_id.to_string());
        ensure!(
            fs::metadata(&dir).await.is_ok_and(|meta| meta.is_dir()),
            UnknownRelationSnafu {
                endpoint,
                relation_id
            }
        );
        let path = dir.join("local.yaml");
        let mut app_data: RelationData = read_yaml(&path).await?.unwrap_or_default();
        app_data.extend(data);
        let content = serde_yaml::to_string(&app_data).context(SerializeSnafu {
            what: "relation data",
        })?;
        write(&path, content.as_bytes()).await
    }
}

/// A directory standing in for the Dex container.
pub struct LocalWorkload {
    root: PathBuf,
    restart_command: Option<String>,
}

impl LocalWorkload {
    /// `restart_command` is run through `sh -c` whenever the service is restarted.
    pub fn new(root: impl Into<PathBuf>, restart_command: Option<String>) -> Self {
        Self {
            root: root.into(),
            restart_command,
        }
    }

    fn pebble_dir(&self) -> PathBuf {
        self.root.join(".pebble")
    }

    fn path(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

impl Workload for LocalWorkload {
    async fn can_connect(&self) -> bool {
        fs::metadata(&self.root)
            .await
            .is_ok_and(|meta| meta.is_dir())
    }

    async fn layer(&self) -> Result<Layer> {
        Ok(read_yaml(&self.pebble_dir().join("layer.yaml"))
            .await?
            .unwrap_or_default())
    }

    async fn replace_layer(&self, layer: &Layer) -> Result<()> {
        let content = serde_yaml::to_string(layer).context(SerializeSnafu { what: "layer" })?;
        write(&self.pebble_dir().join("layer.yaml"), content.as_bytes()).await
    }

    async fn pull(&self, path: &str) -> Result<Option<Vec<u8>>> {
        read_optional(&self.path(path)).await
    }

    async fn push(&self, path: &str, content: &[u8]) -> Result<()> {
        write(&self.path(path), content).await
    }

    async fn restart(&self, service: &str) -> Result<()> {
        let log = self.pebble_dir().join("restarts");
        create_parent(&log).await?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log)
            .await
            .context(WriteSnafu { path: &log })?;
        file.write_all(format!("{service}\n").as_bytes())
            .await
            .context(WriteSnafu { path: &log })?;

        if let Some(command) = &self.restart_command {
            let status = tokio::process::Command::new("sh")
                .arg("-c")
                .arg(command)
                .status()
                .await
                .context(RunRestartCommandSnafu { command })?;
            ensure!(
                status.success(),
                RestartCommandFailedSnafu { command, status }
            );
        }
        Ok(())
    }
}

async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path).await {
        Ok(content) => Ok(Some(content)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(source) => Err(backend::Error::Read {
            source,
            path: path.to_owned(),
        }),
    }
}

async fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    read_optional(path)
        .await?
        .map(|content| serde_yaml::from_slice(&content).context(ParseSnafu { path }))
        .transpose()
}

async fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .context(WriteSnafu { path: parent })?;
    }
    Ok(())
}

async fn write(path: &Path, content: &[u8]) -> Result<()> {
    create_parent(path).await?;
    fs::write(path, content)
        .await
        .context(WriteSnafu { path })
}
