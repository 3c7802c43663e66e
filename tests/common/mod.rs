#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use collection_gateway::config::AppConfig;
use collection_gateway::database::CollectionManager;
use collection_gateway::routing::AllowedHosts;
use collection_gateway::{server, Dispatcher};

/// A gateway serving a fresh temporary data root on a free local port
pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    data_root: TempDir,
    collections: Arc<CollectionManager>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<std::io::Result<()>>,
    client: reqwest::Client,
}

impl TestServer {
    pub async fn start() -> Result<Self> {
        Self::start_with(AllowedHosts::Any).await
    }

    pub async fn start_with(allowed_hosts: AllowedHosts) -> Result<Self> {
        let data_root = tempfile::tempdir().context("failed to create data root")?;
        Self::start_in(data_root, allowed_hosts).await
    }

    /// Serve an existing data root, e.g. one left behind by a stopped server
    pub async fn start_in(data_root: TempDir, allowed_hosts: AllowedHosts) -> Result<Self> {
        // Pick an unused port for isolation
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);

        let mut config = AppConfig::load(None)?;
        config.server.bind_address = "127.0.0.1".to_string();
        config.server.port = port;
        config.gateway.data_root = data_root.path().to_path_buf();
        config.gateway.allowed_hosts = allowed_hosts;
        config.prepare_data_root()?;

        let collections = Arc::new(
            CollectionManager::new(config.executor.queue_depth)
                .with_idle_timeout(config.idle_timeout()),
        );
        let dispatcher = Arc::new(Dispatcher::from_config(&config, collections.clone())?);

        // Bound before returning, so the server is ready as soon as we hand it out
        let listener = tokio::net::TcpListener::bind(config.bind_addr())
            .await
            .with_context(|| format!("failed to bind {}", config.bind_addr()))?;
        let (tx, rx) = oneshot::channel::<()>();
        let task = tokio::spawn(server::serve(listener, dispatcher, async {
            let _ = rx.await;
        }));

        Ok(Self {
            port,
            base_url,
            data_root,
            collections,
            shutdown: Some(tx),
            task,
            client: reqwest::Client::new(),
        })
    }

    pub fn data_root(&self) -> &Path {
        self.data_root.path()
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// POST a raw body
    pub async fn post(&self, path: &str, body: &str) -> Result<reqwest::Response> {
        Ok(self
            .client
            .post(self.url(path))
            .header("content-type", "application/json")
            .body(body.to_string())
            .send()
            .await?)
    }

    pub async fn post_json(&self, path: &str, body: &Value) -> Result<reqwest::Response> {
        Ok(self.client.post(self.url(path)).json(body).send().await?)
    }

    /// POST and decode a JSON response, failing on any non-200 status
    pub async fn call(&self, path: &str, body: &Value) -> Result<Value> {
        let res = self.post_json(path, body).await?;
        anyhow::ensure!(res.status().is_success(), "{} returned {}", path, res.status());
        Ok(res.json().await?)
    }

    /// Graceful shutdown; returns the data root so a new server can reopen it
    pub async fn stop(mut self) -> Result<TempDir> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.task.await??;
        self.collections.shutdown().await;
        Ok(self.data_root)
    }
}
