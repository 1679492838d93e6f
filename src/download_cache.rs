use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, anyhow};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::http_client::http_client;

const CACHE_VERSION: u32 = 1;
const CACHE_DIR: &str = "fantasy_forecast";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    version: u32,
    url: String,
    etag: Option<String>,
    last_modified: Option<String>,
    fetched_at: u64,
}

#[derive(Debug, Clone)]
pub struct DownloadCache {
    dir: PathBuf,
    refresh: bool,
}

impl DownloadCache {
    pub fn new(dir: PathBuf, refresh: bool) -> Self {
        Self { dir, refresh }
    }

    pub fn in_app_cache_dir(refresh: bool) -> Self {
        let dir = app_cache_dir().unwrap_or_else(|| std::env::temp_dir().join(CACHE_DIR));
        Self::new(dir, refresh)
    }

    /// Returns the local path of `url`'s body. Cached bodies are reused as-is
    /// unless the cache was built with `refresh`, in which case the server is
    /// asked to revalidate them.
    pub fn fetch(&self, url: &str) -> Result<PathBuf> {
        let body_path = self.body_path(url);
        let meta_path = self.meta_path(url);
        let cached = load_entry(&meta_path).filter(|entry| entry.url == url && body_path.exists());

        if let Some(entry) = cached.as_ref()
            && !self.refresh
        {
            debug!(url, fetched_at = entry.fetched_at, "using cached download");
            return Ok(body_path);
        }

        fs::create_dir_all(&self.dir)
            .with_context(|| format!("create cache dir {}", self.dir.display()))?;
        let client = http_client()?;
        download(client, url, cached.as_ref(), &body_path, &meta_path)?;
        Ok(body_path)
    }

    fn body_path(&self, url: &str) -> PathBuf {
        let key = cache_key(url);
        match url_extension(url) {
            Some(ext) => self.dir.join(format!("{key}.{ext}")),
            None => self.dir.join(format!("{key}.bin")),
        }
    }

    fn meta_path(&self, url: &str) -> PathBuf {
        self.dir.join(format!("{}.json", cache_key(url)))
    }
}

fn download(
    client: &Client,
    url: &str,
    cached: Option<&CacheEntry>,
    body_path: &Path,
    meta_path: &Path,
) -> Result<()> {
    let mut req = client.get(url);
    if let Some(entry) = cached {
        if let Some(etag) = entry.etag.as_ref() {
            req = req.header(IF_NONE_MATCH, etag);
        }
        if let Some(last_modified) = entry.last_modified.as_ref() {
            req = req.header(IF_MODIFIED_SINCE, last_modified);
        }
    }

    let resp = req.send().with_context(|| format!("request {url}"))?;
    let status = resp.status();
    if status == StatusCode::NOT_MODIFIED {
        if cached.is_none() {
            return Err(anyhow!("received 304 without cached body for {url}"));
        }
        info!(url, "cached download still current");
        return Ok(());
    }
    if !status.is_success() {
        return Err(anyhow!("http {status} for {url}"));
    }

    let headers = resp.headers().clone();
    let bytes = resp.bytes().with_context(|| format!("read body {url}"))?;

    let tmp = body_path.with_extension("tmp");
    fs::write(&tmp, &bytes).with_context(|| format!("write {}", tmp.display()))?;
    fs::rename(&tmp, body_path).with_context(|| format!("swap {}", body_path.display()))?;

    let entry = CacheEntry {
        version: CACHE_VERSION,
        url: url.to_string(),
        etag: headers
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string()),
        last_modified: headers
            .get(LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string()),
        fetched_at: system_time_to_secs(SystemTime::now()).unwrap_or_default(),
    };
    save_entry(meta_path, &entry)?;
    info!(url, bytes = bytes.len(), "downloaded");
    Ok(())
}

fn load_entry(path: &Path) -> Option<CacheEntry> {
    let raw = fs::read_to_string(path).ok()?;
    let entry = serde_json::from_str::<CacheEntry>(&raw).ok()?;
    (entry.version == CACHE_VERSION).then_some(entry)
}

fn save_entry(path: &Path, entry: &CacheEntry) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string(entry).context("serialize cache entry")?;
    fs::write(&tmp, json).context("write cache entry")?;
    fs::rename(&tmp, path).context("swap cache entry")?;
    Ok(())
}

pub fn app_cache_dir() -> Option<PathBuf> {
    if let Ok(base) = std::env::var("XDG_CACHE_HOME")
        && !base.trim().is_empty()
    {
        return Some(PathBuf::from(base).join(CACHE_DIR));
    }
    let home = std::env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".cache").join(CACHE_DIR))
}

fn cache_key(url: &str) -> String {
    Sha256::digest(url.as_bytes())
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

fn url_extension(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next()?;
    let file = path.rsplit('/').next()?;
    let (_, ext) = file.rsplit_once('.')?;
    let valid = !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric());
    valid.then_some(ext)
}

fn system_time_to_secs(time: SystemTime) -> Option<u64> {
    time.duration_since(UNIX_EPOCH).ok().map(|d| d.as_secs())
}
