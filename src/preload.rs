use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{bounded, RecvTimeoutError};
use image::ImageFormat;
use parking_lot::Mutex;
use reqwest::blocking::Client;

use crate::decorate::Entity;
use crate::logging::debug_log;

pub trait Preloader: Send + Sync {
    /// Warms the entity's image. Never fails: errors and timeouts still
    /// hand back the entity.
    fn preload(&self, entity: Entity) -> Entity;
}

#[derive(Debug, Clone)]
pub struct Config {
    pub timeout: Duration,
    pub max_entries: usize,
    pub http_client: Option<Client>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_entries: 32,
            http_client: None,
        }
    }
}

#[derive(Default)]
struct Entries {
    bytes: HashMap<String, Arc<[u8]>>,
    order: VecDeque<String>,
}

struct Inner {
    client: Client,
    max_entries: usize,
    entries: Mutex<Entries>,
}

#[derive(Clone)]
pub struct ImageCache {
    inner: Arc<Inner>,
    timeout: Duration,
}

impl ImageCache {
    pub fn new(cfg: Config) -> Result<Self> {
        let client = match cfg.http_client {
            Some(client) => client,
            None => Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .context("preload: build http client")?,
        };
        Ok(Self {
            inner: Arc::new(Inner {
                client,
                max_entries: cfg.max_entries.max(1),
                entries: Mutex::new(Entries::default()),
            }),
            timeout: cfg.timeout,
        })
    }

    pub fn get(&self, url: &str) -> Option<Arc<[u8]>> {
        self.inner.entries.lock().bytes.get(url).cloned()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.inner.entries.lock().bytes.contains_key(url)
    }

    pub fn len(&self) -> usize {
        self.inner.entries.lock().bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    pub(crate) fn insert(&self, url: String, bytes: Arc<[u8]>) {
        self.inner.insert(url, bytes);
    }
}

impl Preloader for ImageCache {
    fn preload(&self, entity: Entity) -> Entity {
        if entity.image.is_empty() || self.contains(&entity.image) {
            return entity;
        }

        let (tx, rx) = bounded(1);
        let inner = self.inner.clone();
        let url = entity.image.clone();
        // The worker outlives a timed-out wait and still fills the cache.
        thread::spawn(move || {
            let result = inner.fetch(&url).map(|bytes| inner.insert(url, bytes));
            let _ = tx.send(result);
        });

        match rx.recv_timeout(self.timeout) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => debug_log(format!("preload: {} failed: {err:#}", entity.image)),
            Err(RecvTimeoutError::Timeout) => debug_log(format!(
                "preload: {} still loading after {:?}",
                entity.image, self.timeout
            )),
            Err(RecvTimeoutError::Disconnected) => {
                debug_log(format!("preload: worker for {} vanished", entity.image))
            }
        }
        entity
    }
}

impl Inner {
    fn fetch(&self, url: &str) -> Result<Arc<[u8]>> {
        let response = self.client.get(url).send().context("preload: download")?;
        if !response.status().is_success() {
            return Err(anyhow!("preload: request failed: {}", response.status()));
        }
        let bytes = response.bytes().context("preload: body")?;
        let format = image::guess_format(&bytes).context("preload: not an image")?;
        if !matches!(
            format,
            ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::Gif | ImageFormat::WebP
        ) {
            return Err(anyhow!("preload: unsupported image format {format:?}"));
        }
        Ok(Arc::from(bytes.as_ref()))
    }

    fn insert(&self, url: String, bytes: Arc<[u8]>) {
        let mut entries = self.entries.lock();
        if entries.bytes.insert(url.clone(), bytes).is_none() {
            entries.order.push_back(url);
        }
        while entries.order.len() > self.max_entries {
            if let Some(oldest) = entries.order.pop_front() {
                entries.bytes.remove(&oldest);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::time::Instant;

    fn entity(image: &str) -> Entity {
        Entity {
            id: 25,
            name: "pikachu".into(),
            image: image.into(),
            category: "electric".into(),
        }
    }

    #[test]
    fn unreachable_image_still_resolves() {
        let cache = ImageCache::new(Config {
            timeout: Duration::from_secs(2),
            ..Config::default()
        })
        .unwrap();
        let input = entity("http://127.0.0.1:9/sprite.png");
        let output = cache.preload(input.clone());
        assert_eq!(output, input);
        assert!(cache.is_empty());
    }

    #[test]
    fn hung_image_server_times_out_with_the_entity() {
        // Accepted by the backlog but never answered.
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let cache = ImageCache::new(Config {
            timeout: Duration::from_millis(300),
            ..Config::default()
        })
        .unwrap();
        let input = entity(&format!("http://{addr}/sprite.png"));

        let started = Instant::now();
        let output = cache.preload(input.clone());
        let elapsed = started.elapsed();

        assert_eq!(output, input);
        assert!(elapsed >= Duration::from_millis(300), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(1), "{elapsed:?}");
        assert!(!cache.contains(&input.image));
    }

    #[test]
    fn cached_image_skips_the_download() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let addr = listener.local_addr().unwrap();
        let cache = ImageCache::new(Config {
            timeout: Duration::from_secs(5),
            ..Config::default()
        })
        .unwrap();
        let input = entity(&format!("http://{addr}/sprite.png"));
        cache.insert(input.image.clone(), Arc::from(&b"png"[..]));

        let started = Instant::now();
        assert_eq!(cache.preload(input.clone()), input);
        assert!(started.elapsed() < Duration::from_secs(1));

        thread::sleep(Duration::from_millis(100));
        let err = listener.accept().unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::WouldBlock);
    }

    #[test]
    fn evicts_oldest_entries_past_capacity() {
        let cache = ImageCache::new(Config {
            max_entries: 2,
            ..Config::default()
        })
        .unwrap();
        for url in ["a", "b", "c"] {
            cache.insert(url.into(), Arc::from(&b"png"[..]));
        }
        assert_eq!(cache.len(), 2);
        assert!(!cache.contains("a"));
        assert!(cache.contains("b"));
        assert!(cache.contains("c"));
    }

    #[test]
    fn empty_image_reference_is_passed_through() {
        let cache = ImageCache::new(Config::default()).unwrap();
        let input = entity("");
        assert_eq!(cache.preload(input.clone()), input);
    }
}
