use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rand::Rng;

use crate::catalog::{CatalogService, FetchError, CATALOG_SIZE};
use crate::decorate::{self, Entity};
use crate::logging::debug_log;
use crate::preload::Preloader;

pub const MIN_LOADING: Duration = Duration::from_millis(2000);
const CANCEL_POLL: Duration = Duration::from_millis(25);

/// Shared flag marking one invocation as void.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Something the controller can run once per invocation.
pub trait Fetch: Send + Sync {
    fn run(&self, cancel: &CancelToken) -> Result<Entity, FetchError>;
}

#[derive(Debug, Clone, Copy)]
pub struct Options {
    pub catalog_size: u32,
    pub min_loading: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            catalog_size: CATALOG_SIZE,
            min_loading: MIN_LOADING,
        }
    }
}

pub struct Pipeline {
    catalog: Arc<dyn CatalogService>,
    preloader: Arc<dyn Preloader>,
    opts: Options,
}

impl Pipeline {
    pub fn new(
        catalog: Arc<dyn CatalogService>,
        preloader: Arc<dyn Preloader>,
        opts: Options,
    ) -> Self {
        Self {
            catalog,
            preloader,
            opts,
        }
    }

    pub fn pick_id(&self) -> u32 {
        rand::thread_rng().gen_range(0..self.opts.catalog_size.max(1))
    }
}

impl Fetch for Pipeline {
    fn run(&self, cancel: &CancelToken) -> Result<Entity, FetchError> {
        let started = Instant::now();
        let id = self.pick_id();
        debug_log(format!("pipeline: fetching record {id}"));

        let raw = self.catalog.record(id)?;
        let entity = decorate::decorate(raw)?;
        let entity = self.preloader.preload(entity);

        wait_out(started, self.opts.min_loading, cancel);
        Ok(entity)
    }
}

/// Sleeps until `floor` has passed since `started`, returning early once
/// `cancel` trips.
pub fn wait_out(started: Instant, floor: Duration, cancel: &CancelToken) {
    while !cancel.is_cancelled() {
        let Some(remaining) = floor.checked_sub(started.elapsed()) else {
            return;
        };
        if remaining.is_zero() {
            return;
        }
        thread::sleep(remaining.min(CANCEL_POLL));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{RawNamed, RawRecord, RawSprites, RawTypeSlot};
    use parking_lot::Mutex;
    use reqwest::StatusCode;

    struct Recorded {
        ids: Mutex<Vec<u32>>,
        fail_with: Option<StatusCode>,
    }

    impl CatalogService for Recorded {
        fn record(&self, id: u32) -> Result<RawRecord, FetchError> {
            self.ids.lock().push(id);
            if let Some(status) = self.fail_with {
                return Err(FetchError::Status(status));
            }
            Ok(RawRecord {
                id: i64::from(id),
                name: format!("mon-{id}"),
                sprites: RawSprites {
                    front_default: Some(format!("https://img.test/{id}.png")),
                },
                types: vec![RawTypeSlot {
                    slot: Some(1),
                    kind: RawNamed {
                        name: "water".into(),
                    },
                }],
            })
        }
    }

    struct Passthrough;

    impl Preloader for Passthrough {
        fn preload(&self, entity: Entity) -> Entity {
            entity
        }
    }

    fn pipeline(fail_with: Option<StatusCode>, opts: Options) -> (Pipeline, Arc<Recorded>) {
        let catalog = Arc::new(Recorded {
            ids: Mutex::new(Vec::new()),
            fail_with,
        });
        (
            Pipeline::new(catalog.clone(), Arc::new(Passthrough), opts),
            catalog,
        )
    }

    #[test]
    fn ids_stay_within_catalog_range() {
        let (pipeline, _) = pipeline(
            None,
            Options {
                catalog_size: 3,
                min_loading: Duration::ZERO,
            },
        );
        for _ in 0..200 {
            assert!(pipeline.pick_id() < 3);
        }
    }

    #[test]
    fn waits_out_minimum_duration() {
        let floor = Duration::from_millis(150);
        let (pipeline, catalog) = pipeline(
            None,
            Options {
                catalog_size: CATALOG_SIZE,
                min_loading: floor,
            },
        );
        let started = Instant::now();
        let entity = pipeline.run(&CancelToken::new()).unwrap();
        assert!(started.elapsed() >= floor);
        assert_eq!(entity.category, "water");
        assert_eq!(catalog.ids.lock().len(), 1);
    }

    #[test]
    fn failures_skip_the_delay() {
        let (pipeline, _) = pipeline(
            Some(StatusCode::NOT_FOUND),
            Options {
                catalog_size: CATALOG_SIZE,
                min_loading: Duration::from_secs(30),
            },
        );
        let started = Instant::now();
        let err = pipeline.run(&CancelToken::new()).unwrap_err();
        assert!(matches!(err, FetchError::Status(StatusCode::NOT_FOUND)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn cancelled_wait_returns_early() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let started = Instant::now();
        wait_out(started, Duration::from_secs(30), &cancel);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn slow_steps_add_no_extra_delay() {
        let started = Instant::now() - Duration::from_millis(500);
        let before = Instant::now();
        wait_out(started, Duration::from_millis(100), &CancelToken::new());
        assert!(before.elapsed() < Duration::from_millis(50));
    }
}
