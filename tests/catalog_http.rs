use std::io::Cursor;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver};
use image::{ImageBuffer, ImageFormat, Rgba};
use reqwest::StatusCode;
use tiny_http::{Response, Server};

use pokedex_tui::catalog::{CatalogService, Client, ClientConfig, FetchError};
use pokedex_tui::controller::Controller;
use pokedex_tui::machine::{Intent, State};
use pokedex_tui::pipeline::{self, Pipeline};
use pokedex_tui::preload::{self, ImageCache, Preloader};

enum Reply {
    Json(u16, String),
    Bytes(Vec<u8>),
}

/// Serves `handler` on an ephemeral port and reports every requested path.
fn serve<F>(requests: usize, handler: F) -> (String, Receiver<String>)
where
    F: Fn(&str, &str) -> Reply + Send + 'static,
{
    let server = Server::http("127.0.0.1:0").expect("bind test server");
    let addr = server.server_addr().to_ip().expect("ip listener");
    let base = format!("http://{addr}");
    let (tx, rx) = unbounded();
    let origin = base.clone();
    thread::spawn(move || {
        for request in server.incoming_requests().take(requests) {
            let path = request.url().to_string();
            let _ = tx.send(path.clone());
            let _ = match handler(&origin, &path) {
                Reply::Json(status, body) => {
                    request.respond(Response::from_string(body).with_status_code(status))
                }
                Reply::Bytes(bytes) => request.respond(Response::from_data(bytes)),
            };
        }
    });
    (base, rx)
}

fn pikachu_json(origin: &str) -> String {
    format!(
        r#"{{"id":25,"name":"pikachu","sprites":{{"front_default":"{origin}/sprites/25.png"}},"types":[{{"slot":1,"type":{{"name":"electric"}}}}]}}"#
    )
}

fn sprite_png() -> Vec<u8> {
    let img: ImageBuffer<Rgba<u8>, Vec<u8>> =
        ImageBuffer::from_pixel(8, 8, Rgba([247, 208, 44, 255]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).expect("encode png");
    out.into_inner()
}

fn client(base: &str) -> Client {
    Client::new(ClientConfig {
        base_url: format!("{base}/api/v2/pokemon"),
        timeout: Duration::from_secs(5),
        ..ClientConfig::default()
    })
    .expect("build client")
}

#[test]
fn fetches_record_by_id() {
    let (base, paths) = serve(1, |origin, _| Reply::Json(200, pikachu_json(origin)));
    let record = client(&base).record(25).expect("record");
    assert_eq!(paths.recv().unwrap(), "/api/v2/pokemon/25");
    assert_eq!(record.id, 25);
    assert_eq!(record.types[0].kind.name, "electric");
}

#[test]
fn non_success_status_is_reported() {
    let (base, _paths) = serve(1, |_, _| Reply::Json(404, "Not Found".into()));
    let err = client(&base).record(0).unwrap_err();
    assert!(matches!(err, FetchError::Status(StatusCode::NOT_FOUND)), "{err}");
}

#[test]
fn malformed_body_is_a_decode_error() {
    let (base, _paths) = serve(1, |_, _| Reply::Json(200, r#"{"id":1,"name":"x"}"#.into()));
    let err = client(&base).record(1).unwrap_err();
    assert!(matches!(err, FetchError::Decode(_)), "{err}");
}

#[test]
fn unreachable_catalog_is_a_transport_error() {
    let err = client("http://127.0.0.1:9").record(1).unwrap_err();
    assert!(matches!(err, FetchError::Transport(_)), "{err}");
}

#[test]
fn pipeline_warms_the_sprite_before_ready() {
    let (base, paths) = serve(2, |origin, path| {
        if path.starts_with("/sprites/") {
            Reply::Bytes(sprite_png())
        } else {
            Reply::Json(200, pikachu_json(origin))
        }
    });
    let images = ImageCache::new(preload::Config {
        timeout: Duration::from_secs(5),
        ..preload::Config::default()
    })
    .expect("image cache");
    let preloader: Arc<dyn Preloader> = Arc::new(images.clone());
    let fetch = Arc::new(Pipeline::new(
        Arc::new(client(&base)),
        preloader,
        pipeline::Options {
            catalog_size: 1,
            min_loading: Duration::from_millis(50),
        },
    ));
    let mut controller = Controller::new(fetch);

    controller.dispatch(Intent::Load);
    assert!(controller.wait_settled(Duration::from_secs(10)));
    assert_eq!(controller.state(), State::Ready);
    assert_eq!(paths.recv().unwrap(), "/api/v2/pokemon/0");
    assert_eq!(paths.recv().unwrap(), "/sprites/25.png");

    let entity = controller.context().entity().expect("entity");
    assert_eq!(entity.name, "pikachu");
    assert!(images.get(&entity.image).is_some());
}

#[test]
fn broken_sprite_does_not_fail_the_pipeline() {
    let (base, _paths) = serve(2, |origin, path| {
        if path.starts_with("/sprites/") {
            Reply::Json(500, "boom".into())
        } else {
            Reply::Json(200, pikachu_json(origin))
        }
    });
    let images = ImageCache::new(preload::Config::default()).expect("image cache");
    let fetch = Arc::new(Pipeline::new(
        Arc::new(client(&base)),
        Arc::new(images.clone()),
        pipeline::Options {
            catalog_size: 1,
            min_loading: Duration::ZERO,
        },
    ));
    let mut controller = Controller::new(fetch);

    controller.dispatch(Intent::Load);
    assert!(controller.wait_settled(Duration::from_secs(10)));
    assert_eq!(controller.state(), State::Ready);
    assert!(images.is_empty());
}
