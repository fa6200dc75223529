//! End-to-end render: tiny_http map server, real forward proxy, reqwest client

#![cfg(feature = "proxy")]

use mapshot::http::ReqwestClient;
use mapshot::proxify::encode_component;
use mapshot::proxy::{serve, ProxyConfig};
use mapshot::{EngineConfig, RenderRequest, Viewport};
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use tiny_http::{Response, Server};

fn solid_png(rgba: [u8; 4]) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(8, 8, image::Rgba(rgba));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png).unwrap();
    buf
}

/// Serves `/map.json` and answers every `/wms` GetMap with a solid PNG.
/// Records (url, x-editor header) per request.
fn start_map_server(definition: impl Fn(&str) -> String + Send + 'static) -> (String, Arc<Mutex<Vec<(String, Option<String>)>>>) {
    let server = Server::http("127.0.0.1:0").unwrap();
    let base = format!("http://{}", server.server_addr());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    let own_base = base.clone();
    let tile = solid_png([30, 140, 60, 255]);

    std::thread::spawn(move || {
        for request in server.incoming_requests() {
            let editor = request
                .headers()
                .iter()
                .find(|h| h.field.to_string().eq_ignore_ascii_case("x-editor"))
                .map(|h| h.value.to_string());
            let url = request.url().to_string();
            log.lock().unwrap().push((url.clone(), editor));

            let response = if url == "/map.json" {
                Response::from_data(definition(&own_base).into_bytes())
                    .with_header("Content-Type: application/json".parse::<tiny_http::Header>().unwrap())
            } else if url.starts_with("/wms") {
                Response::from_data(tile.clone())
                    .with_header("Content-Type: image/png".parse::<tiny_http::Header>().unwrap())
            } else {
                Response::from_data(b"Not Found".to_vec()).with_status_code(404)
            };
            let _ = request.respond(response);
        }
    });
    (base, seen)
}

async fn start_proxy() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let config = ProxyConfig::default();
    tokio::spawn(async move {
        let _ = serve(listener, &config).await;
    });
    format!("http://{}", addr)
}

fn config(proxy_base: String) -> EngineConfig {
    EngineConfig {
        viewport: Viewport { width: 200, height: 150 },
        proxy_base,
        timeout_ms: 5000,
        settle_ms: 800,
        ..Default::default()
    }
}

#[tokio::test]
async fn renders_wms_layer_through_proxy() {
    let (map_server, seen) = start_map_server(|base| {
        format!(
            r#"{{"extent": "14.0 50.0 14.2 50.1", "layers": [
                {{"className": "HSLayers.Layer.WMS", "url": "{}", "params": {{"LAYERS": "roads", "REQUEST": "GetCapabilities"}},
                  "singleTile": true, "visibility": true, "opacity": 1}},
                {{"className": "OpenLayers.Layer.Vector", "title": "drawings"}}
            ]}}"#,
            // layer URLs arrive URI-encoded
            encode_component(&format!("{}/wms", base))
        )
    });
    let proxy = start_proxy().await;
    let config = config(proxy);

    let query = format!(
        "map_def_url={}&proxy_header=X-Editor&editor=alice&file_name=thumb.png",
        encode_component(&format!("{}/map.json", map_server))
    );
    let out_dir = std::env::temp_dir().join(format!("mapshot-e2e-{}", std::process::id()));
    let client = Arc::new(ReqwestClient::new(&config).unwrap());

    let report = mapshot::run(RenderRequest::from_query(&query), &config, client, &out_dir).await;
    assert!(report.is_success(), "run failed: {:?}\n{:#?}", report.error, report.logs);
    assert_eq!(report.layers_drawn, 1);
    assert!(report.data_url.as_deref().unwrap().starts_with("data:image/png;base64,"));
    assert_eq!(report.logs.iter().filter(|l| l.contains("Unsupported layer className")).count(), 1);
    assert!(report.logs.iter().any(|l| l == "rendercomplete"));

    let saved = report.saved_file.expect("saved file");
    let png = image::open(&saved).unwrap().to_rgba8();
    assert_eq!(png.dimensions(), (200, 150));
    assert_eq!(png.get_pixel(100, 75).0, [30, 140, 60, 255]);
    let _ = std::fs::remove_dir_all(&out_dir);

    let seen = seen.lock().unwrap();
    assert_eq!(seen[0].0, "/map.json");
    let wms: Vec<_> = seen.iter().filter(|(u, _)| u.starts_with("/wms")).collect();
    assert_eq!(wms.len(), 1);
    assert!(wms[0].0.contains("REQUEST=GetMap"));
    assert!(!wms[0].0.contains("GetCapabilities"));
    assert!(seen.iter().all(|(_, editor)| editor.as_deref() == Some("alice")));
}

#[tokio::test]
async fn public_host_is_rewritten_to_internal() {
    let (map_server, seen) = start_map_server(|_| {
        r#"{"extent": [14.0, 50.0, 14.2, 50.1], "layers": {"data": [
            {"className": "WMS", "url": "https://maps.public.example/geoserver/wms", "params": {"LAYERS": "a"}, "singleTile": true}
        ]}}"#
            .to_string()
    });
    let proxy = start_proxy().await;
    let config = config(proxy);

    let mut request = RenderRequest::new(format!("{}/map.json", map_server));
    request.gs_public_url = Some("https://maps.public.example/geoserver".into());
    request.gs_url = Some(map_server.clone());
    let client = Arc::new(ReqwestClient::new(&config).unwrap());

    let report = mapshot::run(Ok(request), &config, client, &std::env::temp_dir()).await;
    assert!(report.is_success(), "run failed: {:?}", report.error);
    assert!(report.logs.iter().any(|l| l.starts_with("replaced layer URL https://maps.public.example/geoserver/wms")));
    assert!(seen.lock().unwrap().iter().any(|(u, _)| u.starts_with("/wms?")));
}

#[tokio::test]
async fn definition_failure_produces_no_image() {
    let (map_server, _seen) = start_map_server(|_| String::new());
    let proxy = start_proxy().await;
    let config = config(proxy);
    let client = Arc::new(ReqwestClient::new(&config).unwrap());

    let request = RenderRequest::new(format!("{}/absent.json", map_server));
    let report = mapshot::run(Ok(request), &config, client, &std::env::temp_dir()).await;
    assert!(report.data_url.is_none());
    assert!(report.error.unwrap().contains("status 404"));
    assert!(report.logs.iter().any(|l| l.starts_with("Error when fetching map")));
}
