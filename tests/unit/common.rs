// Shared fixtures for the service tests

use std::sync::Arc;

use kagami::config::Config;
use kagami::fetch::StubFetcher;
use kagami::metrics::Metrics;
use kagami::pipeline::{ImageRequest, ImageResponse, RequestContext};
use kagami::service::{ImageService, ServiceDeps};
use kagami::storage::{MemoryObjectStore, StoredObject};

pub const RESIZER: &str = "https://resizer.example.net";

/// Storage origin, one derivative mapped to `/thumbnails/`, one image cache class
pub const STORAGE_CONFIG: &str = r#"
server:
  address: "127.0.0.1"
  port: 8080
origin:
  mode: storage
  storage:
    bucket: "images"
    public_url: "https://bucket.example.org"
resizing:
  endpoint: "https://resizer.example.net"
derivatives:
  thumbnail:
    width: 320
    height: 150
    quality: 85
    fit: scale-down
path_derivatives:
  thumbnails: thumbnail
responsive:
  breakpoints: [320, 768, 960, 1440, 1920, 2048]
cache:
  - name: image
    regex: '\.(jpe?g|png|gif|webp|avif)(\?.*)?$'
    ttl:
      ok: 31536000
      redirects: 300
      client_error: 60
      server_error: 0
debug:
  enabled: true
"#;

/// Hybrid origin: storage first, then the legacy HTTP origin
pub const HYBRID_CONFIG: &str = r#"
server:
  address: "127.0.0.1"
  port: 8080
origin:
  mode: hybrid
  storage:
    bucket: "images"
    public_url: "https://bucket.example.org"
  remote:
    base_url: "https://legacy.example.org"
resizing:
  endpoint: "https://resizer.example.net"
cache:
  - name: image
    regex: '\.(jpe?g|png|gif|webp|avif)(\?.*)?$'
    ttl:
      ok: 3600
strategies:
  disabled: [direct-serving]
debug:
  enabled: true
"#;

pub struct Harness {
    pub service: ImageService,
    pub store: MemoryObjectStore,
    pub fetcher: StubFetcher,
    pub metrics: Arc<Metrics>,
}

impl Harness {
    pub fn new(yaml: &str) -> Self {
        let config = Config::from_yaml_with_env(yaml).expect("config should parse");
        config.validate().expect("config should validate");

        let store = MemoryObjectStore::new();
        let fetcher = StubFetcher::new();
        let metrics = Arc::new(Metrics::new());
        let service = ImageService::new(
            config,
            ServiceDeps {
                storage: Some(Arc::new(store.clone())),
                fetcher: Arc::new(fetcher.clone()),
            },
            metrics.clone(),
        )
        .expect("service should build");

        Self {
            service,
            store,
            fetcher,
            metrics,
        }
    }

    pub fn with_image(self, key: &str, body: &'static [u8]) -> Self {
        self.store
            .insert(key, StoredObject::new(body, Some("image/jpeg")));
        self
    }

    pub async fn send(&self, request: ImageRequest) -> ImageResponse {
        self.service.handle(request, &RequestContext::new()).await
    }

    pub async fn get(&self, url: &str) -> ImageResponse {
        self.send(ImageRequest::get(url).expect("valid url")).await
    }
}

pub fn error_code(response: &ImageResponse) -> String {
    let body: serde_json::Value =
        serde_json::from_slice(&response.body).expect("error body is JSON");
    body["error"]["code"].as_str().unwrap_or_default().to_string()
}
