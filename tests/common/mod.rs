#![allow(dead_code)]
use artist_atlas::{
    AtlasClient, AtlasConfig, AuthConfig, MemoryTokenStore, ProviderConfig, QueueConfig,
    TokenStore,
};
use http_types::{Request, Response};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A canned response for one route.
#[derive(Debug, Clone)]
pub struct Canned {
    pub status: u16,
    pub body: String,
    pub headers: Vec<(String, String)>,
    pub delay: Option<Duration>,
}

impl Canned {
    pub fn json(status: u16, body: serde_json::Value) -> Self {
        Self {
            status,
            body: body.to_string(),
            headers: Vec::new(),
            delay: None,
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// What the fake saw for one request.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub authorization: Option<String>,
    pub body: String,
}

impl RecordedRequest {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Default)]
struct ScriptState {
    routes: HashMap<(String, String), VecDeque<Canned>>,
    requests: Vec<RecordedRequest>,
    in_flight: usize,
    peak_in_flight: usize,
}

/// In-process [`http_client::HttpClient`] answering from per-route scripts.
///
/// Each route plays its responses in order and then keeps repeating the last one. Unscripted
/// routes answer 404. Clones share the script and the request log.
#[derive(Debug, Clone, Default)]
pub struct ScriptedClient {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, method: &str, path: &str, canned: Canned) -> &Self {
        self.state
            .lock()
            .unwrap()
            .routes
            .entry((method.to_uppercase(), path.to_string()))
            .or_default()
            .push_back(canned);
        self
    }

    pub fn get(&self, path: &str, status: u16, body: serde_json::Value) -> &Self {
        self.respond("GET", path, Canned::json(status, body))
    }

    pub fn post(&self, path: &str, status: u16, body: serde_json::Value) -> &Self {
        self.respond("POST", path, Canned::json(status, body))
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }

    pub fn count(&self, path: &str) -> usize {
        self.requests_to(path).len()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.state.lock().unwrap().peak_in_flight
    }

    fn next_response(&self, method: &str, path: &str) -> Option<Canned> {
        let mut state = self.state.lock().unwrap();
        let script = state
            .routes
            .get_mut(&(method.to_string(), path.to_string()))?;
        if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        }
    }
}

#[async_trait::async_trait]
impl http_client::HttpClient for ScriptedClient {
    async fn send(&self, mut req: Request) -> Result<Response, http_types::Error> {
        let method = req.method().to_string();
        let path = req.url().path().to_string();
        let query = req
            .url()
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        let authorization = req
            .header("Authorization")
            .and_then(|h| h.get(0))
            .map(|v| v.as_str().to_string());
        let body = req.body_string().await.unwrap_or_default();

        {
            let mut state = self.state.lock().unwrap();
            state.requests.push(RecordedRequest {
                method: method.clone(),
                path: path.clone(),
                query,
                authorization,
                body,
            });
            state.in_flight += 1;
            state.peak_in_flight = state.peak_in_flight.max(state.in_flight);
        }

        let canned = self
            .next_response(&method, &path)
            .unwrap_or_else(|| Canned::json(404, serde_json::json!({"error": "not found"})));
        if let Some(delay) = canned.delay {
            tokio::time::sleep(delay).await;
        }

        self.state.lock().unwrap().in_flight -= 1;

        let mut response = Response::new(canned.status);
        for (name, value) in &canned.headers {
            response.insert_header(name.as_str(), value.as_str());
        }
        response.set_body(canned.body);
        Ok(response)
    }
}

/// Queues without courtesy delays, so tests only wait for what they script.
pub fn fast_config() -> AtlasConfig {
    AtlasConfig::new("http://atlas.test")
        .with_lastfm(ProviderConfig::lastfm().with_queue(QueueConfig::new(2, Duration::ZERO)))
        .with_deezer(ProviderConfig::deezer().with_queue(QueueConfig::new(5, Duration::ZERO)))
}

pub fn client_with(script: &ScriptedClient, config: AtlasConfig) -> AtlasClient {
    AtlasClient::with_token_store(
        Box::new(script.clone()),
        config,
        Arc::new(MemoryTokenStore::new()),
    )
    .unwrap()
}

pub fn token_client(
    script: &ScriptedClient,
    store: Arc<MemoryTokenStore>,
) -> AtlasClient {
    let store: Arc<dyn TokenStore> = store;
    AtlasClient::with_token_store(
        Box::new(script.clone()),
        fast_config().with_auth(AuthConfig::token()),
        store,
    )
    .unwrap()
}

pub fn deezer_artist(id: u64, name: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "name": name,
        "link": format!("https://www.deezer.com/artist/{id}"),
        "picture_medium": format!("https://cdn.test/{id}/medium.jpg"),
        "picture_xl": format!("https://cdn.test/{id}/xl.jpg"),
        "nb_fan": id * 100,
        "type": "artist"
    })
}
