//! Garmin Connect data source.
//!
//! Uses the tokens that `garth` keeps in its token directory.  The short
//! lived OAuth2 token is used as long as it is valid; once it expires a new
//! one is exchanged for the long lived OAuth1 token and written back.  The
//! interactive login that creates the OAuth1 token happens outside this
//! program.

use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use sha1::Sha1;
use tracing::{debug, info, warn};

use runbox_common::calendar::DateRange;
use runbox_common::source::ActivitySource;
use runbox_common::{Result, RunboxError};

/// Environment variable naming the token directory.
pub const TOKEN_DIR_VAR: &str = "GARTH_HOME";
const DEFAULT_TOKEN_DIR: &str = "~/.garth";
const OAUTH1_FILE: &str = "oauth1_token.json";
const OAUTH2_FILE: &str = "oauth2_token.json";

const ACTIVITIES_PATH: &str = "/activitylist-service/activities/search/activities";
const EXCHANGE_PATH: &str = "/oauth-service/oauth/exchange/user/2.0";
const OAUTH_CONSUMER_URL: &str = "https://thegarth.s3.amazonaws.com/oauth_consumer.json";
const PAGE_SIZE: usize = 20;
const USER_AGENT: &str = "GCM-iOS-5.7.2.1";
const EXCHANGE_USER_AGENT: &str = "com.garmin.android.apps.connectmobile";

const EXPIRED: &str = "The login tokens are invalid or expired. Please rotate them.";

/// RFC 3986 unreserved characters stay as they are, everything else is
/// percent-encoded.
const OAUTH_ENCODE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

type HmacSha1 = Hmac<Sha1>;

#[derive(Debug, Clone, Deserialize)]
pub struct OAuth2Token {
    pub access_token: String,
    /// Unix timestamp (seconds).
    pub expires_at: i64,
}

/// Long lived token from the interactive login.
#[derive(Debug, Clone, Deserialize)]
pub struct OAuth1Token {
    pub oauth_token: String,
    pub oauth_token_secret: String,
    #[serde(default)]
    pub mfa_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct OAuthConsumer {
    consumer_key: String,
    consumer_secret: String,
}

/// Which credential to talk to Garmin Connect with.
#[derive(Debug)]
pub enum TokenChoice {
    /// The stored OAuth2 token is still valid.
    Stored(OAuth2Token),
    /// The OAuth2 token is missing or expired; exchange this one for a new one.
    Renew(OAuth1Token),
}

/// Token directory from `GARTH_HOME`, defaulting to `~/.garth`.
pub fn token_dir() -> PathBuf {
    let dir = std::env::var(TOKEN_DIR_VAR).unwrap_or_else(|_| DEFAULT_TOKEN_DIR.to_string());
    expand_home(&dir, std::env::var("HOME").ok().as_deref())
}

fn expand_home(path: &str, home: Option<&str>) -> PathBuf {
    match (path.strip_prefix("~/"), home) {
        (Some(rest), Some(home)) => Path::new(home).join(rest),
        _ if path == "~" => home.map(PathBuf::from).unwrap_or_else(|| PathBuf::from(path)),
        _ => PathBuf::from(path),
    }
}

/// `Ok(None)` when the file does not exist.
fn read_token<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(RunboxError::Connection(format!(
                "Cannot read {}: {e}",
                path.display()
            )))
        }
    };
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|e| RunboxError::Connection(format!("{EXPIRED} ({}: {e})", path.display())))
}

/// Pick the stored OAuth2 token while it is valid at `now`, otherwise fall
/// back to renewing it from the OAuth1 token.
pub fn choose_token(dir: &Path, now: i64) -> Result<TokenChoice> {
    let oauth2: Option<OAuth2Token> = read_token(&dir.join(OAUTH2_FILE))?;
    if let Some(token) = oauth2.as_ref().filter(|t| t.expires_at > now) {
        return Ok(TokenChoice::Stored(token.clone()));
    }
    match read_token::<OAuth1Token>(&dir.join(OAUTH1_FILE))? {
        Some(oauth1) => Ok(TokenChoice::Renew(oauth1)),
        None if oauth2.is_some() => Err(RunboxError::Connection(EXPIRED.to_string())),
        None => Err(RunboxError::Connection(format!(
            "No authentication tokens found at {}",
            dir.display()
        ))),
    }
}

/// Percent-encode a value for an OAuth1 signature.
fn oauth_encode(s: &str) -> String {
    utf8_percent_encode(s, OAUTH_ENCODE).to_string()
}

/// HMAC-SHA1 signature of a request.  `params` holds every query, form and
/// `oauth_*` parameter (except the signature itself) unencoded; `url` has no
/// query string.
fn oauth1_signature(
    method: &str,
    url: &str,
    params: &[(&str, &str)],
    consumer_secret: &str,
    token_secret: &str,
) -> Result<String> {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (oauth_encode(k), oauth_encode(v)))
        .collect();
    encoded.sort();
    let param_string = encoded
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    let base = format!(
        "{}&{}&{}",
        method.to_ascii_uppercase(),
        oauth_encode(url),
        oauth_encode(&param_string)
    );
    let key = format!("{}&{}", oauth_encode(consumer_secret), oauth_encode(token_secret));

    let mut mac = HmacSha1::new_from_slice(key.as_bytes())
        .map_err(|e| RunboxError::Connection(format!("Cannot sign request: {e}")))?;
    mac.update(base.as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

/// `Authorization` header for a signed POST of `form` to `url`.
fn authorization_header(
    url: &str,
    form: &[(&str, &str)],
    consumer: &OAuthConsumer,
    token: &OAuth1Token,
    nonce: &str,
    timestamp: i64,
) -> Result<String> {
    let timestamp = timestamp.to_string();
    let oauth = [
        ("oauth_consumer_key", consumer.consumer_key.as_str()),
        ("oauth_nonce", nonce),
        ("oauth_signature_method", "HMAC-SHA1"),
        ("oauth_timestamp", timestamp.as_str()),
        ("oauth_token", token.oauth_token.as_str()),
        ("oauth_version", "1.0"),
    ];
    let params: Vec<(&str, &str)> = oauth.iter().chain(form).copied().collect();
    let signature = oauth1_signature(
        "POST",
        url,
        &params,
        &consumer.consumer_secret,
        &token.oauth_token_secret,
    )?;

    let fields: Vec<String> = oauth
        .iter()
        .copied()
        .chain([("oauth_signature", signature.as_str())])
        .map(|(k, v)| format!("{k}=\"{}\"", oauth_encode(v)))
        .collect();
    Ok(format!("OAuth {}", fields.join(", ")))
}

/// Turn the exchange response into a token, stamping absolute expiry times
/// the way `garth` stores them.  Returns the token and the JSON to persist.
fn token_from_exchange(mut body: Value, now: i64) -> Result<(OAuth2Token, Value)> {
    let invalid =
        || RunboxError::Connection(format!("{EXPIRED} (token exchange returned no access token)"));
    let expires_in = body.get("expires_in").and_then(Value::as_i64).ok_or_else(invalid)?;
    let access_token = body
        .get("access_token")
        .and_then(Value::as_str)
        .ok_or_else(invalid)?
        .to_string();

    body["expires_at"] = json!(now + expires_in);
    if let Some(refresh_in) = body.get("refresh_token_expires_in").and_then(Value::as_i64) {
        body["refresh_token_expires_at"] = json!(now + refresh_in);
    }
    let token = OAuth2Token {
        access_token,
        expires_at: now + expires_in,
    };
    Ok((token, body))
}

/// Request pages at offsets 0, 20, 40 … until one comes back short.
fn collect_pages(mut fetch: impl FnMut(usize) -> Result<Vec<Value>>) -> Result<Vec<Value>> {
    let mut all = Vec::new();
    let mut start = 0;
    loop {
        let page = fetch(start)?;
        let n = page.len();
        debug!("Page at offset {start}: {n} activity record(s)");
        all.extend(page);
        if n < PAGE_SIZE {
            break;
        }
        start += n;
    }
    Ok(all)
}

pub struct GarminClient {
    client: reqwest::blocking::Client,
    base_url: String,
    token: OAuth2Token,
}

impl GarminClient {
    pub fn connect(base_url: &str, token_dir: &Path) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RunboxError::Connection(format!("Cannot create HTTP client: {e}")))?;
        let base_url = base_url.trim_end_matches('/').to_string();

        let now = chrono::Utc::now().timestamp();
        let token = match choose_token(token_dir, now)? {
            TokenChoice::Stored(token) => token,
            TokenChoice::Renew(oauth1) => {
                info!("OAuth2 token missing or expired, renewing it");
                let (token, stored) = exchange(&client, &base_url, &oauth1, now)?;
                save_token(token_dir, &stored);
                token
            }
        };

        info!("Using Garmin Connect tokens from {}", token_dir.display());
        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    fn list_page(&self, range: &DateRange, start: usize) -> Result<Vec<Value>> {
        let url = page_url(&self.base_url, range, start);
        debug!("GET {url}");
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.token.access_token)
            .send()
            .map_err(|e| RunboxError::Connection(format!("Cannot reach Garmin Connect: {e}")))?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(RunboxError::Connection(EXPIRED.to_string()));
        }
        if !status.is_success() {
            return Err(RunboxError::Connection(format!(
                "GET {ACTIVITIES_PATH} returned {status}"
            )));
        }

        let body: Value = resp
            .json()
            .map_err(|e| RunboxError::Connection(format!("Cannot parse activity list: {e}")))?;
        parse_page(body)
    }
}

impl ActivitySource for GarminClient {
    fn activities(&self, range: &DateRange) -> Result<Vec<Value>> {
        collect_pages(|start| self.list_page(range, start))
    }
}

fn fetch_consumer(client: &reqwest::blocking::Client) -> Result<OAuthConsumer> {
    let resp = client
        .get(OAUTH_CONSUMER_URL)
        .send()
        .and_then(|r| r.error_for_status())
        .map_err(|e| RunboxError::Connection(format!("Cannot fetch OAuth consumer: {e}")))?;
    resp.json()
        .map_err(|e| RunboxError::Connection(format!("Cannot parse OAuth consumer: {e}")))
}

/// Trade the OAuth1 token for a fresh OAuth2 token.
fn exchange(
    client: &reqwest::blocking::Client,
    base_url: &str,
    oauth1: &OAuth1Token,
    now: i64,
) -> Result<(OAuth2Token, Value)> {
    let consumer = fetch_consumer(client)?;
    let url = format!("{base_url}{EXCHANGE_PATH}");
    let form: Vec<(&str, &str)> = oauth1
        .mfa_token
        .as_deref()
        .map(|mfa| vec![("mfa_token", mfa)])
        .unwrap_or_default();
    let body = form
        .iter()
        .map(|(k, v)| format!("{k}={}", oauth_encode(v)))
        .collect::<Vec<_>>()
        .join("&");
    let nonce = format!("{:016x}", rand::thread_rng().gen::<u64>());
    let auth = authorization_header(&url, &form, &consumer, oauth1, &nonce, now)?;

    debug!("POST {url}");
    let resp = client
        .post(&url)
        .header(reqwest::header::USER_AGENT, EXCHANGE_USER_AGENT)
        .header(reqwest::header::AUTHORIZATION, auth)
        .header(reqwest::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(body)
        .send()
        .map_err(|e| RunboxError::Connection(format!("Cannot reach Garmin Connect: {e}")))?;

    let status = resp.status();
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(RunboxError::Connection(EXPIRED.to_string()));
    }
    if !status.is_success() {
        return Err(RunboxError::Connection(format!(
            "POST {EXCHANGE_PATH} returned {status}"
        )));
    }
    let body: Value = resp
        .json()
        .map_err(|e| RunboxError::Connection(format!("Cannot parse token exchange: {e}")))?;
    token_from_exchange(body, now)
}

/// Persist a renewed token so the next run can reuse it.
fn save_token(dir: &Path, token: &Value) {
    let path = dir.join(OAUTH2_FILE);
    let written = serde_json::to_string_pretty(token)
        .map_err(std::io::Error::other)
        .and_then(|text| std::fs::write(&path, text));
    match written {
        Ok(()) => info!("Saved renewed token to {}", path.display()),
        Err(e) => warn!("Cannot save renewed token to {}: {e}", path.display()),
    }
}

fn page_url(base_url: &str, range: &DateRange, start: usize) -> String {
    format!(
        "{base_url}{ACTIVITIES_PATH}?startDate={}&endDate={}&start={start}&limit={PAGE_SIZE}&activityType=running",
        range.first(),
        range.last(),
    )
}

fn parse_page(body: Value) -> Result<Vec<Value>> {
    match body {
        Value::Array(items) => Ok(items),
        other => Err(RunboxError::Connection(format!(
            "Unexpected activity list response: {}",
            truncate(&other.to_string(), 200)
        ))),
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}
