//! Endpoint contract table and response shaping over a [`Dataset`].
//!
//! Every mocked endpoint is one [`Endpoint`] variant; [`Endpoint::match_request`]
//! is the only place paths are recognised and [`route`] the only dispatcher.
//! Requests that match no variant are not answered here.

use std::cmp::Ordering;

use axum::http::{HeaderMap, Method, StatusCode};
use chrono::{DateTime, Duration as ChronoDuration, SecondsFormat, Utc};
use serde_json::{json, Value};

use crate::dataset::{Dataset, Instrument, SyntheticUser};
use crate::prng::{hex_token, Prng};
use crate::session::{is_hex_of_len, nostr_event_id, ProfileUpdate, Session, SessionUser};

pub const API_PREFIX: &str = "/api/";
pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const MAX_PAGE_SIZE: usize = 100;
pub const DEFAULT_SPARKLINE_DAYS: u32 = 7;
pub const MAX_WINDOW_DAYS: u32 = 3_650;
pub const DEFAULT_MOVERS_LIMIT: usize = 5;
pub const MAX_MOVERS_LIMIT: usize = 50;
pub const SEARCH_LIMIT: usize = 10;
pub const TOP_HOLDERS_LIMIT: usize = 10;
const NONCE_BYTES: usize = 16;

#[derive(Debug, Clone, PartialEq)]
pub struct MockRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub raw_query: Option<String>,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl MockRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            raw_query: None,
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn with_json(mut self, body: Value) -> Self {
        self.body = body.to_string().into_bytes();
        self
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn json(&self) -> Value {
        if self.body.is_empty() {
            return Value::Null;
        }
        serde_json::from_slice(&self.body).unwrap_or(Value::Null)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MockResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl MockResponse {
    pub fn ok(body: Value) -> Self {
        Self {
            status: StatusCode::OK,
            body,
        }
    }

    pub fn error(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "error": message.into() }),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::error(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::error(StatusCode::NOT_FOUND, message)
    }

    pub fn unauthorized() -> Self {
        Self::error(StatusCode::UNAUTHORIZED, "unauthorized")
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self::error(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Overview,
    Tokens,
    TopMovers,
    GlobalChart,
    TokenDetail { symbol: String },
    TokenChart { symbol: String },
    AuthChallenge,
    AuthVerify,
    AuthDemoLogin,
    AuthMe,
    AuthLogout,
    ProfileGet,
    ProfileUpdate,
    Search,
    UserDetail { npub: String },
    CompetitionDetail { slug: String },
}

impl Endpoint {
    pub fn match_request(method: &Method, path: &str) -> Option<Self> {
        let rest = path.strip_prefix(API_PREFIX)?.trim_end_matches('/');
        let segments: Vec<&str> = rest.split('/').collect();

        let endpoint = match (method.as_str(), segments.as_slice()) {
            ("GET", ["overview"]) => Self::Overview,
            ("GET", ["tokens"]) => Self::Tokens,
            ("GET", ["top-movers"]) => Self::TopMovers,
            ("GET", ["chart", "global"]) => Self::GlobalChart,
            ("GET", ["token", symbol]) if !symbol.is_empty() => Self::TokenDetail {
                symbol: (*symbol).to_string(),
            },
            ("GET", ["chart", "token", symbol]) if !symbol.is_empty() => Self::TokenChart {
                symbol: (*symbol).to_string(),
            },
            ("POST", ["auth", "nostr", "challenge"]) => Self::AuthChallenge,
            ("POST", ["auth", "nostr", "verify"]) => Self::AuthVerify,
            ("POST", ["auth", "demo-login"]) => Self::AuthDemoLogin,
            ("GET", ["auth", "me"]) => Self::AuthMe,
            ("POST", ["auth", "logout"]) => Self::AuthLogout,
            ("GET", ["profile"]) => Self::ProfileGet,
            ("POST", ["profile"]) => Self::ProfileUpdate,
            ("GET", ["search"]) => Self::Search,
            ("GET", ["user", npub]) if !npub.is_empty() => Self::UserDetail {
                npub: (*npub).to_string(),
            },
            ("GET", ["competition", slug]) if !slug.is_empty() => Self::CompetitionDetail {
                slug: (*slug).to_string(),
            },
            _ => return None,
        };
        Some(endpoint)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Overview => "overview",
            Self::Tokens => "tokens",
            Self::TopMovers => "top_movers",
            Self::GlobalChart => "chart_global",
            Self::TokenDetail { .. } => "token_detail",
            Self::TokenChart { .. } => "chart_token",
            Self::AuthChallenge => "auth_challenge",
            Self::AuthVerify => "auth_verify",
            Self::AuthDemoLogin => "auth_demo_login",
            Self::AuthMe => "auth_me",
            Self::AuthLogout => "auth_logout",
            Self::ProfileGet => "profile_get",
            Self::ProfileUpdate => "profile_update",
            Self::Search => "search",
            Self::UserDetail { .. } => "user_detail",
            Self::CompetitionDetail { .. } => "competition_detail",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Id,
    Symbol,
    Name,
    PriceUsd,
    MarketCapUsd,
    Volume24hUsd,
    HoldersCount,
    Change24h,
    Change7d,
    Change30d,
    Sharpe,
    HolderGrowth,
    Score,
}

pub enum SortValue<'a> {
    Text(&'a str),
    Number(f64),
}

impl SortKey {
    pub fn parse(raw: &str) -> Option<Self> {
        let key = match raw.trim().to_ascii_lowercase().as_str() {
            "id" | "last_updated" => Self::Id,
            "symbol" => Self::Symbol,
            "name" => Self::Name,
            "price_usd" | "price" => Self::PriceUsd,
            "market_cap_usd" | "market_cap" | "mcap" => Self::MarketCapUsd,
            "volume_24h_usd" | "volume" => Self::Volume24hUsd,
            "holders_count" | "holders" => Self::HoldersCount,
            "change_24h" => Self::Change24h,
            "change_7d" => Self::Change7d,
            "change_30d" => Self::Change30d,
            "sharpe" => Self::Sharpe,
            "holder_growth" => Self::HolderGrowth,
            "score" => Self::Score,
            _ => return None,
        };
        Some(key)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Symbol => "symbol",
            Self::Name => "name",
            Self::PriceUsd => "price_usd",
            Self::MarketCapUsd => "market_cap_usd",
            Self::Volume24hUsd => "volume_24h_usd",
            Self::HoldersCount => "holders_count",
            Self::Change24h => "change_24h",
            Self::Change7d => "change_7d",
            Self::Change30d => "change_30d",
            Self::Sharpe => "sharpe",
            Self::HolderGrowth => "holder_growth",
            Self::Score => "score",
        }
    }

    pub fn is_numeric(self) -> bool {
        !matches!(self, Self::Symbol | Self::Name)
    }

    pub fn value(self, inst: &Instrument) -> SortValue<'_> {
        match self {
            Self::Symbol => SortValue::Text(&inst.symbol),
            Self::Name => SortValue::Text(&inst.name),
            Self::Id => SortValue::Number(f64::from(inst.id)),
            Self::PriceUsd => SortValue::Number(inst.price_usd),
            Self::MarketCapUsd => SortValue::Number(inst.market_cap_usd as f64),
            Self::Volume24hUsd => SortValue::Number(inst.volume_24h_usd),
            Self::HoldersCount => SortValue::Number(inst.holders_count as f64),
            Self::Change24h => SortValue::Number(inst.change_24h),
            Self::Change7d => SortValue::Number(inst.change_7d),
            Self::Change30d => SortValue::Number(inst.change_30d),
            Self::Sharpe => SortValue::Number(inst.sharpe),
            Self::HolderGrowth => SortValue::Number(inst.holder_growth),
            Self::Score => SortValue::Number(inst.score),
        }
    }

    pub fn number(self, inst: &Instrument) -> f64 {
        match self.value(inst) {
            SortValue::Number(v) => v,
            SortValue::Text(_) => f64::NAN,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDir {
    Asc,
    Desc,
}

// NaN and infinities rank lowest.
pub fn sort_number(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        f64::NEG_INFINITY
    }
}

pub fn compare_instruments(a: &Instrument, b: &Instrument, key: SortKey, dir: SortDir) -> Ordering {
    let ord = match (key.value(a), key.value(b)) {
        (SortValue::Text(x), SortValue::Text(y)) => x.cmp(y),
        (SortValue::Number(x), SortValue::Number(y)) => sort_number(x).total_cmp(&sort_number(y)),
        _ => Ordering::Equal,
    };
    match dir {
        SortDir::Asc => ord,
        SortDir::Desc => ord.reverse(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
    pub page: usize,
    pub page_size: usize,
    pub sort: SortKey,
    pub dir: SortDir,
    pub q: Option<String>,
    pub min_mcap: Option<f64>,
    pub min_volume: Option<f64>,
    pub sparkline: bool,
    pub days: u32,
    pub metric: Option<SortKey>,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            sort: SortKey::MarketCapUsd,
            dir: SortDir::Desc,
            q: None,
            min_mcap: None,
            min_volume: None,
            sparkline: false,
            days: DEFAULT_SPARKLINE_DAYS,
            metric: None,
        }
    }
}

impl ListQuery {
    pub fn from_request(request: &MockRequest) -> Self {
        let defaults = Self::default();
        Self {
            page: param_i64(request, "page").map_or(defaults.page, |p| p.max(1) as usize),
            page_size: param_i64(request, "page_size").map_or(defaults.page_size, |s| {
                s.clamp(1, MAX_PAGE_SIZE as i64) as usize
            }),
            sort: request
                .param("sort")
                .and_then(SortKey::parse)
                .unwrap_or(defaults.sort),
            dir: match request.param("dir").map(|d| d.trim().to_ascii_lowercase()) {
                Some(d) if d == "asc" => SortDir::Asc,
                _ => SortDir::Desc,
            },
            q: request
                .param("q")
                .map(str::trim)
                .filter(|q| !q.is_empty())
                .map(str::to_lowercase),
            min_mcap: param_f64(request, "min_mcap"),
            min_volume: param_f64(request, "min_volume"),
            sparkline: request.param("sparkline").is_some_and(is_truthy),
            days: param_i64(request, "days").map_or(defaults.days, |d| {
                d.clamp(0, i64::from(MAX_WINDOW_DAYS)) as u32
            }),
            metric: request.param("metric").and_then(SortKey::parse),
        }
    }

    fn matches(&self, inst: &Instrument) -> bool {
        if let Some(q) = &self.q {
            if !text_matches(&inst.symbol, q) && !text_matches(&inst.name, q) {
                return false;
            }
        }
        if let Some(min) = self.min_mcap {
            if (inst.market_cap_usd as f64) < min {
                return false;
            }
        }
        if let Some(min) = self.min_volume {
            if inst.volume_24h_usd < min {
                return false;
            }
        }
        true
    }
}

#[derive(Debug)]
pub struct Page<'a> {
    pub items: Vec<&'a Instrument>,
    pub total: usize,
}

pub fn select_page<'a>(dataset: &'a Dataset, query: &ListQuery) -> Page<'a> {
    let mut matching: Vec<&Instrument> = dataset
        .instruments
        .iter()
        .filter(|inst| query.matches(inst))
        .collect();
    let total = matching.len();

    matching.sort_by(|a, b| compare_instruments(a, b, query.sort, query.dir));

    let offset = (query.page - 1).saturating_mul(query.page_size);
    let items = matching
        .into_iter()
        .skip(offset)
        .take(query.page_size)
        .collect();
    Page { items, total }
}

pub struct RouteContext<'a> {
    pub dataset: &'a Dataset,
    pub session: &'a mut Session,
    pub rng: &'a mut Prng,
    pub now: DateTime<Utc>,
}

pub fn route(endpoint: &Endpoint, request: &MockRequest, ctx: RouteContext<'_>) -> MockResponse {
    let RouteContext {
        dataset,
        session,
        rng,
        now,
    } = ctx;

    match endpoint {
        Endpoint::Overview => overview(dataset),
        Endpoint::Tokens => tokens(dataset, request, now),
        Endpoint::TopMovers => top_movers(dataset, request),
        Endpoint::GlobalChart => global_chart(dataset, request, now),
        Endpoint::TokenDetail { symbol } => token_detail(dataset, symbol, now),
        Endpoint::TokenChart { symbol } => token_chart(dataset, symbol, request, now),
        Endpoint::AuthChallenge => auth_challenge(request, session, rng, now),
        Endpoint::AuthVerify => auth_verify(dataset, request, session, now),
        Endpoint::AuthDemoLogin => demo_login(dataset, request, session, now),
        Endpoint::AuthMe => MockResponse::ok(json!({
            "user": session.user().map(user_summary),
        })),
        Endpoint::AuthLogout => {
            session.logout();
            MockResponse::ok(json!({ "ok": true }))
        }
        Endpoint::ProfileGet => match session.user() {
            Some(user) => MockResponse::ok(profile_json(user)),
            None => MockResponse::unauthorized(),
        },
        Endpoint::ProfileUpdate => profile_update(request, session),
        Endpoint::Search => search(dataset, request),
        Endpoint::UserDetail { npub } => user_detail(dataset, npub, now),
        Endpoint::CompetitionDetail { slug } => competition_detail(dataset, slug, now),
    }
}

fn overview(dataset: &Dataset) -> MockResponse {
    let instruments = &dataset.instruments;
    let total_holders: u64 = instruments.iter().map(|i| i.holders_count).sum();
    let total_market_cap: f64 = instruments.iter().map(|i| i.market_cap_usd as f64).sum();
    let volume_24h: f64 = instruments.iter().map(|i| i.volume_24h_usd).sum();
    let top = instruments
        .iter()
        .map(|i| i.market_cap_usd)
        .max()
        .unwrap_or(0) as f64;
    let dominance_pct = if total_market_cap > 0.0 {
        top / total_market_cap * 100.0
    } else {
        0.0
    };

    MockResponse::ok(json!({
        "total_tokens": instruments.len(),
        "total_holders": total_holders,
        "total_market_cap_usd": total_market_cap,
        "volume_24h_usd": volume_24h,
        "dominance_pct": dominance_pct,
    }))
}

fn tokens(dataset: &Dataset, request: &MockRequest, now: DateTime<Utc>) -> MockResponse {
    let query = ListQuery::from_request(request);
    let page = select_page(dataset, &query);
    let last_updated = iso(now);

    let items: Vec<Value> = page
        .items
        .iter()
        .map(|inst| {
            let mut item = instrument_json(inst, &last_updated);
            if query.sparkline {
                let points = dataset.window_points(query.days);
                item["sparkline"] = json!(dataset.price_window(inst, points));
            }
            if let Some(metric) = query.metric {
                item["metric"] = json!(metric.as_str());
                item["metric_value"] = match metric.value(inst) {
                    SortValue::Number(v) => json!(v),
                    SortValue::Text(t) => json!(t),
                };
            }
            item
        })
        .collect();

    MockResponse::ok(json!({
        "items": items,
        "page": query.page,
        "page_size": query.page_size,
        "total": page.total,
    }))
}

fn top_movers(dataset: &Dataset, request: &MockRequest) -> MockResponse {
    let metric = request
        .param("metric")
        .and_then(SortKey::parse)
        .filter(|key| key.is_numeric())
        .unwrap_or(SortKey::Change24h);
    let limit = param_i64(request, "limit").map_or(DEFAULT_MOVERS_LIMIT, |l| {
        l.clamp(1, MAX_MOVERS_LIMIT as i64) as usize
    });

    let mut ranked: Vec<&Instrument> = dataset.instruments.iter().collect();
    ranked.sort_by(|a, b| {
        let x = sort_number(metric.number(a).abs());
        let y = sort_number(metric.number(b).abs());
        y.total_cmp(&x)
    });

    let out: Vec<Value> = ranked
        .into_iter()
        .take(limit)
        .map(|inst| {
            json!({
                "symbol": inst.symbol,
                "name": inst.name,
                "value": metric.number(inst),
                "metric": metric.as_str(),
            })
        })
        .collect();
    MockResponse::ok(Value::Array(out))
}

fn global_chart(dataset: &Dataset, request: &MockRequest, now: DateTime<Utc>) -> MockResponse {
    let days = range_days(request, dataset.config.series_days);
    let points = dataset.window_points(days);
    let labels = date_labels(now, points);

    let mut tokens = vec![0_u64; points];
    let mut holders = vec![0_u64; points];
    for inst in &dataset.instruments {
        let series = dataset.holders_window(inst, points);
        for (t, count) in series.into_iter().enumerate() {
            let days_back = (points - 1 - t) as u32;
            if inst.listed_days_ago >= days_back {
                tokens[t] += 1;
                holders[t] += count;
            }
        }
    }

    MockResponse::ok(json!({
        "labels": labels,
        "tokens": tokens,
        "holders": holders,
    }))
}

fn token_detail(dataset: &Dataset, symbol: &str, now: DateTime<Utc>) -> MockResponse {
    let Some(idx) = dataset.instrument_index(symbol) else {
        return MockResponse::not_found("Token not found");
    };
    let inst = &dataset.instruments[idx];

    let mut holders: Vec<_> = dataset.holdings_for_instrument(idx).collect();
    holders.sort_by(|a, b| b.quantity.total_cmp(&a.quantity));
    let top_holders: Vec<Value> = holders
        .into_iter()
        .take(TOP_HOLDERS_LIMIT)
        .filter_map(|holding| {
            let user = dataset.users.get(holding.user)?;
            Some(json!({
                "npub": user.npub,
                "display_name": user.display_name,
                "quantity": holding.quantity,
                "value_usd": holding.quantity * inst.price_usd,
            }))
        })
        .collect();

    let mut body = instrument_json(inst, &iso(now));
    body["top_holders"] = Value::Array(top_holders);
    MockResponse::ok(body)
}

fn token_chart(
    dataset: &Dataset,
    symbol: &str,
    request: &MockRequest,
    now: DateTime<Utc>,
) -> MockResponse {
    let Some(inst) = dataset.instrument(symbol) else {
        return MockResponse::not_found("Token not found");
    };
    let days = range_days(request, dataset.config.series_days);
    let points = dataset.window_points(days);

    MockResponse::ok(json!({
        "labels": date_labels(now, points),
        "prices": dataset.price_window(inst, points),
        "holders": dataset.holders_window(inst, points),
    }))
}

fn auth_challenge(
    request: &MockRequest,
    session: &mut Session,
    rng: &mut Prng,
    now: DateTime<Utc>,
) -> MockResponse {
    let body = request.json();
    let pubkey = body
        .get("pubkey")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or("");
    if !is_hex_of_len(pubkey, 64) {
        return MockResponse::bad_request("invalid pubkey");
    }

    let nonce = hex_token(rng, NONCE_BYTES);
    let challenge = session.issue_challenge(pubkey, nonce, now);
    MockResponse::ok(json!({
        "nonce": challenge.nonce,
        "expires_at": iso(challenge.expires_at),
    }))
}

fn auth_verify(
    dataset: &Dataset,
    request: &MockRequest,
    session: &mut Session,
    now: DateTime<Utc>,
) -> MockResponse {
    let body = request.json();
    let event = body.get("event").cloned().unwrap_or(Value::Null);
    let pubkey = str_field(&event, "pubkey");
    let content = str_field(&event, "content");
    let sig = str_field(&event, "sig");
    let event_id = str_field(&event, "id");

    if pubkey.len() != 64 || sig.len() != 128 || event_id.len() != 64 {
        return MockResponse::bad_request("invalid event fields");
    }
    if let Err(err) = session.check_challenge(pubkey, content, now) {
        return MockResponse::bad_request(err.to_string());
    }
    if nostr_event_id(&event) != event_id {
        return MockResponse::bad_request("invalid event id");
    }

    session.consume_challenge(pubkey, content);
    let user = match dataset.user_by_npub(pubkey) {
        Some((_, known)) => SessionUser::from_synthetic(known, now),
        None => SessionUser::fresh(pubkey.to_ascii_lowercase(), now),
    };
    let summary = login_summary(&user);
    session.login(user);
    MockResponse::ok(json!({ "ok": true, "user": summary }))
}

fn demo_login(
    dataset: &Dataset,
    request: &MockRequest,
    session: &mut Session,
    now: DateTime<Utc>,
) -> MockResponse {
    let body = request.json();
    let requested = body
        .get("npub")
        .and_then(Value::as_str)
        .and_then(|npub| dataset.user_by_npub(npub))
        .map(|(_, user)| user);
    let Some(chosen) = requested.or_else(|| dataset.users.first()) else {
        return MockResponse::server_error("no demo users available");
    };

    let user = SessionUser::from_synthetic(chosen, now);
    let summary = login_summary(&user);
    session.login(user);
    MockResponse::ok(json!({ "ok": true, "user": summary }))
}

fn profile_update(request: &MockRequest, session: &mut Session) -> MockResponse {
    let Some(user) = session.user_mut() else {
        return MockResponse::unauthorized();
    };
    match ProfileUpdate::from_json(&request.json()) {
        Ok(update) => {
            user.apply(update);
            MockResponse::ok(json!({ "ok": true }))
        }
        Err(err) => MockResponse::bad_request(err.to_string()),
    }
}

fn search(dataset: &Dataset, request: &MockRequest) -> MockResponse {
    let q = request
        .param("q")
        .map(|q| q.trim().to_lowercase())
        .unwrap_or_default();
    if q.is_empty() {
        return MockResponse::ok(json!({ "tokens": [], "users": [] }));
    }

    let mut tokens: Vec<&Instrument> = dataset
        .instruments
        .iter()
        .filter(|i| text_matches(&i.symbol, &q) || text_matches(&i.name, &q))
        .collect();
    tokens.sort_by(|a, b| compare_instruments(a, b, SortKey::MarketCapUsd, SortDir::Desc));
    let tokens: Vec<Value> = tokens
        .into_iter()
        .take(SEARCH_LIMIT)
        .map(|i| {
            json!({
                "symbol": i.symbol,
                "name": i.name,
                "market_cap_usd": i.market_cap_usd as f64,
            })
        })
        .collect();

    let users: Vec<Value> = dataset
        .users
        .iter()
        .filter(|u| {
            text_matches(&u.npub, &q)
                || u.display_name.as_deref().is_some_and(|n| text_matches(n, &q))
        })
        .take(SEARCH_LIMIT)
        .map(|u| {
            json!({
                "npub": u.npub,
                "npub_bech32": Value::Null,
                "display_name": u.display_name,
                "avatar_url": u.avatar_url,
            })
        })
        .collect();

    MockResponse::ok(json!({ "tokens": tokens, "users": users }))
}

fn user_detail(dataset: &Dataset, npub: &str, now: DateTime<Utc>) -> MockResponse {
    let Some((idx, user)) = dataset.user_by_npub(npub) else {
        return MockResponse::not_found("User not found");
    };

    let mut holdings: Vec<(f64, Value)> = dataset
        .holdings_for_user(idx)
        .filter_map(|holding| {
            let inst = dataset.instruments.get(holding.instrument)?;
            let value = holding.quantity * inst.price_usd;
            Some((
                value,
                json!({
                    "symbol": inst.symbol,
                    "name": inst.name,
                    "quantity": holding.quantity,
                    "price_usd": inst.price_usd,
                    "value_usd": value,
                }),
            ))
        })
        .collect();
    holdings.sort_by(|a, b| b.0.total_cmp(&a.0));

    let total_value: f64 = holdings.iter().map(|(value, _)| value).sum();
    let holdings: Vec<Value> = holdings
        .into_iter()
        .map(|(value, mut item)| {
            item["pct"] = json!(if total_value > 0.0 {
                value / total_value * 100.0
            } else {
                0.0
            });
            item
        })
        .collect();

    MockResponse::ok(json!({
        "user": synthetic_profile_json(user, now),
        "portfolio": {
            "total_value_usd": total_value,
            "total_tokens": holdings.len(),
            "holdings": holdings,
        },
    }))
}

fn competition_detail(dataset: &Dataset, slug: &str, now: DateTime<Utc>) -> MockResponse {
    let Some(comp) = dataset.competition(slug) else {
        return MockResponse::not_found("Competition not found");
    };

    let leaderboard: Vec<Value> = comp
        .entries
        .iter()
        .filter_map(|entry| {
            let user = dataset.users.get(entry.user)?;
            Some(json!({
                "rank": entry.rank,
                "score": entry.score,
                "npub": user.npub,
                "display_name": user.display_name,
                "avatar_url": user.avatar_url,
            }))
        })
        .collect();

    MockResponse::ok(json!({
        "slug": comp.slug,
        "title": comp.title,
        "description": comp.description,
        "start_at": iso(now + ChronoDuration::days(comp.start_offset_days)),
        "end_at": iso(now + ChronoDuration::days(comp.end_offset_days)),
        "leaderboard": leaderboard,
    }))
}

fn instrument_json(inst: &Instrument, last_updated: &str) -> Value {
    json!({
        "id": inst.id,
        "symbol": inst.symbol,
        "name": inst.name,
        "price_usd": inst.price_usd,
        "market_cap_usd": inst.market_cap_usd as f64,
        "volume_24h_usd": inst.volume_24h_usd,
        "holders_count": inst.holders_count,
        "change_24h": inst.change_24h,
        "change_7d": inst.change_7d,
        "change_30d": inst.change_30d,
        "sharpe": inst.sharpe,
        "holder_growth": inst.holder_growth,
        "score": inst.score,
        "last_updated": last_updated,
    })
}

fn user_summary(user: &SessionUser) -> Value {
    json!({
        "npub": user.npub,
        "npub_bech32": Value::Null,
        "display_name": user.display_name,
        "avatar_url": user.avatar_url,
    })
}

fn login_summary(user: &SessionUser) -> Value {
    json!({
        "npub": user.npub,
        "display_name": user.display_name,
    })
}

fn profile_json(user: &SessionUser) -> Value {
    json!({
        "npub": user.npub,
        "npub_bech32": Value::Null,
        "display_name": user.display_name,
        "avatar_url": user.avatar_url,
        "bio": user.bio,
        "joined_at": iso(user.joined_at),
    })
}

fn synthetic_profile_json(user: &SyntheticUser, now: DateTime<Utc>) -> Value {
    json!({
        "npub": user.npub,
        "npub_bech32": Value::Null,
        "display_name": user.display_name,
        "avatar_url": user.avatar_url,
        "bio": user.bio,
        "joined_at": iso(now - ChronoDuration::days(i64::from(user.joined_days_ago))),
    })
}

fn range_days(request: &MockRequest, series_days: u32) -> u32 {
    match request
        .param("range")
        .map(|r| r.trim().to_ascii_lowercase())
        .as_deref()
    {
        Some("7d") => 7,
        Some("30d") => 30,
        Some("90d") => 90,
        _ => series_days,
    }
}

fn date_labels(now: DateTime<Utc>, points: usize) -> Vec<String> {
    (0..points)
        .map(|t| {
            let days_back = (points - 1 - t) as i64;
            (now - ChronoDuration::days(days_back))
                .format("%Y-%m-%d")
                .to_string()
        })
        .collect()
}

fn iso(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn str_field<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or("")
}

fn text_matches(haystack: &str, needle_lower: &str) -> bool {
    haystack.to_lowercase().contains(needle_lower)
}

fn is_truthy(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

fn param_i64(request: &MockRequest, key: &str) -> Option<i64> {
    request.param(key).and_then(|raw| raw.trim().parse().ok())
}

fn param_f64(request: &MockRequest, key: &str) -> Option<f64> {
    request
        .param(key)
        .and_then(|raw| raw.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}
