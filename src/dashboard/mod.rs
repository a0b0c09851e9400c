use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::{get, post},
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tracing::{debug, warn};

use crate::feed::playback::PlaybackCommand;
use crate::feed::scheduler::VisibilityReport;
use crate::feed::{FeedHandle, OddsUpdate};
use crate::models::Side;
use crate::session::{GrantError, WagerError};

#[derive(Clone)]
pub struct AppState {
    pub handle: FeedHandle,
    pub playback_tx: broadcast::Sender<PlaybackCommand>,
    pub odds_tx: broadcast::Sender<OddsUpdate>,
    pub default_wager: u64,
    pub min_spinner: Duration,
}

/// Build the Axum router for the feed UI and its API.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/api/feed", get(feed_handler))
        .route("/api/profile", get(profile_handler))
        .route("/api/wager", post(wager_handler))
        .route("/api/points/grant", post(grant_handler))
        .route("/api/waitlist", post(waitlist_handler))
        .route("/api/feed/visible", post(visibility_handler))
        .route("/api/feed/pause", post(pause_handler))
        .route("/api/feed/mute", post(mute_handler))
        .route("/api/feed/mount", post(mount_handler))
        .route("/api/feed/unmount", post(unmount_handler))
        .route("/api/page-visibility", post(page_visibility_handler))
        .route("/ws", get(ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

type ApiError = (StatusCode, String);

fn internal(e: anyhow::Error) -> ApiError {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

/// Every wager rejection maps to a client-addressable status; the body
/// carries the human-readable reason.
fn wager_status(err: &WagerError) -> StatusCode {
    match err {
        WagerError::InvalidAmount => StatusCode::BAD_REQUEST,
        WagerError::InsufficientBalance { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        WagerError::UnknownEvent(_) => StatusCode::NOT_FOUND,
        WagerError::EventSettled(_) | WagerError::AlreadyWagered(_) => StatusCode::CONFLICT,
    }
}

async fn index_handler() -> impl IntoResponse {
    Html(FEED_HTML)
}

/// GET /api/feed
async fn feed_handler(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    state.handle.feed().await.map(Json).map_err(internal)
}

/// GET /api/profile
async fn profile_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    state.handle.profile().await.map(Json).map_err(internal)
}

#[derive(Debug, Deserialize)]
struct WagerRequest {
    event_id: String,
    side: Side,
    /// Omitted for one-tap votes; the configured default applies
    amount: Option<u64>,
}

/// POST /api/wager
async fn wager_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<WagerRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let amount = req.amount.unwrap_or(state.default_wager);
    let outcome = state
        .handle
        .place_wager(req.event_id, req.side, amount)
        .await
        .map_err(internal)?;
    match outcome {
        Ok(outcome) => Ok(Json(outcome)),
        Err(err) => Err((wager_status(&err), err.to_string())),
    }
}

#[derive(Debug, Deserialize)]
struct GrantRequest {
    amount: u64,
}

/// POST /api/points/grant
async fn grant_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GrantRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state
        .handle
        .grant_points(req.amount)
        .await
        .map_err(internal)?;
    match result {
        Ok(balance) => Ok(Json(serde_json::json!({ "balance": balance }))),
        Err(err @ GrantError::InvalidAmount) => Err((StatusCode::BAD_REQUEST, err.to_string())),
    }
}

#[derive(Debug, Deserialize)]
struct WaitlistRequest {
    email: String,
    #[serde(default)]
    source: Option<String>,
}

/// POST /api/waitlist
///
/// The response is held until the minimum spinner time has passed, so a
/// fast local accept still reads as deliberate in the UI.
async fn waitlist_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<WaitlistRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let source = req.source.unwrap_or_else(|| "Profile Page".to_string());
    let (result, _) = tokio::join!(
        state.handle.join_waitlist(req.email, source),
        tokio::time::sleep(state.min_spinner),
    );
    match result.map_err(internal)? {
        Ok(receipt) => Ok(Json(receipt)),
        Err(err) => Err((StatusCode::UNPROCESSABLE_ENTITY, err.to_string())),
    }
}

/// POST /api/feed/visible
async fn visibility_handler(
    State(state): State<Arc<AppState>>,
    Json(reports): Json<Vec<VisibilityReport>>,
) -> Result<StatusCode, ApiError> {
    state
        .handle
        .report_visibility(reports)
        .await
        .map_err(internal)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/feed/pause
async fn pause_handler(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let paused = state.handle.toggle_pause().await.map_err(internal)?;
    Ok(Json(serde_json::json!({ "paused": paused })))
}

/// POST /api/feed/mute
async fn mute_handler(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let muted = state.handle.toggle_mute().await.map_err(internal)?;
    Ok(Json(serde_json::json!({ "muted": muted })))
}

#[derive(Debug, Deserialize)]
struct MountRequest {
    event_id: String,
}

/// POST /api/feed/mount
async fn mount_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MountRequest>,
) -> Result<StatusCode, ApiError> {
    state.handle.mount(req.event_id).await.map_err(internal)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/feed/unmount
async fn unmount_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MountRequest>,
) -> Result<StatusCode, ApiError> {
    state.handle.unmount(req.event_id).await.map_err(internal)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct PageVisibilityRequest {
    visible: bool,
}

/// POST /api/page-visibility
async fn page_visibility_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PageVisibilityRequest>,
) -> Result<StatusCode, ApiError> {
    if req.visible {
        state.handle.page_visible().await.map_err(internal)?;
    } else {
        state.handle.page_hidden().await.map_err(internal)?;
    }
    Ok(StatusCode::NO_CONTENT)
}

/// GET /ws — pushes playback commands and odds updates to the client.
async fn ws_handler(
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| client_stream(socket, state))
}

async fn client_stream(socket: WebSocket, state: Arc<AppState>) {
    let (mut sink, mut stream) = socket.split();
    let mut playback = state.playback_tx.subscribe();
    let mut odds = state.odds_tx.subscribe();
    debug!("Websocket client connected");
    loop {
        tokio::select! {
            cmd = playback.recv() => match cmd {
                Ok(cmd) => {
                    let msg = serde_json::json!({ "type": "playback", "command": cmd });
                    if sink.send(Message::Text(msg.to_string())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Websocket client lagged, skipped {} playback commands", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            update = odds.recv() => match update {
                Ok(update) => {
                    let msg = serde_json::json!({ "type": "odds", "update": update });
                    if sink.send(Message::Text(msg.to_string())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Websocket client lagged, skipped {} odds updates", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = stream.next() => match incoming {
                Some(Ok(_)) => {}
                _ => break,
            },
        }
    }
    debug!("Websocket client disconnected");
}

/// Embedded single-file feed UI (HTML + CSS + JS)
const FEED_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0, viewport-fit=cover">
<title>BattleFeed</title>
<style>
  :root {
    --bg: #0b0b10;
    --card: #15151d;
    --border: #26263a;
    --accent: #6c63ff;
    --green: #00c896;
    --red: #ff4f6a;
    --text: #f0f0f5;
    --muted: #8888aa;
  }
  * { box-sizing: border-box; margin: 0; padding: 0; }
  html, body { height: 100%; background: var(--bg); color: var(--text);
    font-family: 'Segoe UI', system-ui, sans-serif; overflow: hidden; }
  #feed { height: 100%; overflow-y: scroll; scroll-snap-type: y mandatory; }
  .card { position: relative; height: 100%; scroll-snap-align: start;
    scroll-snap-stop: always; background: #000; }
  .card video { width: 100%; height: 100%; object-fit: cover; }
  .overlay { position: absolute; inset: 0; display: flex; flex-direction: column;
    justify-content: flex-end; padding: 1rem 1rem 5.5rem;
    background: linear-gradient(transparent 55%, rgba(0,0,0,0.75)); pointer-events: none; }
  .overlay > * { pointer-events: auto; }
  .brand { font-size: 0.75rem; color: var(--muted); text-transform: uppercase;
    letter-spacing: 0.08em; }
  .title { font-size: 1.05rem; font-weight: 700; margin: 0.3rem 0 0.6rem; }
  .tags { font-size: 0.75rem; color: var(--accent); margin-bottom: 0.8rem; }
  .vote { display: flex; gap: 0.5rem; }
  .vote button { flex: 1; border: 1px solid var(--border); border-radius: 0.8rem;
    padding: 0.7rem 0.5rem; background: rgba(21,21,29,0.85); color: var(--text);
    font-size: 0.9rem; cursor: pointer; }
  .vote button .mult { display: block; font-size: 0.75rem; color: var(--green); }
  .vote button.a.active, .vote button.b.active { border-color: var(--accent); }
  .pool-bar { display: flex; height: 6px; border-radius: 3px; overflow: hidden;
    margin-top: 0.6rem; }
  .pool-bar .a { background: var(--accent); }
  .pool-bar .b { background: var(--red); }
  .pool-pct { display: flex; justify-content: space-between; font-size: 0.7rem;
    color: var(--muted); margin-top: 0.25rem; }
  .voted { margin-top: 0.6rem; font-size: 0.85rem; color: var(--green); }
  .mute-btn { position: absolute; top: 1rem; right: 1rem; z-index: 5;
    background: rgba(0,0,0,0.5); border: none; color: var(--text);
    border-radius: 50%; width: 2.6rem; height: 2.6rem; font-size: 1.1rem; cursor: pointer; }
  .pause-badge { position: absolute; top: 50%; left: 50%; transform: translate(-50%,-50%);
    font-size: 3rem; opacity: 0; transition: opacity 0.15s; pointer-events: none; }
  .card.paused .pause-badge { opacity: 0.85; }
  #guide { position: fixed; bottom: 7.5rem; left: 50%; transform: translateX(-50%);
    background: var(--accent); color: #fff; padding: 0.6rem 1rem; border-radius: 1rem;
    font-size: 0.85rem; z-index: 20; display: none; }
  nav { position: fixed; bottom: 0; left: 0; right: 0; display: flex;
    border-top: 1px solid var(--border); background: var(--card); z-index: 10; }
  nav button { flex: 1; background: none; border: none; color: var(--muted);
    padding: 0.9rem 0; font-size: 0.85rem; cursor: pointer; }
  nav button.active { color: var(--text); }
  #wallet-pill { position: fixed; top: 1rem; left: 1rem; z-index: 10;
    background: rgba(0,0,0,0.55); border: 1px solid var(--border); color: var(--text);
    border-radius: 1rem; padding: 0.35rem 0.9rem; font-size: 0.85rem; cursor: pointer; }
  .drawer { position: fixed; inset: 0; background: rgba(0,0,0,0.6); z-index: 30;
    display: none; align-items: flex-end; }
  .drawer.open { display: flex; }
  .drawer .sheet { background: var(--card); width: 100%; border-radius: 1rem 1rem 0 0;
    padding: 1.2rem; max-height: 75%; overflow-y: auto; }
  .sheet h2 { font-size: 1.1rem; margin-bottom: 0.8rem; }
  .sheet .row { display: flex; justify-content: space-between; padding: 0.5rem 0;
    border-bottom: 1px solid var(--border); font-size: 0.9rem; }
  .sheet .row .muted { color: var(--muted); }
  #profile { position: fixed; inset: 0; background: var(--bg); z-index: 15;
    display: none; overflow-y: auto; padding: 1.2rem 1.2rem 5.5rem; }
  #profile.open { display: block; }
  #profile .asset { background: var(--card); border: 1px solid var(--border);
    border-radius: 1rem; padding: 1rem; margin: 1rem 0; }
  #profile .asset .big { font-size: 1.8rem; font-weight: 700; }
  #waitlist-form { display: flex; gap: 0.5rem; margin-top: 0.8rem; }
  #waitlist-form input { flex: 1; background: var(--bg); border: 1px solid var(--border);
    border-radius: 0.6rem; padding: 0.6rem; color: var(--text); }
  #waitlist-form button { background: var(--accent); border: none; color: #fff;
    border-radius: 0.6rem; padding: 0.6rem 1rem; cursor: pointer; min-width: 5.5rem; }
  .spin { display: inline-block; width: 1em; height: 1em; border: 2px solid #fff;
    border-top-color: transparent; border-radius: 50%; animation: spin 0.7s linear infinite; }
  @keyframes spin { to { transform: rotate(360deg); } }
  .bet-row { font-size: 0.85rem; }
</style>
</head>
<body>
<button id="wallet-pill">&#11044; <span id="balance">0</span> pts</button>
<button class="mute-btn" id="mute-btn">&#128263;</button>
<div id="feed"></div>
<div id="guide">Tap an option to place your 10-point vote!</div>

<div id="profile">
  <h2>Profile</h2>
  <div class="asset">
    <div class="muted">Total asset value</div>
    <div class="big"><span id="asset-value">0</span> pts</div>
    <div class="muted">Pending winnings: <span id="pending">0</span> pts</div>
  </div>
  <h2>My votes</h2>
  <div id="bets"></div>
  <div class="asset" id="waitlist-card">
    <div>Join the waitlist to keep your points at launch</div>
    <form id="waitlist-form">
      <input type="email" id="waitlist-email" placeholder="you@example.com" required>
      <button type="submit" id="waitlist-btn">Join</button>
    </form>
    <div class="muted" id="waitlist-status"></div>
  </div>
</div>

<div class="drawer" id="wallet-drawer">
  <div class="sheet">
    <h2>Wallet</h2>
    <div class="row"><span class="muted">Balance</span><span><span id="drawer-balance">0</span> pts</span></div>
    <div class="row"><span class="muted">Daily bonus</span><button onclick="grant(500)">Claim 500</button></div>
    <div class="row"><span class="muted">Top up</span><button onclick="grant(5000)">Get 5000</button></div>
  </div>
</div>

<nav>
  <button id="nav-feed" class="active">Feed</button>
  <button id="nav-profile">Profile</button>
</nav>

<script>
let state = null;
const players = {};

async function api(path, body, method) {
  const resp = await fetch(path, {
    method: method || (body === undefined ? 'GET' : 'POST'),
    headers: { 'Content-Type': 'application/json' },
    body: body === undefined ? undefined : JSON.stringify(body),
  });
  if (!resp.ok) throw new Error(await resp.text());
  return resp.status === 204 ? null : resp.json();
}

function renderCard(ev) {
  const card = document.createElement('div');
  card.className = 'card';
  card.dataset.id = ev.id;
  card.innerHTML = `
    <video playsinline loop muted poster="${ev.poster_url}" data-src="${ev.video_url}"></video>
    <div class="pause-badge">&#10074;&#10074;</div>
    <div class="overlay">
      <div class="brand">${ev.brand_name || ''}</div>
      <div class="title">${ev.title}</div>
      <div class="tags">${(ev.tags || []).join(' ')}</div>
      <div class="vote">
        <button class="a">${ev.option_a}<span class="mult">x${ev.odds.multiplier_a}</span></button>
        <button class="b">${ev.option_b}<span class="mult">x${ev.odds.multiplier_b}</span></button>
      </div>
      <div class="pool-bar">
        <div class="a" style="width:${ev.odds.percent_a}%"></div>
        <div class="b" style="width:${ev.odds.percent_b}%"></div>
      </div>
      <div class="pool-pct">
        <span>${ev.odds.percent_a}%</span><span>${ev.odds.percent_b}%</span>
      </div>
      <div class="voted"></div>
    </div>`;
  card.querySelector('.vote .a').onclick = (e) => { e.stopPropagation(); vote(ev.id, 'A'); };
  card.querySelector('.vote .b').onclick = (e) => { e.stopPropagation(); vote(ev.id, 'B'); };
  card.onclick = () => api('/api/feed/pause', {}).then(r => {
    card.classList.toggle('paused', r.paused);
  });
  if (ev.wager) markVoted(card, ev);
  return card;
}

function markVoted(card, ev) {
  card.querySelector('.vote').style.display = 'none';
  const w = ev.wager;
  card.querySelector('.voted').textContent =
    `You put ${w.amount} pts on ${w.side === 'A' ? ev.option_a : ev.option_b}` +
    (w.potential_win ? ` — win ${w.potential_win} pts` : '');
}

function updateOdds(cardEl, odds) {
  cardEl.querySelector('.vote .a .mult').textContent = 'x' + odds.multiplier_a;
  cardEl.querySelector('.vote .b .mult').textContent = 'x' + odds.multiplier_b;
  cardEl.querySelector('.pool-bar .a').style.width = odds.percent_a + '%';
  cardEl.querySelector('.pool-bar .b').style.width = odds.percent_b + '%';
  const pct = cardEl.querySelectorAll('.pool-pct span');
  pct[0].textContent = odds.percent_a + '%';
  pct[1].textContent = odds.percent_b + '%';
}

async function vote(eventId, side) {
  try {
    const outcome = await api('/api/wager', { event_id: eventId, side });
    document.getElementById('guide').style.display = 'none';
    setBalance(outcome.balance);
    const card = document.querySelector(`.card[data-id="${eventId}"]`);
    const ev = state.events.find(e => e.id === eventId);
    ev.wager = outcome.wager;
    ev.odds = outcome.odds;
    updateOdds(card, outcome.odds);
    markVoted(card, ev);
  } catch (err) {
    alert(err.message);
  }
}

async function grant(amount) {
  const r = await api('/api/points/grant', { amount });
  setBalance(r.balance);
}

function setBalance(balance) {
  state.balance = balance;
  document.getElementById('balance').textContent = balance;
  document.getElementById('drawer-balance').textContent = balance;
}

// Playback commands arrive over the websocket; the client only obeys
function applyCommand(cmd) {
  const video = document.querySelector(`.card[data-id="${cmd.event_id}"] video`);
  if (!video) return;
  if (cmd.action === 'play') video.play().catch(() => {});
  if (cmd.action === 'pause') { video.pause(); if (cmd.reset) video.currentTime = 0; }
  if (cmd.action === 'set_muted') video.muted = cmd.muted;
  if (cmd.action === 'set_volume') video.volume = cmd.volume;
  if (cmd.action === 'set_preload') {
    if (cmd.preload && !video.src) video.src = video.dataset.src;
    if (!cmd.preload && video.src) { video.removeAttribute('src'); video.load(); }
  }
}

function connectWs() {
  const ws = new WebSocket(`${location.protocol === 'https:' ? 'wss' : 'ws'}://${location.host}/ws`);
  ws.onmessage = (msg) => {
    const data = JSON.parse(msg.data);
    if (data.type === 'playback') applyCommand(data.command);
    if (data.type === 'odds') {
      const card = document.querySelector(`.card[data-id="${data.update.event_id}"]`);
      if (card) updateOdds(card, data.update.odds);
    }
  };
  ws.onclose = () => setTimeout(connectWs, 1000);
}

async function loadProfile() {
  const p = await api('/api/profile');
  document.getElementById('asset-value').textContent = p.total_asset_value;
  document.getElementById('pending').textContent = p.pending_winnings;
  document.getElementById('bets').innerHTML = p.wagers.map(w =>
    `<div class="row bet-row"><span>${w.event_title}</span>` +
    `<span>${w.amount} pts on ${w.option_label}</span></div>`
  ).join('') || '<div class="muted">No votes yet</div>';
  if (p.waitlist_joined) {
    document.getElementById('waitlist-form').style.display = 'none';
    document.getElementById('waitlist-status').textContent =
      `You're on the list as ${p.waitlist_email}`;
  }
}

async function init() {
  state = await api('/api/feed');
  setBalance(state.balance);
  const feed = document.getElementById('feed');
  const observer = new IntersectionObserver((entries) => {
    api('/api/feed/visible', entries.map(e => ({
      event_id: e.target.dataset.id,
      ratio: e.intersectionRatio,
    }))).catch(() => {});
  }, { threshold: [0, 0.6, 1] });

  for (const ev of state.events) {
    const card = renderCard(ev);
    feed.appendChild(card);
    observer.observe(card);
    await api('/api/feed/mount', { event_id: ev.id });
  }
  if (!state.vote_guide_seen) {
    document.getElementById('guide').style.display = 'block';
  }
  connectWs();
}

document.getElementById('mute-btn').onclick = async () => {
  const r = await api('/api/feed/mute', {});
  document.getElementById('mute-btn').innerHTML = r.muted ? '&#128263;' : '&#128266;';
};

document.getElementById('wallet-pill').onclick = () =>
  document.getElementById('wallet-drawer').classList.add('open');
document.getElementById('wallet-drawer').onclick = (e) => {
  if (e.target.id === 'wallet-drawer') e.target.classList.remove('open');
};

document.getElementById('nav-profile').onclick = () => {
  document.getElementById('profile').classList.add('open');
  document.getElementById('nav-profile').classList.add('active');
  document.getElementById('nav-feed').classList.remove('active');
  loadProfile();
};
document.getElementById('nav-feed').onclick = () => {
  document.getElementById('profile').classList.remove('open');
  document.getElementById('nav-feed').classList.add('active');
  document.getElementById('nav-profile').classList.remove('active');
};

document.getElementById('waitlist-form').onsubmit = async (e) => {
  e.preventDefault();
  const btn = document.getElementById('waitlist-btn');
  btn.innerHTML = '<span class="spin"></span>';
  btn.disabled = true;
  try {
    const r = await api('/api/waitlist', {
      email: document.getElementById('waitlist-email').value,
      source: 'Profile Page',
    });
    document.getElementById('waitlist-form').style.display = 'none';
    document.getElementById('waitlist-status').textContent =
      `You're on the list as ${r.email}`;
  } catch (err) {
    document.getElementById('waitlist-status').textContent = 'That email does not look right.';
    btn.innerHTML = 'Join';
    btn.disabled = false;
  }
};

document.addEventListener('visibilitychange', () => {
  const body = JSON.stringify({ visible: !document.hidden });
  navigator.sendBeacon('/api/page-visibility', new Blob([body], { type: 'application/json' }));
});
window.addEventListener('pagehide', () => {
  const body = JSON.stringify({ visible: false });
  navigator.sendBeacon('/api/page-visibility', new Blob([body], { type: 'application/json' }));
});

init();
</script>
</body>
</html>"#;
