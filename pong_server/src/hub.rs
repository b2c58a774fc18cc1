//! Per-connection message handling. Each WebSocket upgrade spawns one task
//! that pumps the outbound channel into the sink and dispatches inbound
//! frames; the closed set of client messages is matched in one place.
//! Handlers never hold a session lock across a send or other await.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use pong_shared::{ClientMessage, GameState, PlayerId, ServerMessage};

use crate::session_store::{Session, SessionStoreError};
use crate::AppState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, app))
}

async fn handle_connection(socket: WebSocket, app: Arc<AppState>) {
    let player = PlayerId::random();
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel();

    app.broadcaster.register(player.clone(), tx);
    info!(%player, "client connected");

    loop {
        tokio::select! {
            // Outbound: broadcaster -> socket.
            Some(msg) = rx.recv() => {
                if ws_tx.send(msg).await.is_err() {
                    break;
                }
            }

            // Inbound: socket -> dispatch.
            inbound = ws_rx.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(message) => handle_message(&app, &player, message).await,
                            Err(err) => debug!(%player, %err, "ignoring malformed frame"),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        debug!(%player, %err, "websocket error");
                        break;
                    }
                }
            }
        }
    }

    let _ = ws_tx.close().await;
    app.broadcaster.unregister(&player);
    handle_disconnect(&app, &player).await;
    info!(%player, "client disconnected");
}

pub async fn handle_message(app: &AppState, player: &PlayerId, message: ClientMessage) {
    match message {
        ClientMessage::JoinMatchmaking => join_matchmaking(app, player).await,
        ClientMessage::StartBotMatch => start_bot_match(app, player).await,
        ClientMessage::SendPaddleInput { target_y } => paddle_input(app, player, target_y).await,
        ClientMessage::RequestStartGame => request_start_game(app, player).await,
        ClientMessage::KeepAlive => {
            app.broadcaster
                .send(player, &ServerMessage::Pong { timestamp: now_ms() })
                .await;
        }
    }
}

async fn join_matchmaking(app: &AppState, player: &PlayerId) {
    if has_active_session(app, player).await {
        app.broadcaster
            .send(player, &ServerMessage::AlreadyInGame)
            .await;
        return;
    }

    if let Err(err) = app.queue.enqueue(player).await {
        warn!(%player, %err, "matchmaking enqueue failed");
        return;
    }
    match app.queue.pair_pop().await {
        Ok(Some((left, right))) => create_match(app, left, right).await,
        Ok(None) => {
            app.broadcaster
                .send(player, &ServerMessage::WaitingForOpponent)
                .await;
        }
        Err(err) => warn!(%player, %err, "matchmaking pair pop failed"),
    }
}

async fn create_match(app: &AppState, left: PlayerId, right: PlayerId) {
    let session = Session::new(left.clone(), right.clone(), GameState::new());
    match app.sessions.create(session).await {
        Ok(_) => {
            info!(%left, %right, "match created");
            app.broadcaster
                .send(
                    &left,
                    &ServerMessage::MatchFound {
                        opponent: right.to_string(),
                        side: 1,
                        is_bot: false,
                    },
                )
                .await;
            app.broadcaster
                .send(
                    &right,
                    &ServerMessage::MatchFound {
                        opponent: left.to_string(),
                        side: 2,
                        is_bot: false,
                    },
                )
                .await;
        }
        Err(SessionStoreError::PlayerBusy(busy)) => {
            // Lost a race with another pairing; put the free player back in
            // line rather than dropping them.
            warn!(%busy, "matched player already in a session");
            let other = if busy == left { right } else { left };
            if let Err(err) = app.queue.enqueue(&other).await {
                warn!(player = %other, %err, "failed to requeue player");
            }
            app.broadcaster
                .send(&other, &ServerMessage::WaitingForOpponent)
                .await;
        }
    }
}

async fn start_bot_match(app: &AppState, player: &PlayerId) {
    if has_active_session(app, player).await {
        app.broadcaster
            .send(player, &ServerMessage::AlreadyInGame)
            .await;
        return;
    }

    // A caller may still be waiting in matchmaking; a stale entry would
    // later pair them while they are mid-bot-game.
    if let Err(err) = app.queue.remove(player).await {
        warn!(%player, %err, "failed to remove player from match queue");
    }

    // Bots have no connection and no readiness handshake.
    let mut game = GameState::new();
    game.left_player_ready = true;
    game.right_player_ready = true;
    let session = Session::new(player.clone(), PlayerId::bot(), game);

    match app.sessions.create(session).await {
        Ok(_) => {
            info!(%player, "bot match created");
            app.broadcaster
                .send(
                    player,
                    &ServerMessage::MatchFound {
                        opponent: "Bot".to_string(),
                        side: 1,
                        is_bot: true,
                    },
                )
                .await;
        }
        Err(err) => warn!(%player, %err, "failed to create bot session"),
    }
}

async fn paddle_input(app: &AppState, player: &PlayerId, target_y: f32) {
    let Some(clamped) = app.inputs.put(player, target_y) else {
        debug!(%player, target_y, "dropping invalid paddle target");
        return;
    };

    // Visual-only hint for a real opponent; the authoritative position
    // still comes from the next tick's GameUpdate.
    let Some(session) = app.sessions.get_by_player(player).await else {
        return;
    };
    if let Some(opponent) = session.opponent_of(player) {
        if !opponent.is_bot() {
            app.broadcaster
                .send(
                    opponent,
                    &ServerMessage::OpponentPaddleInput { target_y: clamped },
                )
                .await;
        }
    }
}

async fn request_start_game(app: &AppState, player: &PlayerId) {
    let Some(session) = app.sessions.get_by_player(player).await else {
        return;
    };
    if session.is_bot_match() {
        // Readiness was set at session creation.
        return;
    }

    let started = {
        let mut state = session.state.lock().await;
        let was_ready = state.game.players_ready();
        match session.side_of(player) {
            Some(1) => state.game.left_player_ready = true,
            Some(2) => state.game.right_player_ready = true,
            _ => return,
        }
        !was_ready && state.game.players_ready()
    };

    if started {
        info!(session = %session.id, "both players ready");
        app.broadcaster
            .send(&session.player1, &ServerMessage::GameStarted)
            .await;
        app.broadcaster
            .send(&session.player2, &ServerMessage::GameStarted)
            .await;
    }
}

/// Forfeit handling for a dropped connection. Safe to call more than once:
/// after the first pass the session is gone and the rest is a no-op.
pub async fn handle_disconnect(app: &AppState, player: &PlayerId) {
    if let Err(err) = app.queue.remove(player).await {
        warn!(%player, %err, "failed to remove player from match queue");
    }
    app.inputs.remove(player);

    let Some(session) = app.sessions.get_by_player(player).await else {
        return;
    };

    let final_state = {
        let mut state = session.state.lock().await;
        if state.game.game_over {
            None
        } else {
            state.game.game_over = true;
            state.game.winner = match session.side_of(player) {
                Some(1) => 2,
                _ => 1,
            };
            state.game.sequence_number += 1;
            Some(state.game.clone())
        }
    };

    // Session lock released before touching the store or the network.
    app.sessions.remove(&session.id).await;

    if let Some(state) = final_state {
        info!(session = %session.id, %player, "player disconnected mid-game");
        if let Some(survivor) = session.opponent_of(player) {
            if !survivor.is_bot() {
                app.broadcaster
                    .send(survivor, &ServerMessage::OpponentDisconnected(state))
                    .await;
            }
        }
    }
}

async fn has_active_session(app: &AppState, player: &PlayerId) -> bool {
    match app.sessions.get_by_player(player).await {
        Some(session) => !session.state.lock().await.game.game_over,
        None => false,
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
