//! End-to-end flows through the hub: matchmaking, the readiness handshake,
//! paddle-input forwarding, bot matches and disconnect forfeits. The
//! transport is bypassed; each test registers outbound channels directly
//! with the broadcaster, exactly as a connection task would.

use axum::extract::ws::Message;
use tokio::sync::mpsc;

use pong_server::match_queue::MatchQueue;
use pong_server::{hub, AppState};
use pong_shared::{ClientMessage, PlayerId, ServerMessage, PADDLE_MAX_Y};

fn connect(app: &AppState, name: &str) -> (PlayerId, mpsc::UnboundedReceiver<Message>) {
    let player = PlayerId::from(name);
    let (tx, rx) = mpsc::unbounded_channel();
    app.broadcaster.register(player.clone(), tx);
    (player, rx)
}

fn parse(message: Message) -> ServerMessage {
    match message {
        Message::Text(text) => serde_json::from_str(&text).expect("valid server message"),
        other => panic!("expected text frame, got {other:?}"),
    }
}

fn recv_one(rx: &mut mpsc::UnboundedReceiver<Message>) -> ServerMessage {
    parse(rx.try_recv().expect("expected a pending message"))
}

fn maybe_recv(rx: &mut mpsc::UnboundedReceiver<Message>) -> Option<ServerMessage> {
    rx.try_recv().ok().map(parse)
}

fn drain(rx: &mut mpsc::UnboundedReceiver<Message>) {
    while rx.try_recv().is_ok() {}
}

async fn matched_pair(
    app: &AppState,
) -> (
    PlayerId,
    mpsc::UnboundedReceiver<Message>,
    PlayerId,
    mpsc::UnboundedReceiver<Message>,
) {
    let (a, mut a_rx) = connect(app, "alice");
    let (b, mut b_rx) = connect(app, "bob");
    hub::handle_message(app, &a, ClientMessage::JoinMatchmaking).await;
    hub::handle_message(app, &b, ClientMessage::JoinMatchmaking).await;
    drain(&mut a_rx);
    drain(&mut b_rx);
    (a, a_rx, b, b_rx)
}

#[tokio::test]
async fn matchmaking_pairs_in_fifo_order() {
    let app = AppState::new(MatchQueue::in_memory());
    let (a, mut a_rx) = connect(&app, "alice");
    let (b, mut b_rx) = connect(&app, "bob");

    hub::handle_message(&app, &a, ClientMessage::JoinMatchmaking).await;
    assert_eq!(recv_one(&mut a_rx), ServerMessage::WaitingForOpponent);

    hub::handle_message(&app, &b, ClientMessage::JoinMatchmaking).await;

    // The earlier joiner takes the left seat.
    assert_eq!(
        recv_one(&mut a_rx),
        ServerMessage::MatchFound {
            opponent: b.to_string(),
            side: 1,
            is_bot: false,
        }
    );
    assert_eq!(
        recv_one(&mut b_rx),
        ServerMessage::MatchFound {
            opponent: a.to_string(),
            side: 2,
            is_bot: false,
        }
    );
    assert_eq!(app.sessions.count().await, 1);
    assert_eq!(app.queue.depth().await.unwrap(), 0);
}

#[tokio::test]
async fn double_join_while_waiting_never_self_pairs() {
    let app = AppState::new(MatchQueue::in_memory());
    let (a, mut a_rx) = connect(&app, "alice");

    hub::handle_message(&app, &a, ClientMessage::JoinMatchmaking).await;
    hub::handle_message(&app, &a, ClientMessage::JoinMatchmaking).await;

    assert_eq!(recv_one(&mut a_rx), ServerMessage::WaitingForOpponent);
    assert_eq!(recv_one(&mut a_rx), ServerMessage::WaitingForOpponent);
    assert!(maybe_recv(&mut a_rx).is_none());
    assert_eq!(app.sessions.count().await, 0);
}

#[tokio::test]
async fn joining_mid_game_is_rejected() {
    let app = AppState::new(MatchQueue::in_memory());
    let (a, mut a_rx, _b, _b_rx) = matched_pair(&app).await;

    hub::handle_message(&app, &a, ClientMessage::JoinMatchmaking).await;

    assert_eq!(recv_one(&mut a_rx), ServerMessage::AlreadyInGame);
    assert_eq!(app.sessions.count().await, 1);
}

#[tokio::test]
async fn ready_handshake_starts_once_both_sides_press() {
    let app = AppState::new(MatchQueue::in_memory());
    let (a, mut a_rx, b, mut b_rx) = matched_pair(&app).await;

    hub::handle_message(&app, &a, ClientMessage::RequestStartGame).await;
    assert!(maybe_recv(&mut a_rx).is_none());

    // Pressing again changes nothing.
    hub::handle_message(&app, &a, ClientMessage::RequestStartGame).await;
    assert!(maybe_recv(&mut a_rx).is_none());

    hub::handle_message(&app, &b, ClientMessage::RequestStartGame).await;
    assert_eq!(recv_one(&mut a_rx), ServerMessage::GameStarted);
    assert_eq!(recv_one(&mut b_rx), ServerMessage::GameStarted);

    // GameStarted fires at most once per session.
    hub::handle_message(&app, &b, ClientMessage::RequestStartGame).await;
    assert!(maybe_recv(&mut a_rx).is_none());
    assert!(maybe_recv(&mut b_rx).is_none());
}

#[tokio::test]
async fn paddle_input_is_clamped_and_hinted_to_the_opponent() {
    let app = AppState::new(MatchQueue::in_memory());
    let (a, _a_rx, _b, mut b_rx) = matched_pair(&app).await;

    hub::handle_message(&app, &a, ClientMessage::SendPaddleInput { target_y: 9000.0 }).await;

    assert_eq!(
        recv_one(&mut b_rx),
        ServerMessage::OpponentPaddleInput {
            target_y: PADDLE_MAX_Y
        }
    );
}

#[tokio::test]
async fn disconnect_forfeits_the_game() {
    let app = AppState::new(MatchQueue::in_memory());
    let (a, mut a_rx, b, mut b_rx) = matched_pair(&app).await;

    // Mid-game: both ready, partial score.
    {
        let session = app.sessions.get_by_player(&a).await.unwrap();
        let mut state = session.state.lock().await;
        state.game.left_player_ready = true;
        state.game.right_player_ready = true;
        state.game.left_score = 3;
        state.game.right_score = 1;
    }

    hub::handle_disconnect(&app, &a).await;

    let ServerMessage::OpponentDisconnected(state) = recv_one(&mut b_rx) else {
        panic!("expected OpponentDisconnected");
    };
    assert!(state.game_over);
    assert_eq!(state.winner, 2);
    assert_eq!(state.left_score, 3);
    assert_eq!(state.right_score, 1);
    assert_eq!(app.sessions.count().await, 0);

    // A second disconnect is a no-op.
    hub::handle_disconnect(&app, &a).await;
    assert!(maybe_recv(&mut b_rx).is_none());
    assert!(maybe_recv(&mut a_rx).is_none());

    // The survivor is free to queue again.
    hub::handle_message(&app, &b, ClientMessage::JoinMatchmaking).await;
    assert_eq!(recv_one(&mut b_rx), ServerMessage::WaitingForOpponent);
}

#[tokio::test]
async fn waiting_player_disconnect_leaves_the_queue() {
    let app = AppState::new(MatchQueue::in_memory());
    let (a, mut a_rx) = connect(&app, "alice");

    hub::handle_message(&app, &a, ClientMessage::JoinMatchmaking).await;
    assert_eq!(recv_one(&mut a_rx), ServerMessage::WaitingForOpponent);

    hub::handle_disconnect(&app, &a).await;
    assert_eq!(app.queue.depth().await.unwrap(), 0);
}

#[tokio::test]
async fn bot_match_is_ready_immediately() {
    let app = AppState::new(MatchQueue::in_memory());
    let (a, mut a_rx) = connect(&app, "alice");

    hub::handle_message(&app, &a, ClientMessage::StartBotMatch).await;

    assert_eq!(
        recv_one(&mut a_rx),
        ServerMessage::MatchFound {
            opponent: "Bot".to_string(),
            side: 1,
            is_bot: true,
        }
    );

    let session = app.sessions.get_by_player(&a).await.unwrap();
    assert!(session.is_bot_match());
    assert!(session.state.lock().await.game.players_ready());

    // The readiness handshake is a no-op against a bot.
    hub::handle_message(&app, &a, ClientMessage::RequestStartGame).await;
    assert!(maybe_recv(&mut a_rx).is_none());

    // Paddle input produces no hint; the bot has no connection.
    hub::handle_message(&app, &a, ClientMessage::SendPaddleInput { target_y: 100.0 }).await;
    assert!(maybe_recv(&mut a_rx).is_none());
}

#[tokio::test]
async fn starting_a_bot_match_leaves_the_matchmaking_queue() {
    let app = AppState::new(MatchQueue::in_memory());
    let (a, mut a_rx) = connect(&app, "alice");
    let (b, mut b_rx) = connect(&app, "bob");

    hub::handle_message(&app, &a, ClientMessage::JoinMatchmaking).await;
    assert_eq!(recv_one(&mut a_rx), ServerMessage::WaitingForOpponent);

    // Impatient: fall back to a bot while still queued.
    hub::handle_message(&app, &a, ClientMessage::StartBotMatch).await;
    assert!(matches!(
        recv_one(&mut a_rx),
        ServerMessage::MatchFound { is_bot: true, .. }
    ));
    assert_eq!(app.queue.depth().await.unwrap(), 0);

    // A later joiner waits instead of pairing against the stale entry.
    hub::handle_message(&app, &b, ClientMessage::JoinMatchmaking).await;
    assert_eq!(recv_one(&mut b_rx), ServerMessage::WaitingForOpponent);
    assert!(maybe_recv(&mut a_rx).is_none());
    assert_eq!(app.sessions.count().await, 1);
}

#[tokio::test]
async fn keepalive_answers_with_a_timestamp() {
    let app = AppState::new(MatchQueue::in_memory());
    let (a, mut a_rx) = connect(&app, "alice");

    hub::handle_message(&app, &a, ClientMessage::KeepAlive).await;

    let ServerMessage::Pong { timestamp } = recv_one(&mut a_rx) else {
        panic!("expected Pong");
    };
    assert!(timestamp > 0);
}

#[tokio::test]
async fn matchmaking_is_refused_while_the_store_is_down() {
    let app = AppState::new(MatchQueue::unavailable("connection refused"));
    let (a, mut a_rx) = connect(&app, "alice");

    hub::handle_message(&app, &a, ClientMessage::JoinMatchmaking).await;
    assert!(maybe_recv(&mut a_rx).is_none());
    assert_eq!(app.sessions.count().await, 0);

    // Bot matches never touch the store.
    hub::handle_message(&app, &a, ClientMessage::StartBotMatch).await;
    assert!(matches!(
        recv_one(&mut a_rx),
        ServerMessage::MatchFound { is_bot: true, .. }
    ));
}
