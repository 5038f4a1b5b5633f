//! End-to-end matches over real WebSocket connections.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream};

use champion_arena::game::state::{Attributes, MatchOutcome, ParticipantId};
use champion_arena::game::tick::{MatchConfig, StartMode};
use champion_arena::network::protocol::{ChampionData, ClientMessage, ErrorCode, ServerMessage};
use champion_arena::network::{GameServer, ServerConfig, SessionConfig};
use champion_arena::store::{ChampionStatus, ChampionStatusStore, InMemoryChampionStore};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(10);

fn fast_config() -> ServerConfig {
    ServerConfig {
        session: SessionConfig {
            match_config: MatchConfig {
                start_mode: StartMode::Countdown,
                countdown_secs: 1,
                ..MatchConfig::default()
            },
            tick_interval: Duration::from_millis(20),
            movement_interval: Duration::from_millis(40),
            teardown_grace: Duration::from_millis(100),
            ..SessionConfig::default()
        },
        ..ServerConfig::default()
    }
}

async fn start_server(config: ServerConfig) -> (SocketAddr, Arc<GameServer>, Arc<InMemoryChampionStore>) {
    let store = Arc::new(InMemoryChampionStore::new());
    let server = Arc::new(GameServer::new(config, store.clone()));
    let listener = TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0))).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let running = server.clone();
    tokio::spawn(async move { running.serve(listener).await });

    (addr, server, store)
}

async fn ws_connect(addr: SocketAddr) -> Ws {
    let (ws, _resp) = connect_async(format!("ws://{}", addr)).await.unwrap();
    ws
}

async fn ws_send(ws: &mut Ws, msg: &ClientMessage) {
    ws.send(WsMessage::Text(msg.to_json().unwrap())).await.unwrap();
}

async fn ws_send_raw(ws: &mut Ws, text: &str) {
    ws.send(WsMessage::Text(text.to_string())).await.unwrap();
}

async fn ws_recv(ws: &mut Ws) -> ServerMessage {
    loop {
        match ws.next().await.unwrap().unwrap() {
            WsMessage::Text(text) => return ServerMessage::from_json(&text).unwrap(),
            _ => {}
        }
    }
}

async fn ws_expect<F>(ws: &mut Ws, mut predicate: F) -> ServerMessage
where
    F: FnMut(&ServerMessage) -> bool,
{
    tokio::time::timeout(WAIT, async {
        loop {
            let msg = ws_recv(ws).await;
            if predicate(&msg) {
                return msg;
            }
        }
    })
    .await
    .unwrap()
}

fn join(id: &str, attributes: Attributes) -> ClientMessage {
    ClientMessage::Join {
        champion_id: id.to_string(),
        champion: Some(ChampionData::from_attributes(id, &id.to_uppercase(), &attributes)),
    }
}

fn brute() -> Attributes {
    Attributes { strength: 80.0, weapon_skill: 40.0, ..Attributes::default() }
}

fn tank() -> Attributes {
    Attributes { hardiness: 100.0, ..Attributes::default() }
}

async fn status(store: &InMemoryChampionStore, id: &str) -> ChampionStatus {
    store.get_status(&ParticipantId::new(id)).await.unwrap()
}

#[tokio::test]
async fn two_champions_fight_to_a_result() {
    let (addr, _server, store) = start_server(fast_config()).await;
    let mut a = ws_connect(addr).await;
    let mut b = ws_connect(addr).await;

    ws_send(&mut a, &join("a", brute())).await;
    let joined = ws_expect(&mut a, |m| matches!(m, ServerMessage::Joined { .. })).await;
    let ServerMessage::Joined { session_id, .. } = joined else { unreachable!() };

    ws_send(&mut b, &join("b", Attributes::default())).await;
    let joined_b = ws_expect(&mut b, |m| matches!(m, ServerMessage::Joined { .. })).await;
    let ServerMessage::Joined { session_id: session_b, .. } = joined_b else { unreachable!() };
    assert_eq!(session_id, session_b);

    ws_expect(&mut a, |m| matches!(m, ServerMessage::PlayerJoined { participant_id, .. } if participant_id.as_str() == "b")).await;
    ws_expect(&mut b, |m| matches!(m, ServerMessage::MatchStarting { .. })).await;
    ws_expect(&mut a, |m| matches!(m, ServerMessage::CombatStart { .. })).await;

    for ws in [&mut a, &mut b] {
        let end = ws_expect(ws, |m| matches!(m, ServerMessage::MatchEnd { .. })).await;
        let ServerMessage::MatchEnd { winner_id, outcome, .. } = end else { unreachable!() };
        assert_eq!(winner_id, Some(ParticipantId::new("a")));
        assert!(matches!(outcome, MatchOutcome::Victory { .. }));
    }

    ws_expect(&mut a, |m| matches!(m, ServerMessage::SessionClosed { .. })).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(status(&store, "a").await, ChampionStatus::Available);
    assert_eq!(status(&store, "b").await, ChampionStatus::Recovering);
}

#[tokio::test]
async fn disconnect_during_combat_forfeits() {
    let (addr, _server, store) = start_server(fast_config()).await;
    let mut a = ws_connect(addr).await;
    let mut b = ws_connect(addr).await;

    ws_send(&mut a, &join("a", tank())).await;
    ws_expect(&mut a, |m| matches!(m, ServerMessage::Joined { .. })).await;
    ws_send(&mut b, &join("b", tank())).await;
    ws_expect(&mut b, |m| matches!(m, ServerMessage::CombatStart { .. })).await;

    b.close(None).await.unwrap();

    ws_expect(&mut a, |m| matches!(m, ServerMessage::PlayerLeft { consented: false, .. })).await;
    let end = ws_expect(&mut a, |m| matches!(m, ServerMessage::MatchEnd { .. })).await;
    let ServerMessage::MatchEnd { winner_id, outcome, .. } = end else { unreachable!() };
    assert_eq!(winner_id, Some(ParticipantId::new("a")));
    assert!(matches!(outcome, MatchOutcome::Forfeit { .. }));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(status(&store, "a").await, ChampionStatus::Available);
    assert_eq!(status(&store, "b").await, ChampionStatus::Available);
}

#[tokio::test]
async fn stance_change_is_broadcast_in_combat() {
    let (addr, _server, _store) = start_server(fast_config()).await;
    let mut a = ws_connect(addr).await;
    let mut b = ws_connect(addr).await;

    ws_send(&mut a, &join("a", tank())).await;
    ws_expect(&mut a, |m| matches!(m, ServerMessage::Joined { .. })).await;
    ws_send(&mut b, &join("b", tank())).await;
    ws_expect(&mut a, |m| matches!(m, ServerMessage::CombatStart { .. })).await;

    ws_send(&mut a, &ClientMessage::SetStance { stance: "aggressive".into() }).await;
    let update = ws_expect(&mut b, |m| {
        matches!(m, ServerMessage::CombatUpdate(champion_arena::network::CombatUpdate::Stance { .. }))
    })
    .await;
    let json = update.to_json().unwrap();
    assert!(json.contains("\"stance\":\"aggressive\""));
}

#[tokio::test]
async fn bad_requests_get_errors() {
    let (addr, _server, _store) = start_server(fast_config()).await;
    let mut ws = ws_connect(addr).await;

    ws_send_raw(&mut ws, "{not json").await;
    let reply = ws_recv(&mut ws).await;
    assert!(matches!(reply, ServerMessage::Error(ref e) if e.code == ErrorCode::InvalidMessage));

    ws_send(&mut ws, &ClientMessage::Join { champion_id: "x".into(), champion: None }).await;
    let reply = ws_recv(&mut ws).await;
    assert!(matches!(reply, ServerMessage::Error(ref e) if e.code == ErrorCode::MissingChampionData));

    ws_send(&mut ws, &ClientMessage::SetStance { stance: "defensive".into() }).await;
    let reply = ws_recv(&mut ws).await;
    assert!(matches!(reply, ServerMessage::Error(ref e) if e.code == ErrorCode::NotInMatch));

    ws_send(&mut ws, &ClientMessage::Ping { timestamp: 42 }).await;
    let reply = ws_recv(&mut ws).await;
    assert!(matches!(reply, ServerMessage::Pong { timestamp: 42, .. }));
}

#[tokio::test]
async fn busy_champion_cannot_join() {
    let (addr, _server, store) = start_server(fast_config()).await;
    store.insert(ParticipantId::new("a"), ChampionStatus::Training).await;
    let mut ws = ws_connect(addr).await;

    ws_send(&mut ws, &join("a", brute())).await;
    let reply = ws_recv(&mut ws).await;
    assert!(matches!(reply, ServerMessage::Error(ref e) if e.code == ErrorCode::ChampionBusy));
    assert_eq!(status(&store, "a").await, ChampionStatus::Training);
}

#[tokio::test]
async fn exploration_match_reaches_an_end() {
    let mut config = fast_config();
    config.session.match_config.start_mode = StartMode::Exploration;
    config.session.match_config.exploration_step_limit = Some(40);
    let (addr, _server, _store) = start_server(config).await;
    let mut a = ws_connect(addr).await;
    let mut b = ws_connect(addr).await;

    ws_send(&mut a, &join("a", brute())).await;
    ws_expect(&mut a, |m| matches!(m, ServerMessage::Joined { .. })).await;
    ws_send(&mut b, &join("b", brute())).await;

    ws_expect(&mut a, |m| matches!(m, ServerMessage::ExplorationStart { .. })).await;
    ws_expect(&mut a, |m| matches!(m, ServerMessage::PositionUpdate { .. })).await;
    ws_expect(&mut a, |m| matches!(m, ServerMessage::MatchEnd { .. })).await;
}

fn sweeping_config() -> ServerConfig {
    ServerConfig {
        idle_timeout: Duration::from_millis(100),
        cleanup_interval: Duration::from_millis(50),
        ..fast_config()
    }
}

#[tokio::test]
async fn silent_players_stay_in_their_match() {
    let (addr, server, store) = start_server(sweeping_config()).await;
    let mut a = ws_connect(addr).await;

    ws_send(&mut a, &join("a", brute())).await;
    ws_expect(&mut a, |m| matches!(m, ServerMessage::Joined { .. })).await;

    // Several sweeps pass while the first player waits without a word
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(server.connection_count().await, 1);
    assert_eq!(status(&store, "a").await, ChampionStatus::Arena);

    let mut b = ws_connect(addr).await;
    ws_send(&mut b, &join("b", Attributes::default())).await;

    for ws in [&mut a, &mut b] {
        let end = ws_expect(ws, |m| matches!(m, ServerMessage::MatchEnd { .. })).await;
        let ServerMessage::MatchEnd { winner_id, outcome, .. } = end else { unreachable!() };
        assert_eq!(winner_id, Some(ParticipantId::new("a")));
        assert!(matches!(outcome, MatchOutcome::Victory { .. }));
    }
}

#[tokio::test]
async fn idle_connection_outside_a_match_is_closed() {
    let (addr, server, _store) = start_server(sweeping_config()).await;
    let mut ws = ws_connect(addr).await;

    let closed = ws_expect(&mut ws, |m| matches!(m, ServerMessage::SessionClosed { .. })).await;
    let ServerMessage::SessionClosed { reason } = closed else { unreachable!() };
    assert_eq!(reason, "idle timeout");

    let next = tokio::time::timeout(WAIT, ws.next()).await.unwrap();
    assert!(matches!(next, Some(Ok(WsMessage::Close(_))) | None));
    assert_eq!(server.connection_count().await, 0);
}
