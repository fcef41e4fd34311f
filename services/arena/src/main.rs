use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State as AxumState;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use cardclash_engine::{
    AuthProvider, Matchmaker, MemoryStore, Orchestrator, RetryPolicy, Rules, RulesConfig, TieBreak,
};
use cardclash_types::{
    Battle, BattleError, BattleId, BattleSnapshot, Move, MoveOutcome, Settlement, UserId,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

#[derive(Clone, Debug)]
struct ArenaConfig {
    wins_required: u32,
    max_rounds: u32,
    retry_attempts: u32,
    retry_backoff_ms: u64,
    cache_ttl_ms: u64,
    starter_cards: usize,
}

impl ArenaConfig {
    fn from_env() -> Self {
        Self {
            wins_required: read_u32("ARENA_WINS_REQUIRED", 3),
            max_rounds: read_u32("ARENA_MAX_ROUNDS", 5),
            retry_attempts: read_u32("ARENA_RETRY_ATTEMPTS", 3),
            retry_backoff_ms: read_u64("ARENA_RETRY_BACKOFF_MS", 1_000),
            cache_ttl_ms: read_u64("ARENA_CACHE_TTL_MS", 5_000),
            starter_cards: read_usize("ARENA_STARTER_CARDS", 3),
        }
    }
}

fn read_u32(key: &str, fallback: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.parse::<u32>().ok())
        .unwrap_or(fallback)
}

fn read_u64(key: &str, fallback: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.parse::<u64>().ok())
        .unwrap_or(fallback)
}

fn read_usize(key: &str, fallback: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.parse::<usize>().ok())
        .unwrap_or(fallback)
}

/// Identity bound to one socket by its `auth` message.
#[derive(Clone, Default)]
struct SocketAuth {
    user: Arc<Mutex<Option<UserId>>>,
}

impl SocketAuth {
    fn sign_in(&self, user: UserId) {
        *self.user.lock().unwrap() = Some(user);
    }

    fn user(&self) -> Option<UserId> {
        *self.user.lock().unwrap()
    }
}

impl AuthProvider for SocketAuth {
    async fn current_user(&self) -> Option<UserId> {
        self.user()
    }
}

#[derive(Clone)]
struct AppState {
    config: ArenaConfig,
    store: MemoryStore,
    orchestrator: Arc<Orchestrator<MemoryStore>>,
    broadcaster: broadcast::Sender<OutboundEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum InboundMessage {
    Auth {
        #[serde(rename = "requestId")]
        request_id: String,
        #[serde(rename = "playerId")]
        player_id: UserId,
    },
    JoinQueue {
        #[serde(rename = "requestId")]
        request_id: String,
    },
    LeaveQueue {
        #[serde(rename = "requestId")]
        request_id: String,
    },
    MakeMove {
        #[serde(rename = "requestId")]
        request_id: String,
        #[serde(rename = "battleId")]
        battle_id: BattleId,
        #[serde(rename = "move")]
        player_move: Move,
    },
    BattleStatus {
        #[serde(rename = "requestId")]
        request_id: String,
        #[serde(rename = "battleId")]
        battle_id: BattleId,
    },
    ActiveBattle {
        #[serde(rename = "requestId")]
        request_id: String,
    },
    CompleteBattle {
        #[serde(rename = "requestId")]
        request_id: String,
        #[serde(rename = "battleId")]
        battle_id: BattleId,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum OutboundResponse {
    #[serde(rename = "ack")]
    Ack {
        #[serde(rename = "requestId")]
        request_id: String,
    },
    #[serde(rename = "error")]
    Error {
        #[serde(rename = "requestId")]
        request_id: String,
        code: String,
        message: String,
    },
    #[serde(rename = "match")]
    Match {
        #[serde(rename = "requestId")]
        request_id: String,
        battle: Option<Battle>,
    },
    #[serde(rename = "move_result")]
    MoveResult {
        #[serde(rename = "requestId")]
        request_id: String,
        outcome: MoveOutcome,
    },
    #[serde(rename = "battle_status")]
    Status {
        #[serde(rename = "requestId")]
        request_id: String,
        snapshot: Option<BattleSnapshot>,
    },
    #[serde(rename = "settled")]
    Settled {
        #[serde(rename = "requestId")]
        request_id: String,
        settlement: Settlement,
    },
}

/// Events fanned out to every socket. Clients filter by the battle and
/// player ids in the payload.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type")]
enum OutboundEvent {
    #[serde(rename = "round")]
    Round {
        #[serde(rename = "battleId")]
        battle_id: BattleId,
        #[serde(rename = "playerId")]
        player_id: UserId,
        round: u32,
        complete: bool,
    },
    #[serde(rename = "battle_over")]
    BattleOver {
        #[serde(rename = "battleId")]
        battle_id: BattleId,
        #[serde(rename = "winnerId")]
        winner_id: Option<UserId>,
    },
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    AxumState(state): AxumState<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let mut broadcast_rx = state.broadcaster.subscribe();

    let write_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let broadcast_task = {
        let tx = tx.clone();
        tokio::spawn(async move {
            while let Ok(event) = broadcast_rx.recv().await {
                if let Ok(payload) = serde_json::to_string(&event) {
                    let _ = tx.send(Message::Text(payload));
                }
            }
        })
    };

    // Identity and matchmaking are per connection; the orchestrator and the
    // store are shared across all of them.
    let auth = SocketAuth::default();
    let matchmaker = Matchmaker::new(state.store.clone(), auth.clone());

    while let Some(Ok(message)) = receiver.next().await {
        match message {
            Message::Text(text) => match serde_json::from_str::<InboundMessage>(&text) {
                Ok(inbound) => {
                    let response = handle_inbound(inbound, &state, &auth, &matchmaker).await;
                    send_response(&tx, response);
                }
                Err(err) => {
                    warn!(?err, "invalid inbound message");
                }
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    write_task.abort();
    broadcast_task.abort();
}

async fn handle_inbound(
    inbound: InboundMessage,
    state: &AppState,
    auth: &SocketAuth,
    matchmaker: &Matchmaker<MemoryStore, SocketAuth>,
) -> OutboundResponse {
    match inbound {
        InboundMessage::Auth {
            request_id,
            player_id,
        } => {
            auth.sign_in(player_id);
            // First-time players get a starter collection so the service is
            // playable on its own; card creation proper lives elsewhere.
            if state.config.starter_cards > 0 && state.store.card_count(&player_id) == 0 {
                state.store.grant_cards(&player_id, state.config.starter_cards);
                info!(player = %player_id, count = state.config.starter_cards, "granted starter cards");
            }
            OutboundResponse::Ack { request_id }
        }
        InboundMessage::JoinQueue { request_id } => {
            let Some(player) = auth.user() else {
                return error_response(request_id, BattleError::AuthenticationRequired);
            };
            match matchmaker.join_queue(&player).await {
                Ok(battle) => OutboundResponse::Match { request_id, battle },
                Err(err) => error_response(request_id, err),
            }
        }
        InboundMessage::LeaveQueue { request_id } => {
            let Some(player) = auth.user() else {
                return error_response(request_id, BattleError::AuthenticationRequired);
            };
            match matchmaker.leave_queue(&player).await {
                Ok(()) => OutboundResponse::Ack { request_id },
                Err(err) => error_response(request_id, err),
            }
        }
        InboundMessage::MakeMove {
            request_id,
            battle_id,
            player_move,
        } => {
            let Some(player) = auth.user() else {
                return error_response(request_id, BattleError::AuthenticationRequired);
            };
            match state
                .orchestrator
                .make_move(battle_id, player, player_move)
                .await
            {
                Ok(outcome) => {
                    if outcome.is_resolved() {
                        let _ = state.broadcaster.send(OutboundEvent::Round {
                            battle_id,
                            player_id: player,
                            round: outcome.round,
                            complete: outcome.complete,
                        });
                    }
                    if outcome.complete {
                        let winner_id = state
                            .orchestrator
                            .get_battle_status(battle_id)
                            .await
                            .ok()
                            .and_then(|snapshot| snapshot.winner);
                        let _ = state.broadcaster.send(OutboundEvent::BattleOver {
                            battle_id,
                            winner_id,
                        });
                    }
                    OutboundResponse::MoveResult {
                        request_id,
                        outcome,
                    }
                }
                Err(err) => error_response(request_id, err),
            }
        }
        InboundMessage::BattleStatus {
            request_id,
            battle_id,
        } => match state.orchestrator.get_battle_status(battle_id).await {
            Ok(snapshot) => OutboundResponse::Status {
                request_id,
                snapshot: Some(snapshot),
            },
            Err(err) => error_response(request_id, err),
        },
        InboundMessage::ActiveBattle { request_id } => {
            let Some(player) = auth.user() else {
                return error_response(request_id, BattleError::AuthenticationRequired);
            };
            match state.orchestrator.active_battle(player).await {
                Ok(snapshot) => OutboundResponse::Status {
                    request_id,
                    snapshot,
                },
                Err(err) => error_response(request_id, err),
            }
        }
        InboundMessage::CompleteBattle {
            request_id,
            battle_id,
        } => match state.orchestrator.complete_battle(battle_id).await {
            Ok(settlement) => {
                let _ = state.broadcaster.send(OutboundEvent::BattleOver {
                    battle_id,
                    winner_id: Some(settlement.winner_id),
                });
                OutboundResponse::Settled {
                    request_id,
                    settlement,
                }
            }
            Err(err) => error_response(request_id, err),
        },
    }
}

fn send_response(tx: &mpsc::UnboundedSender<Message>, response: OutboundResponse) {
    if let Ok(payload) = serde_json::to_string(&response) {
        let _ = tx.send(Message::Text(payload));
    }
}

fn error_response(request_id: String, err: BattleError) -> OutboundResponse {
    OutboundResponse::Error {
        request_id,
        code: err.code().to_string(),
        message: err.to_string(),
    }
}

async fn healthz() -> &'static str {
    "ok"
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let host = std::env::var("ARENA_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("ARENA_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(9200);

    let config = ArenaConfig::from_env();
    let rules_config = RulesConfig {
        wins_required: config.wins_required,
        max_rounds: config.max_rounds,
        tie_break: TieBreak::Player1,
    };
    rules_config
        .validate()
        .map_err(|reason| anyhow::anyhow!("invalid rules config: {reason}"))?;

    let store = MemoryStore::new();
    let orchestrator = Arc::new(
        Orchestrator::new(store.clone(), Rules::new(rules_config))
            .with_retry_policy(RetryPolicy {
                max_attempts: config.retry_attempts,
                backoff: Duration::from_millis(config.retry_backoff_ms),
            })
            .with_cache_ttl(Duration::from_millis(config.cache_ttl_ms)),
    );
    let (broadcaster, _) = broadcast::channel::<OutboundEvent>(1024);

    let state = AppState {
        config,
        store,
        orchestrator,
        broadcaster,
    };

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/healthz", get(healthz))
        .with_state(state);

    let addr: SocketAddr = format!("{host}:{port}").parse().context("invalid listen addr")?;
    info!(%addr, "arena service listening");

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app).await?;
    Ok(())
}
