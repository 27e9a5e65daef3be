//! WebSocket client session: join, command loop, event mirroring.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};

use rehearsal_shared::protocol::{ClientMessage, RoomUser, ServerMessage};
use rehearsal_shared::time::now_millis;

use crate::{
    error::ClientError,
    formatter::MessageFormatter,
    latency::LatencyWindow,
    metronome::{MetronomeSettings, sanitize_bpm},
    recording::{RecordingPhase, SessionTracker},
    takes::TakeLog,
    ui::redisplay_prompt,
};

/// Interval between latency probes once connected.
const PING_INTERVAL_SECS: u64 = 2;

/// Connection parameters for one session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub url: String,
    pub room_id: String,
    pub user_id: String,
    pub nickname: String,
}

/// State mirrored from the broadcast stream, shared across session tasks.
struct Mirror {
    tracker: SessionTracker,
    metronome: MetronomeSettings,
    latency: LatencyWindow,
    roster: Vec<RoomUser>,
    takes: TakeLog,
}

impl Mirror {
    fn new(user_id: &str) -> Self {
        Self {
            tracker: SessionTracker::new(user_id),
            metronome: MetronomeSettings::default(),
            // A fresh window per session also covers the reset-on-rejoin
            // behavior when the runner reconnects.
            latency: LatencyWindow::new(),
            roster: Vec::new(),
            takes: TakeLog::new(),
        }
    }
}

/// Run one client session until the connection or the input loop ends.
pub async fn run_client_session(config: &SessionConfig) -> Result<(), Box<dyn std::error::Error>> {
    let (ws_stream, _response) = match connect_async(&config.url).await {
        Ok(result) => result,
        Err(e) => return Err(Box::new(ClientError::ConnectionError(e.to_string()))),
    };

    tracing::info!("Connected to {}", config.url);
    println!(
        "\nYou are '{}' in room '{}'. Type to chat; /help lists commands. Ctrl+C exits.\n",
        config.nickname, config.room_id
    );

    let (mut write, mut read) = ws_stream.split();

    // Everything outbound funnels through one channel so the writer task
    // owns the sink.
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ClientMessage>();

    let mirror = Arc::new(Mutex::new(Mirror::new(&config.user_id)));

    // Join first; the room-users reply confirms registration.
    out_tx
        .send(ClientMessage::Join {
            room_id: config.room_id.clone(),
            user_id: config.user_id.clone(),
            nickname: Some(config.nickname.clone()),
        })
        .ok();

    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if write
                .send(Message::Text(msg.to_json().into()))
                .await
                .is_err()
            {
                break;
            }
        }
    });

    // Latency probes, fire-and-forget.
    let ping_tx = out_tx.clone();
    let ping_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(PING_INTERVAL_SECS));
        loop {
            interval.tick().await;
            if ping_tx
                .send(ClientMessage::Ping {
                    client_time: now_millis(),
                })
                .is_err()
            {
                break;
            }
        }
    });

    let read_mirror = mirror.clone();
    let my_user_id = config.user_id.clone();
    let prompt_name = config.nickname.clone();

    // Mirror every server event into the shared state and render it.
    let mut read_task = tokio::spawn(async move {
        while let Some(message) = read.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    match serde_json::from_str::<ServerMessage>(text.as_str()) {
                        Ok(msg) => {
                            let mut mirror = read_mirror.lock().await;
                            if let Some(rendered) =
                                apply_server_message(&mut mirror, &my_user_id, msg)
                            {
                                print!("{}", rendered);
                                redisplay_prompt(&prompt_name);
                            }
                        }
                        Err(e) => {
                            tracing::debug!("ignoring unreadable server message: {}", e);
                        }
                    }
                }
                Ok(Message::Close(_)) => {
                    tracing::info!("Server closed the connection");
                    return Some(ClientError::ServerClosed);
                }
                Err(e) => {
                    tracing::warn!("WebSocket read error: {}", e);
                    return Some(ClientError::ConnectionError(e.to_string()));
                }
                _ => {}
            }
        }
        None
    });

    // Blocking thread for rustyline (synchronous readline), bridged over a
    // channel.
    let (input_tx, mut input_rx) = mpsc::unbounded_channel::<String>();
    let readline_prompt = config.nickname.clone();
    let _readline_handle = std::thread::spawn(move || {
        let mut rl = match DefaultEditor::new() {
            Ok(rl) => rl,
            Err(e) => {
                eprintln!("Failed to initialize readline: {}", e);
                return;
            }
        };

        let prompt = format!("{}> ", readline_prompt);

        loop {
            match rl.readline(&prompt) {
                Ok(line) => {
                    let line = line.trim();
                    if !line.is_empty() {
                        rl.add_history_entry(line).ok();
                        if input_tx.send(line.to_string()).is_err() {
                            break;
                        }
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    tracing::info!("Interrupted");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    tracing::info!("EOF");
                    break;
                }
                Err(err) => {
                    tracing::error!("Readline error: {}", err);
                    break;
                }
            }
        }
    });

    let command_mirror = mirror.clone();
    let command_tx = out_tx.clone();
    let command_config = config.clone();
    let mut command_task = tokio::spawn(async move {
        while let Some(line) = input_rx.recv().await {
            handle_input_line(&command_config, &command_mirror, &command_tx, &line).await;
        }
    });

    // Whichever task finishes first decides how the session ends.
    let result = tokio::select! {
        read_result = &mut read_task => {
            write_task.abort();
            command_task.abort();
            match read_result {
                Ok(Some(err)) => Err(Box::new(err) as Box<dyn std::error::Error>),
                _ => Ok(()),
            }
        }
        _ = &mut write_task => {
            read_task.abort();
            command_task.abort();
            Err(Box::new(ClientError::ConnectionError("Connection lost".to_string()))
                as Box<dyn std::error::Error>)
        }
        _ = &mut command_task => {
            // Input loop ended (Ctrl+C / Ctrl+D): a normal exit.
            read_task.abort();
            write_task.abort();
            Ok(())
        }
    };
    ping_task.abort();

    result
}

/// Fold one server event into the mirror; returns the rendered event when
/// there is something to show.
fn apply_server_message(
    mirror: &mut Mirror,
    my_user_id: &str,
    message: ServerMessage,
) -> Option<String> {
    match message {
        ServerMessage::RoomUsers { users, .. } => {
            mirror.roster = users;
            Some(MessageFormatter::format_room_users(
                &mirror.roster,
                my_user_id,
            ))
        }
        ServerMessage::UserJoined {
            user_id, nickname, ..
        } => {
            mirror.roster.retain(|u| u.user_id != user_id);
            mirror.roster.push(RoomUser {
                user_id: user_id.clone(),
                nickname: nickname.clone(),
            });
            Some(MessageFormatter::format_user_joined(&user_id, &nickname))
        }
        ServerMessage::UserLeft { user_id, .. } => {
            mirror.roster.retain(|u| u.user_id != user_id);
            Some(MessageFormatter::format_user_left(&user_id))
        }
        ServerMessage::Signal { from_user_id, data } => {
            // Negotiation payloads belong to the peer-audio pipeline; this
            // client only observes them.
            let kind = data.get("type").and_then(|v| v.as_str()).unwrap_or("?");
            tracing::debug!(
                "ignoring '{}' negotiation payload from '{}'",
                kind,
                from_user_id
            );
            None
        }
        ServerMessage::Chat {
            user_id,
            text,
            timestamp,
            ..
        } => {
            let is_me = user_id == my_user_id;
            Some(MessageFormatter::format_chat_message(
                &user_id, &text, timestamp, is_me,
            ))
        }
        ServerMessage::Metronome {
            running,
            bpm,
            time_signature,
            start_time,
            ..
        } => {
            mirror
                .metronome
                .apply(running, bpm, time_signature, start_time);
            Some(MessageFormatter::format_metronome(&mirror.metronome))
        }
        ServerMessage::RecordingState {
            state,
            recorder_id,
            timestamp,
            ..
        } => match RecordingPhase::from_wire(state, recorder_id) {
            Some(phase) => {
                if mirror.tracker.apply_remote(phase, timestamp) {
                    Some(MessageFormatter::format_recording_state(
                        mirror.tracker.phase(),
                        my_user_id,
                    ))
                } else {
                    tracing::debug!("stale recording-state broadcast ignored");
                    None
                }
            }
            None => {
                tracing::debug!("recording-state without a recorder ignored");
                None
            }
        },
        ServerMessage::Pong { client_time, .. } => {
            let rtt = now_millis() - client_time;
            mirror.latency.record_round_trip(rtt as f64);
            None
        }
        ServerMessage::Unknown => None,
    }
}

async fn handle_input_line(
    config: &SessionConfig,
    mirror: &Arc<Mutex<Mirror>>,
    out: &mpsc::UnboundedSender<ClientMessage>,
    line: &str,
) {
    if let Some(command) = line.strip_prefix('/') {
        let mut parts = command.split_whitespace();
        match parts.next() {
            Some("record") => start_recording(config, mirror, out).await,
            Some("stop") => stop_recording(config, mirror, out).await,
            Some("metronome") => {
                let args: Vec<&str> = parts.collect();
                toggle_metronome(config, mirror, out, &args).await;
            }
            Some("users") => {
                let mirror = mirror.lock().await;
                println!(
                    "{}",
                    MessageFormatter::format_room_users(&mirror.roster, &config.user_id)
                );
            }
            Some("latency") => {
                let mirror = mirror.lock().await;
                println!(
                    "{}",
                    MessageFormatter::format_latency(mirror.latency.stats().as_ref())
                );
            }
            Some("takes") => {
                let mirror = mirror.lock().await;
                println!("{}", MessageFormatter::format_takes(mirror.takes.takes()));
            }
            _ => print_help(),
        }
        return;
    }

    out.send(ClientMessage::Chat {
        room_id: config.room_id.clone(),
        user_id: config.user_id.clone(),
        text: line.to_string(),
        timestamp: now_millis(),
    })
    .ok();
}

fn print_help() {
    println!(
        "Commands:\n\
         /record          start a take after a one-bar count-in\n\
         /stop            stop the take you are recording\n\
         /metronome [bpm] [beats]   start/retune the shared metronome\n\
         /metronome off   stop the shared metronome\n\
         /users           show the room roster\n\
         /takes           list takes from this session\n\
         /latency         show connection latency statistics\n\
         anything else is sent to the room as chat"
    );
}

/// Broadcast the tracker's current state to the room.
fn send_transition(
    config: &SessionConfig,
    tracker: &SessionTracker,
    out: &mpsc::UnboundedSender<ClientMessage>,
) {
    let (state, recorder_id) = tracker.phase().wire();
    out.send(ClientMessage::RecordingState {
        room_id: config.room_id.clone(),
        state,
        recorder_id,
        timestamp: tracker.last_transition_ms(),
    })
    .ok();
}

async fn start_recording(
    config: &SessionConfig,
    mirror: &Arc<Mutex<Mirror>>,
    out: &mpsc::UnboundedSender<ClientMessage>,
) {
    let count_in = {
        let mut m = mirror.lock().await;
        if !m.tracker.begin_count_in(now_millis()) {
            println!(
                "{}",
                MessageFormatter::format_recording_state(m.tracker.phase(), &config.user_id)
            );
            println!("The session is busy; wait for it to return to idle.");
            return;
        }
        send_transition(config, &m.tracker, out);
        m.metronome.count_in_duration()
    };

    println!("Count-in: {:.1} s...", count_in.as_secs_f64());

    // The count-in runs in the background so chat and incoming broadcasts
    // stay live while it ticks.
    let mirror = mirror.clone();
    let out = out.clone();
    let config = config.clone();
    tokio::spawn(async move {
        tokio::time::sleep(count_in).await;

        let mut m = mirror.lock().await;
        let now = now_millis();
        if m.tracker.finish_count_in(now) {
            let bpm = m.metronome.bpm;
            let take = m.takes.start_take(&config.room_id, bpm, now);
            send_transition(&config, &m.tracker, &out);
            println!("\n● Recording take {} (/stop to finish)", take);
            redisplay_prompt(&config.nickname);
        } else {
            // Another member transitioned the session mid-count-in.
            tracing::info!("count-in cancelled by a newer session transition");
        }
    });
}

async fn stop_recording(
    config: &SessionConfig,
    mirror: &Arc<Mutex<Mirror>>,
    out: &mpsc::UnboundedSender<ClientMessage>,
) {
    let mut m = mirror.lock().await;
    if !m.tracker.request_stop(now_millis()) {
        println!("Nothing to stop: you are not recording.");
        return;
    }
    send_transition(config, &m.tracker, out);

    // Take metadata is the persistence this client carries; the audio
    // artifact itself lives with the capture pipeline.
    let now = now_millis();
    m.takes.finish_take(now);
    if m.tracker.finish_saving(now) {
        send_transition(config, &m.tracker, out);
        println!("Take saved.");
        println!("{}", MessageFormatter::format_takes(m.takes.takes()));
    }
}

async fn toggle_metronome(
    config: &SessionConfig,
    mirror: &Arc<Mutex<Mirror>>,
    out: &mpsc::UnboundedSender<ClientMessage>,
    args: &[&str],
) {
    let mut m = mirror.lock().await;
    let now = now_millis();

    match args.first().copied() {
        Some("off") => {
            let (bpm, beats) = (m.metronome.bpm, m.metronome.time_signature);
            m.metronome.apply(false, bpm, beats, now);
        }
        Some(raw) => {
            let bpm = sanitize_bpm(raw.parse().unwrap_or(f64::NAN));
            let beats = args
                .get(1)
                .and_then(|s| s.parse().ok())
                .unwrap_or(m.metronome.time_signature);
            m.metronome.apply(true, bpm, beats, now);
        }
        None => {
            let (running, bpm, beats) = (
                !m.metronome.running,
                m.metronome.bpm,
                m.metronome.time_signature,
            );
            m.metronome.apply(running, bpm, beats, now);
        }
    }

    // Applied locally first; the broadcast only informs the others.
    out.send(ClientMessage::Metronome {
        room_id: config.room_id.clone(),
        running: m.metronome.running,
        bpm: m.metronome.bpm,
        time_signature: m.metronome.time_signature,
        start_time: m.metronome.start_time,
    })
    .ok();

    println!("{}", MessageFormatter::format_metronome(&m.metronome));
}
