//! Fakes shared by the unit tests: stub games that record every contract
//! call, and in-memory voice, brain and screen collaborators.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::bail;
use tokio::sync::watch;

use crate::core::game::{Game, GameContext};
use crate::core::presentation::{FaceState, Presentation, UiEvent};
use crate::core::registry::{GameCatalog, GameDescriptor, GameKind};
use crate::services::brain::Brain;
use crate::services::hardware::{SpeakingSignal, Voice};
use crate::services::telemetry::{Telemetry, TelemetryEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultMode {
    Error,
    Panic,
}

#[derive(Default)]
struct ProbeState {
    /// "colors.start", "pairing.down(1,2)", ... in call order.
    log: Vec<String>,
    constructed: HashMap<String, usize>,
    faults: HashMap<(String, &'static str), FaultMode>,
    running: usize,
    max_running: usize,
    voice_consumes: bool,
    start_face: Option<FaceState>,
}

/// Shared recorder behind every stub game built from one catalog.
#[derive(Clone, Default)]
pub struct Probe {
    state: Arc<Mutex<ProbeState>>,
}

impl Probe {
    fn with<T>(&self, f: impl FnOnce(&mut ProbeState) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }

    pub fn log(&self) -> Vec<String> {
        self.with(|s| s.log.clone())
    }

    pub fn count(&self, entry: &str) -> usize {
        self.with(|s| s.log.iter().filter(|l| *l == entry).count())
    }

    pub fn constructed(&self, id: &str) -> usize {
        self.with(|s| s.constructed.get(id).copied().unwrap_or(0))
    }

    pub fn running(&self) -> usize {
        self.with(|s| s.running)
    }

    pub fn max_running(&self) -> usize {
        self.with(|s| s.max_running)
    }

    pub fn fail(&self, id: &str, op: &'static str, mode: FaultMode) {
        self.with(|s| s.faults.insert((id.to_string(), op), mode));
    }

    pub fn consume_voice(&self, consume: bool) {
        self.with(|s| s.voice_consumes = consume);
    }

    /// Face every stub shows from inside `start`, before any injected fault.
    pub fn face_on_start(&self, state: FaceState) {
        self.with(|s| s.start_face = Some(state));
    }

    fn record(&self, id: &str, op: &'static str, entry: String) -> anyhow::Result<()> {
        let fault = self.with(|s| {
            s.log.push(entry);
            s.faults.get(&(id.to_string(), op)).copied()
        });
        match fault {
            Some(FaultMode::Error) => bail!("{id} failed in {op}"),
            Some(FaultMode::Panic) => panic!("{id} panicked in {op}"),
            None => Ok(()),
        }
    }

    fn set_running(&self, delta: isize) {
        self.with(|s| {
            s.running = s.running.saturating_add_signed(delta);
            s.max_running = s.max_running.max(s.running);
        });
    }
}

pub struct StubGame {
    id: String,
    running: bool,
    ended_by_itself: bool,
    probe: Probe,
    screen: Arc<dyn Presentation>,
}

impl StubGame {
    pub fn new(id: &str, probe: Probe, screen: Arc<dyn Presentation>) -> Self {
        probe.with(|s| *s.constructed.entry(id.to_string()).or_default() += 1);
        Self {
            id: id.to_string(),
            running: false,
            ended_by_itself: false,
            probe,
            screen,
        }
    }

    fn halt(&mut self) {
        if self.running {
            self.running = false;
            self.probe.set_running(-1);
        }
    }
}

impl Drop for StubGame {
    fn drop(&mut self) {
        self.halt();
    }
}

impl Game for StubGame {
    fn name(&self) -> &str {
        &self.id
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn start(&mut self) -> anyhow::Result<()> {
        self.running = true;
        self.probe.set_running(1);
        if let Some(face) = self.probe.with(|s| s.start_face) {
            self.screen.set_state(face);
        }
        self.probe.record(&self.id, "start", format!("{}.start", self.id))
    }

    fn stop(&mut self) -> anyhow::Result<()> {
        if !self.running && !self.ended_by_itself {
            return Ok(());
        }
        self.ended_by_itself = false;
        self.halt();
        self.probe.record(&self.id, "stop", format!("{}.stop", self.id))
    }

    fn on_pointer_down(&mut self, x: i32, y: i32) -> anyhow::Result<()> {
        self.probe.record(&self.id, "down", format!("{}.down({x},{y})", self.id))
    }

    fn on_pointer_up(&mut self, x: i32, y: i32) -> anyhow::Result<()> {
        self.probe.record(&self.id, "up", format!("{}.up({x},{y})", self.id))
    }

    fn on_pointer_move(&mut self, x: i32, y: i32) -> anyhow::Result<()> {
        self.probe.record(&self.id, "move", format!("{}.move({x},{y})", self.id))
    }

    fn on_voice(&mut self, transcript: &str) -> anyhow::Result<bool> {
        self.probe
            .record(&self.id, "voice", format!("{}.voice({transcript})", self.id))?;
        if transcript == "acabou" {
            // ends itself the way a game hearing "sair" does
            self.halt();
            self.ended_by_itself = true;
        }
        Ok(self.probe.with(|s| s.voice_consumes))
    }

    fn tick(&mut self) -> anyhow::Result<()> {
        self.probe.record(&self.id, "tick", format!("{}.tick", self.id))
    }
}

fn leak(s: String) -> &'static str {
    Box::leak(s.into_boxed_str())
}

pub fn stub_kind(id: &str, probe: &Probe) -> GameKind {
    let probe = probe.clone();
    let owned = id.to_string();
    GameKind::new(leak(owned.clone()), leak(format!("{id} game")), "stub", move |ctx| {
        Ok(Box::new(StubGame::new(&owned, probe.clone(), ctx.screen)) as Box<dyn Game>)
    })
}

pub fn stub_catalog(ids: &[&str], probe: &Probe) -> GameCatalog {
    let mut catalog = GameCatalog::new();
    for id in ids {
        catalog.register(stub_kind(id, probe));
    }
    catalog
}

#[derive(Default)]
pub struct FakeVoice {
    pub spoken: Mutex<Vec<String>>,
    pub heard: Mutex<VecDeque<String>>,
    pub listens: Mutex<Vec<Duration>>,
    pub signal: SpeakingSignal,
}

impl FakeVoice {
    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }

    pub fn hear(&self, text: &str) {
        self.heard.lock().unwrap().push_back(text.to_string());
    }
}

impl Voice for FakeVoice {
    fn listen(&self, timeout: Duration) -> Option<String> {
        self.listens.lock().unwrap().push(timeout);
        self.heard.lock().unwrap().pop_front()
    }

    fn speak(&self, text: &str) {
        self.spoken.lock().unwrap().push(text.to_string());
    }

    fn speak_blocking(&self, text: &str) {
        self.speak(text);
    }

    fn is_speaking(&self) -> bool {
        self.signal.is_speaking()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.signal.subscribe()
    }
}

#[derive(Default)]
pub struct FakeBrain {
    pub asked: Mutex<Vec<String>>,
}

impl Brain for FakeBrain {
    fn process(&self, text: &str) -> String {
        self.asked.lock().unwrap().push(text.to_string());
        format!("resposta: {text}")
    }
}

pub struct FakeScreen {
    pub state: Mutex<FaceState>,
    /// Every state ever set, in order.
    pub history: Mutex<Vec<FaceState>>,
    pub size: (u16, u16),
    pub events: Mutex<VecDeque<Vec<UiEvent>>>,
    pub draws: Mutex<Vec<Option<String>>>,
    pub catalog: Mutex<Vec<GameDescriptor>>,
}

impl Default for FakeScreen {
    fn default() -> Self {
        Self {
            state: Mutex::new(FaceState::Idle),
            history: Mutex::new(Vec::new()),
            size: (800, 480),
            events: Mutex::new(VecDeque::new()),
            draws: Mutex::new(Vec::new()),
            catalog: Mutex::new(Vec::new()),
        }
    }
}

impl FakeScreen {
    /// Events returned by the next `poll_events` call.
    pub fn push_events(&self, events: Vec<UiEvent>) {
        self.events.lock().unwrap().push_back(events);
    }

    pub fn history(&self) -> Vec<FaceState> {
        self.history.lock().unwrap().clone()
    }
}

impl Presentation for FakeScreen {
    fn set_state(&self, state: FaceState) {
        *self.state.lock().unwrap() = state;
        self.history.lock().unwrap().push(state);
    }

    fn state(&self) -> FaceState {
        *self.state.lock().unwrap()
    }

    fn screen_size(&self) -> (u16, u16) {
        self.size
    }

    fn draw(&self, game: Option<&dyn Game>) -> anyhow::Result<()> {
        self.draws.lock().unwrap().push(game.map(|g| g.name().to_string()));
        Ok(())
    }

    fn poll_events(&self) -> anyhow::Result<Vec<UiEvent>> {
        Ok(self.events.lock().unwrap().pop_front().unwrap_or_default())
    }

    fn set_catalog(&self, games: Vec<GameDescriptor>) {
        *self.catalog.lock().unwrap() = games;
    }
}

/// Context over fresh fakes with telemetry disabled.
pub fn test_context() -> (GameContext, Arc<FakeVoice>, Arc<FakeScreen>) {
    let voice = Arc::new(FakeVoice::default());
    let screen = Arc::new(FakeScreen::default());
    let ctx = GameContext::new(
        voice.clone(),
        screen.clone(),
        Arc::new(FakeBrain::default()),
        Telemetry::disabled(),
    );
    (ctx, voice, screen)
}

/// Context whose telemetry lands in the returned receiver.
pub fn recording_context() -> (
    GameContext,
    Arc<FakeVoice>,
    Arc<FakeScreen>,
    tokio::sync::mpsc::UnboundedReceiver<TelemetryEvent>,
) {
    let (mut ctx, voice, screen) = test_context();
    let (telemetry, rx) = Telemetry::channel();
    ctx.telemetry = telemetry;
    (ctx, voice, screen, rx)
}
