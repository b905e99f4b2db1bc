//! Voice hardware: speech output through an external synthesizer, speech
//! input through an external recognizer, and the mouth animation that runs
//! while the robot talks.

use std::collections::HashMap;
use std::io::Read;
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use rand::Rng;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::VoiceConfig;

const MOUTH_FRAME: Duration = Duration::from_millis(150);
const LISTEN_GRACE: Duration = Duration::from_secs(1);
const POLL_STEP: Duration = Duration::from_millis(20);

/// Speech in and out, as seen by games and the main loop.
pub trait Voice: Send + Sync {
    /// Wait up to `timeout` for one utterance.
    fn listen(&self, timeout: Duration) -> Option<String>;

    /// Speak on a worker thread and return immediately.
    fn speak(&self, text: &str);

    /// Speak on the calling thread.
    fn speak_blocking(&self, text: &str);

    fn is_speaking(&self) -> bool;

    /// Follows the speaking state; flips to `true` when speech starts and back
    /// to `false` when the last utterance finishes.
    fn subscribe(&self) -> watch::Receiver<bool>;

    /// Wait up to `timeout` for outstanding speech workers.
    fn shutdown(&self, _timeout: Duration) {}
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Single writer of the speaking state.
///
/// The counter and the published value change under one lock, so readers
/// never see `false` while an utterance is still playing.
#[derive(Clone)]
pub struct SpeakingSignal {
    inner: Arc<SignalInner>,
}

struct SignalInner {
    active: Mutex<usize>,
    tx: watch::Sender<bool>,
}

/// Ends one utterance when dropped.
pub struct SpeakingGuard {
    signal: SpeakingSignal,
}

impl Drop for SpeakingGuard {
    fn drop(&mut self) {
        let mut active = lock(&self.signal.inner.active);
        *active = active.saturating_sub(1);
        if *active == 0 {
            self.signal.inner.tx.send_replace(false);
        }
    }
}

impl Default for SpeakingSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeakingSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(SignalInner {
                active: Mutex::new(0),
                tx,
            }),
        }
    }

    pub fn begin(&self) -> SpeakingGuard {
        let mut active = lock(&self.inner.active);
        *active += 1;
        if *active == 1 {
            self.inner.tx.send_replace(true);
        }
        SpeakingGuard {
            signal: self.clone(),
        }
    }

    pub fn is_speaking(&self) -> bool {
        *self.inner.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.inner.tx.subscribe()
    }
}

/// Receivers a screen needs to animate the face.
#[derive(Clone)]
pub struct SpeechFeed {
    pub speaking: watch::Receiver<bool>,
    /// Mouth opening, 0 (closed) to 100.
    pub mouth: watch::Receiver<u8>,
}

struct Speaker {
    engines: HashMap<String, Vec<String>>,
    engine: Mutex<String>,
    fallback: Option<String>,
    signal: SpeakingSignal,
    mouth: watch::Sender<u8>,
    /// One utterance at a time on the speaker.
    turn: Mutex<()>,
}

impl Speaker {
    fn say(&self, text: &str) {
        let _turn = lock(&self.turn);
        let guard = self.signal.begin();
        let animator = self.spawn_mouth_driver();

        let engine = lock(&self.engine).clone();
        debug!(%engine, %text, "speaking");
        if let Err(e) = self.run_engine(&engine, text) {
            warn!(%engine, error = %e, "speech engine failed");
            if let Some(fallback) = self.fallback.as_deref().filter(|f| *f != engine) {
                if let Err(e) = self.run_engine(fallback, text) {
                    warn!(engine = %fallback, error = %e, "fallback speech engine failed");
                }
            }
        }

        drop(guard);
        if let Some(handle) = animator {
            let _ = handle.join();
        }
    }

    fn run_engine(&self, engine: &str, text: &str) -> Result<()> {
        let argv = self
            .engines
            .get(engine)
            .filter(|argv| !argv.is_empty())
            .ok_or_else(|| anyhow!("no command configured for engine '{engine}'"))?;
        let status = Command::new(&argv[0])
            .args(&argv[1..])
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .with_context(|| format!("cannot run {}", argv[0]))?;
        if !status.success() {
            bail!("{} exited with {status}", argv[0]);
        }
        Ok(())
    }

    /// Moves the mouth while the speaking flag is up, then closes it.
    fn spawn_mouth_driver(&self) -> Option<JoinHandle<()>> {
        let signal = self.signal.clone();
        let mouth = self.mouth.clone();
        std::thread::Builder::new()
            .name("mouth".into())
            .spawn(move || {
                let mut rng = rand::rng();
                while signal.is_speaking() {
                    mouth.send_replace(rng.random_range(10..=100));
                    std::thread::sleep(MOUTH_FRAME);
                }
                mouth.send_replace(0);
            })
            .map_err(|e| warn!(error = %e, "cannot spawn mouth driver"))
            .ok()
    }
}

/// The robot's real voice: command-line synthesizer and recognizer.
pub struct Hardware {
    speaker: Arc<Speaker>,
    listen_command: Vec<String>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Hardware {
    pub fn new(config: &VoiceConfig) -> Self {
        let (mouth, _) = watch::channel(0u8);
        if !config.engines.contains_key(&config.engine) {
            warn!(engine = %config.engine, "preferred speech engine has no command");
        }
        Self {
            speaker: Arc::new(Speaker {
                engines: config.engines.clone(),
                engine: Mutex::new(config.engine.clone()),
                fallback: config.fallback_engine.clone(),
                signal: SpeakingSignal::new(),
                mouth,
                turn: Mutex::new(()),
            }),
            listen_command: config.listen_command.clone(),
            workers: Mutex::new(Vec::new()),
        }
    }

    pub fn feed(&self) -> SpeechFeed {
        SpeechFeed {
            speaking: self.speaker.signal.subscribe(),
            mouth: self.speaker.mouth.subscribe(),
        }
    }

    /// Switch the synthesizer; unknown names keep the current one.
    pub fn set_engine(&self, engine: &str) -> bool {
        if !self.speaker.engines.contains_key(engine) {
            warn!(%engine, "unknown speech engine requested, keeping current");
            return false;
        }
        *lock(&self.speaker.engine) = engine.to_string();
        info!(%engine, "speech engine selected");
        true
    }

    pub fn engine(&self) -> String {
        lock(&self.speaker.engine).clone()
    }

    fn listen_argv(&self, timeout: Duration) -> Vec<String> {
        let secs = timeout.as_secs().max(1).to_string();
        self.listen_command
            .iter()
            .map(|arg| arg.replace("{timeout}", &secs))
            .collect()
    }

    fn run_recognizer(&self, timeout: Duration) -> Result<Option<String>> {
        let argv = self.listen_argv(timeout);
        let mut child = Command::new(&argv[0])
            .args(&argv[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("cannot run {}", argv[0]))?;

        let deadline = Instant::now() + timeout + LISTEN_GRACE;
        loop {
            if let Some(status) = child.try_wait()? {
                if !status.success() {
                    debug!(%status, "recognizer heard nothing");
                    return Ok(None);
                }
                break;
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                debug!("recognizer timed out");
                return Ok(None);
            }
            std::thread::sleep(POLL_STEP);
        }

        let mut out = String::new();
        if let Some(mut stdout) = child.stdout.take() {
            stdout.read_to_string(&mut out)?;
        }
        let text = out.trim();
        Ok((!text.is_empty()).then(|| text.to_string()))
    }
}

impl Voice for Hardware {
    fn listen(&self, timeout: Duration) -> Option<String> {
        if self.listen_command.is_empty() {
            return None;
        }
        match self.run_recognizer(timeout) {
            Ok(heard) => heard,
            Err(e) => {
                warn!(error = %e, "speech recognition failed");
                None
            }
        }
    }

    fn speak(&self, text: &str) {
        let speaker = Arc::clone(&self.speaker);
        let text = text.to_string();
        let spawned = std::thread::Builder::new()
            .name("speak".into())
            .spawn(move || speaker.say(&text));

        match spawned {
            Ok(handle) => {
                let mut workers = lock(&self.workers);
                workers.retain(|w| !w.is_finished());
                workers.push(handle);
            }
            Err(e) => warn!(error = %e, "cannot spawn speech worker"),
        }
    }

    fn speak_blocking(&self, text: &str) {
        self.speaker.say(text);
    }

    fn is_speaking(&self) -> bool {
        self.speaker.signal.is_speaking()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.speaker.signal.subscribe()
    }

    fn shutdown(&self, timeout: Duration) {
        let workers: Vec<_> = lock(&self.workers).drain(..).collect();
        let deadline = Instant::now() + timeout;
        while workers.iter().any(|w| !w.is_finished()) && Instant::now() < deadline {
            std::thread::sleep(POLL_STEP);
        }

        let mut abandoned = 0;
        for worker in workers {
            if worker.is_finished() {
                let _ = worker.join();
            } else {
                abandoned += 1;
            }
        }
        if abandoned > 0 {
            warn!(abandoned, "speech workers still running at shutdown");
        }
    }
}
