//! Headless snapshot protocol.
//!
//! Without a terminal the session writes newline-delimited JSON frames to a
//! writer (stdout in the CLI). Every frame is self-contained and carries a
//! fixed `schemaVersion`, the session id and a sequence number that grows by
//! exactly one per frame. Consumers must ignore `meta` keys they do not know.
//!
//! A run emits, in order:
//!
//! 1. startup frames (`meta.frameKind = "startup"`, no panels)
//! 2. per refresh cycle, one `"retry"` frame for each backoff and then one
//!    `"snapshot"` frame
//!
//! In follow mode step 2 repeats every interval until Ctrl+C or
//! `max_frames` snapshots.

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value, json};
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::brand;
use crate::connectivity::ConnectionState;
use crate::error::Result;
use crate::guard::RenderFallbackGuard;
use crate::loader::RetryNotice;
use crate::runtime::{RefreshOutcome, RefreshPayload, ScreenRuntime};
use crate::scene::ScenePanel;
use crate::screen::{self, Screen, ScreenData, ScreenId};
use crate::session::{Motion, SessionContext};

/// Version of the frame layout. Bumped on incompatible changes only.
pub const SCHEMA_VERSION: u32 = 1;

/// Client name reported in frame meta.
pub const CLIENT_NAME: &str = "fleetdeck";

/// One serialized snapshot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeadlessFrame {
    pub schema_version: u32,
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub sequence: u64,
    pub screen: ScreenId,
    pub title: String,
    pub status: String,
    pub tenant_id: Option<String>,
    pub motion: Motion,
    pub logo: String,
    pub panels: Vec<ScenePanel>,
    pub meta: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameKind {
    Startup,
    Snapshot,
    Retry,
}

impl FrameKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameKind::Startup => "startup",
            FrameKind::Snapshot => "snapshot",
            FrameKind::Retry => "retry",
        }
    }
}

/// Everything that varies between frames of one session.
#[derive(Debug, Clone)]
pub struct FrameContent {
    pub kind: FrameKind,
    pub screen: ScreenId,
    pub title: String,
    pub status: String,
    pub logo: String,
    pub panels: Vec<ScenePanel>,
    /// Merged over the default meta; these keys win.
    pub meta: Map<String, Value>,
}

/// Per-session identity stamped on every frame.
#[derive(Debug, Clone)]
pub struct FrameHeader {
    pub session_id: String,
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub tenant_id: Option<String>,
    pub motion: Motion,
}

/// Assemble a frame. Pure: the same header and content give the same frame.
pub fn build_frame(header: FrameHeader, content: FrameContent) -> HeadlessFrame {
    let mut meta = Map::new();
    meta.insert("frameKind".into(), json!(content.kind.as_str()));
    meta.insert("panelCount".into(), json!(content.panels.len()));
    meta.insert("client".into(), json!(CLIENT_NAME));
    meta.insert("clientVersion".into(), json!(env!("CARGO_PKG_VERSION")));
    meta.extend(content.meta);

    HeadlessFrame {
        schema_version: SCHEMA_VERSION,
        timestamp: header.timestamp,
        session_id: header.session_id,
        sequence: header.sequence,
        screen: content.screen,
        title: content.title,
        status: content.status,
        tenant_id: header.tenant_id,
        motion: header.motion,
        logo: content.logo,
        panels: content.panels,
        meta,
    }
}

/// Session id plus a sequence that starts at 1 and never repeats.
#[derive(Debug)]
pub struct FrameSequencer {
    session_id: String,
    next: AtomicU64,
}

impl Default for FrameSequencer {
    fn default() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }
}

impl FrameSequencer {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            next: AtomicU64::new(1),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }
}

/// Timestamp source for frames.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Writes frames as JSON lines.
pub struct FrameEmitter<W> {
    out: W,
    sequencer: FrameSequencer,
    clock: Clock,
    tenant_id: Option<String>,
    motion: Motion,
    emitted: u64,
}

impl<W: Write> FrameEmitter<W> {
    pub fn new(out: W, tenant_id: Option<String>, motion: Motion) -> Self {
        Self {
            out,
            sequencer: FrameSequencer::default(),
            clock: Arc::new(Utc::now),
            tenant_id,
            motion,
            emitted: 0,
        }
    }

    pub fn with_sequencer(mut self, sequencer: FrameSequencer) -> Self {
        self.sequencer = sequencer;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn session_id(&self) -> &str {
        self.sequencer.session_id()
    }

    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Build, write and flush one frame.
    pub fn emit(&mut self, content: FrameContent) -> Result<HeadlessFrame> {
        let header = FrameHeader {
            session_id: self.sequencer.session_id().to_string(),
            sequence: self.sequencer.next(),
            timestamp: (self.clock)(),
            tenant_id: self.tenant_id.clone(),
            motion: self.motion,
        };
        let frame = build_frame(header, content);
        serde_json::to_writer(&mut self.out, &frame)?;
        self.out.write_all(b"\n")?;
        self.out.flush()?;
        self.emitted += 1;
        debug!(
            target: "fleetdeck::tui",
            sequence = frame.sequence,
            kind = %frame.meta.get("frameKind").unwrap_or(&serde_json::Value::Null),
            "Headless frame emitted"
        );
        Ok(frame)
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Headless run parameters.
#[derive(Debug, Clone)]
pub struct HeadlessOptions {
    pub screen: ScreenId,
    pub follow: bool,
    pub interval: Duration,
    /// Stop after this many snapshot frames (follow mode only).
    pub max_frames: Option<u64>,
}

impl Default for HeadlessOptions {
    fn default() -> Self {
        Self {
            screen: ScreenId::Dashboard,
            follow: false,
            interval: Duration::from_millis(5000),
            max_frames: None,
        }
    }
}

/// What a headless run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadlessSummary {
    pub session_id: String,
    pub frames: u64,
    pub snapshots: u64,
    pub retries: u64,
    pub last_state: ConnectionState,
}

/// Run the headless protocol on `out` until done.
pub async fn run_headless<W: Write>(
    ctx: SessionContext,
    options: HeadlessOptions,
    out: W,
) -> Result<HeadlessSummary> {
    let emitter = FrameEmitter::new(out, ctx.tenant_id.clone(), ctx.motion);
    run_with_emitter(ctx, options, emitter).await
}

/// Like [`run_headless`], with a preconfigured emitter.
pub async fn run_with_emitter<W: Write>(
    ctx: SessionContext,
    options: HeadlessOptions,
    mut emitter: FrameEmitter<W>,
) -> Result<HeadlessSummary> {
    let (notice_tx, mut notices) = mpsc::unbounded_channel::<RetryNotice>();
    let ctx = ctx.with_retry_observer(Arc::new(move |notice: &RetryNotice| {
        let _ = notice_tx.send(notice.clone());
    }));

    info!(
        session_id = emitter.session_id(),
        screen = %options.screen,
        follow = options.follow,
        "Starting headless session"
    );

    let mut screen = screen::create(options.screen);
    let runtime = ScreenRuntime::new(options.screen.as_str());
    let mut guard = RenderFallbackGuard::new(ctx.config.render_fallback);
    screen.mount();
    screen.focus();

    emit_startup(&mut emitter, screen.as_ref())?;

    let mut snapshots = 0u64;
    let mut retries = 0u64;
    loop {
        let mut applied: Option<ScreenData> = None;
        let outcome = {
            let refresh = runtime.run_refresh(
                if snapshots == 0 { "initial" } else { "follow" },
                || screen.refresh_job(&ctx),
                |data| applied = Some(data),
            );
            tokio::pin!(refresh);
            loop {
                tokio::select! {
                    biased;
                    outcome = &mut refresh => break outcome,
                    Some(notice) = notices.recv() => {
                        emit_retry(&mut emitter, screen.as_ref(), &notice)?;
                        retries += 1;
                    }
                }
            }
        };
        while let Ok(notice) = notices.try_recv() {
            emit_retry(&mut emitter, screen.as_ref(), &notice)?;
            retries += 1;
        }

        if let Some(data) = applied {
            let clean = data.refresh_error().is_none();
            screen.apply(data);
            if clean {
                guard.reset();
            }
        }
        let connection = screen.connection();
        ctx.record_readiness(connection.state);

        let scene = guard.render(screen.as_ref());
        let fallback = scene.is_fallback();
        let status = runtime.status();

        let mut meta = Map::new();
        meta.insert("connectionState".into(), json!(connection.state));
        meta.insert("readiness".into(), json!(ctx.readiness()));
        meta.insert("refresh".into(), json!(status));
        meta.insert("refreshOutcome".into(), json!(outcome_name(&outcome)));
        meta.insert("retryAttempts".into(), json!(connection.retry.attempts));
        meta.insert("renderFallback".into(), json!(fallback));
        meta.insert("follow".into(), json!(options.follow));
        if let Some(error) = &connection.error {
            meta.insert("error".into(), json!(error));
        }

        emitter.emit(FrameContent {
            kind: FrameKind::Snapshot,
            screen: options.screen,
            title: screen.title(),
            status: screen.status_line(),
            logo: brand::LOGO.to_string(),
            panels: scene.into_panels(),
            meta,
        })?;
        snapshots += 1;

        if !options.follow || options.max_frames.is_some_and(|max| snapshots >= max) {
            break;
        }
        tokio::select! {
            _ = tokio::time::sleep(options.interval) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping follow mode");
                break;
            }
        }
    }

    screen.unmount();
    runtime.cancel_pending_for_unmount();

    let summary = HeadlessSummary {
        session_id: emitter.session_id().to_string(),
        frames: emitter.emitted(),
        snapshots,
        retries,
        last_state: ctx.readiness(),
    };
    info!(
        frames = summary.frames,
        snapshots = summary.snapshots,
        retries = summary.retries,
        state = %summary.last_state,
        "Headless session finished"
    );
    Ok(summary)
}

fn emit_startup<W: Write>(emitter: &mut FrameEmitter<W>, screen: &dyn Screen) -> Result<()> {
    let frames = brand::startup_frames(emitter.motion);
    let steps = frames.len();
    for (index, logo) in frames.into_iter().enumerate() {
        let mut meta = Map::new();
        meta.insert("startupStep".into(), json!(index + 1));
        meta.insert("startupSteps".into(), json!(steps));
        emitter.emit(FrameContent {
            kind: FrameKind::Startup,
            screen: screen.id(),
            title: screen.title(),
            status: "Starting".to_string(),
            logo,
            panels: Vec::new(),
            meta,
        })?;
    }
    Ok(())
}

fn emit_retry<W: Write>(
    emitter: &mut FrameEmitter<W>,
    screen: &dyn Screen,
    notice: &RetryNotice,
) -> Result<()> {
    let mut meta = Map::new();
    meta.insert("label".into(), json!(notice.label));
    meta.insert("attempt".into(), json!(notice.attempt));
    meta.insert("maxAttempts".into(), json!(notice.max_attempts));
    meta.insert("delayMs".into(), json!(notice.delay.as_millis() as u64));
    meta.insert("connectionState".into(), json!(notice.error.state));
    meta.insert("error".into(), json!(notice.error));
    emitter.emit(FrameContent {
        kind: FrameKind::Retry,
        screen: screen.id(),
        title: screen.title(),
        status: notice.to_string(),
        logo: brand::LOGO.to_string(),
        panels: Vec::new(),
        meta,
    })?;
    Ok(())
}

fn outcome_name(outcome: &RefreshOutcome) -> &'static str {
    match outcome {
        RefreshOutcome::Completed => "completed",
        RefreshOutcome::Failed(_) => "failed",
        RefreshOutcome::Coalesced => "coalesced",
        RefreshOutcome::Discarded => "discarded",
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn header(sequence: u64) -> FrameHeader {
        FrameHeader {
            session_id: "s-1".into(),
            sequence,
            timestamp: Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap(),
            tenant_id: None,
            motion: Motion::new(true),
        }
    }

    fn content(meta: Map<String, Value>) -> FrameContent {
        FrameContent {
            kind: FrameKind::Snapshot,
            screen: ScreenId::Devices,
            title: "Devices".into(),
            status: "Connected".into(),
            logo: brand::LOGO.into(),
            panels: vec![ScenePanel::text("a", "A", vec!["x".into()])],
            meta,
        }
    }

    #[test]
    fn test_build_frame_defaults_and_overrides() {
        let mut overrides = Map::new();
        overrides.insert("client".into(), json!("probe"));
        overrides.insert("custom".into(), json!(7));
        let frame = build_frame(header(4), content(overrides));

        assert_eq!(frame.schema_version, SCHEMA_VERSION);
        assert_eq!(frame.meta["frameKind"], "snapshot");
        assert_eq!(frame.meta["panelCount"], 1);
        assert_eq!(frame.meta["client"], "probe");
        assert_eq!(frame.meta["custom"], 7);
        assert_eq!(frame.meta["clientVersion"], env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_build_frame_is_deterministic() {
        let a = serde_json::to_string(&build_frame(header(1), content(Map::new()))).unwrap();
        let b = serde_json::to_string(&build_frame(header(1), content(Map::new()))).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_wire_field_names() {
        let value = serde_json::to_value(build_frame(header(9), content(Map::new()))).unwrap();
        assert_eq!(value["schemaVersion"], SCHEMA_VERSION);
        assert_eq!(value["sessionId"], "s-1");
        assert_eq!(value["sequence"], 9);
        assert_eq!(value["screen"], "devices");
        assert!(value["tenantId"].is_null());
        assert_eq!(value["motion"]["reducedMotion"], true);
        assert_eq!(value["timestamp"], "2026-01-02T03:04:05Z");
        assert_eq!(value["panels"][0]["kind"], "text");
    }

    #[test]
    fn test_sequencer_starts_at_one() {
        let sequencer = FrameSequencer::new("s");
        assert_eq!(sequencer.next(), 1);
        assert_eq!(sequencer.next(), 2);
        assert!(!FrameSequencer::default().session_id().is_empty());
    }

    #[test]
    fn test_emitter_writes_json_lines() {
        let mut emitter = FrameEmitter::new(Vec::new(), Some("acme".into()), Motion::default())
            .with_sequencer(FrameSequencer::new("fixed"));
        emitter.emit(content(Map::new())).unwrap();
        emitter.emit(content(Map::new())).unwrap();
        assert_eq!(emitter.emitted(), 2);

        let bytes = emitter.into_inner();
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["sequence"], 1);
        assert_eq!(lines[1]["sequence"], 2);
        assert_eq!(lines[1]["tenantId"], "acme");
    }
}
