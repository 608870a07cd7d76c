use std::{sync::Arc, time::Duration};

use tokio::{
    sync::Mutex,
    task::JoinHandle,
    time::{self, Instant},
};

use crate::{
    config::ProctorConfig,
    emit::{emit_json, Emitter, GUARD_COUNTDOWN, GUARD_STATE_CHANGED, WARNINGS_CHANGED},
    warnings::{WarningCategory, WarningLedger},
};

use super::{
    focus::FocusSignal,
    navigation::{DisqualificationReason, FullscreenError, FullscreenHost, Navigator},
    state::{BannerKind, GuardPhase, GuardState, WarningBanner},
};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct CountdownEvent {
    remaining_secs: u32,
}

/// Keeps the candidate in fullscreen and foregrounded for one session.
///
/// Browser events are fed in through the `on_*` methods. Two independent
/// paths end in navigation: the fullscreen countdown expiring, and any ledger
/// category going over its limit.
#[derive(Clone)]
pub struct GuardController {
    state: Arc<Mutex<GuardState>>,
    ledger: WarningLedger,
    host: Arc<dyn FullscreenHost>,
    navigator: Arc<dyn Navigator>,
    emitter: Arc<dyn Emitter>,
    disqualify_route: String,
    ticker: Arc<Mutex<Option<JoinHandle<()>>>>,
    ledger_watch: Arc<Mutex<Option<JoinHandle<()>>>>,
    tick_interval: Duration,
}

impl GuardController {
    pub fn new(
        config: &ProctorConfig,
        ledger: WarningLedger,
        host: Arc<dyn FullscreenHost>,
        navigator: Arc<dyn Navigator>,
        emitter: Arc<dyn Emitter>,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(GuardState::new(config.countdown_seconds))),
            ledger,
            host,
            navigator,
            emitter,
            disqualify_route: config.disqualify_route.clone(),
            ticker: Arc::new(Mutex::new(None)),
            ledger_watch: Arc::new(Mutex::new(None)),
            tick_interval: Duration::from_secs(1),
        }
    }

    pub async fn get_state(&self) -> GuardState {
        self.state.lock().await.clone()
    }

    pub fn ledger(&self) -> &WarningLedger {
        &self.ledger
    }

    /// Starts watching the ledger and eagerly requests fullscreen. A denied
    /// request warns straight away instead of leaving the session unguarded.
    pub async fn mount(&self) {
        self.spawn_ledger_watch().await;

        match self.host.request_fullscreen() {
            Ok(()) => {
                log_info!("guard mounted in fullscreen");
                self.emit_state_changed().await;
            }
            Err(err) => {
                log_warn!("initial fullscreen request failed: {err}");
                let epoch = {
                    let mut state = self.state.lock().await;
                    if state.is_terminal() {
                        return;
                    }
                    let total = state.countdown_total_secs;
                    state.begin_countdown(WarningBanner::fullscreen_blocked(
                        err.user_message(),
                        total,
                    ))
                };
                self.spawn_ticker(epoch).await;
                self.emit_state_changed().await;
            }
        }
    }

    /// Stops any running countdown and the ledger watch.
    pub async fn unmount(&self) {
        self.state.lock().await.cancel_countdown();
        self.cancel_ticker().await;
        if let Some(handle) = self.ledger_watch.lock().await.take() {
            handle.abort();
        }
        log_info!("guard unmounted");
    }

    pub async fn on_fullscreen_change(&self, is_fullscreen: bool) {
        if is_fullscreen {
            self.enter_protected().await;
        } else {
            self.exit_fullscreen().await;
        }
    }

    /// The banner's "return to fullscreen" action.
    pub async fn return_to_fullscreen(&self) -> Result<(), FullscreenError> {
        match self.host.request_fullscreen() {
            Ok(()) => {
                self.enter_protected().await;
                Ok(())
            }
            Err(err) => {
                log_warn!("fullscreen retry failed: {err}");
                Err(err)
            }
        }
    }

    pub async fn on_window_blur(&self) {
        self.on_focus_signal(FocusSignal::Blur).await;
    }

    pub async fn on_visibility_change(&self, hidden: bool) {
        let signal = if hidden {
            FocusSignal::Hidden
        } else {
            FocusSignal::Visible
        };
        self.on_focus_signal(signal).await;
    }

    pub async fn on_window_focus(&self) {
        self.on_focus_signal(FocusSignal::Focus).await;
    }

    /// Clears a tab-switch banner. Countdown banners stay until fullscreen is
    /// restored.
    pub async fn dismiss_banner(&self) {
        let changed = {
            let mut state = self.state.lock().await;
            match state.banner.as_ref().map(|b| b.kind) {
                Some(BannerKind::TabSwitch) => {
                    state.banner = None;
                    true
                }
                _ => false,
            }
        };
        if changed {
            self.emit_state_changed().await;
        }
    }

    /// Issues the disqualification redirect. Returns `false` when one was
    /// already issued; navigation never repeats.
    pub async fn disqualify(&self, reason: DisqualificationReason) -> bool {
        let issued = {
            let mut state = self.state.lock().await;
            state.disqualify(reason)
        };
        if !issued {
            return false;
        }

        let route = reason.route(&self.disqualify_route);
        log_warn!("disqualifying candidate: {}", reason.as_str());
        self.navigator.navigate(&route);
        self.emit_state_changed().await;
        true
    }

    async fn enter_protected(&self) {
        let was_warned = {
            let mut state = self.state.lock().await;
            let was_warned = matches!(state.phase, GuardPhase::Warned { .. });
            if was_warned {
                state.cancel_countdown();
            }
            was_warned
        };

        if was_warned {
            self.cancel_ticker().await;
            log_info!("fullscreen restored, countdown cancelled");
            self.emit_state_changed().await;
        }
    }

    async fn exit_fullscreen(&self) {
        let epoch = {
            let mut state = self.state.lock().await;
            if state.phase != GuardPhase::Protected {
                return;
            }
            let total = state.countdown_total_secs;
            state.begin_countdown(WarningBanner::fullscreen_exited(total))
        };

        let count = self.ledger.increment_fullscreen_exit();
        log_warn!("fullscreen exited (exit #{count})");
        self.spawn_ticker(epoch).await;
        self.emit_state_changed().await;
    }

    async fn on_focus_signal(&self, signal: FocusSignal) {
        let counted = {
            let mut state = self.state.lock().await;
            if state.is_terminal() {
                return;
            }
            state.focus.apply(signal)
        };
        if !counted {
            return;
        }

        let count = self.ledger.increment_tab_switch();
        let limit = self.ledger.state().limit(WarningCategory::TabSwitch);
        log_warn!("tab switch detected via {signal:?} ({count}/{limit})");

        {
            let mut state = self.state.lock().await;
            // A running countdown keeps its banner.
            if state.phase == GuardPhase::Protected {
                state.banner = Some(WarningBanner::tab_switch(count, limit));
            }
        }
        self.emit_state_changed().await;
    }

    async fn spawn_ticker(&self, epoch: u64) {
        let mut ticker_guard = self.ticker.lock().await;
        if let Some(handle) = ticker_guard.take() {
            handle.abort();
        }

        let controller = self.clone();
        let period = self.tick_interval;

        let handle = tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            loop {
                interval.tick().await;

                let remaining = {
                    let mut state = controller.state.lock().await;
                    match state.tick(epoch) {
                        Some(remaining) => remaining,
                        None => break,
                    }
                };

                emit_json(
                    controller.emitter.as_ref(),
                    GUARD_COUNTDOWN,
                    &CountdownEvent {
                        remaining_secs: remaining,
                    },
                );

                if remaining == 0 {
                    // The change event can be lost; trust the host's answer.
                    if controller.host.is_fullscreen() {
                        controller.state.lock().await.cancel_countdown();
                        // Detach rather than abort: this task is the ticker.
                        controller.ticker.lock().await.take();
                        log_info!("fullscreen already restored at expiry, countdown cancelled");
                        controller.emit_state_changed().await;
                    } else {
                        controller
                            .disqualify(DisqualificationReason::LeftFullscreen)
                            .await;
                    }
                    break;
                }
            }
        });

        *ticker_guard = Some(handle);
    }

    async fn cancel_ticker(&self) {
        if let Some(handle) = self.ticker.lock().await.take() {
            handle.abort();
        }
    }

    async fn spawn_ledger_watch(&self) {
        let mut watch_guard = self.ledger_watch.lock().await;
        if watch_guard.is_some() {
            return;
        }

        let controller = self.clone();
        let mut rx = self.ledger.subscribe();

        let handle = tokio::spawn(async move {
            loop {
                let (snapshot, first_exceeded) = {
                    let state = rx.borrow_and_update();
                    (state.snapshot(), state.exceeded_categories().first().copied())
                };
                emit_json(controller.emitter.as_ref(), WARNINGS_CHANGED, &snapshot);

                if let Some(category) = first_exceeded {
                    controller
                        .disqualify(DisqualificationReason::for_category(category))
                        .await;
                    break;
                }

                if rx.changed().await.is_err() {
                    log_error!("warning ledger dropped while guard was watching");
                    break;
                }
            }
        });

        *watch_guard = Some(handle);
    }

    async fn emit_state_changed(&self) {
        let state = self.state.lock().await.clone();
        emit_json(self.emitter.as_ref(), GUARD_STATE_CHANGED, &state);
    }
}
