//! App: terminal init, main loop, tick and key handling.

use crate::Args;
use crate::input::{Action, key_to_action};
use crate::theme::Theme;
use crate::ui::{self, Fades, View};
use anyhow::Result;
use crossterm::event::{self, Event, KeyEvent, KeyEventKind};
use ratatui::DefaultTerminal;
use std::time::{Duration, Instant};
use tilecascade::{
    Controller, GameMode, GameSettings, Intent, IntentKind, MatchOutcome, Session, Shift,
};

/// Terminals without key release events: accelerate stays on this long after the last press.
const ACCELERATE_HOLD_MS: u64 = 220;
/// Longest simulation step; a stalled terminal must not teleport tiles.
const MAX_STEP_SECS: f32 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Playing,
    Result,
}

pub struct App {
    args: Args,
    settings: GameSettings,
    theme: Theme,
    session: Session,
    screen: Screen,
    paused: bool,
    last_tick: Instant,
    /// When accelerate switches off again, if it is on.
    accelerate_until: Option<Instant>,
    fades: Fades,
    best_score: u64,
    seed: u64,
}

fn build_session(
    settings: &GameSettings,
    mode: GameMode,
    opponents: u8,
    seed: u64,
    best_score: u64,
) -> Result<Session> {
    let mut session = Session::new(settings.clone(), mode, seed)?.with_best_score(best_score);
    session.add_grid(true)?;
    if mode == GameMode::Versus {
        for _ in 0..opponents.max(1) {
            session.add_grid(false)?;
        }
    }
    session.start();
    log::info!(
        "new {:?} match with {} grid(s), seed {seed}",
        mode,
        session.grids().count()
    );
    Ok(session)
}

impl App {
    pub fn new(args: Args, settings: GameSettings, theme: Theme) -> Result<Self> {
        let seed = args.seed.unwrap_or_else(rand::random);
        let session = build_session(&settings, args.game_mode(), args.opponents, seed, 0)?;
        Ok(Self {
            args,
            settings,
            theme,
            session,
            screen: Screen::Playing,
            paused: false,
            last_tick: Instant::now(),
            accelerate_until: None,
            fades: Fades::default(),
            best_score: 0,
            seed,
        })
    }

    fn reset_game(&mut self) -> Result<()> {
        self.seed = self.seed.wrapping_add(1);
        self.session = build_session(
            &self.settings,
            self.args.game_mode(),
            self.args.opponents,
            self.seed,
            self.best_score,
        )?;
        self.screen = Screen::Playing;
        self.paused = false;
        self.last_tick = Instant::now();
        self.accelerate_until = None;
        self.fades.clear();
        Ok(())
    }

    fn send(&mut self, kind: IntentKind) {
        let Some(grid) = self.session.player_grid() else {
            return;
        };
        let intent = Intent {
            grid,
            source: Controller::Player,
            kind,
        };
        if let Err(err) = self.session.apply_intent(intent) {
            log::warn!("dropped player intent {kind:?}: {err}");
        }
    }

    fn set_accelerate(&mut self, on: bool, now: Instant) {
        if on {
            self.send(IntentKind::Accelerate(true));
            self.accelerate_until = Some(now + Duration::from_millis(ACCELERATE_HOLD_MS));
        } else if self.accelerate_until.take().is_some() {
            self.send(IntentKind::Accelerate(false));
        }
    }

    /// Returns true when the app should exit.
    fn handle_key(&mut self, key: KeyEvent, now: Instant) -> Result<bool> {
        let action = key_to_action(key);
        if key.kind == KeyEventKind::Release {
            if action == Action::Accelerate {
                self.set_accelerate(false, now);
            }
            return Ok(false);
        }
        match (self.screen, action) {
            (_, Action::Quit) => return Ok(true),
            (Screen::Playing, Action::Pause) => {
                self.paused = !self.paused;
                self.set_accelerate(false, now);
            }
            (Screen::Playing, _) if self.paused => {}
            (Screen::Playing, Action::ShiftLeft) => self.send(IntentKind::ShiftColumn(Shift::Left)),
            (Screen::Playing, Action::ShiftRight) => {
                self.send(IntentKind::ShiftColumn(Shift::Right));
            }
            (Screen::Playing, Action::Rotate) => self.send(IntentKind::Rotate),
            (Screen::Playing, Action::Accelerate) => self.set_accelerate(true, now),
            (Screen::Result, Action::Restart) => self.reset_game()?,
            _ => {}
        }
        Ok(false)
    }

    fn update(&mut self, now: Instant) {
        if self.accelerate_until.is_some_and(|until| now >= until) {
            self.set_accelerate(false, now);
        }
        if self.paused {
            self.last_tick = now;
            return;
        }
        let rate = self.args.tick_rate.max(1.0);
        let tick_interval = Duration::from_secs_f64(1.0 / rate);
        let elapsed = now.saturating_duration_since(self.last_tick);
        if elapsed < tick_interval {
            return;
        }
        self.session.tick(elapsed.as_secs_f32().min(MAX_STEP_SECS));
        self.last_tick = now;

        if self.screen == Screen::Playing {
            if let Some(outcome) = self.session.outcome() {
                let score = match outcome {
                    MatchOutcome::Finished { score, .. }
                    | MatchOutcome::Won { score }
                    | MatchOutcome::Lost { score } => score,
                    MatchOutcome::Decided { .. } => 0,
                };
                log::info!("match over: {outcome:?}");
                self.best_score = self.best_score.max(score);
                self.screen = Screen::Result;
                self.set_accelerate(false, now);
            }
        }
    }

    pub fn run(&mut self) -> Result<()> {
        use crossterm::{
            event::{KeyboardEnhancementFlags, PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags},
            execute,
            terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
        };

        enable_raw_mode()?;
        let mut stdout = std::io::stdout();
        execute!(stdout, EnterAlternateScreen)?;

        // Release events let accelerate stop as soon as the key is let go
        let _ = execute!(
            stdout,
            PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::REPORT_EVENT_TYPES)
        );

        let mut terminal =
            ratatui::DefaultTerminal::new(ratatui::backend::CrosstermBackend::new(stdout))?;

        let result = self.run_loop(&mut terminal);

        // Restore
        let _ = execute!(std::io::stdout(), PopKeyboardEnhancementFlags);
        execute!(std::io::stdout(), LeaveAlternateScreen)?;
        disable_raw_mode()?;

        result
    }

    fn run_loop(&mut self, terminal: &mut DefaultTerminal) -> Result<()> {
        loop {
            let now = Instant::now();
            let view = View {
                session: &self.session,
                settings: &self.settings,
                theme: &self.theme,
                screen: self.screen,
                paused: self.paused,
                best_score: self.best_score,
                no_animation: self.args.no_animation,
            };
            let fades = &mut self.fades;
            terminal.draw(|f| ui::draw(f, &view, fades, now))?;

            // Limit event polling to hit ~60 FPS rendering (16ms)
            let frame_duration = Duration::from_millis(16);
            let timeout = frame_duration.saturating_sub(now.elapsed());

            if event::poll(timeout)? {
                while event::poll(Duration::ZERO)? {
                    if let Event::Key(key) = event::read()? {
                        if self.handle_key(key, Instant::now())? {
                            return Ok(());
                        }
                    }
                }
            }

            self.update(Instant::now());
        }
    }
}
