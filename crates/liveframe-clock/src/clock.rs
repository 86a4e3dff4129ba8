//! The clock view.
//!
//! State is the current time. Once the view is connected it schedules a
//! `tick` for itself every second; each tick sets the time to now and
//! schedules the next one. Closing the socket cancels the pending tick.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use liveframe_core::{RenderError, SocketContext, TemplateRenderer, View, ViewError};
use liveframe_types::Event;
use serde::{Deserialize, Serialize};

/// Path the clock is served at.
pub const CLOCK_PATH: &str = "/clock";

/// Self-event that advances the clock.
pub const TICK_EVENT: &str = "tick";

/// Time between ticks.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

const TEMPLATE: &str = "clock.html";

/// The clock's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockState {
    /// Time shown.
    pub time: DateTime<Utc>,
}

impl ClockState {
    /// State showing the current time.
    pub fn now() -> Self {
        Self { time: Utc::now() }
    }
}

#[derive(Serialize)]
struct ClockContext {
    time: String,
    iso: String,
}

/// Compile the clock template.
pub fn renderer() -> Result<TemplateRenderer, RenderError> {
    TemplateRenderer::new().with_template(TEMPLATE, include_str!("../templates/clock.html"))
}

fn render(renderer: &TemplateRenderer, state: &ClockState) -> Result<String, RenderError> {
    renderer.render(
        TEMPLATE,
        &ClockContext {
            time: state.time.format("%H:%M:%S").to_string(),
            iso: state.time.to_rfc3339_opts(SecondsFormat::Secs, true),
        },
    )
}

fn schedule_tick(socket: &SocketContext) {
    socket.schedule_self(Event::new(TICK_EVENT), TICK_INTERVAL);
}

/// Build the clock view.
pub fn clock_view(renderer: TemplateRenderer) -> Result<View<ClockState>, ViewError> {
    let renderer = Arc::new(renderer);
    View::builder(CLOCK_PATH)
        .mount(|ctx, prior: Option<ClockState>| async move {
            if let Some(socket) = ctx.socket() {
                schedule_tick(socket);
            }
            Ok(prior.unwrap_or_else(ClockState::now))
        })
        .render(move |state: &ClockState| render(&renderer, state))
        .handle_self(TICK_EVENT, |ctx, _state: ClockState, _event| async move {
            schedule_tick(&ctx);
            Ok(ClockState::now())
        })
        .build()
}
