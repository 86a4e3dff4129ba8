//! The HTML page wrapped around a view's first render.

use liveframe_core::{RenderError, StaticRender, TemplateRenderer};
use serde::Serialize;

use crate::router::socket_path;

const SHELL_TEMPLATE: &str = "shell.html";

/// Renders the page shell.
#[derive(Debug, Clone)]
pub struct Shell {
    renderer: TemplateRenderer,
}

#[derive(Serialize)]
struct ShellContext<'a> {
    title: &'a str,
    socket_path: String,
    token: &'a str,
    markup: &'a str,
}

impl Shell {
    /// The built-in shell.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Template`] if the shell template does not
    /// compile.
    pub fn new() -> Result<Self, RenderError> {
        let renderer = TemplateRenderer::new()
            .with_template(SHELL_TEMPLATE, include_str!("../templates/shell.html"))?;
        Ok(Self { renderer })
    }

    /// Wrap the first render of the view at `view_path`.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Template`] if rendering fails.
    pub fn render(&self, view_path: &str, page: &StaticRender) -> Result<String, RenderError> {
        self.renderer.render(
            SHELL_TEMPLATE,
            &ShellContext {
                title: view_path,
                socket_path: socket_path(view_path),
                token: &page.token,
                markup: &page.markup,
            },
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use liveframe_core::ViewPhase;
    use liveframe_types::SessionId;

    use super::*;

    #[test]
    fn shell_embeds_markup_verbatim() {
        let shell = Shell::new().unwrap();
        let page = StaticRender {
            markup: String::from("<p class=\"t\">12:00:00</p>"),
            session_id: SessionId::new(),
            token: String::from("ab.cd"),
            phase: ViewPhase::MountedDisconnected,
        };
        let html = shell.render("/clock", &page).unwrap();
        assert!(html.contains("<div data-live-root data-live-socket="));
        assert!(html.contains("data-live-token=\"ab.cd\"><p class=\"t\">12:00:00</p></div>"));
        assert!(html.contains("<script src=\"/live.js\"></script>"));
    }

    #[test]
    fn title_is_escaped() {
        let shell = Shell::new().unwrap();
        let page = StaticRender {
            markup: String::new(),
            session_id: SessionId::new(),
            token: String::new(),
            phase: ViewPhase::MountedDisconnected,
        };
        let html = shell.render("/<x>", &page).unwrap();
        assert!(!html.contains("<x>"));
        assert!(html.contains("&lt;x&gt;</title>"));
    }
}
