//! Template rendering and the per-socket render pipeline.
//!
//! [`TemplateRenderer`] wraps a `minijinja` [`Environment`]. Templates
//! whose names end in `.html` are auto-escaped. [`RenderPipeline`] keeps
//! the previous render of one socket and turns each new render into the
//! patch that brings the client up to date.

use std::path::Path;

use liveframe_types::Patch;
use minijinja::Environment;
use serde::Serialize;

use crate::diff::diff_fragments;
use crate::error::RenderError;
use crate::markup::Fragment;

/// Named templates rendered against serializable state.
#[derive(Debug, Clone)]
pub struct TemplateRenderer {
    env: Environment<'static>,
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateRenderer {
    /// A renderer with no templates yet. Built-in filters and `.html`
    /// auto-escaping are enabled.
    pub fn new() -> Self {
        Self {
            env: Environment::new(),
        }
    }

    /// A renderer that loads templates lazily from `dir` by name.
    pub fn from_dir(dir: impl AsRef<Path>) -> Self {
        let mut env = Environment::new();
        env.set_loader(minijinja::path_loader(dir));
        Self { env }
    }

    /// Register a template from source.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Template`] if the source does not compile.
    pub fn add_template(
        &mut self,
        name: impl Into<String>,
        source: impl Into<String>,
    ) -> Result<(), RenderError> {
        let name = name.into();
        self.env
            .add_template_owned(name.clone(), source.into())
            .map_err(|e| RenderError::Template(format!("{name}: {e}")))
    }

    /// Builder form of [`TemplateRenderer::add_template`].
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Template`] if the source does not compile.
    pub fn with_template(
        mut self,
        name: impl Into<String>,
        source: impl Into<String>,
    ) -> Result<Self, RenderError> {
        self.add_template(name, source)?;
        Ok(self)
    }

    /// Render the named template with `context`.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Template`] if the template is missing or
    /// fails to render.
    pub fn render<C: Serialize>(&self, name: &str, context: &C) -> Result<String, RenderError> {
        self.env
            .get_template(name)
            .and_then(|tpl| tpl.render(context))
            .map_err(|e| RenderError::Template(format!("{name}: {e}")))
    }
}

/// Tracks the last render sent to one client.
#[derive(Debug, Default)]
pub struct RenderPipeline {
    markup: Option<String>,
    tree: Option<Fragment>,
}

impl RenderPipeline {
    /// A pipeline that has not rendered yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept a new render and return the patch from the previous one.
    ///
    /// The first render, and any render that cannot be parsed into a
    /// tree on either side, yields a full `replace_all`.
    pub fn advance(&mut self, markup: String) -> Patch {
        let tree = Fragment::parse(&markup).ok();
        let patch = match (&self.markup, &self.tree, &tree) {
            (None, _, _) => Patch::replace_all(markup.as_str()),
            (Some(previous), _, _) if *previous == markup => Patch::empty(),
            (Some(_), Some(old), Some(new)) => diff_fragments(old, new),
            (Some(_), _, _) => Patch::replace_all(markup.as_str()),
        };
        self.markup = Some(markup);
        self.tree = tree;
        patch
    }

    /// The last accepted render.
    pub fn last_markup(&self) -> Option<&str> {
        self.markup.as_deref()
    }

    /// Forget the previous render; the next one becomes a `replace_all`.
    pub fn reset(&mut self) {
        self.markup = None;
        self.tree = None;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use liveframe_types::PatchOp;
    use serde_json::json;

    use super::*;
    use crate::diff::apply;

    #[test]
    fn renders_registered_template() {
        let renderer = TemplateRenderer::new()
            .with_template("count.html", "<p>{{ n }}</p>")
            .unwrap();
        let html = renderer.render("count.html", &json!({"n": 4})).unwrap();
        assert_eq!(html, "<p>4</p>");
    }

    #[test]
    fn html_templates_are_escaped() {
        let renderer = TemplateRenderer::new()
            .with_template("x.html", "<p>{{ v }}</p>")
            .unwrap();
        let html = renderer.render("x.html", &json!({"v": "<b>"})).unwrap();
        assert_eq!(html, "<p>&lt;b&gt;</p>");
    }

    #[test]
    fn builtin_filters_are_available() {
        let renderer = TemplateRenderer::default()
            .with_template("page.html", "<div>{{ body|safe }}</div>{{ name|upper }}")
            .unwrap();
        let html = renderer
            .render("page.html", &json!({"body": "<b>x</b>", "name": "ok"}))
            .unwrap();
        assert_eq!(html, "<div><b>x</b></div>OK");
    }

    #[test]
    fn escaped_render_diffs_to_dom_text() {
        let renderer = TemplateRenderer::new()
            .with_template("v.html", r#"<p title="{{ v }}">{{ v }}</p>"#)
            .unwrap();
        let mut pipeline = RenderPipeline::new();
        pipeline.advance(renderer.render("v.html", &json!({"v": "a"})).unwrap());

        let next = renderer.render("v.html", &json!({"v": "Tom & Jerry's"})).unwrap();
        assert_eq!(
            next,
            r#"<p title="Tom &amp; Jerry&#x27;s">Tom &amp; Jerry&#x27;s</p>"#
        );
        let patch = pipeline.advance(next);
        assert_eq!(
            patch.ops,
            vec![
                PatchOp::SetAttr {
                    path: vec![0],
                    name: String::from("title"),
                    value: String::from("Tom & Jerry's"),
                },
                PatchOp::SetText {
                    path: vec![0, 0],
                    text: String::from("Tom & Jerry's"),
                },
            ]
        );
    }

    #[test]
    fn missing_template_is_an_error() {
        let renderer = TemplateRenderer::new();
        let err = renderer.render("nope.html", &json!({})).unwrap_err();
        assert!(matches!(err, RenderError::Template(_)));
    }

    #[test]
    fn bad_template_source_is_rejected() {
        let mut renderer = TemplateRenderer::new();
        assert!(renderer.add_template("bad.html", "{% if %}").is_err());
    }

    #[test]
    fn pipeline_first_render_replaces_everything() {
        let mut pipeline = RenderPipeline::new();
        let patch = pipeline.advance(String::from("<p>1</p>"));
        assert_eq!(patch, Patch::replace_all("<p>1</p>"));
        assert_eq!(pipeline.last_markup(), Some("<p>1</p>"));
    }

    #[test]
    fn pipeline_unchanged_render_is_empty() {
        let mut pipeline = RenderPipeline::new();
        pipeline.advance(String::from("<p>1</p>"));
        assert!(pipeline.advance(String::from("<p>1</p>")).is_empty());
    }

    #[test]
    fn pipeline_patches_apply_to_previous_render() {
        let mut pipeline = RenderPipeline::new();
        let renders = [
            "<div><p>1</p></div>",
            "<div><p>1 &amp; 2</p></div>",
            "<div><p>2</p><p>x</p></div>",
            "<div class=\"done\"><p>2</p></div>",
            "<span>gone</span>",
        ];
        let mut client: Option<String> = None;
        for render in renders {
            let patch = pipeline.advance(render.to_owned());
            client = Some(apply(client.as_deref(), &patch).unwrap());
            assert_eq!(
                client.as_deref().map(Fragment::parse),
                Some(Fragment::parse(render))
            );
        }
    }

    #[test]
    fn pipeline_recovers_from_unparseable_render() {
        let mut pipeline = RenderPipeline::new();
        pipeline.advance(String::from("<p>1</p>"));
        let patch = pipeline.advance(String::from("<p>unclosed"));
        assert_eq!(patch, Patch::replace_all("<p>unclosed"));
        let patch = pipeline.advance(String::from("<p>2</p>"));
        assert_eq!(patch, Patch::replace_all("<p>2</p>"));
        let patch = pipeline.advance(String::from("<p>3</p>"));
        assert!(matches!(patch.iter().next(), Some(PatchOp::SetText { .. })));
    }

    #[test]
    fn reset_forces_full_render() {
        let mut pipeline = RenderPipeline::new();
        pipeline.advance(String::from("<p>1</p>"));
        pipeline.reset();
        assert_eq!(
            pipeline.advance(String::from("<p>1</p>")),
            Patch::replace_all("<p>1</p>")
        );
    }
}
