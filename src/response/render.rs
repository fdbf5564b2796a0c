use anyhow::{anyhow, Context};
use minijinja::Environment;
use serde_json::Value;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Template engine collaborator used by deferred HTML responses.
pub trait LayoutRenderer: Send + Sync {
    fn has_layout(&self, layout: &str) -> bool;

    fn render(&self, layout: &str, values: &Value) -> anyhow::Result<String>;
}

/// Renderer for hosts without templates: no layout exists.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRenderer;

impl LayoutRenderer for NullRenderer {
    fn has_layout(&self, _layout: &str) -> bool {
        false
    }

    fn render(&self, layout: &str, _values: &Value) -> anyhow::Result<String> {
        Err(anyhow!("no renderer configured for layout \"{layout}\""))
    }
}

/// Jinja-style renderer reading `<base_dir>/<layout>.html`.
#[derive(Debug, Clone)]
pub struct TemplateRenderer {
    base_dir: PathBuf,
}

impl TemplateRenderer {
    pub fn new<P: Into<PathBuf>>(base: P) -> Self {
        Self {
            base_dir: base.into(),
        }
    }

    /// Layout name to file path; `None` for names escaping the base directory.
    fn map_layout(&self, layout: &str) -> Option<PathBuf> {
        let mut pb = self.base_dir.clone();
        for comp in Path::new(layout.trim_start_matches('/')).components() {
            match comp {
                Component::Normal(s) => pb.push(s),
                Component::CurDir => {}
                _ => return None,
            }
        }
        pb.set_extension("html");
        Some(pb)
    }
}

impl LayoutRenderer for TemplateRenderer {
    fn has_layout(&self, layout: &str) -> bool {
        self.map_layout(layout).is_some_and(|p| p.is_file())
    }

    fn render(&self, layout: &str, values: &Value) -> anyhow::Result<String> {
        let path = self
            .map_layout(layout)
            .ok_or_else(|| anyhow!("invalid layout name \"{layout}\""))?;
        let source = fs::read_to_string(&path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        let mut env = Environment::new();
        env.add_template("layout", &source)?;
        let rendered = env.get_template("layout")?.render(values)?;
        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_map_layout_prevents_traversal() {
        let renderer = TemplateRenderer::new("layouts");
        assert!(renderer.map_layout("../Cargo").is_none());
        assert_eq!(
            renderer.map_layout("error/error-404"),
            Some(PathBuf::from("layouts/error/error-404.html"))
        );
    }

    #[test]
    fn test_render_layout() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("hello.html"), "<h1>Hello {{ name }}!</h1>").unwrap();
        let renderer = TemplateRenderer::new(dir.path());
        assert!(renderer.has_layout("hello"));
        assert!(!renderer.has_layout("missing"));
        let html = renderer.render("hello", &json!({ "name": "World" })).unwrap();
        assert_eq!(html, "<h1>Hello World!</h1>");
    }
}
