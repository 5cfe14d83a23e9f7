use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

use super::tokens::ColorScheme;

/// Where theme properties end up: document-level custom properties plus
/// named style blocks.
pub trait RenderSurface: Send {
    fn set_property(&mut self, name: &str, value: &str);
    fn remove_property(&mut self, name: &str);
    fn set_style_block(&mut self, id: &str, css: &str);
    fn remove_style_block(&mut self, id: &str);
    fn set_color_scheme(&mut self, scheme: ColorScheme);
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SurfaceSnapshot {
    pub properties: BTreeMap<String, String>,
    pub style_blocks: BTreeMap<String, String>,
    pub color_scheme: Option<ColorScheme>,
}

/// In-memory surface; clones share state so callers can inspect what an
/// engine wrote.
#[derive(Debug, Clone, Default)]
pub struct StyleSurface {
    inner: Arc<Mutex<SurfaceSnapshot>>,
}

impl StyleSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> SurfaceSnapshot {
        self.lock().clone()
    }

    pub fn property(&self, name: &str) -> Option<String> {
        self.lock().properties.get(name).cloned()
    }

    /// Render as a stylesheet: `:root` custom properties followed by each style block
    pub fn to_css(&self) -> String {
        let state = self.lock();
        let mut css = String::from(":root {\n");
        if let Some(scheme) = state.color_scheme {
            css.push_str(&format!("  color-scheme: {};\n", scheme.as_str()));
        }
        for (name, value) in &state.properties {
            css.push_str(&format!("  {}: {};\n", name, value));
        }
        css.push_str("}\n");
        for (id, block) in &state.style_blocks {
            css.push_str(&format!("\n/* {} */\n{}\n", id, block.trim_end()));
        }
        css
    }

    fn lock(&self) -> MutexGuard<'_, SurfaceSnapshot> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl RenderSurface for StyleSurface {
    fn set_property(&mut self, name: &str, value: &str) {
        self.lock().properties.insert(name.to_string(), value.to_string());
    }

    fn remove_property(&mut self, name: &str) {
        self.lock().properties.remove(name);
    }

    fn set_style_block(&mut self, id: &str, css: &str) {
        self.lock().style_blocks.insert(id.to_string(), css.to_string());
    }

    fn remove_style_block(&mut self, id: &str) {
        self.lock().style_blocks.remove(id);
    }

    fn set_color_scheme(&mut self, scheme: ColorScheme) {
        self.lock().color_scheme = Some(scheme);
    }
}
