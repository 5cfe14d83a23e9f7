use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

use super::preference::{PreferenceSubscription, SystemPreference};
use super::surface::RenderSurface;
use super::tokens::{compute_effective_mode, ColorScheme, ThemeConfig, ThemeMode};
use crate::error::ThemeError;
use crate::tenant::TenantConfig;

/// Id of the single style block holding tenant override CSS
pub const CUSTOM_CSS_BLOCK: &str = "tenant-custom-css";

/// What is (or was) on the surface
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedTheme {
    pub tenant_id: Option<String>,
    pub mode: ThemeMode,
    pub effective: ColorScheme,
    pub properties: BTreeMap<String, String>,
    #[serde(skip)]
    pub theme: Arc<ThemeConfig>,
}

struct EngineState {
    surface: Box<dyn RenderSurface>,
    committed: Option<AppliedTheme>,
    visible: Option<AppliedTheme>,
    previewing: bool,
    written: BTreeSet<String>,
}

/// Applies tenant themes to a render surface. Every application fully
/// replaces the previous one; nothing is merged or diffed.
#[derive(Clone)]
pub struct ThemeEngine {
    state: Arc<Mutex<EngineState>>,
    system: SystemPreference,
}

impl ThemeEngine {
    pub fn new(surface: Box<dyn RenderSurface>, system: SystemPreference) -> Self {
        Self {
            state: Arc::new(Mutex::new(EngineState {
                surface,
                committed: None,
                visible: None,
                previewing: false,
                written: BTreeSet::new(),
            })),
            system,
        }
    }

    pub fn system_preference(&self) -> &SystemPreference {
        &self.system
    }

    /// Apply and commit. A missing tenant (or tenant theme) means the default theme.
    pub fn apply_theme(&self, tenant: Option<&TenantConfig>, mode: ThemeMode) -> Result<AppliedTheme, ThemeError> {
        let theme = tenant.and_then(|t| t.theme()).cloned().unwrap_or_default();
        self.apply_config(tenant.map(|t| t.id.clone()), theme, mode)
    }

    /// Apply and commit an explicit theme, e.g. one loaded through the theme store.
    ///
    /// An invalid theme is refused: the default theme is rendered in its place
    /// and the validation error returned, so the previous theme never stays visible.
    pub fn apply_config(
        &self,
        tenant_id: Option<String>,
        theme: ThemeConfig,
        mode: ThemeMode,
    ) -> Result<AppliedTheme, ThemeError> {
        let mut state = self.lock();
        if let Err(e) = theme.validate() {
            tracing::error!("Refusing to apply theme for {:?}: {}", tenant_id, e);
            let fallback = self.render(&mut state, tenant_id, Arc::new(ThemeConfig::default()), mode);
            state.committed = Some(fallback);
            state.previewing = false;
            return Err(e);
        }

        let applied = self.render(&mut state, tenant_id, Arc::new(theme), mode);
        state.committed = Some(applied.clone());
        state.previewing = false;
        tracing::debug!("Applied {:?} theme ({:?})", applied.effective, applied.tenant_id);
        Ok(applied)
    }

    /// Show a theme without committing it
    pub fn preview_theme(&self, tenant: Option<&TenantConfig>, mode: ThemeMode) -> Result<AppliedTheme, ThemeError> {
        let theme = tenant.and_then(|t| t.theme()).cloned().unwrap_or_default();
        self.preview_config(tenant.map(|t| t.id.clone()), theme, mode)
    }

    pub fn preview_config(
        &self,
        tenant_id: Option<String>,
        theme: ThemeConfig,
        mode: ThemeMode,
    ) -> Result<AppliedTheme, ThemeError> {
        theme.validate()?;
        let mut state = self.lock();
        let applied = self.render(&mut state, tenant_id, Arc::new(theme), mode);
        state.previewing = true;
        Ok(applied)
    }

    /// Drop the preview and restore the committed theme (or the default)
    pub fn remove_preview(&self) -> AppliedTheme {
        let mut state = self.lock();
        state.previewing = false;
        match state.committed.clone() {
            Some(committed) => self.render(&mut state, committed.tenant_id, committed.theme, committed.mode),
            None => self.render(&mut state, None, Arc::new(ThemeConfig::default()), ThemeMode::System),
        }
    }

    /// Re-apply the committed theme under a new mode
    pub fn set_mode(&self, mode: ThemeMode) -> AppliedTheme {
        let mut state = self.lock();
        state.previewing = false;
        let (tenant_id, theme) = match state.committed.clone() {
            Some(committed) => (committed.tenant_id, committed.theme),
            None => (None, Arc::new(ThemeConfig::default())),
        };
        let applied = self.render(&mut state, tenant_id, theme, mode);
        state.committed = Some(applied.clone());
        applied
    }

    pub fn current(&self) -> Option<AppliedTheme> {
        self.lock().visible.clone()
    }

    pub fn is_previewing(&self) -> bool {
        self.lock().previewing
    }

    /// Follow platform preference flips while the visible theme is in `System`
    /// mode. The listener lives as long as the returned subscription.
    pub fn watch_system_preference(&self) -> PreferenceSubscription {
        let engine = self.clone();
        let mut rx = self.system.subscribe();
        let task = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let scheme = *rx.borrow_and_update();
                engine.on_system_change(scheme);
            }
        });
        PreferenceSubscription::new(task)
    }

    /// Re-render after the platform preference changed
    pub fn on_system_change(&self, scheme: ColorScheme) {
        let mut state = self.lock();
        let Some(visible) = state.visible.clone() else {
            return;
        };
        if visible.mode != ThemeMode::System || visible.effective == scheme {
            return;
        }
        tracing::debug!("System preference changed to {:?}, re-applying", scheme);
        let applied = self.render(&mut state, visible.tenant_id, visible.theme, visible.mode);
        if !state.previewing {
            state.committed = Some(applied);
        }
    }

    /// Reset the surface and forget everything applied
    pub fn teardown(&self) {
        let mut state = self.lock();
        let written = std::mem::take(&mut state.written);
        for name in &written {
            state.surface.remove_property(name);
        }
        state.surface.remove_style_block(CUSTOM_CSS_BLOCK);
        state.committed = None;
        state.visible = None;
        state.previewing = false;
    }

    fn render(
        &self,
        state: &mut EngineState,
        tenant_id: Option<String>,
        theme: Arc<ThemeConfig>,
        mode: ThemeMode,
    ) -> AppliedTheme {
        let effective = compute_effective_mode(mode, self.system.current());
        let properties = theme.properties(effective);

        let stale: Vec<String> = state
            .written
            .iter()
            .filter(|name| !properties.contains_key(*name))
            .cloned()
            .collect();
        for name in &stale {
            state.surface.remove_property(name);
        }
        for (name, value) in &properties {
            state.surface.set_property(name, value);
        }
        state.written = properties.keys().cloned().collect();
        state.surface.set_color_scheme(effective);

        match theme.custom_css.as_deref().map(str::trim) {
            Some(css) if !css.is_empty() => state.surface.set_style_block(CUSTOM_CSS_BLOCK, css),
            _ => state.surface.remove_style_block(CUSTOM_CSS_BLOCK),
        }

        let applied = AppliedTheme {
            tenant_id,
            mode,
            effective,
            properties,
            theme,
        };
        state.visible = Some(applied.clone());
        applied
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
