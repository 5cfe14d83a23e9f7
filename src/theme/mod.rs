//! Theme tokens, persistence and application.

pub mod api;
pub mod engine;
pub mod palette;
pub mod preference;
pub mod store;
pub mod surface;
pub mod tokens;

pub use api::{theme_api_for, MockThemeApi, RemoteThemeApi, ThemeApi};
pub use engine::{AppliedTheme, ThemeEngine, CUSTOM_CSS_BLOCK};
pub use palette::{generate_palette, Palette};
pub use preference::{PreferenceSubscription, SystemPreference};
pub use store::{ThemeSource, ThemeStore};
pub use surface::{RenderSurface, StyleSurface, SurfaceSnapshot};
pub use tokens::{
    compute_effective_mode, css_property_name, ColorScheme, ColorTokens, Spacing, ThemeConfig, ThemeMode, Typography,
    DEFAULT_THEME,
};
