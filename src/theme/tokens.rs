//! Theme data model and the token → custom-property naming transform.

use std::collections::{BTreeMap, BTreeSet};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::ThemeError;

pub const COLOR_PREFIX: &str = "--color-";
pub const SHADOW_PREFIX: &str = "--shadow-";
pub const FONT_FAMILY: &str = "--font-family";
pub const FONT_FAMILY_HEADING: &str = "--font-family-heading";
pub const FONT_SIZE_BASE: &str = "--font-size-base";
pub const BORDER_RADIUS: &str = "--border-radius";
pub const SPACING_UNIT: &str = "--spacing-unit";

/// Requested mode; `System` follows the platform preference
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    #[default]
    Light,
    Dark,
    System,
}

/// Concrete rendering mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorScheme {
    #[default]
    Light,
    Dark,
}

impl ThemeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThemeMode::Light => "light",
            ThemeMode::Dark => "dark",
            ThemeMode::System => "system",
        }
    }
}

impl std::str::FromStr for ThemeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "light" => Ok(ThemeMode::Light),
            "dark" => Ok(ThemeMode::Dark),
            "system" | "auto" => Ok(ThemeMode::System),
            other => Err(format!("unknown theme mode '{}'", other)),
        }
    }
}

impl ColorScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColorScheme::Light => "light",
            ColorScheme::Dark => "dark",
        }
    }
}

pub fn compute_effective_mode(mode: ThemeMode, system: ColorScheme) -> ColorScheme {
    match mode {
        ThemeMode::Light => ColorScheme::Light,
        ThemeMode::Dark => ColorScheme::Dark,
        ThemeMode::System => system,
    }
}

/// camelCase token key → color token set
pub type ColorTokens = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Typography {
    pub font_family: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading_font_family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size_base: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spacing {
    pub border_radius: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl Default for Typography {
    fn default() -> Self {
        DEFAULT_THEME.typography.clone()
    }
}

impl Default for Spacing {
    fn default() -> Self {
        DEFAULT_THEME.spacing.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThemeConfig {
    #[serde(default)]
    pub mode: ThemeMode,
    pub light: ColorTokens,
    pub dark: ColorTokens,
    #[serde(default)]
    pub typography: Typography,
    #[serde(default)]
    pub spacing: Spacing,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub shadows: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_css: Option<String>,
}

impl Default for ThemeConfig {
    fn default() -> Self {
        DEFAULT_THEME.clone()
    }
}

impl ThemeConfig {
    /// Every light token must exist in the dark set and vice versa
    pub fn validate(&self) -> Result<(), ThemeError> {
        // Keys must survive the trip to a style property and back.
        if let Some(key) = self.light.keys().chain(self.dark.keys()).find(|k| !is_token_key(k)) {
            return Err(ThemeError::InvalidTokenKey(key.clone()));
        }

        let light: BTreeSet<&String> = self.light.keys().collect();
        let dark: BTreeSet<&String> = self.dark.keys().collect();
        if light == dark {
            return Ok(());
        }

        let only_light: Vec<&str> = light.difference(&dark).map(|k| k.as_str()).collect();
        let only_dark: Vec<&str> = dark.difference(&light).map(|k| k.as_str()).collect();
        let mut parts = Vec::new();
        if !only_light.is_empty() {
            parts.push(format!("missing in dark: {}", only_light.join(", ")));
        }
        if !only_dark.is_empty() {
            parts.push(format!("missing in light: {}", only_dark.join(", ")));
        }
        Err(ThemeError::AsymmetricTokens(parts.join("; ")))
    }

    pub fn colors(&self, scheme: ColorScheme) -> &ColorTokens {
        match scheme {
            ColorScheme::Light => &self.light,
            ColorScheme::Dark => &self.dark,
        }
    }

    /// Every global style property this theme writes for `scheme`
    pub fn properties(&self, scheme: ColorScheme) -> BTreeMap<String, String> {
        let mut props: BTreeMap<String, String> = self
            .colors(scheme)
            .iter()
            .map(|(key, value)| (css_property_name(key), value.clone()))
            .collect();

        props.insert(FONT_FAMILY.to_string(), self.typography.font_family.clone());
        if let Some(heading) = &self.typography.heading_font_family {
            props.insert(FONT_FAMILY_HEADING.to_string(), heading.clone());
        }
        if let Some(size) = &self.typography.font_size_base {
            props.insert(FONT_SIZE_BASE.to_string(), size.clone());
        }
        props.insert(BORDER_RADIUS.to_string(), self.spacing.border_radius.clone());
        if let Some(unit) = &self.spacing.unit {
            props.insert(SPACING_UNIT.to_string(), unit.clone());
        }
        for (key, value) in &self.shadows {
            props.insert(format!("{}{}", SHADOW_PREFIX, kebab_case(key)), value.clone());
        }
        props
    }
}

/// `primaryHover` → `--color-primary-hover`
pub fn css_property_name(token_key: &str) -> String {
    format!("{}{}", COLOR_PREFIX, kebab_case(token_key))
}

/// `--color-primary-hover` → `primaryHover`
pub fn token_key_from_property(property: &str) -> Option<String> {
    let rest = property.strip_prefix(COLOR_PREFIX)?;
    if rest.is_empty() {
        return None;
    }
    let mut key = String::with_capacity(rest.len());
    let mut upper_next = false;
    for c in rest.chars() {
        if c == '-' {
            upper_next = true;
        } else if upper_next {
            key.push(c.to_ascii_uppercase());
            upper_next = false;
        } else {
            key.push(c);
        }
    }
    Some(key)
}

/// camelCase starting with a lowercase letter, so `css_property_name` is reversible
pub fn is_token_key(key: &str) -> bool {
    key.chars().next().is_some_and(|c| c.is_ascii_lowercase())
        && key.chars().all(|c| c.is_ascii_alphanumeric())
        && token_key_from_property(&css_property_name(key)).as_deref() == Some(key)
}

fn kebab_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for (i, c) in key.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('-');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn tokens(pairs: &[(&str, &str)]) -> ColorTokens {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

/// Compiled-in theme used whenever a tenant supplies none
pub static DEFAULT_THEME: Lazy<ThemeConfig> = Lazy::new(|| ThemeConfig {
    mode: ThemeMode::Light,
    light: tokens(&[
        ("primary", "#2563eb"),
        ("primaryHover", "#1d4ed8"),
        ("secondary", "#7c3aed"),
        ("background", "#ffffff"),
        ("surface", "#f8fafc"),
        ("textPrimary", "#0f172a"),
        ("textSecondary", "#475569"),
        ("border", "#e2e8f0"),
        ("success", "#16a34a"),
        ("warning", "#d97706"),
        ("error", "#dc2626"),
    ]),
    dark: tokens(&[
        ("primary", "#3b82f6"),
        ("primaryHover", "#60a5fa"),
        ("secondary", "#a78bfa"),
        ("background", "#0f172a"),
        ("surface", "#1e293b"),
        ("textPrimary", "#f8fafc"),
        ("textSecondary", "#cbd5e1"),
        ("border", "#334155"),
        ("success", "#22c55e"),
        ("warning", "#f59e0b"),
        ("error", "#ef4444"),
    ]),
    typography: Typography {
        font_family: "Inter, system-ui, sans-serif".to_string(),
        heading_font_family: None,
        font_size_base: Some("16px".to_string()),
    },
    spacing: Spacing {
        border_radius: "8px".to_string(),
        unit: Some("4px".to_string()),
    },
    shadows: BTreeMap::from([
        ("sm".to_string(), "0 1px 2px rgba(0,0,0,0.05)".to_string()),
        ("md".to_string(), "0 4px 6px rgba(0,0,0,0.1)".to_string()),
    ]),
    custom_css: None,
});
