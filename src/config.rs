use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context as _;

pub const BREAKPOINT_ENV: &str = "COURSEMAP_BREAKPOINT_PX";
pub const SEARCH_DEBOUNCE_ENV: &str = "COURSEMAP_SEARCH_DEBOUNCE_MS";
pub const DATA_DIR_ENV: &str = "COURSEMAP_DATA_DIR";

pub const DEFAULT_BREAKPOINT_PX: u32 = 768;
pub const DEFAULT_DATA_DIR: &str = ".coursemap";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Split view collapses to content-only below this width.
    pub breakpoint_px: u32,
    pub search_debounce: Duration,
    /// Where bookmarks and the visited flag are kept.
    pub data_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            breakpoint_px: DEFAULT_BREAKPOINT_PX,
            search_debounce: crate::search::DEFAULT_DEBOUNCE,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
        }
    }
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Unset or blank variables keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut settings = Self::default();
        let get = |key: &str| lookup(key).filter(|raw| !raw.trim().is_empty());

        if let Some(raw) = get(BREAKPOINT_ENV) {
            settings.breakpoint_px = parse_breakpoint(&raw).with_context(|| {
                format!("invalid {BREAKPOINT_ENV}={raw:?}. expected a width in pixels, e.g. 768")
            })?;
        }
        if let Some(raw) = get(SEARCH_DEBOUNCE_ENV) {
            settings.search_debounce = parse_debounce(&raw).with_context(|| {
                format!("invalid {SEARCH_DEBOUNCE_ENV}={raw:?}. expected milliseconds, e.g. 300")
            })?;
        }
        if let Some(raw) = get(DATA_DIR_ENV) {
            settings.data_dir = PathBuf::from(raw.trim());
        }
        Ok(settings)
    }
}

pub fn parse_breakpoint(raw: &str) -> anyhow::Result<u32> {
    let px = raw
        .trim()
        .trim_end_matches("px")
        .parse::<u32>()
        .context("parse pixel width")?;
    if px == 0 {
        anyhow::bail!("breakpoint must be positive");
    }
    Ok(px)
}

pub fn parse_debounce(raw: &str) -> anyhow::Result<Duration> {
    let ms = raw
        .trim()
        .trim_end_matches("ms")
        .parse::<u64>()
        .context("parse milliseconds")?;
    Ok(Duration::from_millis(ms))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect::<HashMap<_, _>>();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() -> anyhow::Result<()> {
        assert_eq!(Settings::from_lookup(lookup(&[]))?, Settings::default());
        let blank = Settings::from_lookup(lookup(&[(BREAKPOINT_ENV, "  ")]))?;
        assert_eq!(blank.breakpoint_px, DEFAULT_BREAKPOINT_PX);
        Ok(())
    }

    #[test]
    fn overrides_apply() -> anyhow::Result<()> {
        let settings = Settings::from_lookup(lookup(&[
            (BREAKPOINT_ENV, "1024px"),
            (SEARCH_DEBOUNCE_ENV, "150"),
            (DATA_DIR_ENV, "/tmp/coursemap"),
        ]))?;
        assert_eq!(settings.breakpoint_px, 1024);
        assert_eq!(settings.search_debounce, Duration::from_millis(150));
        assert_eq!(settings.data_dir, PathBuf::from("/tmp/coursemap"));
        Ok(())
    }

    #[test]
    fn invalid_values_name_the_variable() {
        let err = Settings::from_lookup(lookup(&[(BREAKPOINT_ENV, "wide")]))
            .expect_err("non-numeric breakpoint");
        assert!(format!("{err:#}").contains(BREAKPOINT_ENV));

        assert!(parse_breakpoint("0").is_err());
        assert!(parse_debounce("-5").is_err());
    }
}
