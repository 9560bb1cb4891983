use std::{collections::HashMap, fs};

#[derive(Debug)]
pub struct Settings {
    pub base_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8090".into(),
        }
    }
}

/// Resolution order: built-in default, then `catalog.toml`, then
/// `CATALOG_BASE_URL`, then the command-line flag.
pub fn load_settings(flag_base_url: Option<String>) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string("catalog.toml") {
        if let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(&raw) {
            if let Some(v) = file_cfg.get("base_url") {
                settings.base_url = v.clone();
            }
        }
    }

    if let Ok(v) = std::env::var("CATALOG_BASE_URL") {
        settings.base_url = v;
    }

    if let Some(v) = flag_base_url {
        settings.base_url = v;
    }

    settings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_the_local_store() {
        assert_eq!(load_settings(None).base_url, "http://127.0.0.1:8090");
    }

    #[test]
    fn flag_overrides_everything() {
        assert_eq!(
            load_settings(Some("http://flag.example".into())).base_url,
            "http://flag.example"
        );
    }
}
