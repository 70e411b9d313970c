use rustc_hash::FxHashMap;

/// Main section of a `META-INF/MANIFEST.MF`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    attributes: FxHashMap<String, String>,
}

impl Manifest {
    /// Parses the main section. Keys are case-insensitive; continuation lines
    /// start with a single space.
    pub fn parse(text: &str) -> Self {
        let mut attributes = FxHashMap::default();
        let mut current: Option<(String, String)> = None;

        for line in text.lines() {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.is_empty() {
                break;
            }
            if let Some(continuation) = line.strip_prefix(' ') {
                if let Some((_, value)) = current.as_mut() {
                    value.push_str(continuation);
                }
                continue;
            }
            if let Some((key, value)) = current.take() {
                attributes.insert(key, value);
            }
            if let Some((key, value)) = line.split_once(':') {
                let value = value.strip_prefix(' ').unwrap_or(value);
                current = Some((key.trim().to_ascii_lowercase(), value.to_string()));
            }
        }
        if let Some((key, value)) = current {
            attributes.insert(key, value);
        }

        Self { attributes }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes
            .get(&key.to_ascii_lowercase())
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    pub fn is_multi_release(&self) -> bool {
        self.get("Multi-Release")
            .map(|value| value.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    pub fn automatic_module_name(&self) -> Option<&str> {
        self.get("Automatic-Module-Name")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_main_section_with_continuations() {
        let manifest = Manifest::parse(
            "Manifest-Version: 1.0\r\nMulti-Release: TRUE\r\nAutomatic-Module-Name: com.example.very\r\n .long.name\r\n\r\nName: ignored\r\nMulti-Release: false\r\n",
        );
        assert!(manifest.is_multi_release());
        assert_eq!(
            manifest.automatic_module_name(),
            Some("com.example.very.long.name")
        );
        assert_eq!(manifest.get("manifest-version"), Some("1.0"));
    }

    #[test]
    fn missing_flags_default_to_off() {
        let manifest = Manifest::parse("Manifest-Version: 1.0\n");
        assert!(!manifest.is_multi_release());
        assert!(manifest.automatic_module_name().is_none());
    }
}
