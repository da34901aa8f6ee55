use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Text stored per language code with an explicit fallback chain.
///
/// Lookup order: requested language, then the content's primary language,
/// then `"en"`, then the first stored value. Returns `None` only when no
/// translation is stored at all.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalizedText(BTreeMap<String, String>);

impl LocalizedText {
    /// Creates an empty localized text.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the text for one language code, replacing any previous value.
    pub fn insert(&mut self, language: impl Into<String>, text: impl Into<String>) {
        self.0.insert(language.into(), text.into());
    }

    /// Returns whether no translation is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Resolves text through the fallback chain.
    #[must_use]
    pub fn resolve(&self, requested: &str, primary: &str) -> Option<&str> {
        [requested, primary, "en"]
            .iter()
            .find_map(|language| self.0.get(*language))
            .or_else(|| self.0.values().next())
            .map(String::as_str)
    }
}

impl FromIterator<(String, String)> for LocalizedText {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
