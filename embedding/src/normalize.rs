use std::collections::HashSet;

/// Widget-toolkit noise words stripped from resource ids.
const RESOURCE_NOISE_TOKENS: [&str; 10] = [
    "iv", "btn", "tv", "img", "image", "button", "text", "view", "layout", "id",
];

/// Rewrites resource ids and activity class names into the word-level
/// form fed to the text encoder.
///
/// `com.app:id/play_button` and `PlayBtn` both normalize to `play`, so
/// the encoder compares semantics rather than toolkit naming habits.
#[derive(Debug, Clone, Default)]
pub struct AttributeNormalizer {
    brand_prefixes: HashSet<String>,
}

impl AttributeNormalizer {
    /// Creates a normalizer with the built-in noise-token list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds package-local brand prefixes that carry no meaning
    /// (e.g. an app-wide `acme` widget prefix).
    #[must_use]
    pub fn with_brand_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.brand_prefixes
            .extend(prefixes.into_iter().map(|p| p.into().to_lowercase()));
        self
    }

    /// Normalizes an Android resource id.
    ///
    /// Takes the substring after the last `/` (or after the last `:`
    /// when no slash is present), splits on `_` and camel-case
    /// boundaries, drops noise tokens and brand prefixes, and rejoins
    /// with single spaces in lowercase.
    #[must_use]
    pub fn resource_id(&self, resource_id: &str) -> String {
        let local = resource_id
            .rsplit_once('/')
            .map_or_else(
                || resource_id.rsplit_once(':').map_or(resource_id, |(_, tail)| tail),
                |(_, tail)| tail,
            );
        let words: Vec<String> = local
            .split('_')
            .flat_map(split_camel_case)
            .map(|word| word.to_lowercase())
            .filter(|word| !word.is_empty())
            .filter(|word| !RESOURCE_NOISE_TOKENS.contains(&word.as_str()))
            .filter(|word| !self.brand_prefixes.contains(word))
            .collect();
        words.join(" ")
    }

    /// Normalizes a fully qualified activity class name.
    ///
    /// Takes the class name after the last `.`, splits camel-case
    /// boundaries, and drops a trailing `Activity` token.
    #[must_use]
    pub fn activity(&self, activity: &str) -> String {
        let class_name = activity.rsplit_once('.').map_or(activity, |(_, tail)| tail);
        let mut words = split_camel_case(class_name);
        if words.last().is_some_and(|last| last == "Activity") {
            words.pop();
        }
        words
            .iter()
            .map(|word| word.to_lowercase())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Splits `PlayButton2` into `["Play", "Button2"]`.
fn split_camel_case(word: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    for c in word.chars() {
        if c.is_uppercase() && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        current.push(c);
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}
