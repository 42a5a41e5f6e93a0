//! Sport classification for activity rows.
//!
//! Classification runs in two stages. The icon class attached to a row is
//! checked against an ordered rule list first; if nothing matches, the row's
//! HTML is searched for whole-word synonyms and the category whose synonym
//! occurs earliest wins. Both tables live in [`ClassifierConfig`] so callers can
//! extend the taxonomy without touching the matching code.

use regex::Regex;
use serde::{Serialize, Serializer};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Category {
    Running,
    Cycling,
    Swimming,
    Skiing,
    Hiking,
    Gym,
    Football,
    Basketball,
    Tennis,
    Rowing,
    Yoga,
    Golf,
    Climbing,
    Skateboarding,
    Baseball,
    Volleyball,
    SportsMode,
    Unknown,
}

impl Category {
    pub fn emoji(self) -> &'static str {
        match self {
            Category::Running => "🏃",
            Category::Cycling => "🚴",
            Category::Swimming => "🏊",
            Category::Skiing => "⛷️",
            Category::Hiking => "🥾",
            Category::Gym => "💪",
            Category::Football => "⚽",
            Category::Basketball => "🏀",
            Category::Tennis => "🎾",
            Category::Rowing => "🚣",
            Category::Yoga => "🧘",
            Category::Golf => "⛳",
            Category::Climbing => "🧗",
            Category::Skateboarding => "🛹",
            Category::Baseball => "⚾",
            Category::Volleyball => "🏐",
            Category::SportsMode => "🤸",
            Category::Unknown => "❓",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.emoji())
    }
}

impl Serialize for Category {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.emoji())
    }
}

/// How a stage-one rule inspects the lower-cased icon class.
#[derive(Clone, Debug)]
pub enum IconMatcher {
    Pattern(Regex),
    /// Any of the substrings.
    Contains(Vec<String>),
}

impl IconMatcher {
    fn pattern(re: &str) -> Self {
        IconMatcher::Pattern(Regex::new(re).expect("built-in icon pattern is valid"))
    }

    fn contains(needles: &[&str]) -> Self {
        IconMatcher::Contains(needles.iter().map(|s| s.to_string()).collect())
    }

    fn matches(&self, icon: &str) -> bool {
        match self {
            IconMatcher::Pattern(re) => re.is_match(icon),
            IconMatcher::Contains(needles) => needles.iter().any(|n| icon.contains(n.as_str())),
        }
    }
}

#[derive(Clone, Debug)]
struct KeywordRule {
    category: Category,
    pattern: Regex,
}

/// Immutable lookup tables driving [`Classifier`].
#[derive(Clone, Debug)]
pub struct ClassifierConfig {
    icon_rules: Vec<(Category, IconMatcher)>,
    keyword_rules: Vec<KeywordRule>,
}

impl ClassifierConfig {
    pub fn new(icon_rules: Vec<(Category, IconMatcher)>) -> Self {
        Self {
            icon_rules,
            keyword_rules: Vec::new(),
        }
    }

    /// Append a category to the keyword table. Table order breaks offset ties.
    pub fn with_keywords(mut self, category: Category, synonyms: &[&str]) -> Self {
        if synonyms.is_empty() {
            return self;
        }
        let alternation = synonyms
            .iter()
            .map(|s| regex::escape(&s.to_lowercase()))
            .collect::<Vec<_>>()
            .join("|");
        let pattern = Regex::new(&format!(r"\b(?:{alternation})\b"))
            .expect("escaped synonyms always form a valid pattern");
        self.keyword_rules.push(KeywordRule { category, pattern });
        self
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        ClassifierConfig::new(vec![
            (Category::Running, IconMatcher::pattern(r"icon.{0,3}running")),
            (Category::Cycling, IconMatcher::pattern(r"regular.biking")),
            (Category::SportsMode, IconMatcher::pattern(r"sports-mode")),
            (Category::Swimming, IconMatcher::contains(&["swimming", "swim"])),
            (Category::Hiking, IconMatcher::contains(&["hiking", "walk"])),
            (Category::Skiing, IconMatcher::contains(&["ski"])),
            (Category::Gym, IconMatcher::contains(&["gym", "strength"])),
        ])
        .with_keywords(
            Category::Running,
            &["running", "run", "jog", "jogging", "marathon", "5k", "10k", "half marathon"],
        )
        .with_keywords(
            Category::Cycling,
            &["cycling", "cycle", "bike", "biking", "bicycle", "mtb", "road bike", "mountain bike"],
        )
        .with_keywords(
            Category::Swimming,
            &["swimming", "swim", "pool", "freestyle", "backstroke", "breaststroke", "butterfly"],
        )
        .with_keywords(
            Category::Skiing,
            &["skiing", "ski", "alpine", "downhill", "cross country", "nordic", "snowboard", "snowboarding"],
        )
        .with_keywords(
            Category::Hiking,
            &["hiking", "hike", "walk", "walking", "trekking", "trail", "nature walk"],
        )
        .with_keywords(
            Category::Gym,
            &["gym", "strength", "weight", "lifting", "bodybuilding", "fitness", "workout", "training", "crossfit"],
        )
        .with_keywords(
            Category::Football,
            &["football", "soccer", "futbol", "match", "league", "pitch"],
        )
        .with_keywords(
            Category::Basketball,
            &["basketball", "basket", "court", "dribble", "shoot", "dunk"],
        )
        .with_keywords(
            Category::Tennis,
            &["tennis", "court", "racket", "serve", "match", "set"],
        )
        .with_keywords(
            Category::Rowing,
            &["rowing", "row", "kayak", "canoe", "paddle", "boat", "crew"],
        )
        .with_keywords(Category::Yoga, &["yoga"])
        .with_keywords(Category::Golf, &["golf"])
        .with_keywords(Category::Climbing, &["climbing", "boulder"])
        .with_keywords(Category::Skateboarding, &["skateboard", "skate"])
        .with_keywords(Category::Baseball, &["baseball"])
        .with_keywords(Category::Volleyball, &["volleyball"])
    }
}

#[derive(Clone, Debug, Default)]
pub struct Classifier {
    config: ClassifierConfig,
}

impl Classifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    /// Resolve a category from the icon class, then from the row HTML.
    pub fn classify(&self, icon: &str, row_html: &str) -> Category {
        let icon = icon.to_lowercase();
        if let Some((category, _)) = self
            .config
            .icon_rules
            .iter()
            .find(|(_, matcher)| matcher.matches(&icon))
        {
            return *category;
        }
        if row_html.is_empty() {
            return Category::Unknown;
        }
        self.classify_text(row_html)
    }

    fn classify_text(&self, html: &str) -> Category {
        let content = html.to_lowercase();
        let mut best: Option<(usize, Category)> = None;
        for rule in &self.config.keyword_rules {
            if let Some(m) = rule.pattern.find(&content) {
                // strict comparison keeps the earlier table entry on ties
                if best.is_none_or(|(offset, _)| m.start() < offset) {
                    best = Some((m.start(), rule.category));
                }
            }
        }
        best.map_or(Category::Unknown, |(_, category)| category)
    }
}
