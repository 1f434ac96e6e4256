use pressline_import::similarity;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A reason text that marks an adjustment as internal movement rather than
/// a real gain or loss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementRule {
    pub name: String,
    #[serde(default)]
    pub priority: i32,
    pub pattern: String,
    #[serde(default)]
    pub match_type: MatchType,
}

impl MovementRule {
    pub fn contains(pattern: &str, priority: i32) -> Self {
        Self {
            name: pattern.to_string(),
            priority,
            pattern: pattern.to_string(),
            match_type: MatchType::Contains,
        }
    }
}

/// Written in configuration as `"contains"`, `"exact"`, `"regex"` or
/// `"fuzzy:0.85"`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MatchType {
    #[default]
    Contains,
    Exact,
    Regex,
    Fuzzy {
        threshold: f32,
    },
}

impl std::str::FromStr for MatchType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "contains" => Ok(MatchType::Contains),
            "exact" => Ok(MatchType::Exact),
            "regex" => Ok(MatchType::Regex),
            s if s.starts_with("fuzzy:") => {
                let threshold = s[6..]
                    .parse::<f32>()
                    .map_err(|_| "Invalid fuzzy threshold".to_string())?;
                if !(0.0..=1.0).contains(&threshold) {
                    return Err(format!("Fuzzy threshold out of range: {threshold}"));
                }
                Ok(MatchType::Fuzzy { threshold })
            }
            other => Err(format!("Unknown match type: '{other}'")),
        }
    }
}

impl TryFrom<String> for MatchType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MatchType> for String {
    fn from(value: MatchType) -> Self {
        value.to_string()
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchType::Contains => write!(f, "contains"),
            MatchType::Exact => write!(f, "exact"),
            MatchType::Regex => write!(f, "regex"),
            MatchType::Fuzzy { threshold } => write!(f, "fuzzy:{threshold}"),
        }
    }
}

pub fn default_movement_rules() -> Vec<MovementRule> {
    vec![
        MovementRule::contains("container audit", 10),
        MovementRule::contains("moved to next operation", 10),
        MovementRule::contains("operation transfer", 10),
        MovementRule::contains("transfer", 1),
    ]
}

struct CompiledRule {
    rule: MovementRule,
    compiled_regex: Option<regex::Regex>,
}

/// Priority-ordered matcher over adjustment reasons.
pub struct MovementVocabulary {
    rules: Vec<CompiledRule>,
}

impl Default for MovementVocabulary {
    fn default() -> Self {
        Self::new(default_movement_rules())
    }
}

impl MovementVocabulary {
    pub fn new(rules: Vec<MovementRule>) -> Self {
        let mut compiled: Vec<CompiledRule> = rules
            .into_iter()
            .map(|rule| {
                let compiled_regex = if let MatchType::Regex = &rule.match_type {
                    regex::RegexBuilder::new(&rule.pattern)
                        .case_insensitive(true)
                        .build()
                        .ok()
                } else {
                    None
                };
                CompiledRule { rule, compiled_regex }
            })
            .collect();
        compiled.sort_by(|a, b| b.rule.priority.cmp(&a.rule.priority));
        Self { rules: compiled }
    }

    /// The highest-priority rule matching `reason`. A missing reason never matches.
    pub fn find_matching_rule(&self, reason: Option<&str>) -> Option<&MovementRule> {
        let reason = reason?.trim();
        if reason.is_empty() {
            return None;
        }
        self.rules
            .iter()
            .find(|cr| rule_matches(cr, reason))
            .map(|cr| &cr.rule)
    }

    pub fn is_movement(&self, reason: Option<&str>) -> bool {
        self.find_matching_rule(reason).is_some()
    }
}

fn rule_matches(cr: &CompiledRule, reason: &str) -> bool {
    let text = reason.to_lowercase();
    let pattern = cr.rule.pattern.to_lowercase();

    match &cr.rule.match_type {
        MatchType::Contains => text.contains(&pattern),
        MatchType::Exact => text == pattern,
        MatchType::Regex => cr
            .compiled_regex
            .as_ref()
            .is_some_and(|re| re.is_match(reason)),
        MatchType::Fuzzy { threshold } => similarity(&text, &pattern) >= *threshold,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(pattern: &str, match_type: MatchType, priority: i32) -> MovementRule {
        MovementRule {
            name: format!("rule {priority}"),
            priority,
            pattern: pattern.to_string(),
            match_type,
        }
    }

    #[test]
    fn default_vocabulary_matches_plant_phrases() {
        let vocab = MovementVocabulary::default();
        assert!(vocab.is_movement(Some("Container Audit")));
        assert!(vocab.is_movement(Some("MOVED TO NEXT OPERATION")));
        assert!(vocab.is_movement(Some("Dept transfer")));
        assert!(!vocab.is_movement(Some("12 - Die damage")));
        assert!(!vocab.is_movement(None));
        assert!(!vocab.is_movement(Some("   ")));
    }

    #[test]
    fn exact_match() {
        let vocab = MovementVocabulary::new(vec![rule("audit", MatchType::Exact, 1)]);
        assert!(vocab.is_movement(Some("AUDIT")));
        assert!(!vocab.is_movement(Some("container audit")));
    }

    #[test]
    fn regex_match_case_insensitive() {
        let vocab = MovementVocabulary::new(vec![rule(r"^(op|oper)\s*\d+\s*->", MatchType::Regex, 1)]);
        assert!(vocab.is_movement(Some("OP 20 -> OP 30")));
        assert!(!vocab.is_movement(Some("scrap at op 20")));
    }

    #[test]
    fn fuzzy_match_tolerates_typos() {
        let vocab = MovementVocabulary::new(vec![rule(
            "container audit",
            MatchType::Fuzzy { threshold: 0.85 },
            1,
        )]);
        assert!(vocab.is_movement(Some("Contianer Audit")));
        assert!(!vocab.is_movement(Some("Customer return")));
    }

    #[test]
    fn priority_ordering_highest_wins() {
        let vocab = MovementVocabulary::new(vec![
            rule("transfer", MatchType::Contains, 1),
            rule("operation transfer", MatchType::Contains, 10),
        ]);
        let hit = vocab.find_matching_rule(Some("Operation Transfer")).unwrap();
        assert_eq!(hit.priority, 10);
    }

    #[test]
    fn match_type_string_forms() {
        assert_eq!("fuzzy:0.8".parse::<MatchType>().unwrap(), MatchType::Fuzzy { threshold: 0.8 });
        assert_eq!("Contains".parse::<MatchType>().unwrap(), MatchType::Contains);
        assert!("fuzzy:1.5".parse::<MatchType>().is_err());
        assert!("sounds-like".parse::<MatchType>().is_err());
        assert_eq!(MatchType::Fuzzy { threshold: 0.8 }.to_string(), "fuzzy:0.8");
    }

    #[test]
    fn rules_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            rules: Vec<MovementRule>,
        }
        let w: Wrapper = toml::from_str(
            r#"
[[rules]]
name = "audit"
pattern = "container audit"

[[rules]]
name = "typo-tolerant"
priority = 5
pattern = "moved to next op"
match_type = "fuzzy:0.8"
"#,
        )
        .unwrap();
        assert_eq!(w.rules[0].match_type, MatchType::Contains);
        assert_eq!(w.rules[1].match_type, MatchType::Fuzzy { threshold: 0.8 });
    }
}
