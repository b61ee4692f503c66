//! Personality tags and their system prompts.
//!
//! A personality is a named system-prompt variant selectable per session. It
//! only changes the leading system turn sent upstream; the relay mechanics
//! are identical for every tag.

use serde::{Deserialize, Serialize};

/// Selectable assistant personality.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Personality {
    #[default]
    Default,
    Analyst,
    Teacher,
    Creative,
    Programmer,
}

impl Personality {
    /// All selectable personalities, in display order.
    pub const ALL: [Personality; 5] = [
        Personality::Default,
        Personality::Analyst,
        Personality::Teacher,
        Personality::Creative,
        Personality::Programmer,
    ];

    /// The system prompt sent as the leading turn of every exchange.
    pub fn system_prompt(&self) -> &'static str {
        match self {
            Personality::Default => {
                "You are a helpful AI assistant. Use the conversation history to provide \
                 contextual responses. Use Markdown formatting for better readability."
            }
            Personality::Analyst => {
                "You are a data analyst. Focus on providing insights, statistics, and \
                 data-driven answers."
            }
            Personality::Teacher => {
                "You are a teacher. Explain concepts clearly and provide educational responses."
            }
            Personality::Creative => {
                "You are a creative writer. Provide imaginative and artistic responses."
            }
            Personality::Programmer => {
                "You are a programmer. Provide code examples and technical explanations."
            }
        }
    }

    /// Human-readable name for UI listings.
    pub fn display_name(&self) -> &'static str {
        match self {
            Personality::Default => "Default Assistant",
            Personality::Analyst => "Data Analyst",
            Personality::Teacher => "Teacher",
            Personality::Creative => "Creative Writer",
            Personality::Programmer => "Programmer",
        }
    }

    /// Short description for UI listings.
    pub fn description(&self) -> &'static str {
        match self {
            Personality::Default => "Versatile AI assistant for general tasks and queries",
            Personality::Analyst => "Specialized in data analysis and visualization",
            Personality::Teacher => "Educational support and learning assistance",
            Personality::Creative => "Creative writing and content creation specialist",
            Personality::Programmer => "Technical implementation and coding support",
        }
    }
}

impl std::fmt::Display for Personality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Personality::Default => write!(f, "default"),
            Personality::Analyst => write!(f, "analyst"),
            Personality::Teacher => write!(f, "teacher"),
            Personality::Creative => write!(f, "creative"),
            Personality::Programmer => write!(f, "programmer"),
        }
    }
}

impl std::str::FromStr for Personality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "default" => Ok(Personality::Default),
            "analyst" => Ok(Personality::Analyst),
            "teacher" => Ok(Personality::Teacher),
            "creative" => Ok(Personality::Creative),
            "programmer" => Ok(Personality::Programmer),
            _ => Err(format!("unknown personality: {}", s)),
        }
    }
}

// Implement conversion from String for SQLx
impl TryFrom<String> for Personality {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        for personality in Personality::ALL {
            let text = personality.to_string();
            let parsed: Personality = text.parse().unwrap();
            assert_eq!(parsed, personality);
        }
    }

    #[test]
    fn test_unknown_tag_rejected() {
        assert!("pirate".parse::<Personality>().is_err());
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&Personality::Programmer).unwrap();
        assert_eq!(json, "\"programmer\"");

        let parsed: Personality = serde_json::from_str("\"analyst\"").unwrap();
        assert_eq!(parsed, Personality::Analyst);
    }

    #[test]
    fn test_every_tag_has_a_prompt() {
        for personality in Personality::ALL {
            assert!(!personality.system_prompt().is_empty());
        }
    }
}
