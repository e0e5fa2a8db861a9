//! Competitor identity.
//!
//! A competitor is a model name plus a per-instance id. The same template can
//! be fielded several times at once (notably in a self-pair), and each
//! instance is scored on its own, so identity is the `unique_id`, never the
//! name.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One participant instance in the tournament.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Competitor {
    /// Full model name used for provider dispatch (e.g. `openai/gpt-4o`).
    pub name: String,
    /// Human-facing name: the text after the last `/`.
    pub display_name: String,
    /// `<name>_<8 hex>`; distinguishes simultaneous instances of one template.
    pub unique_id: String,
}

impl Competitor {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let display_name = name.rsplit('/').next().unwrap_or(&name).to_string();
        let suffix = Uuid::new_v4().simple().to_string();
        let unique_id = format!("{}_{}", name, &suffix[..8]);
        Self {
            name,
            display_name,
            unique_id,
        }
    }

    /// Fresh instance of the same template with a new `unique_id`.
    pub fn new_instance(&self) -> Self {
        Self::new(self.name.clone())
    }

    /// Vendor prefix before the first `/`, if any (`openai` for `openai/gpt-4o`).
    pub fn vendor(&self) -> Option<&str> {
        self.name.split_once('/').map(|(vendor, _)| vendor)
    }
}

impl std::fmt::Display for Competitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.display_name, self.unique_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_is_last_path_segment() {
        let c = Competitor::new("meta-llama/llama-3.1-8b-instruct");
        assert_eq!(c.display_name, "llama-3.1-8b-instruct");
        assert_eq!(c.vendor(), Some("meta-llama"));

        let bare = Competitor::new("local-model");
        assert_eq!(bare.display_name, "local-model");
        assert_eq!(bare.vendor(), None);
    }

    #[test]
    fn instances_share_name_but_not_id() {
        let template = Competitor::new("openai/gpt-4o");
        let a = template.new_instance();
        let b = template.new_instance();
        assert_eq!(a.name, b.name);
        assert_ne!(a.unique_id, b.unique_id);
        assert_ne!(a.unique_id, template.unique_id);
        assert!(a.unique_id.starts_with("openai/gpt-4o_"));
        assert_eq!(a.unique_id.len(), "openai/gpt-4o_".len() + 8);
    }
}
