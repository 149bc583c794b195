use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Minimum length of a project title after trimming
pub const MIN_PROJECT_TITLE_LEN: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub sections: Vec<Section>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Layout blob owned by the mind map view, passed through untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mind_map_settings: Option<serde_json::Value>,
}

impl Project {
    pub fn new(title: String, description: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            title,
            description,
            sections: Vec::new(),
            created_at: now,
            updated_at: now,
            mind_map_settings: None,
        }
    }

    /// Stamp `updated_at`. Successive stamps are strictly increasing even
    /// when the wall clock has not moved (or moved backwards).
    pub fn touch(&mut self) {
        let now = Utc::now();
        self.updated_at = if now > self.updated_at {
            now
        } else {
            self.updated_at + Duration::milliseconds(1)
        };
    }

    pub fn section(&self, section_id: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.id == section_id)
    }

    pub fn section_mut(&mut self, section_id: &str) -> Option<&mut Section> {
        self.sections.iter_mut().find(|s| s.id == section_id)
    }

    /// Sections sharing `parent_id`, sorted by `order`
    pub fn sorted_children(&self, parent_id: Option<&str>) -> Vec<&Section> {
        let mut children: Vec<&Section> = self
            .sections
            .iter()
            .filter(|s| s.parent_id.as_deref() == parent_id)
            .collect();
        children.sort_by_key(|s| s.order);
        children
    }

    /// Next free `order` value among the children of `parent_id`
    pub fn next_order(&self, parent_id: Option<&str>) -> i64 {
        self.sections
            .iter()
            .filter(|s| s.parent_id.as_deref() == parent_id)
            .map(|s| s.order)
            .max()
            .map_or(0, |max| max + 1)
    }

    /// True if a sibling under `parent_id` (other than `except`) already
    /// uses `title` once names are normalized.
    pub fn has_sibling_named(
        &self,
        parent_id: Option<&str>,
        title: &str,
        except: Option<&str>,
    ) -> bool {
        let wanted = normalize_name(title);
        self.sections.iter().any(|s| {
            s.parent_id.as_deref() == parent_id
                && Some(s.id.as_str()) != except
                && normalize_name(&s.title) == wanted
        })
    }

    /// All transitive descendants of `section_id` (not including itself)
    pub fn descendants_of(&self, section_id: &str) -> HashSet<String> {
        let mut found: HashSet<String> = HashSet::new();
        let mut frontier = vec![section_id.to_string()];

        while let Some(current) = frontier.pop() {
            for child in self
                .sections
                .iter()
                .filter(|s| s.parent_id.as_deref() == Some(current.as_str()))
            {
                // A malformed cycle must not loop forever
                if child.id != section_id && found.insert(child.id.clone()) {
                    frontier.push(child.id.clone());
                }
            }
        }

        found
    }

    /// Would re-parenting `section_id` under `new_parent` create a cycle?
    pub fn would_cycle(&self, section_id: &str, new_parent: Option<&str>) -> bool {
        match new_parent {
            None => false,
            Some(parent) if parent == section_id => true,
            Some(parent) => self.descendants_of(section_id).contains(parent),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub order: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(rename = "created_at")]
    pub created_at: DateTime<Utc>,
}

impl Section {
    pub fn new(title: String, content: String, parent_id: Option<String>, order: i64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title,
            content,
            parent_id,
            order,
            color: None,
            created_at: Utc::now(),
        }
    }
}

/// Field-level update for a section. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
    /// `Some(None)` clears the color
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Option<String>>,
}

impl SectionPatch {
    /// Build a patch from the historical `(title, content, colorOrOrder)`
    /// call shape. The third argument is classified by its JSON shape.
    pub fn from_legacy(title: String, content: String, slot: Option<&serde_json::Value>) -> Self {
        let mut patch = SectionPatch {
            title: Some(title),
            content: Some(content),
            ..Default::default()
        };

        match slot.and_then(LegacySlot::detect) {
            Some(LegacySlot::Order(order)) => patch.order = Some(order),
            Some(LegacySlot::Color(color)) => patch.color = Some(Some(color)),
            None => {}
        }

        patch
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none() && self.order.is_none() && self.color.is_none()
    }
}

/// Value found in the legacy "order" argument slot
#[derive(Debug, Clone, PartialEq)]
pub enum LegacySlot {
    Order(i64),
    Color(String),
}

impl LegacySlot {
    /// Numbers are orders, strings are colors, anything else is ignored.
    pub fn detect(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .map(LegacySlot::Order),
            serde_json::Value::String(s) if !s.trim().is_empty() => {
                Some(LegacySlot::Color(s.trim().to_string()))
            }
            _ => None,
        }
    }

    /// Classify a raw command-line value
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        match raw.parse::<i64>() {
            Ok(order) => Some(LegacySlot::Order(order)),
            Err(_) => Some(LegacySlot::Color(raw.to_string())),
        }
    }
}

/// Case- and whitespace-insensitive form of a section name
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn project_with_tree() -> Project {
        let mut project = Project::new("Dungeon Crawler".to_string(), String::new());
        let mut s = Section::new("S".to_string(), String::new(), None, 0);
        s.id = "s".to_string();
        let mut s1 = Section::new("S1".to_string(), String::new(), Some("s".to_string()), 0);
        s1.id = "s1".to_string();
        let mut s2 = Section::new("S2".to_string(), String::new(), Some("s1".to_string()), 0);
        s2.id = "s2".to_string();
        let mut other = Section::new("Other".to_string(), String::new(), None, 1);
        other.id = "other".to_string();
        project.sections = vec![s, s1, s2, other];
        project
    }

    #[test]
    fn test_descendants_are_transitive() {
        let project = project_with_tree();
        let found = project.descendants_of("s");
        assert_eq!(found.len(), 2);
        assert!(found.contains("s1"));
        assert!(found.contains("s2"));
        assert!(project.descendants_of("other").is_empty());
    }

    #[test]
    fn test_would_cycle() {
        let project = project_with_tree();
        assert!(project.would_cycle("s", Some("s2")));
        assert!(project.would_cycle("s", Some("s")));
        assert!(!project.would_cycle("s2", Some("other")));
        assert!(!project.would_cycle("s", None));
    }

    #[test]
    fn test_touch_is_strictly_increasing() {
        let mut project = Project::new("Racing".to_string(), String::new());
        let future = Utc::now() + Duration::hours(1);
        project.updated_at = future;
        project.touch();
        assert!(project.updated_at > future);
    }

    #[test]
    fn test_sibling_names_ignore_case_and_spacing() {
        let project = project_with_tree();
        assert!(project.has_sibling_named(None, "  other ", None));
        assert!(project.has_sibling_named(Some("s"), "s1", None));
        assert!(!project.has_sibling_named(Some("s"), "s1", Some("s1")));
        assert!(!project.has_sibling_named(None, "s1", None));
        assert_eq!(normalize_name("  Level   Design "), "level design");
    }

    #[test]
    fn test_legacy_slot_detection() {
        assert_eq!(LegacySlot::detect(&json!(3)), Some(LegacySlot::Order(3)));
        assert_eq!(
            LegacySlot::detect(&json!("#ff8800")),
            Some(LegacySlot::Color("#ff8800".to_string()))
        );
        assert_eq!(LegacySlot::detect(&json!(null)), None);
        assert_eq!(LegacySlot::parse("7"), Some(LegacySlot::Order(7)));
        assert_eq!(LegacySlot::parse("#abc"), Some(LegacySlot::Color("#abc".to_string())));
    }

    #[test]
    fn test_legacy_patch_with_color_keeps_order() {
        let patch = SectionPatch::from_legacy("T".to_string(), "C".to_string(), Some(&json!("#00ff00")));
        assert_eq!(patch.order, None);
        assert_eq!(patch.color, Some(Some("#00ff00".to_string())));
    }

    #[test]
    fn test_section_serializes_created_at_verbatim() {
        let section = Section::new("Intro".to_string(), String::new(), Some("p".to_string()), 2);
        let value = serde_json::to_value(&section).unwrap();
        assert!(value.get("created_at").is_some());
        assert_eq!(value["parentId"], json!("p"));

        let project = Project::new("Intro".to_string(), String::new());
        let value = serde_json::to_value(&project).unwrap();
        assert!(value.get("updatedAt").is_some());
        assert!(value.get("mindMapSettings").is_none());
    }
}
