//! Built-in conversation topic catalog.
//!
//! Five topics per tier. Learners work through the easy set first, then the
//! medium set, then the hard set.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::leveling::Tier;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    pub name: String,
    pub description: String,
    pub tier: Tier,
}

fn topic(name: &str, description: &str, tier: Tier) -> Topic {
    Topic {
        name: name.into(),
        description: description.into(),
        tier,
    }
}

pub fn topic_catalog() -> Vec<Topic> {
    vec![
        topic(
            "favorite food",
            "Talking about favorite foods, cooking, and dining experiences",
            Tier::Easy,
        ),
        topic(
            "weather and seasons",
            "Conversations about weather, climate, and seasonal activities",
            Tier::Easy,
        ),
        topic(
            "hobbies and interests",
            "Discussing personal hobbies, interests, and leisure activities",
            Tier::Easy,
        ),
        topic(
            "family and friends",
            "Talking about family relationships and friendships",
            Tier::Easy,
        ),
        topic(
            "daily routine",
            "Discussing daily activities, schedules, and routines",
            Tier::Easy,
        ),
        topic(
            "travel experiences",
            "Sharing travel stories, destinations, and cultural experiences",
            Tier::Medium,
        ),
        topic(
            "work and career",
            "Discussing jobs, careers, and professional experiences",
            Tier::Medium,
        ),
        topic(
            "movies and entertainment",
            "Conversations about movies, TV shows, and entertainment",
            Tier::Medium,
        ),
        topic(
            "technology and gadgets",
            "Talking about technology, smartphones, and digital life",
            Tier::Medium,
        ),
        topic(
            "shopping and fashion",
            "Discussing shopping experiences, fashion, and personal style",
            Tier::Medium,
        ),
        topic(
            "Independence Day holiday",
            "Discussing Independence Day celebrations, traditions, and experiences",
            Tier::Hard,
        ),
        topic(
            "education and learning",
            "Conversations about school, learning, and personal development",
            Tier::Hard,
        ),
        topic(
            "sports and fitness",
            "Discussing sports, exercise, and healthy lifestyle",
            Tier::Hard,
        ),
        topic(
            "environment and nature",
            "Talking about environmental issues, nature, and sustainability",
            Tier::Hard,
        ),
        topic(
            "business and economics",
            "Discussing business concepts, economics, and market trends",
            Tier::Hard,
        ),
    ]
}

/// Catalog entries whose tier is in `available`.
pub fn topics_for_tiers(catalog: &[Topic], available: &BTreeSet<Tier>) -> Vec<Topic> {
    catalog
        .iter()
        .filter(|t| available.contains(&t.tier))
        .cloned()
        .collect()
}

/// Case-insensitive lookup by name.
pub fn find_topic<'a>(catalog: &'a [Topic], name: &str) -> Option<&'a Topic> {
    let wanted = name.trim();
    catalog.iter().find(|t| t.name.eq_ignore_ascii_case(wanted))
}

/// First topic of `tier` not in `recent` (case-insensitive). When every
/// topic of the tier was practised recently the first one is returned.
pub fn recommend_topic<'a>(catalog: &'a [Topic], tier: Tier, recent: &[String]) -> Option<&'a Topic> {
    let mut in_tier = catalog.iter().filter(|t| t.tier == tier).peekable();
    let first = in_tier.peek().copied();
    in_tier
        .find(|t| !recent.iter().any(|r| r.trim().eq_ignore_ascii_case(&t.name)))
        .or(first)
}
