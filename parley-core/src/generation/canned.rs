//! Offline dialogue library used whenever a live generator is unavailable.
//!
//! Three topics have hand-written seven-exchange scripts; everything else
//! gets a generic template built around the topic name. Requests longer
//! than a hand-written script are padded from the template.

use tracing::debug;

use super::{DialogueGenerator, GenerationRequest};
use crate::dialogue::{Exchange, Script};
use crate::error::Result;

/// Topic used when a request names none.
pub const NEUTRAL_TOPIC: &str = "everyday life";

const INDEPENDENCE_DAY: [(&str, &str); 7] = [
    (
        "Hi! How did you celebrate Independence Day this year?",
        "I went to see fireworks with my family and friends.",
    ),
    (
        "That sounds fun! What's your favorite thing about the fireworks?",
        "I love the colorful explosions and the loud sounds they make.",
    ),
    (
        "Did you have a barbecue or picnic as well?",
        "Yes, we grilled hamburgers and hot dogs in the park.",
    ),
    (
        "What other activities did you do during the day?",
        "We played games and listened to patriotic music.",
    ),
    (
        "Do you know why we celebrate Independence Day?",
        "Yes, it's when America declared independence from Britain in 1776.",
    ),
    (
        "That's right! What does freedom mean to you personally?",
        "Freedom means being able to make my own choices and express my opinions.",
    ),
    (
        "That's a great perspective! Will you celebrate the same way next year?",
        "I hope so! It's become a wonderful family tradition for us.",
    ),
];

const FAVORITE_FOOD: [(&str, &str); 7] = [
    (
        "What's your favorite food?",
        "I really love pizza! It's my absolute favorite.",
    ),
    (
        "Pizza is delicious! What kind of toppings do you like?",
        "I prefer pepperoni and mushrooms with extra cheese.",
    ),
    (
        "That sounds tasty! Do you make pizza at home or order it?",
        "I usually order from my local pizzeria, but sometimes I make it myself.",
    ),
    (
        "Making pizza at home can be fun! What's the hardest part?",
        "Getting the dough just right is always challenging for me.",
    ),
    (
        "Have you tried any unusual pizza toppings?",
        "Once I tried pineapple on pizza, but I didn't really like it.",
    ),
    (
        "Pineapple on pizza is controversial! What other foods do you enjoy?",
        "I also love pasta and Chinese food, especially fried rice.",
    ),
    (
        "You have great taste in food! Do you cook often?",
        "I try to cook at least a few times a week to save money.",
    ),
];

const TRAVEL: [(&str, &str); 7] = [
    (
        "Have you traveled anywhere interesting recently?",
        "Yes, I visited Paris last summer and it was amazing!",
    ),
    (
        "Paris sounds wonderful! What was your favorite part?",
        "I loved seeing the Eiffel Tower and walking along the Seine River.",
    ),
    (
        "Did you try any French food while you were there?",
        "Yes! I had croissants every morning and tried escargot for dinner.",
    ),
    (
        "How was the escargot? Many people are nervous to try it.",
        "It was actually quite good! The garlic butter made it taste delicious.",
    ),
    (
        "What was the biggest challenge during your trip?",
        "The language barrier was difficult since I don't speak much French.",
    ),
    (
        "Did you manage to communicate anyway?",
        "Most people spoke some English, and I used translation apps on my phone.",
    ),
    (
        "Would you like to visit France again or try somewhere new?",
        "I'd love to go back to France, but I also want to visit Italy next.",
    ),
];

fn library(topic_key: &str) -> Option<&'static [(&'static str, &'static str)]> {
    match topic_key {
        "independence day holiday" => Some(&INDEPENDENCE_DAY),
        "favorite food" => Some(&FAVORITE_FOOD),
        "travel experiences" => Some(&TRAVEL),
        _ => None,
    }
}

fn generic_exchange(topic: &str, index: usize) -> Exchange {
    let (prompt, expected) = match index {
        0 => (
            format!("Let's talk about {topic}. What do you think about it?"),
            format!("I think {topic} is very interesting and important to me."),
        ),
        1 => (
            format!("That's great! Can you tell me more about your experience with {topic}?"),
            format!("I have some experience with {topic} and I find it quite enjoyable."),
        ),
        2 => (
            format!("What's the most interesting thing about {topic} for you?"),
            "The most interesting thing is how it affects my daily life.".to_string(),
        ),
        3 => (
            format!("Have you learned anything new about {topic} recently?"),
            "Yes, I've been learning more about it through books and online.".to_string(),
        ),
        4 => (
            format!("Do you think {topic} is important for other people too?"),
            format!("Absolutely! I think everyone can benefit from understanding {topic}."),
        ),
        5 => (
            format!("What advice would you give to someone new to {topic}?"),
            "I'd tell them to start slowly and be patient with themselves.".to_string(),
        ),
        _ => (
            format!("Thank you for sharing your thoughts about {topic}!"),
            format!("Thank you for the interesting conversation about {topic}!"),
        ),
    };
    Exchange::new(prompt, expected)
}

/// Deterministic generator over the built-in library.
#[derive(Debug, Default, Clone, Copy)]
pub struct CannedGenerator;

impl CannedGenerator {
    pub fn exchanges(request: &GenerationRequest) -> Vec<Exchange> {
        let topic = request.topic.trim();
        let count = request.exchange_count.max(1);
        let written = library(&topic.to_lowercase()).unwrap_or(&[]);

        (0..count)
            .map(|i| match written.get(i) {
                Some((prompt, expected)) => Exchange::new(*prompt, *expected),
                None => generic_exchange(topic, i),
            })
            .collect()
    }

    /// Always-valid script for `request`. A blank topic is replaced with
    /// a neutral one.
    pub fn script(request: &GenerationRequest) -> Script {
        let topic = match request.topic.trim() {
            "" => NEUTRAL_TOPIC,
            t => t,
        };
        let request = GenerationRequest::new(topic, request.tier, request.exchange_count);
        Script::from_trusted(topic, request.tier, Self::exchanges(&request))
    }
}

impl DialogueGenerator for CannedGenerator {
    fn generate(&mut self, request: &GenerationRequest) -> Result<Vec<Exchange>> {
        debug!(topic = %request.topic, count = request.exchange_count, "canned dialogue");
        Ok(Self::exchanges(request))
    }

    fn name(&self) -> &'static str {
        "canned"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leveling::Tier;

    #[test]
    fn known_topic_uses_written_script() {
        let req = GenerationRequest::new("Favorite Food", Tier::Easy, 5);
        let exchanges = CannedGenerator::exchanges(&req);
        assert_eq!(exchanges.len(), 5);
        assert_eq!(exchanges[0].prompt, "What's your favorite food?");
        assert_eq!(
            exchanges[4].expected_response,
            "Once I tried pineapple on pizza, but I didn't really like it."
        );
    }

    #[test]
    fn unknown_topic_uses_template() {
        let req = GenerationRequest::new("daily routine", Tier::Easy, 3);
        let exchanges = CannedGenerator::exchanges(&req);
        assert_eq!(exchanges.len(), 3);
        assert_eq!(
            exchanges[0].prompt,
            "Let's talk about daily routine. What do you think about it?"
        );
        assert_eq!(
            exchanges[2].expected_response,
            "The most interesting thing is how it affects my daily life."
        );
    }

    #[test]
    fn long_requests_are_padded_from_template() {
        let req = GenerationRequest::new("travel experiences", Tier::Hard, 10);
        let exchanges = CannedGenerator::exchanges(&req);
        assert_eq!(exchanges.len(), 10);
        assert!(exchanges[6].prompt.starts_with("Would you like to visit France"));
        assert_eq!(
            exchanges[9].prompt,
            "Thank you for sharing your thoughts about travel experiences!"
        );
    }

    #[test]
    fn script_is_always_valid() {
        let req = GenerationRequest::new("business and economics", Tier::Hard, 10);
        let script = CannedGenerator::script(&req);
        assert_eq!(script.len(), 10);
        assert_eq!(script.tier(), Tier::Hard);

        let blank = CannedGenerator::script(&GenerationRequest::new("  ", Tier::Easy, 0));
        assert_eq!(blank.topic(), "everyday life");
        assert_eq!(blank.len(), 1);
    }
}
