//! Word-level alignment between what the learner said and what was expected.
//!
//! The word sequences are diffed with an LCS-based algorithm from `similar`.
//! Each opcode maps onto feedback as follows:
//!
//! | opcode    | result                                             |
//! |-----------|----------------------------------------------------|
//! | `equal`   | every pair `correct`                               |
//! | `replace` | positional pairs graded by word similarity; the    |
//! |           | longer side's leftovers become `extra` / `missing` |
//! | `delete`  | candidate-only words → `extra`                     |
//! | `insert`  | expected-only words → `missing`                    |

use serde::{Deserialize, Serialize};
use similar::{capture_diff_slices, Algorithm, DiffTag};

use super::similarity_ratio;

/// Cut-offs used to grade a replaced word pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlignThresholds {
    /// Ratio strictly above this is `correct`.
    pub correct: f64,
    /// Ratio strictly above this (and not correct) is `close`.
    pub close: f64,
}

impl Default for AlignThresholds {
    fn default() -> Self {
        Self {
            correct: 0.9,
            close: 0.7,
        }
    }
}

impl AlignThresholds {
    pub fn classify(&self, ratio: f64) -> WordTag {
        if ratio > self.correct {
            WordTag::Correct
        } else if ratio > self.close {
            WordTag::Close
        } else {
            WordTag::Incorrect
        }
    }
}

/// Grade of an aligned candidate/expected word pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WordTag {
    Correct,
    Close,
    Incorrect,
}

/// One slot of the rendered diff, in reading order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AlignedWord {
    /// A candidate word paired with an expected word.
    Pair {
        candidate: String,
        expected: String,
        tag: WordTag,
        similarity: f64,
    },
    /// Expected word the learner did not say.
    Missing { expected: String },
    /// Word the learner said that has no expected counterpart.
    Extra { candidate: String },
}

/// Structured word diff between a candidate utterance and an expected phrase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alignment {
    pub words: Vec<AlignedWord>,
    pub expected_words: usize,
    pub candidate_words: usize,
}

impl Alignment {
    /// Paired words as `(candidate, expected, tag)`.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str, WordTag)> {
        self.words.iter().filter_map(|w| match w {
            AlignedWord::Pair {
                candidate,
                expected,
                tag,
                ..
            } => Some((candidate.as_str(), expected.as_str(), *tag)),
            _ => None,
        })
    }

    pub fn missing(&self) -> Vec<&str> {
        self.words
            .iter()
            .filter_map(|w| match w {
                AlignedWord::Missing { expected } => Some(expected.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn extra(&self) -> Vec<&str> {
        self.words
            .iter()
            .filter_map(|w| match w {
                AlignedWord::Extra { candidate } => Some(candidate.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn correct_count(&self) -> usize {
        self.pairs()
            .filter(|(_, _, tag)| *tag == WordTag::Correct)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// `"N/total correct"` against the expected word count.
    pub fn summary(&self) -> String {
        format!("{}/{} correct", self.correct_count(), self.expected_words)
    }

    /// Plain-text diff: `word` correct, `~said(expected)` close,
    /// `!said(expected)` incorrect, `-word` missing, `+word` extra.
    pub fn render(&self) -> String {
        let parts: Vec<String> = self
            .words
            .iter()
            .map(|w| match w {
                AlignedWord::Pair {
                    candidate,
                    expected,
                    tag,
                    ..
                } => match tag {
                    WordTag::Correct => candidate.clone(),
                    WordTag::Close => format!("~{candidate}({expected})"),
                    WordTag::Incorrect => format!("!{candidate}({expected})"),
                },
                AlignedWord::Missing { expected } => format!("-{expected}"),
                AlignedWord::Extra { candidate } => format!("+{candidate}"),
            })
            .collect();
        parts.join(" ")
    }
}

/// Align `candidate` against `expected` word by word.
///
/// Empty input on either side short-circuits to an empty [`Alignment`].
pub fn align(candidate: &str, expected: &str, thresholds: &AlignThresholds) -> Alignment {
    let candidate_norm = super::normalize(candidate);
    let expected_norm = super::normalize(expected);
    let cand = tokenize(&candidate_norm);
    let exp = tokenize(&expected_norm);
    if cand.is_empty() || exp.is_empty() {
        return Alignment::default();
    }

    let mut words = Vec::with_capacity(cand.len().max(exp.len()));
    for op in capture_diff_slices(Algorithm::Lcs, &cand, &exp) {
        let (tag, old, new) = op.as_tag_tuple();
        match tag {
            DiffTag::Equal => {
                for (c, e) in cand[old].iter().zip(&exp[new]) {
                    words.push(AlignedWord::Pair {
                        candidate: (*c).to_string(),
                        expected: (*e).to_string(),
                        tag: WordTag::Correct,
                        similarity: 1.0,
                    });
                }
            }
            DiffTag::Replace => {
                let said = &cand[old];
                let wanted = &exp[new];
                for (c, e) in said.iter().zip(wanted) {
                    let similarity = similarity_ratio(c, e);
                    words.push(AlignedWord::Pair {
                        candidate: (*c).to_string(),
                        expected: (*e).to_string(),
                        tag: thresholds.classify(similarity),
                        similarity,
                    });
                }
                let paired = said.len().min(wanted.len());
                words.extend(said[paired..].iter().map(|c| AlignedWord::Extra {
                    candidate: (*c).to_string(),
                }));
                words.extend(wanted[paired..].iter().map(|e| AlignedWord::Missing {
                    expected: (*e).to_string(),
                }));
            }
            DiffTag::Delete => {
                words.extend(cand[old].iter().map(|c| AlignedWord::Extra {
                    candidate: (*c).to_string(),
                }));
            }
            DiffTag::Insert => {
                words.extend(exp[new].iter().map(|e| AlignedWord::Missing {
                    expected: (*e).to_string(),
                }));
            }
        }
    }

    Alignment {
        words,
        expected_words: exp.len(),
        candidate_words: cand.len(),
    }
}

fn tokenize(text: &str) -> Vec<&str> {
    text.split_whitespace().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(candidate: &str, expected: &str) -> Alignment {
        align(candidate, expected, &AlignThresholds::default())
    }

    #[test]
    fn identical_sentences_are_all_correct() {
        let a = run("I like pizza", "I like pizza");
        assert_eq!(a.pairs().count(), 3);
        assert!(a.pairs().all(|(_, _, tag)| tag == WordTag::Correct));
        assert!(a.missing().is_empty());
        assert!(a.extra().is_empty());
        assert_eq!(a.summary(), "3/3 correct");
    }

    #[test]
    fn replaced_word_is_graded_by_similarity() {
        let a = run("the cat sat", "the cat sit");
        let pairs: Vec<_> = a.pairs().collect();
        assert_eq!(pairs.len(), 3);
        assert_eq!(pairs[0], ("the", "the", WordTag::Correct));
        assert_eq!(pairs[1], ("cat", "cat", WordTag::Correct));
        // 1 edit over 3 chars → 0.67, below the close cut-off
        assert_eq!(pairs[2], ("sat", "sit", WordTag::Incorrect));
        assert_eq!(a.correct_count(), 2);
    }

    #[test]
    fn near_miss_is_close() {
        // "favourite" vs "favorite": 1 edit over 9 chars → 0.89
        let a = run("my favourite food", "my favorite food");
        let tags: Vec<_> = a.pairs().map(|(_, _, t)| t).collect();
        assert_eq!(tags, vec![WordTag::Correct, WordTag::Close, WordTag::Correct]);
    }

    #[test]
    fn unmatched_words_become_missing_and_extra() {
        let a = run("i really like pizza", "i like pizza too");
        assert_eq!(a.extra(), vec!["really"]);
        assert_eq!(a.missing(), vec!["too"]);
        assert_eq!(a.correct_count(), 3);
        assert_eq!(a.expected_words, 4);
        assert_eq!(a.candidate_words, 4);
    }

    #[test]
    fn uneven_replace_spills_leftovers() {
        let a = run("go home quickly now", "stay");
        assert_eq!(a.pairs().count(), 1);
        assert_eq!(a.extra(), vec!["home", "quickly", "now"]);
        assert!(a.missing().is_empty());

        let b = run("yes", "absolutely not today");
        assert_eq!(b.pairs().count(), 1);
        assert_eq!(b.missing(), vec!["not", "today"]);
    }

    #[test]
    fn empty_input_short_circuits() {
        assert!(run("", "hello").is_empty());
        assert!(run("hello", "   ").is_empty());
    }

    #[test]
    fn case_is_ignored_but_punctuation_is_part_of_the_word() {
        let a = run("me too", "Me too!");
        let pairs: Vec<_> = a.pairs().collect();
        assert_eq!(
            pairs,
            vec![("me", "me", WordTag::Correct), ("too", "too!", WordTag::Close)]
        );
        assert_eq!(a.summary(), "1/2 correct");
        assert!(a.missing().is_empty());
    }

    #[test]
    fn cut_offs_are_strict() {
        let t = AlignThresholds::default();
        assert_eq!(t.classify(0.91), WordTag::Correct);
        assert_eq!(t.classify(0.9), WordTag::Close);
        assert_eq!(t.classify(0.75), WordTag::Close);
        assert_eq!(t.classify(0.7), WordTag::Incorrect);
    }

    #[test]
    fn render_marks_each_slot() {
        let a = run("i likes pizza", "i like pizza now");
        assert_eq!(a.render(), "i ~likes(like) pizza -now");
    }

    #[test]
    fn custom_thresholds_change_grading() {
        let lenient = AlignThresholds {
            correct: 0.9,
            close: 0.6,
        };
        let a = align("the cat sat", "the cat sit", &lenient);
        let last = a.pairs().last().map(|(_, _, t)| t);
        assert_eq!(last, Some(WordTag::Close));
    }
}
